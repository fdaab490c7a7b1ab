use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::detector::MasterDetector;
use crate::error::Result;
use crate::grpc::{GrpcServer, OutboundRouter};
use crate::http::{run_introspection, IntrospectionState};
use crate::isolation::{self, IsolationModule};
use crate::slave::Slave;

/// Wires the agent actor to its collaborators and runs them.
pub struct Agent {
    conf: AgentConfig,
    local: bool,
}

impl Agent {
    pub fn new(conf: AgentConfig, local: bool) -> Self {
        Self { conf, local }
    }

    /// Run the agent until the shutdown token fires; SIGTERM and
    /// SIGINT cancel it too.
    ///
    /// Subsystems started here:
    /// 1. The outbound router delivering messages to master, executors,
    ///    and schedulers.
    /// 2. The isolation dispatcher driving the pluggable module.
    /// 3. The gRPC message endpoint feeding the agent queue.
    /// 4. The introspection HTTP server, if configured.
    /// 5. The master detector, announcing the configured master.
    ///
    /// The agent actor itself runs on this task; everything else is
    /// spawned. On shutdown the actor removes every framework, then the
    /// isolation queue is closed and the dispatcher joined.
    pub async fn run(
        self,
        module: Box<dyn IsolationModule>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        Self::cancel_on_signal(shutdown.clone());

        let (outbound_tx, outbound_rx) = mpsc::channel(1024);
        let (isolation_tx, isolation_rx) = mpsc::channel(1024);
        let (event_tx, event_rx) = mpsc::channel(1024);

        let (slave, tx, rx) = Slave::new(self.conf.clone(), outbound_tx, isolation_tx.clone())?;
        let slave_pid = slave.pid();

        let router = OutboundRouter::new(tx.clone());
        tokio::spawn(router.run(outbound_rx));

        let isolation_handle = tokio::spawn(isolation::run_dispatcher(
            module,
            self.conf.clone(),
            self.local,
            slave_pid,
            event_tx,
            isolation_rx,
        ));

        let server = GrpcServer::new(self.conf.listen_addr, tx.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Agent message endpoint failed");
            }
        });

        if let Some(http_addr) = self.conf.http_addr {
            let state = IntrospectionState { tx: tx.clone() };
            tokio::spawn(run_introspection(http_addr, state));
        }

        tokio::spawn(MasterDetector::new(self.conf.master.clone()).run(tx.clone()));

        slave.run(rx, event_rx, shutdown).await;

        // Stop the isolation layer and join it.
        drop(isolation_tx);
        let _ = isolation_handle.await;

        Ok(())
    }

    /// Cancel the shutdown token when the process receives SIGTERM or
    /// SIGINT. The agent loop reacts by removing every framework,
    /// which tells their executors to exit, before the isolation
    /// layer is stopped.
    fn cancel_on_signal(shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGINT handler");
                    return;
                }
            };

            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = received, "Shutting down; executors will be told to exit");

            shutdown.cancel();
        });
    }
}
