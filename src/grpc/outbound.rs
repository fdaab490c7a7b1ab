use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tonic::transport::Channel;

use crate::messages::{AgentMessage, ExecutorMessage, MasterMessage, Outbound, SchedulerMessage};
use crate::proto::executor_service_client::ExecutorServiceClient;
use crate::proto::master_service_client::MasterServiceClient;
use crate::proto::scheduler_service_client::SchedulerServiceClient;
use crate::proto::{
    ExecutorRegisteredMessage, ExecutorToFrameworkMessage, ExitedExecutorMessage,
    FrameworkToExecutorMessage, KillTaskMessage, RegisterSlaveMessage, ReregisterSlaveMessage,
    RunTaskMessage, ShutdownMessage, StatusUpdateMessage,
};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers the agent's outbound messages over gRPC, one at a time, so
/// sends to any single peer leave in the order the agent produced
/// them. Connections are cached per endpoint and dropped on failure; a
/// failed send surfaces as an `Exited` event on the agent queue, which
/// is as close to a peer-exit notification as this transport gets.
pub struct OutboundRouter {
    masters: HashMap<String, MasterServiceClient<Channel>>,
    executors: HashMap<String, ExecutorServiceClient<Channel>>,
    schedulers: HashMap<String, SchedulerServiceClient<Channel>>,
    events: mpsc::Sender<AgentMessage>,
}

impl OutboundRouter {
    pub fn new(events: mpsc::Sender<AgentMessage>) -> Self {
        Self {
            masters: HashMap::new(),
            executors: HashMap::new(),
            schedulers: HashMap::new(),
            events,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Outbound>) {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Master { to, message } => self.deliver_master(to, message).await,
                Outbound::Executor { to, message } => self.deliver_executor(to, message).await,
                Outbound::Scheduler { to, message } => self.deliver_scheduler(to, message).await,
            }
        }
        tracing::info!("Outbound router stopped");
    }

    async fn deliver_master(&mut self, to: String, message: MasterMessage) {
        let client = match self.masters.get(&to) {
            Some(client) => client.clone(),
            None => {
                match timeout(
                    SEND_TIMEOUT,
                    MasterServiceClient::connect(format!("http://{to}")),
                )
                .await
                {
                    Ok(Ok(client)) => {
                        self.masters.insert(to.clone(), client.clone());
                        client
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(to = %to, error = %e, "Failed to connect to master");
                        self.peer_exited(&to).await;
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(to = %to, "Connecting to master timed out");
                        self.peer_exited(&to).await;
                        return;
                    }
                }
            }
        };
        let mut client = client;

        let result = match message {
            MasterMessage::RegisterSlave { slave } => {
                timeout(
                    SEND_TIMEOUT,
                    client.register_slave(RegisterSlaveMessage { slave: Some(slave) }),
                )
                .await
            }
            MasterMessage::ReregisterSlave {
                slave_id,
                slave,
                tasks,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.reregister_slave(ReregisterSlaveMessage {
                        slave_id,
                        slave: Some(slave),
                        tasks,
                    }),
                )
                .await
            }
            MasterMessage::StatusUpdate { update, reliable } => {
                timeout(
                    SEND_TIMEOUT,
                    client.status_update(StatusUpdateMessage {
                        update: Some(update),
                        reliable,
                    }),
                )
                .await
            }
            MasterMessage::ExitedExecutor {
                slave_id,
                framework_id,
                executor_id,
                status,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.exited_executor(ExitedExecutorMessage {
                        slave_id,
                        framework_id,
                        executor_id,
                        status,
                    }),
                )
                .await
            }
        };

        self.check_delivery(&to, "master", result).await;
    }

    async fn deliver_executor(&mut self, to: String, message: ExecutorMessage) {
        let client = match self.executors.get(&to) {
            Some(client) => client.clone(),
            None => {
                match timeout(
                    SEND_TIMEOUT,
                    ExecutorServiceClient::connect(format!("http://{to}")),
                )
                .await
                {
                    Ok(Ok(client)) => {
                        self.executors.insert(to.clone(), client.clone());
                        client
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(to = %to, error = %e, "Failed to connect to executor");
                        self.peer_exited(&to).await;
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(to = %to, "Connecting to executor timed out");
                        self.peer_exited(&to).await;
                        return;
                    }
                }
            }
        };
        let mut client = client;

        let result = match message {
            ExecutorMessage::ExecutorRegistered { args } => {
                timeout(
                    SEND_TIMEOUT,
                    client.executor_registered(ExecutorRegisteredMessage { args: Some(args) }),
                )
                .await
            }
            ExecutorMessage::RunTask {
                framework,
                framework_id,
                pid,
                task,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.run_task(RunTaskMessage {
                        framework: Some(framework),
                        framework_id,
                        pid,
                        task: Some(task),
                    }),
                )
                .await
            }
            ExecutorMessage::KillTask {
                framework_id,
                task_id,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.kill_task(KillTaskMessage {
                        framework_id,
                        task_id,
                    }),
                )
                .await
            }
            ExecutorMessage::Shutdown => {
                timeout(SEND_TIMEOUT, client.shutdown(ShutdownMessage {})).await
            }
            ExecutorMessage::FrameworkToExecutor {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.framework_to_executor(FrameworkToExecutorMessage {
                        slave_id,
                        framework_id,
                        executor_id,
                        data,
                    }),
                )
                .await
            }
        };

        self.check_delivery(&to, "executor", result).await;
    }

    async fn deliver_scheduler(&mut self, to: String, message: SchedulerMessage) {
        let client = match self.schedulers.get(&to) {
            Some(client) => client.clone(),
            None => {
                match timeout(
                    SEND_TIMEOUT,
                    SchedulerServiceClient::connect(format!("http://{to}")),
                )
                .await
                {
                    Ok(Ok(client)) => {
                        self.schedulers.insert(to.clone(), client.clone());
                        client
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(to = %to, error = %e, "Failed to connect to scheduler");
                        self.peer_exited(&to).await;
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(to = %to, "Connecting to scheduler timed out");
                        self.peer_exited(&to).await;
                        return;
                    }
                }
            }
        };
        let mut client = client;

        let result = match message {
            SchedulerMessage::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                timeout(
                    SEND_TIMEOUT,
                    client.executor_to_framework(ExecutorToFrameworkMessage {
                        slave_id,
                        framework_id,
                        executor_id,
                        data,
                    }),
                )
                .await
            }
        };

        self.check_delivery(&to, "scheduler", result).await;
    }

    async fn check_delivery(
        &mut self,
        to: &str,
        peer: &str,
        result: Result<Result<tonic::Response<crate::proto::Ack>, tonic::Status>, tokio::time::error::Elapsed>,
    ) {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(status)) => {
                tracing::warn!(to = %to, peer, status = %status, "Send failed");
                if status.code() == tonic::Code::Unavailable {
                    self.peer_exited(to).await;
                }
            }
            Err(_) => {
                // A hung peer never refuses; without this the agent
                // would see no exit signal for it at all.
                tracing::warn!(to = %to, peer, "Send timed out");
                self.peer_exited(to).await;
            }
        }
    }

    /// Forget a peer's cached connection and tell the agent it exited.
    async fn peer_exited(&mut self, to: &str) {
        self.masters.remove(to);
        self.executors.remove(to);
        self.schedulers.remove(to);
        let _ = self
            .events
            .send(AgentMessage::Exited {
                pid: to.to_string(),
            })
            .await;
    }
}
