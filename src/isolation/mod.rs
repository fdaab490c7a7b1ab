pub mod process;

pub use process::ProcessIsolation;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::AgentConfig;
use crate::proto::{ExecutorInfo, FrameworkInfo};
use crate::resources::Resources;

/// Asynchronous requests from the agent to the isolation layer. The
/// agent fires these and never waits; results come back as events.
#[derive(Debug)]
pub enum IsolationRequest {
    LaunchExecutor {
        framework_id: String,
        framework: FrameworkInfo,
        executor: ExecutorInfo,
        directory: PathBuf,
    },
    ResourcesChanged {
        framework_id: String,
        executor_id: String,
        resources: Resources,
    },
    KillExecutor {
        framework_id: String,
        executor_id: String,
    },
}

/// Callbacks from the isolation layer into the agent's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum IsolationEvent {
    ExecutorStarted {
        framework_id: String,
        executor_id: String,
        pid: u32,
    },
    ExecutorExited {
        framework_id: String,
        executor_id: String,
        status: i32,
    },
}

/// The pluggable local subsystem that launches, bounds, and terminates
/// executor processes. Implementations own their state; the agent only
/// talks to them through the dispatcher queue.
#[async_trait]
pub trait IsolationModule: Send {
    async fn initialize(
        &mut self,
        conf: &AgentConfig,
        local: bool,
        slave_pid: &str,
        events: mpsc::Sender<IsolationEvent>,
    );

    async fn launch_executor(
        &mut self,
        framework_id: &str,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        directory: &Path,
    );

    async fn resources_changed(
        &mut self,
        framework_id: &str,
        executor_id: &str,
        resources: &Resources,
    );

    async fn kill_executor(&mut self, framework_id: &str, executor_id: &str);
}

/// Drive an isolation module from its request queue. Runs as its own
/// task; ends when the agent drops the request sender on shutdown.
pub async fn run_dispatcher(
    mut module: Box<dyn IsolationModule>,
    conf: AgentConfig,
    local: bool,
    slave_pid: String,
    events: mpsc::Sender<IsolationEvent>,
    mut requests: mpsc::Receiver<IsolationRequest>,
) {
    module.initialize(&conf, local, &slave_pid, events).await;

    while let Some(request) = requests.recv().await {
        match request {
            IsolationRequest::LaunchExecutor {
                framework_id,
                framework,
                executor,
                directory,
            } => {
                module
                    .launch_executor(&framework_id, &framework, &executor, &directory)
                    .await;
            }
            IsolationRequest::ResourcesChanged {
                framework_id,
                executor_id,
                resources,
            } => {
                module
                    .resources_changed(&framework_id, &executor_id, &resources)
                    .await;
            }
            IsolationRequest::KillExecutor {
                framework_id,
                executor_id,
            } => {
                module.kill_executor(&framework_id, &executor_id).await;
            }
        }
    }

    tracing::info!("Isolation dispatcher stopped");
}
