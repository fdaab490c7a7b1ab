use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::config::AgentConfig;
use crate::isolation::{IsolationEvent, IsolationModule};
use crate::proto::{ExecutorInfo, FrameworkInfo};
use crate::resources::Resources;

/// Isolation module that runs executors as plain local processes. It
/// observes resource ceilings but does not enforce them; enforcement
/// belongs to container-based modules behind the same trait.
#[derive(Default)]
pub struct ProcessIsolation {
    slave_pid: String,
    frameworks_home: Option<PathBuf>,
    switch_user: bool,
    events: Option<mpsc::Sender<IsolationEvent>>,
    /// Kill triggers for the per-child monitor tasks.
    children: HashMap<(String, String), oneshot::Sender<()>>,
}

impl ProcessIsolation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an executor URI to the command line we hand to the shell.
    /// Relative paths are resolved against `frameworks_home`.
    fn resolve_command(&self, uri: &str) -> String {
        if let Some(home) = &self.frameworks_home {
            if !uri.starts_with('/') && !uri.contains("://") {
                return home.join(uri).to_string_lossy().to_string();
            }
        }
        uri.to_string()
    }
}

#[async_trait]
impl IsolationModule for ProcessIsolation {
    async fn initialize(
        &mut self,
        conf: &AgentConfig,
        local: bool,
        slave_pid: &str,
        events: mpsc::Sender<IsolationEvent>,
    ) {
        self.slave_pid = slave_pid.to_string();
        self.frameworks_home = conf.frameworks_home.clone();
        self.switch_user = conf.switch_user;
        self.events = Some(events);
        tracing::info!(local, slave_pid, "Process isolation initialized");
    }

    async fn launch_executor(
        &mut self,
        framework_id: &str,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
        directory: &Path,
    ) {
        let Some(events) = self.events.clone() else {
            tracing::error!("Launch requested before initialization");
            return;
        };

        let command_line = self.resolve_command(&executor.uri);
        tracing::info!(
            framework_id,
            executor_id = %executor.executor_id,
            command = %command_line,
            directory = %directory.display(),
            "Launching executor"
        );

        let mut command = if self.switch_user && !framework.user.is_empty() {
            let mut c = Command::new("su");
            c.arg(&framework.user).arg("-c").arg(&command_line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&command_line);
            c
        };

        command
            .current_dir(directory)
            .env("DROVER_FRAMEWORK_ID", framework_id)
            .env("DROVER_EXECUTOR_ID", &executor.executor_id)
            .env("DROVER_SLAVE_PID", &self.slave_pid)
            .env("DROVER_DIRECTORY", directory)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Capture executor output in its work directory.
        match (
            std::fs::File::create(directory.join("stdout")),
            std::fs::File::create(directory.join("stderr")),
        ) {
            (Ok(out), Ok(err)) => {
                command.stdout(Stdio::from(out)).stderr(Stdio::from(err));
            }
            _ => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    framework_id,
                    executor_id = %executor.executor_id,
                    error = %e,
                    "Failed to launch executor"
                );
                let _ = events
                    .send(IsolationEvent::ExecutorExited {
                        framework_id: framework_id.to_string(),
                        executor_id: executor.executor_id.clone(),
                        status: -1,
                    })
                    .await;
                return;
            }
        };

        let pid = child.id().unwrap_or(0);
        let _ = events
            .send(IsolationEvent::ExecutorStarted {
                framework_id: framework_id.to_string(),
                executor_id: executor.executor_id.clone(),
                pid,
            })
            .await;

        let (kill_tx, mut kill_rx) = oneshot::channel();
        self.children.insert(
            (framework_id.to_string(), executor.executor_id.clone()),
            kill_tx,
        );

        let framework_id = framework_id.to_string();
        let executor_id = executor.executor_id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => {
                    status.ok().and_then(|s| s.code()).unwrap_or(-1)
                }
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await.ok().and_then(|s| s.code()).unwrap_or(-1)
                }
            };
            tracing::info!(framework_id, executor_id, status, "Executor process exited");
            let _ = events
                .send(IsolationEvent::ExecutorExited {
                    framework_id,
                    executor_id,
                    status,
                })
                .await;
        });
    }

    async fn resources_changed(
        &mut self,
        framework_id: &str,
        executor_id: &str,
        resources: &Resources,
    ) {
        // Observed only; a local process has no enforcement mechanism.
        tracing::debug!(framework_id, executor_id, resources = %resources, "Resources changed");
    }

    async fn kill_executor(&mut self, framework_id: &str, executor_id: &str) {
        match self
            .children
            .remove(&(framework_id.to_string(), executor_id.to_string()))
        {
            Some(kill) => {
                tracing::info!(framework_id, executor_id, "Killing executor");
                let _ = kill.send(());
            }
            None => {
                tracing::warn!(framework_id, executor_id, "No such executor to kill");
            }
        }
    }
}
