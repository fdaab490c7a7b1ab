use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, PUBLIC_DNS_ENV};
use crate::error::{AgentError, Result};
use crate::isolation::{IsolationEvent, IsolationRequest};
use crate::messages::{
    AgentMessage, ExecutorMessage, FrameworkSnapshot, InfoSnapshot, MasterMessage, Outbound,
    Query, SchedulerMessage, StatsSnapshot, TaskSnapshot,
};
use crate::proto::{
    ExecutorArgs, FrameworkInfo, SlaveInfo, StatusUpdate, Task, TaskDescription, TaskState,
};
use crate::resources::Resources;
use crate::state::{is_terminal, ExecutorId, Framework, FrameworkId, SlaveId, Stats};

/// How long to wait for a master acknowledgement before resending a
/// status update.
pub const STATUS_UPDATE_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// The agent actor. Owns the framework → executor → task graph and all
/// counters; processes one message at a time off its queue. Outbound
/// traffic goes through the router channel, isolation calls through
/// the dispatcher channel. Nothing here blocks on a reply.
pub struct Slave {
    conf: AgentConfig,
    id: Option<SlaveId>,
    master: Option<String>,
    hostname: String,
    public_hostname: String,
    resources: Resources,
    frameworks: HashMap<FrameworkId, Framework>,
    stats: Stats,
    start_time: DateTime<Utc>,
    outbound: mpsc::Sender<Outbound>,
    isolation: mpsc::Sender<IsolationRequest>,
    self_tx: mpsc::Sender<AgentMessage>,
}

impl Slave {
    /// Build the actor. Fails when the local hostname cannot be
    /// resolved or the configured resources do not parse.
    pub fn new(
        conf: AgentConfig,
        outbound: mpsc::Sender<Outbound>,
        isolation: mpsc::Sender<IsolationRequest>,
    ) -> Result<(Self, mpsc::Sender<AgentMessage>, mpsc::Receiver<AgentMessage>)> {
        let hostname = hostname::get()
            .map_err(AgentError::Hostname)?
            .to_string_lossy()
            .to_string();

        // On cloud hosts the routable name can differ from the local
        // hostname; the master displays the public one.
        let public_hostname =
            std::env::var(PUBLIC_DNS_ENV).unwrap_or_else(|_| hostname.clone());

        let resources = Resources::parse(&conf.resources)?;

        let (tx, rx) = mpsc::channel(1024);
        let slave = Self {
            conf,
            id: None,
            master: None,
            hostname,
            public_hostname,
            resources,
            frameworks: HashMap::new(),
            stats: Stats::new(),
            start_time: Utc::now(),
            outbound,
            isolation,
            self_tx: tx.clone(),
        };
        Ok((slave, tx, rx))
    }

    /// The agent's own endpoint as advertised to executors and peers.
    pub fn pid(&self) -> String {
        format!("{}:{}", self.hostname, self.conf.listen_addr.port())
    }

    pub fn slave_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    pub fn framework(&self, framework_id: &str) -> Option<&Framework> {
        self.frameworks.get(framework_id)
    }

    pub fn framework_count(&self) -> usize {
        self.frameworks.len()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn total_resources(&self) -> &Resources {
        &self.resources
    }

    /// Serve the queue until shutdown. Isolation callbacks feed the
    /// same serialized loop as peer messages and timers.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<AgentMessage>,
        mut isolation_events: mpsc::Receiver<IsolationEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            pid = %self.pid(),
            resources = %self.resources,
            "Slave started"
        );

        loop {
            tokio::select! {
                Some(message) = rx.recv() => self.handle(message).await,
                Some(event) = isolation_events.recv() => match event {
                    IsolationEvent::ExecutorStarted { framework_id, executor_id, pid } => {
                        self.executor_started(framework_id, executor_id, pid);
                    }
                    IsolationEvent::ExecutorExited { framework_id, executor_id, status } => {
                        self.executor_exited(framework_id, executor_id, status).await;
                    }
                },
                _ = shutdown.cancelled() => {
                    tracing::info!("Asked to terminate");
                    self.terminate().await;
                    break;
                }
                else => break,
            }
        }
    }

    pub async fn handle(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::NewMasterDetected { pid } => self.new_master_detected(pid).await,
            AgentMessage::NoMasterDetected => self.no_master_detected(),
            AgentMessage::Registered { slave_id } => self.registered(slave_id),
            AgentMessage::Reregistered { slave_id } => {
                if let Err(e) = self.reregistered(slave_id) {
                    tracing::error!(error = %e, "Fatal error re-registering with master");
                    std::process::exit(1);
                }
            }
            AgentMessage::RunTask {
                framework,
                framework_id,
                pid,
                task,
            } => self.run_task(framework, framework_id, pid, task).await,
            AgentMessage::KillTask {
                framework_id,
                task_id,
            } => self.kill_task(framework_id, task_id).await,
            AgentMessage::KillFramework { framework_id } => {
                self.kill_framework(framework_id).await
            }
            AgentMessage::FrameworkToExecutor {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                self.scheduler_message(slave_id, framework_id, executor_id, data)
                    .await
            }
            AgentMessage::UpdateFramework { framework_id, pid } => {
                self.update_framework(framework_id, pid)
            }
            AgentMessage::StatusUpdateAcknowledgement {
                slave_id: _,
                framework_id,
                task_id,
            } => {
                self.status_update_acknowledgement(framework_id, task_id)
                    .await
            }
            AgentMessage::RegisterExecutor {
                framework_id,
                executor_id,
                pid,
            } => self.register_executor(framework_id, executor_id, pid).await,
            AgentMessage::StatusUpdate { update } => self.status_update(update).await,
            AgentMessage::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => {
                self.executor_message(slave_id, framework_id, executor_id, data)
                    .await
            }
            AgentMessage::StatusUpdateTimeout { update } => {
                self.status_update_timeout(update).await
            }
            AgentMessage::Exited { pid } => self.exited(pid),
            AgentMessage::Query(query) => self.handle_query(query),
        }
    }

    /// Record the new master and (re)register. A fresh agent sends
    /// `RegisterSlave`; an agent that already has an id re-registers
    /// and enumerates every launched task so the master can rebuild
    /// its view.
    pub async fn new_master_detected(&mut self, pid: String) {
        tracing::info!(master = %pid, "New master detected");
        self.master = Some(pid);

        match self.id.clone() {
            None => {
                // Slave started before the master.
                let slave = self.slave_info();
                self.send_to_master(MasterMessage::RegisterSlave { slave })
                    .await;
            }
            Some(slave_id) => {
                let slave = self.slave_info();
                let tasks = self.launched_tasks();
                self.send_to_master(MasterMessage::ReregisterSlave {
                    slave_id,
                    slave,
                    tasks,
                })
                .await;
            }
        }
    }

    pub fn no_master_detected(&mut self) {
        tracing::info!("Lost master(s) ... waiting");
    }

    pub fn registered(&mut self, slave_id: String) {
        tracing::info!(slave_id = %slave_id, "Registered with master; given slave ID");
        self.id = Some(slave_id);
    }

    /// The master must hand back the id we already have; anything else
    /// means the cluster sees us as a different agent and continuing
    /// would corrupt both views.
    pub fn reregistered(&mut self, slave_id: String) -> Result<()> {
        match &self.id {
            Some(id) if *id == slave_id => {
                tracing::info!("Re-registered with master");
                Ok(())
            }
            Some(id) => Err(AgentError::SlaveIdMismatch {
                have: id.clone(),
                got: slave_id,
            }),
            None => Err(AgentError::SlaveIdMismatch {
                have: String::new(),
                got: slave_id,
            }),
        }
    }

    /// Accept a task: forward it if its executor is up, queue it if
    /// the executor is still starting, or launch a new executor and
    /// queue it.
    pub async fn run_task(
        &mut self,
        framework_info: FrameworkInfo,
        framework_id: String,
        pid: String,
        task: TaskDescription,
    ) {
        tracing::info!(task_id = %task.task_id, framework_id = %framework_id, "Got assigned task");

        if !self.frameworks.contains_key(&framework_id) {
            self.frameworks.insert(
                framework_id.clone(),
                Framework::new(&framework_id, framework_info, &pid),
            );
        }

        let slave_id = self.id.clone().unwrap_or_default();
        let work_dir = self.conf.work_dir.clone();

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            return;
        };

        // The task may nominate its own executor; otherwise use the
        // framework's default.
        let executor_info = task
            .executor
            .clone()
            .or_else(|| framework.info.executor.clone());
        let Some(executor_info) = executor_info else {
            tracing::warn!(
                task_id = %task.task_id,
                framework_id = %framework_id,
                "Dropping task with no executor descriptor"
            );
            return;
        };
        let executor_id = executor_info.executor_id.clone();

        let fw_info = framework.info.clone();
        let fw_pid = framework.pid.clone();

        enum Next {
            Queued,
            Forward { pid: String, resources: Resources },
            Launch { directory: PathBuf },
        }

        let next = if let Some(executor) = framework.executor_mut(&executor_id) {
            if !executor.registered() {
                // Queue task until the executor starts up.
                executor.queued_tasks.push(task.clone());
                Next::Queued
            } else {
                executor.add_task(&task);
                Next::Forward {
                    pid: executor.pid.clone().unwrap_or_default(),
                    resources: executor.resources.clone(),
                }
            }
        } else {
            let directory =
                allocate_work_directory(&work_dir, &slave_id, &framework_id, &executor_id);
            tracing::info!(
                directory = %directory.display(),
                executor_id = %executor_id,
                framework_id = %framework_id,
                "Using work directory for executor"
            );
            let executor = framework.create_executor(&executor_info, directory.clone());
            executor.queued_tasks.push(task.clone());
            Next::Launch { directory }
        };

        match next {
            Next::Queued => {}
            Next::Forward {
                pid: executor_pid,
                resources,
            } => {
                self.stats.bump_task(TaskState::TaskStarting);
                self.send_to_executor(
                    &executor_pid,
                    ExecutorMessage::RunTask {
                        framework: fw_info,
                        framework_id: framework_id.clone(),
                        pid: fw_pid,
                        task,
                    },
                )
                .await;
                self.notify_resources_changed(&framework_id, &executor_id, resources)
                    .await;
            }
            Next::Launch { directory } => {
                let _ = self
                    .isolation
                    .send(IsolationRequest::LaunchExecutor {
                        framework_id,
                        framework: fw_info,
                        executor: executor_info,
                        directory,
                    })
                    .await;
            }
        }
    }

    /// Kill a task, or explain to the master why we cannot: unknown
    /// framework and unknown task fabricate `TASK_LOST`, a still-queued
    /// task is dropped locally as `TASK_KILLED`, and a running task is
    /// killed by its executor (which reports back with a status
    /// update of its own).
    pub async fn kill_task(&mut self, framework_id: String, task_id: String) {
        tracing::info!(task_id = %task_id, framework_id = %framework_id, "Asked to kill task");

        let slave_id = self.id.clone().unwrap_or_default();

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            tracing::warn!(
                task_id = %task_id,
                framework_id = %framework_id,
                "Cannot kill task because no such framework is running"
            );
            let update = fabricated_update(
                &framework_id,
                "",
                &slave_id,
                &task_id,
                TaskState::TaskLost,
                -1,
            );
            self.send_to_master(MasterMessage::StatusUpdate {
                update,
                reliable: false,
            })
            .await;
            return;
        };

        enum Next {
            Lost,
            Killed {
                executor_id: ExecutorId,
                resources: Resources,
            },
            Forward {
                pid: String,
            },
        }

        let next = match framework.executor_for_task_mut(&task_id) {
            None => Next::Lost,
            Some(executor) if !executor.registered() => {
                executor.remove_task(&task_id);
                Next::Killed {
                    executor_id: executor.id.clone(),
                    resources: executor.resources.clone(),
                }
            }
            Some(executor) => Next::Forward {
                pid: executor.pid.clone().unwrap_or_default(),
            },
        };

        match next {
            Next::Lost => {
                tracing::warn!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "Cannot kill task because no such task is running"
                );
                let update = fabricated_update(
                    &framework_id,
                    "",
                    &slave_id,
                    &task_id,
                    TaskState::TaskLost,
                    -1,
                );
                self.send_to_master(MasterMessage::StatusUpdate {
                    update,
                    reliable: false,
                })
                .await;
            }
            Next::Killed {
                executor_id,
                resources,
            } => {
                self.notify_resources_changed(&framework_id, &executor_id, resources)
                    .await;
                let update = fabricated_update(
                    &framework_id,
                    &executor_id,
                    &slave_id,
                    &task_id,
                    TaskState::TaskKilled,
                    0,
                );
                self.send_to_master(MasterMessage::StatusUpdate {
                    update,
                    reliable: false,
                })
                .await;
            }
            Next::Forward { pid } => {
                self.send_to_executor(
                    &pid,
                    ExecutorMessage::KillTask {
                        framework_id,
                        task_id,
                    },
                )
                .await;
            }
        }
    }

    pub async fn kill_framework(&mut self, framework_id: String) {
        tracing::info!(framework_id = %framework_id, "Asked to kill framework");
        if self.frameworks.contains_key(&framework_id) {
            self.remove_framework(&framework_id, true).await;
        }
    }

    /// Forward an opaque scheduler payload to an executor. Dropped (and
    /// counted) when the framework or executor is unknown, or the
    /// executor has not registered yet.
    pub async fn scheduler_message(
        &mut self,
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    ) {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            tracing::warn!(
                framework_id = %framework_id,
                "Dropping message because framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        match framework.executor(&executor_id) {
            None => {
                tracing::warn!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    "Dropping message because executor does not exist"
                );
                self.stats.invalid_framework_messages += 1;
            }
            Some(executor) if !executor.registered() => {
                tracing::warn!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    "Dropping message because executor is not running"
                );
                self.stats.invalid_framework_messages += 1;
            }
            Some(executor) => {
                let pid = executor.pid.clone().unwrap_or_default();
                self.send_to_executor(
                    &pid,
                    ExecutorMessage::FrameworkToExecutor {
                        slave_id,
                        framework_id,
                        executor_id,
                        data,
                    },
                )
                .await;
                self.stats.valid_framework_messages += 1;
            }
        }
    }

    /// Point the framework at a failed-over scheduler.
    pub fn update_framework(&mut self, framework_id: String, pid: String) {
        if let Some(framework) = self.frameworks.get_mut(&framework_id) {
            tracing::info!(framework_id = %framework_id, pid = %pid, "Updating framework pid");
            framework.pid = pid;
        }
    }

    /// The master has durably recorded an update; stop retrying it. A
    /// framework with no executors left lives only for its pending
    /// updates, so the last acknowledgement also reaps the framework.
    pub async fn status_update_acknowledgement(
        &mut self,
        framework_id: String,
        task_id: String,
    ) {
        let mut reap = false;
        if let Some(framework) = self.frameworks.get_mut(&framework_id) {
            if framework.updates.remove(&task_id).is_some() {
                tracing::info!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "Got acknowledgement of status update"
                );
            }
            reap = framework.executors.is_empty() && framework.updates.is_empty();
        }
        if reap {
            self.remove_framework(&framework_id, false).await;
        }
    }

    /// An executor announces itself. Record its endpoint, give the
    /// isolation layer its current resource total, confirm the
    /// registration, and flush every queued task in arrival order.
    /// Registrations we cannot match (or duplicates) get a `Shutdown`.
    pub async fn register_executor(
        &mut self,
        framework_id: String,
        executor_id: String,
        from: String,
    ) {
        tracing::info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            "Got registration for executor"
        );

        let slave_id = self.id.clone().unwrap_or_default();
        let hostname = self.hostname.clone();

        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            tracing::warn!(
                framework_id = %framework_id,
                "Framework does not exist (it may have been killed), telling executor to exit"
            );
            self.send_to_executor(&from, ExecutorMessage::Shutdown).await;
            return;
        };

        let fw_info = framework.info.clone();
        let fw_pid = framework.pid.clone();

        enum Next {
            Shutdown,
            Registered {
                args: ExecutorArgs,
                resources: Resources,
                runs: Vec<ExecutorMessage>,
            },
        }

        let next = match framework.executor_mut(&executor_id) {
            None => {
                tracing::warn!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    "Unexpected executor registering"
                );
                Next::Shutdown
            }
            Some(executor) if executor.registered() => {
                tracing::warn!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    "Executor is already running"
                );
                Next::Shutdown
            }
            Some(executor) => {
                executor.pid = Some(from.clone());

                let args = ExecutorArgs {
                    framework_id: framework_id.clone(),
                    executor_id: executor_id.clone(),
                    slave_id,
                    hostname,
                    data: executor.info.data.clone(),
                };

                // Move queued tasks into the launched set, preserving
                // arrival order for the forwarded RunTasks.
                let queued = std::mem::take(&mut executor.queued_tasks);
                let mut runs = Vec::with_capacity(queued.len());
                for task in queued {
                    executor.add_task(&task);
                    runs.push(ExecutorMessage::RunTask {
                        framework: fw_info.clone(),
                        framework_id: framework_id.clone(),
                        pid: fw_pid.clone(),
                        task,
                    });
                }

                Next::Registered {
                    args,
                    resources: executor.resources.clone(),
                    runs,
                }
            }
        };

        match next {
            Next::Shutdown => {
                self.send_to_executor(&from, ExecutorMessage::Shutdown).await;
            }
            Next::Registered {
                args,
                resources,
                runs,
            } => {
                // Now that the executor is up, set its resource limits.
                self.notify_resources_changed(&framework_id, &executor_id, resources)
                    .await;

                self.send_to_executor(&from, ExecutorMessage::ExecutorRegistered { args })
                    .await;

                tracing::info!(framework_id = %framework_id, "Flushing queued tasks");
                for run in runs {
                    self.stats.bump_task(TaskState::TaskStarting);
                    self.send_to_executor(&from, run).await;
                }
            }
        }
    }

    /// Apply a status update from an executor and relay it reliably to
    /// the master. Terminal states remove the task (and release its
    /// resources) before the update leaves the agent.
    pub async fn status_update(&mut self, update: StatusUpdate) {
        let state = update.state();
        tracing::info!(
            task_id = %update.task_id,
            framework_id = %update.framework_id,
            state = state.as_str_name(),
            "Status update"
        );

        let Some(framework) = self.frameworks.get_mut(&update.framework_id) else {
            tracing::warn!(
                framework_id = %update.framework_id,
                "Status update error: couldn't lookup framework"
            );
            self.stats.invalid_status_updates += 1;
            return;
        };

        let Some(executor) = framework.executor_for_task_mut(&update.task_id) else {
            tracing::warn!(
                framework_id = %update.framework_id,
                "Status update error: couldn't lookup executor"
            );
            self.stats.invalid_status_updates += 1;
            return;
        };

        executor.update_task_state(&update.task_id, state);

        let mut changed = None;
        if is_terminal(state) {
            executor.remove_task(&update.task_id);
            changed = Some((executor.id.clone(), executor.resources.clone()));
        }

        // Record the update for resending until the master acknowledges.
        framework
            .updates
            .insert(update.task_id.clone(), update.clone());

        if let Some((executor_id, resources)) = changed {
            self.notify_resources_changed(&update.framework_id, &executor_id, resources)
                .await;
        }

        self.send_to_master(MasterMessage::StatusUpdate {
            update: update.clone(),
            reliable: true,
        })
        .await;

        self.arm_status_update_timer(update);

        self.stats.bump_task(state);
        self.stats.valid_status_updates += 1;
    }

    /// Forward an opaque executor payload to the framework scheduler.
    pub async fn executor_message(
        &mut self,
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    ) {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            tracing::warn!(
                framework_id = %framework_id,
                "Cannot send framework message because framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        let pid = framework.pid.clone();
        tracing::info!(framework_id = %framework_id, pid = %pid, "Sending message for framework");
        self.send_to_scheduler(
            &pid,
            SchedulerMessage::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            },
        )
        .await;
        self.stats.valid_framework_messages += 1;
    }

    /// Retry timer fired: resend the stored update unless it has been
    /// acknowledged meanwhile, and arm the next retry.
    pub async fn status_update_timeout(&mut self, update: StatusUpdate) {
        let stored = self
            .frameworks
            .get(&update.framework_id)
            .and_then(|f| f.updates.get(&update.task_id))
            .cloned();

        if let Some(stored) = stored {
            tracing::info!(
                task_id = %stored.task_id,
                framework_id = %stored.framework_id,
                "Resending status update"
            );
            self.send_to_master(MasterMessage::StatusUpdate {
                update: stored.clone(),
                reliable: true,
            })
            .await;
            self.arm_status_update_timer(stored);
        }
    }

    /// Peer-exit notification. Master loss is tolerated: we keep all
    /// state and keep serving executors until a new master is elected.
    pub fn exited(&mut self, pid: String) {
        tracing::info!(pid = %pid, "Process exited");
        if self.master.as_deref() == Some(pid.as_str()) {
            tracing::warn!("Master disconnected! Waiting for a new master to be elected.");
        }
    }

    pub fn executor_started(&mut self, framework_id: String, executor_id: String, pid: u32) {
        tracing::debug!(
            framework_id = %framework_id,
            executor_id = %executor_id,
            pid,
            "Executor started"
        );
    }

    /// The isolation layer reports an executor process is gone. Tell
    /// the master, drop the executor (without a second kill), and reap
    /// the framework once nothing keeps it alive.
    pub async fn executor_exited(
        &mut self,
        framework_id: String,
        executor_id: String,
        status: i32,
    ) {
        let known = self
            .frameworks
            .get(&framework_id)
            .map(|f| f.executor(&executor_id).is_some())
            .unwrap_or(false);
        if !known {
            tracing::warn!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                status,
                "Unknown executor has exited"
            );
            return;
        }

        tracing::info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            status,
            "Exited executor"
        );

        let slave_id = self.id.clone().unwrap_or_default();
        self.send_to_master(MasterMessage::ExitedExecutor {
            slave_id,
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
            status,
        })
        .await;

        self.remove_executor(&framework_id, &executor_id, false).await;

        let reap = self
            .frameworks
            .get(&framework_id)
            .map(|f| f.executors.is_empty() && f.updates.is_empty())
            .unwrap_or(false);
        if reap {
            self.remove_framework(&framework_id, false).await;
        }
    }

    /// Shut down an executor (optionally killing its process) and drop
    /// its record from the framework.
    async fn remove_executor(
        &mut self,
        framework_id: &str,
        executor_id: &str,
        kill_executor: bool,
    ) {
        let pid = match self
            .frameworks
            .get(framework_id)
            .and_then(|f| f.executor(executor_id))
        {
            Some(executor) => executor.pid.clone(),
            None => return,
        };

        if kill_executor {
            tracing::info!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "Shutting down executor"
            );
            if let Some(pid) = pid {
                self.send_to_executor(&pid, ExecutorMessage::Shutdown).await;
            }
            let _ = self
                .isolation
                .send(IsolationRequest::KillExecutor {
                    framework_id: framework_id.to_string(),
                    executor_id: executor_id.to_string(),
                })
                .await;
        }

        if let Some(framework) = self.frameworks.get_mut(framework_id) {
            framework.executors.remove(executor_id);
        }
    }

    async fn remove_framework(&mut self, framework_id: &str, kill_executors: bool) {
        if !self.frameworks.contains_key(framework_id) {
            return;
        }
        tracing::info!(framework_id = %framework_id, "Cleaning up framework");

        // Iterate over a copy of the ids; removal mutates the map.
        let executor_ids: Vec<ExecutorId> = self
            .frameworks
            .get(framework_id)
            .map(|f| f.executors.keys().cloned().collect())
            .unwrap_or_default();
        for executor_id in executor_ids {
            self.remove_executor(framework_id, &executor_id, kill_executors)
                .await;
        }

        self.frameworks.remove(framework_id);
    }

    async fn terminate(&mut self) {
        let framework_ids: Vec<FrameworkId> = self.frameworks.keys().cloned().collect();
        for framework_id in framework_ids {
            self.remove_framework(&framework_id, true).await;
        }
    }

    fn handle_query(&self, query: Query) {
        match query {
            Query::Info { reply } => {
                let _ = reply.send(InfoSnapshot {
                    built_date: env!("BUILD_DATE").to_string(),
                    build_user: env!("BUILD_USER").to_string(),
                    start_time: self.start_time.to_rfc3339(),
                    pid: self.pid(),
                });
            }
            Query::Frameworks { reply } => {
                let frameworks = self
                    .frameworks
                    .values()
                    .map(|f| FrameworkSnapshot {
                        id: f.id.clone(),
                        name: f.info.name.clone(),
                        user: f.info.user.clone(),
                    })
                    .collect();
                let _ = reply.send(frameworks);
            }
            Query::Tasks { reply } => {
                let tasks = self
                    .frameworks
                    .values()
                    .flat_map(|f| f.executors.values())
                    .flat_map(|e| e.launched_tasks.values())
                    .map(|t| {
                        let resources = Resources::from_proto(&t.resources);
                        TaskSnapshot {
                            task_id: t.task_id.clone(),
                            framework_id: t.framework_id.clone(),
                            slave_id: t.slave_id.clone(),
                            name: t.name.clone(),
                            state: t.state().as_str_name().to_string(),
                            cpus: resources.get_scalar("cpus"),
                            mem: resources.get_scalar("mem"),
                        }
                    })
                    .collect();
                let _ = reply.send(tasks);
            }
            Query::Stats { reply } => {
                let _ = reply.send(self.stats_snapshot());
            }
            Query::Vars { reply } => {
                let _ = reply.send(self.vars_snapshot());
            }
        }
    }

    fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0,
            total_frameworks: self.frameworks.len(),
            started_tasks: self.stats.task_count(TaskState::TaskStarting),
            finished_tasks: self.stats.task_count(TaskState::TaskFinished),
            killed_tasks: self.stats.task_count(TaskState::TaskKilled),
            failed_tasks: self.stats.task_count(TaskState::TaskFailed),
            lost_tasks: self.stats.task_count(TaskState::TaskLost),
            valid_status_updates: self.stats.valid_status_updates,
            invalid_status_updates: self.stats.invalid_status_updates,
            valid_framework_messages: self.stats.valid_framework_messages,
            invalid_framework_messages: self.stats.invalid_framework_messages,
        }
    }

    fn vars_snapshot(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("build_date {}\n", env!("BUILD_DATE")));
        out.push_str(&format!("build_user {}\n", env!("BUILD_USER")));
        for (key, value) in self.conf.vars() {
            out.push_str(&format!("{key} {value}\n"));
        }
        let stats = self.stats_snapshot();
        out.push_str(&format!("uptime {}\n", stats.uptime));
        out.push_str(&format!("total_frameworks {}\n", stats.total_frameworks));
        out.push_str(&format!("started_tasks {}\n", stats.started_tasks));
        out.push_str(&format!("finished_tasks {}\n", stats.finished_tasks));
        out.push_str(&format!("killed_tasks {}\n", stats.killed_tasks));
        out.push_str(&format!("failed_tasks {}\n", stats.failed_tasks));
        out.push_str(&format!("lost_tasks {}\n", stats.lost_tasks));
        out.push_str(&format!(
            "valid_status_updates {}\n",
            stats.valid_status_updates
        ));
        out.push_str(&format!(
            "invalid_status_updates {}\n",
            stats.invalid_status_updates
        ));
        out.push_str(&format!(
            "valid_framework_messages {}\n",
            stats.valid_framework_messages
        ));
        out.push_str(&format!(
            "invalid_framework_messages {}\n",
            stats.invalid_framework_messages
        ));
        out
    }

    fn slave_info(&self) -> SlaveInfo {
        SlaveInfo {
            hostname: self.hostname.clone(),
            public_hostname: self.public_hostname.clone(),
            resources: self.resources.to_proto(),
            attributes: self.conf.attributes_map().into_iter().collect(),
        }
    }

    /// Every launched task across all frameworks and executors.
    fn launched_tasks(&self) -> Vec<Task> {
        self.frameworks
            .values()
            .flat_map(|f| f.executors.values())
            .flat_map(|e| e.launched_tasks.values())
            .cloned()
            .collect()
    }

    fn arm_status_update_timer(&self, update: StatusUpdate) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STATUS_UPDATE_RETRY_INTERVAL).await;
            let _ = tx.send(AgentMessage::StatusUpdateTimeout { update }).await;
        });
    }

    async fn notify_resources_changed(
        &self,
        framework_id: &str,
        executor_id: &str,
        resources: Resources,
    ) {
        let _ = self
            .isolation
            .send(IsolationRequest::ResourcesChanged {
                framework_id: framework_id.to_string(),
                executor_id: executor_id.to_string(),
                resources,
            })
            .await;
    }

    async fn send_to_master(&self, message: MasterMessage) {
        match &self.master {
            Some(master) => {
                let _ = self
                    .outbound
                    .send(Outbound::Master {
                        to: master.clone(),
                        message,
                    })
                    .await;
            }
            None => {
                tracing::warn!("Dropping message for master; no master detected");
            }
        }
    }

    async fn send_to_executor(&self, pid: &str, message: ExecutorMessage) {
        let _ = self
            .outbound
            .send(Outbound::Executor {
                to: pid.to_string(),
                message,
            })
            .await;
    }

    async fn send_to_scheduler(&self, pid: &str, message: SchedulerMessage) {
        let _ = self
            .outbound
            .send(Outbound::Scheduler {
                to: pid.to_string(),
                message,
            })
            .await;
    }
}

/// Allocate `<work_dir>/work/slave-<id>/fw-<framework>-<executor>/<n>`
/// where `<n>` is the smallest integer whose path does not yet exist.
/// Multiple executors of one framework can launch on the same agent,
/// so the trailing counter keeps their directories apart.
pub fn allocate_work_directory(
    work_dir: &Path,
    slave_id: &str,
    framework_id: &str,
    executor_id: &str,
) -> PathBuf {
    let base = work_dir
        .join("work")
        .join(format!("slave-{slave_id}"))
        .join(format!("fw-{framework_id}-{executor_id}"));

    let mut n = 0u64;
    let directory = loop {
        let candidate = base.join(n.to_string());
        if !candidate.exists() {
            break candidate;
        }
        n += 1;
    };

    if let Err(e) = std::fs::create_dir_all(&directory) {
        tracing::warn!(
            directory = %directory.display(),
            error = %e,
            "Failed to create work directory"
        );
    }
    directory
}

/// A terminal update the agent makes up itself when a kill cannot be
/// delivered. Not reliable: nobody retries these and no ack is
/// expected.
fn fabricated_update(
    framework_id: &str,
    executor_id: &str,
    slave_id: &str,
    task_id: &str,
    state: TaskState,
    sequence: i64,
) -> StatusUpdate {
    StatusUpdate {
        framework_id: framework_id.to_string(),
        executor_id: executor_id.to_string(),
        slave_id: slave_id.to_string(),
        task_id: task_id.to_string(),
        state: state as i32,
        data: Vec::new(),
        timestamp: Utc::now().timestamp_micros() as f64 / 1e6,
        sequence,
    }
}
