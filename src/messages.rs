use serde::Serialize;
use tokio::sync::oneshot;

use crate::proto::{ExecutorArgs, FrameworkInfo, StatusUpdate, Task, TaskDescription};

/// Everything the agent actor can receive on its serialized queue:
/// messages from the master, from executors, detector announcements,
/// delayed self-messages, peer-exit notifications, and read-only
/// introspection queries.
#[derive(Debug)]
pub enum AgentMessage {
    NewMasterDetected {
        pid: String,
    },
    NoMasterDetected,
    Registered {
        slave_id: String,
    },
    Reregistered {
        slave_id: String,
    },
    RunTask {
        framework: FrameworkInfo,
        framework_id: String,
        pid: String,
        task: TaskDescription,
    },
    KillTask {
        framework_id: String,
        task_id: String,
    },
    KillFramework {
        framework_id: String,
    },
    FrameworkToExecutor {
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    },
    UpdateFramework {
        framework_id: String,
        pid: String,
    },
    StatusUpdateAcknowledgement {
        slave_id: String,
        framework_id: String,
        task_id: String,
    },
    RegisterExecutor {
        framework_id: String,
        executor_id: String,
        pid: String,
    },
    StatusUpdate {
        update: StatusUpdate,
    },
    ExecutorToFramework {
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    },
    /// Delayed self-message arming a status-update retry.
    StatusUpdateTimeout {
        update: StatusUpdate,
    },
    /// A peer endpoint is no longer reachable.
    Exited {
        pid: String,
    },
    Query(Query),
}

/// Read-only snapshot queries from the introspection endpoints. They
/// are answered inside the agent's serialized loop and never mutate.
#[derive(Debug)]
pub enum Query {
    Info {
        reply: oneshot::Sender<InfoSnapshot>,
    },
    Frameworks {
        reply: oneshot::Sender<Vec<FrameworkSnapshot>>,
    },
    Tasks {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Stats {
        reply: oneshot::Sender<StatsSnapshot>,
    },
    Vars {
        reply: oneshot::Sender<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoSnapshot {
    pub built_date: String,
    pub build_user: String,
    pub start_time: String,
    pub pid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSnapshot {
    pub id: String,
    pub name: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub framework_id: String,
    pub slave_id: String,
    pub name: String,
    pub state: String,
    pub cpus: f64,
    pub mem: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime: f64,
    pub total_frameworks: usize,
    pub started_tasks: u64,
    pub finished_tasks: u64,
    pub killed_tasks: u64,
    pub failed_tasks: u64,
    pub lost_tasks: u64,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
}

/// Messages the agent sends to the master.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterMessage {
    RegisterSlave {
        slave: crate::proto::SlaveInfo,
    },
    ReregisterSlave {
        slave_id: String,
        slave: crate::proto::SlaveInfo,
        tasks: Vec<Task>,
    },
    StatusUpdate {
        update: StatusUpdate,
        reliable: bool,
    },
    ExitedExecutor {
        slave_id: String,
        framework_id: String,
        executor_id: String,
        status: i32,
    },
}

/// Messages the agent sends to an executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorMessage {
    ExecutorRegistered {
        args: ExecutorArgs,
    },
    RunTask {
        framework: FrameworkInfo,
        framework_id: String,
        pid: String,
        task: TaskDescription,
    },
    KillTask {
        framework_id: String,
        task_id: String,
    },
    Shutdown,
    FrameworkToExecutor {
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    },
}

/// Messages the agent sends to a framework scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerMessage {
    ExecutorToFramework {
        slave_id: String,
        framework_id: String,
        executor_id: String,
        data: Vec<u8>,
    },
}

/// An addressed outbound message, delivered by the router in the order
/// the agent produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Master { to: String, message: MasterMessage },
    Executor { to: String, message: ExecutorMessage },
    Scheduler { to: String, message: SchedulerMessage },
}
