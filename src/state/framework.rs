use std::collections::HashMap;
use std::path::PathBuf;

use crate::proto::{ExecutorInfo, FrameworkInfo, StatusUpdate};
use crate::state::{Executor, ExecutorId, FrameworkId, TaskId};

/// A tenant of the cluster as seen from this agent: its scheduler
/// endpoint, its executors, and the status updates we still owe the
/// master an acknowledgement for.
#[derive(Debug, Clone)]
pub struct Framework {
    pub id: FrameworkId,
    pub info: FrameworkInfo,
    /// Endpoint of the framework scheduler; replaced on scheduler failover.
    pub pid: String,
    pub executors: HashMap<ExecutorId, Executor>,
    /// In-flight status updates awaiting acknowledgement, one per task.
    pub updates: HashMap<TaskId, StatusUpdate>,
}

impl Framework {
    pub fn new(id: &str, info: FrameworkInfo, pid: &str) -> Self {
        Self {
            id: id.to_string(),
            info,
            pid: pid.to_string(),
            executors: HashMap::new(),
            updates: HashMap::new(),
        }
    }

    pub fn create_executor(&mut self, info: &ExecutorInfo, directory: PathBuf) -> &mut Executor {
        self.executors
            .entry(info.executor_id.clone())
            .or_insert_with(|| Executor::new(&self.id, info.clone(), directory))
    }

    pub fn executor(&self, executor_id: &str) -> Option<&Executor> {
        self.executors.get(executor_id)
    }

    pub fn executor_mut(&mut self, executor_id: &str) -> Option<&mut Executor> {
        self.executors.get_mut(executor_id)
    }

    /// The executor hosting a task, searching queued and launched sets.
    pub fn executor_for_task(&self, task_id: &str) -> Option<&Executor> {
        self.executors.values().find(|e| e.has_task(task_id))
    }

    pub fn executor_for_task_mut(&mut self, task_id: &str) -> Option<&mut Executor> {
        self.executors.values_mut().find(|e| e.has_task(task_id))
    }
}
