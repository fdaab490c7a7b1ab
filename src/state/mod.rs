pub mod executor;
pub mod framework;

pub use executor::Executor;
pub use framework::Framework;

use std::collections::HashMap;

use crate::proto::{Task, TaskDescription, TaskState};

// Identifiers are opaque strings assigned by our peers: framework and
// task ids by the master, executor ids by the framework, the slave id
// by the master on first registration.
pub type FrameworkId = String;
pub type ExecutorId = String;
pub type TaskId = String;
pub type SlaveId = String;

/// Build the launched-task record for a task description. Tasks start
/// in `TASK_STARTING` and carry the resources the master allocated.
pub fn make_task(framework_id: &str, executor_id: &str, description: &TaskDescription) -> Task {
    Task {
        task_id: description.task_id.clone(),
        framework_id: framework_id.to_string(),
        executor_id: executor_id.to_string(),
        slave_id: description.slave_id.clone(),
        name: description.name.clone(),
        state: TaskState::TaskStarting as i32,
        resources: description.resources.clone(),
    }
}

pub fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::TaskFinished | TaskState::TaskFailed | TaskState::TaskKilled | TaskState::TaskLost
    )
}

/// Counters surfaced by the introspection endpoints.
#[derive(Debug, Clone)]
pub struct Stats {
    pub tasks: HashMap<TaskState, u64>,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        let mut tasks = HashMap::new();
        for state in [
            TaskState::TaskStarting,
            TaskState::TaskRunning,
            TaskState::TaskFinished,
            TaskState::TaskFailed,
            TaskState::TaskKilled,
            TaskState::TaskLost,
        ] {
            tasks.insert(state, 0);
        }
        Self {
            tasks,
            valid_status_updates: 0,
            invalid_status_updates: 0,
            valid_framework_messages: 0,
            invalid_framework_messages: 0,
        }
    }

    pub fn task_count(&self, state: TaskState) -> u64 {
        self.tasks.get(&state).copied().unwrap_or(0)
    }

    pub fn bump_task(&mut self, state: TaskState) {
        *self.tasks.entry(state).or_insert(0) += 1;
    }
}
