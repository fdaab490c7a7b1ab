use std::collections::HashMap;
use std::path::PathBuf;

use crate::proto::{ExecutorInfo, Task, TaskDescription, TaskState};
use crate::resources::Resources;
use crate::state::{ExecutorId, FrameworkId, TaskId};

/// A tenant-supplied executor hosted on this agent. Goes away when the
/// executor process exits or its framework is removed.
#[derive(Debug, Clone)]
pub struct Executor {
    pub id: ExecutorId,
    pub framework_id: FrameworkId,
    pub info: ExecutorInfo,
    /// Work directory allocated for this executor, unique per launch.
    pub directory: PathBuf,
    /// Endpoint the executor registered from; `None` until it registers.
    pub pid: Option<String>,
    /// Running total of resources across launched tasks.
    pub resources: Resources,
    /// Tasks accepted before the executor registered, in arrival order.
    pub queued_tasks: Vec<TaskDescription>,
    /// Tasks already forwarded to the executor, keyed by task id.
    pub launched_tasks: HashMap<TaskId, Task>,
}

impl Executor {
    pub fn new(framework_id: &str, info: ExecutorInfo, directory: PathBuf) -> Self {
        Self {
            id: info.executor_id.clone(),
            framework_id: framework_id.to_string(),
            info,
            directory,
            pid: None,
            resources: Resources::new(),
            queued_tasks: Vec::new(),
            launched_tasks: HashMap::new(),
        }
    }

    pub fn registered(&self) -> bool {
        self.pid.is_some()
    }

    /// Add a launched task and fold its resources into the ledger.
    /// The master enforces unique task ids; a duplicate is ignored.
    pub fn add_task(&mut self, description: &TaskDescription) -> &Task {
        let task_id = description.task_id.clone();
        if !self.launched_tasks.contains_key(&task_id) {
            self.resources += Resources::from_proto(&description.resources);
            self.launched_tasks.insert(
                task_id.clone(),
                crate::state::make_task(&self.framework_id, &self.id, description),
            );
        }
        &self.launched_tasks[&task_id]
    }

    /// Remove a task wherever it is. Resources are subtracted only for
    /// launched tasks; queued tasks never entered the ledger.
    pub fn remove_task(&mut self, task_id: &str) {
        self.queued_tasks.retain(|t| t.task_id != task_id);

        if let Some(task) = self.launched_tasks.remove(task_id) {
            self.resources -= Resources::from_proto(&task.resources);
        }
    }

    pub fn update_task_state(&mut self, task_id: &str, state: TaskState) {
        if let Some(task) = self.launched_tasks.get_mut(task_id) {
            task.set_state(state);
        }
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.launched_tasks.contains_key(task_id)
            || self.queued_tasks.iter().any(|t| t.task_id == task_id)
    }
}
