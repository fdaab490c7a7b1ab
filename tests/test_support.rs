#![allow(dead_code)]
//! Shared helpers for driving the agent actor in tests.
//!
//! The actor is constructed with capturing channels in place of the
//! outbound router and the isolation dispatcher, so tests can assert
//! exactly which messages each handler produced.

use tempfile::TempDir;
use tokio::sync::mpsc;

use drover_agent::config::AgentConfig;
use drover_agent::isolation::IsolationRequest;
use drover_agent::messages::{AgentMessage, Outbound};
use drover_agent::proto::{resource, ExecutorInfo, FrameworkInfo, Resource, TaskDescription};
use drover_agent::slave::Slave;

pub struct TestAgent {
    pub slave: Slave,
    pub tx: mpsc::Sender<AgentMessage>,
    pub rx: mpsc::Receiver<AgentMessage>,
    pub outbound: mpsc::Receiver<Outbound>,
    pub isolation: mpsc::Receiver<IsolationRequest>,
    #[allow(dead_code)]
    pub work_dir: TempDir,
}

pub fn test_agent(resources: &str) -> TestAgent {
    let work_dir = TempDir::new().unwrap();
    let conf = AgentConfig::default()
        .with_resources(resources)
        .with_work_dir(work_dir.path());

    let (outbound_tx, outbound_rx) = mpsc::channel(256);
    let (isolation_tx, isolation_rx) = mpsc::channel(256);
    let (slave, tx, rx) = Slave::new(conf, outbound_tx, isolation_tx).unwrap();

    TestAgent {
        slave,
        tx,
        rx,
        outbound: outbound_rx,
        isolation: isolation_rx,
        work_dir,
    }
}

pub fn scalar_resources(cpus: f64, mem: f64) -> Vec<Resource> {
    vec![
        Resource {
            name: "cpus".to_string(),
            value: Some(resource::Value::Scalar(cpus)),
        },
        Resource {
            name: "mem".to_string(),
            value: Some(resource::Value::Scalar(mem)),
        },
    ]
}

pub fn executor_info(executor_id: &str) -> ExecutorInfo {
    ExecutorInfo {
        executor_id: executor_id.to_string(),
        uri: "/usr/local/bin/test-executor".to_string(),
        data: b"init-blob".to_vec(),
        resources: Vec::new(),
    }
}

pub fn framework_info(name: &str, default_executor_id: &str) -> FrameworkInfo {
    FrameworkInfo {
        name: name.to_string(),
        user: "alice".to_string(),
        executor: Some(executor_info(default_executor_id)),
    }
}

pub fn status_update(
    framework_id: &str,
    executor_id: &str,
    task_id: &str,
    state: drover_agent::proto::TaskState,
) -> drover_agent::proto::StatusUpdate {
    drover_agent::proto::StatusUpdate {
        framework_id: framework_id.to_string(),
        executor_id: executor_id.to_string(),
        slave_id: "7".to_string(),
        task_id: task_id.to_string(),
        state: state as i32,
        data: Vec::new(),
        timestamp: 1.0,
        sequence: 0,
    }
}

pub fn task(task_id: &str, cpus: f64, mem: f64) -> TaskDescription {
    TaskDescription {
        task_id: task_id.to_string(),
        name: format!("task-{task_id}"),
        slave_id: String::new(),
        resources: scalar_resources(cpus, mem),
        executor: None,
        data: Vec::new(),
    }
}
