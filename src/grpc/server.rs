use std::net::SocketAddr;

use tokio::sync::mpsc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use crate::messages::AgentMessage;
use crate::proto::slave_service_server::{SlaveService, SlaveServiceServer};
use crate::proto::{
    Ack, ExecutorToFrameworkMessage, FrameworkToExecutorMessage, KillFrameworkMessage,
    KillTaskMessage, PingRequest, PongResponse, RegisterExecutorMessage, RunTaskMessage,
    SlaveRegisteredMessage, SlaveReregisteredMessage, StatusUpdateAcknowledgementMessage,
    StatusUpdateMessage, UpdateFrameworkMessage,
};

/// Inbound message endpoint. Every RPC enqueues a typed message on the
/// agent's serialized queue and acks immediately; handlers never run
/// on the transport threads.
pub struct SlaveServiceImpl {
    tx: mpsc::Sender<AgentMessage>,
}

impl SlaveServiceImpl {
    pub fn new(tx: mpsc::Sender<AgentMessage>) -> Self {
        Self { tx }
    }

    async fn enqueue(&self, message: AgentMessage) -> Result<Response<Ack>, Status> {
        self.tx
            .send(message)
            .await
            .map_err(|_| Status::unavailable("Agent is shutting down"))?;
        Ok(Response::new(Ack {}))
    }
}

#[tonic::async_trait]
impl SlaveService for SlaveServiceImpl {
    async fn registered(
        &self,
        request: Request<SlaveRegisteredMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::Registered {
            slave_id: req.slave_id,
        })
        .await
    }

    async fn reregistered(
        &self,
        request: Request<SlaveReregisteredMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::Reregistered {
            slave_id: req.slave_id,
        })
        .await
    }

    async fn run_task(&self, request: Request<RunTaskMessage>) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        let framework = req
            .framework
            .ok_or_else(|| Status::invalid_argument("RunTask without framework info"))?;
        let task = req
            .task
            .ok_or_else(|| Status::invalid_argument("RunTask without task"))?;
        self.enqueue(AgentMessage::RunTask {
            framework,
            framework_id: req.framework_id,
            pid: req.pid,
            task,
        })
        .await
    }

    async fn kill_task(&self, request: Request<KillTaskMessage>) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::KillTask {
            framework_id: req.framework_id,
            task_id: req.task_id,
        })
        .await
    }

    async fn kill_framework(
        &self,
        request: Request<KillFrameworkMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::KillFramework {
            framework_id: req.framework_id,
        })
        .await
    }

    async fn framework_to_executor(
        &self,
        request: Request<FrameworkToExecutorMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::FrameworkToExecutor {
            slave_id: req.slave_id,
            framework_id: req.framework_id,
            executor_id: req.executor_id,
            data: req.data,
        })
        .await
    }

    async fn update_framework(
        &self,
        request: Request<UpdateFrameworkMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::UpdateFramework {
            framework_id: req.framework_id,
            pid: req.pid,
        })
        .await
    }

    async fn status_update_acknowledgement(
        &self,
        request: Request<StatusUpdateAcknowledgementMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::StatusUpdateAcknowledgement {
            slave_id: req.slave_id,
            framework_id: req.framework_id,
            task_id: req.task_id,
        })
        .await
    }

    async fn register_executor(
        &self,
        request: Request<RegisterExecutorMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::RegisterExecutor {
            framework_id: req.framework_id,
            executor_id: req.executor_id,
            pid: req.pid,
        })
        .await
    }

    async fn status_update(
        &self,
        request: Request<StatusUpdateMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        let update = req
            .update
            .ok_or_else(|| Status::invalid_argument("StatusUpdate without update"))?;
        self.enqueue(AgentMessage::StatusUpdate { update }).await
    }

    async fn executor_to_framework(
        &self,
        request: Request<ExecutorToFrameworkMessage>,
    ) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        self.enqueue(AgentMessage::ExecutorToFramework {
            slave_id: req.slave_id,
            framework_id: req.framework_id,
            executor_id: req.executor_id,
            data: req.data,
        })
        .await
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PongResponse>, Status> {
        Ok(Response::new(PongResponse {
            message: "PONG".to_string(),
        }))
    }
}

pub struct GrpcServer {
    addr: SocketAddr,
    tx: mpsc::Sender<AgentMessage>,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, tx: mpsc::Sender<AgentMessage>) -> Self {
        Self { addr, tx }
    }

    pub async fn run(self) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = %self.addr, "Starting agent message endpoint");

        Server::builder()
            .add_service(SlaveServiceServer::new(SlaveServiceImpl::new(self.tx)))
            .serve(self.addr)
            .await
    }
}
