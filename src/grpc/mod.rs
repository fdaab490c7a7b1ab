pub mod outbound;
pub mod server;

pub use outbound::OutboundRouter;
pub use server::{GrpcServer, SlaveServiceImpl};
