pub mod agent;
pub mod config;
pub mod detector;
pub mod error;
pub mod grpc;
pub mod http;
pub mod isolation;
pub mod messages;
pub mod resources;
pub mod slave;
pub mod state;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("drover");
}
