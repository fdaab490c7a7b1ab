use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to get hostname: {0}")]
    Hostname(std::io::Error),

    #[error("Invalid resource specification: {0}")]
    ResourceParse(String),

    #[error("Re-registered with wrong slave ID (have {have}, got {got})")]
    SlaveIdMismatch { have: String, got: String },

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
