//! Error types for the WebGPU backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WgpuError {
    #[error("No suitable WebGPU adapter found")]
    NoAdapter,

    #[error("Device request failed: {0}")]
    DeviceRequest(String),

    #[error("Buffer error: {0}")]
    Buffer(String),

    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
}

pub type Result<T> = std::result::Result<T, WgpuError>;

impl From<WgpuError> for dipola_solver::Error {
    fn from(err: WgpuError) -> Self {
        dipola_solver::Error::Device(err.to_string())
    }
}
