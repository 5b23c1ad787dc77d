use strato_gpu::GpuError;
use thiserror::Error;

/// Error taxonomy surfaced by the translation layer.
///
/// Creation and map calls validate on the application thread and report
/// failures here; commands that have already been handed to the worker
/// thread cannot fail through this type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A descriptor or parameter failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request is valid but the layer does not support it.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A non-blocking map or query poll found the resource still busy.
    #[error("resource is still in use")]
    WouldBlock,

    /// Backend object creation failed.
    #[error("allocation failure: {0}")]
    AllocationFailure(#[from] GpuError),

    /// The operation exists in the legacy interface but has no
    /// translation.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        ApiError::InvalidArgument(msg.into())
    }
}
