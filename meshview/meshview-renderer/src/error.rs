//! Error taxonomy. Setup errors are fatal and surface before `setup` returns;
//! draw-time errors drop the current frame only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Malformed or missing mandatory pipeline JSON field, or a malformed
    /// mesh asset.
    #[error("config error: {0}")]
    Config(String),

    /// Two jobs, attachments, or shader resources claim the same name.
    #[error("duplicate resource name {name:?}")]
    DuplicateResource { name: String },

    /// An input attachment names a parent job or output that does not exist.
    #[error("job {job:?}: cannot resolve input {attachment:?} against parent {parent:?}")]
    UnresolvedAttachment {
        job: String,
        attachment: String,
        parent: String,
    },

    /// Shader compilation or pipeline creation rejected by the backend.
    #[error("job {job:?}: pipeline build failed: {reason}")]
    PipelineBuild { job: String, reason: String },

    /// Async buffer mapping failed or was cancelled. Non-fatal; the previous
    /// selection result is retained.
    #[error("selection read-back failed: {0}")]
    Readback(String),

    /// Command submission or presentation rejected. Non-fatal for one frame.
    #[error("command submission failed: {0}")]
    GpuSubmit(String),

    /// Blob loader failure, propagated upward unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        RenderError::Config(message.into())
    }

    pub(crate) fn duplicate(name: &str) -> Self {
        RenderError::DuplicateResource {
            name: name.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
