/*
 * Error Module
 *
 * Host failures are fatal at setup and propagated as-is during frames.
 * Nothing in the pipeline retries.
 */

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("allocating `{label}` ({bytes} bytes) failed: {reason}")]
    Allocation {
        label: &'static str,
        bytes: u64,
        reason: String,
    },
    #[error("kernel entry point `{0}` not found")]
    KernelNotFound(String),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
    #[error("no binding slot named `{0}`")]
    UnknownSlot(String),
    #[error("upload of {actual} bytes into `{label}` which holds {expected} bytes")]
    SizeMismatch {
        label: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("buffer `{0}` was used after release")]
    Released(&'static str),
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
    #[error("gpu backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("mesh has no submesh {0}")]
    MissingSubmesh(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
