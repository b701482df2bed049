use std::path::PathBuf;

use serde::Serialize;

/// Failures raised by the collaborators the policy decorators wrap.
///
/// The decorators themselves never produce an error; whatever the wrapped
/// resolver or hasher returns is handed back to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An attached library name has no definition in the registry.
    #[error("asset library '{0}' is not defined")]
    UnknownLibrary(String),
    /// Reading an asset for hashing failed for a reason other than absence.
    #[error("failed to read asset '{locator}' at {}: {source}", .path.display())]
    HashRead {
        locator: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Library definitions could not be parsed.
    #[error("invalid library definitions: {0}")]
    InvalidLibraries(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structured error body returned by the HTTP service.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "asset_pipeline_failed", "internal_error")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const ASSET_PIPELINE_FAILED: &str = "asset_pipeline_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
