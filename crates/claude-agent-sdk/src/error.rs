use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Flat error taxonomy for the whole crate (see spec §7). Deliberately not a
/// hierarchy: every distinguishing field lives directly on the variant that
/// needs it.
#[derive(Debug, Error)]
pub enum SdkError {
    /// General failure with a human message; the catch-all base case.
    #[error("{0}")]
    Sdk(String),

    /// Unable to reach or communicate with the CLI process.
    #[error("lost connection to the claude process: {0}")]
    ConnectionLost(String),

    /// The `claude` executable could not be resolved.
    #[error("claude executable not found (attempted: {attempted})")]
    CliNotFound { attempted: PathBuf },

    /// The working directory configured for the subprocess does not exist.
    #[error("working directory does not exist: {0}")]
    WorkingDirectoryNotFound(PathBuf),

    /// The process exited with a nonzero code before the stdout stream hit EOF.
    #[error("claude process exited with status {exit_code}")]
    ProcessFailed {
        exit_code: i32,
        stderr: String,
    },

    /// The reassembly buffer exceeded its configured limit before a value
    /// decoded (spec §4.2 "NDJSON framing", §8 invariant 3/4).
    #[error("NDJSON buffer exceeded limit ({buffer_size} > {limit} bytes)")]
    DecodeError { buffer_size: usize, limit: usize },

    /// Well-formed JSON but an unrecognized message shape.
    #[error("unrecognized message record")]
    MessageParseError { raw: Value },

    /// A control request was not answered within its timeout.
    #[error("control request {subtype} ({request_id}) timed out after {timeout:?}")]
    Timeout {
        subtype: String,
        request_id: String,
        timeout: Duration,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A handler/session method was invoked after `close()`.
    #[error("session is not connected")]
    NotConnected,

    /// Writing to stdin failed.
    #[error("failed writing to claude stdin: {0}")]
    StdinWrite(#[source] std::io::Error),

    /// Spawning the subprocess failed outright (not a `CliNotFound` case).
    #[error("failed to spawn claude process (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied callback (permission, hook, MCP handler) is missing.
    #[error("no {kind} callback registered")]
    CallbackMissing { kind: &'static str },

    /// `serde_json` failed to serialize an outbound payload.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
