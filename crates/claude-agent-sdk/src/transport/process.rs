//! Process-lifecycle helpers adapted from the teacher's
//! `claude_code::process`/`codex::process` modules: spawn with busy-retry and
//! environment application. Unlike the teacher's one-shot path (which buffers
//! the whole of stdout/stderr into a `Vec<u8>`), our streaming transport
//! reads stdout line-by-line for the lifetime of the session, so only the
//! spawn and environment helpers are shared here.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::error::SdkError;

/// Spawn `command`, retrying a handful of times with capped exponential
/// backoff if the OS reports the binary as busy (common immediately after an
/// auto-updater rewrites it in place).
pub(crate) fn spawn_with_retry(
    command: &mut Command,
    binary: &Path,
) -> Result<tokio::process::Child, SdkError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(SdkError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }
    unreachable!("spawn_with_retry should return before exhausting retries")
}

pub(crate) fn apply_env(command: &mut Command, env: &BTreeMap<String, String>) {
    for (k, v) in env {
        command.env(k, v);
    }
}
