//! Binary discovery and version probing (spec §4.2 "Spawn").

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use semver::Version;
use tokio::process::Command;
use tokio::time;

use crate::error::SdkError;

const ENV_CLI_PATH: &str = "CLAUDE_CLI_PATH";
const ENV_SKIP_VERSION_CHECK: &str = "CLAUDE_AGENT_SDK_SKIP_VERSION_CHECK";
const MINIMUM_VERSION: (u64, u64, u64) = (1, 0, 0);
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolve the `claude` executable: explicit path → `CLAUDE_CLI_PATH` → PATH
/// search (via `which`, which also checks `.cmd`/`.exe` on Windows) → a fixed
/// list of common install locations.
pub fn resolve_binary(explicit: Option<&Path>) -> Result<PathBuf, SdkError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(SdkError::CliNotFound {
            attempted: path.to_path_buf(),
        });
    }

    if let Ok(path) = std::env::var(ENV_CLI_PATH) {
        if !path.trim().is_empty() {
            let candidate = PathBuf::from(&path);
            if candidate.is_file() {
                return Ok(candidate);
            }
            return Err(SdkError::CliNotFound {
                attempted: candidate,
            });
        }
    }

    if let Ok(found) = which::which("claude") {
        return Ok(found);
    }

    for candidate in common_install_locations() {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(SdkError::CliNotFound {
        attempted: PathBuf::from("claude"),
    })
}

fn common_install_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs_home() {
        locations.push(home.join(".claude").join("local").join("claude"));
        locations.push(home.join(".local").join("bin").join("claude"));
    }
    locations.push(PathBuf::from("/usr/local/bin/claude"));
    locations.push(PathBuf::from("/opt/homebrew/bin/claude"));
    locations
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Best-effort `-v` version probe. A mismatch or parse failure is a warning,
/// never an error, per spec §4.2.
pub async fn check_version(binary: &Path) {
    if std::env::var(ENV_SKIP_VERSION_CHECK).is_ok() {
        return;
    }

    let probe = Command::new(binary)
        .arg("-v")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    let output = match time::timeout(VERSION_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::warn!("version probe failed to spawn: {err}");
            return;
        }
        Err(_) => {
            tracing::warn!("version probe timed out after {VERSION_PROBE_TIMEOUT:?}");
            return;
        }
    };

    let raw = String::from_utf8_lossy(&output.stdout);
    let Some(found) = parse_version(&raw) else {
        tracing::warn!("could not parse claude version from {raw:?}");
        return;
    };

    let minimum = Version::new(MINIMUM_VERSION.0, MINIMUM_VERSION.1, MINIMUM_VERSION.2);
    if found < minimum {
        tracing::warn!("claude version {found} is older than the recommended minimum {minimum}");
    }
}

fn parse_version(raw: &str) -> Option<Version> {
    let token = raw.split_whitespace().find(|tok| tok.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))?;
    Version::parse(token.trim_start_matches('v')).ok()
}
