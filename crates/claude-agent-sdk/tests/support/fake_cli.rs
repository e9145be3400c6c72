//! Builds a fake `claude` binary for integration tests: a small bash script
//! that shells out to python3 to emit canned NDJSON onto stdout, optionally
//! echoing stdin control frames back as control_response records.
//!
//! Mirrors the teacher's `write_fake_codex` pattern (a shell wrapper script
//! plus an embedded interpreter) rather than a compiled helper binary, so
//! there is nothing extra to build.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes a fake CLI that prints every line in `script` (already valid NDJSON,
/// one record per string) to stdout, then waits for stdin to close before
/// exiting. Used for the plain one-shot and streaming read paths.
pub fn write_scripted_cli(dir: &Path, lines: &[&str]) -> io::Result<PathBuf> {
    let path = dir.join("fake_claude.sh");
    let body = lines.join("\\n");
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
printf '{body}\n'
cat >/dev/null
"#,
        body = body
    );
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(path)
}

/// Writes a fake CLI that logs every NDJSON line it receives on stdin to
/// `log_path`, and for every `control_request` with the given `subtype`
/// answers immediately with a `control_response` success echoing the
/// request's payload back under `"echo"`. Used to exercise the control
/// protocol round trip without a real `claude` binary.
pub fn write_control_echo_cli(dir: &Path, log_path: &Path) -> io::Result<PathBuf> {
    let path = dir.join("fake_claude_control.sh");
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail

LOG_PATH="{log}"

python3 - "$LOG_PATH" <<'PY'
import json
import sys

log_path = sys.argv[1]

for raw in sys.stdin:
    raw = raw.strip()
    if not raw:
        continue
    with open(log_path, "a", encoding="utf-8") as handle:
        handle.write(raw)
        handle.write("\n")

    record = json.loads(raw)
    if record.get("type") == "control_request":
        response = {{
            "type": "control_response",
            "response": {{
                "subtype": "success",
                "request_id": record["request_id"],
                "response": {{"echo": record.get("request", {{}})}},
            }},
        }}
        print(json.dumps(response), flush=True)
PY
"#,
        log = log_path.display()
    );
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(path)
}

/// Writes a fake CLI that never terminates its first stdout line with a
/// newline until a second write, exercising NDJSON reassembly across
/// separate writes.
pub fn write_split_write_cli(dir: &Path, whole_line: &str) -> io::Result<PathBuf> {
    let path = dir.join("fake_claude_split.sh");
    let midpoint = whole_line.len() / 2;
    let (first, second) = whole_line.split_at(midpoint);
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
printf '%s' '{first}'
sleep 0.05
printf '%s\n' '{second}'
cat >/dev/null
"#,
        first = first,
        second = second
    );
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(path)
}

/// Writes a fake CLI that emits a single oversized, unterminated line that
/// never completes, to exercise the reassembly buffer's overflow guard.
pub fn write_oversized_line_cli(dir: &Path, total_bytes: usize) -> io::Result<PathBuf> {
    let path = dir.join("fake_claude_overflow.sh");
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
python3 -c "import sys; sys.stdout.write('x' * {total_bytes}); sys.stdout.flush()"
sleep 2
"#,
        total_bytes = total_bytes
    );
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(path)
}

/// Like [`write_control_echo_cli`] for the first control request (answers it
/// normally), then emits one oversized, unterminated garbage line on stdout
/// and keeps reading stdin without closing. Used to exercise the read-side
/// decode/overflow error poisoning a session's writes.
pub fn write_corrupting_control_cli(
    dir: &Path,
    log_path: &Path,
    garbage_bytes: usize,
) -> io::Result<PathBuf> {
    let path = dir.join("fake_claude_corrupt.sh");
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail

LOG_PATH="{log}"

python3 - "$LOG_PATH" {garbage_bytes} <<'PY'
import json
import sys

log_path = sys.argv[1]
garbage_bytes = int(sys.argv[2])
answered = False

for raw in sys.stdin:
    raw = raw.strip()
    if not raw:
        continue
    with open(log_path, "a", encoding="utf-8") as handle:
        handle.write(raw)
        handle.write("\n")

    record = json.loads(raw)
    if record.get("type") == "control_request" and not answered:
        response = {{
            "type": "control_response",
            "response": {{
                "subtype": "success",
                "request_id": record["request_id"],
                "response": {{"echo": record.get("request", {{}})}},
            }},
        }}
        print(json.dumps(response), flush=True)
        answered = True
        sys.stdout.write("x" * garbage_bytes)
        sys.stdout.flush()
PY
"#,
        log = log_path.display(),
        garbage_bytes = garbage_bytes
    );
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(path)
}

fn make_executable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}
