//! The subprocess transport (spec §4.2): owns the child process end-to-end.

mod discovery;
mod framing;
mod process;

pub use discovery::{check_version, resolve_binary};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{ClaudeAgentOptions, TransportMode};
use crate::error::SdkError;
use framing::{Reassembler, Step};

/// A stderr line sink. Exceptions from the callback are swallowed per spec §4.2.
pub type StderrSink = Arc<dyn Fn(String) + Send + Sync>;

/// The stdin half is boxed behind `AsyncWrite` so tests can substitute an
/// in-memory pipe for a real `ChildStdin` (see `control` module tests).
type DynWriter = Box<dyn AsyncWrite + Unpin + Send>;

struct WriteState {
    stdin: Option<DynWriter>,
    closed: bool,
    poisoned: Option<String>,
}

async fn write_line_locked(state: &Mutex<WriteState>, value: &Value) -> Result<(), SdkError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut guard = state.lock().await;
    if let Some(reason) = guard.poisoned.clone() {
        return Err(SdkError::ConnectionLost(reason));
    }
    if guard.closed {
        return Err(SdkError::NotConnected);
    }
    let Some(stdin) = guard.stdin.as_mut() else {
        return Err(SdkError::NotConnected);
    };
    if let Err(err) = stdin.write_all(line.as_bytes()).await {
        guard.poisoned = Some(err.to_string());
        return Err(SdkError::StdinWrite(err));
    }
    if let Err(err) = stdin.flush().await {
        guard.poisoned = Some(err.to_string());
        return Err(SdkError::StdinWrite(err));
    }
    Ok(())
}

async fn end_input_locked(state: &Mutex<WriteState>) -> Result<(), SdkError> {
    let mut guard = state.lock().await;
    if guard.closed {
        return Ok(());
    }
    if let Some(mut stdin) = guard.stdin.take() {
        let _ = stdin.shutdown().await;
    }
    guard.closed = true;
    Ok(())
}

/// A cheap, cloneable handle onto the transport's stdin. The
/// Control-Protocol Handler hands clones of this to spawned inbound-request
/// dispatch tasks so they can write a correlated response without needing
/// access to the rest of the transport (spec §4.4 "write mutex").
#[derive(Clone)]
pub struct TransportWriter {
    write_state: Arc<Mutex<WriteState>>,
}

impl TransportWriter {
    pub async fn write_line(&self, value: &Value) -> Result<(), SdkError> {
        write_line_locked(&self.write_state, value).await
    }

    pub async fn end_input(&self) -> Result<(), SdkError> {
        end_input_locked(&self.write_state).await
    }

    /// Mark the write side as broken: any further write surfaces
    /// `SdkError::ConnectionLost(reason)` rather than `NotConnected`, even
    /// before the transport's own teardown runs (spec §8 boundary scenario
    /// 3 — a decode/overflow error on the read side must poison writes too).
    pub async fn poison(&self, reason: impl Into<String>) {
        let mut guard = self.write_state.lock().await;
        guard.poisoned = Some(reason.into());
    }

    /// Build a writer over an arbitrary in-memory pipe, for tests in sibling
    /// modules (e.g. `control`) that need a `TransportWriter` without a real
    /// child process.
    #[cfg(test)]
    pub(crate) fn for_test(stdin: impl AsyncWrite + Unpin + Send + 'static) -> Self {
        Self {
            write_state: Arc::new(Mutex::new(WriteState {
                stdin: Some(Box::new(stdin) as DynWriter),
                closed: false,
                poisoned: None,
            })),
        }
    }
}

/// Owns the `claude` child process: stdin (behind a write mutex), the
/// record stream out of stdout, and the optional stderr fan-out.
pub struct Transport {
    writer: TransportWriter,
    records: mpsc::Receiver<Result<Value, SdkError>>,
    child: Arc<Mutex<Option<Child>>>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    closed: AtomicBool,
    spilled_agents_file: Option<PathBuf>,
}

impl Transport {
    /// Spawn `claude` in one-shot (`--print`) or streaming mode per spec §4.2.
    pub async fn spawn(
        options: &ClaudeAgentOptions,
        mode: TransportMode,
        prompt: Option<&str>,
        stderr_sink: Option<StderrSink>,
    ) -> Result<Self, SdkError> {
        let binary = resolve_binary(options.binary.as_deref())?;
        check_version(&binary).await;

        if let Some(dir) = options.working_dir.as_ref() {
            if !dir.is_dir() {
                return Err(SdkError::WorkingDirectoryNotFound(dir.clone()));
            }
        }

        let (argv, spilled_agents_file) = options.to_argv(mode, prompt);

        let mut command = Command::new(&binary);
        command.args(&argv);
        if let Some(dir) = options.working_dir.as_ref() {
            command.current_dir(dir);
        }
        process::apply_env(&mut command, &options.env);
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = process::spawn_with_retry(&mut command, &binary)?;

        let stdout = child.stdout.take().ok_or(SdkError::ConnectionLost(
            "child stdout unavailable".to_string(),
        ))?;
        let stdin = child.stdin.take().ok_or(SdkError::ConnectionLost(
            "child stdin unavailable".to_string(),
        ))?;
        let stderr = child.stderr.take();

        let (record_tx, record_rx) = mpsc::channel(100);
        let reader_task = tokio::spawn(reader_loop(stdout, record_tx, options.max_buffer_bytes));

        let stderr_task = stderr.map(|stderr| tokio::spawn(stderr_loop(stderr, stderr_sink)));

        let mut write_state = WriteState {
            stdin: Some(Box::new(stdin) as DynWriter),
            closed: false,
            poisoned: None,
        };
        if mode == TransportMode::OneShot {
            if let Some(mut s) = write_state.stdin.take() {
                let _ = s.shutdown().await;
            }
            write_state.closed = true;
        }

        Ok(Self {
            writer: TransportWriter {
                write_state: Arc::new(Mutex::new(write_state)),
            },
            records: record_rx,
            child: Arc::new(Mutex::new(Some(child))),
            reader_task: Some(reader_task),
            stderr_task,
            closed: AtomicBool::new(false),
            spilled_agents_file,
        })
    }

    /// A cloneable writer handle, for callers that need to hold write access
    /// independently of the owning `Transport` (e.g. a moved-into-task record
    /// loop that must still answer inbound control requests concurrently).
    pub fn writer(&self) -> TransportWriter {
        self.writer.clone()
    }

    /// Pull the next raw record off the stream. Returns `None` at EOF.
    pub async fn next_record(&mut self) -> Option<Result<Value, SdkError>> {
        self.records.recv().await
    }

    /// Write one JSON value to stdin, newline-terminated, under the write lock.
    pub async fn write_line(&self, value: &Value) -> Result<(), SdkError> {
        self.writer.write_line(value).await
    }

    /// Close stdin. A closed stdin may not be reopened.
    pub async fn end_input(&self) -> Result<(), SdkError> {
        self.writer.end_input().await
    }

    /// Tear everything down: cancel the stderr task, close stdin, terminate
    /// the process if still alive, delete any spilled temp files.
    pub async fn close(&mut self) -> Result<(), SdkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
        let _ = self.end_input().await;

        if let Some(handle) = self.reader_task.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.start_kill();
            }
            let _ = child.wait().await;
        }
        drop(child_guard);

        if let Some(path) = self.spilled_agents_file.take() {
            let _ = std::fs::remove_file(path);
        }

        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
        if let Some(path) = self.spilled_agents_file.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

async fn reader_loop(
    stdout: ChildStdout,
    tx: mpsc::Sender<Result<Value, SdkError>>,
    max_buffer_bytes: usize,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut reassembler = Reassembler::new(max_buffer_bytes);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match reassembler.push_line(&line) {
                Ok(Step::Empty) | Ok(Step::Pending) => continue,
                Ok(Step::Decoded(value)) => {
                    if tx.send(Ok(value)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("NDJSON decode error: {err}");
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            },
            Ok(None) => {
                if let Some(value) = reassembler.finish() {
                    let _ = tx.send(Ok(value)).await;
                }
                debug!("claude stdout reached EOF");
                return;
            }
            Err(err) => {
                let _ = tx
                    .send(Err(SdkError::ConnectionLost(err.to_string())))
                    .await;
                return;
            }
        }
    }
}

async fn stderr_loop(stderr: ChildStderr, sink: Option<StderrSink>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(sink) = sink.as_ref() {
            sink(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_serializes_value_as_newline_terminated_json() {
        let (client, mut server) = tokio::io::duplex(4096);
        let write_state = Arc::new(Mutex::new(WriteState {
            stdin: Some(Box::new(client) as DynWriter),
            closed: false,
            poisoned: None,
        }));
        let writer = TransportWriter { write_state };

        writer
            .write_line(&serde_json::json!({"type": "user"}))
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        use tokio::io::AsyncReadExt;
        let n = server.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert_eq!(text, "{\"type\":\"user\"}\n");
    }

    #[tokio::test]
    async fn write_after_end_input_is_not_connected() {
        let (client, _server) = tokio::io::duplex(4096);
        let write_state = Arc::new(Mutex::new(WriteState {
            stdin: Some(Box::new(client) as DynWriter),
            closed: false,
            poisoned: None,
        }));
        let writer = TransportWriter { write_state };
        writer.end_input().await.unwrap();
        let err = writer
            .write_line(&serde_json::json!({"type": "user"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::NotConnected));
    }
}
