//! The bidirectional control-protocol handler (spec §4.4): owns the
//! Transport's raw record stream, correlates outbound control requests with
//! their responses, dispatches inbound control requests to application
//! callbacks, and performs the initialize handshake.
//!
//! Grounded on the teacher's `codex::mcp::jsonrpc::JsonRpcTransport`
//! pending-table/oneshot-channel correlation idiom, generalized from one
//! request kind to five outbound control-request subtypes plus three
//! inbound ones.

mod hooks;
mod pending;
mod permission;

pub use hooks::{
    HookCallback, HookConfig, HookContext, HookEvent, HookFuture, HookMatcher, HookMatcherConfig,
    HookOutput, HookRegistry,
};
pub use permission::{
    CanUseToolInput, PermissionCallback, PermissionFuture, PermissionResult, PermissionUpdate,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::error::SdkError;
use crate::message::{self, Message};
use crate::mcp::{JsonRpcRequest, McpBridgeRegistry};
use crate::transport::{Transport, TransportWriter};
use pending::PendingTable;

/// Minimum and default timeout for the initialize handshake and for
/// individual control requests (spec §5 "Timeouts").
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// `CLAUDE_CODE_STREAM_CLOSE_TIMEOUT` floor (spec §6).
const MIN_STREAM_CLOSE_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Created,
    Reading,
    Initialized,
    Closed,
}

/// Reads `CLAUDE_CODE_STREAM_CLOSE_TIMEOUT`, floored at 60 s (spec §6).
pub fn stream_close_timeout() -> Duration {
    match std::env::var("CLAUDE_CODE_STREAM_CLOSE_TIMEOUT") {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms.max(MIN_STREAM_CLOSE_TIMEOUT_MS)),
            Err(_) => DEFAULT_CONTROL_TIMEOUT,
        },
        Err(_) => DEFAULT_CONTROL_TIMEOUT,
    }
}

/// Owns one session's control plane: the pending-request table, the hook and
/// MCP-bridge registries, the optional permission callback, and the record
/// loop reading the transport.
pub struct ControlProtocolHandler {
    writer: TransportWriter,
    pending: PendingTable,
    hooks: HookRegistry,
    mcp_registry: McpBridgeRegistry,
    permission_callback: Option<PermissionCallback>,
    data_rx: Mutex<tokio::sync::mpsc::Receiver<Result<Message, SdkError>>>,
    first_result: Arc<AtomicBool>,
    first_result_notify: Arc<Notify>,
    server_info: Mutex<Option<Value>>,
    state: Mutex<HandlerState>,
    shutdown: Arc<Notify>,
    record_loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlProtocolHandler {
    /// Construct the handler around an already-spawned `Transport`. Does not
    /// start the record loop; call [`Self::start`] to enter `Reading`.
    pub fn new(
        transport: Transport,
        hooks: HookRegistry,
        mcp_registry: McpBridgeRegistry,
        permission_callback: Option<PermissionCallback>,
    ) -> Self {
        let writer = transport.writer();
        let (data_tx, data_rx) = tokio::sync::mpsc::channel(100);
        let pending = PendingTable::new();
        let first_result = Arc::new(AtomicBool::new(false));
        let first_result_notify = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        let handler = Self {
            writer,
            pending,
            hooks,
            mcp_registry,
            permission_callback,
            data_rx: Mutex::new(data_rx),
            first_result,
            first_result_notify,
            server_info: Mutex::new(None),
            state: Mutex::new(HandlerState::Created),
            shutdown,
            record_loop_task: Mutex::new(None),
        };
        handler.spawn_record_loop(transport, data_tx);
        handler
    }

    fn spawn_record_loop(
        &self,
        transport: Transport,
        data_tx: tokio::sync::mpsc::Sender<Result<Message, SdkError>>,
    ) {
        let pending = self.pending.clone();
        let hooks = self.hooks.clone();
        let mcp_registry = self.mcp_registry.clone();
        let permission_callback = self.permission_callback.clone();
        let first_result = self.first_result.clone();
        let first_result_notify = self.first_result_notify.clone();
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(record_loop(
            transport,
            pending,
            hooks,
            mcp_registry,
            permission_callback,
            data_tx,
            first_result,
            first_result_notify,
            shutdown,
        ));
        // record_loop_task is populated synchronously below by `start`.
        if let Ok(mut guard) = self.record_loop_task.try_lock() {
            *guard = Some(task);
        }
    }

    /// Transition `Created -> Reading`. A handler only leaves `Created` once.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if *state == HandlerState::Created {
            *state = HandlerState::Reading;
        }
    }

    async fn ensure_open(&self) -> Result<(), SdkError> {
        let state = self.state.lock().await;
        match *state {
            HandlerState::Closed => Err(SdkError::NotConnected),
            _ => Ok(()),
        }
    }

    /// Send the `initialize` control request carrying the hook configuration.
    /// Transitions `Reading -> Initialized` on success.
    pub async fn initialize(&self) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        let payload = json!({"hooks": self.hooks.wire_payload()});
        let result = self
            .send_control_request("initialize", payload, stream_close_timeout())
            .await?;
        *self.server_info.lock().await = Some(result.clone());
        let mut state = self.state.lock().await;
        if *state != HandlerState::Closed {
            *state = HandlerState::Initialized;
        }
        Ok(result)
    }

    pub async fn server_info(&self) -> Option<Value> {
        self.server_info.lock().await.clone()
    }

    /// Write a data-plane record (e.g. a user query) directly to the
    /// transport, bypassing the control-request correlation machinery.
    pub async fn write_data_record(&self, value: &Value) -> Result<(), SdkError> {
        self.ensure_open().await?;
        self.writer.write_line(value).await
    }

    /// Drain the next data-plane message, or `None` once the channel closes.
    pub async fn next_message(&self) -> Option<Result<Message, SdkError>> {
        self.data_rx.lock().await.recv().await
    }

    pub async fn interrupt(&self) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        self.send_control_request("interrupt", json!({}), DEFAULT_CONTROL_TIMEOUT)
            .await
    }

    pub async fn set_permission_mode(&self, mode: impl Into<String>) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        self.send_control_request(
            "set_permission_mode",
            json!({"mode": mode.into()}),
            DEFAULT_CONTROL_TIMEOUT,
        )
        .await
    }

    pub async fn set_model(&self, model: impl Into<String>) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        self.send_control_request(
            "set_model",
            json!({"model": model.into()}),
            DEFAULT_CONTROL_TIMEOUT,
        )
        .await
    }

    pub async fn rewind_files(&self, user_message_id: impl Into<String>) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        self.send_control_request(
            "rewind_files",
            json!({"user_message_id": user_message_id.into()}),
            DEFAULT_CONTROL_TIMEOUT,
        )
        .await
    }

    pub async fn mcp_status(&self) -> Result<Value, SdkError> {
        self.ensure_open().await?;
        self.send_control_request("mcp_status", json!({}), DEFAULT_CONTROL_TIMEOUT)
            .await
    }

    async fn send_control_request(
        &self,
        subtype: &str,
        mut payload: Value,
        timeout: Duration,
    ) -> Result<Value, SdkError> {
        let request_id = format!("req_{}", Uuid::new_v4());
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("subtype".to_string(), json!(subtype));
        }
        let record = json!({
            "type": "control_request",
            "request_id": &request_id,
            "request": payload,
        });

        let rx = self.pending.insert(request_id.clone()).await;
        self.writer.write_line(&record).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SdkError::ConnectionLost(
                "pending control request dropped".to_string(),
            )),
            Err(_) => {
                self.pending.evict(&request_id).await;
                Err(SdkError::Timeout {
                    subtype: subtype.to_string(),
                    request_id,
                    timeout,
                })
            }
        }
    }

    /// Whether a Result record has been observed yet (spec §3 invariant 3).
    pub fn first_result_reached(&self) -> bool {
        self.first_result.load(Ordering::SeqCst)
    }

    async fn wait_first_result(&self, timeout: Duration) {
        if self.first_result_reached() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.first_result_notify.notified()).await;
    }

    /// Close stdin, honoring the stdin-close gate (spec §4.4): if any hook or
    /// in-process MCP bridge is registered, wait (bounded) for the first
    /// Result record before closing, so control-request traffic arriving
    /// during generation is still answerable.
    pub async fn end_input_with_gate(&self) -> Result<(), SdkError> {
        let gate_needed =
            !self.hooks.is_empty() || !self.mcp_registry.is_empty() || self.permission_callback.is_some();
        if gate_needed {
            self.wait_first_result(DEFAULT_CONTROL_TIMEOUT).await;
        }
        self.writer.end_input().await
    }

    /// Stop the record loop and release the transport. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            *state = HandlerState::Closed;
        }
        self.shutdown.notify_one();
        if let Some(handle) = self.record_loop_task.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn record_loop(
    mut transport: Transport,
    pending: PendingTable,
    hooks: HookRegistry,
    mcp_registry: McpBridgeRegistry,
    permission_callback: Option<PermissionCallback>,
    data_tx: tokio::sync::mpsc::Sender<Result<Message, SdkError>>,
    first_result: Arc<AtomicBool>,
    first_result_notify: Arc<Notify>,
    shutdown: Arc<Notify>,
) {
    let writer = transport.writer();

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                pending.fail_all(|| SdkError::Cancelled).await;
                break;
            }
            record = transport.next_record() => {
                match record {
                    None => {
                        let reason = "record stream ended".to_string();
                        writer.poison(reason.clone()).await;
                        pending.fail_all(|| SdkError::ConnectionLost(reason.clone())).await;
                        break;
                    }
                    Some(Err(err)) => {
                        let reason = err.to_string();
                        writer.poison(reason.clone()).await;
                        let _ = data_tx.send(Err(err)).await;
                        pending.fail_all(|| SdkError::ConnectionLost(reason.clone())).await;
                        break;
                    }
                    Some(Ok(value)) => {
                        handle_record(
                            value,
                            &pending,
                            &hooks,
                            &mcp_registry,
                            &permission_callback,
                            &writer,
                            &data_tx,
                            &first_result,
                            &first_result_notify,
                        )
                        .await;
                    }
                }
            }
        }
    }

    let _ = transport.close().await;
}

#[allow(clippy::too_many_arguments)]
async fn handle_record(
    value: Value,
    pending: &PendingTable,
    hooks: &HookRegistry,
    mcp_registry: &McpBridgeRegistry,
    permission_callback: &Option<PermissionCallback>,
    writer: &TransportWriter,
    data_tx: &tokio::sync::mpsc::Sender<Result<Message, SdkError>>,
    first_result: &Arc<AtomicBool>,
    first_result_notify: &Arc<Notify>,
) {
    let record_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match record_type {
        "control_response" => handle_control_response(value, pending).await,
        "control_request" => {
            let writer = writer.clone();
            let hooks = hooks.clone();
            let mcp_registry = mcp_registry.clone();
            let permission_callback = permission_callback.clone();
            tokio::spawn(async move {
                dispatch_inbound_control_request(value, writer, hooks, mcp_registry, permission_callback)
                    .await;
            });
        }
        "control_cancel_request" => {
            // TODO(control_cancel_request): accepted and dropped; the
            // upstream protocol documents this as a known gap (spec §9).
        }
        _ => match message::parse_message(&value) {
            Ok(msg) => {
                if msg.is_result() {
                    first_result.store(true, Ordering::SeqCst);
                    first_result_notify.notify_one();
                }
                let _ = data_tx.send(Ok(msg)).await;
            }
            Err(err) => {
                let _ = data_tx.send(Err(err)).await;
            }
        },
    }
}

async fn handle_control_response(value: Value, pending: &PendingTable) {
    let Some(response) = value.get("response") else {
        return;
    };
    let Some(request_id) = response.get("request_id").and_then(Value::as_str) else {
        return;
    };

    match response.get("subtype").and_then(Value::as_str) {
        Some("success") => {
            let payload = response.get("response").cloned().unwrap_or(Value::Null);
            pending.complete(request_id, Ok(payload)).await;
        }
        _ => {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| "control request failed".to_string());
            pending.complete(request_id, Err(SdkError::Sdk(message))).await;
        }
    }
}

async fn dispatch_inbound_control_request(
    value: Value,
    writer: TransportWriter,
    hooks: HookRegistry,
    mcp_registry: McpBridgeRegistry,
    permission_callback: Option<PermissionCallback>,
) {
    let Some(request_id) = value
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_owned)
    else {
        warn!("control_request record missing request_id, dropping");
        return;
    };
    let request = value.get("request").cloned().unwrap_or(Value::Null);
    let subtype = request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match subtype.as_str() {
        "can_use_tool" => {
            handle_can_use_tool(&request_id, request, &permission_callback, &writer).await
        }
        "hook_callback" => handle_hook_callback(&request_id, request, &hooks, &writer).await,
        "mcp_message" => handle_mcp_message(&request_id, request, &mcp_registry, &writer).await,
        other => {
            write_control_response_error(
                &writer,
                &request_id,
                format!("unsupported control request subtype: {other}"),
            )
            .await;
        }
    }
}

async fn handle_can_use_tool(
    request_id: &str,
    request: Value,
    permission_callback: &Option<PermissionCallback>,
    writer: &TransportWriter,
) {
    let Some(callback) = permission_callback.clone() else {
        write_control_response_error(writer, request_id, "no permission callback registered".to_string())
            .await;
        return;
    };
    let input: CanUseToolInput = match serde_json::from_value(request) {
        Ok(input) => input,
        Err(err) => {
            write_control_response_error(
                writer,
                request_id,
                format!("malformed can_use_tool payload: {err}"),
            )
            .await;
            return;
        }
    };
    let result = callback(input).await;
    write_control_response_success(writer, request_id, result.to_wire()).await;
}

async fn handle_hook_callback(request_id: &str, request: Value, hooks: &HookRegistry, writer: &TransportWriter) {
    let Some(callback_id) = request.get("callback_id").and_then(Value::as_str) else {
        write_control_response_error(writer, request_id, "missing callback_id".to_string()).await;
        return;
    };
    let Some(callback) = hooks.get(callback_id) else {
        write_control_response_error(
            writer,
            request_id,
            format!("unknown hook callback: {callback_id}"),
        )
        .await;
        return;
    };
    let input = request.get("input").cloned().unwrap_or(Value::Null);
    let tool_use_id = request
        .get("tool_use_id")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let output = callback(input, HookContext { tool_use_id }).await;
    let wire = serde_json::to_value(output).unwrap_or(Value::Null);
    write_control_response_success(writer, request_id, wire).await;
}

async fn handle_mcp_message(
    request_id: &str,
    request: Value,
    mcp_registry: &McpBridgeRegistry,
    writer: &TransportWriter,
) {
    let server_name = request.get("server_name").and_then(Value::as_str).unwrap_or_default();
    let message = request.get("message").cloned().unwrap_or(Value::Null);
    let echoed_id = message.get("id").cloned().unwrap_or(Value::Null);

    let Some(bridge) = mcp_registry.get(server_name) else {
        let wrapped = json!({
            "mcp_response": {
                "jsonrpc": "2.0",
                "id": echoed_id,
                "error": {
                    "code": -32601,
                    "message": format!("SDK MCP server '{server_name}' not found"),
                },
            }
        });
        write_control_response_success(writer, request_id, wrapped).await;
        return;
    };

    let rpc_request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(req) => req,
        Err(err) => {
            write_control_response_error(writer, request_id, format!("malformed mcp message: {err}")).await;
            return;
        }
    };
    let response = bridge.handle(rpc_request).await;
    let wrapped = json!({"mcp_response": response});
    write_control_response_success(writer, request_id, wrapped).await;
}

async fn write_control_response_success(writer: &TransportWriter, request_id: &str, response: Value) {
    let record = json!({
        "type": "control_response",
        "response": {"subtype": "success", "request_id": request_id, "response": response},
    });
    if let Err(err) = writer.write_line(&record).await {
        warn!("failed to write control_response for {request_id}: {err}");
    }
}

async fn write_control_response_error(writer: &TransportWriter, request_id: &str, message: String) {
    let record = json!({
        "type": "control_response",
        "response": {"subtype": "error", "request_id": request_id, "error": message},
    });
    if let Err(err) = writer.write_line(&record).await {
        warn!("failed to write control_response for {request_id}: {err}");
    }
}
