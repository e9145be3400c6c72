//! The Session Client (spec §4.5): a stateful façade composing the Transport
//! and Control-Protocol Handler (+ MCP bridges) behind `connect`/`query`/
//! `receive_*`/`interrupt`/`set_*`/`rewind_files`/`disconnect`.
//!
//! Grounded on the teacher's `ClaudeClient` (`crates/claude_code/src/client.rs`)
//! as the "thin facade wrapping process + argv assembly" shape, generalized
//! from a single `print()` call to a connected, bidirectional session.

use serde_json::json;

use crate::config::{ClaudeAgentOptions, TransportMode};
use crate::control::{ControlProtocolHandler, HookConfig, HookRegistry, PermissionCallback};
use crate::env;
use crate::error::SdkError;
use crate::mcp::{McpBridge, McpBridgeRegistry};
use crate::message::Message;
use crate::transport::{StderrSink, Transport};

/// The initial prompt shape for [`SessionClient::connect`].
#[derive(Debug, Clone, Default)]
pub enum InitialPrompt {
    /// Pure interactive mode: the caller drives every turn via `query`.
    #[default]
    None,
    /// A single initial prompt, sent as the first user record once the
    /// handshake completes.
    Text(String),
}

pub struct SessionClient {
    handler: ControlProtocolHandler,
}

impl SessionClient {
    /// Connect: spawn the transport in streaming mode, start every MCP
    /// bridge, register them with the handler, start the record loop, and
    /// perform the initialize handshake.
    ///
    /// Rejects a permission callback combined with a non-null initial prompt
    /// or with `options.permission_prompt_tool_name` (spec §4.5 — these modes
    /// are mutually exclusive).
    pub async fn connect(
        options: ClaudeAgentOptions,
        prompt: InitialPrompt,
        hooks: HookConfig,
        mcp_bridges: Vec<McpBridge>,
        permission_callback: Option<PermissionCallback>,
        stderr_sink: Option<StderrSink>,
    ) -> Result<Self, SdkError> {
        if permission_callback.is_some() {
            if matches!(prompt, InitialPrompt::Text(_)) {
                return Err(SdkError::Sdk(
                    "a permission callback cannot be combined with a non-null initial prompt"
                        .to_string(),
                ));
            }
            if options.permission_prompt_tool_name.is_some() {
                return Err(SdkError::Sdk(
                    "a permission callback cannot be combined with permission_prompt_tool_name"
                        .to_string(),
                ));
            }
        }

        env::init_observability("sdk-rust-client");
        if let Some(dir) = options.working_dir.as_ref() {
            env::set_pwd(dir);
        }

        let transport = Transport::spawn(&options, TransportMode::Streaming, None, stderr_sink).await?;
        let hook_registry = HookRegistry::build(hooks);
        let mcp_registry = McpBridgeRegistry::new(mcp_bridges);

        let handler = ControlProtocolHandler::new(transport, hook_registry, mcp_registry, permission_callback);
        handler.start().await;
        handler.initialize().await?;

        let client = Self { handler };

        if let InitialPrompt::Text(text) = prompt {
            client.query(&text, None).await?;
        }

        Ok(client)
    }

    /// Write one user record: `{type:"user", message:{role:"user", content},
    /// parent_tool_use_id:null, session_id?}` (spec §4.5).
    pub async fn query(&self, text: &str, session_id: Option<&str>) -> Result<(), SdkError> {
        let mut record = json!({
            "type": "user",
            "message": {"role": "user", "content": text},
            "parent_tool_use_id": serde_json::Value::Null,
        });
        if let Some(session_id) = session_id {
            record["session_id"] = json!(session_id);
        }
        self.handler.write_data_record(&record).await
    }

    /// Pull the next message off the data channel, or `None` at EOF.
    pub async fn next_message(&self) -> Option<Result<Message, SdkError>> {
        self.handler.next_message().await
    }

    /// Drain the data channel until it closes.
    pub async fn receive_messages(&self) -> Vec<Result<Message, SdkError>> {
        let mut out = Vec::new();
        while let Some(item) = self.handler.next_message().await {
            out.push(item);
        }
        out
    }

    /// Drain the data channel, stopping after (and including) the first
    /// Result record.
    pub async fn receive_response(&self) -> Vec<Result<Message, SdkError>> {
        let mut out = Vec::new();
        while let Some(item) = self.handler.next_message().await {
            let is_result = matches!(item, Ok(ref m) if m.is_result());
            out.push(item);
            if is_result {
                break;
            }
        }
        out
    }

    pub async fn interrupt(&self) -> Result<(), SdkError> {
        self.handler.interrupt().await.map(|_| ())
    }

    pub async fn set_permission_mode(&self, mode: impl Into<String>) -> Result<(), SdkError> {
        self.handler.set_permission_mode(mode).await.map(|_| ())
    }

    pub async fn set_model(&self, model: impl Into<String>) -> Result<(), SdkError> {
        self.handler.set_model(model).await.map(|_| ())
    }

    pub async fn rewind_files(&self, user_message_id: impl Into<String>) -> Result<(), SdkError> {
        self.handler.rewind_files(user_message_id).await.map(|_| ())
    }

    pub async fn get_mcp_status(&self) -> Result<serde_json::Value, SdkError> {
        self.handler.mcp_status().await
    }

    pub async fn server_info(&self) -> Option<serde_json::Value> {
        self.handler.server_info().await
    }

    /// Close the handler, which gates stdin on the first-result latch and
    /// then tears down the transport.
    pub async fn disconnect(&self) {
        let _ = self.handler.end_input_with_gate().await;
        self.handler.close().await;
    }
}
