//! Async control-protocol multiplexer for driving the `claude` CLI as a
//! subprocess: NDJSON transport, a bidirectional control protocol
//! (permissions, hooks, MCP routing, mode/model changes), and an in-process
//! JSON-RPC bridge for tool/prompt/resource servers.

#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod env;
pub mod error;
pub mod mcp;
pub mod message;
pub mod query;
pub mod session;
pub mod transport;

pub use config::{ClaudeAgentOptions, TransportMode};
pub use control::{
    CanUseToolInput, HookCallback, HookConfig, HookContext, HookEvent, HookFuture, HookMatcher,
    HookOutput, HookRegistry, PermissionCallback, PermissionFuture, PermissionResult,
    PermissionUpdate,
};
pub use error::{SdkError, SdkResult};
pub use message::{AssistantErrorKind, ContentBlock, Message, UserContent};
pub use query::query;
pub use session::{InitialPrompt, SessionClient};

pub use mcp::{McpBridge, McpServerHandlers};
