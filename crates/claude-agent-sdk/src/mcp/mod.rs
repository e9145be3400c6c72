//! In-process MCP bridges: named JSON-RPC servers the control-protocol
//! handler can route `mcp_message` requests to without a real subprocess
//! (spec §3 "MCP Bridge Registry", §4.3).

mod bridge;
mod protocol;

pub use bridge::{
    CallToolHandler, GetPromptHandler, ListPromptsHandler, ListResourcesHandler,
    ListToolsHandler, McpBridge, McpServerHandlers, ReadResourceHandler,
};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptDescriptor, ResourceDescriptor,
    ToolDescriptor,
};

use std::collections::HashMap;
use std::sync::Arc;

/// Maps server name to bridge instance, looked up by the control-protocol
/// handler on each inbound `mcp_message` (spec §4.4).
#[derive(Clone, Default)]
pub struct McpBridgeRegistry {
    bridges: Arc<HashMap<String, Arc<McpBridge>>>,
}

impl McpBridgeRegistry {
    pub fn new(bridges: Vec<McpBridge>) -> Self {
        let map = bridges
            .into_iter()
            .map(|bridge| (bridge.name.clone(), Arc::new(bridge)))
            .collect();
        Self {
            bridges: Arc::new(map),
        }
    }

    pub fn get(&self, server_name: &str) -> Option<Arc<McpBridge>> {
        self.bridges.get(server_name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}
