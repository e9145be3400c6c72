//! The in-process JSON-RPC bridge (spec §4.3): answers MCP tool/prompt/
//! resource methods on behalf of application-supplied handlers, with the
//! bridge itself holding a per-instance mutex so exactly one method is
//! in flight at a time (handlers may internally be concurrent; the bridge's
//! contract with its caller is strictly request/response).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
    JSONRPC_INTERNAL_ERROR,
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type ListToolsHandler = Arc<dyn Fn() -> BoxFuture<Vec<ToolDescriptor>> + Send + Sync>;
pub type CallToolHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<Result<Value, String>> + Send + Sync>;
pub type ListPromptsHandler = Arc<dyn Fn() -> BoxFuture<Vec<PromptDescriptor>> + Send + Sync>;
pub type GetPromptHandler =
    Arc<dyn Fn(String, Option<Value>) -> BoxFuture<Result<Value, String>> + Send + Sync>;
pub type ListResourcesHandler = Arc<dyn Fn() -> BoxFuture<Vec<ResourceDescriptor>> + Send + Sync>;
pub type ReadResourceHandler = Arc<dyn Fn(String) -> BoxFuture<Result<Value, String>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct McpServerHandlers {
    pub list_tools: Option<ListToolsHandler>,
    pub call_tool: Option<CallToolHandler>,
    pub list_prompts: Option<ListPromptsHandler>,
    pub get_prompt: Option<GetPromptHandler>,
    pub list_resources: Option<ListResourcesHandler>,
    pub read_resource: Option<ReadResourceHandler>,
}

/// A named in-process MCP server. Registered into the
/// [`crate::control::ControlProtocolHandler`]'s MCP Bridge Registry before
/// the transport starts, so inbound `mcp_message` requests are answerable
/// immediately (spec §3 "MCP Bridge Registry").
pub struct McpBridge {
    pub name: String,
    pub version: String,
    handlers: McpServerHandlers,
    /// Serializes dispatch: the bridge answers one method call at a time.
    in_flight: Mutex<()>,
}

impl McpBridge {
    pub fn new(name: impl Into<String>, version: impl Into<String>, handlers: McpServerHandlers) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            handlers,
            in_flight: Mutex::new(()),
        }
    }

    /// Answer one JSON-RPC request. Always returns a well-formed response,
    /// even for unknown methods or handler failures (spec §4.3 "Error shape").
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let _guard = self.in_flight.lock().await;
        let id = request.id.clone().unwrap_or(Value::Null);

        if request.method.starts_with("notifications/") {
            return JsonRpcResponse::success(id, Value::Null);
        }

        match request.method.as_str() {
            "initialize" => self.initialize(id),
            "tools/list" => self.tools_list(id).await,
            "tools/call" => self.tools_call(id, request.params).await,
            "prompts/list" => self.prompts_list(id).await,
            "prompts/get" => self.prompts_get(id, request.params).await,
            "resources/list" => self.resources_list(id).await,
            "resources/read" => self.resources_read(id, request.params).await,
            other => JsonRpcResponse::error(
                id,
                JSONRPC_INTERNAL_ERROR,
                format!("unknown method: {other}"),
            ),
        }
    }

    fn initialize(&self, id: Value) -> JsonRpcResponse {
        let mut capabilities = serde_json::Map::new();
        if self.handlers.list_tools.is_some() {
            capabilities.insert("tools".to_string(), json!({}));
        }
        if self.handlers.list_prompts.is_some() {
            capabilities.insert("prompts".to_string(), json!({}));
        }
        if self.handlers.list_resources.is_some() {
            capabilities.insert("resources".to_string(), json!({}));
        }

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": Value::Object(capabilities),
                "serverInfo": {"name": self.name, "version": self.version},
            }),
        )
    }

    async fn tools_list(&self, id: Value) -> JsonRpcResponse {
        match self.handlers.list_tools.as_ref() {
            Some(handler) => {
                let tools = handler().await;
                JsonRpcResponse::success(id, json!({"tools": tools}))
            }
            None => JsonRpcResponse::success(id, json!({"tools": []})),
        }
    }

    async fn tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(handler) = self.handlers.call_tool.as_ref() else {
            return JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, "tools/call not supported");
        };
        let params = params.unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match handler(name, arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(message) => JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, message),
        }
    }

    async fn prompts_list(&self, id: Value) -> JsonRpcResponse {
        match self.handlers.list_prompts.as_ref() {
            Some(handler) => {
                let prompts = handler().await;
                JsonRpcResponse::success(id, json!({"prompts": prompts}))
            }
            None => JsonRpcResponse::success(id, json!({"prompts": []})),
        }
    }

    async fn prompts_get(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(handler) = self.handlers.get_prompt.as_ref() else {
            return JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, "prompts/get not supported");
        };
        let params = params.unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arguments = params.get("arguments").cloned();

        match handler(name, arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(message) => JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, message),
        }
    }

    async fn resources_list(&self, id: Value) -> JsonRpcResponse {
        match self.handlers.list_resources.as_ref() {
            Some(handler) => {
                let resources = handler().await;
                JsonRpcResponse::success(id, json!({"resources": resources}))
            }
            None => JsonRpcResponse::success(id, json!({"resources": []})),
        }
    }

    async fn resources_read(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(handler) = self.handlers.read_resource.as_ref() else {
            return JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, "resources/read not supported");
        };
        let params = params.unwrap_or(Value::Null);
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match handler(uri).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(message) => JsonRpcResponse::error(id, JSONRPC_INTERNAL_ERROR, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_only_advertises_registered_capabilities() {
        let bridge = McpBridge::new(
            "test-server",
            "0.1.0",
            McpServerHandlers {
                list_tools: Some(Arc::new(|| Box::pin(async { vec![] }))),
                ..Default::default()
            },
        );
        let response = bridge.handle(request("initialize", None)).await;
        let result = response.result.unwrap();
        assert!(result["capabilities"].get("tools").is_some());
        assert!(result["capabilities"].get("prompts").is_none());
    }

    #[tokio::test]
    async fn unknown_method_returns_well_formed_error() {
        let bridge = McpBridge::new("s", "0.1.0", McpServerHandlers::default());
        let response = bridge.handle(request("bogus/method", None)).await;
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, JSONRPC_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn missing_handler_list_methods_return_empty() {
        let bridge = McpBridge::new("s", "0.1.0", McpServerHandlers::default());
        let response = bridge.handle(request("tools/list", None)).await;
        assert_eq!(response.result.unwrap()["tools"], json!([]));
    }

    #[tokio::test]
    async fn missing_handler_call_methods_return_internal_error() {
        let bridge = McpBridge::new("s", "0.1.0", McpServerHandlers::default());
        let response = bridge.handle(request("tools/call", None)).await;
        assert_eq!(response.error.unwrap().code, JSONRPC_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn tools_call_dispatches_name_and_arguments() {
        let bridge = McpBridge::new(
            "s",
            "0.1.0",
            McpServerHandlers {
                call_tool: Some(Arc::new(|name, args| {
                    Box::pin(async move { Ok(json!({"echo": name, "args": args})) })
                })),
                ..Default::default()
            },
        );
        let response = bridge
            .handle(request(
                "tools/call",
                Some(json!({"name": "Echo", "arguments": {"x": 1}})),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["echo"], "Echo");
        assert_eq!(result["args"]["x"], 1);
    }

    #[tokio::test]
    async fn notifications_are_acknowledged_silently() {
        let bridge = McpBridge::new("s", "0.1.0", McpServerHandlers::default());
        let response = bridge
            .handle(JsonRpcRequest {
                jsonrpc: Some("2.0".to_string()),
                id: None,
                method: "notifications/initialized".to_string(),
                params: None,
            })
            .await;
        assert!(response.error.is_none());
    }
}
