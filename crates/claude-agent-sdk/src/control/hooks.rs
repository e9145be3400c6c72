//! Hook configuration and the callback registry (spec §3 "Hook Callback
//! Registry", §4.4 "Initialization handshake" / "hook_callback").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The small, closed set of points a hook can attach to. A mapping from event
/// to matchers, not a class hierarchy (spec DESIGN NOTES §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Stop,
    SubagentStop,
    Notification,
    PreCompact,
}

/// One matcher entry sent during the initialize handshake: an optional
/// pattern, the callback ids it should invoke, and an optional timeout.
#[derive(Debug, Clone, Serialize)]
pub struct HookMatcherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    #[serde(rename = "hookCallbackIds")]
    pub hook_callback_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// The structured output a hook callback may return (spec §4.4
/// "hook_callback"). Every field is optional and unknown keys round-trip
/// through `extra` (spec DESIGN NOTES §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookOutput {
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    #[serde(rename = "suppressOutput", skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "systemMessage", skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(rename = "hookSpecificOutput", skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Value>,
    #[serde(rename = "async", skip_serializing_if = "Option::is_none")]
    pub async_: Option<bool>,
    #[serde(rename = "asyncTimeout", skip_serializing_if = "Option::is_none")]
    pub async_timeout: Option<u64>,
}

/// Context passed alongside the decoded hook input; room for a future
/// cancellation/signal handle (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub tool_use_id: Option<String>,
}

pub type HookFuture = Pin<Box<dyn Future<Output = HookOutput> + Send>>;
pub type HookCallback = Arc<dyn Fn(Value, HookContext) -> HookFuture + Send + Sync>;

/// A single configured matcher before callback ids are allocated.
pub struct HookMatcher {
    pub matcher: Option<String>,
    pub callbacks: Vec<HookCallback>,
    pub timeout: Option<Duration>,
}

/// Caller-supplied hook configuration, keyed by event.
#[derive(Default)]
pub struct HookConfig {
    pub matchers: HashMap<HookEvent, Vec<HookMatcher>>,
}

impl HookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, event: HookEvent, matcher: HookMatcher) -> Self {
        self.matchers.entry(event).or_default().push(matcher);
        self
    }
}

/// Immutable-after-handshake registry mapping opaque callback ids to their
/// callback functions, plus the matcher payload to send during `initialize`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    callbacks: Arc<HashMap<String, HookCallback>>,
    wire_matchers: Arc<HashMap<HookEvent, Vec<HookMatcherConfig>>>,
}

impl HookRegistry {
    /// Allocate callback ids for every matcher in `config`. IDs are assigned
    /// in registration order as `hook_0`, `hook_1`, ... across the whole
    /// config, matching the teacher's sequential-id idiom.
    pub fn build(config: HookConfig) -> Self {
        let mut callbacks = HashMap::new();
        let mut wire_matchers = HashMap::new();
        let mut next_id: usize = 0;

        for (event, matchers) in config.matchers {
            let mut wire_for_event = Vec::with_capacity(matchers.len());
            for matcher in matchers {
                let mut ids = Vec::with_capacity(matcher.callbacks.len());
                for callback in matcher.callbacks {
                    let id = format!("hook_{next_id}");
                    next_id += 1;
                    callbacks.insert(id.clone(), callback);
                    ids.push(id);
                }
                wire_for_event.push(HookMatcherConfig {
                    matcher: matcher.matcher,
                    hook_callback_ids: ids,
                    timeout: matcher.timeout,
                });
            }
            wire_matchers.insert(event, wire_for_event);
        }

        Self {
            callbacks: Arc::new(callbacks),
            wire_matchers: Arc::new(wire_matchers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn get(&self, callback_id: &str) -> Option<HookCallback> {
        self.callbacks.get(callback_id).cloned()
    }

    /// The `hooks` field of the `initialize` control request payload.
    pub fn wire_payload(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (event, matchers) in self.wire_matchers.iter() {
            let key = serde_json::to_value(event)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            obj.insert(key, serde_json::to_value(matchers).unwrap_or(Value::Null));
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callback() -> HookCallback {
        Arc::new(|_input, _ctx| Box::pin(async { HookOutput::default() }))
    }

    #[test]
    fn allocates_sequential_callback_ids_across_matchers() {
        let config = HookConfig::new().on(
            HookEvent::PreToolUse,
            HookMatcher {
                matcher: Some("Bash".to_string()),
                callbacks: vec![noop_callback(), noop_callback()],
                timeout: None,
            },
        );
        let registry = HookRegistry::build(config);
        assert!(registry.get("hook_0").is_some());
        assert!(registry.get("hook_1").is_some());
        assert!(registry.get("hook_2").is_none());

        let payload = registry.wire_payload();
        let ids = payload["PreToolUse"][0]["hookCallbackIds"].as_array().unwrap();
        assert_eq!(ids, &[Value::String("hook_0".into()), Value::String("hook_1".into())]);
    }

    #[test]
    fn empty_registry_reports_empty() {
        let registry = HookRegistry::build(HookConfig::new());
        assert!(registry.is_empty());
    }
}
