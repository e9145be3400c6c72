//! The permission callback contract (spec §4.4 "can_use_tool").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct CanUseToolInput {
    pub tool_name: String,
    pub input: Value,
    #[serde(default)]
    pub permission_suggestions: Option<Value>,
}

/// A permission-configuration change carried on an `Allow` result (spec §9
/// "Permission update"). Only a subset of fields is populated for any given
/// `kind` (`addRules`/`replaceRules`/`removeRules` use `rules`, `setMode`
/// uses `mode`, `addDirectories`/`removeDirectories` use `directories`); this
/// is a flat DTO over the wire shape rather than a tagged union per kind, so
/// an unrecognized or future `kind` still round-trips losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl PermissionUpdate {
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).expect("PermissionUpdate always serializes")
    }

    pub fn from_dict(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// The application's decision for a single tool invocation.
#[derive(Debug, Clone)]
pub enum PermissionResult {
    Allow {
        updated_input: Option<Value>,
        updated_permissions: Option<PermissionUpdate>,
    },
    Deny {
        message: String,
        interrupt: bool,
    },
}

impl PermissionResult {
    pub fn allow() -> Self {
        PermissionResult::Allow {
            updated_input: None,
            updated_permissions: None,
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        PermissionResult::Deny {
            message: message.into(),
            interrupt: false,
        }
    }

    pub fn deny_and_interrupt(message: impl Into<String>) -> Self {
        PermissionResult::Deny {
            message: message.into(),
            interrupt: true,
        }
    }

    /// Serialize to the wire shape expected inside `control_response.response`.
    pub(crate) fn to_wire(&self) -> Value {
        match self {
            PermissionResult::Allow {
                updated_input,
                updated_permissions,
            } => {
                let mut obj = serde_json::json!({"behavior": "allow"});
                if let Some(input) = updated_input {
                    obj["updatedInput"] = input.clone();
                }
                if let Some(perms) = updated_permissions {
                    obj["updatedPermissions"] = perms.to_dict();
                }
                obj
            }
            PermissionResult::Deny { message, interrupt } => serde_json::json!({
                "behavior": "deny",
                "message": message,
                "interrupt": interrupt,
            }),
        }
    }
}

pub type PermissionFuture = Pin<Box<dyn Future<Output = PermissionResult> + Send>>;
pub type PermissionCallback = Arc<dyn Fn(CanUseToolInput) -> PermissionFuture + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_serializes_minimal_shape() {
        let wire = PermissionResult::allow().to_wire();
        assert_eq!(wire["behavior"], "allow");
        assert!(wire.get("updatedInput").is_none());
    }

    #[test]
    fn deny_with_interrupt_serializes_all_fields() {
        let wire = PermissionResult::deny_and_interrupt("no writes").to_wire();
        assert_eq!(wire["behavior"], "deny");
        assert_eq!(wire["message"], "no writes");
        assert_eq!(wire["interrupt"], true);
    }

    #[test]
    fn permission_update_round_trips_through_dict_for_every_kind() {
        let updates = [
            PermissionUpdate {
                kind: "addRules".to_string(),
                rules: Some(serde_json::json!([{"tool": "Bash", "ruleContent": "ls"}])),
                directories: None,
                mode: None,
                destination: Some("session".to_string()),
            },
            PermissionUpdate {
                kind: "setMode".to_string(),
                rules: None,
                directories: None,
                mode: Some("acceptEdits".to_string()),
                destination: Some("projectSettings".to_string()),
            },
            PermissionUpdate {
                kind: "addDirectories".to_string(),
                rules: None,
                directories: Some(vec!["/tmp/work".to_string()]),
                mode: None,
                destination: None,
            },
        ];

        for update in updates {
            let round_tripped = PermissionUpdate::from_dict(update.to_dict()).unwrap();
            assert_eq!(round_tripped, update);
        }
    }

    #[test]
    fn allow_carries_a_permission_update_through_to_wire() {
        let update = PermissionUpdate {
            kind: "setMode".to_string(),
            rules: None,
            directories: None,
            mode: Some("plan".to_string()),
            destination: Some("localSettings".to_string()),
        };
        let result = PermissionResult::Allow {
            updated_input: None,
            updated_permissions: Some(update),
        };
        let wire = result.to_wire();
        assert_eq!(wire["updatedPermissions"]["type"], "setMode");
        assert_eq!(wire["updatedPermissions"]["mode"], "plan");
        assert_eq!(wire["updatedPermissions"]["destination"], "localSettings");
        assert!(wire["updatedPermissions"].get("rules").is_none());
    }
}
