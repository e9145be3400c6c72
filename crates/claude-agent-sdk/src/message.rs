//! The message parser (spec §4.1): decodes a raw, already-parsed JSON record
//! into one of five tagged [`Message`] variants. Pure and total — no I/O, no
//! partial success. Unknown content-block types fail the whole message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SdkError;

/// A typed content block inside a user/assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// `assistant.error` subtype, carried verbatim when the turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantErrorKind {
    AuthFailed,
    Billing,
    RateLimit,
    InvalidRequest,
    Server,
    Unknown,
}

/// The `content` payload of a [`Message::User`]: a plain string, or an array
/// that decodes element-by-element into [`ContentBlock`]s (spec §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One of the five top-level message variants described in spec §3.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User {
        content: UserContent,
        uuid: Option<String>,
        parent_tool_use_id: Option<String>,
    },
    Assistant {
        content: Vec<ContentBlock>,
        model: String,
        parent_tool_use_id: Option<String>,
        error: Option<AssistantErrorKind>,
    },
    System {
        subtype: String,
        data: Value,
    },
    Result {
        subtype: String,
        duration_ms: u64,
        duration_api_ms: u64,
        is_error: bool,
        num_turns: u64,
        session_id: String,
        total_cost_usd: Option<f64>,
        usage: Option<Value>,
        result: Option<Value>,
        structured_output: Option<Value>,
    },
    StreamEvent {
        uuid: String,
        session_id: String,
        event: Value,
        parent_tool_use_id: Option<String>,
    },
}

impl Message {
    /// Returns `true` for the terminal record of a response turn.
    pub fn is_result(&self) -> bool {
        matches!(self, Message::Result { .. })
    }
}

fn field<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record.get(key)
}

fn require<'a>(record: &'a Value, key: &str) -> Result<&'a Value, SdkError> {
    field(record, key).ok_or_else(|| SdkError::MessageParseError {
        raw: record.clone(),
    })
}

fn as_str(record: &Value, key: &str) -> Result<String, SdkError> {
    require(record, key)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| SdkError::MessageParseError {
            raw: record.clone(),
        })
}

fn opt_str(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn as_u64(record: &Value, key: &str) -> Result<u64, SdkError> {
    require(record, key)?
        .as_u64()
        .ok_or_else(|| SdkError::MessageParseError {
            raw: record.clone(),
        })
}

fn as_bool(record: &Value, key: &str) -> Result<bool, SdkError> {
    require(record, key)?
        .as_bool()
        .ok_or_else(|| SdkError::MessageParseError {
            raw: record.clone(),
        })
}

fn decode_content_blocks(record: &Value, value: &Value) -> Result<Vec<ContentBlock>, SdkError> {
    let array = value.as_array().ok_or_else(|| SdkError::MessageParseError {
        raw: record.clone(),
    })?;
    array
        .iter()
        .map(|block| {
            serde_json::from_value::<ContentBlock>(block.clone()).map_err(|_| {
                SdkError::MessageParseError {
                    raw: record.clone(),
                }
            })
        })
        .collect()
}

fn decode_assistant_error(record: &Value, message: &Value) -> Option<AssistantErrorKind> {
    message
        .get("error")
        .and_then(|e| e.get("type").or(Some(e)))
        .and_then(Value::as_str)
        .and_then(|kind| {
            serde_json::from_value(Value::String(kind.to_string())).ok()
        })
        .or_else(|| {
            let _ = record;
            None
        })
}

/// Decode one raw JSON record into a typed [`Message`].
///
/// Rejects records lacking `type`, records with an unrecognized `type`, and
/// records missing required fields for the detected variant. Total and pure.
pub fn parse_message(record: &Value) -> Result<Message, SdkError> {
    let ty = record
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SdkError::MessageParseError {
            raw: record.clone(),
        })?;

    match ty {
        "user" => {
            let message = require(record, "message")?;
            let content_value = require(message, "content")?;
            let content = match content_value {
                Value::Array(_) => UserContent::Blocks(decode_content_blocks(record, content_value)?),
                Value::String(text) => UserContent::Text(text.clone()),
                _ => return Err(SdkError::MessageParseError { raw: record.clone() }),
            };
            Ok(Message::User {
                content,
                uuid: opt_str(record, "uuid"),
                parent_tool_use_id: opt_str(record, "parent_tool_use_id"),
            })
        }
        "assistant" => {
            let message = require(record, "message")?;
            let content_value = require(message, "content")?;
            let content = decode_content_blocks(record, content_value)?;
            let model = as_str(message, "model")?;
            Ok(Message::Assistant {
                content,
                model,
                parent_tool_use_id: opt_str(record, "parent_tool_use_id"),
                error: decode_assistant_error(record, message),
            })
        }
        "system" => Ok(Message::System {
            subtype: as_str(record, "subtype")?,
            data: record.get("data").cloned().unwrap_or(Value::Null),
        }),
        "result" => Ok(Message::Result {
            subtype: as_str(record, "subtype")?,
            duration_ms: as_u64(record, "duration_ms")?,
            duration_api_ms: as_u64(record, "duration_api_ms")?,
            is_error: as_bool(record, "is_error")?,
            num_turns: as_u64(record, "num_turns")?,
            session_id: as_str(record, "session_id")?,
            total_cost_usd: record.get("total_cost_usd").and_then(Value::as_f64),
            usage: record.get("usage").cloned(),
            result: record.get("result").cloned(),
            structured_output: record.get("structured_output").cloned(),
        }),
        "stream_event" => Ok(Message::StreamEvent {
            uuid: as_str(record, "uuid")?,
            session_id: as_str(record, "session_id")?,
            event: record.get("event").cloned().unwrap_or(Value::Null),
            parent_tool_use_id: opt_str(record, "parent_tool_use_id"),
        }),
        _ => Err(SdkError::MessageParseError {
            raw: record.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_with_string_content() {
        let record = json!({
            "type": "user",
            "message": {"content": "hello there"},
        });
        match parse_message(&record).unwrap() {
            Message::User { content, .. } => {
                assert_eq!(content, UserContent::Text("hello there".to_string()));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn user_message_with_array_content_decodes_content_blocks() {
        let record = json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "text", "text": "here's the result:"},
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok", "is_error": false},
                ],
            },
        });
        match parse_message(&record).unwrap() {
            Message::User { content, .. } => match content {
                UserContent::Blocks(blocks) => {
                    assert_eq!(blocks.len(), 2);
                    assert_eq!(blocks[0], ContentBlock::Text { text: "here's the result:".into() });
                }
                other => panic!("expected decoded blocks, got {other:?}"),
            },
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_assistant_with_text_block() {
        let record = json!({
            "type": "assistant",
            "message": {
                "model": "claude-sonnet",
                "content": [{"type": "text", "text": "4"}],
            },
        });
        let message = parse_message(&record).unwrap();
        match message {
            Message::Assistant { content, model, .. } => {
                assert_eq!(model, "claude-sonnet");
                assert_eq!(content, vec![ContentBlock::Text { text: "4".into() }]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_result_record() {
        let record = json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 120,
            "duration_api_ms": 100,
            "is_error": false,
            "num_turns": 1,
            "session_id": "abc",
            "total_cost_usd": 0.0012,
        });
        let message = parse_message(&record).unwrap();
        assert!(message.is_result());
    }

    #[test]
    fn rejects_missing_type() {
        let record = json!({"subtype": "init"});
        assert!(matches!(
            parse_message(&record),
            Err(SdkError::MessageParseError { .. })
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        let record = json!({"type": "frobnicate"});
        assert!(parse_message(&record).is_err());
    }

    #[test]
    fn rejects_unknown_content_block() {
        let record = json!({
            "type": "assistant",
            "message": {
                "model": "x",
                "content": [{"type": "mystery"}],
            },
        });
        assert!(parse_message(&record).is_err());
    }

    #[test]
    fn tool_use_and_tool_result_round_trip() {
        let record = json!({
            "type": "assistant",
            "message": {
                "model": "x",
                "content": [
                    {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}},
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok", "is_error": false},
                ],
            },
        });
        let message = parse_message(&record).unwrap();
        match message {
            Message::Assistant { content, .. } => assert_eq!(content.len(), 2),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn system_init_carries_opaque_data() {
        let record = json!({
            "type": "system",
            "subtype": "init",
            "data": {"tools": ["Bash"], "commands": [], "agents": [], "plugins": []},
        });
        match parse_message(&record).unwrap() {
            Message::System { subtype, data } => {
                assert_eq!(subtype, "init");
                assert_eq!(data["tools"][0], "Bash");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn stream_event_passthrough() {
        let record = json!({
            "type": "stream_event",
            "uuid": "u1",
            "session_id": "s1",
            "event": {"type": "content_block_delta"},
        });
        assert!(matches!(
            parse_message(&record).unwrap(),
            Message::StreamEvent { .. }
        ));
    }
}
