// crates/locus-types/src/frames.rs
// WebSocket frame types for the downstream client protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionStatus;

/// Frames sent by the broker to an interactive client.
///
/// One JSON object per text frame, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Ask the client to execute a tool and reply with a matching `ToolResult`.
    ToolCall {
        call_id: u64,
        tool: String,
        args: Value,
    },
    /// Best-effort cancellation of an in-flight `ToolCall`.
    Cancel { call_id: u64 },
    /// Fire-and-forget broadcast event (no reply expected).
    Event { event: String, payload: Value },
}

/// Frames sent by an interactive client to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame after connect: advertise the tool names this client can run.
    Hello {
        #[serde(default)]
        capabilities: Vec<String>,
    },
    /// Push an opaque snapshot of the client's UI state.
    StateUpdate { snapshot: Value },
    /// Reply to a `ToolCall`, correlated by `call_id`.
    ToolResult {
        call_id: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Progress report for a staged action being committed client-side.
    ActionProgress {
        action_id: String,
        status: ActionStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_round_trip() {
        let frame = ServerFrame::ToolCall {
            call_id: 7,
            tool: "navigate_to_position".to_string(),
            args: json!({"chromosome": "chr1", "start": 1000, "end": 2000}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"type\":\"tool_call\""));
        assert!(text.contains("\"call_id\":7"));

        let back: ServerFrame = serde_json::from_str(&text).unwrap();
        match back {
            ServerFrame::ToolCall { call_id, tool, .. } => {
                assert_eq!(call_id, 7);
                assert_eq!(tool, "navigate_to_position");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn hello_defaults_capabilities() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"hello"}"#).unwrap();
        match frame {
            ClientFrame::Hello { capabilities } => assert!(capabilities.is_empty()),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn tool_result_error_shape() {
        let text = r#"{"type":"tool_result","call_id":3,"ok":false,"error":"out of range"}"#;
        let frame: ClientFrame = serde_json::from_str(text).unwrap();
        match frame {
            ClientFrame::ToolResult {
                call_id,
                ok,
                data,
                error,
            } => {
                assert_eq!(call_id, 3);
                assert!(!ok);
                assert!(data.is_none());
                assert_eq!(error.as_deref(), Some("out of range"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = serde_json::from_str::<ClientFrame>(r#"{"call_id":1,"ok":true}"#);
        assert!(err.is_err());
    }
}
