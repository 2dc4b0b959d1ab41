// crates/locus-server/src/mcp/protocol.rs
// JSON-RPC 2.0 framing helpers (newline-delimited, UTF-8, one object/line)

use serde::Deserialize;
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// One inbound frame. A missing `id` makes it a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

pub fn response_ok(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn response_err(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_id_is_a_call() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.method, "tools/list");
        assert!(req.params.is_null());
    }

    #[test]
    fn request_without_id_is_a_notification() {
        let req: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/cancel","params":{"task_id":"t1"}}"#,
        )
        .unwrap();
        assert!(req.is_notification());
        assert_eq!(req.params["task_id"], "t1");
    }

    #[test]
    fn responses_echo_the_request_id() {
        let id = json!("abc-1");
        let ok = response_ok(&id, json!({"x": 1}));
        assert_eq!(ok["id"], "abc-1");
        assert_eq!(ok["jsonrpc"], "2.0");

        let err = response_err(&id, METHOD_NOT_FOUND, "no such method");
        assert_eq!(err["id"], "abc-1");
        assert_eq!(err["error"]["code"], METHOD_NOT_FOUND);
    }
}
