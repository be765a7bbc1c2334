use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub type CallId = u64;

/// Positional arguments for a remote method, carried as JSON. `Null` stands
/// for "no arguments".
pub type RpcArgs = serde_json::Value;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// A single RPC invocation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: CallId,
    pub method: String,
    pub args: RpcArgs,
}

impl Request {
    /// Creates a request with a fresh process-wide id.
    pub fn new(method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            method: method.into(),
            args,
        }
    }
}

/// The reply to a [`Request`].
///
/// `ok == false` means the remote procedure ran and reported a business
/// failure; the connection that carried the reply is still usable. A void
/// method replies with `ok == true` and no `result`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: CallId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(id: CallId, result: serde_json::Value) -> Self {
        Response {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: CallId, error: impl Into<String>) -> Self {
        Response {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_ids_are_unique() {
        let a = Request::new("echo", json!(1));
        let b = Request::new("echo", json!(1));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn failure_response_carries_no_result() {
        let response = Response::failure(7, "nope");
        assert!(!response.ok);
        assert_eq!(response.result, None);
        assert_eq!(response.error.as_deref(), Some("nope"));
    }

    #[test]
    fn void_success_deserializes_without_result() {
        let raw = r#"{"id":3,"ok":true}"#;
        let response: Response = serde_json::from_str(raw).unwrap();
        assert!(response.ok);
        assert_eq!(response.result, None);
        assert_eq!(response.error, None);
    }
}
