//! JSON-RPC framing over the server's stdio.
//!
//! Every message is a JSON body preceded by a `Content-Length` header and
//! a blank line.
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::LspError;

/// JSON-RPC code for a method the client does not implement.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Monotonic request ids for one session.
#[derive(Debug)]
pub struct RequestIds(AtomicI64);

impl RequestIds {
    /// Ids start at 1.
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    /// Take the next id.
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessage {
    /// A request (has id and method).
    Request {
        /// The request ID.
        id: i64,
        /// The method name.
        method: String,
        /// The params (JSON value).
        params: serde_json::Value,
    },
    /// A response (has id, may have result or error).
    Response {
        /// The request ID this responds to.
        id: i64,
        /// The result (if successful).
        result: Option<serde_json::Value>,
        /// The error (if failed).
        error: Option<RpcError>,
    },
    /// A notification (has method, no id).
    Notification {
        /// The method name.
        method: String,
        /// The params.
        params: serde_json::Value,
    },
}

/// The error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// The error code.
    pub code: i32,
    /// The error message.
    pub message: String,
}

impl RpcError {
    /// `-32601` for `method`.
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("unhandled method: {method}"),
        }
    }
}

/// Prefix `body` with its `Content-Length` header.
pub fn frame_message(body: &str) -> Vec<u8> {
    let mut bytes = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

/// Encode a request.
pub fn serialize_request(id: i64, method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
    .to_string()
}

/// Encode a notification.
pub fn serialize_notification(method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
    .to_string()
}

/// Encode a successful reply to a server request.
pub fn serialize_response(id: i64, result: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Encode an error reply to a server request.
pub fn serialize_error_response(id: i64, error: &RpcError) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
    .to_string()
}

/// Find the `Content-Length` value among header lines.
pub fn parse_content_length(header: &str) -> Result<usize, LspError> {
    let value = header
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim())
        })
        .ok_or_else(|| LspError::InvalidMessage("missing Content-Length header".into()))?;
    value
        .parse::<usize>()
        .map_err(|_| LspError::InvalidMessage(format!("invalid Content-Length: {value}")))
}

/// Decode one JSON-RPC body.
pub fn parse_message(json_str: &str) -> Result<JsonRpcMessage, LspError> {
    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| LspError::Serialization(format!("invalid JSON: {e}")))?;

    let id = match value.get("id") {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => Some(
            raw.as_i64()
                .ok_or_else(|| LspError::InvalidMessage("id must be an integer".into()))?,
        ),
    };
    let method = match value.get("method") {
        None => None,
        Some(raw) => Some(
            raw.as_str()
                .ok_or_else(|| LspError::InvalidMessage("method must be a string".into()))?
                .to_string(),
        ),
    };
    let params = || {
        value
            .get("params")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    };

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessage::Request {
            id,
            method,
            params: params(),
        }),
        (Some(id), None) => {
            let error = value.get("error").and_then(|e| {
                Some(RpcError {
                    code: i32::try_from(e.get("code")?.as_i64()?).ok()?,
                    message: e.get("message")?.as_str()?.to_string(),
                })
            });
            Ok(JsonRpcMessage::Response {
                id,
                result: value.get("result").cloned(),
                error,
            })
        }
        (None, Some(method)) => Ok(JsonRpcMessage::Notification {
            method,
            params: params(),
        }),
        (None, None) => Err(LspError::InvalidMessage(
            "message has neither id nor method".into(),
        )),
    }
}

/// Read one framed body from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream before a header starts.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, LspError>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return if header.trim().is_empty() {
                Ok(None)
            } else {
                Err(LspError::InvalidMessage("stream ended inside a header".into()))
            };
        }
        if line.trim().is_empty() {
            if header.trim().is_empty() {
                continue;
            }
            break;
        }
        header.push_str(&line);
    }

    let length = parse_content_length(&header)?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    String::from_utf8(body)
        .map(Some)
        .map_err(|_| LspError::InvalidMessage("body is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotonic() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn frame_counts_bytes_not_chars() {
        let body = r#"{"text":"é"}"#;
        let framed = String::from_utf8(frame_message(body)).unwrap();
        assert!(framed.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert!(framed.ends_with(body));
    }

    #[test]
    fn notification_has_no_id() {
        let json = serialize_notification("exit", serde_json::Value::Null);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["method"], "exit");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn error_response_carries_code() {
        let json = serialize_error_response(7, &RpcError::method_not_found("window/workDoneProgress/create"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn response_carries_result() {
        let json = serialize_response(3, serde_json::json!([{"enable": true}]));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["result"][0]["enable"], true);
    }

    #[test]
    fn content_length_among_other_headers() {
        let header = "Content-Type: application/vscode-jsonrpc\r\ncontent-length: 52\r\n";
        assert_eq!(parse_content_length(header).unwrap(), 52);
    }

    #[test]
    fn content_length_missing_or_bad() {
        assert!(parse_content_length("Content-Type: x").is_err());
        assert!(parse_content_length("Content-Length: many").is_err());
    }

    #[test]
    fn parse_classifies_messages() {
        let request = parse_message(r#"{"jsonrpc":"2.0","id":4,"method":"workspace/configuration","params":{"items":[]}}"#).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request { id: 4, .. }));

        let notification = parse_message(r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"type":3,"message":"hi"}}"#).unwrap();
        assert!(matches!(notification, JsonRpcMessage::Notification { .. }));

        let response = parse_message(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"bad"}}"#).unwrap();
        match response {
            JsonRpcMessage::Response { id, result, error } => {
                assert_eq!(id, 1);
                assert!(result.is_none());
                assert_eq!(error.unwrap().code, -32600);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_message("not json").is_err());
        assert!(parse_message(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(parse_message(r#"{"jsonrpc":"2.0","id":"abc","result":null}"#).is_err());
        assert!(parse_message(r#"{"jsonrpc":"2.0","method":5}"#).is_err());
    }

    #[tokio::test]
    async fn read_frame_decodes_consecutive_messages() {
        let mut stream = frame_message(r#"{"a":1}"#);
        stream.extend(frame_message(r#"{"b":2}"#));
        let mut reader = tokio::io::BufReader::new(stream.as_slice());

        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some(r#"{"b":2}"#));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_frame_reports_truncated_header() {
        let mut reader = tokio::io::BufReader::new(&b"Content-Length: 10\r\n"[..]);
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn read_frame_reports_short_body() {
        let mut reader = tokio::io::BufReader::new(&b"Content-Length: 10\r\n\r\n{}"[..]);
        assert!(read_frame(&mut reader).await.is_err());
    }
}
