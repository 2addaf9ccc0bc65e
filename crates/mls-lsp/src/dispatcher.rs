//! Routing of incoming messages.
//!
//! Responses resolve the pending request with the same id. Notifications
//! go to the notification handler. Requests initiated by the server are
//! answered through the request handler, or refused with `-32601`.
use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::transport::{serialize_error_response, serialize_response, JsonRpcMessage, RpcError};

/// Handles server-initiated notifications.
pub type NotificationHandler = Box<dyn Fn(&str, &serde_json::Value) + Send + Sync>;

/// Answers server-initiated requests.
pub type RequestHandler =
    Box<dyn Fn(&str, &serde_json::Value) -> Result<serde_json::Value, RpcError> + Send + Sync>;

/// The outcome delivered to a waiting request.
#[derive(Debug)]
pub enum DispatchResult {
    /// Successful response with the result value.
    Success(serde_json::Value),
    /// Error response from the server.
    Error(RpcError),
}

/// Pending-request table plus the handlers for server traffic.
#[derive(Default)]
pub struct Dispatcher {
    pending: HashMap<i64, oneshot::Sender<DispatchResult>>,
    notification_handler: Option<NotificationHandler>,
    request_handler: Option<RequestHandler>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler for server notifications.
    pub fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notification_handler = Some(handler);
    }

    /// Set the handler for server requests.
    pub fn set_request_handler(&mut self, handler: RequestHandler) {
        self.request_handler = Some(handler);
    }

    /// Register a request and get the receiver for its response.
    pub fn register_request(&mut self, id: i64) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Number of requests still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Route one message. Returns a reply body when the message was a
    /// server request.
    pub fn dispatch(&mut self, message: JsonRpcMessage) -> Option<String> {
        match message {
            JsonRpcMessage::Response { id, result, error } => {
                match self.pending.remove(&id) {
                    Some(sender) => {
                        let outcome = match error {
                            Some(err) => DispatchResult::Error(err),
                            None => DispatchResult::Success(result.unwrap_or(serde_json::Value::Null)),
                        };
                        // The caller may have timed out and dropped the receiver.
                        let _ = sender.send(outcome);
                    }
                    None => tracing::warn!("response for unknown request id {}", id),
                }
                None
            }
            JsonRpcMessage::Notification { method, params } => {
                match &self.notification_handler {
                    Some(handler) => handler(&method, &params),
                    None => tracing::debug!("unhandled notification: {}", method),
                }
                None
            }
            JsonRpcMessage::Request { id, method, params } => {
                let answer = match &self.request_handler {
                    Some(handler) => handler(&method, &params),
                    None => Err(RpcError::method_not_found(&method)),
                };
                let reply = match answer {
                    Ok(result) => serialize_response(id, result),
                    Err(err) => {
                        tracing::debug!("refusing server request {}: {}", method, err.message);
                        serialize_error_response(id, &err)
                    }
                };
                Some(reply)
            }
        }
    }

    /// Drop every pending request; their receivers observe a closed channel.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending.len())
            .field("notification_handler", &self.notification_handler.is_some())
            .field("request_handler", &self.request_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::transport::METHOD_NOT_FOUND;

    #[tokio::test]
    async fn response_resolves_pending_request() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(1);
        assert_eq!(disp.pending_count(), 1);

        let reply = disp.dispatch(JsonRpcMessage::Response {
            id: 1,
            result: Some(serde_json::json!({"capabilities": {}})),
            error: None,
        });
        assert!(reply.is_none());
        assert_eq!(disp.pending_count(), 0);

        match rx.await.unwrap() {
            DispatchResult::Success(val) => assert!(val.get("capabilities").is_some()),
            DispatchResult::Error(_) => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn error_response_is_delivered() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(2);
        disp.dispatch(JsonRpcMessage::Response {
            id: 2,
            result: None,
            error: Some(RpcError {
                code: -32002,
                message: "server not initialized".into(),
            }),
        });
        match rx.await.unwrap() {
            DispatchResult::Error(err) => assert_eq!(err.code, -32002),
            DispatchResult::Success(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn missing_result_becomes_null() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(3);
        disp.dispatch(JsonRpcMessage::Response {
            id: 3,
            result: None,
            error: None,
        });
        match rx.await.unwrap() {
            DispatchResult::Success(val) => assert!(val.is_null()),
            DispatchResult::Error(_) => panic!("expected success"),
        }
    }

    #[test]
    fn unknown_response_id_is_ignored() {
        let mut disp = Dispatcher::new();
        let reply = disp.dispatch(JsonRpcMessage::Response {
            id: 99,
            result: None,
            error: None,
        });
        assert!(reply.is_none());
    }

    #[test]
    fn notifications_reach_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut disp = Dispatcher::new();
        disp.set_notification_handler(Box::new(move |method, params| {
            sink.lock().unwrap().push((method.to_string(), params.clone()));
        }));

        disp.dispatch(JsonRpcMessage::Notification {
            method: "window/showMessage".into(),
            params: serde_json::json!({"type": 3, "message": "ready"}),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "window/showMessage");
        assert_eq!(seen[0].1["message"], "ready");
    }

    #[test]
    fn server_request_without_handler_is_refused() {
        let mut disp = Dispatcher::new();
        let reply = disp
            .dispatch(JsonRpcMessage::Request {
                id: 5,
                method: "client/registerCapability".into(),
                params: serde_json::json!({}),
            })
            .expect("server requests always get a reply");
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn server_request_is_answered_by_handler() {
        let mut disp = Dispatcher::new();
        disp.set_request_handler(Box::new(|method, _params| {
            if method == "workspace/configuration" {
                Ok(serde_json::json!([{"enable": true}]))
            } else {
                Err(RpcError::method_not_found(method))
            }
        }));

        let reply = disp
            .dispatch(JsonRpcMessage::Request {
                id: 8,
                method: "workspace/configuration".into(),
                params: serde_json::json!({"items": [{"section": "multiLanguageServer"}]}),
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["result"][0]["enable"], true);
    }

    #[tokio::test]
    async fn cancel_all_closes_receivers() {
        let mut disp = Dispatcher::new();
        let rx1 = disp.register_request(1);
        let rx2 = disp.register_request(2);
        disp.cancel_all();
        assert_eq!(disp.pending_count(), 0);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[test]
    fn debug_reports_counts() {
        let mut disp = Dispatcher::new();
        let _rx = disp.register_request(1);
        let debug = format!("{disp:?}");
        assert!(debug.contains("pending: 1"));
    }
}
