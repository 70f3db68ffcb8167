//! JSON-RPC plumbing for backends hosted in an external process
//!
//! Requests are written as newline-delimited JSON to the child's stdin and
//! responses are matched back to callers by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};

use super::BackendError;

/// Error codes the browser server uses to classify failures
pub const CODE_TIMEOUT: i32 = -32001;
pub const CODE_BLOCKED: i32 = -32002;
pub const CODE_STALE: i32 = -32003;
pub const CODE_NOT_INTERACTABLE: i32 = -32004;
pub const CODE_NAVIGATION: i32 = -32005;
pub const CODE_UNSUPPORTED: i32 = -32601;

/// JSON-RPC request
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn into_backend_error(self) -> BackendError {
        match self.code {
            CODE_TIMEOUT => BackendError::Timeout(self.message),
            CODE_BLOCKED => BackendError::Blocked(self.message),
            CODE_STALE => BackendError::Stale(self.message),
            CODE_NOT_INTERACTABLE => BackendError::NotInteractable(self.message),
            CODE_NAVIGATION => BackendError::Navigation(self.message),
            CODE_UNSUPPORTED => BackendError::Unsupported(self.message),
            code => BackendError::ServerError(format!("[{}] {}", code, self.message)),
        }
    }
}

/// Request sender type alias
pub type RequestSender = mpsc::Sender<(RpcRequest, oneshot::Sender<Result<Value, BackendError>>)>;

/// Global request ID counter
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Create a new RPC request with auto-incremented ID
pub fn new_request(method: &str, params: Value) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0",
        id: REQUEST_ID.fetch_add(1, Ordering::SeqCst),
        method: method.to_string(),
        params,
    }
}

/// Send an RPC request and wait for response
pub async fn send_request(
    request_tx: &RequestSender,
    method: &str,
    params: Value,
) -> Result<Value, BackendError> {
    let req = new_request(method, params);
    let (tx, rx) = oneshot::channel();

    request_tx
        .send((req, tx))
        .await
        .map_err(|_| BackendError::Disconnected)?;

    rx.await.map_err(|_| BackendError::Disconnected)?
}

/// Spawn the background communication task for JSON-RPC over stdin/stdout
pub fn spawn_communication_task(
    mut request_rx: mpsc::Receiver<(RpcRequest, oneshot::Sender<Result<Value, BackendError>>)>,
    stdin: ChildStdin,
    stdout: ChildStdout,
) {
    tokio::spawn(async move {
        let mut stdin = stdin;
        let mut reader = BufReader::new(stdout);
        let mut pending: HashMap<u64, oneshot::Sender<Result<Value, BackendError>>> =
            HashMap::new();
        let mut line = String::new();

        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    match request {
                        Some((req, response_tx)) => {
                            let id = req.id;
                            let json = match serde_json::to_string(&req) {
                                Ok(json) => json + "\n",
                                Err(e) => {
                                    let _ = response_tx.send(Err(e.into()));
                                    continue;
                                }
                            };
                            if stdin.write_all(json.as_bytes()).await.is_err() {
                                let _ = response_tx.send(Err(BackendError::Disconnected));
                                break;
                            }
                            pending.insert(id, response_tx);
                        }
                        None => break,
                    }
                }

                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            if let Ok(response) = serde_json::from_str::<RpcResponse>(&line) {
                                if let Some(tx) = pending.remove(&response.id) {
                                    let result = match response.error {
                                        Some(err) => Err(err.into_backend_error()),
                                        None => Ok(response.result.unwrap_or(Value::Null)),
                                    };
                                    let _ = tx.send(result);
                                }
                            } else {
                                tracing::debug!("Ignoring non-RPC output from backend: {}", line.trim());
                            }
                            line.clear();
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(BackendError::Disconnected));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BackendErrorKind;

    #[test]
    fn test_request_ids_increase() {
        let a = new_request("page.goto", serde_json::json!({}));
        let b = new_request("page.goto", serde_json::json!({}));
        assert!(b.id > a.id);
        assert_eq!(a.jsonrpc, "2.0");
    }

    #[test]
    fn test_error_code_mapping() {
        let err = RpcError {
            code: CODE_BLOCKED,
            message: "overlay intercepts pointer events".into(),
        };
        assert_eq!(err.into_backend_error().kind(), BackendErrorKind::Blocked);

        let err = RpcError {
            code: -1,
            message: "boom".into(),
        };
        let mapped = err.into_backend_error();
        assert_eq!(mapped.kind(), BackendErrorKind::Protocol);
        assert!(mapped.to_string().contains("[-1] boom"));
    }

    #[test]
    fn test_parse_response() {
        let line = r#"{"jsonrpc":"2.0","id":7,"result":{"count":1,"handle":"e1"}}"#;
        let response: RpcResponse = serde_json::from_str(line).unwrap();
        assert_eq!(response.id, 7);
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["handle"], "e1");
    }
}
