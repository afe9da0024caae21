//! Requests waiting for a response that arrives on a separate reader task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use super::protocol::JsonRpcResponse;
use super::McpError;

#[derive(Clone, Default)]
pub(super) struct PendingRequests {
    waiters: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
}

impl PendingRequests {
    pub(super) async fn register(&self, id: u64) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        rx
    }

    pub(super) async fn remove(&self, id: u64) {
        self.waiters.lock().await.remove(&id);
    }

    /// Hand a response to its waiter.
    pub(super) async fn complete(&self, server: &str, response: JsonRpcResponse) {
        let Some(id) = response.id.as_u64() else {
            tracing::warn!(server = %server, "Response without numeric id: {}", response.id);
            return;
        };
        match self.waiters.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => {
                tracing::warn!(server = %server, "Received response for unknown request ID: {}", id)
            }
        }
    }

    /// Fail every waiter with a closed-channel error.
    pub(super) async fn fail_all(&self) {
        self.waiters.lock().await.clear();
    }

    /// Wait for the response to `id`, giving up after `timeout`.
    pub(super) async fn wait(
        &self,
        server: &str,
        method: &str,
        id: u64,
        rx: oneshot::Receiver<JsonRpcResponse>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(McpError::Closed(server.to_string())),
            Err(_) => {
                self.remove(id).await;
                Err(McpError::Timeout(method.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(id: u64) -> JsonRpcResponse {
        serde_json::from_value(json!({"jsonrpc": "2.0", "id": id, "result": {"n": id}})).unwrap()
    }

    #[tokio::test]
    async fn routes_by_id() {
        let pending = PendingRequests::default();
        let first = pending.register(1).await;
        let second = pending.register(2).await;

        pending.complete("test", response(2)).await;
        pending.complete("test", response(1)).await;

        let timeout = Duration::from_secs(1);
        let result = pending.wait("test", "a", 1, first, timeout).await.unwrap();
        assert_eq!(result["n"], 1);
        let result = pending.wait("test", "b", 2, second, timeout).await.unwrap();
        assert_eq!(result["n"], 2);
    }

    #[tokio::test]
    async fn fail_all_closes_waiters() {
        let pending = PendingRequests::default();
        let rx = pending.register(7).await;
        pending.fail_all().await;

        let err = pending
            .wait("test", "tools/list", 7, rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Closed(_)));
    }

    #[tokio::test]
    async fn timeout_forgets_the_request() {
        let pending = PendingRequests::default();
        let rx = pending.register(3).await;

        let err = pending
            .wait("test", "tools/call", 3, rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout(m) if m == "tools/call"));
        assert!(pending.waiters.lock().await.is_empty());
    }
}
