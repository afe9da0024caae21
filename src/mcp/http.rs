//! Remote MCP server over streamable HTTP.
//!
//! Every JSON-RPC message is POSTed to the server URL. The reply is either a
//! plain JSON body or an SSE stream that carries the response, possibly
//! after notifications and requests from the server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use super::protocol::{
    parse_incoming, IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ServerRequest,
};
use super::McpError;

const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct HttpTransport {
    server: String,
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(
        server: &str,
        url: &str,
        headers: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            server: server.to_string(),
            client,
            url: url.to_string(),
            headers: headers.clone(),
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;
        self.remember_session(&response).await;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let reply = if is_event_stream {
            self.read_event_stream(response.bytes_stream(), id).await?
        } else {
            let body = response.text().await?;
            serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC response: {}", e)))?
        };
        reply.into_result()
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    /// End the server-side session, if one was established.
    pub async fn close(&self) {
        let Some(session_id) = self.session_id.write().await.take() else {
            return;
        };
        let result = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(server = %self.server, "Failed to end MCP session: {}", e);
        }
    }

    async fn remember_session(&self, response: &reqwest::Response) {
        let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let mut current = self.session_id.write().await;
        if current.as_deref() != Some(session_id) {
            tracing::debug!(
                server = %self.server,
                session_id = %session_id,
                "MCP session established"
            );
            *current = Some(session_id.to_string());
        }
    }

    /// Read SSE events until the response to `id` shows up.
    async fn read_event_stream<S, B, E>(
        &self,
        stream: S,
        id: u64,
    ) -> Result<JsonRpcResponse, McpError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut events = std::pin::pin!(stream.eventsource());
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| McpError::EventStream(e.to_string()))?;
            match parse_incoming(&event.data) {
                Ok(IncomingMessage::Response(response)) if response.id.as_u64() == Some(id) => {
                    return Ok(response);
                }
                Ok(IncomingMessage::Response(response)) => {
                    tracing::debug!(
                        server = %self.server,
                        "Ignoring response for request {}",
                        response.id
                    );
                }
                Ok(IncomingMessage::Notification { method }) => {
                    tracing::debug!(
                        server = %self.server,
                        "Received MCP notification: method={}",
                        method
                    );
                }
                Ok(IncomingMessage::Request(request)) => self.answer(request).await,
                Err(e) => {
                    tracing::debug!(server = %self.server, "Skipping SSE event: {}", e);
                }
            }
        }
        Err(McpError::Protocol(format!(
            "no response for request {} in event stream",
            id
        )))
    }

    async fn answer(&self, request: ServerRequest) {
        tracing::debug!(
            server = %self.server,
            "Answering server request: method={}",
            request.method
        );
        if let Err(e) = self.post(&request.reply()).await {
            tracing::warn!(server = %self.server, "Failed to answer server request: {}", e);
        }
    }

    async fn post<T: Serialize>(&self, message: &T) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(message);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(session_id) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::Protocol(format!(
                "HTTP {} from {}: {}",
                status,
                self.server,
                text.chars().take(300).collect::<String>()
            )));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::initialize_params;
    use crate::test_server::serve;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn transport(url: &str) -> HttpTransport {
        HttpTransport::new("remote", url, &HashMap::new(), Duration::from_secs(5)).unwrap()
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static str, std::io::Error>> {
        futures::stream::iter(parts.iter().map(|p| Ok(*p)).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn joins_multi_line_data_fields() {
        let body = chunks(&[
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\n",
            "data: \"result\":{\"tools\":[]}}\n\n",
        ]);
        let response = transport("http://127.0.0.1:9/mcp")
            .read_event_stream(body, 1)
            .await
            .unwrap();
        assert_eq!(response.into_result().unwrap()["tools"], json!([]));
    }

    #[tokio::test]
    async fn skips_notifications_and_other_responses() {
        let body = chunks(&[
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":6,\"result\":{}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"res",
            "ult\":{\"tools\":[]}}\n\n",
        ]);
        let response = transport("http://127.0.0.1:9/mcp")
            .read_event_stream(body, 7)
            .await
            .unwrap();
        assert_eq!(response.id, json!(7));
    }

    #[tokio::test]
    async fn missing_response_in_event_stream_is_protocol_error() {
        let body = chunks(&["data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n"]);
        let err = transport("http://127.0.0.1:9/mcp")
            .read_event_stream(body, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[derive(Default)]
    struct Seen {
        session_headers: Vec<Option<String>>,
        deleted: Option<String>,
        replies: Vec<Value>,
    }

    fn session_header(headers: &HeaderMap) -> Option<String> {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Streamable HTTP server: JSON for `initialize`, SSE for `tools/list`.
    async fn streamable_server(seen: Arc<Mutex<Seen>>) -> String {
        let on_post = {
            let seen = seen.clone();
            move |headers: HeaderMap, Json(body): Json<Value>| async move {
                let mut seen = seen.lock().unwrap();
                seen.session_headers.push(session_header(&headers));
                let id = body["id"].clone();
                match body["method"].as_str() {
                    Some("initialize") => (
                        [(SESSION_HEADER, "session-1")],
                        Json(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {"protocolVersion": "2024-11-05", "capabilities": {}}
                        })),
                    )
                        .into_response(),
                    Some("tools/list") => {
                        let events = format!(
                            "event: message\n\
                             data: {{\"jsonrpc\":\"2.0\",\"id\":\"srv-1\",\"method\":\"ping\"}}\n\n\
                             event: message\n\
                             data: {{\"jsonrpc\":\"2.0\",\"id\":{},\n\
                             data: \"result\":{{\"tools\":[{{\"name\":\"echo\"}}]}}}}\n\n",
                            id
                        );
                        ([(CONTENT_TYPE, "text/event-stream")], events).into_response()
                    }
                    Some(_) => StatusCode::ACCEPTED.into_response(),
                    None => {
                        seen.replies.push(body);
                        StatusCode::ACCEPTED.into_response()
                    }
                }
            }
        };
        let on_delete = move |headers: HeaderMap| async move {
            seen.lock().unwrap().deleted = session_header(&headers);
            StatusCode::OK
        };
        serve(Router::new().route("/mcp", post(on_post).delete(on_delete))).await
    }

    #[tokio::test]
    async fn captures_and_echoes_session_id() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let url = streamable_server(seen.clone()).await;
        let transport = transport(&format!("{}/mcp", url));

        let init = transport
            .request("initialize", Some(initialize_params()))
            .await
            .unwrap();
        assert_eq!(init["protocolVersion"], "2024-11-05");
        transport
            .notify("notifications/initialized", None)
            .await
            .unwrap();
        let tools = transport.request("tools/list", None).await.unwrap();
        assert_eq!(tools["tools"][0]["name"], "echo");
        transport.close().await;

        let seen = seen.lock().unwrap();
        let session = Some("session-1".to_string());
        assert_eq!(seen.session_headers[0], None);
        assert!(seen.session_headers[1..].iter().all(|h| *h == session));
        assert_eq!(seen.deleted, session);
        assert_eq!(seen.replies, [json!({"jsonrpc": "2.0", "id": "srv-1", "result": {}})]);
    }

    #[tokio::test]
    async fn error_status_is_protocol_error() {
        let app = Router::new().route(
            "/mcp",
            post(|| async { (StatusCode::NOT_FOUND, "no such session") }),
        );
        let url = serve(app).await;

        let err = transport(&format!("{}/mcp", url))
            .request("tools/list", None)
            .await
            .unwrap_err();
        match err {
            McpError::Protocol(message) => {
                assert!(message.contains("404"));
                assert!(message.contains("no such session"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_without_session_sends_nothing() {
        let transport = transport("http://127.0.0.1:9/mcp");
        transport.close().await;
        assert!(transport.session_id.read().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let err = transport("http://127.0.0.1:9/mcp")
            .request("tools/list", None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Http(_)));
    }
}
