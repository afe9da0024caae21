//! Remote MCP server over the HTTP+SSE transport.
//!
//! The client keeps a GET event stream open. The first `endpoint` event names
//! the URL that client messages are POSTed to; responses and server requests
//! come back as `message` events on the stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Url;
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, EventSource};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::pending::PendingRequests;
use super::protocol::{parse_incoming, IncomingMessage, JsonRpcNotification, JsonRpcRequest};
use super::McpError;

const ENDPOINT_EVENT: &str = "endpoint";

/// POSTs client messages to the endpoint the server announced.
#[derive(Clone)]
struct Outbox {
    server: String,
    client: reqwest::Client,
    endpoint: Url,
    headers: HashMap<String, String>,
    request_timeout: Duration,
}

impl Outbox {
    async fn post<T: Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.request_timeout)
            .json(message);
        for (name, value) in &self.headers {
            request = request.header(name, value);
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
        Ok(())
    }
}

pub struct SseTransport {
    outbox: Outbox,
    pending: PendingRequests,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its endpoint.
    pub async fn connect(
        server: &str,
        url: &str,
        headers: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let base = Url::parse(url)
            .map_err(|e| McpError::Protocol(format!("invalid URL '{}': {}", url, e)))?;

        // No client-wide timeout: it would cut the long-lived stream.
        let client = reqwest::Client::new();
        let mut request = client.get(base.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let mut events =
            EventSource::new(request).map_err(|e| McpError::EventStream(e.to_string()))?;
        events.set_retry_policy(Box::new(Never));

        let endpoint = tokio::time::timeout(
            request_timeout,
            wait_for_endpoint(server, &mut events, &base),
        )
        .await
        .map_err(|_| McpError::Timeout(ENDPOINT_EVENT.to_string()))??;
        tracing::info!(server = %server, endpoint = %endpoint, "Connected to MCP event stream");

        let outbox = Outbox {
            server: server.to_string(),
            client,
            endpoint,
            headers: headers.clone(),
            request_timeout,
        };
        let pending = PendingRequests::default();
        let reader = tokio::spawn(read_events(events, outbox.clone(), pending.clone()));

        Ok(Self {
            outbox,
            pending,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.pending.register(id).await;

        if let Err(e) = self.outbox.post(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.remove(id).await;
            return Err(e);
        }

        self.pending
            .wait(
                &self.outbox.server,
                method,
                id,
                rx,
                self.outbox.request_timeout,
            )
            .await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.outbox
            .post(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Drop the event stream. Pending requests fail as closed.
    pub async fn close(&self) {
        self.reader.abort();
        self.pending.fail_all().await;
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn wait_for_endpoint(
    server: &str,
    events: &mut EventSource,
    base: &Url,
) -> Result<Url, McpError> {
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(message)) if message.event == ENDPOINT_EVENT => {
                return base.join(message.data.trim()).map_err(|e| {
                    McpError::Protocol(format!("invalid endpoint '{}': {}", message.data, e))
                });
            }
            Ok(Event::Message(message)) => {
                tracing::debug!(server = %server, "Event before endpoint: {}", message.event);
            }
            Err(e) => return Err(McpError::EventStream(e.to_string())),
        }
    }
    Err(McpError::Closed(server.to_string()))
}

async fn read_events(mut events: EventSource, outbox: Outbox, pending: PendingRequests) {
    let server = outbox.server.clone();
    while let Some(event) = events.next().await {
        let message = match event {
            Ok(Event::Open) => continue,
            Ok(Event::Message(message)) => message,
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(e) => {
                tracing::warn!(server = %server, "MCP event stream failed: {}", e);
                break;
            }
        };
        if message.event == ENDPOINT_EVENT {
            continue;
        }
        match parse_incoming(&message.data) {
            Ok(IncomingMessage::Response(response)) => pending.complete(&server, response).await,
            Ok(IncomingMessage::Notification { method }) => {
                tracing::debug!(server = %server, "Received MCP notification: method={}", method);
            }
            Ok(IncomingMessage::Request(request)) => {
                tracing::debug!(
                    server = %server,
                    "Answering server request: method={}",
                    request.method
                );
                if let Err(e) = outbox.post(&request.reply()).await {
                    tracing::warn!(server = %server, "Failed to answer server request: {}", e);
                }
            }
            Err(e) => {
                tracing::debug!(server = %server, "Skipping SSE event: {}", e);
            }
        }
    }

    events.close();
    pending.fail_all().await;
    tracing::debug!(server = %server, "MCP event stream closed");
}
