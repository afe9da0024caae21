//! Local HTTP servers for tests.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::http::{StatusCode, Uri};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Messages a legacy SSE server received on its POST endpoint.
#[derive(Default)]
pub struct Posted {
    pub uris: Vec<String>,
    pub bodies: Vec<Value>,
}

/// An MCP server speaking the HTTP+SSE transport.
///
/// `GET /sse` announces `/messages?session_id=1` and then streams responses.
/// The server sends a `ping` right after `notifications/initialized` and
/// offers one tool, `echo`, which returns its `text` argument.
pub async fn legacy_sse_server() -> (String, Arc<Mutex<Posted>>) {
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let rx = Arc::new(Mutex::new(Some(rx)));
    let posted = Arc::new(Mutex::new(Posted::default()));

    let on_get = move || {
        let rx = rx.clone();
        async move {
            let rx = rx.lock().unwrap().take().expect("one event stream per server");
            let endpoint = stream::once(async {
                let event = Event::default()
                    .event("endpoint")
                    .data("/messages?session_id=1");
                Ok::<_, Infallible>(event)
            });
            let messages = stream::unfold(rx, |mut rx| async move {
                let message = rx.recv().await?;
                let event = Event::default().event("message").data(message.to_string());
                Some((Ok::<_, Infallible>(event), rx))
            });
            Sse::new(endpoint.chain(messages))
        }
    };

    let on_post = {
        let posted = posted.clone();
        move |uri: Uri, Json(body): Json<Value>| async move {
            {
                let mut posted = posted.lock().unwrap();
                posted.uris.push(uri.to_string());
                posted.bodies.push(body.clone());
            }
            let id = body["id"].clone();
            let reply = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});
            match body["method"].as_str() {
                Some("initialize") => {
                    let _ = tx.send(reply(json!({"protocolVersion": "2024-11-05"})));
                }
                Some("notifications/initialized") => {
                    let _ = tx.send(json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}));
                }
                Some("tools/list") => {
                    let _ = tx.send(reply(json!({
                        "tools": [{"name": "echo", "inputSchema": {"type": "object"}}]
                    })));
                }
                Some("tools/call") => {
                    let text = body["params"]["arguments"]["text"].clone();
                    let _ = tx.send(reply(json!({"content": [{"type": "text", "text": text}]})));
                }
                _ => {}
            }
            StatusCode::ACCEPTED
        }
    };

    let app = Router::new()
        .route("/sse", get(on_get))
        .route("/messages", post(on_post));
    (serve(app).await, posted)
}
