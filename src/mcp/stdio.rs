//! Local MCP server over a child process's stdin/stdout.
//!
//! Messages are newline-delimited JSON. A reader task routes responses to the
//! waiting request by id; when stdout closes every pending request fails.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::pending::PendingRequests;
use super::protocol::{parse_incoming, IncomingMessage, JsonRpcNotification, JsonRpcRequest};
use super::McpError;

type SharedStdin = Arc<Mutex<ChildStdin>>;

pub struct StdioTransport {
    server: String,
    stdin: SharedStdin,
    child: Mutex<Option<Child>>,
    pending: PendingRequests,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl StdioTransport {
    /// Spawn the server process. It is killed when the transport is dropped.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        let stdin: SharedStdin = Arc::new(Mutex::new(stdin));
        let pending = PendingRequests::default();
        let reader = tokio::spawn(read_messages(
            server.to_string(),
            stdout,
            stdin.clone(),
            pending.clone(),
        ));

        tracing::info!(server = %server, command = %command, "Spawned MCP server");

        Ok(Self {
            server: server.to_string(),
            stdin,
            child: Mutex::new(Some(child)),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        })
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.pending.register(id).await;

        if let Err(e) = write_line(&self.stdin, &JsonRpcRequest::new(id, method, params)).await {
            self.pending.remove(id).await;
            return Err(e);
        }

        self.pending
            .wait(&self.server, method, id, rx, self.request_timeout)
            .await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        write_line(&self.stdin, &JsonRpcNotification::new(method, params)).await
    }

    /// Terminate the server process.
    pub async fn close(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(server = %self.server, "Failed to kill MCP server: {}", e);
            } else {
                tracing::info!(server = %self.server, "MCP server stopped");
            }
        }
        self.reader.abort();
    }
}

async fn write_line<T: Serialize>(stdin: &SharedStdin, message: &T) -> Result<(), McpError> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| McpError::Protocol(format!("failed to encode message: {}", e)))?;
    line.push('\n');

    let mut stdin = stdin.lock().await;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_messages(
    server: String,
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: PendingRequests,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %server, "Failed to read from MCP server: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_incoming(&line) {
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
                if let Err(e) = write_line(&stdin, &request.reply()).await {
                    tracing::warn!(server = %server, "Failed to answer server request: {}", e);
                }
            }
            Err(e) => {
                tracing::debug!(server = %server, "Skipping non JSON-RPC output: {}", e);
            }
        }
    }

    pending.fail_all().await;
    tracing::debug!(server = %server, "MCP server stdout closed");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn_sh(script: &str) -> StdioTransport {
        StdioTransport::spawn(
            "test",
            "sh",
            &["-c".to_string(), script.to_string()],
            &HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn routes_response_to_request() {
        // Reads one request line, answers with id 1.
        let transport = spawn_sh(concat!(
            "read line; ",
            r#"echo '{"jsonrpc":"2.0","method":"notifications/message"}'; "#,
            r#"echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'; sleep 1"#,
        ));
        let result = transport.request("ping", None).await.unwrap();
        assert_eq!(result["ok"], true);
        transport.close().await;
    }

    #[tokio::test]
    async fn error_response_is_rpc_error() {
        let transport = spawn_sh(concat!(
            "read line; ",
            r#"echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}'; sleep 1"#,
        ));
        let err = transport.request("bogus", None).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));
        transport.close().await;
    }

    /// Sends a server request after our first request, then reports whether
    /// our reply matched `pattern` in the response to request 1.
    fn server_request_script(request: &str, pattern: &str) -> String {
        format!(
            r#"read line
echo '{request}'
read reply
case "$reply" in
  *'{pattern}'*) ok=true ;;
  *) ok=false ;;
esac
echo "{{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{{\"ok\":$ok}}}}"
sleep 1
"#
        )
    }

    #[tokio::test]
    async fn answers_server_ping() {
        let transport = spawn_sh(&server_request_script(
            r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#,
            r#""id":"srv-1","result":{}"#,
        ));
        let result = transport.request("tools/list", None).await.unwrap();
        assert_eq!(result["ok"], true);
        transport.close().await;
    }

    #[tokio::test]
    async fn rejects_unsupported_server_request() {
        let transport = spawn_sh(&server_request_script(
            r#"{"jsonrpc":"2.0","id":9,"method":"roots/list"}"#,
            r#""id":9,"error":{"code":-32601"#,
        ));
        let result = transport.request("tools/list", None).await.unwrap();
        assert_eq!(result["ok"], true);
        transport.close().await;
    }

    #[tokio::test]
    async fn closed_stdout_fails_pending_request() {
        let transport = spawn_sh("read line; exit 0");
        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::Closed(_)));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let err = StdioTransport::spawn(
            "missing",
            "/nonexistent/mcp-server-binary",
            &[],
            &HashMap::new(),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }
}
