//! MCP executor: JSON-RPC `tools/call` over a persistent connection.
//!
//! Two transports are supported: a long-lived stdio server process
//! (newline-delimited JSON-RPC) and a plain HTTP endpoint that accepts a
//! JSON-RPC request per POST. Requests carry a monotonically increasing id
//! and responses are correlated by that id.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{ToolExecutor, ToolResult};

pub const DEFAULT_MCP_TIMEOUT: Duration = Duration::from_secs(300);
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors raised while establishing or using an MCP connection.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP server closed the connection")]
    Closed,

    #[error("MCP request timed out after {0:?}")]
    Timeout(Duration),

    #[error("MCP protocol error: {0}")]
    Protocol(String),
}

/// Where the tool server lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

struct StdioServer {
    // Held so the server is killed when the executor is dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

enum Connection {
    Stdio(Mutex<StdioServer>),
    Http {
        client: HttpClient,
        url: String,
        headers: HashMap<String, String>,
    },
}

/// Tool executor backed by an MCP server.
pub struct McpToolExecutor {
    connection: Connection,
    next_id: AtomicU64,
    timeout: Duration,
}

fn request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.to_string();
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| McpError::Transport(format!("write: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| McpError::Transport(format!("flush: {}", e)))
}

/// Read lines until the response with `id` arrives.
///
/// Notifications, stale responses and non-JSON lines are skipped.
async fn read_response<R>(lines: &mut Lines<R>, id: u64) -> Result<Value, McpError>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| McpError::Transport(format!("read: {}", e)))?
    {
        let value: Value = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!(line = %line, "Skipping non-JSON line from MCP server");
                continue;
            }
        };
        if value.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(value);
        }
    }
    Err(McpError::Closed)
}

/// Map a `tools/call` JSON-RPC response onto a `ToolResult`.
pub fn map_call_response(response: &Value) -> ToolResult {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return ToolResult::failure(message);
    }

    let Some(result) = response.get("result") else {
        return ToolResult::failure("MCP response missing result");
    };
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        ToolResult::partial(text, text)
    } else {
        ToolResult::success(text)
    }
}

impl McpToolExecutor {
    /// Open a connection; stdio servers are spawned and initialized.
    pub async fn connect(transport: McpTransport) -> Result<Self, McpError> {
        let connection = match transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = Command::new(&command);
                cmd.args(&args)
                    .envs(&env)
                    .stdin(std::process::Stdio::piped())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::inherit())
                    .kill_on_drop(true);
                let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
                    command: command.clone(),
                    source,
                })?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| McpError::Transport("missing stdin".to_string()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| McpError::Transport("missing stdout".to_string()))?;
                Connection::Stdio(Mutex::new(StdioServer {
                    _child: child,
                    stdin,
                    stdout: BufReader::new(stdout).lines(),
                }))
            }
            McpTransport::Http { url, headers } => Connection::Http {
                client: HttpClient::new(),
                url,
                headers,
            },
        };

        let executor = Self {
            connection,
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_MCP_TIMEOUT,
        };
        if matches!(executor.connection, Connection::Stdio(_)) {
            executor.initialize().await?;
        }
        Ok(executor)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let response = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "swebench-harness",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        if let Some(error) = response.get("error") {
            return Err(McpError::Protocol(error.to_string()));
        }

        if let Connection::Stdio(server) = &self.connection {
            let mut server = server.lock().await;
            let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
            write_message(&mut server.stdin, &notification).await?;
        }
        tracing::debug!("MCP session initialized");
        Ok(())
    }

    /// Send one JSON-RPC request and return the full response object.
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = request_body(id, method, params);

        let exchange = async {
            match &self.connection {
                Connection::Stdio(server) => {
                    // One request in flight per server.
                    let mut server = server.lock().await;
                    write_message(&mut server.stdin, &body).await?;
                    read_response(&mut server.stdout, id).await
                }
                Connection::Http {
                    client,
                    url,
                    headers,
                } => {
                    let mut request = client.post(url).json(&body);
                    for (name, value) in headers {
                        request = request.header(name.as_str(), value.as_str());
                    }
                    let response = request
                        .send()
                        .await
                        .map_err(|e| McpError::Transport(e.to_string()))?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(McpError::Transport(format!("HTTP {}", status.as_u16())));
                    }
                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| McpError::Protocol(e.to_string()))
                }
            }
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| McpError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        let params = json!({"name": tool_name, "arguments": arguments});
        match self.request("tools/call", params).await {
            Ok(response) => map_call_response(&response),
            Err(e) => {
                tracing::debug!(tool = tool_name, error = %e, "MCP tool call failed");
                ToolResult::failure(e.to_string())
            }
        }
    }
}
