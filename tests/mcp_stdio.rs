//! MCP executor against a scripted stdio JSON-RPC server.
//!
//! The server logs every message it receives as `<method> <id>` so the
//! handshake and id sequence can be checked after the calls.

#![cfg(unix)]

use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

use swebench_harness::scaffold::tools::{McpToolExecutor, McpTransport};
use swebench_harness::scaffold::ToolExecutor;

const SERVER: &str = r#"
import json, sys, time

log = open(sys.argv[1], "a")
while True:
    line = sys.stdin.readline()
    if not line:
        break
    msg = json.loads(line)
    log.write("%s %s\n" % (msg["method"], msg.get("id", "-")))
    log.flush()
    if "id" not in msg:
        continue
    reply = {"jsonrpc": "2.0", "id": msg["id"]}
    if msg["method"] == "initialize":
        reply["result"] = {"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}}
    else:
        params = msg["params"]
        name = params["name"]
        if name == "slow":
            time.sleep(1.5)
        if name == "boom":
            reply["error"] = {"code": -32601, "message": "Unknown tool: boom"}
        elif name == "fail":
            reply["result"] = {"content": [{"type": "text", "text": "no such file"}], "isError": True}
        else:
            reply["result"] = {"content": [{"type": "text", "text": params["arguments"].get("text", name)}]}
    sys.stdout.write("server log line, not json\n")
    sys.stdout.write(json.dumps(reply) + "\n")
    sys.stdout.flush()
"#;

fn has_python3() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn connect(log: &std::path::Path) -> McpToolExecutor {
    let transport = McpTransport::Stdio {
        command: "python3".to_string(),
        args: vec![
            "-c".to_string(),
            SERVER.to_string(),
            log.to_string_lossy().into_owned(),
        ],
        env: HashMap::new(),
    };
    McpToolExecutor::connect(transport)
        .await
        .expect("initialize handshake")
        .with_timeout(Duration::from_secs(1))
}

#[tokio::test]
async fn test_stdio_calls_are_correlated_by_id() {
    if !has_python3() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    let log = dir.path().join("server.log");
    let executor = connect(&log).await;

    let echo = executor.execute("echo", &json!({"text": "first"})).await;
    assert!(echo.success, "{:?}", echo.error);
    assert_eq!(echo.output, "first");

    let unknown = executor.execute("boom", &json!({})).await;
    assert!(!unknown.success);
    assert_eq!(unknown.error.as_deref(), Some("Unknown tool: boom"));

    let failed = executor.execute("fail", &json!({"path": "missing.py"})).await;
    assert!(!failed.success);
    assert_eq!(failed.output, "no such file");
    assert_eq!(failed.error.as_deref(), Some("no such file"));

    let slow = executor.execute("slow", &json!({})).await;
    assert!(!slow.success);
    assert!(slow.error.unwrap_or_default().contains("timed out"));

    // The late reply to the timed-out call must not be taken for this one.
    let after = executor.execute("echo", &json!({"text": "second"})).await;
    assert!(after.success, "{:?}", after.error);
    assert_eq!(after.output, "second");

    let received: Vec<String> = std::fs::read_to_string(&log)
        .expect("server log")
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        received,
        vec![
            "initialize 1",
            "notifications/initialized -",
            "tools/call 2",
            "tools/call 3",
            "tools/call 4",
            "tools/call 5",
            "tools/call 6",
        ]
    );
}
