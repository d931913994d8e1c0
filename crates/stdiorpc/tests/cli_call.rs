#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

const BIN: &str = env!("CARGO_BIN_EXE_stdiorpc");

fn call(args: &[&str], server: &[&str]) -> Output {
    Command::new(BIN)
        .args(["--log-level", "error", "--format", "json", "call", "--ready-wait", "0"])
        .args(args)
        .arg("--")
        .args(server)
        .stdin(Stdio::null())
        .output()
        .expect("call should run")
}

fn records(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("record should be JSON"))
        .collect()
}

#[test]
fn initialize_and_list_tools_through_noisy_echo() {
    let output = call(
        &[
            "--initialize",
            "--request",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
        ],
        &[
            BIN,
            "--log-level",
            "error",
            "echo",
            "--noise",
            "--progress",
            "--omit-initialize-id",
        ],
    );

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let records = records(&output);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["method"], "initialize");
    assert_eq!(records[0]["status"], "ok");
    assert_eq!(records[0]["response"]["serverInfo"]["name"], "stdiorpc-echo");
    assert_eq!(records[1]["status"], "ok");
    assert_eq!(records[1]["id"], 2);
    assert_eq!(records[1]["response"]["result"]["tools"][0]["name"], "echo");
}

#[test]
fn raw_requests_and_notifications() {
    let output = call(
        &[
            "--request",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "--request",
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"echo","arguments":{"text":"héllo"}}}"#,
        ],
        &[BIN, "echo"],
    );

    assert_eq!(output.status.code(), Some(0));
    let records = records(&output);
    assert_eq!(records[0]["status"], "sent");
    assert_eq!(records[1]["status"], "ok");
    assert_eq!(records[1]["id"], 1);
    assert_eq!(
        records[1]["response"]["result"]["content"][0]["text"],
        r#"{"text":"héllo"}"#
    );
}

#[test]
fn unanswered_request_times_out_with_124() {
    let output = call(
        &["--timeout", "500ms", "--method", "tools/list"],
        &[BIN, "echo", "--ignore", "tools/list"],
    );

    assert_eq!(output.status.code(), Some(124));
    let records = records(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "timeout");
}

#[test]
fn stops_at_first_failure_unless_keep_going() {
    let requests = [
        "--timeout",
        "300ms",
        "--request",
        r#"{"id":1,"method":"slow"}"#,
        "--request",
        r#"{"id":2,"method":"ping"}"#,
    ];
    let server = [BIN, "echo", "--ignore", "slow"];

    let stopped = call(&requests, &server);
    assert_eq!(stopped.status.code(), Some(124));
    assert_eq!(records(&stopped).len(), 1);

    let mut keep_going = requests.to_vec();
    keep_going.push("--keep-going");
    let continued = call(&keep_going, &server);
    assert_eq!(continued.status.code(), Some(124));
    let records = records(&continued);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["status"], "ok");
}

#[test]
fn silent_exit_returns_5() {
    let output = call(
        &["--timeout", "30s", "--method", "tools/list"],
        &["sh", "-c", "read -r line; exit 0"],
    );

    assert_eq!(output.status.code(), Some(5));
    let records = records(&output);
    assert_eq!(records[0]["status"], "process_exited");
}

#[test]
fn remote_error_returns_60() {
    let output = call(
        &["--method", "tools/call", "--params", r#"{"name":"missing"}"#],
        &[BIN, "echo"],
    );

    assert_eq!(output.status.code(), Some(60));
    let records = records(&output);
    assert_eq!(records[0]["status"], "remote_error");
    assert_eq!(records[0]["response"]["error"]["code"], -32602);
}

#[test]
fn missing_program_returns_3() {
    let output = call(&["--method", "ping"], &["/nonexistent/stdiorpc-server"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("server start failed"));
}

#[test]
fn invalid_request_is_usage_error() {
    let output = call(&["--request", "not json"], &[BIN, "echo"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn raw_format_prints_responses_verbatim() {
    let output = Command::new(BIN)
        .args(["--log-level", "error", "--format", "raw", "call", "--ready-wait", "0"])
        .args(["--method", "ping", "--", BIN, "echo"])
        .output()
        .expect("call should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let response: Value = serde_json::from_str(stdout.trim()).expect("raw line is the response");
    assert_eq!(response["id"], 1);
    assert!(response["result"].is_object());
}

#[test]
fn echo_server_over_pipes() {
    let mut child = Command::new(BIN)
        .args(["--log-level", "error", "echo", "--progress"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("echo should start");

    {
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        stdin
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}\ngarbage\n")
            .expect("write should succeed");
    }

    let output = child.wait_with_output().expect("echo should exit at EOF");
    assert!(output.status.success());
    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("echo output is JSON"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["method"], "notifications/progress");
    assert_eq!(lines[1]["id"], 9);
    assert_eq!(lines[2]["error"]["code"], -32700);
}

#[test]
fn version_command() {
    let output = Command::new(BIN)
        .args(["version", "--extended"])
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: stdiorpc"));
    assert!(stdout.contains("mcp_protocol: 2024-11-05"));
}
