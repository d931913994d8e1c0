use std::io::{self, Write};

use serde_json::{json, Value};
use stdiorpc_client::{Message, JSONRPC_VERSION, MCP_PROTOCOL_VERSION, NOTIFICATION_PREFIX};
use stdiorpc_line::{LineError, LineReader, LineWriter};

use crate::cmd::EchoArgs;
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS};

const PARSE_ERROR: i64 = -32700;
const INVALID_PARAMS: i64 = -32602;

/// Serve until stdin reaches end-of-file.
pub fn run(args: EchoArgs) -> CliResult<i32> {
    let mut reader = LineReader::new(io::stdin().lock());
    let mut writer = LineWriter::new(io::stdout().lock());
    serve(&args, &mut reader, &mut writer)?;
    Ok(SUCCESS)
}

fn serve<R, W>(
    args: &EchoArgs,
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
) -> CliResult<()>
where
    R: io::Read,
    W: Write,
{
    loop {
        let line = match reader.read_line() {
            Ok(line) => line,
            Err(LineError::ConnectionClosed) => {
                tracing::debug!("input closed, echo server exiting");
                return Ok(());
            }
            Err(LineError::LineTooLong { size, max }) => {
                tracing::warn!(size, max, "skipping over-long request line");
                continue;
            }
            Err(LineError::Io(err)) => return Err(io_error("stdin read failed", err)),
            Err(err) => return Err(CliError::new(INTERNAL, format!("stdin read failed: {err}"))),
        };

        for reply in replies(args, &line) {
            match writer.write_line(&reply) {
                Ok(()) => {}
                Err(LineError::Io(err)) => return Err(io_error("stdout write failed", err)),
                Err(err) => {
                    return Err(CliError::new(INTERNAL, format!("stdout write failed: {err}")))
                }
            }
        }
    }
}

/// Lines to write in answer to one input line, in order.
fn replies(args: &EchoArgs, line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let Some(message) = Message::parse(line) else {
        tracing::debug!(%line, "unparseable request");
        return vec![error_response(Value::Null, PARSE_ERROR, "Parse error", None).to_string()];
    };
    let method = message.method().unwrap_or_default();

    if message.id().is_none() {
        tracing::info!(method, "received notification");
        return Vec::new();
    }
    if args.ignore.iter().any(|ignored| ignored == method) {
        tracing::info!(method, "ignoring request");
        return Vec::new();
    }

    let id = message.id().cloned().unwrap_or(Value::Null);
    let mut out = Vec::new();
    if args.noise {
        out.push(format!("echo: handling {method} request"));
    }
    if args.progress {
        out.push(
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": format!("{NOTIFICATION_PREFIX}progress"),
                "params": {"progressToken": id, "progress": 1, "total": 1},
            })
            .to_string(),
        );
    }

    let mut response = answer(&message, id);
    if args.omit_initialize_id && method == "initialize" {
        if let Value::Object(fields) = &mut response {
            fields.remove("id");
        }
    }
    tracing::info!(method, "answering request");
    out.push(response.to_string());
    out
}

fn answer(message: &Message, id: Value) -> Value {
    let params = message.params().cloned().unwrap_or(Value::Null);
    match message.method().unwrap_or_default() {
        "initialize" => result_response(
            id,
            json!({
                "protocolVersion": params
                    .get("protocolVersion")
                    .cloned()
                    .unwrap_or_else(|| Value::from(MCP_PROTOCOL_VERSION)),
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "stdiorpc-echo", "version": env!("CARGO_PKG_VERSION")},
            }),
        ),
        "ping" => result_response(id, json!({})),
        "tools/list" => result_response(
            id,
            json!({
                "tools": [{
                    "name": "echo",
                    "description": "Return the arguments unchanged",
                    "inputSchema": {"type": "object"},
                }]
            }),
        ),
        "tools/call" => match params.get("name").and_then(Value::as_str) {
            Some("echo") => {
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                result_response(
                    id,
                    json!({
                        "content": [{"type": "text", "text": arguments.to_string()}],
                        "isError": false,
                    }),
                )
            }
            other => error_response(
                id,
                INVALID_PARAMS,
                "Unknown tool",
                Some(json!({"name": other})),
            ),
        },
        method => result_response(id, json!({"method": method, "params": params})),
    }
}

fn result_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result})
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({"code": code, "message": message});
    if let (Some(data), Value::Object(fields)) = (data, &mut error) {
        fields.insert("data".to_string(), data);
    }
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "error": error})
}
