use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod echo;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a server process and exchange JSON-RPC messages with it.
    Call(CallArgs),
    /// Run a line-delimited JSON-RPC echo server on stdin/stdout.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Working directory for the server process.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variable for the server (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
    /// Time to let the server settle before the first request (e.g. 8s, 500ms, 0).
    #[arg(long, default_value = "8s", env = "STDIORPC_READY_WAIT")]
    pub ready_wait: String,
    /// Maximum time to wait for each response (e.g. 15s, 500ms).
    #[arg(long, default_value = "15s", env = "STDIORPC_TIMEOUT")]
    pub timeout: String,
    /// Perform the MCP initialize handshake before any request.
    #[arg(long)]
    pub initialize: bool,
    /// Client name sent with --initialize.
    #[arg(long, default_value = "stdiorpc", value_name = "NAME")]
    pub client_name: String,
    /// Raw JSON-RPC message to send (repeatable, sent in order).
    #[arg(long = "request", value_name = "JSON")]
    pub requests: Vec<String>,
    /// Method of a request built from flags.
    #[arg(long, conflicts_with = "requests")]
    pub method: Option<String>,
    /// JSON params for --method.
    #[arg(long, requires = "method", value_name = "JSON")]
    pub params: Option<String>,
    /// Keep sending after a failed call.
    #[arg(long)]
    pub keep_going: bool,
    /// Server program and its arguments, after `--`.
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub command: Vec<OsString>,
}

#[derive(Args, Debug, Default)]
pub struct EchoArgs {
    /// Print a non-JSON log line before every response.
    #[arg(long)]
    pub noise: bool,
    /// Send a progress notification before every response.
    #[arg(long)]
    pub progress: bool,
    /// Answer `initialize` without echoing the request id.
    #[arg(long)]
    pub omit_initialize_id: bool,
    /// Never answer this method (repeatable).
    #[arg(long = "ignore", value_name = "METHOD")]
    pub ignore: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_env_pair(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{input}`")),
    }
}
