mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "stdiorpc", version, about = "JSON-RPC over a child process's stdio")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true, env = "STDIORPC_FORMAT")]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        global = true,
        env = "STDIORPC_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        global = true,
        env = "STDIORPC_LOG_LEVEL"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "stdiorpc",
            "call",
            "--timeout",
            "5s",
            "--env",
            "MODE=test",
            "--request",
            r#"{"id":1,"method":"ping"}"#,
            "--",
            "java",
            "-jar",
            "server.jar",
        ])
        .expect("call args should parse");

        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.command.len(), 3);
                assert_eq!(args.env, vec![("MODE".to_string(), "test".to_string())]);
                assert_eq!(args.requests.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn call_requires_program() {
        let err = Cli::try_parse_from(["stdiorpc", "call", "--method", "ping"])
            .expect_err("missing program should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_conflicting_request_sources() {
        let err = Cli::try_parse_from([
            "stdiorpc",
            "call",
            "--request",
            "{\"method\":\"ping\"}",
            "--method",
            "ping",
            "--",
            "server",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn params_require_method() {
        let err = Cli::try_parse_from(["stdiorpc", "call", "--params", "{}", "--", "server"])
            .expect_err("params without method should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_echo_subcommand() {
        let cli = Cli::try_parse_from([
            "stdiorpc",
            "echo",
            "--noise",
            "--ignore",
            "tools/list",
            "--ignore",
            "ping",
        ])
        .expect("echo args should parse");
        match cli.command {
            Command::Echo(args) => {
                assert!(args.noise);
                assert_eq!(args.ignore, vec!["tools/list", "ping"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
