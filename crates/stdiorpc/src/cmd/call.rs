use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use stdiorpc_client::{
    ClientInfo, HandshakeConfig, Message, RpcError, Session, SessionConfig, NOTIFICATION_PREFIX,
};
use stdiorpc_process::CommandSpec;

use crate::cmd::CallArgs;
use crate::exit::{rpc_error, rpc_exit_code, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_record, CallRecord, OutputFormat};

/// One message to deliver, in command-line order.
#[derive(Debug)]
enum Step {
    /// Send and wait for the matching response.
    Call(Message),
    /// Send only; notifications are never answered.
    Notify(Message),
}

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let ready_wait = parse_duration(&args.ready_wait)?;
    let timeout = parse_duration(&args.timeout)?;
    if timeout.is_zero() {
        return Err(CliError::usage("--timeout must be greater than zero"));
    }
    let steps = build_plan(&args)?;
    let spec = command_spec(&args)?;

    let config = SessionConfig {
        ready_wait,
        call_timeout: timeout,
        ..SessionConfig::default()
    };
    let mut session = Session::start_with_config(&spec, config)
        .map_err(|err| rpc_error("server start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut outcome = Outcome::default();

    if args.initialize {
        let handshake = HandshakeConfig {
            client_info: ClientInfo {
                name: args.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            ..HandshakeConfig::default()
        };
        let started = Instant::now();
        let record = match session.initialize(&handshake) {
            Ok(result) => CallRecord::new("initialize", None, "ok", elapsed_ms(started))
                .with_response(result),
            Err(err) => {
                outcome.fail(rpc_exit_code(&err));
                failure_record("initialize", None, &err, started)
            }
        };
        print_record(&record, format);
    }

    for step in steps {
        if outcome.should_stop(args.keep_going) {
            break;
        }
        if !running.load(Ordering::SeqCst) {
            tracing::warn!("interrupted, not sending remaining requests");
            outcome.fail(FAILURE);
            break;
        }
        let record = match step {
            Step::Call(message) => deliver(&mut session, message, &mut outcome),
            Step::Notify(message) => notify(&mut session, &message, &mut outcome),
        };
        print_record(&record, format);
    }

    if let Err(err) = session.shutdown() {
        tracing::warn!(error = %err, "server shutdown failed");
    }

    Ok(outcome.code())
}

#[derive(Debug, Default)]
struct Outcome {
    first_failure: Option<i32>,
}

impl Outcome {
    fn fail(&mut self, code: i32) {
        self.first_failure.get_or_insert(code);
    }

    fn should_stop(&self, keep_going: bool) -> bool {
        self.first_failure.is_some() && !keep_going
    }

    fn code(&self) -> i32 {
        self.first_failure.unwrap_or(SUCCESS)
    }
}

fn deliver(session: &mut Session, message: Message, outcome: &mut Outcome) -> CallRecord {
    let method = message.method().unwrap_or_default().to_string();
    let started = Instant::now();
    match session.request(message) {
        Ok(response) => {
            let id = response.id().cloned();
            let status = if response.error().is_some() {
                outcome.fail(DATA_INVALID);
                "remote_error"
            } else {
                "ok"
            };
            CallRecord::new(&method, id, status, elapsed_ms(started))
                .with_response(response.into_value())
        }
        Err(err) => {
            outcome.fail(rpc_exit_code(&err));
            failure_record(&method, None, &err, started)
        }
    }
}

fn notify(session: &mut Session, message: &Message, outcome: &mut Outcome) -> CallRecord {
    let method = message.method().unwrap_or_default();
    let started = Instant::now();
    match session.send(message) {
        Ok(()) => CallRecord::new(method, None, "sent", elapsed_ms(started)),
        Err(err) => {
            outcome.fail(rpc_exit_code(&err));
            failure_record(method, None, &err, started)
        }
    }
}

fn failure_record(method: &str, id: Option<Value>, err: &RpcError, started: Instant) -> CallRecord {
    CallRecord::new(method, id, err.kind(), elapsed_ms(started)).with_error(err.to_string())
}

fn build_plan(args: &CallArgs) -> CliResult<Vec<Step>> {
    let mut steps = Vec::with_capacity(args.requests.len() + 1);

    for raw in &args.requests {
        let message = Message::parse(raw)
            .ok_or_else(|| CliError::usage(format!("--request is not a JSON object: {raw}")))?;
        if message.method().is_none() {
            return Err(CliError::usage(format!(
                "--request has no method: {raw}"
            )));
        }
        steps.push(step_for(message));
    }

    if let Some(method) = &args.method {
        let params = args
            .params
            .as_deref()
            .map(|raw| {
                serde_json::from_str::<Value>(raw).map_err(|err| {
                    CliError::usage(format!("--params is not valid JSON: {err}"))
                })
            })
            .transpose()?;
        steps.push(step_for(Message::notification(method, params)));
    }

    if steps.is_empty() && !args.initialize {
        return Err(CliError::usage(
            "nothing to send: use --initialize, --request or --method",
        ));
    }
    Ok(steps)
}

fn step_for(message: Message) -> Step {
    if message.id().is_none() && message.is_notification(NOTIFICATION_PREFIX) {
        Step::Notify(message)
    } else {
        Step::Call(message)
    }
}

fn command_spec(args: &CallArgs) -> CliResult<CommandSpec> {
    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| CliError::usage("missing server program after `--`"))?;

    let mut spec = CommandSpec::new(program).args(rest);
    if let Some(dir) = &args.cwd {
        spec = spec.current_dir(dir);
    }
    for (key, value) in &args.env {
        spec = spec.env(key, value);
    }
    Ok(spec)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    fn args() -> CallArgs {
        CallArgs {
            cwd: None,
            env: Vec::new(),
            ready_wait: "0".to_string(),
            timeout: "1s".to_string(),
            initialize: false,
            client_name: "stdiorpc".to_string(),
            requests: Vec::new(),
            method: None,
            params: None,
            keep_going: false,
            command: vec![OsString::from("server"), OsString::from("--stdio")],
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn plan_keeps_order_and_separates_notifications() {
        let args = CallArgs {
            requests: vec![
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#.to_string(),
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
                r#"{"jsonrpc":"2.0","method":"tools/list"}"#.to_string(),
            ],
            ..args()
        };
        let steps = build_plan(&args).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], Step::Call(m) if m.method() == Some("initialize")));
        assert!(matches!(&steps[1], Step::Notify(_)));
        assert!(matches!(&steps[2], Step::Call(m) if m.id().is_none()));
    }

    #[test]
    fn plan_from_method_and_params() {
        let args = CallArgs {
            method: Some("tools/call".to_string()),
            params: Some(r#"{"name":"echo","arguments":{}}"#.to_string()),
            ..args()
        };
        let steps = build_plan(&args).unwrap();
        match &steps[..] {
            [Step::Call(message)] => {
                assert_eq!(message.params().unwrap()["name"], "echo");
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn plan_rejects_bad_input() {
        let not_object = CallArgs {
            requests: vec!["[1]".to_string()],
            ..args()
        };
        assert_eq!(build_plan(&not_object).unwrap_err().code, crate::exit::USAGE);

        let no_method = CallArgs {
            requests: vec![r#"{"id":1}"#.to_string()],
            ..args()
        };
        assert!(build_plan(&no_method).is_err());

        let bad_params = CallArgs {
            method: Some("ping".to_string()),
            params: Some("{".to_string()),
            ..args()
        };
        assert!(build_plan(&bad_params).is_err());

        assert!(build_plan(&args()).is_err());
        let handshake_only = CallArgs {
            initialize: true,
            ..args()
        };
        assert!(build_plan(&handshake_only).unwrap().is_empty());
    }

    #[test]
    fn command_spec_applies_cwd_and_env() {
        let args = CallArgs {
            cwd: Some("/tmp".into()),
            env: vec![("MODE".to_string(), "test".to_string())],
            ..args()
        };
        let spec = command_spec(&args).unwrap();
        assert_eq!(spec.program(), "server");
        assert_eq!(spec.get_args().to_vec(), vec![OsString::from("--stdio")]);
        assert_eq!(spec.working_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn outcome_keeps_first_failure() {
        let mut outcome = Outcome::default();
        assert_eq!(outcome.code(), SUCCESS);
        assert!(!outcome.should_stop(false));

        outcome.fail(crate::exit::TIMEOUT);
        outcome.fail(crate::exit::CHILD_EXITED);
        assert_eq!(outcome.code(), crate::exit::TIMEOUT);
        assert!(outcome.should_stop(false));
        assert!(!outcome.should_stop(true));
    }
}
