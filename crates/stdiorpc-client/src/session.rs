use std::process::{ChildStdin, ExitStatus};
use std::time::Duration;

use serde_json::Value;
use stdiorpc_line::{forward_to_log, LineTap};
use stdiorpc_process::{
    CommandSpec, FixedDelay, ProcessSupervisor, ReadinessPolicy, SupervisorConfig,
};
use tracing::{debug, info, warn};

use crate::channel::{ChannelConfig, ChannelStats, RpcChannel};
use crate::error::{Result, RpcError};
use crate::message::{Message, RequestId};

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Readiness wait after spawning (fixed-delay policy). Default: 8s.
    pub ready_wait: Duration,
    /// Budget for each call. Default: 15s.
    pub call_timeout: Duration,
    /// How long the child may take to exit on its own after its input is
    /// closed, before it is terminated. Default: 2s.
    pub stdin_close_grace: Duration,
    pub supervisor: SupervisorConfig,
    pub channel: ChannelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_wait: Duration::from_secs(8),
            call_timeout: Duration::from_secs(15),
            stdin_close_grace: Duration::from_secs(2),
            supervisor: SupervisorConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

/// One conversation with a server process: spawn, calls, shutdown.
///
/// Requests are issued one at a time with sequential integer ids starting
/// at 1. Dropping a session terminates the process.
pub struct Session {
    channel: RpcChannel<ChildStdin>,
    supervisor: ProcessSupervisor,
    config: SessionConfig,
    next_id: i64,
}

impl Session {
    /// Spawn `spec` with default configuration and wait until it is ready.
    pub fn start(spec: &CommandSpec) -> Result<Self> {
        Self::start_with_config(spec, SessionConfig::default())
    }

    /// Spawn `spec` and wait `config.ready_wait` for it to settle.
    pub fn start_with_config(spec: &CommandSpec, config: SessionConfig) -> Result<Self> {
        let mut policy = FixedDelay {
            delay: config.ready_wait,
            poll_interval: config.supervisor.poll_interval,
        };
        Self::start_with_readiness(spec, config, &mut policy)
    }

    /// Spawn `spec` and decide readiness with an explicit policy.
    pub fn start_with_readiness(
        spec: &CommandSpec,
        config: SessionConfig,
        readiness: &mut dyn ReadinessPolicy,
    ) -> Result<Self> {
        Self::launch(spec, config, readiness, None)
    }

    /// Like [`Session::start_with_readiness`], with every output line also
    /// passed to `tap`.
    pub fn start_with_tap(
        spec: &CommandSpec,
        config: SessionConfig,
        readiness: &mut dyn ReadinessPolicy,
        tap: LineTap,
    ) -> Result<Self> {
        Self::launch(spec, config, readiness, Some(tap))
    }

    fn launch(
        spec: &CommandSpec,
        config: SessionConfig,
        readiness: &mut dyn ReadinessPolicy,
        tap: Option<LineTap>,
    ) -> Result<Self> {
        let mut supervisor = ProcessSupervisor::spawn_with_config(spec, config.supervisor.clone())?;
        let stdio = supervisor.take_stdio()?;

        // Detached: the thread ends when the child's stderr closes.
        forward_to_log("stderr", stdio.stderr)?;

        let channel = match tap {
            Some(tap) => {
                RpcChannel::with_tap(stdio.stdin, stdio.stdout, config.channel.clone(), tap)?
            }
            None => RpcChannel::with_config(stdio.stdin, stdio.stdout, config.channel.clone())?,
        };

        if !supervisor.await_ready_with(readiness) {
            return Err(RpcError::ProcessExited);
        }

        Ok(Self {
            channel,
            supervisor,
            config,
            next_id: 1,
        })
    }

    /// Send a request with the next sequential id and wait for its response.
    pub fn call(&mut self, method: &str, params: Option<Value>) -> Result<Message> {
        let id = self.next_request_id();
        let message = Message::request(id.clone(), method, params);
        self.exchange(&message, &id)
    }

    /// Send a caller-built request and wait for its response.
    ///
    /// A request without a usable `id` is given the next sequential one.
    pub fn request(&mut self, mut message: Message) -> Result<Message> {
        let id = match message.request_id() {
            Some(id) => id,
            None => {
                let id = self.next_request_id();
                message.set_id(&id);
                id
            }
        };
        self.exchange(&message, &id)
    }

    /// Send a notification. Nothing is awaited.
    pub fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(&Message::notification(method, params))
    }

    /// Write a message without waiting for anything.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.channel
            .send(message)
            .map_err(|err| self.exited_or(err))
    }

    /// Close the child's input, give it a moment to exit, then terminate it.
    pub fn shutdown(mut self) -> Result<Option<ExitStatus>> {
        self.channel.close_input();
        if self.supervisor.wait_for_exit(self.config.stdin_close_grace) {
            debug!(pid = self.supervisor.id(), "child exited after input closed");
        }
        let status = self.supervisor.terminate()?;
        let stats = self.channel.stats();
        info!(
            pid = self.supervisor.id(),
            ?status,
            lines = stats.lines_read,
            matched = stats.matched,
            "session closed"
        );
        Ok(status)
    }

    /// Whether the server process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.supervisor.is_alive()
    }

    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn channel(&self) -> &RpcChannel<ChildStdin> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut RpcChannel<ChildStdin> {
        &mut self.channel
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ProcessSupervisor {
        &mut self.supervisor
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        id
    }

    fn exchange(&mut self, message: &Message, id: &RequestId) -> Result<Message> {
        self.send(message)?;
        self.channel
            .receive_matching(id, self.config.call_timeout, &mut self.supervisor)
            .inspect_err(|err| {
                warn!(%id, method = ?message.method(), error = %err, "call failed");
            })
    }

    /// A write to a dead child fails with a pipe error; report the exit instead.
    fn exited_or(&mut self, err: RpcError) -> RpcError {
        match err {
            RpcError::Io(_) if !self.channel.is_input_closed() && !self.supervisor.is_alive() => {
                RpcError::ProcessExited
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("supervisor", &self.supervisor)
            .field("channel", &self.channel)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use stdiorpc_process::PollUntil;

    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn quick() -> SessionConfig {
        SessionConfig {
            ready_wait: Duration::from_millis(50),
            call_timeout: Duration::from_secs(10),
            stdin_close_grace: Duration::from_secs(2),
            supervisor: SupervisorConfig {
                terminate_grace: Duration::from_secs(2),
                poll_interval: Duration::from_millis(10),
            },
            channel: ChannelConfig {
                poll_interval: Duration::from_millis(20),
                ..ChannelConfig::default()
            },
        }
    }

    /// Answers every request line with `{"id":<n>,"result":<n>}` using the
    /// request's own numeric id.
    const ECHO_IDS: &str = r#"
        while IFS= read -r line; do
            id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
            if [ -n "$id" ]; then
                printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "$id"
            fi
        done
    "#;

    #[test]
    fn noisy_server_answers_first_call() {
        let script = r#"
            read -r line
            echo 'not json'
            echo '{"jsonrpc":"2.0","method":"notifications/progress","params":{}}'
            echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'
            read -r line
        "#;
        let mut session = Session::start_with_config(&sh(script), quick()).unwrap();
        let response = session.call("initialize", Some(json!({}))).unwrap();
        assert_eq!(response.result(), Some(&json!({"ok": true})));

        let stats = session.stats();
        assert_eq!(stats.noise, 1);
        assert_eq!(stats.notifications, 1);
        session.shutdown().unwrap();
    }

    #[test]
    fn sequential_ids_start_at_one() {
        let mut session = Session::start_with_config(&sh(ECHO_IDS), quick()).unwrap();
        for expected in 1..=3 {
            let response = session.call("ping", None).unwrap();
            assert_eq!(response.result(), Some(&json!(expected)));
        }
        let status = session.shutdown().unwrap();
        assert!(status.is_some_and(|s| s.success()));
    }

    #[test]
    fn request_assigns_missing_id() {
        let mut session = Session::start_with_config(&sh(ECHO_IDS), quick()).unwrap();

        let mut custom = Message::notification("tools/list", None);
        custom.set_id(&RequestId::Number(41));
        let response = session.request(custom).unwrap();
        assert_eq!(response.result(), Some(&json!(41)));

        let response = session
            .request(Message::notification("tools/list", None))
            .unwrap();
        assert_eq!(response.result(), Some(&json!(1)));
        session.shutdown().unwrap();
    }

    #[test]
    fn request_keeps_integer_id_above_i64() {
        let mut session = Session::start_with_config(&sh(ECHO_IDS), quick()).unwrap();

        let response = session
            .request(Message::request(u64::MAX, "tools/list", None))
            .unwrap();
        assert_eq!(response.id(), Some(&json!(u64::MAX)));
        assert_eq!(response.result(), Some(&json!(u64::MAX)));

        let response = session.call("ping", None).unwrap();
        assert_eq!(response.result(), Some(&json!(1)));
        session.shutdown().unwrap();
    }

    #[test]
    fn silent_exit_is_process_exited() {
        let config = SessionConfig {
            call_timeout: Duration::from_secs(30),
            ..quick()
        };
        let mut session = Session::start_with_config(&sh("read -r line; exit 0"), config).unwrap();

        let started = Instant::now();
        let err = session.call("tools/list", None).unwrap_err();
        assert!(matches!(err, RpcError::ProcessExited), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!session.is_alive());
    }

    #[test]
    fn unanswered_call_times_out_while_alive() {
        let config = SessionConfig {
            call_timeout: Duration::from_millis(300),
            ..quick()
        };
        let mut session = Session::start_with_config(&sh("cat > /dev/null"), config).unwrap();

        let started = Instant::now();
        let err = session.call("tools/list", None).unwrap_err();
        assert!(matches!(err, RpcError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(session.is_alive());
        session.shutdown().unwrap();
    }

    #[test]
    fn child_dead_before_ready() {
        let config = SessionConfig {
            ready_wait: Duration::from_secs(5),
            ..quick()
        };
        let err = Session::start_with_config(&sh("exit 7"), config).unwrap_err();
        assert!(matches!(err, RpcError::ProcessExited));
    }

    #[test]
    fn spawn_failure_surfaces_as_process_error() {
        let err = Session::start_with_config(
            &CommandSpec::new("/nonexistent/stdiorpc-server"),
            quick(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "spawn_failed");
    }

    #[test]
    fn send_to_exited_child_is_process_exited() {
        let mut session =
            Session::start_with_config(&sh("exec 0<&-; sleep 0.3"), quick()).unwrap();
        assert!(session.supervisor_mut().wait_for_exit(Duration::from_secs(5)));

        let err = session.call("ping", None).unwrap_err();
        assert!(matches!(err, RpcError::ProcessExited), "got {err:?}");
    }

    #[test]
    fn readiness_signal_from_tap() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ready = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ready);
        let tap: LineTap = Box::new(move |line| {
            if line.contains("server ready") {
                flag.store(true, Ordering::SeqCst);
            }
        });
        let signal = Arc::clone(&ready);
        let mut policy = PollUntil::new(Duration::from_secs(5), move || {
            signal.load(Ordering::SeqCst)
        })
        .strict()
        .with_poll_interval(Duration::from_millis(10));

        let script = format!("echo 'server ready'; {ECHO_IDS}");
        let mut session =
            Session::start_with_tap(&sh(&script), quick(), &mut policy, tap).unwrap();
        assert!(ready.load(Ordering::SeqCst));

        let response = session.call("ping", None).unwrap();
        assert_eq!(response.result(), Some(&json!(1)));
        assert_eq!(session.stats().noise, 1);
        session.shutdown().unwrap();
    }

    #[test]
    fn shutdown_terminates_server_that_ignores_eof() {
        let config = SessionConfig {
            stdin_close_grace: Duration::from_millis(100),
            ..quick()
        };
        let session = Session::start_with_config(&sh("while :; do sleep 1; done"), config).unwrap();
        let started = Instant::now();
        let status = session.shutdown().unwrap();
        assert!(status.is_some_and(|s| !s.success()));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
