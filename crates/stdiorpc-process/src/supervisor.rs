use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::CommandSpec;
use crate::error::{ProcessError, Result};
use crate::readiness::{FixedDelay, ReadinessPolicy};
use crate::signal;

/// Non-blocking liveness probe.
///
/// The RPC layer only needs to know whether the peer process is still
/// running; this trait keeps it independent of how that is determined.
pub trait Liveness {
    /// Returns `true` while the process has not exited.
    fn is_alive(&mut self) -> bool;
}

/// The three piped standard streams of a child process.
#[derive(Debug)]
pub struct ChildStdio {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Supervisor behaviour settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a terminated child may take to exit before it is killed.
    pub terminate_grace: Duration,
    /// Slice between exit-status polls.
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            terminate_grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Owns a child process from spawn to reap.
///
/// Dropping the supervisor terminates the child, so a process can never
/// outlive the value that started it.
pub struct ProcessSupervisor {
    child: Option<Child>,
    pid: u32,
    program: String,
    exit_status: Option<ExitStatus>,
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    /// Spawn `spec` with default supervisor settings.
    pub fn spawn(spec: &CommandSpec) -> Result<Self> {
        Self::spawn_with_config(spec, SupervisorConfig::default())
    }

    /// Spawn `spec` with explicit supervisor settings.
    pub fn spawn_with_config(spec: &CommandSpec, config: SupervisorConfig) -> Result<Self> {
        let program = spec.display_program();
        let child = spec
            .to_command()?
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;
        let pid = child.id();

        info!(pid, %program, cwd = ?spec.working_dir(), "spawned child process");

        Ok(Self {
            child: Some(child),
            pid,
            program,
            exit_status: None,
            config,
        })
    }

    /// Hand out the child's stdio. Can only succeed once.
    pub fn take_stdio(&mut self) -> Result<ChildStdio> {
        let child = self.child.as_mut().ok_or(ProcessError::StdioTaken)?;
        match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => Ok(ChildStdio {
                stdin,
                stdout,
                stderr,
            }),
            _ => Err(ProcessError::StdioTaken),
        }
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Program name the process was started from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit status, once the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Non-blocking poll of the exit status.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = self.pid, ?status, "child process exited");
                self.exit_status = Some(status);
                false
            }
            Err(err) => {
                warn!(pid = self.pid, error = %err, "failed to poll child process");
                false
            }
        }
    }

    /// Wait up to `max_wait` for the child to settle (fixed-delay policy).
    ///
    /// Returns `false` only when the process exited during the wait.
    pub fn await_ready(&mut self, max_wait: Duration) -> bool {
        let mut policy = FixedDelay {
            delay: max_wait,
            poll_interval: self.config.poll_interval,
        };
        self.await_ready_with(&mut policy)
    }

    /// Wait for readiness using an explicit policy.
    pub fn await_ready_with(&mut self, policy: &mut dyn ReadinessPolicy) -> bool {
        let ready = policy.await_ready(self);
        if ready {
            info!(pid = self.pid, "child process ready");
        } else {
            warn!(
                pid = self.pid,
                status = ?self.exit_status,
                "child process not ready"
            );
        }
        ready
    }

    /// Poll for exit for at most `grace`. Returns `true` if the process exited.
    pub fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if !self.is_alive() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(self.config.poll_interval));
        }
    }

    /// Request graceful termination, then block until the process is reaped.
    ///
    /// Escalates to a kill once `terminate_grace` has passed. Safe to call
    /// repeatedly and after the process already exited.
    pub fn terminate(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(self.exit_status);
        };

        if self.exit_status.is_none() {
            match child.try_wait() {
                Ok(Some(status)) => self.exit_status = Some(status),
                Ok(None) | Err(_) => {
                    debug!(pid = self.pid, "requesting graceful termination");
                    if let Err(err) = signal::request_termination(&mut child) {
                        warn!(pid = self.pid, error = %err, "termination request failed");
                    }
                    self.exit_status = Some(self.reap(&mut child)?);
                }
            }
        }

        // Dropping the handle closes any stdio that was never taken.
        drop(child);
        info!(pid = self.pid, status = ?self.exit_status, "child process terminated");
        Ok(self.exit_status)
    }

    fn reap(&self, child: &mut Child) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.config.terminate_grace;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(self.config.poll_interval));
        }

        warn!(
            pid = self.pid,
            grace = ?self.config.terminate_grace,
            "child ignored termination request, killing"
        );
        if let Err(err) = child.kill() {
            debug!(pid = self.pid, error = %err, "kill failed, process already exiting");
        }
        Ok(child.wait()?)
    }
}

impl Liveness for ProcessSupervisor {
    fn is_alive(&mut self) -> bool {
        ProcessSupervisor::is_alive(self)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(err) = self.terminate() {
                warn!(pid = self.pid, error = %err, "failed to terminate child on drop");
            }
        }
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("exit_status", &self.exit_status)
            .field("running", &self.child.is_some())
            .finish()
    }
}
