use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ProcessError, Result};

/// Description of the server process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    /// Start a command description for `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Run the process in `dir` instead of the caller's working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child (inherits everything else).
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Program name for diagnostics.
    pub fn display_program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Build the `std::process::Command` with all three streams piped.
    pub(crate) fn to_command(&self) -> Result<Command> {
        if self.program.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_arguments_and_env() {
        let spec = CommandSpec::new("java")
            .arg("-jar")
            .args(["server.jar", "--stdio"])
            .current_dir("/srv/app")
            .env("DB_TYPE", "mysql");

        assert_eq!(spec.program(), "java");
        assert_eq!(
            spec.get_args().to_vec(),
            vec![
                OsString::from("-jar"),
                OsString::from("server.jar"),
                OsString::from("--stdio")
            ]
        );
        assert_eq!(spec.working_dir(), Some(Path::new("/srv/app")));
        assert_eq!(spec.display_program(), "java");

        let command = spec.to_command().unwrap();
        let envs: Vec<_> = command.get_envs().collect();
        assert_eq!(envs, vec![(OsStr::new("DB_TYPE"), Some(OsStr::new("mysql")))]);
        assert_eq!(command.get_current_dir(), Some(Path::new("/srv/app")));
    }

    #[test]
    fn empty_program_is_rejected() {
        let err = CommandSpec::new("").to_command().unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }
}
