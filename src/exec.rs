// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Every foreign process hostprep touches, i.e., the package manager,
//! systemctl, sshd, locale-gen, etc., is reached through the [`Runner`]
//! trait. The engine only ever needs one primitive from the host: run a
//! command, and capture its exit status along with whatever it printed.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

/// Command line to execute.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl Cmd {
    /// Construct new command for target program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set extra environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }
}

impl Display for Cmd {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.program)?;
        for arg in &self.args {
            write!(fmt, " {arg}")?;
        }

        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    /// Exit code, or `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Construct successful output with given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Construct failed output with given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Combine stdout and stderr into one message.
    pub fn message(&self) -> String {
        let mut message = String::new();

        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        message
            .strip_suffix("\r\n")
            .or(message.strip_suffix('\n'))
            .map(ToString::to_string)
            .unwrap_or(message)
    }
}

/// Layer of indirection for process execution.
pub trait Runner {
    /// Run command to completion, capturing its output.
    ///
    /// A non-zero exit status is __not__ an error at this level. Callers
    /// decide what a failed command means for them.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the program cannot be started.
    fn run(&self, cmd: &Cmd) -> Result<Output>;

    /// Run command, and treat non-zero exit status as an error.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the program cannot be started.
    /// - Return [`ExecError::Failed`] if the program exits unsuccessfully.
    fn check(&self, cmd: &Cmd) -> Result<Output> {
        let output = self.run(cmd)?;
        if !output.success() {
            return Err(ExecError::Failed {
                command: cmd.to_string(),
                status: output.status,
                message: output.message(),
            });
        }

        Ok(output)
    }
}

/// Process execution through [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    #[instrument(skip(self), fields(cmd = %cmd), level = "debug")]
    fn run(&self, cmd: &Cmd) -> Result<Output> {
        debug!("spawn {cmd}");

        // INVARIANT: Never let a child process block on the terminal.
        let output = Command::new(cmd.program())
            .args(cmd.get_args())
            .envs(cmd.get_envs().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                command: cmd.to_string(),
                source,
            })?;

        Ok(Output {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        })
    }
}

/// Process execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Program could not be started at all.
    #[error("failed to run {command:?}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Program exited unsuccessfully.
    #[error("command {command:?} failed with status {status:?}:\n{message}")]
    Failed {
        command: String,
        status: Option<i32>,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// Scripted runner that records every command it is handed.
    ///
    /// Responses are matched by prefix against the rendered command line.
    /// Anything unmatched succeeds with empty output.
    #[derive(Debug, Default)]
    pub(crate) struct FakeRunner {
        responses: Vec<(String, Output)>,
        calls: RefCell<Vec<Cmd>>,
    }

    impl FakeRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(mut self, prefix: impl Into<String>, output: Output) -> Self {
            self.responses.push((prefix.into(), output));
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }

        pub(crate) fn commands(&self) -> Vec<Cmd> {
            self.calls.borrow().clone()
        }

        pub(crate) fn called(&self, prefix: &str) -> bool {
            self.calls().iter().any(|call| call.starts_with(prefix))
        }
    }

    impl Runner for FakeRunner {
        fn run(&self, cmd: &Cmd) -> Result<Output> {
            self.calls.borrow_mut().push(cmd.clone());
            let line = cmd.to_string();
            let output = self
                .responses
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| Output::ok(""));

            Ok(output)
        }
    }
}
