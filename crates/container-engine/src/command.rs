//! Command type for invoking the engine client

use async_process::{Command as AsyncCommand, Stdio};
use futures::stream::{self, BoxStream, StreamExt};
use futures_lite::io::{AsyncBufReadExt, BufReader};
use std::ffi::{OsStr, OsString};
use tracing::debug;

use crate::error::{Error, Result};

/// A command to be executed
///
/// Unlike `async_process::Command` this type is `Clone` and renders itself
/// for log lines and error messages.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    /// Returns true if the process exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Render the command line for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert into an `async_process::Command`
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run to completion and capture combined output
    pub async fn output(&self) -> Result<CommandOutput> {
        debug!("Running: {}", self.display());

        let mut cmd = self.prepare();
        cmd.stdin(Stdio::null());
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::spawn_failed(format!("{}: {}", self.display(), e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            code: output.status.code(),
            output: combined,
        })
    }

    /// Spawn and stream stdout and stderr lines as they arrive
    ///
    /// The child process is killed when the stream is dropped.
    pub fn spawn_lines(&self) -> Result<BoxStream<'static, Result<String>>> {
        debug!("Streaming: {}", self.display());

        let mut cmd = self.prepare();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(format!("{}: {}", self.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failed("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::spawn_failed("stderr was not captured"))?;

        let merged = stream::select(BufReader::new(stdout).lines(), BufReader::new(stderr).lines())
            .map(|line| line.map_err(Error::from))
            .boxed();

        // The child rides along in the unfold state so it lives as long as the stream.
        let lines = stream::unfold((merged, child), |(mut merged, child)| async move {
            merged.next().await.map(|line| (line, (merged, child)))
        });

        Ok(lines.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_with_args() {
        let mut cmd = Command::new("docker");
        cmd.arg("inspect").args(["--format", "{{.State.Status}}"]);

        assert_eq!(cmd.display(), "docker inspect --format {{.State.Status}}");
    }

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput {
            code: Some(0),
            output: String::new(),
        };
        assert!(output.success());

        let failed = CommandOutput {
            code: Some(1),
            output: "boom".to_string(),
        };
        assert!(!failed.success());
    }

    #[smol_potat::test]
    async fn test_output_captures_stdout_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2"]);

        let output = cmd.output().await.unwrap();
        assert!(output.success());
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[smol_potat::test]
    async fn test_spawn_lines_streams_all_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo one; echo two"]);

        let lines: Vec<String> = cmd
            .spawn_lines()
            .unwrap()
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
