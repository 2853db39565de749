//! Detached terminal-session supervisors.
//!
//! The lifecycle controller never spawns the server process itself. It asks a
//! [`SessionSupervisor`] to run the server inside a named, detached session,
//! to type console commands into it, and to report which sessions exist.

use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::health::{check_binary, HealthCheck};

/// Operations the lifecycle controller needs from a session multiplexer.
#[async_trait]
pub trait SessionSupervisor: Send + Sync {
    /// Raw listing of the sessions that currently exist.
    async fn list_sessions(&self) -> io::Result<String>;

    /// Runs `program args..` in a new detached session named `session`,
    /// with `working_dir` as the current directory.
    async fn launch(
        &self,
        session: &str,
        working_dir: &Path,
        program: &str,
        args: &[String],
    ) -> io::Result<()>;

    /// Types `input` into the session's console.
    async fn send_input(&self, session: &str, input: &str) -> io::Result<()>;

    /// Whether the supervisor itself is usable on this host.
    async fn health_check(&self) -> HealthCheck;
}

/// Whether `listing` contains a session called `session`.
///
/// Session listings name sessions `<pid>.<name>`; only an exact name after
/// the pid counts, so `minecraft` does not match `minecraft-old`.
pub fn session_listed(listing: &str, session: &str) -> bool {
    listing
        .split_whitespace()
        .filter_map(|token| token.split_once('.'))
        .any(|(pid, name)| {
            name == session && !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit())
        })
}

/// [`SessionSupervisor`] backed by GNU `screen`.
#[derive(Debug, Clone)]
pub struct ScreenSupervisor {
    binary: String,
    command_timeout: Duration,
}

impl Default for ScreenSupervisor {
    fn default() -> Self {
        Self {
            binary: "screen".to_string(),
            command_timeout: Duration::from_secs(10),
        }
    }
}

impl ScreenSupervisor {
    pub fn new(binary: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            command_timeout,
        }
    }

    async fn run(&self, command: &mut Command) -> io::Result<std::process::Output> {
        command.stdin(Stdio::null()).kill_on_drop(true);
        tokio::time::timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| {
                io::Error::new(
                    ErrorKind::TimedOut,
                    format!("{} did not finish within {:?}", self.binary, self.command_timeout),
                )
            })?
    }

    fn check_exit(&self, output: &std::process::Output, what: &str) -> io::Result<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(
            ErrorKind::Other,
            format!("{} {what} exited with {}: {}", self.binary, output.status, stderr.trim()),
        ))
    }
}

#[async_trait]
impl SessionSupervisor for ScreenSupervisor {
    async fn list_sessions(&self) -> io::Result<String> {
        let output = self.run(Command::new(&self.binary).arg("-ls")).await?;
        // `screen -ls` exits non-zero when there are no sessions.
        if !output.status.success() {
            debug!(status = %output.status, "screen -ls returned non-zero");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn launch(
        &self,
        session: &str,
        working_dir: &Path,
        program: &str,
        args: &[String],
    ) -> io::Result<()> {
        let output = self
            .run(
                Command::new(&self.binary)
                    .args(["-dmS", session, program])
                    .args(args)
                    .current_dir(working_dir),
            )
            .await?;
        self.check_exit(&output, "-dmS")
    }

    async fn send_input(&self, session: &str, input: &str) -> io::Result<()> {
        let output = self
            .run(Command::new(&self.binary).args(["-S", session, "-X", "stuff", input]))
            .await?;
        self.check_exit(&output, "-X stuff")
    }

    async fn health_check(&self) -> HealthCheck {
        check_binary(&self.binary, "GNU screen", Duration::from_secs(5)).await
    }
}
