//! Server lifecycle controller.
//!
//! Starts, stops and restarts the game server inside a supervised detached
//! session and reports whether that session exists.
//!
//! # Architecture
//!
//! * **Supervisor**: a [`SessionSupervisor`] owns the actual process; the
//!   controller only launches sessions, types console commands and polls
//!   the session listing.
//! * **State**: nothing is cached. Every decision is made on a fresh
//!   [`ServerState`] read from the supervisor.
//! * **Waiting**: after launch or stop the controller polls at a fixed
//!   interval until the desired state is observed, the deadline passes, or
//!   the cancellation token fires.

mod supervisor;

pub use supervisor::{session_listed, ScreenSupervisor, SessionSupervisor};

use async_trait::async_trait;
use chrono::Local;
use std::fs;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::error::{ServerError, ServerResult};
use crate::health::{check_binary, format_size, HealthCheck};
use crate::services::ServerManager;
use crate::types::ServerState;

/// Controls one server instance through a session supervisor.
pub struct ServerController<S = ScreenSupervisor> {
    /// Lifecycle settings: paths, launch command, timeouts
    config: LifecycleConfig,

    /// Session multiplexer the server runs under
    supervisor: S,
}

impl ServerController<ScreenSupervisor> {
    /// Controller driving GNU `screen`.
    pub fn with_screen(config: LifecycleConfig) -> Self {
        Self::new(config, ScreenSupervisor::default())
    }
}

impl<S: SessionSupervisor> ServerController<S> {
    pub fn new(config: LifecycleConfig, supervisor: S) -> Self {
        Self { config, supervisor }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Observes the current state. A supervisor that cannot be queried is
    /// reported as "not running".
    pub async fn status(&self) -> ServerState {
        let session = &self.config.session_name;
        let running = match self.supervisor.list_sessions().await {
            Ok(listing) => session_listed(&listing, session),
            Err(e) => {
                debug!(session = %session, error = %e, "Session listing failed");
                false
            }
        };

        ServerState {
            running,
            session_name: session.clone(),
            checked_at: Local::now(),
        }
    }

    /// Launches the server unless it is already running, then waits for the
    /// session to appear.
    pub async fn start(&self, cancel: &CancellationToken) -> ServerResult<()> {
        let session = &self.config.session_name;
        if self.config.dry_run {
            info!(session = %session, "Dry run: would start server");
            return Ok(());
        }

        if self.status().await.running {
            warn!(session = %session, "Server is already running");
            return Ok(());
        }

        let jar = self.config.server_dir.join(&self.config.jar_name);
        if !jar.is_file() {
            return Err(ServerError::ArtifactNotFound(jar));
        }

        let mut args = self.config.java_flags.clone();
        args.extend(["-jar".to_string(), self.config.jar_name.clone(), "nogui".to_string()]);

        info!(session = %session, jar = %jar.display(), "Starting server");
        self.supervisor
            .launch(session, &self.config.server_dir, &self.config.java_binary, &args)
            .await
            .map_err(|source| ServerError::Launch {
                session: session.clone(),
                source,
            })?;

        let started = Instant::now();
        if self.wait_for(true, self.config.startup_timeout, cancel).await? {
            info!(session = %session, startup_time = ?started.elapsed(), "Server started");
            Ok(())
        } else {
            Err(ServerError::StartupTimeout(self.config.startup_timeout.as_secs()))
        }
    }

    /// Sends the stop command unless the server is already stopped, then
    /// waits for the session to disappear.
    pub async fn stop(&self, cancel: &CancellationToken) -> ServerResult<()> {
        let session = &self.config.session_name;
        if self.config.dry_run {
            info!(session = %session, "Dry run: would stop server");
            return Ok(());
        }

        if !self.status().await.running {
            warn!(session = %session, "Server is not running");
            return Ok(());
        }

        let command = &self.config.stop_command;
        info!(session = %session, command = %command, "Stopping server");
        self.supervisor
            .send_input(session, &format!("{command}\n"))
            .await
            .map_err(|source| ServerError::SendCommand {
                session: session.clone(),
                command: command.clone(),
                source,
            })?;

        let started = Instant::now();
        if self.wait_for(false, self.config.max_stop_wait, cancel).await? {
            info!(session = %session, wait_time = ?started.elapsed(), "Server stopped");
            Ok(())
        } else {
            Err(ServerError::StopTimeout(self.config.max_stop_wait.as_secs()))
        }
    }

    /// Stop, a short settle pause, then start.
    ///
    /// Failures are wrapped with the phase they happened in; cancellation is
    /// returned as is.
    pub async fn restart(&self, cancel: &CancellationToken) -> ServerResult<()> {
        info!(session = %self.config.session_name, "Restarting server");

        self.stop(cancel).await.map_err(|e| in_phase("stop", e))?;

        if !self.config.dry_run {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ServerError::Cancelled),
                _ = tokio::time::sleep(self.config.settle_delay) => {}
            }
        }

        self.start(cancel).await.map_err(|e| in_phase("start", e))
    }

    /// Polls until the observed running state equals `running`.
    ///
    /// Returns `Ok(false)` once `timeout` has elapsed without reaching it.
    async fn wait_for(
        &self,
        running: bool,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ServerResult<bool> {
        let poll = self.config.poll_interval.max(Duration::from_millis(1));
        let deadline = Instant::now() + timeout;
        let mut ticker = interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ServerError::Cancelled),
                _ = ticker.tick() => {}
            }

            if self.status().await.running == running {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    pub async fn health_check(&self) -> Vec<HealthCheck> {
        let dir = &self.config.server_dir;
        let directory = if dir.is_dir() {
            HealthCheck::ok("Server directory", "OK")
        } else {
            HealthCheck::error("Server directory", "Directory not found")
        };

        let jar = match fs::metadata(dir.join(&self.config.jar_name)) {
            Ok(meta) if meta.is_file() => {
                HealthCheck::ok("Server JAR", format!("Found ({})", format_size(meta.len())))
            }
            _ => HealthCheck::error("Server JAR", format!("Not found: {}", self.config.jar_name)),
        };

        vec![
            directory,
            jar,
            check_binary(&self.config.java_binary, "Java Runtime", Duration::from_secs(10)).await,
            self.supervisor.health_check().await,
        ]
    }
}

fn in_phase(phase: &'static str, err: ServerError) -> ServerError {
    match err {
        ServerError::Cancelled => ServerError::Cancelled,
        other => ServerError::Restart {
            phase,
            source: Box::new(other),
        },
    }
}

#[async_trait]
impl<S: SessionSupervisor> ServerManager for ServerController<S> {
    async fn start(&self, cancel: &CancellationToken) -> ServerResult<()> {
        ServerController::start(self, cancel).await
    }

    async fn stop(&self, cancel: &CancellationToken) -> ServerResult<()> {
        ServerController::stop(self, cancel).await
    }

    async fn restart(&self, cancel: &CancellationToken) -> ServerResult<()> {
        ServerController::restart(self, cancel).await
    }

    async fn status(&self) -> ServerState {
        ServerController::status(self).await
    }

    async fn health_check(&self) -> Vec<HealthCheck> {
        ServerController::health_check(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory supervisor. Launching registers the session unless
    /// `ignore_launch` is set; the stop command removes it unless
    /// `ignore_stop` is set.
    #[derive(Default)]
    struct FakeSupervisor {
        sessions: Mutex<Vec<String>>,
        launches: Mutex<Vec<(String, PathBuf, String, Vec<String>)>>,
        inputs: Mutex<Vec<String>>,
        list_calls: AtomicUsize,
        ignore_launch: bool,
        ignore_stop: bool,
    }

    impl FakeSupervisor {
        fn running(session: &str) -> Self {
            let fake = Self::default();
            fake.sessions.lock().unwrap().push(session.to_string());
            fake
        }

        fn launch_count(&self) -> usize {
            self.launches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SessionSupervisor for FakeSupervisor {
        async fn list_sessions(&self) -> io::Result<String> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let sessions = self.sessions.lock().unwrap();
            Ok(sessions
                .iter()
                .enumerate()
                .map(|(i, s)| format!("\t{}.{s}\t(Detached)\n", 1000 + i))
                .collect())
        }

        async fn launch(
            &self,
            session: &str,
            working_dir: &Path,
            program: &str,
            args: &[String],
        ) -> io::Result<()> {
            self.launches.lock().unwrap().push((
                session.to_string(),
                working_dir.to_path_buf(),
                program.to_string(),
                args.to_vec(),
            ));
            if !self.ignore_launch {
                self.sessions.lock().unwrap().push(session.to_string());
            }
            Ok(())
        }

        async fn send_input(&self, session: &str, input: &str) -> io::Result<()> {
            self.inputs.lock().unwrap().push(input.to_string());
            if !self.ignore_stop && input == "stop\n" {
                self.sessions.lock().unwrap().retain(|s| s != session);
            }
            Ok(())
        }

        async fn health_check(&self) -> HealthCheck {
            HealthCheck::ok("GNU screen", "Available")
        }
    }

    fn server_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("server.jar"), b"jar").unwrap();
        dir
    }

    fn config(dir: &Path) -> LifecycleConfig {
        LifecycleConfig {
            server_dir: dir.to_path_buf(),
            startup_timeout: Duration::from_millis(200),
            max_stop_wait: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            settle_delay: Duration::from_millis(5),
            ..LifecycleConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_launches_and_waits_for_session() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::default());

        controller.start(&CancellationToken::new()).await.unwrap();

        assert!(controller.status().await.running);
        let launches = controller.supervisor.launches.lock().unwrap();
        let (session, working_dir, program, args) = &launches[0];
        assert_eq!(session, "minecraft");
        assert_eq!(working_dir, dir.path());
        assert_eq!(program, "java");
        assert_eq!(args, &["-Xms4G", "-Xmx4G", "-jar", "server.jar", "nogui"]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::running("minecraft"));

        controller.start(&CancellationToken::new()).await.unwrap();
        assert_eq!(controller.supervisor.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_without_jar() {
        let dir = TempDir::new().unwrap();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::default());

        let err = controller.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::ArtifactNotFound(ref p) if p.ends_with("server.jar")));
        assert_eq!(controller.supervisor.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_times_out_when_session_never_appears() {
        let dir = server_dir();
        let fake = FakeSupervisor {
            ignore_launch: true,
            ..FakeSupervisor::default()
        };
        let controller = ServerController::new(config(dir.path()), fake);

        let err = controller.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::StartupTimeout(_)));
        assert!(controller.supervisor.list_calls.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test]
    async fn test_stop_sends_command_and_waits() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::running("minecraft"));

        controller.stop(&CancellationToken::new()).await.unwrap();

        assert!(!controller.status().await.running);
        assert_eq!(*controller.supervisor.inputs.lock().unwrap(), vec!["stop\n".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::default());

        controller.stop(&CancellationToken::new()).await.unwrap();
        assert!(controller.supervisor.inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_timeout() {
        let dir = server_dir();
        let fake = FakeSupervisor {
            ignore_stop: true,
            ..FakeSupervisor::running("minecraft")
        };
        let controller = ServerController::new(config(dir.path()), fake);

        let err = controller.stop(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::StopTimeout(_)));
    }

    #[tokio::test]
    async fn test_restart_cycles_session() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::running("minecraft"));

        controller.restart(&CancellationToken::new()).await.unwrap();

        assert!(controller.status().await.running);
        assert_eq!(controller.supervisor.launch_count(), 1);
        assert_eq!(controller.supervisor.inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_reports_failed_phase() {
        let dir = server_dir();
        let fake = FakeSupervisor {
            ignore_stop: true,
            ..FakeSupervisor::running("minecraft")
        };
        let controller = ServerController::new(config(dir.path()), fake);

        let err = controller.restart(&CancellationToken::new()).await.unwrap_err();
        match err {
            ServerError::Restart { phase, source } => {
                assert_eq!(phase, "stop");
                assert!(matches!(*source, ServerError::StopTimeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(controller.supervisor.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_never_touches_supervisor() {
        let dir = server_dir();
        let controller = ServerController::new(
            LifecycleConfig {
                dry_run: true,
                ..config(dir.path())
            },
            FakeSupervisor::default(),
        );
        let cancel = CancellationToken::new();

        controller.start(&cancel).await.unwrap();
        controller.stop(&cancel).await.unwrap();
        controller.restart(&cancel).await.unwrap();

        assert_eq!(controller.supervisor.launch_count(), 0);
        assert_eq!(controller.supervisor.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_startup_wait() {
        let dir = server_dir();
        let fake = FakeSupervisor {
            ignore_launch: true,
            ..FakeSupervisor::default()
        };
        let controller = ServerController::new(
            LifecycleConfig {
                startup_timeout: Duration::from_secs(60),
                ..config(dir.path())
            },
            fake,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = controller.start(&cancel).await.unwrap_err();
        assert!(matches!(err, ServerError::Cancelled));
    }

    #[tokio::test]
    async fn test_health_check_reports_directory_and_jar() {
        let dir = server_dir();
        let controller = ServerController::new(config(dir.path()), FakeSupervisor::default());
        let checks = controller.health_check().await;

        assert_eq!(checks.len(), 4);
        assert_eq!(checks[0].status, HealthStatus::Ok);
        assert_eq!(checks[1].name, "Server JAR");
        assert_eq!(checks[1].status, HealthStatus::Ok);
        assert_eq!(checks[3].name, "GNU screen");

        let missing = ServerController::new(
            config(&dir.path().join("absent")),
            FakeSupervisor::default(),
        );
        let checks = missing.health_check().await;
        assert_eq!(checks[0].message, "Directory not found");
        assert_eq!(checks[1].message, "Not found: server.jar");
    }
}
