// Tandem host core - Backend process management
// Builds the platform launch command and owns the spawned backend's lifecycle

use crate::config::{env, DevBackend, HostConfig};
use crate::error::CoreError;
use crate::port::Port;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Whether the backend runs from source or from the packaged build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    Development,
    Production,
}

impl LaunchMode {
    /// `TANDEM_MODE` wins; otherwise debug builds are development builds.
    pub fn detect() -> Self {
        match std::env::var(env::MODE).ok().as_deref() {
            Some("development") | Some("dev") => Self::Development,
            Some("production") | Some("prod") => Self::Production,
            _ if cfg!(debug_assertions) => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

/// Platforms with a packaged backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    /// Parse an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Result<Self, CoreError> {
        match os {
            "macos" | "darwin" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            "windows" | "win32" => Ok(Self::Windows),
            other => Err(CoreError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn current() -> Result<Self, CoreError> {
        Self::from_os(std::env::consts::OS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the host's console.
    Inherit,
    /// Capture output and forward it to the log.
    Piped,
}

/// Everything needed to spawn the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    /// Arguments consumed by the launcher program itself (script path,
    /// `open` flags, `start` prefix).
    pub leading_args: Vec<OsString>,
    /// Arguments the backend receives.
    pub backend_args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub detached: bool,
    pub stdio: StdioMode,
}

impl LaunchPlan {
    /// Interpreter runs the script with the port as its only argument.
    pub fn development(backend: &DevBackend, port: Port) -> Self {
        Self {
            program: PathBuf::from(&backend.interpreter),
            leading_args: vec![backend.script.clone().into_os_string()],
            backend_args: vec![port.to_string()],
            cwd: None,
            detached: false,
            stdio: StdioMode::Inherit,
        }
    }

    /// Packaged executable for `os`. Fails before anything is spawned when
    /// the platform has no packaged backend.
    pub fn production(os: &str, resources_dir: &Path, port: Port) -> Result<Self, CoreError> {
        let platform = Platform::from_os(os)?;
        let (program, leading_args) = match platform {
            Platform::MacOs => (
                PathBuf::from("open"),
                vec![
                    OsString::from("-gj"),
                    resources_dir.join("app.app").into_os_string(),
                    OsString::from("--args"),
                ],
            ),
            Platform::Linux => (resources_dir.join("app").join("app"), Vec::new()),
            Platform::Windows => (
                PathBuf::from("cmd"),
                vec![
                    OsString::from("/C"),
                    OsString::from("start"),
                    // Window title; `start` treats the first quoted arg as one.
                    OsString::from(""),
                    resources_dir.join("app").join("app.exe").into_os_string(),
                ],
            ),
        };

        Ok(Self {
            program,
            leading_args,
            backend_args: vec![port.to_string()],
            cwd: Some(resources_dir.to_path_buf()),
            detached: false,
            stdio: StdioMode::Piped,
        })
    }

    pub fn for_mode(
        mode: LaunchMode,
        os: &str,
        config: &HostConfig,
        resources_dir: &Path,
        port: Port,
    ) -> Result<Self, CoreError> {
        match mode {
            LaunchMode::Development => Ok(Self::development(&config.dev_backend, port)),
            LaunchMode::Production => Self::production(os, resources_dir, port),
        }
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(
            self.leading_args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.extend(self.backend_args.iter().cloned());
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).args(&self.backend_args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        match self.stdio {
            StdioMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            StdioMode::Piped => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }
        // Reaped with the host unless explicitly detached.
        cmd.kill_on_drop(!self.detached);
        cmd
    }
}

/// How the backend ended during shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendExit {
    NotRunning,
    Exited,
    Terminated,
}

/// Handle to the spawned backend.
pub struct BackendProcess {
    child: Mutex<Option<Child>>,
}

impl Default for BackendProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendProcess {
    pub fn new() -> Self {
        Self {
            child: Mutex::new(None),
        }
    }

    /// Spawn the backend described by `plan`. Returns the PID.
    pub async fn start(&self, plan: &LaunchPlan) -> Result<u32, CoreError> {
        tracing::info!(command = %plan.display(), "starting backend");

        let mut child = plan.command().spawn().map_err(|source| CoreError::Spawn {
            program: plan.program.display().to_string(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, "stderr"));
        }

        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, "backend started");
        *self.child.lock().await = Some(child);
        Ok(pid)
    }

    /// Check if the backend process is still running
    pub async fn is_running(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Wait up to `grace` for the backend to exit on its own.
    pub async fn wait_for_exit(&self, grace: Duration) -> bool {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return true;
        };
        let outcome = tokio::time::timeout(grace, child.wait()).await;
        match outcome {
            Ok(Ok(status)) => {
                tracing::info!(%status, "backend exited");
                guard.take();
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to wait for backend");
                false
            }
            Err(_) => false,
        }
    }

    /// Forcibly kill the backend and reap it.
    pub async fn terminate(&self) -> std::io::Result<()> {
        if let Some(mut child) = self.child.lock().await.take() {
            tracing::warn!(pid = child.id(), "backend still running, killing it");
            child.kill().await?;
        }
        Ok(())
    }

    /// Give the backend `grace` to exit, then kill it.
    pub async fn reap(&self, grace: Duration) -> BackendExit {
        if !self.is_running().await {
            self.child.lock().await.take();
            return BackendExit::NotRunning;
        }
        if self.wait_for_exit(grace).await {
            return BackendExit::Exited;
        }
        if let Err(e) = self.terminate().await {
            tracing::error!(error = %e, "failed to kill backend");
        }
        BackendExit::Terminated
    }
}

async fn forward_output<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "backend", stream = name, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: "backend", stream = name, error = %e, "output closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::port_for_test;

    #[test]
    fn development_plan_passes_only_the_port() {
        let backend = DevBackend::default();
        let plan = LaunchPlan::development(&backend, port_for_test(3042));

        assert_eq!(plan.program, PathBuf::from("python"));
        assert_eq!(plan.leading_args, vec![OsString::from("app.py")]);
        assert_eq!(plan.backend_args, vec!["3042".to_string()]);
        assert_eq!(plan.stdio, StdioMode::Inherit);
        assert!(!plan.detached);
    }

    #[test]
    fn production_plans_per_platform() {
        let resources = Path::new("/opt/tandem/resources");
        let port = port_for_test(3001);

        let mac = LaunchPlan::production("macos", resources, port).unwrap();
        assert_eq!(mac.program, PathBuf::from("open"));
        assert_eq!(mac.leading_args[0], OsString::from("-gj"));
        assert_eq!(mac.leading_args[1], resources.join("app.app").into_os_string());
        assert_eq!(mac.leading_args[2], OsString::from("--args"));

        let linux = LaunchPlan::production("linux", resources, port).unwrap();
        assert_eq!(linux.program, resources.join("app").join("app"));
        assert!(linux.leading_args.is_empty());

        let windows = LaunchPlan::production("windows", resources, port).unwrap();
        assert_eq!(windows.program, PathBuf::from("cmd"));
        assert_eq!(windows.leading_args[1], OsString::from("start"));

        for plan in [mac, linux, windows] {
            assert_eq!(plan.backend_args, vec!["3001".to_string()]);
            assert_eq!(plan.stdio, StdioMode::Piped);
            assert!(!plan.detached);
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = LaunchPlan::production("freebsd", Path::new("res"), port_for_test(3001))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedPlatform(os) if os == "freebsd"));
    }

    #[test]
    fn development_mode_ignores_platform() {
        let config = HostConfig::default();
        let plan = LaunchPlan::for_mode(
            LaunchMode::Development,
            "plan9",
            &config,
            Path::new("res"),
            port_for_test(3100),
        )
        .unwrap();
        assert_eq!(plan.backend_args, vec!["3100".to_string()]);
    }

    #[test]
    fn display_joins_the_command_line() {
        let plan = LaunchPlan::development(&DevBackend::default(), port_for_test(3005));
        assert_eq!(plan.display(), "python app.py 3005");
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let backend = DevBackend {
            interpreter: "tandem-no-such-interpreter".to_string(),
            script: PathBuf::from("app.py"),
        };
        let process = BackendProcess::new();
        let err = process
            .start(&LaunchPlan::development(&backend, port_for_test(3001)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Spawn { .. }));
        assert!(!process.is_running().await);
    }

    // GNU `sleep` sums its operands.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn reap_kills_a_backend_that_ignores_quit() {
        let backend = DevBackend {
            interpreter: "sleep".to_string(),
            script: PathBuf::from("30"),
        };
        let process = BackendProcess::new();
        process
            .start(&LaunchPlan::development(&backend, port_for_test(1)))
            .await
            .unwrap();
        assert!(process.is_running().await);

        let exit = process.reap(Duration::from_millis(100)).await;
        assert_eq!(exit, BackendExit::Terminated);
        assert!(!process.is_running().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reap_reports_a_clean_exit() {
        let backend = DevBackend {
            interpreter: "sh".to_string(),
            script: PathBuf::from("-c"),
        };
        // `sh -c <port>` runs the port as a command; it fails and exits quickly.
        let process = BackendProcess::new();
        process
            .start(&LaunchPlan::development(&backend, port_for_test(7)))
            .await
            .unwrap();

        let exit = process.reap(Duration::from_secs(5)).await;
        assert!(matches!(exit, BackendExit::Exited | BackendExit::NotRunning));
        assert!(!process.is_running().await);
    }
}
