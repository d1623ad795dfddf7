// Tandem host core - Coordinator
// Owns the run's port, backend handle and shutdown path

use crate::backend::{BackendProcess, LaunchMode, LaunchPlan};
use crate::config::HostConfig;
use crate::error::CoreError;
use crate::ipc::IpcBridge;
use crate::port::{self, Port};
use crate::shutdown::{QuitClient, ShutdownCoordinator};
use std::path::Path;
use std::sync::Arc;

/// Built once at startup and handed to whatever needs the port, the backend
/// or the shutdown path.
pub struct Coordinator {
    mode: LaunchMode,
    port: Port,
    backend: Arc<BackendProcess>,
    shutdown: ShutdownCoordinator,
}

impl Coordinator {
    /// Allocate the port, then start the backend on it.
    ///
    /// `os` selects the packaged backend in production mode; an unknown
    /// platform fails here, before anything is spawned.
    pub async fn launch(
        config: &HostConfig,
        mode: LaunchMode,
        os: &str,
        resources_dir: &Path,
    ) -> Result<Self, CoreError> {
        let port = port::allocate(config.port_range).await?;
        let plan = LaunchPlan::for_mode(mode, os, config, resources_dir, port)?;
        let quit = QuitClient::new(port, config.quit_timeout())?;

        let backend = Arc::new(BackendProcess::new());
        backend.start(&plan).await?;

        Ok(Self {
            mode,
            port,
            shutdown: ShutdownCoordinator::new(quit, Arc::clone(&backend), config.exit_grace()),
            backend,
        })
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn bridge(&self) -> IpcBridge {
        IpcBridge::new(self.port)
    }

    pub fn backend(&self) -> &BackendProcess {
        &self.backend
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortRange;
    use std::net::{Ipv4Addr, TcpListener};

    fn config_for_free_port() -> (HostConfig, u16) {
        let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = HostConfig {
            port_range: PortRange::new(port, port),
            quit_timeout_ms: 500,
            exit_grace_ms: 100,
            ..HostConfig::default()
        };
        (config, port)
    }

    #[tokio::test]
    async fn unsupported_platform_fails_before_spawn() {
        let (config, _) = config_for_free_port();

        let result = Coordinator::launch(
            &config,
            LaunchMode::Production,
            "haiku",
            Path::new("resources"),
        )
        .await;

        assert!(matches!(result, Err(CoreError::UnsupportedPlatform(os)) if os == "haiku"));
    }

    #[tokio::test]
    async fn occupied_range_aborts_launch() {
        let guard = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = guard.local_addr().unwrap().port();
        let config = HostConfig {
            port_range: PortRange::new(port, port),
            ..HostConfig::default()
        };

        let result =
            Coordinator::launch(&config, LaunchMode::Development, "linux", Path::new(".")).await;
        assert!(matches!(result, Err(CoreError::NoPortAvailable { .. })));
    }

    // GNU `sleep` sums its operands.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn launch_and_shutdown_development_backend() {
        let (mut config, port) = config_for_free_port();
        config.dev_backend.interpreter = "sleep".to_string();
        config.dev_backend.script = "30".into();

        let coordinator =
            Coordinator::launch(&config, LaunchMode::Development, "linux", Path::new("."))
                .await
                .unwrap();
        assert_eq!(coordinator.port().get(), port);
        assert_eq!(coordinator.bridge().port_number(), port);
        assert!(coordinator.backend().is_running().await);

        // Nothing listens on the port, so `/quit` is refused and the backend
        // has to be killed after the grace period.
        let report = coordinator
            .shutdown()
            .shutdown(crate::shutdown::ShutdownSource::Ui)
            .await
            .unwrap();
        assert!(!report.quit.is_logged());
        assert_eq!(report.backend, crate::backend::BackendExit::Terminated);
        assert!(!coordinator.backend().is_running().await);
    }
}
