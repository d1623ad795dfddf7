// Tandem Desktop - Lifecycle
// Routes every exit path through the backend shutdown, then exits the host

use host_core::{Coordinator, QuitHandle, ShutdownSource};
use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent};

/// Start the one-shot shutdown; the host exits once the backend has been
/// asked to quit and reaped. Repeat requests are ignored.
pub fn request_shutdown(app: &AppHandle, source: ShutdownSource) {
    let Some(coordinator) = app.try_state::<Arc<Coordinator>>() else {
        tracing::warn!(%source, "shutdown before startup finished, exiting");
        app.exit(0);
        return;
    };
    let coordinator = Arc::clone(coordinator.inner());
    if !coordinator.shutdown().begin(&source) {
        return;
    }

    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        let report = coordinator.shutdown().run(source).await;
        tracing::info!(
            source = %report.source,
            backend = ?report.backend,
            "backend shut down, exiting"
        );
        app.exit(0);
    });
}

/// Quit requests from the IPC bridge.
pub struct AppQuit<'a>(pub &'a AppHandle);

impl QuitHandle for AppQuit<'_> {
    fn request_quit(&self, source: ShutdownSource) {
        request_shutdown(self.0, source);
    }
}

/// Handle the run loop's exit request.
///
/// An explicit `exit(code)` is ours and goes through. A request without a
/// code means the last window closed: shut the backend down first, except on
/// macOS where the app stays alive with no windows.
pub fn on_run_event(app: &AppHandle, event: RunEvent) {
    if let RunEvent::ExitRequested { code, api, .. } = event {
        if code.is_some() {
            return;
        }
        api.prevent_exit();
        if cfg!(target_os = "macos") && app.webview_windows().is_empty() {
            tracing::debug!("all windows closed, staying alive");
            return;
        }
        request_shutdown(app, ShutdownSource::WindowsClosed);
    }
}

/// Forward termination signals into the shutdown path.
pub fn watch_signals(app: &AppHandle) {
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        match termination_signal().await {
            Ok(name) => request_shutdown(&app, ShutdownSource::Signal(name.to_string())),
            Err(e) => tracing::warn!(error = %e, "cannot listen for termination signals"),
        }
    });
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    })
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
