// Tandem Desktop - Webview windows
// Tauri implementation of the sequencer's surface, plus window construction

use host_core::{ContentSource, HostConfig, LaunchMode, Port, Surface, WindowSequencer};
use std::sync::Mutex;
use tauri::{AppHandle, Manager, Url, WebviewUrl, WebviewWindow, WebviewWindowBuilder};

pub const MAIN_LABEL: &str = "main";
pub const LOADING_LABEL: &str = "loading";

/// Command the probe script reports to.
const PROBE_COMMAND: &str = "content_probe";

#[cfg(windows)]
const ASSET_ORIGIN: &str = "http://tauri.localhost/";
#[cfg(not(windows))]
const ASSET_ORIGIN: &str = "tauri://localhost/";

pub struct TauriSurface {
    window: WebviewWindow,
}

impl TauriSurface {
    pub fn new(window: WebviewWindow) -> Self {
        Self { window }
    }

    fn check(&self, action: &str, result: tauri::Result<()>) {
        if let Err(e) = result {
            tracing::warn!(window = self.window.label(), action, error = %e, "window call failed");
        }
    }
}

impl Surface for TauriSurface {
    fn show(&self) {
        self.check("show", self.window.show());
    }

    fn hide(&self) {
        self.check("hide", self.window.hide());
    }

    fn maximize(&self) {
        self.check("maximize", self.window.maximize());
    }

    fn minimize(&self) {
        self.check("minimize", self.window.minimize());
    }

    fn unmaximize(&self) {
        self.check("unmaximize", self.window.unmaximize());
    }

    fn navigate(&self, content: &ContentSource) {
        match content_url(content) {
            Ok(url) => self.check("navigate", self.window.navigate(url)),
            Err(e) => tracing::error!(?content, error = %e, "invalid content location"),
        }
    }

    fn reload(&self) {
        self.eval("location.reload()");
    }

    fn eval(&self, script: &str) {
        self.check("eval", self.window.eval(script));
    }

    fn probe(&self, expression: &str) {
        self.eval(&probe_script(expression));
    }
}

/// Wraps a boolean expression so its value comes back through IPC.
pub fn probe_script(expression: &str) -> String {
    format!(
        "window.__TAURI_INTERNALS__.invoke('{PROBE_COMMAND}', {{ ready: Boolean({expression}) }});"
    )
}

pub fn content_url(content: &ContentSource) -> Result<Url, url::ParseError> {
    match content {
        ContentSource::Url(url) => Url::parse(url),
        ContentSource::Bundled(path) => {
            let path = path.to_string_lossy().replace('\\', "/");
            Url::parse(ASSET_ORIGIN)?.join(path.trim_start_matches('/'))
        }
    }
}

/// Makes the backend port readable before any page script runs.
pub fn port_script(port: Port) -> String {
    format!("window.__TANDEM_PORT__ = {port};")
}

/// Content the main window shows in `mode`.
pub fn main_content(config: &HostConfig, mode: LaunchMode) -> ContentSource {
    match mode {
        LaunchMode::Development => ContentSource::Url(config.dev_server_url.clone()),
        LaunchMode::Production => ContentSource::Bundled(config.production_entry.clone().into()),
    }
}

/// Starts blank and hidden; the sequencer decides what it shows and when.
fn build_main_window(app: &AppHandle, port: Port) -> anyhow::Result<WebviewWindow> {
    let window = WebviewWindowBuilder::new(
        app,
        MAIN_LABEL,
        WebviewUrl::External(Url::parse("about:blank")?),
    )
    .initialization_script(&port_script(port))
    .title("Tandem")
    .inner_size(1280.0, 800.0)
    .decorations(false)
    .visible(false)
    .build()?;
    Ok(window)
}

fn build_loading_window(app: &AppHandle, config: &HostConfig) -> anyhow::Result<WebviewWindow> {
    let window = WebviewWindowBuilder::new(
        app,
        LOADING_LABEL,
        WebviewUrl::App(config.loader_page.clone().into()),
    )
    .title("Tandem")
    .inner_size(480.0, 320.0)
    .center()
    .decorations(false)
    .resizable(false)
    .visible(false)
    .build()?;
    Ok(window)
}

/// Create the windows for `mode` and the sequencer driving them.
pub fn create_windows(
    app: &AppHandle,
    config: &HostConfig,
    mode: LaunchMode,
    port: Port,
) -> anyhow::Result<WindowSequencer<TauriSurface>> {
    let main = TauriSurface::new(build_main_window(app, port)?);
    let content = main_content(config, mode);
    match mode {
        LaunchMode::Development => {
            let loading = TauriSurface::new(build_loading_window(app, config)?);
            Ok(WindowSequencer::development(main, loading, content))
        }
        LaunchMode::Production => Ok(WindowSequencer::production(main, content)),
    }
}

/// macOS dock reopen with no windows left: bring the main window back
/// without the loading phase.
#[cfg(target_os = "macos")]
pub fn recreate_main_window(
    app: &AppHandle,
    config: &HostConfig,
    mode: LaunchMode,
    port: Port,
) -> anyhow::Result<WindowSequencer<TauriSurface>> {
    let main = TauriSurface::new(build_main_window(app, port)?);
    Ok(WindowSequencer::production(main, main_content(config, mode)))
}

/// The main window as a surface, for calls that must not take the
/// sequencer lock.
pub fn main_surface(app: &AppHandle) -> Option<TauriSurface> {
    app.get_webview_window(MAIN_LABEL).map(TauriSurface::new)
}

/// Managed state wrapper around the sequencer. Surface calls made under the
/// lock can synchronously raise window events, so window event handlers must
/// not call [`Sequencer::with`].
pub struct Sequencer(Mutex<WindowSequencer<TauriSurface>>);

impl Sequencer {
    pub fn new(sequencer: WindowSequencer<TauriSurface>) -> Self {
        Self(Mutex::new(sequencer))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut WindowSequencer<TauriSurface>) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn replace(&self, sequencer: WindowSequencer<TauriSurface>) {
        self.with(|current| *current = sequencer);
    }
}
