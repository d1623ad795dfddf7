// Tandem host core - Window sequencing
// Loading window until the main window's content is populated, then swap

use std::path::PathBuf;

/// Expression evaluated inside the main window; true once React (or
/// whatever the UI uses) has populated both `<head>` and `<body>`.
pub const READINESS_PROBE: &str =
    r#"document.body.innerHTML !== "" && document.head.innerHTML !== """#;

/// Element ids of the custom title bar.
pub const TITLE_TEXT_ID: &str = "window-title-text";
pub const TITLE_BUTTONS_ID: &str = "window-title-buttons";

const FOCUSED_OPACITY: f32 = 1.0;
const BLURRED_OPACITY: f32 = 0.5;

/// Where a surface gets its content from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSource {
    /// Live-reloading dev server origin.
    Url(String),
    /// Pre-built page bundled with the app.
    Bundled(PathBuf),
}

/// A window the sequencer can drive. Implementations report page loads and
/// probe results back through the sequencer's `on_*` methods.
pub trait Surface {
    fn show(&self);
    fn hide(&self);
    fn maximize(&self);
    fn minimize(&self);
    fn unmaximize(&self);
    fn navigate(&self, content: &ContentSource);
    fn reload(&self);
    /// Run a script for its side effects.
    fn eval(&self, script: &str);
    /// Evaluate `expression` and deliver the boolean result to
    /// [`WindowSequencer::on_probe_result`].
    fn probe(&self, expression: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowState {
    Loading,
    MainHiddenAwaitingContent,
    MainVisible,
}

/// Same check as [`READINESS_PROBE`], for content already in hand.
pub fn is_content_ready(body_html: &str, head_html: &str) -> bool {
    !body_html.is_empty() && !head_html.is_empty()
}

/// Script that dims the title bar; a no-op until the document is complete.
pub fn title_opacity_script(opacity: f32) -> String {
    format!(
        r#"if (document.readyState === 'complete') {{
  const titleBar = document.getElementById('{TITLE_TEXT_ID}');
  const titleButtons = document.getElementById('{TITLE_BUTTONS_ID}');
  if (titleBar) titleBar.style.opacity = {opacity};
  if (titleButtons) titleButtons.style.opacity = {opacity};
}}"#
    )
}

pub struct WindowSequencer<S> {
    main: S,
    loading: Option<S>,
    dev_content: Option<ContentSource>,
    state: WindowState,
    reloads: u32,
}

impl<S: Surface> WindowSequencer<S> {
    /// Main window stays hidden behind the loading window until its content
    /// passes the readiness probe.
    pub fn development(main: S, loading: S, content: ContentSource) -> Self {
        main.hide();
        Self {
            main,
            loading: Some(loading),
            dev_content: Some(content),
            state: WindowState::Loading,
            reloads: 0,
        }
    }

    /// Bundled content is ready as soon as it loads.
    pub fn production(main: S, content: ContentSource) -> Self {
        main.navigate(&content);
        main.show();
        Self {
            main,
            loading: None,
            dev_content: None,
            state: WindowState::MainVisible,
            reloads: 0,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn reload_count(&self) -> u32 {
        self.reloads
    }

    /// The loading page finished rendering: show it and start loading the
    /// real UI behind it.
    pub fn on_loading_surface_ready(&mut self) {
        if self.state != WindowState::Loading {
            return;
        }
        if let Some(loading) = &self.loading {
            loading.show();
        }
        if let Some(content) = &self.dev_content {
            tracing::info!(?content, "loading development content");
            self.main.navigate(content);
        }
        self.state = WindowState::MainHiddenAwaitingContent;
    }

    /// Fires on every main window load, including hot reloads. Loads before
    /// the main window was pointed at the dev server are ignored.
    pub fn on_main_content_loaded(&mut self) {
        if self.loading.is_none() || self.state == WindowState::Loading {
            return;
        }
        self.main.probe(READINESS_PROBE);
    }

    pub fn on_probe_result(&mut self, ready: bool) {
        if !ready {
            // Dev server answered before the bundle was written.
            self.reloads += 1;
            tracing::debug!(reloads = self.reloads, "main window empty, reloading");
            self.main.reload();
            return;
        }
        if self.state == WindowState::MainVisible {
            return;
        }
        // Show before hide, otherwise a blank frame flashes between them.
        self.main.show();
        if let Some(loading) = &self.loading {
            loading.hide();
        }
        self.state = WindowState::MainVisible;
        tracing::info!("main window ready");
    }

}

/// Full-opacity title bar while `main` has focus, dimmed otherwise.
///
/// Kept off [`WindowSequencer`]: showing the main window can deliver its focus
/// event while the swap is still running.
pub fn set_title_focus<S: Surface + ?Sized>(main: &S, focused: bool) {
    let opacity = if focused {
        FOCUSED_OPACITY
    } else {
        BLURRED_OPACITY
    };
    main.eval(&title_opacity_script(opacity));
}
