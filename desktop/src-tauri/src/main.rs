// Tandem Desktop - Tauri v2
// Main entry point

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod lifecycle;
mod surface;

use host_core::{Coordinator, IpcCommand, IpcReply, LaunchMode};
use lifecycle::AppQuit;
use std::sync::Arc;
use surface::{Sequencer, LOADING_LABEL, MAIN_LABEL};
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Manager, State, WindowEvent};

/// Tauri command to get the backend port. Synchronous: the UI needs it
/// before it can make any request.
#[tauri::command]
fn get_port_number(coordinator: State<'_, Arc<Coordinator>>) -> u16 {
    coordinator.bridge().port_number()
}

/// Tauri command for every bridge command by name; resolves to the port for
/// `get-port-number` and to `null` otherwise
#[tauri::command]
async fn app_command(app: AppHandle, name: String) -> Result<IpcReply, String> {
    let command: IpcCommand = name.parse().map_err(|e: host_core::UnknownCommand| e.to_string())?;
    let Some(coordinator) = app.try_state::<Arc<Coordinator>>() else {
        return Err("Host is still starting".to_string());
    };
    let Some(main) = surface::main_surface(&app) else {
        return Err("Main window is not open".to_string());
    };
    Ok(coordinator.bridge().dispatch(command, &main, &AppQuit(&app)))
}

/// Tauri command the readiness probe reports to
#[tauri::command]
fn content_probe(sequencer: State<'_, Sequencer>, ready: bool) {
    sequencer.with(|seq| seq.on_probe_result(ready));
}

/// Allocate the port, start the backend and open the windows
fn setup_host(app: &AppHandle) -> anyhow::Result<()> {
    let config = config::load(app)?;
    let mode = LaunchMode::detect();
    let resources_dir = config::resources_dir(app, &config)?;
    tracing::info!(?mode, "starting Tandem");

    let coordinator = tauri::async_runtime::block_on(Coordinator::launch(
        &config,
        mode,
        std::env::consts::OS,
        &resources_dir,
    ))?;
    let port = coordinator.port();
    tracing::info!(port = %port, "backend launched");
    app.manage(Arc::new(coordinator));

    let sequencer = surface::create_windows(app, &config, mode, port)?;
    app.manage(Sequencer::new(sequencer));
    app.manage(config);

    lifecycle::watch_signals(app);
    Ok(())
}

fn on_page_loaded(app: &AppHandle, label: &str) {
    let Some(sequencer) = app.try_state::<Sequencer>() else {
        return;
    };
    match label {
        LOADING_LABEL => sequencer.with(|seq| seq.on_loading_surface_ready()),
        MAIN_LABEL => sequencer.with(|seq| seq.on_main_content_loaded()),
        _ => {}
    }
}

#[cfg(target_os = "macos")]
fn on_reopen(app: &AppHandle) {
    if app.get_webview_window(MAIN_LABEL).is_some() {
        return;
    }
    let (Some(config), Some(coordinator)) = (
        app.try_state::<host_core::HostConfig>(),
        app.try_state::<Arc<Coordinator>>(),
    ) else {
        return;
    };
    match surface::recreate_main_window(app, &config, coordinator.mode(), coordinator.port()) {
        Ok(sequencer) => match app.try_state::<Sequencer>() {
            Some(current) => current.replace(sequencer),
            None => {
                app.manage(Sequencer::new(sequencer));
            }
        },
        Err(e) => tracing::error!(error = %e, "failed to recreate main window"),
    }
}

fn main() {
    host_core::logging::init("info,tandem_desktop=debug");

    tauri::Builder::default()
        .setup(|app| {
            setup_host(app.handle())?;
            Ok(())
        })
        .on_page_load(|webview, payload| {
            if let PageLoadEvent::Finished = payload.event() {
                on_page_loaded(webview.app_handle(), webview.label());
            }
        })
        .on_window_event(|window, event| match event {
            WindowEvent::Focused(focused) if window.label() == MAIN_LABEL => {
                // Can arrive from inside `main.show()` while the sequencer is locked.
                if let Some(main) = surface::main_surface(window.app_handle()) {
                    host_core::set_title_focus(&main, *focused);
                }
            }
            WindowEvent::Destroyed if window.label() == MAIN_LABEL => {
                // A hidden loading window would otherwise keep the app alive.
                if let Some(loading) = window.app_handle().get_webview_window(LOADING_LABEL) {
                    let _ = loading.close();
                }
            }
            _ => {}
        })
        .invoke_handler(tauri::generate_handler![
            get_port_number,
            app_command,
            content_probe,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| match event {
            #[cfg(target_os = "macos")]
            tauri::RunEvent::Reopen {
                has_visible_windows: false,
                ..
            } => on_reopen(app),
            event => lifecycle::on_run_event(app, event),
        });
}
