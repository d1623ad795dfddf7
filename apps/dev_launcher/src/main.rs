// Tandem developer launcher
// Starts the UI dev server and the desktop host, and asks the backend to quit
// when the session ends

use anyhow::Context;
use clap::Parser;
use host_core::config::env;
use host_core::{allocate, Port, PortRange, QuitClient, ShutdownCoordinator, ShutdownSource};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};

#[derive(Parser, Debug)]
#[command(name = "tandem-dev", about = "Run the Tandem UI dev server and desktop host together")]
struct Args {
    /// Command that serves the live-reloading UI
    #[arg(long, default_value = "npm run start:ui")]
    ui_cmd: String,

    /// Command that builds and runs the desktop host
    #[arg(long, default_value = "cargo tauri dev")]
    host_cmd: String,

    /// Port the UI dev server listens on
    #[arg(long, default_value_t = 3000)]
    ui_port: u16,

    #[arg(long, default_value_t = host_core::port::DEFAULT_PORT_MIN)]
    port_min: u16,

    #[arg(long, default_value_t = host_core::port::DEFAULT_PORT_MAX)]
    port_max: u16,

    /// Timeout for the backend quit request, in milliseconds
    #[arg(long, default_value_t = 3000)]
    quit_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host_core::logging::init("info");
    let args = Args::parse();

    // Not held: the host is pinned to it and binds it itself.
    let port = allocate(PortRange::new(args.port_min, args.port_max))
        .await
        .context("no free port for the backend")?;
    tracing::info!(%port, "backend port");

    if std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, args.ui_port)).is_err() {
        tracing::warn!(port = args.ui_port, "UI port is already in use");
    }

    let mut ui = shell(&args.ui_cmd)
        .env("BROWSER", "none")
        .spawn()
        .with_context(|| format!("failed to start `{}`", args.ui_cmd))?;
    let mut host = host_command(&args.host_cmd, port)
        .spawn()
        .with_context(|| format!("failed to start `{}`", args.host_cmd))?;

    // The launcher has no process handle for the backend; the host owns it.
    let shutdown = ShutdownCoordinator::new(
        QuitClient::new(port, Duration::from_millis(args.quit_timeout_ms))?,
        Arc::new(host_core::BackendProcess::new()),
        Duration::ZERO,
    );

    let supervisor = tokio::spawn(async move { wait_for_exit_trigger(&mut ui, &mut host).await });
    let source = match supervisor.await {
        Ok(Ok(source)) => source,
        Ok(Err(e)) => ShutdownSource::Fault(format!("{e:#}")),
        Err(e) => ShutdownSource::Fault(e.to_string()),
    };

    if let Some(report) = shutdown.shutdown(source).await {
        tracing::info!(source = %report.source, "session ended");
    }
    Ok(())
}

/// Run `command_line` through the platform shell with inherited stdio.
fn shell(command_line: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    };
    cmd.kill_on_drop(true);
    cmd
}

/// The host command, pinned to `port` whatever its settings file says.
fn host_command(command_line: &str, port: Port) -> Command {
    let mut cmd = shell(command_line);
    cmd.env(env::PORT_MIN, port.to_string())
        .env(env::PORT_MAX, port.to_string());
    cmd
}

/// Resolve with the first of: a termination signal, or either child exiting.
/// Both children are killed when this returns.
async fn wait_for_exit_trigger(ui: &mut Child, host: &mut Child) -> anyhow::Result<ShutdownSource> {
    let source = tokio::select! {
        name = termination_signal() => ShutdownSource::Signal(name?.to_string()),
        status = ui.wait() => {
            let status = status?;
            tracing::info!(%status, "UI dev server exited");
            ShutdownSource::ChildExited(format!("UI dev server, {status}"))
        }
        status = host.wait() => {
            let status = status?;
            tracing::info!(%status, "desktop host exited");
            ShutdownSource::ChildExited(format!("desktop host, {status}"))
        }
    };
    for child in [ui, host] {
        let _ = child.start_kill();
    }
    Ok(source)
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = user1.recv() => "SIGUSR1",
        _ = user2.recv() => "SIGUSR2",
    })
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
