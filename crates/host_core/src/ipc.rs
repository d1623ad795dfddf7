// Tandem host core - IPC bridge
// Commands the UI sends to the host, addressed by name

use crate::error::UnknownCommand;
use crate::port::Port;
use crate::shutdown::ShutdownSource;
use crate::window::Surface;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpcCommand {
    GetPortNumber,
    AppMaximize,
    AppMinimize,
    AppUnmaximize,
    AppQuit,
}

impl IpcCommand {
    pub const ALL: [IpcCommand; 5] = [
        Self::GetPortNumber,
        Self::AppMaximize,
        Self::AppMinimize,
        Self::AppUnmaximize,
        Self::AppQuit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetPortNumber => "get-port-number",
            Self::AppMaximize => "app-maximize",
            Self::AppMinimize => "app-minimize",
            Self::AppUnmaximize => "app-unmaximize",
            Self::AppQuit => "app-quit",
        }
    }
}

impl fmt::Display for IpcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IpcCommand {
    type Err = UnknownCommand;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name() == name)
            .ok_or_else(|| UnknownCommand(name.to_string()))
    }
}

/// Serializes as the bare port number, or `null` for [`IpcReply::Accepted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IpcReply {
    Port(u16),
    /// Fire-and-forget commands carry no payload.
    Accepted,
}

/// Receives quit requests from the bridge.
pub trait QuitHandle {
    fn request_quit(&self, source: ShutdownSource);
}

/// Routes UI commands to the main window and the shutdown path.
#[derive(Clone, Copy, Debug)]
pub struct IpcBridge {
    port: Port,
}

impl IpcBridge {
    pub fn new(port: Port) -> Self {
        Self { port }
    }

    pub fn port_number(&self) -> u16 {
        self.port.get()
    }

    pub fn dispatch<S, Q>(&self, command: IpcCommand, window: &S, quit: &Q) -> IpcReply
    where
        S: Surface + ?Sized,
        Q: QuitHandle + ?Sized,
    {
        tracing::debug!(%command, "ipc command");
        match command {
            IpcCommand::GetPortNumber => return IpcReply::Port(self.port_number()),
            IpcCommand::AppMaximize => window.maximize(),
            IpcCommand::AppMinimize => window.minimize(),
            IpcCommand::AppUnmaximize => window.unmaximize(),
            IpcCommand::AppQuit => quit.request_quit(ShutdownSource::Ui),
        }
        IpcReply::Accepted
    }
}
