//! Process and port coordination for the Tandem desktop host.
//!
//! The host allocates a loopback port, starts the backend on it, hands the
//! port to the UI, swaps the loading window for the main window once the UI
//! has rendered, and asks the backend to quit on the way out. Nothing here
//! depends on a particular webview toolkit; windows are driven through
//! [`window::Surface`].

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod port;
pub mod shutdown;
pub mod window;

pub use backend::{BackendExit, BackendProcess, LaunchMode, LaunchPlan, Platform, StdioMode};
pub use config::{DevBackend, HostConfig};
pub use coordinator::Coordinator;
pub use error::{ConfigError, CoreError, QuitError, QuitErrorKind, UnknownCommand};
pub use ipc::{IpcBridge, IpcCommand, IpcReply, QuitHandle};
pub use port::{allocate, Port, PortRange};
pub use shutdown::{QuitClient, QuitOutcome, ShutdownCoordinator, ShutdownReport, ShutdownSource};
pub use window::{set_title_focus, ContentSource, Surface, WindowSequencer, WindowState};
