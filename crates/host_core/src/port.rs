// Tandem host core - Port allocation
// Finds one free loopback TCP port in a bounded range

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use tokio::net::TcpListener;

/// Default range the backend port is picked from.
pub const DEFAULT_PORT_MIN: u16 = 3001;
pub const DEFAULT_PORT_MAX: u16 = 3999;

/// A port allocated for the backend. Immutable for the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive port range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    fn validate(self) -> Result<(), CoreError> {
        if self.min == 0 || self.min > self.max {
            return Err(CoreError::InvalidPortRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_MIN, DEFAULT_PORT_MAX)
    }
}

/// Return the first port in `range` that can be bound on loopback.
///
/// The probe listener is dropped before returning, so the port is free for
/// the backend to bind. There is no retry beyond the scan.
pub async fn allocate(range: PortRange) -> Result<Port, CoreError> {
    range.validate()?;

    for candidate in range.min..=range.max {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, candidate)).await {
            Ok(listener) => {
                drop(listener);
                tracing::info!(port = candidate, "allocated backend port");
                return Ok(Port(candidate));
            }
            Err(e) => {
                tracing::trace!(port = candidate, error = %e, "port unavailable");
            }
        }
    }

    Err(CoreError::NoPortAvailable {
        min: range.min,
        max: range.max,
    })
}

#[cfg(test)]
pub(crate) fn port_for_test(value: u16) -> Port {
    Port(value)
}
