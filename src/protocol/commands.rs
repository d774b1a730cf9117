//! Outbound commands (host → bridge).

use super::types::ControllerId;
use std::fmt;

/// Line terminator expected by the bridge
pub const LINE_TERMINATOR: &str = "\r\n";

/// Commands understood by the INSEN bridge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Request firmware info (answered with `INSEN_FW_V...`)
    Info,
    /// Request device counters (answered with `STATUS|...`)
    Status,
    /// Request the connected controller list (answered with `CONTROLLERS|...`)
    List,
    /// Request one controller's current state (answered with `INPUT|...`)
    Get(ControllerId),
}

impl Command {
    /// Encode the command as a complete wire line, terminator included
    pub fn encode(&self) -> String {
        format!("{}{}", self, LINE_TERMINATOR)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Info => write!(f, "INFO"),
            Command::Status => write!(f, "STATUS"),
            Command::List => write!(f, "LIST"),
            Command::Get(id) => write!(f, "GET {}", id),
        }
    }
}
