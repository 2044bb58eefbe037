//! Command definitions
//!
//! Requests a client sends to the gateway.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Query = 0x01,
    Insert = 0x02,
    Ping = 0x04,
}

impl CommandType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::Query),
            0x02 => Some(CommandType::Insert),
            0x04 => Some(CommandType::Ping),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look up a blob by handle string or raw hex key
    Query { reference: String },

    /// Store a blob and receive its structured handle
    Insert { data: Vec<u8> },

    /// Health check
    Ping,
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Query { .. } => CommandType::Query,
            Command::Insert { .. } => CommandType::Insert,
            Command::Ping => CommandType::Ping,
        }
    }
}
