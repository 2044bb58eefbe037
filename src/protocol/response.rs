//! Response definitions
//!
//! Replies the gateway sends back.

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Error),
            _ => None,
        }
    }
}

/// A response to send to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,

    /// Blob bytes for QUERY, handle for INSERT, message for ERROR
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload: payload.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: Vec::new(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: message.as_bytes().to_vec(),
        }
    }

    /// Payload as text (error messages, handles)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
