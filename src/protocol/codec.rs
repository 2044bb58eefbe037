//! Protocol codec
//!
//! Encoding and decoding functions for the gateway wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - QUERY:  ref_len (4 bytes) + reference (utf-8 handle or hex key)
//! - INSERT: blob bytes
//! - PING:   empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All lengths are big-endian.

use std::io::{Read, Write};

use crate::error::{CacheError, Result};

use super::{Command, CommandType, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
pub fn encode_command(command: &Command) -> Vec<u8> {
    let payload = match command {
        Command::Query { reference } => {
            let mut payload = Vec::with_capacity(4 + reference.len());
            payload.extend_from_slice(&(reference.len() as u32).to_be_bytes());
            payload.extend_from_slice(reference.as_bytes());
            payload
        }
        Command::Insert { data } => data.clone(),
        Command::Ping => Vec::new(),
    };

    frame(command.command_type() as u8, &payload)
}

/// Decode a complete command frame
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;
    decode_command_payload(cmd_type, payload)
}

fn decode_command_payload(cmd_type: u8, payload: &[u8]) -> Result<Command> {
    match CommandType::from_byte(cmd_type) {
        Some(CommandType::Query) => decode_query_command(payload),
        Some(CommandType::Insert) => Ok(Command::Insert {
            data: payload.to_vec(),
        }),
        Some(CommandType::Ping) => decode_ping_command(payload),
        None => Err(CacheError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            cmd_type
        ))),
    }
}

/// Decode QUERY command payload
fn decode_query_command(payload: &[u8]) -> Result<Command> {
    if payload.len() < 4 {
        return Err(CacheError::Protocol(
            "QUERY command: missing reference length".to_string(),
        ));
    }

    let ref_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if payload.len() != 4 + ref_len {
        return Err(CacheError::Protocol(format!(
            "QUERY command: reference length {} does not match payload ({} bytes)",
            ref_len,
            payload.len() - 4
        )));
    }

    let reference = std::str::from_utf8(&payload[4..])
        .map_err(|e| CacheError::Protocol(format!("QUERY command: {}", e)))?
        .to_string();
    Ok(Command::Query { reference })
}

/// Decode PING command payload
fn decode_ping_command(payload: &[u8]) -> Result<Command> {
    if !payload.is_empty() {
        return Err(CacheError::Protocol(format!(
            "PING command: unexpected payload of {} bytes",
            payload.len()
        )));
    }
    Ok(Command::Ping)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Vec<u8> {
    frame(response.status as u8, &response.payload)
}

/// Decode a complete response frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status, payload) = split_frame(bytes, "response")?;
    decode_response_payload(status, payload)
}

fn decode_response_payload(status: u8, payload: &[u8]) -> Result<Response> {
    let status = Status::from_byte(status).ok_or_else(|| {
        CacheError::Protocol(format!("Unknown response status: 0x{:02x}", status))
    })?;
    Ok(Response {
        status,
        payload: payload.to_vec(),
    })
}

// =============================================================================
// Framing
// =============================================================================

fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(tag);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

fn payload_len(header: &[u8], what: &str) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(CacheError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let len = payload_len(bytes, what)?;
    let total_len = HEADER_SIZE + len;
    if bytes.len() < total_len {
        return Err(CacheError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

/// Read one frame: tag byte and payload
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<(u8, Vec<u8>)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = payload_len(&header, what)?;
    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload)?;
    }
    Ok((header[0], payload))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let (cmd_type, payload) = read_frame(reader, "command")?;
    decode_command_payload(cmd_type, &payload)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let (status, payload) = read_frame(reader, "response")?;
    decode_response_payload(status, &payload)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}
