//! Message framing for queries and responses.
//!
//! Both directions use the same header: the 8-byte little-endian query token
//! followed by the 4-byte little-endian payload length. The payload is JSON.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// Maximum response payload accepted from the server (64 MB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Token of the query this frame belongs to.
    pub token: u64,
    /// Length of the JSON payload.
    pub len: usize,
}

/// Encode a query frame: `[token (8 LE)][length (4 LE)][payload]`.
pub fn encode_query_frame(token: u64, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u64_le(token);
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame.to_vec())
}

/// Decode a frame header.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<FrameHeader, Error> {
    let mut token = [0u8; 8];
    token.copy_from_slice(&header[..8]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[8..]);

    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame length {} exceeds maximum {}",
            len, MAX_MESSAGE_SIZE
        )));
    }

    Ok(FrameHeader {
        token: u64::from_le_bytes(token),
        len,
    })
}
