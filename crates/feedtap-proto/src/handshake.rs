//! V0_4 connection handshake.
//!
//! The client sends the protocol magic, the auth key and the wire format
//! selector in one write. The server answers with a null-terminated string
//! that is `SUCCESS` when the connection was accepted.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// Magic number selecting protocol version V0_4.
pub const V0_4: u32 = 0x400c_2d20;

/// Magic number selecting the JSON wire format.
pub const JSON_PROTOCOL: u32 = 0x7e69_70c7;

/// Reply sent by the server when the handshake succeeds.
pub const SUCCESS_REPLY: &str = "SUCCESS";

/// Encode the client half of the handshake.
pub fn encode_handshake(auth_key: &str) -> Vec<u8> {
    let key = auth_key.as_bytes();
    let mut buf = BytesMut::with_capacity(12 + key.len());
    buf.put_u32_le(V0_4);
    buf.put_u32_le(key.len() as u32);
    buf.put_slice(key);
    buf.put_u32_le(JSON_PROTOCOL);
    buf.to_vec()
}

/// Parse the server reply, without its trailing null byte.
pub fn parse_handshake_reply(reply: &[u8]) -> Result<(), Error> {
    let reply = reply.strip_suffix(&[0]).unwrap_or(reply);
    let text = String::from_utf8_lossy(reply);
    if text == SUCCESS_REPLY {
        Ok(())
    } else {
        Err(Error::HandshakeRejected(text.trim().to_string()))
    }
}
