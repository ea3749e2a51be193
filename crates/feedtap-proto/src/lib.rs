//! RethinkDB wire protocol pieces used by feedtap.
//!
//! This crate covers only what a changefeed consumer needs from the JSON
//! protocol: the V0_4 handshake, query/response framing, the ReQL terms for
//! the two changefeed queries and the decoding of responses and feed rows.
//!
//! # Modules
//!
//! - [`handshake`] - Connection negotiation (magic numbers, auth key)
//! - [`framing`] - Token + length prefixed frames
//! - [`term`] - ReQL term builders and query envelopes
//! - [`response`] - Server response decoding
//! - [`row`] - Changefeed row classification
//! - [`error`] - Protocol error types

pub mod error;
pub mod framing;
pub mod handshake;
pub mod response;
pub mod row;
pub mod term;

pub use error::Error;

pub use handshake::{encode_handshake, parse_handshake_reply};
pub use response::{Response, ResponseNote, ResponseType};
pub use row::FeedRow;
pub use term::{ChangesOptions, QueryType, Squash, Term};

/// Database used when a watched table is given without one.
pub const DEFAULT_DATABASE: &str = "test";

/// Default driver port of a RethinkDB server.
pub const DEFAULT_PORT: u16 = 28015;
