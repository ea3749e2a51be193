//! Server response decoding.

use serde::Deserialize;
use serde_json::Value;

use crate::Error;

/// Response type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// A single value.
    SuccessAtom,
    /// The final batch of a sequence.
    SuccessSequence,
    /// A batch of a sequence, more is available via CONTINUE.
    SuccessPartial,
    /// Reply to NOREPLY_WAIT.
    WaitComplete,
    /// Reply to SERVER_INFO.
    ServerInfo,
    /// The client sent a malformed query.
    ClientError,
    /// The query failed to compile.
    CompileError,
    /// The query failed while running.
    RuntimeError,
}

impl ResponseType {
    /// Map a wire code to a response type.
    pub fn from_code(code: i64) -> Result<Self, Error> {
        Ok(match code {
            1 => ResponseType::SuccessAtom,
            2 => ResponseType::SuccessSequence,
            3 => ResponseType::SuccessPartial,
            4 => ResponseType::WaitComplete,
            5 => ResponseType::ServerInfo,
            16 => ResponseType::ClientError,
            17 => ResponseType::CompileError,
            18 => ResponseType::RuntimeError,
            other => return Err(Error::UnknownResponseType(other)),
        })
    }

    /// Whether this response reports a failed query.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResponseType::ClientError | ResponseType::CompileError | ResponseType::RuntimeError
        )
    }

    /// Human-readable name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::SuccessAtom => "SUCCESS_ATOM",
            ResponseType::SuccessSequence => "SUCCESS_SEQUENCE",
            ResponseType::SuccessPartial => "SUCCESS_PARTIAL",
            ResponseType::WaitComplete => "WAIT_COMPLETE",
            ResponseType::ServerInfo => "SERVER_INFO",
            ResponseType::ClientError => "CLIENT_ERROR",
            ResponseType::CompileError => "COMPILE_ERROR",
            ResponseType::RuntimeError => "RUNTIME_ERROR",
        }
    }
}

/// Notes attached to a response describing the kind of feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseNote {
    SequenceFeed,
    AtomFeed,
    OrderByLimitFeed,
    UnionedFeed,
    IncludesStates,
}

impl ResponseNote {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ResponseNote::SequenceFeed),
            2 => Some(ResponseNote::AtomFeed),
            3 => Some(ResponseNote::OrderByLimitFeed),
            4 => Some(ResponseNote::UnionedFeed),
            5 => Some(ResponseNote::IncludesStates),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawResponse {
    t: i64,
    #[serde(default)]
    r: Vec<Value>,
    #[serde(default)]
    n: Vec<i64>,
    #[serde(default)]
    e: Option<i64>,
}

/// A decoded server response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Response type.
    pub kind: ResponseType,
    /// Result values (rows for sequences, one value for atoms and errors).
    pub results: Vec<Value>,
    /// Feed notes.
    pub notes: Vec<ResponseNote>,
    /// Error type code for error responses.
    pub error_type: Option<i64>,
}

impl Response {
    /// Decode a response payload.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let raw: RawResponse = serde_json::from_slice(payload)?;
        Ok(Self {
            kind: ResponseType::from_code(raw.t)?,
            results: raw.r,
            notes: raw.n.into_iter().filter_map(ResponseNote::from_code).collect(),
            error_type: raw.e,
        })
    }

    /// Whether the server will send more batches for this query.
    pub fn is_partial(&self) -> bool {
        self.kind == ResponseType::SuccessPartial
    }

    /// Whether this response belongs to a changefeed.
    pub fn is_feed(&self) -> bool {
        self.notes.iter().any(|note| {
            matches!(
                note,
                ResponseNote::SequenceFeed
                    | ResponseNote::AtomFeed
                    | ResponseNote::OrderByLimitFeed
                    | ResponseNote::UnionedFeed
            )
        })
    }

    /// Error message of an error response.
    pub fn error_message(&self) -> String {
        match self.results.first() {
            Some(Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => format!("{} without message", self.kind.as_str()),
        }
    }
}
