//! Changefeed cursors and their handles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;

use feedtap_proto::term::control_query;
use feedtap_proto::{QueryType, ResponseType};

use crate::connection::{ResponseReceiver, Shared};
use crate::error::Error;

/// Cloneable handle to a running query.
///
/// The token identifies the query for the lifetime of the connection, so two
/// handles are the same query exactly when their tokens are equal.
#[derive(Clone)]
pub struct QueryHandle {
    token: u64,
    closed: Arc<AtomicBool>,
    shared: Weak<Shared>,
}

impl QueryHandle {
    pub(crate) fn new(token: u64, shared: Weak<Shared>) -> Self {
        Self {
            token,
            closed: Arc::new(AtomicBool::new(false)),
            shared,
        }
    }

    /// Query token.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Whether [`close`](Self::close) has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the query. Only the first call sends STOP.
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        if shared.is_closed() || !shared.remove_route(self.token) {
            // Connection gone or the query already finished.
            return Ok(());
        }
        shared.send_frame(self.token, &control_query(QueryType::Stop))
    }

    fn request_more(&self) -> Result<(), Error> {
        match self.shared.upgrade() {
            Some(shared) => shared.send_frame(self.token, &control_query(QueryType::Continue)),
            None => Err(Error::Closed),
        }
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("token", &self.token)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Row stream of one changefeed query.
///
/// Batches are buffered and handed out one row at a time. The next batch is
/// requested as soon as a partial batch arrives.
pub struct Changefeed {
    handle: QueryHandle,
    responses: ResponseReceiver,
    rows: VecDeque<Value>,
    opened: bool,
    finished: bool,
}

impl Changefeed {
    pub(crate) fn new(handle: QueryHandle, responses: ResponseReceiver) -> Self {
        Self {
            handle,
            responses,
            rows: VecDeque::new(),
            opened: false,
            finished: false,
        }
    }

    /// Handle that can stop this feed from elsewhere.
    pub fn handle(&self) -> QueryHandle {
        self.handle.clone()
    }

    /// Wait until the server confirms the feed with its first response.
    ///
    /// Errors reported by the server for the query itself (unknown table,
    /// bad term) surface here, as does a first response without feed notes.
    pub async fn wait_open(&mut self) -> Result<(), Error> {
        if self.opened {
            return Ok(());
        }
        if self.finished {
            return Err(Error::Closed);
        }
        match self.fill().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Closed),
            Err(e) => Err(e),
        }
    }

    /// Next row, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Value, Error>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return Some(Ok(row));
            }
            if self.finished {
                return None;
            }
            match self.fill().await {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Receive one response into the row buffer. `Ok(false)` means the
    /// stream ended without a response.
    async fn fill(&mut self) -> Result<bool, Error> {
        let response = match self.responses.recv().await {
            Some(response) => response,
            None => {
                self.finished = true;
                return Ok(false);
            }
        };
        let response = response.inspect_err(|_| self.finished = true)?;
        let first = !self.opened;
        self.opened = true;

        if response.kind.is_error() {
            self.finished = true;
            return Err(Error::Query {
                kind: response.kind.as_str(),
                message: response.error_message(),
            });
        }
        if first && !response.is_feed() {
            self.finished = true;
            let _ = self.handle.close();
            return Err(Error::Protocol(feedtap_proto::Error::InvalidMessage(
                "query did not start a changefeed".to_string(),
            )));
        }

        match response.kind {
            ResponseType::SuccessPartial => {
                self.rows.extend(response.results);
                if !self.handle.is_closed() {
                    self.handle.request_more()?;
                }
            }
            ResponseType::SuccessSequence | ResponseType::SuccessAtom => {
                self.rows.extend(response.results);
                self.finished = true;
            }
            other => {
                self.finished = true;
                return Err(Error::Protocol(feedtap_proto::Error::InvalidMessage(format!(
                    "unexpected {} response to a changefeed",
                    other.as_str()
                ))));
            }
        }
        Ok(true)
    }
}

impl Drop for Changefeed {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.handle.close();
        }
    }
}
