//! Feed events and the source that produces them.
//!
//! A [`FeedSource`] opens changefeeds and reports what happens on each one
//! through a [`FeedEvents`] sender. Every report travels as a [`Dispatch`]
//! over a single channel to the task that owns the registry, which applies
//! them one at a time.

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use feedtap_proto::Squash;

use crate::error::Error;
use crate::handler::{DatabaseChangeHandler, TableChangeHandler};
use crate::subscription::FeedHandle;

/// Something that happened on one feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The server confirmed the feed; it is now live.
    Opened,
    /// An existing value delivered during backfill.
    InitialValue(Value),
    /// A change. `None` stands for a null side.
    Changed {
        old: Option<Value>,
        new: Option<Value>,
    },
    /// A non-fatal error on one record; the feed continues.
    StreamWarning(String),
    /// The feed failed and will deliver nothing more.
    Errored(String),
    /// The feed ended.
    Closed,
}

/// Settings applied to every feed request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedOptions {
    /// Deliver existing rows as initial values.
    pub backfill: bool,
    /// Server-side squashing.
    pub squash: Squash,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            backfill: true,
            squash: Squash::ON,
        }
    }
}

/// A feed to open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedRequest {
    /// Table listing of one database, limited to tables with all replicas ready.
    Database { db: String },
    /// Rows of one table.
    Table { db: String, table: String },
}

impl fmt::Display for FeedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedRequest::Database { db } => write!(f, "db '{}'", db),
            FeedRequest::Table { db, table } => write!(f, "table {}.{}", db, table),
        }
    }
}

/// The handler a feed's events are delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTarget {
    Database(DatabaseChangeHandler),
    Table(TableChangeHandler),
}

impl FeedTarget {
    /// The request that opens this target's feed.
    pub fn request(&self) -> FeedRequest {
        match self {
            FeedTarget::Database(handler) => FeedRequest::Database {
                db: handler.db().to_string(),
            },
            FeedTarget::Table(handler) => FeedRequest::Table {
                db: handler.db().to_string(),
                table: handler.table().to_string(),
            },
        }
    }
}

/// One event on its way to the event loop.
#[derive(Debug)]
pub struct Dispatch<H> {
    /// Handler the event is for.
    pub target: FeedTarget,
    /// Feed the event happened on.
    pub handle: H,
    /// The event.
    pub event: FeedEvent,
}

pub(crate) type DispatchSender<H> = mpsc::UnboundedSender<Dispatch<H>>;
pub(crate) type DispatchReceiver<H> = mpsc::UnboundedReceiver<Dispatch<H>>;

/// Delivery route handed to a source with each request.
///
/// The source binds it to the feed's handle as soon as it has one.
#[derive(Debug)]
pub struct FeedRoute<H> {
    target: FeedTarget,
    tx: DispatchSender<H>,
}

impl<H> FeedRoute<H> {
    pub(crate) fn new(target: FeedTarget, tx: DispatchSender<H>) -> Self {
        Self { target, tx }
    }

    /// Handler this route delivers to.
    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    /// Attach the feed's handle.
    pub fn bind(self, handle: H) -> FeedEvents<H> {
        FeedEvents {
            target: self.target,
            handle,
            tx: self.tx,
        }
    }
}

/// Sender used by a source to report events of one feed.
///
/// Every method returns `false` once the event loop has stopped; the source
/// should then stop driving the feed.
#[derive(Debug, Clone)]
pub struct FeedEvents<H> {
    target: FeedTarget,
    handle: H,
    tx: DispatchSender<H>,
}

impl<H: Clone> FeedEvents<H> {
    /// The feed's handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn opened(&self) -> bool {
        self.send(FeedEvent::Opened)
    }

    pub fn initial_value(&self, value: Value) -> bool {
        self.send(FeedEvent::InitialValue(value))
    }

    pub fn changed(&self, old: Option<Value>, new: Option<Value>) -> bool {
        self.send(FeedEvent::Changed { old, new })
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.send(FeedEvent::StreamWarning(message.into()))
    }

    pub fn errored(&self, error: impl fmt::Display) -> bool {
        self.send(FeedEvent::Errored(error.to_string()))
    }

    pub fn closed(&self) -> bool {
        self.send(FeedEvent::Closed)
    }

    /// Report an event.
    pub fn send(&self, event: FeedEvent) -> bool {
        self.tx
            .send(Dispatch {
                target: self.target.clone(),
                handle: self.handle.clone(),
                event,
            })
            .is_ok()
    }
}

/// Opens changefeeds on the backend.
///
/// All feeds of one source share a single connection.
pub trait FeedSource {
    /// Handle type of the feeds this source opens.
    type Handle: FeedHandle + Clone;

    /// Open a feed and report its events through `route`.
    ///
    /// Returning an error means no events will ever be reported for it.
    fn open(
        &mut self,
        request: FeedRequest,
        options: FeedOptions,
        route: FeedRoute<Self::Handle>,
    ) -> Result<(), Error>;

    /// Close the shared connection. Feeds still running end with it.
    fn close(&mut self) -> Result<(), Error>;
}
