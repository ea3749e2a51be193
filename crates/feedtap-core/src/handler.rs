//! Reactions to feed events.
//!
//! Table handlers turn row changes into emitted events and keep their own
//! registration current. Database handlers watch the table listing and
//! start or retire table feeds through [`reconcile`].

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::event::ChangeEvent;
use crate::feed::FeedEvent;
use crate::registry::FeedRegistry;
use crate::subscription::{FeedHandle, TableDescriptor};

/// What a handler may act on.
pub trait FeedContext {
    /// Handle type of registered feeds.
    type Handle: FeedHandle + Clone;

    /// The subscription registry.
    fn registry(&mut self) -> &mut FeedRegistry<Self::Handle>;

    /// Send a change event downstream.
    fn emit(&mut self, event: ChangeEvent);

    /// Start a table feed; it registers itself once the server confirms it.
    fn watch_table(&mut self, table: &TableDescriptor);
}

/// Keep the watched tables in line with one table-listing change.
///
/// The feed for `new` is started before the feed for `old` is retired, so a
/// table that is merely re-described is never left uncovered. When both
/// describe the same table the running feed is kept; the new one loses the
/// registration race and is closed.
pub fn reconcile<C: FeedContext>(
    ctx: &mut C,
    old: Option<&TableDescriptor>,
    new: Option<&TableDescriptor>,
) {
    debug!(old = ?old, new = ?new, "reconciling watched tables");

    if let Some(new) = new {
        ctx.watch_table(new);
    }
    if let Some(old) = old {
        if new != Some(old) {
            log_close_failure(ctx.registry().unregister_table(&old.database, &old.table, None));
        }
    }
}

fn log_close_failure<T>(result: Result<T, Error>) {
    if let Err(e) = result {
        warn!(error = %e, "failed to close feed");
    }
}

/// Handles events from one table's row feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChangeHandler {
    db: String,
    table: String,
}

impl TableChangeHandler {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Apply one event from the feed identified by `handle`.
    pub fn handle<C: FeedContext>(&self, ctx: &mut C, handle: &C::Handle, event: FeedEvent) {
        match event {
            FeedEvent::InitialValue(value) => {
                ctx.emit(ChangeEvent::new(&self.db, &self.table, None, Some(value)));
            }
            FeedEvent::Changed { old, new } => {
                ctx.emit(ChangeEvent::new(&self.db, &self.table, old, new));
            }
            FeedEvent::Opened => {
                log_close_failure(ctx.registry().register_table(
                    &self.db,
                    &self.table,
                    handle.clone(),
                ));
            }
            FeedEvent::Closed => {
                log_close_failure(ctx.registry().unregister_table(&self.db, &self.table, None));
            }
            FeedEvent::Errored(err) => {
                error!(db = %self.db, table = %self.table, "{}", err);
                log_close_failure(ctx.registry().unregister_table(
                    &self.db,
                    &self.table,
                    Some(handle),
                ));
            }
            FeedEvent::StreamWarning(message) => {
                warn!(db = %self.db, table = %self.table, "{}", message);
            }
        }
    }
}

/// Handles events from one database's table-listing feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseChangeHandler {
    db: String,
}

impl DatabaseChangeHandler {
    pub fn new(db: impl Into<String>) -> Self {
        Self { db: db.into() }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    /// Apply one event from the feed identified by `handle`.
    pub fn handle<C: FeedContext>(&self, ctx: &mut C, handle: &C::Handle, event: FeedEvent) {
        match event {
            FeedEvent::InitialValue(value) => match descriptor(Some(value)) {
                Ok(new) => reconcile(ctx, None, new.as_ref()),
                Err(e) => warn!(db = %self.db, error = %e, "ignoring malformed table listing row"),
            },
            FeedEvent::Changed { old, new } => match (descriptor(old), descriptor(new)) {
                (Ok(old), Ok(new)) => reconcile(ctx, old.as_ref(), new.as_ref()),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(db = %self.db, error = %e, "ignoring malformed table listing row")
                }
            },
            FeedEvent::Opened => {
                log_close_failure(ctx.registry().register_database(&self.db, handle.clone()));
            }
            FeedEvent::Closed => {
                log_close_failure(ctx.registry().unregister_database(&self.db));
            }
            FeedEvent::Errored(err) => {
                error!(db = %self.db, "{}", err);
                log_close_failure(ctx.registry().unregister_database(&self.db));
            }
            FeedEvent::StreamWarning(message) => {
                warn!(db = %self.db, "{}", message);
            }
        }
    }
}

fn descriptor(value: Option<Value>) -> Result<Option<TableDescriptor>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some),
    }
}
