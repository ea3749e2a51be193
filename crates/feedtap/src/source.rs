//! Feed source backed by the RethinkDB driver.

use tracing::{debug, trace};

use feedtap_client::{Changefeed, Connection, QueryHandle};
use feedtap_core::{FeedEvents, FeedHandle, FeedOptions, FeedRequest, FeedRoute, FeedSource};
use feedtap_proto::term::{raw_format_optargs, table_changes, table_status_changes};
use feedtap_proto::{ChangesOptions, FeedRow};

/// Handle of a changefeed opened through [`RethinkSource`].
#[derive(Debug, Clone)]
pub struct RethinkHandle(QueryHandle);

impl FeedHandle for RethinkHandle {
    fn token(&self) -> u64 {
        self.0.token()
    }

    fn close(&self) -> Result<(), feedtap_core::Error> {
        self.0
            .close()
            .map_err(|e| feedtap_core::Error::Source(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Opens every feed on one shared connection and drives each in its own
/// task.
#[derive(Debug)]
pub struct RethinkSource {
    conn: Connection,
}

impl RethinkSource {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl FeedSource for RethinkSource {
    type Handle = RethinkHandle;

    fn open(
        &mut self,
        request: FeedRequest,
        options: FeedOptions,
        route: FeedRoute<RethinkHandle>,
    ) -> Result<(), feedtap_core::Error> {
        let changes = ChangesOptions::new(options.backfill, options.squash);
        let (term, optargs) = match &request {
            FeedRequest::Database { db } => (table_status_changes(db, changes), None),
            FeedRequest::Table { db, table } => {
                (table_changes(db, table, changes), Some(raw_format_optargs()))
            }
        };

        let feed = self
            .conn
            .start(&term, optargs.as_ref())
            .map_err(|e| feedtap_core::Error::Source(e.to_string()))?;
        let events = route.bind(RethinkHandle(feed.handle()));

        tokio::spawn(drive(request, feed, events));
        Ok(())
    }

    fn close(&mut self) -> Result<(), feedtap_core::Error> {
        self.conn.close();
        Ok(())
    }
}

/// Report one feed's lifecycle and rows until it ends, is closed locally or
/// the event loop goes away.
async fn drive(request: FeedRequest, mut feed: Changefeed, events: FeedEvents<RethinkHandle>) {
    if let Err(e) = feed.wait_open().await {
        if !events.handle().is_closed() {
            events.errored(e);
        }
        return;
    }
    if !events.opened() {
        return;
    }

    while let Some(row) = feed.next().await {
        if events.handle().is_closed() {
            return;
        }
        let delivered = match row {
            Ok(row) => match FeedRow::classify(row) {
                FeedRow::State(state) => {
                    debug!(feed = %request, state = %state, "feed state");
                    true
                }
                FeedRow::Initial(value) => events.initial_value(value),
                FeedRow::Change { old, new } => events.changed(old, new),
                FeedRow::Error(message) => events.warning(message),
            },
            Err(e) => {
                events.errored(e);
                return;
            }
        };
        if !delivered {
            trace!(feed = %request, "event loop gone");
            return;
        }
    }

    if !events.handle().is_closed() {
        events.closed();
    }
}
