//! Subscription identity and handles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A closable handle to one live changefeed.
///
/// `token` identifies the feed: two handles refer to the same feed exactly
/// when their tokens are equal. `close` must be idempotent.
pub trait FeedHandle {
    /// Identity of the underlying feed.
    fn token(&self) -> u64;

    /// Stop the feed. Calls after the first are no-ops.
    fn close(&self) -> Result<(), Error>;

    /// Whether the feed has been closed locally.
    fn is_closed(&self) -> bool;
}

/// One row of the cluster's table listing: a table inside a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Database name.
    #[serde(rename = "db")]
    pub database: String,
    /// Table name.
    #[serde(rename = "name")]
    pub table: String,
}

impl TableDescriptor {
    /// Create a descriptor.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    /// The table listing of one database.
    Database(String),
    /// The rows of one table.
    Table(TableDescriptor),
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKey::Database(db) => write!(f, "db '{}'", db),
            FeedKey::Table(table) => write!(f, "table {}", table),
        }
    }
}

/// A registered feed: its identity plus the handle that stops it.
#[derive(Debug)]
pub struct Subscription<H> {
    key: FeedKey,
    handle: H,
}

impl<H: FeedHandle> Subscription<H> {
    /// Subscription for a database-level feed.
    pub fn database(db: impl Into<String>, handle: H) -> Self {
        Self {
            key: FeedKey::Database(db.into()),
            handle,
        }
    }

    /// Subscription for a table-level feed.
    pub fn table(db: impl Into<String>, table: impl Into<String>, handle: H) -> Self {
        Self {
            key: FeedKey::Table(TableDescriptor::new(db, table)),
            handle,
        }
    }

    /// What this subscription watches.
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// The underlying handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Whether `handle` is this subscription's feed.
    pub fn is_same(&self, handle: &H) -> bool {
        self.handle.token() == handle.token()
    }

    /// Close the underlying feed.
    pub fn close(&self) -> Result<(), Error> {
        self.handle.close().map_err(|e| Error::Close {
            feed: self.key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    /// Handle that counts how often it was closed.
    #[derive(Debug, Clone)]
    pub struct CountingHandle {
        pub token: u64,
        pub closes: Rc<Cell<u32>>,
        fail_close: bool,
    }

    impl CountingHandle {
        pub fn new(token: u64) -> Self {
            Self {
                token,
                closes: Rc::new(Cell::new(0)),
                fail_close: false,
            }
        }

        /// A handle whose close is counted but reports an error.
        pub fn failing(token: u64) -> Self {
            Self {
                fail_close: true,
                ..Self::new(token)
            }
        }

        pub fn close_count(&self) -> u32 {
            self.closes.get()
        }
    }

    impl FeedHandle for CountingHandle {
        fn token(&self) -> u64 {
            self.token
        }

        fn close(&self) -> Result<(), Error> {
            self.closes.set(self.closes.get() + 1);
            if self.fail_close {
                return Err(Error::Close {
                    feed: format!("token {}", self.token),
                    reason: "stop rejected".to_string(),
                });
            }
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closes.get() > 0
        }
    }
}
