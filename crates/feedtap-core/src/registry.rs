//! Registry of active changefeeds.
//!
//! Two maps hold every live subscription: table feeds grouped by database,
//! and one table-listing feed per database. At most one subscription exists
//! per identity; a handle that loses a registration race is closed on the
//! spot, and a handle removed from the registry is closed as it leaves.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Error;
use crate::subscription::{FeedHandle, Subscription, TableDescriptor};

/// Registry of active table and database subscriptions.
#[derive(Debug)]
pub struct FeedRegistry<H> {
    /// `db -> table -> subscription`
    table_feeds: HashMap<String, HashMap<String, Subscription<H>>>,
    /// `db -> subscription`
    db_feeds: HashMap<String, Subscription<H>>,
}

impl<H: FeedHandle> FeedRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table_feeds: HashMap::new(),
            db_feeds: HashMap::new(),
        }
    }

    /// Register a table feed. The first registration for an identity wins;
    /// a later handle is closed immediately and `false` is returned.
    pub fn register_table(&mut self, db: &str, table: &str, handle: H) -> Result<bool, Error> {
        let tables = self.table_feeds.entry(db.to_string()).or_default();
        if tables.contains_key(table) {
            debug!(db, table, token = handle.token(), "duplicate table feed discarded");
            Subscription::table(db, table, handle).close()?;
            return Ok(false);
        }

        info!("Watching table {}.{}", db, table);
        tables.insert(table.to_string(), Subscription::table(db, table, handle));
        Ok(true)
    }

    /// Remove and close the table feed at `(db, table)`.
    ///
    /// With `Some(handle)` the entry is only removed if it is that handle's
    /// feed; with `None` whatever is registered there is removed.
    pub fn unregister_table(
        &mut self,
        db: &str,
        table: &str,
        handle: Option<&H>,
    ) -> Result<bool, Error> {
        let Some(tables) = self.table_feeds.get_mut(db) else {
            return Ok(false);
        };
        let matches = match (tables.get(table), handle) {
            (Some(_), None) => true,
            (Some(current), Some(handle)) => current.is_same(handle),
            (None, _) => false,
        };
        if !matches {
            return Ok(false);
        }

        info!("Unregistering table {}.{}", db, table);
        let removed = tables.remove(table);
        if tables.is_empty() {
            self.table_feeds.remove(db);
        }
        match removed {
            Some(subscription) => subscription.close().map(|_| true),
            None => Ok(false),
        }
    }

    /// Register a database feed with the same first-wins rule as tables.
    pub fn register_database(&mut self, db: &str, handle: H) -> Result<bool, Error> {
        if self.db_feeds.contains_key(db) {
            debug!(db, token = handle.token(), "duplicate database feed discarded");
            Subscription::database(db, handle).close()?;
            return Ok(false);
        }

        self.db_feeds
            .insert(db.to_string(), Subscription::database(db, handle));
        info!("Feed for db '{}' registered", db);
        Ok(true)
    }

    /// Remove a database: every table feed under it first, then its own
    /// feed. Each removed handle is closed; the first close failure is
    /// returned after the registry has been fully updated.
    pub fn unregister_database(&mut self, db: &str) -> Result<bool, Error> {
        if !self.table_feeds.contains_key(db) && !self.db_feeds.contains_key(db) {
            return Ok(false);
        }

        info!("Unregistering feed for db '{}'", db);
        let mut first_error = None;

        let tables: Vec<String> = self
            .table_feeds
            .get(db)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default();
        for table in tables {
            if let Err(e) = self.unregister_table(db, &table, None) {
                first_error.get_or_insert(e);
            }
        }
        self.table_feeds.remove(db);

        if let Some(subscription) = self.db_feeds.remove(db) {
            if let Err(e) = subscription.close() {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Close every table feed, then every database feed, and empty both maps.
    pub fn close_all(&mut self) -> Result<(), Error> {
        let mut first_error = None;

        for (_, tables) in self.table_feeds.drain() {
            for (_, subscription) in tables {
                if let Err(e) = subscription.close() {
                    first_error.get_or_insert(e);
                }
            }
        }
        for (_, subscription) in self.db_feeds.drain() {
            if let Err(e) = subscription.close() {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The subscription registered for a table.
    pub fn table_subscription(&self, db: &str, table: &str) -> Option<&Subscription<H>> {
        self.table_feeds.get(db).and_then(|tables| tables.get(table))
    }

    /// The subscription registered for a database.
    pub fn database_subscription(&self, db: &str) -> Option<&Subscription<H>> {
        self.db_feeds.get(db)
    }

    /// Whether a table feed is registered.
    pub fn is_table_watched(&self, db: &str, table: &str) -> bool {
        self.table_subscription(db, table).is_some()
    }

    /// Whether any table of `db` is registered.
    pub fn has_table_feeds(&self, db: &str) -> bool {
        self.table_feeds.contains_key(db)
    }

    /// Number of registered table feeds.
    pub fn table_count(&self) -> usize {
        self.table_feeds.values().map(HashMap::len).sum()
    }

    /// Number of registered database feeds.
    pub fn database_count(&self) -> usize {
        self.db_feeds.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.table_feeds.is_empty() && self.db_feeds.is_empty()
    }

    /// Registered tables, sorted.
    pub fn watched_tables(&self) -> Vec<TableDescriptor> {
        let mut tables: Vec<TableDescriptor> = self
            .table_feeds
            .iter()
            .flat_map(|(db, tables)| {
                tables
                    .keys()
                    .map(move |table| TableDescriptor::new(db.clone(), table.clone()))
            })
            .collect();
        tables.sort_by(|a, b| (&a.database, &a.table).cmp(&(&b.database, &b.table)));
        tables
    }
}

impl<H: FeedHandle> Default for FeedRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::testing::CountingHandle;

    #[test]
    fn test_register_table() {
        let mut registry = FeedRegistry::new();
        let handle = CountingHandle::new(1);

        assert!(registry.register_table("mydb", "users", handle.clone()).unwrap());
        assert!(registry.is_table_watched("mydb", "users"));
        assert_eq!(registry.table_count(), 1);
        assert_eq!(handle.close_count(), 0);
    }

    #[test]
    fn test_duplicate_table_keeps_first() {
        let mut registry = FeedRegistry::new();
        let first = CountingHandle::new(1);
        let second = CountingHandle::new(2);

        assert!(registry.register_table("mydb", "users", first.clone()).unwrap());
        assert!(!registry.register_table("mydb", "users", second.clone()).unwrap());

        assert_eq!(first.close_count(), 0);
        assert_eq!(second.close_count(), 1);
        assert!(registry
            .table_subscription("mydb", "users")
            .unwrap()
            .is_same(&first));
        assert_eq!(registry.table_count(), 1);
    }

    #[test]
    fn test_unregister_table_unconditional() {
        let mut registry = FeedRegistry::new();
        let handle = CountingHandle::new(1);
        registry.register_table("mydb", "users", handle.clone()).unwrap();

        assert!(registry.unregister_table("mydb", "users", None).unwrap());
        assert!(!registry.is_table_watched("mydb", "users"));
        assert!(!registry.has_table_feeds("mydb"));
        assert_eq!(handle.close_count(), 1);

        // Second removal is a no-op
        assert!(!registry.unregister_table("mydb", "users", None).unwrap());
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_unregister_table_guarded_by_handle() {
        let mut registry = FeedRegistry::new();
        let current = CountingHandle::new(1);
        let superseded = CountingHandle::new(2);
        registry.register_table("mydb", "users", current.clone()).unwrap();

        // A stale handle does not remove the current feed
        assert!(!registry
            .unregister_table("mydb", "users", Some(&superseded))
            .unwrap());
        assert!(registry.is_table_watched("mydb", "users"));
        assert_eq!(current.close_count(), 0);

        assert!(registry
            .unregister_table("mydb", "users", Some(&current))
            .unwrap());
        assert_eq!(current.close_count(), 1);
    }

    #[test]
    fn test_unregister_absent_table() {
        let mut registry: FeedRegistry<CountingHandle> = FeedRegistry::new();
        assert!(!registry.unregister_table("nope", "users", None).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_database_keeps_first() {
        let mut registry = FeedRegistry::new();
        let first = CountingHandle::new(1);
        let second = CountingHandle::new(2);

        assert!(registry.register_database("mydb", first.clone()).unwrap());
        assert!(!registry.register_database("mydb", second.clone()).unwrap());

        assert_eq!(registry.database_count(), 1);
        assert!(registry.database_subscription("mydb").unwrap().is_same(&first));
        assert_eq!(first.close_count(), 0);
        assert_eq!(second.close_count(), 1);
    }

    #[test]
    fn test_unregister_database_cascades() {
        let mut registry = FeedRegistry::new();
        let db = CountingHandle::new(1);
        let users = CountingHandle::new(2);
        let posts = CountingHandle::new(3);
        let other = CountingHandle::new(4);

        registry.register_database("mydb", db.clone()).unwrap();
        registry.register_table("mydb", "users", users.clone()).unwrap();
        registry.register_table("mydb", "posts", posts.clone()).unwrap();
        registry.register_table("otherdb", "users", other.clone()).unwrap();

        assert!(registry.unregister_database("mydb").unwrap());

        assert!(!registry.has_table_feeds("mydb"));
        assert!(registry.database_subscription("mydb").is_none());
        for handle in [&db, &users, &posts] {
            assert_eq!(handle.close_count(), 1);
        }
        assert_eq!(other.close_count(), 0);
        assert!(registry.is_table_watched("otherdb", "users"));

        // Absent database is a no-op
        assert!(!registry.unregister_database("mydb").unwrap());
        assert_eq!(db.close_count(), 1);
    }

    #[test]
    fn test_unregister_database_without_tables() {
        let mut registry = FeedRegistry::new();
        let db = CountingHandle::new(1);
        registry.register_database("mydb", db.clone()).unwrap();

        assert!(registry.unregister_database("mydb").unwrap());
        assert_eq!(db.close_count(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all() {
        let mut registry = FeedRegistry::new();
        let handles: Vec<CountingHandle> = (1..=3).map(CountingHandle::new).collect();
        registry.register_database("a", handles[0].clone()).unwrap();
        registry.register_table("a", "t1", handles[1].clone()).unwrap();
        registry.register_table("b", "t2", handles[2].clone()).unwrap();

        registry.close_all().unwrap();
        assert!(registry.is_empty());
        assert!(handles.iter().all(|h| h.close_count() == 1));

        registry.close_all().unwrap();
        assert!(handles.iter().all(|h| h.close_count() == 1));
    }

    #[test]
    fn test_failed_close_still_unregisters_table() {
        let mut registry = FeedRegistry::new();
        let handle = CountingHandle::failing(1);
        registry.register_table("mydb", "users", handle.clone()).unwrap();

        let result = registry.unregister_table("mydb", "users", None);
        assert!(matches!(result, Err(Error::Close { .. })));
        assert!(!registry.is_table_watched("mydb", "users"));
        assert!(registry.is_empty());
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_failed_close_during_cascade() {
        let mut registry = FeedRegistry::new();
        let db = CountingHandle::new(1);
        let users = CountingHandle::failing(2);
        let posts = CountingHandle::new(3);
        registry.register_database("mydb", db.clone()).unwrap();
        registry.register_table("mydb", "users", users.clone()).unwrap();
        registry.register_table("mydb", "posts", posts.clone()).unwrap();

        match registry.unregister_database("mydb") {
            Err(Error::Close { feed, .. }) => assert_eq!(feed, "token 2"),
            other => panic!("unexpected result: {other:?}"),
        }

        // Every handle closed once, nothing left behind
        for handle in [&db, &users, &posts] {
            assert_eq!(handle.close_count(), 1);
        }
        assert!(!registry.has_table_feeds("mydb"));
        assert!(registry.database_subscription("mydb").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_database_close_returned_after_tables() {
        let mut registry = FeedRegistry::new();
        let db = CountingHandle::failing(1);
        let users = CountingHandle::new(2);
        registry.register_database("mydb", db.clone()).unwrap();
        registry.register_table("mydb", "users", users.clone()).unwrap();

        assert!(registry.unregister_database("mydb").is_err());
        assert_eq!(db.close_count(), 1);
        assert_eq!(users.close_count(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all_with_failures() {
        let mut registry = FeedRegistry::new();
        let db = CountingHandle::failing(1);
        let t1 = CountingHandle::new(2);
        let t2 = CountingHandle::new(3);
        registry.register_database("a", db.clone()).unwrap();
        registry.register_table("a", "t1", t1.clone()).unwrap();
        registry.register_table("b", "t2", t2.clone()).unwrap();

        assert!(matches!(registry.close_all(), Err(Error::Close { .. })));
        assert!(registry.is_empty());
        for handle in [&db, &t1, &t2] {
            assert_eq!(handle.close_count(), 1);
        }

        // Nothing left to fail on
        registry.close_all().unwrap();
        assert_eq!(db.close_count(), 1);
    }

    #[test]
    fn test_watched_tables_sorted() {
        let mut registry = FeedRegistry::new();
        registry.register_table("b", "x", CountingHandle::new(1)).unwrap();
        registry.register_table("a", "z", CountingHandle::new(2)).unwrap();
        registry.register_table("a", "y", CountingHandle::new(3)).unwrap();

        assert_eq!(
            registry.watched_tables(),
            vec![
                TableDescriptor::new("a", "y"),
                TableDescriptor::new("a", "z"),
                TableDescriptor::new("b", "x"),
            ]
        );
    }
}
