//! The configured set of databases and tables to watch.

use feedtap_proto::DEFAULT_DATABASE;

use crate::error::Error;
use crate::subscription::TableDescriptor;

/// Parse a `"db.table"` or bare `"table"` reference.
///
/// A bare table lives in the default database (`test`). Names cannot
/// contain dots, so `"a.b.c"` is rejected.
pub fn parse_table_ref(reference: &str) -> Result<TableDescriptor, Error> {
    let reference = reference.trim();
    let (db, table) = match reference.split_once('.') {
        Some((db, table)) => (db, table),
        None => (DEFAULT_DATABASE, reference),
    };

    if db.is_empty() || table.is_empty() || table.contains('.') {
        return Err(Error::Config(format!("invalid table reference '{}'", reference)));
    }
    Ok(TableDescriptor::new(db, table))
}

/// Databases and tables to watch, deduplicated by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    databases: Vec<String>,
    tables: Vec<TableDescriptor>,
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw configuration lists, keeping the first occurrence of
    /// every identity.
    pub fn from_lists<D, T>(databases: D, tables: T) -> Result<Self, Error>
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut config = Self::new();
        for db in databases {
            config.add_database(db.as_ref())?;
        }
        for table in tables {
            config.add_table(table.as_ref())?;
        }
        Ok(config)
    }

    /// Watch a database. Returns false if it was already watched.
    pub fn add_database(&mut self, db: &str) -> Result<bool, Error> {
        let db = db.trim();
        if db.is_empty() {
            return Err(Error::Config("empty database name".to_string()));
        }
        if self.databases.iter().any(|d| d == db) {
            return Ok(false);
        }
        self.databases.push(db.to_string());
        Ok(true)
    }

    /// Watch a table given as `"db.table"` or `"table"`. Returns false if it
    /// was already watched.
    pub fn add_table(&mut self, reference: &str) -> Result<bool, Error> {
        let table = parse_table_ref(reference)?;
        if self.tables.contains(&table) {
            return Ok(false);
        }
        self.tables.push(table);
        Ok(true)
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.tables.is_empty()
    }
}
