//! ReQL term construction.
//!
//! Terms are serialized as nested JSON arrays `[type, [args...], {optargs}]`.
//! Only the term types needed by the two changefeed queries are exposed.

use serde_json::{json, Map, Value};

use crate::Error;

/// Term type codes from the ReQL protocol definition.
pub mod codes {
    pub const MAKE_ARRAY: u32 = 2;
    pub const VAR: u32 = 10;
    pub const DB: u32 = 14;
    pub const TABLE: u32 = 15;
    pub const EQ: u32 = 17;
    pub const PLUCK: u32 = 33;
    pub const FILTER: u32 = 39;
    pub const OR: u32 = 66;
    pub const AND: u32 = 67;
    pub const FUNC: u32 = 69;
    pub const DEFAULT: u32 = 92;
    pub const CONTAINS: u32 = 93;
    pub const CHANGES: u32 = 152;
    pub const BRACKET: u32 = 170;
}

/// Name of the system database holding cluster metadata.
pub const SYSTEM_DATABASE: &str = "rethinkdb";

/// System table listing every table and its readiness.
pub const TABLE_STATUS: &str = "table_status";

/// Query envelope type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Start a new query.
    Start = 1,
    /// Ask for the next batch of a partial result.
    Continue = 2,
    /// Stop a running query (closes a changefeed).
    Stop = 3,
}

/// Server-side coalescing of rapid changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Squash {
    /// Boolean squash: `true` coalesces within a batch, `false` disables it.
    Enabled(bool),
    /// Coalesce changes over this many seconds.
    Seconds(f64),
}

impl Squash {
    /// Squashing disabled.
    pub const OFF: Squash = Squash::Enabled(false);
    /// Squashing enabled with the server default window.
    pub const ON: Squash = Squash::Enabled(true);

    fn to_json(self) -> Value {
        match self {
            Squash::Enabled(flag) => Value::Bool(flag),
            Squash::Seconds(secs) => json!(secs),
        }
    }
}

impl Default for Squash {
    fn default() -> Self {
        Squash::ON
    }
}

/// Options passed to every `changes` term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangesOptions {
    /// Deliver existing rows as initial values when the feed opens.
    pub include_initial: bool,
    /// Server-side squashing.
    pub squash: Squash,
    /// Deliver `{"state": ..}` rows describing the feed lifecycle.
    pub include_states: bool,
}

impl ChangesOptions {
    /// Create options with states included.
    pub fn new(include_initial: bool, squash: Squash) -> Self {
        Self {
            include_initial,
            squash,
            include_states: true,
        }
    }

    fn to_optargs(self) -> Value {
        json!({
            "include_initial": self.include_initial,
            "squash": self.squash.to_json(),
            "include_states": self.include_states,
        })
    }
}

impl Default for ChangesOptions {
    fn default() -> Self {
        Self::new(true, Squash::default())
    }
}

/// A ReQL term in its JSON wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Term(Value);

impl Term {
    fn new(code: u32, args: Vec<Value>) -> Self {
        Term(json!([code, args]))
    }

    fn with_optargs(code: u32, args: Vec<Value>, optargs: Value) -> Self {
        Term(json!([code, args, optargs]))
    }

    /// A literal datum (string, number, bool or null).
    pub fn datum(value: impl Into<Value>) -> Self {
        Term(value.into())
    }

    /// `r.db(name)`
    pub fn db(name: &str) -> Self {
        Self::new(codes::DB, vec![json!(name)])
    }

    /// `db.table(name)`
    pub fn table(self, name: &str) -> Self {
        Self::new(codes::TABLE, vec![self.0, json!(name)])
    }

    /// `seq.changes(options)`
    pub fn changes(self, options: ChangesOptions) -> Self {
        Self::with_optargs(codes::CHANGES, vec![self.0], options.to_optargs())
    }

    /// `value(field)`
    pub fn bracket(self, field: &str) -> Self {
        Self::new(codes::BRACKET, vec![self.0, json!(field)])
    }

    /// `value.default(fallback)`
    pub fn default_to(self, fallback: Term) -> Self {
        Self::new(codes::DEFAULT, vec![self.0, fallback.0])
    }

    /// `value.eq(other)`
    pub fn eq(self, other: Term) -> Self {
        Self::new(codes::EQ, vec![self.0, other.0])
    }

    /// `value.and(other)`
    pub fn and(self, other: Term) -> Self {
        Self::new(codes::AND, vec![self.0, other.0])
    }

    /// `value.or(other)`
    pub fn or(self, other: Term) -> Self {
        Self::new(codes::OR, vec![self.0, other.0])
    }

    /// `seq.contains(value)`
    pub fn contains(self, value: Term) -> Self {
        Self::new(codes::CONTAINS, vec![self.0, value.0])
    }

    /// `r.expr([items...])`
    pub fn array(items: Vec<Term>) -> Self {
        Self::new(codes::MAKE_ARRAY, items.into_iter().map(|t| t.0).collect())
    }

    /// Reference to the first argument of the enclosing single-argument function.
    pub fn row() -> Self {
        Self::new(codes::VAR, vec![json!(1)])
    }

    /// `seq.filter(predicate)` where `predicate` is built over [`Term::row`].
    pub fn filter(self, predicate: Term) -> Self {
        let func = Self::new(
            codes::FUNC,
            vec![Self::array(vec![Term::datum(1)]).0, predicate.0],
        );
        Self::new(codes::FILTER, vec![self.0, func.0])
    }

    /// `seq.pluck({field: [subfields...], ...})`
    pub fn pluck_nested(self, fields: &[&str], subfields: &[&str]) -> Self {
        let nested = Self::array(subfields.iter().map(|f| Term::datum(*f)).collect());
        let mut selection = Map::new();
        for field in fields {
            selection.insert((*field).to_string(), nested.0.clone());
        }
        Self::new(codes::PLUCK, vec![self.0, Value::Object(selection)])
    }

    /// The JSON wire form of this term.
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Consume the term and return its JSON form.
    pub fn into_json(self) -> Value {
        self.0
    }
}

/// `r.db(db).table(table).changes(options)`
pub fn table_changes(db: &str, table: &str, options: ChangesOptions) -> Term {
    Term::db(db).table(table).changes(options)
}

/// Changefeed over `rethinkdb.table_status` narrowed to one database.
///
/// Rows pass when either side belongs to `db` and the new side reports all
/// replicas ready. Removals (null new side) always pass so the table can be
/// unwatched. Both sides are plucked down to `db` and `name`.
pub fn table_status_changes(db: &str, options: ChangesOptions) -> Term {
    let side_db = |side: &str| {
        Term::row()
            .bracket(side)
            .bracket("db")
            .default_to(Term::datum(Value::Null))
    };

    let in_database = Term::array(vec![side_db("old_val"), side_db("new_val")])
        .contains(Term::datum(db));

    let removed = Term::row()
        .bracket("new_val")
        .default_to(Term::datum(Value::Null))
        .eq(Term::datum(Value::Null));

    let ready = Term::row()
        .bracket("new_val")
        .bracket("status")
        .bracket("all_replicas_ready")
        .default_to(Term::datum(false));

    Term::db(SYSTEM_DATABASE)
        .table(TABLE_STATUS)
        .changes(options)
        .filter(in_database.and(removed.or(ready)))
        .pluck_nested(&["new_val", "old_val"], &["db", "name"])
}

/// Global optargs for table feeds: keep times and binaries in raw form.
pub fn raw_format_optargs() -> Value {
    json!({
        "time_format": "raw",
        "binary_format": "raw",
    })
}

/// Serialize a START query.
pub fn start_query(term: &Term, global_optargs: Option<&Value>) -> Result<Vec<u8>, Error> {
    let query = match global_optargs {
        Some(optargs) => json!([QueryType::Start as u32, term.as_json(), optargs]),
        None => json!([QueryType::Start as u32, term.as_json()]),
    };
    Ok(serde_json::to_vec(&query)?)
}

/// Serialize a CONTINUE or STOP query.
pub fn control_query(kind: QueryType) -> Vec<u8> {
    format!("[{}]", kind as u32).into_bytes()
}
