//! feedtap core - changefeed registry and subscription manager.
//!
//! This crate tracks which RethinkDB tables are being watched and keeps that
//! set in line with the watched databases:
//!
//! - [`FeedRegistry`] holds at most one live subscription per table and per
//!   database.
//! - [`TableChangeHandler`] turns row changes into [`ChangeEvent`]s and keeps
//!   its table's registration current.
//! - [`DatabaseChangeHandler`] follows a database's table listing and starts
//!   or retires table feeds through [`reconcile`].
//! - [`SubscriptionManager`] starts the configured feeds, runs the single
//!   event loop and tears everything down.
//!
//! The backend is reached through the [`FeedSource`] trait, so nothing here
//! depends on a particular driver.

pub mod error;
pub mod event;
pub mod feed;
pub mod handler;
pub mod manager;
pub mod registry;
pub mod subscription;
pub mod watch;

pub use error::Error;
pub use event::{ChangeEvent, Decorator, EventSink, RESERVED_FIELDS};
pub use feed::{
    Dispatch, FeedEvent, FeedEvents, FeedOptions, FeedRequest, FeedRoute, FeedSource, FeedTarget,
};
pub use handler::{reconcile, DatabaseChangeHandler, FeedContext, TableChangeHandler};
pub use manager::SubscriptionManager;
pub use registry::FeedRegistry;
pub use subscription::{FeedHandle, FeedKey, Subscription, TableDescriptor};
pub use watch::{parse_table_ref, WatchConfig};
