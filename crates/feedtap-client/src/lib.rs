//! feedtap client - async changefeed driver for RethinkDB.
//!
//! # Quick Start
//!
//! ```ignore
//! use feedtap_client::{ClientConfig, Connection};
//! use feedtap_proto::term::{table_changes, ChangesOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::connect(ClientConfig::localhost()).await?;
//!
//!     let term = table_changes("mydb", "users", ChangesOptions::default());
//!     let mut feed = conn.start(&term, None)?;
//!     while let Some(row) = feed.next().await {
//!         println!("{}", row?);
//!     }
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;

pub use config::ClientConfig;
pub use connection::{Connection, ConnectionState};
pub use cursor::{Changefeed, QueryHandle};
pub use error::Error;

/// Re-export protocol types.
pub use feedtap_proto as proto;
