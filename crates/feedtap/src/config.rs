//! Tap configuration.

use std::time::Duration;

use clap::{ArgAction, Parser};
use serde_json::Value;

use feedtap_client::config::DEFAULT_HOST;
use feedtap_client::ClientConfig;
use feedtap_core::{Decorator, FeedOptions, WatchConfig};
use feedtap_proto::{Squash, DEFAULT_PORT};

use crate::error::Error;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

/// Everything the tap needs to run.
#[derive(Debug, Clone)]
pub struct TapConfig {
    /// Connection to the RethinkDB server.
    pub client: ClientConfig,

    /// Backfill and squash settings for every feed.
    pub options: FeedOptions,

    /// Databases and tables to watch.
    pub watch: WatchConfig,

    /// Tags and fields added to every event.
    pub decorator: Decorator,
}

impl TapConfig {
    /// Create a configuration that watches nothing yet.
    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            options: FeedOptions::default(),
            watch: WatchConfig::default(),
            decorator: Decorator::default(),
        }
    }

    /// Set the databases and tables to watch.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    /// Set the feed options.
    pub fn with_options(mut self, options: FeedOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the event decoration.
    pub fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorator = decorator;
        self
    }
}

impl Default for TapConfig {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Command-line arguments for the tap.
#[derive(Parser, Debug)]
#[command(name = "feedtap")]
#[command(version, about = "Stream RethinkDB changefeeds as JSON lines", long_about = None)]
pub struct Args {
    /// Hostname of the RethinkDB server.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Driver port of the RethinkDB server.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Auth key of the RethinkDB server.
    #[arg(long, default_value = "")]
    pub auth_key: String,

    /// Squash changes: a boolean, or a window in seconds.
    #[arg(long, default_value = "true", value_parser = parse_squash)]
    pub squash: Squash,

    /// Send every existing document when a feed opens.
    #[arg(long, default_value = "true", value_parser = parse_flag, action = ArgAction::Set)]
    pub backfill: bool,

    /// Tables to watch, as "db.table" or "table" (database "test").
    #[arg(long, value_delimiter = ',')]
    pub watch_tables: Vec<String>,

    /// Databases to watch; their tables are followed as they come and go.
    #[arg(long, value_delimiter = ',')]
    pub watch_dbs: Vec<String>,

    /// Tags added to every event.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Field added to every event, as key=value.
    #[arg(long = "add-field", value_parser = parse_field)]
    pub add_field: Vec<(String, Value)>,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,
}

impl Args {
    /// Convert command-line arguments to tap configuration.
    pub fn into_config(self) -> Result<TapConfig, Error> {
        let client = ClientConfig::new(self.host)
            .with_port(self.port)
            .with_auth_key(self.auth_key)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));

        let watch = WatchConfig::from_lists(&self.watch_dbs, &self.watch_tables)?;
        let decorator = Decorator::new(self.tags, self.add_field)?;

        Ok(TapConfig::new(client)
            .with_watch(watch)
            .with_options(FeedOptions {
                backfill: self.backfill,
                squash: self.squash,
            })
            .with_decorator(decorator))
    }
}

fn is_false(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// `false`, `0`, `no` and `off` are false; anything else is true.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(!is_false(value))
}

/// A boolean-like value, or a positive number of seconds.
fn parse_squash(value: &str) -> Result<Squash, String> {
    if is_false(value) {
        return Ok(Squash::OFF);
    }
    match value.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(Squash::Seconds(secs)),
        Ok(secs) => Err(format!("invalid squash window: {}", secs)),
        Err(_) => Ok(Squash::ON),
    }
}

fn parse_field(value: &str) -> Result<(String, Value), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", value))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", value));
    }
    Ok((key.to_string(), Value::String(val.to_string())))
}
