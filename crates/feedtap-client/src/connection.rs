//! Connection management.
//!
//! One TCP connection carries every query. Queries are told apart by their
//! token: a reader task decodes response frames and routes each one to the
//! channel registered for its token, and a writer task serializes outgoing
//! frames so that query issuers never touch the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use feedtap_proto::framing::{decode_header, encode_query_frame, HEADER_SIZE};
use feedtap_proto::term::start_query;
use feedtap_proto::{encode_handshake, parse_handshake_reply, Response, Term};

use crate::config::ClientConfig;
use crate::cursor::{Changefeed, QueryHandle};
use crate::error::Error;

/// Longest handshake reply accepted before giving up on the terminator.
const MAX_HANDSHAKE_REPLY: usize = 4096;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake completed, queries can be started.
    Ready,
    /// Connection closed locally or lost.
    Closed,
}

pub(crate) type ResponseSender = mpsc::UnboundedSender<Result<Response, Error>>;
pub(crate) type ResponseReceiver = mpsc::UnboundedReceiver<Result<Response, Error>>;

/// State shared between the connection, its query handles and the I/O tasks.
pub(crate) struct Shared {
    address: String,
    next_token: AtomicU64,
    routes: Mutex<HashMap<u64, ResponseSender>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Shared {
    /// Queue a frame for the writer task.
    pub(crate) fn send_frame(&self, token: u64, payload: &[u8]) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let frame = encode_query_frame(token, payload)?;
        self.outgoing.send(frame).map_err(|_| Error::Closed)
    }

    /// Stop routing responses for a token. Returns whether it was routed.
    pub(crate) fn remove_route(&self, token: u64) -> bool {
        self.routes.lock().remove(&token).is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark closed and signal the I/O tasks. Returns true on the first call.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Dropping the senders ends every open feed.
        self.routes.lock().clear();
        let _ = self.shutdown.send(true);
        true
    }

    /// Deliver a connection failure to every open query.
    fn fail_all(&self, reason: &str) {
        let routes: Vec<ResponseSender> = self.routes.lock().drain().map(|(_, tx)| tx).collect();
        for tx in routes {
            let _ = tx.send(Err(Error::Connection(reason.to_string())));
        }
    }

    /// Route one decoded response to its query.
    fn route(&self, token: u64, response: Result<Response, Error>) {
        let last = !matches!(&response, Ok(r) if r.is_partial());
        let route = {
            let mut routes = self.routes.lock();
            if last {
                routes.remove(&token)
            } else {
                routes.get(&token).cloned()
            }
        };

        match route {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(token, "dropping response for unknown query"),
        }
    }
}

/// A connection to a RethinkDB server.
///
/// Cloning is cheap; every clone drives the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Connect to the server and perform the handshake.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let address = config.address();

        let stream = tokio::time::timeout(config.connect_timeout, open_stream(&config))
            .await
            .map_err(|_| Error::Timeout)??;

        let (reader, writer) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            address: address.clone(),
            next_token: AtomicU64::new(1),
            routes: Mutex::new(HashMap::new()),
            outgoing: outgoing_tx,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(writer, outgoing_rx, shutdown_rx.clone()));
        tokio::spawn(read_loop(reader, shared.clone(), shutdown_rx));

        info!(address = %address, "connected to RethinkDB");
        Ok(Self { shared })
    }

    /// Start a query and return its changefeed.
    ///
    /// The feed is live once the first response arrives; see
    /// [`Changefeed::wait_open`].
    pub fn start(&self, term: &Term, global_optargs: Option<&Value>) -> Result<Changefeed, Error> {
        if self.shared.is_closed() {
            return Err(Error::Closed);
        }

        let token = self.shared.next_token.fetch_add(1, Ordering::SeqCst);
        let payload = start_query(term, global_optargs)?;

        let (tx, rx): (ResponseSender, ResponseReceiver) = mpsc::unbounded_channel();
        self.shared.routes.lock().insert(token, tx);

        if let Err(e) = self.shared.send_frame(token, &payload) {
            self.shared.remove_route(token);
            return Err(e);
        }

        debug!(token, "query started");
        Ok(Changefeed::new(
            QueryHandle::new(token, Arc::downgrade(&self.shared)),
            rx,
        ))
    }

    /// Close the connection. Open feeds end; later calls are no-ops.
    pub fn close(&self) {
        if self.shared.close() {
            info!(address = %self.shared.address, "connection closed");
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.shared.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Ready
        }
    }

    /// Number of queries still receiving responses.
    pub fn open_queries(&self) -> usize {
        self.shared.routes.lock().len()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .field("open_queries", &self.open_queries())
            .finish()
    }
}

async fn open_stream(config: &ClientConfig) -> Result<TcpStream, Error> {
    let mut stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(|e| Error::Connection(format!("failed to connect to {}: {}", config.address(), e)))?;
    stream.set_nodelay(true)?;

    stream.write_all(&encode_handshake(&config.auth_key)).await?;

    let mut reply = Vec::new();
    loop {
        let byte = stream.read_u8().await.map_err(|e| {
            Error::Connection(format!("handshake with {} failed: {}", config.address(), e))
        })?;
        if byte == 0 {
            break;
        }
        reply.push(byte);
        if reply.len() > MAX_HANDSHAKE_REPLY {
            return Err(Error::Connection("handshake reply too long".to_string()));
        }
    }
    parse_handshake_reply(&reply)?;

    Ok(stream)
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(error = %e, "failed to write query frame");
                        return;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }

    // Flush frames queued before shutdown (STOP queries from teardown).
    while let Ok(frame) = outgoing.try_recv() {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let result = tokio::select! {
        result = read_responses(&mut reader, &shared) => result,
        _ = shutdown.changed() => Ok(()),
    };

    if let Err(e) = result {
        if !shared.is_closed() {
            warn!(address = %shared.address, error = %e, "connection lost");
            shared.fail_all(&e.to_string());
            shared.close();
        }
    }
}

async fn read_responses(reader: &mut OwnedReadHalf, shared: &Shared) -> Result<(), Error> {
    loop {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    Error::Connection("server closed the connection".to_string())
                }
                _ => e.into(),
            });
        }
        let header = decode_header(&header)?;

        let mut payload = vec![0u8; header.len];
        reader.read_exact(&mut payload).await?;

        shared.route(header.token, Response::decode(&payload).map_err(Error::from));
    }
}
