//! Subscription manager: the event loop that owns the registry.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::event::{ChangeEvent, Decorator, EventSink};
use crate::feed::{
    Dispatch, DispatchReceiver, DispatchSender, FeedOptions, FeedRoute, FeedSource, FeedTarget,
};
use crate::handler::{reconcile, DatabaseChangeHandler, FeedContext, TableChangeHandler};
use crate::registry::FeedRegistry;
use crate::subscription::{FeedHandle, TableDescriptor};
use crate::watch::WatchConfig;

/// Starts the configured feeds, applies every feed event to the registry and
/// tears everything down at the end.
///
/// All events arrive over one channel and are applied in order by whoever
/// drives the manager, so the registry is never touched concurrently.
pub struct SubscriptionManager<S: FeedSource, K: EventSink> {
    registry: FeedRegistry<S::Handle>,
    source: S,
    sink: K,
    decorator: Decorator,
    options: FeedOptions,
    tx: DispatchSender<S::Handle>,
    rx: DispatchReceiver<S::Handle>,
    stopped: bool,
}

impl<S: FeedSource, K: EventSink> SubscriptionManager<S, K> {
    /// Create a manager that opens feeds through `source` and emits to `sink`.
    pub fn new(source: S, sink: K, options: FeedOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry: FeedRegistry::new(),
            source,
            sink,
            decorator: Decorator::default(),
            options,
            tx,
            rx,
            stopped: false,
        }
    }

    /// Decorate every emitted event.
    pub fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorator = decorator;
        self
    }

    /// Open one feed per configured database and bootstrap every configured
    /// table the same way a database feed would discover it.
    pub fn start(&mut self, config: &WatchConfig) {
        info!(
            databases = config.databases().len(),
            tables = config.tables().len(),
            "starting subscriptions"
        );

        for db in config.databases() {
            self.open_feed(FeedTarget::Database(DatabaseChangeHandler::new(db.as_str())));
        }
        for table in config.tables() {
            reconcile(self, None, Some(table));
        }
    }

    /// Apply one event.
    ///
    /// Events are dropped once the manager has stopped, and so are events of
    /// a feed that was already closed locally.
    pub fn dispatch(&mut self, dispatch: Dispatch<S::Handle>) {
        let Dispatch {
            target,
            handle,
            event,
        } = dispatch;

        if self.stopped {
            return;
        }
        if handle.is_closed() {
            debug!(token = handle.token(), event = ?event, "event for closed feed ignored");
            return;
        }

        match &target {
            FeedTarget::Database(handler) => handler.handle(self, &handle, event),
            FeedTarget::Table(handler) => handler.handle(self, &handle, event),
        }
    }

    /// Apply every event already queued without waiting. Returns how many
    /// were taken off the queue.
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(dispatch) = self.rx.try_recv() {
            self.dispatch(dispatch);
            count += 1;
        }
        count
    }

    /// Run the event loop until `shutdown` resolves, then tear down.
    pub async fn run_until_shutdown<F>(&mut self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                dispatch = self.rx.recv() => match dispatch {
                    Some(dispatch) => self.dispatch(dispatch),
                    None => break,
                },
            }
        }

        self.teardown()
    }

    /// Close every table feed, then every database feed, then the source.
    ///
    /// Safe to call more than once; later calls do nothing. Every close is
    /// attempted and the first failure is returned.
    pub fn teardown(&mut self) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        info!(
            tables = self.registry.table_count(),
            databases = self.registry.database_count(),
            "tearing down subscriptions"
        );

        let closed = self.registry.close_all();
        self.rx.close();
        let source_closed = self.source.close();
        closed.and(source_closed)
    }

    /// Whether teardown has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The subscription registry.
    pub fn registry(&self) -> &FeedRegistry<S::Handle> {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn open_feed(&mut self, target: FeedTarget) {
        if self.stopped {
            return;
        }

        let request = target.request();
        debug!(feed = %request, "opening feed");
        let route = FeedRoute::new(target, self.tx.clone());
        if let Err(e) = self.source.open(request.clone(), self.options, route) {
            error!(feed = %request, error = %e, "failed to open feed");
        }
    }
}

impl<S: FeedSource, K: EventSink> FeedContext for SubscriptionManager<S, K> {
    type Handle = S::Handle;

    fn registry(&mut self) -> &mut FeedRegistry<S::Handle> {
        &mut self.registry
    }

    fn emit(&mut self, mut event: ChangeEvent) {
        self.decorator.decorate(&mut event);
        if let Err(e) = self.sink.send(event) {
            error!(error = %e, "dropping change event");
        }
    }

    fn watch_table(&mut self, table: &TableDescriptor) {
        self.open_feed(FeedTarget::Table(TableChangeHandler::new(
            table.database.as_str(),
            table.table.as_str(),
        )));
    }
}
