//! Live event fan-out to connected operators.
//!
//! Each operator has at most one open event stream. Registering again
//! replaces the previous stream, which then ends. Publishing to an operator
//! without a stream is a no-op: events are never queued for later delivery,
//! so a reconnecting client must reconcile with a full fetch.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fanout::Registry;
//! use futures::StreamExt;
//!
//! # async fn example() {
//! let registry: Arc<Registry<String>> = Arc::new(Registry::new(64));
//!
//! let mut events = registry.register("operator-1");
//! registry.publish("operator-1", "hello".to_string());
//!
//! assert_eq!(events.next().await.as_deref(), Some("hello"));
//! # }
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::stream::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Default per-operator buffer size.
pub const DEFAULT_BUFFER: usize = 64;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the operator's current stream.
    Delivered,
    /// The operator has no open stream.
    NoSubscriber,
    /// The operator's stream is not draining and its buffer is full.
    Dropped,
}

struct Sink<E> {
    generation: u64,
    tx: mpsc::Sender<E>,
}

/// Registry of open operator event streams.
///
/// Shared as `Arc<Registry<E>>` between the stream endpoint and everything
/// that publishes.
pub struct Registry<E> {
    sinks: DashMap<String, Sink<E>>,
    next_generation: AtomicU64,
    buffer: usize,
}

impl<E: Send + 'static> Registry<E> {
    /// Create a registry whose streams buffer up to `buffer` events each.
    pub fn new(buffer: usize) -> Self {
        Self {
            sinks: DashMap::new(),
            next_generation: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Open the event stream for an operator, replacing any existing one.
    ///
    /// The registration is released when the returned subscription is dropped.
    pub fn register(self: &Arc<Self>, operator_id: impl Into<String>) -> Subscription<E> {
        let operator_id = operator_id.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        let replaced = self
            .sinks
            .insert(operator_id.clone(), Sink { generation, tx })
            .is_some();
        info!(operator_id = %operator_id, generation, replaced, "Operator stream registered");

        Subscription {
            registry: Arc::clone(self),
            operator_id,
            generation,
            rx,
        }
    }

    /// Deliver an event to the operator's current stream, if any.
    pub fn publish(&self, operator_id: &str, event: E) -> Delivery {
        // Clone the sender so the map shard is not locked during the send.
        let Some((generation, tx)) = self
            .sinks
            .get(operator_id)
            .map(|sink| (sink.generation, sink.tx.clone()))
        else {
            debug!(operator_id, "No open stream, event discarded");
            return Delivery::NoSubscriber;
        };

        match tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                warn!(operator_id, "Operator stream buffer full, event dropped");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.remove(operator_id, generation);
                Delivery::NoSubscriber
            }
        }
    }

    /// Whether the operator currently has an open stream.
    pub fn is_connected(&self, operator_id: &str) -> bool {
        self.sinks.contains_key(operator_id)
    }

    /// Number of open streams.
    pub fn connection_count(&self) -> usize {
        self.sinks.len()
    }

    /// Close every open stream. Used at shutdown.
    pub fn drain(&self) {
        let count = self.sinks.len();
        self.sinks.clear();
        info!(count, "Closed all operator streams");
    }

    fn remove(&self, operator_id: &str, generation: u64) {
        let removed = self
            .sinks
            .remove_if(operator_id, |_, sink| sink.generation == generation)
            .is_some();
        if removed {
            info!(operator_id, generation, "Operator stream deregistered");
        }
    }
}

impl<E: Send + 'static> Default for Registry<E> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

/// An operator's open event stream.
///
/// Ends when a newer registration for the same operator replaces it or the
/// registry is drained. Dropping it deregisters, unless it was already
/// replaced.
pub struct Subscription<E: Send + 'static> {
    registry: Arc<Registry<E>>,
    operator_id: String,
    generation: u64,
    rx: mpsc::Receiver<E>,
}

impl<E: Send + 'static> Subscription<E> {
    /// Operator this stream belongs to.
    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }
}

impl<E: Send + 'static> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<E: Send + 'static> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.registry.remove(&self.operator_id, self.generation);
    }
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
