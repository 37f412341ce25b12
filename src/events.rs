/// Change notifications and the relay that forwards them to the presentation layer.
///
/// Each handle keeps a list of callback records, one per `(client name, event kind)`.
/// The records are registered by whoever created the handle, and forwarding is a
/// plain copy of the event plus the originating client name; what actually arrives
/// is decided by the kinds passed to `subscribe`.
///
use crate::client::CacheHandle;
use crate::error::CacheError;
use crate::model::Product;
use async_std::task;
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Added,
    Updated,
    Removed,
    Expired,
    Evicted,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Added,
        EventKind::Updated,
        EventKind::Removed,
        EventKind::Expired,
        EventKind::Evicted,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::Added => "ADDED",
            EventKind::Updated => "UPDATED",
            EventKind::Removed => "REMOVED",
            EventKind::Expired => "EXPIRED",
            EventKind::Evicted => "EVICTED",
        };
        write!(f, "{}", label)
    }
}

/// what the cache service pushes to a subscribed connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub kind: EventKind,
    pub key: String,
}

impl CacheEvent {
    pub fn new(kind: EventKind, key: &str) -> CacheEvent {
        CacheEvent {
            kind,
            key: key.to_string(),
        }
    }
}

/// what the presentation layer receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: EventKind,
    pub key: String,
    pub client: String,
}

/// the presentation side of the relay
pub trait EventSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// writes every notification to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(&self, n: Notification) {
        info!("[{}] {} key: {}", n.client, n.kind, n.key);
    }
}

/// a registered callback record
#[derive(Clone)]
pub struct Callback {
    pub client_name: String,
    pub kind: EventKind,
    sink: Arc<dyn EventSink>,
}

impl Callback {
    pub fn new(client_name: &str, kind: EventKind, sink: Arc<dyn EventSink>) -> Callback {
        Callback {
            client_name: client_name.to_string(),
            kind,
            sink,
        }
    }

    /// forward the event if it is of this record's kind; returns true when forwarded
    pub fn forward(&self, event: &CacheEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }

        self.sink.notify(Notification {
            kind: event.kind,
            key: event.key.clone(),
            client: self.client_name.clone(),
        });

        true
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("client_name", &self.client_name)
            .field("kind", &self.kind)
            .finish()
    }
}

pub struct EventRelay;

impl EventRelay {
    /// register one callback record per kind on the handle
    pub async fn attach(
        handle: &dyn CacheHandle,
        client_name: &str,
        kinds: &[EventKind],
        sink: Arc<dyn EventSink>,
    ) {
        for kind in kinds {
            handle
                .on_event(Callback::new(client_name, *kind, sink.clone()))
                .await;
        }
        debug!("relay attached for client: {}, kinds: {:?}", client_name, kinds);
    }

    /// attach the relay for every event kind
    pub async fn attach_all(handle: &dyn CacheHandle, client_name: &str, sink: Arc<dyn EventSink>) {
        EventRelay::attach(handle, client_name, &EventKind::ALL, sink).await
    }
}

/// Walk a handle through every kind of change while subscribed to all events:
/// add, update, remove, then a short-lived add that is read back after it expires.
/// Unsubscribes on the way out regardless of the outcome.
pub async fn run_notification_drill(handle: &dyn CacheHandle, pause: Duration) -> Result<(), CacheError> {
    handle.subscribe(&EventKind::ALL).await?;
    info!("subscribed to all cache events");

    let result = drill_steps(handle, pause).await;

    if let Err(e) = handle.unsubscribe(None).await {
        warn!("unsubscribe after event drill failed: {}", e);
    }

    result
}

async fn drill_steps(handle: &dyn CacheHandle, pause: Duration) -> Result<(), CacheError> {
    let key = format!("eventtest:{}", domain_keys::keys::RouteKey::create());

    task::sleep(pause).await;
    let product = Product::new(1, "Event Test Product", 10.0, "Test");
    handle.add(&key, &product.to_json(), None).await?;

    task::sleep(pause).await;
    let product = Product::new(1, "Updated Event Test", 20.0, "Updated");
    handle.update(&key, &product.to_json()).await?;

    task::sleep(pause).await;
    handle.remove(&key).await?;

    task::sleep(pause).await;
    let exp_key = format!("{}:exp", key);
    let product = Product::new(2, "Expiring", 5.0, "Will expire");
    handle
        .add(&exp_key, &product.to_json(), Some(Duration::from_secs(2)))
        .await?;

    task::sleep(Duration::from_secs(3)).await;

    // a read forces the expiry check on services that expire lazily
    let _ = handle.get(&exp_key).await?;

    Ok(())
}
