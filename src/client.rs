/// The cache handle capability and its loopback implementation.
///
use crate::config::ConnectionOptions;
use crate::error::CacheError;
use crate::events::{CacheEvent, Callback, EventKind};
use crate::server::handler::{Command, Reply};
use async_channel::{bounded, unbounded, Sender};
use async_std::sync::RwLock;
use async_std::task;
use async_trait::async_trait;
use domain_keys::keys::RouteKey;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A live connection to one cache endpoint.  Handles are shared between
/// concurrent workers, so every operation takes `&self`.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    /// connection id assigned when the handle was opened
    fn id(&self) -> &str;

    fn options(&self) -> &ConnectionOptions;

    fn is_connected(&self) -> bool;

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn update(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    async fn subscribe(&self, kinds: &[EventKind]) -> Result<(), CacheError>;

    /// `None` drops every subscription
    async fn unsubscribe(&self, kinds: Option<&[EventKind]>) -> Result<(), CacheError>;

    /// register a callback record; it fires for events of its kind once subscribed
    async fn on_event(&self, callback: Callback);

    /// idempotent
    async fn close(&self) -> Result<(), CacheError>;
}

/// opens new handles, e.g. for clients created through the registry
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Arc<dyn CacheHandle>, CacheError>;
}

/// `CacheHandle` over the in-process cache service.
#[derive(Debug)]
pub struct CacheClient {
    id: String,
    options: ConnectionOptions,
    connected: AtomicBool,
    request_tx: Sender<Command>,
    callbacks: Arc<RwLock<Vec<Callback>>>,
}

impl CacheClient {
    /// attach to the service behind `request_tx` and start the event listener
    pub async fn open(
        request_tx: Sender<Command>,
        options: &ConnectionOptions,
    ) -> Result<CacheClient, CacheError> {
        if options.timeout_ms == 0 {
            return Err(CacheError::Connection(format!(
                "invalid timeout for {}",
                options.endpoint()
            )));
        }

        let id = RouteKey::create();
        let (events_tx, events_rx) = unbounded::<CacheEvent>();
        let (ack_tx, ack_rx) = bounded(1);

        let attach = async {
            if request_tx
                .send(Command::Attach(id.clone(), events_tx, ack_tx))
                .await
                .is_err()
            {
                return false;
            }
            ack_rx.recv().await.is_ok()
        };

        match async_std::future::timeout(options.timeout(), attach).await {
            Ok(true) => (),
            Ok(false) => {
                return Err(CacheError::Connection(format!(
                    "no cache service running at {}",
                    options.endpoint()
                )))
            }
            Err(_) => {
                return Err(CacheError::Connection(format!(
                    "timed out connecting to {}",
                    options.endpoint()
                )))
            }
        }

        let callbacks: Arc<RwLock<Vec<Callback>>> = Arc::new(RwLock::new(vec![]));
        let listener_callbacks = callbacks.clone();
        let listener_id = id.clone();

        // the service drops the event sender on detach or shutdown, which ends this loop
        task::spawn(async move {
            while let Ok(event) = events_rx.recv().await {
                let callbacks = listener_callbacks.read().await;
                for cb in callbacks.iter() {
                    cb.forward(&event);
                }
            }
            debug!("event listener exit for client id: {}", listener_id);
        });

        info!("client {} connected to {}", id, options.endpoint());

        Ok(CacheClient {
            id,
            options: options.clone(),
            connected: AtomicBool::new(true),
            request_tx,
            callbacks,
        })
    }

    async fn request<T, F>(&self, build: F) -> Result<T, CacheError>
    where
        T: Send,
        F: FnOnce(Reply<T>) -> Command + Send,
    {
        if !self.is_connected() {
            return Err(CacheError::Connection(format!("client {} is closed", self.id)));
        }

        let (tx, rx) = bounded(1);
        let timeout = self.options.timeout();

        let exchange = async {
            if self.request_tx.send(build(tx)).await.is_err() {
                return Err(CacheError::Connection("cache service is not running".to_string()));
            }
            match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Connection(
                    "cache service dropped the request".to_string(),
                )),
            }
        };

        match async_std::future::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl CacheHandle for CacheClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.request(move |tx| Command::Add(key, value, ttl, tx)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = key.to_string();
        self.request(move |tx| Command::Get(key, tx)).await
    }

    async fn update(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.request(move |tx| Command::Update(key, value, tx)).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.request(move |tx| Command::Remove(key, tx)).await
    }

    async fn subscribe(&self, kinds: &[EventKind]) -> Result<(), CacheError> {
        let (id, kinds) = (self.id.clone(), kinds.to_vec());
        self.request(move |tx| Command::Subscribe(id, kinds, tx)).await
    }

    async fn unsubscribe(&self, kinds: Option<&[EventKind]>) -> Result<(), CacheError> {
        let (id, kinds) = (self.id.clone(), kinds.map(|k| k.to_vec()));
        self.request(move |tx| Command::Unsubscribe(id, kinds, tx)).await
    }

    async fn on_event(&self, callback: Callback) {
        self.callbacks.write().await.push(callback);
    }

    async fn close(&self) -> Result<(), CacheError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            debug!("client {} already closed", self.id);
            return Ok(());
        }

        // a service that is already down has nothing left to detach
        if self.request_tx.send(Command::Detach(self.id.clone())).await.is_err() {
            debug!("service gone before client {} detached", self.id);
        }

        info!("client {} closed", self.id);
        Ok(())
    }
}
