/// The named collection of cache handles for one session, with one active entry.
///
/// Mutated only from the operator's command flow; engines receive handles from it
/// by reference and never touch the mapping.
///
use crate::client::{CacheHandle, Connector};
use crate::config::ConnectionOptions;
use crate::error::{CacheError, RegistryError};
use crate::events::{EventKind, EventRelay, EventSink};
use hashbrown::HashMap;
use log::*;
use std::sync::Arc;

pub const DEFAULT_CLIENT: &str = "Default";

/// kinds relayed for clients created through the registry
pub const CLIENT_RELAY_KINDS: [EventKind; 3] =
    [EventKind::Added, EventKind::Updated, EventKind::Removed];

/// success/failure tally for bulk operations across every client
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutcome {
    pub success: usize,
    pub failed: usize,
}

pub struct ClientRegistry {
    clients: HashMap<String, Arc<dyn CacheHandle>>,
    order: Vec<String>,
    active: String,
    disposed: bool,
}

impl ClientRegistry {
    /// a registry holding the initial handle as the active `Default` client
    pub fn new(initial: Arc<dyn CacheHandle>) -> ClientRegistry {
        let mut clients: HashMap<String, Arc<dyn CacheHandle>> = HashMap::new();
        clients.insert(DEFAULT_CLIENT.to_string(), initial);

        ClientRegistry {
            clients,
            order: vec![DEFAULT_CLIENT.to_string()],
            active: DEFAULT_CLIENT.to_string(),
            disposed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// add a client; the active client is unchanged.  A disposed registry takes no
    /// new clients.
    pub fn register(&mut self, name: &str, handle: Arc<dyn CacheHandle>) -> Result<(), RegistryError> {
        if self.disposed {
            return Err(RegistryError::Empty);
        }
        if self.clients.contains_key(name) {
            return Err(RegistryError::DuplicateClient(name.to_string()));
        }

        self.clients.insert(name.to_string(), handle);
        self.order.push(name.to_string());
        info!("registered client: {}", name);

        Ok(())
    }

    pub fn switch_to(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.clients.contains_key(name) {
            return Err(RegistryError::ClientNotFound(name.to_string()));
        }

        self.active = name.to_string();
        info!("switched to client: {}", name);

        Ok(())
    }

    /// the active client's name and handle
    pub fn active(&self) -> Result<(&str, &Arc<dyn CacheHandle>), RegistryError> {
        match self.clients.get(&self.active) {
            Some(handle) => Ok((self.active.as_str(), handle)),
            None => Err(RegistryError::Empty),
        }
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CacheHandle>> {
        self.clients.get(name)
    }

    /// client names in insertion order
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Connect a new client, relay its added/updated/removed events to the sink,
    /// then register it.  Duplicate names are rejected before connecting.
    pub async fn create_client(
        &mut self,
        name: &str,
        connector: &dyn Connector,
        options: &ConnectionOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), RegistryError> {
        if self.disposed {
            return Err(RegistryError::Empty);
        }
        if self.clients.contains_key(name) {
            return Err(RegistryError::DuplicateClient(name.to_string()));
        }

        let handle = connector.connect(options).await?;
        EventRelay::attach(handle.as_ref(), name, &CLIENT_RELAY_KINDS, sink).await;

        self.register(name, handle)
    }

    /// create `{prefix}_{i}` for i in 1..=count; returns each name with its outcome
    pub async fn bulk_create(
        &mut self,
        prefix: &str,
        count: usize,
        connector: &dyn Connector,
        options: &ConnectionOptions,
        sink: Arc<dyn EventSink>,
    ) -> Vec<(String, Result<(), RegistryError>)> {
        let prefix = if prefix.trim().is_empty() {
            "Client"
        } else {
            prefix.trim()
        };

        let mut outcomes = Vec::with_capacity(count);
        for i in 1..=count {
            let name = format!("{}_{}", prefix, i);
            let result = self
                .create_client(&name, connector, options, sink.clone())
                .await;
            if let Err(e) = &result {
                warn!("bulk create of {} failed: {}", name, e);
            }
            outcomes.push((name, result));
        }

        outcomes
    }

    /// every client updates the same key with its own message
    pub async fn broadcast_update(
        &self,
        key: &str,
        message: &str,
    ) -> Vec<(String, Result<(), CacheError>)> {
        let mut outcomes = Vec::with_capacity(self.order.len());
        for (name, handle) in self.entries() {
            let value = format!("{} (from {})", message, name);
            let result = handle.update(key, &value).await;
            if let Err(e) = &result {
                warn!("client {} broadcast failed: {}", name, e);
            }
            outcomes.push((name.to_string(), result));
        }

        outcomes
    }

    /// every client adds `{prefix}:{name}`
    pub async fn bulk_add(&self, prefix: &str) -> BulkOutcome {
        let prefix = if prefix.trim().is_empty() {
            "bulk:item"
        } else {
            prefix.trim()
        };

        let mut outcome = BulkOutcome::default();
        for (name, handle) in self.entries() {
            let key = format!("{}:{}", prefix, name);
            match handle.add(&key, &format!("Value from {}", name), None).await {
                Ok(()) => outcome.success += 1,
                Err(e) => {
                    error!("client {} failed: {}", name, e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &Arc<dyn CacheHandle>)> {
        self.order
            .iter()
            .filter_map(|name| self.clients.get(name).map(|h| (name.as_str(), h)))
    }

    /// Close every distinct handle once and empty the registry.  Individual close
    /// failures are logged and skipped; calling this again is a no-op.
    pub async fn dispose_all(&mut self) {
        self.disposed = true;
        let mut closed: Vec<usize> = Vec::with_capacity(self.order.len());

        for name in self.order.drain(..) {
            let handle = match self.clients.remove(&name) {
                Some(handle) => handle,
                None => continue,
            };

            let addr = handle_addr(&handle);
            if closed.contains(&addr) {
                debug!("client {} shares an already closed handle", name);
                continue;
            }
            closed.push(addr);

            if let Err(e) = handle.close().await {
                warn!("error closing client {}: {}", name, e);
            }
        }

        self.clients.clear();
        info!("registry disposed, {} handles closed", closed.len());
    }
}

// the same handle registered under two names shares one address
fn handle_addr(handle: &Arc<dyn CacheHandle>) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}
