/// in-memory cache handle double for unit tests: records every call and can
/// inject faults
///
use crate::client::CacheHandle;
use crate::config::ConnectionOptions;
use crate::error::CacheError;
use crate::events::{CacheEvent, Callback, EventKind};
use crate::run::OpKind;
use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockCache {
    options: ConnectionOptions,
    entries: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<(OpKind, String)>>,
    subscribed: Mutex<HashSet<EventKind>>,
    callbacks: Mutex<Vec<Callback>>,
    /// every n-th data operation fails with a fault
    fail_every: Option<usize>,
    op_count: AtomicUsize,
    pub closes: AtomicUsize,
    fail_close: bool,
    closed: AtomicBool,
}

impl MockCache {
    pub fn new() -> MockCache {
        MockCache::default()
    }

    pub fn failing_every(n: usize) -> MockCache {
        MockCache {
            fail_every: Some(n),
            ..MockCache::default()
        }
    }

    pub fn failing_close() -> MockCache {
        MockCache {
            fail_close: true,
            ..MockCache::default()
        }
    }

    pub fn calls(&self) -> Vec<(OpKind, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, kind: OpKind, key: &str) -> Result<(), CacheError> {
        self.calls.lock().unwrap().push((kind, key.to_string()));
        let n = self.op_count.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_every {
            Some(every) if every > 0 && n % every == 0 => {
                Err(CacheError::Fault(format!("injected fault on op {}", n)))
            }
            _ => Ok(()),
        }
    }

    fn emit(&self, kind: EventKind, key: &str) {
        if !self.subscribed.lock().unwrap().contains(&kind) {
            return;
        }
        let event = CacheEvent::new(kind, key);
        for cb in self.callbacks.lock().unwrap().iter() {
            cb.forward(&event);
        }
    }
}

#[async_trait]
impl CacheHandle for MockCache {
    fn id(&self) -> &str {
        "mock"
    }

    fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn add(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        self.record(OpKind::Add, key)?;
        {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(key) {
                return Err(CacheError::DuplicateKey(key.to_string()));
            }
            entries.insert(key.to_string(), value.to_string());
        }
        self.emit(EventKind::Added, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.record(OpKind::Get, key)?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn update(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.record(OpKind::Update, key)?;
        {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(key) {
                Some(v) => *v = value.to_string(),
                None => return Err(CacheError::NotFound(key.to_string())),
            }
        }
        self.emit(EventKind::Updated, key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.record(OpKind::Remove, key)?;
        if self.entries.lock().unwrap().remove(key).is_none() {
            return Err(CacheError::NotFound(key.to_string()));
        }
        self.emit(EventKind::Removed, key);
        Ok(())
    }

    async fn subscribe(&self, kinds: &[EventKind]) -> Result<(), CacheError> {
        self.subscribed.lock().unwrap().extend(kinds.iter().copied());
        Ok(())
    }

    async fn unsubscribe(&self, kinds: Option<&[EventKind]>) -> Result<(), CacheError> {
        let mut subscribed = self.subscribed.lock().unwrap();
        match kinds {
            Some(kinds) => kinds.iter().for_each(|k| {
                subscribed.remove(k);
            }),
            None => subscribed.clear(),
        }
        Ok(())
    }

    async fn on_event(&self, callback: Callback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(CacheError::Fault("close failed".to_string()));
        }
        Ok(())
    }
}
