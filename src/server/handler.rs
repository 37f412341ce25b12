use crate::error::CacheError;
use crate::events::{CacheEvent, EventKind};
use anyhow::Result;
use async_channel::{Receiver, Sender};
use hashbrown::{HashMap, HashSet};
use log::*;
use service_uptime::Uptime;
use std::time::{Duration, Instant};

use super::status::{JsonString, ServerState, ServerStatus, OK};

pub type Reply<T> = Sender<Result<T, CacheError>>;

#[derive(Debug, Clone)]
pub enum Command {
    Attach(String, Sender<CacheEvent>, Sender<()>), // client id, event channel, ack
    Detach(String),
    Add(String, String, Option<Duration>, Reply<()>),
    Get(String, Reply<Option<String>>),
    Update(String, String, Reply<()>),
    Remove(String, Reply<()>),
    Subscribe(String, Vec<EventKind>, Reply<()>),
    Unsubscribe(String, Option<Vec<EventKind>>, Reply<()>),
    Len(Sender<usize>),
    Sweep,
    Status(Sender<JsonString>),
    Shutdown,
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Debug)]
struct Subscriber {
    events: Sender<CacheEvent>,
    kinds: HashSet<EventKind>,
}

/// The key/value store with ttl and optional capacity.  Every mutation queues the
/// matching event; the handler loop publishes the queue after each command.
#[derive(Debug, Default)]
pub struct Store {
    entries: HashMap<String, Entry>,
    max_entries: Option<usize>,
    seq: u64,
    pending: Vec<CacheEvent>,
}

impl Store {
    pub fn new(max_entries: Option<usize>) -> Store {
        Store {
            max_entries,
            ..Store::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// drop the entry if it has expired; true when it was dropped
    fn expire_if_due(&mut self, key: &str, now: Instant) -> bool {
        let due = matches!(self.entries.get(key), Some(entry) if entry.is_expired(now));
        if due {
            self.entries.remove(key);
            self.pending.push(CacheEvent::new(EventKind::Expired, key));
        }
        due
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!("evicted key: {}", key);
            self.pending.push(CacheEvent::new(EventKind::Evicted, &key));
        }
    }

    pub fn add(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Result<(), CacheError> {
        self.expire_if_due(key, now);
        if self.entries.contains_key(key) {
            return Err(CacheError::DuplicateKey(key.to_string()));
        }

        let expires_at = match ttl {
            Some(ttl) => match now.checked_add(ttl) {
                Some(at) => Some(at),
                None => return Err(CacheError::Fault(format!("ttl out of range: {:?}", ttl))),
            },
            None => None,
        };

        if let Some(max) = self.max_entries {
            while max > 0 && self.entries.len() >= max {
                self.evict_oldest();
            }
        }

        self.seq += 1;
        let entry = Entry {
            value: value.to_string(),
            expires_at,
            seq: self.seq,
        };
        self.entries.insert(key.to_string(), entry);
        self.pending.push(CacheEvent::new(EventKind::Added, key));

        Ok(())
    }

    pub fn get(&mut self, key: &str, now: Instant) -> Option<String> {
        if self.expire_if_due(key, now) {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn update(&mut self, key: &str, value: &str, now: Instant) -> Result<(), CacheError> {
        self.expire_if_due(key, now);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value.to_string();
                self.pending.push(CacheEvent::new(EventKind::Updated, key));
                Ok(())
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str, now: Instant) -> Result<(), CacheError> {
        self.expire_if_due(key, now);
        match self.entries.remove(key) {
            Some(_) => {
                self.pending.push(CacheEvent::new(EventKind::Removed, key));
                Ok(())
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// expire everything that is due; returns the number of expired keys
    pub fn sweep(&mut self, now: Instant) -> usize {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in due.iter() {
            self.entries.remove(key);
            self.pending.push(CacheEvent::new(EventKind::Expired, key));
        }

        due.len()
    }

    pub fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.pending)
    }
}

// push queued events to every subscriber of the event's kind; closed channels are dropped
fn publish(events: Vec<CacheEvent>, subscribers: &mut HashMap<String, Subscriber>) {
    if events.is_empty() {
        return;
    }

    subscribers.retain(|id, sub| {
        for event in events.iter().filter(|e| sub.kinds.contains(&e.kind)) {
            if sub.events.try_send(event.clone()).is_err() {
                warn!("dropping subscriber {}, event channel closed", id);
                return false;
            }
        }
        true
    });
}

// the handler loop
pub async fn handler(id: String, max_entries: Option<usize>, rx: Receiver<Command>) -> Result<()> {
    let uptime = Uptime::new();
    let mut state = ServerState::Idle;
    let mut error_count = 0u16;

    let mut store = Store::new(max_entries);
    let mut subscribers: HashMap<String, Subscriber> = HashMap::new();
    let mut attached: HashMap<String, Sender<CacheEvent>> = HashMap::new();

    // now read and respond to requests
    while let Ok(cmd) = rx.recv().await {
        trace!("recv cmd: {:?}", cmd);
        let now = Instant::now();
        match cmd {
            Command::Attach(client_id, events, ack) => {
                info!("attach client id: {}", client_id);
                attached.insert(client_id, events);
                state = ServerState::Busy;
                if ack.send(()).await.is_err() {
                    error_count = error_count.saturating_add(1);
                    error!("error acknowledging attach");
                }
            }
            Command::Detach(client_id) => {
                info!("detach client id: {}", client_id);
                attached.remove(&client_id);
                subscribers.remove(&client_id);
                if attached.is_empty() {
                    state = ServerState::Idle;
                }
            }
            Command::Add(key, value, ttl, tx) => {
                let result = store.add(&key, &value, ttl, now);
                publish(store.take_events(), &mut subscribers);
                error_count = error_count.saturating_add(send_reply(result, tx).await);
            }
            Command::Get(key, tx) => {
                let value = store.get(&key, now);
                publish(store.take_events(), &mut subscribers);
                error_count = error_count.saturating_add(send_reply(Ok(value), tx).await);
            }
            Command::Update(key, value, tx) => {
                let result = store.update(&key, &value, now);
                publish(store.take_events(), &mut subscribers);
                error_count = error_count.saturating_add(send_reply(result, tx).await);
            }
            Command::Remove(key, tx) => {
                let result = store.remove(&key, now);
                publish(store.take_events(), &mut subscribers);
                error_count = error_count.saturating_add(send_reply(result, tx).await);
            }
            Command::Subscribe(client_id, kinds, tx) => {
                let result = match attached.get(&client_id) {
                    Some(events) => {
                        let sub = subscribers
                            .entry(client_id.clone())
                            .or_insert_with(|| Subscriber {
                                events: events.clone(),
                                kinds: HashSet::new(),
                            });
                        sub.kinds.extend(kinds);
                        debug!("client {} subscribed to {:?}", client_id, sub.kinds);
                        Ok(())
                    }
                    None => Err(CacheError::Fault(format!("unknown client: {}", client_id))),
                };
                error_count = error_count.saturating_add(send_reply(result, tx).await);
            }
            Command::Unsubscribe(client_id, kinds, tx) => {
                match kinds {
                    Some(kinds) => {
                        if let Some(sub) = subscribers.get_mut(&client_id) {
                            for kind in kinds.iter() {
                                sub.kinds.remove(kind);
                            }
                        }
                    }
                    None => {
                        subscribers.remove(&client_id);
                    }
                }
                error_count = error_count.saturating_add(send_reply(Ok(()), tx).await);
            }
            Command::Len(tx) => {
                let _r = tx.send(store.len()).await;
            }
            Command::Sweep => {
                let count = store.sweep(now);
                if count > 0 {
                    debug!("sweep expired {} keys", count);
                }
                publish(store.take_events(), &mut subscribers);
            }
            Command::Status(tx) => {
                let status = ServerStatus {
                    server_id: id.to_string(),
                    status: OK.to_string(),
                    state: state.clone(),
                    uptime: uptime.to_string(),
                    entries: store.len(),
                    clients: attached.len(),
                    error_count,
                };

                let msg = status.to_json();
                debug!("status response: {}", msg);
                if tx.send(msg).await.is_err() {
                    error_count = error_count.saturating_add(1);
                    error!("error returning status to channel: {:?}", tx);
                }
            }
            Command::Shutdown => {
                state = ServerState::Shutdown;
                info!("server id: {}, state: {:?}", id, state);
                break;
            }
        }
    }

    // helper functions
    async fn send_reply<T>(msg: Result<T, CacheError>, tx: Reply<T>) -> u16 {
        if tx.send(msg).await.is_err() {
            // the caller gave up, usually a request timeout
            warn!("error sending reply, requester is gone");
            1u16
        } else {
            0u16
        }
    }

    rx.close();

    Ok(())
}
