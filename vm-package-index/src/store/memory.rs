//! In-process key-value store with lazy expiry

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KeyTtl, KeyValueStore};
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str) -> IndexError {
    IndexError::Store(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

/// Inclusive `start..=stop` window, clamped to `len`.
fn window(len: usize, start: usize, stop: usize) -> std::ops::Range<usize> {
    if start >= len || stop < start {
        return 0..0;
    }
    start..stop.min(len - 1) + 1
}

/// Key-value store kept in memory for the lifetime of the process.
///
/// Expired keys are dropped when they are next touched. Empty sets and lists
/// are deleted, so `exists` agrees with what a Redis server would report.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn remove_if_empty(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| match &entry.value {
            Value::Set(set) => set.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::String(_) => false,
        });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::String(value) => Ok(Some(value.clone())),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry::persistent(Value::String(value.to_string())),
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> IndexResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn ttl(&self, key: &str) -> IndexResult<KeyTtl> {
        self.purge_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(KeyTtl::Missing);
        };
        Ok(match entry.expires_at {
            None => KeyTtl::Persistent,
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                KeyTtl::Expires(Duration::from_secs(secs))
            }
        })
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        self.purge_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> IndexResult<bool> {
        self.purge_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn sadd(&self, key: &str, member: &str) -> IndexResult<bool> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::Set(BTreeSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> IndexResult<bool> {
        self.purge_expired(key);
        let removed = match self.entries.get_mut(key) {
            None => false,
            Some(mut entry) => match &mut entry.value {
                Value::Set(set) => set.remove(member),
                _ => return Err(wrong_type(key)),
            },
        };
        self.remove_if_empty(key);
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> IndexResult<Vec<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> IndexResult<bool> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn scard(&self, key: &str) -> IndexResult<usize> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> IndexResult<usize> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: usize, stop: usize) -> IndexResult<()> {
        self.purge_expired(key);
        if let Some(mut entry) = self.entries.get_mut(key) {
            match &mut entry.value {
                Value::List(list) => {
                    let range = window(list.len(), start, stop);
                    *list = list.drain(range).collect();
                }
                _ => return Err(wrong_type(key)),
            }
        }
        self.remove_if_empty(key);
        Ok(())
    }

    async fn lrange(&self, key: &str, start: usize, stop: usize) -> IndexResult<Vec<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list
                    .range(window(list.len(), start, stop))
                    .cloned()
                    .collect()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn lrem(&self, key: &str, value: &str) -> IndexResult<usize> {
        self.purge_expired(key);
        let removed = match self.entries.get_mut(key) {
            None => 0,
            Some(mut entry) => match &mut entry.value {
                Value::List(list) => {
                    let before = list.len();
                    list.retain(|item| item != value);
                    before - list.len()
                }
                _ => return Err(wrong_type(key)),
            },
        };
        self.remove_if_empty(key);
        Ok(removed)
    }

    async fn llen(&self, key: &str) -> IndexResult<usize> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(wrong_type(key)),
            },
        }
    }
}
