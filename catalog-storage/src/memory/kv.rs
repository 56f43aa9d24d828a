use super::FaultPlan;
use crate::traits::KeyValueStore;
use async_trait::async_trait;
use catalog_core::{CatalogResult, Clock, StorageError, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const BACKEND: &str = "memory-kv";

#[derive(Debug, Clone)]
enum KvValue {
    Text(String),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: KvValue,
    expires_at: Option<Timestamp>,
}

impl KvEntry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

fn deadline(now: Timestamp, ttl: Duration) -> Option<Timestamp> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// Expiring key-value store with hash fields, modelled on a Redis-style
/// server. Expired keys are dropped lazily on access and scan.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, KvEntry>,
    clock: Arc<dyn Clock>,
    faults: FaultPlan,
}

impl InMemoryKeyValueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            faults: FaultPlan::default(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Remaining lifetime of a live key, if it has one.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if !entry.is_live(now) {
            return None;
        }
        entry
            .expires_at
            .and_then(|at| at.signed_duration_since(now).to_std().ok())
    }

    fn live_entry(&self, key: &str) -> Option<KvEntry> {
        let now = self.clock.now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }

    fn with_hash<T>(
        &self,
        key: &str,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let now = self.clock.now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.insert(KvEntry {
                        value: KvValue::Hash(BTreeMap::new()),
                        expires_at: None,
                    });
                }
                match &mut occupied.get_mut().value {
                    KvValue::Hash(fields) => apply(fields),
                    KvValue::Text(_) => Err(StorageError::WrongType {
                        key: key.to_string(),
                    }
                    .into()),
                }
            }
            Entry::Vacant(vacant) => {
                let mut fields = BTreeMap::new();
                let result = apply(&mut fields)?;
                vacant.insert(KvEntry {
                    value: KvValue::Hash(fields),
                    expires_at: None,
                });
                Ok(result)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CatalogResult<()> {
        self.faults.check(BACKEND, "set_with_ttl").await?;
        let entry = KvEntry {
            value: KvValue::Text(value.to_string()),
            expires_at: deadline(self.clock.now(), ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> CatalogResult<Option<String>> {
        self.faults.check(BACKEND, "get").await?;
        match self.live_entry(key) {
            Some(KvEntry {
                value: KvValue::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(StorageError::WrongType {
                key: key.to_string(),
            }
            .into()),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> CatalogResult<bool> {
        self.faults.check(BACKEND, "exists").await?;
        Ok(self.live_entry(key).is_some())
    }

    async fn delete(&self, key: &str) -> CatalogResult<bool> {
        self.faults.check(BACKEND, "delete").await?;
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry.is_live(now))
            .unwrap_or(false))
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> CatalogResult<Vec<String>> {
        self.faults.check(BACKEND, "scan_keys_by_prefix").await?;
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.is_live(now));
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hash_increment(&self, key: &str, field: &str, n: i64) -> CatalogResult<i64> {
        self.faults.check(BACKEND, "hash_increment").await?;
        self.with_hash(key, |fields| {
            let current = match fields.get(field) {
                Some(raw) => raw.parse::<i64>().map_err(|_| StorageError::WrongType {
                    key: format!("{key}.{field}"),
                })?,
                None => 0,
            };
            let next = current + n;
            fields.insert(field.to_string(), next.to_string());
            Ok(next)
        })
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CatalogResult<()> {
        self.faults.check(BACKEND, "hash_set").await?;
        self.with_hash(key, |fields| {
            fields.insert(field.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn hash_get_all(&self, key: &str) -> CatalogResult<BTreeMap<String, String>> {
        self.faults.check(BACKEND, "hash_get_all").await?;
        match self.live_entry(key) {
            Some(KvEntry {
                value: KvValue::Hash(fields),
                ..
            }) => Ok(fields),
            Some(_) => Err(StorageError::WrongType {
                key: key.to_string(),
            }
            .into()),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CatalogResult<bool> {
        self.faults.check(BACKEND, "expire").await?;
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
