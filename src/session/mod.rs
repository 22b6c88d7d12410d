//! Per-token session storage.
//!
//! Each session is one user's isolated world: versioned resource history,
//! tombstones for deleted ids, and per-type id counters. Sessions are keyed
//! by the token id (or subject) and reclaimed after the token expires.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::fhir::Resource;

mod store;
pub use store::SessionStore;

/// A user session with isolated resource storage.
///
/// All methods take `&self`; the session lives behind an `Arc` shared
/// between the request that resolved it and the store. Reads on distinct
/// ids run concurrently under the read lock; writes serialize under the
/// write lock, which keeps version histories gap-free.
pub struct Session {
    session_key: String,
    created_at: DateTime<Utc>,
    expiry: RwLock<Option<DateTime<Utc>>>,
    hydrated: AtomicBool,
    hydration_lock: tokio::sync::Mutex<()>,

    // type name -> id -> ordered version map; the last key is "latest"
    resources: RwLock<HashMap<String, HashMap<String, BTreeMap<u64, Resource>>>>,
    tombstones: RwLock<HashMap<String, HashSet<String>>>,
    next_ids: RwLock<HashMap<String, u64>>,
}

impl Session {
    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            created_at: Utc::now(),
            expiry: RwLock::new(None),
            hydrated: AtomicBool::new(false),
            hydration_lock: tokio::sync::Mutex::new(()),
            resources: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashMap::new()),
            next_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_expiry(&self, expiry: Option<DateTime<Utc>>) {
        *self.expiry.write().unwrap() = expiry;
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        *self.expiry.read().unwrap()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|exp| now > exp)
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::Acquire)
    }

    pub fn set_hydrated(&self, hydrated: bool) {
        self.hydrated.store(hydrated, Ordering::Release);
    }

    /// Once-latch serializing first-use hydration across concurrent requests.
    pub fn hydration_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.hydration_lock
    }

    /// Store a resource version. Clears any tombstone for the id.
    pub fn store(&self, resource_type: &str, id: &str, version: u64, resource: Resource) {
        self.resources
            .write()
            .unwrap()
            .entry(resource_type.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .insert(version, resource);

        if let Some(deleted) = self.tombstones.write().unwrap().get_mut(resource_type) {
            deleted.remove(id);
        }
    }

    /// Get a stored resource. `version = None` returns the latest version.
    pub fn get(&self, resource_type: &str, id: &str, version: Option<u64>) -> Option<Resource> {
        let resources = self.resources.read().unwrap();
        let versions = resources.get(resource_type)?.get(id)?;
        match version {
            Some(v) => versions.get(&v).cloned(),
            None => versions.last_key_value().map(|(_, r)| r.clone()),
        }
    }

    /// Latest version number stored for an id, tombstoned or not.
    pub fn latest_version(&self, resource_type: &str, id: &str) -> Option<u64> {
        let resources = self.resources.read().unwrap();
        resources
            .get(resource_type)?
            .get(id)?
            .last_key_value()
            .map(|(v, _)| *v)
    }

    /// Latest versions of every id that has stored versions and is not
    /// tombstoned.
    pub fn get_all(&self, resource_type: &str) -> Vec<Resource> {
        let resources = self.resources.read().unwrap();
        let tombstones = self.tombstones.read().unwrap();
        let deleted = tombstones.get(resource_type);

        let Some(ids) = resources.get(resource_type) else {
            return Vec::new();
        };

        ids.iter()
            .filter(|(id, versions)| {
                !versions.is_empty() && !deleted.is_some_and(|d| d.contains(*id))
            })
            .filter_map(|(_, versions)| versions.last_key_value().map(|(_, r)| r.clone()))
            .collect()
    }

    /// Mark an id as deleted.
    pub fn delete(&self, resource_type: &str, id: &str) {
        self.tombstones
            .write()
            .unwrap()
            .entry(resource_type.to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub fn is_deleted(&self, resource_type: &str, id: &str) -> bool {
        self.tombstones
            .read()
            .unwrap()
            .get(resource_type)
            .is_some_and(|d| d.contains(id))
    }

    /// Stored and not tombstoned.
    pub fn exists(&self, resource_type: &str, id: &str) -> bool {
        let stored = self
            .resources
            .read()
            .unwrap()
            .get(resource_type)
            .is_some_and(|ids| ids.contains_key(id));
        stored && !self.is_deleted(resource_type, id)
    }

    /// Next server-assigned id for a type. Monotonic from 1, independent
    /// across types.
    pub fn next_id(&self, resource_type: &str) -> u64 {
        let mut next_ids = self.next_ids.write().unwrap();
        let counter = next_ids.entry(resource_type.to_string()).or_insert(1);
        let id = *counter;
        *counter += 1;
        id
    }

    /// Drop all state and reset the hydration flag.
    pub fn clear(&self) {
        self.resources.write().unwrap().clear();
        self.tombstones.write().unwrap().clear();
        self.next_ids.write().unwrap().clear();
        self.set_hydrated(false);
    }
}
