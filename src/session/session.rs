//! Session handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Per-client key/value state.
///
/// Cloning is cheap and clones share storage, so concurrent requests from
/// the same client see each other's writes.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionData>,
}

#[derive(Debug)]
struct SessionData {
    id: String,
    values: DashMap<String, Value>,
    created: Instant,
    /// Milliseconds since `created` of the last access.
    last_access: AtomicU64,
}

impl Session {
    /// Create a session with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionData {
                id: id.into(),
                values: DashMap::new(),
                created: Instant::now(),
                last_access: AtomicU64::new(0),
            }),
        }
    }

    /// A session that is not stored anywhere; used when no session manager
    /// is configured.
    pub fn detached() -> Self {
        Self::new(String::new())
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_detached(&self) -> bool {
        self.inner.id.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.values.get(key).map(|v| v.value().clone())
    }

    /// Read a value and deserialize it. `None` if missing or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.values.insert(key.into(), value)
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.inner.values.insert(key.into(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.values.remove(key).map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.inner.values.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.values.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Record an access now.
    pub fn touch(&self) {
        let elapsed = self.inner.created.elapsed().as_millis() as u64;
        self.inner.last_access.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the last access.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.inner.last_access.load(Ordering::Relaxed));
        self.inner.created.elapsed().saturating_sub(last)
    }
}
