//! In-memory registry of active calls.
//!
//! The registry owns every [`CallRecord`] and the secondary indexes used to
//! route webhook events (carrier call id) and media WebSocket upgrades
//! (channel token) back to a call. All index access goes through one lock;
//! with at most one live call that coarseness costs nothing.

mod record;

pub use record::{CallRecord, CallState, Speaker};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

#[derive(Default)]
struct Indexes {
    by_call_id: HashMap<String, Arc<CallRecord>>,
    by_carrier_id: HashMap<String, String>,
    by_channel: HashMap<String, String>,
}

pub struct CallRegistry {
    inner: RwLock<Indexes>,
    next_call_id: AtomicU64,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
            next_call_id: AtomicU64::new(0),
        }
    }

    /// Mint the next call id: `call-<counter>-<unix-seconds>`.
    pub fn mint_call_id(&self) -> String {
        let counter = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("call-{counter}-{seconds}")
    }

    /// Insert a record, indexing it by call id and channel token.
    pub fn insert(&self, record: Arc<CallRecord>) {
        let mut inner = self.inner.write();
        inner
            .by_channel
            .insert(record.media_token.clone(), record.call_id.clone());
        inner
            .by_call_id
            .insert(record.call_id.clone(), record);
    }

    /// Add the carrier-assigned id to the secondary index once it is known.
    pub fn index_carrier_id(&self, carrier_call_id: &str, call_id: &str) {
        self.inner
            .write()
            .by_carrier_id
            .insert(carrier_call_id.to_string(), call_id.to_string());
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallRecord>> {
        self.inner.read().by_call_id.get(call_id).cloned()
    }

    pub fn get_by_carrier_id(&self, carrier_call_id: &str) -> Option<Arc<CallRecord>> {
        let inner = self.inner.read();
        let call_id = inner.by_carrier_id.get(carrier_call_id)?;
        inner.by_call_id.get(call_id).cloned()
    }

    pub fn get_by_channel(&self, token: &str) -> Option<Arc<CallRecord>> {
        let inner = self.inner.read();
        let call_id = inner.by_channel.get(token)?;
        inner.by_call_id.get(call_id).cloned()
    }

    /// Remove a record and every secondary index pointing at it.
    pub fn remove(&self, call_id: &str) -> Option<Arc<CallRecord>> {
        let mut inner = self.inner.write();
        let record = inner.by_call_id.remove(call_id)?;
        inner.by_channel.remove(&record.media_token);
        if let Some(carrier_id) = record.carrier_call_id() {
            inner.by_carrier_id.remove(&carrier_id);
        }
        Some(record)
    }

    /// Number of registered calls, hung up or not.
    pub fn active_calls(&self) -> usize {
        self.inner.read().by_call_id.len()
    }

    /// True while a call that has not hung up is registered.
    pub fn has_live_call(&self) -> bool {
        self.inner
            .read()
            .by_call_id
            .values()
            .any(|record| !record.hung_up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(registry: &CallRegistry, token: &str) -> Arc<CallRecord> {
        Arc::new(CallRecord::new(
            registry.mint_call_id(),
            "+15559876543".to_string(),
            token.to_string(),
        ))
    }

    #[test]
    fn test_call_id_format_and_monotonic_counter() {
        let registry = CallRegistry::new();
        let first = registry.mint_call_id();
        let second = registry.mint_call_id();

        assert!(first.starts_with("call-0-"), "got {first}");
        assert!(second.starts_with("call-1-"), "got {second}");

        let parts: Vec<&str> = first.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].parse::<u64>().is_ok());
    }

    #[test]
    fn test_secondary_indexes() {
        let registry = CallRegistry::new();
        let rec = record(&registry, "tok-1");
        registry.insert(rec.clone());
        rec.set_carrier_call_id("cc-77".to_string());
        registry.index_carrier_id("cc-77", &rec.call_id);

        assert!(registry.get(&rec.call_id).is_some());
        assert_eq!(
            registry.get_by_carrier_id("cc-77").unwrap().call_id,
            rec.call_id
        );
        assert_eq!(
            registry.get_by_channel("tok-1").unwrap().call_id,
            rec.call_id
        );
        assert!(registry.get_by_channel("tok-2").is_none());
    }

    #[test]
    fn test_remove_clears_all_indexes() {
        let registry = CallRegistry::new();
        let rec = record(&registry, "tok-1");
        registry.insert(rec.clone());
        rec.set_carrier_call_id("cc-77".to_string());
        registry.index_carrier_id("cc-77", &rec.call_id);

        assert_eq!(registry.active_calls(), 1);
        registry.remove(&rec.call_id);

        assert_eq!(registry.active_calls(), 0);
        assert!(registry.get(&rec.call_id).is_none());
        assert!(registry.get_by_carrier_id("cc-77").is_none());
        assert!(registry.get_by_channel("tok-1").is_none());
    }

    #[test]
    fn test_has_live_call_tracks_hangup() {
        let registry = CallRegistry::new();
        assert!(!registry.has_live_call());

        let rec = record(&registry, "tok-1");
        registry.insert(rec.clone());
        assert!(registry.has_live_call());

        // A hung-up record still counts as registered but not live
        rec.mark_hung_up();
        assert!(!registry.has_live_call());
        assert_eq!(registry.active_calls(), 1);
    }
}
