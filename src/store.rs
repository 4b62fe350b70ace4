//! In-memory fingerprint → completions store (C2), per `SPEC_FULL.md` §4.2.
//!
//! A single `parking_lot::Mutex` guards the map — the spec calls for one
//! mutual-exclusion primitive rather than a lock-free map, so this
//! deliberately isn't `dashmap`, unlike the rest of the corpus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::domain::{Completion, Fingerprint};

/// Thread-safe store of cached completions, keyed by fingerprint.
///
/// Generalizes `agents/cache/cache_handler.rs::CacheHandler` (which mapped a
/// string key to a single JSON value) to per-key *vectors* of completions,
/// since a fingerprint can accumulate more than one sample over time.
pub struct Store {
    inner: Mutex<HashMap<Fingerprint, Vec<Completion>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a clone of whatever completions are cached for `fp`, or an
    /// empty vec if there are none. The clone is a snapshot: callers never
    /// see concurrent appends land mid-read, and mutating the returned
    /// vec has no effect on the store.
    pub fn list(&self, fp: &Fingerprint) -> Vec<Completion> {
        self.inner.lock().get(fp).cloned().unwrap_or_default()
    }

    /// Appends freshly generated completions for `fp`, creating the entry
    /// if absent. `on_each` is invoked once per completion, in order, while
    /// the store's lock is still held — callers use it to enqueue the
    /// matching journal record from inside the lock, so that concurrent
    /// `append` calls for the same fingerprint can never enqueue out of the
    /// order they landed in memory (SPEC_FULL §5: "enqueue happens under
    /// the store lock"). `on_each` must not block or re-enter the store.
    pub fn append(
        &self,
        fp: Fingerprint,
        mut completions: Vec<Completion>,
        mut on_each: impl FnMut(&Completion),
    ) {
        if completions.is_empty() {
            return;
        }
        let mut guard = self.inner.lock();
        let entry = guard.entry(fp).or_default();
        for completion in &completions {
            on_each(completion);
        }
        entry.append(&mut completions);
    }

    /// Seeds a fingerprint's completions directly — used when loading the
    /// journal at startup, where entries arrive already materialized rather
    /// than one fresh batch at a time.
    pub fn load(&self, fp: Fingerprint, completion: Completion) {
        self.inner.lock().entry(fp).or_default().push(completion);
    }

    /// Drops every cached entry. Counters are left untouched — `hits` and
    /// `misses` describe request history, not cache contents.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn keys_count(&self) -> u64 {
        self.inner.lock().len() as u64
    }

    pub fn total_responses(&self) -> u64 {
        self.inner.lock().values().map(|v| v.len() as u64).sum()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 32])
    }

    fn completion(text: &str) -> Completion {
        Completion(json!({"text": text}))
    }

    #[test]
    fn list_on_empty_store_is_empty() {
        let store = Store::new();
        assert!(store.list(&fp(1)).is_empty());
    }

    #[test]
    fn append_then_list_round_trips() {
        let store = Store::new();
        store.append(fp(1), vec![completion("a"), completion("b")], |_| {});
        let got = store.list(&fp(1));
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text(), "a");
        assert_eq!(got[1].text(), "b");
    }

    #[test]
    fn list_returns_a_snapshot_not_a_live_view() {
        let store = Store::new();
        store.append(fp(1), vec![completion("a")], |_| {});
        let mut snapshot = store.list(&fp(1));
        snapshot.push(completion("injected"));
        assert_eq!(store.list(&fp(1)).len(), 1);
    }

    #[test]
    fn clear_empties_all_entries_but_keeps_counters() {
        let store = Store::new();
        store.append(fp(1), vec![completion("a")], |_| {});
        store.record_hit();
        store.record_miss();
        store.clear();
        assert!(store.list(&fp(1)).is_empty());
        assert_eq!(store.keys_count(), 0);
        assert_eq!(store.hits(), 1);
        assert_eq!(store.misses(), 1);
    }

    #[test]
    fn keys_count_and_total_responses_reflect_multiple_fingerprints() {
        let store = Store::new();
        store.append(fp(1), vec![completion("a"), completion("b")], |_| {});
        store.append(fp(2), vec![completion("c")], |_| {});
        assert_eq!(store.keys_count(), 2);
        assert_eq!(store.total_responses(), 3);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let store = Arc::new(Store::new());
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.append(fp(1), vec![completion(&format!("t{i}"))], |_| {});
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list(&fp(1)).len(), 8);
    }
}
