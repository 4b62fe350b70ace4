//! Cache engine (C4), per `SPEC_FULL.md` §4.4.
//!
//! Orchestrates the fingerprinter, the in-memory store, and the journal
//! behind the partial-fill contract: `lookup` returns a snapshot that is
//! invariant under later `store` calls for the same fingerprint, and
//! hit/miss accounting happens once per request, not once per completion.

use crate::domain::{Completion, Fingerprint, Stats};
use crate::fingerprint::fingerprint;
use crate::journal::Journal;
use crate::store::Store;

/// Result of a cache lookup: what's already cached, how many more
/// completions are needed to satisfy the request, and the fingerprint to
/// `store` them under.
pub struct LookupResult {
    pub cached: Vec<Completion>,
    pub needed: u32,
    pub fingerprint: Fingerprint,
}

pub struct CacheEngine {
    store: Store,
    journal: Journal,
}

impl CacheEngine {
    pub fn new(store: Store, journal: Journal) -> Self {
        Self { store, journal }
    }

    /// Fingerprints `req`, reads a snapshot of whatever is cached for it,
    /// and reports how many additional completions (if any) are needed to
    /// satisfy `n`.
    pub fn lookup(&self, req: &crate::domain::NativeRequest) -> LookupResult {
        let (fp, n) = fingerprint(req);
        let snapshot = self.store.list(&fp);

        if snapshot.len() as u32 >= n {
            self.store.record_hit();
            let cached = snapshot.into_iter().take(n as usize).collect();
            LookupResult {
                cached,
                needed: 0,
                fingerprint: fp,
            }
        } else {
            if snapshot.is_empty() {
                self.store.record_miss();
            } else {
                self.store.record_hit();
            }
            let needed = n - snapshot.len() as u32;
            LookupResult {
                cached: snapshot,
                needed,
                fingerprint: fp,
            }
        }
    }

    /// Appends `completions` to the store and enqueues one journal record
    /// per completion. Each call is the indivisible unit the spec's
    /// cancellation note refers to: once this returns, the batch is fully
    /// landed in memory and fully queued for the journal, never half of
    /// either.
    ///
    /// The enqueue happens from inside `Store::append`'s lock, so two
    /// concurrent `store` calls for the same fingerprint (permitted by the
    /// no-single-flight policy in §5) can never land their journal records
    /// in a different order than their in-memory appends.
    pub fn store(&self, fp: Fingerprint, completions: Vec<Completion>) {
        let journal = &self.journal;
        self.store
            .append(fp, completions, |c| journal.append(fp, c.clone()));
    }

    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.store.hits(),
            misses: self.store.misses(),
            num_keys: self.store.keys_count(),
            total_responses: self.store.total_responses(),
            pending_writes: self.journal.pending_writes(),
        }
    }

    pub fn clear(&self) {
        self.store.clear();
        self.journal.clear();
    }

    pub async fn shutdown(&self) {
        self.journal.shutdown().await;
    }
}
