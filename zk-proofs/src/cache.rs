//! Fingerprint-keyed proof cache with TTL expiry.
//!
//! Fingerprints are derived from private inputs, so the cache is sensitive: keys are keyed
//! hashes and never leave the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::types::Proof;

struct CachedProof {
    proof: Proof,
    inserted_at: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct ProofCache {
    entries: DashMap<String, CachedProof>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProofCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `fingerprint`, if any. Expired entries are dropped on the way.
    pub fn get(&self, fingerprint: &str) -> Option<Proof> {
        {
            // The read guard must be released before `remove_if` touches the same shard.
            if let Some(entry) = self.entries.get(fingerprint) {
                if entry.inserted_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.proof.clone());
                }
            }
        }
        self.entries
            .remove_if(fingerprint, |_, e| e.inserted_at.elapsed() >= self.ttl);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert `proof` unless a fresh entry already exists; returns whichever proof is cached.
    ///
    /// Concurrent misses on one fingerprint converge on the first stored proof.
    pub fn insert(&self, fingerprint: String, proof: Proof) -> Proof {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().inserted_at.elapsed() < self.ttl {
                    occupied.get().proof.clone()
                } else {
                    occupied.insert(CachedProof { proof: proof.clone(), inserted_at: Instant::now() });
                    proof
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedProof { proof: proof.clone(), inserted_at: Instant::now() });
                proof
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CircuitId, G1Point, G2Point, ProofPoints};
    use std::sync::Arc;

    fn proof(tag: &str) -> Proof {
        let g1 = G1Point { x: "0".into(), y: "0".into() };
        Proof {
            circuit_id: CircuitId::WellnessMilestone,
            proof: ProofPoints {
                a: g1.clone(),
                b: G2Point { x: ["0".into(), "0".into()], y: ["0".into(), "0".into()] },
                c: g1,
            },
            public_signals: vec![tag.to_string()],
            fingerprint: tag.to_string(),
            generated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn hit_returns_stored_proof() {
        let cache = ProofCache::new(Duration::from_secs(60));
        assert!(cache.get("fp").is_none());
        cache.insert("fp".into(), proof("1"));
        assert_eq!(cache.get("fp").unwrap().public_signals, vec!["1"]);
        assert_eq!(cache.stats(), CacheStats { entries: 1, hits: 1, misses: 1 });
    }

    #[test]
    fn first_writer_wins_while_fresh() {
        let cache = ProofCache::new(Duration::from_secs(60));
        cache.insert("fp".into(), proof("first"));
        let kept = cache.insert("fp".into(), proof("second"));
        assert_eq!(kept.public_signals, vec!["first"]);
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let cache = ProofCache::new(Duration::ZERO);
        cache.insert("fp".into(), proof("old"));
        assert!(cache.get("fp").is_none());
        assert_eq!(cache.stats().entries, 0);

        cache.insert("a".into(), proof("a"));
        cache.insert("b".into(), proof("b"));
        assert_eq!(cache.purge_expired(), 2);
    }

    #[test]
    fn concurrent_inserts_for_one_fingerprint_converge() {
        let cache = Arc::new(ProofCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert("fp".into(), proof(&i.to_string())))
            })
            .collect();
        let results: Vec<Proof> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get("fp").unwrap();
        assert!(results.iter().all(|p| p.public_signals == stored.public_signals));
        assert_eq!(cache.stats().entries, 1);
    }
}
