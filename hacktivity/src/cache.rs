use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::debug;

/// Bounded, time-expiring set of report ids that have already been delivered.
///
/// Entries expire `ttl` after their most recent [`remember`](Self::remember).
/// When full, the least recently inserted entry is evicted. The cache is not
/// synchronized; it is owned by the single task that drives poll cycles.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Slot>,
    // Insertion sequence -> id, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    seq: u64,
    inserted_at: Instant,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        if capacity == 0 {
            bail!("dedup cache capacity must be at least 1");
        }
        Ok(Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_seq: 0,
        })
    }

    pub fn seen(&mut self, id: &str) -> bool {
        self.seen_at(id, Instant::now())
    }

    pub fn seen_at(&mut self, id: &str, now: Instant) -> bool {
        let Some(slot) = self.entries.get(id).copied() else {
            return false;
        };
        if self.is_live(slot, now) {
            return true;
        }
        self.entries.remove(id);
        self.order.remove(&slot.seq);
        false
    }

    /// Record `id` as delivered. Remembering an id that is already present
    /// refreshes its expiry and makes it the newest entry.
    pub fn remember(&mut self, id: &str) {
        self.remember_at(id, Instant::now());
    }

    pub fn remember_at(&mut self, id: &str, now: Instant) {
        self.purge_expired(now);

        if let Some(previous) = self.entries.remove(id) {
            self.order.remove(&previous.seq);
        } else {
            while self.entries.len() >= self.capacity {
                let Some((_, evicted)) = self.order.pop_first() else {
                    break;
                };
                debug!(id = %evicted, capacity = self.capacity, "dedup cache full, evicting oldest entry");
                self.entries.remove(&evicted);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id.to_string(),
            Slot {
                seq,
                inserted_at: now,
            },
        );
        self.order.insert(seq, id.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, slot: Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.inserted_at) < self.ttl
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some((&seq, id)) = self.order.first_key_value() {
            let Some(slot) = self.entries.get(id).copied() else {
                self.order.remove(&seq);
                continue;
            };
            if self.is_live(slot, now) {
                break;
            }
            let id = id.clone();
            self.order.remove(&seq);
            self.entries.remove(&id);
        }
    }
}
