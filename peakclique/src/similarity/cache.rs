//! Per-peak similarity storage.
//!
//! One slot per run ordinal. During the scoring stage a slot is only ever
//! written by the task owning the peak, so no synchronization is needed
//! beyond `&mut` access. The ascending-by-score view of a slot is built
//! lazily on first read and dropped again on the next insert.

use std::sync::OnceLock;

use ordered_float::OrderedFloat;

use crate::config::SimilarityStorage;
use crate::data::peak::PeakId;

/// A scored peer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub peer: PeakId,
    pub score: f64,
}

#[derive(Debug, Default)]
struct Slot {
    best: Option<Hit>,
    // empty in best-only mode
    hits: Vec<Hit>,
    sorted: OnceLock<Vec<PeakId>>,
}

impl Slot {
    fn sorted(&self) -> &[PeakId] {
        self.sorted.get_or_init(|| {
            if self.hits.is_empty() {
                return self.best.iter().map(|h| h.peer).collect();
            }
            let mut hits = self.hits.clone();
            // stable: equal scores keep insertion order
            hits.sort_by_key(|h| OrderedFloat(h.score));
            hits.into_iter().map(|h| h.peer).collect()
        })
    }
}

#[derive(Debug)]
pub struct SimilarityCache {
    storage: SimilarityStorage,
    slots: Vec<Slot>,
}

impl SimilarityCache {
    pub fn new(storage: SimilarityStorage, run_count: usize) -> Self {
        let mut slots = Vec::with_capacity(run_count);
        slots.resize_with(run_count, Slot::default);
        Self { storage, slots }
    }

    /// Store `score` for `peer`. Returns `false` (and stores nothing) for NaN or ±inf.
    pub fn insert(&mut self, peer: PeakId, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        if peer.run >= self.slots.len() {
            self.slots.resize_with(peer.run + 1, Slot::default);
        }
        let slot = &mut self.slots[peer.run];
        let candidate = Hit { peer, score };

        match slot.best {
            // ties keep the incumbent
            Some(best) if best.score >= score => {}
            _ => slot.best = Some(candidate),
        }
        if self.storage == SimilarityStorage::Full {
            slot.hits.push(candidate);
        }
        slot.sorted = OnceLock::new();
        true
    }

    #[inline]
    pub fn best(&self, run: usize) -> Option<Hit> {
        self.slots.get(run).and_then(|s| s.best)
    }

    pub fn sorted(&self, run: usize) -> &[PeakId] {
        match self.slots.get(run) {
            Some(slot) => slot.sorted(),
            None => &[],
        }
    }

    /// Score recorded for `peer`, if still known.
    ///
    /// In best-only mode only the current best peer of each run is known.
    pub fn score(&self, peer: PeakId) -> Option<f64> {
        let slot = self.slots.get(peer.run)?;
        match self.storage {
            SimilarityStorage::Full => slot.hits.iter().find(|h| h.peer == peer).map(|h| h.score),
            SimilarityStorage::BestOnly => slot.best.filter(|h| h.peer == peer).map(|h| h.score),
        }
    }

    /// Number of stored (peer, score) entries.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .map(|s| match self.storage {
                SimilarityStorage::Full => s.hits.len(),
                SimilarityStorage::BestOnly => s.best.is_some() as usize,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_only_keeps_highest() {
        let mut cache = SimilarityCache::new(SimilarityStorage::BestOnly, 2);
        cache.insert(PeakId::new(1, 0), 0.4);
        cache.insert(PeakId::new(1, 1), 0.8);
        cache.insert(PeakId::new(1, 2), 0.6);
        assert_eq!(cache.best(1).map(|h| h.peer), Some(PeakId::new(1, 1)));
        assert_eq!(cache.sorted(1), &[PeakId::new(1, 1)]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.score(PeakId::new(1, 0)), None);
    }

    #[test]
    fn test_tie_keeps_incumbent() {
        let mut cache = SimilarityCache::new(SimilarityStorage::Full, 2);
        cache.insert(PeakId::new(1, 0), 0.5);
        cache.insert(PeakId::new(1, 1), 0.5);
        assert_eq!(cache.best(1).map(|h| h.peer), Some(PeakId::new(1, 0)));
    }

    #[test]
    fn test_full_sorted_ascending_and_invalidated() {
        let mut cache = SimilarityCache::new(SimilarityStorage::Full, 3);
        cache.insert(PeakId::new(2, 0), 0.9);
        cache.insert(PeakId::new(2, 1), 0.1);
        cache.insert(PeakId::new(2, 2), 0.5);
        assert_eq!(
            cache.sorted(2),
            &[PeakId::new(2, 1), PeakId::new(2, 2), PeakId::new(2, 0)]
        );
        cache.insert(PeakId::new(2, 3), 0.3);
        assert_eq!(
            cache.sorted(2),
            &[PeakId::new(2, 1), PeakId::new(2, 3), PeakId::new(2, 2), PeakId::new(2, 0)]
        );
        assert_eq!(cache.score(PeakId::new(2, 3)), Some(0.3));
        assert_eq!(cache.len(), 4);
        assert!(cache.sorted(1).is_empty());
    }

    #[test]
    fn test_out_of_range_run_grows() {
        let mut cache = SimilarityCache::new(SimilarityStorage::BestOnly, 1);
        assert!(cache.insert(PeakId::new(4, 0), 0.2));
        assert_eq!(cache.best(4).map(|h| h.score), Some(0.2));
        assert!(cache.best(7).is_none());
        assert!(cache.sorted(7).is_empty());
    }
}
