use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::SimilarityStorage;
use crate::similarity::cache::{Hit, SimilarityCache};

/// A detected feature as delivered by the peak-picking stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub run_id: String,
    pub scan_index: usize,
    /// Acquisition time in seconds.
    pub rt: f64,
    #[serde(default)]
    pub intensities: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index into the peak-picking result, used for area lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_index: Option<usize>,
}

impl PeakRecord {
    pub fn new(run_id: impl Into<String>, scan_index: usize, rt: f64, intensities: Vec<f64>) -> Self {
        Self {
            run_id: run_id.into(),
            scan_index,
            rt,
            intensities,
            name: None,
            area_index: None,
        }
    }

    pub fn key(&self) -> PeakKey {
        PeakKey {
            run_id: self.run_id.clone(),
            scan_index: self.scan_index,
        }
    }
}

/// Identity of a peak within one alignment: run ordinal and insertion index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeakId {
    pub run: usize,
    pub index: usize,
}

impl PeakId {
    #[inline]
    pub fn new(run: usize, index: usize) -> Self {
        Self { run, index }
    }
}

/// External identity of a peak, `(run_id, scan_index)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeakKey {
    pub run_id: String,
    pub scan_index: usize,
}

impl Display for PeakKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.run_id, self.scan_index)
    }
}

/// A peak taking part in an alignment. Owns its similarity cache.
#[derive(Debug)]
pub struct Peak {
    id: PeakId,
    record: Arc<PeakRecord>,
    similarities: SimilarityCache,
}

impl Peak {
    pub fn new(id: PeakId, record: Arc<PeakRecord>, storage: SimilarityStorage, run_count: usize) -> Self {
        Self {
            id,
            record,
            similarities: SimilarityCache::new(storage, run_count),
        }
    }

    #[inline]
    pub fn id(&self) -> PeakId {
        self.id
    }

    #[inline]
    pub fn record(&self) -> &PeakRecord {
        &self.record
    }

    pub(crate) fn shared_record(&self) -> Arc<PeakRecord> {
        Arc::clone(&self.record)
    }

    #[inline]
    pub fn rt(&self) -> f64 {
        self.record.rt
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn key(&self) -> PeakKey {
        self.record.key()
    }

    /// Record the similarity of this peak to `peer`.
    ///
    /// Non-finite scores are logged and dropped; returns whether the score was kept.
    pub fn add_similarity(&mut self, peer: PeakId, score: f64) -> bool {
        if self.id.run == peer.run {
            return false;
        }
        let kept = self.similarities.insert(peer, score);
        if !kept {
            warn!(
                "dropping non-finite similarity {} from {} to peer {:?}",
                score,
                self.record.key(),
                peer
            );
        }
        kept
    }

    /// Highest-scoring peer recorded for `run`.
    #[inline]
    pub fn best_hit(&self, run: usize) -> Option<PeakId> {
        self.similarities.best(run).map(|h| h.peer)
    }

    #[inline]
    pub fn best_hit_entry(&self, run: usize) -> Option<Hit> {
        self.similarities.best(run)
    }

    /// Peers in `run`, ascending by score.
    pub fn sorted_hits(&self, run: usize) -> &[PeakId] {
        self.similarities.sorted(run)
    }

    pub fn similarity_to(&self, peer: PeakId) -> Option<f64> {
        self.similarities.score(peer)
    }

    pub fn clear_similarities(&mut self) {
        self.similarities.clear();
    }

    pub fn similarities(&self) -> &SimilarityCache {
        &self.similarities
    }
}
