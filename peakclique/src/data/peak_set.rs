use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::SimilarityStorage;
use crate::data::peak::{Peak, PeakId, PeakKey, PeakRecord};
use crate::error::AlignError;

/// All peaks of one alignment, grouped by run.
///
/// Runs are ordered lexicographically by run-id; the position of a run in
/// that order is its ordinal. Peaks keep their input order within a run.
#[derive(Debug)]
pub struct PeakSet {
    run_ids: Vec<String>,
    runs: Vec<Vec<Peak>>,
}

impl PeakSet {
    pub fn from_records(records: Vec<PeakRecord>, storage: SimilarityStorage) -> Result<Self, AlignError> {
        if records.is_empty() {
            return Err(AlignError::EmptyInput);
        }

        let mut grouped: BTreeMap<String, Vec<PeakRecord>> = BTreeMap::new();
        let mut seen: HashSet<(String, usize)> = HashSet::new();
        for record in records {
            if !record.rt.is_finite() {
                return Err(AlignError::InvalidPeak {
                    run_id: record.run_id,
                    scan_index: record.scan_index,
                    reason: format!("non-finite retention time {}", record.rt),
                });
            }
            if !seen.insert((record.run_id.clone(), record.scan_index)) {
                return Err(AlignError::InvalidPeak {
                    run_id: record.run_id,
                    scan_index: record.scan_index,
                    reason: "duplicate (run_id, scan_index)".to_string(),
                });
            }
            grouped.entry(record.run_id.clone()).or_default().push(record);
        }

        let run_count = grouped.len();
        let mut run_ids = Vec::with_capacity(run_count);
        let mut runs = Vec::with_capacity(run_count);
        for (run, (run_id, records)) in grouped.into_iter().enumerate() {
            let peaks = records
                .into_iter()
                .enumerate()
                .map(|(index, r)| Peak::new(PeakId::new(run, index), Arc::new(r), storage, run_count))
                .collect();
            run_ids.push(run_id);
            runs.push(peaks);
        }

        Ok(Self { run_ids, runs })
    }

    #[inline]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn run_ids(&self) -> &[String] {
        &self.run_ids
    }

    pub fn run_id(&self, run: usize) -> &str {
        &self.run_ids[run]
    }

    pub fn run_ordinal(&self, run_id: &str) -> Option<usize> {
        self.run_ids.binary_search_by(|r| r.as_str().cmp(run_id)).ok()
    }

    pub fn run(&self, run: usize) -> &[Peak] {
        &self.runs[run]
    }

    pub(crate) fn runs_mut(&mut self) -> &mut [Vec<Peak>] {
        &mut self.runs
    }

    /// Peak by id. Ids are only minted by this set, so a miss is a logic error.
    #[inline]
    pub fn peak(&self, id: PeakId) -> &Peak {
        &self.runs[id.run][id.index]
    }

    pub fn peak_mut(&mut self, id: PeakId) -> &mut Peak {
        &mut self.runs[id.run][id.index]
    }

    pub fn key(&self, id: PeakId) -> PeakKey {
        self.peak(id).key()
    }

    pub fn len(&self) -> usize {
        self.runs.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All peak ids, by run ordinal then insertion order.
    pub fn ids(&self) -> impl Iterator<Item = PeakId> + '_ {
        self.runs
            .iter()
            .enumerate()
            .flat_map(|(run, peaks)| (0..peaks.len()).map(move |index| PeakId::new(run, index)))
    }

    /// Read-only snapshot of every record, for scoring while caches are mutated.
    pub(crate) fn record_snapshot(&self) -> Vec<Vec<Arc<PeakRecord>>> {
        self.runs
            .iter()
            .map(|peaks| peaks.iter().map(Peak::shared_record).collect())
            .collect()
    }

    /// `a` and `b` are each other's best hit in the other's run.
    pub fn is_bidirectional_best_hit(&self, a: PeakId, b: PeakId) -> bool {
        if a.run == b.run {
            return false;
        }
        self.peak(a).best_hit(b.run) == Some(b) && self.peak(b).best_hit(a.run) == Some(a)
    }

    pub fn clear_similarities(&mut self) {
        for peak in self.runs.iter_mut().flatten() {
            peak.clear_similarities();
        }
    }
}
