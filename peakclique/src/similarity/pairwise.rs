//! Parallel all-vs-all scoring across runs.
//!
//! Every peak gets its own view of every peak in every other run. Workers
//! receive `&mut` to the peaks they own and a shared, read-only snapshot
//! of all records, so writes are disjoint by construction.

use std::ops::Add;
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::WorkerStrategy;
use crate::data::peak::{Peak, PeakId, PeakRecord};
use crate::data::peak_set::PeakSet;
use crate::error::AlignError;
use crate::similarity::oracle::SimilarityOracle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimilarityStats {
    /// Scores kept in a cache.
    pub scored: usize,
    /// Non-finite scores dropped at the cache boundary.
    pub rejected: usize,
}

impl Add for SimilarityStats {
    type Output = SimilarityStats;

    fn add(self, rhs: Self) -> Self {
        SimilarityStats {
            scored: self.scored + rhs.scored,
            rejected: self.rejected + rhs.rejected,
        }
    }
}

pub struct PairwiseSimilarityStage<'a> {
    oracle: &'a dyn SimilarityOracle,
    strategy: WorkerStrategy,
    num_threads: usize,
}

impl<'a> PairwiseSimilarityStage<'a> {
    pub fn new(oracle: &'a dyn SimilarityOracle, strategy: WorkerStrategy, num_threads: usize) -> Self {
        Self { oracle, strategy, num_threads }
    }

    /// Score every cross-run peak pair into the peaks' caches.
    ///
    /// Returns after all workers have stopped. The first oracle failure
    /// stops the remaining work and is returned as the only error.
    pub fn run(&self, peaks: &mut PeakSet) -> Result<SimilarityStats, AlignError> {
        let records = peaks.record_snapshot();
        let run_ids: Vec<String> = peaks.run_ids().to_vec();
        let pool = ThreadPoolBuilder::new().num_threads(self.num_threads).build()?;
        let oracle = self.oracle;
        let strategy = self.strategy;

        let stats = pool.install(|| match strategy {
            WorkerStrategy::PerRun => peaks
                .runs_mut()
                .par_iter_mut()
                .map(|run| {
                    run.iter_mut().try_fold(SimilarityStats::default(), |acc, peak| {
                        score_peak(peak, &records, &run_ids, oracle).map(|s| acc + s)
                    })
                })
                .try_reduce(SimilarityStats::default, |a, b| Ok(a + b)),
            WorkerStrategy::PerPeak => peaks
                .runs_mut()
                .par_iter_mut()
                .flat_map(|run| run.par_iter_mut())
                .map(|peak| score_peak(peak, &records, &run_ids, oracle))
                .try_reduce(SimilarityStats::default, |a, b| Ok(a + b)),
        })?;

        info!(
            "scored {} peak pairs across {} runs ({} non-finite scores dropped)",
            stats.scored,
            run_ids.len(),
            stats.rejected
        );
        Ok(stats)
    }
}

fn score_peak(
    peak: &mut Peak,
    records: &[Vec<Arc<PeakRecord>>],
    run_ids: &[String],
    oracle: &dyn SimilarityOracle,
) -> Result<SimilarityStats, AlignError> {
    let own_run = peak.id().run;
    let mut stats = SimilarityStats::default();

    for (run, peers) in records.iter().enumerate() {
        if run == own_run {
            continue;
        }
        for (index, peer) in peers.iter().enumerate() {
            let score = oracle.similarity(peak.record(), peer).map_err(|source| AlignError::Worker {
                run_a: run_ids[own_run].clone(),
                run_b: run_ids[run].clone(),
                source,
            })?;
            if peak.add_similarity(PeakId::new(run, index), score) {
                stats.scored += 1;
            } else {
                stats.rejected += 1;
            }
        }
    }
    debug!("scored {} against {} runs", peak.key(), records.len().saturating_sub(1));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimilarityStorage;
    use crate::error::OracleError;
    use crate::similarity::oracle::{CosineSimilarity, FnOracle};

    fn records() -> Vec<PeakRecord> {
        vec![
            PeakRecord::new("a", 0, 10.0, vec![1.0, 0.0, 0.0]),
            PeakRecord::new("a", 1, 20.0, vec![0.0, 1.0, 0.0]),
            PeakRecord::new("b", 0, 10.5, vec![0.9, 0.1, 0.0]),
            PeakRecord::new("b", 1, 19.5, vec![0.1, 0.9, 0.0]),
            PeakRecord::new("c", 0, 20.2, vec![0.0, 1.0, 0.1]),
        ]
    }

    #[test]
    fn test_scores_all_cross_run_pairs() {
        for strategy in [WorkerStrategy::PerRun, WorkerStrategy::PerPeak] {
            let mut set = PeakSet::from_records(records(), SimilarityStorage::Full).unwrap();
            let stats = PairwiseSimilarityStage::new(&CosineSimilarity, strategy, 2)
                .run(&mut set)
                .unwrap();
            // a: 2 * 3, b: 2 * 3, c: 1 * 4
            assert_eq!(stats.scored, 16);
            assert_eq!(stats.rejected, 0);

            let a0 = PeakId::new(0, 0);
            let b0 = PeakId::new(1, 0);
            let b1 = PeakId::new(1, 1);
            let c0 = PeakId::new(2, 0);
            assert_eq!(set.peak(a0).best_hit(1), Some(b0));
            assert_eq!(set.peak(b1).best_hit(2), Some(c0));
            assert!(set.is_bidirectional_best_hit(a0, b0));
            assert_eq!(set.peak(a0).sorted_hits(1), &[b1, b0]);
        }
    }

    #[test]
    fn test_non_finite_scores_are_dropped() {
        let oracle = FnOracle(|a: &PeakRecord, _b: &PeakRecord| if a.run_id == "a" { f64::NAN } else { 1.0 });
        let mut set = PeakSet::from_records(records(), SimilarityStorage::BestOnly).unwrap();
        let stats = PairwiseSimilarityStage::new(&oracle, WorkerStrategy::PerRun, 1)
            .run(&mut set)
            .unwrap();
        assert_eq!(stats.rejected, 6);
        assert_eq!(stats.scored, 10);
        assert!(set.peak(PeakId::new(0, 0)).best_hit(1).is_none());
    }

    struct Failing;

    impl SimilarityOracle for Failing {
        fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
            if a.run_id == "c" || b.run_id == "c" {
                return Err(OracleError::InvalidInput("boom".into()));
            }
            Ok(0.5)
        }
    }

    #[test]
    fn test_worker_failure_is_surfaced() {
        for strategy in [WorkerStrategy::PerRun, WorkerStrategy::PerPeak] {
            let mut set = PeakSet::from_records(records(), SimilarityStorage::BestOnly).unwrap();
            let err = PairwiseSimilarityStage::new(&Failing, strategy, 3)
                .run(&mut set)
                .unwrap_err();
            assert!(matches!(err, AlignError::Worker { .. }));
        }
    }
}
