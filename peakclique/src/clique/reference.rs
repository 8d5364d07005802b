//! Reference run selection.
//!
//! For every run pair the clique-level similarity of co-occurring members
//! is averaged; a run's compatibility score is the sum of its pair averages.
//! The most compatible run becomes the alignment reference.

use itertools::Itertools;
use log::{info, warn};

use crate::clique::clique::Clique;
use crate::data::peak_set::PeakSet;
use crate::error::AlignError;
use crate::similarity::oracle::SimilarityOracle;

#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceChoice {
    pub run: usize,
    pub run_id: String,
    /// Compatibility score per run ordinal.
    pub scores: Vec<f64>,
}

pub struct ReferenceSelector<'a> {
    oracle: &'a dyn SimilarityOracle,
}

impl<'a> ReferenceSelector<'a> {
    pub fn new(oracle: &'a dyn SimilarityOracle) -> Self {
        Self { oracle }
    }

    /// Pick the reference run; `None` only when there are no runs. Ties go to
    /// the lexicographically first run.
    pub fn select(&self, peaks: &PeakSet, cliques: &[Clique]) -> Result<Option<ReferenceChoice>, AlignError> {
        let n = peaks.run_count();
        if n == 0 {
            return Ok(None);
        }

        let mut sums = vec![vec![0.0f64; n]; n];
        let mut counts = vec![vec![0usize; n]; n];

        for clique in cliques {
            for (x, y) in clique.peaks().tuple_combinations() {
                let (a, b) = if x.run < y.run { (x, y) } else { (y, x) };
                let score = self
                    .oracle
                    .similarity(peaks.peak(a).record(), peaks.peak(b).record())
                    .map_err(|source| AlignError::Worker {
                        run_a: peaks.run_id(a.run).to_string(),
                        run_b: peaks.run_id(b.run).to_string(),
                        source,
                    })?;
                if !score.is_finite() {
                    warn!("skipping non-finite clique similarity between {:?} and {:?}", a, b);
                    continue;
                }
                sums[a.run][b.run] += score;
                counts[a.run][b.run] += 1;
            }
        }

        let mut scores = vec![0.0f64; n];
        for (i, j) in (0..n).tuple_combinations() {
            if counts[i][j] == 0 {
                continue;
            }
            let avg = sums[i][j] / counts[i][j] as f64;
            scores[i] += avg;
            scores[j] += avg;
        }

        let mut run = 0;
        for (i, &s) in scores.iter().enumerate() {
            if s > scores[run] {
                run = i;
            }
        }
        let run_id = peaks.run_id(run).to_string();
        info!("selected '{}' as reference run (compatibility {:.4})", run_id, scores[run]);
        Ok(Some(ReferenceChoice { run, run_id, scores }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clique::merger::CliqueMerger;
    use crate::config::SimilarityStorage;
    use crate::data::peak::{PeakId, PeakRecord};
    use crate::similarity::oracle::FnOracle;

    #[test]
    fn test_most_compatible_run_wins() {
        // b sits between a and c in rt, so it is closest to both
        let records = vec![
            PeakRecord::new("a", 0, 10.0, vec![]),
            PeakRecord::new("b", 0, 11.0, vec![]),
            PeakRecord::new("c", 0, 12.0, vec![]),
        ];
        let oracle = FnOracle(|a: &PeakRecord, b: &PeakRecord| 1.0 / (1.0 + (a.rt - b.rt).abs()));
        let mut set = PeakSet::from_records(records, SimilarityStorage::BestOnly).unwrap();
        let ids: Vec<PeakId> = set.ids().collect();
        for &x in &ids {
            for &y in &ids {
                if x.run != y.run {
                    let s = oracle.similarity(set.peak(x).record(), set.peak(y).record()).unwrap();
                    set.peak_mut(x).add_similarity(y, s);
                }
            }
        }
        let merged = CliqueMerger::new(0).merge(&set).unwrap();
        let cliques: Vec<Clique> = merged.cliques.into_iter().filter(|c| !c.is_empty()).collect();
        assert_eq!(cliques.len(), 1);

        let choice = ReferenceSelector::new(&oracle).select(&set, &cliques).unwrap().unwrap();
        assert_eq!(choice.run_id, "b");
        assert_eq!(choice.run, 1);
        // a: 0.5 + 1/3, b: 0.5 + 0.5, c: 1/3 + 0.5
        assert!((choice.scores[1] - 1.0).abs() < 1e-12);
        assert!((choice.scores[0] - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_no_cliques_picks_first_run() {
        let records = vec![PeakRecord::new("x", 0, 1.0, vec![]), PeakRecord::new("w", 0, 1.0, vec![])];
        let set = PeakSet::from_records(records, SimilarityStorage::BestOnly).unwrap();
        let oracle = FnOracle(|_: &PeakRecord, _: &PeakRecord| 1.0);
        let choice = ReferenceSelector::new(&oracle).select(&set, &[]).unwrap().unwrap();
        assert_eq!(choice.run_id, "w");
        assert_eq!(choice.scores, vec![0.0, 0.0]);
    }
}
