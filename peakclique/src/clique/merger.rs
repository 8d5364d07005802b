//! Bidirectional-best-hit driven clique construction.
//!
//! One deterministic, single-threaded pass over the similarity caches:
//! run pairs in lexicographic run-id order, peaks in insertion order.
//! Every BBH pair either opens a clique, extends one, or merges two.

use std::collections::HashMap;

use itertools::Itertools;
use log::{debug, info};

use crate::clique::clique::{AddOutcome, Clique, CliqueId};
use crate::data::peak::PeakId;
use crate::data::peak_set::PeakSet;
use crate::error::AlignError;

/// Peak to clique assignment. Owned by a single merge pass.
#[derive(Clone, Debug, Default)]
pub struct Assignments {
    by_peak: HashMap<PeakId, CliqueId>,
}

impl Assignments {
    #[inline]
    pub fn get(&self, peak: PeakId) -> Option<CliqueId> {
        self.by_peak.get(&peak).copied()
    }

    fn assign(&mut self, peak: PeakId, clique: CliqueId) {
        self.by_peak.insert(peak, clique);
    }

    fn unassign(&mut self, peak: PeakId) {
        self.by_peak.remove(&peak);
    }

    pub fn len(&self) -> usize {
        self.by_peak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peak.is_empty()
    }

    /// Distinct cliques still referenced, ascending by id.
    pub fn clique_ids(&self) -> Vec<CliqueId> {
        self.by_peak.values().copied().sorted_unstable().dedup().collect()
    }
}

#[derive(Debug)]
pub struct MergeResult {
    /// Every clique ever opened, indexed by id. Absorbed ones are empty.
    pub cliques: Vec<Clique>,
    pub assignment: Assignments,
    /// Peaks that dropped out of a clique and never found a new one.
    pub incompatible: Vec<PeakId>,
    /// Peaks refused on an unbreakable conflict tie that never found a new
    /// clique, in encounter order. A subset of `incompatible`.
    pub ambiguous: Vec<PeakId>,
}

#[derive(Debug, Default)]
struct MergeState {
    cliques: Vec<Clique>,
    assignment: Assignments,
    displaced: Vec<PeakId>,
    ambiguous: Vec<PeakId>,
}

impl MergeState {
    fn open_clique(&mut self, max_bbh_errors: usize) -> CliqueId {
        let id = self.cliques.len();
        self.cliques.push(Clique::new(id, max_bbh_errors));
        id
    }

    fn pair_mut(&mut self, a: CliqueId, b: CliqueId) -> (&mut Clique, &mut Clique) {
        debug_assert_ne!(a, b);
        if a < b {
            let (lo, hi) = self.cliques.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.cliques.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    /// Record the effect of offering `peak` to clique `c`.
    fn apply(&mut self, c: CliqueId, peak: PeakId, outcome: AddOutcome) {
        match outcome {
            AddOutcome::Added | AddOutcome::AlreadyMember => self.assignment.assign(peak, c),
            AddOutcome::Replaced { evicted } => {
                self.assignment.assign(peak, c);
                self.assignment.unassign(evicted);
                self.displaced.push(evicted);
            }
            AddOutcome::Rejected => {}
            AddOutcome::Ambiguous { .. } => self.ambiguous.push(peak),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CliqueMerger {
    max_bbh_errors: usize,
}

impl CliqueMerger {
    pub fn new(max_bbh_errors: usize) -> Self {
        Self { max_bbh_errors }
    }

    pub fn merge(&self, peaks: &PeakSet) -> Result<MergeResult, AlignError> {
        let mut state = MergeState::default();
        let mut bbh_pairs = 0usize;

        for (run_a, run_b) in (0..peaks.run_count()).tuple_combinations() {
            for p in peaks.run(run_a) {
                let Some(hit) = p.best_hit_entry(run_b) else {
                    continue;
                };
                if hit.score.is_infinite() {
                    return Err(AlignError::NonFiniteBestHit {
                        peak: p.key().to_string(),
                        peer: peaks.key(hit.peer).to_string(),
                        score: hit.score,
                    });
                }
                if !peaks.is_bidirectional_best_hit(hit.peer, p.id()) {
                    continue;
                }
                bbh_pairs += 1;
                self.link(&mut state, peaks, p.id(), hit.peer);
            }
        }

        let MergeState { cliques, assignment, displaced, ambiguous } = state;
        let incompatible: Vec<PeakId> = displaced
            .iter()
            .chain(ambiguous.iter())
            .copied()
            .unique()
            .filter(|p| assignment.get(*p).is_none())
            .collect();
        let ambiguous: Vec<PeakId> = ambiguous
            .into_iter()
            .unique()
            .filter(|p| assignment.get(*p).is_none())
            .collect();

        info!(
            "{} bidirectional best hits formed {} cliques ({} peaks assigned, {} incompatible, {} ambiguous)",
            bbh_pairs,
            cliques.iter().filter(|c| !c.is_empty()).count(),
            assignment.len(),
            incompatible.len(),
            ambiguous.len()
        );
        Ok(MergeResult { cliques, assignment, incompatible, ambiguous })
    }

    fn link(&self, state: &mut MergeState, peaks: &PeakSet, p: PeakId, q: PeakId) {
        match (state.assignment.get(p), state.assignment.get(q)) {
            (None, None) => {
                let c = state.open_clique(self.max_bbh_errors);
                for peak in [p, q] {
                    let outcome = state.cliques[c].add(peak, peaks);
                    state.apply(c, peak, outcome);
                }
                debug!("opened clique {} for {:?} / {:?}", c, p, q);
            }
            (Some(c), None) => {
                let outcome = state.cliques[c].add(q, peaks);
                state.apply(c, q, outcome);
            }
            (None, Some(d)) => {
                let outcome = state.cliques[d].add(p, peaks);
                state.apply(d, p, outcome);
            }
            (Some(c), Some(d)) if c == d => {
                let outcome = state.cliques[c].add(p, peaks);
                state.apply(c, p, outcome);
            }
            (Some(c), Some(d)) => self.merge_cliques(state, peaks, c, d),
        }
    }

    /// The smaller clique is absorbed into the larger; on equal size `c` survives.
    fn merge_cliques(&self, state: &mut MergeState, peaks: &PeakSet, c: CliqueId, d: CliqueId) {
        let (survivor, absorbed) = if state.cliques[c].len() >= state.cliques[d].len() {
            (c, d)
        } else {
            (d, c)
        };
        let outcome = {
            let (into, from) = state.pair_mut(survivor, absorbed);
            into.absorb(from, peaks)
        };

        for &peak in &outcome.moved {
            state.assignment.assign(peak, survivor);
        }
        for &peak in &outcome.incompatible {
            state.assignment.unassign(peak);
            state.displaced.push(peak);
        }
        state.ambiguous.extend_from_slice(&outcome.ambiguous);
        debug!(
            "merged clique {} into {}: {} moved, {} incompatible",
            absorbed,
            survivor,
            outcome.moved.len(),
            outcome.incompatible.len()
        );
    }
}
