//! Clique size filtering and output ordering.

use std::collections::HashSet;

use log::info;
use ordered_float::OrderedFloat;

use crate::clique::clique::{Clique, CliqueId};
use crate::clique::merger::Assignments;

/// Keeps cliques with at least `min_size` members, ordered by mean retention time.
#[derive(Clone, Debug)]
pub struct CliqueFilter {
    min_size: usize,
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Surviving cliques, ascending by mean rt.
    pub kept: Vec<Clique>,
    /// Reachable cliques below the size threshold.
    pub dropped: Vec<Clique>,
}

impl CliqueFilter {
    /// `min_size` is expected to be clamped to the run count already.
    pub fn new(min_size: usize) -> Self {
        Self { min_size: min_size.max(1) }
    }

    #[inline]
    pub fn passes(&self, clique: &Clique) -> bool {
        clique.len() >= self.min_size
    }

    /// Collect the distinct cliques referenced by `assignment`, drop small
    /// ones and sort the rest by mean rt (ties keep clique id order).
    pub fn apply(&self, cliques: Vec<Clique>, assignment: &Assignments) -> FilterOutcome {
        let reachable: HashSet<CliqueId> = assignment.clique_ids().into_iter().collect();
        let mut outcome = FilterOutcome::default();

        for clique in cliques {
            if clique.is_empty() || !reachable.contains(&clique.id()) {
                continue;
            }
            if self.passes(&clique) {
                outcome.kept.push(clique);
            } else {
                outcome.dropped.push(clique);
            }
        }
        outcome.kept.sort_by_key(|c| OrderedFloat(c.mean_rt()));

        info!(
            "{} of {} cliques have at least {} members",
            outcome.kept.len(),
            outcome.kept.len() + outcome.dropped.len(),
            self.min_size
        );
        outcome
    }
}
