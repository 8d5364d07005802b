// peakclique/src/clique/clique.rs

use log::{debug, warn};

use crate::data::peak::PeakId;
use crate::data::peak_set::PeakSet;

pub type CliqueId = usize;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CliqueMember {
    pub peak: PeakId,
    pub rt: f64,
}

/// Result of offering a peak to a clique.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The very same peak is already a member; nothing changed.
    AlreadyMember,
    Added,
    /// The peak won a same-run conflict and displaced `evicted`.
    Replaced { evicted: PeakId },
    /// Refused: BBH-error budget exceeded or the incumbent won the conflict.
    Rejected,
    /// Same-run conflict that neither BBH count nor rt distance could break.
    Ambiguous { incumbent: PeakId },
}

impl AddOutcome {
    /// Whether the peak is a member after the call.
    #[inline]
    pub fn is_member(&self) -> bool {
        matches!(self, AddOutcome::AlreadyMember | AddOutcome::Added | AddOutcome::Replaced { .. })
    }
}

/// Bookkeeping of one clique absorbing another.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Absorbed peaks that are now members of the surviving clique.
    pub moved: Vec<PeakId>,
    /// Peaks of either input that ended up in neither.
    pub incompatible: Vec<PeakId>,
    /// Subset of `incompatible` refused on an unbreakable tie.
    pub ambiguous: Vec<PeakId>,
}

/// A set of peaks, at most one per run, believed to be the same feature.
///
/// Mean and variance of the member retention times are maintained
/// incrementally. `bbh_errors` counts member pairs that are not mutual
/// best hits and never exceeds `max_bbh_errors`.
#[derive(Clone, Debug)]
pub struct Clique {
    id: CliqueId,
    // insertion order, at most one member per run
    members: Vec<CliqueMember>,
    mean_rt: f64,
    variance_rt: f64,
    centroid: Option<PeakId>,
    bbh_errors: usize,
    max_bbh_errors: usize,
}

impl Clique {
    pub fn new(id: CliqueId, max_bbh_errors: usize) -> Self {
        Self {
            id,
            members: Vec::new(),
            mean_rt: 0.0,
            variance_rt: 0.0,
            centroid: None,
            bbh_errors: 0,
            max_bbh_errors,
        }
    }

    #[inline]
    pub fn id(&self) -> CliqueId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[CliqueMember] {
        &self.members
    }

    pub fn peaks(&self) -> impl Iterator<Item = PeakId> + Clone + '_ {
        self.members.iter().map(|m| m.peak)
    }

    pub fn member_of_run(&self, run: usize) -> Option<PeakId> {
        self.members.iter().find(|m| m.peak.run == run).map(|m| m.peak)
    }

    pub fn contains(&self, peak: PeakId) -> bool {
        self.member_of_run(peak.run) == Some(peak)
    }

    pub fn mean_rt(&self) -> f64 {
        self.mean_rt
    }

    pub fn variance_rt(&self) -> f64 {
        self.variance_rt
    }

    pub fn centroid(&self) -> Option<PeakId> {
        self.centroid
    }

    pub fn bbh_errors(&self) -> usize {
        self.bbh_errors
    }

    #[inline]
    fn position_of_run(&self, run: usize) -> Option<usize> {
        self.members.iter().position(|m| m.peak.run == run)
    }

    /// Offer `peak` to this clique.
    pub fn add(&mut self, peak: PeakId, peaks: &PeakSet) -> AddOutcome {
        let rt = peaks.peak(peak).rt();
        match self.position_of_run(peak.run) {
            Some(pos) if self.members[pos].peak == peak => AddOutcome::AlreadyMember,
            Some(pos) => {
                let incumbent = self.members[pos];
                self.resolve_conflict(peak, rt, incumbent, peaks)
            }
            None => self.try_insert(peak, rt, peaks),
        }
    }

    /// Insert a peak from a run not yet represented, if the BBH-error budget allows.
    fn try_insert(&mut self, peak: PeakId, rt: f64, peaks: &PeakSet) -> AddOutcome {
        let actual_bbh = self.bbh_count(peak, None, peaks);
        let shortfall = self.members.len() - actual_bbh;
        if self.bbh_errors + shortfall > self.max_bbh_errors {
            debug!(
                "clique {}: rejecting {:?}, {} + {} BBH errors exceed {}",
                self.id, peak, self.bbh_errors, shortfall, self.max_bbh_errors
            );
            return AddOutcome::Rejected;
        }

        self.members.push(CliqueMember { peak, rt });
        self.bbh_errors += shortfall;
        self.push_rt(rt);
        self.select_centroid();
        AddOutcome::Added
    }

    fn resolve_conflict(
        &mut self,
        challenger: PeakId,
        rt: f64,
        incumbent: CliqueMember,
        peaks: &PeakSet,
    ) -> AddOutcome {
        let challenger_bbh = self.bbh_count(challenger, Some(incumbent.peak), peaks);
        let incumbent_bbh = self.bbh_count(incumbent.peak, Some(incumbent.peak), peaks);

        let challenger_wins = if challenger_bbh != incumbent_bbh {
            challenger_bbh > incumbent_bbh
        } else {
            let d_challenger = (rt - self.mean_rt).abs();
            let d_incumbent = (incumbent.rt - self.mean_rt).abs();
            if d_challenger == d_incumbent {
                warn!(
                    "clique {}: unresolvable conflict between {:?} and incumbent {:?} (bbh {}, rt distance {})",
                    self.id, challenger, incumbent.peak, challenger_bbh, d_challenger
                );
                return AddOutcome::Ambiguous { incumbent: incumbent.peak };
            }
            d_challenger < d_incumbent
        };

        if !challenger_wins {
            return AddOutcome::Rejected;
        }

        let snapshot = self.clone();
        self.remove(incumbent.peak, peaks);
        match self.try_insert(challenger, rt, peaks) {
            AddOutcome::Added => {
                debug!("clique {}: {:?} replaced {:?}", self.id, challenger, incumbent.peak);
                AddOutcome::Replaced { evicted: incumbent.peak }
            }
            _ => {
                *self = snapshot;
                AddOutcome::Rejected
            }
        }
    }

    /// Members (other than `exclude`) that form a BBH with `peak`.
    fn bbh_count(&self, peak: PeakId, exclude: Option<PeakId>, peaks: &PeakSet) -> usize {
        self.members
            .iter()
            .filter(|m| Some(m.peak) != exclude && m.peak != peak)
            .filter(|m| peaks.is_bidirectional_best_hit(peak, m.peak))
            .count()
    }

    /// Remove `peak` if it is the member of its run. Returns whether anything changed.
    pub fn remove(&mut self, peak: PeakId, peaks: &PeakSet) -> bool {
        let pos = match self.position_of_run(peak.run) {
            Some(pos) if self.members[pos].peak == peak => pos,
            _ => return false,
        };
        let removed = self.members.remove(pos);
        if self.members.is_empty() {
            self.reset();
            return true;
        }

        let contribution = self
            .members
            .iter()
            .filter(|m| !peaks.is_bidirectional_best_hit(peak, m.peak))
            .count();
        self.bbh_errors = self.bbh_errors.saturating_sub(contribution);
        self.pop_rt(removed.rt);
        self.select_centroid();
        true
    }

    /// Move the members of `other` into `self` and clear `other`.
    ///
    /// Members that cannot be added, and members of `self` evicted on the
    /// way, are returned as incompatible. A no-op if either side is empty.
    pub fn absorb(&mut self, other: &mut Clique, peaks: &PeakSet) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if self.is_empty() || other.is_empty() {
            return outcome;
        }

        let incoming = std::mem::take(&mut other.members);
        other.reset();

        for member in incoming {
            match self.add(member.peak, peaks) {
                AddOutcome::Added | AddOutcome::AlreadyMember => outcome.moved.push(member.peak),
                AddOutcome::Replaced { evicted } => {
                    outcome.moved.push(member.peak);
                    outcome.incompatible.push(evicted);
                }
                AddOutcome::Rejected => outcome.incompatible.push(member.peak),
                AddOutcome::Ambiguous { .. } => {
                    outcome.incompatible.push(member.peak);
                    outcome.ambiguous.push(member.peak);
                }
            }
        }
        debug!(
            "clique {} absorbed clique {}: {} moved, {} incompatible",
            self.id,
            other.id,
            outcome.moved.len(),
            outcome.incompatible.len()
        );
        outcome
    }

    // mean' = mean + (rt - mean) / n
    // var'  = (var + (rt - mean') * (rt - mean)) / max(n - 2, 1), only for n > 2
    fn push_rt(&mut self, rt: f64) {
        let n = self.members.len();
        let old_mean = self.mean_rt;
        self.mean_rt = old_mean + (rt - old_mean) / n as f64;
        if n > 2 {
            let denom = (n - 2).max(1) as f64;
            self.variance_rt = (self.variance_rt + (rt - self.mean_rt) * (rt - old_mean)) / denom;
        }
    }

    // exact inverse of push_rt, n = size after removal
    fn pop_rt(&mut self, rt: f64) {
        let n = self.members.len();
        if n == 1 {
            self.mean_rt = self.members[0].rt;
            self.variance_rt = 0.0;
            return;
        }
        let old_mean = self.mean_rt;
        self.mean_rt = old_mean - (rt - old_mean) / n as f64;
        let factor = (n - 1).max(1) as f64;
        self.variance_rt = (self.variance_rt * factor - (rt - old_mean) * (rt - self.mean_rt)).max(0.0);
    }

    /// Member with the smallest summed squared rt distance to all others; first wins ties.
    fn select_centroid(&mut self) {
        let mut best: Option<(PeakId, f64)> = None;
        for m in &self.members {
            let cost: f64 = self.members.iter().map(|o| (m.rt - o.rt).powi(2)).sum();
            match best {
                Some((_, c)) if c <= cost => {}
                _ => best = Some((m.peak, cost)),
            }
        }
        self.centroid = best.map(|(p, _)| p);
    }

    fn reset(&mut self) {
        self.members.clear();
        self.mean_rt = 0.0;
        self.variance_rt = 0.0;
        self.centroid = None;
        self.bbh_errors = 0;
    }
}
