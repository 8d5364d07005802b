//! End-to-end alignment: scoring, clique merging, filtering and reference selection.

use std::collections::{BTreeMap, HashSet};

use log::info;
use serde::{Deserialize, Serialize};

use crate::clique::clique::{Clique, CliqueId};
use crate::clique::filter::CliqueFilter;
use crate::clique::merger::CliqueMerger;
use crate::clique::reference::{ReferenceChoice, ReferenceSelector};
use crate::config::AlignmentConfig;
use crate::data::peak::{Peak, PeakId, PeakKey, PeakRecord};
use crate::data::peak_set::PeakSet;
use crate::error::AlignError;
use crate::similarity::oracle::SimilarityOracle;
use crate::similarity::pairwise::{PairwiseSimilarityStage, SimilarityStats};

pub struct PeakAligner {
    config: AlignmentConfig,
    oracle: Box<dyn SimilarityOracle>,
}

impl PeakAligner {
    /// Aligner using the configured built-in similarity.
    pub fn new(config: AlignmentConfig) -> Self {
        let oracle = config.similarity.build();
        Self { config, oracle }
    }

    /// Aligner with an injected similarity function; `config.similarity` is ignored.
    pub fn with_oracle(config: AlignmentConfig, oracle: impl SimilarityOracle + 'static) -> Self {
        Self { config, oracle: Box::new(oracle) }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Align the peaks of all runs. Either the full result or one error.
    pub fn align(&self, records: Vec<PeakRecord>) -> Result<AlignmentResult, AlignError> {
        let mut peaks = PeakSet::from_records(records, self.config.storage)?;
        let run_count = peaks.run_count();
        info!("aligning {} peaks from {} runs", peaks.len(), run_count);

        // ---- 1) similarity, parallel; returns after every worker has stopped
        let stats = PairwiseSimilarityStage::new(
            self.oracle.as_ref(),
            self.config.strategy,
            self.config.num_threads,
        )
        .run(&mut peaks)?;

        // ---- 2) cliques, single-threaded
        let merged = CliqueMerger::new(self.config.max_bbh_errors).merge(&peaks)?;
        peaks.clear_similarities();

        // ---- 3) filter + order
        let min_size = self.config.effective_min_clique_size(run_count);
        let filtered = CliqueFilter::new(min_size).apply(merged.cliques, &merged.assignment);

        // ---- 4) reference run
        let reference = ReferenceSelector::new(self.oracle.as_ref()).select(&peaks, &filtered.kept)?;

        let in_cliques: HashSet<PeakId> = filtered.kept.iter().flat_map(|c| c.peaks()).collect();
        let incompatible: Vec<PeakId> = merged
            .incompatible
            .into_iter()
            .filter(|p| !in_cliques.contains(p))
            .collect();
        let reported: HashSet<PeakId> = incompatible.iter().copied().collect();
        let unassigned: Vec<PeakId> = peaks
            .ids()
            .filter(|p| !in_cliques.contains(p) && !reported.contains(p))
            .collect();

        info!(
            "{} cliques, {} incompatible, {} unassigned peaks",
            filtered.kept.len(),
            incompatible.len(),
            unassigned.len()
        );

        Ok(AlignmentResult {
            peaks,
            cliques: filtered.kept,
            incompatible,
            ambiguous: merged.ambiguous,
            unassigned,
            reference,
            stats,
            min_clique_size: min_size,
        })
    }
}

/// Outcome of one alignment.
#[derive(Debug)]
pub struct AlignmentResult {
    peaks: PeakSet,
    cliques: Vec<Clique>,
    incompatible: Vec<PeakId>,
    ambiguous: Vec<PeakId>,
    unassigned: Vec<PeakId>,
    reference: Option<ReferenceChoice>,
    stats: SimilarityStats,
    min_clique_size: usize,
}

impl AlignmentResult {
    pub fn run_ids(&self) -> &[String] {
        self.peaks.run_ids()
    }

    /// Cliques with enough members, ascending by mean rt.
    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    pub fn peak(&self, id: PeakId) -> &Peak {
        self.peaks.peak(id)
    }

    pub fn peaks(&self) -> &PeakSet {
        &self.peaks
    }

    /// Peaks that fell out of a clique during conflict resolution or merging.
    pub fn incompatible(&self) -> &[PeakId] {
        &self.incompatible
    }

    /// Incompatible peaks refused on a conflict neither BBH count nor rt
    /// distance could break.
    pub fn ambiguous(&self) -> &[PeakId] {
        &self.ambiguous
    }

    /// Peaks in no reported clique and not incompatible.
    pub fn unassigned(&self) -> &[PeakId] {
        &self.unassigned
    }

    pub fn reference_run(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.run_id.as_str())
    }

    pub fn compatibility_scores(&self) -> &[f64] {
        self.reference.as_ref().map(|r| r.scores.as_slice()).unwrap_or(&[])
    }

    pub fn similarity_stats(&self) -> SimilarityStats {
        self.stats
    }

    pub fn min_clique_size(&self) -> usize {
        self.min_clique_size
    }

    /// One row per clique, one column per run.
    pub fn alignment_table(&self) -> Vec<Vec<Option<PeakKey>>> {
        self.cliques
            .iter()
            .map(|c| {
                (0..self.peaks.run_count())
                    .map(|run| c.member_of_run(run).map(|p| self.peaks.key(p)))
                    .collect()
            })
            .collect()
    }

    pub fn summary(&self) -> AlignmentSummary {
        let keys = |ids: &[PeakId]| ids.iter().map(|&p| self.peaks.key(p)).collect::<Vec<_>>();
        AlignmentSummary {
            runs: self.peaks.run_ids().to_vec(),
            reference_run: self.reference_run().map(str::to_string),
            compatibility_scores: self.compatibility_scores().to_vec(),
            min_clique_size: self.min_clique_size,
            cliques: self.cliques.iter().map(|c| self.clique_summary(c)).collect(),
            incompatible: keys(&self.incompatible),
            ambiguous: keys(&self.ambiguous),
            unassigned: keys(&self.unassigned),
        }
    }

    fn clique_summary(&self, clique: &Clique) -> CliqueSummary {
        let members = clique
            .members()
            .iter()
            .map(|m| {
                let record = self.peaks.peak(m.peak).record();
                let member = MemberSummary {
                    scan_index: record.scan_index,
                    rt: record.rt,
                    name: record.name.clone(),
                    area_index: record.area_index,
                };
                (record.run_id.clone(), member)
            })
            .collect();
        CliqueSummary {
            id: clique.id(),
            mean_rt: clique.mean_rt(),
            variance_rt: clique.variance_rt(),
            bbh_errors: clique.bbh_errors(),
            centroid: clique.centroid().map(|p| self.peaks.key(p)),
            members,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub scan_index: usize,
    pub rt: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CliqueSummary {
    pub id: CliqueId,
    pub mean_rt: f64,
    pub variance_rt: f64,
    pub bbh_errors: usize,
    pub centroid: Option<PeakKey>,
    pub members: BTreeMap<String, MemberSummary>,
}

/// Serializable view of an [`AlignmentResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub runs: Vec<String>,
    pub reference_run: Option<String>,
    pub compatibility_scores: Vec<f64>,
    pub min_clique_size: usize,
    pub cliques: Vec<CliqueSummary>,
    pub incompatible: Vec<PeakKey>,
    pub ambiguous: Vec<PeakKey>,
    pub unassigned: Vec<PeakKey>,
}
