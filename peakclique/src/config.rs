//! Alignment configuration.
//!
//! All knobs the clique engine consumes. Every field has a default so a
//! partial JSON document (or none at all) yields a usable configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use clap::ValueEnum;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::AlignError;
use crate::similarity::oracle::{CosineSimilarity, DotSimilarity, SimilarityOracle, TimePenalizedSimilarity};

/// How much similarity data each peak keeps per peer run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityStorage {
    /// Only the current best peer and its score.
    #[default]
    BestOnly,
    /// Every scored peer.
    Full,
}

/// Granularity of the parallel scoring tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStrategy {
    /// One task per source run; it owns every ordered pair `(run, *)`.
    #[default]
    PerRun,
    /// One task per source peak.
    PerPeak,
}

/// Built-in similarity functions, selected at configuration time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SimilarityKind {
    #[default]
    Cosine,
    Dot,
    TimePenalizedCosine {
        /// Gaussian width on |Δrt|, seconds.
        rt_tolerance: f64,
        /// Scores are zeroed once the rt penalty drops below this value.
        #[serde(default)]
        rt_threshold: f64,
    },
}

impl SimilarityKind {
    pub fn build(&self) -> Box<dyn SimilarityOracle> {
        match *self {
            SimilarityKind::Cosine => Box::new(CosineSimilarity),
            SimilarityKind::Dot => Box::new(DotSimilarity),
            SimilarityKind::TimePenalizedCosine { rt_tolerance, rt_threshold } => {
                Box::new(TimePenalizedSimilarity::new(CosineSimilarity, rt_tolerance, rt_threshold))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Minimum members per reported clique; `None` requires every run.
    pub min_clique_size: Option<usize>,
    /// Tolerated number of non-BBH member pairs per clique.
    pub max_bbh_errors: usize,
    pub storage: SimilarityStorage,
    pub strategy: WorkerStrategy,
    /// Worker threads for the scoring stage (0 = rayon default).
    pub num_threads: usize,
    pub similarity: SimilarityKind,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_clique_size: None,
            max_bbh_errors: 0,
            storage: SimilarityStorage::BestOnly,
            strategy: WorkerStrategy::PerRun,
            num_threads: 0,
            similarity: SimilarityKind::Cosine,
        }
    }
}

impl AlignmentConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AlignError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Resolve the effective minimum clique size for `run_count` runs.
    ///
    /// A request above the run count is clamped with a warning.
    pub fn effective_min_clique_size(&self, run_count: usize) -> usize {
        match self.min_clique_size {
            None => run_count,
            Some(requested) if requested > run_count => {
                warn!(
                    "min_clique_size {} exceeds the number of runs ({}), clamping",
                    requested, run_count
                );
                run_count
            }
            Some(requested) => requested,
        }
    }
}
