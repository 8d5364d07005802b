use thiserror::Error;

/// Failure raised by a [`SimilarityOracle`](crate::similarity::oracle::SimilarityOracle).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("intensity vectors differ in length ({left} vs {right})")]
    DimensionMismatch { left: usize, right: usize },
    #[error("invalid oracle input: {0}")]
    InvalidInput(String),
}

/// Errors that abort an alignment as a whole.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("no peaks supplied")]
    EmptyInput,
    #[error("invalid peak {scan_index} in run '{run_id}': {reason}")]
    InvalidPeak {
        run_id: String,
        scan_index: usize,
        reason: String,
    },
    #[error("best hit between {peak} and {peer} has non-finite score {score}")]
    NonFiniteBestHit {
        peak: String,
        peer: String,
        score: f64,
    },
    #[error("similarity computation failed for runs '{run_a}' / '{run_b}': {source}")]
    Worker {
        run_a: String,
        run_b: String,
        #[source]
        source: OracleError,
    },
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
