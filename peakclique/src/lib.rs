// peakclique/src/lib.rs
pub mod error;
pub mod config;
pub mod align;

pub mod data {
    pub mod peak;
    pub mod peak_set;
}

pub mod similarity {
    pub mod cache;
    pub mod oracle;
    pub mod pairwise;
}

pub mod clique;

// Re-export commonly used types
pub use align::{AlignmentResult, AlignmentSummary, PeakAligner};
pub use config::{AlignmentConfig, SimilarityKind, SimilarityStorage, WorkerStrategy};
pub use data::peak::{PeakId, PeakKey, PeakRecord};
pub use error::{AlignError, OracleError};
