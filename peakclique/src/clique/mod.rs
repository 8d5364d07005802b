pub mod clique;
pub mod merger;
pub mod filter;
pub mod reference;

// Re-export commonly used types
pub use clique::{AddOutcome, Clique, CliqueId, CliqueMember};
pub use merger::{Assignments, CliqueMerger};
