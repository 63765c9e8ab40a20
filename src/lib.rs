// lib.rs - rectriplet library root

//! # rectriplet - Triplet-based recombination detection for aligned DNA sequences
//!
//! Every ordered (parent, parent, child) triplet of an alignment is turned
//! into a random walk over the sites where the two parents disagree. A walk
//! whose maximum descent is improbably large under clonal evolution marks
//! the child as a candidate recombinant of its parents.
//!
//! ## Features
//!
//! - **Exact tail probabilities**: a precomputed P(m, n, k) table, with a
//!   Hogan-Siegmund approximation beyond its bounds
//! - **Parallel scan**: child chunks processed on a rayon pool with a live
//!   progress monitor
//! - **Multiple-comparison correction**: Dunn-Sidak and Bonferroni
//! - **Breakpoints**: localization of the recombinant segment and
//!   classification of long recombinants
//! - **Collection dates**: optional filtering of parents sampled after the child
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use rectriplet::prelude::*;
//!
//! let table = PValueTable::generate(TableSize::cubic(200), false)?;
//! let parents = read_sequences("alignment.fasta".as_ref(), &ReadOptions::default())?;
//! let alignment = Alignment::new(parents, None, false)?;
//!
//! let counts = alignment.triplet_counts();
//! let correction = Correction::new(counts.all as f64);
//! let scan = RecombinationScan::new(&table, DetectionSettings::default(), correction);
//! let outcome = scan.run(&alignment.active_parents(), &alignment.active_children())?;
//! println!("{} recombinant triplets", outcome.counts.recombinant_triplets);
//! # Ok::<(), RecError>(())
//! ```

// Re-export all main modules
pub mod cli;
pub mod core;
pub mod data;
pub mod error;
pub mod output;
pub mod pipeline;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::cli::{validate_args, Args, Config, RunPlan};
    pub use crate::core::{BreakpointMode, DetectionOutcome, DetectionSettings, RecombinationScan, StorageMode};
    pub use crate::core::{Correction, PValueHistogram, PValueTable, TableSize, Triplet, TripletPool};
    pub use crate::data::{read_sequences, Alignment, ReadOptions, RecombinantType, Sequence, SequencePool};
    pub use crate::error::RecError;
    pub use crate::pipeline::{DetectionRun, RunReport};
}

// Re-export main types at the root level for convenience
pub use cli::{Args, RunPlan};
pub use core::{Correction, PValueTable, RecombinationScan, TableSize};
pub use data::{Alignment, Sequence};
pub use error::RecError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn get_info() -> String {
    format!(
        "rectriplet v{} - Triplet-based recombination detection",
        VERSION
    )
}
