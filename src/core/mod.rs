// mod.rs - Core logic module

pub mod detector;
pub mod histogram;
pub mod pool;
pub mod ptable;
pub mod stats;
pub mod triplet;

// Re-export main types for convenience
pub use detector::{
    BreakpointMode, DetectionOutcome, DetectionSettings, RecombinationScan, ScanCounts, SkippedTripletSink,
};
pub use histogram::PValueHistogram;
pub use pool::{StorageMode, TripletPool};
pub use ptable::{PTableLoadError, PValueTable, TableSize};
pub use stats::{
    bonferroni, dunn_sidak, dunn_sidak_with_cutoff, siegmund_discrete_approx, single_breakpoint_p_value, Correction,
    DUNN_SIDAK_MIN_P,
};
pub use triplet::{BreakPoint, BreakPointPair, PValue, RandomWalk, Triplet};
