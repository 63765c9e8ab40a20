// mod.rs - Sequences, alignments and FASTA input

pub mod alignment;
pub mod fasta;
pub mod sequence;

// Re-export main types for convenience
pub use alignment::{
    AllelicMask, AllelicStats, Alignment, PairwiseDistanceStats, SequencePool, SequenceStatus, TripletCounts,
};
pub use fasta::{read_sequences, ReadOptions};
pub use sequence::{parse_header_date, Nucleotide, RecombinantType, Sequence};
