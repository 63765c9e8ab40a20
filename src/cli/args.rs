// args.rs - Command line arguments definition

use argh::FromArgs;

use crate::core::BreakpointMode;

#[derive(FromArgs, Debug, Default)]
/// rectriplet - Triplet-based recombination detection for aligned DNA sequences
pub struct Args {
    /// parent sequences: aligned multi-FASTA file or directory of FASTA files
    #[argh(option)]
    pub parents: Option<String>,

    /// child sequences in a separate aligned FASTA file (default: parents are also children)
    #[argh(option)]
    pub children: Option<String>,

    /// p-value table file produced by --generate-ptable
    #[argh(option)]
    pub ptable: Option<String>,

    /// directory for results.csv, longRecs.log, skippedTriplets.log and pvalHist.log (default: .)
    #[argh(option)]
    pub output_dir: Option<String>,

    /// number of worker threads (default: auto-detect)
    #[argh(option)]
    pub threads: Option<usize>,

    /// corrected p-value below which a triplet is recombinant (default: 0.05)
    #[argh(option)]
    pub reject_threshold: Option<f64>,

    /// p-value below which Dunn-Sidak falls back to Bonferroni (default: 1e-15)
    #[argh(option)]
    pub bonferroni_below: Option<f64>,

    /// minimal recombinant length for a long recombinant (default: 100)
    #[argh(option)]
    pub min_long_length: Option<usize>,

    /// skip triplets outside the p-value table instead of approximating them
    #[argh(switch)]
    pub no_approximation: bool,

    /// keep every significant triplet per child, not only the best one
    #[argh(switch)]
    pub all_triplets: bool,

    /// breakpoint localization: best, all or none (default: best)
    #[argh(option)]
    pub breakpoints: Option<BreakpointMode>,

    /// write step counts, raw p-values and approximation flags to results
    #[argh(switch)]
    pub full_output: bool,

    /// field delimiter of results.csv (default: ,)
    #[argh(option)]
    pub delimiter: Option<char>,

    /// read collection dates from sequence names and skip parents sampled after the child
    #[argh(switch)]
    pub use_header_dates: bool,

    /// seconds a parent may be sampled after its child (default: 2678400)
    #[argh(option)]
    pub time_threshold: Option<i64>,

    /// write triplets without a p-value to skippedTriplets.log
    #[argh(switch)]
    pub write_skipped: bool,

    /// keep monomorphic columns
    #[argh(switch)]
    pub use_all_sites: bool,

    /// exclude near-identical parent sequences
    #[argh(switch)]
    pub remove_identical: bool,

    /// largest distance at which parents count as identical (default: 0)
    #[argh(option)]
    pub min_identical_distance: Option<usize>,

    /// read at most this many sequences per input
    #[argh(option)]
    pub read_limit: Option<usize>,

    /// seconds between progress updates (default: 2)
    #[argh(option)]
    pub update_interval: Option<u64>,

    /// number of p-value histogram buckets (default: 41)
    #[argh(option)]
    pub histogram_size: Option<usize>,

    /// generate a p-value table into this file and exit
    #[argh(option)]
    pub generate_ptable: Option<String>,

    /// size N of the generated N x N x N table
    #[argh(option)]
    pub table_size: Option<usize>,

    /// disable progress bars
    #[argh(switch)]
    pub no_progress: bool,

    /// debug-level logging
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// warnings and errors only
    #[argh(switch, short = 'q')]
    pub quiet: bool,

    /// path to a TOML configuration file (or a legacy JSON settings file)
    #[argh(option)]
    pub config: Option<String>,

    /// generate sample configuration file and exit
    #[argh(switch)]
    pub generate_config: bool,
}
