// config.rs - Configuration file support

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::BreakpointMode;
use crate::error::RecError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    // Input/Output
    pub parents: Option<String>,
    pub children: Option<String>,
    pub ptable: Option<String>,
    pub output_dir: Option<String>,
    pub read_limit: Option<usize>,

    // Detection
    pub threads: Option<usize>,
    pub reject_threshold: Option<f64>,
    pub bonferroni_below: Option<f64>,
    pub min_long_length: Option<usize>,
    pub no_approximation: Option<bool>,
    pub all_triplets: Option<bool>,
    pub breakpoints: Option<BreakpointMode>,

    // Dates
    pub use_header_dates: Option<bool>,
    pub time_threshold: Option<i64>,

    // Alignment filters
    pub use_all_sites: Option<bool>,
    pub remove_identical: Option<bool>,
    pub min_identical_distance: Option<usize>,

    // Output
    pub full_output: Option<bool>,
    pub delimiter: Option<char>,
    pub write_skipped: Option<bool>,
    pub histogram_size: Option<usize>,
    pub update_interval: Option<u64>,
}

/// Legacy JSON settings file (`user_settings.rec`, camelCase keys).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacySettings {
    use_header_data: Option<bool>,
    time_threshold_between_parents_and_child: Option<i64>,
    multi_file_mode: Option<bool>,
    threads_count: Option<usize>,
    use_separate_parent_file: Option<bool>,
    separate_parent_file_path: Option<String>,
    sequences_to_read_limit_enabled: Option<bool>,
    sequences_to_read_limit: Option<usize>,
    p_table_file_path: Option<String>,
    min_long_recombination_threshold: Option<usize>,
    reject_threshold: Option<f64>,
    use_all_sites: Option<bool>,
    remove_identical_sequences: Option<bool>,
    min_identical_sequences_distance: Option<usize>,
    write_skipped_triplets: Option<bool>,
    simplified_output: Option<bool>,
    output_dir_path: Option<String>,
    calculate_all_breakpoints: Option<bool>,
    calculate_no_breakpoints: Option<bool>,
}

impl From<LegacySettings> for Config {
    fn from(legacy: LegacySettings) -> Self {
        let breakpoints = match (legacy.calculate_no_breakpoints, legacy.calculate_all_breakpoints) {
            (Some(true), _) => Some(BreakpointMode::None),
            (_, Some(true)) => Some(BreakpointMode::All),
            (Some(false), _) | (_, Some(false)) => Some(BreakpointMode::Best),
            (None, None) => None,
        };
        let separate_parents = legacy
            .separate_parent_file_path
            .filter(|_| legacy.use_separate_parent_file.unwrap_or(false));
        let read_limit = legacy
            .sequences_to_read_limit
            .filter(|_| legacy.sequences_to_read_limit_enabled.unwrap_or(false));
        if legacy.multi_file_mode.unwrap_or(false) {
            info!("multiFileMode is implied by passing a directory as --parents");
        }

        Config {
            parents: separate_parents,
            ptable: legacy.p_table_file_path,
            output_dir: legacy.output_dir_path.filter(|p| p != "_" && !p.is_empty()),
            read_limit,
            threads: legacy.threads_count,
            reject_threshold: legacy.reject_threshold,
            min_long_length: legacy.min_long_recombination_threshold,
            breakpoints,
            use_header_dates: legacy.use_header_data,
            time_threshold: legacy.time_threshold_between_parents_and_child,
            use_all_sites: legacy.use_all_sites,
            remove_identical: legacy.remove_identical_sequences,
            min_identical_distance: legacy.min_identical_sequences_distance,
            full_output: legacy.simplified_output.map(|simplified| !simplified),
            write_skipped: legacy.write_skipped_triplets,
            ..Default::default()
        }
    }
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, or from a legacy JSON settings file
    /// (`.json` / `.rec`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RecError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| RecError::io(e, path))?;

        let is_legacy = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("rec"));
        let config = if is_legacy {
            Self::from_legacy_json(&content)
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        }
        .map_err(|e| RecError::Config(format!("failed to parse config file '{}': {}", path.display(), e)))?;

        println!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn from_legacy_json(content: &str) -> Result<Self, String> {
        let legacy: LegacySettings = serde_json::from_str(content).map_err(|e| e.to_string())?;
        Ok(legacy.into())
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RecError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| RecError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| RecError::io(e, path))?;
        println!("📄 Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Generate a sample configuration file with comments
    pub fn generate_sample() -> String {
        r#"# rectriplet.toml - Configuration file for rectriplet
# Command line arguments will override these settings

# =============================================================================
# INPUT/OUTPUT
# =============================================================================

# Aligned parent sequences: multi-FASTA file or directory of FASTA files
parents = "/path/to/alignment.fasta"

# Aligned child sequences (omit to test every parent as a child)
# children = "/path/to/children.fasta"

# P-value table generated with --generate-ptable
ptable = "/path/to/ptable.bin"

# Directory for results.csv, longRecs.log, skippedTriplets.log, pvalHist.log
output_dir = "results"

# Read at most this many sequences per input
# read_limit = 1000

# =============================================================================
# DETECTION
# =============================================================================

# Number of worker threads (omit for auto-detection)
threads = 8

# Dunn-Sidak corrected p-value below which a triplet is recombinant
reject_threshold = 0.05

# P-value below which the Dunn-Sidak correction falls back to Bonferroni
bonferroni_below = 1e-15

# Minimal recombinant length for a long recombinant
min_long_length = 100

# Skip triplets outside the p-value table instead of approximating them
no_approximation = false

# Keep every significant triplet per child, not only the best one
all_triplets = false

# Breakpoint localization: "best", "all" or "none"
breakpoints = "best"

# =============================================================================
# COLLECTION DATES
# =============================================================================

# Read collection dates (YYYY?MM?DD) from sequence names
use_header_dates = false

# Seconds a parent may be sampled after its child
time_threshold = 2678400

# =============================================================================
# ALIGNMENT FILTERS
# =============================================================================

# Keep monomorphic columns
use_all_sites = false

# Exclude near-identical parent sequences
remove_identical = false

# Largest distance at which parents count as identical
min_identical_distance = 0

# =============================================================================
# OUTPUT
# =============================================================================

# Step counts, raw p-values and approximation flags in results.csv
full_output = false

# Field delimiter of results.csv
delimiter = ","

# Write triplets without a p-value to skippedTriplets.log
write_skipped = false

# Number of p-value histogram buckets
histogram_size = 41

# Seconds between progress updates
update_interval = 2
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config.breakpoints, Some(BreakpointMode::Best));
        assert_eq!(config.threads, Some(8));
        assert_eq!(config.bonferroni_below, Some(1e-15));
        assert_eq!(config.delimiter, Some(','));
        assert_eq!(config.time_threshold, Some(2_678_400));
    }

    #[test]
    fn test_legacy_settings() {
        let json = r#"{
            "useHeaderData": true,
            "timeThresholdBetweenParentsAndChild": 86400,
            "multiFileMode": false,
            "threadsCount": 6,
            "useSeparateParentFile": false,
            "separateParentFilePath": "parents.fasta",
            "sequencesToReadLimitEnabled": true,
            "sequencesToReadLimit": 500,
            "pTableFilePath": "ptable.bin",
            "minLongRecombinationThreshold": 150,
            "rejectThreshold": 0.01,
            "useAllSites": false,
            "removeIdenticalSequences": true,
            "minIdenticalSequencesDistance": 2,
            "writeSkippedTriplets": true,
            "simplifiedOutput": false,
            "outputDirPath": "_",
            "calculateAllBreakpoints": true,
            "calculateNoBreakpoints": false
        }"#;
        let config = Config::from_legacy_json(json).unwrap();
        assert_eq!(config.parents, None);
        assert_eq!(config.read_limit, Some(500));
        assert_eq!(config.ptable.as_deref(), Some("ptable.bin"));
        assert_eq!(config.output_dir, None);
        assert_eq!(config.threads, Some(6));
        assert_eq!(config.min_long_length, Some(150));
        assert_eq!(config.breakpoints, Some(BreakpointMode::All));
        assert_eq!(config.full_output, Some(true));
        assert_eq!(config.time_threshold, Some(86_400));
        assert_eq!(config.min_identical_distance, Some(2));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("run.toml");
        std::fs::write(&toml_path, "threads = 3\nbreakpoints = \"none\"\n").unwrap();
        let config = Config::from_file(&toml_path).unwrap();
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.breakpoints, Some(BreakpointMode::None));

        let rec_path = dir.path().join("user_settings.rec");
        std::fs::write(&rec_path, r#"{"threadsCount": 2, "calculateNoBreakpoints": true}"#).unwrap();
        let legacy = Config::from_file(&rec_path).unwrap();
        assert_eq!(legacy.threads, Some(2));
        assert_eq!(legacy.breakpoints, Some(BreakpointMode::None));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "threads = \"many\"\n").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(RecError::Config(_))));
    }

    #[test]
    fn test_to_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let config = Config {
            ptable: Some("t.bin".to_string()),
            reject_threshold: Some(0.01),
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
