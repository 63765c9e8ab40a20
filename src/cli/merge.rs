// merge.rs - Merge configuration file with CLI arguments

use crate::cli::{Args, Config};
use crate::error::RecError;

impl Args {
    /// Merge with configuration from file
    /// CLI arguments take precedence over config file values
    pub fn merge_with_config(mut self, config: Config) -> Self {
        // Input/Output
        if self.parents.is_none() {
            self.parents = config.parents;
        }
        if self.children.is_none() {
            self.children = config.children;
        }
        if self.ptable.is_none() {
            self.ptable = config.ptable;
        }
        if self.output_dir.is_none() {
            self.output_dir = config.output_dir;
        }
        if self.read_limit.is_none() {
            self.read_limit = config.read_limit;
        }

        // Detection
        if self.threads.is_none() {
            self.threads = config.threads;
        }
        if self.reject_threshold.is_none() {
            self.reject_threshold = config.reject_threshold;
        }
        if self.bonferroni_below.is_none() {
            self.bonferroni_below = config.bonferroni_below;
        }
        if self.min_long_length.is_none() {
            self.min_long_length = config.min_long_length;
        }
        if self.breakpoints.is_none() {
            self.breakpoints = config.breakpoints;
        }

        // Dates
        if self.time_threshold.is_none() {
            self.time_threshold = config.time_threshold;
        }

        // Alignment filters
        if self.min_identical_distance.is_none() {
            self.min_identical_distance = config.min_identical_distance;
        }

        // Output
        if self.delimiter.is_none() {
            self.delimiter = config.delimiter;
        }
        if self.histogram_size.is_none() {
            self.histogram_size = config.histogram_size;
        }
        if self.update_interval.is_none() {
            self.update_interval = config.update_interval;
        }

        // Flags (CLI flags take precedence, config only sets if not explicitly set)
        self.no_approximation |= config.no_approximation.unwrap_or(false);
        self.all_triplets |= config.all_triplets.unwrap_or(false);
        self.use_header_dates |= config.use_header_dates.unwrap_or(false);
        self.use_all_sites |= config.use_all_sites.unwrap_or(false);
        self.remove_identical |= config.remove_identical.unwrap_or(false);
        self.full_output |= config.full_output.unwrap_or(false);
        self.write_skipped |= config.write_skipped.unwrap_or(false);

        self
    }

    /// Load configuration and merge with CLI args
    pub fn with_config_file(self, config_path: &str) -> Result<Self, RecError> {
        let config = Config::from_file(config_path)?;
        Ok(self.merge_with_config(config))
    }
}
