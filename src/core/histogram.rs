// histogram.rs - Distribution of triplet p-values by decade

use std::path::Path;

use crate::error::RecError;

pub const DEFAULT_HISTOGRAM_SIZE: usize = 41;

/// Counts of p-values bucketed by `floor(-log10 p)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PValueHistogram {
    counts: Vec<u64>,
}

impl Default for PValueHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_SIZE)
    }
}

impl PValueHistogram {
    pub fn new(size: usize) -> Self {
        Self {
            counts: vec![0; size.max(1)],
        }
    }

    pub fn bucket(&self, p_value: f64) -> usize {
        let last = self.counts.len() - 1;
        if p_value.is_nan() {
            return 0;
        }
        if p_value <= 0.0 {
            return last;
        }
        let decade = (-p_value.log10()).floor();
        if decade <= 0.0 {
            0
        } else {
            (decade as usize).min(last)
        }
    }

    pub fn add(&mut self, p_value: f64) {
        let bucket = self.bucket(p_value);
        self.counts[bucket] += 1;
    }

    /// Add another histogram's counts bucket by bucket.
    pub fn merge(&mut self, other: &PValueHistogram) {
        if other.counts.len() > self.counts.len() {
            self.counts.resize(other.counts.len(), 0);
        }
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine += theirs;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Rows of (index, count, fraction of `active_triplets`, log10 of the fraction).
    pub fn rows(&self, active_triplets: u64) -> Vec<[String; 4]> {
        self.counts
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                let fraction = if active_triplets > 0 {
                    count as f64 / active_triplets as f64
                } else {
                    0.0
                };
                let log = if fraction > 0.0 {
                    format!("{:.3}", fraction.log10())
                } else {
                    "N/A".to_string()
                };
                [index.to_string(), count.to_string(), format!("{:.8}", fraction), log]
            })
            .collect()
    }

    pub fn save(&self, path: &Path, active_triplets: u64, delimiter: u8) -> Result<(), RecError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_path(path)?;
        for row in self.rows(active_triplets) {
            writer.write_record(&row)?;
        }
        writer.flush().map_err(|e| RecError::io(e, path))?;
        Ok(())
    }
}
