// mod.rs - Exact tail-probability cache for triplet random walks

//! P(m, n, k) is the probability that a random walk with `m` up-steps and
//! `n` down-steps, arranged uniformly at random, has a maximum descent of at
//! least `k`. Degenerate keys are answered analytically; every other key
//! within the table bounds is stored once, as an `f32`, in a compact band
//! addressed through a per-(m, n) offset index.

mod file;
mod yk;

use std::path::Path;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::error::RecError;

pub use file::{PTableLoadError, FILE_MARKER, INT_SIZE};
use yk::YkTable;

const BYTES_IN_MB: f64 = 1_048_576.0;
const VALUE_SIZE: usize = std::mem::size_of::<f32>();

/// Bounds of a p-value table: up-steps, down-steps and max-descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSize {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl TableSize {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self { m, n, k }
    }

    /// The same bound on every axis.
    pub fn cubic(size: usize) -> Self {
        Self::new(size, size, size)
    }
}

impl std::fmt::Display for TableSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} * {} * {}", self.m, self.n, self.k)
    }
}

/// Smallest storable max-descent for an (m, n) pair.
fn min_stored_k(m: usize, n: usize) -> usize {
    (n + 1).saturating_sub(m).max(2)
}

/// Number of storable k values for one (m, n) pair.
fn stored_k_count(m: usize, n: usize, k_size: usize) -> usize {
    let min_k = min_stored_k(m, n);
    let max_k = n.min(k_size);
    if max_k >= min_k {
        max_k - min_k + 1
    } else {
        0
    }
}

/// Answer for keys whose probability is 0 or 1 without any lookup.
fn degenerate_p_value(m: usize, n: usize, k: usize) -> Option<f64> {
    if k > n {
        Some(0.0)
    } else if m == 0 || n == 0 || k <= 1 || (n >= m && n - m >= k) {
        Some(1.0)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PValueTable {
    size: TableSize,
    offsets: Vec<usize>,
    values: Vec<f32>,
}

impl PValueTable {
    /// Count of keys that `initialize` stores for the given bounds.
    pub fn storable_key_count(size: TableSize) -> usize {
        let mut total = 0;
        for m in 1..=size.m {
            for n in 1..=size.n {
                total += stored_k_count(m, n, size.k);
            }
        }
        total
    }

    /// Memory needed by a table of the given bounds, in whole megabytes (at least 1).
    pub fn estimate_memory_mb(size: TableSize) -> u64 {
        let bytes = (Self::storable_key_count(size) * VALUE_SIZE) as f64;
        let mb = (bytes / BYTES_IN_MB).ceil() as u64;
        mb.max(1)
    }

    /// Zero-filled table with the offset index built for `size`.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn initialize(size: TableSize) -> Result<Self, RecError> {
        let pairs = size
            .m
            .checked_mul(size.n)
            .ok_or(RecError::Allocation("p-value table index"))?;

        let mut offsets = Vec::new();
        offsets
            .try_reserve_exact(pairs)
            .map_err(|_| RecError::Allocation("p-value table index"))?;

        let mut total = 0usize;
        for m in 1..=size.m {
            for n in 1..=size.n {
                offsets.push(total);
                total += stored_k_count(m, n, size.k);
            }
        }

        let mut values = Vec::new();
        values
            .try_reserve_exact(total)
            .map_err(|_| RecError::Allocation("p-value table"))?;
        values.resize(total, 0.0f32);

        Ok(Self {
            size,
            offsets,
            values,
        })
    }

    /// Build a complete table by dynamic programming over k = 2..=size.k.
    pub fn generate(size: TableSize, show_progress: bool) -> Result<Self, RecError> {
        let memory_mb = Self::estimate_memory_mb(size);
        info!(
            "Generating {} p-value table (~{} MB, ~{} MB needed while generating)",
            size,
            memory_mb,
            memory_mb * 2
        );

        let start = Instant::now();
        let mut table = Self::initialize(size)?;
        let mut yk = YkTable::new(size.m, size.n, size.k)?;

        let pb = if show_progress {
            let pb = ProgressBar::new(size.k.saturating_sub(1) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} layers ({percent}%) ETA: {eta}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        for k in 2..=size.k {
            yk.generate_layer(k - 1);

            for m in 1..=size.m {
                let max_n = (m + k).min(size.n);
                for n in k..=max_n {
                    table.fill_key(m, n, k, &yk);
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        debug!(
            "P-value table generated in {:.2}s ({} stored values)",
            start.elapsed().as_secs_f64(),
            table.values.len()
        );
        Ok(table)
    }

    fn fill_key(&mut self, m: usize, n: usize, k: usize, yk: &YkTable) {
        if degenerate_p_value(m, n, k).is_some() {
            return;
        }
        let Some(index) = self.key_index(m, n, k) else {
            return;
        };

        let fm = m as f64;
        let fn_ = n as f64;
        let stay_up = self.exact(m - 1, n, k).unwrap_or(0.0);
        let stay_down = self.exact(m, n - 1, k).unwrap_or(0.0);
        let reach = yk.value(m, n - 1, k - 1, k - 1);

        let p_value = (fm * stay_up + fn_ * stay_down + fn_ * reach) / (fm + fn_);
        self.values[index] = p_value as f32;
    }

    pub fn size(&self) -> TableSize {
        self.size
    }

    /// Number of stored (non-degenerate) values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values(&self) -> &[f32] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Position of a storable key in the value array.
    pub fn key_index(&self, m: usize, n: usize, k: usize) -> Option<usize> {
        if m < 1 || n < 1 || m > self.size.m || n > self.size.n || k > self.size.k || k > n {
            return None;
        }
        let min_k = min_stored_k(m, n);
        if k < min_k {
            return None;
        }
        Some(self.offsets[(m - 1) * self.size.n + n - 1] + (k - min_k))
    }

    /// True for degenerate keys and for stored keys.
    pub fn can_compute_exact(&self, m: usize, n: usize, k: usize) -> bool {
        degenerate_p_value(m, n, k).is_some()
            || (m <= self.size.m && n <= self.size.n && k <= self.size.k)
    }

    /// Exact P(m, n, k); `None` for non-degenerate keys outside the table bounds.
    pub fn exact(&self, m: usize, n: usize, k: usize) -> Option<f64> {
        if let Some(p_value) = degenerate_p_value(m, n, k) {
            return Some(p_value);
        }
        self.key_index(m, n, k)
            .map(|index| f64::from(self.values[index]))
    }

    /// Iterate stored keys in offset-index order.
    pub fn stored_keys(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let size = self.size;
        (1..=size.m).flat_map(move |m| {
            (1..=size.n).flat_map(move |n| {
                let min_k = min_stored_k(m, n);
                let max_k = n.min(size.k);
                (min_k..=max_k).map(move |k| (m, n, k))
            })
        })
    }

    /// Persist the table in the binary table format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RecError> {
        file::save(self, path.as_ref())
    }

    /// Load a table written by [`PValueTable::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PTableLoadError> {
        file::load(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> PValueTable {
        PValueTable::generate(TableSize::cubic(12), false).unwrap()
    }

    #[test]
    fn test_degenerate_keys() {
        let table = small_table();
        // k > n
        assert_eq!(table.exact(5, 3, 4), Some(0.0));
        assert_eq!(table.exact(500, 3, 4), Some(0.0));
        // m = 0, n = 0, k <= 1, n - m >= k
        assert_eq!(table.exact(0, 5, 3), Some(1.0));
        assert_eq!(table.exact(4, 0, 0), Some(1.0));
        assert_eq!(table.exact(7, 7, 1), Some(1.0));
        assert_eq!(table.exact(7, 7, 0), Some(1.0));
        assert_eq!(table.exact(2, 6, 4), Some(1.0));
        assert_eq!(table.exact(200, 300, 50), Some(1.0));
    }

    #[test]
    fn test_out_of_bounds_key() {
        let table = small_table();
        assert!(!table.can_compute_exact(13, 10, 5));
        assert_eq!(table.exact(13, 10, 5), None);
        assert!(table.can_compute_exact(12, 12, 5));
        assert!(table.exact(12, 12, 5).is_some());
    }

    #[test]
    fn test_known_small_values() {
        let table = small_table();
        // UDD and DDU out of UDD, DUD, DDU
        let p = table.exact(1, 2, 2).unwrap();
        assert!((p - 2.0 / 3.0).abs() < 1e-6, "p = {}", p);
        // UUDD, UDDU and DDUU out of six arrangements
        let p = table.exact(2, 2, 2).unwrap();
        assert!((p - 0.5).abs() < 1e-6, "p = {}", p);
    }

    #[test]
    fn test_monotone_in_k() {
        let table = small_table();
        for m in 1..=12 {
            for n in 1..=12 {
                let mut last = 1.0;
                for k in 0..=12 {
                    let p = table.exact(m, n, k).unwrap();
                    assert!(p <= last + 1e-6, "P({}, {}, {}) = {} > {}", m, n, k, p, last);
                    assert!((0.0..=1.0 + 1e-6).contains(&p));
                    last = p;
                }
            }
        }
    }

    #[test]
    fn test_offsets_are_monotone_and_complete() {
        let size = TableSize::new(7, 9, 5);
        let table = PValueTable::initialize(size).unwrap();
        assert!(table.offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(table.len(), PValueTable::storable_key_count(size));
        let indices: Vec<usize> = table
            .stored_keys()
            .map(|(m, n, k)| table.key_index(m, n, k).unwrap())
            .collect();
        assert_eq!(indices, (0..table.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_estimate_memory() {
        let size = TableSize::cubic(10);
        let count = PValueTable::storable_key_count(size);
        let expected = ((count * 4) as f64 / 1_048_576.0).ceil().max(1.0) as u64;
        assert_eq!(PValueTable::estimate_memory_mb(size), expected);
        assert_eq!(PValueTable::estimate_memory_mb(size), 1);
        assert_eq!(PValueTable::estimate_memory_mb(TableSize::cubic(0)), 1);
    }
}
