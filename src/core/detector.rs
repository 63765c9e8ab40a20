// detector.rs - Parallel child x parent x parent recombination scan

use std::ops::{AddAssign, Range};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::histogram::{PValueHistogram, DEFAULT_HISTOGRAM_SIZE};
use super::pool::{StorageMode, TripletPool};
use super::ptable::PValueTable;
use super::stats::{Correction, DUNN_SIDAK_MIN_P};
use crate::data::{RecombinantType, Sequence};
use crate::error::RecError;

/// 31 days.
pub const DEFAULT_TIME_THRESHOLD_SECS: i64 = 31 * 24 * 3600;

const MONITOR_POLL: Duration = Duration::from_millis(50);

/// Which retained triplets get breakpoints localized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointMode {
    /// Breakpoints for the best triplet of each child.
    #[default]
    Best,
    /// Breakpoints for every significant triplet (implies storing all of them).
    All,
    /// No breakpoint localization.
    None,
}

impl FromStr for BreakpointMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(BreakpointMode::Best),
            "all" => Ok(BreakpointMode::All),
            "none" => Ok(BreakpointMode::None),
            other => Err(format!("unknown breakpoint mode '{}' (expected best, all or none)", other)),
        }
    }
}

impl std::fmt::Display for BreakpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BreakpointMode::Best => "best",
            BreakpointMode::All => "all",
            BreakpointMode::None => "none",
        };
        f.write_str(name)
    }
}

/// Everything the scan needs to know, resolved once before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub threads: usize,
    pub reject_threshold: f64,
    pub bonferroni_below: f64,
    pub min_long_recombinant_length: usize,
    pub accept_approximate: bool,
    pub storage_mode: StorageMode,
    pub breakpoints: BreakpointMode,
    pub use_header_dates: bool,
    pub time_threshold_secs: i64,
    pub update_interval: Duration,
    pub histogram_size: usize,
    pub show_progress: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threads: rayon::current_num_threads(),
            reject_threshold: 0.05,
            bonferroni_below: DUNN_SIDAK_MIN_P,
            min_long_recombinant_length: 100,
            accept_approximate: true,
            storage_mode: StorageMode::BestTriplet,
            breakpoints: BreakpointMode::Best,
            use_header_dates: false,
            time_threshold_secs: DEFAULT_TIME_THRESHOLD_SECS,
            update_interval: Duration::from_secs(2),
            histogram_size: DEFAULT_HISTOGRAM_SIZE,
            show_progress: false,
        }
    }
}

impl DetectionSettings {
    /// Storing every triplet is required when breakpoints are wanted for all of them.
    pub fn effective_storage_mode(&self) -> StorageMode {
        match self.breakpoints {
            BreakpointMode::All => StorageMode::AllTriplets,
            _ => self.storage_mode,
        }
    }
}

/// Per-run counters, summed over chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCounts {
    pub exact: u64,
    pub approximated: u64,
    pub not_computed: u64,
    pub recombinant_triplets: u64,
    pub skipped_by_time: u64,
    pub outer_loops: u64,
}

impl ScanCounts {
    pub fn computed(&self) -> u64 {
        self.exact + self.approximated
    }
}

impl AddAssign for ScanCounts {
    fn add_assign(&mut self, other: Self) {
        self.exact += other.exact;
        self.approximated += other.approximated;
        self.not_computed += other.not_computed;
        self.recombinant_triplets += other.recombinant_triplets;
        self.skipped_by_time += other.skipped_by_time;
        self.outer_loops += other.outer_loops;
    }
}

/// Result of a whole scan, merged in chunk order.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub counts: ScanCounts,
    pub min_p_value: Option<f64>,
    pub histogram: PValueHistogram,
    pub triplets: TripletPool,
    /// Names of children classified as long recombinants.
    pub long_recombinants: Vec<String>,
    pub elapsed: Duration,
}

impl DetectionOutcome {
    /// Children with at least one significant triplet.
    pub fn recombinant_children(&self) -> usize {
        self.triplets.children().count()
    }
}

/// Receives the `Triplet::info` row of every triplet left without a p-value,
/// from whichever worker met it.
pub trait SkippedTripletSink: Sync {
    fn record(&self, row: &[String]) -> Result<(), RecError>;
}

/// Split `children` into contiguous chunks whose sizes differ by at most one.
///
/// Over-partitions to four chunks per worker when there are enough children.
pub fn partition(children: usize, workers: usize) -> Vec<Range<usize>> {
    if children == 0 {
        return Vec::new();
    }
    let workers = workers.max(1);
    let chunk_count = if children >= 4 * workers {
        4 * workers
    } else {
        workers.min(children)
    };
    let base = children / chunk_count;
    let extra = children % chunk_count;
    let mut start = 0;
    (0..chunk_count)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Blocking checkout of reusable scratch pools; never hands out more than it holds.
struct SlotPool<T> {
    slots: Mutex<Vec<T>>,
    freed: Condvar,
}

impl<T> SlotPool<T> {
    fn new(slots: Vec<T>) -> Self {
        Self {
            slots: Mutex::new(slots),
            freed: Condvar::new(),
        }
    }

    fn checkout(&self) -> T {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(slot) = slots.pop() {
                return slot;
            }
            slots = self.freed.wait(slots).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn checkin(&self, slot: T) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).push(slot);
        self.freed.notify_one();
    }
}

/// Live figures read by the monitor task.
#[derive(Default)]
struct LiveProgress {
    outer_loops: AtomicU64,
    recombinant_triplets: AtomicU64,
    skipped_by_time: AtomicU64,
    // bit pattern of a non-negative f64, so integer order is float order
    min_p_bits: AtomicU64,
    chunks_done: AtomicUsize,
    // set by the first chunk that fails, the others stop at their next row
    failed: AtomicBool,
}

impl LiveProgress {
    fn new() -> Self {
        Self {
            min_p_bits: AtomicU64::new(f64::INFINITY.to_bits()),
            ..Default::default()
        }
    }

    fn min_p_value(&self) -> f64 {
        f64::from_bits(self.min_p_bits.load(Ordering::Relaxed))
    }
}

/// Marks a chunk done even if it unwinds, so the monitor always stops.
struct ChunkDone<'a>(&'a AtomicUsize);

impl Drop for ChunkDone<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    counts: ScanCounts,
    min_p_value: Option<f64>,
    histogram: PValueHistogram,
    retained: TripletPool,
}

/// Scans every active child against every ordered pair of distinct active parents.
pub struct RecombinationScan<'a> {
    table: &'a PValueTable,
    settings: DetectionSettings,
    correction: Correction,
    skipped_sink: Option<&'a dyn SkippedTripletSink>,
}

impl<'a> RecombinationScan<'a> {
    pub fn new(table: &'a PValueTable, settings: DetectionSettings, correction: Correction) -> Self {
        Self {
            table,
            settings,
            correction,
            skipped_sink: None,
        }
    }

    /// Stream triplets without a p-value to `sink` while scanning.
    pub fn with_skipped_sink(mut self, sink: &'a dyn SkippedTripletSink) -> Self {
        self.skipped_sink = Some(sink);
        self
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn correction(&self) -> &Correction {
        &self.correction
    }

    pub fn run(&self, parents: &[Arc<Sequence>], children: &[Arc<Sequence>]) -> Result<DetectionOutcome, RecError> {
        let start = Instant::now();
        let mode = self.settings.effective_storage_mode();
        let workers = self.settings.threads.clamp(1, children.len().max(1));
        let chunks = partition(children.len(), workers);

        info!(
            "Scanning {} children against {} parents: {} chunks on {} workers",
            children.len(),
            parents.len(),
            chunks.len(),
            workers
        );

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers + 1)
            .build()
            .map_err(|e| RecError::Config(format!("cannot start {} worker threads: {}", workers, e)))?;

        let progress_bar = self.progress_bar((children.len() * parents.len()) as u64);
        let live = LiveProgress::new();
        let slots = SlotPool::new((0..workers).map(|_| TripletPool::new(mode)).collect());
        let mut outcomes: Vec<Result<ChunkOutcome, RecError>> =
            chunks.iter().map(|_| Ok(ChunkOutcome::default())).collect();

        thread_pool.scope(|scope| {
            let (live, slots) = (&live, &slots);
            let chunk_count = chunks.len();
            let monitor_bar = progress_bar.clone();
            scope.spawn(move |_| self.monitor(live, chunk_count, &monitor_bar, start));

            for (range, outcome) in chunks.iter().cloned().zip(outcomes.iter_mut()) {
                scope.spawn(move |_| {
                    let _done = ChunkDone(&live.chunks_done);
                    let mut scratch = slots.checkout();
                    *outcome = self
                        .scan_chunk(range, parents, children, &mut scratch, live)
                        .map(|chunk| ChunkOutcome {
                            retained: scratch.take_retained(),
                            ..chunk
                        });
                    if outcome.is_err() {
                        live.failed.store(true, Ordering::Relaxed);
                        // the next chunk on this slot starts clean
                        scratch.take_retained();
                    }
                    slots.checkin(scratch);
                });
            }
        });
        progress_bar.finish_and_clear();

        let mut triplets = TripletPool::new(mode);
        let mut counts = ScanCounts::default();
        let mut min_p_value: Option<f64> = None;
        let mut histogram = PValueHistogram::new(self.settings.histogram_size);
        for outcome in outcomes {
            let outcome = outcome?;
            counts += outcome.counts;
            min_p_value = match (min_p_value, outcome.min_p_value) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            histogram.merge(&outcome.histogram);
            triplets.absorb(outcome.retained);
        }

        if self.settings.breakpoints != BreakpointMode::None {
            let recombinant: Vec<usize> = triplets.children().collect();
            debug!("Localizing breakpoints for {} children", recombinant.len());
            for child_index in recombinant {
                triplets.seek_breakpoint_pairs(child_index, self.settings.min_long_recombinant_length);
            }
        }

        let long_recombinants = triplets
            .children()
            .map(|i| &children[i])
            .filter(|child| child.recombinant_type() == RecombinantType::Long)
            .map(|child| child.name().to_string())
            .collect();

        Ok(DetectionOutcome {
            counts,
            min_p_value,
            histogram,
            triplets,
            long_recombinants,
            elapsed: start.elapsed(),
        })
    }

    fn scan_chunk(
        &self,
        range: Range<usize>,
        parents: &[Arc<Sequence>],
        children: &[Arc<Sequence>],
        pool: &mut TripletPool,
        live: &LiveProgress,
    ) -> Result<ChunkOutcome, RecError> {
        let settings = &self.settings;
        let mut outcome = ChunkOutcome {
            histogram: PValueHistogram::new(settings.histogram_size),
            ..Default::default()
        };
        let counts = &mut outcome.counts;
        let too_young = |child: &Sequence, parent: &Sequence| {
            settings.use_header_dates && child.is_older_than(parent, settings.time_threshold_secs)
        };
        #[cfg(feature = "debug-stats")]
        let chunk_start = Instant::now();

        for child_index in range.clone() {
            if live.failed.load(Ordering::Relaxed) {
                break;
            }
            let child = &children[child_index];
            for dad in parents {
                if Arc::ptr_eq(dad, child) {
                    continue;
                }
                if too_young(child, dad) {
                    counts.skipped_by_time += parents.len() as u64;
                    live.skipped_by_time.fetch_add(parents.len() as u64, Ordering::Relaxed);
                    continue;
                }
                counts.outer_loops += 1;
                live.outer_loops.fetch_add(1, Ordering::Relaxed);

                for mum in parents {
                    if Arc::ptr_eq(mum, dad) || Arc::ptr_eq(mum, child) {
                        continue;
                    }
                    if too_young(child, mum) {
                        counts.skipped_by_time += 1;
                        live.skipped_by_time.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let triplet = pool.acquire(child, dad, mum, self.table, settings.accept_approximate);
                    let Some(p_value) = triplet.p_value() else {
                        counts.not_computed += 1;
                        let recorded = match self.skipped_sink {
                            Some(sink) => sink.record(&triplet.info()),
                            None => Ok(()),
                        };
                        pool.release(triplet);
                        recorded?;
                        continue;
                    };

                    if p_value.is_exact() {
                        counts.exact += 1;
                    } else {
                        counts.approximated += 1;
                    }
                    let p = p_value.value();
                    outcome.histogram.add(p);
                    if p >= 0.0 && outcome.min_p_value.map_or(true, |min| p < min) {
                        outcome.min_p_value = Some(p);
                        live.min_p_bits.fetch_min(p.to_bits(), Ordering::Relaxed);
                    }

                    if self.correction.dunn_sidak(p) < settings.reject_threshold {
                        counts.recombinant_triplets += 1;
                        live.recombinant_triplets.fetch_add(1, Ordering::Relaxed);
                        child.upgrade_recombinant_type(RecombinantType::Short);
                        pool.retain(child_index, triplet);
                    } else {
                        pool.release(triplet);
                    }
                }
            }
        }

        #[cfg(feature = "debug-stats")]
        debug!(
            "Chunk {:?}: {} exact, {} approximated, {} not computed, {} recombinant in {:.3}s",
            range,
            counts.exact,
            counts.approximated,
            counts.not_computed,
            counts.recombinant_triplets,
            chunk_start.elapsed().as_secs_f64()
        );

        Ok(outcome)
    }

    /// Refresh the progress bar until every chunk has finished.
    fn monitor(&self, live: &LiveProgress, chunk_count: usize, bar: &ProgressBar, start: Instant) {
        let mut last_update: Option<Instant> = None;
        while live.chunks_done.load(Ordering::Acquire) < chunk_count {
            bar.set_position(live.outer_loops.load(Ordering::Relaxed));
            if last_update.map_or(true, |t| t.elapsed() >= self.settings.update_interval) {
                last_update = Some(Instant::now());
                let min_p = live.min_p_value();
                let mut message = format!(
                    "min p {} | {} recombinant triplets",
                    if min_p.is_finite() { format!("{:.3e}", min_p) } else { "-".to_string() },
                    live.recombinant_triplets.load(Ordering::Relaxed)
                );
                if self.settings.use_header_dates {
                    message.push_str(&format!(
                        " | {} skipped by date",
                        live.skipped_by_time.load(Ordering::Relaxed)
                    ));
                }
                debug!("[{:.0}s] {}", start.elapsed().as_secs_f64(), message);
                bar.set_message(message);
            }
            std::thread::sleep(MONITOR_POLL);
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ptable::TableSize;

    fn seq(name: &str, residues: &str) -> Arc<Sequence> {
        Arc::new(Sequence::new(name, residues.as_bytes()))
    }

    fn table() -> PValueTable {
        PValueTable::generate(TableSize::cubic(12), false).unwrap()
    }

    #[derive(Default)]
    struct CollectedRows(Mutex<Vec<Vec<String>>>);

    impl SkippedTripletSink for CollectedRows {
        fn record(&self, row: &[String]) -> Result<(), RecError> {
            self.0.lock().unwrap().push(row.to_vec());
            Ok(())
        }
    }

    struct FullDisk;

    impl SkippedTripletSink for FullDisk {
        fn record(&self, _row: &[String]) -> Result<(), RecError> {
            Err(RecError::Output("disk full".to_string()))
        }
    }

    #[test]
    fn test_partition_covers_every_child_once() {
        for (children, workers) in [(1, 4), (7, 2), (8, 2), (100, 3), (5, 5), (13, 1)] {
            let chunks = partition(children, workers);
            let covered: Vec<usize> = chunks.iter().flat_map(|r| r.clone()).collect();
            assert_eq!(covered, (0..children).collect::<Vec<_>>());
            let sizes: Vec<usize> = chunks.iter().map(|r| r.len()).collect();
            assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
        }
        assert_eq!(partition(100, 3).len(), 12);
        assert_eq!(partition(7, 2).len(), 2);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn test_slot_pool_round_trip() {
        let slots = SlotPool::new(vec![1, 2]);
        let a = slots.checkout();
        let b = slots.checkout();
        slots.checkin(a);
        assert_eq!(slots.checkout(), a);
        slots.checkin(b);
    }

    #[test]
    fn test_breakpoint_mode_parsing() {
        assert_eq!("ALL".parse::<BreakpointMode>(), Ok(BreakpointMode::All));
        assert_eq!("none".parse::<BreakpointMode>(), Ok(BreakpointMode::None));
        assert!("some".parse::<BreakpointMode>().is_err());
        let settings = DetectionSettings {
            breakpoints: BreakpointMode::All,
            ..Default::default()
        };
        assert_eq!(settings.effective_storage_mode(), StorageMode::AllTriplets);
    }

    #[test]
    fn test_scan_flags_mosaic_child() {
        let dad = seq("dad", "AAAAAAAAAAAACCCCCCCCCCCC");
        let mum = seq("mum", "CCCCCCCCCCCCAAAAAAAAAAAA");
        let child = seq("child", "AAAAAAAAAAAAAAAAAAAAAAAA");
        let parents = vec![Arc::clone(&dad), Arc::clone(&mum)];
        let t = table();
        let settings = DetectionSettings {
            threads: 2,
            min_long_recombinant_length: 10,
            ..Default::default()
        };
        let scan = RecombinationScan::new(&t, settings, Correction::new(2.0));
        let outcome = scan.run(&parents, &[Arc::clone(&child)]).unwrap();

        assert_eq!(outcome.counts.computed(), 2);
        assert_eq!(outcome.counts.outer_loops, 2);
        assert_eq!(outcome.counts.recombinant_triplets, 2);
        assert_eq!(outcome.recombinant_children(), 1);
        assert_eq!(outcome.triplets.retained_count(), 1);
        assert_eq!(outcome.histogram.total(), 2);
        assert!(outcome.min_p_value.unwrap() < 1e-5);
        assert_eq!(child.recombinant_type(), RecombinantType::Long);
        assert_eq!(outcome.long_recombinants, vec!["child".to_string()]);
        assert_eq!(outcome.triplets.longest_min_length(), 12);
    }

    #[test]
    fn test_skips_without_p_value() {
        let dad = seq("dad", "AAAAAAAAAAAACCCCCCCCCCCC");
        let mum = seq("mum", "CCCCCCCCCCCCAAAAAAAAAAAA");
        let child = seq("child", "AAAAAAAAAAAAAAAAAAAAAAAA");
        let small = PValueTable::generate(TableSize::cubic(4), false).unwrap();
        let settings = DetectionSettings {
            threads: 1,
            accept_approximate: false,
            ..Default::default()
        };
        let rows = CollectedRows::default();
        let scan = RecombinationScan::new(&small, settings, Correction::new(2.0)).with_skipped_sink(&rows);
        let outcome = scan.run(&[dad, mum], &[child]).unwrap();
        assert_eq!(outcome.counts.not_computed, 2);
        assert_eq!(outcome.counts.computed(), 0);
        assert_eq!(outcome.min_p_value, None);
        let rows = rows.0.into_inner().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ["dad", "mum", "child", "12", "12", "12"]);
        assert_eq!(rows[1], ["mum", "dad", "child", "12", "12", "12"]);
    }

    #[test]
    fn test_skipped_sink_failure_aborts_scan() {
        let dad = seq("dad", "AAAAAAAAAAAACCCCCCCCCCCC");
        let mum = seq("mum", "CCCCCCCCCCCCAAAAAAAAAAAA");
        let children: Vec<_> = (0..6).map(|i| seq(&format!("child{}", i), "AAAAAAAAAAAAAAAAAAAAAAAA")).collect();
        let small = PValueTable::generate(TableSize::cubic(4), false).unwrap();
        let settings = DetectionSettings {
            threads: 3,
            accept_approximate: false,
            ..Default::default()
        };
        let scan = RecombinationScan::new(&small, settings, Correction::new(2.0)).with_skipped_sink(&FullDisk);
        let result = scan.run(&[dad, mum], &children);
        assert!(matches!(result, Err(RecError::Output(msg)) if msg == "disk full"));
    }

    #[test]
    fn test_date_filter() {
        let dad = seq("dad|2021-06-01", "AAAAAACCCCCC");
        let mum = seq("mum|2020-01-01", "CCCCCCAAAAAA");
        let other = seq("other|2020-01-02", "CCCCCCCCCCCC");
        let child = seq("child|2020-02-01", "AAAAAAAAAAAA");
        let settings = DetectionSettings {
            threads: 1,
            use_header_dates: true,
            ..Default::default()
        };
        let t = table();
        let scan = RecombinationScan::new(&t, settings, Correction::new(6.0));
        let outcome = scan.run(&[dad, mum, other], &[child]).unwrap();
        // dad is sampled long after the child: its whole row is skipped,
        // then dad is skipped again as the second parent of mum and other
        assert_eq!(outcome.counts.skipped_by_time, 3 + 2);
        assert_eq!(outcome.counts.outer_loops, 2);
        assert_eq!(outcome.counts.computed(), 2);
    }

    #[test]
    fn test_no_breakpoints_mode() {
        let dad = seq("dad", "AAAAAAAAAAAACCCCCCCCCCCC");
        let mum = seq("mum", "CCCCCCCCCCCCAAAAAAAAAAAA");
        let child = seq("child", "AAAAAAAAAAAAAAAAAAAAAAAA");
        let settings = DetectionSettings {
            threads: 1,
            breakpoints: BreakpointMode::None,
            min_long_recombinant_length: 1,
            ..Default::default()
        };
        let t = table();
        let scan = RecombinationScan::new(&t, settings, Correction::new(2.0));
        let outcome = scan.run(&[dad, mum], &[Arc::clone(&child)]).unwrap();
        assert_eq!(child.recombinant_type(), RecombinantType::Short);
        assert!(outcome.triplets.iter().all(|t| !t.breakpoints_computed()));
        assert!(outcome.long_recombinants.is_empty());
    }
}
