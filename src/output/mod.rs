// mod.rs - Result file writers

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::core::{Correction, PValueHistogram, SkippedTripletSink, TripletPool};
use crate::error::RecError;

pub const RESULTS_FILE: &str = "results.csv";
pub const LONG_RECOMBINANTS_FILE: &str = "longRecs.log";
pub const SKIPPED_TRIPLETS_FILE: &str = "skippedTriplets.log";
pub const HISTOGRAM_FILE: &str = "pvalHist.log";

/// Ensure parent directory exists before creating file
pub fn ensure_parent_dir(file_path: &Path) -> Result<(), RecError> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| RecError::io(e, parent))?;
    }
    Ok(())
}

/// Where the files of one detection run go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, RecError> {
        let root = root.into();
        create_dir_all(&root).map_err(|e| RecError::io(e, &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn results(&self) -> PathBuf {
        self.root.join(RESULTS_FILE)
    }

    pub fn long_recombinants(&self) -> PathBuf {
        self.root.join(LONG_RECOMBINANTS_FILE)
    }

    pub fn skipped_triplets(&self) -> PathBuf {
        self.root.join(SKIPPED_TRIPLETS_FILE)
    }

    pub fn histogram(&self) -> PathBuf {
        self.root.join(HISTOGRAM_FILE)
    }
}

/// Write every retained triplet as a delimited table.
pub fn write_results(
    path: &Path,
    triplets: &TripletPool,
    correction: &Correction,
    simplified: bool,
    delimiter: u8,
) -> Result<(), RecError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    triplets.write_all(&mut writer, correction, simplified)?;
    info!("Wrote {} triplets to {}", triplets.retained_count(), path.display());
    Ok(())
}

/// One long-recombinant name per line, after a short provenance header.
pub fn write_long_recombinants(path: &Path, names: &[String], command_line: &str) -> Result<(), RecError> {
    ensure_parent_dir(path)?;
    let file = File::create(path).map_err(|e| RecError::io(e, path))?;
    let mut writer = BufWriter::new(file);
    let mut write = || -> std::io::Result<()> {
        writeln!(writer, "# Command: {}", command_line)?;
        writeln!(writer, "# Generated: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(writer, "# rectriplet v{}", env!("CARGO_PKG_VERSION"))?;
        for name in names {
            writeln!(writer, "{}", name)?;
        }
        writer.flush()
    };
    write().map_err(|e| RecError::io(e, path))
}

/// Triplets that got no p-value, one row as soon as a worker meets one:
/// dad, mum, child, up, down, max descent.
pub struct SkippedTripletLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
    rows: AtomicU64,
}

impl SkippedTripletLog {
    pub fn create(path: &Path, delimiter: u8) -> Result<Self, RecError> {
        ensure_parent_dir(path)?;
        let file = File::create(path).map_err(|e| RecError::io(e, path))?;
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            rows: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush what is still buffered and report how many rows were written.
    pub fn finish(self) -> Result<u64, RecError> {
        let rows = self.rows.into_inner();
        let mut writer = self.writer.into_inner().unwrap_or_else(PoisonError::into_inner);
        writer.flush().map_err(|e| RecError::io(e, &self.path))?;
        info!("Wrote {} skipped triplets to {}", rows, self.path.display());
        Ok(rows)
    }
}

impl SkippedTripletSink for SkippedTripletLog {
    fn record(&self, row: &[String]) -> Result<(), RecError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_record(row)
            .map_err(|e| RecError::Output(format!("{}: {}", self.path.display(), e)))?;
        self.rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Save the histogram; a failure is only reported.
pub fn write_histogram(path: &Path, histogram: &PValueHistogram, active_triplets: u64) -> bool {
    let result = ensure_parent_dir(path).and_then(|_| histogram.save(path, active_triplets, b'\t'));
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not save the p-value histogram to {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::create(tmp.path().join("nested/run")).unwrap();
        assert!(out.root().is_dir());
        assert!(out.results().ends_with("results.csv"));
        assert!(out.histogram().ends_with("pvalHist.log"));
    }

    #[test]
    fn test_long_recombinants_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("longRecs.log");
        write_long_recombinants(&path, &["a".to_string(), "b c".to_string()], "rectriplet x.fasta").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let names: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(names, ["a", "b c"]);
        assert!(text.starts_with("# Command: rectriplet x.fasta\n"));
    }

    #[test]
    fn test_skipped_triplets_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/skipped.log");
        let log = SkippedTripletLog::create(&path, b'\t').unwrap();
        // the file exists before any row arrives
        assert!(path.exists());
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let log = &log;
                scope.spawn(move || {
                    let row = [format!("d{}", worker), "m".into(), "c".into(), "700".into(), "650".into(), "40".into()];
                    log.record(&row).unwrap();
                });
            }
        });
        assert_eq!(log.finish().unwrap(), 4);
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines[0], "d0\tm\tc\t700\t650\t40");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_skipped_triplets_unwritable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(SkippedTripletLog::create(&blocker.join("skipped.log"), b'\t').is_err());
    }

    #[test]
    fn test_histogram_failure_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // a regular file cannot be a parent directory
        assert!(!write_histogram(&blocker.join("pvalHist.log"), &PValueHistogram::new(3), 10));
        assert!(write_histogram(&tmp.path().join("pvalHist.log"), &PValueHistogram::new(3), 10));
    }
}
