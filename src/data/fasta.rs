// fasta.rs - Aligned sequence loading from FASTA files or directories

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bio::io::fasta;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use super::sequence::Sequence;
use crate::error::RecError;

const FASTA_EXTENSIONS: [&str; 4] = ["fasta", "fa", "fas", "fna"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// Stop after this many sequences.
    pub limit: Option<usize>,
    /// Drop sequences whose name carries no collection date.
    pub require_dates: bool,
    pub show_progress: bool,
}

/// Read every sequence from a multi-FASTA file, or from all FASTA files in a directory.
pub fn read_sequences(path: &Path, options: &ReadOptions) -> Result<Vec<Sequence>, RecError> {
    let mut sequences = if path.is_dir() {
        read_directory(path, options)?
    } else {
        let mut sequences = Vec::new();
        read_file(path, options.limit, &mut sequences)?;
        sequences
    };

    if options.require_dates {
        let before = sequences.len();
        sequences.retain(|s| s.date().is_some());
        let dropped = before - sequences.len();
        if dropped > 0 {
            warn!("Ignoring {} sequences without a collection date in {}", dropped, path.display());
        }
    }

    info!("Read {} sequences from {}", sequences.len(), path.display());
    Ok(sequences)
}

fn fasta_files(dir: &Path) -> Result<Vec<PathBuf>, RecError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| RecError::io(e, dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| FASTA_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_directory(dir: &Path, options: &ReadOptions) -> Result<Vec<Sequence>, RecError> {
    let files = fasta_files(dir)?;
    if files.is_empty() {
        return Err(RecError::Sequence(format!("no FASTA files found in {}", dir.display())));
    }

    let pb = if options.show_progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap(),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut sequences = Vec::new();
    for file in &files {
        let remaining = options.limit.map(|limit| limit.saturating_sub(sequences.len()));
        if remaining == Some(0) {
            break;
        }
        read_file(file, remaining, &mut sequences)?;
        pb.inc(1);
        pb.set_message(format!("{} sequences", sequences.len()));
    }
    pb.finish_and_clear();
    Ok(sequences)
}

/// Append up to `limit` records of one FASTA file to `sequences`.
fn read_file(path: &Path, limit: Option<usize>, sequences: &mut Vec<Sequence>) -> Result<(), RecError> {
    let file = File::open(path).map_err(|e| RecError::io(e, path))?;
    let reader = fasta::Reader::new(BufReader::new(file));

    for (read, record) in reader.records().enumerate() {
        if limit.is_some_and(|limit| read >= limit) {
            break;
        }
        let record = record
            .map_err(|e| RecError::Sequence(format!("invalid FASTA record in {}: {}", path.display(), e)))?;
        let name = match record.desc() {
            Some(desc) => format!("{} {}", record.id(), desc),
            None => record.id().to_string(),
        };
        sequences.push(Sequence::new(name, record.seq()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FASTA: &str = ">s1 Italy/2021-03-15\nACGT\nACGT\n>s2\nAC-T\nNNGT\n>s3 2020_01_02\nACGU\nACGT\n";

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aln.fasta");
        std::fs::write(&path, FASTA).unwrap();

        let sequences = read_sequences(&path, &ReadOptions::default()).unwrap();
        assert_eq!(sequences.len(), 3);
        assert_eq!(sequences[0].name(), "s1 Italy/2021-03-15");
        assert_eq!(sequences[0].date(), NaiveDate::from_ymd_opt(2021, 3, 15));
        assert_eq!(sequences[1].to_active_string(), "AC-T--GT");
        assert_eq!(sequences[2].to_active_string(), "ACGTACGT");
    }

    #[test]
    fn test_limit_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aln.fa");
        std::fs::write(&path, FASTA).unwrap();

        let limited = ReadOptions {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(read_sequences(&path, &limited).unwrap().len(), 2);

        let dated = ReadOptions {
            require_dates: true,
            ..Default::default()
        };
        let names: Vec<String> = read_sequences(&path, &dated)
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, ["s1 Italy/2021-03-15", "s3 2020_01_02"]);
    }

    #[test]
    fn test_read_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.FASTA"), ">b\nACGT\n").unwrap();
        std::fs::write(dir.path().join("a.fasta"), ">a\nTTTT\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sequences = read_sequences(dir.path(), &ReadOptions::default()).unwrap();
        let names: Vec<&str> = sequences.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["a", "b"]);

        let one = ReadOptions {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(read_sequences(dir.path(), &one).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_sequences(dir.path(), &ReadOptions::default()),
            Err(RecError::Sequence(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_sequences(&dir.path().join("absent.fasta"), &ReadOptions::default());
        assert!(matches!(result, Err(RecError::Io { .. })));
    }
}
