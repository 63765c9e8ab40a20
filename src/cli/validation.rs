// validation.rs - Turn merged arguments into a typed run plan

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::args::Args;
use crate::core::{BreakpointMode, DetectionSettings, StorageMode, TableSize};
use crate::error::RecError;

/// What to read and how to filter the alignment before a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSettings {
    pub parents: PathBuf,
    pub children: Option<PathBuf>,
    pub read_limit: Option<usize>,
    pub use_all_sites: bool,
    pub remove_identical_sequences: bool,
    pub min_identical_distance: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub simplified: bool,
    pub delimiter: u8,
    pub write_skipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPlan {
    pub ptable: PathBuf,
    pub input: InputSettings,
    pub output: OutputSettings,
    pub settings: DetectionSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunPlan {
    GenerateTable { path: PathBuf, size: TableSize },
    Detect(Box<DetectionPlan>),
}

fn existing_path(value: &str, what: &str) -> Result<PathBuf, RecError> {
    let path = PathBuf::from(value);
    if !path.exists() {
        return Err(RecError::Config(format!("{} '{}' does not exist", what, value)));
    }
    Ok(path)
}

/// Validate all command line arguments
pub fn validate_args(args: &Args) -> Result<RunPlan, RecError> {
    if args.verbose && args.quiet {
        return Err(RecError::Config("--verbose and --quiet are mutually exclusive".to_string()));
    }

    if let Some(path) = &args.generate_ptable {
        let size = args
            .table_size
            .ok_or_else(|| RecError::Config("--generate-ptable requires --table-size".to_string()))?;
        if size < 2 {
            return Err(RecError::Config(format!("table size must be at least 2 (got {})", size)));
        }
        return Ok(RunPlan::GenerateTable {
            path: PathBuf::from(path),
            size: TableSize::cubic(size),
        });
    }

    let parents = args
        .parents
        .as_deref()
        .ok_or_else(|| RecError::Config("--parents is required".to_string()))?;
    let parents = existing_path(parents, "parent input")?;
    let children = args
        .children
        .as_deref()
        .map(|c| existing_path(c, "child input"))
        .transpose()?;
    let ptable = args
        .ptable
        .as_deref()
        .ok_or_else(|| RecError::Config("--ptable is required (create one with --generate-ptable)".to_string()))?;
    let ptable = existing_path(ptable, "p-value table")?;

    let defaults = DetectionSettings::default();

    let threads = args.threads.unwrap_or(defaults.threads);
    if threads == 0 {
        return Err(RecError::Config("thread count must be at least 1".to_string()));
    }
    let reject_threshold = args.reject_threshold.unwrap_or(defaults.reject_threshold);
    if reject_threshold.is_nan() || reject_threshold <= 0.0 || reject_threshold > 1.0 {
        return Err(RecError::Config(format!(
            "reject threshold must be in (0, 1] (got {})",
            reject_threshold
        )));
    }
    let bonferroni_below = args.bonferroni_below.unwrap_or(defaults.bonferroni_below);
    if !(0.0..1.0).contains(&bonferroni_below) {
        return Err(RecError::Config(format!(
            "Bonferroni cutoff must be in [0, 1) (got {})",
            bonferroni_below
        )));
    }
    let time_threshold_secs = args.time_threshold.unwrap_or(defaults.time_threshold_secs);
    if time_threshold_secs < 0 {
        return Err(RecError::Config("time threshold cannot be negative".to_string()));
    }
    let histogram_size = args.histogram_size.unwrap_or(defaults.histogram_size);
    if histogram_size == 0 {
        return Err(RecError::Config("histogram size must be at least 1".to_string()));
    }
    let update_interval = match args.update_interval {
        Some(0) => return Err(RecError::Config("update interval must be at least 1 second".to_string())),
        Some(secs) => Duration::from_secs(secs),
        None => defaults.update_interval,
    };
    let delimiter = match args.delimiter {
        None => b',',
        Some(c) if c.is_ascii() && c != '"' && c != '\n' => c as u8,
        Some(c) => return Err(RecError::Config(format!("invalid delimiter {:?}", c))),
    };

    let settings = DetectionSettings {
        threads,
        reject_threshold,
        bonferroni_below,
        min_long_recombinant_length: args.min_long_length.unwrap_or(defaults.min_long_recombinant_length),
        accept_approximate: !args.no_approximation,
        storage_mode: if args.all_triplets {
            StorageMode::AllTriplets
        } else {
            StorageMode::BestTriplet
        },
        breakpoints: args.breakpoints.unwrap_or(BreakpointMode::Best),
        use_header_dates: args.use_header_dates,
        time_threshold_secs,
        update_interval,
        histogram_size,
        show_progress: !args.no_progress && !args.quiet,
    };

    Ok(RunPlan::Detect(Box::new(DetectionPlan {
        ptable,
        input: InputSettings {
            parents,
            children,
            read_limit: args.read_limit,
            use_all_sites: args.use_all_sites,
            remove_identical_sequences: args.remove_identical,
            min_identical_distance: args.min_identical_distance.unwrap_or(0),
        },
        output: OutputSettings {
            dir: args
                .output_dir
                .as_deref()
                .map_or_else(|| Path::new(".").to_path_buf(), PathBuf::from),
            simplified: !args.full_output,
            delimiter,
            write_skipped: args.write_skipped,
        },
        settings,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_args(dir: &Path) -> Args {
        let parents = dir.join("aln.fasta");
        let ptable = dir.join("t.bin");
        std::fs::write(&parents, ">a\nACGT\n").unwrap();
        std::fs::write(&ptable, b"").unwrap();
        Args {
            parents: Some(parents.display().to_string()),
            ptable: Some(ptable.display().to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_plan() {
        let args = Args {
            generate_ptable: Some("t.bin".to_string()),
            table_size: Some(50),
            ..Default::default()
        };
        assert_eq!(
            validate_args(&args).unwrap(),
            RunPlan::GenerateTable {
                path: PathBuf::from("t.bin"),
                size: TableSize::cubic(50)
            }
        );

        let too_small = Args {
            table_size: Some(1),
            ..args
        };
        assert!(matches!(validate_args(&too_small), Err(RecError::Config(_))));
    }

    #[test]
    fn test_detect_plan_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let RunPlan::Detect(plan) = validate_args(&detect_args(dir.path())).unwrap() else {
            panic!("expected a detection plan");
        };
        assert_eq!(plan.settings.reject_threshold, 0.05);
        assert_eq!(plan.settings.bonferroni_below, 1e-15);
        assert!(!plan.output.write_skipped);
        assert_eq!(plan.settings.min_long_recombinant_length, 100);
        assert_eq!(plan.settings.breakpoints, BreakpointMode::Best);
        assert!(plan.settings.accept_approximate);
        assert!(plan.output.simplified);
        assert_eq!(plan.output.delimiter, b',');
        assert_eq!(plan.output.dir, PathBuf::from("."));
        assert_eq!(plan.input.children, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let base = detect_args(dir.path());

        let missing = Args {
            children: Some(dir.path().join("absent.fasta").display().to_string()),
            ..detect_args(dir.path())
        };
        assert!(validate_args(&missing).is_err());

        let threshold = Args {
            reject_threshold: Some(0.0),
            ..detect_args(dir.path())
        };
        assert!(validate_args(&threshold).is_err());

        let cutoff = Args {
            bonferroni_below: Some(1.0),
            ..detect_args(dir.path())
        };
        assert!(validate_args(&cutoff).is_err());

        let threads = Args {
            threads: Some(0),
            ..detect_args(dir.path())
        };
        assert!(validate_args(&threads).is_err());

        let no_table = Args { ptable: None, ..base };
        assert!(validate_args(&no_table).is_err());
    }
}
