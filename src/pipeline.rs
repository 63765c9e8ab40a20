// pipeline.rs - Table generation and detection runs from a validated plan

use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::cli::{DetectionPlan, InputSettings};
use crate::core::{BreakpointMode, Correction, DetectionOutcome, PValueTable, RecombinationScan, TableSize};
use crate::data::{read_sequences, Alignment, ReadOptions, TripletCounts};
use crate::error::RecError;
use crate::output::{self, OutputDir, SkippedTripletLog};

/// Build a `size` table and save it to `path`, replacing any existing file.
pub fn generate_table(path: &Path, size: TableSize, show_progress: bool) -> Result<PValueTable, RecError> {
    let estimate = PValueTable::estimate_memory_mb(size);
    println!("🧮 Generating {} p-value table", size);
    println!("   💾 Table size: ~{} MB (generation needs ~{} MB)", estimate, estimate * 2);

    let start = Instant::now();
    let table = PValueTable::generate(size, show_progress)?;
    output::ensure_parent_dir(path)?;
    table.save(path)?;

    println!(
        "✅ Stored {} values in {} ({:.2}s)",
        table.len(),
        path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(table)
}

/// Load a table file, attaching the path to any failure.
pub fn load_table(path: &Path) -> Result<PValueTable, RecError> {
    let start = Instant::now();
    let table = PValueTable::load(path).map_err(|source| RecError::PTable {
        source,
        path: path.to_path_buf(),
    })?;
    info!(
        "Loaded {} p-value table ({} values) in {:.2}s",
        table.size(),
        table.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(table)
}

/// Read the inputs and apply column and sequence filters.
pub fn load_alignment(input: &InputSettings, use_header_dates: bool, show_progress: bool) -> Result<Alignment, RecError> {
    let parent_options = ReadOptions {
        limit: input.read_limit,
        require_dates: use_header_dates,
        show_progress,
    };
    let parents = read_sequences(&input.parents, &parent_options)?;
    let children = input
        .children
        .as_deref()
        .map(|path| {
            let options = ReadOptions {
                require_dates: false,
                ..parent_options
            };
            read_sequences(path, &options)
        })
        .transpose()?;

    let mut alignment = Alignment::new(parents, children, input.use_all_sites)?;

    if input.remove_identical_sequences {
        if input.min_identical_distance > 0 {
            info!("Removing neighbour sequences (distance <= {})", input.min_identical_distance);
        } else {
            info!("Removing non-distinct sequences");
        }
        let before = alignment.parent_pool().used_count();
        alignment
            .parent_pool_mut()
            .exclude_neighboring_sequences(input.min_identical_distance);
        info!(
            "Excluded {} parent sequences",
            before - alignment.parent_pool().used_count()
        );
    }

    Ok(alignment)
}

/// A detection run with its inputs loaded, ready to scan.
pub struct DetectionRun {
    plan: DetectionPlan,
    table: PValueTable,
    alignment: Alignment,
    triplet_counts: TripletCounts,
    correction: Correction,
}

impl DetectionRun {
    pub fn prepare(plan: DetectionPlan) -> Result<Self, RecError> {
        let settings = &plan.settings;
        let alignment = load_alignment(&plan.input, settings.use_header_dates, settings.show_progress)?;
        alignment.log_summary();
        let table = load_table(&plan.ptable)?;

        let triplet_counts = alignment.triplet_counts();
        if triplet_counts.active == 0 {
            warn!("No triplet can be formed from the active sequences");
        }
        let correction = Correction::new(triplet_counts.all as f64).with_bonferroni_below(settings.bonferroni_below);

        Ok(Self {
            plan,
            table,
            alignment,
            triplet_counts,
            correction,
        })
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub fn table(&self) -> &PValueTable {
        &self.table
    }

    pub fn triplet_counts(&self) -> TripletCounts {
        self.triplet_counts
    }

    pub fn correction(&self) -> Correction {
        self.correction
    }

    /// Uncorrected p-value a triplet needs to be called recombinant.
    pub fn required_p_value(&self) -> f64 {
        self.correction.required_p_value(self.plan.settings.reject_threshold)
    }

    /// Scan every triplet and write the result files.
    pub fn execute(&self, command_line: &str) -> Result<RunReport, RecError> {
        let settings = &self.plan.settings;
        let output_settings = &self.plan.output;
        let output = OutputDir::create(&output_settings.dir)?;

        let parents = self.alignment.active_parents();
        let children = self.alignment.active_children();
        println!(
            "🧬 Using {} sequences as parents and {} as children",
            parents.len(),
            children.len()
        );

        let skipped_log = if output_settings.write_skipped {
            Some(SkippedTripletLog::create(&output.skipped_triplets(), b'\t')?)
        } else {
            None
        };
        let mut scan = RecombinationScan::new(&self.table, settings.clone(), self.correction);
        if let Some(log) = &skipped_log {
            scan = scan.with_skipped_sink(log);
        }
        let outcome = scan.run(&parents, &children)?;
        if let Some(log) = skipped_log {
            log.finish()?;
        }

        output::write_results(
            &output.results(),
            &outcome.triplets,
            &self.correction,
            output_settings.simplified,
            output_settings.delimiter,
        )?;
        if settings.breakpoints != BreakpointMode::None {
            output::write_long_recombinants(&output.long_recombinants(), &outcome.long_recombinants, command_line)?;
        }
        let histogram_saved = output::write_histogram(&output.histogram(), &outcome.histogram, self.triplet_counts.active);

        Ok(RunReport {
            triplet_counts: self.triplet_counts,
            correction: self.correction,
            breakpoints: settings.breakpoints,
            min_long_recombinant_length: settings.min_long_recombinant_length,
            use_header_dates: settings.use_header_dates,
            elapsed: outcome.elapsed,
            outcome,
            output,
            histogram_saved,
        })
    }
}

/// Figures printed after a detection run.
#[derive(Debug)]
pub struct RunReport {
    pub triplet_counts: TripletCounts,
    pub correction: Correction,
    pub outcome: DetectionOutcome,
    pub breakpoints: BreakpointMode,
    pub min_long_recombinant_length: usize,
    pub use_header_dates: bool,
    pub output: OutputDir,
    pub histogram_saved: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn print(&self) {
        let counts = &self.outcome.counts;
        println!("📊 Triples tested: {}", self.triplet_counts.active);
        println!("   ✅ Computed exactly: {}", counts.exact);
        println!("   〰️  Approximated (Hogan-Siegmund): {}", counts.approximated);
        println!("   ⏭️  Not computed: {}", counts.not_computed);
        println!("🔬 Recombinant triplets: {}", counts.recombinant_triplets);
        println!("🧬 Distinct recombinant sequences: {}", self.outcome.recombinant_children());

        if self.breakpoints != BreakpointMode::None {
            println!(
                "📏 Long recombinants (min length {}): {}",
                self.min_long_recombinant_length,
                self.outcome.long_recombinants.len()
            );
            println!(
                "📏 Longest short recombinant segment: {}",
                self.outcome.triplets.longest_min_length()
            );
        }
        if self.use_header_dates {
            println!("📅 Triplets skipped by collection date: {}", counts.skipped_by_time);
        }

        match self.outcome.min_p_value {
            Some(p) => {
                println!("📉 Rejection of the null hypothesis of clonal evolution:");
                println!("   Dunn-Sidak corrected p = {:.3e}", self.correction.dunn_sidak(p));
                println!("   Uncorrected p = {:.3e}", p);
                println!("   Bonferroni corrected p = {:.3e}", self.correction.bonferroni(p));
            }
            None => println!("📉 No triplet received a p-value"),
        }

        println!("⏱️  Scan completed in {:.2}s", self.elapsed.as_secs_f64());
        println!("✅ Results written to: {}", self.output.root().display());
        if !self.histogram_saved {
            println!("⚠️  The p-value histogram could not be saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputSettings;
    use crate::core::DetectionSettings;
    use crate::data::RecombinantType;

    const ALIGNMENT: &str = "\
>dad
AAAAAAAAAAAACCCCCCCCCCCC
>mum
CCCCCCCCCCCCAAAAAAAAAAAA
>child
AAAAAAAAAAAAAAAAAAAAAAAA
>copy
AAAAAAAAAAAACCCCCCCCCCCG
";

    fn plan(dir: &Path, table: &Path) -> DetectionPlan {
        let parents = dir.join("aln.fasta");
        std::fs::write(&parents, ALIGNMENT).unwrap();
        DetectionPlan {
            ptable: table.to_path_buf(),
            input: InputSettings {
                parents,
                children: None,
                read_limit: None,
                use_all_sites: false,
                remove_identical_sequences: false,
                min_identical_distance: 0,
            },
            output: OutputSettings {
                dir: dir.join("out"),
                simplified: true,
                delimiter: b',',
                write_skipped: false,
            },
            settings: DetectionSettings {
                threads: 2,
                min_long_recombinant_length: 10,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_generate_then_detect() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("tables/t.bin");
        generate_table(&table_path, TableSize::cubic(24), false).unwrap();

        let run = DetectionRun::prepare(plan(dir.path(), &table_path)).unwrap();
        assert_eq!(run.triplet_counts().all, 4 * 3 * 2);
        assert!((run.required_p_value() - 0.05 / 24.0).abs() < 1e-12);

        let report = run.execute("rectriplet --parents aln.fasta").unwrap();
        report.print();
        assert!(report.outcome.counts.recombinant_triplets >= 1);
        let child = run.alignment().parent_pool().find_by_name("child").unwrap();
        assert_eq!(child.recombinant_type(), RecombinantType::Long);

        let results = std::fs::read_to_string(dir.path().join("out/results.csv")).unwrap();
        assert!(results.lines().any(|l| l.contains(",child,")));
        let long = std::fs::read_to_string(dir.path().join("out/longRecs.log")).unwrap();
        assert!(long.lines().any(|l| l == "child"));
        assert!(report.histogram_saved);
    }

    #[test]
    fn test_remove_identical_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = plan(dir.path(), &dir.path().join("unused.bin"));
        p.input.remove_identical_sequences = true;
        p.input.min_identical_distance = 1;
        let alignment = load_alignment(&p.input, false, false).unwrap();
        // "copy" is one site away from "dad"; with equal gap counts the later one goes
        assert_eq!(alignment.parent_pool().used_count(), 3);
        assert_eq!(alignment.child_pool().used_count(), 4);
    }

    #[test]
    fn test_load_table_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.bin");
        std::fs::write(&path, b"not a table").unwrap();
        match load_table(&path) {
            Err(RecError::PTable { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other.map(|t| t.size())),
        }
    }
}
