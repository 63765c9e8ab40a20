// detection.rs - Scan determinism, breakpoint invariants and a full run from a config file

use std::sync::Arc;

use rectriplet::cli::{validate_args, Args, RunPlan};
use rectriplet::core::{
    BreakpointMode, Correction, DetectionSettings, PValueTable, RecombinationScan, TableSize, Triplet,
};
use rectriplet::data::{Alignment, RecombinantType, Sequence};
use rectriplet::output::SkippedTripletLog;
use rectriplet::pipeline::{self, DetectionRun};

const SITES: usize = 90;
const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Small linear congruential generator so the alignment is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn mutate(rng: &mut Lcg, base: &[u8], mutations: usize) -> Vec<u8> {
    let mut residues = base.to_vec();
    for _ in 0..mutations {
        let site = rng.below(residues.len());
        residues[site] = BASES[(BASES.iter().position(|&b| b == residues[site]).unwrap_or(0) + 1 + rng.below(3)) % 4];
    }
    residues
}

/// Clonal lineages plus a few mosaics of two lineages.
fn synthetic_records() -> Vec<(String, Vec<u8>)> {
    let mut rng = Lcg(0x5eed);
    let root: Vec<u8> = (0..SITES).map(|_| BASES[rng.below(4)]).collect();
    let clade_a = mutate(&mut rng, &root, 25);
    let clade_b = mutate(&mut rng, &root, 25);

    let mut records = Vec::new();
    for i in 0..5 {
        records.push((format!("a{}", i), mutate(&mut rng, &clade_a, 2)));
        records.push((format!("b{}", i), mutate(&mut rng, &clade_b, 2)));
    }
    for (i, cut) in [30usize, 45, 60].into_iter().enumerate() {
        let mut mosaic = clade_a[..cut].to_vec();
        mosaic.extend_from_slice(&clade_b[cut..]);
        records.push((format!("mosaic{}", i), mosaic));
    }
    records
}

fn fresh_alignment() -> Alignment {
    let sequences = synthetic_records()
        .into_iter()
        .map(|(name, residues)| Sequence::new(name, &residues))
        .collect();
    Alignment::new(sequences, None, false).unwrap()
}

fn table() -> PValueTable {
    PValueTable::generate(TableSize::cubic(SITES), false).unwrap()
}

type RunSignature = (Vec<(String, String, String)>, Vec<(String, RecombinantType)>, Option<f64>);

fn run_with_threads(table: &PValueTable, threads: usize) -> RunSignature {
    // classifications live on the sequences, so every run gets its own
    let alignment = fresh_alignment();
    let correction = Correction::new(alignment.triplet_counts().all as f64);
    let settings = DetectionSettings {
        threads,
        min_long_recombinant_length: 20,
        ..Default::default()
    };
    let scan = RecombinationScan::new(table, settings, correction);
    let outcome = scan
        .run(&alignment.active_parents(), &alignment.active_children())
        .unwrap();

    let retained = outcome
        .triplets
        .iter()
        .map(|t| (t.dad().name().to_string(), t.mum().name().to_string(), t.child().name().to_string()))
        .collect();
    let classes = alignment
        .active_children()
        .iter()
        .map(|s| (s.name().to_string(), s.recombinant_type()))
        .collect();
    (retained, classes, outcome.min_p_value)
}

#[test]
fn test_results_do_not_depend_on_thread_count() {
    let table = table();
    let single = run_with_threads(&table, 1);
    assert!(!single.0.is_empty(), "the mosaics should be detected");
    assert!(single
        .1
        .iter()
        .any(|(name, kind)| name.starts_with("mosaic") && *kind != RecombinantType::NotRecombinant));

    for threads in [2, 8] {
        let other = run_with_threads(&table, threads);
        assert_eq!(single.0, other.0, "retained triplets with {} threads", threads);
        assert_eq!(single.1, other.1, "classifications with {} threads", threads);
        assert_eq!(single.2, other.2, "minimum p-value with {} threads", threads);
    }
}

#[test]
fn test_breakpoint_pairs_span_the_max_descent() {
    let table = table();
    let alignment = fresh_alignment();
    let parents = alignment.active_parents();
    let find = |name: &str| -> Arc<Sequence> {
        Arc::clone(parents.iter().find(|s| s.name() == name).unwrap())
    };

    let mut checked = 0;
    for child in ["mosaic0", "mosaic1", "mosaic2", "a3"] {
        for (dad, mum) in [("a0", "b0"), ("b1", "a1"), ("a2", "b4")] {
            let mut triplet = Triplet::new(find(child), find(dad), find(mum), &table, true);
            triplet.localize_breakpoints(10);
            let k = triplet.walk().max_descent() as i64;
            for pair in triplet.breakpoint_pairs() {
                assert_eq!(pair.left.height - pair.right.height, k);
                assert!(pair.left.right_bound < pair.right.left_bound);
                checked += 1;
            }
        }
    }
    assert!(checked > 0);
}

#[test]
fn test_skipped_log_matches_not_computed_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skippedTriplets.log");
    // most walks of 90 sites fall outside a 10-step table
    let small = PValueTable::generate(TableSize::cubic(10), false).unwrap();
    let alignment = fresh_alignment();
    let settings = DetectionSettings {
        threads: 4,
        accept_approximate: false,
        ..Default::default()
    };
    let log = SkippedTripletLog::create(&path, b'\t').unwrap();
    let scan = RecombinationScan::new(&small, settings, Correction::new(alignment.triplet_counts().all as f64))
        .with_skipped_sink(&log);
    let outcome = scan
        .run(&alignment.active_parents(), &alignment.active_children())
        .unwrap();
    let written = log.finish().unwrap();

    assert!(outcome.counts.not_computed > 0);
    assert_eq!(written, outcome.counts.not_computed);
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count() as u64, outcome.counts.not_computed);
    assert!(text.lines().all(|line| line.split('\t').count() == 6));
}

#[test]
fn test_run_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let fasta: String = synthetic_records()
        .into_iter()
        .map(|(name, residues)| format!(">{}\n{}\n", name, String::from_utf8(residues).unwrap()))
        .collect();
    let alignment_path = dir.path().join("aln.fasta");
    std::fs::write(&alignment_path, fasta).unwrap();

    let table_path = dir.path().join("ptable.bin");
    pipeline::generate_table(&table_path, TableSize::cubic(SITES), false).unwrap();

    let config_path = dir.path().join("run.toml");
    std::fs::write(
        &config_path,
        format!(
            "parents = {:?}\nptable = {:?}\noutput_dir = {:?}\nthreads = 3\nmin_long_length = 20\nbreakpoints = \"all\"\nwrite_skipped = true\ndelimiter = \";\"\nbonferroni_below = 1e-9\n",
            alignment_path.display().to_string(),
            table_path.display().to_string(),
            dir.path().join("out").display().to_string(),
        ),
    )
    .unwrap();

    let args = Args {
        no_progress: true,
        ..Default::default()
    }
    .with_config_file(config_path.to_str().unwrap())
    .unwrap();
    let RunPlan::Detect(plan) = validate_args(&args).unwrap() else {
        panic!("expected a detection plan");
    };
    assert_eq!(plan.settings.breakpoints, BreakpointMode::All);
    assert_eq!(plan.output.delimiter, b';');
    assert!(plan.output.write_skipped);

    let run = DetectionRun::prepare(*plan).unwrap();
    assert_eq!(run.correction().bonferroni_below(), 1e-9);
    let report = run.execute("rectriplet --config run.toml").unwrap();
    assert!(report.outcome.counts.recombinant_triplets > 0);
    assert_eq!(report.outcome.counts.computed(), report.triplet_counts.active);

    let out = dir.path().join("out");
    let results = std::fs::read_to_string(out.join("results.csv")).unwrap();
    assert!(results.starts_with("Parent1;Parent2;Child;"));
    assert!(out.join("longRecs.log").exists());
    assert!(out.join("skippedTriplets.log").exists());
    let histogram = std::fs::read_to_string(out.join("pvalHist.log")).unwrap();
    assert_eq!(histogram.lines().count(), 41);
}
