// inspector.rs - P-value table inspector
// Features: table summary, integrity checks, single key lookups, per-walk dumps

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use argh::FromArgs;

use rectriplet::core::{siegmund_discrete_approx, PValueTable};

// Values are stored as f32, so neighbouring keys may differ by rounding noise
const MONOTONE_TOLERANCE: f64 = 1e-6;

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(FromArgs)]
/// Inspect rectriplet p-value table files
struct Args {
    /// path to the p-value table file
    #[argh(option)]
    table: String,

    /// validate value ranges and monotonicity in k
    #[argh(switch)]
    validate: bool,

    /// look up one key (format: m,n,k)
    #[argh(option)]
    query: Option<String>,

    /// print P(m, n, k) for every k of one walk (format: m,n)
    #[argh(option)]
    show_walk: Option<String>,

    /// export the values of every stored key to a TSV file
    #[argh(option)]
    export: Option<String>,

    /// quiet mode - minimal output
    #[argh(switch)]
    quiet: bool,
}

// ============================================================================
// ANALYSIS
// ============================================================================

fn parse_key<const N: usize>(value: &str) -> Result<[usize; N], String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid key '{}': {}", value, e))?;
    parts
        .try_into()
        .map_err(|_| format!("key '{}' must have {} comma-separated values", value, N))
}

fn print_overview(table: &PValueTable) {
    let size = table.size();
    println!("\n=== TABLE SUMMARY ===");
    println!("Dimensions (m * n * k): {}", size);
    println!("Stored values: {}", table.len());
    println!("Estimated memory: ~{} MB", PValueTable::estimate_memory_mb(size));
    println!(
        "Storable keys for these bounds: {}",
        PValueTable::storable_key_count(size)
    );
}

fn query_key(table: &PValueTable, key: &str) -> Result<(), String> {
    let [m, n, k] = parse_key::<3>(key)?;
    println!("\n=== KEY ({}, {}, {}) ===", m, n, k);
    match table.exact(m, n, k) {
        Some(p_value) => println!("Exact: {:.6e}", p_value),
        None => println!(
            "Outside table bounds, Hogan-Siegmund approximation: {:.6e}",
            siegmund_discrete_approx(m, n, k)
        ),
    }
    Ok(())
}

fn show_walk(table: &PValueTable, walk: &str) -> Result<(), String> {
    let [m, n] = parse_key::<2>(walk)?;
    println!("\n=== WALK m={} n={} ===", m, n);
    println!("     k      P(m, n, k)  source");
    for k in 0..=n + 1 {
        match table.exact(m, n, k) {
            Some(p_value) => {
                let source = if table.key_index(m, n, k).is_some() {
                    "stored"
                } else {
                    "analytic"
                };
                println!("{:>6}  {:>14.6e}  {}", k, p_value, source);
            }
            None => println!(
                "{:>6}  {:>14.6e}  approximated",
                k,
                siegmund_discrete_approx(m, n, k)
            ),
        }
    }
    Ok(())
}

fn validate_table(table: &PValueTable) -> bool {
    println!("\n=== TABLE VALIDATION ===");

    let mut out_of_range = 0usize;
    let mut not_monotone = 0usize;
    let mut previous: Option<((usize, usize, usize), f64)> = None;

    for (m, n, k) in table.stored_keys() {
        let Some(p_value) = table.exact(m, n, k) else {
            continue;
        };
        if !(0.0..=1.0).contains(&p_value) {
            if out_of_range < 5 {
                println!("❌ ERROR: P({}, {}, {}) = {} is not a probability", m, n, k, p_value);
            }
            out_of_range += 1;
        }
        // stored_keys yields k in increasing order for each (m, n)
        if let Some(((pm, pn, _), prev_p)) = previous {
            if pm == m && pn == n && p_value > prev_p + MONOTONE_TOLERANCE {
                if not_monotone < 5 {
                    println!(
                        "⚠️  WARNING: P({}, {}, {}) = {:.6e} exceeds the value at k - 1 ({:.6e})",
                        m, n, k, p_value, prev_p
                    );
                }
                not_monotone += 1;
            }
        }
        previous = Some(((m, n, k), p_value));
    }

    if out_of_range == 0 && not_monotone == 0 {
        println!("✅ Table validation passed - no issues found");
        true
    } else {
        println!(
            "❌ Table validation failed: {} values out of range, {} monotonicity violations",
            out_of_range, not_monotone
        );
        false
    }
}

fn export_values(table: &PValueTable, output_path: &str) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(output_path)?);
    writeln!(file, "# rectriplet p-value table export")?;
    writeln!(file, "# Dimensions: {}", table.size())?;
    writeln!(file, "m\tn\tk\tp_value")?;
    for (m, n, k) in table.stored_keys() {
        if let Some(p_value) = table.exact(m, n, k) {
            writeln!(file, "{}\t{}\t{}\t{:.8e}", m, n, k, p_value)?;
        }
    }
    file.flush()?;
    println!("✅ Values exported to: {}", output_path);
    Ok(())
}

// ============================================================================
// MAIN FUNCTION
// ============================================================================

fn main() {
    let args: Args = argh::from_env();

    if !args.quiet {
        println!("🔍 rectriplet P-value Table Inspector");
        println!("=====================================");
    }

    let table_path = Path::new(&args.table);
    let table = match PValueTable::load(table_path) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("❌ ERROR loading table {}: {}", table_path.display(), e);
            std::process::exit(1);
        }
    };

    if !args.quiet {
        print_overview(&table);
    }

    if let Some(key) = &args.query {
        if let Err(e) = query_key(&table, key) {
            eprintln!("❌ ERROR: {}", e);
            std::process::exit(1);
        }
    }

    if let Some(walk) = &args.show_walk {
        if let Err(e) = show_walk(&table, walk) {
            eprintln!("❌ ERROR: {}", e);
            std::process::exit(1);
        }
    }

    if args.validate && !validate_table(&table) {
        std::process::exit(1);
    }

    if let Some(export_path) = &args.export {
        if let Err(e) = export_values(&table, export_path) {
            eprintln!("❌ ERROR exporting values: {}", e);
            std::process::exit(1);
        }
    }

    if !args.quiet {
        println!("\n✅ Table inspection completed successfully");
        println!("\nUsage examples:");
        println!("  --query 120,95,30                    Look up one key");
        println!("  --show-walk 40,40                    Print every k for one walk");
        println!("  --validate                           Check ranges and monotonicity");
        println!("  --export values.tsv                  Export all stored values");
        println!("  --quiet                              Minimal output mode");
    }
}
