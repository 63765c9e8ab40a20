// main.rs - CLI entry point

use log::LevelFilter;

use rectriplet::pipeline::{self, DetectionRun};
use rectriplet::prelude::*;

fn main() {
    if let Err(e) = run_main() {
        eprintln!("❌ ERROR: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &Args) {
    let filter_level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still overrides the command line level
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .parse_default_env()
        .init();
}

fn run_main() -> Result<(), RecError> {
    let mut args: Args = argh::from_env();
    let command_line = std::env::args().collect::<Vec<String>>().join(" ");

    // Handle generate config first
    if args.generate_config {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        println!("\n💡 Save this content to a .toml file and use --config /path/to/config.toml");
        return Ok(());
    }

    // Load configuration file if specified
    if let Some(config_path) = args.config.clone() {
        args = args.with_config_file(&config_path)?;
    }

    init_logging(&args);

    match validate_args(&args)? {
        RunPlan::GenerateTable { path, size } => {
            println!("🚀 {}", rectriplet::get_info());
            pipeline::generate_table(&path, size, !args.no_progress && !args.quiet)?;
        }
        RunPlan::Detect(plan) => {
            println!("🚀 {}", rectriplet::get_info());
            println!("🧵 Threads: {}", plan.settings.threads);
            println!("📂 Output directory: {}", plan.output.dir.display());

            let run = DetectionRun::prepare(*plan)?;
            println!(
                "🎯 {} triplets in the alignment, need an uncorrected p-value of {:.3e} to survive",
                run.triplet_counts().all,
                run.required_p_value()
            );

            let report = run.execute(&command_line)?;
            println!();
            report.print();
        }
    }

    Ok(())
}
