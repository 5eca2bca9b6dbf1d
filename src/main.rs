use anyhow::{Context, Result};
use bom_linkage::config::RunConfig;
use bom_linkage::pipeline::{self, format_elapsed, PipelineOptions};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use time::macros::format_description;

#[derive(Parser, Clone)]
#[command(name = "Bills of Mortality Linkage Runner")]
#[command(about = "Resolves parishes, periods and observations across Bills of Mortality transcriptions defined in a run configuration.")]
#[command(version = "0.1.0")]
struct Cli {
    #[arg(long, help = "Path to the run configuration YAML file", required = true)]
    run_config: PathBuf,
    #[arg(short, long, help = "Output directory for CSV files", required = true)]
    output: String,
    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,
    #[arg(short, long, default_value = "0", help = "Number of threads used for loading (0 for auto)")]
    threads: usize,
    #[arg(short, long, default_value = "10000", help = "Observation rows per batch sent to the writer thread")]
    batch_size: usize,
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => { eprintln!("Invalid log level '{}', defaulting to INFO.", cli.log_level); LevelFilter::Info }
    };
    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    info!("Starting Bills of Mortality linkage run");

    let output_dir = PathBuf::from(&cli.output);
    fs::create_dir_all(&output_dir).with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    info!("Output directory: {}", output_dir.display());

    info!("Loading run configuration from: {}", cli.run_config.display());
    let run_config = RunConfig::load(&cli.run_config)?;
    info!("Run config loaded: {} sources.", run_config.sources.len());

    let num_threads = if cli.threads == 0 {
        let cores = num_cpus::get();
        info!("Auto-detected {} CPU cores. Using {} threads.", cores, cores);
        cores
    } else {
        info!("Using specified {} threads.", cli.threads);
        cli.threads
    };
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
        error!("Failed to build global thread pool: {}. Proceeding with default.", e);
    }

    let options = PipelineOptions {
        output_dir,
        batch_size: cli.batch_size,
        channel_capacity: (num_threads * 2).max(16),
        show_progress: true,
    };
    let summary = match pipeline::run(&run_config, &options) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Run failed: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Files found: {}, tables loaded: {}", summary.files_found, summary.tables_loaded);
    info!("Parishes: {}, periods: {}, years: {}", summary.parishes, summary.periods, summary.years);
    info!("Observations emitted: {}", summary.observations);
    summary.audit.log_summary();
    info!("Total rows written per table:");
    for (table_name, count) in &summary.rows_written {
        info!("  - {}.csv: {}", table_name, count);
    }
    info!("Linkage run finished.");
    info!("-------------------------------------------------------");

    if !summary.audit.sources_skipped.is_empty() {
        warn!("{} sources were skipped; see audit.json for reasons.", summary.audit.sources_skipped.len());
    }
    Ok(())
}
