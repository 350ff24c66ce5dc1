use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sensorbench::config::{BenchConfig, SAMPLE_COUNT_RANGE};
use sensorbench::device::{default_device_id, DeviceKind, Reading};
use sensorbench::engine::RunOutcome;
use sensorbench::session::Workbench;
use sensorbench::storage;

#[derive(Parser)]
#[command(
    name = "sensorbench",
    about = "Simulated sensor test bench: timed sampling, pass/fail analysis, JSON results",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported device types and their acceptance limits
    Devices {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Try to connect to a device once and report the result
    Connect {
        /// Device type: temperature or pressure
        #[arg(long, default_value = "temperature")]
        kind: DeviceKind,

        /// Device identifier (defaults to DEV-<timestamp>)
        #[arg(long)]
        id: Option<String>,
    },

    /// Connect a device, run a timed test and save the result
    Test {
        /// Device type: temperature or pressure
        #[arg(long, default_value = "temperature")]
        kind: DeviceKind,

        /// Device identifier (defaults to DEV-<timestamp>)
        #[arg(long)]
        id: Option<String>,

        /// Number of samples (5-20)
        #[arg(long, value_parser = clap::value_parser!(u32).range(5..=20))]
        samples: Option<u32>,

        /// Delay between samples in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Half-width of the random offset around the base value
        #[arg(long)]
        fluctuation: Option<f64>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Result file (defaults to <results_dir>/TestResult_<id>_<time>.json)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Do not write a result file
        #[arg(long, conflicts_with = "output")]
        no_save: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show a saved test result
    Show {
        /// Result file to load
        path: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Merge readings from saved results, ordered by time
    History {
        /// Result files (defaults to every JSON file in the results directory)
        paths: Vec<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = sensorbench::logging::bootstrap(BenchConfig::load_or_default);
    sensorbench::logging::init(&config.logging);
    sensorbench::logging::install_panic_hook();

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            report_fault(&e);
            ExitCode::FAILURE
        }
    }
}

/// Last-resort error reporting. The stderr line is written even when the log
/// sink is a file or is broken.
fn report_fault(e: &anyhow::Error) {
    tracing::error!(error = %format!("{:#}", e), "unhandled fault");
    eprintln!("Error: {:#}", e);
}

async fn run(cli: Cli, config: BenchConfig) -> Result<ExitCode> {
    match cli.command {
        Commands::Devices { json } => {
            print_devices(json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Connect { kind, id } => {
            let policy = config.simulation.failure_policy()?;
            let mut bench = Workbench::new(policy, sensorbench::make_rng(config.simulation.seed));
            let id = id.unwrap_or_else(default_device_id);
            if bench.connect(kind, &id)? {
                println!("Device {} connected", id);
                bench.disconnect()?;
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Device connection failed, please retry");
                Ok(ExitCode::from(2))
            }
        }
        Commands::Test {
            kind,
            id,
            samples,
            interval_ms,
            fluctuation,
            seed,
            output,
            no_save,
            json,
        } => {
            let opts = TestOptions {
                kind,
                id: id.unwrap_or_else(default_device_id),
                samples: samples.unwrap_or(config.sampling.sample_count),
                interval_ms: interval_ms.unwrap_or(config.sampling.interval_ms),
                fluctuation: fluctuation.or(config.simulation.fluctuation_range),
                seed: seed.or(config.simulation.seed),
                output: if no_save {
                    None
                } else {
                    Some(output.unwrap_or_else(|| config.storage.results_dir.clone()))
                },
                json,
            };
            run_test(&config, opts).await
        }
        Commands::Show { path, json } => {
            let result = storage::load(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.summary());
                println!(
                    "Started {}  Finished {}",
                    result.started_at.to_rfc3339(),
                    result.ended_at.to_rfc3339()
                );
                print_readings(&result.readings);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { paths } => {
            let paths = if paths.is_empty() {
                let dir = &config.storage.results_dir;
                storage::list_results(dir)
                    .with_context(|| format!("failed to list results in {}", dir.display()))?
            } else {
                paths
            };
            let readings = storage::load_many(&paths);
            print_readings(&readings);
            println!("Loaded {} historical reading(s) from {} file(s)", readings.len(), paths.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

struct TestOptions {
    kind: DeviceKind,
    id: String,
    samples: u32,
    interval_ms: u64,
    fluctuation: Option<f64>,
    seed: Option<u64>,
    /// A `.json` file, or a directory to place a default-named file in.
    output: Option<PathBuf>,
    json: bool,
}

async fn run_test(config: &BenchConfig, opts: TestOptions) -> Result<ExitCode> {
    if !SAMPLE_COUNT_RANGE.contains(&opts.samples) {
        anyhow::bail!("sample count must be between 5 and 20, got {}", opts.samples);
    }
    let sample_count = NonZeroUsize::new(opts.samples as usize).context("sample count must be positive")?;

    let policy = config.simulation.failure_policy()?;
    let mut bench = Workbench::new(policy, sensorbench::make_rng(opts.seed));

    eprintln!("Connecting {} device {}...", opts.kind, opts.id);
    if !bench.connect(opts.kind, &opts.id)? {
        println!("Device connection failed, please retry");
        return Ok(ExitCode::from(2));
    }
    bench.configure(Some(opts.interval_ms), opts.fluctuation)?;

    let total = sample_count.get();
    let quiet = opts.json;
    let cancel = bench.start_test(sample_count, move |r: &Reading, i| {
        if !quiet {
            println!("Collecting data... ({}/{})  {:.2} {}", i + 1, total, r.value, r.unit);
        }
    })?;

    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping test...");
            cancel.cancel();
        }
    });
    let outcome = bench.finish_test().await;
    stopper.abort();
    let outcome = outcome?;

    if opts.json {
        print_outcome_json(&outcome)?;
    } else {
        println!("{}", outcome.status_message());
        if let Some(result) = outcome.test_run() {
            println!("{}", result.summary());
        }
    }

    let code = match &outcome {
        RunOutcome::Completed(result) => {
            if let Some(output) = &opts.output {
                let path = result_path(output, result);
                bench.save_result(&path)?;
                eprintln!("Result saved to {}", path.display());
            }
            if result.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        RunOutcome::Cancelled { .. } => ExitCode::from(130),
        RunOutcome::Failed { .. } => ExitCode::from(2),
    };

    bench.disconnect()?;
    Ok(code)
}

fn result_path(output: &Path, result: &sensorbench::analysis::TestRun) -> PathBuf {
    if output.extension().is_some_and(|ext| ext == "json") {
        output.to_path_buf()
    } else {
        output.join(storage::default_file_name(result))
    }
}

fn print_outcome_json(outcome: &RunOutcome) -> Result<()> {
    let value = match outcome {
        RunOutcome::Completed(result) => serde_json::json!({
            "state": outcome.state().to_string(),
            "result": result,
        }),
        RunOutcome::Cancelled { readings } => serde_json::json!({
            "state": outcome.state().to_string(),
            "partial_readings": readings,
        }),
        RunOutcome::Failed { error, readings } => serde_json::json!({
            "state": outcome.state().to_string(),
            "error": error.to_string(),
            "partial_readings": readings,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_devices(json: bool) -> Result<()> {
    if json {
        let list: Vec<_> = DeviceKind::ALL
            .iter()
            .map(|kind| {
                let spec = kind.spec();
                serde_json::json!({
                    "type": kind,
                    "base_value": spec.base_value,
                    "min_threshold": spec.min_threshold,
                    "max_threshold": spec.max_threshold,
                    "unit": spec.unit,
                    "default_fluctuation": spec.default_fluctuation,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("{:<12} | {:<20} | {:>8} | {:<18} | Fluctuation", "Type", "Name", "Base", "Limits");
    println!("{:-<12}-|-{:-<20}-|-{:->8}-|-{:-<18}-|-{:-<11}", "", "", "", "", "");
    for kind in DeviceKind::ALL {
        let spec = kind.spec();
        println!(
            "{:<12} | {:<20} | {:>8.1} | {:<18} | ±{}",
            kind.to_string(),
            kind.label(),
            spec.base_value,
            format!("[{:.1}, {:.1}] {}", spec.min_threshold, spec.max_threshold, spec.unit),
            spec.default_fluctuation,
        );
    }
    Ok(())
}

fn print_readings(readings: &[Reading]) {
    if readings.is_empty() {
        println!("No readings.");
        return;
    }
    println!("{:<32} | {:<20} | {:<12} | Value", "Timestamp", "Device", "Type");
    println!("{:-<32}-|-{:-<20}-|-{:-<12}-|-{:-<12}", "", "", "", "");
    for r in readings {
        println!(
            "{:<32} | {:<20} | {:<12} | {:.2} {}",
            r.timestamp.to_rfc3339(),
            r.device_id,
            r.device_type.to_string(),
            r.value,
            r.unit
        );
    }
}
