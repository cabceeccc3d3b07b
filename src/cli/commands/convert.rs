//! Batch conversion command.

use std::path::PathBuf;

use console::style;
use tokio::sync::mpsc;

use docbatch::device::{DeviceProbe, FixedProbe, SystemProbe};
use docbatch::estimate::format_duration;
use docbatch::input::{self, Validation};
use docbatch::{Config, DevicePreference, History, PoolError, PoolEvent, WorkerPool};

use crate::cli::progress::{batch_bar, report};

#[derive(clap::Args)]
pub struct ConvertArgs {
    /// Files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (default: from config, else ./output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of concurrent workers (default: from config)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Device preference (default: from config)
    #[arg(long, value_enum)]
    device: Option<DevicePreference>,

    /// Backend to try, in order; repeat to build a chain (default: from config)
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// Document language
    #[arg(short, long)]
    lang: Option<String>,

    /// Parse method hint (auto, txt, ocr)
    #[arg(short, long)]
    method: Option<String>,

    /// Disable formula recognition
    #[arg(long)]
    no_formula: bool,

    /// Disable table recognition
    #[arg(long)]
    no_table: bool,

    /// Walk input directories recursively
    #[arg(short, long)]
    recursive: bool,

    /// Validate inputs first and skip invalid ones
    #[arg(long)]
    validate: bool,

    /// Write a JSON status report to this file when done
    #[arg(long)]
    report: Option<PathBuf>,

    /// Override GPU detection
    #[arg(long)]
    gpu_available: Option<bool>,

    /// Don't record this run in the conversion history
    #[arg(long)]
    no_log: bool,
}

/// Convert documents through the configured backend chain.
pub async fn cmd_convert(config: &Config, args: ConvertArgs) -> anyhow::Result<()> {
    let recursive = args.recursive || config.recursive;
    let mut files = input::discover_inputs(&args.inputs, &config.extensions, recursive)?;

    if args.validate {
        files.retain(|file| match input::validate(&file.path) {
            Validation::Valid { .. } => true,
            invalid => {
                eprintln!(
                    "  {} Skipping {}: {}",
                    style("!").yellow(),
                    file.path.display(),
                    invalid.message()
                );
                false
            }
        });
    }

    if files.is_empty() {
        println!("{} No documents to convert", style("!").yellow());
        return Ok(());
    }

    let output_dir = args
        .output
        .or_else(|| config.output_dir())
        .unwrap_or_else(|| PathBuf::from("output"));
    let workers = args.workers.unwrap_or(config.workers);
    let preference = args.device.unwrap_or(config.device);

    let mut options = config.extract_options();
    if let Some(lang) = args.lang {
        options.language = lang;
    }
    if let Some(method) = args.method {
        options.parse_method = method;
    }
    options.enable_formula &= !args.no_formula;
    options.enable_table &= !args.no_table;

    let chain = if args.backends.is_empty() {
        config.build_chain()?
    } else {
        config.build_chain_from(&args.backends)?
    };
    if chain.is_empty() {
        anyhow::bail!("No backends configured");
    }

    let probe: Box<dyn DeviceProbe> = match args.gpu_available {
        Some(available) => Box::new(FixedProbe(available)),
        None => Box::new(SystemProbe),
    };

    let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    let estimate = config.estimator().estimate(&paths, workers.min(files.len()));
    println!(
        "{} Converting {} documents ({:.1} MB) with {} workers, chain: {}",
        style("→").cyan(),
        files.len(),
        estimate.total_size_mb,
        workers,
        chain.names().join(" → ")
    );
    println!(
        "  {} Estimated time: {}",
        style("→").dim(),
        format_duration(estimate.total_secs)
    );

    let (event_tx, mut event_rx) = mpsc::channel::<PoolEvent>(100);
    let pool = WorkerPool::new(chain, probe).with_events(event_tx);
    for file in &files {
        match pool.submit_relative(
            file.path.clone(),
            file.relative.clone(),
            output_dir.clone(),
            options.clone(),
        ) {
            Ok(_) => {}
            Err(PoolError::DuplicateOutput(path)) => eprintln!(
                "  {} Skipping {}: {} is already written by another input",
                style("!").yellow(),
                file.path.display(),
                path.display()
            ),
            Err(e) => return Err(e.into()),
        }
    }

    // Spawn event handler for UI
    let event_handler = tokio::spawn(async move {
        let mut bar = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                PoolEvent::RunStarted { total, device, .. } => {
                    println!("  {} Device: {}", style("→").dim(), device);
                    let progress = batch_bar(total as u64);
                    progress.set_message("Converting...");
                    bar = Some(progress);
                }
                PoolEvent::TaskStarted { filename, .. } => {
                    if let Some(ref progress) = bar {
                        progress.set_message(filename);
                    }
                }
                PoolEvent::TaskSucceeded {
                    filename, backend, ..
                } => {
                    if let Some(ref progress) = bar {
                        progress.set_message(format!("{} ({})", filename, backend));
                        progress.inc(1);
                    }
                }
                PoolEvent::TaskFailed {
                    filename, error, ..
                } => {
                    report(
                        bar.as_ref(),
                        &format!("  {} {} failed: {}", style("✗").red(), filename, error),
                    );
                    if let Some(ref progress) = bar {
                        progress.inc(1);
                    }
                }
                PoolEvent::TaskStopped { .. } => {
                    if let Some(ref progress) = bar {
                        progress.inc(1);
                    }
                }
                PoolEvent::RunFinished { .. } => {
                    if let Some(progress) = bar.take() {
                        progress.finish_and_clear();
                    }
                }
            }
        }
    });

    let stopper = pool.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Stopping, waiting for in-flight documents...",
                style("!").yellow()
            );
            stopper.stop();
        }
    });

    let run = pool
        .run(workers, preference, |percent, message| {
            tracing::info!("[{:>5.1}%] {}", percent, message);
        })
        .await?;

    ctrl_c.abort();
    let _ = ctrl_c.await;
    let snapshot = pool.snapshot();
    let tasks = pool.tasks();
    drop(pool);
    let _ = event_handler.await;

    println!(
        "{} Done in {}: {} succeeded, {} failed, {} stopped",
        style("✓").green(),
        format_duration(run.elapsed().num_milliseconds() as f64 / 1000.0),
        run.succeeded,
        run.failed,
        run.stopped
    );
    println!("  {} Output: {}", style("→").dim(), output_dir.display());

    if let Some(path) = args.report {
        snapshot.write_to(&path).await?;
        println!("  {} Report: {}", style("→").dim(), path.display());
    }

    if config.log_conversions && !args.no_log {
        let mut history = History::open(&config.log_dir()).await;
        let added = history.record_run(&tasks, run.device_used);
        match history.save().await {
            Ok(()) => tracing::debug!("Logged {} conversions to {}", added, history.path().display()),
            Err(e) => eprintln!("  {} {}", style("!").yellow(), e),
        }
    }

    if run.failed > 0 {
        println!(
            "  {} {} documents failed; rerun with -v for backend details",
            style("!").yellow(),
            run.failed
        );
    }

    Ok(())
}
