//! Read-only inspection commands: validate, estimate, devices, backends.

use std::path::PathBuf;

use console::style;

use docbatch::backend;
use docbatch::device::{self, DeviceProbe, SystemProbe};
use docbatch::estimate::format_duration;
use docbatch::input;
use docbatch::{Config, DevicePreference};

/// Validate inputs and print a per-file verdict.
pub async fn cmd_validate(config: &Config, inputs: &[PathBuf], recursive: bool) -> anyhow::Result<()> {
    let files = input::discover(inputs, &config.extensions, recursive || config.recursive)?;
    if files.is_empty() {
        println!("{} No documents found", style("!").yellow());
        return Ok(());
    }

    let mut invalid = 0;
    for file in &files {
        let result = input::validate(file);
        if result.is_valid() {
            println!("  {} {}", style("✓").green(), file.display());
        } else {
            invalid += 1;
            println!(
                "  {} {}: {}",
                style("✗").red(),
                file.display(),
                result.message()
            );
            if let Some(hint) = result.suggestion() {
                println!("      {}", style(hint).dim());
            }
        }
    }

    println!();
    println!(
        "{} {} valid, {} invalid",
        style("Summary:").bold(),
        files.len() - invalid,
        invalid
    );
    Ok(())
}

/// Print the time estimate for a batch.
pub async fn cmd_estimate(
    config: &Config,
    inputs: &[PathBuf],
    workers: Option<usize>,
    recursive: bool,
) -> anyhow::Result<()> {
    let files = input::discover(inputs, &config.extensions, recursive || config.recursive)?;
    let workers = workers.unwrap_or(config.workers).max(1);
    let estimate = config.estimator().estimate(&files, workers);

    println!("\n{}", style("Time Estimate").bold());
    println!("{}", "-".repeat(40));
    println!("  {:<18} {}", "Files:", estimate.files);
    println!("  {:<18} {:.1} MB", "Total size:", estimate.total_size_mb);
    println!("  {:<18} {}", "Workers:", estimate.workers);
    println!(
        "  {:<18} {}",
        "Per file:",
        format_duration(estimate.avg_secs_per_file())
    );
    println!(
        "  {:<18} {}",
        "Total:",
        style(format_duration(estimate.total_secs)).cyan()
    );
    Ok(())
}

/// Report GPU detection and the resulting device.
pub async fn cmd_devices(config: &Config, preference: Option<DevicePreference>) -> anyhow::Result<()> {
    let preference = preference.unwrap_or(config.device);
    let gpu_available = tokio::task::spawn_blocking(|| SystemProbe.is_gpu_available()).await?;
    let selected = device::select(preference, gpu_available);

    println!("\n{}", style("Devices").bold());
    println!("{}", "-".repeat(40));
    let gpu_status = if gpu_available {
        style("✓ available").green()
    } else {
        style("✗ not detected").red()
    };
    println!("  {:<15} {}", "GPU", gpu_status);
    println!("  {:<15} {}", "Preference", preference);
    println!("  {:<15} {}", "Selected", style(selected).cyan());
    Ok(())
}

/// Show the configured chain and whether each backend can run.
pub async fn cmd_backends(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("Backend Chain").bold());
    println!("{}", "-".repeat(50));

    let mut names = config.backends.clone();
    for builtin in backend::BUILTIN_BACKENDS {
        if !names.iter().any(|n| n == builtin) {
            names.push(builtin.to_string());
        }
    }
    let mut custom: Vec<&String> = config
        .commands
        .keys()
        .filter(|name| !names.contains(name))
        .collect();
    custom.sort();
    names.extend(custom.into_iter().cloned());

    let mut any_available = false;
    for name in &names {
        let position = config.backends.iter().position(|n| n == name);
        let marker = match position {
            Some(i) => style(format!("{}.", i + 1)).cyan(),
            None => style("-".to_string()).dim(),
        };

        match backend::from_name(name, config) {
            Ok(backend) => {
                let (available, hint) = tokio::task::spawn_blocking(move || {
                    (backend.is_available(), backend.availability_hint())
                })
                .await?;
                any_available |= available && position.is_some();
                let status = if available {
                    style("✓ available").green()
                } else {
                    style("✗ not available").red()
                };
                println!("  {} {:<15} {}", marker, name, status);
                if !available {
                    println!("       {}", style(hint).dim());
                }
            }
            Err(e) => println!("  {} {:<15} {}", marker, name, style(e).red()),
        }
    }

    println!();
    if any_available {
        println!("{} At least one chained backend can run", style("✓").green());
    } else {
        println!(
            "{} No backend in the chain is available; conversions will fail",
            style("!").yellow()
        );
    }
    Ok(())
}
