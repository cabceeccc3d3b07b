//! Conversion history command.

use console::style;

use docbatch::estimate::format_duration;
use docbatch::{Config, History};

/// Print accumulated statistics and the most recent conversions.
pub async fn cmd_history(config: &Config, limit: usize, failed_only: bool) -> anyhow::Result<()> {
    let history = History::open(&config.log_dir()).await;
    if history.is_empty() {
        println!(
            "{} No conversions recorded in {}",
            style("!").yellow(),
            history.path().display()
        );
        return Ok(());
    }

    let stats = history.statistics();
    println!("\n{}", style("Conversion History").bold());
    println!("{}", "-".repeat(50));
    println!("  {:<18} {}", "Files:", stats.total_files);
    println!("  {:<18} {}", "Succeeded:", style(stats.successful).green());
    println!("  {:<18} {}", "Failed:", style(stats.failed).red());
    println!("  {:<18} {:.1}%", "Success rate:", stats.success_rate * 100.0);
    println!("  {:<18} {:.1} MB", "Total size:", stats.total_size_mb);
    println!(
        "  {:<18} {}",
        "Total time:",
        format_duration(stats.total_time_seconds)
    );
    println!(
        "  {:<18} {}",
        "Per file:",
        format_duration(stats.avg_time_per_file)
    );

    let listed: Vec<_> = history
        .records()
        .iter()
        .filter(|r| !failed_only || !r.success)
        .collect();
    let recent = &listed[listed.len().saturating_sub(limit)..];
    if recent.is_empty() {
        return Ok(());
    }

    println!("\n{}", style("Recent").bold());
    for record in recent {
        let marker = if record.success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "  {} {} {} ({})",
            marker,
            style(record.timestamp.format("%Y-%m-%d %H:%M")).dim(),
            record.file_path.display(),
            format_duration(record.duration)
        );
        if let Some(ref error) = record.error_message {
            println!("      {}", style(error).dim());
        }
    }
    Ok(())
}
