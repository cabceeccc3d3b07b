//! Progress bar helpers.

use indicatif::{ProgressBar, ProgressStyle};

/// Bar for a batch of `total` documents.
pub fn batch_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    bar.set_style(style);
    bar
}

/// Print above `bar` if one is active, otherwise straight to stderr.
pub fn report(bar: Option<&ProgressBar>, message: &str) {
    match bar {
        Some(bar) => bar.suspend(|| eprintln!("{}", message)),
        None => eprintln!("{}", message),
    }
}
