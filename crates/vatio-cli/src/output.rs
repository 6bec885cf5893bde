//! Output formatting and progress reporting

use crate::config::CliConfig;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use vatio::{ConfigSummary, SessionConfig, TrialRecord};

/// Progress bar sized for a whole batch; hidden in quiet mode.
#[must_use]
pub fn batch_progress(config: &CliConfig, total: u64) -> ProgressBar {
    if config.verbosity.is_quiet() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Print the outcome of one trial above the progress bar.
pub fn trial_line(progress: &ProgressBar, record: &TrialRecord) {
    let status = if record.success {
        style("ok").green()
    } else {
        style("failed").red()
    };
    let energy = record
        .energy
        .as_ref()
        .and_then(|e| e.total_energy_joules)
        .map_or_else(String::new, |j| format!(" {j:.1} J"));
    let note = record
        .error
        .as_deref()
        .map_or_else(String::new, |e| format!(" ({e})"));
    progress.println(format!(
        "  {} run {:02} {status}{energy}{note}",
        record.config, record.run_id
    ));
}

/// Print the per-configuration roll-up after a batch.
pub fn print_summary(config: &CliConfig, summaries: &[ConfigSummary]) {
    if config.verbosity.is_quiet() {
        return;
    }
    println!("\n{}", style("Results").bold());
    for summary in summaries {
        let counts = format!("{}/{}", summary.successes, summary.runs);
        let counts = if summary.successes == summary.runs {
            style(counts).green()
        } else {
            style(counts).yellow()
        };
        println!("  {:<24} {counts} successful", summary.config);
    }
}

/// Print the configuration listing for `vatio list`.
pub fn print_config_list(configs: &[SessionConfig], with_urls: bool) {
    println!("{}", style("Built-in configurations").bold());
    for config in configs {
        print!(
            "  {:<24} {:>7} @ {}",
            style(&config.name).cyan(),
            config.platform.name(),
            config.speed_label()
        );
        if with_urls {
            print!("  {}", style(&config.url).dim());
        }
        println!();
    }
}
