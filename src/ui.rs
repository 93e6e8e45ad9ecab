use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A major phase of a run.
pub fn print_step(msg: &str) {
    println!("{} {}", "::".blue().bold(), msg.bold());
}

/// A finished unit of work.
pub fn print_success(msg: &str) {
    println!("{} {}", "ok".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg.red());
}

/// Spinner shown while a member is being worked on; callers update the
/// message per pipeline step and finish it with a summary.
pub fn member_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
