// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal styling for demo reports and help.
//!
//! Honors NO_COLOR and FORCE_COLOR. Piped output is uncolored.

use colored::{ColoredString, Colorize};

use cobridge_demo::Report;

/// Apply the color override from the environment. Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn status_pass() -> ColoredString {
    "✓".green()
}

pub fn status_fail() -> ColoredString {
    "✗".red()
}

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}

/// `✓ dot/coro: 1.23e20` or `✗ not-product/pool: kaboom`.
pub fn report_line(report: &Report) -> String {
    match &report.outcome {
        Ok(value) => format!("{} {}: {}", status_pass(), report.label.bold(), value),
        Err(message) => format!("{} {}: {}", status_fail(), report.label.bold(), message.red()),
    }
}
