//! Progress bars for phase output.

use indicatif::{ProgressBar, ProgressStyle};

/// Bar length; phase fractions are rendered as percent
pub const BAR_LENGTH: u64 = 100;

/// Create a percentage bar for one phase
pub fn create_phase_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(BAR_LENGTH);
    let style = ProgressStyle::default_bar()
        .template("{prefix:>10.bold} [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb
}

/// Map a 0.0..=1.0 fraction to a bar position
pub fn bar_position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}
