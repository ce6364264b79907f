//! Progress bars for the long-running phases.
//!
//! In log-only mode bars are hidden and phases report through periodic
//! `tracing` lines instead, which keeps redirected logs readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Human-readable duration: seconds, minutes or hours.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

fn hide_if_log_only(pb: &ProgressBar) -> bool {
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        true
    } else {
        false
    }
}

/// Progress bar for a phase with a known row count.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if !hide_if_log_only(&pb) {
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            pb.set_style(style.progress_chars("=> "));
        }
    }
    pb.set_message(msg.to_string());
    pb
}

/// Spinner for phases without a row count.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !hide_if_log_only(&pb) {
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Emit a progress line every `interval` rows and on the last row.
/// Only active in log-only mode.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if !is_log_only() || total == 0 {
        return;
    }
    if current % interval.max(1) == 0 || current == total {
        let pct = 100.0 * current as f64 / total as f64;
        tracing::info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1.5h");
    }

    #[test]
    fn test_progress_bar_keeps_length_and_message() {
        let pb = create_progress_bar(42, "Phase 2: Matching");
        assert_eq!(pb.length(), Some(42));
        assert_eq!(pb.message(), "Phase 2: Matching");
    }
}
