//! Utilities module for logging, metrics, charts, and error types
//!
//! ## Metrics
//!
//! Validation uses one-vs-rest macro ROC AUC; the final evaluation renders a
//! per-class precision/recall/F1 report.

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{MedNistError, Result, ResultExt};
pub use logging::{init_logging, LogConfig};
pub use metrics::{ClassificationReport, ConfusionMatrix};

/// Elapsed time as `12.3s`, `4m05s` or `2h07m`
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let whole = seconds.round() as u64;
    match whole {
        0..=59 => format!("{:.1}s", seconds),
        60..=3599 => format!("{}m{:02}s", whole / 60, whole % 60),
        _ => format!("{}h{:02}m", whole / 3600, whole % 3600 / 60),
    }
}

/// Sample counts with `,` between digit groups
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = match digits.len() % 3 {
        0 => 3,
        r => r,
    };

    let mut out = digits[..head].to_string();
    for start in (head..digits.len()).step_by(3) {
        out.push(',');
        out.push_str(&digits[start..start + 3]);
    }
    out
}
