//! Logging Module
//!
//! Structured logging through the `tracing` crate, plus a small logger that
//! reports epoch timing for the training loop.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging, shows loader worker threads
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Override the minimum level, keeping the other options
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Minimum level shown, selectable with `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Returns
/// * `Result<(), String>` - Err if a global subscriber was already installed
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Epoch timing logger for the training loop
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch with its average loss
    pub fn end_epoch(&self, average_loss: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch);
        let avg_epoch_time = total_time.as_secs_f64() / self.epoch.max(1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {:.1}s | Loss: {:.4} | ETA: {:.0}s",
            self.epoch,
            self.total_epochs,
            epoch_time.as_secs_f64(),
            average_loss,
            eta_secs
        );
    }

    /// Log a validation result
    pub fn log_validation(&self, auc: Option<f64>, accuracy: f64) {
        match auc {
            Some(auc) => tracing::info!(
                "Validation epoch {} | AUC: {:.4} | Acc: {:.2}%",
                self.epoch,
                auc,
                accuracy * 100.0
            ),
            None => tracing::warn!(
                "Validation epoch {} | AUC undefined | Acc: {:.2}%",
                self.epoch,
                accuracy * 100.0
            ),
        }
    }

    /// Log training completion
    pub fn log_complete(&self, best_metric: f64, best_epoch: Option<usize>) {
        let total_time = self.training_start.elapsed();

        tracing::info!(
            "Training complete: {} epochs in {:.1}s | best AUC {:.4} at epoch {:?}",
            self.total_epochs,
            total_time.as_secs_f64(),
            best_metric,
            best_epoch
        );
    }

    /// Seconds since training started
    pub fn elapsed_secs(&self) -> f64 {
        self.training_start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_log_level_parses_from_cli_names() {
        use clap::ValueEnum;

        for (name, level) in [
            ("trace", Level::TRACE),
            ("debug", Level::DEBUG),
            ("info", Level::INFO),
            ("warn", Level::WARN),
            ("error", Level::ERROR),
        ] {
            let parsed = LogLevel::from_str(name, true).unwrap();
            assert_eq!(parsed.to_tracing_level(), level);
        }
        assert!(LogLevel::from_str("loud", true).is_err());
    }

    #[test]
    fn test_with_level_keeps_verbose_options() {
        let config = LogConfig::verbose().with_level(LogLevel::Error);
        assert_eq!(config.level, LogLevel::Error);
        assert!(config.include_thread_ids);
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.include_thread_ids);

        let verbose = LogConfig::verbose();
        assert_eq!(verbose.level, LogLevel::Debug);
    }

    #[test]
    fn test_training_logger_tracks_epoch() {
        let mut logger = TrainingLogger::new(4);
        logger.start_epoch(2);
        logger.end_epoch(0.5);
        assert_eq!(logger.epoch, 2);
        assert!(logger.elapsed_secs() >= 0.0);
    }
}
