use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LEDGER_PATH: &str = "ledger.csv";
pub const LEDGER_PATH_ENV: &str = "FINANCE_LEDGER";
/// Takes a full `EnvFilter` directive and wins over `-v`.
pub const LOG_ENV: &str = "FINANCE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ledger_path: PathBuf,
    pub verbosity: u8,
}

impl Config {
    pub fn new(ledger_path: PathBuf, verbosity: u8) -> Self {
        Config {
            ledger_path,
            verbosity,
        }
    }

    fn default_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }

    /// Diagnostics go to stderr so stdout stays clean for listings.
    pub fn init_logging(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}
