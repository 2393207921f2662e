//! Settings for the scanner, the OS backend and logging.
//!
//! Values are layered: struct defaults, then an optional TOML file
//! (`config/openwith.toml`, or whatever `OPENWITH_CONFIG` points at), then
//! `OPENWITH__<SECTION>__<KEY>` environment variables, which win.
//!
//! ```no_run
//! use openwith::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! for dir in &config.scan.directories {
//!     println!("{}", dir.display());
//! }
//! ```
//!
//! A few overrides that come up in practice:
//! - `OPENWITH__BACKEND__KIND=memory` to run without Launch Services
//! - `OPENWITH__SCAN__INCLUDE_USER_APPLICATIONS=false`
//! - `OPENWITH__TELEMETRY__LOG_FILTER=openwith=debug`

mod models;
mod sources;
mod validation;

pub use models::{BackendConfig, BackendKind, Config, ScanConfig, TelemetryConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load and validate from the default file location and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Same as [`load`](Self::load) with an explicit file, as given by `--config`.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
