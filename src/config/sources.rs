use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "OPENWITH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/openwith.toml";
const ENV_PREFIX: &str = "OPENWITH";
const ENV_SEPARATOR: &str = "__";

/// Config file location: `OPENWITH_CONFIG` or the default path.
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Defaults, then the file from [`config_path`], then `.env` and process
/// environment variables.
pub fn load() -> Result<Config, ConfigError> {
    // .env is optional
    let _ = dotenvy::dotenv();
    load_from_sources(config_path())
}

/// Build from `config_path` (skipped when missing) plus `OPENWITH__*` variables.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::debug!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // OPENWITH__BACKEND__KIND -> backend.kind
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.scan.package_extension, "app");
        assert_eq!(config.scan.directories.len(), 4);
        assert_eq!(config.backend.kind, BackendKind::Auto);
        assert_eq!(config.telemetry.log_filter, "info");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[scan]
directories = ["/opt/apps"]
include_user_applications = false
extra_rejected_types = ["com.example.internal"]

[backend]
kind = "memory"
modern_assignment = false

[backend.defaults]
"public.png" = "com.example.viewer"
"url.scheme.mailto" = "com.example.mail"

[backend.extensions]
md = "net.daringfireball.markdown"

[telemetry]
log_filter = "openwith=debug"
ansi = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.scan.directories, vec![PathBuf::from("/opt/apps")]);
        assert!(!config.scan.include_user_applications);
        assert_eq!(config.scan.extra_rejected_types, vec!["com.example.internal"]);
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert!(!config.backend.modern_assignment);
        assert_eq!(config.backend.defaults["url.scheme.mailto"], "com.example.mail");
        assert_eq!(config.backend.extensions["md"], "net.daringfireball.markdown");
        assert!(!config.telemetry.ansi);
    }
}
