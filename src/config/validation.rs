use super::models::{BackendKind, Config};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No scan directories configured")]
    NoScanDirectories,

    #[error("Invalid package extension '{0}': must be non-empty and without a leading dot")]
    InvalidPackageExtension(String),

    #[error("Empty entry in backend.{table}")]
    EmptySeedEntry { table: &'static str },

    #[error("The launch-services backend is only available on macOS")]
    BackendUnavailable,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_scan(config)?;
    validate_backend(config)?;
    Ok(())
}

fn validate_scan(config: &Config) -> Result<(), ValidationError> {
    if config.scan.directories.is_empty() && !config.scan.include_user_applications {
        return Err(ValidationError::NoScanDirectories);
    }

    let ext = &config.scan.package_extension;
    if ext.trim().is_empty() || ext.starts_with('.') {
        return Err(ValidationError::InvalidPackageExtension(ext.clone()));
    }

    Ok(())
}

fn validate_backend(config: &Config) -> Result<(), ValidationError> {
    let blank = |k: &String, v: &String| k.trim().is_empty() || v.trim().is_empty();

    if config.backend.defaults.iter().any(|(k, v)| blank(k, v)) {
        return Err(ValidationError::EmptySeedEntry { table: "defaults" });
    }
    if config.backend.extensions.iter().any(|(k, v)| blank(k, v)) {
        return Err(ValidationError::EmptySeedEntry { table: "extensions" });
    }

    if config.backend.kind == BackendKind::LaunchServices && !cfg!(target_os = "macos") {
        return Err(ValidationError::BackendUnavailable);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_no_directories() {
        let mut config = Config::default();
        config.scan.directories.clear();
        assert!(validate(&config).is_ok());

        config.scan.include_user_applications = false;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NoScanDirectories)
        ));
    }

    #[test]
    fn test_package_extension() {
        let mut config = Config::default();
        config.scan.package_extension = ".app".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPackageExtension(_))
        ));

        config.scan.package_extension = " ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_seed_entries() {
        let mut config = Config::default();
        config
            .backend
            .defaults
            .insert("public.png".to_string(), String::new());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptySeedEntry { table: "defaults" })
        ));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_launch_services_off_macos() {
        let mut config = Config::default();
        config.backend.kind = BackendKind::LaunchServices;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BackendUnavailable)
        ));
    }
}
