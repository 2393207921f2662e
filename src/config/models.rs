use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where to look for applications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,
    /// Append `~/Applications` to `directories`
    #[serde(default = "default_true")]
    pub include_user_applications: bool,
    #[serde(default = "default_package_extension")]
    pub package_extension: String,
    /// Identifiers rejected on top of the built-in generic classes
    #[serde(default)]
    pub extra_rejected_types: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            directories: default_directories(),
            include_user_applications: true,
            package_extension: default_package_extension(),
            extra_rejected_types: Vec::new(),
        }
    }
}

fn default_directories() -> Vec<PathBuf> {
    [
        "/Applications",
        "/System/Applications",
        "/System/Applications/Utilities",
        "/Applications/Utilities",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_package_extension() -> String {
    "app".to_string()
}

fn default_true() -> bool {
    true
}

/// Which OS collaborators to run against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Launch Services on macOS, the memory backend elsewhere
    #[default]
    Auto,
    LaunchServices,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Memory backend: report the per-content-type assignment API as available
    #[serde(default = "default_true")]
    pub modern_assignment: bool,
    /// Memory backend: type key -> application identifier
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// Memory backend: extension -> type identifier
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            modern_assignment: true,
            defaults: BTreeMap::new(),
            extensions: BTreeMap::new(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            ansi: true,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
