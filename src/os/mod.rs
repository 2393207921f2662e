//! Operating-system collaborators.
//!
//! The registry never talks to the OS directly. Everything it needs (listing
//! application folders, reading bundle manifests, the type-identifier
//! database, the default-handler database and content sniffing) sits behind
//! the traits below.
//!
//! ## Backends
//!
//! - [`bundle`] - on-disk bundle reader (`Info.plist`) and directory lister
//! - [`memory`] - in-process type and handler databases, used off macOS and in tests
//! - `launch_services` - Launch Services via the Swift toolchain (macOS only)

pub mod bundle;
pub mod memory;

#[cfg(target_os = "macos")]
pub mod launch_services;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};
use crate::manifest::BundleManifest;
use crate::registry::{KeyKind, TypeKey};

pub use bundle::{FsDirectoryLister, PlistBundleReader};
pub use memory::{MemoryHandlerDatabase, MemoryTypeDatabase};

#[derive(Debug, Error)]
pub enum OsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest error: {0}")]
    Plist(#[from] plist::Error),

    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    #[error("request rejected by the handler database (status {code})")]
    Rejected { code: i32 },

    #[error("not supported: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, OsError>;

/// Lists the non-hidden immediate children of a directory.
pub trait DirectoryLister: Send + Sync {
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Reads an application bundle's identity and declarations.
pub trait BundleReader: Send + Sync {
    /// `Ok(None)` when the path is not a readable bundle.
    fn read(&self, bundle: &Path) -> Result<Option<BundleManifest>>;
}

/// The system type-identifier database.
pub trait TypeResolver: Send + Sync {
    fn type_for_extension(&self, ext: &str) -> Option<String>;
    fn describe(&self, identifier: &str) -> Option<String>;
    fn extensions_for(&self, identifier: &str) -> Vec<String>;
}

/// Determines the content type of a concrete file.
#[async_trait]
pub trait ContentTypeProbe: Send + Sync {
    async fn content_type(&self, path: &Path) -> Result<Option<String>>;
}

/// What a default-handler query or assignment is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerTarget {
    ContentType(String),
    UrlScheme(String),
}

impl HandlerTarget {
    /// OS-side target for a registry key. Synthesized keys have none.
    pub fn for_key(key: &TypeKey) -> Option<Self> {
        match key.kind() {
            KeyKind::Content(identifier) => Some(HandlerTarget::ContentType(identifier.to_string())),
            KeyKind::Scheme(scheme) => Some(HandlerTarget::UrlScheme(scheme.to_string())),
            KeyKind::Custom(_) => None,
        }
    }
}

/// The two generations of the default-assignment API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentApi {
    /// Per-content-type assignment on current systems.
    Modern,
    /// Role-handler assignment available everywhere.
    Legacy,
}

/// The system default-handler database.
#[async_trait]
pub trait HandlerDatabase: Send + Sync {
    async fn default_handler(&self, target: &HandlerTarget) -> Result<Option<String>>;

    /// Batch form of [`default_handler`](Self::default_handler). Backends with
    /// expensive round trips override it. Failed lookups are left out.
    async fn default_handlers(
        &self,
        targets: &[HandlerTarget],
    ) -> Result<HashMap<HandlerTarget, String>> {
        let mut found = HashMap::new();
        for target in targets {
            match self.default_handler(target).await {
                Ok(Some(app)) => {
                    found.insert(target.clone(), app);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(?target, error = %e, "Default handler lookup failed"),
            }
        }
        Ok(found)
    }

    /// Every application registered for a content type, any role.
    async fn role_handlers(&self, content_type: &str) -> Result<Vec<String>>;

    /// Install location of an application, if it is still installed.
    async fn application_path(&self, identifier: &str) -> Result<Option<PathBuf>>;

    /// Whether the running system offers [`AssignmentApi::Modern`].
    fn supports_modern_assignment(&self) -> bool;

    async fn assign_content_type(
        &self,
        identifier: &str,
        content_type: &str,
        api: AssignmentApi,
    ) -> Result<()>;

    async fn assign_url_scheme(&self, identifier: &str, scheme: &str) -> Result<()>;
}

/// The full set of collaborators a registry service runs against.
#[derive(Clone)]
pub struct SystemServices {
    pub lister: Arc<dyn DirectoryLister>,
    pub bundles: Arc<dyn BundleReader>,
    pub types: Arc<dyn TypeResolver>,
    pub handlers: Arc<dyn HandlerDatabase>,
    pub probe: Arc<dyn ContentTypeProbe>,
}

impl SystemServices {
    /// Pick backends according to configuration.
    pub fn from_config(config: &BackendConfig) -> Self {
        match config.kind {
            #[cfg(target_os = "macos")]
            BackendKind::Auto | BackendKind::LaunchServices => Self::launch_services(),
            #[cfg(not(target_os = "macos"))]
            BackendKind::Auto | BackendKind::LaunchServices => Self::in_memory(config),
            BackendKind::Memory => Self::in_memory(config),
        }
    }

    /// On-disk bundles, in-process type and handler databases.
    pub fn in_memory(config: &BackendConfig) -> Self {
        let types = Arc::new(MemoryTypeDatabase::with_known_types());
        for (ext, identifier) in &config.extensions {
            types.insert_extension(ext, identifier);
        }

        let handlers = Arc::new(MemoryHandlerDatabase::new());
        handlers.set_modern_assignment(config.modern_assignment);
        for (key, app) in &config.defaults {
            handlers.seed_default(key, app);
        }

        Self {
            lister: Arc::new(FsDirectoryLister),
            bundles: Arc::new(PlistBundleReader),
            types: types.clone(),
            handlers,
            probe: types,
        }
    }

    #[cfg(target_os = "macos")]
    pub fn launch_services() -> Self {
        let services = Arc::new(launch_services::LaunchServices::new());
        Self {
            lister: Arc::new(FsDirectoryLister),
            bundles: Arc::new(PlistBundleReader),
            types: services.clone(),
            handlers: services.clone(),
            probe: services,
        }
    }
}
