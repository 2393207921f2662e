use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::builder::describe_type;
use super::tables;
use super::types::{AppRef, ApplicationRecord, CanonicalType, Snapshot, TypeKey};
use crate::os::{BundleReader, ContentTypeProbe, HandlerDatabase, HandlerTarget, SystemServices, TypeResolver};

/// Default Handler Resolver: attaches the OS-registered default to registry
/// entries and resolves single files presented at runtime.
///
/// A missing or stale registration is "no default", never an error.
#[derive(Clone)]
pub struct DefaultResolver {
    handlers: Arc<dyn HandlerDatabase>,
    bundles: Arc<dyn BundleReader>,
    types: Arc<dyn TypeResolver>,
    probe: Arc<dyn ContentTypeProbe>,
}

impl DefaultResolver {
    pub fn new(services: &SystemServices) -> Self {
        Self {
            handlers: services.handlers.clone(),
            bundles: services.bundles.clone(),
            types: services.types.clone(),
            probe: services.probe.clone(),
        }
    }

    /// The application the OS currently opens `key` with.
    pub async fn resolve_default(&self, key: &TypeKey, snapshot: &Snapshot) -> Option<AppRef> {
        let target = HandlerTarget::for_key(key)?;
        let identifier = match self.handlers.default_handler(&target).await {
            Ok(Some(identifier)) => identifier,
            Ok(None) => return None,
            Err(e) => {
                debug!(%key, error = %e, "Default handler query failed");
                return None;
            }
        };
        self.application(&identifier, snapshot).await
    }

    /// Record for an application identifier: the scanned one if known, else
    /// looked up through the OS. `None` when it is no longer installed.
    pub async fn application(&self, identifier: &str, snapshot: &Snapshot) -> Option<AppRef> {
        if let Some(app) = snapshot.known_application(identifier) {
            return Some(app.clone());
        }

        let path = match self.handlers.application_path(identifier).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!(app = %identifier, "Stale handler registration");
                return None;
            }
            Err(e) => {
                debug!(app = %identifier, error = %e, "Application lookup failed");
                return None;
            }
        };

        Some(Arc::new(self.unscanned_record(identifier, path).await))
    }

    async fn unscanned_record(&self, identifier: &str, path: PathBuf) -> ApplicationRecord {
        let bundles = self.bundles.clone();
        let bundle_path = path.clone();
        let manifest = tokio::task::spawn_blocking(move || bundles.read(&bundle_path))
            .await
            .ok()
            .and_then(|read| read.ok())
            .flatten();

        let fallback_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(identifier)
            .to_string();

        let mut record = ApplicationRecord::new(identifier, fallback_name, path);
        if let Some(manifest) = manifest {
            if let Some(name) = manifest.name {
                record.name = name;
            }
            record.icon = manifest.icon;
        }
        record
    }

    /// Attach current defaults to every entry of a freshly built snapshot.
    pub async fn annotate(&self, snapshot: &mut Snapshot) {
        let keyed: Vec<(TypeKey, HandlerTarget)> = snapshot
            .keys()
            .filter_map(|key| HandlerTarget::for_key(key).map(|target| (key.clone(), target)))
            .collect();
        let targets: Vec<HandlerTarget> = keyed.iter().map(|(_, target)| target.clone()).collect();

        let found = match self.handlers.default_handlers(&targets).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Default handler lookup failed, snapshot has no defaults");
                return;
            }
        };

        let mut outside: HashMap<String, Option<AppRef>> = HashMap::new();
        let mut resolved = 0;
        for (key, target) in keyed {
            let Some(identifier) = found.get(&target) else {
                continue;
            };
            let app = match snapshot.known_application(identifier) {
                Some(app) => Some(app.clone()),
                None => match outside.get(&identifier.to_ascii_lowercase()) {
                    Some(cached) => cached.clone(),
                    None => {
                        let app = self.application(identifier, snapshot).await;
                        outside.insert(identifier.to_ascii_lowercase(), app.clone());
                        app
                    }
                },
            };
            if let Some(app) = app {
                snapshot.set_default(&key, Some(app));
                resolved += 1;
            }
        }

        snapshot.stats.defaults_resolved = resolved;
        debug!(resolved, "Defaults attached");
    }

    /// Registry entry for a concrete file. The existing entry when the type is
    /// already known; otherwise a transient one that is never stored.
    pub async fn resolve_ad_hoc(&self, path: &Path, snapshot: &Snapshot) -> Option<CanonicalType> {
        let identifier = match self.probe.content_type(path).await {
            Ok(Some(identifier)) => identifier,
            Ok(None) => {
                debug!(path = %path.display(), "No content type for file");
                return None;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Content type probe failed");
                return None;
            }
        };

        let key = TypeKey::content(identifier.clone());
        if let Some(existing) = snapshot.get(&key) {
            return Some(existing.clone());
        }
        if tables::is_rejected(&identifier, &[]) {
            debug!(%key, "File resolved to a generic type");
            return None;
        }

        let extension = path.extension().and_then(|ext| ext.to_str());
        let (name, extensions) = describe_type(self.types.as_ref(), &identifier, extension);
        let mut transient = CanonicalType::new(key.clone(), name, extensions);

        match self.handlers.role_handlers(&identifier).await {
            Ok(identifiers) => {
                for identifier in identifiers {
                    if transient.supports(&identifier) {
                        continue;
                    }
                    if let Some(app) = self.application(&identifier, snapshot).await {
                        transient.supporters.push(app);
                    }
                }
            }
            Err(e) => debug!(%key, error = %e, "Role handler query failed"),
        }

        transient.default_app = self.resolve_default(&key, snapshot).await;
        Some(transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::os::{MemoryHandlerDatabase, MemoryTypeDatabase};
    use crate::registry::ScanStats;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    struct Fixture {
        resolver: DefaultResolver,
        handlers: Arc<MemoryHandlerDatabase>,
        snapshot: Snapshot,
    }

    fn app(id: &str, name: &str) -> AppRef {
        Arc::new(ApplicationRecord::new(id, name, format!("/Applications/{name}.app")))
    }

    fn fixture() -> Fixture {
        let base = SystemServices::in_memory(&BackendConfig::default());
        let handlers = Arc::new(MemoryHandlerDatabase::new());
        let services = SystemServices {
            handlers: handlers.clone(),
            ..base
        };

        let editor = app("com.example.editor", "Editor");
        let mut text = CanonicalType::new(
            TypeKey::content("com.example.text"),
            "Example Text",
            ["extxt".to_string()].into(),
        );
        text.supporters = vec![editor.clone()];
        let mut scheme = CanonicalType::new(TypeKey::scheme("myapp"), "MYAPP URL", BTreeSet::new());
        scheme.supporters = vec![editor.clone()];

        let types: BTreeMap<TypeKey, CanonicalType> = [text, scheme]
            .into_iter()
            .map(|ty| (ty.key.clone(), ty))
            .collect();
        let known = [(editor.identifier.clone(), editor.clone())].into();
        let snapshot = Snapshot::from_parts(vec![editor], types, known, ScanStats::default());

        Fixture {
            resolver: DefaultResolver::new(&services),
            handlers,
            snapshot,
        }
    }

    #[tokio::test]
    async fn test_unregistered_type_has_no_default() {
        let f = fixture();
        let key = TypeKey::content("com.example.text");
        assert!(f.resolver.resolve_default(&key, &f.snapshot).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_registration_is_no_default() {
        let f = fixture();
        f.handlers.seed_default("com.example.text", "com.example.uninstalled");
        let key = TypeKey::content("com.example.text");
        assert!(f.resolver.resolve_default(&key, &f.snapshot).await.is_none());
    }

    #[tokio::test]
    async fn test_default_outside_supporters() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Other.app");
        f.handlers.register_application("com.example.other", &path);
        f.handlers.seed_default("url.scheme.myapp", "com.example.other");

        let app = f
            .resolver
            .resolve_default(&TypeKey::scheme("myapp"), &f.snapshot)
            .await
            .unwrap();
        assert_eq!(app.identifier, "com.example.other");
        assert_eq!(app.name, "Other");
    }

    #[tokio::test]
    async fn test_annotate_sets_defaults() {
        let mut f = fixture();
        f.handlers.seed_default("com.example.text", "com.example.editor");

        f.resolver.annotate(&mut f.snapshot).await;

        let entry = f.snapshot.get(&TypeKey::content("com.example.text")).unwrap();
        assert!(entry.is_default("com.example.editor"));
        assert!(f.snapshot.get(&TypeKey::scheme("myapp")).unwrap().default_app.is_none());
        assert_eq!(f.snapshot.stats.defaults_resolved, 1);
    }

    #[tokio::test]
    async fn test_custom_key_never_queried() {
        let f = fixture();
        let key = TypeKey::custom("notes");
        assert!(f.resolver.resolve_default(&key, &f.snapshot).await.is_none());
    }

    #[tokio::test]
    async fn test_ad_hoc_returns_existing_entry() {
        let mut f = fixture();
        f.handlers.seed_default("com.example.text", "com.example.editor");
        f.resolver.annotate(&mut f.snapshot).await;

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("notes.extxt");
        std::fs::write(&file, b"hello").unwrap();

        // the in-memory probe maps by extension
        let types = MemoryTypeDatabase::new();
        types.insert_extension("extxt", "com.example.text");
        let resolver = DefaultResolver {
            probe: Arc::new(types),
            ..f.resolver.clone()
        };

        let entry = resolver.resolve_ad_hoc(&file, &f.snapshot).await.unwrap();
        let existing = f.snapshot.get(&TypeKey::content("com.example.text")).unwrap();
        assert_eq!(entry.key, existing.key);
        assert_eq!(entry.supporters, existing.supporters);
        assert!(Arc::ptr_eq(&entry.supporters[0], &existing.supporters[0]));
        assert!(entry.is_default("com.example.editor"));
    }

    #[tokio::test]
    async fn test_ad_hoc_synthesizes_transient_entry() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("scan.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        f.handlers.register_role_handler("com.adobe.pdf", "com.example.editor");
        f.handlers.seed_default("com.adobe.pdf", "com.example.editor");

        let entry = f.resolver.resolve_ad_hoc(&file, &f.snapshot).await.unwrap();
        assert_eq!(entry.key, TypeKey::content("com.adobe.pdf"));
        assert_eq!(entry.name, "PDF Document");
        assert!(entry.extensions.contains("pdf"));
        assert_eq!(entry.supporters.len(), 1);
        assert!(entry.is_default("com.example.editor"));

        assert!(f.snapshot.get(&entry.key).is_none());
    }

    #[tokio::test]
    async fn test_ad_hoc_unknown_file() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("blob.unknownext");
        std::fs::write(&file, b"?").unwrap();

        assert!(f.resolver.resolve_ad_hoc(&file, &f.snapshot).await.is_none());
        assert!(
            f.resolver
                .resolve_ad_hoc(&temp_dir.path().join("missing.pdf"), &f.snapshot)
                .await
                .is_none()
        );
    }
}
