#![allow(dead_code)]

use async_trait::async_trait;
use openwith::config::BackendConfig;
use openwith::os::{self, AssignmentApi, HandlerDatabase, HandlerTarget, MemoryHandlerDatabase, SystemServices};
use openwith::registry::ScanSettings;
use openwith::service::RegistryHandle;
use plist::{Dictionary, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// One `CFBundleDocumentTypes` entry.
#[derive(Default, Clone)]
pub struct DocType {
    pub name: Option<&'static str>,
    pub role: Option<&'static str>,
    pub content_types: Vec<&'static str>,
    pub extensions: Vec<&'static str>,
}

pub fn doc(role: &'static str, content_types: &[&'static str]) -> DocType {
    DocType {
        role: Some(role),
        content_types: content_types.to_vec(),
        ..Default::default()
    }
}

fn strings(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::String(v.to_string())).collect())
}

/// Write `<dir>/<name>.app/Contents/Info.plist`.
pub fn write_bundle(dir: &Path, name: &str, identifier: &str, docs: &[DocType], schemes: &[&str]) -> PathBuf {
    let bundle = dir.join(format!("{name}.app"));
    fs::create_dir_all(bundle.join("Contents")).unwrap();

    let mut info = Dictionary::new();
    info.insert("CFBundleIdentifier".into(), Value::String(identifier.into()));
    info.insert("CFBundleName".into(), Value::String(name.into()));

    let doc_types: Vec<Value> = docs
        .iter()
        .map(|doc| {
            let mut record = Dictionary::new();
            if let Some(name) = doc.name {
                record.insert("CFBundleTypeName".into(), Value::String(name.into()));
            }
            if let Some(role) = doc.role {
                record.insert("CFBundleTypeRole".into(), Value::String(role.into()));
            }
            if !doc.content_types.is_empty() {
                record.insert("LSItemContentTypes".into(), strings(&doc.content_types));
            }
            if !doc.extensions.is_empty() {
                record.insert("CFBundleTypeExtensions".into(), strings(&doc.extensions));
            }
            Value::Dictionary(record)
        })
        .collect();
    if !doc_types.is_empty() {
        info.insert("CFBundleDocumentTypes".into(), Value::Array(doc_types));
    }

    if !schemes.is_empty() {
        let mut url_type = Dictionary::new();
        url_type.insert("CFBundleURLSchemes".into(), strings(schemes));
        info.insert(
            "CFBundleURLTypes".into(),
            Value::Array(vec![Value::Dictionary(url_type)]),
        );
    }

    Value::Dictionary(info)
        .to_file_xml(bundle.join("Contents").join("Info.plist"))
        .unwrap();
    bundle
}

/// Reports every application identifier lower-cased, as Launch Services
/// commonly does.
pub struct LowercasingHandlers(pub Arc<MemoryHandlerDatabase>);

#[async_trait]
impl HandlerDatabase for LowercasingHandlers {
    async fn default_handler(&self, target: &HandlerTarget) -> os::Result<Option<String>> {
        Ok(self
            .0
            .default_handler(target)
            .await?
            .map(|identifier| identifier.to_lowercase()))
    }

    async fn default_handlers(&self, targets: &[HandlerTarget]) -> os::Result<HashMap<HandlerTarget, String>> {
        let mut found = self.0.default_handlers(targets).await?;
        for identifier in found.values_mut() {
            *identifier = identifier.to_lowercase();
        }
        Ok(found)
    }

    async fn role_handlers(&self, content_type: &str) -> os::Result<Vec<String>> {
        let handlers = self.0.role_handlers(content_type).await?;
        Ok(handlers.into_iter().map(|identifier| identifier.to_lowercase()).collect())
    }

    async fn application_path(&self, identifier: &str) -> os::Result<Option<PathBuf>> {
        self.0.application_path(identifier).await
    }

    fn supports_modern_assignment(&self) -> bool {
        self.0.supports_modern_assignment()
    }

    async fn assign_content_type(&self, identifier: &str, content_type: &str, api: AssignmentApi) -> os::Result<()> {
        self.0.assign_content_type(identifier, content_type, api).await
    }

    async fn assign_url_scheme(&self, identifier: &str, scheme: &str) -> os::Result<()> {
        self.0.assign_url_scheme(identifier, scheme).await
    }
}

pub struct TestRegistry {
    pub handle: RegistryHandle,
    pub handlers: Arc<MemoryHandlerDatabase>,
    pub apps_dir: TempDir,
}

impl TestRegistry {
    /// Memory backend over a temporary application folder.
    pub fn new(populate: impl FnOnce(&Path)) -> Self {
        Self::with_backend(BackendConfig::default(), populate)
    }

    pub fn with_backend(backend: BackendConfig, populate: impl FnOnce(&Path)) -> Self {
        Self::build(backend, |handlers| handlers as Arc<dyn HandlerDatabase>, populate)
    }

    /// Like [`new`](Self::new) but the service talks to `wrap(handlers)`.
    pub fn wrapped(
        wrap: impl FnOnce(Arc<MemoryHandlerDatabase>) -> Arc<dyn HandlerDatabase>,
        populate: impl FnOnce(&Path),
    ) -> Self {
        Self::build(BackendConfig::default(), wrap, populate)
    }

    fn build(
        backend: BackendConfig,
        wrap: impl FnOnce(Arc<MemoryHandlerDatabase>) -> Arc<dyn HandlerDatabase>,
        populate: impl FnOnce(&Path),
    ) -> Self {
        let apps_dir = TempDir::new().unwrap();
        populate(apps_dir.path());

        let handlers = Arc::new(MemoryHandlerDatabase::new());
        handlers.set_modern_assignment(backend.modern_assignment);
        for (key, app) in &backend.defaults {
            handlers.seed_default(key, app);
        }
        let services = SystemServices {
            handlers: wrap(handlers.clone()),
            ..SystemServices::in_memory(&backend)
        };

        let settings = ScanSettings {
            directories: vec![apps_dir.path().to_path_buf()],
            package_extension: "app".to_string(),
            extra_rejected_types: Vec::new(),
        };

        Self {
            handle: RegistryHandle::spawn(services, settings),
            handlers,
            apps_dir,
        }
    }
}
