//! In-process stand-ins for the system type and handler databases.
//!
//! Used as the backend on platforms without Launch Services and as the "OS"
//! in tests, where assignments can be made to fail or to be silently ignored.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use super::{AssignmentApi, ContentTypeProbe, HandlerDatabase, HandlerTarget, OsError, Result, TypeResolver};
use crate::registry::{TypeKey, tables};

#[derive(Debug, Default)]
struct TypeTables {
    by_extension: HashMap<String, String>,
    descriptions: HashMap<String, String>,
    extensions: HashMap<String, BTreeSet<String>>,
}

/// Extension and description tables held in memory.
#[derive(Debug, Default)]
pub struct MemoryTypeDatabase {
    tables: RwLock<TypeTables>,
}

impl MemoryTypeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded from the static table of well-known types.
    pub fn with_known_types() -> Self {
        let db = Self::new();
        db.seed_known_types();
        db
    }

    /// Add the well-known table without overriding existing descriptions or
    /// extension mappings.
    pub fn seed_known_types(&self) {
        for (ext, identifier) in tables::known_extension_pairs() {
            self.insert_extension(ext, identifier);
        }
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for (identifier, description) in tables::known_descriptions() {
            guard
                .descriptions
                .entry(identifier.to_string())
                .or_insert_with(|| description.to_string());
        }
    }

    pub fn insert_extension(&self, ext: &str, identifier: &str) {
        let ext = ext.trim_start_matches('.').to_lowercase();
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .by_extension
            .entry(ext.clone())
            .or_insert_with(|| identifier.to_string());
        tables
            .extensions
            .entry(identifier.to_string())
            .or_default()
            .insert(ext);
    }

    pub fn insert_description(&self, identifier: &str, description: &str) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .descriptions
            .insert(identifier.to_string(), description.to_string());
    }
}

impl TypeResolver for MemoryTypeDatabase {
    fn type_for_extension(&self, ext: &str) -> Option<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.by_extension.get(&ext.to_lowercase()).cloned()
    }

    fn describe(&self, identifier: &str) -> Option<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.descriptions.get(identifier).cloned()
    }

    fn extensions_for(&self, identifier: &str) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .extensions
            .get(identifier)
            .map(|exts| exts.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentTypeProbe for MemoryTypeDatabase {
    /// Content type by file extension. The file has to exist.
    async fn content_type(&self, path: &Path) -> Result<Option<String>> {
        tokio::fs::metadata(path).await?;
        Ok(path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.type_for_extension(ext)))
    }
}

/// One call to an assignment entry point, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub identifier: String,
    pub target: HandlerTarget,
    pub api: Option<AssignmentApi>,
}

#[derive(Debug)]
struct HandlerTables {
    defaults: HashMap<HandlerTarget, String>,
    role_handlers: HashMap<String, Vec<String>>,
    applications: HashMap<String, PathBuf>,
    modern_assignment: bool,
    rejecting: HashSet<HandlerTarget>,
    ignoring: HashSet<HandlerTarget>,
    assignments: Vec<AssignmentRecord>,
}

/// Default-handler database held in memory.
#[derive(Debug)]
pub struct MemoryHandlerDatabase {
    tables: Mutex<HandlerTables>,
}

impl Default for MemoryHandlerDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHandlerDatabase {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HandlerTables {
                defaults: HashMap::new(),
                role_handlers: HashMap::new(),
                applications: HashMap::new(),
                modern_assignment: true,
                rejecting: HashSet::new(),
                ignoring: HashSet::new(),
                assignments: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_modern_assignment(&self, available: bool) {
        self.lock().modern_assignment = available;
    }

    pub fn set_default_handler(&self, target: HandlerTarget, identifier: &str) {
        self.lock().defaults.insert(target, identifier.to_string());
    }

    /// Seed from a config-style key (`url.scheme.*` or a type identifier).
    pub fn seed_default(&self, key: &str, identifier: &str) {
        if let Some(target) = HandlerTarget::for_key(&TypeKey::parse(key)) {
            self.set_default_handler(target, identifier);
        }
    }

    pub fn register_application(&self, identifier: &str, path: impl Into<PathBuf>) {
        self.lock()
            .applications
            .insert(identifier.to_string(), path.into());
    }

    pub fn register_role_handler(&self, content_type: &str, identifier: &str) {
        let mut tables = self.lock();
        let handlers = tables
            .role_handlers
            .entry(content_type.to_string())
            .or_default();
        if !handlers.iter().any(|known| known == identifier) {
            handlers.push(identifier.to_string());
        }
    }

    /// Make every assignment for `target` fail.
    pub fn reject_assignments(&self, target: HandlerTarget) {
        self.lock().rejecting.insert(target);
    }

    /// Report success for `target` but keep the old registration.
    pub fn ignore_assignments(&self, target: HandlerTarget) {
        self.lock().ignoring.insert(target);
    }

    pub fn assignments(&self) -> Vec<AssignmentRecord> {
        self.lock().assignments.clone()
    }

    fn assign(&self, identifier: &str, target: HandlerTarget, api: Option<AssignmentApi>) -> Result<()> {
        let mut tables = self.lock();
        if api == Some(AssignmentApi::Modern) && !tables.modern_assignment {
            return Err(OsError::Unsupported("per-content-type assignment"));
        }

        tables.assignments.push(AssignmentRecord {
            identifier: identifier.to_string(),
            target: target.clone(),
            api,
        });

        if tables.rejecting.contains(&target) {
            // kLSUnknownErr
            return Err(OsError::Rejected { code: -10810 });
        }
        if !tables.ignoring.contains(&target) {
            tables.defaults.insert(target, identifier.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl HandlerDatabase for MemoryHandlerDatabase {
    async fn default_handler(&self, target: &HandlerTarget) -> Result<Option<String>> {
        Ok(self.lock().defaults.get(target).cloned())
    }

    async fn role_handlers(&self, content_type: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .role_handlers
            .get(content_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn application_path(&self, identifier: &str) -> Result<Option<PathBuf>> {
        Ok(self.lock().applications.get(identifier).cloned())
    }

    fn supports_modern_assignment(&self) -> bool {
        self.lock().modern_assignment
    }

    async fn assign_content_type(
        &self,
        identifier: &str,
        content_type: &str,
        api: AssignmentApi,
    ) -> Result<()> {
        self.assign(
            identifier,
            HandlerTarget::ContentType(content_type.to_string()),
            Some(api),
        )
    }

    async fn assign_url_scheme(&self, identifier: &str, scheme: &str) -> Result<()> {
        self.assign(identifier, HandlerTarget::UrlScheme(scheme.to_string()), None)
    }
}
