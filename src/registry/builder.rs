use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::tables::{self, FOLDER_TYPE, GENERIC_TYPE_NAME};
use super::types::{AppRef, ApplicationRecord, CanonicalType, Role, ScanStats, Snapshot, TypeKey};
use crate::config::ScanConfig;
use crate::humanize::{name_from_identifier, normalize_extension, scheme_label, slugify};
use crate::manifest::{BundleManifest, DocumentTypeDeclaration};
use crate::os::{BundleReader, DirectoryLister, SystemServices, TypeResolver};

/// Resolved scan parameters.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub directories: Vec<PathBuf>,
    pub package_extension: String,
    pub extra_rejected_types: Vec<String>,
}

impl ScanSettings {
    pub fn from_config(config: &ScanConfig) -> Self {
        let mut directories = config.directories.clone();
        if config.include_user_applications {
            if let Some(home) = dirs::home_dir() {
                directories.push(home.join("Applications"));
            }
        }
        Self {
            directories,
            package_extension: config.package_extension.clone(),
            extra_rejected_types: config.extra_rejected_types.clone(),
        }
    }
}

/// Registry Builder: scans application folders into a fresh [`Snapshot`].
///
/// Synchronous and self-contained; callers run it off the interactive
/// thread. Nothing is visible to readers until `build` returns.
#[derive(Clone)]
pub struct Scanner {
    lister: Arc<dyn DirectoryLister>,
    bundles: Arc<dyn BundleReader>,
    types: Arc<dyn TypeResolver>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(services: &SystemServices, settings: ScanSettings) -> Self {
        Self {
            lister: services.lister.clone(),
            bundles: services.bundles.clone(),
            types: services.types.clone(),
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn build(&self) -> Snapshot {
        let scan_id = Uuid::now_v7();
        let span = info_span!("scan", %scan_id);
        let _guard = span.enter();

        let mut builder = RegistryBuilder::new(self.types.as_ref(), &self.settings.extra_rejected_types);

        for dir in &self.settings.directories {
            let entries = match self.lister.list(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable application directory");
                    builder.stats.directories_failed += 1;
                    continue;
                }
            };
            builder.stats.directories_scanned += 1;

            for entry in entries.iter().filter(|path| self.is_package(path)) {
                self.scan_bundle(entry, &mut builder);
            }
        }

        let mut snapshot = builder.finish();
        snapshot.scan_id = Some(scan_id);
        snapshot.scanned_at = Some(Utc::now());

        info!(
            applications = snapshot.applications().len(),
            types = snapshot.len(),
            bundles_skipped = snapshot.stats.bundles_skipped,
            "Scan complete"
        );
        snapshot
    }

    fn is_package(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.settings.package_extension))
    }

    fn scan_bundle(&self, path: &Path, builder: &mut RegistryBuilder<'_>) {
        let manifest = match self.bundles.read(path) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                debug!(bundle = %path.display(), "No manifest, skipping");
                builder.stats.bundles_skipped += 1;
                return;
            }
            Err(e) => {
                warn!(bundle = %path.display(), error = %e, "Unreadable bundle manifest");
                builder.stats.bundles_skipped += 1;
                return;
            }
        };

        let (Some(identifier), Some(name)) = (manifest.identifier.clone(), manifest.name.clone()) else {
            debug!(bundle = %path.display(), "Bundle without identifier or name, skipping");
            builder.stats.bundles_skipped += 1;
            return;
        };

        builder.stats.bundles_read += 1;
        builder.add_bundle(identifier, name, path, manifest);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NameSource {
    Identifier,
    Derived,
    KnownTable,
    System,
    Declared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtensionSource {
    Empty,
    KnownTable,
    Declared,
    System,
}

/// A declaration that survived normalisation.
#[derive(Debug)]
struct Accepted {
    key: TypeKey,
    role: Role,
    declared_name: Option<String>,
    declared_extensions: BTreeSet<String>,
}

struct TypeEntry {
    ty: CanonicalType,
    name_source: NameSource,
    extension_source: ExtensionSource,
    editors: usize,
}

impl TypeEntry {
    fn add_supporter(&mut self, app: &AppRef, role: Role) {
        if self.ty.supports(&app.identifier) {
            return;
        }
        if role == Role::Editor {
            self.ty.supporters.insert(self.editors, app.clone());
            self.editors += 1;
        } else {
            self.ty.supporters.push(app.clone());
        }
    }
}

/// Owned accumulation state for one scan.
struct RegistryBuilder<'a> {
    resolver: &'a dyn TypeResolver,
    extra_rejected: &'a [String],
    types: BTreeMap<TypeKey, TypeEntry>,
    applications: Vec<AppRef>,
    known: HashMap<String, AppRef>,
    stats: ScanStats,
}

impl<'a> RegistryBuilder<'a> {
    fn new(resolver: &'a dyn TypeResolver, extra_rejected: &'a [String]) -> Self {
        Self {
            resolver,
            extra_rejected,
            types: BTreeMap::new(),
            applications: Vec::new(),
            known: HashMap::new(),
            stats: ScanStats::default(),
        }
    }

    fn add_bundle(&mut self, identifier: String, name: String, path: &Path, manifest: BundleManifest) {
        let known_key = identifier.to_ascii_lowercase();
        if self.known.contains_key(&known_key) {
            debug!(bundle = %path.display(), app = %identifier, "Duplicate bundle identifier, keeping the first");
            self.stats.duplicate_bundles += 1;
            return;
        }

        let documents: Vec<Accepted> = manifest
            .document_types
            .iter()
            .flat_map(|declaration| self.extract(declaration))
            .collect();

        let mut schemes: Vec<String> = Vec::new();
        for scheme in manifest.url_types.iter().flat_map(|url| url.schemes.iter()) {
            let scheme = scheme.trim().to_lowercase();
            if !scheme.is_empty() && !schemes.contains(&scheme) {
                schemes.push(scheme);
            }
        }

        let app = Arc::new(ApplicationRecord {
            identifier: identifier.clone(),
            name,
            path: path.to_path_buf(),
            icon: manifest.icon,
            supported_types: documents.iter().map(|doc| doc.key.clone()).collect(),
        });

        for accepted in documents {
            self.merge(accepted, &app);
        }
        for scheme in schemes {
            self.merge_scheme(&scheme, &app);
        }

        if !app.supported_types.is_empty() {
            self.applications.push(app.clone());
        }
        self.known.insert(known_key, app);
    }

    /// Normalise one document-type declaration into zero or more keys.
    fn extract(&mut self, declaration: &DocumentTypeDeclaration) -> Vec<Accepted> {
        let Some(role) = Role::from_declared(declaration.role.as_deref()) else {
            self.stats.declarations_ignored += 1;
            return Vec::new();
        };

        let declared_extensions: BTreeSet<String> = declaration
            .extensions
            .iter()
            .filter_map(|ext| normalize_extension(ext))
            .collect();
        let declared_name = declaration
            .name
            .clone()
            .filter(|name| !name.trim().is_empty());

        let explicit = declaration
            .content_types
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id != FOLDER_TYPE);
        let mut identifiers = self.accept_identifiers(explicit);

        if identifiers.is_empty() {
            let legacy = declaration
                .legacy_codes
                .iter()
                .filter_map(|code| tables::legacy_code_to_type(code))
                .map(str::to_string);
            identifiers = self.accept_identifiers(legacy);
        }

        if identifiers.is_empty() {
            let by_extension: Vec<String> = declared_extensions
                .iter()
                .filter_map(|ext| self.resolver.type_for_extension(ext))
                .collect();
            identifiers = self.accept_identifiers(by_extension);
        }

        if !identifiers.is_empty() {
            return identifiers
                .into_iter()
                .map(|identifier| Accepted {
                    key: TypeKey::content(identifier),
                    role,
                    declared_name: declared_name.clone(),
                    declared_extensions: declared_extensions.clone(),
                })
                .collect();
        }

        if let Some(name) = declared_name {
            let slug = slugify(&name);
            if !declared_extensions.is_empty() && !slug.is_empty() {
                return vec![Accepted {
                    key: TypeKey::custom(&slug),
                    role,
                    declared_name: Some(name),
                    declared_extensions,
                }];
            }
        }

        self.stats.declarations_ignored += 1;
        Vec::new()
    }

    /// Drop rejected identifiers and duplicates, keeping declaration order.
    fn accept_identifiers(&self, candidates: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut accepted: Vec<String> = Vec::new();
        for identifier in candidates {
            if tables::is_rejected(&identifier, self.extra_rejected) {
                continue;
            }
            if !accepted.contains(&identifier) {
                accepted.push(identifier);
            }
        }
        accepted
    }

    fn merge(&mut self, accepted: Accepted, app: &AppRef) {
        let entry = match self.types.entry(accepted.key.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                refine(entry, &accepted);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(create(self.resolver, &accepted)),
        };
        entry.add_supporter(app, accepted.role);
    }

    fn merge_scheme(&mut self, scheme: &str, app: &AppRef) {
        let key = TypeKey::scheme(scheme);
        let entry = self.types.entry(key.clone()).or_insert_with(|| TypeEntry {
            ty: CanonicalType::new(key, scheme_label(scheme), BTreeSet::new()),
            name_source: NameSource::Declared,
            extension_source: ExtensionSource::Empty,
            editors: 0,
        });
        entry.add_supporter(app, Role::Viewer);
    }

    fn finish(mut self) -> Snapshot {
        self.stats.url_schemes = self.types.keys().filter(|key| key.is_url_scheme()).count();
        self.stats.document_types = self.types.len() - self.stats.url_schemes;

        let types = self
            .types
            .into_iter()
            .map(|(key, entry)| (key, entry.ty))
            .collect();
        Snapshot::from_parts(self.applications, types, self.known, self.stats)
    }
}

fn create(resolver: &dyn TypeResolver, accepted: &Accepted) -> TypeEntry {
    let (name, name_source) = if accepted.key.is_custom() {
        let name = accepted.declared_name.clone().unwrap_or_default();
        (name, NameSource::Declared)
    } else {
        resolve_name(resolver, accepted.key.as_str(), accepted.declared_name.as_deref())
    };

    let (extensions, extension_source) = if accepted.key.is_custom() {
        (accepted.declared_extensions.clone(), ExtensionSource::Declared)
    } else {
        resolve_extensions(resolver, accepted.key.as_str(), &accepted.declared_extensions)
    };

    TypeEntry {
        ty: CanonicalType::new(accepted.key.clone(), name, extensions),
        name_source,
        extension_source,
        editors: 0,
    }
}

/// Fold a later declaration of an existing key into its entry.
fn refine(entry: &mut TypeEntry, accepted: &Accepted) {
    if entry.name_source < NameSource::Declared {
        if let Some(name) = accepted.declared_name.as_deref().filter(|n| is_meaningful_name(n)) {
            entry.ty.name = name.to_string();
            entry.name_source = NameSource::Declared;
        }
    }

    if accepted.declared_extensions.is_empty() {
        return;
    }
    match entry.extension_source {
        ExtensionSource::System => {}
        ExtensionSource::Declared => {
            let mut merged = entry.ty.extensions.clone();
            merged.extend(accepted.declared_extensions.iter().cloned());
            entry.ty.set_extensions(merged);
        }
        ExtensionSource::KnownTable | ExtensionSource::Empty => {
            entry.ty.set_extensions(accepted.declared_extensions.clone());
            entry.extension_source = ExtensionSource::Declared;
        }
    }
}

fn is_meaningful_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name != GENERIC_TYPE_NAME
}

fn resolve_name(resolver: &dyn TypeResolver, identifier: &str, declared: Option<&str>) -> (String, NameSource) {
    if let Some(name) = declared.filter(|n| is_meaningful_name(n)) {
        return (name.trim().to_string(), NameSource::Declared);
    }
    if let Some(description) = resolver.describe(identifier).filter(|d| !d.trim().is_empty()) {
        return (description, NameSource::System);
    }
    if let Some(description) = tables::known_description(identifier) {
        return (description.to_string(), NameSource::KnownTable);
    }
    if let Some(derived) = name_from_identifier(identifier) {
        return (derived, NameSource::Derived);
    }
    (identifier.to_string(), NameSource::Identifier)
}

/// System-reported extensions win outright; no union with declared ones.
fn resolve_extensions(
    resolver: &dyn TypeResolver,
    identifier: &str,
    declared: &BTreeSet<String>,
) -> (BTreeSet<String>, ExtensionSource) {
    let system: BTreeSet<String> = resolver
        .extensions_for(identifier)
        .iter()
        .filter_map(|ext| normalize_extension(ext))
        .collect();
    if !system.is_empty() {
        return (system, ExtensionSource::System);
    }
    if !declared.is_empty() {
        return (declared.clone(), ExtensionSource::Declared);
    }
    let known: BTreeSet<String> = tables::known_extensions(identifier)
        .iter()
        .map(|ext| ext.to_string())
        .collect();
    if !known.is_empty() {
        return (known, ExtensionSource::KnownTable);
    }
    (BTreeSet::new(), ExtensionSource::Empty)
}

/// Name and extensions for a type discovered outside a scan.
pub(crate) fn describe_type(
    resolver: &dyn TypeResolver,
    identifier: &str,
    fallback_extension: Option<&str>,
) -> (String, BTreeSet<String>) {
    let (name, _) = resolve_name(resolver, identifier, None);
    let declared: BTreeSet<String> = fallback_extension.and_then(normalize_extension).into_iter().collect();
    let (extensions, _) = resolve_extensions(resolver, identifier, &declared);
    (name, extensions)
}
