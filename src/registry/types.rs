use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const URL_SCHEME_PREFIX: &str = "url.scheme.";
pub const CUSTOM_TYPE_PREFIX: &str = "custom.filetype.";

/// Shared application record. Types and the application list point at the
/// same allocation, so a snapshot clone stays cheap.
pub type AppRef = Arc<ApplicationRecord>;

/// Registry key: a canonical type identifier, a synthesized custom key or a
/// URL-scheme pseudo-type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(String);

/// Borrowed view of what a [`TypeKey`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind<'a> {
    Content(&'a str),
    Custom(&'a str),
    Scheme(&'a str),
}

impl TypeKey {
    pub fn content(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn scheme(scheme: &str) -> Self {
        Self(format!("{}{}", URL_SCHEME_PREFIX, scheme.trim().to_lowercase()))
    }

    pub fn custom(slug: &str) -> Self {
        Self(format!("{}{}", CUSTOM_TYPE_PREFIX, slug))
    }

    /// Wrap a key as printed by [`fmt::Display`] (CLI input, config tables).
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> KeyKind<'_> {
        if let Some(scheme) = self.0.strip_prefix(URL_SCHEME_PREFIX) {
            KeyKind::Scheme(scheme)
        } else if let Some(slug) = self.0.strip_prefix(CUSTOM_TYPE_PREFIX) {
            KeyKind::Custom(slug)
        } else {
            KeyKind::Content(&self.0)
        }
    }

    pub fn is_url_scheme(&self) -> bool {
        matches!(self.kind(), KeyKind::Scheme(_))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind(), KeyKind::Custom(_))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Serialize for TypeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Capability an application claims over a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Editor,
    Viewer,
    Shell,
    PreviewGenerator,
}

impl Role {
    /// Map a declared role string. Missing means `Editor`; roles outside the
    /// accepted set (e.g. `None`) yield `None`.
    pub fn from_declared(declared: Option<&str>) -> Option<Self> {
        match declared.map(str::trim) {
            None | Some("Editor") => Some(Role::Editor),
            Some("Viewer") => Some(Role::Viewer),
            Some("Shell") => Some(Role::Shell),
            Some("QLGenerator") => Some(Role::PreviewGenerator),
            Some(_) => None,
        }
    }
}

/// Coarse grouping used for filtering listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Document,
    Image,
    Audio,
    Video,
    Archive,
    SourceCode,
    UrlScheme,
    Other,
}

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Audio, &["audio", "mp3", "aiff", "wav", "flac", "midi"]),
    (Category::Video, &["movie", "video", "mpeg", "avi", "quicktime"]),
    (Category::Image, &["image", "jpeg", "png", "tiff", "gif", "heic", "bmp", "svg"]),
    (Category::Archive, &["archive", "zip", "tar", "gzip", "bzip2", "disk-image"]),
    (Category::SourceCode, &["source", "script", "shell", "json", "yaml", "toml"]),
    (
        Category::Document,
        &[
            "text", "pdf", "rtf", "document", "word", "excel", "spreadsheet",
            "presentation", "powerpoint", "html", "xml", "markdown", "epub",
        ],
    ),
];

const CATEGORY_EXTENSIONS: &[(Category, &[&str])] = &[
    (Category::Audio, &["mp3", "m4a", "aac", "wav", "flac", "aiff", "ogg"]),
    (Category::Video, &["mp4", "m4v", "mov", "avi", "mkv", "webm", "mpg"]),
    (Category::Image, &["jpg", "jpeg", "png", "gif", "tif", "tiff", "heic", "webp", "bmp", "svg"]),
    (Category::Archive, &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "dmg"]),
    (
        Category::SourceCode,
        &["rs", "c", "h", "cpp", "py", "js", "ts", "go", "swift", "java", "rb", "sh", "json", "yaml", "yml", "toml"],
    ),
    (
        Category::Document,
        &["txt", "md", "pdf", "rtf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "pages", "numbers", "key", "html", "epub"],
    ),
];

impl Category {
    pub fn classify(key: &TypeKey, extensions: &BTreeSet<String>) -> Self {
        let identifier = match key.kind() {
            KeyKind::Scheme(_) => return Category::UrlScheme,
            KeyKind::Content(id) => id.to_lowercase(),
            KeyKind::Custom(slug) => slug.to_string(),
        };

        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|word| identifier.contains(word)) {
                return *category;
            }
        }

        for (category, known) in CATEGORY_EXTENSIONS {
            if extensions.iter().any(|ext| known.contains(&ext.as_str())) {
                return *category;
            }
        }

        Category::Other
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Document => "document",
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Video => "video",
            Category::Archive => "archive",
            Category::SourceCode => "source-code",
            Category::UrlScheme => "url-scheme",
            Category::Other => "other",
        }
    }
}

/// Path to an application's icon resource. Absence is a normal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IconHandle(PathBuf);

impl IconHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// An installed application. Identity is the bundle identifier alone,
/// compared without regard to ASCII case.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationRecord {
    pub identifier: String,
    pub name: String,
    pub path: PathBuf,
    pub icon: Option<IconHandle>,
    /// Document type keys this application contributed to the registry.
    pub supported_types: BTreeSet<TypeKey>,
}

impl ApplicationRecord {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            path: path.into(),
            icon: None,
            supported_types: BTreeSet::new(),
        }
    }
}

impl PartialEq for ApplicationRecord {
    fn eq(&self, other: &Self) -> bool {
        same_identifier(&self.identifier, &other.identifier)
    }
}

impl Eq for ApplicationRecord {}

impl Hash for ApplicationRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.to_ascii_lowercase().hash(state);
    }
}

/// Bundle identifiers are case-insensitive; the handler database often
/// reports them lower-cased.
pub fn same_identifier(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Registry entry for one type key.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalType {
    pub key: TypeKey,
    pub name: String,
    pub extensions: BTreeSet<String>,
    pub category: Category,
    /// Editors first, then everything else, each group in scan order.
    pub supporters: Vec<AppRef>,
    pub default_app: Option<AppRef>,
}

impl CanonicalType {
    pub fn new(key: TypeKey, name: impl Into<String>, extensions: BTreeSet<String>) -> Self {
        let category = Category::classify(&key, &extensions);
        Self {
            key,
            name: name.into(),
            extensions,
            category,
            supporters: Vec::new(),
            default_app: None,
        }
    }

    pub fn supports(&self, identifier: &str) -> bool {
        self.supporters
            .iter()
            .any(|app| same_identifier(&app.identifier, identifier))
    }

    pub fn is_default(&self, identifier: &str) -> bool {
        self.default_app
            .as_ref()
            .is_some_and(|app| same_identifier(&app.identifier, identifier))
    }

    /// The handler to fall back on when a single one is needed.
    pub fn preferred_supporter(&self) -> Option<&AppRef> {
        self.supporters.first()
    }

    pub fn is_document_type(&self) -> bool {
        !self.key.is_url_scheme()
    }

    pub(crate) fn set_extensions(&mut self, extensions: BTreeSet<String>) {
        self.extensions = extensions;
        self.category = Category::classify(&self.key, &self.extensions);
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.key.as_str().to_lowercase().contains(needle)
            || self.extensions.iter().any(|ext| ext.contains(needle))
            || self
                .default_app
                .as_ref()
                .is_some_and(|app| app.name.to_lowercase().contains(needle))
    }
}

/// Per-scan counters. Partial failures end up here instead of in errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub directories_scanned: usize,
    pub directories_failed: usize,
    pub bundles_read: usize,
    pub bundles_skipped: usize,
    pub duplicate_bundles: usize,
    pub declarations_ignored: usize,
    pub document_types: usize,
    pub url_schemes: usize,
    pub defaults_resolved: usize,
}

/// Immutable registry published as a unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub scan_id: Option<Uuid>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub stats: ScanStats,
    applications: Vec<AppRef>,
    types: BTreeMap<TypeKey, CanonicalType>,
    /// Every bundle seen by the scan, document-capable or not, keyed by
    /// lower-cased identifier.
    #[serde(skip)]
    known: HashMap<String, AppRef>,
}

fn sort_key(name: &str, tie: &str) -> (String, String) {
    (name.to_lowercase(), tie.to_string())
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        mut applications: Vec<AppRef>,
        types: BTreeMap<TypeKey, CanonicalType>,
        known: HashMap<String, AppRef>,
        stats: ScanStats,
    ) -> Self {
        applications.sort_by_cached_key(|app| sort_key(&app.name, &app.identifier));
        let known = known
            .into_iter()
            .map(|(identifier, app)| (identifier.to_ascii_lowercase(), app))
            .collect();
        Self {
            generation: 0,
            scan_id: None,
            scanned_at: None,
            stats,
            applications,
            types,
            known,
        }
    }

    /// Document-capable applications, sorted by display name.
    pub fn applications(&self) -> &[AppRef] {
        &self.applications
    }

    pub fn application(&self, identifier: &str) -> Option<&AppRef> {
        self.applications
            .iter()
            .find(|app| same_identifier(&app.identifier, identifier))
    }

    /// Any scanned bundle, including those that only declare URL schemes.
    /// The returned record carries the identifier as the bundle spells it.
    pub fn known_application(&self, identifier: &str) -> Option<&AppRef> {
        self.known.get(&identifier.to_ascii_lowercase())
    }

    pub fn get(&self, key: &TypeKey) -> Option<&CanonicalType> {
        self.types.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.types.keys()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types ordered by display name.
    pub fn types(&self) -> Vec<&CanonicalType> {
        let mut types: Vec<&CanonicalType> = self.types.values().collect();
        types.sort_by_cached_key(|ty| sort_key(&ty.name, ty.key.as_str()));
        types
    }

    pub fn types_in(&self, category: Category) -> Vec<&CanonicalType> {
        self.types()
            .into_iter()
            .filter(|ty| ty.category == category)
            .collect()
    }

    pub fn search_types(&self, query: &str) -> Vec<&CanonicalType> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.types();
        }
        self.types()
            .into_iter()
            .filter(|ty| ty.matches(&needle))
            .collect()
    }

    pub fn search_applications(&self, query: &str) -> Vec<&AppRef> {
        let needle = query.trim().to_lowercase();
        self.applications
            .iter()
            .filter(|app| {
                needle.is_empty()
                    || app.name.to_lowercase().contains(&needle)
                    || app.identifier.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Types listing `identifier` as a supporter, ordered by display name.
    pub fn types_for_application(&self, identifier: &str) -> Vec<&CanonicalType> {
        self.types()
            .into_iter()
            .filter(|ty| ty.supports(identifier))
            .collect()
    }

    pub fn default_count(&self, identifier: &str) -> usize {
        self.types_for_application(identifier)
            .into_iter()
            .filter(|ty| ty.is_default(identifier))
            .count()
    }

    pub fn document_type_count(&self) -> usize {
        self.types.values().filter(|ty| ty.is_document_type()).count()
    }

    /// Point `key` at a new default. Returns false for unknown keys.
    pub(crate) fn set_default(&mut self, key: &TypeKey, app: Option<AppRef>) -> bool {
        match self.types.get_mut(key) {
            Some(entry) => {
                entry.default_app = app;
                true
            }
            None => false,
        }
    }
}
