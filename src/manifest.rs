//! Strongly-typed bundle manifest.
//!
//! `Info.plist` dictionaries are untyped and frequently sloppy (a string where
//! an array belongs, numbers in name fields). Conversion happens once here;
//! anything with the wrong shape is dropped key by key instead of failing the
//! whole bundle.

use plist::{Dictionary, Value};

use crate::registry::IconHandle;

/// One `CFBundleDocumentTypes` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTypeDeclaration {
    pub name: Option<String>,
    pub role: Option<String>,
    pub content_types: Vec<String>,
    pub legacy_codes: Vec<String>,
    pub extensions: Vec<String>,
}

/// One `CFBundleURLTypes` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlTypeDeclaration {
    pub name: Option<String>,
    pub schemes: Vec<String>,
}

/// What the bundle reader hands to the registry builder.
#[derive(Debug, Clone, Default)]
pub struct BundleManifest {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub icon: Option<IconHandle>,
    pub document_types: Vec<DocumentTypeDeclaration>,
    pub url_types: Vec<UrlTypeDeclaration>,
}

impl BundleManifest {
    /// Build from a parsed `Info.plist` root dictionary. The icon is resolved
    /// by the reader, which knows the bundle layout.
    pub fn from_dictionary(info: &Dictionary) -> Self {
        let name = string(info, "CFBundleName").or_else(|| string(info, "CFBundleDisplayName"));

        Self {
            identifier: string(info, "CFBundleIdentifier"),
            name,
            icon: None,
            document_types: dictionaries(info, "CFBundleDocumentTypes")
                .map(DocumentTypeDeclaration::from_dictionary)
                .collect(),
            url_types: dictionaries(info, "CFBundleURLTypes")
                .map(UrlTypeDeclaration::from_dictionary)
                .collect(),
        }
    }

    pub fn icon_file(info: &Dictionary) -> Option<String> {
        string(info, "CFBundleIconFile")
    }

    pub fn declares_anything(&self) -> bool {
        !self.document_types.is_empty() || !self.url_types.is_empty()
    }
}

impl DocumentTypeDeclaration {
    fn from_dictionary(record: &Dictionary) -> Self {
        Self {
            name: string(record, "CFBundleTypeName"),
            role: string(record, "CFBundleTypeRole"),
            content_types: strings(record, "LSItemContentTypes"),
            legacy_codes: strings(record, "CFBundleTypeOSTypes"),
            extensions: strings(record, "CFBundleTypeExtensions"),
        }
    }
}

impl UrlTypeDeclaration {
    fn from_dictionary(record: &Dictionary) -> Self {
        Self {
            name: string(record, "CFBundleURLName"),
            schemes: strings(record, "CFBundleURLSchemes"),
        }
    }
}

pub(crate) fn string(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn strings(dict: &Dictionary, key: &str) -> Vec<String> {
    match dict.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_string)
            .map(str::to_string)
            .collect(),
        // a lone string where an array was expected
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn dictionaries<'a>(dict: &'a Dictionary, key: &str) -> impl Iterator<Item = &'a Dictionary> {
    dict.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> BundleManifest {
        let value = Value::from_reader_xml(xml.as_bytes()).unwrap();
        BundleManifest::from_dictionary(value.as_dictionary().unwrap())
    }

    #[test]
    fn test_full_manifest() {
        let manifest = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key><string>com.example.editor</string>
    <key>CFBundleName</key><string>Editor</string>
    <key>CFBundleDocumentTypes</key>
    <array>
        <dict>
            <key>CFBundleTypeName</key><string>Markdown</string>
            <key>CFBundleTypeRole</key><string>Editor</string>
            <key>LSItemContentTypes</key>
            <array><string>net.daringfireball.markdown</string></array>
            <key>CFBundleTypeExtensions</key>
            <array><string>md</string><string>markdown</string></array>
        </dict>
    </array>
    <key>CFBundleURLTypes</key>
    <array>
        <dict>
            <key>CFBundleURLSchemes</key>
            <array><string>editor</string></array>
        </dict>
    </array>
</dict>
</plist>"#,
        );

        assert_eq!(manifest.identifier.as_deref(), Some("com.example.editor"));
        assert_eq!(manifest.name.as_deref(), Some("Editor"));
        assert_eq!(manifest.document_types.len(), 1);
        let doc = &manifest.document_types[0];
        assert_eq!(doc.role.as_deref(), Some("Editor"));
        assert_eq!(doc.content_types, vec!["net.daringfireball.markdown"]);
        assert_eq!(doc.extensions, vec!["md", "markdown"]);
        assert_eq!(manifest.url_types[0].schemes, vec!["editor"]);
    }

    #[test]
    fn test_sloppy_values_are_tolerated() {
        let manifest = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key><string>com.example.sloppy</string>
    <key>CFBundleDisplayName</key><string>Sloppy</string>
    <key>CFBundleDocumentTypes</key>
    <array>
        <string>not a dictionary</string>
        <dict>
            <key>CFBundleTypeName</key><integer>7</integer>
            <key>CFBundleTypeExtensions</key><string>sl</string>
        </dict>
    </array>
</dict>
</plist>"#,
        );

        assert_eq!(manifest.name.as_deref(), Some("Sloppy"));
        assert_eq!(manifest.document_types.len(), 1);
        assert_eq!(manifest.document_types[0].name, None);
        assert_eq!(manifest.document_types[0].extensions, vec!["sl"]);
        assert!(manifest.url_types.is_empty());
    }
}
