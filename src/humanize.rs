//! Human-readable names for type identifiers and helpers for display.

use std::collections::BTreeSet;
use std::fmt;

/// Title-case each alphanumeric run: `quicktime-movie` -> `Quicktime-Movie`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Name derived from the last dot-separated component of an identifier.
pub fn name_from_identifier(identifier: &str) -> Option<String> {
    identifier
        .rsplit('.')
        .next()
        .map(str::trim)
        .filter(|last| !last.is_empty())
        .map(title_case)
}

/// Stable slug for a declared type name: lower-cased, whitespace turned into
/// `-`, everything outside `[a-z0-9-]` dropped.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|ch| if ch.is_whitespace() { '-' } else { ch })
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-')
        .collect()
}

/// Display name of a URL-scheme pseudo-type.
pub fn scheme_label(scheme: &str) -> String {
    format!("{} URL", scheme.to_uppercase())
}

/// Normalise a declared extension. `None` for empty and wildcard entries.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    (!ext.is_empty() && ext != "*").then_some(ext)
}

/// `.md, .markdown` style rendering of an extension set.
pub struct ExtensionList<'a>(pub &'a BTreeSet<String>);

impl fmt::Display for ExtensionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ext) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, ".{}", ext)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("quicktime-movie"), "Quicktime-Movie");
        assert_eq!(title_case("MARKDOWN"), "Markdown");
        assert_eq!(title_case("mpeg-4"), "Mpeg-4");
    }

    #[test]
    fn test_name_from_identifier() {
        assert_eq!(
            name_from_identifier("net.daringfireball.markdown").as_deref(),
            Some("Markdown")
        );
        assert_eq!(name_from_identifier("plain").as_deref(), Some("Plain"));
        assert_eq!(name_from_identifier("org.example."), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cursor Workspace File"), "cursor-workspace-file");
        assert_eq!(slugify("C++ Source (legacy)"), "c-source-legacy");
        assert_eq!(slugify("文档"), "");
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".MD").as_deref(), Some("md"));
        assert_eq!(normalize_extension("*"), None);
        assert_eq!(normalize_extension("  "), None);
    }

    #[test]
    fn test_extension_list_display() {
        let exts: BTreeSet<String> = ["md".to_string(), "markdown".to_string()].into();
        assert_eq!(ExtensionList(&exts).to_string(), ".markdown, .md");
    }
}
