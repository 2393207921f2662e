//! Static well-known tables consulted while normalising declarations.

/// Pseudo-type for directories. Never a file type.
pub const FOLDER_TYPE: &str = "public.folder";

/// Placeholder type name that carries no information.
pub const GENERIC_TYPE_NAME: &str = "Document";

/// Legacy codes that match everything (or all text) and say nothing useful.
pub const WILDCARD_TYPE_CODES: &[&str] = &["****", "fold", "TEXT", "utxt", "TUTX"];

const LEGACY_TYPE_CODES: &[(&str, &str)] = &[
    ("PDF ", "com.adobe.pdf"),
    ("JPEG", "public.jpeg"),
    ("PNG ", "public.png"),
    ("GIF ", "com.compuserve.gif"),
    ("TIFF", "public.tiff"),
    ("MPEG", "public.mpeg"),
    ("MP4 ", "public.mpeg-4"),
    ("MOV ", "com.apple.quicktime-movie"),
    ("ZIP ", "public.zip-archive"),
    ("RTF ", "public.rtf"),
];

const REJECTED_TYPES: &[&str] = &[
    "public.data",
    "public.content",
    "public.item",
    "public.database",
    "public.composite-content",
    "public.text",
    "com.apple.package",
    "public.folder",
    "public.directory",
];

const REJECTED_PREFIXES: &[&str] = &["dyn.", "com.apple.internal"];

const KNOWN_TYPES: &[(&str, &str, &[&str])] = &[
    ("public.plain-text", "Plain Text Document", &["txt", "text"]),
    ("public.rtf", "RTF Document", &["rtf"]),
    ("com.adobe.pdf", "PDF Document", &["pdf"]),
    ("public.html", "HTML Document", &["html", "htm"]),
    ("public.xml", "XML Document", &["xml"]),
    ("public.jpeg", "JPEG Image", &["jpg", "jpeg"]),
    ("public.png", "PNG Image", &["png"]),
    ("public.tiff", "TIFF Image", &["tiff", "tif"]),
    ("com.compuserve.gif", "GIF Image", &["gif"]),
    ("public.svg-image", "SVG Image", &["svg"]),
    ("public.mpeg", "MPEG Movie", &["mpeg", "mpg"]),
    ("public.mpeg-4", "MPEG-4 Movie", &["mp4", "m4v"]),
    ("public.avi", "AVI Movie", &["avi"]),
    ("com.apple.quicktime-movie", "QuickTime Movie", &["mov", "qt"]),
    ("public.mp3", "MP3 Audio", &["mp3"]),
    ("public.aac-audio", "AAC Audio", &["aac", "m4a"]),
    ("com.microsoft.waveform-audio", "WAV Audio", &["wav"]),
    ("public.zip-archive", "ZIP Archive", &["zip"]),
    ("public.tar-archive", "TAR Archive", &["tar"]),
    ("org.gnu.gnu-zip-archive", "GZIP Archive", &["gz", "gzip"]),
    ("com.microsoft.word.doc", "Word Document", &["doc"]),
    ("org.openxmlformats.wordprocessingml.document", "Word Document", &["docx"]),
    ("com.microsoft.excel.xls", "Excel Spreadsheet", &["xls"]),
    ("org.openxmlformats.spreadsheetml.sheet", "Excel Spreadsheet", &["xlsx"]),
    ("com.microsoft.powerpoint.ppt", "PowerPoint Presentation", &["ppt"]),
    (
        "org.openxmlformats.presentationml.presentation",
        "PowerPoint Presentation",
        &["pptx"],
    ),
];

/// Map a legacy four-character code to a canonical identifier.
/// Wildcards and unknown codes map to nothing.
pub fn legacy_code_to_type(code: &str) -> Option<&'static str> {
    if WILDCARD_TYPE_CODES.contains(&code) {
        return None;
    }
    LEGACY_TYPE_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, identifier)| *identifier)
}

/// Generic classes and internal or dynamic identifiers never become entries.
pub fn is_rejected(identifier: &str, extra: &[String]) -> bool {
    REJECTED_TYPES.contains(&identifier)
        || REJECTED_PREFIXES
            .iter()
            .any(|prefix| identifier.starts_with(prefix))
        || extra.iter().any(|rejected| rejected == identifier)
}

pub fn known_description(identifier: &str) -> Option<&'static str> {
    KNOWN_TYPES
        .iter()
        .find(|(known, _, _)| *known == identifier)
        .map(|(_, description, _)| *description)
}

pub fn known_extensions(identifier: &str) -> &'static [&'static str] {
    KNOWN_TYPES
        .iter()
        .find(|(known, _, _)| *known == identifier)
        .map(|(_, _, extensions)| *extensions)
        .unwrap_or(&[])
}

/// Every (extension, identifier) pair in the known table, used to seed the
/// in-process type database.
pub fn known_extension_pairs() -> impl Iterator<Item = (&'static str, &'static str)> {
    KNOWN_TYPES.iter().flat_map(|(identifier, _, extensions)| {
        extensions.iter().map(move |ext| (*ext, *identifier))
    })
}

pub fn known_descriptions() -> impl Iterator<Item = (&'static str, &'static str)> {
    KNOWN_TYPES
        .iter()
        .map(|(identifier, description, _)| (*identifier, *description))
}
