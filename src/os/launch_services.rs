//! Launch Services backend for macOS.
//!
//! Type descriptions and extension tags come from the system's exported and
//! imported type declarations (`CoreTypes.bundle`), read once at start-up.
//! Handler queries and assignments go through short Swift scripts run with
//! `swift -e`; batch lookups use a single script per call.

use async_trait::async_trait;
use plist::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{
    AssignmentApi, ContentTypeProbe, HandlerDatabase, HandlerTarget, OsError, Result, TypeResolver,
};
use crate::manifest;
use crate::os::MemoryTypeDatabase;

const CORE_TYPES_PLIST: &str = "/System/Library/CoreServices/CoreTypes.bundle/Contents/Info.plist";
const DECLARATION_KEYS: &[&str] = &["UTExportedTypeDeclarations", "UTImportedTypeDeclarations"];
const EXTENSION_TAG: &str = "public.filename-extension";
/// First macOS release with `NSWorkspace.setDefaultApplication(at:toOpenContentType:)`.
const MODERN_ASSIGNMENT_MAJOR: u32 = 12;

/// kLSApplicationNotFoundErr
const APPLICATION_NOT_FOUND: i32 = -10814;
/// paramErr
const PARAM_ERR: i32 = -50;

pub struct LaunchServices {
    types: MemoryTypeDatabase,
    modern_assignment: bool,
}

impl LaunchServices {
    pub fn new() -> Self {
        let types = MemoryTypeDatabase::new();
        match load_type_declarations(&types, Path::new(CORE_TYPES_PLIST)) {
            Ok(count) => debug!(count, "Loaded system type declarations"),
            Err(e) => warn!(error = %e, "System type declarations unavailable, using built-in table"),
        }
        types.seed_known_types();

        let modern_assignment = product_major_version().is_some_and(|major| major >= MODERN_ASSIGNMENT_MAJOR);
        Self {
            types,
            modern_assignment,
        }
    }
}

impl Default for LaunchServices {
    fn default() -> Self {
        Self::new()
    }
}

/// Read `UT*TypeDeclarations` from a bundle manifest into `db`.
fn load_type_declarations(db: &MemoryTypeDatabase, path: &Path) -> Result<usize> {
    let value = Value::from_file(path)?;
    let Some(info) = value.as_dictionary() else {
        return Ok(0);
    };

    let mut count = 0;
    for key in DECLARATION_KEYS {
        for declaration in manifest::dictionaries(info, key) {
            let Some(identifier) = manifest::string(declaration, "UTTypeIdentifier") else {
                continue;
            };
            if let Some(description) = manifest::string(declaration, "UTTypeDescription") {
                db.insert_description(&identifier, &description);
            }
            if let Some(tags) = declaration
                .get("UTTypeTagSpecification")
                .and_then(Value::as_dictionary)
            {
                for ext in manifest::strings(tags, EXTENSION_TAG) {
                    db.insert_extension(&ext, &identifier);
                }
            }
            count += 1;
        }
    }
    Ok(count)
}

fn product_major_version() -> Option<u32> {
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// Swift string literal for `value`.
fn literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            ch if ch.is_control() => out.push_str(&format!("\\u{{{:x}}}", ch as u32)),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}

fn target_name(target: &HandlerTarget) -> &str {
    match target {
        HandlerTarget::ContentType(id) => id,
        HandlerTarget::UrlScheme(scheme) => scheme,
    }
}

fn array_literal<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let items: Vec<String> = values.into_iter().map(literal).collect();
    format!("[{}]", items.join(", "))
}

async fn run_swift(script: &str) -> Result<String> {
    let output = Command::new("swift").args(["-e", script]).output().await?;
    if !output.status.success() {
        return Err(OsError::Command {
            program: "swift".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Interpret the `SUCCESS` / `ERROR:<status>` protocol of the write scripts.
fn status(stdout: &str) -> Result<()> {
    let line = stdout.lines().last().unwrap_or("").trim();
    if line == "SUCCESS" {
        return Ok(());
    }
    match line.strip_prefix("ERROR:").map(|code| code.trim().parse::<i32>()) {
        Some(Ok(code)) => Err(OsError::Rejected { code }),
        _ => Err(OsError::Command {
            program: "swift".to_string(),
            message: format!("unexpected output: {line}"),
        }),
    }
}

fn non_empty(stdout: &str) -> Option<String> {
    let value = stdout.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl TypeResolver for LaunchServices {
    fn type_for_extension(&self, ext: &str) -> Option<String> {
        self.types.type_for_extension(ext)
    }

    fn describe(&self, identifier: &str) -> Option<String> {
        self.types.describe(identifier)
    }

    fn extensions_for(&self, identifier: &str) -> Vec<String> {
        self.types.extensions_for(identifier)
    }
}

#[async_trait]
impl ContentTypeProbe for LaunchServices {
    async fn content_type(&self, path: &Path) -> Result<Option<String>> {
        tokio::fs::metadata(path).await?;

        let output = Command::new("mdls")
            .args(["-raw", "-name", "kMDItemContentType"])
            .arg(path)
            .output()
            .await?;
        let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !reported.is_empty() && reported != "(null)" {
            return Ok(Some(reported));
        }

        // not indexed by Spotlight
        Ok(path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.types.type_for_extension(ext)))
    }
}

#[async_trait]
impl HandlerDatabase for LaunchServices {
    async fn default_handler(&self, target: &HandlerTarget) -> Result<Option<String>> {
        let found = self.default_handlers(std::slice::from_ref(target)).await?;
        Ok(found.get(target).cloned())
    }

    async fn default_handlers(&self, targets: &[HandlerTarget]) -> Result<HashMap<HandlerTarget, String>> {
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        // answers come back one tab-separated line per target
        let (printable, unprintable): (Vec<&HandlerTarget>, Vec<&HandlerTarget>) =
            targets.iter().partition(|target| !has_control(target_name(target)));
        for target in unprintable {
            debug!(?target, "Skipping default lookup for identifier with control characters");
        }

        let content_types = printable.iter().filter_map(|target| match target {
            HandlerTarget::ContentType(id) => Some(id.as_str()),
            HandlerTarget::UrlScheme(_) => None,
        });
        let schemes = printable.iter().filter_map(|target| match target {
            HandlerTarget::UrlScheme(scheme) => Some(scheme.as_str()),
            HandlerTarget::ContentType(_) => None,
        });

        let script = format!(
            r#"
import Foundation
import CoreServices

let types: [String] = {types}
let schemes: [String] = {schemes}

for t in types {{
    if let h = LSCopyDefaultRoleHandlerForContentType(t as CFString, .all) {{
        print("type\t\(t)\t\(h.takeRetainedValue() as String)")
    }}
}}
for s in schemes {{
    if let h = LSCopyDefaultHandlerForURLScheme(s as CFString) {{
        print("scheme\t\(s)\t\(h.takeRetainedValue() as String)")
    }}
}}
"#,
            types = array_literal(content_types),
            schemes = array_literal(schemes),
        );

        let stdout = run_swift(&script).await?;
        Ok(parse_handler_lines(&stdout))
    }

    async fn role_handlers(&self, content_type: &str) -> Result<Vec<String>> {
        let script = format!(
            r#"
import Foundation
import CoreServices

if let all = LSCopyAllRoleHandlersForContentType({t} as CFString, .all)?.takeRetainedValue() as? [String] {{
    for id in all {{ print(id) }}
}}
"#,
            t = literal(content_type),
        );
        let stdout = run_swift(&script).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn application_path(&self, identifier: &str) -> Result<Option<PathBuf>> {
        let script = format!(
            r#"
import AppKit

if let url = NSWorkspace.shared.urlForApplication(withBundleIdentifier: {id}) {{
    print(url.path)
}}
"#,
            id = literal(identifier),
        );
        let stdout = run_swift(&script).await?;
        Ok(non_empty(&stdout).map(PathBuf::from))
    }

    fn supports_modern_assignment(&self) -> bool {
        self.modern_assignment
    }

    async fn assign_content_type(
        &self,
        identifier: &str,
        content_type: &str,
        api: AssignmentApi,
    ) -> Result<()> {
        let script = match api {
            AssignmentApi::Modern => {
                if !self.modern_assignment {
                    return Err(OsError::Unsupported("per-content-type assignment"));
                }
                format!(
                    r#"
import AppKit
import UniformTypeIdentifiers

guard let app = NSWorkspace.shared.urlForApplication(withBundleIdentifier: {id}) else {{
    print("ERROR:{not_found}")
    exit(0)
}}
guard let type = UTType({t}) else {{
    print("ERROR:{param}")
    exit(0)
}}
let done = DispatchSemaphore(value: 0)
var code = 0
NSWorkspace.shared.setDefaultApplication(at: app, toOpenContentType: type) {{ error in
    if let error = error as NSError? {{ code = error.code }}
    done.signal()
}}
done.wait()
print(code == 0 ? "SUCCESS" : "ERROR:\(code)")
"#,
                    id = literal(identifier),
                    t = literal(content_type),
                    not_found = APPLICATION_NOT_FOUND,
                    param = PARAM_ERR,
                )
            }
            AssignmentApi::Legacy => format!(
                r#"
import Foundation
import CoreServices

let result = LSSetDefaultRoleHandlerForContentType({t} as CFString, .all, {id} as CFString)
print(result == noErr ? "SUCCESS" : "ERROR:\(result)")
"#,
                id = literal(identifier),
                t = literal(content_type),
            ),
        };

        status(&run_swift(&script).await?)
    }

    async fn assign_url_scheme(&self, identifier: &str, scheme: &str) -> Result<()> {
        let script = format!(
            r#"
import Foundation
import CoreServices

let result = LSSetDefaultHandlerForURLScheme({s} as CFString, {id} as CFString)
print(result == noErr ? "SUCCESS" : "ERROR:\(result)")
"#,
            id = literal(identifier),
            s = literal(scheme),
        );
        status(&run_swift(&script).await?)
    }
}

fn parse_handler_lines(stdout: &str) -> HashMap<HandlerTarget, String> {
    let mut found = HashMap::new();
    for line in stdout.lines() {
        let mut fields = line.trim_end().splitn(3, '\t');
        let (Some(kind), Some(name), Some(app)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        let target = match kind {
            "type" => HandlerTarget::ContentType(name.to_string()),
            "scheme" => HandlerTarget::UrlScheme(name.to_string()),
            _ => continue,
        };
        if !app.is_empty() {
            found.insert(target, app.to_string());
        }
    }
    found
}
