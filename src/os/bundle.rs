use plist::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{BundleReader, DirectoryLister, Result};
use crate::manifest::BundleManifest;
use crate::registry::IconHandle;

/// `std::fs` directory listing. Hidden entries are skipped and the result is
/// sorted by file name so repeated scans see the same order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirectoryLister;

impl DirectoryLister for FsDirectoryLister {
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let hidden = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.'));
            if !hidden {
                entries.push(entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// Reads `<bundle>/Contents/Info.plist`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlistBundleReader;

impl PlistBundleReader {
    fn info_plist(bundle: &Path) -> PathBuf {
        bundle.join("Contents").join("Info.plist")
    }

    fn icon(bundle: &Path, icon_file: &str) -> Option<IconHandle> {
        let mut path = bundle.join("Contents").join("Resources").join(icon_file);
        if path.extension().is_none() {
            path.set_extension("icns");
        }
        path.is_file().then(|| IconHandle::new(path))
    }
}

impl BundleReader for PlistBundleReader {
    fn read(&self, bundle: &Path) -> Result<Option<BundleManifest>> {
        let info_path = Self::info_plist(bundle);
        if !info_path.is_file() {
            return Ok(None);
        }

        let value = Value::from_file(&info_path)?;
        let Some(info) = value.as_dictionary() else {
            return Ok(None);
        };

        let mut manifest = BundleManifest::from_dictionary(info);
        manifest.icon = BundleManifest::icon_file(info)
            .and_then(|icon_file| Self::icon(bundle, &icon_file));

        Ok(Some(manifest))
    }
}
