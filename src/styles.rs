//! Style reference images stored as `style_<Name>.<ext>` in a directory.

use crate::error::{GenError, Result};
use crate::models::ImageKind;
use std::fs;
use std::path::{Path, PathBuf};

const STYLE_PREFIX: &str = "style_";

/// Extensions tried, in order, when resolving a style name.
pub const STYLE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

#[derive(Debug, Clone, PartialEq)]
pub struct StyleReference {
    pub name: String,
    pub path: PathBuf,
    pub kind: ImageKind,
}

impl StyleReference {
    /// Looks up `style_<name>.<ext>` in `dir`. Spaces in `name` become underscores.
    /// Extensions match case-insensitively; when several files share the name,
    /// the earliest extension in [`STYLE_EXTENSIONS`] wins.
    pub fn find(name: &str, dir: &Path) -> Result<Self> {
        let wanted = normalize_name(name);

        if !dir.is_dir() {
            return Err(GenError::NotFound(format!(
                "style '{}' requested but styles directory {} does not exist",
                name,
                dir.display()
            )));
        }

        let found = scan_dir(dir)?
            .into_iter()
            .filter(|style| style.name == wanted)
            .min_by_key(|style| (extension_rank(&style.path), style.path.clone()));

        match found {
            Some(style) => {
                log::debug!("Resolved style '{}' to {}", name, style.path.display());
                Ok(style)
            }
            None => Err(GenError::NotFound(format!(
                "no style reference named '{}' in {} (expected {}{}.{{{}}})",
                name,
                dir.display(),
                STYLE_PREFIX,
                wanted,
                STYLE_EXTENSIONS.join(",")
            ))),
        }
    }

    /// Parses `style_<Name>.<ext>`; anything else is not a style reference.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let name = stem.strip_prefix(STYLE_PREFIX)?;
        if name.is_empty() || !STYLE_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        let kind = ImageKind::from_extension(&ext)?;
        Some(StyleReference {
            name: name.to_string(),
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            GenError::Io(format!(
                "cannot read style reference {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// All style references in `dir`, sorted by name. A missing directory yields an empty list.
pub fn list_styles(dir: &Path) -> Result<Vec<StyleReference>> {
    if !dir.is_dir() {
        log::warn!("Styles directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut styles = scan_dir(dir)?;
    styles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok(styles)
}

fn scan_dir(dir: &Path) -> Result<Vec<StyleReference>> {
    let mut styles = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(style) = StyleReference::from_path(&path) {
            styles.push(style);
        }
    }
    Ok(styles)
}

fn extension_rank(path: &Path) -> usize {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| STYLE_EXTENSIONS.iter().position(|known| *known == ext))
        .unwrap_or(STYLE_EXTENSIONS.len())
}

/// Canonical form of a style name: trimmed, spaces replaced by underscores.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}
