//! Module manifest parsing.
//!
//! A module ships `<Name>.manifest`, a flat `Key = Value` file:
//!
//! ```text
//! # comment
//! /* block
//!  * comment */
//! ModuleVersion = 1.5.0
//! Description = "Does things"
//! RequireLicenseAcceptance = true
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runtime::Runtime;

use super::Version;

pub const MANIFEST_EXTENSION: &str = "manifest";

const MODULE_VERSION_KEY: &str = "ModuleVersion";

pub fn manifest_file_name(package_name: &str) -> String {
    format!("{}.{}", package_name, MANIFEST_EXTENSION)
}

#[derive(Debug)]
pub enum ManifestError {
    Missing(PathBuf),
    Unparsable { path: PathBuf, reason: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Missing(path) => {
                write!(f, "module manifest {} does not exist", path.display())
            }
            ManifestError::Unparsable { path, reason } => {
                write!(f, "cannot parse module manifest {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Parsed manifest: an ordered key/value map with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    values: BTreeMap<String, String>,
}

impl Manifest {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn module_version(&self) -> Option<&str> {
        self.get(MODULE_VERSION_KEY)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ManifestParser: Send + Sync {
    /// Parse the manifest at `path`. The result always carries a module version.
    fn parse(&self, path: &Path) -> Result<Manifest, ManifestError>;
}

/// Parser for the flat `Key = Value` manifest format.
pub struct KeyValueManifestParser<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> KeyValueManifestParser<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> ManifestParser for KeyValueManifestParser<R> {
    #[tracing::instrument(skip(self))]
    fn parse(&self, path: &Path) -> Result<Manifest, ManifestError> {
        if !self.runtime.exists(path) {
            return Err(ManifestError::Missing(path.to_path_buf()));
        }
        let text = self
            .runtime
            .read_to_string(path)
            .map_err(|e| ManifestError::Unparsable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        parse_text(&text).map_err(|reason| ManifestError::Unparsable {
            path: path.to_path_buf(),
            reason,
        })
    }
}

fn parse_text(text: &str) -> Result<Manifest, String> {
    let mut values = BTreeMap::new();
    let mut in_block_comment = false;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if in_block_comment {
            if line.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if line.starts_with("/*") {
            in_block_comment = !line.contains("*/");
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected 'Key = Value'", index + 1))?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("line {}: invalid key '{}'", index + 1, key));
        }
        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    if in_block_comment {
        return Err("unterminated block comment".to_string());
    }

    let manifest = Manifest { values };
    let version = manifest
        .module_version()
        .ok_or_else(|| format!("missing required key '{}'", MODULE_VERSION_KEY))?;
    version.parse::<Version>().map_err(|e| e.to_string())?;

    Ok(manifest)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
