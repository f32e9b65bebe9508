//! Package model.
//!
//! This module holds the types that describe packages as they move through
//! an install: candidates found in a repository, their versions, manifests,
//! install metadata and the inspector that reports what is already on disk.

mod inspector;
mod manifest;
mod metadata;
mod version;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub use inspector::{DirectoryInspector, InstalledInspector, SCRIPT_INFO_DIR};
pub use manifest::{
    MANIFEST_EXTENSION, Manifest, ManifestError, ManifestParser, KeyValueManifestParser,
    manifest_file_name,
};
pub use metadata::{InstalledInfo, JsonMetadataWriter, METADATA_FILE_NAME, MetadataWriter};
pub use version::{Version, VersionParseError, VersionRange};

#[cfg(test)]
pub use inspector::MockInstalledInspector;
#[cfg(test)]
pub use manifest::MockManifestParser;
#[cfg(test)]
pub use metadata::MockMetadataWriter;

/// File extension of a script package's payload.
pub const SCRIPT_EXTENSION: &str = "script";

/// What a package installs as. Modules get a versioned directory; scripts
/// are a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Module,
    Script,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Module => write!(f, "module"),
            PackageKind::Script => write!(f, "script"),
        }
    }
}

/// A dependency edge declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub range: VersionRange,
}

/// A package version found in a specific repository, eligible for install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    /// Version as published. Parsed lazily so one bad entry only fails itself.
    pub version: String,
    pub prerelease: Option<String>,
    /// Name of the repository the candidate came from.
    pub repository: String,
    /// Archive file name, relative to the repository location.
    pub archive: String,
    pub dependencies: Vec<Dependency>,
}

impl Candidate {
    /// The version including the prerelease label, e.g. `2.0.0-beta1`.
    pub fn full_version(&self) -> String {
        match &self.prerelease {
            Some(label) if !label.is_empty() && !self.version.contains('-') => {
                format!("{}-{}", self.version, label)
            }
            _ => self.version.clone(),
        }
    }

    pub fn parsed_version(&self) -> Result<Version, VersionParseError> {
        self.full_version().parse()
    }

    /// Directory name used for the installed version (release part only).
    pub fn version_dir_name(&self) -> &str {
        self.version
            .split_once('-')
            .map(|(release, _)| release)
            .unwrap_or(&self.version)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.full_version())
    }
}

/// A package found on disk by an [`InstalledInspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: Version,
    pub kind: PackageKind,
    pub path: PathBuf,
}

/// Whether `name` can be used as a single path component under an install
/// root. Rejects separators, `.`/`..`, drive prefixes and absolute paths.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', ':', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Case-insensitive package name comparison.
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
pub(crate) fn candidate(name: &str, version: &str, repository: &str) -> Candidate {
    Candidate {
        name: name.to_string(),
        version: version.to_string(),
        prerelease: None,
        repository: repository.to_string(),
        archive: format!("{}.{}.zip", name, version),
        dependencies: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_appends_label() {
        let mut c = candidate("Foo", "2.0.0", "R1");
        assert_eq!(c.full_version(), "2.0.0");

        c.prerelease = Some("beta1".into());
        assert_eq!(c.full_version(), "2.0.0-beta1");
        assert_eq!(c.parsed_version().unwrap().prerelease(), Some("beta1"));
        assert_eq!(c.version_dir_name(), "2.0.0");
    }

    #[test]
    fn test_full_version_does_not_duplicate_label() {
        let mut c = candidate("Foo", "2.0.0-beta1", "R1");
        c.prerelease = Some("beta1".into());
        assert_eq!(c.full_version(), "2.0.0-beta1");
        assert_eq!(c.version_dir_name(), "2.0.0");
    }

    #[test]
    fn test_unparsable_version() {
        let c = candidate("Foo", "not-a-version", "R1");
        assert!(c.parsed_version().is_err());
    }

    #[test]
    fn test_same_name_ignores_case() {
        assert!(same_name("Foo", "foo"));
        assert!(!same_name("Foo", "Foobar"));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("Foo"));
        assert!(is_valid_name("Foo.Bar-2"));
        assert!(is_valid_name("previous"));

        for bad in ["", ".", "..", "../escaped", "a/b", "a\\b", "/abs", "C:", "C:evil"] {
            assert!(!is_valid_name(bad), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PackageKind::Module.to_string(), "module");
        assert_eq!(PackageKind::Script.to_string(), "script");
    }
}
