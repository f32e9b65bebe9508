//! Discovery of packages that are already installed.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runtime::Runtime;

use super::{
    InstalledInfo, InstalledPackage, METADATA_FILE_NAME, PackageKind, Version, VersionRange,
    same_name,
};

/// Directory under a scripts root holding one metadata sidecar per installed script.
pub const SCRIPT_INFO_DIR: &str = "installed-script-info";

#[cfg_attr(test, mockall::automock)]
pub trait InstalledInspector: Send + Sync {
    /// Return installed packages named in `names` whose version satisfies `range`.
    fn find_installed(
        &self,
        names: &[String],
        range: &VersionRange,
        roots: &[PathBuf],
    ) -> Result<Vec<InstalledPackage>>;
}

/// Inspector that reads the on-disk layout written by the installer:
///
/// - modules: `<root>/<Name>/<version>/`
/// - scripts: `<root>/installed-script-info/<Name>.json`
pub struct DirectoryInspector<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> DirectoryInspector<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    fn modules_in(
        &self,
        root: &Path,
        names: &[String],
        range: &VersionRange,
        found: &mut Vec<InstalledPackage>,
    ) -> Result<()> {
        for package_dir in self.runtime.read_dir(root)? {
            if !self.runtime.is_dir(&package_dir) {
                continue;
            }
            let Some(dir_name) = file_name(&package_dir) else {
                continue;
            };
            let Some(name) = names.iter().find(|n| same_name(n, &dir_name)) else {
                continue;
            };

            for version_dir in self.runtime.read_dir(&package_dir)? {
                if !self.runtime.is_dir(&version_dir) {
                    continue;
                }
                let Some(version) = self.module_version(&version_dir) else {
                    continue;
                };
                if range.is_satisfied_by(&version) {
                    debug!("Found installed module {} {} at {:?}", name, version, version_dir);
                    found.push(InstalledPackage {
                        name: dir_name.clone(),
                        version,
                        kind: PackageKind::Module,
                        path: version_dir,
                    });
                }
            }
        }
        Ok(())
    }

    /// Version directories carry only the release part, so a prerelease is
    /// recovered from the metadata sidecar when one was written.
    fn module_version(&self, version_dir: &Path) -> Option<Version> {
        let sidecar = version_dir.join(METADATA_FILE_NAME);
        if self.runtime.exists(&sidecar) {
            match InstalledInfo::load(self.runtime.as_ref(), &sidecar) {
                Ok(info) => match info.version.parse::<Version>() {
                    Ok(version) => return Some(version),
                    Err(e) => debug!("Ignoring version in {:?}: {}", sidecar, e),
                },
                Err(e) => debug!("Ignoring unreadable module metadata {:?}: {:#}", sidecar, e),
            }
        }
        file_name(version_dir).and_then(|v| v.parse().ok())
    }

    fn scripts_in(
        &self,
        root: &Path,
        names: &[String],
        range: &VersionRange,
        found: &mut Vec<InstalledPackage>,
    ) -> Result<()> {
        let info_dir = root.join(SCRIPT_INFO_DIR);
        if !self.runtime.is_dir(&info_dir) {
            return Ok(());
        }
        for name in names {
            let info_path = info_dir.join(format!("{}.json", name));
            if !self.runtime.exists(&info_path) {
                continue;
            }
            let info = match InstalledInfo::load(self.runtime.as_ref(), &info_path) {
                Ok(info) => info,
                Err(e) => {
                    debug!("Ignoring unreadable script metadata {:?}: {}", info_path, e);
                    continue;
                }
            };
            let Ok(version) = info.version.parse::<Version>() else {
                continue;
            };
            if range.is_satisfied_by(&version) {
                found.push(InstalledPackage {
                    name: info.name,
                    version,
                    kind: PackageKind::Script,
                    path: info.installed_location,
                });
            }
        }
        Ok(())
    }
}

impl<R: Runtime> InstalledInspector for DirectoryInspector<R> {
    #[tracing::instrument(skip(self))]
    fn find_installed(
        &self,
        names: &[String],
        range: &VersionRange,
        roots: &[PathBuf],
    ) -> Result<Vec<InstalledPackage>> {
        let mut found = Vec::new();
        for root in roots {
            if !self.runtime.is_dir(root) {
                continue;
            }
            self.modules_in(root, names, range, &mut found)?;
            self.scripts_in(root, names, range, &mut found)?;
        }
        // Highest version first so callers can report the newest install
        found.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(found)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_finds_module_versions_in_range() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Foo/1.0.0")).unwrap();
        fs::create_dir_all(root.join("Foo/1.5.0")).unwrap();
        fs::create_dir_all(root.join("Foo/2.0.0")).unwrap();
        fs::create_dir_all(root.join("Bar/1.0.0")).unwrap();

        let inspector = DirectoryInspector::new(Arc::new(RealRuntime));
        let found = inspector
            .find_installed(&names(&["foo"]), &"[1.2,2.0)".parse().unwrap(), &[root])
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Foo");
        assert_eq!(found[0].version.to_string(), "1.5.0");
        assert_eq!(found[0].kind, PackageKind::Module);
    }

    #[test]
    fn test_skips_non_version_dirs_and_missing_roots() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("modules");
        fs::create_dir_all(root.join("Foo/not-a-version")).unwrap();
        fs::write(root.join("Foo/README"), "x").unwrap();

        let inspector = DirectoryInspector::new(Arc::new(RealRuntime));
        let found = inspector
            .find_installed(
                &names(&["Foo"]),
                &VersionRange::any(),
                &[root, dir.path().join("missing")],
            )
            .unwrap();
        assert!(found.is_empty());
    }

    fn module_info(root: &Path, version: &str) -> InstalledInfo {
        InstalledInfo {
            name: "Foo".into(),
            version: version.into(),
            kind: PackageKind::Module,
            repository: "R1".into(),
            repository_location: "/feed".into(),
            installed_location: root.join("Foo/2.0.0"),
            installed_at: Utc::now(),
            description: None,
        }
    }

    #[test]
    fn test_module_version_comes_from_sidecar() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let version_dir = root.join("Foo/2.0.0");
        fs::create_dir_all(&version_dir).unwrap();
        fs::write(
            version_dir.join(METADATA_FILE_NAME),
            serde_json::to_string(&module_info(&root, "2.0.0-beta1")).unwrap(),
        )
        .unwrap();

        let inspector = DirectoryInspector::new(Arc::new(RealRuntime));
        let found = inspector
            .find_installed(&names(&["Foo"]), &VersionRange::any(), &[root.clone()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version.to_string(), "2.0.0-beta1");
        assert!(found[0].version.is_prerelease());

        // The prerelease sorts below 2.0, so it is outside [2.0,3.0)
        let none = inspector
            .find_installed(&names(&["Foo"]), &"[2.0,3.0)".parse().unwrap(), &[root])
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_unreadable_sidecar_falls_back_to_dir_name() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Foo/1.2.0")).unwrap();
        fs::write(root.join("Foo/1.2.0").join(METADATA_FILE_NAME), "not json").unwrap();

        let inspector = DirectoryInspector::new(Arc::new(RealRuntime));
        let found = inspector
            .find_installed(&names(&["Foo"]), &VersionRange::any(), &[root])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version.to_string(), "1.2.0");
    }

    #[test]
    fn test_finds_scripts_from_sidecar() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = Arc::new(RealRuntime);
        let info = InstalledInfo {
            name: "Deploy".into(),
            version: "3.1".into(),
            kind: PackageKind::Script,
            repository: "R1".into(),
            repository_location: "/feed".into(),
            installed_location: root.join("Deploy.script"),
            installed_at: Utc::now(),
            description: None,
        };
        fs::create_dir_all(root.join(SCRIPT_INFO_DIR)).unwrap();
        fs::write(
            root.join(SCRIPT_INFO_DIR).join("Deploy.json"),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        let inspector = DirectoryInspector::new(runtime);
        let found = inspector
            .find_installed(&names(&["Deploy"]), &"3.0".parse().unwrap(), &[root.clone()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, PackageKind::Script);
        assert_eq!(found[0].path, root.join("Deploy.script"));

        let none = inspector
            .find_installed(&names(&["Deploy"]), &"[4.0,]".parse().unwrap(), &[root])
            .unwrap();
        assert!(none.is_empty());
    }
}
