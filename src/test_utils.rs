//! Shared helpers for unit tests.

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::runtime::{RealRuntime, Runtime};

/// Every file under `root` (relative path → bytes) and every directory
/// (relative path → `None`).
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            if path.is_dir() {
                out.insert(rel, None);
                walk(root, &path, out);
            } else {
                out.insert(rel, Some(fs::read(&path).unwrap()));
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

enum Fault {
    /// `remove_dir_all(target)` deletes `partial` and then fails.
    Remove { target: PathBuf, partial: Vec<PathBuf> },
    /// Renames and copies out of `source` fail.
    MoveFrom { source: PathBuf },
}

/// Real filesystem runtime with an optional injected fault and temp dir.
#[derive(Default)]
pub struct FaultyRuntime {
    inner: RealRuntime,
    fault: Option<Fault>,
    temp_dir: Option<PathBuf>,
}

impl FaultyRuntime {
    /// No fault, staging areas under `temp_dir`.
    pub fn sandboxed(temp_dir: &Path) -> Self {
        Self {
            temp_dir: Some(temp_dir.to_path_buf()),
            ..Self::default()
        }
    }

    /// Simulate a delete that removes `partial` and then trips over a
    /// locked file.
    pub fn failing_remove(target: &Path, partial: Vec<PathBuf>) -> Self {
        Self {
            fault: Some(Fault::Remove {
                target: target.to_path_buf(),
                partial,
            }),
            ..Self::default()
        }
    }

    pub fn failing_move_from(source: &Path) -> Self {
        Self {
            fault: Some(Fault::MoveFrom {
                source: source.to_path_buf(),
            }),
            ..Self::default()
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: &Path) -> Self {
        self.temp_dir = Some(temp_dir.to_path_buf());
        self
    }
}

impl Runtime for FaultyRuntime {
    fn env_var(&self, key: &str) -> Result<String, env::VarError> {
        self.inner.env_var(key)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.inner.read_to_string(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(Fault::MoveFrom { source }) = &self.fault
            && from.starts_with(source)
        {
            return Err(anyhow!("injected: cannot rename {:?}", from));
        }
        self.inner.rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        if let Some(Fault::MoveFrom { source }) = &self.fault
            && from.starts_with(source)
        {
            return Err(anyhow!("injected: cannot read {:?}", from));
        }
        self.inner.copy(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        self.inner.create_file(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.inner.open(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if let Some(Fault::Remove { target, partial }) = &self.fault
            && path == target
        {
            for p in partial {
                if p.is_dir() {
                    fs::remove_dir_all(p)?;
                } else if p.exists() {
                    fs::remove_file(p)?;
                }
            }
            return Err(anyhow!("injected: file in {:?} is locked", target));
        }
        self.inner.remove_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.inner.set_permissions(path, mode)
    }

    fn config_dir(&self) -> Option<PathBuf> {
        self.inner.config_dir()
    }

    fn data_dir(&self) -> Option<PathBuf> {
        self.inner.data_dir()
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.inner.temp_dir())
    }

    fn prompt(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("no terminal in tests"))
    }
}
