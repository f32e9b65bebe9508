//! Runtime abstraction for system operations.
//!
//! Every filesystem, environment and terminal effect of the installer goes
//! through [`Runtime`], so the install pipeline can be exercised against a
//! mock or a fault-injecting wrapper.
//!
//! # Structure
//!
//! - `env` - Environment variables and well-known directories
//! - `fs` - File system operations (read, write, directory, copy)
//! - `user` - User interaction (line prompts)

mod env;
mod fs;
mod user;

use anyhow::Result;
use std::env as std_env;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> Result<u64>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>>;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn is_dir(&self, path: &Path) -> bool;

    /// Set file permissions (mode) on Unix systems. No-op elsewhere.
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    // Directories
    fn config_dir(&self) -> Option<PathBuf>;
    fn data_dir(&self) -> Option<PathBuf>;
    fn temp_dir(&self) -> PathBuf;

    // User interaction
    /// Print `prompt` and return the trimmed line the user typed.
    fn prompt(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        self.copy_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        self.create_file_impl(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.set_permissions_impl(path, mode)
    }

    fn config_dir(&self) -> Option<PathBuf> {
        self.config_dir_impl()
    }

    fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir_impl()
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_dir_impl()
    }

    fn prompt(&self, prompt: &str) -> Result<String> {
        self.prompt_impl(prompt)
    }
}

/// Recursively copy `from` into `to`, creating `to` if needed.
///
/// Entries already present at the destination are overwritten.
pub fn copy_dir_all<R: Runtime + ?Sized>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    runtime.create_dir_all(to)?;
    for entry in runtime.read_dir(from)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let dest = to.join(name);
        if runtime.is_dir(&entry) {
            copy_dir_all(runtime, &entry, &dest)?;
        } else {
            runtime.copy(&entry, &dest)?;
        }
    }
    Ok(())
}

/// Move a file or directory, falling back to copy-and-delete when a plain
/// rename is not possible (e.g. across filesystems).
pub fn move_path<R: Runtime + ?Sized>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if runtime.rename(from, to).is_ok() {
        return Ok(());
    }
    log::debug!("rename {:?} -> {:?} failed, copying instead", from, to);
    if runtime.is_dir(from) {
        copy_dir_all(runtime, from, to)?;
        runtime.remove_dir_all(from)
    } else {
        runtime.copy(from, to)?;
        runtime.remove_file(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_dir_all_nested() {
        let rt = RealRuntime;
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        rt.create_dir_all(&src.join("a/b")).unwrap();
        rt.write(&src.join("top.txt"), b"top").unwrap();
        rt.write(&src.join("a/b/deep.txt"), b"deep").unwrap();

        let dst = dir.path().join("dst");
        copy_dir_all(&rt, &src, &dst).unwrap();

        assert_eq!(rt.read_to_string(&dst.join("top.txt")).unwrap(), "top");
        assert_eq!(rt.read_to_string(&dst.join("a/b/deep.txt")).unwrap(), "deep");
        // Source is untouched
        assert!(rt.exists(&src.join("a/b/deep.txt")));
    }

    #[test]
    fn test_move_path_directory() {
        let rt = RealRuntime;
        let dir = tempdir().unwrap();
        let src = dir.path().join("from");
        rt.create_dir_all(&src).unwrap();
        rt.write(&src.join("f.txt"), b"x").unwrap();

        let dst = dir.path().join("to");
        move_path(&rt, &src, &dst).unwrap();

        assert!(!rt.exists(&src));
        assert_eq!(rt.read_to_string(&dst.join("f.txt")).unwrap(), "x");
    }

    #[test]
    fn test_move_path_falls_back_to_copy() {
        let mut runtime = MockRuntime::new();
        let from = PathBuf::from("/a/file.txt");
        let to = PathBuf::from("/b/file.txt");

        runtime
            .expect_rename()
            .returning(|_, _| Err(anyhow::anyhow!("cross-device link")));
        runtime.expect_is_dir().returning(|_| false);
        runtime
            .expect_copy()
            .with(
                mockall::predicate::eq(from.clone()),
                mockall::predicate::eq(to.clone()),
            )
            .times(1)
            .returning(|_, _| Ok(1));
        runtime
            .expect_remove_file()
            .with(mockall::predicate::eq(from.clone()))
            .times(1)
            .returning(|_| Ok(()));

        move_path(&runtime, &from, &to).unwrap();
    }
}
