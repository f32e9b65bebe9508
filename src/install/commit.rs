//! Moving staged content into its permanent location.
//!
//! Nothing here is a filesystem transaction. Replacing an existing version
//! keeps a backup copy until the new content is in place, and restores
//! anything a failed delete or move removed. A process crash in the middle
//! is not covered.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use log::{debug, warn};
use std::path::Path;

use crate::runtime::{Runtime, copy_dir_all, move_path};

/// Wildcard artifacts removed from the top of a staged package.
const ARTIFACT_PATTERNS: &[&str] = &["*.sig", "*.sha256"];

/// Exact names removed from the top of a staged package.
const ARTIFACT_NAMES: &[&str] = &["[Content_Types].xml", "_rels", "package"];

const PKGSPEC_EXTENSION: &str = "pkgspec";

/// Remove packaging artifacts from the top level of `content`.
pub fn strip_artifacts<R: Runtime + ?Sized>(
    runtime: &R,
    content: &Path,
    package: &str,
    archive_name: &str,
) -> Result<()> {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let patterns = ARTIFACT_PATTERNS
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid artifact pattern")?;
    let pkgspec = format!("{}.{}", package, PKGSPEC_EXTENSION);

    for entry in runtime.read_dir(content)? {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let exact = ARTIFACT_NAMES
            .iter()
            .chain([pkgspec.as_str(), archive_name].iter())
            .any(|artifact| artifact.eq_ignore_ascii_case(name));
        if !exact && !patterns.iter().any(|p| p.matches_with(name, options)) {
            continue;
        }

        debug!("Removing packaging artifact {:?}", entry);
        if runtime.is_dir(&entry) {
            runtime.remove_dir_all(&entry)?;
        } else {
            runtime.remove_file(&entry)?;
        }
    }
    Ok(())
}

/// Commit a staged module directory to `version_dir`.
///
/// `backup` must not exist yet; it holds the previous version while it is
/// being replaced and is removed afterwards.
pub fn commit_module<R: Runtime + ?Sized>(
    runtime: &R,
    staged: &Path,
    version_dir: &Path,
    backup: &Path,
) -> Result<()> {
    let parent = version_dir
        .parent()
        .with_context(|| format!("Invalid install path {:?}", version_dir))?;

    if !runtime.exists(parent) {
        runtime.create_dir_all(parent)?;
        return move_path(runtime, staged, version_dir);
    }
    if runtime.exists(version_dir) {
        return replace_dir(runtime, staged, version_dir, backup);
    }
    move_path(runtime, staged, version_dir)
}

/// Commit a staged script together with its metadata sidecar.
pub fn commit_script<R: Runtime + ?Sized>(
    runtime: &R,
    staged_script: &Path,
    staged_info: &Path,
    script_path: &Path,
    info_path: &Path,
) -> Result<()> {
    if runtime.exists(info_path) {
        runtime.remove_file(info_path)?;
    }
    if runtime.exists(script_path) {
        runtime.remove_file(script_path)?;
    }

    if let Some(parent) = script_path.parent() {
        runtime.create_dir_all(parent)?;
    }
    move_path(runtime, staged_script, script_path)?;

    if let Some(parent) = info_path.parent() {
        runtime.create_dir_all(parent)?;
    }
    move_path(runtime, staged_info, info_path)
}

fn replace_dir<R: Runtime + ?Sized>(
    runtime: &R,
    staged: &Path,
    version_dir: &Path,
    backup: &Path,
) -> Result<()> {
    debug!("Backing up {:?} to {:?}", version_dir, backup);
    copy_dir_all(runtime, version_dir, backup)
        .with_context(|| format!("Failed to back up {:?}", version_dir))?;

    if let Err(e) = runtime.remove_dir_all(version_dir) {
        let restored = restore_missing(runtime, backup, version_dir);
        discard_backup(runtime, backup);
        return match restored {
            Ok(()) => Err(e.context(format!(
                "Failed to remove previous content of {:?}; it has been restored",
                version_dir
            ))),
            Err(restore_err) => Err(e.context(format!(
                "Failed to remove previous content of {:?} and to restore it: {:#}",
                version_dir, restore_err
            ))),
        };
    }

    if let Err(e) = move_path(runtime, staged, version_dir) {
        if runtime.exists(version_dir)
            && let Err(cleanup_err) = runtime.remove_dir_all(version_dir)
        {
            warn!("Failed to remove partial install {:?}: {:#}", version_dir, cleanup_err);
        }
        restore_missing(runtime, backup, version_dir).with_context(|| {
            format!("Failed to restore {:?} after a failed move: {:#}", version_dir, e)
        })?;
        discard_backup(runtime, backup);
        return Err(e.context(format!("Failed to move new content into {:?}", version_dir)));
    }

    discard_backup(runtime, backup);
    Ok(())
}

/// Copy back every entry of `backup` that no longer exists under `target`.
/// Entries that survived are left as they are.
fn restore_missing<R: Runtime + ?Sized>(runtime: &R, backup: &Path, target: &Path) -> Result<()> {
    if !runtime.exists(target) {
        debug!("Restoring {:?} from {:?}", target, backup);
        return copy_dir_all(runtime, backup, target);
    }
    for entry in runtime.read_dir(backup)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let dest = target.join(name);
        if runtime.is_dir(&entry) {
            restore_missing(runtime, &entry, &dest)?;
        } else if !runtime.exists(&dest) {
            debug!("Restoring {:?}", dest);
            runtime.copy(&entry, &dest)?;
        }
    }
    Ok(())
}

fn discard_backup<R: Runtime + ?Sized>(runtime: &R, backup: &Path) {
    if let Err(e) = runtime.remove_dir_all(backup) {
        warn!("Failed to remove backup {:?}: {:#}", backup, e);
    }
}
