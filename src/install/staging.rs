use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

const STAGING_PREFIX: &str = "stagehand-";

/// A uniquely named scratch directory for one install attempt.
///
/// Dropping the area removes it; [`StagingArea::close`] does the same and
/// reports failure.
pub struct StagingArea<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    path: PathBuf,
    removed: bool,
}

impl<'a, R: Runtime + ?Sized> StagingArea<'a, R> {
    pub fn create(runtime: &'a R) -> Result<Self> {
        let path = runtime
            .temp_dir()
            .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        runtime
            .create_dir_all(&path)
            .with_context(|| format!("Failed to create staging area {:?}", path))?;
        debug!("Created staging area {:?}", path);
        Ok(Self {
            runtime,
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;
        if self.runtime.exists(&self.path) {
            self.runtime
                .remove_dir_all(&self.path)
                .with_context(|| format!("Failed to remove staging area {:?}", self.path))?;
        }
        debug!("Removed staging area {:?}", self.path);
        Ok(())
    }
}

impl<R: Runtime + ?Sized> Drop for StagingArea<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("{:#}", e);
        }
    }
}
