use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runtime::Runtime;

use super::PackageKind;

/// File name of the provenance sidecar written inside a module's version directory.
pub const METADATA_FILE_NAME: &str = "package-info.json";

/// Install provenance stored next to installed content
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstalledInfo {
    pub name: String,
    pub version: String,
    pub kind: PackageKind,
    pub repository: String,
    pub repository_location: String,
    pub installed_location: PathBuf,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InstalledInfo {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let info = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse install metadata {:?}", path))?;
        Ok(info)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait MetadataWriter: Send + Sync {
    fn write(&self, info: &InstalledInfo, path: &Path) -> Result<()>;
}

pub struct JsonMetadataWriter<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> JsonMetadataWriter<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> MetadataWriter for JsonMetadataWriter<R> {
    #[tracing::instrument(skip(self, info))]
    fn write(&self, info: &InstalledInfo, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(info)
            .with_context(|| format!("Failed to serialize install metadata for {}", info.name))?;
        if let Some(parent) = path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime.write(path, json.as_bytes())
    }
}
