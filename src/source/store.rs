use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::package::same_name;
use crate::runtime::Runtime;

use super::{Repository, RepositoryStore};

/// Environment variable overriding the repository config path.
pub const CONFIG_ENV: &str = "STAGEHAND_CONFIG";

const CONFIG_FILE_NAME: &str = "repositories.json";

/// Repository list read from a JSON array of `{name, location, trusted}`.
pub struct JsonRepositoryStore<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
}

impl<R: Runtime> JsonRepositoryStore<R> {
    pub fn new(runtime: Arc<R>, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    /// Use `$STAGEHAND_CONFIG`, falling back to
    /// `<config_dir>/stagehand/repositories.json`.
    pub fn from_env(runtime: Arc<R>) -> Result<Self> {
        let path = match runtime.env_var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => runtime
                .config_dir()
                .context("Cannot determine the config directory; set STAGEHAND_CONFIG")?
                .join("stagehand")
                .join(CONFIG_FILE_NAME),
        };
        debug!("Repository config: {:?}", path);
        Ok(Self::new(runtime, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Repository>> {
        if !self.runtime.exists(&self.path) {
            debug!("No repository config at {:?}", self.path);
            return Ok(vec![]);
        }
        let content = self.runtime.read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse repository config {:?}", self.path))
    }
}

impl<R: Runtime> RepositoryStore for JsonRepositoryStore<R> {
    fn list(&self, names: &[String]) -> Result<Vec<Repository>> {
        let all = self.load()?;
        if names.is_empty() {
            return Ok(all);
        }

        for name in names {
            if !all.iter().any(|r| same_name(&r.name, name)) {
                warn!("Repository '{}' is not configured", name);
            }
        }
        Ok(all
            .into_iter()
            .filter(|r| names.iter().any(|n| same_name(n, &r.name)))
            .collect())
    }
}
