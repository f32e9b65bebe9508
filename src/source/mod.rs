//! Package repositories: where candidates come from.
//!
//! A [`Repository`] is a named location (a local folder or an HTTP base URL)
//! with a trust flag. [`PackageSearch`] finds candidates in one repository
//! and [`PackageRetrieval`] fetches a chosen candidate into a staging
//! directory. [`RepositoryStore`] supplies the configured repositories in
//! priority order.

mod index;
mod store;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cancel::CancelToken;
use crate::package::{Candidate, VersionRange};

pub use index::{INDEX_FILE_NAME, IndexEntry, IndexSource, RepositoryIndex};
pub use store::{CONFIG_ENV, JsonRepositoryStore};

/// Where a repository lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RepositoryLocation {
    Local(PathBuf),
    Remote(Url),
}

impl RepositoryLocation {
    /// Resolve `file` relative to this location.
    pub fn join(&self, file: &str) -> Result<String> {
        match self {
            RepositoryLocation::Local(dir) => Ok(dir.join(file).to_string_lossy().into_owned()),
            RepositoryLocation::Remote(url) => {
                // Url::join replaces the last segment unless the base ends in '/'
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    base.set_path(&format!("{}/", base.path()));
                }
                Ok(base.join(file)?.to_string())
            }
        }
    }
}

impl FromStr for RepositoryLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("Repository location cannot be empty");
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(RepositoryLocation::Remote(Url::parse(s)?))
        } else {
            Ok(RepositoryLocation::Local(PathBuf::from(s)))
        }
    }
}

impl TryFrom<String> for RepositoryLocation {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepositoryLocation> for String {
    fn from(value: RepositoryLocation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryLocation::Local(path) => write!(f, "{}", path.display()),
            RepositoryLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// A configured package repository. List position is priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub location: RepositoryLocation,
    #[serde(default)]
    pub trusted: bool,
}

/// What to look for in one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub names: Vec<String>,
    pub range: VersionRange,
    pub prerelease: bool,
}

/// Per-operation context for network-bound collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Bearer credential sent to remote repositories.
    pub credential: Option<String>,
    pub cancel: CancelToken,
}

impl FetchContext {
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

/// A package fetched into a staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedPackage {
    /// The raw archive as downloaded.
    pub archive: PathBuf,
    /// Directory holding the extracted content.
    pub content: PathBuf,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageSearch: Send + Sync {
    /// Find candidates for the requested names and their transitive
    /// dependencies. Candidates for one name come back version-descending.
    async fn find(
        &self,
        request: &SearchRequest,
        repository: &Repository,
        fetch: &FetchContext,
    ) -> Result<Vec<Candidate>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageRetrieval: Send + Sync {
    /// Fetch `candidate` from `repository` and unpack it under `dest`.
    async fn retrieve(
        &self,
        candidate: &Candidate,
        repository: &Repository,
        dest: &Path,
        fetch: &FetchContext,
    ) -> Result<RetrievedPackage>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RepositoryStore: Send + Sync {
    /// Repositories in priority order, restricted to `names` when non-empty.
    fn list(&self, names: &[String]) -> Result<Vec<Repository>>;
}

#[cfg(test)]
pub(crate) fn repository(name: &str, location: &str, trusted: bool) -> Repository {
    Repository {
        name: name.to_string(),
        location: location.parse().unwrap(),
        trusted,
    }
}
