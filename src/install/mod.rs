//! Install orchestration.
//!
//! [`Installer::install`] walks the configured repositories in priority
//! order, narrows what each one offers to one candidate per name, skips
//! what is already installed, and runs every remaining candidate through a
//! staged install transaction. Per-package problems become
//! [`InstallOutcome::Failed`] entries in the report; only a missing
//! repository list aborts the call.

mod commit;
mod error;
mod filter;
mod license;
mod outcome;
mod scanner;
mod staging;
mod transaction;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::consent::{Consent, ConsentSession};
use crate::package::{
    InstalledInspector, ManifestParser, MetadataWriter, PackageKind, VersionRange,
};
use crate::runtime::Runtime;
use crate::source::{FetchContext, PackageRetrieval, PackageSearch, RepositoryStore};

pub use error::{ErrorCategory, ErrorKind, InstallError, PackageError};
pub use license::{LICENSE_FILE_NAME, LicenseGate, LicensePolicy, LicenseState};
pub use outcome::{InstallOutcome, InstallReport, OutcomeAggregator};
pub use staging::StagingArea;

use scanner::Scanner;

/// A destination directory and the package kind it receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoot {
    pub path: PathBuf,
    pub kind: PackageKind,
}

/// Ordered install roots. The first root accepting a package's kind wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallTarget {
    roots: Vec<InstallRoot>,
}

impl InstallTarget {
    pub fn new(roots: Vec<InstallRoot>) -> Self {
        Self { roots }
    }

    /// One module root followed by one script root.
    pub fn standard(modules: PathBuf, scripts: PathBuf) -> Self {
        Self::new(vec![
            InstallRoot {
                path: modules,
                kind: PackageKind::Module,
            },
            InstallRoot {
                path: scripts,
                kind: PackageKind::Script,
            },
        ])
    }

    pub fn root_for(&self, kind: PackageKind) -> Option<&Path> {
        self.roots
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.path.as_path())
    }

    pub fn first(&self) -> Option<&Path> {
        self.roots.first().map(|r| r.path.as_path())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| r.path.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub names: Vec<String>,
    pub range: VersionRange,
    pub prerelease: bool,
    /// Restrict the scan to these repositories. Empty means all.
    pub repositories: Vec<String>,
    pub accept_license: bool,
    pub reinstall: bool,
    /// Skip the untrusted repository prompt.
    pub force: bool,
    pub trust_repository: bool,
    pub credential: Option<String>,
    pub target: InstallTarget,
    /// Copy the raw archive into the first root instead of installing it.
    pub save_only: bool,
    /// Write `package-info.json` into installed module directories. Scripts
    /// always get their record under `installed-script-info/`.
    pub include_metadata_sidecar: bool,
}

impl InstallOptions {
    pub fn new(names: Vec<String>, target: InstallTarget) -> Self {
        Self {
            names,
            range: VersionRange::any(),
            prerelease: false,
            repositories: vec![],
            accept_license: false,
            reinstall: false,
            force: false,
            trust_repository: false,
            credential: None,
            target,
            save_only: false,
            include_metadata_sidecar: true,
        }
    }
}

/// The collaborators an [`Installer`] drives.
#[derive(Clone)]
pub struct Collaborators {
    pub repositories: Arc<dyn RepositoryStore>,
    pub search: Arc<dyn PackageSearch>,
    pub retrieval: Arc<dyn PackageRetrieval>,
    pub inspector: Arc<dyn InstalledInspector>,
    pub manifests: Arc<dyn ManifestParser>,
    pub metadata: Arc<dyn MetadataWriter>,
    pub consent: Arc<dyn Consent>,
}

pub struct Installer<R: Runtime> {
    runtime: Arc<R>,
    collaborators: Collaborators,
    cancel: CancelToken,
}

impl<R: Runtime> Installer<R> {
    pub fn new(runtime: Arc<R>, collaborators: Collaborators) -> Self {
        Self {
            runtime,
            collaborators,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[tracing::instrument(skip(self, options), fields(names = ?options.names))]
    pub async fn install(&self, options: InstallOptions) -> Result<InstallReport> {
        let repositories = self.collaborators.repositories.list(&options.repositories)?;
        if repositories.is_empty() {
            return Err(InstallError::NoRepositories.into());
        }

        let mut session = ConsentSession::new(self.collaborators.consent.as_ref());
        let mut license = LicenseGate::new(options.accept_license)?;
        let fetch = FetchContext {
            credential: options.credential.clone(),
            cancel: self.cancel.clone(),
        };

        let scanner = Scanner {
            runtime: self.runtime.as_ref(),
            collaborators: &self.collaborators,
            options: &options,
            fetch: &fetch,
        };
        Ok(scanner
            .scan(&repositories, &mut session, &mut license)
            .await)
    }
}
