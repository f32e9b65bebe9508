//! One package, start to finish: stage, validate, gate, commit, clean up.

use chrono::Utc;
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::consent::ConsentSession;
use crate::package::{
    Candidate, InstalledInfo, ManifestError, METADATA_FILE_NAME, PackageKind, SCRIPT_EXTENSION,
    SCRIPT_INFO_DIR, is_valid_name, manifest_file_name, same_name,
};
use crate::runtime::Runtime;
use crate::source::{FetchContext, Repository, RetrievedPackage};

use super::commit::{commit_module, commit_script, strip_artifacts};
use super::error::{ErrorKind, PackageError};
use super::license::LicenseGate;
use super::outcome::InstallOutcome;
use super::staging::StagingArea;
use super::{Collaborators, InstallOptions};

// Retrieval writes `<content>/<name>` and `<content>/<archive>`; the backup
// and script sidecar live beside `content/`, so no package name can reach them.
const CONTENT_DIR_NAME: &str = "content";
const BACKUP_DIR_NAME: &str = "backup";

pub(super) struct Transaction<'a, R: Runtime + ?Sized> {
    pub runtime: &'a R,
    pub collaborators: &'a Collaborators,
    pub options: &'a InstallOptions,
    pub fetch: &'a FetchContext,
}

pub(super) struct TransactionResult {
    pub outcome: InstallOutcome,
    pub cleanup_error: Option<PackageError>,
}

impl<R: Runtime + ?Sized> Transaction<'_, R> {
    pub async fn run(
        &self,
        candidate: &Candidate,
        repository: &Repository,
        session: &mut ConsentSession<'_>,
        license: &mut LicenseGate,
    ) -> TransactionResult {
        if !is_valid_name(&candidate.name) {
            return TransactionResult {
                outcome: InstallOutcome::Failed(PackageError::new(
                    ErrorKind::PackageNameInvalid,
                    &candidate.name,
                    format!(
                        "repository '{}' offered a package name that is not a plain file name",
                        repository.name
                    ),
                )),
                cleanup_error: None,
            };
        }

        if let Err(e) = candidate.parsed_version() {
            return TransactionResult {
                outcome: InstallOutcome::Failed(PackageError::new(
                    ErrorKind::VersionStringUnparsable,
                    &candidate.name,
                    e.to_string(),
                )),
                cleanup_error: None,
            };
        }

        let staging = match StagingArea::create(self.runtime) {
            Ok(staging) => staging,
            Err(e) => {
                return TransactionResult {
                    outcome: InstallOutcome::Failed(PackageError::from_error(
                        ErrorKind::RetrievalFailed,
                        &candidate.name,
                        &e,
                    )),
                    cleanup_error: None,
                };
            }
        };

        let result = self
            .stage_and_commit(candidate, repository, staging.path(), session, license)
            .await;

        let cleanup_error = staging.close().err().map(|e| {
            warn!("{:#}", e);
            PackageError::from_error(ErrorKind::StagingCleanupFailed, &candidate.name, &e)
        });

        let outcome = match result {
            Ok(()) => InstallOutcome::Installed {
                version: candidate.full_version(),
                repository: repository.name.clone(),
            },
            Err(e) => {
                warn!("{}", e);
                InstallOutcome::Failed(e)
            }
        };
        TransactionResult {
            outcome,
            cleanup_error,
        }
    }

    async fn stage_and_commit(
        &self,
        candidate: &Candidate,
        repository: &Repository,
        staging: &Path,
        session: &mut ConsentSession<'_>,
        license: &mut LicenseGate,
    ) -> Result<(), PackageError> {
        let name = candidate.name.as_str();
        let fail = |kind: ErrorKind| move |e: anyhow::Error| PackageError::from_error(kind, name, &e);

        let retrieved = self
            .collaborators
            .retrieval
            .retrieve(
                candidate,
                repository,
                &staging.join(CONTENT_DIR_NAME),
                self.fetch,
            )
            .await
            .map_err(fail(ErrorKind::RetrievalFailed))?;

        if self.options.save_only {
            return self.save_archive(candidate, &retrieved);
        }

        let manifest_path = retrieved.content.join(manifest_file_name(name));
        let script_file = retrieved
            .content
            .join(format!("{}.{}", name, SCRIPT_EXTENSION));
        let kind = if self.runtime.exists(&manifest_path) {
            PackageKind::Module
        } else if self.runtime.exists(&script_file) {
            PackageKind::Script
        } else {
            return Err(PackageError::new(
                ErrorKind::ManifestMissing,
                name,
                format!(
                    "{} contains neither {} nor {}.{}",
                    candidate,
                    manifest_file_name(name),
                    name,
                    SCRIPT_EXTENSION
                ),
            ));
        };
        debug!("{} is a {}", candidate, kind);

        let mut description = None;
        if kind == PackageKind::Module {
            let manifest = self
                .collaborators
                .manifests
                .parse(&manifest_path)
                .map_err(|e| {
                    let kind = match e {
                        ManifestError::Missing(_) => ErrorKind::ManifestMissing,
                        ManifestError::Unparsable { .. } => ErrorKind::ManifestUnparsable,
                    };
                    PackageError::new(kind, name, e.to_string())
                })?;
            description = manifest.get("Description").map(str::to_string);

            let text = self
                .runtime
                .read_to_string(&manifest_path)
                .map_err(fail(ErrorKind::ManifestUnparsable))?;
            license.check(self.runtime, name, &retrieved.content, &text, session)?;
        }

        let archive_name = retrieved
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        strip_artifacts(self.runtime, &retrieved.content, name, &archive_name)
            .map_err(fail(ErrorKind::CommitFailed))?;

        let root = self.options.target.root_for(kind).ok_or_else(|| {
            PackageError::new(
                ErrorKind::CommitFailed,
                name,
                format!("no install root accepts {} packages", kind),
            )
        })?;

        let info = |installed_location: PathBuf| InstalledInfo {
            name: candidate.name.clone(),
            version: candidate.full_version(),
            kind,
            repository: repository.name.clone(),
            repository_location: repository.location.to_string(),
            installed_location,
            installed_at: Utc::now(),
            description: description.clone(),
        };

        match kind {
            PackageKind::Module => {
                let version_dir = self
                    .package_dir(root, name)
                    .join(candidate.version_dir_name());
                if self.options.include_metadata_sidecar {
                    self.collaborators
                        .metadata
                        .write(
                            &info(version_dir.clone()),
                            &retrieved.content.join(METADATA_FILE_NAME),
                        )
                        .map_err(fail(ErrorKind::MetadataWriteFailed))?;
                }
                println!("  installing {} to {}", candidate, version_dir.display());
                commit_module(
                    self.runtime,
                    &retrieved.content,
                    &version_dir,
                    &staging.join(BACKUP_DIR_NAME),
                )
                .map_err(fail(ErrorKind::CommitFailed))
            }
            PackageKind::Script => {
                let script_path = root.join(format!("{}.{}", name, SCRIPT_EXTENSION));
                let info_path = root.join(SCRIPT_INFO_DIR).join(format!("{}.json", name));
                // Scripts are only visible to the inspector through this
                // record, so it is written even without metadata sidecars.
                let staged_info = staging.join(format!("{}.json", name));
                self.collaborators
                    .metadata
                    .write(&info(script_path.clone()), &staged_info)
                    .map_err(fail(ErrorKind::MetadataWriteFailed))?;
                println!("  installing {} to {}", candidate, script_path.display());
                commit_script(
                    self.runtime,
                    &script_file,
                    &staged_info,
                    &script_path,
                    &info_path,
                )
                .map_err(fail(ErrorKind::CommitFailed))
            }
        }
    }

    /// `--save-only`: keep the raw archive in the first root.
    fn save_archive(
        &self,
        candidate: &Candidate,
        retrieved: &RetrievedPackage,
    ) -> Result<(), PackageError> {
        let name = candidate.name.as_str();
        let fail = |e: anyhow::Error| PackageError::from_error(ErrorKind::CommitFailed, name, &e);

        let root = self.options.target.first().ok_or_else(|| {
            PackageError::new(ErrorKind::CommitFailed, name, "no install root configured")
        })?;
        let file_name = retrieved.archive.file_name().ok_or_else(|| {
            PackageError::new(ErrorKind::CommitFailed, name, "retrieved archive has no name")
        })?;

        self.runtime.create_dir_all(root).map_err(fail)?;
        let dest = root.join(file_name);
        println!("      saving {} to {}", candidate, dest.display());
        self.runtime
            .copy(&retrieved.archive, &dest)
            .map(|_| ())
            .map_err(fail)
    }

    /// `<root>/<name>`, reusing an existing directory whose name differs
    /// only in case.
    fn package_dir(&self, root: &Path, name: &str) -> PathBuf {
        if self.runtime.is_dir(root)
            && let Ok(entries) = self.runtime.read_dir(root)
            && let Some(existing) = entries.into_iter().find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| same_name(n, name))
                    && self.runtime.is_dir(p)
            })
        {
            return existing;
        }
        root.join(name)
    }
}
