//! The repository loop.

use log::{debug, info, warn};
use std::collections::BTreeSet;

use crate::consent::{ConsentSession, ConsentTopic};
use crate::package::same_name;
use crate::runtime::Runtime;
use crate::source::{FetchContext, Repository, SearchRequest};

use super::error::{ErrorKind, PackageError};
use super::filter::{deduplicate, filter_installed};
use super::license::LicenseGate;
use super::outcome::{InstallOutcome, InstallReport, OutcomeAggregator};
use super::transaction::Transaction;
use super::{Collaborators, InstallOptions};

pub(super) struct Scanner<'a, R: Runtime + ?Sized> {
    pub runtime: &'a R,
    pub collaborators: &'a Collaborators,
    pub options: &'a InstallOptions,
    pub fetch: &'a FetchContext,
}

impl<R: Runtime + ?Sized> Scanner<'_, R> {
    pub async fn scan(
        &self,
        repositories: &[Repository],
        session: &mut ConsentSession<'_>,
        license: &mut LicenseGate,
    ) -> InstallReport {
        let options = self.options;
        // Lower-cased names not yet satisfied by any repository
        let mut pending: BTreeSet<String> =
            options.names.iter().map(|n| n.to_lowercase()).collect();
        let mut installed_now: BTreeSet<String> = BTreeSet::new();
        let mut outcomes = OutcomeAggregator::new();
        let mut cleanup_errors = Vec::new();
        let mut skipped_for_trust = false;
        let roots = options.target.paths();

        for repository in repositories {
            if pending.is_empty() {
                debug!("All requested packages resolved, stopping before {}", repository.name);
                break;
            }
            if self.fetch.cancel.is_cancelled() {
                break;
            }
            if !self.trust(repository, session) {
                skipped_for_trust = true;
                continue;
            }

            let mut names: Vec<String> = Vec::new();
            for name in &options.names {
                if pending.contains(&name.to_lowercase())
                    && !names.iter().any(|n| same_name(n, name))
                {
                    names.push(name.clone());
                }
            }
            let request = SearchRequest {
                names,
                range: options.range.clone(),
                prerelease: options.prerelease,
            };
            println!(
                "   resolving {} in {}",
                request.names.join(", "),
                repository.name
            );

            let found = match self
                .collaborators
                .search
                .find(&request, repository, self.fetch)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!("Search in repository '{}' failed: {:#}", repository.name, e);
                    continue;
                }
            };
            if found.is_empty() {
                debug!("Nothing found in {}", repository.name);
                continue;
            }

            let dedup = deduplicate(found, &request.names, &options.range);
            for error in dedup.unparsable {
                warn!("{}", error);
                outcomes.record(&error.package.clone(), InstallOutcome::Failed(error));
            }

            let mut candidates: Vec<_> = dedup
                .candidates
                .into_iter()
                .filter(|c| !installed_now.contains(&c.name.to_lowercase()))
                .collect();

            if !options.reinstall {
                match filter_installed(
                    self.collaborators.inspector.as_ref(),
                    &candidates,
                    &options.range,
                    options.prerelease,
                    &roots,
                ) {
                    Ok(split) => {
                        for (candidate, existing) in split.already_installed {
                            if is_requested(options, &candidate.name) {
                                pending.remove(&candidate.name.to_lowercase());
                                outcomes.record(
                                    &candidate.name,
                                    InstallOutcome::SkippedAlreadySatisfied {
                                        version: existing.version.to_string(),
                                    },
                                );
                            }
                        }
                        candidates = split.remaining;
                    }
                    Err(e) => warn!("Cannot inspect installed packages: {:#}", e),
                }
            }

            for candidate in candidates {
                if self.fetch.cancel.is_cancelled() {
                    info!("Cancelled before installing {}", candidate);
                    break;
                }
                let transaction = Transaction {
                    runtime: self.runtime,
                    collaborators: self.collaborators,
                    options,
                    fetch: self.fetch,
                };
                let result = transaction
                    .run(&candidate, repository, session, license)
                    .await;
                cleanup_errors.extend(result.cleanup_error);

                if result.outcome.is_installed() {
                    println!("   installed {}", candidate);
                    let key = candidate.name.to_lowercase();
                    pending.remove(&key);
                    installed_now.insert(key);
                }
                outcomes.record(&candidate.name, result.outcome);
            }
        }

        for name in &options.names {
            if !pending.contains(&name.to_lowercase()) {
                continue;
            }
            let fallback = if self.fetch.cancel.is_cancelled() {
                InstallOutcome::Failed(PackageError::new(
                    ErrorKind::RetrievalFailed,
                    name,
                    "operation cancelled",
                ))
            } else if skipped_for_trust {
                InstallOutcome::SkippedUntrustedSource
            } else {
                InstallOutcome::SkippedNotFound
            };
            outcomes.record_if_absent(name, fallback);
        }

        let mut entries = outcomes.into_entries();
        // Requested names first, in request order; dependencies after
        entries.sort_by_key(|(name, _)| {
            options
                .names
                .iter()
                .position(|n| same_name(n, name))
                .unwrap_or(usize::MAX)
        });
        InstallReport {
            outcomes: entries,
            cleanup_errors,
        }
    }

    /// Trust gate. Returns whether `repository` may be used.
    fn trust(&self, repository: &Repository, session: &mut ConsentSession<'_>) -> bool {
        if repository.trusted || self.options.trust_repository || self.options.force {
            return true;
        }
        let question = format!(
            "Untrusted repository\nYou are installing from an untrusted repository '{}' ({}). \
             Are you sure you want to install from it?",
            repository.name, repository.location
        );
        match session.ask(ConsentTopic::UntrustedRepository, &question) {
            Ok(true) => true,
            Ok(false) => {
                println!("    skipping untrusted repository {}", repository.name);
                false
            }
            Err(e) => {
                warn!("Cannot confirm repository '{}': {:#}", repository.name, e);
                false
            }
        }
    }
}

fn is_requested(options: &InstallOptions, name: &str) -> bool {
    options.names.iter().any(|n| same_name(n, name))
}
