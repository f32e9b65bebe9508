//! Per-name results of an install operation.

use std::fmt;

use crate::package::same_name;

use super::error::{ErrorKind, PackageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { version: String, repository: String },
    SkippedAlreadySatisfied { version: String },
    SkippedUntrustedSource,
    SkippedNotFound,
    Failed(PackageError),
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallOutcome::Installed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, InstallOutcome::Failed(_))
    }

    /// The error kind a skip or failure corresponds to, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InstallOutcome::Installed { .. } | InstallOutcome::SkippedAlreadySatisfied { .. } => {
                None
            }
            InstallOutcome::SkippedUntrustedSource => Some(ErrorKind::UntrustedSourceDeclined),
            InstallOutcome::SkippedNotFound => Some(ErrorKind::PackageNotFoundInSource),
            InstallOutcome::Failed(e) => Some(e.kind),
        }
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::Installed {
                version,
                repository,
            } => write!(f, "installed {} from {}", version, repository),
            InstallOutcome::SkippedAlreadySatisfied { version } => {
                write!(f, "{} is already installed", version)
            }
            InstallOutcome::SkippedUntrustedSource => {
                write!(f, "skipped, repository not trusted")
            }
            InstallOutcome::SkippedNotFound => write!(f, "not found in any repository"),
            InstallOutcome::Failed(e) => write!(f, "failed: {} ({})", e.message, e.kind),
        }
    }
}

/// Outcomes keyed by package name (case-insensitive), in first-seen order.
///
/// A later outcome for the same name replaces the earlier one, so a package
/// that failed in one repository and installed from the next ends up
/// `Installed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeAggregator {
    entries: Vec<(String, InstallOutcome)>,
}

impl OutcomeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, outcome: InstallOutcome) {
        match self.entries.iter_mut().find(|(n, _)| same_name(n, name)) {
            Some(entry) => entry.1 = outcome,
            None => self.entries.push((name.to_string(), outcome)),
        }
    }

    /// Record `outcome` only if `name` has none yet.
    pub fn record_if_absent(&mut self, name: &str, outcome: InstallOutcome) {
        if self.get(name).is_none() {
            self.entries.push((name.to_string(), outcome));
        }
    }

    pub fn get(&self, name: &str) -> Option<&InstallOutcome> {
        self.entries
            .iter()
            .find(|(n, _)| same_name(n, name))
            .map(|(_, o)| o)
    }

    pub fn into_entries(self) -> Vec<(String, InstallOutcome)> {
        self.entries
    }
}

/// Result of [`Installer::install`](super::Installer::install).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub outcomes: Vec<(String, InstallOutcome)>,
    /// Staging areas that could not be removed. Never fatal.
    pub cleanup_errors: Vec<PackageError>,
}

impl InstallReport {
    pub fn outcome(&self, name: &str) -> Option<&InstallOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| same_name(n, name))
            .map(|(_, o)| o)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.is_failure())
    }

    pub fn installed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_installed())
            .map(|(n, _)| n.as_str())
    }
}
