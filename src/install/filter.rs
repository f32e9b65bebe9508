//! Candidate narrowing: one version per name, minus what is already installed.

use anyhow::Result;
use log::{debug, warn};
use std::path::PathBuf;

use crate::package::{
    Candidate, InstalledInspector, InstalledPackage, Version, VersionRange, same_name,
};

use super::error::{ErrorKind, PackageError};

#[derive(Debug, Default)]
pub struct Deduplicated {
    /// One candidate per name, in first-seen name order.
    pub candidates: Vec<Candidate>,
    /// Names for which no candidate had a parsable version.
    pub unparsable: Vec<PackageError>,
}

/// Keep the newest candidate per name (case-insensitive).
///
/// Candidates for a name in `requested` must also satisfy `range`. Ties keep
/// the first candidate returned by the search.
pub fn deduplicate(
    candidates: Vec<Candidate>,
    requested: &[String],
    range: &VersionRange,
) -> Deduplicated {
    let mut best: Vec<(Candidate, Option<Version>)> = Vec::new();

    for candidate in candidates {
        let version = match candidate.parsed_version() {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("Ignoring {}: {}", candidate, e);
                None
            }
        };
        let in_range = match &version {
            Some(v) => {
                !requested.iter().any(|r| same_name(r, &candidate.name))
                    || range.is_satisfied_by(v)
            }
            None => true,
        };
        if !in_range {
            debug!("Ignoring {}: outside {}", candidate, range);
            continue;
        }

        match best.iter_mut().find(|(c, _)| same_name(&c.name, &candidate.name)) {
            None => best.push((candidate, version)),
            Some(slot) => {
                let newer = match (&version, &slot.1) {
                    (Some(new), Some(old)) => new > old,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if newer {
                    *slot = (candidate, version);
                }
            }
        }
    }

    let mut result = Deduplicated::default();
    for (candidate, version) in best {
        if version.is_some() {
            result.candidates.push(candidate);
        } else {
            result.unparsable.push(PackageError::new(
                ErrorKind::VersionStringUnparsable,
                &candidate.name,
                format!("cannot parse version '{}'", candidate.full_version()),
            ));
        }
    }
    result
}

#[derive(Debug, Default)]
pub struct InstalledSplit {
    pub remaining: Vec<Candidate>,
    /// Candidates dropped because a version in range is already installed.
    pub already_installed: Vec<(Candidate, InstalledPackage)>,
}

/// Drop candidates that already have an installed version within `range`.
/// Installed prereleases only count when `prerelease` is set.
/// Reads the filesystem only.
pub fn filter_installed(
    inspector: &dyn InstalledInspector,
    candidates: &[Candidate],
    range: &VersionRange,
    prerelease: bool,
    roots: &[PathBuf],
) -> Result<InstalledSplit> {
    let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
    let mut installed = inspector.find_installed(&names, range, roots)?;
    if !prerelease {
        installed.retain(|p| {
            if p.version.is_prerelease() {
                debug!("Ignoring installed prerelease {} {}", p.name, p.version);
            }
            !p.version.is_prerelease()
        });
    }

    let mut split = InstalledSplit::default();
    for candidate in candidates.iter().cloned() {
        // Inspector results are newest first
        match installed.iter().find(|p| same_name(&p.name, &candidate.name)) {
            Some(existing) => {
                warn!(
                    "{} {} is already installed. Run again with --reinstall to install {} anyway.",
                    existing.name,
                    existing.version,
                    candidate.full_version()
                );
                split.already_installed.push((candidate, existing.clone()));
            }
            None => split.remaining.push(candidate),
        }
    }
    Ok(split)
}
