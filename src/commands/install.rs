use anyhow::{Context, Result, bail};
use log::debug;
use std::path::PathBuf;

use crate::{
    cancel::CancelToken,
    install::{InstallOptions, InstallReport, Installer},
    package::VersionRange,
    runtime::Runtime,
};

use super::config::Config;

/// Everything `stagehand install` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub names: Vec<String>,
    pub version: Option<String>,
    pub prerelease: bool,
    pub repositories: Vec<String>,
    pub accept_license: bool,
    pub reinstall: bool,
    pub force: bool,
    pub trust_repository: bool,
    pub credential: Option<String>,
    pub save_only: bool,
    pub no_metadata: bool,
    pub yes: bool,
}

#[tracing::instrument(skip(runtime, request), fields(names = ?request.names))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    request: InstallRequest,
    install_root: Option<PathBuf>,
) -> Result<()> {
    let range = match &request.version {
        Some(spec) => spec
            .parse::<VersionRange>()
            .with_context(|| format!("Invalid --version '{}'", spec))?,
        None => VersionRange::any(),
    };
    let config = Config::new(runtime, install_root, request.yes)?;

    let mut options = InstallOptions::new(request.names, config.target);
    options.range = range;
    options.prerelease = request.prerelease;
    options.repositories = request.repositories;
    options.accept_license = request.accept_license;
    options.reinstall = request.reinstall;
    options.force = request.force;
    options.trust_repository = request.trust_repository;
    options.credential = request.credential;
    options.save_only = request.save_only;
    options.include_metadata_sidecar = !request.no_metadata;

    let cancel = CancelToken::new();
    let ctrl_c = cancel.cancel_on_ctrl_c();
    let installer = Installer::new(config.runtime, config.collaborators).with_cancel(cancel);
    let result = installer.install(options).await;
    ctrl_c.abort();

    let report = result?;
    print_report(&report);

    let failed = report.outcomes.iter().filter(|(_, o)| o.is_failure()).count();
    if failed > 0 {
        bail!("{} package(s) failed to install", failed);
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    for (name, outcome) in &report.outcomes {
        println!("{}: {}", name, outcome);
    }
    for error in &report.cleanup_errors {
        debug!("Cleanup problem: {}", error);
        println!("warning: {}", error);
    }
}
