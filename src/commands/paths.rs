use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use crate::install::InstallTarget;
use crate::runtime::Runtime;

const MODULES_DIR: &str = "modules";
const SCRIPTS_DIR: &str = "scripts";

/// Module and script roots under `install_root`, or under the default root
/// when none is given.
#[tracing::instrument(skip(runtime))]
pub fn install_target<R: Runtime + ?Sized>(
    runtime: &R,
    install_root: Option<PathBuf>,
) -> Result<InstallTarget> {
    let root = match install_root {
        Some(path) => path,
        None => default_install_root(runtime)?,
    };
    info!("Using install root: {}", root.display());
    Ok(InstallTarget::standard(
        root.join(MODULES_DIR),
        root.join(SCRIPTS_DIR),
    ))
}

/// `<data_dir>/stagehand`
#[tracing::instrument(skip(runtime))]
pub fn default_install_root<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    let data_dir = runtime
        .data_dir()
        .context("Could not find the user data directory; pass --root")?;
    Ok(data_dir.join("stagehand"))
}
