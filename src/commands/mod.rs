mod config;
mod install;
mod paths;
mod repositories;

pub use config::Config;
pub use install::{InstallRequest, install};
pub use paths::{default_install_root, install_target};
pub use repositories::repositories;
