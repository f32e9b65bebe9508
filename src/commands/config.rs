use anyhow::Result;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    archive::ZipExtractor,
    consent::{AssumeYes, Consent, ConsoleConsent},
    http::HttpClient,
    install::{Collaborators, InstallTarget},
    package::{DirectoryInspector, JsonMetadataWriter, KeyValueManifestParser},
    runtime::Runtime,
    source::{IndexSource, JsonRepositoryStore},
};

use super::paths::install_target;

/// Production wiring of the installer's collaborators.
pub struct Config<R: Runtime> {
    pub runtime: Arc<R>,
    pub collaborators: Collaborators,
    pub target: InstallTarget,
}

impl<R: Runtime + 'static> Config<R> {
    pub fn new(runtime: R, install_root: Option<PathBuf>, assume_yes: bool) -> Result<Self> {
        let runtime = Arc::new(runtime);
        let target = install_target(runtime.as_ref(), install_root)?;

        let client = Client::builder().user_agent("stagehand").build()?;
        let source = Arc::new(IndexSource::new(
            runtime.clone(),
            HttpClient::new(client),
            ZipExtractor::new(runtime.clone()),
        ));
        let consent: Arc<dyn Consent> = if assume_yes {
            Arc::new(AssumeYes)
        } else {
            Arc::new(ConsoleConsent::new(runtime.clone()))
        };

        let collaborators = Collaborators {
            repositories: Arc::new(JsonRepositoryStore::from_env(runtime.clone())?),
            search: source.clone(),
            retrieval: source,
            inspector: Arc::new(DirectoryInspector::new(runtime.clone())),
            manifests: Arc::new(KeyValueManifestParser::new(runtime.clone())),
            metadata: Arc::new(JsonMetadataWriter::new(runtime.clone())),
            consent,
        };

        Ok(Self {
            runtime,
            collaborators,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageKind;
    use crate::runtime::MockRuntime;
    use crate::source::CONFIG_ENV;
    use mockall::predicate::eq;
    use std::path::Path;

    #[test]
    fn test_config_uses_explicit_root() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq(CONFIG_ENV))
            .returning(|_| Ok("/cfg/repositories.json".to_string()));
        runtime.expect_data_dir().never();

        let config = Config::new(runtime, Some(PathBuf::from("/opt/stage")), true).unwrap();
        assert_eq!(
            config.target.root_for(PackageKind::Module),
            Some(Path::new("/opt/stage/modules"))
        );
        assert_eq!(
            config.target.root_for(PackageKind::Script),
            Some(Path::new("/opt/stage/scripts"))
        );
    }

    #[test]
    fn test_config_fails_without_config_dir() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq(CONFIG_ENV))
            .returning(|_| Err(std::env::VarError::NotPresent));
        runtime.expect_config_dir().returning(|| None);

        let result = Config::new(runtime, Some(PathBuf::from("/opt/stage")), false);
        assert!(result.is_err());
    }
}
