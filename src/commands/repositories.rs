use anyhow::Result;
use std::sync::Arc;

use crate::runtime::Runtime;
use crate::source::{JsonRepositoryStore, RepositoryStore};

/// List configured repositories in priority order
#[tracing::instrument(skip(runtime))]
pub fn repositories<R: Runtime>(runtime: R) -> Result<()> {
    let store = JsonRepositoryStore::from_env(Arc::new(runtime))?;
    let all = store.list(&[])?;
    if all.is_empty() {
        println!(
            "No repositories configured. Add them to {}.",
            store.path().display()
        );
        return Ok(());
    }

    for repository in all {
        let trust = if repository.trusted {
            "trusted"
        } else {
            "untrusted"
        };
        println!("{} {} ({})", repository.name, repository.location, trust);
    }
    Ok(())
}
