//! Repositories described by an `index.json` file.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use crate::archive::ArchiveExtractor;
use crate::http::HttpClient;
use crate::package::{
    Candidate, Dependency, Version, VersionRange, is_valid_name, same_name,
};
use crate::runtime::Runtime;

use super::{
    FetchContext, PackageRetrieval, PackageSearch, Repository, RepositoryLocation,
    RetrievedPackage, SearchRequest,
};

pub const INDEX_FILE_NAME: &str = "index.json";

/// One published package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub prerelease: Option<String>,
    /// Archive file name relative to the repository location.
    pub file: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl IndexEntry {
    fn to_candidate(&self, repository: &Repository) -> Candidate {
        Candidate {
            name: self.name.clone(),
            version: self.version.clone(),
            prerelease: self.prerelease.clone().filter(|p| !p.is_empty()),
            repository: repository.name.clone(),
            archive: self.file.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    #[serde(default)]
    pub packages: Vec<IndexEntry>,
}

impl RepositoryIndex {
    /// Entries for `name` within `range`, newest first.
    ///
    /// Entries whose version cannot be parsed are kept (sorted last) so the
    /// installer can report them instead of silently hiding them.
    pub fn matching(
        &self,
        name: &str,
        range: &VersionRange,
        prerelease: bool,
    ) -> Vec<&IndexEntry> {
        let mut matched: Vec<(Option<Version>, &IndexEntry)> = self
            .packages
            .iter()
            .filter(|e| same_name(&e.name, name))
            .filter_map(|e| {
                let candidate_version = full_version(e).parse::<Version>().ok();
                match &candidate_version {
                    Some(v) if v.is_prerelease() && !prerelease => None,
                    Some(v) if !range.is_satisfied_by(v) => None,
                    _ => Some((candidate_version, e)),
                }
            })
            .collect();

        // Newest first; None sorts below every Some
        matched.sort_by(|(a, _), (b, _)| b.cmp(a));
        matched.into_iter().map(|(_, e)| e).collect()
    }
}

fn full_version(entry: &IndexEntry) -> String {
    match &entry.prerelease {
        Some(label) if !label.is_empty() && !entry.version.contains('-') => {
            format!("{}-{}", entry.version, label)
        }
        _ => entry.version.clone(),
    }
}

/// Search and retrieval against `index.json` repositories, local or remote.
pub struct IndexSource<R: Runtime, E: ArchiveExtractor> {
    runtime: Arc<R>,
    http: HttpClient,
    extractor: E,
}

impl<R: Runtime, E: ArchiveExtractor> IndexSource<R, E> {
    pub fn new(runtime: Arc<R>, http: HttpClient, extractor: E) -> Self {
        Self {
            runtime,
            http,
            extractor,
        }
    }

    #[tracing::instrument(skip(self, fetch))]
    pub async fn load_index(
        &self,
        repository: &Repository,
        fetch: &FetchContext,
    ) -> Result<RepositoryIndex> {
        fetch.cancel.check()?;
        match &repository.location {
            RepositoryLocation::Local(dir) => {
                let path = dir.join(INDEX_FILE_NAME);
                debug!("Reading index {:?}", path);
                let content = self.runtime.read_to_string(&path)?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse repository index {:?}", path))
            }
            RepositoryLocation::Remote(_) => {
                let url = repository.location.join(INDEX_FILE_NAME)?;
                self.http
                    .get_json(&url, fetch.credential())
                    .await
                    .with_context(|| format!("Failed to fetch repository index {}", url))
            }
        }
    }
}

#[async_trait]
impl<R: Runtime, E: ArchiveExtractor> PackageSearch for IndexSource<R, E> {
    async fn find(
        &self,
        request: &SearchRequest,
        repository: &Repository,
        fetch: &FetchContext,
    ) -> Result<Vec<Candidate>> {
        let index = self.load_index(repository, fetch).await?;

        let mut queue: VecDeque<(String, VersionRange)> = request
            .names
            .iter()
            .map(|n| (n.clone(), request.range.clone()))
            .collect();
        let mut visited = BTreeSet::new();
        let mut found = Vec::new();

        while let Some((name, range)) = queue.pop_front() {
            if !visited.insert(name.to_lowercase()) {
                continue;
            }
            let matched = index.matching(&name, &range, request.prerelease);
            debug!(
                "{}: {} match(es) for {} {}",
                repository.name,
                matched.len(),
                name,
                range
            );
            // Dependencies follow the newest match, which dedup will pick
            if let Some(newest) = matched.first() {
                for dep in &newest.dependencies {
                    queue.push_back((dep.name.clone(), dep.range.clone()));
                }
            }
            found.extend(matched.into_iter().map(|e| e.to_candidate(repository)));
        }

        Ok(found)
    }
}

#[async_trait]
impl<R: Runtime, E: ArchiveExtractor> PackageRetrieval for IndexSource<R, E> {
    async fn retrieve(
        &self,
        candidate: &Candidate,
        repository: &Repository,
        dest: &Path,
        fetch: &FetchContext,
    ) -> Result<RetrievedPackage> {
        fetch.cancel.check()?;
        if !is_valid_name(&candidate.name) {
            bail!("Refusing to unpack package with name '{}'", candidate.name);
        }

        let file_name = Path::new(&candidate.archive)
            .file_name()
            .with_context(|| format!("Invalid archive name '{}'", candidate.archive))?;
        self.runtime.create_dir_all(dest)?;
        let archive = dest.join(file_name);
        let source = repository.location.join(&candidate.archive)?;

        match &repository.location {
            RepositoryLocation::Local(_) => {
                debug!("Copying {} to {:?}", source, archive);
                self.runtime.copy(Path::new(&source), &archive)?;
            }
            RepositoryLocation::Remote(_) => {
                info!("Downloading {}", source);
                self.http
                    .download_file(&source, fetch.credential(), &fetch.cancel, || {
                        self.runtime.create_file(&archive)
                    })
                    .await
                    .with_context(|| format!("Failed to download {}", source))?;
            }
        }

        let content = dest.join(&candidate.name);
        self.extractor.extract(&archive, &content)?;
        Ok(RetrievedPackage { archive, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MockArchiveExtractor, ZipExtractor};
    use crate::cancel::{CancelToken, Cancelled};
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::source::repository;
    use mockall::predicate::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const INDEX: &str = r#"{
        "packages": [
            {"name": "Foo", "version": "1.0.0", "file": "Foo.1.0.0.zip"},
            {"name": "Foo", "version": "1.5.0", "file": "Foo.1.5.0.zip",
             "dependencies": [{"name": "Bar", "range": "[1.0,2.0)"}]},
            {"name": "Foo", "version": "2.0.0", "prerelease": "beta1", "file": "Foo.2.0.0-beta1.zip"},
            {"name": "Bar", "version": "1.2.0", "file": "Bar.1.2.0.zip",
             "dependencies": [{"name": "Baz"}]},
            {"name": "Bar", "version": "2.1.0", "file": "Bar.2.1.0.zip"},
            {"name": "Baz", "version": "0.1", "file": "Baz.0.1.zip"},
            {"name": "Odd", "version": "banana", "file": "Odd.zip"}
        ]
    }"#;

    fn index() -> RepositoryIndex {
        serde_json::from_str(INDEX).unwrap()
    }

    fn versions(entries: &[&IndexEntry]) -> Vec<String> {
        entries.iter().map(|e| full_version(e)).collect()
    }

    fn request(names: &[&str], range: &str, prerelease: bool) -> SearchRequest {
        SearchRequest {
            names: names.iter().map(|s| s.to_string()).collect(),
            range: range.parse().unwrap(),
            prerelease,
        }
    }

    fn local_source(
        runtime: MockRuntime,
    ) -> IndexSource<MockRuntime, MockArchiveExtractor> {
        IndexSource::new(
            Arc::new(runtime),
            HttpClient::default(),
            MockArchiveExtractor::new(),
        )
    }

    #[test]
    fn test_matching_sorts_newest_first_and_hides_prerelease() {
        let index = index();
        assert_eq!(
            versions(&index.matching("foo", &VersionRange::any(), false)),
            vec!["1.5.0", "1.0.0"]
        );
        assert_eq!(
            versions(&index.matching("Foo", &VersionRange::any(), true)),
            vec!["2.0.0-beta1", "1.5.0", "1.0.0"]
        );
        assert_eq!(
            versions(&index.matching("Foo", &"[1.0,1.5)".parse().unwrap(), true)),
            vec!["1.0.0"]
        );
    }

    #[test]
    fn test_matching_keeps_unparsable_versions() {
        let index = index();
        assert_eq!(
            versions(&index.matching("Odd", &"1.0".parse().unwrap(), false)),
            vec!["banana"]
        );
    }

    #[tokio::test]
    async fn test_find_expands_dependencies_with_their_own_ranges() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/feed/index.json")))
            .returning(|_| Ok(INDEX.to_string()));

        let source = local_source(runtime);
        let repo = repository("R1", "/feed", true);
        let found = source
            .find(
                &request(&["Foo"], "*", false),
                &repo,
                &FetchContext::default(),
            )
            .await
            .unwrap();

        let summary: Vec<String> = found.iter().map(|c| c.to_string()).collect();
        assert_eq!(summary, vec!["Foo 1.5.0", "Foo 1.0.0", "Bar 1.2.0", "Baz 0.1"]);
        assert!(found.iter().all(|c| c.repository == "R1"));
    }

    #[tokio::test]
    async fn test_find_unknown_name_is_empty() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(INDEX.to_string()));

        let found = local_source(runtime)
            .find(
                &request(&["Nope"], "*", false),
                &repository("R1", "/feed", true),
                &FetchContext::default(),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_find_reports_broken_index() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{ nope".to_string()));

        let result = local_source(runtime)
            .find(
                &request(&["Foo"], "*", false),
                &repository("R1", "/feed", true),
                &FetchContext::default(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_remote_index_with_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed/index.json")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(INDEX)
            .create_async()
            .await;

        let source = local_source(MockRuntime::new());
        let repo = repository("Remote", &format!("{}/feed", server.url()), false);
        let fetch = FetchContext {
            credential: Some("tok".into()),
            cancel: CancelToken::new(),
        };
        let found = source
            .find(&request(&["Baz"], "*", false), &repo, &fetch)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].archive, "Baz.0.1.zip");
    }

    #[tokio::test]
    async fn test_find_respects_cancellation() {
        let fetch = FetchContext::default();
        fetch.cancel.cancel();

        let err = local_source(MockRuntime::new())
            .find(
                &request(&["Foo"], "*", false),
                &repository("R1", "/feed", true),
                &fetch,
            )
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_from_local_folder() {
        let feed = tempdir().unwrap();
        let stage = tempdir().unwrap();
        write_zip(
            &feed.path().join("Foo.1.5.0.zip"),
            &[("Foo.manifest", "ModuleVersion = 1.5.0")],
        );

        let runtime = Arc::new(RealRuntime);
        let source = IndexSource::new(
            runtime.clone(),
            HttpClient::default(),
            ZipExtractor::new(runtime),
        );
        let repo = repository("R1", feed.path().to_str().unwrap(), true);
        let mut candidate = crate::package::candidate("Foo", "1.5.0", "R1");
        candidate.archive = "Foo.1.5.0.zip".into();

        let retrieved = source
            .retrieve(&candidate, &repo, stage.path(), &FetchContext::default())
            .await
            .unwrap();

        assert_eq!(retrieved.archive, stage.path().join("Foo.1.5.0.zip"));
        assert_eq!(retrieved.content, stage.path().join("Foo"));
        assert!(retrieved.archive.exists());
        assert_eq!(
            fs::read_to_string(retrieved.content.join("Foo.manifest")).unwrap(),
            "ModuleVersion = 1.5.0"
        );
    }

    #[tokio::test]
    async fn test_retrieve_rejects_path_like_names() {
        let feed = tempdir().unwrap();
        let stage = tempdir().unwrap();
        let dest = stage.path().join("content");
        let runtime = Arc::new(RealRuntime);
        let source = IndexSource::new(
            runtime.clone(),
            HttpClient::default(),
            ZipExtractor::new(runtime),
        );
        let repo = repository("R1", feed.path().to_str().unwrap(), true);
        let candidate = crate::package::candidate("../escaped", "1.0", "R1");

        let err = source
            .retrieve(&candidate, &repo, &dest, &FetchContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("../escaped"));
        assert!(!dest.exists());
        assert!(!stage.path().join("escaped").exists());
    }

    #[tokio::test]
    async fn test_retrieve_downloads_from_remote() {
        let scratch = tempdir().unwrap();
        let zip_path = scratch.path().join("payload.zip");
        write_zip(&zip_path, &[("Deploy.script", "echo deploy")]);
        let body = fs::read(&zip_path).unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed/Deploy.3.1.zip")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let stage = scratch.path().join("stage");
        let runtime = Arc::new(RealRuntime);
        let source = IndexSource::new(
            runtime.clone(),
            HttpClient::default(),
            ZipExtractor::new(runtime),
        );
        let repo = repository("Remote", &format!("{}/feed", server.url()), true);
        let mut candidate = crate::package::candidate("Deploy", "3.1", "Remote");
        candidate.archive = "Deploy.3.1.zip".into();

        let retrieved = source
            .retrieve(&candidate, &repo, &stage, &FetchContext::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            fs::read_to_string(retrieved.content.join("Deploy.script")).unwrap(),
            "echo deploy"
        );
    }

    #[tokio::test]
    async fn test_retrieve_missing_archive_fails() {
        let feed = tempdir().unwrap();
        let stage = tempdir().unwrap();
        let runtime = Arc::new(RealRuntime);
        let source = IndexSource::new(
            runtime.clone(),
            HttpClient::default(),
            ZipExtractor::new(runtime),
        );
        let repo = repository("R1", feed.path().to_str().unwrap(), true);

        let result = source
            .retrieve(
                &crate::package::candidate("Foo", "1.5.0", "R1"),
                &repo,
                stage.path(),
                &FetchContext::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
