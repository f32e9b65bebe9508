use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

use crate::runtime::Runtime;

use super::ArchiveExtractor;

/// Extractor for zip-based package archives (`.zip` and `.nupkg`).
pub struct ZipExtractor<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> ZipExtractor<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> ArchiveExtractor for ZipExtractor<R> {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip") || name.ends_with(".nupkg")
    }

    #[tracing::instrument(skip(self))]
    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()> {
        debug!("Extracting {:?} to {:?}...", archive_path, extract_to);
        let mut reader = self
            .runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // ZipArchive needs Read + Seek; Runtime::open only gives Read
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))?;

        if archive.is_empty() {
            return Err(anyhow!("Archive {:?} is empty", archive_path));
        }

        self.runtime.create_dir_all(extract_to)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let Some(entry_path) = entry.enclosed_name() else {
                debug!("Skipping entry with unsafe path: {}", entry.name());
                continue;
            };
            let full_path = extract_to.join(entry_path);

            if entry.is_dir() {
                self.runtime.create_dir_all(&full_path)?;
                continue;
            }
            if let Some(parent) = full_path.parent() {
                self.runtime.create_dir_all(parent)?;
            }
            let mut dest_file = self.runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode()
                && let Err(e) = self.runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }

        debug!("Extracted {} entries", archive.len());
        Ok(())
    }
}
