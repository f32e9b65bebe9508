mod zip;

use anyhow::Result;
use std::path::Path;

pub use zip::ZipExtractor;

/// Unpacks a retrieved package archive.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Whether this extractor understands the archive at `archive_path`.
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract every entry of `archive_path` into `extract_to`, keeping the
    /// archive's own layout.
    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()>;
}
