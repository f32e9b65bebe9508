use std::fmt;

/// Why a single package was not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UntrustedSourceDeclined,
    PackageNotFoundInSource,
    PackageNameInvalid,
    VersionStringUnparsable,
    RetrievalFailed,
    ManifestMissing,
    ManifestUnparsable,
    LicenseTextMissing,
    LicenseNotAccepted,
    MetadataWriteFailed,
    CommitFailed,
    StagingCleanupFailed,
}

/// Coarse error class, suitable for exit codes and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    ObjectNotFound,
    InvalidArgument,
    InvalidData,
    ResourceUnavailable,
    WriteError,
    SecurityError,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::UntrustedSourceDeclined => ErrorCategory::SecurityError,
            ErrorKind::PackageNotFoundInSource => ErrorCategory::ObjectNotFound,
            ErrorKind::PackageNameInvalid => ErrorCategory::InvalidData,
            ErrorKind::VersionStringUnparsable => ErrorCategory::InvalidArgument,
            ErrorKind::RetrievalFailed => ErrorCategory::ResourceUnavailable,
            ErrorKind::ManifestMissing => ErrorCategory::ObjectNotFound,
            ErrorKind::ManifestUnparsable => ErrorCategory::InvalidData,
            ErrorKind::LicenseTextMissing => ErrorCategory::ObjectNotFound,
            ErrorKind::LicenseNotAccepted => ErrorCategory::InvalidArgument,
            ErrorKind::MetadataWriteFailed => ErrorCategory::WriteError,
            ErrorKind::CommitFailed => ErrorCategory::WriteError,
            ErrorKind::StagingCleanupFailed => ErrorCategory::WriteError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A per-package failure. These are recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageError {
    pub kind: ErrorKind,
    pub package: String,
    pub message: String,
}

impl PackageError {
    pub fn new(kind: ErrorKind, package: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            package: package.to_string(),
            message: message.into(),
        }
    }

    /// Build from an anyhow error, keeping the whole context chain.
    pub fn from_error(kind: ErrorKind, package: &str, error: &anyhow::Error) -> Self {
        Self::new(kind, package, format!("{:#}", error))
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.package, self.kind, self.message)
    }
}

impl std::error::Error for PackageError {}

/// Errors that abort a whole install operation.
#[derive(Debug)]
pub enum InstallError {
    /// No repository is configured, or none matched the requested names.
    NoRepositories,
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::NoRepositories => write!(
                f,
                "No repositories are registered. Add one to the repository config first."
            ),
        }
    }
}

impl std::error::Error for InstallError {}
