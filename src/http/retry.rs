//! Retry policy for repository HTTP traffic.

use reqwest::StatusCode;

/// Maximum number of attempts for one network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Errors that will not succeed on a second attempt.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429 or 403 with a rate limit message
    RateLimitExceeded(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 403 without a rate limit message
    Forbidden(String),
    /// Any other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(msg) => {
                write!(f, "Rate limit exceeded: {}. Try again later.", msg)
            }
            NonRetryableError::AuthenticationFailed(msg) => {
                write!(
                    f,
                    "Authentication failed: {}. Check the --credential value.",
                    msg
                )
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {}", msg),
            NonRetryableError::Forbidden(msg) => {
                write!(f, "Access forbidden: {}. The repository may need a credential.", msg)
            }
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classify a response status. `Ok(())` means a retry may help.
pub fn classify_status(status: StatusCode, message: &str) -> Result<(), NonRetryableError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(
            "repository rejected the credential".to_string(),
        )),
        StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => Err(
            NonRetryableError::RateLimitExceeded("repository rate limit reached".to_string()),
        ),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(
            "access to this resource is forbidden".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(
            "too many requests".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            "the requested resource was not found".to_string(),
        )),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        // 5xx and anything unexpected may be transient
        _ => Ok(()),
    }
}

/// Convert an `error_for_status()` failure into an anyhow error, wrapping
/// non-retryable statuses in [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    let Some(status) = error.status() else {
        // Connection errors, timeouts, etc.
        return anyhow::Error::from(error);
    };
    match classify_status(status, &error.to_string()) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
