//! HTTP client with retry handling for repository indexes and package downloads.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::io::Write;

use crate::cancel::CancelToken;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn get(&self, url: &str, credential: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url);
        match credential {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET `url` and deserialize the JSON body, retrying transient failures.
    #[tracing::instrument(skip(self, credential))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credential: Option<&str>,
    ) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .get(url, credential)
                .send()
                .await
                .context("Failed to send request")?;

            let response = response.error_for_status().map_err(check_retryable)?;

            response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")
        })
        .await
    }

    /// Stream `url` into the writer produced by `create_writer`.
    ///
    /// The writer is recreated on every attempt. Cancellation is checked
    /// before each attempt and between chunks and is never retried.
    #[tracing::instrument(skip(self, credential, cancel, create_writer))]
    pub async fn download_file<W, F>(
        &self,
        url: &str,
        credential: Option<&str>,
        cancel: &CancelToken,
        create_writer: F,
    ) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        self.with_retry("Download", || async {
            cancel.check()?;
            self.download_file_once(url, credential, cancel, &create_writer)
                .await
        })
        .await
    }

    async fn download_file_once<W, F>(
        &self,
        url: &str,
        credential: Option<&str>,
        cancel: &CancelToken,
        create_writer: &F,
    ) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = self
            .get(url, credential)
            .send()
            .await
            .context("Failed to start download request")?;

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            cancel.check()?;
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!("Downloaded {} bytes", downloaded_bytes);
        Ok(downloaded_bytes)
    }

    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

fn is_retryable_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<NonRetryableError>().is_none()
        && e.downcast_ref::<crate::cancel::Cancelled>().is_none()
}
