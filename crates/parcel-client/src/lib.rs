//! Batch upload client for Parcel.
//!
//! Drives each file of a batch through the three-phase protocol: request
//! transfer credentials from the metadata service, write the bytes straight to
//! object storage, then confirm the record. Items are processed one at a time
//! and the batch stops at the first failure.
//!
//! Two transport handles are kept apart on purpose:
//!
//! - [`ApiClient`] attaches the caller's bearer token and is used for the
//!   credential and confirmation calls.
//! - [`StorageClient`] carries no credentials and has no way to add any. It is
//!   used only for the direct transfer, whose presigned URL authorizes itself.

pub mod confirmation;
pub mod credentials;
pub mod orchestrator;
pub mod protocol;
pub mod reporter;
pub mod transfer;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use parcel_core::Session;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;

/// Status and verbatim body of a metadata service response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

/// HTTP client for the metadata service. Every request carries the session's
/// bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    token: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
        })
    }

    pub fn from_session(session: &Session, timeout: Duration) -> Result<Self> {
        Self::new(session.token(), timeout)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// POST a JSON body. Any HTTP status is returned as a response; only
    /// transport failures are errors.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<ApiResponse, reqwest::Error> {
        let request = self.apply_auth(self.client.post(url).json(body));
        let response = request.send().await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Ok(ApiResponse { status, body })
    }
}

/// HTTP client for presigned storage destinations.
///
/// Built without default headers and never given a token. No client-level
/// timeout is set; the transfer deadline is applied per request by
/// [`DirectTransferClient`](transfer::DirectTransferClient).
#[derive(Clone, Debug)]
pub struct StorageClient {
    client: Client,
}

impl StorageClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create storage HTTP client")?;

        Ok(Self { client })
    }

    /// PUT raw bytes with only a `Content-Type` header.
    pub fn put(&self, url: &str, content_type: &str, body: Bytes) -> reqwest::RequestBuilder {
        self.client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
    }
}

// Re-export primary types for convenience.
pub use confirmation::ConfirmationClient;
pub use credentials::CredentialRequester;
pub use orchestrator::{BatchReport, CompletedUpload, ItemFailure, UploadEvent, UploadOrchestrator};
pub use protocol::{HttpUploadProtocol, UploadProtocol};
pub use reporter::{ElapsedSnapshot, ElapsedTimeReporter};
pub use transfer::DirectTransferClient;
