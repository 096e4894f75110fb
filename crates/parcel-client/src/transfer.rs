//! Step 2: write the bytes straight to storage under a hard deadline.

use std::time::Duration;

use parcel_core::{Payload, TransferInstructions, UploadError};
use reqwest::StatusCode;
use tracing::debug;

use crate::StorageClient;

/// How a transfer attempt ended before the deadline was applied.
enum TransferOutcome {
    Stored,
    Rejected { status: StatusCode, detail: String },
}

/// Sends one payload to its presigned destination.
///
/// Uses a [`StorageClient`], so the request never carries an `Authorization`
/// header whatever the caller's session state.
#[derive(Clone, Debug)]
pub struct DirectTransferClient {
    storage: StorageClient,
    deadline: Duration,
}

impl DirectTransferClient {
    pub fn new(storage: StorageClient, deadline: Duration) -> Self {
        Self { storage, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// PUTs the payload to `instructions.upload_url`.
    ///
    /// Exceeding the deadline drops the in-flight request and yields
    /// `TransferTimeout`. Failures below HTTP yield
    /// `TransferNetworkUnavailable`; a non-2xx from storage yields
    /// `StorageRejected` with the response body.
    #[tracing::instrument(
        skip(self, instructions, payload),
        fields(
            filename = %payload.filename(),
            content_type = %payload.content_type(),
            size = payload.len(),
            deadline_secs = self.deadline.as_secs()
        )
    )]
    pub async fn transfer(
        &self,
        instructions: &TransferInstructions,
        payload: &Payload,
    ) -> Result<(), UploadError> {
        let request = self.storage.put(
            &instructions.upload_url,
            payload.content_type(),
            payload.bytes().clone(),
        );

        let attempt = async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(TransferOutcome::Stored);
            }
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Ok::<_, reqwest::Error>(TransferOutcome::Rejected { status, detail })
        };

        let filename = payload.filename().to_string();
        match tokio::time::timeout(self.deadline, attempt).await {
            Err(_) => Err(self.timeout_error(filename)),
            Ok(Err(e)) if e.is_timeout() => Err(self.timeout_error(filename)),
            Ok(Err(e)) => Err(UploadError::TransferNetworkUnavailable {
                filename,
                detail: e.to_string(),
            }),
            Ok(Ok(TransferOutcome::Rejected { status, detail })) => {
                Err(UploadError::StorageRejected {
                    filename,
                    status: status.as_u16(),
                    detail,
                })
            }
            Ok(Ok(TransferOutcome::Stored)) => {
                debug!("Payload stored");
                Ok(())
            }
        }
    }

    fn timeout_error(&self, filename: String) -> UploadError {
        UploadError::TransferTimeout {
            filename,
            limit_secs: self.deadline.as_secs_f64().ceil() as u64,
        }
    }
}
