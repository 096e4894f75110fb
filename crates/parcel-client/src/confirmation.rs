//! Step 3: finalize the provisional record once the bytes are stored.

use parcel_core::{ConfirmRequest, FinalizedRecord, UploadError};
use tracing::debug;

use crate::ApiClient;

/// Tells the metadata service a transfer succeeded.
#[derive(Clone, Debug)]
pub struct ConfirmationClient {
    api: ApiClient,
    url: String,
}

impl ConfirmationClient {
    pub fn new(api: ApiClient, url: impl Into<String>) -> Self {
        Self {
            api,
            url: url.into(),
        }
    }

    #[tracing::instrument(skip(self, request), fields(record_id = %request.record_id))]
    pub async fn confirm(
        &self,
        request: &ConfirmRequest,
        filename: &str,
    ) -> Result<FinalizedRecord, UploadError> {
        let response = self
            .api
            .post_json(&self.url, request)
            .await
            .map_err(|e| UploadError::ConfirmationFailed {
                filename: filename.to_string(),
                status: None,
                detail: e.to_string(),
            })?;

        if !response.status.is_success() {
            return Err(UploadError::ConfirmationFailed {
                filename: filename.to_string(),
                status: Some(response.status.as_u16()),
                detail: response.body,
            });
        }

        debug!("Record finalized");
        Ok(FinalizedRecord::from_response_body(
            &response.body,
            &request.record_id,
        ))
    }
}
