//! Step 1: obtain a presigned write destination and a provisional record id.

use parcel_core::{CredentialRequest, TransferInstructions, UploadError};
use tracing::debug;

use crate::ApiClient;

/// Asks the metadata service where one file should be written.
#[derive(Clone, Debug)]
pub struct CredentialRequester {
    api: ApiClient,
    url: String,
}

impl CredentialRequester {
    pub fn new(api: ApiClient, url: impl Into<String>) -> Self {
        Self {
            api,
            url: url.into(),
        }
    }

    /// Sends one credential request. Not retried.
    ///
    /// A non-2xx status yields `CredentialRequestFailed` with the body as
    /// detail. A 2xx whose body lacks any mandatory field, or whose upload URL
    /// does not parse, yields `IncompleteServerResponse`.
    #[tracing::instrument(
        skip(self, request),
        fields(extension = %request.extension, content_type = %request.content_type)
    )]
    pub async fn request(
        &self,
        request: &CredentialRequest,
        filename: &str,
    ) -> Result<TransferInstructions, UploadError> {
        let response = self
            .api
            .post_json(&self.url, request)
            .await
            .map_err(|e| UploadError::CredentialRequestFailed {
                filename: filename.to_string(),
                status: None,
                detail: e.to_string(),
            })?;

        if !response.status.is_success() {
            return Err(UploadError::CredentialRequestFailed {
                filename: filename.to_string(),
                status: Some(response.status.as_u16()),
                detail: response.body,
            });
        }

        let instructions = TransferInstructions::from_response_body(&response.body, filename)?;

        if reqwest::Url::parse(&instructions.upload_url).is_err() {
            return Err(UploadError::IncompleteServerResponse {
                filename: filename.to_string(),
                missing: "a valid uploadUrl".to_string(),
            });
        }

        debug!(
            record_id = %instructions.record_id,
            stored_filename = %instructions.stored_filename,
            "Received transfer instructions"
        );

        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use parcel_core::Visibility;
    use serde_json::json;
    use std::time::Duration;

    fn request() -> CredentialRequest {
        CredentialRequest {
            extension: "pdf".to_string(),
            content_type: "application/pdf".to_string(),
            name: "Contract".to_string(),
            description: "signed copy".to_string(),
            visibility: Visibility::Public,
        }
    }

    fn requester(server: &mockito::Server) -> CredentialRequester {
        let api = ApiClient::new("session-token", Duration::from_secs(5)).unwrap();
        CredentialRequester::new(api, format!("{}/api/v0/uploads/presigned", server.url()))
    }

    #[tokio::test]
    async fn test_request_sends_metadata_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v0/uploads/presigned")
            .match_header("authorization", "Bearer session-token")
            .match_body(Matcher::Json(json!({
                "extension": "pdf",
                "contentType": "application/pdf",
                "name": "Contract",
                "description": "signed copy",
                "visibility": "public"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"uploadUrl":"https://bucket.example.com/u/1?sig=abc","recordId":"rec-1","storedFilename":"1.pdf"}}"#,
            )
            .create_async()
            .await;

        let instructions = requester(&server)
            .request(&request(), "contract.pdf")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(instructions.upload_url, "https://bucket.example.com/u/1?sig=abc");
        assert_eq!(instructions.record_id, "rec-1");
        assert_eq!(instructions.stored_filename, "1.pdf");
    }

    #[tokio::test]
    async fn test_non_success_captures_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/presigned")
            .with_status(403)
            .with_body(r#"{"error":"public uploads require admin"}"#)
            .create_async()
            .await;

        let err = requester(&server)
            .request(&request(), "contract.pdf")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            UploadError::CredentialRequestFailed {
                filename: "contract.pdf".to_string(),
                status: Some(403),
                detail: r#"{"error":"public uploads require admin"}"#.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_upload_url_is_incomplete_despite_200() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/presigned")
            .with_status(200)
            .with_body(r#"{"uploadUrl":"","recordId":"x1","storedFilename":"f.pdf"}"#)
            .create_async()
            .await;

        let err = requester(&server)
            .request(&request(), "f.pdf")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::IncompleteServerResponse { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_upload_url_is_incomplete() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/presigned")
            .with_status(201)
            .with_body(r#"{"uploadUrl":"not a url","recordId":"x1","storedFilename":"f.pdf"}"#)
            .create_async()
            .await;

        let err = requester(&server)
            .request(&request(), "f.pdf")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::IncompleteServerResponse { ref missing, .. } if missing == "a valid uploadUrl"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_has_no_status() {
        let api = ApiClient::new("t", Duration::from_secs(2)).unwrap();
        let requester = CredentialRequester::new(api, "http://127.0.0.1:1/api/v0/uploads/presigned");

        let err = requester.request(&request(), "f.pdf").await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::CredentialRequestFailed { status: None, .. }
        ));
    }
}
