//! Request and response bodies of the three upload protocol calls.
//!
//! Responses from the metadata service may carry their fields at the top
//! level or nested under a `data` envelope; both shapes are accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UploadError;
use crate::models::item::Visibility;

/// Step 1 request: ask for a one-time write destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub extension: String,
    pub content_type: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
}

/// Step 1 response: where to write the bytes and which record to finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInstructions {
    /// Presigned destination; carries its own scoped authorization.
    pub upload_url: String,
    /// Provisional record identifier, finalized in step 3.
    pub record_id: String,
    /// Filename the service will store the object under.
    pub stored_filename: String,
}

/// Step 3 request: finalize the provisional record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub record_id: String,
    pub name: String,
    pub description: String,
}

/// Step 3 response: the finalized record as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedRecord {
    pub record_id: String,
    /// Response payload with any `data` envelope removed; `Null` if the body was empty.
    pub body: Value,
}

fn unwrap_envelope(value: &Value) -> &Value {
    match value.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

/// Reads a mandatory field as a non-empty string. Numeric ids are accepted.
fn required_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl TransferInstructions {
    /// Parses a successful step-1 response body.
    ///
    /// A body that is not JSON, or lacks any of the three fields, is a contract
    /// violation reported as [`UploadError::IncompleteServerResponse`].
    pub fn from_response_body(body: &str, filename: &str) -> Result<Self, UploadError> {
        let incomplete = |missing: &str| UploadError::IncompleteServerResponse {
            filename: filename.to_string(),
            missing: missing.to_string(),
        };

        let value: Value =
            serde_json::from_str(body).map_err(|_| incomplete("a JSON response body"))?;
        let fields = unwrap_envelope(&value);

        let upload_url = required_field(fields, "uploadUrl").ok_or_else(|| incomplete("uploadUrl"))?;
        let record_id = required_field(fields, "recordId").ok_or_else(|| incomplete("recordId"))?;
        let stored_filename =
            required_field(fields, "storedFilename").ok_or_else(|| incomplete("storedFilename"))?;

        Ok(Self {
            upload_url,
            record_id,
            stored_filename,
        })
    }
}

impl FinalizedRecord {
    /// Parses a successful step-3 response body. The service may answer with an
    /// empty or non-JSON body; the record is finalized either way.
    pub fn from_response_body(body: &str, record_id: &str) -> Self {
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(body) {
                Ok(value) => unwrap_envelope(&value).clone(),
                Err(_) => Value::String(body.to_string()),
            }
        };

        Self {
            record_id: record_id.to_string(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credential_request_wire_shape() {
        let request = CredentialRequest {
            extension: "pdf".to_string(),
            content_type: "application/pdf".to_string(),
            name: "Invoice".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "extension": "pdf",
                "contentType": "application/pdf",
                "name": "Invoice",
                "description": "",
                "visibility": "private"
            })
        );
    }

    #[test]
    fn test_confirm_request_omits_visibility() {
        let request = ConfirmRequest {
            record_id: "r1".to_string(),
            name: "Invoice".to_string(),
            description: "March".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({ "recordId": "r1", "name": "Invoice", "description": "March" })
        );
    }

    #[test]
    fn test_instructions_from_flat_body() {
        let body = r#"{"uploadUrl":"https://s3/x?sig=1","recordId":"x1","storedFilename":"f.pdf"}"#;
        let instructions = TransferInstructions::from_response_body(body, "f.pdf").unwrap();
        assert_eq!(instructions.upload_url, "https://s3/x?sig=1");
        assert_eq!(instructions.record_id, "x1");
        assert_eq!(instructions.stored_filename, "f.pdf");
    }

    #[test]
    fn test_instructions_from_data_envelope() {
        let body = r#"{"data":{"uploadUrl":"https://s3/y","recordId":42,"storedFilename":"y.png"},"success":true}"#;
        let instructions = TransferInstructions::from_response_body(body, "y.png").unwrap();
        assert_eq!(instructions.upload_url, "https://s3/y");
        assert_eq!(instructions.record_id, "42");
    }

    #[test]
    fn test_empty_upload_url_is_incomplete() {
        let body = r#"{"uploadUrl":"","recordId":"x1","storedFilename":"f.pdf"}"#;
        let err = TransferInstructions::from_response_body(body, "f.pdf").unwrap_err();
        assert_eq!(
            err,
            UploadError::IncompleteServerResponse {
                filename: "f.pdf".to_string(),
                missing: "uploadUrl".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_fields_are_incomplete() {
        let body = r#"{"data":{"uploadUrl":"https://s3/z","recordId":"z"}}"#;
        let err = TransferInstructions::from_response_body(body, "z.bin").unwrap_err();
        assert!(matches!(
            err,
            UploadError::IncompleteServerResponse { ref missing, .. } if missing == "storedFilename"
        ));

        let err = TransferInstructions::from_response_body(r#"{"recordId":null}"#, "z.bin")
            .unwrap_err();
        assert!(matches!(err, UploadError::IncompleteServerResponse { .. }));
    }

    #[test]
    fn test_non_json_body_is_incomplete() {
        let err = TransferInstructions::from_response_body("<html>ok</html>", "a.txt").unwrap_err();
        assert!(matches!(err, UploadError::IncompleteServerResponse { .. }));
    }

    #[test]
    fn test_finalized_record_tolerates_shapes() {
        let enveloped = FinalizedRecord::from_response_body(r#"{"data":{"id":"r1"}}"#, "r1");
        assert_eq!(enveloped.body, json!({ "id": "r1" }));

        let empty = FinalizedRecord::from_response_body("", "r2");
        assert_eq!(empty.body, Value::Null);
        assert_eq!(empty.record_id, "r2");

        let text = FinalizedRecord::from_response_body("OK", "r3");
        assert_eq!(text.body, Value::String("OK".to_string()));
    }
}
