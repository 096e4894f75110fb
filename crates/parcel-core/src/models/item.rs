use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content_type::{detect_content_type, DEFAULT_CONTENT_TYPE};
use crate::error::UploadError;
use crate::models::protocol::{ConfirmRequest, CredentialRequest};

/// Batch-local identity of an upload item. Progress is keyed on this, never on
/// the display name, so two files with the same name never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who can see the finalized record. Public requires an elevated role; the
/// metadata service enforces that, the orchestrator only transmits it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Progress of one item through the three-phase protocol.
///
/// Moves strictly forward: Pending → RequestingCredentials → Transferring →
/// Confirming → Completed, or into Failed from any in-flight state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    RequestingCredentials,
    Transferring,
    Confirming,
    Completed,
    Failed(UploadError),
}

impl ItemState {
    pub fn label(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::RequestingCredentials => "requesting_credentials",
            ItemState::Transferring => "transferring",
            ItemState::Confirming => "confirming",
            ItemState::Completed => "completed",
            ItemState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed(_))
    }

    /// In flight: past Pending but not yet terminal.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ItemState::RequestingCredentials | ItemState::Transferring | ItemState::Confirming
        )
    }

    pub fn can_advance_to(&self, next: &ItemState) -> bool {
        match (self, next) {
            (ItemState::Pending, ItemState::RequestingCredentials)
            | (ItemState::RequestingCredentials, ItemState::Transferring)
            | (ItemState::Transferring, ItemState::Confirming)
            | (ItemState::Confirming, ItemState::Completed) => true,
            (current, ItemState::Failed(_)) => current.is_active(),
            _ => false,
        }
    }
}

/// The bytes of one selected file with its name and declared type.
///
/// Cloning is cheap; the buffer is shared.
#[derive(Clone)]
pub struct Payload {
    filename: String,
    content_type: String,
    bytes: Bytes,
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Payload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Builds a payload whose content type is derived from the filename.
    pub fn with_detected_type(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = detect_content_type(&filename).unwrap_or(DEFAULT_CONTENT_TYPE);
        Self::new(filename, content_type, bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    /// Filename minus its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }
}

/// One user-selected file plus its editable metadata.
///
/// Metadata of an item that is already in a batch is edited through
/// [`BatchSession`](crate::models::BatchSession), which only allows it while
/// the item is Pending.
#[derive(Debug, Clone)]
pub struct UploadItem {
    id: ItemId,
    payload: Payload,
    display_name: String,
    description: String,
    visibility: Visibility,
    state: ItemState,
}

impl UploadItem {
    pub fn new(payload: Payload) -> Self {
        let display_name = payload.stem().to_string();
        Self {
            id: ItemId::new(),
            payload,
            display_name,
            description: String::new(),
            visibility: Visibility::default(),
            state: ItemState::Pending,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn filename(&self) -> &str {
        self.payload.filename()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == ItemState::Pending
    }

    /// Body of the credential request for this item.
    pub fn credential_request(&self) -> CredentialRequest {
        CredentialRequest {
            extension: self.payload.extension(),
            content_type: self.payload.content_type().to_string(),
            name: self.display_name.clone(),
            description: self.description.clone(),
            visibility: self.visibility,
        }
    }

    /// Body of the confirmation request; visibility was fixed at credential time.
    pub fn confirm_request(&self, record_id: &str) -> ConfirmRequest {
        ConfirmRequest {
            record_id: record_id.to_string(),
            name: self.display_name.clone(),
            description: self.description.clone(),
        }
    }

    pub(crate) fn set_display_name(&mut self, name: String) {
        self.display_name = name;
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = description;
    }

    pub(crate) fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    pub(crate) fn set_state(&mut self, state: ItemState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> ItemState {
        ItemState::Failed(UploadError::TransferTimeout {
            filename: "a.png".to_string(),
            limit_secs: 60,
        })
    }

    #[test]
    fn test_display_name_defaults_to_stem() {
        let item = UploadItem::new(Payload::with_detected_type("Quarterly Report.pdf", vec![1]));
        assert_eq!(item.display_name(), "Quarterly Report");
        assert_eq!(item.description(), "");
        assert_eq!(item.visibility(), Visibility::Private);
        assert!(item.is_pending());
    }

    #[test]
    fn test_extension_is_lowercase_last_suffix() {
        let payload = Payload::with_detected_type("Backup.TAR.GZ", vec![]);
        assert_eq!(payload.extension(), "gz");
        assert_eq!(payload.stem(), "Backup.TAR");

        let bare = Payload::with_detected_type("Makefile", vec![]);
        assert_eq!(bare.extension(), "");
        assert_eq!(bare.stem(), "Makefile");
        assert_eq!(bare.content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_declared_content_type_is_kept() {
        let payload = Payload::new("scan.png", "image/png", vec![0u8; 4]);
        assert_eq!(payload.content_type(), "image/png");
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn test_credential_request_carries_metadata() {
        let item = UploadItem::new(Payload::with_detected_type("cat.PNG", vec![1, 2]))
            .with_display_name("Cat")
            .with_description("on a mat")
            .with_visibility(Visibility::Public);

        let request = item.credential_request();
        assert_eq!(request.extension, "png");
        assert_eq!(request.content_type, "image/png");
        assert_eq!(request.name, "Cat");
        assert_eq!(request.description, "on a mat");
        assert_eq!(request.visibility, Visibility::Public);

        let confirm = item.confirm_request("rec-1");
        assert_eq!(confirm.record_id, "rec-1");
        assert_eq!(confirm.name, "Cat");
    }

    #[test]
    fn test_state_moves_strictly_forward() {
        use ItemState::*;
        assert!(Pending.can_advance_to(&RequestingCredentials));
        assert!(RequestingCredentials.can_advance_to(&Transferring));
        assert!(Transferring.can_advance_to(&Confirming));
        assert!(Confirming.can_advance_to(&Completed));

        assert!(!Pending.can_advance_to(&Transferring));
        assert!(!RequestingCredentials.can_advance_to(&Confirming));
        assert!(!Transferring.can_advance_to(&Completed));
        assert!(!Completed.can_advance_to(&Pending));
        assert!(!Confirming.can_advance_to(&Transferring));
    }

    #[test]
    fn test_failure_only_from_in_flight_states() {
        use ItemState::*;
        assert!(RequestingCredentials.can_advance_to(&failed()));
        assert!(Transferring.can_advance_to(&failed()));
        assert!(Confirming.can_advance_to(&failed()));
        assert!(!Pending.can_advance_to(&failed()));
        assert!(!Completed.can_advance_to(&failed()));
        assert!(!failed().can_advance_to(&failed()));
    }

    #[test]
    fn test_item_ids_are_unique_for_identical_names() {
        let a = UploadItem::new(Payload::with_detected_type("dup.txt", vec![]));
        let b = UploadItem::new(Payload::with_detected_type("dup.txt", vec![]));
        assert_eq!(a.display_name(), b.display_name());
        assert_ne!(a.id(), b.id());
    }
}
