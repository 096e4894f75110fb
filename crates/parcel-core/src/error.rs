//! Error types module
//!
//! Failures are split by who has to react to them:
//!
//! - [`UploadError`] is the per-item protocol failure. It is stored on the
//!   failed item and on the aborted batch, and its message always names the file.
//! - [`BatchError`] rejects a submission before any state changes.
//! - [`ItemError`] rejects an edit to a batch item.
//! - [`StateError`] reports an illegal move of the batch state machine.

use std::fmt;

use serde::Serialize;

use crate::models::ItemId;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like rejected input
    Debug,
    /// Warning level - for failures caused by the environment (network, storage)
    Warn,
    /// Error level - for server contract violations
    Error,
}

/// The protocol phase an item was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RequestCredentials,
    Transfer,
    Confirm,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::RequestCredentials => "request_credentials",
            Phase::Transfer => "transfer",
            Phase::Confirm => "confirm",
        };
        f.write_str(label)
    }
}

/// Metadata describing how a failure should be presented and logged.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSFER_TIMEOUT")
    fn error_code(&self) -> &'static str;

    /// Suggested remediation for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

fn http_status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

fn seconds_label(secs: &u64) -> String {
    if *secs == 1 {
        "1 second".to_string()
    } else {
        format!("{} seconds", secs)
    }
}

/// A classified failure of one item's upload. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadError {
    #[error("Server returned incomplete transfer instructions for {filename} (missing {missing})")]
    IncompleteServerResponse { filename: String, missing: String },

    #[error(
        "Requesting upload credentials for {filename} failed{}: {detail}",
        http_status_label(.status)
    )]
    CredentialRequestFailed {
        filename: String,
        status: Option<u16>,
        detail: String,
    },

    #[error(
        "Upload of {filename} timed out after {}; check your connection and the file size",
        seconds_label(.limit_secs)
    )]
    TransferTimeout { filename: String, limit_secs: u64 },

    #[error(
        "Could not reach storage while uploading {filename}: {detail}; check that the storage backend is reachable"
    )]
    TransferNetworkUnavailable { filename: String, detail: String },

    #[error("Storage rejected {filename} (HTTP {status}): {detail}")]
    StorageRejected {
        filename: String,
        status: u16,
        detail: String,
    },

    #[error("Confirming {filename} failed{}: {detail}", http_status_label(.status))]
    ConfirmationFailed {
        filename: String,
        status: Option<u16>,
        detail: String,
    },
}

/// Static metadata for each variant: (phase, error_code, suggested_action, log_level).
fn upload_error_static_metadata(
    err: &UploadError,
) -> (Phase, &'static str, Option<&'static str>, LogLevel) {
    match err {
        UploadError::IncompleteServerResponse { .. } => (
            Phase::RequestCredentials,
            "INCOMPLETE_SERVER_RESPONSE",
            Some("Contact support; the upload service returned an invalid response"),
            LogLevel::Error,
        ),
        UploadError::CredentialRequestFailed { .. } => (
            Phase::RequestCredentials,
            "CREDENTIAL_REQUEST_FAILED",
            Some("Check your permissions and the file metadata, then resubmit"),
            LogLevel::Warn,
        ),
        UploadError::TransferTimeout { .. } => (
            Phase::Transfer,
            "TRANSFER_TIMEOUT",
            Some("Check your connection and the file size, then resubmit"),
            LogLevel::Warn,
        ),
        UploadError::TransferNetworkUnavailable { .. } => (
            Phase::Transfer,
            "TRANSFER_NETWORK_UNAVAILABLE",
            Some("Check that the storage backend is reachable from this machine"),
            LogLevel::Warn,
        ),
        UploadError::StorageRejected { .. } => (
            Phase::Transfer,
            "STORAGE_REJECTED",
            Some("The storage backend refused the file; check its type and size"),
            LogLevel::Warn,
        ),
        UploadError::ConfirmationFailed { .. } => (
            Phase::Confirm,
            "CONFIRMATION_FAILED",
            Some("The file was stored but not registered; contact support before resubmitting"),
            LogLevel::Error,
        ),
    }
}

impl UploadError {
    /// Protocol phase that produced this failure.
    pub fn phase(&self) -> Phase {
        upload_error_static_metadata(self).0
    }

    /// Name of the file the failure belongs to.
    pub fn filename(&self) -> &str {
        match self {
            UploadError::IncompleteServerResponse { filename, .. }
            | UploadError::CredentialRequestFailed { filename, .. }
            | UploadError::TransferTimeout { filename, .. }
            | UploadError::TransferNetworkUnavailable { filename, .. }
            | UploadError::StorageRejected { filename, .. }
            | UploadError::ConfirmationFailed { filename, .. } => filename,
        }
    }
}

impl ErrorMetadata for UploadError {
    fn error_code(&self) -> &'static str {
        upload_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        upload_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).3
    }
}

/// Errors that reject a batch submission outright, without touching its state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch is empty: add at least one file before uploading")]
    EmptyBatch,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Batch cannot be submitted while {0}")]
    NotIdle(&'static str),

    #[error("Item {0} appears more than once in the batch")]
    DuplicateItem(ItemId),

    #[error("Batch state error: {0}")]
    State(#[from] StateError),
}

/// Errors produced when editing the items of a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item {id} can no longer be edited (state: {state})")]
    NotPending { id: ItemId, state: &'static str },

    #[error("Items can only be added while the batch is idle (status: {0})")]
    BatchNotIdle(&'static str),

    #[error("Item {0} is already in the batch")]
    DuplicateItem(ItemId),
}

/// Illegal moves of the batch state machine. Seeing one of these is a bug in
/// the driver, not a user-facing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Illegal transition for item {id}: {from} -> {to}")]
    IllegalTransition {
        id: ItemId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Item {requested} cannot start while item {active} is in flight")]
    AnotherItemActive { active: ItemId, requested: ItemId },

    #[error("Batch is not running (status: {0})")]
    BatchNotRunning(&'static str),
}
