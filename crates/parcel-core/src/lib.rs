//! Parcel Core Library
//!
//! This crate provides the domain model, failure taxonomy, wire types and
//! configuration shared by the Parcel upload client and its presentation
//! layers. It performs no I/O beyond reading the environment.

pub mod config;
pub mod content_type;
pub mod error;
pub mod models;
pub mod session;

// Re-export commonly used types
pub use config::{session_from_env, session_from_lookup, ClientConfig};
pub use content_type::{detect_content_type, DEFAULT_CONTENT_TYPE};
pub use error::{BatchError, ErrorMetadata, ItemError, LogLevel, Phase, StateError, UploadError};
pub use models::{
    BatchSession, BatchStatus, ConfirmRequest, CredentialRequest, FinalizedRecord, ItemId,
    ItemState, Payload, TransferInstructions, UploadItem, Visibility,
};
pub use session::{Role, Session};
