pub mod batch;
pub mod item;
pub mod protocol;

pub use batch::{BatchSession, BatchStatus};
pub use item::{ItemId, ItemState, Payload, UploadItem, Visibility};
pub use protocol::{ConfirmRequest, CredentialRequest, FinalizedRecord, TransferInstructions};
