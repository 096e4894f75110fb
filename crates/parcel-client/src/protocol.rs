//! The three protocol calls as one seam the orchestrator depends on.
//!
//! `HttpUploadProtocol` is the production implementation. Tests substitute an
//! in-memory implementation to script per-phase outcomes.

use anyhow::Result;
use async_trait::async_trait;
use parcel_core::{
    ClientConfig, FinalizedRecord, Payload, Session, TransferInstructions, UploadError, UploadItem,
};

use crate::{
    ApiClient, ConfirmationClient, CredentialRequester, DirectTransferClient, StorageClient,
};

/// One network call per phase. Implementations must not retry.
#[async_trait]
pub trait UploadProtocol: Send + Sync {
    /// Step 1: credentials for `item`.
    async fn request_credentials(
        &self,
        item: &UploadItem,
    ) -> Result<TransferInstructions, UploadError>;

    /// Step 2: write `payload` to the destination in `instructions`.
    async fn transfer(
        &self,
        instructions: &TransferInstructions,
        payload: &Payload,
    ) -> Result<(), UploadError>;

    /// Step 3: finalize the record named in `instructions`.
    async fn confirm(
        &self,
        item: &UploadItem,
        instructions: &TransferInstructions,
    ) -> Result<FinalizedRecord, UploadError>;
}

/// HTTP implementation composed of the three protocol clients.
#[derive(Clone, Debug)]
pub struct HttpUploadProtocol {
    credentials: CredentialRequester,
    transfer: DirectTransferClient,
    confirmation: ConfirmationClient,
}

impl HttpUploadProtocol {
    pub fn new(
        credentials: CredentialRequester,
        transfer: DirectTransferClient,
        confirmation: ConfirmationClient,
    ) -> Self {
        Self {
            credentials,
            transfer,
            confirmation,
        }
    }

    /// Wires the authorized API client into steps 1 and 3, and a separately
    /// built bare storage client into step 2.
    pub fn from_config(config: &ClientConfig, session: &Session) -> Result<Self> {
        let api = ApiClient::from_session(session, config.api_timeout)?;
        let storage = StorageClient::new()?;

        Ok(Self::new(
            CredentialRequester::new(api.clone(), config.credentials_url()),
            DirectTransferClient::new(storage, config.transfer_timeout),
            ConfirmationClient::new(api, config.confirm_url()),
        ))
    }
}

#[async_trait]
impl UploadProtocol for HttpUploadProtocol {
    async fn request_credentials(
        &self,
        item: &UploadItem,
    ) -> Result<TransferInstructions, UploadError> {
        self.credentials
            .request(&item.credential_request(), item.filename())
            .await
    }

    async fn transfer(
        &self,
        instructions: &TransferInstructions,
        payload: &Payload,
    ) -> Result<(), UploadError> {
        self.transfer.transfer(instructions, payload).await
    }

    async fn confirm(
        &self,
        item: &UploadItem,
        instructions: &TransferInstructions,
    ) -> Result<FinalizedRecord, UploadError> {
        self.confirmation
            .confirm(&item.confirm_request(&instructions.record_id), item.filename())
            .await
    }
}
