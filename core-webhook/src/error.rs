use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook ingestion is disabled: no shared secret configured")]
    IngestionDisabled,

    #[error("Webhook signature verification failed")]
    SignatureRejected,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
