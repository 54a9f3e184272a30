//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Rejected by signer: {0}")]
    UserRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch campaigns: {0}")]
    Fetch(String),

    #[error("Malformed campaign record at position {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Asset upload failed: {0}")]
    AssetUpload(String),

    #[error("Transaction reverted: {0}")]
    ContractRevert(String),

    #[error("Transaction {0} was not confirmed in time")]
    ConfirmationTimeout(String),

    #[error("Wait for transaction {0} was cancelled")]
    Cancelled(String),

    #[error("A donation to campaign {0} is already in progress")]
    DonationInFlight(u64),

    #[error("A campaign creation is already in progress")]
    CreationInFlight,

    #[error("Campaign {0} not found")]
    CampaignNotFound(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
