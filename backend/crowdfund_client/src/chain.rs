//! Ledger access seam.
//!
//! [`ChainClient`] is the capability the rest of the crate is handed: a
//! signing identity plus raw contract call/submit primitives.  The crowdfunding
//! contract's entry points are layered on top by [`CrowdfundContract`], and
//! [`await_confirmation`] turns a submitted transaction into a final outcome
//! within a bounded, cancellable wait.
//!
//! Nothing here retries.  Every submission is user-gated and must not be
//! repeated without new user intent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::amount::{Amount, UnixTimestamp};
use crate::config::Config;
use crate::errors::{ClientError, Result};

/// Address of the connected signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deployed contract as described by the wallet backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub address: String,
    /// Method names taken from the contract ABI.
    pub methods: Vec<String>,
}

impl ContractHandle {
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Reverted(String),
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Ask the wallet for access; may prompt the user.
    async fn connect(&self) -> Result<Identity>;

    /// The already-connected account.
    async fn address(&self) -> Result<Identity>;

    async fn get_contract(&self, address: &str) -> Result<ContractHandle>;

    /// Read-only contract call.
    async fn call(&self, contract: &ContractHandle, method: &str, args: Vec<Value>)
        -> Result<Value>;

    /// Sign and broadcast a contract call carrying `call_value`.
    async fn send_transaction(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<Value>,
        call_value: Amount,
    ) -> Result<TxHash>;

    async fn transaction_status(&self, tx: &TxHash) -> Result<TxStatus>;
}

// ─────────────────────────────────────────────────────────
// Crowdfunding contract binding
// ─────────────────────────────────────────────────────────

pub const GET_CAMPAIGNS: &str = "getCampaigns";
pub const DONATE_TO_CAMPAIGN: &str = "donateToCampaign";
pub const CREATE_CAMPAIGN: &str = "createCampaign";

const REQUIRED_METHODS: [&str; 3] = [GET_CAMPAIGNS, DONATE_TO_CAMPAIGN, CREATE_CAMPAIGN];

/// Typed entry points of the crowdfunding contract.
#[derive(Clone)]
pub struct CrowdfundContract {
    chain: Arc<dyn ChainClient>,
    handle: ContractHandle,
}

impl CrowdfundContract {
    /// Load the contract at `address` and check it exposes the crowdfunding ABI.
    pub async fn bind(chain: Arc<dyn ChainClient>, address: &str) -> Result<Self> {
        let handle = chain.get_contract(address).await?;
        if let Some(missing) = REQUIRED_METHODS.iter().find(|m| !handle.has_method(m)) {
            return Err(ClientError::Network(format!(
                "contract {address} does not expose {missing}"
            )));
        }
        Ok(Self::new(chain, handle))
    }

    pub fn new(chain: Arc<dyn ChainClient>, handle: ContractHandle) -> Self {
        CrowdfundContract { chain, handle }
    }

    pub fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub fn address(&self) -> &str {
        &self.handle.address
    }

    pub async fn get_campaigns(&self) -> Result<Value> {
        self.chain.call(&self.handle, GET_CAMPAIGNS, Vec::new()).await
    }

    pub async fn donate_to_campaign(&self, campaign_id: u64, value: Amount) -> Result<TxHash> {
        self.chain
            .send_transaction(&self.handle, DONATE_TO_CAMPAIGN, vec![json!(campaign_id)], value)
            .await
    }

    pub async fn create_campaign(
        &self,
        owner: &Identity,
        title: &str,
        description: &str,
        target: Amount,
        deadline: UnixTimestamp,
        asset_ref: &str,
    ) -> Result<TxHash> {
        // Subunit counts can exceed the safe JSON number range.
        let args = vec![
            json!(owner.0),
            json!(title),
            json!(description),
            json!(target.subunits().to_string()),
            json!(deadline.secs()),
            json!(asset_ref),
        ];
        self.chain
            .send_transaction(&self.handle, CREATE_CAMPAIGN, args, Amount::ZERO)
            .await
    }
}

// ─────────────────────────────────────────────────────────
// Confirmation
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    pub fn from_config(config: &Config) -> Self {
        ConfirmationPolicy {
            timeout: config.confirmation_timeout(),
            poll_interval: config.confirmation_poll_interval(),
        }
    }
}

/// Poll `tx` until it is confirmed or reverted.
///
/// Gives up with [`ClientError::ConfirmationTimeout`] after `policy.timeout`
/// and with [`ClientError::Cancelled`] as soon as `cancel` fires.  Either way
/// the transaction may still land; callers refresh from the ledger.
pub async fn await_confirmation(
    chain: &dyn ChainClient,
    tx: &TxHash,
    policy: &ConfirmationPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let poll = async {
        loop {
            match chain.transaction_status(tx).await? {
                TxStatus::Confirmed => return Ok(()),
                TxStatus::Reverted(reason) => return Err(ClientError::ContractRevert(reason)),
                TxStatus::Pending => {
                    debug!("Transaction {tx} still pending");
                    tokio::time::sleep(policy.poll_interval).await;
                }
            }
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled(tx.to_string())),
        outcome = tokio::time::timeout(policy.timeout, poll) => outcome
            .unwrap_or_else(|_| Err(ClientError::ConfirmationTimeout(tx.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fast_policy, FakeChain, TxOutcome};

    #[tokio::test]
    async fn bind_rejects_contract_without_crowdfund_abi() {
        let chain = FakeChain::new(Vec::new());
        chain.set_methods(&["getCampaigns", "donateToCampaign"]);

        let err = CrowdfundContract::bind(chain, "TContract")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Network(msg) if msg.contains("createCampaign")));
    }

    #[tokio::test]
    async fn bind_accepts_full_abi() {
        let chain = FakeChain::new(Vec::new());
        let contract = CrowdfundContract::bind(chain, "TContract").await.unwrap();
        assert_eq!(contract.address(), "TContract");
    }

    #[tokio::test]
    async fn confirmation_reports_revert_reason() {
        let chain = FakeChain::new(Vec::new());
        chain.set_outcome(TxOutcome::Revert("campaign ended".to_string()));
        let tx = TxHash("tx-0".to_string());

        let err = await_confirmation(chain.as_ref(), &tx, &fast_policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ContractRevert(reason) if reason == "campaign ended"));
    }

    #[tokio::test]
    async fn confirmation_wait_is_bounded() {
        let chain = FakeChain::new(Vec::new());
        chain.set_outcome(TxOutcome::Pending);
        let policy = ConfirmationPolicy {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        };

        let err = await_confirmation(
            chain.as_ref(),
            &TxHash("tx-9".to_string()),
            &policy,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::ConfirmationTimeout(tx) if tx == "tx-9"));
    }

    #[tokio::test]
    async fn confirmation_wait_is_cancellable() {
        let chain = FakeChain::new(Vec::new());
        chain.set_outcome(TxOutcome::Pending);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = await_confirmation(
            chain.as_ref(),
            &TxHash("tx-1".to_string()),
            &fast_policy(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled(_)));
    }
}
