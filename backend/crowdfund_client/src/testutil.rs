//! In-memory ledger and asset store used by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::amount::Amount;
use crate::assets::AssetStore;
use crate::chain::{
    ChainClient, ConfirmationPolicy, ContractHandle, CrowdfundContract, Identity, TxHash,
    TxStatus, CREATE_CAMPAIGN, DONATE_TO_CAMPAIGN, GET_CAMPAIGNS,
};
use crate::errors::{ClientError, Result};

pub const SIGNER: &str = "TSigner111";
pub const CONTRACT: &str = "TContract111";

pub fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
    }
}

/// A raw `getCampaigns()` element with amounts given in subunits.
pub fn raw_campaign(title: &str, target: u128, collected: u128, deadline: i64) -> Value {
    json!({
        "owner": "TOwner111",
        "title": title,
        "description": format!("{title} description"),
        "target": target.to_string(),
        "amountCollected": collected.to_string(),
        "deadline": deadline.to_string(),
        "image": "QmImage",
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMode {
    Connected,
    Unavailable,
    Rejecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirm,
    Revert(String),
    Pending,
}

#[derive(Debug, Clone)]
pub struct SentTx {
    pub method: String,
    pub args: Vec<Value>,
    pub value: Amount,
    applied: bool,
}

struct LedgerState {
    campaigns: Vec<Value>,
    methods: Vec<String>,
    wallet: WalletMode,
    outcome: TxOutcome,
    sent: Vec<SentTx>,
    network_calls: usize,
    reads: usize,
    fail_reads: bool,
}

/// Fake wallet + contract.  Donations and creations only change the ledger
/// once their transaction is reported as confirmed.
pub struct FakeChain {
    state: Mutex<LedgerState>,
    hold_sends: watch::Sender<bool>,
}

impl FakeChain {
    pub fn new(campaigns: Vec<Value>) -> Arc<Self> {
        let (hold_sends, _) = watch::channel(false);
        Arc::new(FakeChain {
            state: Mutex::new(LedgerState {
                campaigns,
                methods: vec![
                    GET_CAMPAIGNS.to_string(),
                    DONATE_TO_CAMPAIGN.to_string(),
                    CREATE_CAMPAIGN.to_string(),
                ],
                wallet: WalletMode::Connected,
                outcome: TxOutcome::Confirm,
                sent: Vec::new(),
                network_calls: 0,
                reads: 0,
                fail_reads: false,
            }),
            hold_sends,
        })
    }

    pub fn contract(self: &Arc<Self>) -> CrowdfundContract {
        let handle = ContractHandle {
            address: CONTRACT.to_string(),
            methods: self.state.lock().unwrap().methods.clone(),
        };
        CrowdfundContract::new(self.clone(), handle)
    }

    pub fn set_methods(&self, methods: &[&str]) {
        self.state.lock().unwrap().methods = methods.iter().map(|m| m.to_string()).collect();
    }

    pub fn set_wallet(&self, mode: WalletMode) {
        self.state.lock().unwrap().wallet = mode;
    }

    pub fn set_outcome(&self, outcome: TxOutcome) {
        self.state.lock().unwrap().outcome = outcome;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Block every `send_transaction` until [`FakeChain::release_sends`].
    pub fn hold_sends(&self) {
        self.hold_sends.send_replace(true);
    }

    pub fn release_sends(&self) {
        self.hold_sends.send_replace(false);
    }

    /// Credit a campaign directly, as another donor would.
    pub fn credit(&self, index: usize, subunits: u128) {
        let mut state = self.state.lock().unwrap();
        add_collected(&mut state.campaigns[index], subunits);
    }

    pub fn collected(&self, index: usize) -> u128 {
        let state = self.state.lock().unwrap();
        subunits_of(&state.campaigns[index]["amountCollected"])
    }

    pub fn campaign_count(&self) -> usize {
        self.state.lock().unwrap().campaigns.len()
    }

    pub fn network_calls(&self) -> usize {
        self.state.lock().unwrap().network_calls
    }

    /// Number of `getCampaigns` reads, failed ones included.
    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self, method: &str) -> usize {
        self.sent().iter().filter(|tx| tx.method == method).count()
    }

    fn check_wallet(state: &LedgerState) -> Result<()> {
        match state.wallet {
            WalletMode::Connected => Ok(()),
            WalletMode::Unavailable => {
                Err(ClientError::WalletUnavailable("no wallet connected".to_string()))
            }
            WalletMode::Rejecting => Err(ClientError::UserRejected(
                "user denied transaction signature".to_string(),
            )),
        }
    }
}

fn subunits_of(value: &Value) -> u128 {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => u128::from(other.as_u64().unwrap()),
    }
}

fn add_collected(record: &mut Value, subunits: u128) {
    let total = subunits_of(&record["amountCollected"]) + subunits;
    record["amountCollected"] = json!(total.to_string());
}

fn apply(campaigns: &mut Vec<Value>, tx: &SentTx) {
    match tx.method.as_str() {
        DONATE_TO_CAMPAIGN => {
            let index = tx.args[0].as_u64().unwrap() as usize;
            add_collected(&mut campaigns[index], tx.value.subunits());
        }
        CREATE_CAMPAIGN => campaigns.push(json!({
            "owner": tx.args[0],
            "title": tx.args[1],
            "description": tx.args[2],
            "target": tx.args[3],
            "amountCollected": "0",
            "deadline": tx.args[4],
            "image": tx.args[5],
        })),
        _ => {}
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn connect(&self) -> Result<Identity> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        Self::check_wallet(&state)?;
        Ok(Identity(SIGNER.to_string()))
    }

    async fn address(&self) -> Result<Identity> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        if state.wallet == WalletMode::Unavailable {
            return Err(ClientError::WalletUnavailable("no wallet connected".to_string()));
        }
        Ok(Identity(SIGNER.to_string()))
    }

    async fn get_contract(&self, address: &str) -> Result<ContractHandle> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        Ok(ContractHandle {
            address: address.to_string(),
            methods: state.methods.clone(),
        })
    }

    async fn call(
        &self,
        _contract: &ContractHandle,
        method: &str,
        _args: Vec<Value>,
    ) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        if method == GET_CAMPAIGNS {
            state.reads += 1;
        }
        if state.fail_reads {
            return Err(ClientError::Network("node unreachable".to_string()));
        }
        match method {
            GET_CAMPAIGNS => Ok(Value::Array(state.campaigns.clone())),
            other => Err(ClientError::Network(format!("unknown method {other}"))),
        }
    }

    async fn send_transaction(
        &self,
        _contract: &ContractHandle,
        method: &str,
        args: Vec<Value>,
        call_value: Amount,
    ) -> Result<TxHash> {
        {
            let mut state = self.state.lock().unwrap();
            state.network_calls += 1;
            Self::check_wallet(&state)?;
        }

        let mut held = self.hold_sends.subscribe();
        let _ = held.wait_for(|hold| !*hold).await;

        let mut state = self.state.lock().unwrap();
        let hash = TxHash(format!("tx-{}", state.sent.len()));
        state.sent.push(SentTx {
            method: method.to_string(),
            args,
            value: call_value,
            applied: false,
        });
        Ok(hash)
    }

    async fn transaction_status(&self, tx: &TxHash) -> Result<TxStatus> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        let index: usize = tx
            .0
            .trim_start_matches("tx-")
            .parse()
            .map_err(|_| ClientError::Network(format!("unknown transaction {tx}")))?;

        match state.outcome.clone() {
            TxOutcome::Pending => Ok(TxStatus::Pending),
            TxOutcome::Revert(reason) => Ok(TxStatus::Reverted(reason)),
            TxOutcome::Confirm => {
                let LedgerState { campaigns, sent, .. } = &mut *state;
                if let Some(sent_tx) = sent.get_mut(index) {
                    if !sent_tx.applied {
                        sent_tx.applied = true;
                        apply(campaigns, sent_tx);
                    }
                }
                Ok(TxStatus::Confirmed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMode {
    Succeed(String),
    Fail(String),
}

pub struct FakeAssets {
    mode: Mutex<UploadMode>,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl FakeAssets {
    pub fn new(mode: UploadMode) -> Arc<Self> {
        Arc::new(FakeAssets {
            mode: Mutex::new(mode),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: UploadMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes.len()));
        match self.mode.lock().unwrap().clone() {
            UploadMode::Succeed(hash) => Ok(hash),
            UploadMode::Fail(reason) => Err(ClientError::AssetUpload(reason)),
        }
    }
}

/// Wait until `cond` holds, yielding to other tasks in between.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
