//! Donation lifecycle, one state machine per campaign.
//!
//! ```text
//! Idle ──► Validating ──► Submitting ──► Confirming ──► Settled
//!  ▲           │               │               │
//!  └───────────┘               └──► Failed ◄───┘
//! ```
//!
//! `Settled` and `Failed` accept a new `submit`, which starts over from
//! `Idle`.  While a campaign is `Validating`, `Submitting` or `Confirming`
//! any further `submit` for it is refused before touching the ledger.
//! Campaigns never block one another.
//!
//! While `Validating`, the campaign is read from the ledger and must exist
//! and be open; a refusal there returns it to `Idle`.
//!
//! Once a donation has been sent the ledger is re-read whatever the
//! outcome, and the re-read campaign stays available until the next submit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::amount::{Amount, UnixTimestamp};
use crate::chain::{await_confirmation, ConfirmationPolicy, CrowdfundContract, TxHash};
use crate::classifier::classify;
use crate::errors::{ClientError, Result};
use crate::repository::CampaignRepository;
use crate::types::{Campaign, CampaignSnapshot, CampaignStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "failure", rename_all = "snake_case")]
pub enum DonationPhase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Confirming,
    Settled,
    Failed(DonationFailure),
}

impl DonationPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Validating | Self::Submitting | Self::Confirming)
    }
}

/// Why a donation ended in [`DonationPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DonationFailure {
    UserRejected(String),
    WalletUnavailable(String),
    Network(String),
    ContractRevert(String),
    ConfirmationTimeout,
    Cancelled,
    /// The submitting task went away before an outcome was known.
    Abandoned,
}

impl From<&ClientError> for DonationFailure {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::UserRejected(msg) => Self::UserRejected(msg.clone()),
            ClientError::WalletUnavailable(msg) => Self::WalletUnavailable(msg.clone()),
            ClientError::ContractRevert(reason) => Self::ContractRevert(reason.clone()),
            ClientError::ConfirmationTimeout(_) => Self::ConfirmationTimeout,
            ClientError::Cancelled(_) => Self::Cancelled,
            other => Self::Network(other.to_string()),
        }
    }
}

/// A settled donation together with the ledger view read right after it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReceipt {
    pub campaign_id: u64,
    pub amount: Amount,
    pub tx: TxHash,
    /// The donated-to campaign in `snapshot`, matched by fingerprint.
    pub campaign: Option<Campaign>,
    /// `None` when the post-settlement refresh failed.
    pub snapshot: Option<CampaignSnapshot>,
}

#[derive(Default)]
struct Entry {
    phase: DonationPhase,
    cancel: Option<CancellationToken>,
    refreshed: Option<Campaign>,
}

type Entries = Arc<Mutex<HashMap<u64, Entry>>>;

fn lock(entries: &Mutex<HashMap<u64, Entry>>) -> MutexGuard<'_, HashMap<u64, Entry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct DonationController {
    contract: CrowdfundContract,
    repository: Arc<CampaignRepository>,
    policy: ConfirmationPolicy,
    shutdown: CancellationToken,
    entries: Entries,
}

impl DonationController {
    pub fn new(
        contract: CrowdfundContract,
        repository: Arc<CampaignRepository>,
        policy: ConfirmationPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        DonationController {
            contract,
            repository,
            policy,
            shutdown,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Donate `amount` (a decimal string in ledger units) to `campaign_id`.
    pub async fn submit(&self, campaign_id: u64, amount: &str) -> Result<DonationReceipt> {
        let claim = self.claim(campaign_id, amount)?;
        self.submit_claimed(claim).await
    }

    /// Take the campaign's guard and validate `amount` without touching the
    /// ledger.  The campaign stays `Validating` until the claim is submitted
    /// or dropped.
    pub fn claim(&self, campaign_id: u64, amount: &str) -> Result<DonationClaim> {
        let (value, cancel) = self.begin(campaign_id, amount)?;
        Ok(DonationClaim {
            value,
            cancel,
            flight: InFlight {
                entries: self.entries.clone(),
                campaign_id,
                submitted: false,
                finished: false,
            },
        })
    }

    /// Send a claimed donation.  The campaign is read from the ledger first,
    /// still under the guard, and must exist and be open.
    pub async fn submit_claimed(&self, claim: DonationClaim) -> Result<DonationReceipt> {
        let DonationClaim {
            value,
            cancel,
            mut flight,
        } = claim;
        let campaign_id = flight.campaign_id;

        // Refusals here return the campaign to Idle when `flight` drops.
        let campaign = self.admit(campaign_id).await?;

        if cancel.is_cancelled() {
            flight.finish(DonationPhase::Failed(DonationFailure::Cancelled), None);
            return Err(ClientError::Cancelled(format!(
                "donation to campaign {campaign_id}"
            )));
        }

        flight.submitted = true;
        self.set_phase(campaign_id, DonationPhase::Submitting);

        info!("Donating {value} to campaign {campaign_id}");
        let tx = match self.contract.donate_to_campaign(campaign_id, value).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Donation to campaign {campaign_id} not sent: {e}");
                flight.finish(DonationPhase::Failed(DonationFailure::from(&e)), None);
                return Err(e);
            }
        };

        self.set_phase(campaign_id, DonationPhase::Confirming);
        info!("Donation to campaign {campaign_id} sent as {tx}");

        let outcome = await_confirmation(self.contract.chain(), &tx, &self.policy, &cancel).await;

        // A transaction that timed out or was given up on may still land.
        let snapshot = self.refresh(&tx).await;
        let refreshed = snapshot
            .as_ref()
            .and_then(|s| s.find_matching(&campaign))
            .cloned();

        if let Err(e) = outcome {
            warn!("Donation {tx} to campaign {campaign_id} failed: {e}");
            flight.finish(
                DonationPhase::Failed(DonationFailure::from(&e)),
                refreshed,
            );
            return Err(e);
        }

        info!("Donation {tx} to campaign {campaign_id} confirmed");
        flight.finish(DonationPhase::Settled, refreshed.clone());

        Ok(DonationReceipt {
            campaign_id,
            amount: value,
            tx,
            campaign: refreshed,
            snapshot,
        })
    }

    pub fn phase(&self, campaign_id: u64) -> DonationPhase {
        self.entries()
            .get(&campaign_id)
            .map(|e| e.phase.clone())
            .unwrap_or_default()
    }

    /// The campaign as re-read after its last sent donation, whether that
    /// donation settled or failed.
    pub fn refreshed_campaign(&self, campaign_id: u64) -> Option<Campaign> {
        self.entries()
            .get(&campaign_id)
            .and_then(|e| e.refreshed.clone())
    }

    /// Return a settled or failed campaign to `Idle`.
    pub fn reset(&self, campaign_id: u64) -> Result<()> {
        let mut entries = self.entries();
        if entries
            .get(&campaign_id)
            .is_some_and(|e| e.phase.is_in_flight())
        {
            return Err(ClientError::DonationInFlight(campaign_id));
        }
        entries.remove(&campaign_id);
        Ok(())
    }

    /// Stop waiting for the in-flight donation's confirmation.  The
    /// transaction itself cannot be withdrawn.  Returns `false` when nothing
    /// was in flight.
    pub fn cancel(&self, campaign_id: u64) -> bool {
        match self.entries().get(&campaign_id) {
            Some(Entry {
                cancel: Some(token),
                phase,
                ..
            }) if phase.is_in_flight() => {
                info!("Cancelling confirmation wait for campaign {campaign_id}");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        lock(&self.entries)
    }

    /// Guard check and validation, done under one lock so two callers can
    /// never both pass for the same campaign.
    fn begin(&self, campaign_id: u64, amount: &str) -> Result<(Amount, CancellationToken)> {
        let mut entries = self.entries();
        let entry = entries.entry(campaign_id).or_default();

        if entry.phase.is_in_flight() {
            warn!("Rejected overlapping donation to campaign {campaign_id}");
            return Err(ClientError::DonationInFlight(campaign_id));
        }

        match Amount::parse_positive(amount) {
            Ok(value) => {
                let cancel = self.shutdown.child_token();
                entry.phase = DonationPhase::Validating;
                entry.cancel = Some(cancel.clone());
                entry.refreshed = None;
                Ok((value, cancel))
            }
            Err(e) => {
                entry.phase = DonationPhase::Idle;
                Err(e)
            }
        }
    }

    fn set_phase(&self, campaign_id: u64, phase: DonationPhase) {
        if let Some(entry) = self.entries().get_mut(&campaign_id) {
            entry.phase = phase;
        }
    }

    async fn admit(&self, campaign_id: u64) -> Result<Campaign> {
        let snapshot = self.repository.fetch_all().await?;
        let campaign = snapshot
            .get(campaign_id)
            .cloned()
            .ok_or(ClientError::CampaignNotFound(campaign_id))?;
        if classify(&campaign, UnixTimestamp::now()) == CampaignStatus::Closed {
            return Err(ClientError::Validation(format!(
                "campaign {campaign_id} is closed"
            )));
        }
        Ok(campaign)
    }

    async fn refresh(&self, tx: &TxHash) -> Option<CampaignSnapshot> {
        match self.repository.fetch_all().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Refresh after donation {tx} failed: {e}");
                None
            }
        }
    }
}

/// A validated donation holding its campaign's guard.  Dropping a claim
/// that was never submitted returns the campaign to `Idle`.
pub struct DonationClaim {
    value: Amount,
    cancel: CancellationToken,
    flight: InFlight,
}

/// Settles the campaign's entry when the donation ends.  If it is dropped
/// first, an unsent donation goes back to `Idle` and a sent one is marked
/// `Abandoned`.
struct InFlight {
    entries: Entries,
    campaign_id: u64,
    submitted: bool,
    finished: bool,
}

impl InFlight {
    fn finish(&mut self, phase: DonationPhase, refreshed: Option<Campaign>) {
        self.finished = true;
        if let Some(entry) = lock(&self.entries).get_mut(&self.campaign_id) {
            entry.phase = phase;
            entry.cancel = None;
            entry.refreshed = refreshed;
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.submitted {
            warn!("Donation to campaign {} abandoned mid-flight", self.campaign_id);
            self.finish(DonationPhase::Failed(DonationFailure::Abandoned), None);
        } else {
            self.finish(DonationPhase::Idle, None);
        }
    }
}
