//! Campaign records as read from the crowdfunding contract.
//!
//! [`RawCampaign`] is the wire schema returned by `getCampaigns()`; it is
//! decoded and normalized into [`Campaign`] at the repository boundary so
//! the rest of the crate never sees untyped contract output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::{Amount, UnixTimestamp};
use crate::errors::{ClientError, Result};

/// Derived campaign status. Never stored; see [`crate::classifier::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Open,
    Closed,
}

/// Integer field as emitted by the contract: either a JSON number or a
/// decimal string (large values do not fit a JSON number safely).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LedgerInt {
    Number(serde_json::Number),
    Text(String),
}

impl LedgerInt {
    fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Number(n) => n.as_u64().map(u128::from),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One element of the `getCampaigns()` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCampaign {
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target: LedgerInt,
    pub amount_collected: LedgerInt,
    pub deadline: LedgerInt,
    #[serde(default)]
    pub image: Option<String>,
}

/// A normalized campaign snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Zero-based position in the fetched list. Only meaningful within the
    /// snapshot it came from.
    pub id: u64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub asset_ref: Option<String>,
    pub target: Amount,
    pub amount_collected: Amount,
    pub deadline: UnixTimestamp,
}

impl Campaign {
    /// Decode the record found at `index` of a `getCampaigns()` result.
    pub fn decode(index: usize, value: &Value) -> Result<Self> {
        let raw = RawCampaign::deserialize(value).map_err(|e| ClientError::MalformedRecord {
            index,
            reason: e.to_string(),
        })?;
        Self::from_raw(index, raw)
    }

    pub fn from_raw(index: usize, raw: RawCampaign) -> Result<Self> {
        let malformed = |reason: &str| ClientError::MalformedRecord {
            index,
            reason: reason.to_string(),
        };

        let target = raw
            .target
            .as_u128()
            .ok_or_else(|| malformed("target is not a non-negative integer"))?;
        let amount_collected = raw
            .amount_collected
            .as_u128()
            .ok_or_else(|| malformed("amountCollected is not a non-negative integer"))?;
        let deadline = raw
            .deadline
            .as_i64()
            .ok_or_else(|| malformed("deadline is not an integer"))?;

        Ok(Campaign {
            id: index as u64,
            owner: raw.owner,
            title: raw.title,
            description: raw.description,
            asset_ref: raw.image.filter(|s| !s.trim().is_empty()),
            target: Amount::from_subunits(target),
            amount_collected: Amount::from_subunits(amount_collected),
            deadline: UnixTimestamp::from_secs(deadline),
        })
    }

    /// Whether `other` (possibly from a different fetch) describes the same
    /// on-chain campaign.  Owner, title and deadline are fixed at creation.
    pub fn same_campaign(&self, other: &Campaign) -> bool {
        self.owner == other.owner && self.title == other.title && self.deadline == other.deadline
    }
}

/// The full result of one repository fetch.  Replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSnapshot {
    pub campaigns: Vec<Campaign>,
    pub fetched_at: UnixTimestamp,
}

impl CampaignSnapshot {
    pub fn get(&self, id: u64) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| c.id == id)
    }

    /// Locate `campaign` in this snapshot, preferring its old position and
    /// falling back to a fingerprint search when the list has shifted.
    pub fn find_matching(&self, campaign: &Campaign) -> Option<&Campaign> {
        self.get(campaign.id)
            .filter(|c| c.same_campaign(campaign))
            .or_else(|| self.campaigns.iter().find(|c| c.same_campaign(campaign)))
    }
}
