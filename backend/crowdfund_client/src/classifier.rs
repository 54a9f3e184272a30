//! Open/closed classification of campaigns.
//!
//! Pure functions only: no I/O, no clock access. Callers pass `now`.

use crate::amount::{Amount, UnixTimestamp, SUBUNITS_PER_UNIT};
use crate::types::{Campaign, CampaignStatus};

/// 0.0001 units, the margin below target at which a campaign counts as
/// fully funded.
pub const TOLERANCE: Amount = Amount::from_subunits(SUBUNITS_PER_UNIT / 10_000);

/// A campaign is open while it is more than [`TOLERANCE`] short of its
/// target and its deadline is still in the future.
pub fn classify(campaign: &Campaign, now: UnixTimestamp) -> CampaignStatus {
    let underfunded = campaign.amount_collected.saturating_add(TOLERANCE) < campaign.target;
    if underfunded && campaign.deadline > now {
        CampaignStatus::Open
    } else {
        CampaignStatus::Closed
    }
}

pub fn filter_open(campaigns: &[Campaign], now: UnixTimestamp) -> Vec<Campaign> {
    filter_by_status(campaigns, now, CampaignStatus::Open)
}

pub fn filter_closed(campaigns: &[Campaign], now: UnixTimestamp) -> Vec<Campaign> {
    filter_by_status(campaigns, now, CampaignStatus::Closed)
}

fn filter_by_status(
    campaigns: &[Campaign],
    now: UnixTimestamp,
    status: CampaignStatus,
) -> Vec<Campaign> {
    campaigns
        .iter()
        .filter(|c| classify(c, now) == status)
        .cloned()
        .collect()
}

/// Funding progress in percent. A zero target reports `0`.
pub fn progress_percent(collected: Amount, target: Amount) -> f64 {
    if target.is_zero() {
        return 0.0;
    }
    collected.subunits() as f64 * 100.0 / target.subunits() as f64
}
