//! Campaign repository: the read side of the crowdfunding contract.

use serde_json::Value;
use tracing::{debug, warn};

use crate::amount::UnixTimestamp;
use crate::chain::CrowdfundContract;
use crate::errors::{ClientError, Result};
use crate::types::{Campaign, CampaignSnapshot};

pub struct CampaignRepository {
    contract: CrowdfundContract,
}

impl CampaignRepository {
    pub fn new(contract: CrowdfundContract) -> Self {
        CampaignRepository { contract }
    }

    /// Fetch every campaign from the ledger as a fresh snapshot.
    ///
    /// Ids are positions in the ledger's list.  Records that fail to decode
    /// are logged and skipped without shifting the ids of the others.
    pub async fn fetch_all(&self) -> Result<CampaignSnapshot> {
        let raw = self
            .contract
            .get_campaigns()
            .await
            .map_err(|e| ClientError::Fetch(e.to_string()))?;

        let campaigns = normalize(&raw)?;
        debug!(
            "Fetched {} campaigns from {}",
            campaigns.len(),
            self.contract.address()
        );

        Ok(CampaignSnapshot {
            campaigns,
            fetched_at: UnixTimestamp::now(),
        })
    }
}

fn normalize(raw: &Value) -> Result<Vec<Campaign>> {
    let records = raw.as_array().ok_or_else(|| {
        ClientError::Fetch("getCampaigns did not return a list".to_string())
    })?;

    Ok(records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match Campaign::decode(index, record) {
            Ok(campaign) => Some(campaign),
            Err(e) => {
                warn!("Skipping campaign record: {e}");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::testutil::{raw_campaign, FakeChain};
    use serde_json::json;

    #[tokio::test]
    async fn fetch_assigns_positional_ids_and_converts_amounts() {
        let chain = FakeChain::new(vec![
            raw_campaign("first", 100_000_000, 0, 2_000_000_000),
            raw_campaign("second", 5_000_000, 1_250_000, 2_000_000_000),
        ]);
        let repo = CampaignRepository::new(chain.contract());

        let snapshot = repo.fetch_all().await.unwrap();
        assert_eq!(snapshot.campaigns.len(), 2);
        assert_eq!(snapshot.campaigns[1].id, 1);
        assert_eq!(snapshot.campaigns[1].title, "second");
        assert_eq!(snapshot.campaigns[1].target, Amount::from_units(5));
        assert_eq!(snapshot.campaigns[1].amount_collected.to_string(), "1.25");
    }

    #[tokio::test]
    async fn malformed_record_keeps_neighbour_ids() {
        let chain = FakeChain::new(vec![
            raw_campaign("a", 1, 0, 1),
            json!({ "title": "broken" }),
            raw_campaign("c", 1, 0, 1),
        ]);
        let repo = CampaignRepository::new(chain.contract());

        let snapshot = repo.fetch_all().await.unwrap();
        let ids: Vec<u64> = snapshot.campaigns.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(snapshot.get(2).unwrap().title, "c");
    }

    #[tokio::test]
    async fn read_failure_is_fetch_error() {
        let chain = FakeChain::new(Vec::new());
        chain.fail_reads(true);
        let repo = CampaignRepository::new(chain.contract());

        assert!(matches!(repo.fetch_all().await, Err(ClientError::Fetch(_))));
    }

    #[test]
    fn non_list_response_is_fetch_error() {
        assert!(matches!(
            normalize(&json!({ "campaigns": [] })),
            Err(ClientError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn each_fetch_is_a_new_snapshot() {
        let chain = FakeChain::new(vec![raw_campaign("a", 10_000_000, 0, 2_000_000_000)]);
        let repo = CampaignRepository::new(chain.contract());

        let before = repo.fetch_all().await.unwrap();
        chain.credit(0, 3_000_000);
        let after = repo.fetch_all().await.unwrap();

        assert_eq!(before.campaigns[0].amount_collected, Amount::ZERO);
        assert_eq!(after.campaigns[0].amount_collected, Amount::from_units(3));
    }
}
