//! Campaign creation.
//!
//! A draft is validated in full before any I/O, the image is uploaded only
//! if the draft has no content reference yet, and the draft is cleared only
//! once `createCampaign` has confirmed.  Every failure leaves the draft (and
//! any reference already uploaded) in place for a retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::amount::{Amount, UnixTimestamp};
use crate::assets::AssetStore;
use crate::chain::{await_confirmation, ConfirmationPolicy, CrowdfundContract, Identity, TxHash};
use crate::errors::{ClientError, Result};

/// Raw form fields, exactly as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationDraft {
    pub title: String,
    pub description: String,
    pub target: String,
    pub deadline: String,
    pub asset_ref: Option<String>,
}

/// Partial edit of a [`CreationDraft`]; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target: Option<String>,
    pub deadline: Option<String>,
    pub asset_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct ValidDraft {
    title: String,
    description: String,
    target: Amount,
    deadline: UnixTimestamp,
}

impl CreationDraft {
    fn validate(&self, now: UnixTimestamp, image_supplied: bool) -> Result<ValidDraft> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ClientError::Validation("title is required".to_string()));
        }

        let target = Amount::parse_positive(&self.target)?;

        let deadline = UnixTimestamp::parse(&self.deadline)?;
        if deadline <= now {
            return Err(ClientError::Validation(format!(
                "deadline {deadline} is not in the future"
            )));
        }

        if self.asset_ref.is_none() && !image_supplied {
            return Err(ClientError::Validation(
                "a campaign image is required".to_string(),
            ));
        }

        Ok(ValidDraft {
            title: title.to_string(),
            description: self.description.clone(),
            target,
            deadline,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationReceipt {
    pub tx: TxHash,
    pub owner: Identity,
    pub title: String,
    pub target: Amount,
    pub deadline: UnixTimestamp,
    pub asset_ref: String,
}

pub struct CreationController {
    contract: CrowdfundContract,
    assets: Arc<dyn AssetStore>,
    policy: ConfirmationPolicy,
    shutdown: CancellationToken,
    draft: CreationDraft,
}

impl CreationController {
    pub fn new(
        contract: CrowdfundContract,
        assets: Arc<dyn AssetStore>,
        policy: ConfirmationPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        CreationController {
            contract,
            assets,
            policy,
            shutdown,
            draft: CreationDraft::default(),
        }
    }

    pub fn draft(&self) -> &CreationDraft {
        &self.draft
    }

    pub fn update(&mut self, update: DraftUpdate) {
        let draft = &mut self.draft;
        if let Some(title) = update.title {
            draft.title = title;
        }
        if let Some(description) = update.description {
            draft.description = description;
        }
        if let Some(target) = update.target {
            draft.target = target;
        }
        if let Some(deadline) = update.deadline {
            draft.deadline = deadline;
        }
        if let Some(asset_ref) = update.asset_ref {
            draft.asset_ref = Some(asset_ref).filter(|r| !r.trim().is_empty());
        }
    }

    /// Upload `image` and attach its reference to the draft.
    pub async fn attach_image(&mut self, image: ImageUpload) -> Result<String> {
        let asset_ref = self.assets.upload(&image.file_name, image.bytes).await?;
        self.draft.asset_ref = Some(asset_ref.clone());
        Ok(asset_ref)
    }

    /// Validate, upload if needed, then create the campaign on the ledger.
    pub async fn submit(
        &mut self,
        now: UnixTimestamp,
        image: Option<ImageUpload>,
    ) -> Result<CreationReceipt> {
        let valid = self.draft.validate(now, image.is_some())?;

        let asset_ref = match (self.draft.asset_ref.clone(), image) {
            (Some(existing), _) => existing,
            (None, Some(image)) => self.attach_image(image).await.map_err(|e| {
                warn!("Campaign image upload failed: {e}");
                e
            })?,
            (None, None) => {
                return Err(ClientError::Validation(
                    "a campaign image is required".to_string(),
                ))
            }
        };

        let owner = self.contract.chain().address().await?;
        info!(
            "Creating campaign {:?} for {owner} (target {}, deadline {})",
            valid.title, valid.target, valid.deadline
        );

        let tx = self
            .contract
            .create_campaign(
                &owner,
                &valid.title,
                &valid.description,
                valid.target,
                valid.deadline,
                &asset_ref,
            )
            .await
            .map_err(|e| {
                warn!("Campaign creation not sent: {e}");
                e
            })?;

        let cancel = self.shutdown.child_token();
        await_confirmation(self.contract.chain(), &tx, &self.policy, &cancel)
            .await
            .map_err(|e| {
                warn!("Campaign creation {tx} failed: {e}");
                e
            })?;

        info!("Campaign {:?} created in {tx}", valid.title);
        self.draft = CreationDraft::default();

        Ok(CreationReceipt {
            tx,
            owner,
            title: valid.title,
            target: valid.target,
            deadline: valid.deadline,
            asset_ref,
        })
    }
}
