//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::amount::{Amount, UnixTimestamp};
use crate::assets::gateway_url;
use crate::classifier::{classify, filter_closed, filter_open, progress_percent};
use crate::creation::{CreationController, DraftUpdate, ImageUpload};
use crate::donation::{DonationController, DonationPhase};
use crate::errors::ClientError;
use crate::repository::CampaignRepository;
use crate::types::{Campaign, CampaignStatus};

pub struct ApiState {
    pub repository: Arc<CampaignRepository>,
    pub donations: Arc<DonationController>,
    pub creation: Mutex<CreationController>,
    pub gateway_url: String,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub status: CampaignStatus,
    pub progress_percent: f64,
    pub image_url: String,
    pub deadline_at: Option<String>,
}

impl CampaignView {
    fn new(campaign: Campaign, now: UnixTimestamp, gateway: &str) -> Self {
        CampaignView {
            status: classify(&campaign, now),
            progress_percent: progress_percent(campaign.amount_collected, campaign.target),
            image_url: gateway_url(gateway, campaign.asset_ref.as_deref()),
            deadline_at: campaign.deadline.to_rfc3339(),
            campaign,
        }
    }
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub count: usize,
    pub campaigns: Vec<CampaignView>,
}

#[derive(Deserialize)]
pub struct DonateRequest {
    /// Decimal amount in ledger units, as a string or a JSON number.
    pub amount: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonateResponse {
    pub campaign_id: u64,
    pub amount: Amount,
    pub tx: String,
    #[serde(flatten)]
    pub phase: DonationPhase,
    /// The campaign as re-read from the ledger after settlement.
    pub campaign: Option<CampaignView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResponse {
    pub campaign_id: u64,
    #[serde(flatten)]
    pub phase: DonationPhase,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub error: String,
    /// The campaign as re-read from the ledger after a failed donation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignView>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /campaigns`
pub async fn get_all_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    list_campaigns(&state, |campaigns, _| campaigns.to_vec()).await
}

/// `GET /campaigns/open`
pub async fn get_open_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    list_campaigns(&state, filter_open).await
}

/// `GET /campaigns/closed`
pub async fn get_closed_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    list_campaigns(&state, filter_closed).await
}

async fn list_campaigns<F>(state: &ApiState, select: F) -> Response
where
    F: Fn(&[Campaign], UnixTimestamp) -> Vec<Campaign>,
{
    let snapshot = match state.repository.fetch_all().await {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(e),
    };
    let now = UnixTimestamp::now();

    let campaigns: Vec<CampaignView> = select(&snapshot.campaigns, now)
        .into_iter()
        .map(|c| CampaignView::new(c, now, &state.gateway_url))
        .collect();

    Json(CampaignsResponse {
        count: campaigns.len(),
        campaigns,
    })
    .into_response()
}

/// `POST /campaigns/:id/donations`
///
/// Only open campaigns accept donations.  The controller claims the
/// campaign's guard before it reads the ledger, so an overlapping request is
/// refused without one.
pub async fn donate(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
    Json(request): Json<DonateRequest>,
) -> Response {
    let amount = match request.amount {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };

    // Run the donation in its own task so a dropped connection does not
    // abandon a transaction that is already on its way.
    let donations = state.donations.clone();
    let outcome = tokio::spawn(async move { donations.submit(campaign_id, &amount).await }).await;

    let now = UnixTimestamp::now();
    let view = |campaign: Option<Campaign>| {
        campaign.map(|c| CampaignView::new(c, now, &state.gateway_url))
    };

    match outcome {
        Ok(Ok(receipt)) => (
            StatusCode::OK,
            Json(DonateResponse {
                campaign_id,
                amount: receipt.amount,
                tx: receipt.tx.to_string(),
                phase: state.donations.phase(campaign_id),
                campaign: view(receipt.campaign),
            }),
        )
            .into_response(),
        Ok(Err(e)) => error_response_with(e, view(state.donations.refreshed_campaign(campaign_id))),
        Err(e) => error_response(ClientError::Network(format!(
            "donation task for campaign {campaign_id} failed: {e}"
        ))),
    }
}

/// `GET /campaigns/:id/donations`
pub async fn get_donation_phase(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
) -> impl IntoResponse {
    Json(PhaseResponse {
        campaign_id,
        phase: state.donations.phase(campaign_id),
    })
}

/// `DELETE /campaigns/:id/donations`
///
/// Cancels the confirmation wait of an in-flight donation, or returns a
/// settled/failed campaign to idle.
pub async fn cancel_donation(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
) -> Response {
    if state.donations.cancel(campaign_id) {
        return (
            StatusCode::ACCEPTED,
            Json(PhaseResponse {
                campaign_id,
                phase: state.donations.phase(campaign_id),
            }),
        )
            .into_response();
    }

    match state.donations.reset(campaign_id) {
        Ok(()) => Json(PhaseResponse {
            campaign_id,
            phase: state.donations.phase(campaign_id),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /draft`
pub async fn get_draft(State(state): State<Arc<ApiState>>) -> Response {
    match state.creation.try_lock() {
        Ok(creation) => Json(creation.draft().clone()).into_response(),
        Err(_) => error_response(ClientError::CreationInFlight),
    }
}

/// `PATCH /draft`
pub async fn update_draft(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<DraftUpdate>,
) -> Response {
    match state.creation.try_lock() {
        Ok(mut creation) => {
            creation.update(update);
            Json(creation.draft().clone()).into_response()
        }
        Err(_) => error_response(ClientError::CreationInFlight),
    }
}

/// `POST /draft/image`
///
/// Raw request body is the image; `x-file-name` names it.
pub async fn upload_draft_image(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return error_response(ClientError::Validation("image body is empty".to_string()));
    }
    let file_name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("campaign-image")
        .to_string();

    let Ok(mut creation) = state.creation.try_lock() else {
        return error_response(ClientError::CreationInFlight);
    };
    let upload = ImageUpload {
        file_name,
        bytes: body.to_vec(),
    };
    match creation.attach_image(upload).await {
        Ok(_) => Json(creation.draft().clone()).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /draft/submit`
pub async fn submit_draft(State(state): State<Arc<ApiState>>) -> Response {
    let Ok(mut creation) = state.creation.try_lock() else {
        return error_response(ClientError::CreationInFlight);
    };
    match creation.submit(UnixTimestamp::now(), None).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────

fn classify_error(err: &ClientError) -> (StatusCode, &'static str) {
    match err {
        ClientError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        ClientError::DonationInFlight(_) => (StatusCode::CONFLICT, "donation_in_flight"),
        ClientError::CreationInFlight => (StatusCode::CONFLICT, "creation_in_flight"),
        ClientError::UserRejected(_) => (StatusCode::FORBIDDEN, "user_rejected"),
        ClientError::WalletUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "wallet_unavailable")
        }
        ClientError::ContractRevert(_) => (StatusCode::CONFLICT, "contract_revert"),
        ClientError::ConfirmationTimeout(_) => {
            (StatusCode::GATEWAY_TIMEOUT, "confirmation_timeout")
        }
        ClientError::Cancelled(_) => (StatusCode::CONFLICT, "cancelled"),
        ClientError::CampaignNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ClientError::AssetUpload(_) => (StatusCode::BAD_GATEWAY, "asset_upload"),
        ClientError::Fetch(_) | ClientError::MalformedRecord { .. } => {
            (StatusCode::BAD_GATEWAY, "fetch")
        }
        ClientError::Network(_) | ClientError::Http(_) => {
            (StatusCode::BAD_GATEWAY, "network")
        }
        ClientError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
    }
}

fn error_response(err: ClientError) -> Response {
    error_response_with(err, None)
}

fn error_response_with(err: ClientError, campaign: Option<CampaignView>) -> Response {
    let (status, kind) = classify_error(&err);
    if status.is_server_error() {
        warn!("Request failed: {err}");
    }
    (
        status,
        Json(ErrorResponse {
            kind,
            error: err.to_string(),
            campaign,
        }),
    )
        .into_response()
}
