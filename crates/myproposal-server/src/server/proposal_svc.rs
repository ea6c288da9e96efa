//! Proposal routes: AI generation, drafts, delivery and the reply thread,
//! plus the unauthenticated recipient view.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use myproposal_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::Page;
use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::generation::{Generated, Provider, ProposalRequest};
use crate::messaging::validate::{is_valid_e164, is_valid_email};
use crate::messaging::{Delivery, DeliveryReceipt, Dispatcher};
use crate::storage::{
    Channel, Message, MessageAuthor, NewProposal, Proposal, ProposalEdit, ProposalStatus,
};

const MAX_NAME_CHARS: usize = 100;
const MAX_REPLY_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(flatten)]
    pub request: ProposalRequest,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    #[serde(flatten)]
    pub generated: Generated,
    pub remaining: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    pub message: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProposalRequest {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub proposal_id: String,
    pub channel: Channel,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub proposal: Proposal,
    pub receipt: DeliveryReceipt,
    pub remaining: i64,
}

#[derive(Debug, Serialize)]
pub struct ProposalThread {
    pub proposal: Proposal,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub answer: ProposalStatus,
}

/// What the recipient sees: no contact details, no delivery metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProposal {
    pub id: String,
    pub sender_name: Option<String>,
    pub recipient_name: String,
    pub message: String,
    pub status: ProposalStatus,
    pub sent_at: Option<i64>,
    pub responded_at: Option<i64>,
    pub expires_at: i64,
    pub messages: Vec<Message>,
}

// =========================================================================
// Sender routes
// =========================================================================

/// `POST /api/proposals/generate`
///
/// Takes the generation cost up front and refunds it if every provider
/// fails.
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn generate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let provider = req
        .provider
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Provider>)
        .transpose()?;
    // Reject bad input before any credit moves.
    req.request.build_prompt()?;

    let cost = state.ledger.policy().generation_cost;
    let remaining = charge(&state, &claims.sub, cost).await?;

    match state.generator.generate(&req.request, provider).await {
        Ok(generated) => {
            info!(provider = %generated.provider, remaining, "Proposal generated");
            Ok(Json(GenerateResponse { generated, remaining }))
        }
        Err(e) => {
            refund(&state, &claims.sub, cost).await;
            Err(e.into())
        }
    }
}

/// `POST /api/proposals`
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<Proposal>), ApiError> {
    let recipient_name = required_text("recipientName", &req.recipient_name, MAX_NAME_CHARS)?;
    let message = required_text(
        "message",
        &req.message,
        state.config.proposals.max_message_chars,
    )?;
    let recipient_email = optional_email(req.recipient_email.as_deref())?;
    let recipient_phone = optional_phone(req.recipient_phone.as_deref())?;
    let provider = req
        .provider
        .as_deref()
        .map(str::parse::<Provider>)
        .transpose()?;
    let tone = req
        .tone
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_uppercase);

    let id = uuid::Uuid::new_v4().to_string();
    let proposal = state
        .db
        .create_proposal(&NewProposal {
            id: &id,
            sender_id: &claims.sub,
            recipient_name,
            recipient_email,
            recipient_phone,
            message,
            tone: tone.as_deref(),
            provider: provider.map(Provider::as_str),
            expires_at: unix_timestamp() + state.config.proposals.ttl_secs(),
        })
        .await?;

    info!(proposal_id = %proposal.id, "Proposal created");
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// `GET /api/proposals`
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Proposal>>, ApiError> {
    let (limit, offset) = page.bounds();
    let proposals = state
        .db
        .list_proposals_for_sender(&claims.sub, limit, offset)
        .await?;
    Ok(Json(proposals))
}

/// `GET /api/proposals/{id}`
pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ProposalThread>, ApiError> {
    state.db.expire_proposal_if_overdue(&id, unix_timestamp()).await?;
    let proposal = state.db.get_proposal_for_sender(&id, &claims.sub).await?;
    let messages = state.db.list_messages(&proposal.id).await?;
    Ok(Json(ProposalThread { proposal, messages }))
}

/// `PUT /api/proposals/{id}`
#[instrument(skip_all, fields(user_id = %claims.sub, proposal_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProposalRequest>,
) -> Result<Json<Proposal>, ApiError> {
    let now = unix_timestamp();
    let proposal = state.db.get_proposal_for_sender(&id, &claims.sub).await?;
    ensure_open(&state, &proposal, now).await?;
    if !proposal.status.can_edit() {
        return Err(invalid_transition(proposal.status, "edited"));
    }

    let recipient_name = req
        .recipient_name
        .as_deref()
        .map(|n| required_text("recipientName", n, MAX_NAME_CHARS))
        .transpose()?;
    let message = req
        .message
        .as_deref()
        .map(|m| required_text("message", m, state.config.proposals.max_message_chars))
        .transpose()?;
    let edit = ProposalEdit {
        recipient_name,
        recipient_email: optional_email(req.recipient_email.as_deref())?,
        recipient_phone: optional_phone(req.recipient_phone.as_deref())?,
        message,
    };

    if !state.db.update_proposal_draft(&id, &edit).await? {
        return Err(ApiError::Conflict("Proposal is no longer a draft".into()));
    }
    Ok(Json(state.db.get_proposal(&id).await?))
}

/// `POST /api/proposals/send`
///
/// Address and channel checks run before the send cost is taken; a failed
/// delivery refunds it.
#[instrument(skip_all, fields(user_id = %claims.sub, proposal_id = %req.proposal_id, channel = %req.channel))]
pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let now = unix_timestamp();
    let proposal = state
        .db
        .get_proposal_for_sender(&req.proposal_id, &claims.sub)
        .await?;
    ensure_open(&state, &proposal, now).await?;
    if !proposal.status.can_send() {
        return Err(invalid_transition(proposal.status, "sent"));
    }

    let sender = state.db.get_user(&claims.sub).await?;
    let delivery = Delivery {
        proposal_id: &proposal.id,
        sender_name: sender.name.as_deref(),
        recipient_name: &proposal.recipient_name,
        recipient_email: proposal.recipient_email.as_deref(),
        recipient_phone: proposal.recipient_phone.as_deref(),
        message: &proposal.message,
    };
    Dispatcher::validate(req.channel, &delivery)?;
    if !state.dispatcher.is_available(req.channel) {
        return Err(ApiError::Unavailable("Delivery channel"));
    }

    let cost = state.ledger.policy().send_cost;
    let remaining = charge(&state, &claims.sub, cost).await?;

    let receipt = match state.dispatcher.dispatch(req.channel, &delivery).await {
        Ok(receipt) => receipt,
        Err(e) => {
            refund(&state, &claims.sub, cost).await;
            return Err(e.into());
        }
    };

    if !state
        .db
        .mark_proposal_sent(&proposal.id, req.channel, &receipt.reference, unix_timestamp())
        .await?
    {
        // Delivered, but the proposal was answered or expired meanwhile.
        warn!(reference = %receipt.reference, "Proposal changed state during delivery");
        return Err(ApiError::Conflict("Proposal changed state during delivery".into()));
    }

    info!(reference = %receipt.reference, remaining, "Proposal sent");
    let proposal = state.db.get_proposal(&proposal.id).await?;
    Ok(Json(SendResponse {
        proposal,
        receipt,
        remaining,
    }))
}

/// `POST /api/proposals/{id}/messages`
pub async fn sender_reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let proposal = state.db.get_proposal_for_sender(&id, &claims.sub).await?;
    add_reply(&state, &proposal, MessageAuthor::Sender, &req.body).await
}

// =========================================================================
// Recipient routes (no auth; the proposal id is the capability)
// =========================================================================

/// `GET /api/public/proposals/{id}`
pub async fn public_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicProposal>, ApiError> {
    state.db.expire_proposal_if_overdue(&id, unix_timestamp()).await?;
    let proposal = delivered_proposal(&state, &id).await?;
    let sender_name = state.db.get_user(&proposal.sender_id).await?.name;
    let messages = state.db.list_messages(&proposal.id).await?;

    Ok(Json(PublicProposal {
        id: proposal.id,
        sender_name,
        recipient_name: proposal.recipient_name,
        message: proposal.message,
        status: proposal.status,
        sent_at: proposal.sent_at,
        responded_at: proposal.responded_at,
        expires_at: proposal.expires_at,
        messages,
    }))
}

/// `POST /api/public/proposals/{id}/respond`
#[instrument(skip_all, fields(proposal_id = %id, answer = %req.answer))]
pub async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<Proposal>, ApiError> {
    if !matches!(req.answer, ProposalStatus::Accepted | ProposalStatus::Rejected) {
        return Err(ApiError::bad_request("answer must be ACCEPTED or REJECTED"));
    }

    let now = unix_timestamp();
    let proposal = delivered_proposal(&state, &id).await?;
    ensure_open(&state, &proposal, now).await?;
    if proposal.status != ProposalStatus::Sent {
        return Err(invalid_transition(proposal.status, "answered"));
    }

    if !state.db.record_proposal_response(&id, req.answer, now).await? {
        let current = state.db.get_proposal(&id).await?;
        ensure_open(&state, &current, now).await?;
        return Err(invalid_transition(current.status, "answered"));
    }

    info!("Proposal answered");
    Ok(Json(state.db.get_proposal(&id).await?))
}

/// `POST /api/public/proposals/{id}/messages`
pub async fn recipient_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let proposal = delivered_proposal(&state, &id).await?;
    add_reply(&state, &proposal, MessageAuthor::Recipient, &req.body).await
}

// =========================================================================
// Helpers
// =========================================================================

/// Lazy credit check (which may open a new period) followed by the charge.
async fn charge(state: &AppState, user_id: &str, cost: i64) -> Result<i64, ApiError> {
    let check = state.ledger.check_user_credits(user_id).await?;
    if !check.allowed {
        return Err(ApiError::InsufficientCredits {
            remaining: check.remaining,
        });
    }
    Ok(state.ledger.consume_credit(user_id, cost).await?)
}

async fn refund(state: &AppState, user_id: &str, cost: i64) {
    if let Err(e) = state.ledger.refund_credit(user_id, cost).await {
        warn!(user_id, error = %e, "Credit refund failed");
    }
}

/// Drafts are invisible to recipients.
async fn delivered_proposal(state: &AppState, id: &str) -> Result<Proposal, ApiError> {
    let proposal = state.db.get_proposal(id).await?;
    if proposal.status == ProposalStatus::Draft {
        return Err(ApiError::NotFound("Proposal not found".into()));
    }
    Ok(proposal)
}

/// Fail with 410 if the proposal is past its deadline, persisting the expiry.
async fn ensure_open(state: &AppState, proposal: &Proposal, now: i64) -> Result<(), ApiError> {
    if proposal.status == ProposalStatus::Expired {
        return Err(ApiError::Expired);
    }
    if !proposal.status.is_terminal() && proposal.is_expired_at(now) {
        state.db.expire_proposal_if_overdue(&proposal.id, now).await?;
        return Err(ApiError::Expired);
    }
    Ok(())
}

async fn add_reply(
    state: &AppState,
    proposal: &Proposal,
    author: MessageAuthor,
    body: &str,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let now = unix_timestamp();
    ensure_open(state, proposal, now).await?;
    if proposal.status == ProposalStatus::Draft {
        return Err(ApiError::Conflict("Proposal has not been sent yet".into()));
    }
    let body = required_text("body", body, MAX_REPLY_CHARS)?;

    let id = uuid::Uuid::new_v4().to_string();
    let message = state.db.add_message(&id, &proposal.id, author, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

fn invalid_transition(status: ProposalStatus, action: &str) -> ApiError {
    ApiError::Conflict(format!("A {status} proposal cannot be {action}"))
}

fn required_text<'a>(field: &str, value: &'a str, max_chars: usize) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    if value.chars().count() > max_chars {
        return Err(ApiError::bad_request(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(value)
}

fn optional_email(value: Option<&str>) -> Result<Option<&str>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(email) if !is_valid_email(email) => {
            Err(ApiError::bad_request("recipientEmail is not a valid email"))
        }
        other => Ok(other),
    }
}

fn optional_phone(value: Option<&str>) -> Result<Option<&str>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(phone) if !is_valid_e164(phone) => Err(ApiError::bad_request(
            "recipientPhone must be in E.164 format (e.g. +14155552671)",
        )),
        other => Ok(other),
    }
}
