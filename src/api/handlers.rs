use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::engine::{EngineError, HoldRequest, PaymentOutcome};
use crate::gateway::PaymentResult;
use crate::model::*;

use super::error::ApiError;
use super::identity::Caller;
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachOrderBody {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub amount_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub order_id: String,
    pub result: PaymentResult,
}

#[derive(Debug, Deserialize)]
pub struct OpenSlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct OpenSlots {
    pub teacher_id: Ulid,
    pub date: NaiveDate,
    pub ranges: Vec<TimeRange>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    /// Defaults to the current UTC date.
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<Status>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Availability ─────────────────────────────────────────────────

pub async fn get_availability(
    State(state): State<AppState>,
    Path(teacher_id): Path<Ulid>,
) -> ApiResult<AvailabilityTemplate> {
    let template = state
        .engine
        .get_availability(teacher_id)
        .await?
        .ok_or(EngineError::NotFound(teacher_id))?;
    Ok(Json(template))
}

pub async fn put_availability(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(teacher_id): Path<Ulid>,
    Json(template): Json<AvailabilityTemplate>,
) -> ApiResult<AvailabilityTemplate> {
    let published = state.engine.publish_availability(actor, teacher_id, template).await?;
    Ok(Json(published))
}

pub async fn open_slots(
    State(state): State<AppState>,
    Path(teacher_id): Path<Ulid>,
    Query(q): Query<OpenSlotsQuery>,
) -> ApiResult<OpenSlots> {
    let ranges = state.engine.open_ranges(teacher_id, q.date).await?;
    Ok(Json(OpenSlots {
        teacher_id,
        date: q.date,
        ranges,
    }))
}

// ── Reservations ─────────────────────────────────────────────────

pub async fn create_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let r = state.engine.create_hold(actor, req).await?;
    Ok((StatusCode::CREATED, Json(r)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Reservation> {
    Ok(Json(state.engine.get(id, actor).await?))
}

pub async fn approve(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Reservation> {
    Ok(Json(state.engine.approve(id, actor).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Reservation> {
    Ok(Json(state.engine.reject(id, actor, &body.reason).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Reservation> {
    Ok(Json(state.engine.cancel(id, actor, &body.reason).await?))
}

pub async fn attach_payment_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(body): Json<AttachOrderBody>,
) -> ApiResult<Reservation> {
    state.engine.owned_by_learner(id, actor).await?;
    Ok(Json(state.engine.attach_payment_order(id, &body.order_id).await?))
}

pub async fn checkout(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Reservation> {
    Ok(Json(state.engine.begin_payment(id, actor, body.amount_cents).await?))
}

/// Verified payment signal. Callers sit behind the webhook verifier.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<PaymentOutcome> {
    Ok(Json(state.engine.confirm_payment(&body.order_id, body.result).await?))
}

// ── Caller projections ───────────────────────────────────────────

pub async fn upcoming(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(q): Query<UpcomingQuery>,
) -> ApiResult<Vec<Reservation>> {
    let from = q.from.unwrap_or_else(|| chrono::Utc::now().date_naive());
    Ok(Json(state.engine.upcoming(actor, from).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Paged<Reservation>> {
    let defaults = Page::default();
    let page = Page {
        page: q.page.unwrap_or(defaults.page),
        per_page: q.per_page.unwrap_or(defaults.per_page),
    };
    Ok(Json(state.engine.history(actor, q.status, page).await?))
}

pub async fn pending_queue(State(state): State<AppState>, Caller(actor): Caller) -> ApiResult<Vec<Reservation>> {
    Ok(Json(state.engine.pending_queue(actor).await?))
}
