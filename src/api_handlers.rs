use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Json as JsonExtractor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::card::Card;
use crate::claim::parse_card_id;
use crate::defs::{CardId, CLIENT_ID_HEADER, RANDOM_BATCH_SIZE};
use crate::logging::{log_debug, log_error, log_info, log_warning};
use crate::server::AppState;
use crate::store::{CardPatch, CardStore, OwnerInfo, OwnerPredicate, PoolStats, StoreError};
use crate::win::is_winner;

// Response structures for JSON serialization
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalUpdateRequest {
    pub predicate: OwnerPredicate,
    pub patch: CardPatch,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnclaimedResponse {
    pub card_ids: Vec<CardId>,
}

#[derive(Deserialize)]
pub struct UnclaimedQuery {
    pub limit: Option<usize>,
}

// Custom error type for handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(error_response)).into_response()
    }
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let status = match &error {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::NoRowsAffected => StatusCode::CONFLICT,
            StoreError::Client { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST),
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = match error {
            StoreError::Client { message, .. } => message,
            other => other.to_string(),
        };
        ApiError::new(status, message)
    }
}

fn card_id_from_path(raw: &str) -> Result<CardId, ApiError> {
    parse_card_id(raw).map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

pub async fn handle_get_card(
    State(app_state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
) -> Result<Json<Card>, ApiError> {
    log_debug(&format!("Card request for: {card_id}"));
    let card_id = card_id_from_path(&card_id)?;

    Ok(Json(app_state.store.read(card_id).await?))
}

pub async fn handle_get_owner(
    State(app_state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
) -> Result<Json<OwnerInfo>, ApiError> {
    log_debug(&format!("Owner request for card: {card_id}"));
    let card_id = card_id_from_path(&card_id)?;

    Ok(Json(app_state.store.read_owner(card_id).await?))
}

pub async fn handle_conditional_update(
    State(app_state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
    JsonExtractor(request): JsonExtractor<ConditionalUpdateRequest>,
) -> Result<Json<Card>, ApiError> {
    let card_id = card_id_from_path(&card_id)?;
    log_debug(&format!("Conditional update on card {card_id}: {request:?}"));

    let claiming = request.patch.owner_id.clone();
    let card = match app_state.store.conditional_update(card_id, request.predicate, request.patch).await {
        Ok(card) => card,
        Err(StoreError::NoRowsAffected) => {
            log_info(&format!("Conditional update on card {card_id} affected no rows"));
            return Err(StoreError::NoRowsAffected.into());
        }
        Err(e) => {
            log_warning(&format!("Conditional update on card {card_id} rejected: {e}"));
            return Err(e.into());
        }
    };

    if let Some(owner) = claiming {
        log_info(&format!("Card {card_id} claimed by {owner}"));
    }

    // Completed cards are saved straight away
    if is_winner(&card.marked_numbers) {
        log_info(&format!("Card {card_id} is complete: TOMBOLA!"));
        app_state.persist_pool();
    }

    Ok(Json(card))
}

pub async fn handle_unclaimed(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<UnclaimedQuery>,
) -> Result<Json<UnclaimedResponse>, ApiError> {
    let limit = params.limit.unwrap_or(RANDOM_BATCH_SIZE);
    log_debug(&format!("Unclaimed cards request (limit {limit})"));

    let card_ids = app_state.store.query_unclaimed(limit).await?;
    Ok(Json(UnclaimedResponse { card_ids }))
}

pub async fn handle_status(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<PoolStats>, ApiError> {
    log_debug("Status request");
    Ok(Json(app_state.store.stats()?))
}

pub async fn handle_reset(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    log_info("Pool reset request");

    // Get client ID from headers for authentication
    let client_id = match headers.get(CLIENT_ID_HEADER) {
        Some(header_value) => {
            match header_value.to_str() {
                Ok(id) => id,
                Err(_) => {
                    log_error("Invalid X-Client-ID header");
                    return Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid X-Client-ID header"));
                }
            }
        }
        None => {
            log_error("Missing X-Client-ID header");
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Missing X-Client-ID header"));
        }
    };

    // Only the configured admin may hand every card back to the pool
    if client_id != app_state.config.admin_id {
        log_error("Unauthorized: Only the admin client can reset the pool");
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Unauthorized: Only the admin client can reset the pool"));
    }

    let reset = app_state.store.reset_all()?;
    app_state.persist_pool();

    Ok(Json(json!({
        "success": true,
        "reset": reset,
        "message": format!("{reset} cards returned to the pool")
    })))
}
