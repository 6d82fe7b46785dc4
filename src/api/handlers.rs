//! Request Handlers

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::game_store::RoundStore;
use crate::games::odds::{odds_sheet, OddsSheet};
use crate::games::placement::{PlaceWager, WagerDesk};
use crate::games::types::Amount;
use crate::hub::Hub;
use crate::metrics::GameMetrics;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;

const MAX_PAGE: usize = 100;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn RoundStore>,
    pub desk: WagerDesk,
    pub hub: Hub,
    pub metrics: GameMetrics,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /api/v1/games/pc28/round/current
pub async fn current_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoundResponse>, ApiError> {
    let round = state
        .store
        .find_open_round()
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), "No active round".to_string()))?;

    Ok(Json(RoundResponse::from_round(round, Utc::now())))
}

/// GET /api/v1/games/pc28/history?limit={n}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<RoundResponse>>, ApiError> {
    let rounds = state
        .store
        .recent_settled_rounds(params.limit.min(MAX_PAGE))
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;

    let now = Utc::now();
    Ok(Json(
        rounds
            .into_iter()
            .map(|r| RoundResponse::from_round(r, now))
            .collect(),
    ))
}

/// GET /api/v1/games/pc28/odds
pub async fn odds_handler() -> Json<OddsSheet> {
    Json(odds_sheet())
}

/// POST /api/v1/bets
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PlaceBetRequest>,
) -> Result<(StatusCode, Json<BetResponse>), ApiError> {
    let stake = Amount::from_decimal(body.amount).ok_or_else(|| {
        ApiError::bad_request(request_id.0.clone(), format!("Invalid amount: {}", body.amount))
    })?;

    let wager = state
        .desk
        .place_wager(PlaceWager {
            user_id: body.user_id,
            round_id: body.round_id,
            category: body.bet_type,
            value: body.bet_value,
            stake,
        })
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;

    Ok((StatusCode::CREATED, Json(wager.into())))
}

/// GET /api/v1/bets?user_id={id}&limit={n}
pub async fn user_bets_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<BetsQuery>,
) -> Result<Json<Vec<BetResponse>>, ApiError> {
    let wagers = state
        .store
        .wagers_for_user(params.user_id, params.limit.min(MAX_PAGE))
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;

    Ok(Json(wagers.into_iter().map(BetResponse::from).collect()))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
