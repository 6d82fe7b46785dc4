//! Route Definitions

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/games/pc28/round/current", get(current_round_handler))
        .route("/api/v1/games/pc28/history", get(history_handler))
        .route("/api/v1/games/pc28/odds", get(odds_handler))
        .route("/api/v1/bets", post(place_bet_handler).get(user_bets_handler))
        .route("/ws", get(websocket_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
