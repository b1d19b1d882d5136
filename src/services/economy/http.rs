//! HTTP routes for the economy service (Axum)

use super::types::*;
use crate::api::{ApiJson, AppState};
use crate::error::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/user", get(get_user))
        .route("/api/user/profile", get(get_profile))
        .route("/api/games/consume-heart", post(consume_heart))
        .route("/api/games/consume-life", post(consume_life))
        .route("/api/games/consume-powerup", post(consume_powerup))
        .route("/api/games/save-score", post(save_score))
        .route("/api/games/:game_id/start", post(start_game))
        .route("/api/games/:game_id/complete", post(complete_game))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/leaderboard/:game_id", get(cached_leaderboard))
        .route("/api/purchase/hearts", post(purchase_hearts))
        .route("/api/purchase/powerup", post(purchase_powerup))
        .route("/api/purchase/premium-game", post(purchase_premium_game))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = state.economy.register(req).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserResponse>> {
    let user = state.economy.user_with_refill(query.wallet_address).await?;
    Ok(Json(UserResponse { user }))
}

async fn get_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<UserResponse>> {
    let user = state.economy.profile(query.address).await?;
    Ok(Json(UserResponse { user }))
}

async fn consume_heart(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<WalletRequest>,
) -> Result<Json<HeartsResponse>> {
    Ok(Json(state.economy.consume_heart(req).await?))
}

async fn consume_life(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<WalletRequest>,
) -> Result<Json<HeartsResponse>> {
    Ok(Json(state.economy.consume_life(req).await?))
}

async fn consume_powerup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ConsumePowerupRequest>,
) -> Result<Json<SuccessUserResponse>> {
    let user = state.economy.consume_powerup(req).await?;
    Ok(Json(SuccessUserResponse { success: true, user }))
}

async fn save_score(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SaveScoreRequest>,
) -> Result<Json<SaveScoreResponse>> {
    Ok(Json(state.economy.save_score(req).await?))
}

async fn start_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    ApiJson(req): ApiJson<WalletRequest>,
) -> Result<Json<StartGameResponse>> {
    Ok(Json(state.economy.start_game(&game_id, req).await?))
}

async fn complete_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    ApiJson(req): ApiJson<CompleteGameRequest>,
) -> Result<Json<CompleteGameResponse>> {
    Ok(Json(state.economy.complete_game(&game_id, req).await?))
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<EntriesResponse<RankingRow>>> {
    let entries = state.economy.leaderboard(query.game_id).await?;
    Ok(Json(EntriesResponse { entries }))
}

async fn cached_leaderboard(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<EntriesResponse<LeaderboardEntry>>> {
    let entries = state.economy.cached_leaderboard(&game_id).await?;
    Ok(Json(EntriesResponse { entries }))
}

async fn purchase_hearts(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PurchaseHeartsRequest>,
) -> Result<Json<PurchaseResponse>> {
    Ok(Json(state.economy.purchase_hearts(req).await?))
}

async fn purchase_powerup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PurchasePowerupRequest>,
) -> Result<Json<PurchaseResponse>> {
    Ok(Json(state.economy.purchase_powerup(req).await?))
}

async fn purchase_premium_game(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PurchasePremiumRequest>,
) -> Result<Json<PurchaseResponse>> {
    Ok(Json(state.economy.purchase_premium_game(req).await?))
}
