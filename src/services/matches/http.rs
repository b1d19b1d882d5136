//! HTTP routes for the match service (Axum)

use super::types::*;
use crate::api::{ApiJson, AppState};
use crate::error::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::broadcast::error::RecvError;

/// Header carrying the resolver credential
pub const RESOLVER_TOKEN_HEADER: &str = "x-resolver-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/matches", get(list_matches))
        .route("/api/matches/create", post(create_match))
        .route("/api/matches/join", post(join_match))
        .route("/api/matches/resolve", post(resolve_match))
        .route("/api/matches/bet", post(place_bet))
        .route("/api/matches/:id", get(get_match))
        .route("/api/matches/:id/move", post(make_move))
        .route("/api/matches/:id/cancel", post(cancel_match))
        .route("/api/matches/:id/subscribe", get(ws_subscribe))
}

async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<MatchListResponse>> {
    let matches = state.matches.list_matches(query.status).await?;
    Ok(Json(MatchListResponse { matches }))
}

async fn create_match(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateMatchRequest>,
) -> Result<(StatusCode, Json<MatchResponse>)> {
    let m = state.matches.create_match(req).await?;
    Ok((StatusCode::CREATED, Json(MatchResponse { match_: m })))
}

async fn join_match(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<JoinMatchRequest>,
) -> Result<Json<MatchResponse>> {
    let m = state.matches.join_match(req).await?;
    Ok(Json(MatchResponse { match_: m }))
}

async fn get_match(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MatchResponse>> {
    let m = state.matches.get_match(&id).await?;
    Ok(Json(MatchResponse { match_: m }))
}

async fn make_move(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> Result<Json<MatchResponse>> {
    let m = state.matches.make_move(&id, req).await?;
    Ok(Json(MatchResponse { match_: m }))
}

async fn cancel_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CancelMatchRequest>,
) -> Result<Json<MatchResponse>> {
    let m = state.matches.cancel_match(&id, req).await?;
    Ok(Json(MatchResponse { match_: m }))
}

async fn resolve_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ResolveMatchRequest>,
) -> Result<Json<ResolveResponse>> {
    let token = headers
        .get(RESOLVER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    Ok(Json(state.matches.resolve_match(req, token).await?))
}

async fn place_bet(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PlaceBetRequest>,
) -> Result<(StatusCode, Json<BetResponse>)> {
    let bet = state.matches.place_bet(req).await?;
    Ok((StatusCode::CREATED, Json(BetResponse { bet })))
}

async fn ws_subscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let m = state.matches.get_match(&id).await?;
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, m.id)))
}

async fn handle_ws(mut socket: WebSocket, state: AppState, match_id: MatchId) {
    let mut rx = state.matches.subscribe_events();

    let hello = serde_json::json!({ "type": "hello", "matchId": match_id });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) if event.match_id() == match_id => {
                    let payload = serde_json::json!({
                        "ts": chrono::Utc::now().timestamp_millis(),
                        "event": event,
                    });
                    if socket.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(match_id = %match_id, skipped, "websocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!(match_id = %match_id, "websocket subscriber disconnected");
}
