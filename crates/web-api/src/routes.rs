//! HTTP 路由
//!
//! 除健康检查外的入口都要求携带有效且未吊销的 JWT。
//! WebSocket 在协议升级之前完成鉴权，未通过的请求拿到
//! HTTP 错误而不是一条立刻被关闭的连接。

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use application::ApplicationError;
use application::PromoterReport;
use domain::{User, UserId};

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/system/queue/process", post(process_queue))
        .route("/auth/logout", post(logout))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// WebSocket 升级入口。token 可放在查询参数或 Authorization 头。
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = match query.token {
        Some(token) => token,
        None => bearer_token(&headers)?.to_string(),
    };
    let user = authenticate(&state, &token).await?;

    Ok(ws.on_upgrade(move |socket| ws_connection::handle(socket, state, user)))
}

/// 手动触发一轮队列提升，返回运行报告。
async fn process_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PromoterReport>, ApiError> {
    let token = bearer_token(&headers)?;
    authenticate(&state, token).await?;

    let report = state.promoter.promote_due_messages().await?;
    Ok(Json(report))
}

/// 登出：将令牌加入黑名单直到其自然过期。
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    let claims = state.jwt_service.verify_token(token)?;

    let ttl = claims.remaining_ttl_secs(state.clock.now());
    if ttl > 0 {
        state.token_blacklist.blacklist(token, ttl).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// 吊销检查先于签名验证，被登出的令牌直接拒绝。
async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let revoked = state
        .token_blacklist
        .is_blacklisted(token)
        .await
        .map_err(ApiError::from)?;
    if revoked {
        return Err(ApiError::unauthorized("token has been revoked"));
    }

    let claims = state.jwt_service.verify_token(token)?;
    let user = state
        .users
        .find_by_id(UserId::from(claims.user_id))
        .await
        .map_err(|e| ApiError::from(ApplicationError::from(e)))?
        .ok_or_else(|| ApiError::unauthorized("unknown user"))?;
    Ok(user)
}
