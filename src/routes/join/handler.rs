use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppState, error::AppError, utils::Claims, utils::success_to_api_response};

use super::model::JoinRequest;
use crate::routes::group::model::Group;
use crate::routes::group::policy::ensure_leader_or_admin;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

async fn load_group(state: &AppState, group_id: i64) -> Result<Group, AppError> {
    Group::find_by_id(&state.pool, &state.redis, group_id)
        .await?
        .ok_or(AppError::NotFound("小组不存在"))
}

#[axum::debug_handler]
pub async fn create_join_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;

    let request = JoinRequest::create(&state.pool, &group, claims.sub).await?;
    tracing::info!(
        "member {} requested to join group {}",
        claims.sub,
        group_id
    );

    Ok(success_to_api_response(serde_json::json!({
        "request_id": request.id
    })))
}

#[axum::debug_handler]
pub async fn list_join_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    let page = query.page.unwrap_or(0);
    if page < 0 {
        return Err(AppError::Validation("页码不能为负数".into()));
    }

    let requests = JoinRequest::list(&state.pool, group_id, page).await?;

    Ok(success_to_api_response(requests))
}

#[axum::debug_handler]
pub async fn approve_join_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, request_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    JoinRequest::approve(&state.pool, group_id, request_id).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn reject_join_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, request_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    JoinRequest::reject(&state.pool, group_id, request_id).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}
