use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{AppState, error::AppError, utils::Claims, utils::success_to_api_response};

use super::lifecycle::RecruitingType;
use super::model::{
    CreateGroupRequest, Group, MemberRole, OpenRecruitingRequest, SetMemberRoleRequest,
    UpdateGroupRequest,
};
use super::policy::ensure_leader_or_admin;

/// 按ID加载小组，不存在返回404
async fn load_group(state: &AppState, group_id: i64) -> Result<Group, AppError> {
    Group::find_by_id(&state.pool, &state.redis, group_id)
        .await?
        .ok_or(AppError::NotFound("小组不存在"))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let group = Group::create(&state.pool, &req, claims.sub).await?;
    tracing::info!("group {} created by member {}", group.id, claims.sub);

    Ok((StatusCode::CREATED, success_to_api_response(group.into_info(0))))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    let count = Group::member_count(&state.pool, group_id).await?;

    Ok(success_to_api_response(group.into_info(count)))
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;
    req.validate()?;

    Group::update(&state.pool, &state.redis, group_id, &req).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    Group::delete(&state.pool, &state.redis, group_id).await?;
    tracing::info!("group {} deleted by member {}", group_id, claims.sub);

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn publish_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    // 先过一遍状态机，再落库（落库时还会拦截并发 close）
    let mut lifecycle = group.lifecycle();
    lifecycle.publish()?;

    Group::mark_published(&state.pool, &state.redis, group_id).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn open_recruiting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
    Json(req): Json<OpenRecruitingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    let recruiting_type = RecruitingType::parse(&req.recruiting_type)?;

    let mut lifecycle = group.lifecycle();
    lifecycle.open_recruiting()?;

    Group::open_recruiting(&state.pool, &state.redis, group_id, recruiting_type).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn close_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    Group::mark_closed(&state.pool, &state.redis, group_id).await?;
    tracing::info!("group {} closed by member {}", group_id, claims.sub);

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn get_group_members(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _ = load_group(&state, group_id).await?;
    let members = Group::members(&state.pool, group_id).await?;

    Ok(success_to_api_response(members))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _ = load_group(&state, group_id).await?;

    Group::leave(&state.pool, group_id, claims.sub).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, member_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    Group::remove_member(&state.pool, group_id, member_id).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn set_member_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, member_id)): Path<(i64, i64)>,
    Json(req): Json<SetMemberRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&state, group_id).await?;
    ensure_leader_or_admin(&claims, group.leader_id)?;

    let role = MemberRole::parse(&req.role)?;
    Group::set_member_role(&state.pool, group_id, member_id, role).await?;

    Ok(success_to_api_response(serde_json::json!({ "success": true })))
}
