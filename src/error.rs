use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// 业务错误类型
///
/// 404/400/403 必须可区分：资源不存在、状态不允许、无权限是三种
/// 不同的客户端可见结果，人数已满单独一类，便于客户端提示换组。
#[derive(Debug)]
pub enum AppError {
    NotFound(&'static str),
    InvalidState(&'static str),
    CapacityExceeded,
    Validation(String),
    AuthFailed(&'static str),
    PermissionDenied,
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(format!("database error: {}", e))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Internal(format!("redis error: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg.into()),
            AppError::InvalidState(msg) => (
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_STATE,
                msg.into(),
            ),
            AppError::CapacityExceeded => (
                StatusCode::BAD_REQUEST,
                error_codes::CAPACITY_EXCEEDED,
                "小组成员已满，无法加入".into(),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg)
            }
            AppError::AuthFailed(msg) => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                msg.into(),
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                "没有操作该小组的权限".into(),
            ),
            AppError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "服务器内部错误".into(),
                )
            }
        };

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError::NotFound("小组不存在").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_state_and_capacity_map_to_400() {
        let resp = AppError::InvalidState("该加入申请已处理").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::CapacityExceeded.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn permission_denied_maps_to_403() {
        let resp = AppError::PermissionDenied.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn auth_failed_maps_to_401() {
        let resp = AppError::AuthFailed("缺少访问令牌").into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_maps_to_500() {
        let resp = AppError::Internal("boom".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
