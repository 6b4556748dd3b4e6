use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 认证中间件：校验 Bearer 令牌并把 Claims 注入请求扩展
///
/// 令牌由外部认证服务签发，这里只做校验和会员ID解析。
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or(AppError::AuthFailed("缺少访问令牌"))?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("token verification failed: {}", e);
        AppError::AuthFailed("访问令牌无效或已过期")
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
