use axum::Json;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// 统一的接口响应格式
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // 会员ID
    pub exp: i64, // 过期时间
    pub iat: i64, // 签发时间
    #[serde(default)]
    pub is_admin: bool, // 系统管理员标识
}

/// 校验认证服务签发的访问令牌
pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const INVALID_STATE: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CAPACITY_EXCEEDED: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost".into(),
            jwt_secret: "test-secret".into(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
        }
    }

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verify_token_round_trip() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": 42, "exp": now + 3600, "iat": now, "is_admin": true }),
            &config.jwt_secret,
        );

        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.is_admin);
    }

    #[test]
    fn missing_is_admin_defaults_to_false() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": 7, "exp": now + 3600, "iat": now }),
            &config.jwt_secret,
        );

        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 7);
        assert!(!claims.is_admin);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": 7, "exp": now - 3600, "iat": now - 7200 }),
            &config.jwt_secret,
        );

        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": 7, "exp": now + 3600, "iat": now }),
            "other-secret",
        );

        assert!(verify_token(&token, &config).is_err());
    }
}
