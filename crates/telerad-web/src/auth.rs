//! 用户认证
//!
//! 凭证签发在系统外部完成，这里只做JWT校验: 解出主体后回读用户表，
//! 被停用的账号即使持有未过期的token也会被拒绝。

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use telerad_core::{Principal, Result, TeleradError, User};
use telerad_database::StudyQueries;
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,             // 用户ID
    pub role: String,            // 角色
    pub centre_id: Option<Uuid>, // 所属中心
    pub exp: usize,              // 过期时间
    pub iat: usize,              // 签发时间
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    token_expiry_hours: i64,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret,
            token_expiry_hours: 24,
        }
    }

    /// 为用户签发JWT token
    ///
    /// 凭证发放由外部身份系统负责，服务本身不暴露登录接口；
    /// 此方法供运维脚本和测试签发token使用。
    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.token_expiry_hours);

        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.as_str().to_string(),
            centre_id: user.centre_id,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| TeleradError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// 校验token并解出claims，过期或签名不符均拒绝
    pub fn decode_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| TeleradError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// 认证中间件
///
/// 解析Bearer token、回读用户表确认账号仍然有效，并把操作主体
/// 写入请求扩展供处理器取用。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(ApiError(TeleradError::Unauthorized(
                "Missing bearer token".to_string(),
            )));
        }
    };

    let claims = state.auth.decode_token(token)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| TeleradError::Unauthorized("Invalid token subject".to_string()))?;

    // token有效期内用户可能被停用，以用户表为准
    let queries = StudyQueries::new(&state.db);
    let user = queries
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| TeleradError::Unauthorized("Unknown user".to_string()))?;

    if !user.is_active {
        return Err(ApiError(TeleradError::Unauthorized(
            "Account is disabled".to_string(),
        )));
    }

    request.extensions_mut().insert(Principal {
        id: user.id,
        role: user.role,
        centre_id: user.centre_id,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telerad_core::Role;

    fn sample_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "tech@example.com".to_string(),
            name: "Test Technician".to_string(),
            role,
            centre_id: Some(Uuid::new_v4()),
            phone: None,
            is_active: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_decode_round_trip() {
        let service = AuthService::new("test-secret".to_string());
        let user = sample_user(Role::Technician);

        let token = service.issue_token(&user).unwrap();
        let claims = service.decode_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "technician");
        assert_eq!(claims.centre_id, user.centre_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = AuthService::new("secret-a".to_string());
        let verifier = AuthService::new("secret-b".to_string());
        let token = issuer.issue_token(&sample_user(Role::Admin)).unwrap();

        assert!(verifier.decode_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = AuthService::new("test-secret".to_string());
        assert!(service.decode_token("not.a.token").is_err());
        assert!(service.decode_token("").is_err());
    }
}
