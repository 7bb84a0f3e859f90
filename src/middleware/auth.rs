use crate::common::response::ApiError;
use crate::middleware::role::Role;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Option<Role>,
}

impl CurrentUser {
    pub fn is_privileged(&self) -> bool {
        self.role.is_some_and(|r| r.is_privileged())
    }
}

impl From<&TokenClaims> for CurrentUser {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            id: claims.sub,
            role: Role::parse(&claims.role),
        }
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

pub fn decode_claims(token: &str, secret: &str) -> Option<TokenClaims> {
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(&req) else {
        return Err(ApiError(
            "Unauthorized: Missing or invalid token".to_string(),
            StatusCode::UNAUTHORIZED,
        ));
    };

    let is_blocked = state.redis.is_token_blocked(&token).await.map_err(|e| {
        tracing::error!("Redis error while checking token: {}", e);
        ApiError(
            "Internal Server Error: Redis unavailable".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    })?;

    if is_blocked {
        return Err(ApiError(
            "Unauthorized: Token is blocked/revoked".to_string(),
            StatusCode::UNAUTHORIZED,
        ));
    }

    let claims = decode_claims(&token, &state.config.jwt_secret).ok_or_else(|| {
        ApiError(
            "Unauthorized: Invalid token signature".to_string(),
            StatusCode::UNAUTHORIZED,
        )
    })?;

    req.extensions_mut().insert(CurrentUser::from(&claims));
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, role: &str) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let now = jsonwebtoken::get_current_timestamp() as usize;
        let claims = TokenClaims {
            sub,
            role: role.to_string(),
            exp: now + 600,
            iat: now,
        };
        let jwt = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (sub, jwt)
    }

    #[test]
    fn decodes_valid_token_into_current_user() {
        let (sub, jwt) = token("s3cret", "ADMIN");
        let claims = decode_claims(&jwt, "s3cret").unwrap();
        let user = CurrentUser::from(&claims);

        assert_eq!(user.id, sub);
        assert!(user.is_privileged());
    }

    #[test]
    fn rejects_wrong_secret() {
        let (_, jwt) = token("s3cret", "candidate");
        assert!(decode_claims(&jwt, "other").is_none());
    }
}
