use axum::extract::{FromRequestParts, Request, State};
use axum::http::{request::Parts, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::http::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn create_token(user_id: Uuid, jwt_secret: &str) -> Result<String, Box<dyn std::error::Error>> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)?
        .as_secs() as usize + 24 * 60 * 60; // 24 hours
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))?;
    Ok(token)
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    let user_id = Uuid::parse_str(&token_data.claims.sub)?;
    Ok(user_id)
}

/// Verified caller identity, attached to the request by [`authenticate`].
///
/// The identity provider itself is external; this service only checks the
/// token it issued and compares the subject against stored references.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().copied().ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing authenticated identity".to_string(),
        ))
    }
}

pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let auth_header = headers.get("Authorization").ok_or((
        StatusCode::UNAUTHORIZED,
        "Missing Authorization header".to_string(),
    ))?;
    let token = auth_header
        .to_str()
        .map_err(|_| (
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?
        .strip_prefix("Bearer ")
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header format".to_string(),
        ))?;
    let user_id = validate_token(token, &state.config.jwt_secret).map_err(|_| (
        StatusCode::UNAUTHORIZED,
        "Invalid or expired token".to_string(),
    ))?;
    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}
