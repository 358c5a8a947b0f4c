//! Bearer-token auth gate.
//!
//! Issues HS256-signed tokens carrying the account id and a short expiry,
//! and validates them on every protected request. Validation fails closed:
//! a missing, malformed, unsigned, or expired token is rejected with 401,
//! never partially trusted.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::users::{self, User};

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id, as a string per JWT convention.
    pub sub: String,
    /// Unique token id.
    pub jti: String,
    /// Issued-at, epoch seconds.
    pub iat: i64,
    /// Expiry, epoch seconds.
    pub exp: i64,
}

/// The authenticated account, inserted into request extensions by
/// [`require_auth`] and read by protected handlers.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Signs a token for the given account, expiring `ttl_minutes` from now.
pub fn issue_token(secret: &str, ttl_minutes: i64, user_id: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
}

/// Validates signature and expiry; any failure maps to `Unauthorized`.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    // No leeway: a token expired by one second is expired.
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Authentication middleware for all protected routes.
///
/// Reads `Authorization: Bearer <token>`, validates the token, resolves it
/// to an existing active account, and inserts [`CurrentUser`] into the
/// request extensions before passing the request on.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let claims = decode_token(&state.config.jwt_secret, token)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let user = {
        let conn = state.db.lock().unwrap();
        users::find_by_id(&conn, user_id)?
    };

    let user = match user {
        Some(user) if user.is_active => user,
        _ => {
            log::warn!("token resolved to missing or inactive user_id={}", user_id);
            return Err(AppError::Unauthorized(
                "Invalid or expired token".to_string(),
            ));
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
