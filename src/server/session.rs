//! Request authentication: Shopify session tokens for tenant routes, admin
//! JWTs for the operator portal and a shared bearer token for workers.

use super::api_error::ApiError;
use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

pub const ADMIN_TOKEN_TYPE: &str = "admin";

/// The tenant a request acts for.
#[derive(Debug, Clone)]
pub struct ShopSession {
    pub shop: String,
}

#[derive(Debug, Clone)]
pub struct AdminSession {
    pub subject: Option<String>,
}

/// Marker for requests carrying the worker token.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuth;

#[derive(Debug)]
pub enum SessionExtractionError {
    Unauthorized,
    Forbidden,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::Unauthorized => {
                ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
            }
            SessionExtractionError::Forbidden => {
                ApiError::new(StatusCode::FORBIDDEN, "forbidden", "Forbidden")
            }
        }
        .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SessionTokenClaims {
    dest: String,
}

#[derive(Debug, Deserialize)]
struct AdminTokenClaims {
    #[serde(rename = "type")]
    token_type: Option<String>,
    sub: Option<String>,
}

fn hs256_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Shopify sets `aud` to the app's API key, which this server does not know.
    validation.validate_aud = false;
    validation
}

/// Verifies a Shopify session token and returns the shop domain it was
/// issued for.
pub fn shop_from_session_token(token: &str, secret: &str) -> Option<String> {
    let data = decode::<SessionTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &hs256_validation(),
    )
    .map_err(|e| debug!("Rejected session token: {}", e))
    .ok()?;

    let shop = data
        .claims
        .dest
        .trim_start_matches("https://")
        .trim_end_matches('/');
    if shop.is_empty() {
        return None;
    }
    Some(shop.to_string())
}

async fn extract_bearer_token(parts: &mut Parts) -> Option<String> {
    TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, &())
        .await
        .ok()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
}

impl FromRequestParts<ServerState> for ShopSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).await.ok_or_else(|| {
            debug!("No bearer token on tenant request");
            SessionExtractionError::Unauthorized
        })?;
        let shop = shop_from_session_token(&token, &ctx.config.shopify_api_secret)
            .ok_or(SessionExtractionError::Unauthorized)?;

        if let Err(e) = ctx.tenant_store.touch(&shop) {
            // Not critical for authentication
            warn!("Failed to record activity for {}: {:#}", shop, e);
        }

        Ok(ShopSession { shop })
    }
}

impl FromRequestParts<ServerState> for AdminSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = ctx.config.admin_jwt_secret.as_deref() else {
            debug!("Admin request rejected, no admin secret configured");
            return Err(SessionExtractionError::Unauthorized);
        };
        let token = extract_bearer_token(parts)
            .await
            .ok_or(SessionExtractionError::Unauthorized)?;

        let claims = decode::<AdminTokenClaims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &hs256_validation(),
        )
        .map_err(|e| {
            debug!("Rejected admin token: {}", e);
            SessionExtractionError::Unauthorized
        })?
        .claims;

        if claims.token_type.as_deref() != Some(ADMIN_TOKEN_TYPE) {
            warn!("Admin route called with a non-admin token");
            return Err(SessionExtractionError::Forbidden);
        }

        Ok(AdminSession {
            subject: claims.sub,
        })
    }
}

impl FromRequestParts<ServerState> for WorkerAuth {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let expected = ctx
            .config
            .worker_token
            .as_deref()
            .ok_or(SessionExtractionError::Unauthorized)?;
        match extract_bearer_token(parts).await {
            Some(token) if token == expected => Ok(WorkerAuth),
            _ => Err(SessionExtractionError::Unauthorized),
        }
    }
}
