//! Shopify webhook receiver.
//!
//! Shopify signs every delivery with `X-Shopify-Hmac-Sha256`, the base64
//! HMAC-SHA256 of the raw body keyed by the app's API secret. Unsigned or
//! mis-signed deliveries are rejected before the body is parsed.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use super::api_error::{ApiError, ApiResult};
use super::state::ServerState;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

/// Base64 signature Shopify would send for `body`.
pub fn sign_webhook(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a base64 `signature` against `body`.
pub fn verify_webhook(body: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn unauthorized() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
}

/// Shop domain from the delivery header, falling back to the payload.
fn shop_of(headers: &HeaderMap, payload: &Value) -> Option<String> {
    headers
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            ["myshopify_domain", "domain"]
                .iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        })
        .filter(|shop| !shop.is_empty())
}

async fn receive_webhook(
    State(state): State<ServerState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = headers
        .get(HMAC_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(unauthorized)?;
    if !verify_webhook(&body, signature, &state.config.shopify_api_secret) {
        warn!("Rejected webhook {} with a bad signature", topic);
        return Err(unauthorized());
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let shop = shop_of(&headers, &payload)
        .ok_or_else(|| ApiError::bad_request("missing_shop", "Shop domain is required"))?;

    match topic.as_str() {
        "app-uninstalled" | "app/uninstalled" => {
            state.tenant_store.set_active(&shop, false)?;
            info!("Store {} uninstalled the app", shop);
        }
        "shop-update" | "shop/update" => {
            // An uninstalled shop stays inactive until its next session.
            let active = state
                .tenant_store
                .get(&shop)?
                .is_some_and(|tenant| tenant.is_active);
            if active {
                state.tenant_store.touch(&shop)?;
            }
            let name = payload.get("name").and_then(Value::as_str).unwrap_or("");
            info!("Store {} updated its shop details ({})", shop, name);
        }
        other => {
            info!("Ignoring webhook {} from {}", other, shop);
        }
    }

    Ok(Json(json!({ "received": true })))
}

pub fn webhook_routes() -> Router<ServerState> {
    Router::new().route("/{topic}", post(receive_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"domain":"alpha-store.myshopify.com"}"#;
        let signature = sign_webhook(body, "secret").unwrap();
        assert!(verify_webhook(body, &signature, "secret"));
        assert!(!verify_webhook(body, &signature, "other-secret"));
        assert!(!verify_webhook(b"{}", &signature, "secret"));
    }

    #[test]
    fn test_malformed_signatures_are_rejected() {
        let body = b"{}";
        assert!(!verify_webhook(body, "not base64!", "secret"));
        assert!(!verify_webhook(body, "", "secret"));
        let signature = sign_webhook(body, "").unwrap();
        assert!(!verify_webhook(body, &signature, ""));
    }

    #[test]
    fn test_shop_falls_back_to_payload() {
        let mut headers = HeaderMap::new();
        let payload = json!({"myshopify_domain": "beta-store.myshopify.com"});
        assert_eq!(
            shop_of(&headers, &payload).as_deref(),
            Some("beta-store.myshopify.com")
        );

        headers.insert(SHOP_DOMAIN_HEADER, "alpha-store.myshopify.com".parse().unwrap());
        assert_eq!(
            shop_of(&headers, &payload).as_deref(),
            Some("alpha-store.myshopify.com")
        );
        assert_eq!(shop_of(&HeaderMap::new(), &Value::Null), None);
    }
}
