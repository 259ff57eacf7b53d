//! The caller's own shop record.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use super::api_error::{ApiError, ApiResult};
use super::session::ShopSession;
use super::state::{GuardedTenantStore, ServerState};
use crate::tenants::Tenant;

fn own_store(
    session: &ShopSession,
    tenants: &GuardedTenantStore,
    shop: &str,
) -> ApiResult<Tenant> {
    if shop != session.shop {
        return Err(ApiError::not_found("not_found", "Store not found"));
    }
    tenants
        .get(shop)?
        .ok_or_else(|| ApiError::not_found("not_found", "Store not found"))
}

async fn list_stores(
    session: ShopSession,
    State(tenants): State<GuardedTenantStore>,
) -> ApiResult<impl IntoResponse> {
    let stores: Vec<Tenant> = tenants.get(&session.shop)?.into_iter().collect();
    Ok(Json(json!({ "stores": stores })))
}

async fn get_store(
    session: ShopSession,
    State(tenants): State<GuardedTenantStore>,
    Path(shop): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let store = own_store(&session, &tenants, &shop)?;
    Ok(Json(json!({ "store": store })))
}

/// Marks the shop as uninstalled. Its next authenticated request
/// reactivates it.
async fn deactivate_store(
    session: ShopSession,
    State(tenants): State<GuardedTenantStore>,
    Path(shop): Path<String>,
) -> ApiResult<impl IntoResponse> {
    own_store(&session, &tenants, &shop)?;
    tenants.set_active(&shop, false)?;
    info!("Deactivated store {}", shop);
    Ok(Json(json!({ "message": "Store deactivated" })))
}

pub fn store_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_stores))
        .route("/{shop}", get(get_store).delete(deactivate_store))
}
