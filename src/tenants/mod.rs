//! Registry of connected shops.

mod schema;
mod sqlite_tenant_store;

pub use sqlite_tenant_store::SqliteTenantStore;

use crate::timestamps::serialize_ms;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tenant {
    pub shop: String,
    pub is_active: bool,
    #[serde(serialize_with = "serialize_ms")]
    pub first_seen_at: i64,
    #[serde(serialize_with = "serialize_ms")]
    pub last_seen_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    pub total_stores: usize,
    pub active_stores: usize,
    pub inactive_stores: usize,
}

pub trait TenantStore: Send + Sync {
    /// Record activity for `shop`, registering it on first sight.
    fn touch(&self, shop: &str) -> Result<Tenant>;

    fn get(&self, shop: &str) -> Result<Option<Tenant>>;

    /// Mark a shop as (un)installed.
    fn set_active(&self, shop: &str, active: bool) -> Result<usize>;

    fn stats(&self) -> Result<TenantStats>;
}
