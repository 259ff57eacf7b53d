//! Shared constants for end-to-end tests

// ============================================================================
// Secrets
// ============================================================================

/// Secret the test server verifies Shopify session tokens with
pub const SHOPIFY_API_SECRET: &str = "test-shopify-secret";

/// Secret the test server verifies admin tokens with
pub const ADMIN_JWT_SECRET: &str = "test-admin-secret";

/// Bearer token accepted on worker routes
pub const WORKER_TOKEN: &str = "test-worker-token";

// ============================================================================
// Tenants
// ============================================================================

pub const SHOP_A: &str = "alpha-store.myshopify.com";

pub const SHOP_B: &str = "beta-store.myshopify.com";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Upload size limit configured on the test server (bytes)
pub const TEST_UPLOAD_MAX_BYTES: usize = 64 * 1024;
