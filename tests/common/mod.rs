//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, SHOP_A};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_list_jobs() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::for_shop(server.base_url.clone(), SHOP_A);
//!
//!     let response = client.list_jobs().await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

#![allow(dead_code)]

mod client;
mod constants;
mod server;

pub use client::{admin_token, session_token, TestClient};
pub use constants::*;
pub use server::TestServer;
