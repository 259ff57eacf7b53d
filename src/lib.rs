//! Shopify Bulk Manager server library
//!
//! Job lifecycle, scheduling and the HTTP surface of the bulk manager,
//! exposed as a library for the binary and the integration tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pagination;
pub mod queue;
pub mod schedules;
pub mod server;
pub mod sqlite_persistence;
pub mod tenants;
pub mod timestamps;
pub mod uploads;

pub use server::{make_app, run_server, RequestsLoggingLevel, ServerComponents, ServerConfig};
