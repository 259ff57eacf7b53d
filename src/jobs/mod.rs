mod models;
mod schema;
mod service;
mod store;

pub use models::*;
pub use service::{publish_job, JobPage, JobService, JobTemplate, SubmitRequest, Submission};
pub use store::{JobStore, SqliteJobStore};
