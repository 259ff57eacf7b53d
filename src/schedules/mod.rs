mod evaluator;
mod models;
mod next_run;
mod schema;
mod service;
mod store;

pub use evaluator::{
    EvaluationReport, EvaluatorCommand, EvaluatorHandle, ScheduleEvaluator, EVALUATOR_LEASE,
};
pub use models::*;
pub use next_run::{first_run, following_run, NextRunError, Timing};
pub use service::{build_schedule, CreateScheduleRequest, ScheduleService};
pub use store::{ScheduleRun, ScheduleStore, SqliteScheduleStore};
