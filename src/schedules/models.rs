//! Data models for schedules.

use crate::jobs::{Bag, FileFormat, JobType};
use crate::timestamps::{serialize_ms, serialize_opt_ms};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEDULE_NAME: &str = "Untitled Schedule";
pub const RECURRING_SCHEDULE_TYPE: &str = "recurring";

/// Recognized values of a schedule's `schedule_type`. Anything else is kept
/// verbatim and treated as due immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Custom,
    Unrecognized(String),
}

impl ScheduleType {
    pub fn parse(s: &str) -> Self {
        match s {
            "once" => ScheduleType::Once,
            "daily" => ScheduleType::Daily,
            "weekly" => ScheduleType::Weekly,
            "monthly" => ScheduleType::Monthly,
            "custom" => ScheduleType::Custom,
            other => ScheduleType::Unrecognized(other.to_string()),
        }
    }

    /// `recurring` defers to `repeat` for the actual cadence, daily when absent.
    pub fn resolve(schedule_type: &str, repeat: Option<&str>) -> Self {
        if schedule_type == RECURRING_SCHEDULE_TYPE {
            ScheduleType::parse(repeat.unwrap_or("daily"))
        } else {
            ScheduleType::parse(schedule_type)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
            ScheduleType::Custom => "custom",
            ScheduleType::Unrecognized(s) => s,
        }
    }
}

/// Timing portion of an export/import request, as sent by the embedded app.
///
/// `schedule_type` may also be `recurring`, in which case `repeat` names the
/// cadence (defaulting to daily).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScheduleSpec {
    pub name: Option<String>,
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    pub repeat: Option<String>,
    pub interval: Option<i64>,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
}

impl ScheduleSpec {
    pub fn resolved_type(&self) -> ScheduleType {
        ScheduleType::resolve(&self.schedule_type, self.repeat.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub id: String,
    pub shop: String,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub entity: String,
    pub action: Option<String>,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<FileFormat>,
    pub file_key: Option<String>,
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    pub interval: Option<i64>,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub enabled: bool,
    #[serde(serialize_with = "serialize_opt_ms")]
    pub last_run: Option<i64>,
    #[serde(serialize_with = "serialize_ms")]
    pub next_run: i64,
    /// Job the next firing runs instead of materializing a new one.
    pub pending_job_id: Option<String>,
    #[serde(serialize_with = "serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "serialize_ms")]
    pub updated_at: i64,
}

impl Schedule {
    pub fn kind(&self) -> ScheduleType {
        ScheduleType::parse(&self.schedule_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub shop: String,
    pub name: String,
    pub job_type: JobType,
    pub entity: String,
    pub action: Option<String>,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<FileFormat>,
    pub file_key: Option<String>,
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    pub interval: Option<i64>,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub next_run: i64,
    pub pending_job_id: Option<String>,
}

impl NewSchedule {
    pub fn with_pending_job(self, job_id: &str) -> Self {
        NewSchedule {
            pending_job_id: Some(job_id.to_string()),
            ..self
        }
    }
}

/// User edit of a schedule. Only these fields are mutable; anything else in
/// the request body is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub params: Option<Bag>,
    pub filters: Option<Bag>,
    pub schedule_type: Option<String>,
    pub schedule_time: Option<String>,
    /// Cadence of a `recurring` schedule_type; never stored itself.
    pub repeat: Option<String>,
    pub interval: Option<i64>,
    pub enabled: Option<bool>,
}

impl SchedulePatch {
    pub fn changes_timing(&self) -> bool {
        self.schedule_type.is_some()
            || self.schedule_time.is_some()
            || self.repeat.is_some()
            || self.interval.is_some()
    }

    /// Replace a `recurring` schedule_type with the cadence it stands for.
    pub fn resolve_recurring(mut self) -> Self {
        if let Some(raw) = self.schedule_type.as_deref() {
            let resolved = ScheduleType::resolve(raw, self.repeat.as_deref());
            self.schedule_type = Some(resolved.as_str().to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_type_parse() {
        assert_eq!(ScheduleType::parse("weekly"), ScheduleType::Weekly);
        assert_eq!(
            ScheduleType::parse("hourly"),
            ScheduleType::Unrecognized("hourly".to_string())
        );
        assert_eq!(ScheduleType::parse("hourly").as_str(), "hourly");
    }

    #[test]
    fn test_recurring_patch_is_resolved() {
        let patch = SchedulePatch {
            schedule_type: Some("recurring".to_string()),
            repeat: Some("weekly".to_string()),
            ..Default::default()
        }
        .resolve_recurring();
        assert_eq!(patch.schedule_type.as_deref(), Some("weekly"));

        let patch = SchedulePatch {
            schedule_type: Some("recurring".to_string()),
            ..Default::default()
        }
        .resolve_recurring();
        assert_eq!(patch.schedule_type.as_deref(), Some("daily"));

        let untouched = SchedulePatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(untouched.clone().resolve_recurring(), untouched);
    }

    #[test]
    fn test_recurring_spec_uses_repeat() {
        let spec = ScheduleSpec {
            schedule_type: "recurring".to_string(),
            repeat: Some("monthly".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.resolved_type(), ScheduleType::Monthly);

        let spec = ScheduleSpec {
            schedule_type: "recurring".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.resolved_type(), ScheduleType::Daily);
    }

    #[test]
    fn test_patch_ignores_non_allow_listed_fields() {
        let patch: SchedulePatch = serde_json::from_str(
            r#"{"name": "Nightly", "shop": "evil.myshopify.com", "next_run": 0}"#,
        )
        .unwrap();
        assert_eq!(patch.name.as_deref(), Some("Nightly"));
        assert!(!patch.changes_timing());
    }
}
