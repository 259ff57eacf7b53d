use thiserror::Error;

/// Machine-checkable reason attached to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    UnsupportedEntity,
    ReadOnlyEntity,
    MissingFileKey,
    InvalidJobType,
    InvalidFormat,
    InvalidSchedule,
    InvalidTransition,
    InvalidStatus,
    InvalidRequest,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::UnsupportedEntity => "unsupported_entity",
            ValidationCode::ReadOnlyEntity => "read_only_entity",
            ValidationCode::MissingFileKey => "missing_file_key",
            ValidationCode::InvalidJobType => "invalid_job_type",
            ValidationCode::InvalidFormat => "invalid_format",
            ValidationCode::InvalidSchedule => "invalid_schedule",
            ValidationCode::InvalidTransition => "invalid_transition",
            ValidationCode::InvalidStatus => "invalid_status",
            ValidationCode::InvalidRequest => "invalid_request",
        }
    }
}

/// Failures surfaced by the job and schedule services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        code: ValidationCode,
        message: String,
    },

    /// Absent, or owned by another tenant. The two cases are deliberately
    /// indistinguishable to callers.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidState(String),

    #[error("Dependency failure: {0}")]
    Dependency(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(code: ValidationCode, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation { code, .. } => code.as_str(),
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::Dependency(_) => "dependency_failure",
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
