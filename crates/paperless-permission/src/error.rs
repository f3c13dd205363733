use std::fmt;

use crate::config::ConfigError;
use crate::ids::TripId;
use crate::service::{MailError, TaskError};
use crate::slips::InvalidLinkSubject;
use crate::store::RepositoryError;
use crate::telemetry::TelemetryError;
use crate::trips::TripStatus;

/// Failures raised by the trip, slip and signature operations.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("cannot move trip from {from} to {to}")]
    InvalidStateTransition { from: TripStatus, to: TripStatus },
    #[error("trip {trip} is archived")]
    ArchivedTrip { trip: TripId },
    #[error(transparent)]
    InvalidLinkSubject(#[from] InvalidLinkSubject),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("notifications are not permitted while a trip is {status}")]
    NotificationsNotPermitted { status: TripStatus },
}

impl PermissionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound { .. }))
    }

    /// One-line message for operators, phrased for the trip list.
    pub fn friendly_message(&self) -> String {
        match self {
            Self::InvalidStateTransition { to, .. } => {
                format!("Cannot {} this trip.", to.verb())
            }
            Self::ArchivedTrip { .. } => {
                "This trip is archived. Re-run with --force to change it anyway.".to_string()
            }
            Self::NotificationsNotPermitted { .. } => {
                "Emails can only be sent for released trips.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Rejected input. Nothing is written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a name is required")]
    MissingName,
    #[error("name must be at most {max} characters")]
    NameTooLong { max: usize },
    #[error("consent is required")]
    MissingConsent,
    #[error("this permission slip has already been completed")]
    SlipComplete,
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("a trip needs at least one coordinator")]
    MissingCoordinator,
    #[error("a trip cannot end before it starts")]
    EndsBeforeStart,
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Permission(PermissionError),
    Snapshot(serde_json::Error),
    Export(csv::Error),
    Mail(MailError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Permission(err) => write!(f, "{}", err.friendly_message()),
            AppError::Snapshot(err) => write!(f, "invalid json: {}", err),
            AppError::Export(err) => write!(f, "csv export failed: {}", err),
            AppError::Mail(err) => write!(f, "mail delivery failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Permission(err) => Some(err),
            AppError::Snapshot(err) => Some(err),
            AppError::Export(err) => Some(err),
            AppError::Mail(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PermissionError> for AppError {
    fn from(value: PermissionError) -> Self {
        Self::Permission(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Permission(PermissionError::Repository(value))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Snapshot(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Export(value)
    }
}

impl From<TaskError> for AppError {
    fn from(value: TaskError) -> Self {
        match value {
            TaskError::Permission(err) => Self::Permission(err),
            TaskError::Mail(err) => Self::Mail(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_render_friendly_messages() {
        let err = PermissionError::InvalidStateTransition {
            from: TripStatus::New,
            to: TripStatus::Released,
        };
        assert_eq!(err.friendly_message(), "Cannot release this trip.");
        assert_eq!(err.to_string(), "cannot move trip from New to Released");

        let app: AppError = PermissionError::ArchivedTrip { trip: TripId(4) }.into();
        assert!(app.to_string().contains("archived"));
    }
}
