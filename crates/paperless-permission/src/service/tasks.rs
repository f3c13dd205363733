//! Background work the service hands off without waiting for it.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PermissionError;
use crate::ids::{SlipId, TripId};
use crate::slips::OutboundEmail;
use crate::store::PermissionStore;

use super::{GenerationSummary, PermissionSlipService};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum BackgroundTask {
    /// Reconcile slips for a trip, optionally emailing the outstanding ones.
    GeneratePermissionSlips { trip: TripId, notify: bool },
    SendTripNotifications { trip: TripId },
    /// Top up a slip's links and email every party again.
    ResendPermissionSlip { slip: SlipId },
}

/// Hand-off point to whatever runs background tasks.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("task queue unavailable: {0}")]
    Unavailable(String),
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    /// Sends every message, returning how many were accepted.
    fn send_mass(&self, emails: &[OutboundEmail]) -> Result<usize, MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub generated: Option<GenerationSummary>,
    pub emails_sent: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Executes queued tasks against the service and a mailer.
pub struct TaskRunner<S, Q, M> {
    service: Arc<PermissionSlipService<S, Q>>,
    mailer: Arc<M>,
}

impl<S, Q, M> TaskRunner<S, Q, M>
where
    S: PermissionStore + 'static,
    Q: TaskQueue + 'static,
    M: Mailer + 'static,
{
    pub fn new(service: Arc<PermissionSlipService<S, Q>>, mailer: Arc<M>) -> Self {
        Self { service, mailer }
    }

    pub fn run(&self, task: BackgroundTask) -> Result<TaskOutcome, TaskError> {
        info!(?task, "running background task");
        match task {
            BackgroundTask::GeneratePermissionSlips { trip, notify } => {
                let summary = self.service.generate_permission_slips(trip, false)?;
                let emails_sent = if notify {
                    let emails = self.service.trip_notification_batch(trip)?;
                    self.deliver(&emails)?
                } else {
                    0
                };
                Ok(TaskOutcome {
                    generated: Some(summary),
                    emails_sent,
                })
            }
            BackgroundTask::SendTripNotifications { trip } => {
                let emails = self.service.trip_notification_batch(trip)?;
                Ok(TaskOutcome {
                    generated: None,
                    emails_sent: self.deliver(&emails)?,
                })
            }
            BackgroundTask::ResendPermissionSlip { slip } => {
                self.service.generate_slip_links(slip)?;
                let emails = self.service.slip_notification_batch(slip)?;
                Ok(TaskOutcome {
                    generated: None,
                    emails_sent: self.deliver(&emails)?,
                })
            }
        }
    }

    fn deliver(&self, emails: &[OutboundEmail]) -> Result<usize, TaskError> {
        if emails.is_empty() {
            return Ok(0);
        }
        let sent = self.mailer.send_mass(emails)?;
        self.service.record_sent(emails, Utc::now())?;
        Ok(sent)
    }
}
