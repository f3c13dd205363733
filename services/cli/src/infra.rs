use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use paperless_permission::error::AppError;
use paperless_permission::service::{
    BackgroundTask, DispatchError, MailError, Mailer, TaskOutcome, TaskQueue, TaskRunner,
};
use paperless_permission::slips::OutboundEmail;
use paperless_permission::store::SqliteStore;
use paperless_permission::PermissionSlipService;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub(crate) type CliService = PermissionSlipService<SqliteStore, ChannelTaskQueue>;

/// Queue backed by an in-process channel. Tasks run once the command returns.
pub(crate) struct ChannelTaskQueue {
    sender: mpsc::UnboundedSender<BackgroundTask>,
}

impl ChannelTaskQueue {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<BackgroundTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), DispatchError> {
        self.sender
            .send(task)
            .map_err(|err| DispatchError::Unavailable(err.to_string()))
    }
}

/// Appends each message as one JSON line to the outbox file, or logs it when
/// no outbox is configured.
pub(crate) struct OutboxMailer {
    outbox: Option<PathBuf>,
}

impl OutboxMailer {
    pub(crate) fn new(outbox: Option<PathBuf>) -> Self {
        Self { outbox }
    }

    fn append(&self, path: &Path, emails: &[OutboundEmail]) -> Result<(), MailError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| transport(path, err))?;
        }
        let mut buffer = Vec::new();
        for email in emails {
            serde_json::to_writer(&mut buffer, email)
                .map_err(|err| MailError::Transport(err.to_string()))?;
            buffer.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| transport(path, err))?;
        file.write_all(&buffer).map_err(|err| transport(path, err))
    }
}

impl Mailer for OutboxMailer {
    fn send_mass(&self, emails: &[OutboundEmail]) -> Result<usize, MailError> {
        match &self.outbox {
            Some(path) => {
                self.append(path, emails)?;
                info!(count = emails.len(), outbox = %path.display(), "emails written to outbox");
            }
            None => {
                for email in emails {
                    info!(
                        to = ?email.to,
                        subject = %email.subject,
                        "email not delivered, no outbox configured"
                    );
                }
            }
        }
        Ok(emails.len())
    }
}

fn transport(path: &Path, err: std::io::Error) -> MailError {
    MailError::Transport(format!("{}: {err}", path.display()))
}

/// Runs every queued task on the blocking pool, in order. A failing task is
/// logged and the remaining tasks still run; the last failure is returned.
pub(crate) async fn drain(
    service: &Arc<CliService>,
    mailer: &Arc<OutboxMailer>,
    pending: &mut mpsc::UnboundedReceiver<BackgroundTask>,
) -> Result<Vec<TaskOutcome>, AppError> {
    let mut outcomes = Vec::new();
    let mut failure = None;
    while let Ok(task) = pending.try_recv() {
        let runner = TaskRunner::new(service.clone(), mailer.clone());
        let joined = tokio::task::spawn_blocking(move || runner.run(task))
            .await
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                warn!(error = %err, "background task failed");
                failure = Some(err);
            }
        }
    }
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(outcomes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperless_permission::{SlipId, SlipLinkId, TripId};

    fn email(link: i64) -> OutboundEmail {
        OutboundEmail {
            slip: SlipId(1),
            link: SlipLinkId(link),
            subject: "New Permission Slip for Museum Visit".to_string(),
            body: "Body".to_string(),
            from: "trips@example.test".to_string(),
            to: vec!["ada@students.example.test".to_string()],
        }
    }

    #[test]
    fn outbox_appends_one_line_per_email() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mail").join("outbox.jsonl");
        let mailer = OutboxMailer::new(Some(path.clone()));

        assert_eq!(mailer.send_mass(&[email(1), email(2)]).expect("sent"), 2);
        assert_eq!(mailer.send_mass(&[email(3)]).expect("sent"), 1);

        let written = fs::read_to_string(&path).expect("outbox");
        let lines: Vec<OutboundEmail> = written
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], email(3));
    }

    #[test]
    fn mailer_without_outbox_accepts_everything() {
        let mailer = OutboxMailer::new(None);
        assert_eq!(mailer.send_mass(&[email(1)]).expect("logged"), 1);
    }

    #[test]
    fn closed_channel_reports_dispatch_failure() {
        let (queue, receiver) = ChannelTaskQueue::new();
        drop(receiver);
        let err = queue
            .enqueue(BackgroundTask::SendTripNotifications { trip: TripId(1) })
            .expect_err("receiver dropped");
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }
}
