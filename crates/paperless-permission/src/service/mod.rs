//! Trip, slip and signature operations over a [`PermissionStore`].

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::PermissionError;
use crate::ids::{SlipId, StudentId, TripId};
use crate::roster::{reconcile_roster, ReconcileSummary, RosterSnapshot};
use crate::slips::{
    render_email, OutboundEmail, PermissionSlip, SlipSettings, SlipStatusRow, TripStatusReport,
};
use crate::store::{atomic, PermissionStore};
use crate::trips::{audience, FieldTrip, TripDraft};

mod generation;
mod signatures;
pub mod tasks;

#[cfg(test)]
mod tests;

pub use generation::GenerationSummary;
pub use tasks::{
    BackgroundTask, DispatchError, MailError, Mailer, TaskError, TaskOutcome, TaskQueue,
    TaskRunner,
};

/// Service owning the trip state machine, slip generation and signing.
pub struct PermissionSlipService<S, Q> {
    store: Arc<S>,
    tasks: Arc<Q>,
    settings: SlipSettings,
}

impl<S, Q> PermissionSlipService<S, Q>
where
    S: PermissionStore + 'static,
    Q: TaskQueue + 'static,
{
    pub fn new(store: Arc<S>, tasks: Arc<Q>, settings: SlipSettings) -> Self {
        Self {
            store,
            tasks,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &SlipSettings {
        &self.settings
    }

    /// Persist a NEW trip and queue speculative slip generation.
    pub fn create_trip(&self, draft: TripDraft) -> Result<FieldTrip, PermissionError> {
        draft.validate()?;
        let trip = self.store.insert_trip(&draft)?;
        info!(trip = %trip.id, name = %trip.details.name, "field trip created");
        self.request_generation(trip.id, false);
        Ok(trip)
    }

    /// Replace a trip's details, audience and coordinators.
    pub fn update_trip(
        &self,
        id: TripId,
        draft: TripDraft,
        force: bool,
    ) -> Result<FieldTrip, PermissionError> {
        draft.validate()?;
        let trip = atomic(self.store.as_ref(), |tx| {
            let mut trip = tx.trip(id)?;
            trip.ensure_mutable(force)?;
            trip.apply_draft(draft.clone());
            tx.save_trip(&trip)?;
            Ok(trip)
        })?;
        info!(trip = %id, force, "field trip updated");
        if !trip.is_archived() {
            self.request_generation(id, false);
        }
        Ok(trip)
    }

    pub fn trip(&self, id: TripId) -> Result<FieldTrip, PermissionError> {
        Ok(self.store.trip(id)?)
    }

    pub fn trips(&self, include_hidden: bool) -> Result<Vec<FieldTrip>, PermissionError> {
        Ok(self.store.list_trips(include_hidden)?)
    }

    /// Visible trips coordinated by the faculty member with this email.
    pub fn trips_for_coordinator(&self, email: &str) -> Result<Vec<FieldTrip>, PermissionError> {
        let email = email.trim();
        let mut matching = Vec::new();
        for trip in self.store.list_trips(false)? {
            let mut coordinates = false;
            for faculty in &trip.faculty {
                if self.store.faculty(*faculty)?.person.email.eq_ignore_ascii_case(email) {
                    coordinates = true;
                    break;
                }
            }
            if coordinates {
                matching.push(trip);
            }
        }
        Ok(matching)
    }

    /// NEW -> APPROVED. Returns whether the status changed.
    pub fn approve(&self, id: TripId) -> Result<bool, PermissionError> {
        let changed = atomic(self.store.as_ref(), |tx| {
            let mut trip = tx.trip(id)?;
            if !trip.approve() {
                return Ok(false);
            }
            tx.save_trip(&trip)?;
            Ok(true)
        })?;
        if changed {
            info!(trip = %id, "field trip approved");
        }
        Ok(changed)
    }

    /// APPROVED -> RELEASED together with slip generation. Notifications are
    /// left to the caller.
    pub fn release(&self, id: TripId) -> Result<GenerationSummary, PermissionError> {
        let salt = self.settings.link_salt.as_str();
        let summary = atomic(self.store.as_ref(), |tx| {
            let mut trip = tx.trip(id)?;
            trip.release()?;
            let summary = generation::generate_for_trip(tx, &trip, salt)?;
            tx.save_trip(&trip)?;
            Ok(summary)
        })?;
        info!(
            trip = %id,
            slips_created = summary.slips_created,
            links_created = summary.links_created,
            "field trip released"
        );
        Ok(summary)
    }

    pub fn archive(&self, id: TripId) -> Result<FieldTrip, PermissionError> {
        let trip = atomic(self.store.as_ref(), |tx| {
            let mut trip = tx.trip(id)?;
            trip.archive();
            tx.save_trip(&trip)?;
            Ok(trip)
        })?;
        info!(trip = %id, "field trip archived");
        Ok(trip)
    }

    pub fn resolve_audience(&self, id: TripId) -> Result<BTreeSet<StudentId>, PermissionError> {
        let trip = self.store.trip(id)?;
        Ok(audience::resolve_audience(self.store.as_ref(), &trip)?)
    }

    /// One message per link of the slip. Nothing is sent or stamped.
    pub fn render_notification_emails(
        &self,
        slip: SlipId,
    ) -> Result<Vec<OutboundEmail>, PermissionError> {
        let slip = self.store.slip(slip)?;
        let trip = self.store.trip(slip.field_trip)?;
        self.render_for(&trip, &slip)
    }

    /// Emails for every incomplete slip of a released trip.
    pub fn trip_notification_batch(
        &self,
        trip: TripId,
    ) -> Result<Vec<OutboundEmail>, PermissionError> {
        let trip = self.store.trip(trip)?;
        trip.ensure_notifiable()?;
        let mut emails = Vec::new();
        for slip in self.store.slips_for_trip(trip.id)? {
            if !slip.is_complete() {
                emails.extend(self.render_for(&trip, &slip)?);
            }
        }
        Ok(emails)
    }

    /// Emails for one slip, or none once it is complete.
    pub fn slip_notification_batch(
        &self,
        slip: SlipId,
    ) -> Result<Vec<OutboundEmail>, PermissionError> {
        let slip = self.store.slip(slip)?;
        let trip = self.store.trip(slip.field_trip)?;
        trip.ensure_notifiable()?;
        if slip.is_complete() {
            return Ok(Vec::new());
        }
        self.render_for(&trip, &slip)
    }

    /// Stamps `last_sent` on the link behind each delivered email.
    pub fn record_sent(
        &self,
        emails: &[OutboundEmail],
        at: DateTime<Utc>,
    ) -> Result<(), PermissionError> {
        atomic(self.store.as_ref(), |tx| {
            for email in emails {
                tx.mark_sent(email.link, at)?;
            }
            Ok(())
        })
    }

    pub fn trip_status(&self, id: TripId) -> Result<TripStatusReport, PermissionError> {
        let trip = self.store.trip(id)?;
        let mut rows = Vec::new();
        for slip in self.store.slips_for_trip(id)? {
            let student = self.store.student(slip.student)?;
            let guardian_name = match &slip.guardian_signature {
                Some(signature) => Some(self.store.guardian(signature.guardian)?.person.full_name()),
                None => None,
            };
            rows.push(SlipStatusRow {
                slip: slip.id,
                student_person_id: student.person.person_id.clone(),
                student_name: student.person.full_name(),
                grade_level: student.grade_level,
                due_date: slip.effective_due_date(&trip),
                student_signature: slip.student_signature.as_ref().map(|s| s.name.clone()),
                student_signed_at: slip.student_signature.as_ref().map(|s| s.signed_at),
                guardian_name,
                guardian_signature: slip.guardian_signature.as_ref().map(|g| g.name.clone()),
                guardian_signed_at: slip.guardian_signature.as_ref().map(|g| g.signed_at),
                completed_at: slip.completed_at(),
                flagged_for_review: slip.flagged_for_review,
            });
        }
        Ok(TripStatusReport::new(
            trip.id,
            trip.details.name.clone(),
            trip.status,
            rows,
        ))
    }

    pub fn apply_roster(&self, snapshot: &RosterSnapshot) -> Result<ReconcileSummary, PermissionError> {
        reconcile_roster(self.store.as_ref(), snapshot)
    }

    pub fn request_generation(&self, trip: TripId, notify: bool) {
        self.dispatch(BackgroundTask::GeneratePermissionSlips { trip, notify });
    }

    pub fn request_trip_notifications(&self, trip: TripId) {
        self.dispatch(BackgroundTask::SendTripNotifications { trip });
    }

    pub fn request_resend(&self, slip: SlipId) {
        self.dispatch(BackgroundTask::ResendPermissionSlip { slip });
    }

    fn dispatch(&self, task: BackgroundTask) {
        if let Err(err) = self.tasks.enqueue(task.clone()) {
            warn!(?task, error = %err, "failed to queue background task");
        }
    }

    fn render_for(
        &self,
        trip: &FieldTrip,
        slip: &PermissionSlip,
    ) -> Result<Vec<OutboundEmail>, PermissionError> {
        let student = self.store.student(slip.student)?;
        let mut emails = Vec::new();
        for link in self.store.links_for_slip(slip.id)? {
            let guardian = match link.subject.guardian() {
                Some(id) => Some(self.store.guardian(id)?),
                None => None,
            };
            emails.push(render_email(
                &self.settings,
                trip,
                slip,
                &student,
                &link,
                guardian.as_ref(),
            ));
        }
        Ok(emails)
    }
}
