use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::error::PermissionError;
use crate::ids::SlipId;
use crate::slips::{PermissionSlip, SignatureSubmission, SignerRole, SlipPage};
use crate::store::{atomic, PermissionStore};

use super::{PermissionSlipService, TaskQueue};

impl<S, Q> PermissionSlipService<S, Q>
where
    S: PermissionStore + 'static,
    Q: TaskQueue + 'static,
{
    /// Signs the slip behind `token` as whoever the link addresses.
    pub fn submit_signature(
        &self,
        token: &str,
        submission: &SignatureSubmission,
    ) -> Result<PermissionSlip, PermissionError> {
        self.submit_signature_at(token, submission, Utc::now())
    }

    /// [`Self::submit_signature`] with an explicit signing time.
    pub fn submit_signature_at(
        &self,
        token: &str,
        submission: &SignatureSubmission,
        at: DateTime<Utc>,
    ) -> Result<PermissionSlip, PermissionError> {
        let name = submission.validated_name()?;
        let (slip, role) = atomic(self.store.as_ref(), |tx| {
            let link = tx.link_by_token(token)?;
            let mut slip = tx.slip(link.permission_slip)?;
            tx.trip(slip.field_trip)?.ensure_mutable(false)?;

            let role = SignerRole::from(link.subject);
            slip.apply_signature(role, name.clone(), at)?;
            tx.save_slip(&slip)?;
            Ok((slip, role))
        })?;
        info!(slip = %slip.id, ?role, complete = slip.is_complete(), "signature recorded");
        Ok(slip)
    }

    /// Read model for the signing page of one link.
    pub fn slip_page(&self, token: &str) -> Result<SlipPage, PermissionError> {
        let link = self.store.link_by_token(token)?;
        let slip = self.store.slip(link.permission_slip)?;
        let trip = self.store.trip(slip.field_trip)?;
        let student = self.store.student(slip.student)?;
        let guardian_name = match &slip.guardian_signature {
            Some(signature) => Some(self.store.guardian(signature.guardian)?.person.full_name()),
            None => None,
        };
        Ok(SlipPage::build(
            &trip,
            &slip,
            link.subject.into(),
            student.person.full_name(),
            guardian_name,
        ))
    }

    /// Clears both signatures, the signing guardian and the review flag.
    pub fn reset_slip(&self, slip: SlipId) -> Result<PermissionSlip, PermissionError> {
        let slip = self.update_slip(slip, PermissionSlip::reset)?;
        info!(slip = %slip.id, "permission slip reset");
        Ok(slip)
    }

    pub fn flag_for_review(
        &self,
        slip: SlipId,
        flagged: bool,
    ) -> Result<PermissionSlip, PermissionError> {
        let slip = self.update_slip(slip, |slip| slip.flagged_for_review = flagged)?;
        info!(slip = %slip.id, flagged, "permission slip review flag changed");
        Ok(slip)
    }

    /// Overrides the trip due date for one slip; `None` falls back to the
    /// trip's date.
    pub fn set_slip_due_date(
        &self,
        slip: SlipId,
        due_date: Option<NaiveDate>,
    ) -> Result<PermissionSlip, PermissionError> {
        let slip = self.update_slip(slip, |slip| slip.due_date = due_date)?;
        info!(slip = %slip.id, due_date = ?slip.due_date, "permission slip due date changed");
        Ok(slip)
    }

    fn update_slip(
        &self,
        id: SlipId,
        change: impl Fn(&mut PermissionSlip),
    ) -> Result<PermissionSlip, PermissionError> {
        atomic(self.store.as_ref(), |tx| {
            let mut slip = tx.slip(id)?;
            tx.trip(slip.field_trip)?.ensure_mutable(false)?;
            change(&mut slip);
            tx.save_slip(&slip)?;
            Ok(slip)
        })
    }
}
