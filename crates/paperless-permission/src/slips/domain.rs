use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{GuardianId, SlipId, StudentId, TripId};
use crate::trips::FieldTrip;

use super::link::LinkSubject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub signed_at: DateTime<Utc>,
}

/// The single guardian signature slot of a slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSignature {
    pub guardian: GuardianId,
    pub name: String,
    pub signed_at: DateTime<Utc>,
}

/// Who is signing through a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum SignerRole {
    Student,
    Guardian(GuardianId),
}

impl From<LinkSubject> for SignerRole {
    fn from(subject: LinkSubject) -> Self {
        match subject {
            LinkSubject::Student(_) => Self::Student,
            LinkSubject::Guardian(guardian) => Self::Guardian(guardian),
        }
    }
}

/// One student's slip for one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSlip {
    pub id: SlipId,
    pub field_trip: TripId,
    pub student: StudentId,
    /// Overrides the trip due date when set.
    pub due_date: Option<NaiveDate>,
    pub student_signature: Option<Signature>,
    pub guardian_signature: Option<GuardianSignature>,
    pub flagged_for_review: bool,
}

impl PermissionSlip {
    pub fn new(id: SlipId, field_trip: TripId, student: StudentId) -> Self {
        Self {
            id,
            field_trip,
            student,
            due_date: None,
            student_signature: None,
            guardian_signature: None,
            flagged_for_review: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.student_signature.is_some() && self.guardian_signature.is_some()
    }

    /// Later of the two signature times, once both exist.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match (&self.student_signature, &self.guardian_signature) {
            (Some(student), Some(guardian)) => Some(student.signed_at.max(guardian.signed_at)),
            _ => None,
        }
    }

    pub fn effective_due_date(&self, trip: &FieldTrip) -> NaiveDate {
        self.due_date.unwrap_or(trip.details.due_date)
    }

    /// Records a signature in the slot for `role`. A different guardian
    /// signing replaces the previous guardian signature.
    pub fn apply_signature(
        &mut self,
        role: SignerRole,
        name: String,
        at: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if self.is_complete() {
            return Err(ValidationError::SlipComplete);
        }
        match role {
            SignerRole::Student => {
                self.student_signature = Some(Signature {
                    name,
                    signed_at: at,
                });
            }
            SignerRole::Guardian(guardian) => {
                self.guardian_signature = Some(GuardianSignature {
                    guardian,
                    name,
                    signed_at: at,
                });
            }
        }
        Ok(())
    }

    /// Clears both signatures and the review flag.
    pub fn reset(&mut self) {
        self.student_signature = None;
        self.guardian_signature = None;
        self.flagged_for_review = false;
    }
}
