use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::SlipId;
use crate::trips::{FieldTrip, TripStatus};

use super::domain::{PermissionSlip, SignerRole};

/// Longest accepted signature name, in characters.
pub const MAX_SIGNATURE_NAME: usize = 100;

/// Form data posted from a signing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSubmission {
    pub name: String,
    pub consent: bool,
}

impl SignatureSubmission {
    pub fn new(name: impl Into<String>, consent: bool) -> Self {
        Self {
            name: name.into(),
            consent,
        }
    }

    /// Trimmed name once every field checks out.
    pub fn validated_name(&self) -> Result<String, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if name.chars().count() > MAX_SIGNATURE_NAME {
            return Err(ValidationError::NameTooLong {
                max: MAX_SIGNATURE_NAME,
            });
        }
        if !self.consent {
            return Err(ValidationError::MissingConsent);
        }
        Ok(name.to_string())
    }
}

/// What a signing page shows for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlipPage {
    pub slip: SlipId,
    pub role: SignerRole,
    pub trip_name: String,
    pub trip_status: TripStatus,
    pub group_name: String,
    pub location: String,
    pub start_date: NaiveDate,
    pub dropoff_time: NaiveTime,
    pub dropoff_location: String,
    pub end_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub pickup_location: String,
    pub due_date: NaiveDate,
    pub student_name: String,
    pub student_signed_at: Option<DateTime<Utc>>,
    pub guardian_name: Option<String>,
    pub guardian_signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SlipPage {
    pub fn build(
        trip: &FieldTrip,
        slip: &PermissionSlip,
        role: SignerRole,
        student_name: String,
        guardian_name: Option<String>,
    ) -> Self {
        let details = &trip.details;
        Self {
            slip: slip.id,
            role,
            trip_name: details.name.clone(),
            trip_status: trip.status,
            group_name: details.group_name.clone(),
            location: details.location.clone(),
            start_date: details.start_date,
            dropoff_time: details.dropoff_time,
            dropoff_location: details.dropoff_location.clone(),
            end_date: details.end_date,
            pickup_time: details.pickup_time,
            pickup_location: details.pickup_location.clone(),
            due_date: slip.effective_due_date(trip),
            student_name,
            student_signed_at: slip.student_signature.as_ref().map(|s| s.signed_at),
            guardian_name,
            guardian_signed_at: slip.guardian_signature.as_ref().map(|s| s.signed_at),
            completed_at: slip.completed_at(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(
            SignatureSubmission::new("  Anne Byron ", true).validated_name(),
            Ok("Anne Byron".to_string())
        );
        assert_eq!(
            SignatureSubmission::new("   ", true).validated_name(),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            SignatureSubmission::new("x".repeat(101), true).validated_name(),
            Err(ValidationError::NameTooLong { max: 100 })
        );
        assert!(SignatureSubmission::new("x".repeat(100), true)
            .validated_name()
            .is_ok());
    }

    #[test]
    fn consent_is_required() {
        assert_eq!(
            SignatureSubmission::new("Anne Byron", false).validated_name(),
            Err(ValidationError::MissingConsent)
        );
    }
}
