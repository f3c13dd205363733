//! Status transitions. These only mutate the in-memory trip; persisting the
//! change and dispatching emails are the caller's job.

use crate::error::PermissionError;

use super::domain::{FieldTrip, TripStatus};

impl FieldTrip {
    /// NEW -> APPROVED. Returns false, leaving the trip alone, from any later status.
    pub fn approve(&mut self) -> bool {
        if self.status != TripStatus::New {
            return false;
        }
        self.status = TripStatus::Approved;
        true
    }

    /// APPROVED -> RELEASED. Any other starting status is rejected.
    pub fn release(&mut self) -> Result<(), PermissionError> {
        if self.status != TripStatus::Approved {
            return Err(PermissionError::InvalidStateTransition {
                from: self.status,
                to: TripStatus::Released,
            });
        }
        self.status = TripStatus::Released;
        Ok(())
    }

    /// Allowed from every status.
    pub fn archive(&mut self) {
        self.status = TripStatus::Archived;
        self.hidden = true;
    }

    pub fn is_archived(&self) -> bool {
        self.status == TripStatus::Archived
    }

    /// Refuses changes to archived trips unless `force` is set.
    pub fn ensure_mutable(&self, force: bool) -> Result<(), PermissionError> {
        if self.is_archived() && !force {
            return Err(PermissionError::ArchivedTrip { trip: self.id });
        }
        Ok(())
    }

    pub fn notifications_permitted(&self) -> bool {
        self.status == TripStatus::Released
    }

    /// Emails only go out for released trips.
    pub fn ensure_notifiable(&self) -> Result<(), PermissionError> {
        if self.notifications_permitted() {
            Ok(())
        } else {
            Err(PermissionError::NotificationsNotPermitted {
                status: self.status,
            })
        }
    }
}
