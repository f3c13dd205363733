//! Reconciles slips and signature links against a trip's audience.
//!
//! Every get-or-create here relies on the store rejecting duplicates with
//! `Conflict`; the loser of a race re-reads the row the winner wrote.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PermissionError;
use crate::ids::{SlipId, StudentId, TripId};
use crate::slips::{NewSlipLink, PermissionSlip};
use crate::store::{atomic, PermissionStore, RepositoryError};
use crate::trips::{resolve_audience, FieldTrip};

use super::{PermissionSlipService, TaskQueue};

/// Counts from one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    /// Students the trip's criteria resolved to.
    pub audience: usize,
    pub slips_created: usize,
    pub links_created: usize,
}

impl<S, Q> PermissionSlipService<S, Q>
where
    S: PermissionStore + 'static,
    Q: TaskQueue + 'static,
{
    /// Creates the slips and links the trip's audience is missing. Existing
    /// slips are left untouched, so repeated runs write nothing new.
    pub fn generate_permission_slips(
        &self,
        trip: TripId,
        force: bool,
    ) -> Result<GenerationSummary, PermissionError> {
        let trip = self.store.trip(trip)?;
        trip.ensure_mutable(force)?;
        let summary = generate_for_trip(self.store.as_ref(), &trip, &self.settings.link_salt)?;
        info!(
            trip = %trip.id,
            audience = summary.audience,
            slips_created = summary.slips_created,
            links_created = summary.links_created,
            "permission slips generated"
        );
        Ok(summary)
    }

    /// Adds links for parties the slip does not have one for yet, such as a
    /// guardian imported after the slip was generated. Returns how many were
    /// created.
    pub fn generate_slip_links(&self, slip: SlipId) -> Result<usize, PermissionError> {
        let salt = self.settings.link_salt.as_str();
        let created = atomic(self.store.as_ref(), |tx| {
            let slip = tx.slip(slip)?;
            tx.trip(slip.field_trip)?.ensure_mutable(false)?;
            link_slip(tx, &slip, salt)
        })?;
        if created > 0 {
            info!(slip = %slip, created, "permission slip links added");
        }
        Ok(created)
    }
}

/// Generation body shared by the standalone run and by release, which calls
/// it from inside its own atomic block.
pub(super) fn generate_for_trip<S: PermissionStore + ?Sized>(
    store: &S,
    trip: &FieldTrip,
    salt: &str,
) -> Result<GenerationSummary, PermissionError> {
    let audience = resolve_audience(store, trip)?;
    let mut summary = GenerationSummary {
        audience: audience.len(),
        ..GenerationSummary::default()
    };

    for student in audience {
        let links = atomic(store, |tx| {
            let (slip, created) = get_or_create_slip(tx, trip, student)?;
            if created {
                link_slip(tx, &slip, salt).map(Some)
            } else {
                Ok(None)
            }
        })?;
        if let Some(links) = links {
            summary.slips_created += 1;
            summary.links_created += links;
        }
    }
    Ok(summary)
}

fn get_or_create_slip(
    tx: &dyn PermissionStore,
    trip: &FieldTrip,
    student: StudentId,
) -> Result<(PermissionSlip, bool), PermissionError> {
    if let Some(slip) = tx.find_slip(trip.id, student)? {
        return Ok((slip, false));
    }
    match tx.insert_slip(trip.id, student) {
        Ok(slip) => Ok((slip, true)),
        Err(err) if err.is_conflict() => {
            debug!(trip = %trip.id, student = %student, "slip created concurrently, reusing it");
            let slip = tx
                .find_slip(trip.id, student)?
                .ok_or(RepositoryError::Conflict {
                    entity: "permission slip",
                })?;
            Ok((slip, false))
        }
        Err(err) => Err(err.into()),
    }
}

/// Ensures the student and each of their current guardians has a link.
fn link_slip(
    tx: &dyn PermissionStore,
    slip: &PermissionSlip,
    salt: &str,
) -> Result<usize, PermissionError> {
    let student = tx.student(slip.student)?;
    let mut parties = vec![NewSlipLink::for_party(slip.id, Some(&student), None, salt)?];
    for guardian in tx.guardians_of(student.id)? {
        parties.push(NewSlipLink::for_party(slip.id, None, Some(&guardian), salt)?);
    }

    let mut created = 0;
    for party in &parties {
        if get_or_create_link(tx, party)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Returns whether a new link was stored. A party whose token is already
/// held by another party on the same slip gets no link; the shared token
/// keeps working for the party that holds it.
fn get_or_create_link(
    tx: &dyn PermissionStore,
    link: &NewSlipLink,
) -> Result<bool, PermissionError> {
    if tx.find_link(link.permission_slip, link.subject)?.is_some() {
        return Ok(false);
    }
    match tx.insert_link(link) {
        Ok(_) => Ok(true),
        Err(err) if err.is_conflict() => {
            if tx.find_link(link.permission_slip, link.subject)?.is_some() {
                debug!(slip = %link.permission_slip, "link created concurrently, reusing it");
                return Ok(false);
            }
            match tx.link_by_token(link.link_id.as_str()) {
                Ok(holder) if holder.subject != link.subject => {
                    warn!(
                        slip = %link.permission_slip,
                        subject = ?link.subject,
                        holder = ?holder.subject,
                        "link token already issued to another party on this slip, skipping"
                    );
                    Ok(false)
                }
                Ok(_) | Err(RepositoryError::NotFound { .. }) => Err(RepositoryError::Conflict {
                    entity: "permission slip link",
                }
                .into()),
                Err(err) => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}
