use std::collections::BTreeSet;

use tracing::debug;

use crate::ids::StudentId;
use crate::store::{RepositoryError, RosterStore};

use super::domain::FieldTrip;

/// Students implied by the trip's invitation criteria.
///
/// Explicit invitees, every section of each invited course, each invited
/// section and the invited grade level are combined with set union, so a
/// student reached through several criteria appears once.
pub fn resolve_audience<R: RosterStore + ?Sized>(
    roster: &R,
    trip: &FieldTrip,
) -> Result<BTreeSet<StudentId>, RepositoryError> {
    let criteria = &trip.audience;
    let mut audience = criteria.students.clone();

    for course in &criteria.courses {
        for section in roster.sections_for_course(*course)? {
            audience.extend(roster.section_students(section.id)?);
        }
    }

    for section in &criteria.sections {
        audience.extend(roster.section_students(*section)?);
    }

    if let Some(grade) = criteria.grade_level {
        audience.extend(roster.students_in_grade(grade)?);
    }

    debug!(trip = %trip.id, students = audience.len(), "resolved trip audience");
    Ok(audience)
}
