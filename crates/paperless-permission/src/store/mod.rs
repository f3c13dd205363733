//! Storage abstraction so the service can run against memory or SQLite.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::PermissionError;
use crate::ids::{CourseId, FacultyId, GuardianId, SectionId, SlipId, SlipLinkId, StudentId, TripId};
use crate::roster::{
    Course, Faculty, FacultyRecord, GradeLevel, Guardian, GuardianRecord, RosterKind, Section,
    SectionUpsert, Student, StudentRecord,
};
use crate::slips::{LinkSubject, NewSlipLink, PermissionSlip, PermissionSlipLink};
use crate::trips::{FieldTrip, TripDraft};

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryState, MemoryStore};
pub use sqlite::SqliteStore;

/// Roster reads used by audience resolution and writes used by import passes.
///
/// Reads do not filter hidden records except [`RosterStore::students_in_grade`].
pub trait RosterStore: Send + Sync {
    fn student(&self, id: StudentId) -> Result<Student, RepositoryError>;
    fn student_by_person_id(&self, person_id: &str) -> Result<Student, RepositoryError>;
    fn guardian(&self, id: GuardianId) -> Result<Guardian, RepositoryError>;
    fn guardian_by_person_id(&self, person_id: &str) -> Result<Guardian, RepositoryError>;
    fn faculty(&self, id: FacultyId) -> Result<Faculty, RepositoryError>;
    fn faculty_by_person_id(&self, person_id: &str) -> Result<Faculty, RepositoryError>;
    fn course_by_number(&self, course_number: &str) -> Result<Course, RepositoryError>;
    fn section_by_section_id(&self, section_id: &str) -> Result<Section, RepositoryError>;

    fn sections_for_course(&self, course: CourseId) -> Result<Vec<Section>, RepositoryError>;
    fn section_students(&self, section: SectionId) -> Result<BTreeSet<StudentId>, RepositoryError>;
    fn guardians_of(&self, student: StudentId) -> Result<Vec<Guardian>, RepositoryError>;
    /// Non-hidden students of one grade level.
    fn students_in_grade(&self, grade: GradeLevel) -> Result<BTreeSet<StudentId>, RepositoryError>;

    /// Insert or update by external id. Clears `hidden`.
    fn upsert_faculty(&self, record: &FacultyRecord) -> Result<FacultyId, RepositoryError>;
    fn upsert_student(&self, record: &StudentRecord) -> Result<StudentId, RepositoryError>;
    fn upsert_guardian(&self, record: &GuardianRecord) -> Result<GuardianId, RepositoryError>;
    fn upsert_course(
        &self,
        course_number: &str,
        course_name: &str,
    ) -> Result<CourseId, RepositoryError>;
    fn upsert_section(&self, section: &SectionUpsert) -> Result<SectionId, RepositoryError>;
    /// Hides every record of `kind` whose external id is not in `seen`.
    /// Returns how many records became hidden.
    fn hide_absent(&self, kind: RosterKind, seen: &BTreeSet<String>) -> Result<usize, RepositoryError>;
    /// Replaces the student's guardian set.
    fn set_student_guardians(
        &self,
        student: StudentId,
        guardians: &BTreeSet<GuardianId>,
    ) -> Result<(), RepositoryError>;
    /// Replaces all enrollment rows.
    fn replace_enrollment(
        &self,
        enrollment: &BTreeSet<(SectionId, StudentId)>,
    ) -> Result<(), RepositoryError>;
}

pub trait TripStore: Send + Sync {
    /// Stores a NEW, visible trip.
    fn insert_trip(&self, draft: &TripDraft) -> Result<FieldTrip, RepositoryError>;
    fn trip(&self, id: TripId) -> Result<FieldTrip, RepositoryError>;
    fn save_trip(&self, trip: &FieldTrip) -> Result<(), RepositoryError>;
    fn list_trips(&self, include_hidden: bool) -> Result<Vec<FieldTrip>, RepositoryError>;
}

/// Slip and link storage. Both `(trip, student)` and `(slip, subject)` are
/// unique; inserting a duplicate fails with [`RepositoryError::Conflict`].
pub trait SlipStore: Send + Sync {
    fn find_slip(
        &self,
        trip: TripId,
        student: StudentId,
    ) -> Result<Option<PermissionSlip>, RepositoryError>;
    fn insert_slip(&self, trip: TripId, student: StudentId) -> Result<PermissionSlip, RepositoryError>;
    fn slip(&self, id: SlipId) -> Result<PermissionSlip, RepositoryError>;
    fn slips_for_trip(&self, trip: TripId) -> Result<Vec<PermissionSlip>, RepositoryError>;
    fn save_slip(&self, slip: &PermissionSlip) -> Result<(), RepositoryError>;

    fn find_link(
        &self,
        slip: SlipId,
        subject: LinkSubject,
    ) -> Result<Option<PermissionSlipLink>, RepositoryError>;
    fn insert_link(&self, link: &NewSlipLink) -> Result<PermissionSlipLink, RepositoryError>;
    fn link_by_token(&self, token: &str) -> Result<PermissionSlipLink, RepositoryError>;
    fn links_for_slip(&self, slip: SlipId) -> Result<Vec<PermissionSlipLink>, RepositoryError>;
    fn mark_sent(&self, link: SlipLinkId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

/// Work run inside [`PermissionStore::atomically`].
pub type AtomicWork<'a> = dyn FnMut(&dyn PermissionStore) -> Result<(), PermissionError> + 'a;

pub trait PermissionStore: RosterStore + TripStore + SlipStore {
    /// Runs `work` against a transactional view of the store. Everything it
    /// wrote is discarded when it returns an error. Calls may nest.
    fn atomically(&self, work: &mut AtomicWork<'_>) -> Result<(), PermissionError>;
}

/// [`PermissionStore::atomically`] for work that produces a value.
pub fn atomic<S, T, F>(store: &S, mut work: F) -> Result<T, PermissionError>
where
    S: PermissionStore + ?Sized,
    F: FnMut(&dyn PermissionStore) -> Result<T, PermissionError>,
{
    let mut output = None;
    store.atomically(&mut |tx: &dyn PermissionStore| {
        output = Some(work(tx)?);
        Ok(())
    })?;
    output.ok_or_else(|| {
        PermissionError::Repository(RepositoryError::Unavailable(
            "atomic block finished without a result".to_string(),
        ))
    })
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} already exists")]
    Conflict { entity: &'static str },
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },
    #[error("stored {entity} is invalid: {detail}")]
    Corrupt { entity: &'static str, detail: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
