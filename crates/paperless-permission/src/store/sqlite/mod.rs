//! SQLite backend. Uniqueness and signature invariants are enforced by the
//! schema so concurrent writers cannot duplicate slips or links.

use std::collections::BTreeSet;
use std::ops::DerefMut;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{ffi, Connection, ErrorCode};
use tracing::info;

use crate::error::PermissionError;
use crate::ids::{
    CourseId, FacultyId, GuardianId, SectionId, SlipId, SlipLinkId, StudentId, TripId,
};
use crate::roster::{
    Course, Faculty, FacultyRecord, GradeLevel, Guardian, GuardianRecord, RosterKind, Section,
    SectionUpsert, Student, StudentRecord,
};
use crate::slips::{LinkSubject, NewSlipLink, PermissionSlip, PermissionSlipLink};
use crate::trips::{FieldTrip, TripDraft};

use super::{AtomicWork, PermissionStore, RepositoryError, RosterStore, SlipStore, TripStore};

mod roster;
mod schema;
mod slips;
mod trips;

/// Store over one SQLite connection. `G` owns the connection, or borrows it
/// for the view handed to an atomic block.
#[derive(Debug)]
pub struct SqliteStore<G = Box<Connection>> {
    conn: Mutex<G>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and applies the schema.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                RepositoryError::Unavailable(format!(
                    "cannot create {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %path.display(), "opened permission slip database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(Box::new(conn)),
        })
    }
}

impl<G> SqliteStore<G>
where
    G: DerefMut<Target = Connection>,
{
    fn lock(&self) -> Result<MutexGuard<'_, G>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let guard = self.lock()?;
        f(&guard)
    }
}

/// Maps constraint failures on insert/update to repository errors.
pub(crate) fn map_write(err: rusqlite::Error, entity: &'static str) -> RepositoryError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return RepositoryError::Conflict { entity };
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return RepositoryError::not_found("reference from", entity);
                }
                _ => {}
            }
        }
    }
    RepositoryError::Sqlite(err)
}

impl<G> RosterStore for SqliteStore<G>
where
    G: DerefMut<Target = Connection> + Send,
{
    fn student(&self, id: StudentId) -> Result<Student, RepositoryError> {
        self.with(|conn| roster::student(conn, id))
    }

    fn student_by_person_id(&self, person_id: &str) -> Result<Student, RepositoryError> {
        self.with(|conn| roster::student_by_person_id(conn, person_id))
    }

    fn guardian(&self, id: GuardianId) -> Result<Guardian, RepositoryError> {
        self.with(|conn| roster::guardian(conn, id))
    }

    fn guardian_by_person_id(&self, person_id: &str) -> Result<Guardian, RepositoryError> {
        self.with(|conn| roster::guardian_by_person_id(conn, person_id))
    }

    fn faculty(&self, id: FacultyId) -> Result<Faculty, RepositoryError> {
        self.with(|conn| roster::faculty(conn, id))
    }

    fn faculty_by_person_id(&self, person_id: &str) -> Result<Faculty, RepositoryError> {
        self.with(|conn| roster::faculty_by_person_id(conn, person_id))
    }

    fn course_by_number(&self, course_number: &str) -> Result<Course, RepositoryError> {
        self.with(|conn| roster::course_by_number(conn, course_number))
    }

    fn section_by_section_id(&self, section_id: &str) -> Result<Section, RepositoryError> {
        self.with(|conn| roster::section_by_section_id(conn, section_id))
    }

    fn sections_for_course(&self, course: CourseId) -> Result<Vec<Section>, RepositoryError> {
        self.with(|conn| roster::sections_for_course(conn, course))
    }

    fn section_students(&self, section: SectionId) -> Result<BTreeSet<StudentId>, RepositoryError> {
        self.with(|conn| roster::section_students(conn, section))
    }

    fn guardians_of(&self, student: StudentId) -> Result<Vec<Guardian>, RepositoryError> {
        self.with(|conn| roster::guardians_of(conn, student))
    }

    fn students_in_grade(&self, grade: GradeLevel) -> Result<BTreeSet<StudentId>, RepositoryError> {
        self.with(|conn| roster::students_in_grade(conn, grade))
    }

    fn upsert_faculty(&self, record: &FacultyRecord) -> Result<FacultyId, RepositoryError> {
        self.with(|conn| roster::upsert_faculty(conn, record))
    }

    fn upsert_student(&self, record: &StudentRecord) -> Result<StudentId, RepositoryError> {
        self.with(|conn| roster::upsert_student(conn, record))
    }

    fn upsert_guardian(&self, record: &GuardianRecord) -> Result<GuardianId, RepositoryError> {
        self.with(|conn| roster::upsert_guardian(conn, record))
    }

    fn upsert_course(&self, course_number: &str, course_name: &str) -> Result<CourseId, RepositoryError> {
        self.with(|conn| roster::upsert_course(conn, course_number, course_name))
    }

    fn upsert_section(&self, section: &SectionUpsert) -> Result<SectionId, RepositoryError> {
        self.with(|conn| roster::upsert_section(conn, section))
    }

    fn hide_absent(&self, kind: RosterKind, seen: &BTreeSet<String>) -> Result<usize, RepositoryError> {
        self.with(|conn| roster::hide_absent(conn, kind, seen))
    }

    fn set_student_guardians(
        &self,
        student: StudentId,
        guardians: &BTreeSet<GuardianId>,
    ) -> Result<(), RepositoryError> {
        self.with(|conn| roster::set_student_guardians(conn, student, guardians))
    }

    fn replace_enrollment(
        &self,
        enrollment: &BTreeSet<(SectionId, StudentId)>,
    ) -> Result<(), RepositoryError> {
        self.with(|conn| roster::replace_enrollment(conn, enrollment))
    }
}

impl<G> TripStore for SqliteStore<G>
where
    G: DerefMut<Target = Connection> + Send,
{
    fn insert_trip(&self, draft: &TripDraft) -> Result<FieldTrip, RepositoryError> {
        self.with(|conn| trips::insert_trip(conn, draft))
    }

    fn trip(&self, id: TripId) -> Result<FieldTrip, RepositoryError> {
        self.with(|conn| trips::trip(conn, id))
    }

    fn save_trip(&self, trip: &FieldTrip) -> Result<(), RepositoryError> {
        self.with(|conn| trips::save_trip(conn, trip))
    }

    fn list_trips(&self, include_hidden: bool) -> Result<Vec<FieldTrip>, RepositoryError> {
        self.with(|conn| trips::list_trips(conn, include_hidden))
    }
}

impl<G> SlipStore for SqliteStore<G>
where
    G: DerefMut<Target = Connection> + Send,
{
    fn find_slip(
        &self,
        trip: TripId,
        student: StudentId,
    ) -> Result<Option<PermissionSlip>, RepositoryError> {
        self.with(|conn| slips::find_slip(conn, trip, student))
    }

    fn insert_slip(&self, trip: TripId, student: StudentId) -> Result<PermissionSlip, RepositoryError> {
        self.with(|conn| slips::insert_slip(conn, trip, student))
    }

    fn slip(&self, id: SlipId) -> Result<PermissionSlip, RepositoryError> {
        self.with(|conn| slips::slip(conn, id))
    }

    fn slips_for_trip(&self, trip: TripId) -> Result<Vec<PermissionSlip>, RepositoryError> {
        self.with(|conn| slips::slips_for_trip(conn, trip))
    }

    fn save_slip(&self, slip: &PermissionSlip) -> Result<(), RepositoryError> {
        self.with(|conn| slips::save_slip(conn, slip))
    }

    fn find_link(
        &self,
        slip: SlipId,
        subject: LinkSubject,
    ) -> Result<Option<PermissionSlipLink>, RepositoryError> {
        self.with(|conn| slips::find_link(conn, slip, subject))
    }

    fn insert_link(&self, link: &NewSlipLink) -> Result<PermissionSlipLink, RepositoryError> {
        self.with(|conn| slips::insert_link(conn, link))
    }

    fn link_by_token(&self, token: &str) -> Result<PermissionSlipLink, RepositoryError> {
        self.with(|conn| slips::link_by_token(conn, token))
    }

    fn links_for_slip(&self, slip: SlipId) -> Result<Vec<PermissionSlipLink>, RepositoryError> {
        self.with(|conn| slips::links_for_slip(conn, slip))
    }

    fn mark_sent(&self, link: SlipLinkId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.with(|conn| slips::mark_sent(conn, link, at))
    }
}

impl<G> PermissionStore for SqliteStore<G>
where
    G: DerefMut<Target = Connection> + Send,
{
    fn atomically(&self, work: &mut AtomicWork<'_>) -> Result<(), PermissionError> {
        let mut conn = self.lock()?;
        let top_level = conn.is_autocommit();
        let begin = if top_level {
            "BEGIN IMMEDIATE"
        } else {
            "SAVEPOINT store_atomic"
        };
        conn.execute_batch(begin).map_err(RepositoryError::from)?;

        let result = {
            let view = SqliteStore {
                conn: Mutex::new(&mut **conn),
            };
            work(&view)
        };

        let finish = match (result.is_ok(), top_level) {
            (true, true) => "COMMIT",
            (true, false) => "RELEASE store_atomic",
            (false, true) => "ROLLBACK",
            (false, false) => "ROLLBACK TO store_atomic; RELEASE store_atomic",
        };
        if let Err(err) = conn.execute_batch(finish) {
            if top_level && !conn.is_autocommit() {
                let _ = conn.execute_batch("ROLLBACK");
            }
            return Err(RepositoryError::from(err).into());
        }
        result
    }
}
