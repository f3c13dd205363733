//! Applies one upstream roster export to the store.
//!
//! Each pass upserts by external id, then hides whatever the export no longer
//! mentions. Passes run in dependency order (faculty before the sections they
//! teach, students before their guardians and enrollment) and each one commits
//! on its own.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PermissionError;
use crate::ids::{FacultyId, GuardianId, SectionId, StudentId};
use crate::store::{atomic, PermissionStore, RepositoryError, RosterStore};

use super::domain::{FacultyRecord, GuardianRecord, RosterKind, SectionUpsert, StudentRecord};

/// One row of the classes export: a section together with its course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub course_number: String,
    pub course_name: String,
    pub section_id: String,
    pub section_number: String,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub coteacher: Option<String>,
    pub school_year: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub period: String,
}

/// Contacts listed for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianContacts {
    /// Student person id.
    pub student: String,
    pub guardians: Vec<GuardianRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub section_id: String,
    /// Student person id.
    pub student: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    #[serde(default)]
    pub faculty: Vec<FacultyRecord>,
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(default)]
    pub guardians: Vec<GuardianContacts>,
    #[serde(default)]
    pub enrollment: Vec<EnrollmentRecord>,
}

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub upserted: BTreeMap<RosterKind, usize>,
    pub hidden: BTreeMap<RosterKind, usize>,
    pub enrollments: usize,
    /// Student person ids referenced by guardian or enrollment rows but unknown.
    pub missing_students: BTreeSet<String>,
    /// Section ids referenced by enrollment rows but unknown.
    pub missing_sections: BTreeSet<String>,
}

pub fn reconcile_roster<S: PermissionStore + ?Sized>(
    store: &S,
    snapshot: &RosterSnapshot,
) -> Result<ReconcileSummary, PermissionError> {
    let mut summary = ReconcileSummary::default();

    let faculty = atomic(store, |tx| {
        let mut seen = BTreeSet::new();
        for record in &snapshot.faculty {
            tx.upsert_faculty(record)?;
            seen.insert(record.person_id.clone());
        }
        Ok((seen.len(), tx.hide_absent(RosterKind::Faculty, &seen)?))
    })?;
    summary.record(RosterKind::Faculty, faculty);

    let (courses, sections) = atomic(store, |tx| import_classes(tx, &snapshot.classes))?;
    summary.record(RosterKind::Courses, courses);
    summary.record(RosterKind::Sections, sections);

    let students = atomic(store, |tx| {
        let mut seen = BTreeSet::new();
        for record in &snapshot.students {
            tx.upsert_student(record)?;
            seen.insert(record.person_id.clone());
        }
        Ok((seen.len(), tx.hide_absent(RosterKind::Students, &seen)?))
    })?;
    summary.record(RosterKind::Students, students);

    let (guardians, missing) = atomic(store, |tx| import_guardians(tx, &snapshot.guardians))?;
    summary.record(RosterKind::Guardians, guardians);
    summary.missing_students.extend(missing);

    let (enrollments, missing_students, missing_sections) =
        atomic(store, |tx| import_enrollment(tx, &snapshot.enrollment))?;
    summary.enrollments = enrollments;
    summary.missing_students.extend(missing_students);
    summary.missing_sections = missing_sections;

    info!(
        students = summary.upserted.get(&RosterKind::Students).copied().unwrap_or(0),
        enrollments = summary.enrollments,
        missing_students = summary.missing_students.len(),
        missing_sections = summary.missing_sections.len(),
        "roster reconciled"
    );
    Ok(summary)
}

impl ReconcileSummary {
    fn record(&mut self, kind: RosterKind, (upserted, hidden): (usize, usize)) {
        self.upserted.insert(kind, upserted);
        self.hidden.insert(kind, hidden);
    }
}

/// Unknown teachers are dropped rather than failing the whole section.
fn teacher<R: RosterStore + ?Sized>(
    roster: &R,
    section_id: &str,
    person_id: Option<&str>,
) -> Result<Option<FacultyId>, RepositoryError> {
    let Some(person_id) = person_id.filter(|id| !id.trim().is_empty()) else {
        return Ok(None);
    };
    match roster.faculty_by_person_id(person_id) {
        Ok(faculty) => Ok(Some(faculty.id)),
        Err(RepositoryError::NotFound { .. }) => {
            warn!(section = section_id, teacher = person_id, "section teacher not in roster");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn import_classes(
    tx: &dyn PermissionStore,
    classes: &[ClassRecord],
) -> Result<((usize, usize), (usize, usize)), PermissionError> {
    let mut seen_courses = BTreeSet::new();
    let mut seen_sections = BTreeSet::new();

    for class in classes {
        let course = tx.upsert_course(&class.course_number, &class.course_name)?;
        seen_courses.insert(class.course_number.clone());

        let section = SectionUpsert {
            section_id: class.section_id.clone(),
            course,
            section_number: class.section_number.clone(),
            teacher: teacher(tx, &class.section_id, class.teacher.as_deref())?,
            coteacher: teacher(tx, &class.section_id, class.coteacher.as_deref())?,
            school_year: class.school_year.clone(),
            room: class.room.clone(),
            period: class.period.clone(),
        };
        tx.upsert_section(&section)?;
        seen_sections.insert(class.section_id.clone());
    }

    let hidden_courses = tx.hide_absent(RosterKind::Courses, &seen_courses)?;
    let hidden_sections = tx.hide_absent(RosterKind::Sections, &seen_sections)?;
    Ok((
        (seen_courses.len(), hidden_courses),
        (seen_sections.len(), hidden_sections),
    ))
}

fn import_guardians(
    tx: &dyn PermissionStore,
    contacts: &[GuardianContacts],
) -> Result<((usize, usize), BTreeSet<String>), PermissionError> {
    let mut seen = BTreeSet::new();
    let mut missing = BTreeSet::new();

    for entry in contacts {
        let student = match tx.student_by_person_id(&entry.student) {
            Ok(student) => student,
            Err(RepositoryError::NotFound { .. }) => {
                warn!(student = %entry.student, "guardian row for unknown student");
                missing.insert(entry.student.clone());
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let mut guardians: BTreeSet<GuardianId> = BTreeSet::new();
        for record in &entry.guardians {
            if record.person_id.trim().is_empty() {
                continue;
            }
            guardians.insert(tx.upsert_guardian(record)?);
            seen.insert(record.person_id.clone());
        }
        tx.set_student_guardians(student.id, &guardians)?;
    }

    let hidden = tx.hide_absent(RosterKind::Guardians, &seen)?;
    Ok(((seen.len(), hidden), missing))
}

fn import_enrollment(
    tx: &dyn PermissionStore,
    rows: &[EnrollmentRecord],
) -> Result<(usize, BTreeSet<String>, BTreeSet<String>), PermissionError> {
    let mut sections: BTreeMap<&str, Option<SectionId>> = BTreeMap::new();
    let mut students: BTreeMap<&str, Option<StudentId>> = BTreeMap::new();
    let mut pairs = BTreeSet::new();

    for row in rows {
        let section = match sections.get(row.section_id.as_str()) {
            Some(known) => *known,
            None => {
                let resolved = found(tx.section_by_section_id(&row.section_id).map(|s| s.id))?;
                sections.insert(&row.section_id, resolved);
                resolved
            }
        };
        let student = match students.get(row.student.as_str()) {
            Some(known) => *known,
            None => {
                let resolved = found(tx.student_by_person_id(&row.student).map(|s| s.id))?;
                students.insert(&row.student, resolved);
                resolved
            }
        };
        if let (Some(section), Some(student)) = (section, student) {
            pairs.insert((section, student));
        }
    }

    tx.replace_enrollment(&pairs)?;

    let missing_sections = unresolved(&sections);
    let missing_students = unresolved(&students);
    if !missing_sections.is_empty() || !missing_students.is_empty() {
        warn!(
            sections = missing_sections.len(),
            students = missing_students.len(),
            "enrollment rows skipped for unknown records"
        );
    }
    Ok((pairs.len(), missing_students, missing_sections))
}

fn found<T>(lookup: Result<T, RepositoryError>) -> Result<Option<T>, RepositoryError> {
    match lookup {
        Ok(value) => Ok(Some(value)),
        Err(RepositoryError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn unresolved<T>(lookups: &BTreeMap<&str, Option<T>>) -> BTreeSet<String> {
    lookups
        .iter()
        .filter(|(_, id)| id.is_none())
        .map(|(key, _)| key.to_string())
        .collect()
}
