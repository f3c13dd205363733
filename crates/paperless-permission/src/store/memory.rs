use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::PermissionError;
use crate::ids::{
    CourseId, FacultyId, GuardianId, SectionId, SlipId, SlipLinkId, StudentId, TripId,
};
use crate::roster::{
    Course, Faculty, FacultyRecord, GradeLevel, Guardian, GuardianRecord, PersonDetails,
    RosterKind, Section, SectionUpsert, Student, StudentRecord,
};
use crate::slips::{LinkSubject, NewSlipLink, PermissionSlip, PermissionSlipLink};
use crate::trips::{FieldTrip, TripDraft, TripStatus};

use super::{AtomicWork, PermissionStore, RepositoryError, RosterStore, SlipStore, TripStore};

/// Everything the in-memory store holds, with the same unique keys the SQLite
/// schema enforces.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    next_id: i64,
    faculty: BTreeMap<FacultyId, Faculty>,
    students: BTreeMap<StudentId, Student>,
    guardians: BTreeMap<GuardianId, Guardian>,
    courses: BTreeMap<CourseId, Course>,
    sections: BTreeMap<SectionId, Section>,
    guardianships: BTreeSet<(StudentId, GuardianId)>,
    enrollment: BTreeSet<(SectionId, StudentId)>,
    trips: BTreeMap<TripId, FieldTrip>,
    slips: BTreeMap<SlipId, PermissionSlip>,
    slip_index: BTreeMap<(TripId, StudentId), SlipId>,
    links: BTreeMap<SlipLinkId, PermissionSlipLink>,
    link_index: BTreeMap<(SlipId, LinkSubject), SlipLinkId>,
    token_index: BTreeMap<String, SlipLinkId>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn slip_count(&self) -> usize {
        self.slips.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn student(&self, id: StudentId) -> Result<&Student, RepositoryError> {
        self.students
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("student", id))
    }

    fn guardian(&self, id: GuardianId) -> Result<&Guardian, RepositoryError> {
        self.guardians
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("guardian", id))
    }

    fn section(&self, id: SectionId) -> Result<&Section, RepositoryError> {
        self.sections
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("section", id))
    }

    fn ensure_faculty(&self, id: Option<FacultyId>) -> Result<(), RepositoryError> {
        match id {
            Some(id) if !self.faculty.contains_key(&id) => {
                Err(RepositoryError::not_found("faculty", id))
            }
            _ => Ok(()),
        }
    }
}

/// Mutex-guarded in-memory store. `G` is the owned state, or a borrowed one
/// for the view handed to an atomic block.
#[derive(Debug)]
pub struct MemoryStore<G = Box<MemoryState>> {
    state: Mutex<G>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(Box::default()),
        }
    }
}

impl<G> MemoryStore<G>
where
    G: DerefMut<Target = MemoryState>,
{
    fn lock(&self) -> Result<MutexGuard<'_, G>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&MemoryState) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let guard = self.lock()?;
        f(&guard)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut guard = self.lock()?;
        f(&mut guard)
    }

    /// Copy of the current state, for assertions.
    pub fn snapshot(&self) -> Result<MemoryState, RepositoryError> {
        self.read(|state| Ok(state.clone()))
    }
}

fn person(
    person_id: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
    cell_number: Option<String>,
    notify_cell: bool,
) -> PersonDetails {
    PersonDetails {
        person_id: person_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        cell_number,
        notify_cell,
        hidden: false,
    }
}

impl<G> RosterStore for MemoryStore<G>
where
    G: DerefMut<Target = MemoryState> + Send,
{
    fn student(&self, id: StudentId) -> Result<Student, RepositoryError> {
        self.read(|state| state.student(id).cloned())
    }

    fn student_by_person_id(&self, person_id: &str) -> Result<Student, RepositoryError> {
        self.read(|state| {
            state
                .students
                .values()
                .find(|student| student.person.person_id == person_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("student", person_id))
        })
    }

    fn guardian(&self, id: GuardianId) -> Result<Guardian, RepositoryError> {
        self.read(|state| state.guardian(id).cloned())
    }

    fn guardian_by_person_id(&self, person_id: &str) -> Result<Guardian, RepositoryError> {
        self.read(|state| {
            state
                .guardians
                .values()
                .find(|guardian| guardian.person.person_id == person_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("guardian", person_id))
        })
    }

    fn faculty(&self, id: FacultyId) -> Result<Faculty, RepositoryError> {
        self.read(|state| {
            state
                .faculty
                .get(&id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("faculty", id))
        })
    }

    fn faculty_by_person_id(&self, person_id: &str) -> Result<Faculty, RepositoryError> {
        self.read(|state| {
            state
                .faculty
                .values()
                .find(|faculty| faculty.person.person_id == person_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("faculty", person_id))
        })
    }

    fn course_by_number(&self, course_number: &str) -> Result<Course, RepositoryError> {
        self.read(|state| {
            state
                .courses
                .values()
                .find(|course| course.course_number == course_number)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("course", course_number))
        })
    }

    fn section_by_section_id(&self, section_id: &str) -> Result<Section, RepositoryError> {
        self.read(|state| {
            state
                .sections
                .values()
                .find(|section| section.section_id == section_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("section", section_id))
        })
    }

    fn sections_for_course(&self, course: CourseId) -> Result<Vec<Section>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .sections
                .values()
                .filter(|section| section.course == course)
                .cloned()
                .collect())
        })
    }

    fn section_students(&self, section: SectionId) -> Result<BTreeSet<StudentId>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .enrollment
                .range((section, StudentId(i64::MIN))..=(section, StudentId(i64::MAX)))
                .map(|(_, student)| *student)
                .collect())
        })
    }

    fn guardians_of(&self, student: StudentId) -> Result<Vec<Guardian>, RepositoryError> {
        self.read(|state| {
            state
                .guardianships
                .range((student, GuardianId(i64::MIN))..=(student, GuardianId(i64::MAX)))
                .map(|(_, guardian)| state.guardian(*guardian).cloned())
                .collect()
        })
    }

    fn students_in_grade(&self, grade: GradeLevel) -> Result<BTreeSet<StudentId>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .students
                .values()
                .filter(|student| student.grade_level == grade && !student.person.hidden)
                .map(|student| student.id)
                .collect())
        })
    }

    fn upsert_faculty(&self, record: &FacultyRecord) -> Result<FacultyId, RepositoryError> {
        self.write(|state| {
            let details = person(
                &record.person_id,
                &record.first_name,
                &record.last_name,
                &record.email,
                None,
                false,
            );
            if let Some(existing) = state
                .faculty
                .values_mut()
                .find(|faculty| faculty.person.person_id == record.person_id)
            {
                existing.person = details;
                existing.preferred_name = record.preferred_name.clone();
                return Ok(existing.id);
            }
            let id = FacultyId(state.next_id());
            state.faculty.insert(
                id,
                Faculty {
                    id,
                    person: details,
                    preferred_name: record.preferred_name.clone(),
                },
            );
            Ok(id)
        })
    }

    fn upsert_student(&self, record: &StudentRecord) -> Result<StudentId, RepositoryError> {
        self.write(|state| {
            let details = person(
                &record.person_id,
                &record.first_name,
                &record.last_name,
                &record.email,
                None,
                false,
            );
            if let Some(existing) = state
                .students
                .values_mut()
                .find(|student| student.person.person_id == record.person_id)
            {
                existing.person = details;
                existing.grade_level = record.grade_level;
                return Ok(existing.id);
            }
            let id = StudentId(state.next_id());
            state.students.insert(
                id,
                Student {
                    id,
                    person: details,
                    grade_level: record.grade_level,
                },
            );
            Ok(id)
        })
    }

    fn upsert_guardian(&self, record: &GuardianRecord) -> Result<GuardianId, RepositoryError> {
        self.write(|state| {
            let details = person(
                &record.person_id,
                &record.first_name,
                &record.last_name,
                &record.email,
                record.cell_number.clone(),
                record.notify_cell(),
            );
            if let Some(existing) = state
                .guardians
                .values_mut()
                .find(|guardian| guardian.person.person_id == record.person_id)
            {
                existing.person = details;
                existing.relationship = record.relationship.clone();
                return Ok(existing.id);
            }
            let id = GuardianId(state.next_id());
            state.guardians.insert(
                id,
                Guardian {
                    id,
                    person: details,
                    relationship: record.relationship.clone(),
                },
            );
            Ok(id)
        })
    }

    fn upsert_course(&self, course_number: &str, course_name: &str) -> Result<CourseId, RepositoryError> {
        self.write(|state| {
            if let Some(existing) = state
                .courses
                .values_mut()
                .find(|course| course.course_number == course_number)
            {
                existing.course_name = course_name.to_string();
                existing.hidden = false;
                return Ok(existing.id);
            }
            let id = CourseId(state.next_id());
            state.courses.insert(
                id,
                Course {
                    id,
                    course_number: course_number.to_string(),
                    course_name: course_name.to_string(),
                    hidden: false,
                },
            );
            Ok(id)
        })
    }

    fn upsert_section(&self, upsert: &SectionUpsert) -> Result<SectionId, RepositoryError> {
        self.write(|state| {
            if !state.courses.contains_key(&upsert.course) {
                return Err(RepositoryError::not_found("course", upsert.course));
            }
            state.ensure_faculty(upsert.teacher)?;
            state.ensure_faculty(upsert.coteacher)?;

            let existing = state
                .sections
                .values()
                .find(|section| section.section_id == upsert.section_id)
                .map(|section| section.id);
            let id = match existing {
                Some(id) => id,
                None => SectionId(state.next_id()),
            };
            state.sections.insert(
                id,
                Section {
                    id,
                    section_id: upsert.section_id.clone(),
                    course: upsert.course,
                    section_number: upsert.section_number.clone(),
                    teacher: upsert.teacher,
                    coteacher: upsert.coteacher,
                    school_year: upsert.school_year.clone(),
                    room: upsert.room.clone(),
                    period: upsert.period.clone(),
                    hidden: false,
                },
            );
            Ok(id)
        })
    }

    fn hide_absent(&self, kind: RosterKind, seen: &BTreeSet<String>) -> Result<usize, RepositoryError> {
        fn hide<'a>(flags: impl Iterator<Item = (&'a str, &'a mut bool)>, seen: &BTreeSet<String>) -> usize {
            let mut hidden = 0;
            for (key, flag) in flags {
                if !*flag && !seen.contains(key) {
                    *flag = true;
                    hidden += 1;
                }
            }
            hidden
        }

        self.write(|state| {
            let count = match kind {
                RosterKind::Faculty => hide(
                    state
                        .faculty
                        .values_mut()
                        .map(|f| (f.person.person_id.as_str(), &mut f.person.hidden)),
                    seen,
                ),
                RosterKind::Students => hide(
                    state
                        .students
                        .values_mut()
                        .map(|s| (s.person.person_id.as_str(), &mut s.person.hidden)),
                    seen,
                ),
                RosterKind::Guardians => hide(
                    state
                        .guardians
                        .values_mut()
                        .map(|g| (g.person.person_id.as_str(), &mut g.person.hidden)),
                    seen,
                ),
                RosterKind::Courses => hide(
                    state
                        .courses
                        .values_mut()
                        .map(|c| (c.course_number.as_str(), &mut c.hidden)),
                    seen,
                ),
                RosterKind::Sections => hide(
                    state
                        .sections
                        .values_mut()
                        .map(|s| (s.section_id.as_str(), &mut s.hidden)),
                    seen,
                ),
            };
            Ok(count)
        })
    }

    fn set_student_guardians(
        &self,
        student: StudentId,
        guardians: &BTreeSet<GuardianId>,
    ) -> Result<(), RepositoryError> {
        self.write(|state| {
            state.student(student)?;
            for guardian in guardians {
                state.guardian(*guardian)?;
            }
            state
                .guardianships
                .retain(|(linked_student, _)| *linked_student != student);
            state
                .guardianships
                .extend(guardians.iter().map(|guardian| (student, *guardian)));
            Ok(())
        })
    }

    fn replace_enrollment(
        &self,
        enrollment: &BTreeSet<(SectionId, StudentId)>,
    ) -> Result<(), RepositoryError> {
        self.write(|state| {
            for (section, student) in enrollment {
                state.section(*section)?;
                state.student(*student)?;
            }
            state.enrollment = enrollment.clone();
            Ok(())
        })
    }
}

impl<G> TripStore for MemoryStore<G>
where
    G: DerefMut<Target = MemoryState> + Send,
{
    fn insert_trip(&self, draft: &TripDraft) -> Result<FieldTrip, RepositoryError> {
        self.write(|state| {
            for faculty in &draft.faculty {
                state.ensure_faculty(Some(*faculty))?;
            }
            let id = TripId(state.next_id());
            let trip = FieldTrip {
                id,
                details: draft.details.clone(),
                audience: draft.audience.clone(),
                faculty: draft.faculty.clone(),
                status: TripStatus::New,
                hidden: false,
            };
            state.trips.insert(id, trip.clone());
            Ok(trip)
        })
    }

    fn trip(&self, id: TripId) -> Result<FieldTrip, RepositoryError> {
        self.read(|state| {
            state
                .trips
                .get(&id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("field trip", id))
        })
    }

    fn save_trip(&self, trip: &FieldTrip) -> Result<(), RepositoryError> {
        self.write(|state| {
            for faculty in &trip.faculty {
                state.ensure_faculty(Some(*faculty))?;
            }
            match state.trips.get_mut(&trip.id) {
                Some(stored) => {
                    *stored = trip.clone();
                    Ok(())
                }
                None => Err(RepositoryError::not_found("field trip", trip.id)),
            }
        })
    }

    fn list_trips(&self, include_hidden: bool) -> Result<Vec<FieldTrip>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .trips
                .values()
                .filter(|trip| include_hidden || !trip.hidden)
                .cloned()
                .collect())
        })
    }
}

impl<G> SlipStore for MemoryStore<G>
where
    G: DerefMut<Target = MemoryState> + Send,
{
    fn find_slip(
        &self,
        trip: TripId,
        student: StudentId,
    ) -> Result<Option<PermissionSlip>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .slip_index
                .get(&(trip, student))
                .and_then(|id| state.slips.get(id))
                .cloned())
        })
    }

    fn insert_slip(&self, trip: TripId, student: StudentId) -> Result<PermissionSlip, RepositoryError> {
        self.write(|state| {
            if !state.trips.contains_key(&trip) {
                return Err(RepositoryError::not_found("field trip", trip));
            }
            state.student(student)?;
            if state.slip_index.contains_key(&(trip, student)) {
                return Err(RepositoryError::Conflict {
                    entity: "permission slip",
                });
            }
            let slip = PermissionSlip::new(SlipId(state.next_id()), trip, student);
            state.slip_index.insert((trip, student), slip.id);
            state.slips.insert(slip.id, slip.clone());
            Ok(slip)
        })
    }

    fn slip(&self, id: SlipId) -> Result<PermissionSlip, RepositoryError> {
        self.read(|state| {
            state
                .slips
                .get(&id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("permission slip", id))
        })
    }

    fn slips_for_trip(&self, trip: TripId) -> Result<Vec<PermissionSlip>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .slips
                .values()
                .filter(|slip| slip.field_trip == trip)
                .cloned()
                .collect())
        })
    }

    fn save_slip(&self, slip: &PermissionSlip) -> Result<(), RepositoryError> {
        self.write(|state| {
            if let Some(signature) = &slip.guardian_signature {
                state.guardian(signature.guardian)?;
            }
            match state.slips.get_mut(&slip.id) {
                Some(stored) if stored.field_trip == slip.field_trip && stored.student == slip.student => {
                    *stored = slip.clone();
                    Ok(())
                }
                Some(_) => Err(RepositoryError::Corrupt {
                    entity: "permission slip",
                    detail: "trip and student of a slip cannot change".to_string(),
                }),
                None => Err(RepositoryError::not_found("permission slip", slip.id)),
            }
        })
    }

    fn find_link(
        &self,
        slip: SlipId,
        subject: LinkSubject,
    ) -> Result<Option<PermissionSlipLink>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .link_index
                .get(&(slip, subject))
                .and_then(|id| state.links.get(id))
                .cloned())
        })
    }

    fn insert_link(&self, link: &NewSlipLink) -> Result<PermissionSlipLink, RepositoryError> {
        self.write(|state| {
            if !state.slips.contains_key(&link.permission_slip) {
                return Err(RepositoryError::not_found(
                    "permission slip",
                    link.permission_slip,
                ));
            }
            match link.subject {
                LinkSubject::Student(student) => {
                    state.student(student)?;
                }
                LinkSubject::Guardian(guardian) => {
                    state.guardian(guardian)?;
                }
            }
            if state
                .link_index
                .contains_key(&(link.permission_slip, link.subject))
                || state.token_index.contains_key(link.link_id.as_str())
            {
                return Err(RepositoryError::Conflict {
                    entity: "permission slip link",
                });
            }
            let stored = PermissionSlipLink {
                id: SlipLinkId(state.next_id()),
                permission_slip: link.permission_slip,
                subject: link.subject,
                link_id: link.link_id.clone(),
                last_sent: None,
            };
            state
                .link_index
                .insert((stored.permission_slip, stored.subject), stored.id);
            state
                .token_index
                .insert(stored.link_id.as_str().to_string(), stored.id);
            state.links.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn link_by_token(&self, token: &str) -> Result<PermissionSlipLink, RepositoryError> {
        self.read(|state| {
            state
                .token_index
                .get(token)
                .and_then(|id| state.links.get(id))
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("permission slip link", token))
        })
    }

    fn links_for_slip(&self, slip: SlipId) -> Result<Vec<PermissionSlipLink>, RepositoryError> {
        self.read(|state| {
            Ok(state
                .links
                .values()
                .filter(|link| link.permission_slip == slip)
                .cloned()
                .collect())
        })
    }

    fn mark_sent(&self, link: SlipLinkId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.write(|state| match state.links.get_mut(&link) {
            Some(stored) => {
                stored.last_sent = Some(at);
                Ok(())
            }
            None => Err(RepositoryError::not_found("permission slip link", link)),
        })
    }
}

impl<G> PermissionStore for MemoryStore<G>
where
    G: DerefMut<Target = MemoryState> + Send,
{
    fn atomically(&self, work: &mut AtomicWork<'_>) -> Result<(), PermissionError> {
        let mut guard = self.lock()?;
        let snapshot = (**guard).clone();
        let result = {
            let view = MemoryStore {
                state: Mutex::new(&mut **guard),
            };
            work(&view)
        };
        if result.is_err() {
            **guard = snapshot;
        }
        result
    }
}
