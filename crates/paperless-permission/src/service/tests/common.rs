use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::ids::{CourseId, FacultyId, GuardianId, SectionId, StudentId, TripId};
use crate::roster::{FacultyRecord, GradeLevel, GuardianRecord, SectionUpsert, StudentRecord};
use crate::service::{
    BackgroundTask, DispatchError, MailError, Mailer, PermissionSlipService, TaskQueue,
};
use crate::slips::{OutboundEmail, SlipSettings};
use crate::store::{MemoryStore, RosterStore};
use crate::trips::{AudienceCriteria, TripDetails, TripDraft};

pub(super) type TestService = PermissionSlipService<MemoryStore, MemoryTasks>;

pub(super) const SALT: &str = "test-salt";

pub(super) fn settings() -> SlipSettings {
    SlipSettings {
        link_salt: SALT.to_string(),
        base_url: "https://slips.example.test".to_string(),
        from_address: "trips@example.test".to_string(),
        signature: "Activities Office".to_string(),
    }
}

pub(super) fn service() -> (Arc<MemoryStore>, Arc<MemoryTasks>, TestService) {
    let store = Arc::new(MemoryStore::new());
    let tasks = Arc::new(MemoryTasks::default());
    let service = PermissionSlipService::new(store.clone(), tasks.clone(), settings());
    (store, tasks, service)
}

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
}

pub(super) fn coordinator(store: &MemoryStore, person_id: &str, email: &str) -> FacultyId {
    store
        .upsert_faculty(&FacultyRecord {
            person_id: person_id.to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: email.to_string(),
            preferred_name: "Ms. Hopper".to_string(),
        })
        .expect("faculty stored")
}

pub(super) fn student(store: &MemoryStore, person_id: &str, grade_level: GradeLevel) -> StudentId {
    store
        .upsert_student(&StudentRecord {
            person_id: person_id.to_string(),
            first_name: "Student".to_string(),
            last_name: person_id.to_string(),
            email: format!("{}@students.example.test", person_id.to_lowercase()),
            grade_level,
        })
        .expect("student stored")
}

/// Stores the guardians and makes them the student's full guardian set.
pub(super) fn guardians(
    store: &MemoryStore,
    student: StudentId,
    person_ids: &[&str],
) -> Vec<GuardianId> {
    let ids: Vec<GuardianId> = person_ids
        .iter()
        .map(|person_id| {
            store
                .upsert_guardian(&GuardianRecord {
                    person_id: person_id.to_string(),
                    first_name: "Parent".to_string(),
                    last_name: person_id.to_string(),
                    email: format!("{}@family.example.test", person_id.to_lowercase()),
                    cell_number: None,
                    relationship: "Parent".to_string(),
                })
                .expect("guardian stored")
        })
        .collect();
    store
        .set_student_guardians(student, &ids.iter().copied().collect())
        .expect("guardians linked");
    ids
}

pub(super) fn course_with_sections(
    store: &MemoryStore,
    course_number: &str,
    section_ids: &[&str],
) -> (CourseId, Vec<SectionId>) {
    let course = store
        .upsert_course(course_number, "Earth Science")
        .expect("course stored");
    let sections = section_ids
        .iter()
        .enumerate()
        .map(|(index, section_id)| {
            store
                .upsert_section(&SectionUpsert {
                    section_id: section_id.to_string(),
                    course,
                    section_number: (index + 1).to_string(),
                    teacher: None,
                    coteacher: None,
                    school_year: "2026-2027".to_string(),
                    room: "B12".to_string(),
                    period: "3".to_string(),
                })
                .expect("section stored")
        })
        .collect();
    (course, sections)
}

pub(super) fn enroll(store: &MemoryStore, pairs: &[(SectionId, StudentId)]) {
    store
        .replace_enrollment(&pairs.iter().copied().collect())
        .expect("enrollment stored");
}

pub(super) fn details(name: &str) -> TripDetails {
    let morning = NaiveTime::from_hms_opt(8, 30, 0).expect("valid time");
    let afternoon = NaiveTime::from_hms_opt(15, 0, 0).expect("valid time");
    TripDetails {
        name: name.to_string(),
        group_name: "Science Department".to_string(),
        location: "Natural History Museum".to_string(),
        start_date: date(11, 12),
        dropoff_time: morning,
        dropoff_location: "Front circle".to_string(),
        end_date: date(11, 12),
        pickup_time: afternoon,
        pickup_location: "Front circle".to_string(),
        due_date: date(11, 5),
    }
}

pub(super) fn draft(faculty: FacultyId, audience: AudienceCriteria) -> TripDraft {
    TripDraft {
        details: details("Museum Visit"),
        audience,
        faculty: BTreeSet::from([faculty]),
    }
}

pub(super) fn invite_students(students: &[StudentId]) -> AudienceCriteria {
    AudienceCriteria {
        students: students.iter().copied().collect(),
        ..AudienceCriteria::default()
    }
}

/// Creates a trip and walks it to RELEASED.
pub(super) fn released_trip(service: &TestService, draft: TripDraft) -> TripId {
    let trip = service.create_trip(draft).expect("trip created");
    assert!(service.approve(trip.id).expect("approve"));
    service.release(trip.id).expect("release");
    trip.id
}

#[derive(Default)]
pub(super) struct MemoryTasks {
    queued: Mutex<Vec<BackgroundTask>>,
}

impl MemoryTasks {
    pub(super) fn queued(&self) -> Vec<BackgroundTask> {
        self.queued.lock().expect("lock").clone()
    }
}

impl TaskQueue for MemoryTasks {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), DispatchError> {
        self.queued.lock().expect("lock").push(task);
        Ok(())
    }
}

pub(super) struct UnavailableTasks;

impl TaskQueue for UnavailableTasks {
    fn enqueue(&self, _task: BackgroundTask) -> Result<(), DispatchError> {
        Err(DispatchError::Unavailable("worker offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("lock").clone()
    }
}

impl Mailer for MemoryMailer {
    fn send_mass(&self, emails: &[OutboundEmail]) -> Result<usize, MailError> {
        self.sent.lock().expect("lock").extend_from_slice(emails);
        Ok(emails.len())
    }
}

pub(super) struct UnavailableMailer;

impl Mailer for UnavailableMailer {
    fn send_mass(&self, _emails: &[OutboundEmail]) -> Result<usize, MailError> {
        Err(MailError::Transport("smtp relay refused connection".to_string()))
    }
}
