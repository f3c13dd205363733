use std::sync::Arc;

use super::common::*;
use crate::error::PermissionError;
use crate::ids::{GuardianId, StudentId, TripId};
use crate::roster::GradeLevel;
use crate::service::{BackgroundTask, TaskError, TaskRunner};
use crate::slips::{LinkSubject, SignatureSubmission};
use crate::store::{MemoryStore, SlipStore};
use crate::trips::{AudienceCriteria, TripStatus};

#[test]
fn one_email_per_link_addressed_to_each_party() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    guardians(&store, ada, &["G1"]);
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada])));
    let mut slip = store.find_slip(trip, ada).expect("lookup").expect("slip");
    slip.due_date = Some(date(11, 8));
    store.save_slip(&slip).expect("due date override");

    let emails = service
        .render_notification_emails(slip.id)
        .expect("rendered");
    assert_eq!(emails.len(), 2);

    let links = store.links_for_slip(slip.id).expect("links");
    let student_link = links
        .iter()
        .find(|link| link.subject == LinkSubject::Student(ada))
        .expect("student link");
    let student_email = emails
        .iter()
        .find(|email| email.link == student_link.id)
        .expect("student email");
    assert_eq!(student_email.subject, "New Permission Slip for Museum Visit");
    assert_eq!(student_email.to, vec!["s1@students.example.test".to_string()]);
    assert_eq!(student_email.from, "trips@example.test");
    assert!(student_email.body.starts_with("Student S1,\n\n"));
    assert!(student_email.body.contains(&format!(
        "Permission Slip Link (click): https://slips.example.test/slip/{}",
        student_link.link_id
    )));
    assert!(student_email.body.contains("by the due date, 2026-11-08."));
    assert!(student_email.body.ends_with("-- \nActivities Office"));

    let guardian_email = emails
        .iter()
        .find(|email| email.link != student_link.id)
        .expect("guardian email");
    assert_eq!(guardian_email.subject, "New Permission Slip for Student S1");
    assert_eq!(guardian_email.to, vec!["g1@family.example.test".to_string()]);
    assert!(guardian_email
        .body
        .contains("for your student, Student S1."));
    assert!(guardian_email.body.contains("Location: Natural History Museum"));
    assert!(guardian_email.body.contains("Date: 2026-11-12"));
}

#[test]
fn batches_require_a_released_trip() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service
        .generate_permission_slips(trip.id, false)
        .expect("generated");

    let err = service
        .trip_notification_batch(trip.id)
        .expect_err("new trips send nothing");
    assert!(matches!(
        err,
        PermissionError::NotificationsNotPermitted {
            status: TripStatus::New
        }
    ));
    assert_eq!(
        err.friendly_message(),
        "Emails can only be sent for released trips."
    );
}

#[test]
fn batches_skip_complete_slips() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let alan = student(&store, "S2", GradeLevel::Junior);
    let ada_guardian = guardians(&store, ada, &["G1"])[0];
    guardians(&store, alan, &["G2"]);
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada, alan])));

    let slip = store.find_slip(trip, ada).expect("lookup").expect("slip");
    for subject in [LinkSubject::Student(ada), LinkSubject::Guardian(ada_guardian)] {
        let link = store
            .find_link(slip.id, subject)
            .expect("lookup")
            .expect("link");
        service
            .submit_signature_at(
                link.link_id.as_str(),
                &SignatureSubmission::new("Signed Name", true),
                at(2, 10),
            )
            .expect("signed");
    }

    let batch = service.trip_notification_batch(trip).expect("batch");
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|email| email.slip != slip.id));
    assert!(service
        .slip_notification_batch(slip.id)
        .expect("slip batch")
        .is_empty());
}

#[test]
fn runner_sends_trip_notifications_and_stamps_links() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    guardians(&store, ada, &["G1", "G2"]);
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada])));

    let mailer = Arc::new(MemoryMailer::default());
    let runner = TaskRunner::new(Arc::new(service), mailer.clone());
    let outcome = runner
        .run(BackgroundTask::SendTripNotifications { trip })
        .expect("task ran");

    assert_eq!(outcome.emails_sent, 3);
    assert_eq!(mailer.sent().len(), 3);
    let slip = store.find_slip(trip, ada).expect("lookup").expect("slip");
    assert!(store
        .links_for_slip(slip.id)
        .expect("links")
        .iter()
        .all(|link| link.last_sent.is_some()));
}

#[test]
fn runner_generation_without_notify_sends_nothing() {
    let (store, tasks, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");

    let mailer = Arc::new(MemoryMailer::default());
    let runner = TaskRunner::new(Arc::new(service), mailer.clone());
    for task in tasks.queued() {
        let outcome = runner.run(task).expect("task ran");
        assert_eq!(outcome.generated.map(|summary| summary.slips_created), Some(1));
        assert_eq!(outcome.emails_sent, 0);
    }
    assert!(mailer.sent().is_empty());
}

#[test]
fn resend_tops_up_links_first() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    guardians(&store, ada, &["G1"]);
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada])));
    guardians(&store, ada, &["G1", "G5"]);
    let slip = store.find_slip(trip, ada).expect("lookup").expect("slip");

    let mailer = Arc::new(MemoryMailer::default());
    let runner = TaskRunner::new(Arc::new(service), mailer.clone());
    let outcome = runner
        .run(BackgroundTask::ResendPermissionSlip { slip: slip.id })
        .expect("task ran");

    assert_eq!(outcome.emails_sent, 3);
    assert!(mailer
        .sent()
        .iter()
        .any(|email| email.to == vec!["g5@family.example.test".to_string()]));
}

#[test]
fn mail_failures_leave_links_unstamped() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada])));

    let runner = TaskRunner::new(Arc::new(service), Arc::new(UnavailableMailer));
    let err = runner
        .run(BackgroundTask::SendTripNotifications { trip })
        .expect_err("mailer down");
    assert!(matches!(err, TaskError::Mail(_)));

    let slip = store.find_slip(trip, ada).expect("lookup").expect("slip");
    assert!(store
        .links_for_slip(slip.id)
        .expect("links")
        .iter()
        .all(|link| link.last_sent.is_none()));
}

#[test]
fn status_report_counts_completed_slips() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let alan = student(&store, "S2", GradeLevel::Senior);
    let guardian = guardians(&store, ada, &["G1"])[0];
    let trip = released_trip(&service, draft(faculty, invite_students(&[ada, alan])));
    sign_everything(&store, &service, trip, ada, guardian);

    let report = service.trip_status(trip).expect("report");
    assert_eq!(report.total, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.status, TripStatus::Released);

    let done = report
        .rows
        .iter()
        .find(|row| row.student_person_id == "S1")
        .expect("row for S1");
    assert_eq!(done.guardian_name, Some("Parent G1".to_string()));
    assert_eq!(done.completed_at, Some(at(2, 11)));
    let outstanding: Vec<_> = report
        .outstanding()
        .map(|row| row.student_person_id.as_str())
        .collect();
    assert_eq!(outstanding, vec!["S2"]);

    let mut csv = Vec::new();
    report.write_csv(&mut csv).expect("csv");
    let csv = String::from_utf8(csv).expect("utf8");
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn empty_audience_release_creates_no_slips() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let trip = released_trip(&service, draft(faculty, AudienceCriteria::default()));
    assert!(service.trip_notification_batch(trip).expect("batch").is_empty());
    assert!(store.slips_for_trip(trip).expect("slips").is_empty());
}

fn sign_everything(
    store: &MemoryStore,
    service: &TestService,
    trip: TripId,
    student: StudentId,
    guardian: GuardianId,
) {
    let slip = store
        .find_slip(trip, student)
        .expect("lookup")
        .expect("slip");
    for (subject, hour) in [
        (LinkSubject::Student(student), 10),
        (LinkSubject::Guardian(guardian), 11),
    ] {
        let link = store
            .find_link(slip.id, subject)
            .expect("lookup")
            .expect("link");
        service
            .submit_signature_at(
                link.link_id.as_str(),
                &SignatureSubmission::new("Signed Name", true),
                at(2, hour),
            )
            .expect("signed");
    }
}
