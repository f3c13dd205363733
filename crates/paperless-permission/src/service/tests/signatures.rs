use super::common::*;
use crate::error::{PermissionError, ValidationError};
use crate::ids::{GuardianId, StudentId, TripId};
use crate::roster::GradeLevel;
use crate::slips::{LinkSubject, PermissionSlip, SignatureSubmission, SignerRole};
use crate::store::{MemoryStore, SlipStore};

struct Signing {
    trip: TripId,
    student: StudentId,
    guardians: Vec<GuardianId>,
}

fn released(store: &MemoryStore, service: &TestService) -> Signing {
    let faculty = coordinator(store, "F1", "hopper@example.test");
    let student = student(store, "S1", GradeLevel::Sophomore);
    let guardians = guardians(store, student, &["G1", "G2", "G3"]);
    let trip = released_trip(service, draft(faculty, invite_students(&[student])));
    Signing {
        trip,
        student,
        guardians,
    }
}

fn token(store: &MemoryStore, signing: &Signing, subject: LinkSubject) -> String {
    let slip = slip(store, signing);
    store
        .find_link(slip.id, subject)
        .expect("lookup")
        .expect("link")
        .link_id
        .as_str()
        .to_string()
}

fn slip(store: &MemoryStore, signing: &Signing) -> PermissionSlip {
    store
        .find_slip(signing.trip, signing.student)
        .expect("lookup")
        .expect("slip")
}

#[test]
fn missing_consent_leaves_the_slip_untouched() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let student_token = token(&store, &signing, LinkSubject::Student(signing.student));

    let err = service
        .submit_signature_at(
            &student_token,
            &SignatureSubmission::new("Sam Student", false),
            at(3, 9),
        )
        .expect_err("consent is required");
    assert!(matches!(
        err,
        PermissionError::Validation(ValidationError::MissingConsent)
    ));
    assert_eq!(slip(&store, &signing).student_signature, None);
}

#[test]
fn student_link_fills_the_student_slot() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let student_token = token(&store, &signing, LinkSubject::Student(signing.student));

    let signed = service
        .submit_signature_at(
            &student_token,
            &SignatureSubmission::new("  Sam Student ", true),
            at(3, 9),
        )
        .expect("signed");
    let signature = signed.student_signature.clone().expect("student signature");
    assert_eq!(signature.name, "Sam Student");
    assert_eq!(signature.signed_at, at(3, 9));
    assert_eq!(signed.guardian_signature, None);
    assert!(!signed.is_complete());
}

#[test]
fn later_guardian_replaces_the_earlier_signature() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let first = token(&store, &signing, LinkSubject::Guardian(signing.guardians[0]));
    let third = token(&store, &signing, LinkSubject::Guardian(signing.guardians[2]));

    service
        .submit_signature_at(&first, &SignatureSubmission::new("Pat One", true), at(3, 9))
        .expect("first guardian signs");
    let slip = service
        .submit_signature_at(&third, &SignatureSubmission::new("Lee Three", true), at(4, 9))
        .expect("third guardian signs");

    let guardian = slip.guardian_signature.expect("guardian signature");
    assert_eq!(guardian.guardian, signing.guardians[2]);
    assert_eq!(guardian.name, "Lee Three");
    assert!(guardian.signed_at > at(3, 9));
}

#[test]
fn complete_slip_is_frozen() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let student_token = token(&store, &signing, LinkSubject::Student(signing.student));
    let guardian_token = token(&store, &signing, LinkSubject::Guardian(signing.guardians[1]));

    service
        .submit_signature_at(
            &guardian_token,
            &SignatureSubmission::new("Robin Two", true),
            at(5, 8),
        )
        .expect("guardian signs");
    let complete = service
        .submit_signature_at(
            &student_token,
            &SignatureSubmission::new("Sam Student", true),
            at(5, 7),
        )
        .expect("student signs");
    assert!(complete.is_complete());
    assert_eq!(complete.completed_at(), Some(at(5, 8)));

    let err = service
        .submit_signature_at(
            &guardian_token,
            &SignatureSubmission::new("Someone Else", true),
            at(6, 8),
        )
        .expect_err("complete slips reject submissions");
    assert!(matches!(
        err,
        PermissionError::Validation(ValidationError::SlipComplete)
    ));
    let stored = slip(&store, &signing);
    assert_eq!(
        stored.guardian_signature.map(|signature| signature.name),
        Some("Robin Two".to_string())
    );
}

#[test]
fn unknown_token_is_not_found() {
    let (store, _, service) = service();
    released(&store, &service);

    let err = service
        .submit_signature(
            "0000000000000000000000000000000000000000000000000000000000000000",
            &SignatureSubmission::new("Sam Student", true),
        )
        .expect_err("unknown link");
    assert!(err.is_not_found());
}

#[test]
fn archived_trips_refuse_signatures() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let student_token = token(&store, &signing, LinkSubject::Student(signing.student));
    service.archive(signing.trip).expect("archived");

    let err = service
        .submit_signature(&student_token, &SignatureSubmission::new("Sam Student", true))
        .expect_err("archived trip");
    assert!(matches!(err, PermissionError::ArchivedTrip { .. }));
    assert_eq!(slip(&store, &signing).student_signature, None);
}

#[test]
fn slip_page_reports_role_and_signer() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let guardian_token = token(&store, &signing, LinkSubject::Guardian(signing.guardians[0]));

    let blank = service.slip_page(&guardian_token).expect("page");
    assert_eq!(blank.role, SignerRole::Guardian(signing.guardians[0]));
    assert_eq!(blank.student_name, "Student S1");
    assert_eq!(blank.due_date, date(11, 5));
    assert_eq!(blank.guardian_name, None);
    assert!(!blank.is_complete());

    service
        .submit_signature_at(
            &guardian_token,
            &SignatureSubmission::new("Pat One", true),
            at(3, 9),
        )
        .expect("signed");
    let signed = service.slip_page(&guardian_token).expect("page");
    assert_eq!(signed.guardian_name, Some("Parent G1".to_string()));
    assert_eq!(signed.guardian_signed_at, Some(at(3, 9)));
}

#[test]
fn reset_and_review_flag_round_out_the_slip() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let student_token = token(&store, &signing, LinkSubject::Student(signing.student));
    service
        .submit_signature_at(
            &student_token,
            &SignatureSubmission::new("Sam Student", true),
            at(3, 9),
        )
        .expect("signed");
    let slip_id = slip(&store, &signing).id;

    let flagged = service.flag_for_review(slip_id, true).expect("flagged");
    assert!(flagged.flagged_for_review);

    let reset = service.reset_slip(slip_id).expect("reset");
    assert_eq!(reset.student_signature, None);
    assert_eq!(reset.guardian_signature, None);
    assert!(!reset.flagged_for_review);
    assert_eq!(slip(&store, &signing), reset);

    service.archive(signing.trip).expect("archived");
    assert!(matches!(
        service.reset_slip(slip_id),
        Err(PermissionError::ArchivedTrip { .. })
    ));
}

#[test]
fn slip_due_date_override_falls_back_to_the_trip() {
    let (store, _, service) = service();
    let signing = released(&store, &service);
    let slip_id = slip(&store, &signing).id;

    let moved = service
        .set_slip_due_date(slip_id, Some(date(11, 9)))
        .expect("due date set");
    assert_eq!(moved.due_date, Some(date(11, 9)));
    let report = service.trip_status(signing.trip).expect("status");
    assert_eq!(report.rows[0].due_date, date(11, 9));

    let cleared = service.set_slip_due_date(slip_id, None).expect("cleared");
    assert_eq!(cleared.due_date, None);
    let report = service.trip_status(signing.trip).expect("status");
    assert_eq!(report.rows[0].due_date, date(11, 5));

    service.archive(signing.trip).expect("archived");
    assert!(matches!(
        service.set_slip_due_date(slip_id, Some(date(11, 9))),
        Err(PermissionError::ArchivedTrip { .. })
    ));
    assert_eq!(slip(&store, &signing).due_date, None);
}
