use super::common::*;
use crate::error::PermissionError;
use crate::roster::GradeLevel;
use crate::service::GenerationSummary;
use crate::slips::{LinkSubject, LinkToken};
use crate::store::SlipStore;
use crate::trips::AudienceCriteria;

#[test]
fn second_run_on_unchanged_roster_creates_nothing() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let alan = student(&store, "S2", GradeLevel::Junior);
    guardians(&store, ada, &["G1", "G2"]);
    guardians(&store, alan, &["G3"]);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada, alan])))
        .expect("trip created");

    let first = service
        .generate_permission_slips(trip.id, false)
        .expect("first run");
    assert_eq!(
        first,
        GenerationSummary {
            audience: 2,
            slips_created: 2,
            links_created: 5,
        }
    );

    let second = service
        .generate_permission_slips(trip.id, false)
        .expect("second run");
    assert_eq!(second.audience, 2);
    assert_eq!(second.slips_created, 0);
    assert_eq!(second.links_created, 0);

    let state = store.snapshot().expect("snapshot");
    assert_eq!(state.slip_count(), 2);
    assert_eq!(state.link_count(), 5);
}

#[test]
fn student_in_two_invited_sections_gets_one_slip() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Senior);
    let (_, sections) = course_with_sections(&store, "210", &["210-1", "210-2"]);
    enroll(&store, &[(sections[0], ada), (sections[1], ada)]);

    let audience = AudienceCriteria {
        sections: sections.iter().copied().collect(),
        ..AudienceCriteria::default()
    };
    let trip = service
        .create_trip(draft(faculty, audience))
        .expect("trip created");

    let summary = service
        .generate_permission_slips(trip.id, false)
        .expect("generated");
    assert_eq!(summary.audience, 1);
    assert_eq!(store.slips_for_trip(trip.id).expect("slips").len(), 1);
}

#[test]
fn course_invitation_reaches_every_section_once() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Freshman);
    let alan = student(&store, "S2", GradeLevel::Freshman);
    guardians(&store, ada, &["G1", "G2"]);
    let (course, sections) = course_with_sections(&store, "105", &["105-1", "105-2"]);
    enroll(
        &store,
        &[(sections[0], ada), (sections[1], ada), (sections[1], alan)],
    );

    let audience = AudienceCriteria {
        courses: [course].into_iter().collect(),
        ..AudienceCriteria::default()
    };
    let trip = service
        .create_trip(draft(faculty, audience))
        .expect("trip created");
    service
        .generate_permission_slips(trip.id, false)
        .expect("generated");

    let slip = store
        .find_slip(trip.id, ada)
        .expect("lookup")
        .expect("slip for the overlapping student");
    let links = store.links_for_slip(slip.id).expect("links");
    let guardian_links = links
        .iter()
        .filter(|link| link.subject.guardian().is_some())
        .count();
    assert_eq!(links.len(), 3);
    assert_eq!(guardian_links, 2);
    assert_eq!(store.slips_for_trip(trip.id).expect("slips").len(), 2);
}

#[test]
fn grade_level_adds_to_explicit_invitees() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let senior = student(&store, "S1", GradeLevel::Senior);
    let junior = student(&store, "S2", GradeLevel::Junior);
    let other_junior = student(&store, "S3", GradeLevel::Junior);

    let audience = AudienceCriteria {
        grade_level: Some(GradeLevel::Junior),
        ..invite_students(&[senior])
    };
    let trip = service
        .create_trip(draft(faculty, audience))
        .expect("trip created");

    let audience = service.resolve_audience(trip.id).expect("audience");
    assert_eq!(audience, [senior, junior, other_junior].into_iter().collect());
}

#[test]
fn archived_trip_requires_force() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service.archive(trip.id).expect("archived");

    match service.generate_permission_slips(trip.id, false) {
        Err(PermissionError::ArchivedTrip { trip: refused }) => assert_eq!(refused, trip.id),
        other => panic!("expected archived trip error, got {other:?}"),
    }
    assert!(store.slips_for_trip(trip.id).expect("slips").is_empty());

    let forced = service
        .generate_permission_slips(trip.id, true)
        .expect("forced run");
    assert_eq!(forced.slips_created, 1);
}

#[test]
fn existing_slips_only_gain_links_through_top_up() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    guardians(&store, ada, &["G1"]);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service
        .generate_permission_slips(trip.id, false)
        .expect("generated");

    guardians(&store, ada, &["G1", "G4"]);
    let rerun = service
        .generate_permission_slips(trip.id, false)
        .expect("rerun");
    assert_eq!(rerun.links_created, 0);

    let slip = store
        .find_slip(trip.id, ada)
        .expect("lookup")
        .expect("slip");
    assert_eq!(service.generate_slip_links(slip.id).expect("top up"), 1);
    assert_eq!(service.generate_slip_links(slip.id).expect("top up again"), 0);
    assert_eq!(store.links_for_slip(slip.id).expect("links").len(), 3);
}

#[test]
fn link_tokens_follow_salt_slip_and_person() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let guardian = guardians(&store, ada, &["G1"])[0];
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service
        .generate_permission_slips(trip.id, false)
        .expect("generated");

    let slip = store
        .find_slip(trip.id, ada)
        .expect("lookup")
        .expect("slip");
    let student_link = store
        .find_link(slip.id, LinkSubject::Student(ada))
        .expect("lookup")
        .expect("student link");
    let guardian_link = store
        .find_link(slip.id, LinkSubject::Guardian(guardian))
        .expect("lookup")
        .expect("guardian link");

    assert_eq!(student_link.link_id, LinkToken::derive(SALT, slip.id, "S1"));
    assert_eq!(guardian_link.link_id, LinkToken::derive(SALT, slip.id, "G1"));
    assert_ne!(student_link.link_id, guardian_link.link_id);
}

#[test]
fn guardian_sharing_the_student_person_id_is_skipped() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "100", GradeLevel::Junior);
    let family = guardians(&store, ada, &["100", "G2"]);
    let (same, other) = (family[0], family[1]);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service.approve(trip.id).expect("approved");

    let summary = service.release(trip.id).expect("released despite shared person id");
    assert_eq!(summary.slips_created, 1);
    assert_eq!(summary.links_created, 2);

    let slip = store
        .find_slip(trip.id, ada)
        .expect("lookup")
        .expect("slip");
    let student_link = store
        .find_link(slip.id, LinkSubject::Student(ada))
        .expect("lookup")
        .expect("student link");
    assert_eq!(student_link.link_id, LinkToken::derive(SALT, slip.id, "100"));
    assert_eq!(
        store
            .find_link(slip.id, LinkSubject::Guardian(same))
            .expect("lookup"),
        None
    );
    assert!(store
        .find_link(slip.id, LinkSubject::Guardian(other))
        .expect("lookup")
        .is_some());
    assert_eq!(service.generate_slip_links(slip.id).expect("top up"), 0);
}
