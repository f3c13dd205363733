use std::sync::Arc;

use super::common::*;
use crate::error::{PermissionError, ValidationError};
use crate::ids::StudentId;
use crate::roster::GradeLevel;
use crate::service::{BackgroundTask, PermissionSlipService};
use crate::store::{MemoryStore, SlipStore, TripStore};
use crate::trips::{AudienceCriteria, TripStatus};

#[test]
fn create_trip_queues_speculative_generation() {
    let (store, tasks, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let trip = service
        .create_trip(draft(faculty, AudienceCriteria::default()))
        .expect("trip created");

    assert_eq!(trip.status, TripStatus::New);
    assert!(!trip.hidden);
    assert_eq!(
        tasks.queued(),
        vec![BackgroundTask::GeneratePermissionSlips {
            trip: trip.id,
            notify: false,
        }]
    );
}

#[test]
fn create_trip_rejects_drafts_without_coordinators() {
    let (store, tasks, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let mut draft = draft(faculty, AudienceCriteria::default());
    draft.faculty.clear();

    match service.create_trip(draft) {
        Err(PermissionError::Validation(ValidationError::MissingCoordinator)) => {}
        other => panic!("expected missing coordinator, got {other:?}"),
    }
    assert!(store.list_trips(true).expect("trips").is_empty());
    assert!(tasks.queued().is_empty());
}

#[test]
fn dispatch_failures_do_not_fail_the_operation() {
    let store = Arc::new(MemoryStore::new());
    let service = PermissionSlipService::new(store.clone(), Arc::new(UnavailableTasks), settings());
    let faculty = coordinator(&store, "F1", "hopper@example.test");

    let trip = service
        .create_trip(draft(faculty, AudienceCriteria::default()))
        .expect("trip created despite the queue being down");
    assert_eq!(store.trip(trip.id).expect("stored").status, TripStatus::New);
}

#[test]
fn release_from_new_is_rejected_without_changes() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");

    let err = service.release(trip.id).expect_err("release from NEW");
    match &err {
        PermissionError::InvalidStateTransition { from, to } => {
            assert_eq!(*from, TripStatus::New);
            assert_eq!(*to, TripStatus::Released);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(err.friendly_message(), "Cannot release this trip.");
    assert_eq!(store.trip(trip.id).expect("stored").status, TripStatus::New);
    assert!(store.slips_for_trip(trip.id).expect("slips").is_empty());
}

#[test]
fn approving_twice_is_a_no_op() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let trip = service
        .create_trip(draft(faculty, AudienceCriteria::default()))
        .expect("trip created");

    assert!(service.approve(trip.id).expect("first approval"));
    assert!(!service.approve(trip.id).expect("second approval"));
    assert_eq!(
        store.trip(trip.id).expect("stored").status,
        TripStatus::Approved
    );
}

#[test]
fn release_generates_slips_with_the_transition() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    guardians(&store, ada, &["G1"]);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada])))
        .expect("trip created");
    service.approve(trip.id).expect("approved");

    let summary = service.release(trip.id).expect("released");
    assert_eq!(summary.slips_created, 1);
    assert_eq!(summary.links_created, 2);
    assert_eq!(
        store.trip(trip.id).expect("stored").status,
        TripStatus::Released
    );

    let again = service.release(trip.id).expect_err("second release");
    assert!(matches!(
        again,
        PermissionError::InvalidStateTransition {
            from: TripStatus::Released,
            ..
        }
    ));
}

#[test]
fn failed_generation_rolls_back_the_release() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let ada = student(&store, "S1", GradeLevel::Junior);
    let trip = service
        .create_trip(draft(faculty, invite_students(&[ada, StudentId(9_999)])))
        .expect("trip created");
    service.approve(trip.id).expect("approved");

    let err = service.release(trip.id).expect_err("unknown invitee");
    assert!(err.is_not_found());
    assert_eq!(
        store.trip(trip.id).expect("stored").status,
        TripStatus::Approved
    );
    assert!(store.slips_for_trip(trip.id).expect("slips").is_empty());
}

#[test]
fn archive_hides_the_trip_and_freezes_edits() {
    let (store, tasks, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let trip = service
        .create_trip(draft(faculty, AudienceCriteria::default()))
        .expect("trip created");

    let archived = service.archive(trip.id).expect("archived");
    assert_eq!(archived.status, TripStatus::Archived);
    assert!(archived.hidden);
    assert!(service.trips(false).expect("visible").is_empty());
    assert_eq!(service.trips(true).expect("all").len(), 1);

    let mut edit = draft(faculty, AudienceCriteria::default());
    edit.details.location = "Planetarium".to_string();
    match service.update_trip(trip.id, edit.clone(), false) {
        Err(PermissionError::ArchivedTrip { .. }) => {}
        other => panic!("expected archived trip error, got {other:?}"),
    }

    let queued_before = tasks.queued().len();
    let forced = service
        .update_trip(trip.id, edit, true)
        .expect("forced edit");
    assert_eq!(forced.details.location, "Planetarium");
    assert_eq!(forced.status, TripStatus::Archived);
    assert_eq!(tasks.queued().len(), queued_before);
}

#[test]
fn archive_is_allowed_from_released() {
    let (store, _, service) = service();
    let faculty = coordinator(&store, "F1", "hopper@example.test");
    let trip = released_trip(&service, draft(faculty, AudienceCriteria::default()));

    let archived = service.archive(trip).expect("archived");
    assert_eq!(archived.status, TripStatus::Archived);
    assert!(!service.approve(trip).expect("approve after archive"));
}

#[test]
fn coordinator_lookup_ignores_email_case_and_hidden_trips() {
    let (store, _, service) = service();
    let hopper = coordinator(&store, "F1", "Hopper@Example.test");
    let lovelace = coordinator(&store, "F2", "lovelace@example.test");
    let mine = service
        .create_trip(draft(hopper, AudienceCriteria::default()))
        .expect("trip created");
    service
        .create_trip(draft(lovelace, AudienceCriteria::default()))
        .expect("trip created");
    let archived = service
        .create_trip(draft(hopper, AudienceCriteria::default()))
        .expect("trip created");
    service.archive(archived.id).expect("archived");

    let trips = service
        .trips_for_coordinator(" hopper@example.TEST ")
        .expect("lookup");
    let ids: Vec<_> = trips.iter().map(|trip| trip.id).collect();
    assert_eq!(ids, vec![mine.id]);
}
