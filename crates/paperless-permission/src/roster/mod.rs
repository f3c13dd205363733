//! Roster model imported from the student information system.

pub mod domain;
pub mod reconcile;

pub use domain::{
    Course, Faculty, FacultyRecord, GradeLevel, Guardian, GuardianRecord, PersonDetails, RosterKind,
    Section, SectionUpsert, Student, StudentRecord, UnknownGradeLevel,
};
pub use reconcile::{
    reconcile_roster, ClassRecord, EnrollmentRecord, GuardianContacts, ReconcileSummary,
    RosterSnapshot,
};
