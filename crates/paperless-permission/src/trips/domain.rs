use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{CourseId, FacultyId, SectionId, StudentId, TripId};
use crate::roster::GradeLevel;
use crate::store::{RepositoryError, RosterStore};

/// Trip approval workflow. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    New,
    Approved,
    Released,
    Archived,
}

impl TripStatus {
    /// Stored integer representation.
    pub const fn code(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Approved => 1,
            Self::Released => 2,
            Self::Archived => 3,
        }
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::New),
            1 => Some(Self::Approved),
            2 => Some(Self::Released),
            3 => Some(Self::Archived),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Approved => "Approved",
            Self::Released => "Released",
            Self::Archived => "Archived",
        }
    }

    /// Action that leads into this status.
    pub const fn verb(self) -> &'static str {
        match self {
            Self::New => "reopen",
            Self::Approved => "approve",
            Self::Released => "release",
            Self::Archived => "archive",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptive and scheduling fields of a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetails {
    pub name: String,
    pub group_name: String,
    pub location: String,
    pub start_date: NaiveDate,
    pub dropoff_time: NaiveTime,
    pub dropoff_location: String,
    pub end_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub pickup_location: String,
    pub due_date: NaiveDate,
}

/// Invitation criteria. The audience is the union of everything named here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceCriteria {
    #[serde(default)]
    pub students: BTreeSet<StudentId>,
    #[serde(default)]
    pub courses: BTreeSet<CourseId>,
    #[serde(default)]
    pub sections: BTreeSet<SectionId>,
    #[serde(default)]
    pub grade_level: Option<GradeLevel>,
}

impl AudienceCriteria {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
            && self.courses.is_empty()
            && self.sections.is_empty()
            && self.grade_level.is_none()
    }
}

/// Everything a coordinator supplies when creating or editing a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDraft {
    pub details: TripDetails,
    #[serde(default)]
    pub audience: AudienceCriteria,
    pub faculty: BTreeSet<FacultyId>,
}

impl TripDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let details = &self.details;
        for (field, value) in [
            ("name", &details.name),
            ("group_name", &details.group_name),
            ("location", &details.location),
            ("dropoff_location", &details.dropoff_location),
            ("pickup_location", &details.pickup_location),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField { field });
            }
        }
        if self.faculty.is_empty() {
            return Err(ValidationError::MissingCoordinator);
        }
        if details.end_date < details.start_date {
            return Err(ValidationError::EndsBeforeStart);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTrip {
    pub id: TripId,
    #[serde(flatten)]
    pub details: TripDetails,
    pub audience: AudienceCriteria,
    pub faculty: BTreeSet<FacultyId>,
    pub status: TripStatus,
    pub hidden: bool,
}

impl FieldTrip {
    /// Replaces the editable fields with those of `draft`.
    pub fn apply_draft(&mut self, draft: TripDraft) {
        self.details = draft.details;
        self.audience = draft.audience;
        self.faculty = draft.faculty;
    }
}

/// Trip draft expressed with upstream roster identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    #[serde(flatten)]
    pub details: TripDetails,
    /// Faculty person ids of the coordinators.
    pub coordinators: Vec<String>,
    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default)]
    pub courses: Vec<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub grade_level: Option<GradeLevel>,
}

impl TripRequest {
    /// Looks every external id up in the roster. Unknown ids are `NotFound`.
    pub fn resolve<R: RosterStore + ?Sized>(self, roster: &R) -> Result<TripDraft, RepositoryError> {
        let faculty = self
            .coordinators
            .iter()
            .map(|person_id| roster.faculty_by_person_id(person_id).map(|f| f.id))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let students = self
            .students
            .iter()
            .map(|person_id| roster.student_by_person_id(person_id).map(|s| s.id))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let courses = self
            .courses
            .iter()
            .map(|number| roster.course_by_number(number).map(|c| c.id))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let sections = self
            .sections
            .iter()
            .map(|section_id| roster.section_by_section_id(section_id).map(|s| s.id))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(TripDraft {
            details: self.details,
            audience: AudienceCriteria {
                students,
                courses,
                sections,
                grade_level: self.grade_level,
            },
            faculty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TripDraft {
        TripDraft {
            details: TripDetails {
                name: "Science Museum".to_string(),
                group_name: "Biology 105".to_string(),
                location: "Virginia Living Museum".to_string(),
                start_date: NaiveDate::from_ymd_opt(2026, 11, 3).expect("valid date"),
                dropoff_time: NaiveTime::from_hms_opt(8, 15, 0).expect("valid time"),
                dropoff_location: "Front circle".to_string(),
                end_date: NaiveDate::from_ymd_opt(2026, 11, 3).expect("valid date"),
                pickup_time: NaiveTime::from_hms_opt(15, 0, 0).expect("valid time"),
                pickup_location: "Front circle".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 10, 27).expect("valid date"),
            },
            audience: AudienceCriteria::default(),
            faculty: BTreeSet::from([FacultyId(1)]),
        }
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            TripStatus::New,
            TripStatus::Approved,
            TripStatus::Released,
            TripStatus::Archived,
        ] {
            assert_eq!(TripStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(TripStatus::from_code(7), None);
    }

    #[test]
    fn validate_requires_fields_and_coordinator() {
        assert_eq!(draft().validate(), Ok(()));

        let mut missing_name = draft();
        missing_name.details.name = "  ".to_string();
        assert_eq!(
            missing_name.validate(),
            Err(ValidationError::MissingField { field: "name" })
        );

        let mut no_faculty = draft();
        no_faculty.faculty.clear();
        assert_eq!(no_faculty.validate(), Err(ValidationError::MissingCoordinator));

        let mut backwards = draft();
        backwards.details.end_date = NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date");
        assert_eq!(backwards.validate(), Err(ValidationError::EndsBeforeStart));
    }

    #[test]
    fn empty_criteria_detected() {
        let mut criteria = AudienceCriteria::default();
        assert!(criteria.is_empty());
        criteria.grade_level = Some(GradeLevel::Junior);
        assert!(!criteria.is_empty());
    }
}
