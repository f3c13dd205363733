use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{CourseId, FacultyId, GuardianId, SectionId, StudentId};

/// Attributes shared by every person imported from the student information system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDetails {
    /// External identifier from the upstream roster. Unique per person type.
    pub person_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub cell_number: Option<String>,
    pub notify_cell: bool,
    /// Set when the person vanished from the latest roster import.
    pub hidden: bool,
}

impl PersonDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GradeLevel {
    Freshman,
    Sophomore,
    Junior,
    Senior,
}

impl GradeLevel {
    pub const fn ordered() -> [Self; 4] {
        [Self::Freshman, Self::Sophomore, Self::Junior, Self::Senior]
    }

    /// Two-letter code used by the upstream roster and by storage.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Freshman => "FR",
            Self::Sophomore => "SO",
            Self::Junior => "JR",
            Self::Senior => "SR",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Freshman => "Freshman",
            Self::Sophomore => "Sophomore",
            Self::Junior => "Junior",
            Self::Senior => "Senior",
        }
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown grade level '{0}'")]
pub struct UnknownGradeLevel(pub String);

impl FromStr for GradeLevel {
    type Err = UnknownGradeLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fr" | "9" | "freshman" => Ok(Self::Freshman),
            "so" | "10" | "sophomore" => Ok(Self::Sophomore),
            "jr" | "11" | "junior" => Ok(Self::Junior),
            "sr" | "12" | "senior" => Ok(Self::Senior),
            _ => Err(UnknownGradeLevel(value.to_string())),
        }
    }
}

impl TryFrom<String> for GradeLevel {
    type Error = UnknownGradeLevel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GradeLevel> for String {
    fn from(value: GradeLevel) -> Self {
        value.code().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    #[serde(flatten)]
    pub person: PersonDetails,
    pub grade_level: GradeLevel,
}

/// A parent or other legal custodian. Guardians and students relate many-to-many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: GuardianId,
    #[serde(flatten)]
    pub person: PersonDetails,
    pub relationship: String,
}

/// Faculty or staff who coordinate trips and teach sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faculty {
    pub id: FacultyId,
    #[serde(flatten)]
    pub person: PersonDetails,
    pub preferred_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub course_number: String,
    pub course_name: String,
    pub hidden: bool,
}

/// One scheduled offering of a [`Course`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    /// External identifier from the upstream roster.
    pub section_id: String,
    pub course: CourseId,
    pub section_number: String,
    pub teacher: Option<FacultyId>,
    pub coteacher: Option<FacultyId>,
    pub school_year: String,
    pub room: String,
    pub period: String,
    pub hidden: bool,
}

/// Upstream faculty row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyRecord {
    pub person_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub preferred_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub person_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub grade_level: GradeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianRecord {
    pub person_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub cell_number: Option<String>,
    #[serde(default)]
    pub relationship: String,
}

impl GuardianRecord {
    /// Cell notifications are opted into exactly when a number is on file.
    pub fn notify_cell(&self) -> bool {
        self.cell_number
            .as_deref()
            .is_some_and(|number| !number.trim().is_empty())
    }
}

/// Record kinds reconciled by a roster import pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterKind {
    Faculty,
    Courses,
    Sections,
    Students,
    Guardians,
}

impl RosterKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Faculty => "faculty",
            Self::Courses => "courses",
            Self::Sections => "sections",
            Self::Students => "students",
            Self::Guardians => "guardians",
        }
    }
}

/// Section row with its course resolved to a stored id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionUpsert {
    pub section_id: String,
    pub course: CourseId,
    pub section_number: String,
    pub teacher: Option<FacultyId>,
    pub coteacher: Option<FacultyId>,
    pub school_year: String,
    pub room: String,
    pub period: String,
}
