//! Row identifiers. Each record type gets its own newtype so a slip id can never
//! be passed where a student id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Primary key of a stored student.
    StudentId
);
record_id!(
    /// Primary key of a stored guardian.
    GuardianId
);
record_id!(
    /// Primary key of a stored faculty member.
    FacultyId
);
record_id!(CourseId);
record_id!(SectionId);
record_id!(
    /// Primary key of a field trip.
    TripId
);
record_id!(
    /// Primary key of a permission slip. Its decimal rendering feeds the link
    /// token derivation, so it must stay a plain integer.
    SlipId
);
record_id!(SlipLinkId);
