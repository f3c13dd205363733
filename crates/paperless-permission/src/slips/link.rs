use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::{GuardianId, SlipId, SlipLinkId, StudentId};
use crate::roster::{Guardian, Student};

/// The party a signature link addresses: the slip's student or one guardian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum LinkSubject {
    Student(StudentId),
    Guardian(GuardianId),
}

impl LinkSubject {
    /// Builds a subject from nullable references. Exactly one must be set.
    pub fn from_refs(
        student: Option<StudentId>,
        guardian: Option<GuardianId>,
    ) -> Result<Self, InvalidLinkSubject> {
        match (student, guardian) {
            (Some(student), None) => Ok(Self::Student(student)),
            (None, Some(guardian)) => Ok(Self::Guardian(guardian)),
            (None, None) => Err(InvalidLinkSubject::Missing),
            (Some(_), Some(_)) => Err(InvalidLinkSubject::Ambiguous),
        }
    }

    pub fn student(self) -> Option<StudentId> {
        match self {
            Self::Student(id) => Some(id),
            Self::Guardian(_) => None,
        }
    }

    pub fn guardian(self) -> Option<GuardianId> {
        match self {
            Self::Guardian(id) => Some(id),
            Self::Student(_) => None,
        }
    }
}

/// A link must name a student or a guardian, never both and never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidLinkSubject {
    #[error("a slip link needs a student or a guardian")]
    Missing,
    #[error("a slip link cannot address both a student and a guardian")]
    Ambiguous,
}

/// Opaque token addressing a slip link in URLs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkToken(String);

impl LinkToken {
    /// Lowercase hex SHA-256 of `"{salt}-{slip}-{person_id}"`.
    ///
    /// Deployed links depend on this exact layout.
    pub fn derive(salt: &str, slip: SlipId, person_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{salt}-{slip}-{person_id}").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a token read back from storage or a URL.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A link that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlipLink {
    pub permission_slip: SlipId,
    pub subject: LinkSubject,
    pub link_id: LinkToken,
}

impl NewSlipLink {
    /// Link for exactly one of `student` or `guardian`, token derived from
    /// that party's external person id.
    pub fn for_party(
        slip: SlipId,
        student: Option<&Student>,
        guardian: Option<&Guardian>,
        salt: &str,
    ) -> Result<Self, InvalidLinkSubject> {
        let subject = LinkSubject::from_refs(student.map(|s| s.id), guardian.map(|g| g.id))?;
        let person_id = match (student, guardian) {
            (_, Some(guardian)) => &guardian.person.person_id,
            (Some(student), None) => &student.person.person_id,
            (None, None) => return Err(InvalidLinkSubject::Missing),
        };
        Ok(Self {
            permission_slip: slip,
            subject,
            link_id: LinkToken::derive(salt, slip, person_id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSlipLink {
    pub id: SlipLinkId,
    pub permission_slip: SlipId,
    pub subject: LinkSubject,
    pub link_id: LinkToken,
    pub last_sent: Option<DateTime<Utc>>,
}
