use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::ids::{GuardianId, SlipId, SlipLinkId, StudentId, TripId};
use crate::slips::{
    GuardianSignature, LinkSubject, LinkToken, NewSlipLink, PermissionSlip, PermissionSlipLink,
    Signature,
};
use crate::store::RepositoryError;

use super::map_write;

const SLIP_COLUMNS: &str = "id, field_trip_id, student_id, due_date, student_signature, \
    student_signature_date, guardian_id, guardian_signature, guardian_signature_date, \
    flagged_for_review";
const LINK_COLUMNS: &str = "id, permission_slip_id, student_id, guardian_id, link_id, last_sent";

/// Raw slip columns. The schema's CHECK constraints keep the signature
/// columns paired, but a mismatch still surfaces as `Corrupt`.
struct SlipRow {
    id: i64,
    field_trip: i64,
    student: i64,
    due_date: Option<chrono::NaiveDate>,
    student_signature: Option<String>,
    student_signed_at: Option<DateTime<Utc>>,
    guardian: Option<i64>,
    guardian_signature: Option<String>,
    guardian_signed_at: Option<DateTime<Utc>>,
    flagged_for_review: bool,
}

impl SlipRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            field_trip: row.get(1)?,
            student: row.get(2)?,
            due_date: row.get(3)?,
            student_signature: row.get(4)?,
            student_signed_at: row.get(5)?,
            guardian: row.get(6)?,
            guardian_signature: row.get(7)?,
            guardian_signed_at: row.get(8)?,
            flagged_for_review: row.get(9)?,
        })
    }

    fn into_slip(self) -> Result<PermissionSlip, RepositoryError> {
        let student_signature = match (self.student_signature, self.student_signed_at) {
            (Some(name), Some(signed_at)) => Some(Signature { name, signed_at }),
            (None, None) => None,
            _ => return Err(corrupt_slip(self.id, "student signature without date")),
        };
        let guardian_signature = match (self.guardian, self.guardian_signature, self.guardian_signed_at) {
            (Some(guardian), Some(name), Some(signed_at)) => Some(GuardianSignature {
                guardian: GuardianId(guardian),
                name,
                signed_at,
            }),
            (None, None, None) => None,
            _ => return Err(corrupt_slip(self.id, "incomplete guardian signature")),
        };
        Ok(PermissionSlip {
            id: SlipId(self.id),
            field_trip: TripId(self.field_trip),
            student: StudentId(self.student),
            due_date: self.due_date,
            student_signature,
            guardian_signature,
            flagged_for_review: self.flagged_for_review,
        })
    }
}

fn corrupt_slip(id: i64, detail: &str) -> RepositoryError {
    RepositoryError::Corrupt {
        entity: "permission slip",
        detail: format!("slip {id}: {detail}"),
    }
}

struct LinkRow {
    id: i64,
    permission_slip: i64,
    student: Option<i64>,
    guardian: Option<i64>,
    link_id: String,
    last_sent: Option<DateTime<Utc>>,
}

impl LinkRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            permission_slip: row.get(1)?,
            student: row.get(2)?,
            guardian: row.get(3)?,
            link_id: row.get(4)?,
            last_sent: row.get(5)?,
        })
    }

    fn into_link(self) -> Result<PermissionSlipLink, RepositoryError> {
        let subject = LinkSubject::from_refs(self.student.map(StudentId), self.guardian.map(GuardianId))
            .map_err(|err| RepositoryError::Corrupt {
                entity: "permission slip link",
                detail: format!("link {}: {err}", self.id),
            })?;
        Ok(PermissionSlipLink {
            id: SlipLinkId(self.id),
            permission_slip: SlipId(self.permission_slip),
            subject,
            link_id: LinkToken::from_stored(self.link_id),
            last_sent: self.last_sent,
        })
    }
}

fn subject_columns(subject: LinkSubject) -> (Option<i64>, Option<i64>) {
    (
        subject.student().map(|id| id.0),
        subject.guardian().map(|id| id.0),
    )
}

pub(super) fn find_slip(
    conn: &Connection,
    trip: TripId,
    student: StudentId,
) -> Result<Option<PermissionSlip>, RepositoryError> {
    conn.query_row(
        &format!(
            "SELECT {SLIP_COLUMNS} FROM permission_slips WHERE field_trip_id = ?1 AND student_id = ?2"
        ),
        [trip.0, student.0],
        SlipRow::read,
    )
    .optional()?
    .map(SlipRow::into_slip)
    .transpose()
}

pub(super) fn insert_slip(
    conn: &Connection,
    trip: TripId,
    student: StudentId,
) -> Result<PermissionSlip, RepositoryError> {
    let id = conn
        .query_row(
            "INSERT INTO permission_slips(field_trip_id, student_id, flagged_for_review)
             VALUES (?1, ?2, 0)
             RETURNING id",
            [trip.0, student.0],
            |row| row.get(0).map(SlipId),
        )
        .map_err(|err| map_write(err, "permission slip"))?;
    Ok(PermissionSlip::new(id, trip, student))
}

pub(super) fn slip(conn: &Connection, id: SlipId) -> Result<PermissionSlip, RepositoryError> {
    conn.query_row(
        &format!("SELECT {SLIP_COLUMNS} FROM permission_slips WHERE id = ?1"),
        [id.0],
        SlipRow::read,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("permission slip", id))?
    .into_slip()
}

pub(super) fn slips_for_trip(
    conn: &Connection,
    trip: TripId,
) -> Result<Vec<PermissionSlip>, RepositoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLIP_COLUMNS} FROM permission_slips WHERE field_trip_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([trip.0], SlipRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(SlipRow::into_slip).collect()
}

pub(super) fn save_slip(conn: &Connection, slip: &PermissionSlip) -> Result<(), RepositoryError> {
    let student = slip.student_signature.as_ref();
    let guardian = slip.guardian_signature.as_ref();
    let updated = conn
        .execute(
            "UPDATE permission_slips SET
                due_date = ?4,
                student_signature = ?5,
                student_signature_date = ?6,
                guardian_id = ?7,
                guardian_signature = ?8,
                guardian_signature_date = ?9,
                flagged_for_review = ?10
             WHERE id = ?1 AND field_trip_id = ?2 AND student_id = ?3",
            params![
                slip.id.0,
                slip.field_trip.0,
                slip.student.0,
                slip.due_date,
                student.map(|s| s.name.as_str()),
                student.map(|s| s.signed_at),
                guardian.map(|g| g.guardian.0),
                guardian.map(|g| g.name.as_str()),
                guardian.map(|g| g.signed_at),
                slip.flagged_for_review
            ],
        )
        .map_err(|err| map_write(err, "permission slip"))?;
    if updated == 0 {
        return Err(RepositoryError::not_found("permission slip", slip.id));
    }
    Ok(())
}

pub(super) fn find_link(
    conn: &Connection,
    slip: SlipId,
    subject: LinkSubject,
) -> Result<Option<PermissionSlipLink>, RepositoryError> {
    let (student, guardian) = subject_columns(subject);
    conn.query_row(
        &format!(
            "SELECT {LINK_COLUMNS} FROM permission_slip_links
             WHERE permission_slip_id = ?1 AND student_id IS ?2 AND guardian_id IS ?3"
        ),
        params![slip.0, student, guardian],
        LinkRow::read,
    )
    .optional()?
    .map(LinkRow::into_link)
    .transpose()
}

pub(super) fn insert_link(
    conn: &Connection,
    link: &NewSlipLink,
) -> Result<PermissionSlipLink, RepositoryError> {
    let (student, guardian) = subject_columns(link.subject);
    let id = conn
        .query_row(
            "INSERT INTO permission_slip_links(permission_slip_id, student_id, guardian_id, link_id)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id",
            params![link.permission_slip.0, student, guardian, link.link_id.as_str()],
            |row| row.get(0).map(SlipLinkId),
        )
        .map_err(|err| map_write(err, "permission slip link"))?;
    Ok(PermissionSlipLink {
        id,
        permission_slip: link.permission_slip,
        subject: link.subject,
        link_id: link.link_id.clone(),
        last_sent: None,
    })
}

pub(super) fn link_by_token(
    conn: &Connection,
    token: &str,
) -> Result<PermissionSlipLink, RepositoryError> {
    conn.query_row(
        &format!("SELECT {LINK_COLUMNS} FROM permission_slip_links WHERE link_id = ?1"),
        [token],
        LinkRow::read,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("permission slip link", token))?
    .into_link()
}

pub(super) fn links_for_slip(
    conn: &Connection,
    slip: SlipId,
) -> Result<Vec<PermissionSlipLink>, RepositoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLUMNS} FROM permission_slip_links WHERE permission_slip_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([slip.0], LinkRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(LinkRow::into_link).collect()
}

pub(super) fn mark_sent(
    conn: &Connection,
    link: SlipLinkId,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let updated = conn.execute(
        "UPDATE permission_slip_links SET last_sent = ?2 WHERE id = ?1",
        params![link.0, at],
    )?;
    if updated == 0 {
        return Err(RepositoryError::not_found("permission slip link", link));
    }
    Ok(())
}
