use std::collections::BTreeSet;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::ids::{CourseId, FacultyId, SectionId, StudentId, TripId};
use crate::store::RepositoryError;
use crate::trips::{AudienceCriteria, FieldTrip, TripDetails, TripDraft, TripStatus};

use super::map_write;

impl ToSql for TripStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for TripStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        TripStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

const TRIP_COLUMNS: &str = "id, name, group_name, location, start_date, dropoff_time, \
    dropoff_location, end_date, pickup_time, pickup_location, due_date, grade_level, status, hidden";

fn trip_row(row: &Row<'_>) -> rusqlite::Result<FieldTrip> {
    Ok(FieldTrip {
        id: TripId(row.get(0)?),
        details: TripDetails {
            name: row.get(1)?,
            group_name: row.get(2)?,
            location: row.get(3)?,
            start_date: row.get(4)?,
            dropoff_time: row.get(5)?,
            dropoff_location: row.get(6)?,
            end_date: row.get(7)?,
            pickup_time: row.get(8)?,
            pickup_location: row.get(9)?,
            due_date: row.get(10)?,
        },
        audience: AudienceCriteria {
            grade_level: row.get(11)?,
            ..AudienceCriteria::default()
        },
        faculty: BTreeSet::new(),
        status: row.get(12)?,
        hidden: row.get(13)?,
    })
}

fn id_set<T: Ord>(
    conn: &Connection,
    sql: &str,
    trip: TripId,
    wrap: fn(i64) -> T,
) -> Result<BTreeSet<T>, RepositoryError> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([trip.0], |row| row.get(0).map(wrap))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

/// Fills in the criteria and coordinators kept in side tables.
fn load_relations(conn: &Connection, trip: &mut FieldTrip) -> Result<(), RepositoryError> {
    trip.audience.students = id_set(
        conn,
        "SELECT student_id FROM field_trip_students WHERE field_trip_id = ?1",
        trip.id,
        StudentId,
    )?;
    trip.audience.courses = id_set(
        conn,
        "SELECT course_id FROM field_trip_courses WHERE field_trip_id = ?1",
        trip.id,
        CourseId,
    )?;
    trip.audience.sections = id_set(
        conn,
        "SELECT section_id FROM field_trip_sections WHERE field_trip_id = ?1",
        trip.id,
        SectionId,
    )?;
    trip.faculty = id_set(
        conn,
        "SELECT faculty_id FROM field_trip_faculty WHERE field_trip_id = ?1",
        trip.id,
        FacultyId,
    )?;
    Ok(())
}

fn write_relations(
    conn: &Connection,
    trip: TripId,
    audience: &AudienceCriteria,
    faculty: &BTreeSet<FacultyId>,
) -> Result<(), RepositoryError> {
    for table in [
        "field_trip_students",
        "field_trip_courses",
        "field_trip_sections",
        "field_trip_faculty",
    ] {
        conn.execute(&format!("DELETE FROM {table} WHERE field_trip_id = ?1"), [trip.0])?;
    }

    let mut insert = conn.prepare(
        "INSERT INTO field_trip_students(field_trip_id, student_id) VALUES (?1, ?2)",
    )?;
    for student in &audience.students {
        insert
            .execute([trip.0, student.0])
            .map_err(|err| map_write(err, "field trip student"))?;
    }
    let mut insert =
        conn.prepare("INSERT INTO field_trip_courses(field_trip_id, course_id) VALUES (?1, ?2)")?;
    for course in &audience.courses {
        insert
            .execute([trip.0, course.0])
            .map_err(|err| map_write(err, "field trip course"))?;
    }
    let mut insert = conn.prepare(
        "INSERT INTO field_trip_sections(field_trip_id, section_id) VALUES (?1, ?2)",
    )?;
    for section in &audience.sections {
        insert
            .execute([trip.0, section.0])
            .map_err(|err| map_write(err, "field trip section"))?;
    }
    let mut insert =
        conn.prepare("INSERT INTO field_trip_faculty(field_trip_id, faculty_id) VALUES (?1, ?2)")?;
    for coordinator in faculty {
        insert
            .execute([trip.0, coordinator.0])
            .map_err(|err| map_write(err, "field trip coordinator"))?;
    }
    Ok(())
}

pub(super) fn insert_trip(conn: &Connection, draft: &TripDraft) -> Result<FieldTrip, RepositoryError> {
    let details = &draft.details;
    let id = conn
        .query_row(
            "INSERT INTO field_trips(name, group_name, location, start_date, dropoff_time,
                                     dropoff_location, end_date, pickup_time, pickup_location,
                                     due_date, grade_level, status, hidden)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
             RETURNING id",
            params![
                details.name,
                details.group_name,
                details.location,
                details.start_date,
                details.dropoff_time,
                details.dropoff_location,
                details.end_date,
                details.pickup_time,
                details.pickup_location,
                details.due_date,
                draft.audience.grade_level,
                TripStatus::New
            ],
            |row| row.get(0).map(TripId),
        )
        .map_err(|err| map_write(err, "field trip"))?;
    write_relations(conn, id, &draft.audience, &draft.faculty)?;
    trip(conn, id)
}

pub(super) fn trip(conn: &Connection, id: TripId) -> Result<FieldTrip, RepositoryError> {
    let mut trip = conn
        .query_row(
            &format!("SELECT {TRIP_COLUMNS} FROM field_trips WHERE id = ?1"),
            [id.0],
            trip_row,
        )
        .optional()?
        .ok_or_else(|| RepositoryError::not_found("field trip", id))?;
    load_relations(conn, &mut trip)?;
    Ok(trip)
}

pub(super) fn save_trip(conn: &Connection, trip: &FieldTrip) -> Result<(), RepositoryError> {
    let details = &trip.details;
    let updated = conn
        .execute(
            "UPDATE field_trips SET
                name = ?2, group_name = ?3, location = ?4, start_date = ?5, dropoff_time = ?6,
                dropoff_location = ?7, end_date = ?8, pickup_time = ?9, pickup_location = ?10,
                due_date = ?11, grade_level = ?12, status = ?13, hidden = ?14
             WHERE id = ?1",
            params![
                trip.id.0,
                details.name,
                details.group_name,
                details.location,
                details.start_date,
                details.dropoff_time,
                details.dropoff_location,
                details.end_date,
                details.pickup_time,
                details.pickup_location,
                details.due_date,
                trip.audience.grade_level,
                trip.status,
                trip.hidden
            ],
        )
        .map_err(|err| map_write(err, "field trip"))?;
    if updated == 0 {
        return Err(RepositoryError::not_found("field trip", trip.id));
    }
    write_relations(conn, trip.id, &trip.audience, &trip.faculty)
}

pub(super) fn list_trips(
    conn: &Connection,
    include_hidden: bool,
) -> Result<Vec<FieldTrip>, RepositoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRIP_COLUMNS} FROM field_trips WHERE hidden = 0 OR ?1 ORDER BY start_date, id"
    ))?;
    let mut trips = stmt
        .query_map([include_hidden], trip_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for trip in &mut trips {
        load_relations(conn, trip)?;
    }
    Ok(trips)
}
