use std::collections::BTreeSet;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::ids::{CourseId, FacultyId, GuardianId, SectionId, StudentId};
use crate::roster::{
    Course, Faculty, FacultyRecord, GradeLevel, Guardian, GuardianRecord, PersonDetails,
    RosterKind, Section, SectionUpsert, Student, StudentRecord,
};
use crate::store::RepositoryError;

use super::map_write;

impl ToSql for GradeLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for GradeLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

const PERSON_COLUMNS: &str = "id, person_id, first_name, last_name, email, cell_number, notify_cell, hidden";
const SECTION_COLUMNS: &str = "id, section_id, course_id, section_number, teacher_id, coteacher_id, school_year, room, period, hidden";

/// Reads the shared person columns, which always come first.
fn person_at(row: &Row<'_>) -> rusqlite::Result<PersonDetails> {
    Ok(PersonDetails {
        person_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        cell_number: row.get(5)?,
        notify_cell: row.get(6)?,
        hidden: row.get(7)?,
    })
}

fn student_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: StudentId(row.get(0)?),
        person: person_at(row)?,
        grade_level: row.get(8)?,
    })
}

fn guardian_row(row: &Row<'_>) -> rusqlite::Result<Guardian> {
    Ok(Guardian {
        id: GuardianId(row.get(0)?),
        person: person_at(row)?,
        relationship: row.get(8)?,
    })
}

fn faculty_row(row: &Row<'_>) -> rusqlite::Result<Faculty> {
    Ok(Faculty {
        id: FacultyId(row.get(0)?),
        person: person_at(row)?,
        preferred_name: row.get(8)?,
    })
}

fn course_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: CourseId(row.get(0)?),
        course_number: row.get(1)?,
        course_name: row.get(2)?,
        hidden: row.get(3)?,
    })
}

fn section_row(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: SectionId(row.get(0)?),
        section_id: row.get(1)?,
        course: CourseId(row.get(2)?),
        section_number: row.get(3)?,
        teacher: row.get::<_, Option<i64>>(4)?.map(FacultyId),
        coteacher: row.get::<_, Option<i64>>(5)?.map(FacultyId),
        school_year: row.get(6)?,
        room: row.get(7)?,
        period: row.get(8)?,
        hidden: row.get(9)?,
    })
}

pub(super) fn student(conn: &Connection, id: StudentId) -> Result<Student, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, grade_level FROM students WHERE id = ?1"),
        [id.0],
        student_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("student", id))
}

pub(super) fn student_by_person_id(
    conn: &Connection,
    person_id: &str,
) -> Result<Student, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, grade_level FROM students WHERE person_id = ?1"),
        [person_id],
        student_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("student", person_id))
}

pub(super) fn guardian(conn: &Connection, id: GuardianId) -> Result<Guardian, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, relationship FROM guardians WHERE id = ?1"),
        [id.0],
        guardian_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("guardian", id))
}

pub(super) fn guardian_by_person_id(
    conn: &Connection,
    person_id: &str,
) -> Result<Guardian, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, relationship FROM guardians WHERE person_id = ?1"),
        [person_id],
        guardian_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("guardian", person_id))
}

pub(super) fn faculty(conn: &Connection, id: FacultyId) -> Result<Faculty, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, preferred_name FROM faculty WHERE id = ?1"),
        [id.0],
        faculty_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("faculty", id))
}

pub(super) fn faculty_by_person_id(
    conn: &Connection,
    person_id: &str,
) -> Result<Faculty, RepositoryError> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS}, preferred_name FROM faculty WHERE person_id = ?1"),
        [person_id],
        faculty_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("faculty", person_id))
}

pub(super) fn course_by_number(
    conn: &Connection,
    course_number: &str,
) -> Result<Course, RepositoryError> {
    conn.query_row(
        "SELECT id, course_number, course_name, hidden FROM courses WHERE course_number = ?1",
        [course_number],
        course_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("course", course_number))
}

pub(super) fn section_by_section_id(
    conn: &Connection,
    section_id: &str,
) -> Result<Section, RepositoryError> {
    conn.query_row(
        &format!("SELECT {SECTION_COLUMNS} FROM sections WHERE section_id = ?1"),
        [section_id],
        section_row,
    )
    .optional()?
    .ok_or_else(|| RepositoryError::not_found("section", section_id))
}

pub(super) fn sections_for_course(
    conn: &Connection,
    course: CourseId,
) -> Result<Vec<Section>, RepositoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SECTION_COLUMNS} FROM sections WHERE course_id = ?1 ORDER BY id"
    ))?;
    let sections = stmt
        .query_map([course.0], section_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sections)
}

pub(super) fn section_students(
    conn: &Connection,
    section: SectionId,
) -> Result<BTreeSet<StudentId>, RepositoryError> {
    let mut stmt = conn.prepare("SELECT student_id FROM section_students WHERE section_id = ?1")?;
    let students = stmt
        .query_map([section.0], |row| row.get(0).map(StudentId))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(students)
}

pub(super) fn guardians_of(
    conn: &Connection,
    student: StudentId,
) -> Result<Vec<Guardian>, RepositoryError> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.person_id, g.first_name, g.last_name, g.email, g.cell_number,
                g.notify_cell, g.hidden, g.relationship
         FROM guardians g
         JOIN guardian_students gs ON gs.guardian_id = g.id
         WHERE gs.student_id = ?1
         ORDER BY g.id",
    )?;
    let guardians = stmt
        .query_map([student.0], guardian_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(guardians)
}

pub(super) fn students_in_grade(
    conn: &Connection,
    grade: GradeLevel,
) -> Result<BTreeSet<StudentId>, RepositoryError> {
    let mut stmt =
        conn.prepare("SELECT id FROM students WHERE grade_level = ?1 AND hidden = 0")?;
    let students = stmt
        .query_map([grade], |row| row.get(0).map(StudentId))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(students)
}

pub(super) fn upsert_faculty(
    conn: &Connection,
    record: &FacultyRecord,
) -> Result<FacultyId, RepositoryError> {
    conn.query_row(
        "INSERT INTO faculty(person_id, first_name, last_name, email, preferred_name, hidden)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(person_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            preferred_name = excluded.preferred_name,
            hidden = 0
         RETURNING id",
        params![
            record.person_id,
            record.first_name,
            record.last_name,
            record.email,
            record.preferred_name
        ],
        |row| row.get(0).map(FacultyId),
    )
    .map_err(|err| map_write(err, "faculty"))
}

pub(super) fn upsert_student(
    conn: &Connection,
    record: &StudentRecord,
) -> Result<StudentId, RepositoryError> {
    conn.query_row(
        "INSERT INTO students(person_id, first_name, last_name, email, grade_level, hidden)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(person_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            grade_level = excluded.grade_level,
            hidden = 0
         RETURNING id",
        params![
            record.person_id,
            record.first_name,
            record.last_name,
            record.email,
            record.grade_level
        ],
        |row| row.get(0).map(StudentId),
    )
    .map_err(|err| map_write(err, "student"))
}

pub(super) fn upsert_guardian(
    conn: &Connection,
    record: &GuardianRecord,
) -> Result<GuardianId, RepositoryError> {
    conn.query_row(
        "INSERT INTO guardians(person_id, first_name, last_name, email, cell_number,
                               notify_cell, relationship, hidden)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
         ON CONFLICT(person_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            cell_number = excluded.cell_number,
            notify_cell = excluded.notify_cell,
            relationship = excluded.relationship,
            hidden = 0
         RETURNING id",
        params![
            record.person_id,
            record.first_name,
            record.last_name,
            record.email,
            record.cell_number,
            record.notify_cell(),
            record.relationship
        ],
        |row| row.get(0).map(GuardianId),
    )
    .map_err(|err| map_write(err, "guardian"))
}

pub(super) fn upsert_course(
    conn: &Connection,
    course_number: &str,
    course_name: &str,
) -> Result<CourseId, RepositoryError> {
    conn.query_row(
        "INSERT INTO courses(course_number, course_name, hidden) VALUES (?1, ?2, 0)
         ON CONFLICT(course_number) DO UPDATE SET
            course_name = excluded.course_name,
            hidden = 0
         RETURNING id",
        params![course_number, course_name],
        |row| row.get(0).map(CourseId),
    )
    .map_err(|err| map_write(err, "course"))
}

pub(super) fn upsert_section(
    conn: &Connection,
    section: &SectionUpsert,
) -> Result<SectionId, RepositoryError> {
    conn.query_row(
        "INSERT INTO sections(section_id, course_id, section_number, teacher_id, coteacher_id,
                              school_year, room, period, hidden)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
         ON CONFLICT(section_id) DO UPDATE SET
            course_id = excluded.course_id,
            section_number = excluded.section_number,
            teacher_id = excluded.teacher_id,
            coteacher_id = excluded.coteacher_id,
            school_year = excluded.school_year,
            room = excluded.room,
            period = excluded.period,
            hidden = 0
         RETURNING id",
        params![
            section.section_id,
            section.course.0,
            section.section_number,
            section.teacher.map(|id| id.0),
            section.coteacher.map(|id| id.0),
            section.school_year,
            section.room,
            section.period
        ],
        |row| row.get(0).map(SectionId),
    )
    .map_err(|err| map_write(err, "section"))
}

pub(super) fn hide_absent(
    conn: &Connection,
    kind: RosterKind,
    seen: &BTreeSet<String>,
) -> Result<usize, RepositoryError> {
    let (table, key) = match kind {
        RosterKind::Faculty => ("faculty", "person_id"),
        RosterKind::Students => ("students", "person_id"),
        RosterKind::Guardians => ("guardians", "person_id"),
        RosterKind::Courses => ("courses", "course_number"),
        RosterKind::Sections => ("sections", "section_id"),
    };

    let mut select = conn.prepare(&format!("SELECT id, {key} FROM {table} WHERE hidden = 0"))?;
    let visible = select
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut hide = conn.prepare(&format!("UPDATE {table} SET hidden = 1 WHERE id = ?1"))?;
    let mut hidden = 0;
    for (id, external_id) in visible {
        if !seen.contains(&external_id) {
            hide.execute([id])?;
            hidden += 1;
        }
    }
    Ok(hidden)
}

pub(super) fn set_student_guardians(
    conn: &Connection,
    student: StudentId,
    guardians: &BTreeSet<GuardianId>,
) -> Result<(), RepositoryError> {
    self::student(conn, student)?;
    conn.execute(
        "DELETE FROM guardian_students WHERE student_id = ?1",
        [student.0],
    )?;
    let mut insert =
        conn.prepare("INSERT INTO guardian_students(guardian_id, student_id) VALUES (?1, ?2)")?;
    for guardian in guardians {
        insert
            .execute([guardian.0, student.0])
            .map_err(|err| map_write(err, "guardianship"))?;
    }
    Ok(())
}

pub(super) fn replace_enrollment(
    conn: &Connection,
    enrollment: &BTreeSet<(SectionId, StudentId)>,
) -> Result<(), RepositoryError> {
    conn.execute("DELETE FROM section_students", [])?;
    let mut insert =
        conn.prepare("INSERT INTO section_students(section_id, student_id) VALUES (?1, ?2)")?;
    for (section, student) in enrollment {
        insert
            .execute([section.0, student.0])
            .map_err(|err| map_write(err, "enrollment"))?;
    }
    Ok(())
}
