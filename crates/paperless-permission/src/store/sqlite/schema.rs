use rusqlite::Connection;

/// Creates every table and index if missing.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS faculty(
            id INTEGER PRIMARY KEY,
            person_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            cell_number TEXT,
            notify_cell INTEGER NOT NULL DEFAULT 0,
            hidden INTEGER NOT NULL DEFAULT 0,
            preferred_name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            person_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            cell_number TEXT,
            notify_cell INTEGER NOT NULL DEFAULT 0,
            hidden INTEGER NOT NULL DEFAULT 0,
            grade_level TEXT NOT NULL CHECK (grade_level IN ('FR', 'SO', 'JR', 'SR'))
        );
        CREATE INDEX IF NOT EXISTS idx_students_grade ON students(grade_level, hidden);

        CREATE TABLE IF NOT EXISTS guardians(
            id INTEGER PRIMARY KEY,
            person_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            cell_number TEXT,
            notify_cell INTEGER NOT NULL DEFAULT 0,
            hidden INTEGER NOT NULL DEFAULT 0,
            relationship TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS guardian_students(
            guardian_id INTEGER NOT NULL REFERENCES guardians(id),
            student_id INTEGER NOT NULL REFERENCES students(id),
            PRIMARY KEY(student_id, guardian_id)
        );

        CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            course_number TEXT NOT NULL UNIQUE,
            course_name TEXT NOT NULL,
            hidden INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sections(
            id INTEGER PRIMARY KEY,
            section_id TEXT NOT NULL UNIQUE,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            section_number TEXT NOT NULL,
            teacher_id INTEGER REFERENCES faculty(id) ON DELETE SET NULL,
            coteacher_id INTEGER REFERENCES faculty(id) ON DELETE SET NULL,
            school_year TEXT NOT NULL,
            room TEXT NOT NULL,
            period TEXT NOT NULL,
            hidden INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sections_course ON sections(course_id);

        CREATE TABLE IF NOT EXISTS section_students(
            section_id INTEGER NOT NULL REFERENCES sections(id),
            student_id INTEGER NOT NULL REFERENCES students(id),
            PRIMARY KEY(section_id, student_id)
        );

        CREATE TABLE IF NOT EXISTS field_trips(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            group_name TEXT NOT NULL,
            location TEXT NOT NULL,
            start_date TEXT NOT NULL,
            dropoff_time TEXT NOT NULL,
            dropoff_location TEXT NOT NULL,
            end_date TEXT NOT NULL,
            pickup_time TEXT NOT NULL,
            pickup_location TEXT NOT NULL,
            due_date TEXT NOT NULL,
            grade_level TEXT CHECK (grade_level IN ('FR', 'SO', 'JR', 'SR')),
            status INTEGER NOT NULL DEFAULT 0 CHECK (status BETWEEN 0 AND 3),
            hidden INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS field_trip_students(
            field_trip_id INTEGER NOT NULL REFERENCES field_trips(id),
            student_id INTEGER NOT NULL REFERENCES students(id),
            PRIMARY KEY(field_trip_id, student_id)
        );
        CREATE TABLE IF NOT EXISTS field_trip_courses(
            field_trip_id INTEGER NOT NULL REFERENCES field_trips(id),
            course_id INTEGER NOT NULL REFERENCES courses(id),
            PRIMARY KEY(field_trip_id, course_id)
        );
        CREATE TABLE IF NOT EXISTS field_trip_sections(
            field_trip_id INTEGER NOT NULL REFERENCES field_trips(id),
            section_id INTEGER NOT NULL REFERENCES sections(id),
            PRIMARY KEY(field_trip_id, section_id)
        );
        CREATE TABLE IF NOT EXISTS field_trip_faculty(
            field_trip_id INTEGER NOT NULL REFERENCES field_trips(id),
            faculty_id INTEGER NOT NULL REFERENCES faculty(id),
            PRIMARY KEY(field_trip_id, faculty_id)
        );

        CREATE TABLE IF NOT EXISTS permission_slips(
            id INTEGER PRIMARY KEY,
            field_trip_id INTEGER NOT NULL REFERENCES field_trips(id),
            student_id INTEGER NOT NULL REFERENCES students(id),
            due_date TEXT,
            student_signature TEXT,
            student_signature_date TEXT,
            guardian_id INTEGER REFERENCES guardians(id),
            guardian_signature TEXT,
            guardian_signature_date TEXT,
            flagged_for_review INTEGER NOT NULL DEFAULT 0,
            UNIQUE(field_trip_id, student_id),
            CHECK ((student_signature IS NULL) = (student_signature_date IS NULL)),
            CHECK ((guardian_signature IS NULL) = (guardian_signature_date IS NULL)
                AND (guardian_signature IS NULL) = (guardian_id IS NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_permission_slips_trip ON permission_slips(field_trip_id);

        CREATE TABLE IF NOT EXISTS permission_slip_links(
            id INTEGER PRIMARY KEY,
            permission_slip_id INTEGER NOT NULL REFERENCES permission_slips(id),
            student_id INTEGER REFERENCES students(id),
            guardian_id INTEGER REFERENCES guardians(id),
            link_id TEXT NOT NULL UNIQUE,
            last_sent TEXT,
            CHECK ((student_id IS NULL) <> (guardian_id IS NULL))
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_slip_links_student
            ON permission_slip_links(permission_slip_id, student_id)
            WHERE student_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_slip_links_guardian
            ON permission_slip_links(permission_slip_id, guardian_id)
            WHERE guardian_id IS NOT NULL;",
    )?;
    Ok(())
}
