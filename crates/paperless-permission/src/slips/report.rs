use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::ids::{SlipId, TripId};
use crate::roster::GradeLevel;
use crate::trips::TripStatus;

/// Per-slip line of the trip status report. Flat so it maps onto CSV columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlipStatusRow {
    pub slip: SlipId,
    pub student_person_id: String,
    pub student_name: String,
    pub grade_level: GradeLevel,
    pub due_date: NaiveDate,
    pub student_signature: Option<String>,
    pub student_signed_at: Option<DateTime<Utc>>,
    pub guardian_name: Option<String>,
    pub guardian_signature: Option<String>,
    pub guardian_signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub flagged_for_review: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStatusReport {
    pub trip: TripId,
    pub trip_name: String,
    pub status: TripStatus,
    pub status_label: &'static str,
    pub completed: usize,
    pub total: usize,
    pub rows: Vec<SlipStatusRow>,
}

impl TripStatusReport {
    pub fn new(trip: TripId, trip_name: String, status: TripStatus, mut rows: Vec<SlipStatusRow>) -> Self {
        rows.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then_with(|| a.slip.cmp(&b.slip))
        });
        let completed = rows.iter().filter(|row| row.completed_at.is_some()).count();
        Self {
            trip,
            trip_name,
            status,
            status_label: status.label(),
            completed,
            total: rows.len(),
            rows,
        }
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &SlipStatusRow> {
        self.rows.iter().filter(|row| row.completed_at.is_none())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
