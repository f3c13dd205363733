use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use paperless_permission::error::AppError;
use paperless_permission::roster::RosterSnapshot;
use paperless_permission::service::{BackgroundTask, TaskOutcome};
use paperless_permission::slips::{SignatureSubmission, SlipSettings};
use paperless_permission::store::{RosterStore, SlipStore, SqliteStore};
use paperless_permission::trips::{FieldTrip, TripRequest};
use paperless_permission::{GenerationSummary, PermissionSlipService, SlipId, TripId};
use tokio::sync::mpsc;

use crate::cli::{Command, RosterCommand, SlipCommand, TripCommand};
use crate::infra::{self, ChannelTaskQueue, CliService, OutboxMailer};

/// Service wiring for one CLI invocation plus the tasks it queued.
pub(crate) struct Session {
    service: Arc<CliService>,
    mailer: Arc<OutboxMailer>,
    pending: mpsc::UnboundedReceiver<BackgroundTask>,
}

impl Session {
    pub(crate) fn new(store: SqliteStore, settings: SlipSettings, mailer: OutboxMailer) -> Self {
        let (queue, pending) = ChannelTaskQueue::new();
        let service = PermissionSlipService::new(Arc::new(store), Arc::new(queue), settings);
        Self {
            service: Arc::new(service),
            mailer: Arc::new(mailer),
            pending,
        }
    }

    /// Runs the background tasks queued by the command.
    pub(crate) async fn finish(&mut self) -> Result<Vec<TaskOutcome>, AppError> {
        infra::drain(&self.service, &self.mailer, &mut self.pending).await
    }
}

pub(crate) fn execute<W: Write>(
    session: &Session,
    command: Command,
    out: &mut W,
) -> Result<(), AppError> {
    match command {
        Command::Roster {
            command: RosterCommand::Apply { path },
        } => apply_roster(&session.service, &path, out),
        Command::Trip { command } => trip(&session.service, command, out),
        Command::Slip { command } => slip(&session.service, command, out),
    }
}

fn apply_roster<W: Write>(service: &CliService, path: &Path, out: &mut W) -> Result<(), AppError> {
    let snapshot: RosterSnapshot = serde_json::from_str(&fs::read_to_string(path)?)?;
    let summary = service.apply_roster(&snapshot)?;

    writeln!(out, "Roster applied from {}", path.display())?;
    for (kind, count) in &summary.upserted {
        let hidden = summary.hidden.get(kind).copied().unwrap_or(0);
        writeln!(out, "- {}: {count} current, {hidden} hidden", kind.label())?;
    }
    writeln!(out, "- enrollments: {}", summary.enrollments)?;
    if !summary.missing_students.is_empty() {
        let missing: Vec<&str> = summary.missing_students.iter().map(String::as_str).collect();
        writeln!(out, "- unknown students skipped: {}", missing.join(", "))?;
    }
    if !summary.missing_sections.is_empty() {
        let missing: Vec<&str> = summary.missing_sections.iter().map(String::as_str).collect();
        writeln!(out, "- unknown sections skipped: {}", missing.join(", "))?;
    }
    Ok(())
}

fn trip<W: Write>(service: &CliService, command: TripCommand, out: &mut W) -> Result<(), AppError> {
    match command {
        TripCommand::Create(args) => {
            let request = load_request(&args.file)?;
            let draft = request.resolve(service.store().as_ref())?;
            let trip = service.create_trip(draft)?;
            writeln!(out, "Created trip {} ({})", trip.id, trip.details.name)?;
        }
        TripCommand::Update {
            trip,
            request,
            force,
        } => {
            let draft = load_request(&request.file)?.resolve(service.store().as_ref())?;
            let trip = service.update_trip(TripId(trip.trip), draft, force)?;
            writeln!(out, "Updated trip {} ({})", trip.id, trip.details.name)?;
        }
        TripCommand::List { all, coordinator } => {
            let trips = match coordinator {
                Some(email) => service.trips_for_coordinator(&email)?,
                None => service.trips(all)?,
            };
            for trip in &trips {
                write_trip_line(out, trip)?;
            }
        }
        TripCommand::Show(arg) => {
            let trip = service.trip(TripId(arg.trip))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&trip)?)?;
        }
        TripCommand::Audience(arg) => {
            for id in service.resolve_audience(TripId(arg.trip))? {
                let student = service.store().student(id)?;
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    student.person.person_id,
                    student.grade_level.code(),
                    student.person.full_name()
                )?;
            }
        }
        TripCommand::Generate { trip, force } => {
            let summary = service.generate_permission_slips(TripId(trip.trip), force)?;
            write_generation(out, TripId(trip.trip), &summary)?;
        }
        TripCommand::Approve(arg) => {
            let id = TripId(arg.trip);
            if service.approve(id)? {
                writeln!(out, "Trip {id} approved")?;
            } else {
                writeln!(out, "Trip {id} was already approved")?;
            }
        }
        TripCommand::Release(arg) => {
            let id = TripId(arg.trip);
            let summary = service.release(id)?;
            writeln!(out, "Trip {id} released")?;
            write_generation(out, id, &summary)?;
            service.request_trip_notifications(id);
            writeln!(out, "Queued notifications for trip {id}")?;
        }
        TripCommand::Archive(arg) => {
            let trip = service.archive(TripId(arg.trip))?;
            writeln!(out, "Trip {} archived", trip.id)?;
        }
        TripCommand::Status { trip, csv } => {
            let report = service.trip_status(TripId(trip.trip))?;
            if csv {
                report.write_csv(&mut *out)?;
            } else {
                writeln!(
                    out,
                    "{} [{}]: {}/{} slips complete",
                    report.trip_name, report.status_label, report.completed, report.total
                )?;
                for row in report.outstanding() {
                    let flag = if row.flagged_for_review { " (flagged)" } else { "" };
                    writeln!(
                        out,
                        "- {} {}: due {}{flag}",
                        row.student_person_id, row.student_name, row.due_date
                    )?;
                }
            }
        }
        TripCommand::Notify(arg) => {
            let trip = service.trip(TripId(arg.trip))?;
            trip.ensure_notifiable()?;
            service.request_trip_notifications(trip.id);
            writeln!(out, "Queued notifications for trip {}", trip.id)?;
        }
    }
    Ok(())
}

fn slip<W: Write>(service: &CliService, command: SlipCommand, out: &mut W) -> Result<(), AppError> {
    match command {
        SlipCommand::Sign {
            token,
            name,
            consent,
        } => {
            let slip = service.submit_signature(&token, &SignatureSubmission::new(name, consent))?;
            match slip.completed_at() {
                Some(at) => writeln!(out, "Slip {} complete as of {at}", slip.id)?,
                None => writeln!(out, "Slip {} signed; waiting on the other party", slip.id)?,
            }
        }
        SlipCommand::Emails(arg) => {
            let emails = service.render_notification_emails(SlipId(arg.slip))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&emails)?)?;
        }
        SlipCommand::Resend(arg) => {
            let slip = service.store().slip(SlipId(arg.slip))?;
            service.trip(slip.field_trip)?.ensure_notifiable()?;
            service.request_resend(slip.id);
            writeln!(out, "Queued resend for slip {}", slip.id)?;
        }
        SlipCommand::Reset(arg) => {
            let slip = service.reset_slip(SlipId(arg.slip))?;
            writeln!(out, "Slip {} reset", slip.id)?;
        }
        SlipCommand::Due { slip, date } => {
            let slip = service.set_slip_due_date(SlipId(slip.slip), date)?;
            match slip.due_date {
                Some(date) => writeln!(out, "Slip {} due {date}", slip.id)?,
                None => writeln!(out, "Slip {} follows the trip due date", slip.id)?,
            }
        }
        SlipCommand::Flag { slip, clear } => {
            let slip = service.flag_for_review(SlipId(slip.slip), !clear)?;
            let state = if slip.flagged_for_review { "flagged" } else { "cleared" };
            writeln!(out, "Slip {} {state}", slip.id)?;
        }
    }
    Ok(())
}

/// Prints what the background tasks did once the command has finished.
pub(crate) fn report_outcomes<W: Write>(
    outcomes: &[TaskOutcome],
    out: &mut W,
) -> Result<(), AppError> {
    for outcome in outcomes {
        if let Some(summary) = &outcome.generated {
            writeln!(
                out,
                "Background generation: {} slips and {} links created for {} students",
                summary.slips_created, summary.links_created, summary.audience
            )?;
        }
        if outcome.emails_sent > 0 {
            writeln!(out, "Sent {} emails", outcome.emails_sent)?;
        }
    }
    Ok(())
}

fn load_request(path: &Path) -> Result<TripRequest, AppError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn write_trip_line<W: Write>(out: &mut W, trip: &FieldTrip) -> Result<(), AppError> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}",
        trip.id, trip.status, trip.details.start_date, trip.details.name
    )?;
    Ok(())
}

fn write_generation<W: Write>(
    out: &mut W,
    trip: TripId,
    summary: &GenerationSummary,
) -> Result<(), AppError> {
    writeln!(
        out,
        "Trip {trip}: {} invited, {} slips and {} links created",
        summary.audience, summary.slips_created, summary.links_created
    )?;
    Ok(())
}
