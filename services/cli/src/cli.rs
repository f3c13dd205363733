use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use paperless_permission::config::AppConfig;
use paperless_permission::error::AppError;
use paperless_permission::store::SqliteStore;
use paperless_permission::telemetry;
use tracing::info;

use crate::commands::{self, Session};
use crate::infra::OutboxMailer;

#[derive(Parser, Debug)]
#[command(
    name = "paperless-permission",
    about = "Manage field trips, permission slips and guardian signatures",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Import the school roster
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Create trips and move them through approval and release
    Trip {
        #[command(subcommand)]
        command: TripCommand,
    },
    /// Sign, resend and administer individual permission slips
    Slip {
        #[command(subcommand)]
        command: SlipCommand,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum RosterCommand {
    /// Reconcile the stored roster against a JSON snapshot
    Apply {
        /// Snapshot with faculty, classes, students, guardians and enrollment
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum TripCommand {
    /// Create a trip from a JSON trip request
    Create(RequestArgs),
    /// Replace a trip's details, audience and coordinators
    Update {
        #[command(flatten)]
        trip: TripArg,
        #[command(flatten)]
        request: RequestArgs,
        /// Allow editing an archived trip
        #[arg(long)]
        force: bool,
    },
    /// List trips
    List {
        /// Include archived trips
        #[arg(long)]
        all: bool,
        /// Only trips coordinated by this faculty email
        #[arg(long)]
        coordinator: Option<String>,
    },
    /// Print a trip as JSON
    Show(TripArg),
    /// List the students a trip currently invites
    Audience(TripArg),
    /// Create any missing permission slips and links
    Generate {
        #[command(flatten)]
        trip: TripArg,
        /// Generate even if the trip is archived
        #[arg(long)]
        force: bool,
    },
    Approve(TripArg),
    /// Release an approved trip and generate its slips
    Release(TripArg),
    Archive(TripArg),
    /// Report signature progress for every slip
    Status {
        #[command(flatten)]
        trip: TripArg,
        /// Write the report as CSV instead of text
        #[arg(long)]
        csv: bool,
    },
    /// Email every incomplete slip of a released trip
    Notify(TripArg),
}

#[derive(Subcommand, Debug)]
pub(crate) enum SlipCommand {
    /// Submit a signature through a slip link
    Sign {
        /// Link token from the slip URL
        token: String,
        /// Typed name of the signer
        #[arg(long)]
        name: String,
        /// Confirm consent for the trip
        #[arg(long)]
        consent: bool,
    },
    /// Print the emails a slip would send, without sending them
    Emails(SlipArg),
    /// Email every party of a slip again
    Resend(SlipArg),
    /// Clear both signatures and the review flag
    Reset(SlipArg),
    /// Set or clear a slip's own due date
    Due {
        #[command(flatten)]
        slip: SlipArg,
        /// New due date (YYYY-MM-DD); omit to use the trip's due date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark a slip for manual review
    Flag {
        #[command(flatten)]
        slip: SlipArg,
        /// Remove the flag instead
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Args, Debug)]
pub(crate) struct TripArg {
    /// Trip id
    pub(crate) trip: i64,
}

#[derive(Args, Debug)]
pub(crate) struct SlipArg {
    /// Permission slip id
    pub(crate) slip: i64,
}

#[derive(Args, Debug)]
pub(crate) struct RequestArgs {
    /// JSON trip request naming coordinators, students, courses and sections
    /// by their roster identifiers
    #[arg(long)]
    pub(crate) file: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store = SqliteStore::open(&config.database.path)?;
    info!(
        ?config.environment,
        database = %config.database.path.display(),
        "permission slip store opened"
    );
    let mailer = OutboxMailer::new(config.email.outbox.clone());
    let mut session = Session::new(store, config.slip_settings(), mailer);

    {
        let mut stdout = io::stdout().lock();
        commands::execute(&session, cli.command, &mut stdout)?;
    }

    let outcomes = session.finish().await?;
    commands::report_outcomes(&outcomes, &mut io::stdout().lock())
}
