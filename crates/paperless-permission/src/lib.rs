//! Field-trip permission slips.
//!
//! The crate owns the roster model, the audience resolver that turns a trip's
//! invitation criteria into a set of students, and the generator that keeps one
//! permission slip per invited student and one signature link per responsible
//! party. Storage is abstracted behind [`store::PermissionStore`] with an
//! in-memory and a SQLite backend.

pub mod config;
pub mod error;
pub mod ids;
pub mod roster;
pub mod service;
pub mod slips;
pub mod store;
pub mod telemetry;
pub mod trips;

pub use error::{AppError, PermissionError, ValidationError};
pub use ids::{CourseId, FacultyId, GuardianId, SectionId, SlipId, SlipLinkId, StudentId, TripId};
pub use service::{GenerationSummary, PermissionSlipService};
pub use slips::SlipSettings;
