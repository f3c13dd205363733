//! Field trips, their approval workflow and audience resolution.

pub mod audience;
pub mod domain;
mod lifecycle;

pub use audience::resolve_audience;
pub use domain::{AudienceCriteria, FieldTrip, TripDetails, TripDraft, TripRequest, TripStatus};
