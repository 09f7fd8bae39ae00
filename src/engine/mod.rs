//! Booking availability and assessment scoring.
//!
//! Both routines take their data sources explicitly (see
//! [`crate::db::BookingRepository`]) and hold no state of their own.

pub mod availability;
pub mod scoring;

pub use availability::{is_slot_available, parse_day, AvailabilityError};
pub use scoring::{score_assessment, ScoreResult, ScoringError};
