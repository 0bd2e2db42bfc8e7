//! # Capacity Baselines
//!
//! Per-queue resource profiles learned from job samples, with a confidence
//! score that grows with the number of samples seen and a recalculation
//! cadence that slows down as confidence rises.

pub mod calculator;
pub mod schedule;

pub use calculator::{deviation_ratio, BaselineCalculator, WindowObservation};
pub use schedule::{ConfidenceTier, RecalculationSchedule};
