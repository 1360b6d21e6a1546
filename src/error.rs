//! Crate-wide error type.

use derive_more::{Display, Error};

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by calibrations, servos, and clusters.
///
/// Every error is reported synchronously at the offending call, and the failing
/// operation leaves its target unchanged.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "host"), derive(defmt::Format))]
pub enum Error {
    /// An argument was outside the accepted domain.
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] &'static str),

    /// A point or channel index was outside `0..len`.
    #[display("index {index} out of range. Expected 0 to {len}-1")]
    OutOfRange {
        /// The rejected index.
        index: usize,
        /// The number of valid indices.
        len: usize,
    },

    /// The calibration has fewer than two points, so it cannot interpolate.
    #[display("calibration invalid: at least two points are needed")]
    InvalidCalibration,

    /// The PWM backend rejected a write.
    #[display("PWM backend rejected the write")]
    Pwm,
}
