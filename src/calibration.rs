//! Piecewise-linear mapping between servo pulse widths and logical values.
//!
//! A [`Calibration`] is an ordered table of [`Point`]s, strictly increasing in
//! pulse. Conversions locate the bracketing pair of points and interpolate
//! linearly between them. Outside the table, each end either clamps to its end
//! point or extrapolates along its end segment, chosen independently with
//! [`Calibration::limit_to_calibration`].
//!
//! Angular servos usually clamp both ends so they are never driven into their
//! end stops. Continuous-rotation servos and speed controllers can extrapolate
//! instead.
//!
//! ```rust
//! use servo_kit::calibration::Calibration;
//!
//! # fn main() -> servo_kit::Result<()> {
//! let mut calibration = Calibration::blank();
//! calibration.create_two_point_calibration(1000.0, 2000.0, 0.0, 100.0);
//!
//! let (pulse, value) = calibration.value_to_pulse(50.0)?;
//! assert_eq!((pulse, value), (1500.0, 50.0));
//! # Ok(())
//! # }
//! ```

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum number of points a [`Calibration`] can hold.
pub const MAX_CALIBRATION_POINTS: usize = 16;

/// Default pulse width (µs) of the first point in the preset tables.
pub const DEFAULT_MIN_PULSE: f32 = 500.0;

/// Default pulse width (µs) of the middle point in the preset tables.
pub const DEFAULT_MID_PULSE: f32 = 1500.0;

/// Default pulse width (µs) of the last point in the preset tables.
pub const DEFAULT_MAX_PULSE: f32 = 2500.0;

/// No conversion ever produces a pulse below this width (µs).
pub const LOWER_HARD_LIMIT: f32 = 400.0;

/// No conversion ever produces a pulse above this width (µs).
pub const UPPER_HARD_LIMIT: f32 = 2600.0;

/// Preset shapes for [`Calibration::create_default_calibration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(not(feature = "host"), derive(defmt::Format))]
pub enum CalibrationType {
    /// Positional servo, values in degrees: -90, 0, +90.
    #[default]
    Angular,
    /// Linear actuator, values as a fraction of travel: 0, 0.5, 1.
    Linear,
    /// Continuous-rotation servo, values as signed speed: -1 to +1.
    Continuous,
}

/// One control point: a pulse width and the value it produces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(not(feature = "host"), derive(defmt::Format))]
pub struct Point {
    /// Pulse width in microseconds.
    pub pulse: f32,
    /// Logical value (angle, fraction, speed) at this pulse.
    pub value: f32,
}

impl Point {
    /// Create a point from a pulse width (µs) and a value.
    #[must_use]
    pub const fn new(pulse: f32, value: f32) -> Self {
        Self { pulse, value }
    }
}

impl From<(f32, f32)> for Point {
    fn from((pulse, value): (f32, f32)) -> Self {
        Self { pulse, value }
    }
}

impl From<[f32; 2]> for Point {
    fn from([pulse, value]: [f32; 2]) -> Self {
        Self { pulse, value }
    }
}

impl From<Point> for (f32, f32) {
    fn from(point: Point) -> Self {
        (point.pulse, point.value)
    }
}

/// Accepts any numeric sequence of exactly two components, `[pulse, value]`.
impl TryFrom<&[f32]> for Point {
    type Error = Error;

    fn try_from(components: &[f32]) -> Result<Self> {
        match *components {
            [pulse, value] => Ok(Self { pulse, value }),
            _ => Err(Error::InvalidArgument(
                "point must contain two numbers: pulse, value",
            )),
        }
    }
}

/// An ordered pulse/value table with independent lower and upper clamping.
///
/// See the [module documentation](mod@crate::calibration) for an overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    points: Vec<Point, MAX_CALIBRATION_POINTS>,
    limit_lower: bool,
    limit_upper: bool,
}

#[cfg(not(feature = "host"))]
impl defmt::Format for Calibration {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        defmt::write!(
            fmt,
            "Calibration {{ points: {}, limit_lower: {}, limit_upper: {} }}",
            self.points.as_slice(),
            self.limit_lower,
            self.limit_upper
        );
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(CalibrationType::default())
    }
}

impl Calibration {
    /// Create a calibration populated with the preset table for `kind`.
    #[must_use]
    pub fn new(kind: CalibrationType) -> Self {
        let mut calibration = Self::blank();
        calibration.create_default_calibration(kind);
        calibration
    }

    /// Create an empty calibration with both ends clamped.
    #[must_use]
    pub const fn blank() -> Self {
        Self {
            points: Vec::new(),
            limit_lower: true,
            limit_upper: true,
        }
    }

    /// Reset the table to `size` zero-valued points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `size` exceeds
    /// [`MAX_CALIBRATION_POINTS`]. The table is unchanged in that case.
    pub fn create_blank_calibration(&mut self, size: usize) -> Result<()> {
        if size > MAX_CALIBRATION_POINTS {
            return Err(Error::InvalidArgument(
                "size out of range. Expected 0 to 16",
            ));
        }
        self.points.clear();
        self.points
            .resize(size, Point::default())
            .map_err(|()| Error::InvalidArgument("size out of range. Expected 0 to 16"))
    }

    /// Replace the table with exactly two points.
    pub fn create_two_point_calibration(
        &mut self,
        min_pulse: f32,
        max_pulse: f32,
        min_value: f32,
        max_value: f32,
    ) {
        self.replace_points([
            Point::new(min_pulse, min_value),
            Point::new(max_pulse, max_value),
        ]);
    }

    /// Replace the table with exactly three points, in the given order.
    pub fn create_three_point_calibration(
        &mut self,
        min_pulse: f32,
        mid_pulse: f32,
        max_pulse: f32,
        min_value: f32,
        mid_value: f32,
        max_value: f32,
    ) {
        self.replace_points([
            Point::new(min_pulse, min_value),
            Point::new(mid_pulse, mid_value),
            Point::new(max_pulse, max_value),
        ]);
    }

    /// Replace the table with `size` points evenly spaced in both pulse and value.
    ///
    /// A single point sits at `(min_pulse, min_value)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `size` exceeds
    /// [`MAX_CALIBRATION_POINTS`]. The table is unchanged in that case.
    pub fn create_uniform_calibration(
        &mut self,
        size: usize,
        min_pulse: f32,
        max_pulse: f32,
        min_value: f32,
        max_value: f32,
    ) -> Result<()> {
        self.create_blank_calibration(size)?;
        let last = step_of(size.saturating_sub(1).max(1));
        for (index, point) in self.points.iter_mut().enumerate() {
            let step = step_of(index);
            point.pulse = map_float(step, 0.0, last, min_pulse, max_pulse);
            point.value = map_float(step, 0.0, last, min_value, max_value);
        }
        Ok(())
    }

    /// Replace the table with the preset for `kind`.
    ///
    /// All presets span [`DEFAULT_MIN_PULSE`] to [`DEFAULT_MAX_PULSE`].
    pub fn create_default_calibration(&mut self, kind: CalibrationType) {
        match kind {
            CalibrationType::Angular => self.create_three_point_calibration(
                DEFAULT_MIN_PULSE,
                DEFAULT_MID_PULSE,
                DEFAULT_MAX_PULSE,
                -90.0,
                0.0,
                90.0,
            ),
            CalibrationType::Linear => self.create_three_point_calibration(
                DEFAULT_MIN_PULSE,
                DEFAULT_MID_PULSE,
                DEFAULT_MAX_PULSE,
                0.0,
                0.5,
                1.0,
            ),
            CalibrationType::Continuous => {
                self.create_two_point_calibration(DEFAULT_MIN_PULSE, DEFAULT_MAX_PULSE, -1.0, 1.0);
            }
        }
    }

    /// Number of points in the table.
    #[must_use]
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// All points, in pulse order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The point at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] unless `index < size()`.
    pub fn point_at(&self, index: usize) -> Result<Point> {
        self.points.get(index).copied().ok_or(Error::OutOfRange {
            index,
            len: self.points.len(),
        })
    }

    /// Overwrite the point at `index`.
    ///
    /// Accepts a [`Point`], a `(pulse, value)` tuple, or a `[pulse, value]` array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] unless `index < size()`.
    pub fn set_point_at(&mut self, index: usize, point: impl Into<Point>) -> Result<()> {
        let len = self.points.len();
        let slot = self
            .points
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, len })?;
        *slot = point.into();
        Ok(())
    }

    /// Overwrite the point at `index` from an untyped `[pulse, value]` sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] unless `index < size()`, then
    /// [`Error::InvalidArgument`] unless `components` holds exactly two numbers.
    pub fn set_point_from_slice(&mut self, index: usize, components: &[f32]) -> Result<()> {
        self.point_at(index)?;
        let point = Point::try_from(components)?;
        self.set_point_at(index, point)
    }

    /// The first point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the table is empty.
    pub fn first_point(&self) -> Result<Point> {
        self.point_at(0)
    }

    /// Overwrite the first point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the table is empty.
    pub fn set_first_point(&mut self, point: impl Into<Point>) -> Result<()> {
        self.set_point_at(0, point)
    }

    /// The last point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the table is empty.
    pub fn last_point(&self) -> Result<Point> {
        self.point_at(self.last_index()?)
    }

    /// Overwrite the last point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the table is empty.
    pub fn set_last_point(&mut self, point: impl Into<Point>) -> Result<()> {
        let index = self.last_index()?;
        self.set_point_at(index, point)
    }

    /// Choose, per end, whether out-of-table inputs clamp (`true`) or extrapolate.
    pub const fn limit_to_calibration(&mut self, lower: bool, upper: bool) {
        self.limit_lower = lower;
        self.limit_upper = upper;
    }

    /// Whether inputs below the first point clamp to it.
    #[must_use]
    pub const fn has_lower_limit(&self) -> bool {
        self.limit_lower
    }

    /// Whether inputs above the last point clamp to it.
    #[must_use]
    pub const fn has_upper_limit(&self) -> bool {
        self.limit_upper
    }

    /// Convert a logical value to `(pulse, value)`.
    ///
    /// The returned value differs from the input only when the input was
    /// clamped, either to an end point or by the hard pulse limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if the table has fewer than two points.
    pub fn value_to_pulse(&self, value: f32) -> Result<(f32, f32)> {
        let (first, second, penultimate, last) = self.ends()?;

        let (pulse, mut value_out) = if value < first.value {
            if self.limit_lower {
                (first.pulse, first.value)
            } else {
                (along(value, first, second, Axis::Value), value)
            }
        } else if value > last.value {
            if self.limit_upper {
                (last.pulse, last.value)
            } else {
                (along(value, penultimate, last, Axis::Value), value)
            }
        } else {
            let (lower, upper) = self.bracket(value, Axis::Value);
            (along(value, lower, upper, Axis::Value), value)
        };

        let pulse_out = pulse.clamp(LOWER_HARD_LIMIT, UPPER_HARD_LIMIT);
        if !(LOWER_HARD_LIMIT..=UPPER_HARD_LIMIT).contains(&pulse) {
            value_out = if pulse_out < first.pulse {
                along(pulse_out, first, second, Axis::Pulse)
            } else if pulse_out > last.pulse {
                along(pulse_out, penultimate, last, Axis::Pulse)
            } else {
                let (lower, upper) = self.bracket(pulse_out, Axis::Pulse);
                along(pulse_out, lower, upper, Axis::Pulse)
            };
        }
        Ok((pulse_out, value_out))
    }

    /// Convert a pulse width (µs) to `(value, pulse)`.
    ///
    /// The input is first clamped into the hard pulse limits; the returned
    /// pulse reflects that and any end-point clamping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if the table has fewer than two points.
    pub fn pulse_to_value(&self, pulse: f32) -> Result<(f32, f32)> {
        let (first, second, penultimate, last) = self.ends()?;
        let pulse = pulse.clamp(LOWER_HARD_LIMIT, UPPER_HARD_LIMIT);

        let result = if pulse < first.pulse {
            if self.limit_lower {
                (first.value, first.pulse)
            } else {
                (along(pulse, first, second, Axis::Pulse), pulse)
            }
        } else if pulse > last.pulse {
            if self.limit_upper {
                (last.value, last.pulse)
            } else {
                (along(pulse, penultimate, last, Axis::Pulse), pulse)
            }
        } else {
            let (lower, upper) = self.bracket(pulse, Axis::Pulse);
            (along(pulse, lower, upper, Axis::Pulse), pulse)
        };
        Ok(result)
    }

    fn replace_points<const N: usize>(&mut self, points: [Point; N]) {
        const { assert!(N <= MAX_CALIBRATION_POINTS) };
        self.points = points.into_iter().collect();
    }

    fn last_index(&self) -> Result<usize> {
        self.points
            .len()
            .checked_sub(1)
            .ok_or(Error::OutOfRange { index: 0, len: 0 })
    }

    // (first, second, second-to-last, last)
    fn ends(&self) -> Result<(Point, Point, Point, Point)> {
        let points = self.points.as_slice();
        match (points, points) {
            ([first, second, ..], [.., penultimate, last]) => {
                Ok((*first, *second, *penultimate, *last))
            }
            _ => Err(Error::InvalidCalibration),
        }
    }

    // Input must lie within the table on `axis`; the table has at least two points.
    fn bracket(&self, input: f32, axis: Axis) -> (Point, Point) {
        let mut fallback = (Point::default(), Point::default());
        for segment in self.points.windows(2) {
            if let [lower, upper] = *segment {
                fallback = (lower, upper);
                if input <= axis.of(upper) {
                    return (lower, upper);
                }
            }
        }
        fallback
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Pulse,
    Value,
}

impl Axis {
    const fn of(self, point: Point) -> f32 {
        match self {
            Self::Pulse => point.pulse,
            Self::Value => point.value,
        }
    }

    const fn other(self, point: Point) -> f32 {
        match self {
            Self::Pulse => point.value,
            Self::Value => point.pulse,
        }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "indices are at most MAX_CALIBRATION_POINTS"
)]
const fn step_of(index: usize) -> f32 {
    index as f32
}

// Project `input` (on `axis`) through the line from `from` to `to`, onto the other axis.
fn along(input: f32, from: Point, to: Point, axis: Axis) -> f32 {
    map_float(input, axis.of(from), axis.of(to), axis.other(from), axis.other(to))
}

/// Linearly remap `input` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Inputs outside the source range extrapolate.
#[must_use]
pub fn map_float(input: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    ((input - in_min) * (out_max - out_min)) / (in_max - in_min) + out_min
}
