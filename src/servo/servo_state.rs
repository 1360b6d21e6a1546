//! Position bookkeeping shared by [`Servo`](crate::servo::Servo) and each
//! [`ServoCluster`](crate::servo_cluster::ServoCluster) channel.

use crate::calibration::{Calibration, CalibrationType, LOWER_HARD_LIMIT, UPPER_HARD_LIMIT, map_float};
use crate::pwm::MIN_VALID_PULSE;
use crate::{Error, Result};

/// The logical and physical position of one output, plus its calibration.
///
/// Methods validate first and mutate only on success. They return the pulse
/// the hardware should now emit; the caller programs it.
#[derive(Debug, Clone)]
pub(crate) struct ServoState {
    calibration: Calibration,
    enabled: bool,
    value: f32,
    // Last pulse commanded while enabled; kept across disable.
    pulse: f32,
}

/// Everything except the calibration, for rolling back after a failed write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Position {
    enabled: bool,
    value: f32,
    pulse: f32,
}

impl ServoState {
    pub(crate) fn new(kind: CalibrationType) -> Self {
        Self {
            calibration: Calibration::new(kind),
            enabled: false,
            value: 0.0,
            pulse: 0.0,
        }
    }

    pub(crate) const fn position(&self) -> Position {
        Position {
            enabled: self.enabled,
            value: self.value,
            pulse: self.pulse,
        }
    }

    pub(crate) const fn restore(&mut self, position: Position) {
        self.enabled = position.enabled;
        self.value = position.value;
        self.pulse = position.pulse;
    }

    pub(crate) const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) const fn value(&self) -> f32 {
        self.value
    }

    pub(crate) const fn pulse(&self) -> f32 {
        self.pulse
    }

    /// Pulse to emit while enabled, otherwise zero.
    pub(crate) const fn output_pulse(&self) -> f32 {
        if self.enabled { self.pulse } else { 0.0 }
    }

    pub(crate) const fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub(crate) const fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    /// Enable, first moving to the mid value if no pulse was ever commanded.
    pub(crate) fn enable(&mut self) -> Result<f32> {
        if self.pulse < MIN_VALID_PULSE {
            let (pulse, value) = self.calibration.value_to_pulse(self.mid_value())?;
            self.pulse = pulse;
            self.value = value;
        }
        self.enabled = true;
        Ok(self.pulse)
    }

    pub(crate) const fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn set_value(&mut self, value: f32) -> Result<f32> {
        let (pulse, value) = self.calibration.value_to_pulse(value)?;
        self.pulse = pulse;
        self.value = value;
        self.enabled = true;
        Ok(pulse)
    }

    /// `None` means the pulse was too narrow to be a pulse and the output is now disabled.
    ///
    /// A calibration too small to interpolate leaves the value as it was.
    pub(crate) fn set_pulse(&mut self, pulse: f32) -> Option<f32> {
        if pulse < MIN_VALID_PULSE {
            self.disable();
            return None;
        }
        match self.calibration.pulse_to_value(pulse) {
            Ok((value, pulse)) => {
                self.value = value;
                self.pulse = pulse;
            }
            Err(_) => self.pulse = pulse.clamp(LOWER_HARD_LIMIT, UPPER_HARD_LIMIT),
        }
        self.enabled = true;
        Some(self.pulse)
    }

    pub(crate) fn min_value(&self) -> f32 {
        self.calibration.first_point().map_or(0.0, |point| point.value)
    }

    /// Middle of an even table is halfway between its ends; an odd table has a central point.
    pub(crate) fn mid_value(&self) -> f32 {
        let points = self.calibration.points();
        match (points.first(), points.last()) {
            (Some(first), Some(last)) if points.len() % 2 == 0 => (first.value + last.value) / 2.0,
            _ => points.get(points.len() / 2).map_or(0.0, |point| point.value),
        }
    }

    pub(crate) fn max_value(&self) -> f32 {
        self.calibration.last_point().map_or(0.0, |point| point.value)
    }

    /// Map `input` from `[in_min, in_max]` onto `[value_min, value_max]` and go there.
    #[expect(
        clippy::float_cmp,
        reason = "only an exactly empty input range divides by zero"
    )]
    pub(crate) fn to_percent(
        &mut self,
        input: f32,
        in_min: f32,
        in_max: f32,
        value_min: f32,
        value_max: f32,
    ) -> Result<f32> {
        if in_min == in_max || in_min.is_nan() || in_max.is_nan() {
            return Err(Error::InvalidArgument(
                "percent input range must not be empty",
            ));
        }
        self.set_value(map_float(input, in_min, in_max, value_min, value_max))
    }
}
