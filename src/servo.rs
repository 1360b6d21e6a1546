//! A device abstraction for a single calibrated servo.
//!
//! A [`Servo`] owns one PWM output, one [`Calibration`], and the last commanded
//! position. Set a logical value (degrees for the default angular calibration)
//! and the servo converts it to a pulse width through its calibration.
//!
//! Use the [`servo!`] macro for a keyword-driven constructor on the Pico.
//!
//! # Example
//!
//! ```rust,ignore
//! # #![no_std]
//! # #![no_main]
//! # use panic_probe as _;
//! use servo_kit::{Result, calibration::CalibrationType, servo};
//!
//! async fn example(p: embassy_rp::Peripherals) -> Result<()> {
//!     // GPIO 15 is channel B of PWM slice 7.
//!     let mut servo = servo! {
//!         pin: p.PIN_15,
//!         slice: p.PWM_SLICE7,
//!         calibration: CalibrationType::Angular,
//!     }?;
//!
//!     servo.set_value(45.0)?;   // 45 degrees
//!     servo.to_mid()?;          // back to center
//!     servo.to_percent(0.25)?;  // a quarter of the way from min to max
//!     servo.disable()?;         // let the servo relax
//!     servo.enable()?;          // resume at the last position
//!     Ok(())
//! }
//! ```

use crate::calibration::{Calibration, CalibrationType};
use crate::pwm::{DEFAULT_FREQUENCY, PwmDriver, is_valid_frequency};
use crate::{Error, Result};

pub(crate) mod servo_state;

use servo_state::ServoState;

/// Create an RP servo with keyword arguments, calling [`Servo::init`].
///
/// Required fields: `pin`, `slice`. Optional field: `calibration`
/// (a [`CalibrationType`], defaults to [`CalibrationType::Angular`]).
///
/// Evaluates to [`Result`]`<`[`Servo`]`<`[`RpServoPwm`](crate::pwm::rp::RpServoPwm)`>>`.
///
/// See the [module-level example](mod@crate::servo) for usage.
#[cfg(not(feature = "host"))]
#[macro_export]
macro_rules! servo {
    (pin: $pin:expr, slice: $slice:expr $(,)?) => {
        $crate::pwm::rp::servo_from_pin_slice(
            $pin,
            $slice,
            $crate::calibration::CalibrationType::Angular,
        )
    };
    (pin: $pin:expr, slice: $slice:expr, calibration: $kind:expr $(,)?) => {
        $crate::pwm::rp::servo_from_pin_slice($pin, $slice, $kind)
    };
    (slice: $slice:expr, pin: $pin:expr $(, calibration: $kind:expr)? $(,)?) => {
        $crate::servo! { pin: $pin, slice: $slice $(, calibration: $kind)? }
    };
}
#[cfg(not(feature = "host"))]
#[doc(inline)]
pub use servo;

/// A calibrated servo on one PWM output.
///
/// See the [module-level documentation](mod@crate::servo) for usage.
pub struct Servo<P> {
    driver: P,
    pin: u8,
    frequency: f32,
    state: ServoState,
}

impl<P: PwmDriver> Servo<P> {
    /// Create a servo on `pin` of `driver` with the preset calibration for `kind`.
    ///
    /// Nothing is written to the hardware until [`init`](Self::init).
    pub fn new(driver: P, pin: u8, kind: CalibrationType) -> Self {
        Self {
            driver,
            pin,
            frequency: DEFAULT_FREQUENCY,
            state: ServoState::new(kind),
        }
    }

    /// Configure the output at the default frequency, disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the backend cannot run at the
    /// default frequency, or [`Error::Pwm`] if it rejects the write.
    pub fn init(&mut self) -> Result<()> {
        if !self.driver.set_frequency(DEFAULT_FREQUENCY) {
            return Err(Error::InvalidArgument(
                "PWM backend cannot produce the default frequency",
            ));
        }
        self.frequency = DEFAULT_FREQUENCY;
        self.driver.disable(self.pin)?;
        self.state.disable();
        device_log!(info, "Servo {} init at {}Hz", self.pin, self.frequency);
        Ok(())
    }

    /// The physical pin (channel) this servo drives.
    #[must_use]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// The PWM backend.
    #[must_use]
    pub const fn driver(&self) -> &P {
        &self.driver
    }

    /// Start emitting pulses, resuming the last position.
    ///
    /// A servo that was never positioned goes to its mid value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if the servo was never positioned
    /// and its calibration cannot resolve the mid value, or [`Error::Pwm`].
    pub fn enable(&mut self) -> Result<()> {
        let position = self.state.position();
        let pulse = self.state.enable()?;
        self.output(pulse)
            .inspect_err(|_| self.state.restore(position))
    }

    /// Stop emitting pulses. The last position is kept for [`enable`](Self::enable).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the write.
    pub fn disable(&mut self) -> Result<()> {
        self.driver.disable(self.pin)?;
        self.state.disable();
        Ok(())
    }

    /// Whether the servo is emitting pulses.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// The last commanded logical value.
    #[must_use]
    pub const fn value(&self) -> f32 {
        self.state.value()
    }

    /// Move to logical `value`, enabling the servo.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if the calibration has fewer than
    /// two points; the output is left unchanged. Returns [`Error::Pwm`] if the
    /// backend rejects the write.
    pub fn set_value(&mut self, value: f32) -> Result<()> {
        let position = self.state.position();
        let pulse = self.state.set_value(value).inspect_err(|_| {
            device_log!(warn, "Servo {} calibration cannot convert {}", self.pin, value);
        })?;
        device_log!(debug, "Servo {} value {} -> {}µs", self.pin, value, pulse);
        self.output(pulse)
            .inspect_err(|_| self.state.restore(position))
    }

    /// The last commanded pulse width (µs), kept while disabled.
    #[must_use]
    pub const fn pulse(&self) -> f32 {
        self.state.pulse()
    }

    /// Emit `pulse` microseconds directly, enabling the servo.
    ///
    /// The implied value is updated when the calibration can resolve it.
    /// A pulse below [`MIN_VALID_PULSE`](crate::pwm::MIN_VALID_PULSE) disables the servo.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the write.
    pub fn set_pulse(&mut self, pulse: f32) -> Result<()> {
        let position = self.state.position();
        let written = match self.state.set_pulse(pulse) {
            Some(pulse) => self.output(pulse),
            None => self.driver.disable(self.pin),
        };
        written.inspect_err(|_| self.state.restore(position))
    }

    /// PWM frame rate (Hz).
    #[must_use]
    pub const fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Change the PWM frame rate, keeping the current pulse width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `frequency` is outside 10–350 Hz
    /// or the backend cannot produce it; the frequency is unchanged.
    pub fn set_frequency(&mut self, frequency: f32) -> Result<()> {
        if !is_valid_frequency(frequency) {
            return Err(Error::InvalidArgument(
                "freq out of range. Expected 10Hz to 350Hz",
            ));
        }
        if !self.driver.set_frequency(frequency) {
            return Err(Error::InvalidArgument(
                "PWM backend cannot produce this frequency",
            ));
        }
        self.frequency = frequency;
        device_log!(info, "Servo {} frequency {}Hz", self.pin, frequency);
        if self.state.is_enabled() {
            self.driver.set_pulse(self.pin, self.state.pulse())?;
        }
        Ok(())
    }

    /// Value of the first calibration point (0 for an empty calibration).
    #[must_use]
    pub fn min_value(&self) -> f32 {
        self.state.min_value()
    }

    /// Middle calibration value (0 for an empty calibration).
    #[must_use]
    pub fn mid_value(&self) -> f32 {
        self.state.mid_value()
    }

    /// Value of the last calibration point (0 for an empty calibration).
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.state.max_value()
    }

    /// Move to [`min_value`](Self::min_value).
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_min(&mut self) -> Result<()> {
        self.set_value(self.min_value())
    }

    /// Move to [`mid_value`](Self::mid_value).
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_mid(&mut self) -> Result<()> {
        self.set_value(self.mid_value())
    }

    /// Move to [`max_value`](Self::max_value).
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_max(&mut self) -> Result<()> {
        self.set_value(self.max_value())
    }

    /// Move to fraction `input` (0 to 1) of the way from min to max value.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_percent(&mut self, input: f32) -> Result<()> {
        self.to_percent_between(input, 0.0, 1.0)
    }

    /// Move to where `input` falls within `[in_min, in_max]`, mapped onto min to max value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `in_min == in_max`, otherwise see
    /// [`set_value`](Self::set_value).
    pub fn to_percent_between(&mut self, input: f32, in_min: f32, in_max: f32) -> Result<()> {
        let (value_min, value_max) = (self.min_value(), self.max_value());
        self.to_percent_mapped(input, in_min, in_max, value_min, value_max)
    }

    /// Move to where `input` falls within `[in_min, in_max]`, mapped onto `[value_min, value_max]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `in_min == in_max`, otherwise see
    /// [`set_value`](Self::set_value).
    pub fn to_percent_mapped(
        &mut self,
        input: f32,
        in_min: f32,
        in_max: f32,
        value_min: f32,
        value_max: f32,
    ) -> Result<()> {
        let position = self.state.position();
        let pulse = self
            .state
            .to_percent(input, in_min, in_max, value_min, value_max)?;
        self.output(pulse)
            .inspect_err(|_| self.state.restore(position))
    }

    /// Read-only view of this servo's calibration.
    #[must_use]
    pub const fn calibration(&self) -> &Calibration {
        self.state.calibration()
    }

    /// Mutable view of this servo's calibration.
    ///
    /// Edits apply from the next value written; the current output is not re-derived.
    pub const fn calibration_mut(&mut self) -> &mut Calibration {
        self.state.calibration_mut()
    }

    fn output(&mut self, pulse: f32) -> Result<()> {
        self.driver.set_pulse(self.pin, pulse)?;
        self.driver.enable(self.pin)
    }
}
