//! PWM backends that servos and clusters program.
//!
//! - [`PwmDriver`] is the per-channel interface a [`Servo`](crate::servo::Servo) drives.
//! - [`ClusterPwm`] takes a whole [`PulseFrame`](crate::servo_cluster::PulseFrame) at once,
//!   so every channel of a [`ServoCluster`](crate::servo_cluster::ServoCluster) changes together.
//! - [`HalPwm`] adapts any `embedded-hal` [`SetDutyCycle`] channel.
//! - `RpServoPwm` and `RpSliceCluster` (device builds only) drive RP2040/RP235x PWM slices.

use embedded_hal::pwm::SetDutyCycle;

use crate::servo_cluster::PulseFrame;
use crate::{Error, Result};

#[cfg(not(feature = "host"))]
pub mod rp;

/// Default PWM frame rate for hobby servos (Hz).
pub const DEFAULT_FREQUENCY: f32 = 50.0;

/// Lowest accepted PWM frame rate (Hz).
pub const MIN_FREQUENCY: f32 = 10.0;

/// Highest accepted PWM frame rate (Hz).
pub const MAX_FREQUENCY: f32 = 350.0;

/// Pulses narrower than this (µs) mean "no pulse": the output is disabled instead.
pub const MIN_VALID_PULSE: f32 = 1.0;

/// Whether `frequency` (Hz) lies within [`MIN_FREQUENCY`]..=[`MAX_FREQUENCY`].
#[must_use]
pub fn is_valid_frequency(frequency: f32) -> bool {
    (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency)
}

/// Per-channel PWM output used by a single servo.
///
/// A pulse write must be a single in-place update that the hardware picks up on
/// its next cycle, never a partial reconfiguration.
pub trait PwmDriver {
    /// Program a high time of `pulse_us` microseconds on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the write.
    fn set_pulse(&mut self, channel: u8, pulse_us: f32) -> Result<()>;

    /// Change the frame rate. Returns `false` if the backend cannot produce it.
    fn set_frequency(&mut self, frequency: f32) -> bool;

    /// Start emitting pulses on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the write.
    fn enable(&mut self, channel: u8) -> Result<()>;

    /// Stop emitting pulses on `channel`; the output idles low.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the write.
    fn disable(&mut self, channel: u8) -> Result<()>;

    /// Whether `channel` is currently emitting pulses.
    fn is_enabled(&self, channel: u8) -> bool;
}

/// Multi-channel PWM output that latches a whole frame of pulses at once.
pub trait ClusterPwm {
    /// Bitmask of the pins this backend drives (bit `n` is pin `n`).
    fn pin_mask(&self) -> u32;

    /// Change the frame rate of every channel. Returns `false` if the backend cannot produce it.
    fn set_frequency(&mut self, frequency: f32) -> bool;

    /// Replace every channel's pulse with those in `frame`, as one update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the frame.
    fn load(&mut self, frame: &PulseFrame) -> Result<()>;
}

/// A servo output on any `embedded-hal` PWM channel.
///
/// The channel's timer must already run at `frequency`; this adapter only
/// scales pulse widths into duty cycles, so it cannot retime the channel.
///
/// ```rust
/// use core::convert::Infallible;
/// use embedded_hal::pwm::{ErrorType, SetDutyCycle};
/// use servo_kit::{calibration::CalibrationType, pwm::HalPwm, servo::Servo};
///
/// struct Channel(u16);
/// impl ErrorType for Channel {
///     type Error = Infallible;
/// }
/// impl SetDutyCycle for Channel {
///     fn max_duty_cycle(&self) -> u16 {
///         20_000
///     }
///     fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
///         self.0 = duty;
///         Ok(())
///     }
/// }
///
/// # fn main() -> servo_kit::Result<()> {
/// let mut servo = Servo::new(HalPwm::new(Channel(0), 50.0), 0, CalibrationType::Angular);
/// servo.init()?;
/// servo.set_value(0.0)?;
/// assert_eq!(servo.pulse(), 1500.0);
/// # Ok(())
/// # }
/// ```
pub struct HalPwm<C> {
    channel: C,
    frequency: f32,
    pulse_us: f32,
    enabled: bool,
}

impl<C: SetDutyCycle> HalPwm<C> {
    /// Wrap `channel`, whose timer runs at `frequency` Hz.
    pub const fn new(channel: C, frequency: f32) -> Self {
        Self {
            channel,
            frequency,
            pulse_us: 0.0,
            enabled: false,
        }
    }

    /// Give back the wrapped channel.
    pub fn into_inner(self) -> C {
        self.channel
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "duty is rounded and clamped into 0..=max_duty first"
    )]
    fn duty_for(&self, pulse_us: f32) -> u16 {
        let period_us = 1_000_000.0 / self.frequency;
        let max_duty = f32::from(self.channel.max_duty_cycle());
        let duty = (pulse_us / period_us * max_duty + 0.5).clamp(0.0, max_duty);
        duty as u16
    }

    fn write(&mut self) -> Result<()> {
        let duty = if self.enabled {
            self.duty_for(self.pulse_us)
        } else {
            0
        };
        self.channel.set_duty_cycle(duty).map_err(|_| Error::Pwm)
    }
}

impl<C: SetDutyCycle> PwmDriver for HalPwm<C> {
    fn set_pulse(&mut self, _channel: u8, pulse_us: f32) -> Result<()> {
        let previous = self.pulse_us;
        self.pulse_us = pulse_us;
        self.write().inspect_err(|_| self.pulse_us = previous)
    }

    // Only the rate the timer was configured with is reachable.
    #[expect(
        clippy::float_cmp,
        reason = "the configured rate is matched exactly, never computed"
    )]
    fn set_frequency(&mut self, frequency: f32) -> bool {
        frequency == self.frequency
    }

    fn enable(&mut self, _channel: u8) -> Result<()> {
        let previous = self.enabled;
        self.enabled = true;
        self.write().inspect_err(|_| self.enabled = previous)
    }

    fn disable(&mut self, _channel: u8) -> Result<()> {
        self.channel
            .set_duty_cycle_fully_off()
            .map_err(|_| Error::Pwm)?;
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self, _channel: u8) -> bool {
        self.enabled
    }
}
