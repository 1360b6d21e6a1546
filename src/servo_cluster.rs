//! A device abstraction for many calibrated servos on one multi-channel PWM engine.
//!
//! A [`ServoCluster`] keeps a shadow copy of every channel (enable flag, position,
//! calibration) and pushes all channels to its [`ClusterPwm`] backend as one
//! [`PulseFrame`]. The hardware therefore never sees some channels of an update
//! without the others, which separate [`Servo`](crate::servo::Servo)s cannot promise.
//!
//! Single-channel calls load a frame immediately. Use [`ServoCluster::batch`] to
//! stage several channel changes and load them together.
//!
//! # Example
//!
//! ```rust
//! use servo_kit::{
//!     calibration::CalibrationType,
//!     servo_cluster::{FrameSlot, ServoCluster},
//! };
//!
//! # fn main() -> servo_kit::Result<()> {
//! static SLOT: FrameSlot = FrameSlot::new(0b1111_1100);
//!
//! let mut cluster = ServoCluster::new(&SLOT, CalibrationType::Angular);
//! cluster.init()?;
//!
//! // Three channels, one frame.
//! cluster.batch(|frame| {
//!     frame.set_value(2, -90.0)?;
//!     frame.to_mid(3)?;
//!     frame.set_pulse(4, 2000.0)
//! })?;
//!
//! assert_eq!(SLOT.latest().1.pulse(3), 1500.0);
//! # Ok(())
//! # }
//! ```

use core::array;

use crate::calibration::{Calibration, CalibrationType};
use crate::pwm::{ClusterPwm, DEFAULT_FREQUENCY, is_valid_frequency};
use crate::servo::servo_state::ServoState;
use crate::{Error, Result};

mod pulse_frame;

pub use pulse_frame::{ALL_CHANNELS_MASK, FrameSlot, MAX_CHANNELS, PulseFrame};

/// Servos sharing one [`ClusterPwm`] backend, updated frame by frame.
///
/// Channels are addressed by index `0..MAX_CHANNELS`, which is also the pin
/// number. Only pins in [`pin_mask`](Self::pin_mask) reach the hardware; other
/// channels keep their state but always load as off.
///
/// See the [module-level documentation](mod@crate::servo_cluster) for usage.
pub struct ServoCluster<C> {
    driver: C,
    pin_mask: u32,
    frequency: f32,
    channels: [ServoState; MAX_CHANNELS],
}

impl<C: ClusterPwm> ServoCluster<C> {
    /// Create a cluster on `driver`, every channel with the preset calibration for `kind`.
    ///
    /// Nothing is written to the hardware until [`init`](Self::init).
    pub fn new(driver: C, kind: CalibrationType) -> Self {
        let pin_mask = driver.pin_mask() & ALL_CHANNELS_MASK;
        Self {
            driver,
            pin_mask,
            frequency: DEFAULT_FREQUENCY,
            channels: array::from_fn(|_| ServoState::new(kind)),
        }
    }

    /// Configure the backend at the default frequency and load an all-off frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the backend cannot run at the
    /// default frequency, or [`Error::Pwm`] if it rejects the frame.
    pub fn init(&mut self) -> Result<()> {
        if !self.driver.set_frequency(DEFAULT_FREQUENCY) {
            return Err(Error::InvalidArgument(
                "PWM backend cannot produce the default frequency",
            ));
        }
        self.frequency = DEFAULT_FREQUENCY;
        for channel in &mut self.channels {
            channel.disable();
        }
        device_log!(info, "ServoCluster init pin_mask={=u32:#x}", self.pin_mask);
        self.load()
    }

    /// Pins this cluster drives (bit `n` is pin `n`). Fixed at construction.
    #[must_use]
    pub const fn pin_mask(&self) -> u32 {
        self.pin_mask
    }

    /// Channels present in [`pin_mask`](Self::pin_mask), ascending.
    pub fn pins(&self) -> impl Iterator<Item = usize> + use<C> {
        let pin_mask = self.pin_mask;
        (0..MAX_CHANNELS).filter(move |&pin| mask_has_pin(pin_mask, pin))
    }

    /// The PWM backend.
    #[must_use]
    pub const fn driver(&self) -> &C {
        &self.driver
    }

    /// The frame the hardware should currently be showing.
    #[must_use]
    pub fn frame(&self) -> PulseFrame {
        let mut frame = PulseFrame::new();
        for pin in self.pins() {
            if let Some(channel) = self.channels.get(pin) {
                frame.set(pin, channel.output_pulse());
            }
        }
        frame
    }

    /// Push every channel to the backend as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the frame. The shadow state
    /// is kept, so a later load retries it.
    pub fn load(&mut self) -> Result<()> {
        let frame = self.frame();
        device_log!(debug, "ServoCluster load");
        self.driver.load(&frame)
    }

    /// Stage any number of channel changes through `f`, then load them as one frame.
    ///
    /// Each staged call validates before it mutates. If `f` fails part way, the
    /// calls that already succeeded are still loaded and the error is returned.
    /// Nothing is loaded when no call succeeded, so a rejected channel index
    /// never reaches the hardware.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f`, otherwise [`Error::Pwm`] from the load.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut ClusterFrame<'_>) -> Result<R>) -> Result<R> {
        let mut frame = ClusterFrame {
            channels: &mut self.channels,
            staged: false,
        };
        let result = f(&mut frame);
        let loaded = if frame.staged { self.load() } else { Ok(()) };
        let value = result?;
        loaded?;
        Ok(value)
    }

    /// Start emitting pulses on channel `servo`, resuming its last position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel,
    /// [`Error::InvalidCalibration`] if a never-positioned channel cannot
    /// resolve its mid value, or [`Error::Pwm`].
    pub fn enable(&mut self, servo: usize) -> Result<()> {
        self.batch(|frame| frame.enable(servo))
    }

    /// Stop emitting pulses on channel `servo`, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel, or [`Error::Pwm`].
    pub fn disable(&mut self, servo: usize) -> Result<()> {
        self.batch(|frame| frame.disable(servo))
    }

    /// Whether channel `servo` is emitting pulses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn is_enabled(&self, servo: usize) -> Result<bool> {
        Ok(channel(&self.channels, servo)?.is_enabled())
    }

    /// Last commanded value of channel `servo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn value(&self, servo: usize) -> Result<f32> {
        Ok(channel(&self.channels, servo)?.value())
    }

    /// Move channel `servo` to logical `value`, enabling it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`], [`Error::InvalidCalibration`] (channel
    /// unchanged), or [`Error::Pwm`].
    pub fn set_value(&mut self, servo: usize, value: f32) -> Result<()> {
        self.batch(|frame| frame.set_value(servo, value))
    }

    /// Last commanded pulse width (µs) of channel `servo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn pulse(&self, servo: usize) -> Result<f32> {
        Ok(channel(&self.channels, servo)?.pulse())
    }

    /// Emit `pulse` microseconds on channel `servo`, enabling it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel, or [`Error::Pwm`].
    pub fn set_pulse(&mut self, servo: usize, pulse: f32) -> Result<()> {
        self.batch(|frame| frame.set_pulse(servo, pulse))
    }

    /// PWM frame rate (Hz) shared by every channel.
    #[must_use]
    pub const fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Change the frame rate of every channel, keeping their pulse widths.
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
        device_log!(info, "ServoCluster frequency {}Hz", frequency);
        self.load()
    }

    /// Value of channel `servo`'s first calibration point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn min_value(&self, servo: usize) -> Result<f32> {
        Ok(channel(&self.channels, servo)?.min_value())
    }

    /// Middle calibration value of channel `servo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn mid_value(&self, servo: usize) -> Result<f32> {
        Ok(channel(&self.channels, servo)?.mid_value())
    }

    /// Value of channel `servo`'s last calibration point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn max_value(&self, servo: usize) -> Result<f32> {
        Ok(channel(&self.channels, servo)?.max_value())
    }

    /// Move channel `servo` to its min value.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_min(&mut self, servo: usize) -> Result<()> {
        self.batch(|frame| frame.to_min(servo))
    }

    /// Move channel `servo` to its mid value.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_mid(&mut self, servo: usize) -> Result<()> {
        self.batch(|frame| frame.to_mid(servo))
    }

    /// Move channel `servo` to its max value.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_max(&mut self, servo: usize) -> Result<()> {
        self.batch(|frame| frame.to_max(servo))
    }

    /// Move channel `servo` to fraction `input` (0 to 1) of the way from min to max value.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn to_percent(&mut self, servo: usize, input: f32) -> Result<()> {
        self.batch(|frame| frame.to_percent(servo, input))
    }

    /// Move channel `servo` to where `input` falls within `[in_min, in_max]`,
    /// mapped onto its min to max value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `in_min == in_max`, otherwise see
    /// [`set_value`](Self::set_value).
    pub fn to_percent_between(
        &mut self,
        servo: usize,
        input: f32,
        in_min: f32,
        in_max: f32,
    ) -> Result<()> {
        self.batch(|frame| frame.to_percent_between(servo, input, in_min, in_max))
    }

    /// Move channel `servo` to where `input` falls within `[in_min, in_max]`,
    /// mapped onto `[value_min, value_max]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `in_min == in_max`, otherwise see
    /// [`set_value`](Self::set_value).
    pub fn to_percent_mapped(
        &mut self,
        servo: usize,
        input: f32,
        in_min: f32,
        in_max: f32,
        value_min: f32,
        value_max: f32,
    ) -> Result<()> {
        self.batch(|frame| {
            frame.to_percent_mapped(servo, input, in_min, in_max, value_min, value_max)
        })
    }

    /// Enable every channel in the pin mask, in one frame.
    ///
    /// # Errors
    ///
    /// See [`enable`](Self::enable).
    pub fn enable_all(&mut self) -> Result<()> {
        let pins = self.pins();
        self.batch(|frame| pins.map(|pin| frame.enable(pin)).collect())
    }

    /// Disable every channel in the pin mask, in one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pwm`] if the backend rejects the frame.
    pub fn disable_all(&mut self) -> Result<()> {
        let pins = self.pins();
        self.batch(|frame| pins.map(|pin| frame.disable(pin)).collect())
    }

    /// Move every channel in the pin mask to `value`, in one frame.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn set_all_values(&mut self, value: f32) -> Result<()> {
        let pins = self.pins();
        self.batch(|frame| pins.map(|pin| frame.set_value(pin, value)).collect())
    }

    /// Emit `pulse` microseconds on every channel in the pin mask, in one frame.
    ///
    /// # Errors
    ///
    /// See [`set_pulse`](Self::set_pulse).
    pub fn set_all_pulses(&mut self, pulse: f32) -> Result<()> {
        let pins = self.pins();
        self.batch(|frame| pins.map(|pin| frame.set_pulse(pin, pulse)).collect())
    }

    /// Read-only view of channel `servo`'s calibration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn calibration(&self, servo: usize) -> Result<&Calibration> {
        Ok(channel(&self.channels, servo)?.calibration())
    }

    /// Mutable view of channel `servo`'s calibration.
    ///
    /// Edits apply from the next value written to that channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for an invalid channel.
    pub fn calibration_mut(&mut self, servo: usize) -> Result<&mut Calibration> {
        Ok(channel_mut(&mut self.channels, servo)?.calibration_mut())
    }
}

/// Staged channel changes inside [`ServoCluster::batch`].
///
/// Methods mirror the cluster's single-channel methods, but nothing reaches the
/// hardware until the batch ends.
pub struct ClusterFrame<'a> {
    channels: &'a mut [ServoState; MAX_CHANNELS],
    staged: bool,
}

impl ClusterFrame<'_> {
    /// Stage enabling channel `servo`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::enable`].
    pub fn enable(&mut self, servo: usize) -> Result<()> {
        self.stage(servo, ServoState::enable)
    }

    /// Stage disabling channel `servo`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::disable`].
    pub fn disable(&mut self, servo: usize) -> Result<()> {
        self.stage(servo, |channel| {
            channel.disable();
            Ok(())
        })
    }

    /// Stage moving channel `servo` to `value`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_value`].
    pub fn set_value(&mut self, servo: usize, value: f32) -> Result<()> {
        self.stage(servo, |channel| channel.set_value(value))
    }

    /// Stage emitting `pulse` microseconds on channel `servo`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_pulse`].
    pub fn set_pulse(&mut self, servo: usize, pulse: f32) -> Result<()> {
        self.stage(servo, |channel| Ok(channel.set_pulse(pulse)))
    }

    /// Stage moving channel `servo` to its min value.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_value`].
    pub fn to_min(&mut self, servo: usize) -> Result<()> {
        self.stage(servo, |channel| channel.set_value(channel.min_value()))
    }

    /// Stage moving channel `servo` to its mid value.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_value`].
    pub fn to_mid(&mut self, servo: usize) -> Result<()> {
        self.stage(servo, |channel| channel.set_value(channel.mid_value()))
    }

    /// Stage moving channel `servo` to its max value.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_value`].
    pub fn to_max(&mut self, servo: usize) -> Result<()> {
        self.stage(servo, |channel| channel.set_value(channel.max_value()))
    }

    /// Stage moving channel `servo` to fraction `input` (0 to 1) of its range.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::set_value`].
    pub fn to_percent(&mut self, servo: usize, input: f32) -> Result<()> {
        self.to_percent_between(servo, input, 0.0, 1.0)
    }

    /// Stage moving channel `servo` to where `input` falls within `[in_min, in_max]`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::to_percent_between`].
    pub fn to_percent_between(
        &mut self,
        servo: usize,
        input: f32,
        in_min: f32,
        in_max: f32,
    ) -> Result<()> {
        self.stage(servo, |channel| {
            let (value_min, value_max) = (channel.min_value(), channel.max_value());
            channel.to_percent(input, in_min, in_max, value_min, value_max)
        })
    }

    /// Stage moving channel `servo` to `input` mapped from `[in_min, in_max]` onto `[value_min, value_max]`.
    ///
    /// # Errors
    ///
    /// See [`ServoCluster::to_percent_mapped`].
    pub fn to_percent_mapped(
        &mut self,
        servo: usize,
        input: f32,
        in_min: f32,
        in_max: f32,
        value_min: f32,
        value_max: f32,
    ) -> Result<()> {
        self.stage(servo, |channel| {
            channel.to_percent(input, in_min, in_max, value_min, value_max)
        })
    }

    // `op` validates before it mutates, so an error leaves nothing to load.
    fn stage<T>(
        &mut self,
        servo: usize,
        op: impl FnOnce(&mut ServoState) -> Result<T>,
    ) -> Result<()> {
        op(channel_mut(self.channels, servo)?)?;
        self.staged = true;
        Ok(())
    }
}

fn channel(channels: &[ServoState; MAX_CHANNELS], servo: usize) -> Result<&ServoState> {
    channels.get(servo).ok_or(Error::OutOfRange {
        index: servo,
        len: MAX_CHANNELS,
    })
}

fn channel_mut(channels: &mut [ServoState; MAX_CHANNELS], servo: usize) -> Result<&mut ServoState> {
    channels.get_mut(servo).ok_or(Error::OutOfRange {
        index: servo,
        len: MAX_CHANNELS,
    })
}

fn mask_has_pin(mask: u32, pin: usize) -> bool {
    u32::try_from(pin)
        .ok()
        .and_then(|shift| mask.checked_shr(shift))
        .is_some_and(|bits| bits & 1 == 1)
}
