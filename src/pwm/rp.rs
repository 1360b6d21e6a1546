//! RP2040/RP235x PWM slice backends.
//!
//! - [`RpServoPwm`] drives one servo from one PWM slice.
//! - [`RpSliceCluster`] drives up to one servo per slice, with every slice counter phase-aligned.
//!
//! A slice's divider and `top` are chosen per frequency so one frame fits the
//! 16-bit counter with the finest tick available. Disabling a channel holds its
//! compare at zero (output low) while the slice keeps counting, so re-enabling
//! resumes in phase.

use defmt::info;
use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::pwm::{Config, Pwm, PwmBatch};
use heapless::Vec;

use crate::calibration::CalibrationType;
use crate::pwm::{ClusterPwm, DEFAULT_FREQUENCY, PwmDriver};
use crate::servo::Servo;
use crate::servo_cluster::{MAX_CHANNELS, PulseFrame};
use crate::{Error, Result};

/// Number of PWM slices on the selected chip.
#[cfg(feature = "pico2")]
pub const PWM_SLICES: usize = 12;

/// Number of PWM slices on the selected chip.
#[cfg(not(feature = "pico2"))]
pub const PWM_SLICES: usize = 8;

#[derive(Debug, Clone, Copy, defmt::Format)]
enum Output {
    A,
    B,
}

#[derive(Debug, Clone, Copy, defmt::Format)]
struct SliceTiming {
    divider: u8,
    top: u16,
    ticks_per_us: f32,
}

impl SliceTiming {
    // Smallest integer divider whose frame fits in the 16-bit counter.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "clk_sys fits f32 to 1 Hz at RP clock rates; tick counts are positive and range-checked below"
    )]
    fn for_frequency(frequency: f32) -> Option<Self> {
        let clk = clk_sys_freq() as f32;
        let ticks_per_frame = clk / frequency;
        let divider = ((ticks_per_frame / 65_536.0) as u32).saturating_add(1);
        let divider = u8::try_from(divider).ok()?;
        let top = (ticks_per_frame / f32::from(divider)) as u32;
        let top = u16::try_from(top.checked_sub(1)?).ok()?;
        let timing = Self {
            divider,
            top,
            ticks_per_us: clk / f32::from(divider) / 1_000_000.0,
        };
        info!(
            "servo pwm clk={}Hz freq={}Hz div={} top={}",
            clk, frequency, timing.divider, timing.top
        );
        Some(timing)
    }

    fn apply(self, cfg: &mut Config) {
        cfg.divider = self.divider.into();
        cfg.top = self.top;
        cfg.phase_correct = false; // edge-aligned
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "ticks are rounded and clamped into 0..=top first"
    )]
    fn compare(self, pulse_us: f32) -> u16 {
        let ticks = (pulse_us * self.ticks_per_us + 0.5).clamp(0.0, f32::from(self.top));
        ticks as u16
    }
}

fn set_compare(cfg: &mut Config, output: Output, compare: u16) {
    match output {
        Output::A => cfg.compare_a = compare,
        Output::B => cfg.compare_b = compare,
    }
}

/// One servo on one PWM slice output.
///
/// Usually built through the [`servo!`](macro@crate::servo) macro.
pub struct RpServoPwm<'d> {
    pwm: Pwm<'d>,
    cfg: Config, // Keep the config so compare writes never reset the divider
    output: Output,
    timing: Option<SliceTiming>,
    pulse_us: f32,
    enabled: bool,
}

impl<'d> RpServoPwm<'d> {
    /// Drive the servo from the slice's A output.
    #[must_use]
    pub fn new_output_a(pwm: Pwm<'d>) -> Self {
        Self::new(pwm, Output::A)
    }

    /// Drive the servo from the slice's B output.
    #[must_use]
    pub fn new_output_b(pwm: Pwm<'d>) -> Self {
        Self::new(pwm, Output::B)
    }

    fn new(pwm: Pwm<'d>, output: Output) -> Self {
        Self {
            pwm,
            cfg: Config::default(),
            output,
            timing: None,
            pulse_us: 0.0,
            enabled: false,
        }
    }

    fn write(&mut self) {
        let Some(timing) = self.timing else {
            return;
        };
        let compare = if self.enabled {
            timing.compare(self.pulse_us)
        } else {
            0
        };
        set_compare(&mut self.cfg, self.output, compare);
        self.cfg.enable = true;
        self.pwm.set_config(&self.cfg);
    }
}

impl PwmDriver for RpServoPwm<'_> {
    fn set_pulse(&mut self, _channel: u8, pulse_us: f32) -> Result<()> {
        self.pulse_us = pulse_us;
        self.write();
        Ok(())
    }

    fn set_frequency(&mut self, frequency: f32) -> bool {
        let Some(timing) = SliceTiming::for_frequency(frequency) else {
            return false;
        };
        timing.apply(&mut self.cfg);
        self.timing = Some(timing);
        self.write();
        true
    }

    fn enable(&mut self, _channel: u8) -> Result<()> {
        self.enabled = true;
        self.write();
        Ok(())
    }

    fn disable(&mut self, _channel: u8) -> Result<()> {
        self.enabled = false;
        self.write();
        Ok(())
    }

    fn is_enabled(&self, _channel: u8) -> bool {
        self.enabled
    }
}

struct ClusterSlice<'d> {
    pwm: Pwm<'d>,
    cfg: Config,
    output: Output,
    pin: u8,
}

/// Up to one servo per PWM slice, all reprogrammed inside one critical section.
///
/// Every slice runs the same divider and `top`. Whenever the timing changes or
/// a slice joins, all counters are stopped, zeroed, and restarted in the same
/// register write, so the slices wrap together. Each slice latches a new
/// compare value at its next wrap, so a loaded frame lands on one shared wrap
/// unless the writes straddle it.
///
/// ```rust,no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// use servo_kit::{
///     Result, calibration::CalibrationType, pwm::rp::RpSliceCluster, servo_cluster::ServoCluster,
/// };
///
/// fn example(p: embassy_rp::Peripherals) -> Result<()> {
///     let mut pwm = RpSliceCluster::new();
///     pwm.add(p.PIN_0, p.PWM_SLICE0)?;
///     pwm.add(p.PIN_2, p.PWM_SLICE1)?;
///     pwm.add(p.PIN_4, p.PWM_SLICE2)?;
///
///     let mut cluster = ServoCluster::new(pwm, CalibrationType::Angular);
///     cluster.init()?;
///     cluster.set_all_values(0.0)?;
///
///     // Retiming restarts every slice counter together.
///     cluster.set_frequency(100.0)?;
///     Ok(())
/// }
/// ```
pub struct RpSliceCluster<'d> {
    slices: Vec<ClusterSlice<'d>, PWM_SLICES>,
    timing: Option<SliceTiming>,
    frame: PulseFrame,
    pin_mask: u32,
}

impl Default for RpSliceCluster<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> RpSliceCluster<'d> {
    /// An empty cluster backend. Add every pin before building the [`ServoCluster`](crate::servo_cluster::ServoCluster).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slices: Vec::new(),
            timing: None,
            frame: PulseFrame::new(),
            pin_mask: 0,
        }
    }

    /// Drive `pin` from `slice`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the pin is beyond the cluster's
    /// channel range or every slice is already in use.
    pub fn add<P, S>(
        &mut self,
        pin: embassy_rp::Peri<'d, P>,
        slice: embassy_rp::Peri<'d, S>,
    ) -> Result<()>
    where
        P: ServoPwmPin<S>,
        S: embassy_rp::PeripheralType,
    {
        if usize::from(P::PIN) >= MAX_CHANNELS {
            return Err(Error::InvalidArgument(
                "pin out of range. Expected 0 to 29",
            ));
        }
        let output = if P::IS_CHANNEL_A { Output::A } else { Output::B };
        let mut cfg = Config::default();
        if let Some(timing) = self.timing {
            timing.apply(&mut cfg);
        }
        let slice = ClusterSlice {
            pwm: P::new_pwm(slice, pin),
            cfg,
            output,
            pin: P::PIN,
        };
        self.slices
            .push(slice)
            .map_err(|_| Error::InvalidArgument("every PWM slice is already in use"))?;
        self.pin_mask |= 1_u32.wrapping_shl(u32::from(P::PIN));
        if self.timing.is_some() {
            self.write_all();
            self.align();
        }
        Ok(())
    }

    // Stop every slice, zero its counter, then restart them all in one write.
    fn align(&mut self) {
        critical_section::with(|_| {
            for slice in &mut self.slices {
                slice.cfg.enable = false;
                slice.pwm.set_config(&slice.cfg);
                slice.pwm.set_counter(0);
                slice.cfg.enable = true;
            }
            PwmBatch::set_enabled(true, |batch| {
                for slice in &self.slices {
                    batch.enable(&slice.pwm);
                }
            });
        });
    }

    fn write_all(&mut self) {
        let Some(timing) = self.timing else {
            return;
        };
        let frame = self.frame;
        critical_section::with(|_| {
            for slice in &mut self.slices {
                let compare = timing.compare(frame.pulse(usize::from(slice.pin)));
                set_compare(&mut slice.cfg, slice.output, compare);
                slice.cfg.enable = true;
                slice.pwm.set_config(&slice.cfg);
            }
        });
    }
}

impl ClusterPwm for RpSliceCluster<'_> {
    fn pin_mask(&self) -> u32 {
        self.pin_mask
    }

    fn set_frequency(&mut self, frequency: f32) -> bool {
        let Some(timing) = SliceTiming::for_frequency(frequency) else {
            return false;
        };
        for slice in &mut self.slices {
            timing.apply(&mut slice.cfg);
        }
        self.timing = Some(timing);
        self.write_all();
        self.align();
        true
    }

    fn load(&mut self, frame: &PulseFrame) -> Result<()> {
        if self.timing.is_none() && !self.set_frequency(DEFAULT_FREQUENCY) {
            return Err(Error::Pwm);
        }
        self.frame = *frame;
        self.write_all();
        Ok(())
    }
}

// Public for macro expansion in downstream crates.
#[doc(hidden)]
pub trait ServoPwmPin<S: embassy_rp::PeripheralType>: embassy_rp::PeripheralType {
    const PIN: u8;
    const IS_CHANNEL_A: bool;
    fn new_pwm<'d>(slice: embassy_rp::Peri<'d, S>, pin: embassy_rp::Peri<'d, Self>) -> Pwm<'d>;
}

// Public for macro expansion in downstream crates.
#[doc(hidden)]
pub fn servo_from_pin_slice<'d, P, S>(
    pin: embassy_rp::Peri<'d, P>,
    slice: embassy_rp::Peri<'d, S>,
    kind: CalibrationType,
) -> Result<Servo<RpServoPwm<'d>>>
where
    P: ServoPwmPin<S>,
    S: embassy_rp::PeripheralType,
{
    let pwm = P::new_pwm(slice, pin);
    let driver = if P::IS_CHANNEL_A {
        RpServoPwm::new_output_a(pwm)
    } else {
        RpServoPwm::new_output_b(pwm)
    };
    let mut servo = Servo::new(driver, P::PIN, kind);
    servo.init()?;
    Ok(servo)
}

// Even pins are output A of their slice, odd pins output B.
macro_rules! servo_pin_map {
    (@impl $pin:ident = $number:literal, $slice:ident, $is_a:literal, $ctor:ident) => {
        impl ServoPwmPin<embassy_rp::peripherals::$slice> for embassy_rp::peripherals::$pin {
            const PIN: u8 = $number;
            const IS_CHANNEL_A: bool = $is_a;
            fn new_pwm<'d>(
                slice: embassy_rp::Peri<'d, embassy_rp::peripherals::$slice>,
                pin: embassy_rp::Peri<'d, Self>,
            ) -> Pwm<'d> {
                Pwm::$ctor(slice, pin, Config::default())
            }
        }
    };
    ($($slice:ident: $(($a:ident = $a_number:literal, $b:ident = $b_number:literal)),+;)*) => {
        $($(
            servo_pin_map!(@impl $a = $a_number, $slice, true, new_output_a);
            servo_pin_map!(@impl $b = $b_number, $slice, false, new_output_b);
        )+)*
    };
}

servo_pin_map! {
    PWM_SLICE0: (PIN_0 = 0, PIN_1 = 1), (PIN_16 = 16, PIN_17 = 17);
    PWM_SLICE1: (PIN_2 = 2, PIN_3 = 3), (PIN_18 = 18, PIN_19 = 19);
    PWM_SLICE2: (PIN_4 = 4, PIN_5 = 5), (PIN_20 = 20, PIN_21 = 21);
    PWM_SLICE3: (PIN_6 = 6, PIN_7 = 7), (PIN_22 = 22, PIN_23 = 23);
    PWM_SLICE4: (PIN_8 = 8, PIN_9 = 9), (PIN_24 = 24, PIN_25 = 25);
    PWM_SLICE5: (PIN_10 = 10, PIN_11 = 11), (PIN_26 = 26, PIN_27 = 27);
    PWM_SLICE6: (PIN_12 = 12, PIN_13 = 13), (PIN_28 = 28, PIN_29 = 29);
    PWM_SLICE7: (PIN_14 = 14, PIN_15 = 15);
}

// RP235xB only. Pins 30 and up drive single servos; clusters stop at pin 29.
#[cfg(feature = "pico2")]
servo_pin_map! {
    PWM_SLICE7: (PIN_30 = 30, PIN_31 = 31);
    PWM_SLICE8: (PIN_32 = 32, PIN_33 = 33), (PIN_40 = 40, PIN_41 = 41);
    PWM_SLICE9: (PIN_34 = 34, PIN_35 = 35), (PIN_42 = 42, PIN_43 = 43);
    PWM_SLICE10: (PIN_36 = 36, PIN_37 = 37), (PIN_44 = 44, PIN_45 = 45);
    PWM_SLICE11: (PIN_38 = 38, PIN_39 = 39), (PIN_46 = 46, PIN_47 = 47);
}
