//! Calibrated servo control for Pico 1 and 2.
//!
//! - [`calibration`] maps between pulse widths and logical values (degrees, fractions, speeds).
//! - [`servo`] drives one servo on one PWM output.
//! - [`servo_cluster`] drives many servos whose outputs must change together.
//! - [`pwm`] defines the PWM backends those program.
//!
//! # Glossary
//!
//! - **Pulse:** PWM high time in microseconds; it sets a servo's position or speed.
//! - **Value:** The logical unit a calibration maps to and from a pulse.
//! - **Clamp:** Restrict a conversion to the calibration table instead of extrapolating.
//! - **PWM ([Pulse Width Modulation](https://en.wikipedia.org/wiki/Pulse-width_modulation)) Slices:** Both Pico 1 and 2 have 8 slices (& 16 channels); Pico 2 B has 12. These "slices"
//!   are unrelated to Rust slices.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

// Compile-time checks: exactly one architecture must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "arm", feature = "riscv")), not(feature = "host")))]
compile_error!("Must enable exactly one architecture feature: 'arm' or 'riscv'");

#[cfg(all(feature = "arm", feature = "riscv"))]
compile_error!("Cannot enable both 'arm' and 'riscv' features simultaneously");

// Compile-time check: pico1 only supports ARM
#[cfg(all(feature = "pico1", feature = "riscv"))]
compile_error!("Pico 1 (RP2040) only supports ARM architecture, not RISC-V");

// Host builds link no defmt global logger, so logging compiles away there.
macro_rules! device_log {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(not(feature = "host"))]
        defmt::$level!($($arg)*);
    };
}

pub mod calibration;
mod error;
pub mod pwm;
pub mod servo;
pub mod servo_cluster;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
