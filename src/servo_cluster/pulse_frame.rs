//! Whole-cluster pulse frames and a tear-free mailbox to hand them to hardware.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU32, Ordering};

use crate::Result;
use crate::pwm::ClusterPwm;

/// Number of channels a cluster can address (RP2040 bank-0 GPIOs).
pub const MAX_CHANNELS: usize = 30;

/// Pin mask with every addressable channel set.
pub const ALL_CHANNELS_MASK: u32 = 0x3FFF_FFFF;

/// One pulse width (µs) per channel; zero means the channel is off.
///
/// A frame is always produced and consumed whole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFrame {
    pulses: [f32; MAX_CHANNELS],
}

impl Default for PulseFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseFrame {
    /// A frame with every channel off.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pulses: [0.0; MAX_CHANNELS],
        }
    }

    /// Pulse width (µs) for `channel`, zero if off or out of range.
    #[must_use]
    pub fn pulse(&self, channel: usize) -> f32 {
        self.pulses.get(channel).copied().unwrap_or(0.0)
    }

    /// Whether `channel` emits pulses in this frame.
    #[must_use]
    pub fn is_on(&self, channel: usize) -> bool {
        self.pulse(channel) > 0.0
    }

    /// Every channel's pulse width (µs), indexed by channel.
    #[must_use]
    pub const fn pulses(&self) -> &[f32; MAX_CHANNELS] {
        &self.pulses
    }

    pub(crate) fn set(&mut self, channel: usize, pulse: f32) {
        if let Some(slot) = self.pulses.get_mut(channel) {
            *slot = pulse;
        }
    }
}

/// Latest-frame mailbox between a cluster and an asynchronous consumer.
///
/// The cluster side ([`ClusterPwm`] on `&FrameSlot`) stores complete frames; an
/// interrupt handler or DMA refill reads them with [`latest`](Self::latest).
/// Both sides go through a critical section, so the consumer never sees a mix
/// of two frames. The generation counter increases on every store.
///
/// ```rust
/// use servo_kit::{
///     calibration::CalibrationType,
///     servo_cluster::{FrameSlot, ServoCluster},
/// };
///
/// # fn main() -> servo_kit::Result<()> {
/// static SLOT: FrameSlot = FrameSlot::new(0b1111);
///
/// let mut cluster = ServoCluster::new(&SLOT, CalibrationType::Angular);
/// cluster.init()?;
/// cluster.set_value(2, 90.0)?;
///
/// let (generation, frame) = SLOT.latest();
/// assert!(generation > 0);
/// assert_eq!(frame.pulse(2), 2500.0);
/// # Ok(())
/// # }
/// ```
pub struct FrameSlot {
    frame: Mutex<CriticalSectionRawMutex, Cell<PulseFrame>>,
    frequency: Mutex<CriticalSectionRawMutex, Cell<f32>>,
    generation: AtomicU32,
    pin_mask: u32,
}

impl FrameSlot {
    /// Create an empty slot for a consumer driving the pins in `pin_mask`.
    #[must_use]
    pub const fn new(pin_mask: u32) -> Self {
        Self {
            frame: Mutex::new(Cell::new(PulseFrame::new())),
            frequency: Mutex::new(Cell::new(crate::pwm::DEFAULT_FREQUENCY)),
            generation: AtomicU32::new(0),
            pin_mask: pin_mask & ALL_CHANNELS_MASK,
        }
    }

    /// The most recent complete frame and its generation (0 before the first store).
    pub fn latest(&self) -> (u32, PulseFrame) {
        self.frame.lock(|frame| {
            (self.generation.load(Ordering::Acquire), frame.get())
        })
    }

    /// Frame rate (Hz) the consumer should run at.
    pub fn frequency(&self) -> f32 {
        self.frequency.lock(Cell::get)
    }
}

impl ClusterPwm for &FrameSlot {
    fn pin_mask(&self) -> u32 {
        self.pin_mask
    }

    fn set_frequency(&mut self, frequency: f32) -> bool {
        self.frequency.lock(|cell| cell.set(frequency));
        true
    }

    fn load(&mut self, frame: &PulseFrame) -> Result<()> {
        self.frame.lock(|cell| {
            cell.set(*frame);
            self.generation.fetch_add(1, Ordering::Release);
        });
        Ok(())
    }
}
