#![allow(missing_docs)]
//! Host-level tests for frame-at-a-time servo cluster control.

use core::cell::RefCell;
use std::rc::Rc;

use servo_kit::calibration::CalibrationType;
use servo_kit::pwm::ClusterPwm;
use servo_kit::servo_cluster::{
    ALL_CHANNELS_MASK, FrameSlot, MAX_CHANNELS, PulseFrame, ServoCluster,
};
use servo_kit::{Error, Result};

#[derive(Debug, Default)]
struct Loaded {
    frames: Vec<PulseFrame>,
    frequency: f32,
    reject_frequency: bool,
    reject_load: bool,
}

#[derive(Clone)]
struct MockCluster {
    pin_mask: u32,
    loaded: Rc<RefCell<Loaded>>,
}

impl MockCluster {
    fn new(pin_mask: u32) -> Self {
        Self {
            pin_mask,
            loaded: Rc::default(),
        }
    }

    fn loads(&self) -> usize {
        self.loaded.borrow().frames.len()
    }

    fn last(&self) -> PulseFrame {
        self.loaded
            .borrow()
            .frames
            .last()
            .copied()
            .unwrap_or_default()
    }
}

impl ClusterPwm for MockCluster {
    fn pin_mask(&self) -> u32 {
        self.pin_mask
    }

    fn set_frequency(&mut self, frequency: f32) -> bool {
        let mut loaded = self.loaded.borrow_mut();
        if loaded.reject_frequency {
            return false;
        }
        loaded.frequency = frequency;
        true
    }

    fn load(&mut self, frame: &PulseFrame) -> Result<()> {
        let mut loaded = self.loaded.borrow_mut();
        if loaded.reject_load {
            return Err(Error::Pwm);
        }
        loaded.frames.push(*frame);
        Ok(())
    }
}

fn cluster(pin_mask: u32) -> (ServoCluster<MockCluster>, MockCluster) {
    let pwm = MockCluster::new(pin_mask);
    let mut cluster = ServoCluster::new(pwm.clone(), CalibrationType::Angular);
    cluster.init().expect("cluster call must succeed");
    (cluster, pwm)
}

#[test]
fn init_loads_an_all_off_frame() {
    let (cluster, pwm) = cluster(0xFF);
    assert_eq!(pwm.loads(), 1);
    assert_eq!(pwm.last(), PulseFrame::new());
    assert_eq!(cluster.frequency(), 50.0);
    assert_eq!(pwm.loaded.borrow().frequency, 50.0);
}

#[test]
fn channels_are_independent() {
    let (mut cluster, pwm) = cluster(0xFF);
    cluster.enable(5).expect("cluster call must succeed");
    assert!(cluster.is_enabled(5).expect("cluster call must succeed"));
    assert!(!cluster.is_enabled(6).expect("cluster call must succeed"));
    assert_eq!(cluster.value(5), Ok(0.0));
    assert_eq!(pwm.last().pulse(5), 1500.0);
    assert!(!pwm.last().is_on(6));

    cluster.set_value(6, 90.0).expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(5), 1500.0);
    assert_eq!(pwm.last().pulse(6), 2500.0);
}

#[test]
fn pin_mask_is_fixed_at_construction() {
    let (mut cluster, _pwm) = cluster(0xFFFF_FFFF);
    assert_eq!(cluster.pin_mask(), ALL_CHANNELS_MASK);
    cluster.set_all_values(45.0).expect("cluster call must succeed");
    cluster.set_frequency(100.0).expect("cluster call must succeed");
    cluster.disable_all().expect("cluster call must succeed");
    assert_eq!(cluster.pin_mask(), ALL_CHANNELS_MASK);
    assert_eq!(cluster.pins().count(), MAX_CHANNELS);
}

#[test]
fn pins_lists_the_mask() {
    let (cluster, _pwm) = cluster(0b1010_0001);
    assert_eq!(cluster.pins().collect::<Vec<_>>(), [0, 5, 7]);
}

#[test]
fn channel_index_is_validated() {
    let (mut cluster, pwm) = cluster(ALL_CHANNELS_MASK);
    let loads = pwm.loads();

    let out_of_range = Err(Error::OutOfRange {
        index: MAX_CHANNELS,
        len: MAX_CHANNELS,
    });
    assert_eq!(cluster.value(MAX_CHANNELS), out_of_range);
    assert_eq!(cluster.set_value(MAX_CHANNELS, 0.0), out_of_range.map(|_| ()));
    assert!(cluster.calibration(MAX_CHANNELS).is_err());
    assert!(cluster.calibration_mut(usize::MAX).is_err());

    assert_eq!(cluster.enable(MAX_CHANNELS), out_of_range.map(|_| ()));
    assert!(cluster.to_mid(usize::MAX).is_err());
    assert_eq!(pwm.loads(), loads);

    cluster.set_value(MAX_CHANNELS - 1, 90.0).expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(MAX_CHANNELS - 1), 2500.0);
    assert_eq!(pwm.loads(), loads + 1);
}

#[test]
fn invalid_channel_is_reported_even_when_the_backend_rejects_loads() {
    let (mut cluster, pwm) = cluster(0xFF);
    cluster.set_value(0, 45.0).expect("cluster call must succeed");
    pwm.loaded.borrow_mut().reject_load = true;

    assert_eq!(
        cluster.set_value(MAX_CHANNELS, 0.0),
        Err(Error::OutOfRange {
            index: MAX_CHANNELS,
            len: MAX_CHANNELS,
        })
    );
    assert_eq!(
        cluster.batch(|frame| {
            frame.set_value(1, 10.0)?;
            frame.set_value(99, 0.0)
        }),
        Err(Error::OutOfRange {
            index: 99,
            len: MAX_CHANNELS,
        })
    );

    // A valid change still surfaces the rejected load.
    assert_eq!(cluster.set_value(2, 0.0), Err(Error::Pwm));
}

#[test]
fn batch_that_stages_nothing_does_not_load() {
    let (mut cluster, pwm) = cluster(0xFF);
    let loads = pwm.loads();

    assert_eq!(cluster.batch(|_frame| Ok(3)), Ok(3));
    assert_eq!(
        cluster.batch(|frame| frame.to_percent_between(1, 0.5, 2.0, 2.0)),
        Err(Error::InvalidArgument("percent input range must not be empty"))
    );
    assert_eq!(pwm.loads(), loads);
}

#[test]
fn invalid_channel_leaves_the_frame_slot_untouched() {
    static SLOT: FrameSlot = FrameSlot::new(0b11);
    let mut cluster = ServoCluster::new(&SLOT, CalibrationType::Angular);
    cluster.init().expect("cluster call must succeed");
    cluster.set_value(1, 90.0).expect("cluster call must succeed");
    let before = SLOT.latest();

    assert!(cluster.set_value(MAX_CHANNELS, 0.0).is_err());
    assert!(cluster.disable(MAX_CHANNELS + 1).is_err());
    assert_eq!(SLOT.latest(), before);
}

#[test]
fn batch_loads_once() {
    let (mut cluster, pwm) = cluster(0xFF);
    let loads = pwm.loads();

    cluster
        .batch(|frame| {
            frame.set_value(0, -90.0)?;
            frame.set_pulse(1, 2000.0)?;
            frame.to_max(2)?;
            frame.to_percent(3, 0.5)
        })
        .expect("cluster call must succeed");

    assert_eq!(pwm.loads(), loads + 1);
    let frame = pwm.last();
    assert_eq!(frame.pulse(0), 500.0);
    assert_eq!(frame.pulse(1), 2000.0);
    assert_eq!(frame.pulse(2), 2500.0);
    assert_eq!(frame.pulse(3), 1500.0);
    assert_eq!(cluster.value(1), Ok(45.0));
}

#[test]
fn batch_keeps_changes_staged_before_a_failure() {
    let (mut cluster, pwm) = cluster(0xFF);

    let result = cluster.batch(|frame| {
        frame.set_value(0, 90.0)?;
        frame.set_value(40, 0.0)?;
        frame.set_value(1, 90.0)
    });

    assert_eq!(result, Err(Error::OutOfRange { index: 40, len: 30 }));
    assert_eq!(pwm.last().pulse(0), 2500.0);
    assert!(!pwm.last().is_on(1));
}

#[test]
fn batch_returns_the_closure_result() {
    let (mut cluster, _pwm) = cluster(0xFF);
    let pulse = cluster
        .batch(|frame| {
            frame.to_min(4)?;
            Ok(17)
        })
        .expect("cluster call must succeed");
    assert_eq!(pulse, 17);
    assert_eq!(cluster.pulse(4), Ok(500.0));
}

#[test]
fn channels_outside_the_mask_keep_state_but_load_off() {
    let (mut cluster, pwm) = cluster(0b0011);
    cluster.set_value(5, 45.0).expect("cluster call must succeed");
    assert!(cluster.is_enabled(5).expect("cluster call must succeed"));
    assert_eq!(cluster.pulse(5), Ok(2000.0));
    assert!(!pwm.last().is_on(5));
    assert_eq!(cluster.frame().pulse(5), 0.0);
}

#[test]
fn disable_keeps_pulse_and_loads_off() {
    let (mut cluster, pwm) = cluster(0xFF);
    cluster.set_value(2, 45.0).expect("cluster call must succeed");
    cluster.disable(2).expect("cluster call must succeed");
    assert_eq!(cluster.pulse(2), Ok(2000.0));
    assert!(!pwm.last().is_on(2));

    cluster.enable(2).expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(2), 2000.0);
}

#[test]
fn all_channel_operations_touch_only_masked_pins() {
    let (mut cluster, pwm) = cluster(0b0111);
    cluster.set_all_values(90.0).expect("cluster call must succeed");
    let frame = pwm.last();
    assert_eq!(frame.pulses().get(..4), Some(&[2500.0, 2500.0, 2500.0, 0.0][..]));
    assert!(!cluster.is_enabled(3).expect("cluster call must succeed"));

    cluster.set_all_pulses(1250.0).expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(1), 1250.0);
    assert_eq!(cluster.value(1), Ok(-22.5));

    cluster.disable_all().expect("cluster call must succeed");
    assert_eq!(pwm.last(), PulseFrame::new());

    cluster.enable_all().expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(2), 1250.0);
}

#[test]
fn set_all_pulses_below_one_microsecond_disables() {
    let (mut cluster, pwm) = cluster(0b11);
    cluster.set_all_values(0.0).expect("cluster call must succeed");
    cluster.set_all_pulses(0.0).expect("cluster call must succeed");
    assert!(!cluster.is_enabled(0).expect("cluster call must succeed"));
    assert_eq!(pwm.last(), PulseFrame::new());
}

#[test]
fn frequency_is_validated_and_reloads() {
    let (mut cluster, pwm) = cluster(0b1);
    cluster.set_value(0, 0.0).expect("cluster call must succeed");
    let loads = pwm.loads();

    assert!(matches!(
        cluster.set_frequency(400.0),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(cluster.frequency(), 50.0);
    assert_eq!(pwm.loads(), loads);

    cluster.set_frequency(200.0).expect("cluster call must succeed");
    assert_eq!(cluster.frequency(), 200.0);
    assert_eq!(pwm.loads(), loads + 1);
    assert_eq!(pwm.last().pulse(0), 1500.0);

    pwm.loaded.borrow_mut().reject_frequency = true;
    assert!(cluster.set_frequency(100.0).is_err());
    assert_eq!(cluster.frequency(), 200.0);
}

#[test]
fn calibrations_are_per_channel() {
    let (mut cluster, pwm) = cluster(0b11);
    cluster
        .calibration_mut(1)
        .expect("cluster call must succeed")
        .create_two_point_calibration(1000.0, 2000.0, 0.0, 100.0);

    cluster.set_all_values(50.0).expect("cluster call must succeed");
    assert_eq!(pwm.last().pulse(0), 1500.0 + 50_000.0 / 90.0);
    assert_eq!(pwm.last().pulse(1), 1500.0);
    assert_eq!(cluster.max_value(1), Ok(100.0));
    assert_eq!(cluster.mid_value(1), Ok(50.0));
    assert_eq!(cluster.min_value(0), Ok(-90.0));
}

#[test]
fn percent_helpers_use_each_channel_range() {
    let (mut cluster, _pwm) = cluster(0b11);
    cluster.to_percent(0, 1.0).expect("cluster call must succeed");
    assert_eq!(cluster.value(0), Ok(90.0));
    cluster.to_percent_between(1, 0.0, -1.0, 1.0).expect("cluster call must succeed");
    assert_eq!(cluster.value(1), Ok(0.0));
    cluster
        .to_percent_mapped(1, 2.0, 0.0, 4.0, 0.0, 20.0)
        .expect("cluster call must succeed");
    assert_eq!(cluster.value(1), Ok(10.0));
    assert!(cluster.to_percent_between(1, 0.0, 3.0, 3.0).is_err());
    assert_eq!(cluster.value(1), Ok(10.0));
}

#[test]
fn frame_slot_hands_over_whole_frames() {
    static SLOT: FrameSlot = FrameSlot::new(0b1111);
    assert_eq!(SLOT.latest(), (0, PulseFrame::new()));

    let mut cluster = ServoCluster::new(&SLOT, CalibrationType::Angular);
    cluster.init().expect("cluster call must succeed");
    let (after_init, _) = SLOT.latest();
    assert_eq!(after_init, 1);

    cluster
        .batch(|frame| {
            frame.set_value(0, -90.0)?;
            frame.set_value(3, 90.0)
        })
        .expect("cluster call must succeed");
    let (generation, frame) = SLOT.latest();
    assert_eq!(generation, after_init + 1);
    assert_eq!(frame.pulse(0), 500.0);
    assert_eq!(frame.pulse(3), 2500.0);

    cluster.set_frequency(100.0).expect("cluster call must succeed");
    assert_eq!(SLOT.frequency(), 100.0);
    assert_eq!(SLOT.latest().0, generation + 1);
}
