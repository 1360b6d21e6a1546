#![allow(missing_docs)]
//! Host-level tests for single-servo control against a recording PWM backend.

use core::cell::RefCell;
use std::rc::Rc;

use servo_kit::calibration::CalibrationType;
use servo_kit::pwm::PwmDriver;
use servo_kit::servo::Servo;
use servo_kit::{Error, Result};

#[derive(Debug, Default)]
struct Output {
    channel: Option<u8>,
    pulse: f32,
    enabled: bool,
    frequency: f32,
    pulse_writes: usize,
    fail: bool,
}

#[derive(Clone, Default)]
struct MockPwm(Rc<RefCell<Output>>);

impl MockPwm {
    fn fail(&self, fail: bool) {
        self.0.borrow_mut().fail = fail;
    }

    fn pulse(&self) -> f32 {
        self.0.borrow().pulse
    }

    fn enabled(&self) -> bool {
        self.0.borrow().enabled
    }
}

impl PwmDriver for MockPwm {
    fn set_pulse(&mut self, channel: u8, pulse_us: f32) -> Result<()> {
        let mut output = self.0.borrow_mut();
        if output.fail {
            return Err(Error::Pwm);
        }
        output.channel = Some(channel);
        output.pulse = pulse_us;
        output.pulse_writes += 1;
        Ok(())
    }

    fn set_frequency(&mut self, frequency: f32) -> bool {
        self.0.borrow_mut().frequency = frequency;
        true
    }

    fn enable(&mut self, _channel: u8) -> Result<()> {
        let mut output = self.0.borrow_mut();
        if output.fail {
            return Err(Error::Pwm);
        }
        output.enabled = true;
        Ok(())
    }

    fn disable(&mut self, _channel: u8) -> Result<()> {
        let mut output = self.0.borrow_mut();
        if output.fail {
            return Err(Error::Pwm);
        }
        output.enabled = false;
        Ok(())
    }

    fn is_enabled(&self, _channel: u8) -> bool {
        self.0.borrow().enabled
    }
}

fn servo(kind: CalibrationType) -> (Servo<MockPwm>, MockPwm) {
    let pwm = MockPwm::default();
    let mut servo = Servo::new(pwm.clone(), 7, kind);
    servo.init().expect("servo call must succeed");
    (servo, pwm)
}

#[test]
fn init_runs_at_default_frequency_disabled() {
    let (servo, pwm) = servo(CalibrationType::Angular);
    assert_eq!(servo.pin(), 7);
    assert_eq!(servo.frequency(), 50.0);
    assert_eq!(pwm.0.borrow().frequency, 50.0);
    assert!(!servo.is_enabled());
    assert!(!pwm.enabled());
}

#[test]
fn set_value_drives_the_calibrated_pulse() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(45.0).expect("servo call must succeed");
    assert_eq!(servo.value(), 45.0);
    assert_eq!(servo.pulse(), 2000.0);
    assert!(servo.is_enabled());
    assert_eq!(pwm.pulse(), 2000.0);
    assert!(pwm.enabled());
    assert_eq!(pwm.0.borrow().channel, Some(7));
}

#[test]
fn set_value_reports_clamped_value() {
    let (mut servo, _pwm) = servo(CalibrationType::Angular);
    servo.set_value(120.0).expect("servo call must succeed");
    assert_eq!(servo.value(), 90.0);
    assert_eq!(servo.pulse(), 2500.0);
}

#[test]
fn disable_keeps_position_for_enable() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(-45.0).expect("servo call must succeed");
    servo.disable().expect("servo call must succeed");
    assert!(!servo.is_enabled());
    assert!(!pwm.enabled());
    assert_eq!(servo.pulse(), 1000.0);
    assert_eq!(servo.value(), -45.0);

    servo.enable().expect("servo call must succeed");
    assert!(servo.is_enabled());
    assert!(pwm.enabled());
    assert_eq!(pwm.pulse(), 1000.0);
}

#[test]
fn enabling_a_never_positioned_servo_goes_to_mid() {
    let (mut servo, pwm) = servo(CalibrationType::Linear);
    servo.enable().expect("servo call must succeed");
    assert_eq!(servo.value(), 0.5);
    assert_eq!(servo.pulse(), 1500.0);
    assert_eq!(pwm.pulse(), 1500.0);
}

#[test]
fn failed_set_value_leaves_output_unchanged() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(45.0).expect("servo call must succeed");
    servo.calibration_mut().create_blank_calibration(1).expect("servo call must succeed");

    assert_eq!(servo.set_value(10.0), Err(Error::InvalidCalibration));
    assert_eq!(servo.value(), 45.0);
    assert_eq!(servo.pulse(), 2000.0);
    assert!(servo.is_enabled());
    assert_eq!(pwm.pulse(), 2000.0);
}

#[test]
fn rejected_write_rolls_back_position() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(45.0).expect("servo call must succeed");
    pwm.fail(true);

    assert_eq!(servo.set_value(-45.0), Err(Error::Pwm));
    assert_eq!(servo.set_pulse(1200.0), Err(Error::Pwm));
    assert_eq!(servo.value(), 45.0);
    assert_eq!(servo.pulse(), 2000.0);
    assert!(servo.is_enabled());

    pwm.fail(false);
    servo.set_value(-45.0).expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 1000.0);
}

#[test]
fn set_pulse_updates_the_implied_value() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_pulse(1000.0).expect("servo call must succeed");
    assert_eq!(servo.value(), -45.0);
    assert_eq!(servo.pulse(), 1000.0);
    assert!(servo.is_enabled());
    assert!(pwm.enabled());
}

#[test]
fn set_pulse_without_a_usable_calibration_keeps_value() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(30.0).expect("servo call must succeed");
    servo.calibration_mut().create_blank_calibration(0).expect("servo call must succeed");

    servo.set_pulse(1234.0).expect("servo call must succeed");
    assert_eq!(servo.pulse(), 1234.0);
    assert_eq!(servo.value(), 30.0);
    assert_eq!(pwm.pulse(), 1234.0);
}

#[test]
fn sub_microsecond_pulse_disables() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_value(45.0).expect("servo call must succeed");
    servo.set_pulse(0.5).expect("servo call must succeed");
    assert!(!servo.is_enabled());
    assert!(!pwm.enabled());

    servo.enable().expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 2000.0);
}

#[test]
fn frequency_outside_range_is_rejected() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    for frequency in [9.0, 9.99, 350.5, 351.0] {
        assert!(matches!(
            servo.set_frequency(frequency),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(servo.frequency(), 50.0);
    }
    assert_eq!(pwm.0.borrow().frequency, 50.0);

    servo.set_frequency(10.0).expect("servo call must succeed");
    servo.set_frequency(350.0).expect("servo call must succeed");
    assert_eq!(servo.frequency(), 350.0);
    assert_eq!(pwm.0.borrow().frequency, 350.0);
}

#[test]
fn frequency_change_rewrites_pulse_only_while_enabled() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    servo.set_frequency(100.0).expect("servo call must succeed");
    assert_eq!(pwm.0.borrow().pulse_writes, 0);

    servo.set_value(0.0).expect("servo call must succeed");
    let writes = pwm.0.borrow().pulse_writes;
    servo.set_frequency(200.0).expect("servo call must succeed");
    assert_eq!(pwm.0.borrow().pulse_writes, writes + 1);
    assert_eq!(pwm.pulse(), 1500.0);
}

#[test]
fn min_mid_max_follow_the_calibration() {
    let (mut servo, pwm) = servo(CalibrationType::Angular);
    assert_eq!(
        (servo.min_value(), servo.mid_value(), servo.max_value()),
        (-90.0, 0.0, 90.0)
    );

    servo.to_min().expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 500.0);
    servo.to_max().expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 2500.0);
    servo.to_mid().expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 1500.0);

    servo
        .calibration_mut()
        .create_uniform_calibration(4, 1000.0, 2200.0, 0.0, 30.0)
        .expect("servo call must succeed");
    assert_eq!(servo.mid_value(), 15.0);

    servo.calibration_mut().create_blank_calibration(0).expect("servo call must succeed");
    assert_eq!(
        (servo.min_value(), servo.mid_value(), servo.max_value()),
        (0.0, 0.0, 0.0)
    );
}

#[test]
fn percent_moves_between_min_and_max() {
    let (mut servo, _pwm) = servo(CalibrationType::Angular);
    servo.to_percent(0.25).expect("servo call must succeed");
    assert_eq!(servo.value(), -45.0);

    servo.to_percent_between(5.0, 0.0, 10.0).expect("servo call must succeed");
    assert_eq!(servo.value(), 0.0);

    servo
        .to_percent_mapped(1.0, 0.0, 2.0, 0.0, 60.0)
        .expect("servo call must succeed");
    assert_eq!(servo.value(), 30.0);
    assert_eq!(servo.pulse(), 1500.0 + 1000.0 / 3.0);
}

#[test]
fn percent_with_empty_input_range_is_rejected() {
    let (mut servo, _pwm) = servo(CalibrationType::Angular);
    servo.set_value(10.0).expect("servo call must succeed");
    assert!(matches!(
        servo.to_percent_between(1.0, 1.0, 1.0),
        Err(Error::InvalidArgument(_))
    ));
    assert!(servo.to_percent_between(1.0, f32::NAN, 1.0).is_err());
    assert_eq!(servo.value(), 10.0);

    // Bounds that differ only slightly are still a usable range.
    servo.to_percent_between(1.0, 1.0, 1.000_001).expect("servo call must succeed");
    assert_eq!(servo.value(), -90.0);
}

#[test]
fn continuous_servo_stops_at_mid() {
    let (mut servo, pwm) = servo(CalibrationType::Continuous);
    assert_eq!(servo.mid_value(), 0.0);
    servo.set_value(1.0).expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 2500.0);
    servo.to_mid().expect("servo call must succeed");
    assert_eq!(pwm.pulse(), 1500.0);
}
