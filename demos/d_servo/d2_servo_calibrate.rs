#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};
use embassy_executor::Spawner;
use embassy_time::Timer;
use servo_kit::{Result, calibration::CalibrationType, servo};
use {defmt::info, defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    let mut servo = servo! {
        pin: p.PIN_11,
        slice: p.PWM_SLICE5,
        calibration: CalibrationType::Angular,
    }?;

    // This servo reaches its end stops early: 600us is -90 and 2400us is +90.
    // A measured point in the middle corrects its slight non-linearity.
    let calibration = servo.calibration_mut();
    calibration.create_uniform_calibration(5, 600.0, 2400.0, -90.0, 90.0)?;
    calibration.set_point_at(2, (1520.0, 0.0))?;
    calibration.limit_to_calibration(true, true);
    info!("{}", servo.calibration());

    // Run faster than the 50Hz default; most digital servos accept it.
    servo.set_frequency(100.0)?;

    loop {
        for percent in [0.0, 0.25, 0.5, 0.75, 1.0] {
            servo.to_percent(percent)?;
            info!("{}% -> {} degrees, {}us", percent * 100.0, servo.value(), servo.pulse());
            Timer::after_millis(600).await;
        }

        // Raw pulses bypass the calibration; the value still follows them.
        servo.set_pulse(2000.0)?;
        info!("2000us reads as {} degrees", servo.value());
        Timer::after_millis(600).await;
    }
}
