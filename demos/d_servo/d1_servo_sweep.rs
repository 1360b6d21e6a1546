#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};
use embassy_executor::Spawner;
use embassy_time::Timer;
use servo_kit::{Result, servo};
use {defmt::info, defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    // Create a servo on GPIO 11
    let mut servo = servo! {
        pin: p.PIN_11,
        slice: p.PWM_SLICE5, // 11 → (11/2) % 8 = 5
    }?;

    servo.to_min()?;
    Timer::after_millis(400).await;
    servo.to_max()?;
    Timer::after_millis(400).await;
    servo.to_mid()?;
    Timer::after_millis(400).await;

    // Sweep in 10 degree steps, both ends included.
    loop {
        for degrees in (-90_i16..=90).step_by(10).chain((-80_i16..=80).rev().step_by(10)) {
            servo.set_value(f32::from(degrees))?;
            info!("value {} pulse {}", servo.value(), servo.pulse());
            Timer::after_millis(150).await;
        }
        servo.disable()?;
        Timer::after_secs(2).await;
        servo.enable()?;
    }
}
