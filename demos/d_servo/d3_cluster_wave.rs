#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};
use embassy_executor::Spawner;
use embassy_time::Timer;
use servo_kit::{
    Result,
    calibration::CalibrationType,
    pwm::rp::RpSliceCluster,
    servo_cluster::ServoCluster,
};
use {defmt::info, defmt_rtt as _, panic_probe as _};

// Fraction of travel per step; each servo starts a quarter period later.
static WAVE: [f32; 12] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 1.0, 0.8, 0.6, 0.4, 0.2, 0.0];
const PINS: [usize; 4] = [0, 2, 4, 6];

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    // One servo per slice: GPIO 0, 2, 4, 6 on slices 0 to 3.
    let mut pwm = RpSliceCluster::new();
    pwm.add(p.PIN_0, p.PWM_SLICE0)?;
    pwm.add(p.PIN_2, p.PWM_SLICE1)?;
    pwm.add(p.PIN_4, p.PWM_SLICE2)?;
    pwm.add(p.PIN_6, p.PWM_SLICE3)?;

    let mut cluster = ServoCluster::new(pwm, CalibrationType::Angular);
    cluster.init()?;
    info!("cluster pin mask {=u32:#x}", cluster.pin_mask());

    cluster.enable_all()?;
    Timer::after_millis(500).await;

    // A triangle wave passed along the servos; every step is one frame.
    let mut waves = [0, 3, 6, 9].map(|phase| WAVE.iter().cycle().skip(phase));
    loop {
        cluster.batch(|frame| {
            for (pin, wave) in PINS.into_iter().zip(&mut waves) {
                if let Some(&percent) = wave.next() {
                    frame.to_percent(pin, percent)?;
                }
            }
            Ok(())
        })?;
        Timer::after_millis(80).await;
    }
}
