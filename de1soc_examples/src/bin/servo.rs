//! Sweeps the servo on channel 0 from end to end. SW0 selects the wide
//! pulse range.

#![no_std]
#![no_main]

use de1soc::board;
use de1soc::fpga_pio::FpgaPio;
use de1soc::gpio::GpioPort;
use de1soc::hps_usleep::{self, Usleep};
use de1soc::println;
use de1soc::servo::{PulseRange, Servo};
use de1soc_macros::entrypoint;

const CHANNEL: u32 = 0;

#[entrypoint]
fn main() {
    println!("de1soc servo");

    let mut delay = unsafe {
        Usleep::new(board::PRIVATE_TIMER_BASE, hps_usleep::DEFAULT_CLOCK_HZ)
    }
    .unwrap();
    let sw = unsafe { FpgaPio::new(board::SW_BASE, board::SW_CONFIG) }.unwrap();
    let mut servo = unsafe { Servo::new(board::SERVO_BASE) }.unwrap();

    servo.set_position(CHANNEL, 0).unwrap();
    servo.enable(CHANNEL, true).unwrap();

    let mut step: i8 = 4;
    let mut position: i8 = 0;
    loop {
        let range = if sw.read(1).unwrap() != 0 {
            PulseRange::Wide
        } else {
            PulseRange::Normal
        };
        servo.set_pulse_range(CHANNEL, range).unwrap();

        position = match position.checked_add(step) {
            Some(p) => p,
            None => {
                step = -step;
                position
            }
        };
        servo.set_position(CHANNEL, position).unwrap();

        if position == 0 {
            println!("pulse: {} us", servo.pulse_width_us(CHANNEL).unwrap());
        }
        delay.usleep(20_000).unwrap();
    }
}
