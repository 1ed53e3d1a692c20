//! Plays a sine tone on the line out of the WM8731. SW3-SW0 select the
//! pitch, in semitones above A4.

#![no_std]
#![no_main]

use de1soc::board;
use de1soc::fpga_pio::FpgaPio;
use de1soc::gpio::GpioPort;
use de1soc::hps_gpio::HpsGpio;
use de1soc::hps_i2c::{HpsI2c, I2cConfig};
use de1soc::println;
use de1soc::wm8731::{SampleRate, Wm8731};
use de1soc_macros::entrypoint;

/// Peak amplitude of the 24-bit samples.
const AMPLITUDE: f32 = 4_000_000.0;

#[entrypoint]
fn main() {
    println!("de1soc audio_tone");

    // Route I2C0 to the on-board peripherals.
    let mut hps = HpsGpio::new(board::HPS_PINS_BANK).unwrap();
    hps.set_direction(board::HPS_I2C_MUX_PIN, board::HPS_I2C_MUX_PIN)
        .unwrap();
    hps.write(board::HPS_I2C_MUX_PIN, board::HPS_I2C_MUX_PIN)
        .unwrap();

    let i2c = unsafe { HpsI2c::new(board::HPS_I2C0_BASE, I2cConfig::default()) }.unwrap();
    let mut codec = unsafe { Wm8731::new(i2c, board::AUDIO_BASE) }.unwrap();
    codec.set_sample_rate(SampleRate::Khz48).unwrap();
    codec.set_headphone_volume(-6).unwrap();

    let sw = unsafe { FpgaPio::new(board::SW_BASE, board::SW_CONFIG) }.unwrap();
    let rate = SampleRate::Khz48.hz() as f32;

    let mut phase = 0.0f32;
    let mut last = u32::MAX;
    loop {
        let semitones = sw.read(0xf).unwrap();
        let freq = 440.0 * libm::powf(2.0, semitones as f32 / 12.0);
        if semitones != last {
            println!("tone: {} Hz", freq as u32);
            last = semitones;
        }

        let sample = (AMPLITUDE * libm::sinf(phase)) as i32;
        nb::block!(codec.write_sample(sample, sample)).unwrap();

        phase += 2.0 * core::f32::consts::PI * freq / rate;
        if phase > 2.0 * core::f32::consts::PI {
            phase -= 2.0 * core::f32::consts::PI;
        }
    }
}
