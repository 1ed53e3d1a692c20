//! Mirrors the slide switches on the red LEDs and the seven-segment
//! displays. The HPS user LED follows the HPS user key.

#![no_std]
#![no_main]

use de1soc::bits;
use de1soc::board;
use de1soc::fpga_pio::FpgaPio;
use de1soc::gpio::GpioPort;
use de1soc::hps_gpio::HpsGpio;
use de1soc::println;
use de1soc_macros::entrypoint;

/// Copies every line of `input` to `output`.
fn mirror<I: GpioPort, O: GpioPort>(input: &I, output: &mut O) -> de1soc::Result<u32> {
    let mask = bits::mask(input.width());
    let value = input.read(mask)?;
    output.write(value, mask)?;
    Ok(value)
}

#[entrypoint]
fn main() {
    println!("de1soc led");

    let sw = unsafe { FpgaPio::new(board::SW_BASE, board::SW_CONFIG) }.unwrap();
    let mut ledr = unsafe { FpgaPio::new(board::LEDR_BASE, board::LEDR_CONFIG) }.unwrap();
    let mut hex = unsafe { FpgaPio::new(board::HEX3_HEX0_BASE, board::HEX3_HEX0_CONFIG) }.unwrap();

    let mut hps = HpsGpio::new(board::HPS_PINS_BANK).unwrap();
    hps.set_direction(board::HPS_LED_PIN, board::HPS_LED_PIN | board::HPS_KEY_PIN)
        .unwrap();

    let mut last = u32::MAX;
    loop {
        let switches = mirror(&sw, &mut ledr).unwrap();
        if switches != last {
            hex.write(board::hex_digits(switches), u32::MAX).unwrap();
            println!("switches: {:#05x}", switches);
            last = switches;
        }

        // The key reads 0 while pressed.
        let pressed = hps.read(board::HPS_KEY_PIN).unwrap() == 0;
        let led = if pressed { board::HPS_LED_PIN } else { 0 };
        hps.write(led, board::HPS_LED_PIN).unwrap();
    }
}
