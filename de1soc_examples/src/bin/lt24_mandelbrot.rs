//! Draws the Mandelbrot set on the LT24 with the FPGA generator.
//!
//! KEY0 zooms in, KEY1 zooms out, KEY2 and KEY3 pan left and right. With
//! SW0 up, frames are computed by the CPU instead.

#![no_std]
#![no_main]

use de1soc::board;
use de1soc::fpga_pio::FpgaPio;
use de1soc::gpio::GpioPort;
use de1soc::hps_usleep::{self, Usleep};
use de1soc::lt24::Lt24;
use de1soc::mandelbrot::{self, Mandelbrot, View};
use de1soc::println;
use de1soc_macros::entrypoint;

/// Register reads allowed for one hardware frame.
const RENDER_POLLS: u32 = 50_000_000;

#[entrypoint]
fn main() {
    println!("de1soc lt24_mandelbrot");

    let mut delay = unsafe {
        Usleep::new(board::PRIVATE_TIMER_BASE, hps_usleep::DEFAULT_CLOCK_HZ)
    }
    .unwrap();

    let jp1 = unsafe { FpgaPio::new(board::JP1_BASE, board::JP1_CONFIG) }.unwrap();
    let mut lcd =
        unsafe { Lt24::new(jp1, board::LT24_PINS, board::LT24_BASE, &mut delay) }.unwrap();
    lcd.test_pattern().unwrap();

    let mut keys = unsafe { FpgaPio::new(board::KEY_BASE, board::KEY_CONFIG) }.unwrap();
    let sw = unsafe { FpgaPio::new(board::SW_BASE, board::SW_CONFIG) }.unwrap();
    let mut generator = unsafe { Mandelbrot::new(board::MANDELBROT_BASE) }.unwrap();

    let mut view = View::default();
    loop {
        if sw.read(1).unwrap() != 0 {
            mandelbrot::render_software(&mut lcd, &view).unwrap();
        } else {
            generator.render(&mut lcd, &view).unwrap();
            if let Err(err) = generator.wait(RENDER_POLLS) {
                println!("render failed: {}", err);
            }
        }

        // Wait for a key.
        let pressed = loop {
            let edges = keys.edge_capture(0xf).unwrap();
            if edges != 0 {
                keys.clear_edge_capture(edges).unwrap();
                break edges;
            }
        };

        let res = if pressed & 0b0001 != 0 {
            view.zoom(2.0)
        } else if pressed & 0b0010 != 0 {
            view.zoom(0.5)
        } else if pressed & 0b0100 != 0 {
            view.pan(-40, 0)
        } else {
            view.pan(40, 0)
        };
        if let Err(err) = res {
            println!("view unchanged: {}", err);
        }
    }
}
