//! Pointers, structures and encapsulation on the DE1-SoC.
//!
//! Registers are memory locations: a raw pointer reaches them, a structure
//! groups the state of a peripheral, and a driver type hides both behind an
//! interface that cannot be misused.

#![no_std]
#![no_main]

use core::ptr;

use de1soc::board;
use de1soc::fpga_pio::FpgaPio;
use de1soc::gpio::GpioPort;
use de1soc::println;
use de1soc_macros::entrypoint;

/// A counter shown on the LEDs, with its own bounds.
struct Counter {
    value: u32,
    limit: u32,
}

impl Counter {
    fn new(limit: u32) -> Counter {
        Counter { value: 0, limit }
    }

    /// Advances the counter, wrapping at the limit.
    fn step(&mut self) -> u32 {
        self.value = (self.value + 1) % self.limit;
        self.value
    }
}

/// Doubles the value behind a pointer.
fn double(value: &mut u32) {
    *value *= 2;
}

#[entrypoint]
fn main() {
    println!("de1soc teaching");

    // 1. Pointers: a variable, a reference to it, and its address.
    let mut x = 21;
    double(&mut x);
    println!("x = {} at {:p}", x, &x);

    // 2. Registers are memory too. Write the LEDs through a raw pointer.
    let ledr = board::LEDR_BASE as *mut u32;
    unsafe { ptr::write_volatile(ledr, 0x155) };
    let sw = board::SW_BASE as *const u32;
    println!("switches (raw): {:#05x}", unsafe { ptr::read_volatile(sw) });

    // 3. Encapsulation: the driver owns the registers. Binding the same
    // peripheral twice is refused.
    let mut leds = unsafe { FpgaPio::new(board::LEDR_BASE, board::LEDR_CONFIG) }.unwrap();
    if let Err(err) = unsafe { FpgaPio::new(board::LEDR_BASE, board::LEDR_CONFIG) } {
        println!("second binding refused: {}", err);
    }
    // Lines beyond the port are rejected instead of corrupting others.
    if let Err(err) = leds.write(1 << 12, 1 << 12) {
        println!("line 12: {}", err);
    }

    // 4. Structures: state and behaviour together.
    let mut counter = Counter::new(1 << leds.width());
    loop {
        let value = counter.step();
        leds.write(value, u32::MAX >> (32 - leds.width())).unwrap();
        for _ in 0..1_000_000 {
            core::hint::spin_loop();
        }
    }
}
