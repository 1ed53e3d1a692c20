//! de1soc is a board-support package for the Terasic DE1-SoC board.
//!
//! Every driver in this crate wraps exactly one memory-mapped peripheral,
//! either in the Cyclone V Hard Processor System (HPS) or in the FPGA fabric
//! behind the lightweight HPS-to-FPGA bridge. Drivers do not share a runtime.
//! Application code initializes them in dependency order (e.g. a GPIO port
//! before the LT24 LCD, the LT24 before the Mandelbrot generator, the I2C
//! master before the WM8731 codec) and then calls into them directly.
//!
//! Three conventions are shared by all drivers:
//!
//! - A driver owns a [`ctx::DriverCtx`], created by its constructor. Owning
//!   the driver is proof that the peripheral has been initialized.
//! - Every operation returns a [`Result`]. The [`Error`] kinds map to the
//!   integer status codes used over the C ABI.
//! - Generic code reaches GPIO through the [`gpio::GpioPort`] capability and
//!   I2C through [`embedded_hal::i2c::I2c`], so any concrete driver can be
//!   bound to it.
//!
//! The sample programs in `de1soc_examples` are built for
//! `armv7a-none-eabi`. Their build script passes the `de1soc.ld` linker
//! script, and the following Cargo configuration selects the target.
//!
//! ```text
//! [build]
//! target = "armv7a-none-eabi"
//! ```

#![cfg_attr(not(test), no_std)]

pub mod bits;
pub mod board;
pub mod cpu;
pub mod ctx;
pub mod diskio;
pub mod error;
pub mod fpga_pio;
pub mod gpio;
pub mod hps_gpio;
pub mod hps_i2c;
pub mod hps_irq;
pub mod hps_usleep;
pub mod hps_watchdog;
pub mod jtag_uart;
pub mod lt24;
pub mod mandelbrot;
pub mod mmio;
pub mod print;
pub mod rstmgr;
pub mod sdmmc;
pub mod servo;
pub mod uimage;
pub mod wm8731;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
