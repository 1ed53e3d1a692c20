//! Driver for the FPGA JTAG UART.
//!
//! The JTAG UART connects the board to a terminal on the host through the
//! USB-Blaster cable. For more information, please see the [Embedded
//! Peripherals IP User Guide].
//!
//! [Embedded Peripherals IP User Guide]: https://www.intel.com/content/www/us/en/docs/programmable/683130/current/jtag-uart-core.html

use core::fmt;

use crate::bits;
use crate::ctx::DriverCtx;
use crate::mmio::Mmio;
use crate::{Error, Result};

/// Data register.
const JTAG_UART_DATA: usize = 0x00;

/// DATA: a character was read.
const DATA_RVALID: u32 = bits::bit(15);

/// Control register.
const JTAG_UART_CONTROL: usize = 0x04;

/// CONTROL: read interrupt enable.
const CONTROL_RE: u32 = bits::bit(0);

/// CONTROL: space available in the write FIFO.
const CONTROL_WSPACE_SHIFT: u32 = 16;
const CONTROL_WSPACE_WIDTH: u32 = 16;

/// Size of the register block.
const JTAG_UART_SIZE: usize = 0x08;

/// Reads of the control register before a character is dropped. When no
/// host drains the FIFO the console must not stall the program.
const POLLS: u32 = 10_000;

/// Sends `b` through the JTAG UART at `regs`, dropping it if the write
/// FIFO stays full.
pub(crate) fn send(regs: &Mmio, b: u8) -> Result<()> {
    for _ in 0..POLLS {
        let control = regs.read(JTAG_UART_CONTROL);
        if bits::field(control, CONTROL_WSPACE_SHIFT, CONTROL_WSPACE_WIDTH) != 0 {
            regs.write(JTAG_UART_DATA, b as u32);
            return Ok(());
        }
    }
    Err(Error::Timeout)
}

/// A JTAG UART.
#[derive(Debug)]
pub struct JtagUart {
    ctx: DriverCtx,
}

impl JtagUart {
    /// Binds the JTAG UART at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a JTAG UART core.
    pub unsafe fn new(base: usize) -> Result<JtagUart> {
        let ctx = DriverCtx::claim(base, JTAG_UART_SIZE)?;
        ctx.regs().clear_bits(JTAG_UART_CONTROL, CONTROL_RE);
        Ok(JtagUart { ctx })
    }

    /// Sends a byte. If no host drains the FIFO, the byte is dropped and
    /// [`Error::Timeout`] is returned.
    pub fn send_byte(&mut self, b: u8) -> Result<()> {
        send(self.ctx.regs(), b)
    }

    /// Returns the next received byte, if any.
    pub fn recv_byte(&mut self) -> Option<u8> {
        let data = self.ctx.regs().read(JTAG_UART_DATA);
        if data & DATA_RVALID == 0 {
            return None;
        }
        Some(bits::field(data, 0, 8) as u8)
    }

    /// Returns the free space in the write FIFO.
    pub fn write_space(&self) -> u32 {
        let control = self.ctx.regs().read(JTAG_UART_CONTROL);
        bits::field(control, CONTROL_WSPACE_SHIFT, CONTROL_WSPACE_WIDTH)
    }

    /// Enables or disables the interrupt raised while the read FIFO holds
    /// data.
    pub fn set_read_interrupt(&mut self, enable: bool) {
        let regs = self.ctx.regs();
        if enable {
            regs.set_bits(JTAG_UART_CONTROL, CONTROL_RE);
        } else {
            regs.clear_bits(JTAG_UART_CONTROL, CONTROL_RE);
        }
    }
}

impl fmt::Write for JtagUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                let _ = self.send_byte(b'\r');
            }
            let _ = self.send_byte(b);
        }
        Ok(())
    }
}
