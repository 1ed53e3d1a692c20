//! Console writer and print macros.
//!
//! The console is the JTAG UART of the DE1-SoC Computer system. It is
//! reached without claiming the peripheral, so it can be used from anywhere
//! (including the panic handler) alongside a [`crate::jtag_uart::JtagUart`]
//! bound to the same core.
//!
//! Without a `nios2-terminal` attached the write FIFO never drains. Once a
//! character has been dropped, the rest of the message is discarded
//! instead of waiting again for every byte.

use core::fmt;

use crate::board;
use crate::jtag_uart;
use crate::mmio::Mmio;

/// Writer on top of a JTAG UART, translating `\n` into `\r\n`.
#[derive(Debug)]
pub struct ConsoleWriter {
    regs: Mmio,
    lost: bool,
}

impl ConsoleWriter {
    /// Returns a writer on the board's JTAG UART.
    pub fn new() -> ConsoleWriter {
        // The JTAG UART is part of every DE1-SoC Computer system.
        unsafe { ConsoleWriter::at(board::JTAG_UART_BASE) }
    }

    /// Returns a writer on the JTAG UART at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a JTAG UART core.
    pub const unsafe fn at(base: usize) -> ConsoleWriter {
        ConsoleWriter {
            regs: Mmio::new(base),
            lost: false,
        }
    }

    /// Returns true if a character has been dropped.
    pub fn lost(&self) -> bool {
        self.lost
    }

    fn send(&mut self, b: u8) {
        if !self.lost && jtag_uart::send(&self.regs, b).is_err() {
            self.lost = true;
        }
    }
}

impl Default for ConsoleWriter {
    fn default() -> ConsoleWriter {
        ConsoleWriter::new()
    }
}

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                self.send(b'\r');
            }
            self.send(b);
        }

        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = fmt::Write::write_fmt(&mut ConsoleWriter::new(), args);
}

/// Print to the JTAG UART console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::print::_print(core::format_args!($($arg)*))
    };
}

/// Print to the JTAG UART console, with a newline.
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };

    ($($arg:tt)*) => {
        $crate::print::_print(core::format_args!("{}\n", core::format_args!($($arg)*)))
    };
}
