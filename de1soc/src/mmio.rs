//! Memory mapped I/O operations.
//!
//! Every peripheral of the DE1-SoC is a block of 32-bit registers. The HPS
//! peripherals live in the top 64MB of the address space (0xfc000000 and
//! above) and the FPGA peripherals behind the lightweight HPS-to-FPGA bridge
//! at 0xff200000. For more information, please see the
//! [Cyclone V Hard Processor System Technical Reference Manual].
//!
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/hard-processor-system-technical-reference.html

use core::ptr::{read_volatile, write_volatile};

use crate::{Error, Result};

/// A block of memory mapped registers.
#[derive(Debug)]
pub struct Mmio {
    /// Base address of the block.
    base: usize,
}

impl Mmio {
    /// Returns a register block starting at `base`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `base` points to a device register block
    /// large enough for every offset accessed through the returned value.
    pub const unsafe fn new(base: usize) -> Mmio {
        Mmio { base }
    }

    /// Returns the base address of the block.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Read register. `reg` is the offset of the register from the base
    /// address.
    #[inline(always)]
    pub fn read(&self, reg: usize) -> u32 {
        unsafe { read_volatile((self.base + reg) as *const u32) }
    }

    /// Write value into register. `reg` is the offset of the register from
    /// the base address.
    #[inline(always)]
    pub fn write(&self, reg: usize, val: u32) {
        unsafe { write_volatile((self.base + reg) as *mut u32, val) }
    }

    /// Read-modify-write of a register.
    pub fn modify<F>(&self, reg: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let val = self.read(reg);
        self.write(reg, f(val));
    }

    /// Sets the bits in `mask`.
    pub fn set_bits(&self, reg: usize, mask: u32) {
        self.modify(reg, |val| val | mask);
    }

    /// Clears the bits in `mask`.
    pub fn clear_bits(&self, reg: usize, mask: u32) {
        self.modify(reg, |val| val & !mask);
    }

    /// Spins until `(reg & mask) == expected`, reading the register at most
    /// `polls` times. Returns the last value read.
    pub fn wait_for(
        &self,
        reg: usize,
        mask: u32,
        expected: u32,
        polls: u32,
    ) -> Result<u32> {
        for _ in 0..polls {
            let val = self.read(reg);
            if val & mask == expected {
                return Ok(val);
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout)
    }
}
