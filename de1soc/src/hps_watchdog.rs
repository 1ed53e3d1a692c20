//! Driver for the HPS watchdog timers.
//!
//! The HPS has two Synopsys DesignWare APB watchdogs clocked by osc1. When
//! the counter expires, the watchdog either resets the system or, in
//! interrupt mode, raises an interrupt first and resets on the second
//! expiry. Once enabled it cannot be stopped other than by holding it in
//! reset with the [`crate::rstmgr`].

use crate::bits;
use crate::ctx::DriverCtx;
use crate::{Error, Result};

/// Control register.
const WDT_CR: usize = 0x00;

/// Timeout range register.
const WDT_TORR: usize = 0x04;

/// Current counter value register.
const WDT_CCVR: usize = 0x08;

/// Counter restart register.
const WDT_CRR: usize = 0x0c;

/// Interrupt status register.
const WDT_STAT: usize = 0x10;

/// Interrupt clear register. Cleared on read.
const WDT_EOI: usize = 0x14;

/// Size of the register block.
const WDT_SIZE: usize = 0x100;

/// CR: watchdog enable.
const CR_WDT_EN: u32 = bits::bit(0);

/// CR: response mode. 1 = interrupt then reset.
const CR_RMOD: u32 = bits::bit(1);

/// Value restarting the counter when written to CRR.
const CRR_KICK: u32 = 0x76;

/// Number of timeout ranges.
const NUM_RANGES: u32 = 16;

/// Default clock (osc1).
pub const DEFAULT_CLOCK_HZ: u32 = 25_000_000;

/// Response to a counter expiry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Reset the system.
    Reset,

    /// Raise an interrupt, and reset if it is not cleared before the next
    /// expiry.
    InterruptThenReset,
}

/// Returns the number of clock cycles of timeout range `top`.
const fn range_cycles(top: u32) -> u64 {
    1 << (16 + top)
}

/// Returns the smallest timeout range whose period is at least
/// `timeout_ms` with a clock of `clock_hz`.
pub fn timeout_range(timeout_ms: u32, clock_hz: u32) -> Result<u32> {
    if timeout_ms == 0 || clock_hz == 0 {
        return Err(Error::InvalidArg);
    }

    let cycles = timeout_ms as u64 * clock_hz as u64 / 1000;
    (0..NUM_RANGES)
        .find(|&top| range_cycles(top) >= cycles)
        .ok_or(Error::BeyondEnd(timeout_ms as usize))
}

/// An HPS watchdog.
#[derive(Debug)]
pub struct Watchdog {
    /// Driver context.
    ctx: DriverCtx,

    /// Frequency of the watchdog clock in Hz.
    clock_hz: u32,
}

impl Watchdog {
    /// Binds the watchdog at `base`, clocked at `clock_hz`. The watchdog is
    /// not started.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a DesignWare APB watchdog.
    pub unsafe fn new(base: usize, clock_hz: u32) -> Result<Watchdog> {
        if clock_hz == 0 {
            return Err(Error::InvalidArg);
        }
        let ctx = DriverCtx::claim(base, WDT_SIZE)?;
        Ok(Watchdog { ctx, clock_hz })
    }

    /// Selects the shortest timeout of at least `timeout_ms` and the
    /// response mode.
    pub fn configure(&mut self, timeout_ms: u32, mode: Mode) -> Result<()> {
        let top = timeout_range(timeout_ms, self.clock_hz)?;

        let regs = self.ctx.regs();
        regs.write(WDT_TORR, top | (top << 4));
        let rmod = match mode {
            Mode::Reset => 0,
            Mode::InterruptThenReset => CR_RMOD,
        };
        regs.modify(WDT_CR, |val| bits::modify(val, rmod, CR_RMOD));

        Ok(())
    }

    /// Starts the watchdog.
    pub fn enable(&mut self) {
        self.ctx.regs().set_bits(WDT_CR, CR_WDT_EN);
        self.kick();
    }

    /// Returns true if the watchdog is running.
    pub fn is_enabled(&self) -> bool {
        bits::check(self.ctx.regs().read(WDT_CR), CR_WDT_EN)
    }

    /// Stops the watchdog. The hardware does not allow a running watchdog
    /// to be stopped, so this only succeeds if it is not running.
    pub fn disable(&mut self) -> Result<()> {
        if self.is_enabled() {
            return Err(Error::NoSupport);
        }
        Ok(())
    }

    /// Restarts the counter.
    pub fn kick(&mut self) {
        self.ctx.regs().write(WDT_CRR, CRR_KICK);
    }

    /// Returns the current counter value.
    pub fn counter(&self) -> u32 {
        self.ctx.regs().read(WDT_CCVR)
    }

    /// Returns the configured timeout in ms, saturated to `u32::MAX`.
    pub fn timeout_ms(&self) -> u32 {
        let top = bits::field(self.ctx.regs().read(WDT_TORR), 0, 4);
        let ms = range_cycles(top) * 1000 / self.clock_hz as u64;
        u32::try_from(ms).unwrap_or(u32::MAX)
    }

    /// Returns true if the expiry interrupt is pending.
    pub fn interrupt_pending(&self) -> bool {
        bits::check(self.ctx.regs().read(WDT_STAT), 1)
    }

    /// Clears the expiry interrupt without restarting the counter.
    pub fn clear_interrupt(&mut self) {
        self.ctx.regs().read(WDT_EOI);
    }
}
