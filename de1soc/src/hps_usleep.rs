//! Microsecond delays using the Cortex-A9 private timer.
//!
//! The timer is prescaled to tick once per microsecond and run in one-shot
//! mode for each delay. The delay busy-waits on the event flag; the timer
//! interrupt is never enabled.

use embedded_hal::delay::DelayNs;

use crate::bits;
use crate::ctx::DriverCtx;
use crate::{Error, Result};

/// Base address of the private timer of CPU0.
pub const PRIVATE_TIMER_BASE: usize = 0xfffe_c600;

/// Load register.
const TIMER_LOAD: usize = 0x00;

/// Counter register.
const TIMER_COUNTER: usize = 0x04;

/// Control register.
const TIMER_CONTROL: usize = 0x08;

/// Interrupt status register. Writing 1 clears the event flag.
const TIMER_ISR: usize = 0x0c;

/// Size of the register block.
const TIMER_SIZE: usize = 0x10;

/// CONTROL: timer enable.
const CONTROL_ENABLE: u32 = bits::bit(0);

/// CONTROL: prescaler field.
const CONTROL_PRESCALER_SHIFT: u32 = 8;
const CONTROL_PRESCALER_WIDTH: u32 = 8;

/// ISR: event flag.
const ISR_EVENT: u32 = bits::bit(0);

/// Default timer clock (PERIPHCLK, half the MPU clock).
pub const DEFAULT_CLOCK_HZ: u32 = 200_000_000;

/// Upper bound of status reads per microsecond of delay.
const POLLS_PER_US: u32 = 1000;

/// Microsecond delay provider.
#[derive(Debug)]
pub struct Usleep {
    /// Driver context.
    ctx: DriverCtx,

    /// Prescaler giving a 1 MHz tick.
    prescaler: u32,
}

impl Usleep {
    /// Binds the private timer at `base`, clocked at `clock_hz`. The clock
    /// must be a whole number of MHz between 1 and 256 MHz.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a Cortex-A9 private timer not used by
    /// anything else.
    pub unsafe fn new(base: usize, clock_hz: u32) -> Result<Usleep> {
        if clock_hz == 0 || clock_hz % 1_000_000 != 0 || clock_hz > 256_000_000 {
            return Err(Error::InvalidArg);
        }

        let ctx = DriverCtx::claim(base, TIMER_SIZE)?;
        let regs = ctx.regs();
        regs.write(TIMER_CONTROL, 0);
        regs.write(TIMER_ISR, ISR_EVENT);

        Ok(Usleep {
            ctx,
            prescaler: clock_hz / 1_000_000 - 1,
        })
    }

    /// Busy-waits for `us` microseconds.
    pub fn usleep(&mut self, us: u32) -> Result<()> {
        if us == 0 {
            return Ok(());
        }

        let regs = self.ctx.regs();
        regs.write(TIMER_CONTROL, 0);
        regs.write(TIMER_ISR, ISR_EVENT);
        regs.write(TIMER_LOAD, us);
        let control = bits::insert(
            CONTROL_ENABLE,
            self.prescaler,
            CONTROL_PRESCALER_SHIFT,
            CONTROL_PRESCALER_WIDTH,
        );
        regs.write(TIMER_CONTROL, control);

        let polls = us.saturating_mul(POLLS_PER_US);
        regs.wait_for(TIMER_ISR, ISR_EVENT, ISR_EVENT, polls)?;
        regs.write(TIMER_ISR, ISR_EVENT);

        Ok(())
    }

    /// Returns the remaining ticks of the current delay.
    pub fn remaining(&self) -> u32 {
        self.ctx.regs().read(TIMER_COUNTER)
    }
}

impl DelayNs for Usleep {
    fn delay_ns(&mut self, ns: u32) {
        let _ = self.usleep(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        let _ = self.usleep(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            let _ = self.usleep(1000);
        }
    }
}
