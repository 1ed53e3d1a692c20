//! Driver contexts.
//!
//! A [`DriverCtx`] is the handle through which a driver reaches its register
//! block. Creating one claims the address range of the peripheral, so two
//! drivers can never be bound to the same hardware at once. The claim is
//! released when the context is dropped.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::mmio::Mmio;
use crate::{Error, Result};

/// Maximum number of simultaneously claimed register blocks.
#[cfg(not(test))]
pub const MAX_CLAIMS: usize = 32;

/// Host tests run in parallel and share the table.
#[cfg(test)]
pub const MAX_CLAIMS: usize = 1024;

/// Address ranges owned by drivers, as `(base, len)`.
#[derive(Debug)]
struct ClaimTable<const N: usize> {
    claims: Vec<(usize, usize), N>,
}

impl<const N: usize> ClaimTable<N> {
    const fn new() -> ClaimTable<N> {
        ClaimTable { claims: Vec::new() }
    }

    /// Records `[base, end)` unless it overlaps a claimed range.
    fn claim(&mut self, base: usize, end: usize) -> Result<()> {
        let overlaps = self
            .claims
            .iter()
            .any(|&(b, l)| base < b + l && b < end);
        if overlaps {
            return Err(Error::InUse);
        }
        self.claims
            .push((base, end - base))
            .map_err(|_| Error::NoSpace)
    }

    /// Forgets the range starting at `base`.
    fn release(&mut self, base: usize) {
        if let Some(idx) = self.claims.iter().position(|&(b, _)| b == base) {
            self.claims.swap_remove(idx);
        }
    }
}

static CLAIMS: Mutex<RefCell<ClaimTable<MAX_CLAIMS>>> =
    Mutex::new(RefCell::new(ClaimTable::new()));

/// Context of an initialized driver.
#[derive(Debug)]
pub struct DriverCtx {
    /// Register block.
    regs: Mmio,

    /// Size of the register block in bytes.
    size: usize,
}

impl DriverCtx {
    /// Claims the register block `[base, base + len)`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the range is a device register block (or
    /// memory standing in for one) that stays valid while the context is
    /// alive.
    pub unsafe fn claim(base: usize, len: usize) -> Result<DriverCtx> {
        if base == 0 || len == 0 {
            return Err(Error::InvalidArg);
        }
        if base % 4 != 0 {
            return Err(Error::Alignment);
        }
        let end = base.checked_add(len).ok_or(Error::InvalidArg)?;

        critical_section::with(|cs| CLAIMS.borrow_ref_mut(cs).claim(base, end))?;

        Ok(DriverCtx {
            regs: Mmio::new(base),
            size: len,
        })
    }

    /// Returns the register block.
    pub fn regs(&self) -> &Mmio {
        &self.regs
    }

    /// Returns the base address of the register block.
    pub fn base(&self) -> usize {
        self.regs.base()
    }

    /// Returns the size of the register block in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for DriverCtx {
    fn drop(&mut self) {
        let base = self.regs.base();
        critical_section::with(|cs| CLAIMS.borrow_ref_mut(cs).release(base));
    }
}
