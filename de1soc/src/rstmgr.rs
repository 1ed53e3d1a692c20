//! Driver for the HPS reset manager.
//!
//! Only the peripheral module reset register is handled: it holds or
//! releases the reset line of each HPS peripheral. Once started, the
//! watchdogs can only be stopped by putting them back in reset.

use crate::bits;
use crate::ctx::DriverCtx;
use crate::Result;

/// Base address of the reset manager.
pub const RSTMGR_BASE: usize = 0xffd0_5000;

/// Peripheral module reset register.
const RSTMGR_PERMODRST: usize = 0x14;

/// Size of the register block.
const RSTMGR_SIZE: usize = 0x20;

/// Peripheral whose reset line is controlled by PERMODRST.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeripheralReset {
    Emac0,
    Emac1,
    Usb0,
    Usb1,
    Nand,
    Qspi,
    L4Wd0,
    L4Wd1,
    Osc1Timer0,
    Osc1Timer1,
    SpTimer0,
    SpTimer1,
    I2c0,
    I2c1,
    I2c2,
    I2c3,
    Uart0,
    Uart1,
    Spim0,
    Spim1,
    Spis0,
    Spis1,
    SdMmc,
    Can0,
    Can1,
    Gpio0,
    Gpio1,
    Gpio2,
    Dma,
    Sdr,
}

impl PeripheralReset {
    /// Returns the PERMODRST bit of the peripheral.
    fn mask(self) -> u32 {
        bits::bit(self as u32)
    }
}

/// The HPS reset manager.
#[derive(Debug)]
pub struct ResetManager {
    ctx: DriverCtx,
}

impl ResetManager {
    /// Binds the reset manager at `base`. No reset line is changed.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the HPS reset manager.
    pub unsafe fn new(base: usize) -> Result<ResetManager> {
        let ctx = DriverCtx::claim(base, RSTMGR_SIZE)?;
        Ok(ResetManager { ctx })
    }

    /// Holds `periph` in reset.
    pub fn assert(&mut self, periph: PeripheralReset) {
        self.ctx.regs().set_bits(RSTMGR_PERMODRST, periph.mask());
    }

    /// Releases `periph` from reset.
    pub fn release(&mut self, periph: PeripheralReset) {
        self.ctx.regs().clear_bits(RSTMGR_PERMODRST, periph.mask());
    }

    /// Returns true if `periph` is held in reset.
    pub fn is_asserted(&self, periph: PeripheralReset) -> bool {
        bits::check(self.ctx.regs().read(RSTMGR_PERMODRST), periph.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RegBlock;

    #[test]
    fn watchdog_reset_lines() {
        let block = RegBlock::new(8);
        block.write(RSTMGR_PERMODRST, 0x3fff_ffff);
        let mut rstmgr = unsafe { ResetManager::new(block.base()) }.unwrap();

        rstmgr.release(PeripheralReset::L4Wd0);
        assert_eq!(block.read(RSTMGR_PERMODRST), 0x3fff_ffbf);
        assert!(!rstmgr.is_asserted(PeripheralReset::L4Wd0));
        assert!(rstmgr.is_asserted(PeripheralReset::L4Wd1));

        rstmgr.assert(PeripheralReset::L4Wd0);
        assert_eq!(block.read(RSTMGR_PERMODRST), 0x3fff_ffff);

        rstmgr.release(PeripheralReset::Sdr);
        assert_eq!(block.read(RSTMGR_PERMODRST), 0x1fff_ffff);
    }
}
