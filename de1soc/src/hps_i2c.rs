//! Driver for the HPS I2C controllers.
//!
//! The HPS has four Synopsys DesignWare APB I2C controllers. This driver
//! uses them as 7-bit addressing masters, polling the FIFOs. On the
//! DE1-SoC, I2C0 is shared with the FPGA (audio codec, video decoder,
//! accelerometer) through a multiplexer selected by an HPS GPIO line. For
//! more information, please see the I2C Controller chapter of the [Cyclone V
//! Hard Processor System Technical Reference Manual].
//!
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/i2c-controller.html

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::bits;
use crate::ctx::DriverCtx;
use crate::mmio::Mmio;
use crate::{Error, Result};

/// Control register.
const IC_CON: usize = 0x00;

/// Target address register.
const IC_TAR: usize = 0x04;

/// Rx/Tx data buffer and command register.
const IC_DATA_CMD: usize = 0x10;

/// Standard speed SCL high count register.
const IC_SS_SCL_HCNT: usize = 0x14;

/// Standard speed SCL low count register.
const IC_SS_SCL_LCNT: usize = 0x18;

/// Fast speed SCL high count register.
const IC_FS_SCL_HCNT: usize = 0x1c;

/// Fast speed SCL low count register.
const IC_FS_SCL_LCNT: usize = 0x20;

/// Interrupt mask register.
const IC_INTR_MASK: usize = 0x30;

/// Raw interrupt status register.
const IC_RAW_INTR_STAT: usize = 0x34;

/// Receive FIFO threshold register.
const IC_RX_TL: usize = 0x38;

/// Transmit FIFO threshold register.
const IC_TX_TL: usize = 0x3c;

/// Clear combined and individual interrupts register.
const IC_CLR_INTR: usize = 0x40;

/// Clear TX_ABRT interrupt register.
const IC_CLR_TX_ABRT: usize = 0x54;

/// Enable register.
const IC_ENABLE: usize = 0x6c;

/// Status register.
const IC_STATUS: usize = 0x70;

/// Transmit FIFO level register.
const IC_TXFLR: usize = 0x74;

/// Receive FIFO level register.
const IC_RXFLR: usize = 0x78;

/// Transmit abort source register.
const IC_TX_ABRT_SOURCE: usize = 0x80;

/// Enable status register.
const IC_ENABLE_STATUS: usize = 0x9c;

/// Size of the register block.
const IC_SIZE: usize = 0x100;

/// IC_CON: master mode.
const CON_MASTER_MODE: u32 = bits::bit(0);

/// IC_CON: speed field.
const CON_SPEED_SHIFT: u32 = 1;
const CON_SPEED_WIDTH: u32 = 2;

/// IC_CON: restart conditions allowed.
const CON_RESTART_EN: u32 = bits::bit(5);

/// IC_CON: slave mode disabled.
const CON_SLAVE_DISABLE: u32 = bits::bit(6);

/// IC_DATA_CMD: read command.
const CMD_READ: u32 = bits::bit(8);

/// IC_DATA_CMD: issue STOP after this byte.
const CMD_STOP: u32 = bits::bit(9);

/// IC_DATA_CMD: issue RESTART before this byte.
const CMD_RESTART: u32 = bits::bit(10);

/// IC_STATUS: transmit FIFO not full.
const STATUS_TFNF: u32 = bits::bit(1);

/// IC_STATUS: transmit FIFO empty.
const STATUS_TFE: u32 = bits::bit(2);

/// IC_STATUS: master FSM activity.
const STATUS_MST_ACTIVITY: u32 = bits::bit(5);

/// IC_RAW_INTR_STAT: transmit abort.
const INTR_TX_ABRT: u32 = bits::bit(6);

/// IC_TX_ABRT_SOURCE: address or data not acknowledged.
const ABRT_NOACK: u32 = bits::mask(4);

/// Register reads before a FIFO or status wait gives up.
const POLLS: u32 = 100_000;

/// Default input clock (l4_sp_clk).
pub const DEFAULT_CLOCK_HZ: u32 = 100_000_000;

/// Bus speed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum I2cSpeed {
    /// Standard mode, 100 kbit/s.
    Standard,

    /// Fast mode, 400 kbit/s.
    Fast,
}

impl I2cSpeed {
    /// Bus frequency in Hz.
    fn hz(self) -> u64 {
        match self {
            I2cSpeed::Standard => 100_000,
            I2cSpeed::Fast => 400_000,
        }
    }

    /// Minimum SCL high and low times in ns.
    fn min_times_ns(self) -> (u64, u64) {
        match self {
            I2cSpeed::Standard => (4000, 4700),
            I2cSpeed::Fast => (600, 1300),
        }
    }

    /// Value of the IC_CON speed field.
    fn con_value(self) -> u32 {
        match self {
            I2cSpeed::Standard => 1,
            I2cSpeed::Fast => 2,
        }
    }
}

/// Controller configuration.
#[derive(Debug, Copy, Clone)]
pub struct I2cConfig {
    /// Bus speed.
    pub speed: I2cSpeed,

    /// Frequency of the controller input clock in Hz.
    pub clock_hz: u32,
}

impl Default for I2cConfig {
    fn default() -> I2cConfig {
        I2cConfig {
            speed: I2cSpeed::Standard,
            clock_hz: DEFAULT_CLOCK_HZ,
        }
    }
}

/// Computes the SCL `(high, low)` counts for `speed` from an input clock of
/// `clock_hz`. Both phases respect the minimum times of the I2C
/// specification and the period is at least one bus clock.
pub fn scl_counts(clock_hz: u32, speed: I2cSpeed) -> Result<(u32, u32)> {
    if clock_hz == 0 {
        return Err(Error::InvalidArg);
    }

    let clk = clock_hz as u64;
    let (t_high, t_low) = speed.min_times_ns();
    let hcnt = (clk * t_high).div_ceil(1_000_000_000).max(6);
    let lcnt = (clk * t_low).div_ceil(1_000_000_000).max(8);
    let period = clk.div_ceil(speed.hz());
    let lcnt = lcnt.max(period.saturating_sub(hcnt));

    if hcnt > 0xffff || lcnt > 0xffff {
        return Err(Error::InvalidArg);
    }
    Ok((hcnt as u32, lcnt as u32))
}

/// An HPS I2C controller in master mode.
#[derive(Debug)]
pub struct HpsI2c {
    /// Driver context.
    ctx: DriverCtx,

    /// Configuration.
    config: I2cConfig,

    /// Address currently programmed in IC_TAR.
    target: Option<u8>,
}

impl HpsI2c {
    /// Initializes the I2C controller at `base` as a 7-bit master.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a DesignWare APB I2C controller.
    pub unsafe fn new(base: usize, config: I2cConfig) -> Result<HpsI2c> {
        let (hcnt, lcnt) = scl_counts(config.clock_hz, config.speed)?;

        let ctx = DriverCtx::claim(base, IC_SIZE)?;
        let mut i2c = HpsI2c {
            ctx,
            config,
            target: None,
        };

        i2c.disable()?;

        let regs = i2c.ctx.regs();
        let con = bits::insert(
            CON_MASTER_MODE | CON_RESTART_EN | CON_SLAVE_DISABLE,
            config.speed.con_value(),
            CON_SPEED_SHIFT,
            CON_SPEED_WIDTH,
        );
        regs.write(IC_CON, con);
        regs.write(IC_TAR, 0);
        match config.speed {
            I2cSpeed::Standard => {
                regs.write(IC_SS_SCL_HCNT, hcnt);
                regs.write(IC_SS_SCL_LCNT, lcnt);
            }
            I2cSpeed::Fast => {
                regs.write(IC_FS_SCL_HCNT, hcnt);
                regs.write(IC_FS_SCL_LCNT, lcnt);
            }
        }
        regs.write(IC_INTR_MASK, 0);
        regs.write(IC_RX_TL, 0);
        regs.write(IC_TX_TL, 0);
        regs.read(IC_CLR_INTR);
        regs.write(IC_ENABLE, 1);

        Ok(i2c)
    }

    /// Returns the configuration of the controller.
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Disables the controller and waits until it is idle.
    fn disable(&mut self) -> Result<()> {
        let regs = self.ctx.regs();
        regs.write(IC_ENABLE, 0);
        regs.wait_for(IC_ENABLE_STATUS, 1, 0, POLLS)?;
        Ok(())
    }

    /// Programs the target address if it changed since the last transfer.
    fn set_target(&mut self, address: u8) -> Result<()> {
        if address > 0x7f {
            return Err(Error::InvalidArg);
        }
        if self.target == Some(address) {
            return Ok(());
        }

        self.disable()?;
        let regs = self.ctx.regs();
        regs.write(IC_TAR, address as u32);
        regs.write(IC_ENABLE, 1);
        self.target = Some(address);

        Ok(())
    }

    /// Checks for a transmit abort. The abort is cleared before returning.
    fn check_abort(regs: &Mmio) -> Result<()> {
        if regs.read(IC_RAW_INTR_STAT) & INTR_TX_ABRT == 0 {
            return Ok(());
        }

        let source = regs.read(IC_TX_ABRT_SOURCE);
        regs.read(IC_CLR_TX_ABRT);
        if source & ABRT_NOACK != 0 {
            Err(Error::AckFail)
        } else {
            Err(Error::Aborted)
        }
    }

    /// Spins until `cond` holds, failing early on a transmit abort.
    fn wait<F>(regs: &Mmio, cond: F) -> Result<()>
    where
        F: Fn(&Mmio) -> bool,
    {
        for _ in 0..POLLS {
            HpsI2c::check_abort(regs)?;
            if cond(regs) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout)
    }

    /// Runs `operations` as a single transfer with `address`. A RESTART is
    /// issued when the direction changes and a STOP after the last byte.
    pub fn transfer(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<()> {
        self.set_target(address)?;

        let regs = self.ctx.regs();
        run_operations(&mut RegisterFifo(regs), operations)?;

        HpsI2c::wait(regs, |r| {
            let status = r.read(IC_STATUS);
            status & STATUS_TFE != 0 && status & STATUS_MST_ACTIVITY == 0
        })?;
        HpsI2c::check_abort(regs)
    }

    /// Returns the number of commands waiting in the transmit FIFO.
    pub fn tx_level(&self) -> u32 {
        self.ctx.regs().read(IC_TXFLR)
    }
}

/// Command side of the controller FIFOs.
trait CommandFifo {
    /// Pushes a command into the transmit FIFO.
    fn push(&mut self, cmd: u32) -> Result<()>;

    /// Pops a byte from the receive FIFO.
    fn pop(&mut self) -> Result<u8>;
}

/// The FIFOs of a controller.
struct RegisterFifo<'a>(&'a Mmio);

impl CommandFifo for RegisterFifo<'_> {
    fn push(&mut self, cmd: u32) -> Result<()> {
        HpsI2c::wait(self.0, |r| r.read(IC_STATUS) & STATUS_TFNF != 0)?;
        self.0.write(IC_DATA_CMD, cmd);
        Ok(())
    }

    fn pop(&mut self) -> Result<u8> {
        HpsI2c::wait(self.0, |r| r.read(IC_RXFLR) != 0)?;
        Ok(bits::field(self.0.read(IC_DATA_CMD), 0, 8) as u8)
    }
}

/// Pushes one command per byte of `operations`, reading back each byte
/// requested.
fn run_operations<F: CommandFifo>(fifo: &mut F, operations: &mut [Operation<'_>]) -> Result<()> {
    let last = operations
        .iter()
        .rposition(|op| match op {
            Operation::Read(buf) => !buf.is_empty(),
            Operation::Write(buf) => !buf.is_empty(),
        })
        .ok_or(Error::InvalidArg)?;

    let mut prev_read = None;
    for (i, op) in operations.iter_mut().enumerate().take(last + 1) {
        let is_read = matches!(op, Operation::Read(_));
        let mut restart = prev_read.is_some_and(|prev| prev != is_read);
        let len = match op {
            Operation::Read(buf) => buf.len(),
            Operation::Write(buf) => buf.len(),
        };
        if len == 0 {
            continue;
        }

        for j in 0..len {
            let mut cmd = 0;
            if restart {
                cmd |= CMD_RESTART;
                restart = false;
            }
            if i == last && j == len - 1 {
                cmd |= CMD_STOP;
            }

            match op {
                Operation::Read(buf) => {
                    fifo.push(cmd | CMD_READ)?;
                    buf[j] = fifo.pop()?;
                }
                Operation::Write(buf) => fifo.push(cmd | buf[j] as u32)?,
            }
        }
        prev_read = Some(is_read);
    }
    Ok(())
}

impl Drop for HpsI2c {
    fn drop(&mut self) {
        self.ctx.regs().write(IC_ENABLE, 0);
    }
}

impl ErrorType for HpsI2c {
    type Error = Error;
}

impl I2c<SevenBitAddress> for HpsI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<()> {
        self.transfer(address, operations)
    }
}
