//! Driver for the FPGA PIO cores.
//!
//! The DE1-SoC Computer system exposes the red LEDs, the slide switches, the
//! push buttons, the seven-segment displays and the expansion headers
//! through Intel PIO cores attached to the lightweight HPS-to-FPGA bridge.
//! For more information, please see the [Embedded Peripherals IP User
//! Guide].
//!
//! [Embedded Peripherals IP User Guide]: https://www.intel.com/content/www/us/en/docs/programmable/683130/current/pio-core.html

use crate::bits;
use crate::ctx::DriverCtx;
use crate::gpio::{check_mask, GpioPort};
use crate::{Error, Result};

/// Data register. Reads sample the inputs, writes drive the outputs.
const PIO_DATA: usize = 0x00;

/// Direction register (bidirectional ports only). 1 = output.
const PIO_DIRECTION: usize = 0x04;

/// Interrupt mask register. 1 = interrupt enabled.
const PIO_IRQ_MASK: usize = 0x08;

/// Edge capture register. Writing 1 clears a captured edge.
const PIO_EDGE_CAPTURE: usize = 0x0c;

/// Output set register (individual bit setting only).
const PIO_OUTSET: usize = 0x10;

/// Output clear register (individual bit setting only).
const PIO_OUTCLEAR: usize = 0x14;

/// Size of the PIO register block.
const PIO_SIZE: usize = 0x20;

/// How the lines of the port are wired in the core.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PioKind {
    /// Input lines only.
    Input,

    /// Output lines only.
    Output,

    /// Separate input and output lines sharing the data register.
    InOut,

    /// Tristate lines with a direction register.
    Bidir,
}

/// Configuration of a PIO core, matching the options it was generated with.
#[derive(Debug, Copy, Clone)]
pub struct PioConfig {
    /// Port kind.
    pub kind: PioKind,

    /// Number of lines (1 to 32).
    pub width: u32,

    /// The core has an interrupt mask register.
    pub irq: bool,

    /// The core has an edge capture register.
    pub edge_capture: bool,

    /// The core has the outset/outclear registers.
    pub bit_set: bool,
}

impl PioConfig {
    /// Returns the configuration of a plain core without optional registers.
    pub const fn new(kind: PioKind, width: u32) -> PioConfig {
        PioConfig {
            kind,
            width,
            irq: false,
            edge_capture: false,
            bit_set: false,
        }
    }

    /// Enables the interrupt and edge capture registers.
    pub const fn with_irq(mut self) -> PioConfig {
        self.irq = true;
        self.edge_capture = true;
        self
    }

    /// Enables the outset/outclear registers.
    pub const fn with_bit_set(mut self) -> PioConfig {
        self.bit_set = true;
        self
    }
}

/// An FPGA PIO port.
#[derive(Debug)]
pub struct FpgaPio {
    /// Driver context.
    ctx: DriverCtx,

    /// Core configuration.
    config: PioConfig,

    /// Value driven on the outputs. The data register of output-only cores
    /// is not readable.
    shadow: u32,
}

impl FpgaPio {
    /// Initializes the PIO core at `base`. Bidirectional lines start as
    /// inputs, interrupts are masked and captured edges are cleared.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a PIO core matching `config`.
    pub unsafe fn new(base: usize, config: PioConfig) -> Result<FpgaPio> {
        if config.width == 0 || config.width > 32 {
            return Err(Error::InvalidArg);
        }

        let ctx = DriverCtx::claim(base, PIO_SIZE)?;
        let pio = FpgaPio {
            ctx,
            config,
            shadow: 0,
        };

        let regs = pio.ctx.regs();
        if config.kind == PioKind::Bidir {
            regs.write(PIO_DIRECTION, 0);
        }
        if config.kind != PioKind::Input {
            regs.write(PIO_DATA, 0);
        }
        if config.irq {
            regs.write(PIO_IRQ_MASK, 0);
        }
        if config.edge_capture {
            regs.write(PIO_EDGE_CAPTURE, bits::mask(config.width));
        }

        Ok(pio)
    }

    /// Returns the configuration of the core.
    pub fn config(&self) -> &PioConfig {
        &self.config
    }

    /// Enables (`enable == true`) or masks the interrupt of the lines in
    /// `mask`.
    pub fn set_interrupt_mask(&mut self, enable: bool, mask: u32) -> Result<()> {
        check_mask(self.config.width, mask)?;
        if !self.config.irq {
            return Err(Error::NoSupport);
        }

        let regs = self.ctx.regs();
        if enable {
            regs.set_bits(PIO_IRQ_MASK, mask);
        } else {
            regs.clear_bits(PIO_IRQ_MASK, mask);
        }
        Ok(())
    }

    /// Returns the lines in `mask` with an interrupt enabled.
    pub fn interrupt_mask(&self, mask: u32) -> Result<u32> {
        check_mask(self.config.width, mask)?;
        if !self.config.irq {
            return Err(Error::NoSupport);
        }
        Ok(self.ctx.regs().read(PIO_IRQ_MASK) & mask)
    }

    /// Returns the lines in `mask` where an edge has been captured.
    pub fn edge_capture(&self, mask: u32) -> Result<u32> {
        check_mask(self.config.width, mask)?;
        if !self.config.edge_capture {
            return Err(Error::NoSupport);
        }
        Ok(self.ctx.regs().read(PIO_EDGE_CAPTURE) & mask)
    }

    /// Clears the captured edges of the lines in `mask`.
    pub fn clear_edge_capture(&mut self, mask: u32) -> Result<()> {
        check_mask(self.config.width, mask)?;
        if !self.config.edge_capture {
            return Err(Error::NoSupport);
        }
        self.ctx.regs().write(PIO_EDGE_CAPTURE, mask);
        Ok(())
    }

    /// Direction of every line as fixed by the port kind.
    fn fixed_direction(&self) -> Option<u32> {
        match self.config.kind {
            PioKind::Input => Some(0),
            PioKind::Output | PioKind::InOut => Some(bits::mask(self.config.width)),
            PioKind::Bidir => None,
        }
    }
}

impl GpioPort for FpgaPio {
    fn width(&self) -> u32 {
        self.config.width
    }

    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()> {
        check_mask(self.config.width, mask)?;
        match self.fixed_direction() {
            Some(fixed) if (dir ^ fixed) & mask == 0 => Ok(()),
            Some(_) => Err(Error::NoSupport),
            None => {
                self.ctx
                    .regs()
                    .modify(PIO_DIRECTION, |val| bits::modify(val, dir, mask));
                Ok(())
            }
        }
    }

    fn direction(&self, mask: u32) -> Result<u32> {
        check_mask(self.config.width, mask)?;
        let dir = match self.fixed_direction() {
            Some(fixed) => fixed,
            None => self.ctx.regs().read(PIO_DIRECTION),
        };
        Ok(dir & mask)
    }

    fn write(&mut self, value: u32, mask: u32) -> Result<()> {
        check_mask(self.config.width, mask)?;
        if self.config.kind == PioKind::Input {
            return Err(Error::NoSupport);
        }

        let regs = self.ctx.regs();
        if self.config.bit_set {
            regs.write(PIO_OUTSET, value & mask);
            regs.write(PIO_OUTCLEAR, !value & mask);
        } else {
            regs.write(PIO_DATA, bits::modify(self.shadow, value, mask));
        }
        self.shadow = bits::modify(self.shadow, value, mask);

        Ok(())
    }

    fn read(&self, mask: u32) -> Result<u32> {
        check_mask(self.config.width, mask)?;
        let val = match self.config.kind {
            PioKind::Output => self.shadow,
            _ => self.ctx.regs().read(PIO_DATA),
        };
        Ok(val & mask)
    }

    fn output(&self, mask: u32) -> Result<u32> {
        check_mask(self.config.width, mask)?;
        if self.config.kind == PioKind::Input {
            return Err(Error::NoSupport);
        }
        Ok(self.shadow & mask)
    }
}
