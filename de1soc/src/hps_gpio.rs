//! Driver for the HPS GPIO controllers.
//!
//! The HPS has three Synopsys DesignWare APB GPIO controllers. On the
//! DE1-SoC, GPIO1 drives the HPS LED (GPIO53), samples the HPS key (GPIO54)
//! and selects the owner of the shared I2C bus (GPIO48). For more
//! information, please see the GPIO Interface chapter of the [Cyclone V Hard
//! Processor System Technical Reference Manual].
//!
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/general-purpose-i-o-interface.html

use crate::bits;
use crate::ctx::DriverCtx;
use crate::gpio::{check_mask, GpioPort};
use crate::Result;

/// Port A data register.
const GPIO_SWPORTA_DR: usize = 0x00;

/// Port A data direction register. 1 = output.
const GPIO_SWPORTA_DDR: usize = 0x04;

/// Interrupt enable register.
const GPIO_INTEN: usize = 0x30;

/// Interrupt mask register. 1 = masked.
const GPIO_INTMASK: usize = 0x34;

/// Interrupt level register. 1 = edge sensitive.
const GPIO_INTTYPE_LEVEL: usize = 0x38;

/// Interrupt polarity register. 1 = active high / rising edge.
const GPIO_INT_POLARITY: usize = 0x3c;

/// Interrupt status register.
const GPIO_INTSTATUS: usize = 0x40;

/// Raw interrupt status register.
const GPIO_RAW_INTSTATUS: usize = 0x44;

/// Debounce enable register.
const GPIO_DEBOUNCE: usize = 0x48;

/// Port A clear interrupt register.
const GPIO_PORTA_EOI: usize = 0x4c;

/// Port A external port register.
const GPIO_EXT_PORTA: usize = 0x50;

/// Level-sensitive synchronization enable register.
const GPIO_LS_SYNC: usize = 0x60;

/// Size of the register block.
const GPIO_SIZE: usize = 0x80;

/// HPS GPIO controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bank {
    /// GPIO0, lines GPIO0 to GPIO28.
    Gpio0,

    /// GPIO1, lines GPIO29 to GPIO57.
    Gpio1,

    /// GPIO2, lines GPIO58 to GPIO66 and the input-only lines.
    Gpio2,
}

impl Bank {
    /// Returns the base address of the controller.
    pub const fn base(self) -> usize {
        match self {
            Bank::Gpio0 => 0xff70_8000,
            Bank::Gpio1 => 0xff70_9000,
            Bank::Gpio2 => 0xff70_a000,
        }
    }

    /// Returns the number of lines of the controller.
    pub const fn width(self) -> u32 {
        match self {
            Bank::Gpio0 | Bank::Gpio1 => 29,
            Bank::Gpio2 => 27,
        }
    }
}

/// Interrupt trigger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Active while the line is low.
    LevelLow,

    /// Active while the line is high.
    LevelHigh,

    /// Falling edge.
    FallingEdge,

    /// Rising edge.
    RisingEdge,
}

impl Trigger {
    /// Returns `(edge, active_high)`.
    fn bits(self) -> (bool, bool) {
        match self {
            Trigger::LevelLow => (false, false),
            Trigger::LevelHigh => (false, true),
            Trigger::FallingEdge => (true, false),
            Trigger::RisingEdge => (true, true),
        }
    }
}

/// An HPS GPIO controller.
#[derive(Debug)]
pub struct HpsGpio {
    /// Driver context.
    ctx: DriverCtx,

    /// Number of lines.
    width: u32,
}

impl HpsGpio {
    /// Initializes one of the HPS GPIO controllers.
    pub fn new(bank: Bank) -> Result<HpsGpio> {
        unsafe { HpsGpio::with_base(bank.base(), bank.width()) }
    }

    /// Initializes a controller at `base` with `width` lines. All interrupts
    /// are disabled and cleared; directions and outputs are left untouched
    /// so that lines configured by the boot loader keep their state.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a DesignWare APB GPIO controller.
    pub unsafe fn with_base(base: usize, width: u32) -> Result<HpsGpio> {
        if width == 0 || width > 32 {
            return Err(crate::Error::InvalidArg);
        }

        let ctx = DriverCtx::claim(base, GPIO_SIZE)?;
        let regs = ctx.regs();
        regs.write(GPIO_INTEN, 0);
        regs.write(GPIO_INTMASK, 0);
        regs.write(GPIO_PORTA_EOI, bits::mask(width));

        Ok(HpsGpio { ctx, width })
    }

    /// Configures the interrupt trigger of the lines in `mask`.
    pub fn configure_interrupt(&mut self, mask: u32, trigger: Trigger) -> Result<()> {
        check_mask(self.width, mask)?;

        let (edge, high) = trigger.bits();
        let regs = self.ctx.regs();
        let edge = if edge { mask } else { 0 };
        let high = if high { mask } else { 0 };
        regs.modify(GPIO_INTTYPE_LEVEL, |val| bits::modify(val, edge, mask));
        regs.modify(GPIO_INT_POLARITY, |val| bits::modify(val, high, mask));

        Ok(())
    }

    /// Enables or disables the interrupt of the lines in `mask`.
    pub fn enable_interrupt(&mut self, enable: bool, mask: u32) -> Result<()> {
        check_mask(self.width, mask)?;

        let regs = self.ctx.regs();
        if enable {
            regs.clear_bits(GPIO_INTMASK, mask);
            regs.set_bits(GPIO_INTEN, mask);
        } else {
            regs.clear_bits(GPIO_INTEN, mask);
        }

        Ok(())
    }

    /// Returns the lines in `mask` with a pending (unmasked) interrupt.
    pub fn interrupt_status(&self, mask: u32) -> Result<u32> {
        check_mask(self.width, mask)?;
        Ok(self.ctx.regs().read(GPIO_INTSTATUS) & mask)
    }

    /// Returns the lines in `mask` with a raw (pre-mask) interrupt.
    pub fn raw_interrupt_status(&self, mask: u32) -> Result<u32> {
        check_mask(self.width, mask)?;
        Ok(self.ctx.regs().read(GPIO_RAW_INTSTATUS) & mask)
    }

    /// Clears the edge interrupts of the lines in `mask`.
    pub fn clear_interrupt(&mut self, mask: u32) -> Result<()> {
        check_mask(self.width, mask)?;
        self.ctx.regs().write(GPIO_PORTA_EOI, mask);
        Ok(())
    }

    /// Enables or disables debouncing of the lines in `mask`.
    pub fn set_debounce(&mut self, enable: bool, mask: u32) -> Result<()> {
        check_mask(self.width, mask)?;
        let value = if enable { mask } else { 0 };
        self.ctx
            .regs()
            .modify(GPIO_DEBOUNCE, |val| bits::modify(val, value, mask));
        Ok(())
    }

    /// Synchronizes level-sensitive interrupts to the bus clock.
    pub fn set_level_sync(&mut self, enable: bool) {
        self.ctx.regs().write(GPIO_LS_SYNC, enable as u32);
    }
}

impl GpioPort for HpsGpio {
    fn width(&self) -> u32 {
        self.width
    }

    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()> {
        check_mask(self.width, mask)?;
        self.ctx
            .regs()
            .modify(GPIO_SWPORTA_DDR, |val| bits::modify(val, dir, mask));
        Ok(())
    }

    fn direction(&self, mask: u32) -> Result<u32> {
        check_mask(self.width, mask)?;
        Ok(self.ctx.regs().read(GPIO_SWPORTA_DDR) & mask)
    }

    fn write(&mut self, value: u32, mask: u32) -> Result<()> {
        check_mask(self.width, mask)?;
        self.ctx
            .regs()
            .modify(GPIO_SWPORTA_DR, |val| bits::modify(val, value, mask));
        Ok(())
    }

    fn read(&self, mask: u32) -> Result<u32> {
        check_mask(self.width, mask)?;
        Ok(self.ctx.regs().read(GPIO_EXT_PORTA) & mask)
    }

    fn output(&self, mask: u32) -> Result<u32> {
        check_mask(self.width, mask)?;
        Ok(self.ctx.regs().read(GPIO_SWPORTA_DR) & mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RegBlock;
    use crate::Error;

    fn gpio(block: &RegBlock) -> HpsGpio {
        unsafe { HpsGpio::with_base(block.base(), Bank::Gpio1.width()) }.unwrap()
    }

    #[test]
    fn init_disables_interrupts() {
        let block = RegBlock::new(32);
        block.write(GPIO_INTEN, 0xffff);
        block.write(GPIO_SWPORTA_DDR, 0x10);

        let _gpio = gpio(&block);

        assert_eq!(block.read(GPIO_INTEN), 0);
        assert_eq!(block.read(GPIO_PORTA_EOI), 0x1fff_ffff);
        assert_eq!(block.read(GPIO_SWPORTA_DDR), 0x10);
    }

    #[test]
    fn led_and_key() {
        let block = RegBlock::new(32);
        let mut gpio = gpio(&block);
        let led = 1 << 24;
        let key = 1 << 25;

        gpio.set_direction(led, led | key).unwrap();
        assert_eq!(gpio.direction(led | key).unwrap(), led);

        gpio.write(led, led).unwrap();
        gpio.toggle(led).unwrap();
        assert_eq!(block.read(GPIO_SWPORTA_DR), 0);
        gpio.toggle(led).unwrap();
        assert_eq!(gpio.output(led).unwrap(), led);

        block.write(GPIO_EXT_PORTA, key);
        assert_eq!(gpio.read(key).unwrap(), key);
        assert_eq!(gpio.read(led).unwrap(), 0);
    }

    #[test]
    fn interrupt_configuration() {
        let block = RegBlock::new(32);
        let mut gpio = gpio(&block);

        gpio.configure_interrupt(0b11, Trigger::FallingEdge).unwrap();
        gpio.configure_interrupt(0b10, Trigger::LevelHigh).unwrap();
        assert_eq!(block.read(GPIO_INTTYPE_LEVEL), 0b01);
        assert_eq!(block.read(GPIO_INT_POLARITY), 0b10);

        block.write(GPIO_INTMASK, 0b11);
        gpio.enable_interrupt(true, 0b01).unwrap();
        assert_eq!(block.read(GPIO_INTEN), 0b01);
        assert_eq!(block.read(GPIO_INTMASK), 0b10);

        block.write(GPIO_INTSTATUS, 0b101);
        assert_eq!(gpio.interrupt_status(0b11).unwrap(), 0b01);
        gpio.clear_interrupt(0b01).unwrap();
        assert_eq!(block.read(GPIO_PORTA_EOI), 0b01);

        gpio.set_debounce(true, 0b100).unwrap();
        assert_eq!(block.read(GPIO_DEBOUNCE), 0b100);
    }

    #[test]
    fn lines_beyond_width() {
        let block = RegBlock::new(32);
        let mut gpio = gpio(&block);
        assert_eq!(gpio.write(1 << 29, 1 << 29), Err(Error::BeyondEnd(29)));
    }
}
