//! GPIO capability.
//!
//! [`GpioPort`] is implemented by every driver able to drive or sample
//! digital lines: the FPGA PIO cores ([`crate::fpga_pio`]), the HPS GPIO
//! banks ([`crate::hps_gpio`]) and the servo controller
//! ([`crate::servo`]), whose enable bits behave as outputs. Code that only
//! needs a few control lines (e.g. [`crate::lt24`]) is generic over this
//! trait, so the lines can be wired to any of them.
//!
//! All the operations take a `mask` selecting the bits of the port they
//! apply to. Direction bits are 1 for output and 0 for input. Level bits are
//! 1 for high and 0 for low.

use core::cell::RefCell;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

use crate::bits;
use crate::{Error, Result};

/// A port of up to 32 digital lines.
pub trait GpioPort {
    /// Returns the number of lines of the port.
    fn width(&self) -> u32;

    /// Configures the direction of the lines in `mask`.
    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()>;

    /// Returns the direction of the lines in `mask`.
    fn direction(&self, mask: u32) -> Result<u32>;

    /// Drives the lines in `mask` with the corresponding bits of `value`.
    fn write(&mut self, value: u32, mask: u32) -> Result<()>;

    /// Samples the lines in `mask`.
    fn read(&self, mask: u32) -> Result<u32>;

    /// Returns the value driven on the lines in `mask`.
    fn output(&self, mask: u32) -> Result<u32>;

    /// Inverts the value driven on the lines in `mask`.
    fn toggle(&mut self, mask: u32) -> Result<()> {
        let current = self.output(mask)?;
        self.write(!current, mask)
    }
}

/// Returns an error if `mask` selects lines beyond `width`.
pub fn check_mask(width: u32, mask: u32) -> Result<()> {
    let outside = mask & !bits::mask(width);
    if outside != 0 {
        let highest = 31 - outside.leading_zeros();
        return Err(Error::BeyondEnd(highest as usize));
    }
    Ok(())
}

impl<P: GpioPort + ?Sized> GpioPort for &mut P {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()> {
        (**self).set_direction(dir, mask)
    }

    fn direction(&self, mask: u32) -> Result<u32> {
        (**self).direction(mask)
    }

    fn write(&mut self, value: u32, mask: u32) -> Result<()> {
        (**self).write(value, mask)
    }

    fn read(&self, mask: u32) -> Result<u32> {
        (**self).read(mask)
    }

    fn output(&self, mask: u32) -> Result<u32> {
        (**self).output(mask)
    }

    fn toggle(&mut self, mask: u32) -> Result<()> {
        (**self).toggle(mask)
    }
}

/// Allows several [`PortPin`]s to share the same port.
impl<P: GpioPort> GpioPort for &RefCell<P> {
    fn width(&self) -> u32 {
        self.borrow().width()
    }

    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()> {
        self.borrow_mut().set_direction(dir, mask)
    }

    fn direction(&self, mask: u32) -> Result<u32> {
        self.borrow().direction(mask)
    }

    fn write(&mut self, value: u32, mask: u32) -> Result<()> {
        self.borrow_mut().write(value, mask)
    }

    fn read(&self, mask: u32) -> Result<u32> {
        self.borrow().read(mask)
    }

    fn output(&self, mask: u32) -> Result<u32> {
        self.borrow().output(mask)
    }

    fn toggle(&mut self, mask: u32) -> Result<()> {
        self.borrow_mut().toggle(mask)
    }
}

/// A single line of a [`GpioPort`], usable wherever an `embedded-hal`
/// digital pin is expected.
#[derive(Debug)]
pub struct PortPin<P: GpioPort> {
    /// The port the line belongs to.
    port: P,

    /// Mask selecting the line.
    mask: u32,
}

impl<P: GpioPort> PortPin<P> {
    /// Binds line `pin` of `port`.
    pub fn new(port: P, pin: u32) -> Result<PortPin<P>> {
        if pin >= port.width() {
            return Err(Error::BeyondEnd(pin as usize));
        }
        Ok(PortPin {
            port,
            mask: bits::bit(pin),
        })
    }

    /// Configures the line as an output.
    pub fn set_as_output(&mut self) -> Result<()> {
        self.port.set_direction(self.mask, self.mask)
    }

    /// Configures the line as an input.
    pub fn set_as_input(&mut self) -> Result<()> {
        self.port.set_direction(0, self.mask)
    }

    /// Returns true if the line is configured as an output.
    pub fn is_output(&self) -> Result<bool> {
        Ok(self.port.direction(self.mask)? != 0)
    }

    /// Releases the port.
    pub fn release(self) -> P {
        self.port
    }
}

impl<P: GpioPort> ErrorType for PortPin<P> {
    type Error = Error;
}

impl<P: GpioPort> OutputPin for PortPin<P> {
    fn set_low(&mut self) -> Result<()> {
        self.port.write(0, self.mask)
    }

    fn set_high(&mut self) -> Result<()> {
        self.port.write(self.mask, self.mask)
    }
}

impl<P: GpioPort> StatefulOutputPin for PortPin<P> {
    fn is_set_high(&mut self) -> Result<bool> {
        Ok(self.port.output(self.mask)? != 0)
    }

    fn is_set_low(&mut self) -> Result<bool> {
        Ok(self.port.output(self.mask)? == 0)
    }

    fn toggle(&mut self) -> Result<()> {
        self.port.toggle(self.mask)
    }
}

impl<P: GpioPort> InputPin for PortPin<P> {
    fn is_high(&mut self) -> Result<bool> {
        Ok(self.port.read(self.mask)? != 0)
    }

    fn is_low(&mut self) -> Result<bool> {
        Ok(self.port.read(self.mask)? == 0)
    }
}
