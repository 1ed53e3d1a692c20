//! Driver for the FPGA servo controller.
//!
//! The controller generates the 50 Hz PWM signal of up to 8 RC servos. Each
//! channel has one register holding its enable bit, the pulse range and the
//! signed position. Position 0 is the centre (1.5 ms pulse), -128 and 127
//! the two ends of the range.

use crate::bits;
use crate::ctx::DriverCtx;
use crate::gpio::{check_mask, GpioPort};
use crate::{Error, Result};

/// Number of channels.
pub const NUM_CHANNELS: u32 = 8;

/// Channel register: position field.
const CH_POSITION_SHIFT: u32 = 0;
const CH_POSITION_WIDTH: u32 = 8;

/// Channel register: wide pulse range.
const CH_WIDE: u32 = bits::bit(8);

/// Channel register: channel enable.
const CH_ENABLE: u32 = bits::bit(31);

/// Size of the register block.
const SERVO_SIZE: usize = NUM_CHANNELS as usize * 4;

/// Pulse width of the centre position in µs.
const CENTRE_US: i32 = 1500;

/// Range of pulse widths.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PulseRange {
    /// 1.0 ms to 2.0 ms.
    Normal,

    /// 0.5 ms to 2.5 ms.
    Wide,
}

impl PulseRange {
    /// Half of the range in µs.
    fn half_span_us(self) -> i32 {
        match self {
            PulseRange::Normal => 500,
            PulseRange::Wide => 1000,
        }
    }
}

/// The FPGA servo controller.
#[derive(Debug)]
pub struct Servo {
    ctx: DriverCtx,
}

/// Returns the register offset of `channel`.
fn channel_reg(channel: u32) -> Result<usize> {
    if channel >= NUM_CHANNELS {
        return Err(Error::BeyondEnd(channel as usize));
    }
    Ok(channel as usize * 4)
}

impl Servo {
    /// Initializes the servo controller at `base`. All the channels are
    /// disabled and centred.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the servo controller.
    pub unsafe fn new(base: usize) -> Result<Servo> {
        let ctx = DriverCtx::claim(base, SERVO_SIZE)?;
        for ch in 0..NUM_CHANNELS as usize {
            ctx.regs().write(ch * 4, 0);
        }
        Ok(Servo { ctx })
    }

    /// Enables or disables the output of `channel`.
    pub fn enable(&mut self, channel: u32, enable: bool) -> Result<()> {
        let reg = channel_reg(channel)?;
        let value = if enable { CH_ENABLE } else { 0 };
        self.ctx
            .regs()
            .modify(reg, |val| bits::modify(val, value, CH_ENABLE));
        Ok(())
    }

    /// Returns true if the output of `channel` is enabled.
    pub fn is_enabled(&self, channel: u32) -> Result<bool> {
        let reg = channel_reg(channel)?;
        Ok(bits::check(self.ctx.regs().read(reg), CH_ENABLE))
    }

    /// Selects the pulse range of `channel`.
    pub fn set_pulse_range(&mut self, channel: u32, range: PulseRange) -> Result<()> {
        let reg = channel_reg(channel)?;
        let value = match range {
            PulseRange::Normal => 0,
            PulseRange::Wide => CH_WIDE,
        };
        self.ctx
            .regs()
            .modify(reg, |val| bits::modify(val, value, CH_WIDE));
        Ok(())
    }

    /// Returns the pulse range of `channel`.
    pub fn pulse_range(&self, channel: u32) -> Result<PulseRange> {
        let reg = channel_reg(channel)?;
        if bits::check(self.ctx.regs().read(reg), CH_WIDE) {
            Ok(PulseRange::Wide)
        } else {
            Ok(PulseRange::Normal)
        }
    }

    /// Moves `channel` to `position`.
    pub fn set_position(&mut self, channel: u32, position: i8) -> Result<()> {
        let reg = channel_reg(channel)?;
        self.ctx.regs().modify(reg, |val| {
            bits::insert(val, position as u8 as u32, CH_POSITION_SHIFT, CH_POSITION_WIDTH)
        });
        Ok(())
    }

    /// Returns the position of `channel`.
    pub fn position(&self, channel: u32) -> Result<i8> {
        let reg = channel_reg(channel)?;
        let field = bits::field(self.ctx.regs().read(reg), CH_POSITION_SHIFT, CH_POSITION_WIDTH);
        Ok(field as u8 as i8)
    }

    /// Returns the pulse width generated for `channel` in µs.
    pub fn pulse_width_us(&self, channel: u32) -> Result<u32> {
        let position = self.position(channel)? as i32;
        let half = self.pulse_range(channel)?.half_span_us();
        Ok((CENTRE_US + position * half / 128) as u32)
    }
}

impl Drop for Servo {
    fn drop(&mut self) {
        for ch in 0..NUM_CHANNELS as usize {
            self.ctx.regs().clear_bits(ch * 4, CH_ENABLE);
        }
    }
}

/// The enable bits of the channels, as a port of output lines.
impl GpioPort for Servo {
    fn width(&self) -> u32 {
        NUM_CHANNELS
    }

    fn set_direction(&mut self, dir: u32, mask: u32) -> Result<()> {
        check_mask(NUM_CHANNELS, mask)?;
        if dir & mask != mask {
            return Err(Error::NoSupport);
        }
        Ok(())
    }

    fn direction(&self, mask: u32) -> Result<u32> {
        check_mask(NUM_CHANNELS, mask)?;
        Ok(mask)
    }

    fn write(&mut self, value: u32, mask: u32) -> Result<()> {
        check_mask(NUM_CHANNELS, mask)?;
        for ch in (0..NUM_CHANNELS).filter(|&ch| bits::check(mask, bits::bit(ch))) {
            self.enable(ch, bits::check(value, bits::bit(ch)))?;
        }
        Ok(())
    }

    fn read(&self, mask: u32) -> Result<u32> {
        self.output(mask)
    }

    fn output(&self, mask: u32) -> Result<u32> {
        check_mask(NUM_CHANNELS, mask)?;
        let mut value = 0;
        for ch in 0..NUM_CHANNELS {
            if self.is_enabled(ch)? {
                value |= bits::bit(ch);
            }
        }
        Ok(value & mask)
    }
}
