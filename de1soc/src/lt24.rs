//! Driver for the Terasic LT24 LCD module.
//!
//! The LT24 is a 240x320 touch LCD built around an ILI9341 controller. In
//! the DE1-SoC computer system its 16-bit 8080 bus is driven by a
//! hardware-optimized interface with two registers: writing the command
//! register issues a command cycle and writing the data register a data
//! cycle. The reset, power and interface-mode lines are plain GPIO lines,
//! reached through any [`GpioPort`].
//!
//! Pixels are RGB565. Coordinates are in portrait orientation, (0, 0) being
//! the top-left corner.

use embedded_hal::delay::DelayNs;

use crate::ctx::DriverCtx;
use crate::gpio::{check_mask, GpioPort};
use crate::{Error, Result};

/// Command register.
const LT24_CMD: usize = 0x00;

/// Data register.
const LT24_DATA: usize = 0x04;

/// Size of the register block.
const LT24_SIZE: usize = 0x10;

/// Screen width in pixels.
pub const WIDTH: u32 = 240;

/// Screen height in pixels.
pub const HEIGHT: u32 = 320;

/// Column address set.
const CMD_CASET: u8 = 0x2a;

/// Page address set.
const CMD_PASET: u8 = 0x2b;

/// Memory write.
const CMD_RAMWR: u8 = 0x2c;

/// Sleep out.
const CMD_SLPOUT: u8 = 0x11;

/// Display off.
const CMD_DISPOFF: u8 = 0x28;

/// Display on.
const CMD_DISPON: u8 = 0x29;

/// ILI9341 power, timing, gamma and pixel format set-up.
const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (0xef, &[0x03, 0x80, 0x02]),
    (0xcf, &[0x00, 0x81, 0xc0]),
    (0xed, &[0x64, 0x03, 0x12, 0x81]),
    (0xe8, &[0x85, 0x01, 0x78]),
    (0xcb, &[0x39, 0x2c, 0x00, 0x34, 0x02]),
    (0xf7, &[0x20]),
    (0xea, &[0x00, 0x00]),
    // Frame rate: 70 Hz.
    (0xb1, &[0x00, 0x1b]),
    (0xb6, &[0x0a, 0xa2]),
    (0xc0, &[0x05]),
    (0xc1, &[0x11]),
    (0xc5, &[0x45, 0x45]),
    (0xc7, &[0xa2]),
    // Memory access control: BGR order.
    (0x36, &[0x08]),
    (0xf2, &[0x00]),
    (0x26, &[0x01]),
    (
        0xe0,
        &[
            0x0f, 0x26, 0x24, 0x0b, 0x0e, 0x08, 0x4b, 0xa8, 0x3b, 0x0a, 0x14, 0x06, 0x10, 0x09,
            0x00,
        ],
    ),
    (
        0xe1,
        &[
            0x00, 0x1c, 0x20, 0x04, 0x10, 0x08, 0x34, 0x47, 0x44, 0x05, 0x0b, 0x09, 0x2f, 0x36,
            0x0f,
        ],
    ),
    (CMD_CASET, &[0x00, 0x00, 0x00, 0xef]),
    (CMD_PASET, &[0x00, 0x00, 0x01, 0x3f]),
    // Pixel format: 16 bits per pixel.
    (0x3a, &[0x55]),
    (0xf6, &[0x01, 0x30, 0x00]),
];

/// Returns the RGB565 encoding of an 8-bit per channel colour.
pub const fn make_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Common colours.
pub mod colour {
    use super::make_rgb565;

    pub const BLACK: u16 = make_rgb565(0, 0, 0);
    pub const WHITE: u16 = make_rgb565(255, 255, 255);
    pub const RED: u16 = make_rgb565(255, 0, 0);
    pub const GREEN: u16 = make_rgb565(0, 255, 0);
    pub const BLUE: u16 = make_rgb565(0, 0, 255);
    pub const YELLOW: u16 = make_rgb565(255, 255, 0);
    pub const CYAN: u16 = make_rgb565(0, 255, 255);
    pub const MAGENTA: u16 = make_rgb565(255, 0, 255);
}

/// GPIO lines controlling the LT24, as masks of the port they are wired to.
#[derive(Debug, Copy, Clone)]
pub struct Lt24Pins {
    /// Active-low controller reset.
    pub reset_n: u32,

    /// LCD power and backlight.
    pub lcd_on: u32,

    /// Selects the hardware-optimized interface instead of direct GPIO
    /// control of the bus.
    pub hw_mode: u32,
}

impl Lt24Pins {
    fn all(&self) -> u32 {
        self.reset_n | self.lcd_on | self.hw_mode
    }

    fn validate(&self, width: u32) -> Result<()> {
        let (r, l, h) = (self.reset_n, self.lcd_on, self.hw_mode);
        if r == 0 || l == 0 || h == 0 || r & l != 0 || r & h != 0 || l & h != 0 {
            return Err(Error::InvalidArg);
        }
        check_mask(width, self.all())
    }
}

/// Checks that the window lies within the screen.
fn check_window(x: u32, y: u32, w: u32, h: u32) -> Result<()> {
    if w == 0 || h == 0 {
        return Err(Error::InvalidArg);
    }
    if x >= WIDTH {
        return Err(Error::BeyondEnd(x as usize));
    }
    if y >= HEIGHT {
        return Err(Error::BeyondEnd(y as usize));
    }
    if w > WIDTH - x {
        return Err(Error::BeyondEnd((x + w - 1) as usize));
    }
    if h > HEIGHT - y {
        return Err(Error::BeyondEnd((y + h - 1) as usize));
    }
    Ok(())
}

/// A bus cycle of the 8080 interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Cycle {
    Cmd(u8),
    Data(u16),
}

/// Returns the cycles opening the `w` x `h` window at (`x`, `y`) for a
/// memory write. Column and page ends are inclusive.
fn window_cycles(x: u32, y: u32, w: u32, h: u32) -> Result<[Cycle; 11]> {
    check_window(x, y, w, h)?;

    let (x_end, y_end) = (x + w - 1, y + h - 1);
    let hi = |v: u32| Cycle::Data((v >> 8) as u16);
    let lo = |v: u32| Cycle::Data((v & 0xff) as u16);
    Ok([
        Cycle::Cmd(CMD_CASET),
        hi(x),
        lo(x),
        hi(x_end),
        lo(x_end),
        Cycle::Cmd(CMD_PASET),
        hi(y),
        lo(y),
        hi(y_end),
        lo(y_end),
        Cycle::Cmd(CMD_RAMWR),
    ])
}

/// An initialized LT24 display.
#[derive(Debug)]
pub struct Lt24<G: GpioPort> {
    /// Driver context of the hardware-optimized interface.
    ctx: DriverCtx,

    /// Port of the control lines.
    gpio: G,

    /// Control lines.
    pins: Lt24Pins,
}

impl<G: GpioPort> Lt24<G> {
    /// Resets and initializes the display, then clears it to black. The
    /// control lines are configured as outputs of `gpio`, which must
    /// already be initialized.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the LT24 hardware-optimized interface.
    pub unsafe fn new<D: DelayNs>(
        mut gpio: G,
        pins: Lt24Pins,
        base: usize,
        delay: &mut D,
    ) -> Result<Lt24<G>> {
        pins.validate(gpio.width())?;

        let ctx = DriverCtx::claim(base, LT24_SIZE)?;

        let all = pins.all();
        gpio.write(pins.lcd_on | pins.hw_mode | pins.reset_n, all)?;
        gpio.set_direction(all, all)?;
        delay.delay_ms(1);
        gpio.write(0, pins.reset_n)?;
        delay.delay_ms(10);
        gpio.write(pins.reset_n, pins.reset_n)?;
        delay.delay_ms(120);

        let mut lt24 = Lt24 { ctx, gpio, pins };
        for &(cmd, params) in INIT_SEQUENCE {
            lt24.write_cmd(cmd);
            for &param in params {
                lt24.write_data(param as u16);
            }
        }
        lt24.write_cmd(CMD_SLPOUT);
        delay.delay_ms(120);
        lt24.write_cmd(CMD_DISPON);

        lt24.clear_display(colour::BLACK)?;
        Ok(lt24)
    }

    /// Issues a command cycle.
    fn write_cmd(&mut self, cmd: u8) {
        self.ctx.regs().write(LT24_CMD, cmd as u32);
    }

    /// Issues a data cycle. After [`Lt24::set_window`], each data cycle
    /// writes the next pixel of the window.
    pub fn write_data(&mut self, data: u16) {
        self.ctx.regs().write(LT24_DATA, data as u32);
    }

    /// Sets the drawing window to the `w` x `h` rectangle at (`x`, `y`) and
    /// starts a memory write. Pixels are then written row by row.
    pub fn set_window(&mut self, x: u32, y: u32, w: u32, h: u32) -> Result<()> {
        for cycle in window_cycles(x, y, w, h)? {
            match cycle {
                Cycle::Cmd(cmd) => self.write_cmd(cmd),
                Cycle::Data(data) => self.write_data(data),
            }
        }
        Ok(())
    }

    /// Draws one pixel.
    pub fn draw_pixel(&mut self, colour: u16, x: u32, y: u32) -> Result<()> {
        self.set_window(x, y, 1, 1)?;
        self.write_data(colour);
        Ok(())
    }

    /// Fills a rectangle with `colour`.
    pub fn fill_rect(&mut self, colour: u16, x: u32, y: u32, w: u32, h: u32) -> Result<()> {
        self.set_window(x, y, w, h)?;
        for _ in 0..w * h {
            self.write_data(colour);
        }
        Ok(())
    }

    /// Fills the screen with `colour`.
    pub fn clear_display(&mut self, colour: u16) -> Result<()> {
        self.fill_rect(colour, 0, 0, WIDTH, HEIGHT)
    }

    /// Copies a `w` x `h` frame stored row by row in `frame` to the
    /// rectangle at (`x`, `y`).
    pub fn copy_frame_buffer(
        &mut self,
        frame: &[u16],
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<()> {
        check_window(x, y, w, h)?;
        let len = (w * h) as usize;
        if frame.len() < len {
            return Err(Error::TooBig);
        }

        self.set_window(x, y, w, h)?;
        for &pixel in &frame[..len] {
            self.write_data(pixel);
        }
        Ok(())
    }

    /// Draws eight horizontal colour bars.
    pub fn test_pattern(&mut self) -> Result<()> {
        const BARS: [u16; 8] = [
            colour::WHITE,
            colour::YELLOW,
            colour::CYAN,
            colour::GREEN,
            colour::MAGENTA,
            colour::RED,
            colour::BLUE,
            colour::BLACK,
        ];
        let bar_height = HEIGHT / BARS.len() as u32;
        for (i, &colour) in BARS.iter().enumerate() {
            self.fill_rect(colour, 0, i as u32 * bar_height, WIDTH, bar_height)?;
        }
        Ok(())
    }

    /// Turns the display and its backlight on or off. The frame memory is
    /// kept.
    pub fn power(&mut self, on: bool) -> Result<()> {
        if on {
            self.gpio.write(self.pins.lcd_on, self.pins.lcd_on)?;
            self.write_cmd(CMD_DISPON);
        } else {
            self.write_cmd(CMD_DISPOFF);
            self.gpio.write(0, self.pins.lcd_on)?;
        }
        Ok(())
    }

    /// Releases the GPIO port of the control lines.
    pub fn release(self) -> G {
        self.gpio
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gpio::tests::MemPort;
    use crate::testing::RegBlock;

    /// Delay that only accumulates the requested time.
    #[derive(Default)]
    pub(crate) struct FakeDelay {
        pub ns: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += ns as u64;
        }
    }

    pub(crate) const PINS: Lt24Pins = Lt24Pins {
        reset_n: 1 << 0,
        lcd_on: 1 << 1,
        hw_mode: 1 << 2,
    };

    pub(crate) fn lt24<'a>(block: &RegBlock, port: &'a mut MemPort) -> Lt24<&'a mut MemPort> {
        let mut delay = FakeDelay::default();
        unsafe { Lt24::new(port, PINS, block.base(), &mut delay) }.unwrap()
    }

    #[test]
    fn init_sequence() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut delay = FakeDelay::default();

        let lt24 = unsafe { Lt24::new(&mut port, PINS, block.base(), &mut delay) }.unwrap();
        drop(lt24);

        assert_eq!(port.dir, 0b111);
        assert_eq!(port.out, 0b111);
        assert!(delay.ns >= 240_000_000);
        // The screen has been cleared.
        assert_eq!(block.read(LT24_CMD), CMD_RAMWR as u32);
        assert_eq!(block.read(LT24_DATA), colour::BLACK as u32);
    }

    #[test]
    fn invalid_pins() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut delay = FakeDelay::default();
        let pins = Lt24Pins {
            lcd_on: 1,
            ..PINS
        };
        let res = unsafe { Lt24::new(&mut port, pins, block.base(), &mut delay) };
        assert_eq!(res.unwrap_err(), Error::InvalidArg);

        let pins = Lt24Pins {
            hw_mode: 1 << 8,
            ..PINS
        };
        let res = unsafe { Lt24::new(&mut port, pins, block.base(), &mut delay) };
        assert_eq!(res.unwrap_err(), Error::BeyondEnd(8));
    }

    #[test]
    fn drawing() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lt24 = lt24(&block, &mut port);

        lt24.draw_pixel(colour::RED, 10, 20).unwrap();
        assert_eq!(block.read(LT24_CMD), CMD_RAMWR as u32);
        assert_eq!(block.read(LT24_DATA), 0xf800);

        lt24.fill_rect(colour::GREEN, 0, 0, 10, 10).unwrap();
        assert_eq!(block.read(LT24_DATA), 0x07e0);

        lt24.test_pattern().unwrap();
        assert_eq!(block.read(LT24_DATA), colour::BLACK as u32);
    }

    #[test]
    fn window_stream() {
        use Cycle::{Cmd, Data};

        assert_eq!(
            window_cycles(10, 20, 30, 40),
            Ok([
                Cmd(CMD_CASET),
                Data(0),
                Data(10),
                Data(0),
                Data(39),
                Cmd(CMD_PASET),
                Data(0),
                Data(20),
                Data(0),
                Data(59),
                Cmd(CMD_RAMWR),
            ])
        );

        // Full screen: the same ends as the power-on set-up.
        let full = window_cycles(0, 0, WIDTH, HEIGHT).unwrap();
        assert_eq!(full[3..5], [Data(0x00), Data(0xef)]);
        assert_eq!(full[8..10], [Data(0x01), Data(0x3f)]);

        // A single pixel in the bottom-right corner.
        let corner = window_cycles(239, 319, 1, 1).unwrap();
        assert_eq!(
            corner[1..5],
            [Data(0x00), Data(0xef), Data(0x00), Data(0xef)]
        );
        assert_eq!(
            corner[6..10],
            [Data(0x01), Data(0x3f), Data(0x01), Data(0x3f)]
        );

        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lt24 = lt24(&block, &mut port);
        lt24.set_window(10, 20, 30, 40).unwrap();
        assert_eq!(block.read(LT24_CMD), CMD_RAMWR as u32);
        assert_eq!(block.read(LT24_DATA), 59);

        lt24.draw_pixel(colour::BLUE, 239, 319).unwrap();
        assert_eq!(block.read(LT24_DATA), colour::BLUE as u32);
    }

    #[test]
    fn window_bounds() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lt24 = lt24(&block, &mut port);

        assert_eq!(lt24.draw_pixel(0, 240, 0), Err(Error::BeyondEnd(240)));
        assert_eq!(lt24.draw_pixel(0, 0, 320), Err(Error::BeyondEnd(320)));
        assert_eq!(lt24.fill_rect(0, 200, 0, 41, 1), Err(Error::BeyondEnd(240)));
        assert_eq!(lt24.fill_rect(0, 0, 0, 0, 1), Err(Error::InvalidArg));
        assert_eq!(lt24.set_window(0, 0, WIDTH, HEIGHT), Ok(()));
    }

    #[test]
    fn frame_buffer_copy() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lt24 = lt24(&block, &mut port);

        let frame = [1u16, 2, 3, 4, 5, 6];
        lt24.copy_frame_buffer(&frame, 100, 100, 3, 2).unwrap();
        assert_eq!(block.read(LT24_DATA), 6);

        assert_eq!(
            lt24.copy_frame_buffer(&frame, 100, 100, 4, 2),
            Err(Error::TooBig)
        );
    }

    #[test]
    fn power_off_and_on() {
        let block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lt24 = lt24(&block, &mut port);

        lt24.power(false).unwrap();
        assert_eq!(block.read(LT24_CMD), CMD_DISPOFF as u32);
        let port = lt24.release();
        assert_eq!(port.out, 0b101);
    }

    #[test]
    fn rgb565() {
        assert_eq!(make_rgb565(255, 255, 255), 0xffff);
        assert_eq!(make_rgb565(255, 0, 0), 0xf800);
        assert_eq!(make_rgb565(0, 255, 0), 0x07e0);
        assert_eq!(make_rgb565(0, 0, 255), 0x001f);
        assert_eq!(make_rgb565(8, 4, 8), 0x0821);
    }
}
