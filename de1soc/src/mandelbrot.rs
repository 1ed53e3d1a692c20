//! Driver for the FPGA Mandelbrot set generator.
//!
//! The generator computes a full 240x320 frame of the Mandelbrot set and
//! streams the pixels straight into the LT24 display, so the LT24 window
//! must be opened before it is started. Coordinates are signed Q4.28 fixed
//! point numbers, the same arithmetic used by the software reference
//! implementation in this module.

use crate::bits;
use crate::ctx::DriverCtx;
use crate::gpio::GpioPort;
use crate::lt24::{self, make_rgb565, Lt24};
use crate::{Error, Result};

/// Control and status register.
const MB_CSR: usize = 0x00;

/// Real part of the top-left pixel.
const MB_X: usize = 0x04;

/// Imaginary part of the top-left pixel.
const MB_Y: usize = 0x08;

/// Distance between two adjacent pixels.
const MB_STEP: usize = 0x0c;

/// Maximum number of iterations.
const MB_MAX_ITER: usize = 0x10;

/// Size of the register block.
const MB_SIZE: usize = 0x20;

/// CSR: start a frame (write).
const CSR_START: u32 = bits::bit(0);

/// CSR: a frame is being generated.
const CSR_BUSY: u32 = bits::bit(1);

/// CSR: the frame is complete. Write 1 to clear.
const CSR_DONE: u32 = bits::bit(2);

/// Fractional bits of the fixed point format.
const FRAC_BITS: u32 = 28;

/// 1.0 in Q4.28.
const ONE: i64 = 1 << FRAC_BITS;

/// Escape radius squared (4.0) in Q4.28.
const ESCAPE: i64 = 4 * ONE;

/// Converts a real number to Q4.28. Returns `None` if it does not fit.
pub fn to_fixed(v: f64) -> Option<i32> {
    let fixed = v * ONE as f64;
    if fixed.is_nan() || fixed < i32::MIN as f64 || fixed > i32::MAX as f64 {
        return None;
    }
    Some(fixed as i32)
}

/// Converts a Q4.28 number to a real number.
pub fn from_fixed(v: i32) -> f64 {
    v as f64 / ONE as f64
}

/// Region of the complex plane shown on the screen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct View {
    /// Real part of the centre of the screen (Q4.28).
    pub centre_x: i32,

    /// Imaginary part of the centre of the screen (Q4.28).
    pub centre_y: i32,

    /// Width of the screen in the complex plane (Q4.28).
    pub width: i32,

    /// Iterations after which a point is considered part of the set.
    pub max_iterations: u32,
}

impl Default for View {
    /// The whole set.
    fn default() -> View {
        View {
            centre_x: -(ONE as i32) / 2,
            centre_y: 0,
            width: 3 * ONE as i32,
            max_iterations: 256,
        }
    }
}

impl View {
    /// Returns a view centred on (`centre_x`, `centre_y`) spanning `width`
    /// horizontally.
    pub fn new(centre_x: f64, centre_y: f64, width: f64, max_iterations: u32) -> Result<View> {
        let view = View {
            centre_x: to_fixed(centre_x).ok_or(Error::InvalidArg)?,
            centre_y: to_fixed(centre_y).ok_or(Error::InvalidArg)?,
            width: to_fixed(width).ok_or(Error::InvalidArg)?,
            max_iterations,
        };
        view.validate()?;
        Ok(view)
    }

    /// Checks the view can be rendered.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 || self.max_iterations > 0xffff {
            return Err(Error::InvalidArg);
        }
        if self.step() <= 0 {
            return Err(Error::InvalidArg);
        }
        self.origin()?;
        self.far_corner().map(|_| ())
    }

    /// Distance between two adjacent pixels (Q4.28).
    pub fn step(&self) -> i32 {
        self.width / lt24::WIDTH as i32
    }

    /// Top-left pixel (Q4.28).
    pub fn origin(&self) -> Result<(i32, i32)> {
        let step = self.step() as i64;
        let x = self.centre_x as i64 - step * (lt24::WIDTH / 2) as i64;
        let y = self.centre_y as i64 - step * (lt24::HEIGHT / 2) as i64;
        let x = i32::try_from(x).map_err(|_| Error::InvalidArg)?;
        let y = i32::try_from(y).map_err(|_| Error::InvalidArg)?;
        Ok((x, y))
    }

    /// Bottom-right pixel (Q4.28).
    pub fn far_corner(&self) -> Result<(i32, i32)> {
        let (x0, y0) = self.origin()?;
        let step = self.step() as i64;
        let x = x0 as i64 + step * (lt24::WIDTH - 1) as i64;
        let y = y0 as i64 + step * (lt24::HEIGHT - 1) as i64;
        let x = i32::try_from(x).map_err(|_| Error::InvalidArg)?;
        let y = i32::try_from(y).map_err(|_| Error::InvalidArg)?;
        Ok((x, y))
    }

    /// Divides the width of the view by `factor`, keeping the centre.
    pub fn zoom(&mut self, factor: f64) -> Result<()> {
        if factor.is_nan() || factor <= 0.0 {
            return Err(Error::InvalidArg);
        }
        let width = to_fixed(from_fixed(self.width) / factor).ok_or(Error::InvalidArg)?;
        let zoomed = View { width, ..*self };
        zoomed.validate()?;
        *self = zoomed;
        Ok(())
    }

    /// Moves the centre of the view by (`dx`, `dy`) pixels.
    pub fn pan(&mut self, dx: i32, dy: i32) -> Result<()> {
        let step = self.step() as i64;
        let x = self.centre_x as i64 + dx as i64 * step;
        let y = self.centre_y as i64 + dy as i64 * step;
        let panned = View {
            centre_x: i32::try_from(x).map_err(|_| Error::InvalidArg)?,
            centre_y: i32::try_from(y).map_err(|_| Error::InvalidArg)?,
            ..*self
        };
        panned.validate()?;
        *self = panned;
        Ok(())
    }
}

/// Returns the number of iterations of z = z² + c, starting at 0, before
/// |z| exceeds 2, or `max` if it never does. `cx` and `cy` are Q4.28.
pub fn escape_time(cx: i32, cy: i32, max: u32) -> u32 {
    let (cx, cy) = (cx as i64, cy as i64);
    let (mut x, mut y) = (0i64, 0i64);
    for i in 0..max {
        let x2 = (x * x) >> FRAC_BITS;
        let y2 = (y * y) >> FRAC_BITS;
        if x2 + y2 > ESCAPE {
            return i;
        }
        y = ((2 * x * y) >> FRAC_BITS) + cy;
        x = x2 - y2 + cx;
    }
    max
}

/// Returns the colour of a point that escaped after `iterations`.
pub fn palette(iterations: u32, max: u32) -> u16 {
    if max == 0 || iterations >= max {
        return lt24::colour::BLACK;
    }
    let t = (iterations * 255 / max) as u8;
    make_rgb565(t, t.wrapping_mul(4), 255 - t)
}

/// Computes `view` in software and streams it to the display.
pub fn render_software<G: GpioPort>(lcd: &mut Lt24<G>, view: &View) -> Result<()> {
    view.validate()?;
    let (x0, y0) = view.origin()?;
    let step = view.step() as i64;

    // Both corners fit in Q4.28, so every pixel in between does too.
    let coordinate = |origin: i32, index: u32| -> Result<i32> {
        i32::try_from(origin as i64 + index as i64 * step).map_err(|_| Error::InvalidArg)
    };

    lcd.set_window(0, 0, lt24::WIDTH, lt24::HEIGHT)?;
    for row in 0..lt24::HEIGHT {
        let cy = coordinate(y0, row)?;
        for col in 0..lt24::WIDTH {
            let cx = coordinate(x0, col)?;
            let iterations = escape_time(cx, cy, view.max_iterations);
            lcd.write_data(palette(iterations, view.max_iterations));
        }
    }
    Ok(())
}

/// The FPGA Mandelbrot generator.
#[derive(Debug)]
pub struct Mandelbrot {
    ctx: DriverCtx,
}

impl Mandelbrot {
    /// Binds the generator at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the Mandelbrot generator.
    pub unsafe fn new(base: usize) -> Result<Mandelbrot> {
        let ctx = DriverCtx::claim(base, MB_SIZE)?;
        ctx.regs().write(MB_CSR, CSR_DONE);
        Ok(Mandelbrot { ctx })
    }

    /// Returns true while a frame is being generated.
    pub fn is_busy(&self) -> bool {
        bits::check(self.ctx.regs().read(MB_CSR), CSR_BUSY)
    }

    /// Starts generating `view` into the display. Returns immediately; use
    /// [`Mandelbrot::wait`] to wait for the frame.
    pub fn render<G: GpioPort>(&mut self, lcd: &mut Lt24<G>, view: &View) -> Result<()> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        view.validate()?;
        let (x0, y0) = view.origin()?;

        lcd.set_window(0, 0, lt24::WIDTH, lt24::HEIGHT)?;

        let regs = self.ctx.regs();
        regs.write(MB_CSR, CSR_DONE);
        regs.write(MB_X, x0 as u32);
        regs.write(MB_Y, y0 as u32);
        regs.write(MB_STEP, view.step() as u32);
        regs.write(MB_MAX_ITER, view.max_iterations);
        regs.write(MB_CSR, CSR_START);

        Ok(())
    }

    /// Waits for the current frame to complete, reading the status at most
    /// `polls` times.
    pub fn wait(&mut self, polls: u32) -> Result<()> {
        let regs = self.ctx.regs();
        regs.wait_for(MB_CSR, CSR_DONE, CSR_DONE, polls)?;
        regs.write(MB_CSR, CSR_DONE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::tests::MemPort;
    use crate::lt24::tests::lt24;
    use crate::testing::RegBlock;

    fn fixed(v: f64) -> i32 {
        to_fixed(v).unwrap()
    }

    #[test]
    fn fixed_point() {
        assert_eq!(fixed(1.0), 1 << 28);
        assert_eq!(fixed(-0.5), -(1 << 27));
        assert_eq!(from_fixed(3 << 27), 1.5);
        assert_eq!(to_fixed(8.0), None);
        assert_eq!(to_fixed(f64::NAN), None);
    }

    #[test]
    fn escape_times() {
        assert_eq!(escape_time(0, 0, 100), 100);
        assert_eq!(escape_time(fixed(-2.0), 0, 50), 50);
        assert_eq!(escape_time(fixed(3.0), 0, 50), 1);
        assert_eq!(escape_time(fixed(1.0), 0, 50), 3);
    }

    #[test]
    fn palette_colours() {
        assert_eq!(palette(100, 100), 0);
        assert_eq!(palette(0, 100), 0x001f);
    }

    #[test]
    fn view_validation() {
        assert!(View::new(-0.5, 0.0, 3.0, 256).is_ok());
        assert_eq!(View::new(0.0, 0.0, 3.0, 0), Err(Error::InvalidArg));
        assert_eq!(View::new(0.0, 0.0, 3.0, 65536), Err(Error::InvalidArg));
        assert_eq!(View::new(0.0, 0.0, 0.0, 10), Err(Error::InvalidArg));
        assert_eq!(View::new(9.0, 0.0, 1.0, 10), Err(Error::InvalidArg));
    }

    #[test]
    fn view_near_the_edge() {
        // The origin fits but the bottom row does not.
        assert_eq!(View::new(0.0, 7.9, 1.0, 10), Err(Error::InvalidArg));

        let mut view = View::new(0.0, 7.0, 1.0, 10).unwrap();
        let (_, y1) = view.far_corner().unwrap();
        assert!(from_fixed(y1) > 7.6);

        let before = view;
        assert_eq!(view.pan(0, 200), Err(Error::InvalidArg));
        assert_eq!(view, before);

        let lcd_block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lcd = lt24(&lcd_block, &mut port);
        render_software(&mut lcd, &view).unwrap();

        let mb_block = RegBlock::new(8);
        let mut mb = unsafe { Mandelbrot::new(mb_block.base()) }.unwrap();
        let mut outside = view;
        outside.centre_y = fixed(7.9);
        assert_eq!(mb.render(&mut lcd, &outside), Err(Error::InvalidArg));
        assert_eq!(mb_block.read(MB_CSR), CSR_DONE);
    }

    #[test]
    fn zoom_and_pan() {
        let mut view = View::new(0.0, 0.0, 2.4, 64).unwrap();
        let step = view.step();

        view.pan(10, -20).unwrap();
        assert_eq!(view.centre_x, 10 * step);
        assert_eq!(view.centre_y, -20 * step);

        view.zoom(2.0).unwrap();
        assert_eq!(view.width, fixed(1.2));
        assert_eq!(view.centre_x, 10 * step);

        assert_eq!(view.zoom(0.0), Err(Error::InvalidArg));
        assert_eq!(view.zoom(1e12), Err(Error::InvalidArg));
        assert_eq!(view.width, fixed(1.2));
    }

    #[test]
    fn hardware_render() {
        let lcd_block = RegBlock::new(4);
        let mb_block = RegBlock::new(8);
        let mut port = MemPort::default();
        let mut lcd = lt24(&lcd_block, &mut port);
        let mut mb = unsafe { Mandelbrot::new(mb_block.base()) }.unwrap();

        let view = View::default();
        mb.render(&mut lcd, &view).unwrap();

        let (x0, y0) = view.origin().unwrap();
        assert_eq!(mb_block.read(MB_X), x0 as u32);
        assert_eq!(mb_block.read(MB_Y), y0 as u32);
        assert_eq!(mb_block.read(MB_STEP), view.step() as u32);
        assert_eq!(mb_block.read(MB_MAX_ITER), 256);
        assert_eq!(mb_block.read(MB_CSR), CSR_START);

        assert_eq!(mb.wait(10), Err(Error::Timeout));
        mb_block.write(MB_CSR, CSR_DONE);
        assert_eq!(mb.wait(10), Ok(()));

        mb_block.write(MB_CSR, CSR_BUSY);
        assert_eq!(mb.render(&mut lcd, &view), Err(Error::Busy));
    }

    #[test]
    fn software_render() {
        let lcd_block = RegBlock::new(4);
        let mut port = MemPort::default();
        let mut lcd = lt24(&lcd_block, &mut port);

        let view = View::new(-0.5, 0.0, 3.0, 8).unwrap();
        render_software(&mut lcd, &view).unwrap();

        // The bottom-right pixel lies outside the set.
        let (x0, y0) = view.origin().unwrap();
        let cx = x0 + 239 * view.step();
        let cy = y0 + 319 * view.step();
        let expected = palette(escape_time(cx, cy, 8), 8);
        assert_eq!(lcd_block.read(0x04), expected as u32);
    }
}
