//! Driver for the WM8731 audio codec.
//!
//! The codec is configured over I2C, through any implementation of
//! [`embedded_hal::i2c::I2c`], and streams samples over I2S to the FPGA
//! audio core, which exposes them as a pair of read and write FIFOs. The
//! codec registers are write-only, so the driver keeps a copy of every
//! value written.
//!
//! On the DE1-SoC the codec shares I2C0 with other FPGA-side devices. The
//! bus multiplexer must be switched to the HPS before initializing the
//! driver (see [`crate::board::HPS_I2C_MUX_PIN`]).

use embedded_hal::i2c::{Error as _, I2c};

use crate::bits;
use crate::ctx::DriverCtx;
use crate::{Error, Result};

/// I2C address of the codec (CSB low).
pub const I2C_ADDRESS: u8 = 0x1a;

/// Left line in.
pub const REG_LEFT_LINE_IN: u8 = 0x00;

/// Right line in.
pub const REG_RIGHT_LINE_IN: u8 = 0x01;

/// Left headphone out.
pub const REG_LEFT_HP_OUT: u8 = 0x02;

/// Right headphone out.
pub const REG_RIGHT_HP_OUT: u8 = 0x03;

/// Analogue audio path control.
pub const REG_ANALOGUE_PATH: u8 = 0x04;

/// Digital audio path control.
pub const REG_DIGITAL_PATH: u8 = 0x05;

/// Power down control.
pub const REG_POWER_DOWN: u8 = 0x06;

/// Digital audio interface format.
pub const REG_INTERFACE: u8 = 0x07;

/// Sampling control.
pub const REG_SAMPLING: u8 = 0x08;

/// Active control.
pub const REG_ACTIVE: u8 = 0x09;

/// Reset register.
pub const REG_RESET: u8 = 0x0f;

/// Number of registers holding a configuration value.
const NUM_REGS: usize = 10;

/// Register values after a reset.
const RESET_VALUES: [u16; NUM_REGS] = [
    0x097, 0x097, 0x079, 0x079, 0x00a, 0x008, 0x09f, 0x00a, 0x000, 0x000,
];

/// Configuration applied at initialization, after the reset.
const INIT_SEQUENCE: &[(u8, u16)] = &[
    // Power up everything.
    (REG_POWER_DOWN, 0x000),
    // Line in: 0 dB, unmuted.
    (REG_LEFT_LINE_IN, 0x017),
    (REG_RIGHT_LINE_IN, 0x017),
    // Headphone out: 0 dB.
    (REG_LEFT_HP_OUT, 0x079),
    (REG_RIGHT_HP_OUT, 0x079),
    // DAC selected, microphone muted.
    (REG_ANALOGUE_PATH, 0x012),
    // No de-emphasis, DAC unmuted.
    (REG_DIGITAL_PATH, 0x000),
    // I2S, 24-bit, master.
    (REG_INTERFACE, 0x04a),
    // Normal mode, 48 kHz.
    (REG_SAMPLING, 0x000),
    (REG_ACTIVE, 0x001),
];

/// Headphone register: volume field.
const HP_VOLUME_MASK: u16 = 0x7f;

/// Headphone volume value for 0 dB.
const HP_VOLUME_0DB: i32 = 0x79;

/// Lowest headphone volume in dB. Anything below mutes.
pub const HP_VOLUME_MIN_DB: i32 = -73;

/// Highest headphone volume in dB.
pub const HP_VOLUME_MAX_DB: i32 = 6;

/// Digital path: DAC soft mute.
const DIGITAL_PATH_DACMU: u16 = 1 << 3;

/// Audio core control register.
const AUDIO_CONTROL: usize = 0x00;

/// Audio core FIFO space register.
const AUDIO_FIFOSPACE: usize = 0x04;

/// Audio core left channel data register.
const AUDIO_LEFTDATA: usize = 0x08;

/// Audio core right channel data register.
const AUDIO_RIGHTDATA: usize = 0x0c;

/// Size of the audio core register block.
const AUDIO_SIZE: usize = 0x10;

/// CONTROL: clear the read FIFOs.
const CONTROL_CR: u32 = bits::bit(2);

/// CONTROL: clear the write FIFOs.
const CONTROL_CW: u32 = bits::bit(3);

/// Sample rates available with the 12.288 MHz master clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleRate {
    Khz8,
    Khz32,
    Khz48,
    Khz96,
}

impl SampleRate {
    /// Value of the sampling control register.
    fn register(self) -> u16 {
        match self {
            SampleRate::Khz8 => 0x00c,
            SampleRate::Khz32 => 0x018,
            SampleRate::Khz48 => 0x000,
            SampleRate::Khz96 => 0x01c,
        }
    }

    /// Rate in Hz.
    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Khz8 => 8_000,
            SampleRate::Khz32 => 32_000,
            SampleRate::Khz48 => 48_000,
            SampleRate::Khz96 => 96_000,
        }
    }
}

/// Occupancy of the audio core FIFOs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FifoSpace {
    /// Samples available in the right read FIFO.
    pub read_right: u8,

    /// Samples available in the left read FIFO.
    pub read_left: u8,

    /// Free slots in the right write FIFO.
    pub write_right: u8,

    /// Free slots in the left write FIFO.
    pub write_left: u8,
}

impl From<u32> for FifoSpace {
    fn from(reg: u32) -> FifoSpace {
        FifoSpace {
            read_right: bits::field(reg, 0, 8) as u8,
            read_left: bits::field(reg, 8, 8) as u8,
            write_right: bits::field(reg, 16, 8) as u8,
            write_left: bits::field(reg, 24, 8) as u8,
        }
    }
}

/// Packs a register write in the two bytes sent over I2C.
fn frame(reg: u8, value: u16) -> [u8; 2] {
    [(reg << 1) | ((value >> 8) as u8 & 1), value as u8]
}

/// The WM8731 codec and its FPGA audio core.
#[derive(Debug)]
pub struct Wm8731<I: I2c> {
    /// Control bus.
    i2c: I,

    /// Driver context of the audio core.
    ctx: DriverCtx,

    /// Values written to the codec registers.
    shadow: [u16; NUM_REGS],
}

impl<I: I2c> Wm8731<I> {
    /// Resets and configures the codec for 48 kHz, 24-bit playback and line
    /// in capture, and clears the audio core FIFOs.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the audio core.
    pub unsafe fn new(i2c: I, base: usize) -> Result<Wm8731<I>> {
        let ctx = DriverCtx::claim(base, AUDIO_SIZE)?;
        let mut codec = Wm8731 {
            i2c,
            ctx,
            shadow: RESET_VALUES,
        };

        codec.write_register(REG_RESET, 0)?;
        for &(reg, value) in INIT_SEQUENCE {
            codec.write_register(reg, value)?;
        }
        codec.clear_fifos();

        Ok(codec)
    }

    /// Writes a codec register. Writing [`REG_RESET`] restores the reset
    /// values.
    pub fn write_register(&mut self, reg: u8, value: u16) -> Result<()> {
        if value > 0x1ff {
            return Err(Error::InvalidArg);
        }
        let idx = reg as usize;
        if idx >= NUM_REGS && reg != REG_RESET {
            return Err(Error::InvalidArg);
        }

        self.i2c
            .write(I2C_ADDRESS, &frame(reg, value))
            .map_err(|err| Error::from_i2c_kind(err.kind()))?;

        if reg == REG_RESET {
            self.shadow = RESET_VALUES;
        } else {
            self.shadow[idx] = value;
        }
        Ok(())
    }

    /// Returns the last value written to a codec register.
    pub fn register(&self, reg: u8) -> Result<u16> {
        if reg > REG_RESET {
            return Err(Error::BeyondEnd(reg as usize));
        }
        self.shadow
            .get(reg as usize)
            .copied()
            .ok_or(Error::NoSupport)
    }

    /// Discards the samples in every FIFO.
    pub fn clear_fifos(&mut self) {
        let regs = self.ctx.regs();
        regs.set_bits(AUDIO_CONTROL, CONTROL_CR | CONTROL_CW);
        regs.clear_bits(AUDIO_CONTROL, CONTROL_CR | CONTROL_CW);
    }

    /// Returns the occupancy of the FIFOs.
    pub fn fifo_space(&self) -> FifoSpace {
        FifoSpace::from(self.ctx.regs().read(AUDIO_FIFOSPACE))
    }

    /// Queues one stereo sample for playback.
    pub fn write_sample(&mut self, left: i32, right: i32) -> nb::Result<(), Error> {
        let space = self.fifo_space();
        if space.write_left == 0 || space.write_right == 0 {
            return Err(nb::Error::WouldBlock);
        }

        let regs = self.ctx.regs();
        regs.write(AUDIO_LEFTDATA, left as u32);
        regs.write(AUDIO_RIGHTDATA, right as u32);
        Ok(())
    }

    /// Takes one captured stereo sample.
    pub fn read_sample(&mut self) -> nb::Result<(i32, i32), Error> {
        let space = self.fifo_space();
        if space.read_left == 0 || space.read_right == 0 {
            return Err(nb::Error::WouldBlock);
        }

        let regs = self.ctx.regs();
        let left = regs.read(AUDIO_LEFTDATA) as i32;
        let right = regs.read(AUDIO_RIGHTDATA) as i32;
        Ok((left, right))
    }

    /// Sets the headphone volume of both channels in dB, between
    /// [`HP_VOLUME_MIN_DB`] and [`HP_VOLUME_MAX_DB`]. Lower values mute the
    /// output.
    pub fn set_headphone_volume(&mut self, db: i32) -> Result<()> {
        if db > HP_VOLUME_MAX_DB {
            return Err(Error::InvalidArg);
        }
        let volume = if db < HP_VOLUME_MIN_DB {
            0
        } else {
            (HP_VOLUME_0DB + db) as u16
        };

        for reg in [REG_LEFT_HP_OUT, REG_RIGHT_HP_OUT] {
            let value = (self.shadow[reg as usize] & !HP_VOLUME_MASK) | volume;
            self.write_register(reg, value)?;
        }
        Ok(())
    }

    /// Mutes or unmutes the DAC.
    pub fn set_dac_mute(&mut self, mute: bool) -> Result<()> {
        let current = self.shadow[REG_DIGITAL_PATH as usize];
        let value = if mute {
            current | DIGITAL_PATH_DACMU
        } else {
            current & !DIGITAL_PATH_DACMU
        };
        self.write_register(REG_DIGITAL_PATH, value)
    }

    /// Changes the sample rate. The digital interface is deactivated while
    /// the rate changes and the FIFOs are cleared.
    pub fn set_sample_rate(&mut self, rate: SampleRate) -> Result<()> {
        self.write_register(REG_ACTIVE, 0)?;
        self.write_register(REG_SAMPLING, rate.register())?;
        self.write_register(REG_ACTIVE, 1)?;
        self.clear_fifos();
        Ok(())
    }

    /// Releases the I2C bus.
    pub fn release(self) -> I {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    use super::*;
    use crate::testing::RegBlock;

    /// I2C bus recording every write.
    #[derive(Debug, Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
        nack: bool,
    }

    impl ErrorType for RecordingBus {
        type Error = ErrorKind;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> core::result::Result<(), ErrorKind> {
            if self.nack {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    fn codec(block: &RegBlock) -> Wm8731<RecordingBus> {
        unsafe { Wm8731::new(RecordingBus::default(), block.base()) }.unwrap()
    }

    #[test]
    fn init_sequence() {
        let block = RegBlock::new(4);
        let codec = codec(&block);

        assert_eq!(codec.register(REG_INTERFACE), Ok(0x04a));
        assert_eq!(codec.register(REG_ACTIVE), Ok(0x001));
        assert_eq!(codec.register(REG_RESET), Err(Error::NoSupport));
        assert_eq!(codec.register(0x10), Err(Error::BeyondEnd(0x10)));
        assert_eq!(block.read(AUDIO_CONTROL), 0);

        let bus = codec.release();
        assert_eq!(bus.writes.len(), 11);
        assert_eq!(bus.writes[0], (I2C_ADDRESS, vec![0x1e, 0x00]));
        assert_eq!(bus.writes[1], (I2C_ADDRESS, vec![0x0c, 0x00]));
        assert_eq!(bus.writes[4], (I2C_ADDRESS, vec![0x04, 0x79]));
        assert_eq!(bus.writes[10], (I2C_ADDRESS, vec![0x12, 0x01]));
    }

    #[test]
    fn ninth_bit_goes_with_address() {
        assert_eq!(frame(REG_POWER_DOWN, 0x19f), [0x0d, 0x9f]);
    }

    #[test]
    fn register_validation() {
        let block = RegBlock::new(4);
        let mut codec = codec(&block);

        assert_eq!(codec.write_register(0x0a, 0), Err(Error::InvalidArg));
        assert_eq!(codec.write_register(0x00, 0x200), Err(Error::InvalidArg));

        codec.write_register(REG_SAMPLING, 0x018).unwrap();
        codec.write_register(REG_RESET, 0).unwrap();
        assert_eq!(codec.register(REG_SAMPLING), Ok(0));
        assert_eq!(codec.register(REG_POWER_DOWN), Ok(0x09f));
    }

    #[test]
    fn headphone_volume() {
        let block = RegBlock::new(4);
        let mut codec = codec(&block);

        codec.set_headphone_volume(6).unwrap();
        assert_eq!(codec.register(REG_LEFT_HP_OUT), Ok(0x07f));
        codec.set_headphone_volume(-73).unwrap();
        assert_eq!(codec.register(REG_RIGHT_HP_OUT), Ok(0x030));
        codec.set_headphone_volume(-100).unwrap();
        assert_eq!(codec.register(REG_LEFT_HP_OUT), Ok(0x000));
        assert_eq!(codec.set_headphone_volume(7), Err(Error::InvalidArg));
    }

    #[test]
    fn mute_and_rate() {
        let block = RegBlock::new(4);
        let mut codec = codec(&block);

        codec.set_dac_mute(true).unwrap();
        assert_eq!(codec.register(REG_DIGITAL_PATH), Ok(0x008));
        codec.set_dac_mute(false).unwrap();
        assert_eq!(codec.register(REG_DIGITAL_PATH), Ok(0x000));

        codec.set_sample_rate(SampleRate::Khz32).unwrap();
        assert_eq!(codec.register(REG_SAMPLING), Ok(0x018));
        assert_eq!(codec.register(REG_ACTIVE), Ok(1));
    }

    #[test]
    fn fifo_samples() {
        let block = RegBlock::new(4);
        let mut codec = codec(&block);

        assert_eq!(codec.write_sample(1, 2), Err(nb::Error::WouldBlock));
        assert_eq!(codec.read_sample(), Err(nb::Error::WouldBlock));

        block.write(AUDIO_FIFOSPACE, 0x8080_0101);
        let space = codec.fifo_space();
        assert_eq!(space.write_left, 0x80);
        assert_eq!(space.read_right, 1);

        codec.write_sample(-1, 0x12_3456).unwrap();
        assert_eq!(block.read(AUDIO_LEFTDATA), 0xffff_ffff);
        assert_eq!(block.read(AUDIO_RIGHTDATA), 0x12_3456);
        assert_eq!(codec.read_sample(), Ok((-1, 0x12_3456)));
    }

    #[test]
    fn nack_during_init() {
        let block = RegBlock::new(4);
        let bus = RecordingBus {
            nack: true,
            ..Default::default()
        };
        let res = unsafe { Wm8731::new(bus, block.base()) };
        assert_eq!(res.unwrap_err(), Error::AckFail);
    }
}
