//! Driver for the HPS SD/MMC controller.
//!
//! The HPS uses a Synopsys DesignWare Mobile Storage Host. This driver
//! talks to SD cards (standard and high capacity) on the 4-bit bus, moving
//! data through the controller FIFO with the CPU; the internal DMA is not
//! used. For more information, please see the SD/MMC Controller chapter of
//! the [Cyclone V Hard Processor System Technical Reference Manual] and the
//! [SD Physical Layer Simplified Specification].
//!
//! [Cyclone V Hard Processor System Technical Reference Manual]: https://www.intel.com/content/www/us/en/docs/programmable/683126/current/sd-mmc-controller.html
//! [SD Physical Layer Simplified Specification]: https://www.sdcard.org/downloads/pls/

use crate::bits;
use crate::ctx::DriverCtx;
use crate::diskio::{BlockDevice, SECTOR_SIZE};
use crate::mmio::Mmio;
use crate::{Error, Result};

/// Base address of the SD/MMC controller.
pub const SDMMC_BASE: usize = 0xff70_4000;

/// Control register.
const SDMMC_CTRL: usize = 0x00;

/// Power enable register.
const SDMMC_PWREN: usize = 0x04;

/// Clock divider register.
const SDMMC_CLKDIV: usize = 0x08;

/// Clock source register.
const SDMMC_CLKSRC: usize = 0x0c;

/// Clock enable register.
const SDMMC_CLKENA: usize = 0x10;

/// Timeout register.
const SDMMC_TMOUT: usize = 0x14;

/// Card type register.
const SDMMC_CTYPE: usize = 0x18;

/// Block size register.
const SDMMC_BLKSIZ: usize = 0x1c;

/// Byte count register.
const SDMMC_BYTCNT: usize = 0x20;

/// Interrupt mask register.
const SDMMC_INTMASK: usize = 0x24;

/// Command argument register.
const SDMMC_CMDARG: usize = 0x28;

/// Command register.
const SDMMC_CMD: usize = 0x2c;

/// Response registers.
const SDMMC_RESP0: usize = 0x30;
const SDMMC_RESP1: usize = 0x34;
const SDMMC_RESP2: usize = 0x38;
const SDMMC_RESP3: usize = 0x3c;

/// Raw interrupt status register. Write 1 to clear.
const SDMMC_RINTSTS: usize = 0x44;

/// Status register.
const SDMMC_STATUS: usize = 0x48;

/// Card detect register.
const SDMMC_CDETECT: usize = 0x50;

/// Write protect register.
const SDMMC_WRTPRT: usize = 0x54;

/// Data FIFO.
const SDMMC_DATA: usize = 0x200;

/// Size of the register block.
const SDMMC_SIZE: usize = 0x400;

/// CTRL: controller, FIFO and DMA resets.
const CTRL_RESET_ALL: u32 = bits::mask(3);

/// CMD fields.
const CMD_INDEX_WIDTH: u32 = 6;
const CMD_RESPONSE_EXPECT: u32 = bits::bit(6);
const CMD_RESPONSE_LONG: u32 = bits::bit(7);
const CMD_CHECK_CRC: u32 = bits::bit(8);
const CMD_DATA_EXPECTED: u32 = bits::bit(9);
const CMD_WRITE: u32 = bits::bit(10);
const CMD_AUTO_STOP: u32 = bits::bit(12);
const CMD_WAIT_PRVDATA: u32 = bits::bit(13);
const CMD_SEND_INIT: u32 = bits::bit(15);
const CMD_UPDATE_CLOCK: u32 = bits::bit(21);
const CMD_USE_HOLD_REG: u32 = bits::bit(29);
const CMD_START: u32 = bits::bit(31);

/// RINTSTS bits.
const INT_RE: u32 = bits::bit(1);
const INT_CD: u32 = bits::bit(2);
const INT_DTO: u32 = bits::bit(3);
const INT_RCRC: u32 = bits::bit(6);
const INT_DCRC: u32 = bits::bit(7);
const INT_RTO: u32 = bits::bit(8);
const INT_DRTO: u32 = bits::bit(9);
const INT_HTO: u32 = bits::bit(10);
const INT_FRUN: u32 = bits::bit(11);
const INT_HLE: u32 = bits::bit(12);
const INT_SBE: u32 = bits::bit(13);
const INT_ACD: u32 = bits::bit(14);
const INT_EBE: u32 = bits::bit(15);

/// RINTSTS: data path errors.
const INT_DATA_ERRORS: u32 = INT_DCRC | INT_DRTO | INT_HTO | INT_FRUN | INT_SBE | INT_EBE;

/// STATUS bits.
const STATUS_FIFO_EMPTY: u32 = bits::bit(2);
const STATUS_FIFO_FULL: u32 = bits::bit(3);
const STATUS_DATA_BUSY: u32 = bits::bit(9);

/// Card status (R1) error bits.
const R1_ERRORS: u32 = 0xfdf9_0008;

/// OCR: card power up done.
const OCR_BUSY: u32 = bits::bit(31);

/// OCR: card capacity status / host capacity support.
const OCR_CCS: u32 = bits::bit(30);

/// OCR: 2.7 V to 3.6 V.
const OCR_VOLTAGE_WINDOW: u32 = 0x00ff_8000;

/// CMD8 argument: 2.7-3.6 V and check pattern.
const IF_COND: u32 = 0x1aa;

/// Register reads before a wait gives up.
const POLLS: u32 = 1_000_000;

/// ACMD41 attempts before giving up on a card that stays busy.
const ACMD41_TRIES: u32 = 5000;

/// Identification clock.
const IDENT_CLOCK_HZ: u32 = 400_000;

/// Data transfer clock (default speed).
const DATA_CLOCK_HZ: u32 = 25_000_000;

/// Default controller input clock (cclk_in).
pub const DEFAULT_CLOCK_HZ: u32 = 50_000_000;

/// Response type of a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Resp {
    None,
    R1,
    R1b,
    R2,
    R3,
    R6,
    R7,
}

impl Resp {
    fn flags(self) -> u32 {
        match self {
            Resp::None => 0,
            Resp::R2 => CMD_RESPONSE_EXPECT | CMD_RESPONSE_LONG | CMD_CHECK_CRC,
            Resp::R3 => CMD_RESPONSE_EXPECT,
            Resp::R1 | Resp::R1b | Resp::R6 | Resp::R7 => CMD_RESPONSE_EXPECT | CMD_CHECK_CRC,
        }
    }
}

/// Data phase of a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Transfer {
    Read { multi: bool },
    Write { multi: bool },
}

/// Returns the value of the command register starting command `index`.
fn command_word(index: u8, resp: Resp, transfer: Option<Transfer>) -> u32 {
    let mut cmd = CMD_START | CMD_USE_HOLD_REG | CMD_WAIT_PRVDATA | resp.flags();
    cmd = bits::insert(cmd, index as u32, 0, CMD_INDEX_WIDTH);
    if index == 0 {
        cmd |= CMD_SEND_INIT;
    }
    match transfer {
        Some(Transfer::Read { multi }) => {
            cmd |= CMD_DATA_EXPECTED;
            if multi {
                cmd |= CMD_AUTO_STOP;
            }
        }
        Some(Transfer::Write { multi }) => {
            cmd |= CMD_DATA_EXPECTED | CMD_WRITE;
            if multi {
                cmd |= CMD_AUTO_STOP;
            }
        }
        None => {}
    }
    cmd
}

/// Returns the CLKDIV value giving at most `target_hz` from `input_hz`.
/// The card clock is `input_hz / (2 * div)`, or `input_hz` for 0.
pub fn clock_divider(input_hz: u32, target_hz: u32) -> u32 {
    if target_hz == 0 {
        return 0xff;
    }
    if target_hz >= input_hz {
        return 0;
    }
    input_hz.div_ceil(2 * target_hz).min(0xff)
}

/// Extracts bits `[start + width - 1:start]` of a 128-bit register stored
/// as four words, least significant first.
fn csd_field(csd: &[u32; 4], start: u32, width: u32) -> u32 {
    let reg = csd
        .iter()
        .rev()
        .fold(0u128, |acc, &word| (acc << 32) | word as u128);
    ((reg >> start) as u32) & bits::mask(width)
}

/// Returns the capacity in 512-byte blocks described by a CSD register.
pub fn csd_capacity_blocks(csd: &[u32; 4]) -> Result<u32> {
    match csd_field(csd, 126, 2) {
        0 => {
            let c_size = csd_field(csd, 62, 12) as u64;
            let c_size_mult = csd_field(csd, 47, 3);
            let read_bl_len = csd_field(csd, 80, 4);
            let bytes = (c_size + 1) << (c_size_mult + 2 + read_bl_len);
            u32::try_from(bytes / SECTOR_SIZE as u64).map_err(|_| Error::TooBig)
        }
        1 => {
            let c_size = csd_field(csd, 48, 22) as u64;
            u32::try_from((c_size + 1) * 1024).map_err(|_| Error::TooBig)
        }
        _ => Err(Error::NoSupport),
    }
}

/// An identified card.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CardInfo {
    /// Relative card address.
    pub rca: u16,

    /// The card follows version 2.00 or later of the specification.
    pub version2: bool,

    /// The card is addressed by block instead of by byte.
    pub high_capacity: bool,

    /// Capacity in blocks.
    pub blocks: u32,
}

/// An SD card behind the HPS SD/MMC controller.
#[derive(Debug)]
pub struct SdCard {
    /// Driver context.
    ctx: DriverCtx,

    /// Frequency of the controller input clock in Hz.
    clock_hz: u32,

    /// The card, once identified.
    card: Option<CardInfo>,
}

/// Spins until `f` returns true, reading at most [`POLLS`] times.
fn poll<F>(regs: &Mmio, mut f: F) -> Result<()>
where
    F: FnMut(&Mmio) -> Result<bool>,
{
    for _ in 0..POLLS {
        if f(regs)? {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(Error::Timeout)
}

/// Fails if a data path error has been raised.
fn check_data_errors(ints: u32) -> Result<()> {
    if ints & INT_DATA_ERRORS == 0 {
        return Ok(());
    }
    if ints & (INT_DRTO | INT_HTO) != 0 {
        Err(Error::Timeout)
    } else {
        Err(Error::IoFail)
    }
}

/// Host controller operations used to identify a card.
trait Host {
    /// Powers the card and resets the controller.
    fn reset(&mut self) -> Result<()>;

    /// Sets the card clock to at most `hz`.
    fn set_clock(&mut self, hz: u32) -> Result<()>;

    /// Selects the 4-bit or the 1-bit data bus.
    fn set_wide_bus(&mut self, wide: bool);

    /// Sends a command and returns its response.
    fn command(
        &mut self,
        index: u8,
        arg: u32,
        resp: Resp,
        transfer: Option<Transfer>,
    ) -> Result<[u32; 4]>;

    /// Sends an application specific command.
    fn app_command(&mut self, rca: u16, index: u8, arg: u32, resp: Resp) -> Result<[u32; 4]> {
        self.command(55, (rca as u32) << 16, Resp::R1, None)?;
        self.command(index, arg, resp, None)
    }
}

/// Resets the controller and identifies the card, leaving it selected on
/// the 4-bit bus at the data transfer clock.
fn identify<H: Host>(host: &mut H) -> Result<CardInfo> {
    host.reset()?;
    host.set_clock(IDENT_CLOCK_HZ)?;

    // GO_IDLE_STATE.
    host.command(0, 0, Resp::None, None)?;

    // SEND_IF_COND. Version 1 cards do not answer.
    let version2 = match host.command(8, IF_COND, Resp::R7, None) {
        Ok(resp) if resp[0] & 0xfff == IF_COND => true,
        Ok(_) => return Err(Error::NoSupport),
        Err(Error::Timeout) => false,
        Err(err) => return Err(err),
    };

    // SD_SEND_OP_COND until the card leaves the busy state.
    let hcs = if version2 { OCR_CCS } else { 0 };
    let mut ocr = 0;
    for _ in 0..ACMD41_TRIES {
        ocr = host.app_command(0, 41, hcs | OCR_VOLTAGE_WINDOW, Resp::R3)?[0];
        if ocr & OCR_BUSY != 0 {
            break;
        }
    }
    if ocr & OCR_BUSY == 0 {
        return Err(Error::Timeout);
    }
    let high_capacity = ocr & OCR_CCS != 0;

    // ALL_SEND_CID, SEND_RELATIVE_ADDR.
    host.command(2, 0, Resp::R2, None)?;
    let rca = (host.command(3, 0, Resp::R6, None)?[0] >> 16) as u16;

    // SEND_CSD.
    let csd = host.command(9, (rca as u32) << 16, Resp::R2, None)?;
    let blocks = csd_capacity_blocks(&csd)?;

    // SELECT_CARD.
    host.command(7, (rca as u32) << 16, Resp::R1b, None)?;

    // SET_BLOCKLEN on byte addressed cards.
    if !high_capacity {
        host.command(16, SECTOR_SIZE as u32, Resp::R1, None)?;
    }

    // SET_BUS_WIDTH: 4 bits.
    host.app_command(rca, 6, 2, Resp::R1)?;
    host.set_wide_bus(true);

    host.set_clock(DATA_CLOCK_HZ)?;

    Ok(CardInfo {
        rca,
        version2,
        high_capacity,
        blocks,
    })
}

impl SdCard {
    /// Binds the controller at `base`, fed with a `clock_hz` input clock.
    /// The card is brought up by [`BlockDevice::initialise`].
    ///
    /// # Safety
    ///
    /// `base` must be the address of a DesignWare SD/MMC controller.
    pub unsafe fn new(base: usize, clock_hz: u32) -> Result<SdCard> {
        if clock_hz == 0 {
            return Err(Error::InvalidArg);
        }
        let ctx = DriverCtx::claim(base, SDMMC_SIZE)?;
        Ok(SdCard {
            ctx,
            clock_hz,
            card: None,
        })
    }

    /// Returns the identified card.
    pub fn card(&self) -> Option<&CardInfo> {
        self.card.as_ref()
    }

    /// Waits until the controller has loaded new clock settings.
    fn update_clock(&self) -> Result<()> {
        let regs = self.ctx.regs();
        regs.write(SDMMC_CMD, CMD_START | CMD_UPDATE_CLOCK | CMD_WAIT_PRVDATA);
        regs.wait_for(SDMMC_CMD, CMD_START, 0, POLLS)?;
        Ok(())
    }

    /// Validates a transfer of `len` bytes from block `lba` and returns the
    /// command argument and the number of blocks.
    fn prepare(&self, lba: u32, len: usize) -> Result<(u32, u32)> {
        let card = self.card.ok_or(Error::NoInit)?;
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(Error::InvalidArg);
        }
        let count = (len / SECTOR_SIZE) as u32;
        if lba as u64 + count as u64 > card.blocks as u64 {
            return Err(Error::BeyondEnd(lba as usize));
        }

        let arg = if card.high_capacity {
            lba
        } else {
            lba * SECTOR_SIZE as u32
        };
        let regs = self.ctx.regs();
        regs.write(SDMMC_BLKSIZ, SECTOR_SIZE as u32);
        regs.write(SDMMC_BYTCNT, len as u32);
        Ok((arg, count))
    }

    /// Waits for the end of the data phase.
    fn finish_data(&self, multi: bool) -> Result<()> {
        let regs = self.ctx.regs();
        let done = if multi { INT_DTO | INT_ACD } else { INT_DTO };
        poll(regs, |r| {
            let ints = r.read(SDMMC_RINTSTS);
            check_data_errors(ints)?;
            Ok(ints & done == done)
        })?;
        regs.write(SDMMC_RINTSTS, done);
        Ok(())
    }

    /// Reads `buf.len() / 512` blocks starting at `lba`.
    pub fn read(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let (arg, count) = self.prepare(lba, buf.len())?;
        let multi = count > 1;
        let index = if multi { 18 } else { 17 };
        self.command(index, arg, Resp::R1, Some(Transfer::Read { multi }))?;

        let regs = self.ctx.regs();
        for word in buf.chunks_exact_mut(4) {
            poll(regs, |r| {
                check_data_errors(r.read(SDMMC_RINTSTS))?;
                Ok(r.read(SDMMC_STATUS) & STATUS_FIFO_EMPTY == 0)
            })?;
            word.copy_from_slice(&regs.read(SDMMC_DATA).to_le_bytes());
        }

        self.finish_data(multi)
    }

    /// Writes `buf.len() / 512` blocks starting at `lba`.
    pub fn write(&mut self, lba: u32, buf: &[u8]) -> Result<()> {
        if self.is_write_protected() {
            return Err(Error::NoSupport);
        }
        let (arg, count) = self.prepare(lba, buf.len())?;
        let multi = count > 1;
        let index = if multi { 25 } else { 24 };
        self.command(index, arg, Resp::R1, Some(Transfer::Write { multi }))?;

        let regs = self.ctx.regs();
        for word in buf.chunks_exact(4) {
            poll(regs, |r| {
                check_data_errors(r.read(SDMMC_RINTSTS))?;
                Ok(r.read(SDMMC_STATUS) & STATUS_FIFO_FULL == 0)
            })?;
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            regs.write(SDMMC_DATA, value);
        }

        self.finish_data(multi)?;
        poll(regs, |r| Ok(r.read(SDMMC_STATUS) & STATUS_DATA_BUSY == 0))
    }
}

impl Host for SdCard {
    fn reset(&mut self) -> Result<()> {
        let regs = self.ctx.regs();
        regs.write(SDMMC_PWREN, 1);
        regs.set_bits(SDMMC_CTRL, CTRL_RESET_ALL);
        regs.wait_for(SDMMC_CTRL, CTRL_RESET_ALL, 0, POLLS)?;
        regs.write(SDMMC_RINTSTS, u32::MAX);
        regs.write(SDMMC_INTMASK, 0);
        regs.write(SDMMC_TMOUT, u32::MAX);
        regs.write(SDMMC_CTYPE, 0);
        Ok(())
    }

    fn set_clock(&mut self, hz: u32) -> Result<()> {
        let regs = self.ctx.regs();
        regs.write(SDMMC_CLKENA, 0);
        self.update_clock()?;
        regs.write(SDMMC_CLKDIV, clock_divider(self.clock_hz, hz));
        regs.write(SDMMC_CLKSRC, 0);
        self.update_clock()?;
        regs.write(SDMMC_CLKENA, 1);
        self.update_clock()
    }

    fn set_wide_bus(&mut self, wide: bool) {
        self.ctx.regs().write(SDMMC_CTYPE, wide as u32);
    }

    fn command(
        &mut self,
        index: u8,
        arg: u32,
        resp: Resp,
        transfer: Option<Transfer>,
    ) -> Result<[u32; 4]> {
        let regs = self.ctx.regs();
        // Acknowledge whatever the previous command left behind.
        regs.write(SDMMC_RINTSTS, regs.read(SDMMC_RINTSTS));
        regs.write(SDMMC_CMDARG, arg);
        regs.write(SDMMC_CMD, command_word(index, resp, transfer));

        let mut ints = 0;
        poll(regs, |r| {
            ints = r.read(SDMMC_RINTSTS);
            Ok(ints & INT_CD != 0)
        })?;

        if ints & INT_RTO != 0 {
            return Err(Error::Timeout);
        }
        if ints & INT_HLE != 0 {
            return Err(Error::Busy);
        }
        if ints & INT_RE != 0 || (resp.flags() & CMD_CHECK_CRC != 0 && ints & INT_RCRC != 0) {
            return Err(Error::IoFail);
        }

        let response = [
            regs.read(SDMMC_RESP0),
            regs.read(SDMMC_RESP1),
            regs.read(SDMMC_RESP2),
            regs.read(SDMMC_RESP3),
        ];

        if matches!(resp, Resp::R1 | Resp::R1b) && response[0] & R1_ERRORS != 0 {
            return Err(Error::IoFail);
        }
        if resp == Resp::R1b {
            poll(regs, |r| Ok(r.read(SDMMC_STATUS) & STATUS_DATA_BUSY == 0))?;
        }

        Ok(response)
    }
}

impl BlockDevice for SdCard {
    fn initialise(&mut self) -> Result<()> {
        if !self.is_present() {
            return Err(Error::NotReady);
        }
        self.card = None;
        let card = identify(self)?;
        self.ctx.regs().write(SDMMC_BLKSIZ, SECTOR_SIZE as u32);
        self.card = Some(card);
        Ok(())
    }

    fn is_present(&self) -> bool {
        self.ctx.regs().read(SDMMC_CDETECT) & 1 == 0
    }

    fn is_write_protected(&self) -> bool {
        self.ctx.regs().read(SDMMC_WRTPRT) & 1 != 0
    }

    fn num_blocks(&self) -> u32 {
        self.card.map_or(0, |card| card.blocks)
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
        self.read(lba, buf)
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<()> {
        self.write(lba, buf)
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::testing::RegBlock;

    /// A card answering the identification sequence.
    struct ScriptedCard {
        version2: bool,
        high_capacity: bool,
        busy_replies: u32,
        rca: u16,
        csd: [u32; 4],
        commands: Vec<(u8, u32)>,
        clocks: Vec<u32>,
        wide: bool,
    }

    impl ScriptedCard {
        fn new(version2: bool, high_capacity: bool, csd: [u32; 4]) -> ScriptedCard {
            ScriptedCard {
                version2,
                high_capacity,
                busy_replies: 2,
                rca: 0xb368,
                csd,
                commands: Vec::new(),
                clocks: Vec::new(),
                wide: false,
            }
        }

        fn indexes(&self) -> Vec<u8> {
            self.commands.iter().map(|&(index, _)| index).collect()
        }

        fn arg(&self, index: u8) -> Option<u32> {
            self.commands
                .iter()
                .rev()
                .find(|&&(i, _)| i == index)
                .map(|&(_, arg)| arg)
        }
    }

    impl Host for ScriptedCard {
        fn reset(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_clock(&mut self, hz: u32) -> Result<()> {
            self.clocks.push(hz);
            Ok(())
        }

        fn set_wide_bus(&mut self, wide: bool) {
            self.wide = wide;
        }

        fn command(
            &mut self,
            index: u8,
            arg: u32,
            _resp: Resp,
            _transfer: Option<Transfer>,
        ) -> Result<[u32; 4]> {
            self.commands.push((index, arg));
            let word = match index {
                8 if !self.version2 => return Err(Error::Timeout),
                8 => arg & 0xfff,
                41 if self.busy_replies > 0 => {
                    self.busy_replies -= 1;
                    OCR_VOLTAGE_WINDOW
                }
                41 => {
                    let ccs = if self.high_capacity { arg & OCR_CCS } else { 0 };
                    OCR_BUSY | ccs | OCR_VOLTAGE_WINDOW
                }
                3 => (self.rca as u32) << 16,
                9 => return Ok(self.csd),
                _ => 0,
            };
            Ok([word, 0, 0, 0])
        }
    }

    const CSD_V2: u128 = (1u128 << 126) | (0x3b37u128 << 48);
    const CSD_V1: u128 = (0xf1fu128 << 62) | (7u128 << 47) | (9u128 << 80);

    fn words(reg: u128) -> [u32; 4] {
        [
            reg as u32,
            (reg >> 32) as u32,
            (reg >> 64) as u32,
            (reg >> 96) as u32,
        ]
    }

    fn sd(block: &RegBlock, card: Option<CardInfo>) -> SdCard {
        let mut sd = unsafe { SdCard::new(block.base(), DEFAULT_CLOCK_HZ) }.unwrap();
        sd.card = card;
        sd
    }

    const SDHC: CardInfo = CardInfo {
        rca: 0x1234,
        version2: true,
        high_capacity: true,
        blocks: 1024,
    };

    #[test]
    fn identify_high_capacity_card() {
        let mut card = ScriptedCard::new(true, true, words(CSD_V2));
        let info = identify(&mut card).unwrap();

        assert_eq!(
            info,
            CardInfo {
                rca: 0xb368,
                version2: true,
                high_capacity: true,
                blocks: 15_523_840,
            }
        );
        // Three ACMD41 rounds, no SET_BLOCKLEN.
        assert_eq!(
            card.indexes(),
            [0, 8, 55, 41, 55, 41, 55, 41, 2, 3, 9, 7, 55, 6]
        );
        assert_eq!(card.arg(8), Some(IF_COND));
        assert_eq!(card.arg(41), Some(OCR_CCS | OCR_VOLTAGE_WINDOW));
        assert_eq!(card.arg(9), Some(0xb368u32 << 16));
        assert_eq!(card.arg(7), Some(0xb368u32 << 16));
        assert_eq!(card.arg(55), Some(0xb368u32 << 16));
        assert_eq!(card.arg(6), Some(2));
        assert_eq!(card.clocks, [IDENT_CLOCK_HZ, DATA_CLOCK_HZ]);
        assert!(card.wide);
    }

    #[test]
    fn identify_version1_card() {
        let mut card = ScriptedCard::new(false, false, words(CSD_V1));
        card.busy_replies = 0;
        let info = identify(&mut card).unwrap();

        assert!(!info.version2);
        assert!(!info.high_capacity);
        assert_eq!(info.blocks, 1_982_464);
        assert_eq!(
            card.indexes(),
            [0, 8, 55, 41, 2, 3, 9, 7, 16, 55, 6]
        );
        // No HCS without SEND_IF_COND.
        assert_eq!(card.arg(41), Some(OCR_VOLTAGE_WINDOW));
        assert_eq!(card.arg(16), Some(512));
    }

    #[test]
    fn identify_standard_capacity_version2_card() {
        let mut card = ScriptedCard::new(true, false, words(CSD_V1));
        let info = identify(&mut card).unwrap();
        assert!(info.version2);
        assert!(!info.high_capacity);
        assert_eq!(card.arg(16), Some(512));
    }

    #[test]
    fn identify_failures() {
        let mut card = ScriptedCard::new(true, true, words(CSD_V2));
        card.busy_replies = u32::MAX;
        assert_eq!(identify(&mut card), Err(Error::Timeout));
        assert_eq!(card.clocks, [IDENT_CLOCK_HZ]);
        assert_eq!(card.indexes().len(), 2 + 2 * ACMD41_TRIES as usize);

        let mut card = ScriptedCard::new(true, true, words(3u128 << 126));
        assert_eq!(identify(&mut card), Err(Error::NoSupport));
        assert!(!card.wide);
    }

    #[test]
    fn csd_v2_capacity() {
        let csd = words(CSD_V2);
        assert_eq!(csd_capacity_blocks(&csd), Ok(15_523_840));
    }

    #[test]
    fn csd_v1_capacity() {
        let csd = words(CSD_V1);
        assert_eq!(csd_capacity_blocks(&csd), Ok(1_982_464));
    }

    #[test]
    fn csd_unknown_structure() {
        let csd = words(3u128 << 126);
        assert_eq!(csd_capacity_blocks(&csd), Err(Error::NoSupport));
    }

    #[test]
    fn clock_dividers() {
        assert_eq!(clock_divider(50_000_000, 400_000), 63);
        assert_eq!(clock_divider(50_000_000, 25_000_000), 1);
        assert_eq!(clock_divider(50_000_000, 50_000_000), 0);
        assert_eq!(clock_divider(200_000_000, 100_000), 0xff);
    }

    #[test]
    fn command_words() {
        assert_eq!(
            command_word(0, Resp::None, None),
            CMD_START | CMD_USE_HOLD_REG | CMD_WAIT_PRVDATA | CMD_SEND_INIT
        );
        assert_eq!(command_word(41, Resp::R3, None) & 0x1ff, 41 | CMD_RESPONSE_EXPECT);
        assert_eq!(
            command_word(25, Resp::R1, Some(Transfer::Write { multi: true })) & 0x1fff,
            25 | CMD_RESPONSE_EXPECT
                | CMD_CHECK_CRC
                | CMD_DATA_EXPECTED
                | CMD_WRITE
                | CMD_AUTO_STOP
        );
        assert_eq!(
            command_word(9, Resp::R2, None) & 0x1ff,
            9 | CMD_RESPONSE_EXPECT | CMD_RESPONSE_LONG | CMD_CHECK_CRC
        );
    }

    #[test]
    fn card_detect_and_protect() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let mut sd = sd(&block, None);

        block.write(SDMMC_CDETECT, 1);
        assert!(!sd.is_present());
        assert_eq!(sd.initialise(), Err(Error::NotReady));

        block.write(SDMMC_CDETECT, 0);
        block.write(SDMMC_WRTPRT, 1);
        assert!(sd.is_present());
        assert!(sd.is_write_protected());
    }

    #[test]
    fn stuck_controller_times_out() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let mut sd = sd(&block, None);
        // The reset bits never clear in RAM.
        assert_eq!(sd.initialise(), Err(Error::Timeout));
        assert_eq!(sd.card(), None);
        assert_eq!(sd.num_blocks(), 0);
    }

    #[test]
    fn transfers_need_a_card() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let mut sd = sd(&block, None);
        let mut buf = [0u8; SECTOR_SIZE];
        assert_eq!(sd.read(0, &mut buf), Err(Error::NoInit));
    }

    #[test]
    fn single_block_read() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let mut sd = sd(&block, Some(SDHC));
        block.write(SDMMC_RINTSTS, INT_CD | INT_DTO);
        block.write(SDMMC_DATA, 0x4433_2211);

        let mut buf = [0u8; SECTOR_SIZE];
        sd.read(10, &mut buf).unwrap();

        assert_eq!(&buf[..8], &[0x11, 0x22, 0x33, 0x44, 0x11, 0x22, 0x33, 0x44]);
        assert_eq!(block.read(SDMMC_CMDARG), 10);
        assert_eq!(block.read(SDMMC_BYTCNT), 512);
        assert_eq!(
            block.read(SDMMC_CMD),
            command_word(17, Resp::R1, Some(Transfer::Read { multi: false }))
        );
    }

    #[test]
    fn multi_block_write_byte_addressed() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let card = CardInfo {
            high_capacity: false,
            ..SDHC
        };
        let mut sd = sd(&block, Some(card));
        block.write(SDMMC_RINTSTS, INT_CD | INT_DTO | INT_ACD);

        let mut buf = [0u8; 2 * SECTOR_SIZE];
        buf[1020..].copy_from_slice(&[1, 2, 3, 4]);
        sd.write(3, &buf).unwrap();

        assert_eq!(block.read(SDMMC_CMDARG), 3 * 512);
        assert_eq!(block.read(SDMMC_DATA), 0x0403_0201);
        assert_eq!(block.read(SDMMC_CMD) & 0x3f, 25);
    }

    #[test]
    fn transfer_errors() {
        let block = RegBlock::new(SDMMC_SIZE / 4);
        let mut sd = sd(&block, Some(SDHC));
        let mut buf = [0u8; SECTOR_SIZE];

        block.write(SDMMC_RINTSTS, INT_CD | INT_RTO);
        assert_eq!(sd.read(0, &mut buf), Err(Error::Timeout));

        block.write(SDMMC_RINTSTS, INT_CD | INT_DCRC);
        assert_eq!(sd.read(0, &mut buf), Err(Error::IoFail));

        block.write(SDMMC_RINTSTS, INT_CD);
        block.write(SDMMC_RESP0, 1 << 31);
        assert_eq!(sd.read(0, &mut buf), Err(Error::IoFail));

        block.write(SDMMC_RESP0, 0);
        assert_eq!(sd.read(1024, &mut buf), Err(Error::BeyondEnd(1024)));
        assert_eq!(sd.read(0, &mut buf[..100]), Err(Error::InvalidArg));

        block.write(SDMMC_WRTPRT, 1);
        assert_eq!(sd.write(0, &buf), Err(Error::NoSupport));
    }
}
