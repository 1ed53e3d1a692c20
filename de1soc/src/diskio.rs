//! Disk I/O layer for the FatFS file system library.
//!
//! FatFS reaches storage through a handful of C functions (`disk_read`,
//! `disk_write`, ...) taking a physical drive number. This module exports
//! them and forwards each call to the [`BlockDevice`] registered for the
//! drive, e.g. an [`crate::sdmmc::SdCard`].
//!
//! [`DiskIo`] adds the checks FatFS expects from the glue layer: buffer and
//! range validation, status bits, write protection and optional read-back
//! verification of every written sector.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::{Error, Result};

/// Sector size in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Number of physical drives accepted by the C interface.
pub const MAX_DRIVES: usize = 2;

/// A storage device made of [`SECTOR_SIZE`]-byte blocks.
pub trait BlockDevice {
    /// Brings the device up.
    fn initialise(&mut self) -> Result<()>;

    /// Returns true if the medium is present.
    fn is_present(&self) -> bool;

    /// Returns true if the medium is write protected.
    fn is_write_protected(&self) -> bool;

    /// Returns the number of blocks of the medium.
    fn num_blocks(&self) -> u32;

    /// Reads `buf.len() / SECTOR_SIZE` blocks starting at `lba`.
    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf.len() / SECTOR_SIZE` blocks starting at `lba`.
    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<()>;

    /// Completes pending writes.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns the erase block size in sectors.
    fn erase_block_size(&self) -> u32 {
        1
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn initialise(&mut self) -> Result<()> {
        (**self).initialise()
    }

    fn is_present(&self) -> bool {
        (**self).is_present()
    }

    fn is_write_protected(&self) -> bool {
        (**self).is_write_protected()
    }

    fn num_blocks(&self) -> u32 {
        (**self).num_blocks()
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_blocks(lba, buf)
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<()> {
        (**self).write_blocks(lba, buf)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn erase_block_size(&self) -> u32 {
        (**self).erase_block_size()
    }
}

/// FatFS drive status bits (`DSTATUS`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiskStatus(u8);

impl DiskStatus {
    /// The drive has not been initialized.
    pub const NOINIT: DiskStatus = DiskStatus(0x01);

    /// There is no medium in the drive.
    pub const NODISK: DiskStatus = DiskStatus(0x02);

    /// The medium is write protected.
    pub const PROTECT: DiskStatus = DiskStatus(0x04);

    /// Status of a ready drive.
    pub const READY: DiskStatus = DiskStatus(0);

    /// Returns the raw status bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub fn contains(self, other: DiskStatus) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for DiskStatus {
    type Output = DiskStatus;

    fn bitor(self, rhs: DiskStatus) -> DiskStatus {
        DiskStatus(self.0 | rhs.0)
    }
}

/// FatFS failure results (`DRESULT`). Success is `Ok(())`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum DiskError {
    /// Hard error during the operation.
    Error = 1,

    /// The medium is write protected.
    WriteProtected = 2,

    /// The drive is not ready.
    NotReady = 3,

    /// Invalid parameter.
    InvalidParameter = 4,
}

impl From<Error> for DiskError {
    fn from(err: Error) -> DiskError {
        match err {
            Error::NotReady | Error::NoInit => DiskError::NotReady,
            Error::InvalidArg | Error::BeyondEnd(_) | Error::Alignment => {
                DiskError::InvalidParameter
            }
            _ => DiskError::Error,
        }
    }
}

/// Returns the `DRESULT` code of a result.
fn dresult(res: core::result::Result<(), DiskError>) -> u32 {
    match res {
        Ok(()) => 0,
        Err(err) => err as u32,
    }
}

/// Control commands (`disk_ioctl`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ioctl {
    /// Flush pending writes.
    Sync,

    /// Number of sectors of the medium.
    GetSectorCount,

    /// Sector size in bytes.
    GetSectorSize,

    /// Erase block size in sectors.
    GetBlockSize,

    /// The sectors `start..=end` are no longer used.
    Trim { start: u32, end: u32 },
}

/// FatFS glue for a block device.
#[derive(Debug)]
pub struct DiskIo<D: BlockDevice> {
    /// Underlying device.
    dev: D,

    /// The device has been initialized.
    initialised: bool,

    /// Read back and compare every written sector.
    verify: bool,

    /// Buffer for write verification.
    scratch: [u8; SECTOR_SIZE],
}

impl<D: BlockDevice> DiskIo<D> {
    /// Wraps `dev`. Write verification is enabled.
    pub fn new(dev: D) -> DiskIo<D> {
        DiskIo {
            dev,
            initialised: false,
            verify: true,
            scratch: [0; SECTOR_SIZE],
        }
    }

    /// Enables or disables write verification.
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Returns the underlying device.
    pub fn device(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Initializes the drive and returns its status.
    pub fn initialize(&mut self) -> DiskStatus {
        if self.dev.is_present() {
            self.initialised = self.dev.initialise().is_ok();
        } else {
            self.initialised = false;
        }
        self.status()
    }

    /// Returns the status of the drive.
    pub fn status(&self) -> DiskStatus {
        let mut status = DiskStatus::READY;
        if !self.dev.is_present() {
            return DiskStatus::NOINIT | DiskStatus::NODISK;
        }
        if !self.initialised {
            status = status | DiskStatus::NOINIT;
        }
        if self.dev.is_write_protected() {
            status = status | DiskStatus::PROTECT;
        }
        status
    }

    /// Validates an access to the sectors covered by `len` bytes from
    /// `sector`.
    fn check_access(&self, sector: u32, len: usize) -> core::result::Result<(), DiskError> {
        if !self.initialised || !self.dev.is_present() {
            return Err(DiskError::NotReady);
        }
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(DiskError::InvalidParameter);
        }
        let count = (len / SECTOR_SIZE) as u64;
        if sector as u64 + count > self.dev.num_blocks() as u64 {
            return Err(DiskError::InvalidParameter);
        }
        Ok(())
    }

    /// Reads whole sectors into `buf`.
    pub fn read(&mut self, sector: u32, buf: &mut [u8]) -> core::result::Result<(), DiskError> {
        self.check_access(sector, buf.len())?;
        self.dev.read_blocks(sector, buf)?;
        Ok(())
    }

    /// Writes whole sectors from `buf`.
    pub fn write(&mut self, sector: u32, buf: &[u8]) -> core::result::Result<(), DiskError> {
        self.check_access(sector, buf.len())?;
        if self.dev.is_write_protected() {
            return Err(DiskError::WriteProtected);
        }

        self.dev.write_blocks(sector, buf)?;

        if self.verify {
            for (i, chunk) in buf.chunks(SECTOR_SIZE).enumerate() {
                self.dev.read_blocks(sector + i as u32, &mut self.scratch)?;
                if self.scratch[..] != *chunk {
                    return Err(DiskError::Error);
                }
            }
        }
        Ok(())
    }

    /// Runs a control command. Returns the requested value, or 0 for
    /// commands without one.
    pub fn ioctl(&mut self, cmd: Ioctl) -> core::result::Result<u32, DiskError> {
        if !self.initialised {
            return Err(DiskError::NotReady);
        }
        match cmd {
            Ioctl::Sync => {
                self.dev.sync()?;
                Ok(0)
            }
            Ioctl::GetSectorCount => Ok(self.dev.num_blocks()),
            Ioctl::GetSectorSize => Ok(SECTOR_SIZE as u32),
            Ioctl::GetBlockSize => Ok(self.dev.erase_block_size()),
            Ioctl::Trim { start, end } => {
                if start > end || end >= self.dev.num_blocks() {
                    return Err(DiskError::InvalidParameter);
                }
                Ok(0)
            }
        }
    }
}

/// Packs a local time in the FatFS timestamp format. Seconds are stored
/// with a 2 s resolution.
pub fn fat_time(year: u32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Result<u32> {
    let valid = (1980..=2107).contains(&year)
        && (1..=12).contains(&month)
        && (1..=31).contains(&day)
        && hour < 24
        && min < 60
        && sec < 60;
    if !valid {
        return Err(Error::InvalidArg);
    }
    Ok(((year - 1980) << 25) | (month << 21) | (day << 16) | (hour << 11) | (min << 5) | (sec / 2))
}

/// Timestamp returned by [`get_fattime`]: 2024-01-01 00:00:00 until
/// [`set_fat_time`] is called.
static FAT_TIME: AtomicU32 = AtomicU32::new(0x5821_0000);

/// Sets the timestamp given to FatFS for new and modified files.
pub fn set_fat_time(time: u32) {
    FAT_TIME.store(time, Ordering::Relaxed);
}

/// A registered drive.
type Drive = DiskIo<&'static mut (dyn BlockDevice + Send)>;

/// Drives reachable through the C interface.
static DRIVES: Mutex<RefCell<[Option<Drive>; MAX_DRIVES]>> =
    Mutex::new(RefCell::new([None, None]));

/// Makes `dev` physical drive `pdrv` of FatFS.
pub fn register_drive(pdrv: u8, dev: &'static mut (dyn BlockDevice + Send)) -> Result<()> {
    critical_section::with(|cs| {
        let mut drives = DRIVES.borrow_ref_mut(cs);
        let slot = drives
            .get_mut(pdrv as usize)
            .ok_or(Error::BeyondEnd(pdrv as usize))?;
        if slot.is_some() {
            return Err(Error::InUse);
        }
        *slot = Some(DiskIo::new(dev));
        Ok(())
    })
}

/// Removes physical drive `pdrv` and returns its device.
pub fn unregister_drive(pdrv: u8) -> Option<&'static mut (dyn BlockDevice + Send)> {
    critical_section::with(|cs| {
        let mut drives = DRIVES.borrow_ref_mut(cs);
        let drive = drives.get_mut(pdrv as usize)?.take()?;
        Some(drive.dev)
    })
}

/// Runs `f` on drive `pdrv`. The drive is taken out of the table while `f`
/// runs, so interrupts are not masked during the transfer.
fn with_drive<F, R>(pdrv: u8, f: F) -> Option<R>
where
    F: FnOnce(&mut Drive) -> R,
{
    let mut drive = critical_section::with(|cs| {
        DRIVES
            .borrow_ref_mut(cs)
            .get_mut(pdrv as usize)
            .and_then(Option::take)
    })?;

    let ret = f(&mut drive);

    critical_section::with(|cs| {
        if let Some(slot) = DRIVES.borrow_ref_mut(cs).get_mut(pdrv as usize) {
            *slot = Some(drive);
        }
    });
    Some(ret)
}

/// FatFS: initializes a drive.
#[no_mangle]
pub extern "C" fn disk_initialize(pdrv: u8) -> u8 {
    with_drive(pdrv, |drive| drive.initialize())
        .unwrap_or(DiskStatus::NOINIT)
        .bits()
}

/// FatFS: returns the status of a drive.
#[no_mangle]
pub extern "C" fn disk_status(pdrv: u8) -> u8 {
    with_drive(pdrv, |drive| drive.status())
        .unwrap_or(DiskStatus::NOINIT)
        .bits()
}

/// FatFS: reads `count` sectors.
///
/// # Safety
///
/// `buff` must be valid for writes of `count` sectors.
#[no_mangle]
pub unsafe extern "C" fn disk_read(pdrv: u8, buff: *mut u8, sector: u32, count: u32) -> u32 {
    if buff.is_null() {
        return DiskError::InvalidParameter as u32;
    }
    let len = count as usize * SECTOR_SIZE;
    let buf = core::slice::from_raw_parts_mut(buff, len);
    let res = with_drive(pdrv, |drive| drive.read(sector, buf));
    dresult(res.unwrap_or(Err(DiskError::NotReady)))
}

/// FatFS: writes `count` sectors.
///
/// # Safety
///
/// `buff` must be valid for reads of `count` sectors.
#[no_mangle]
pub unsafe extern "C" fn disk_write(pdrv: u8, buff: *const u8, sector: u32, count: u32) -> u32 {
    if buff.is_null() {
        return DiskError::InvalidParameter as u32;
    }
    let len = count as usize * SECTOR_SIZE;
    let buf = core::slice::from_raw_parts(buff, len);
    let res = with_drive(pdrv, |drive| drive.write(sector, buf));
    dresult(res.unwrap_or(Err(DiskError::NotReady)))
}

/// FatFS: control commands.
///
/// # Safety
///
/// `buff` must point to the argument/result of `cmd` as defined by FatFS:
/// an `LBA_t` for the sector count, a `WORD` for the sector size, a `DWORD`
/// for the block size and an `LBA_t[2]` for trim.
#[no_mangle]
pub unsafe extern "C" fn disk_ioctl(pdrv: u8, cmd: u8, buff: *mut core::ffi::c_void) -> u32 {
    let needs_buff = cmd != 0;
    if needs_buff && buff.is_null() {
        return DiskError::InvalidParameter as u32;
    }

    let cmd = match cmd {
        0 => Ioctl::Sync,
        1 => Ioctl::GetSectorCount,
        2 => Ioctl::GetSectorSize,
        3 => Ioctl::GetBlockSize,
        4 => {
            let range = buff as *const u32;
            Ioctl::Trim {
                start: range.read_unaligned(),
                end: range.add(1).read_unaligned(),
            }
        }
        _ => return DiskError::InvalidParameter as u32,
    };

    let res = with_drive(pdrv, |drive| drive.ioctl(cmd)).unwrap_or(Err(DiskError::NotReady));
    let value = match res {
        Ok(value) => value,
        Err(err) => return err as u32,
    };
    match cmd {
        Ioctl::GetSectorCount | Ioctl::GetBlockSize => (buff as *mut u32).write_unaligned(value),
        Ioctl::GetSectorSize => (buff as *mut u16).write_unaligned(value as u16),
        Ioctl::Sync | Ioctl::Trim { .. } => {}
    }
    0
}

/// FatFS: current time.
#[no_mangle]
pub extern "C" fn get_fattime() -> u32 {
    FAT_TIME.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Block device backed by a vector.
    #[derive(Debug)]
    struct RamDisk {
        data: Vec<u8>,
        present: bool,
        protected: bool,
        /// Flip a bit of every written block.
        faulty: bool,
    }

    impl RamDisk {
        fn new(blocks: usize) -> RamDisk {
            RamDisk {
                data: vec![0; blocks * SECTOR_SIZE],
                present: true,
                protected: false,
                faulty: false,
            }
        }
    }

    impl BlockDevice for RamDisk {
        fn initialise(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_present(&self) -> bool {
            self.present
        }

        fn is_write_protected(&self) -> bool {
            self.protected
        }

        fn num_blocks(&self) -> u32 {
            (self.data.len() / SECTOR_SIZE) as u32
        }

        fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
            let start = lba as usize * SECTOR_SIZE;
            let end = start + buf.len();
            let src = self.data.get(start..end).ok_or(Error::BeyondEnd(lba as usize))?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<()> {
            let start = lba as usize * SECTOR_SIZE;
            let end = start + buf.len();
            let dst = self
                .data
                .get_mut(start..end)
                .ok_or(Error::BeyondEnd(lba as usize))?;
            dst.copy_from_slice(buf);
            if self.faulty {
                dst[0] ^= 1;
            }
            Ok(())
        }

        fn erase_block_size(&self) -> u32 {
            8
        }
    }

    #[test]
    fn status_bits() {
        let mut disk = DiskIo::new(RamDisk::new(4));
        assert_eq!(disk.status(), DiskStatus::NOINIT);
        assert_eq!(disk.initialize(), DiskStatus::READY);

        disk.device().protected = true;
        assert_eq!(disk.status(), DiskStatus::PROTECT);

        disk.device().present = false;
        let status = disk.initialize();
        assert!(status.contains(DiskStatus::NOINIT | DiskStatus::NODISK));
        assert_eq!(status.bits(), 0x03);
    }

    #[test]
    fn read_write_sectors() {
        let mut disk = DiskIo::new(RamDisk::new(4));
        let buf = [0xa5u8; 2 * SECTOR_SIZE];
        assert_eq!(disk.write(0, &buf), Err(DiskError::NotReady));

        disk.initialize();
        disk.write(2, &buf).unwrap();

        let mut out = [0u8; SECTOR_SIZE];
        disk.read(3, &mut out).unwrap();
        assert_eq!(out, [0xa5u8; SECTOR_SIZE]);
        disk.read(1, &mut out).unwrap();
        assert_eq!(out, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn invalid_accesses() {
        let mut disk = DiskIo::new(RamDisk::new(4));
        disk.initialize();

        let mut short = [0u8; 100];
        assert_eq!(disk.read(0, &mut short), Err(DiskError::InvalidParameter));
        let mut empty = [0u8; 0];
        assert_eq!(disk.read(0, &mut empty), Err(DiskError::InvalidParameter));
        let mut two = [0u8; 2 * SECTOR_SIZE];
        assert_eq!(disk.read(3, &mut two), Err(DiskError::InvalidParameter));

        disk.device().protected = true;
        assert_eq!(disk.write(0, &two), Err(DiskError::WriteProtected));
    }

    #[test]
    fn write_verification() {
        let mut disk = DiskIo::new(RamDisk::new(4));
        disk.initialize();
        disk.device().faulty = true;

        let buf = [0x11u8; SECTOR_SIZE];
        assert_eq!(disk.write(0, &buf), Err(DiskError::Error));

        disk.set_verify(false);
        assert_eq!(disk.write(0, &buf), Ok(()));
    }

    #[test]
    fn ioctl_commands() {
        let mut disk = DiskIo::new(RamDisk::new(16));
        assert_eq!(disk.ioctl(Ioctl::Sync), Err(DiskError::NotReady));
        disk.initialize();

        assert_eq!(disk.ioctl(Ioctl::Sync), Ok(0));
        assert_eq!(disk.ioctl(Ioctl::GetSectorCount), Ok(16));
        assert_eq!(disk.ioctl(Ioctl::GetSectorSize), Ok(512));
        assert_eq!(disk.ioctl(Ioctl::GetBlockSize), Ok(8));
        assert_eq!(disk.ioctl(Ioctl::Trim { start: 2, end: 5 }), Ok(0));
        assert_eq!(
            disk.ioctl(Ioctl::Trim { start: 2, end: 16 }),
            Err(DiskError::InvalidParameter)
        );
    }

    #[test]
    fn fat_timestamps() {
        assert_eq!(fat_time(2024, 1, 1, 0, 0, 0), Ok(0x5821_0000));
        assert_eq!(fat_time(1980, 1, 1, 23, 59, 59), Ok(0x0021_bf7d));
        assert_eq!(fat_time(1979, 1, 1, 0, 0, 0), Err(Error::InvalidArg));
        assert_eq!(fat_time(2000, 13, 1, 0, 0, 0), Err(Error::InvalidArg));
    }

    #[test]
    fn c_interface() {
        let dev: &'static mut RamDisk = Box::leak(Box::new(RamDisk::new(8)));
        register_drive(1, dev).unwrap();
        let other: &'static mut RamDisk = Box::leak(Box::new(RamDisk::new(1)));
        assert_eq!(register_drive(1, other), Err(Error::InUse));
        let other: &'static mut RamDisk = Box::leak(Box::new(RamDisk::new(1)));
        assert_eq!(register_drive(2, other), Err(Error::BeyondEnd(2)));

        assert_eq!(disk_status(1), 0x01);
        assert_eq!(disk_initialize(1), 0x00);
        assert_eq!(disk_status(7), 0x01);

        let data = [0x5au8; SECTOR_SIZE];
        let mut out = [0u8; SECTOR_SIZE];
        unsafe {
            assert_eq!(disk_write(1, data.as_ptr(), 7, 1), 0);
            assert_eq!(disk_read(1, out.as_mut_ptr(), 7, 1), 0);
            assert_eq!(disk_read(1, out.as_mut_ptr(), 8, 1), 4);
            assert_eq!(disk_read(7, out.as_mut_ptr(), 0, 1), 3);
        }
        assert_eq!(out, data);

        let mut count = 0u32;
        let mut size = 0u16;
        unsafe {
            let count_ptr = &mut count as *mut u32 as *mut core::ffi::c_void;
            let size_ptr = &mut size as *mut u16 as *mut core::ffi::c_void;
            assert_eq!(disk_ioctl(1, 1, count_ptr), 0);
            assert_eq!(disk_ioctl(1, 2, size_ptr), 0);
            assert_eq!(disk_ioctl(1, 9, count_ptr), 4);
        }
        assert_eq!(count, 8);
        assert_eq!(size, 512);

        assert!(unregister_drive(1).is_some());
        assert_eq!(disk_status(1), 0x01);

        set_fat_time(0x1234_5678);
        assert_eq!(get_fattime(), 0x1234_5678);
    }
}
