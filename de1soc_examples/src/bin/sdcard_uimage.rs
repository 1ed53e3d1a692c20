//! Looks for a U-Boot image on the SD card.
//!
//! The preloader partition (MBR type 0xa2) holds four copies of the
//! preloader followed by the U-Boot image.

#![no_std]
#![no_main]

use de1soc::board;
use de1soc::diskio::{DiskIo, DiskStatus, Ioctl, SECTOR_SIZE};
use de1soc::println;
use de1soc::rstmgr::{PeripheralReset, ResetManager};
use de1soc::sdmmc::{self, SdCard};
use de1soc::uimage::{self, ImageHeader};
use de1soc_macros::entrypoint;

/// MBR partition type of the preloader partition.
const PRELOADER_PARTITION: u8 = 0xa2;

/// Offset of the U-Boot image in the preloader partition, in sectors.
const UBOOT_OFFSET: u32 = 0x40000 / SECTOR_SIZE as u32;

/// Returns the first sector of the first partition of type `kind`.
fn find_partition(mbr: &[u8; SECTOR_SIZE], kind: u8) -> Option<u32> {
    if mbr[510..] != [0x55, 0xaa] {
        return None;
    }
    mbr[446..510].chunks_exact(16).find_map(|entry| {
        if entry[4] != kind {
            return None;
        }
        Some(u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]))
    })
}

#[entrypoint]
fn main() {
    println!("de1soc sdcard_uimage");

    let mut rstmgr = unsafe { ResetManager::new(board::RSTMGR_BASE) }.unwrap();
    rstmgr.release(PeripheralReset::SdMmc);

    let card = unsafe { SdCard::new(board::SDMMC_BASE, sdmmc::DEFAULT_CLOCK_HZ) }.unwrap();
    let mut disk = DiskIo::new(card);

    let status = disk.initialize();
    if status.contains(DiskStatus::NOINIT) {
        println!("no card: status {:#04x}", status.bits());
        return;
    }
    if let Some(info) = disk.device().card() {
        println!("card: {:?}", info);
    }
    println!("sectors: {}", disk.ioctl(Ioctl::GetSectorCount).unwrap());

    let mut sector = [0u8; SECTOR_SIZE];
    disk.read(0, &mut sector).unwrap();
    let Some(start) = find_partition(&sector, PRELOADER_PARTITION) else {
        println!("no preloader partition");
        return;
    };

    let lba = start + UBOOT_OFFSET;
    disk.read(lba, &mut sector).unwrap();
    let header = match ImageHeader::parse(&sector) {
        Ok(header) => header,
        Err(err) => {
            println!("no image at sector {}: {}", lba, err);
            return;
        }
    };
    println!("image: {}", header);

    // The payload starts right after the header, in the same sector.
    let mut remaining = header.size() as usize;
    let mut offset = uimage::HEADER_SIZE;
    let mut crc = 0;
    let mut next = lba;
    while remaining > 0 {
        let len = remaining.min(SECTOR_SIZE - offset);
        crc = uimage::crc32_update(crc, &sector[offset..offset + len]);
        remaining -= len;
        offset = 0;
        if remaining > 0 {
            next += 1;
            disk.read(next, &mut sector).unwrap();
        }
    }

    if crc == header.data_crc() {
        println!("payload CRC ok");
    } else {
        println!("payload CRC mismatch: {:#010x}", crc);
    }
}
