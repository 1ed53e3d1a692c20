//! U-Boot legacy image (uImage) support.
//!
//! A legacy image is a 64-byte big-endian header followed by the payload.
//! Both the header and the payload are protected by a CRC-32.

use core::fmt;

use crate::{Error, Result};

/// Magic number of a legacy image header.
pub const IH_MAGIC: u32 = 0x2705_1956;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Size of the image name field in bytes.
pub const NAME_SIZE: usize = 32;

/// Offset of the header CRC field.
const HCRC_OFFSET: usize = 4;

/// CRC-32 (IEEE 802.3, reflected) lookup table.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Continues a CRC-32 computation over `data`. Start with `crc = 0`.
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    let crc = data.iter().fold(!crc, |crc, &b| {
        CRC32_TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8)
    });
    !crc
}

/// Returns the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}

/// Operating system of the image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Os {
    Invalid,
    Linux,
    Vxworks,
    Qnx,
    UBoot,
    Rtems,
    Other(u8),
}

impl From<u8> for Os {
    fn from(value: u8) -> Os {
        match value {
            0 => Os::Invalid,
            5 => Os::Linux,
            14 => Os::Vxworks,
            16 => Os::Qnx,
            17 => Os::UBoot,
            18 => Os::Rtems,
            _ => Os::Other(value),
        }
    }
}

/// CPU architecture of the image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arch {
    Invalid,
    Arm,
    I386,
    Mips,
    Ppc,
    Arm64,
    Riscv,
    Other(u8),
}

impl From<u8> for Arch {
    fn from(value: u8) -> Arch {
        match value {
            0 => Arch::Invalid,
            2 => Arch::Arm,
            3 => Arch::I386,
            5 => Arch::Mips,
            7 => Arch::Ppc,
            22 => Arch::Arm64,
            26 => Arch::Riscv,
            _ => Arch::Other(value),
        }
    }
}

/// Kind of image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageType {
    Invalid,
    Standalone,
    Kernel,
    Ramdisk,
    Multi,
    Firmware,
    Script,
    Filesystem,
    FlatDt,
    Other(u8),
}

impl From<u8> for ImageType {
    fn from(value: u8) -> ImageType {
        match value {
            0 => ImageType::Invalid,
            1 => ImageType::Standalone,
            2 => ImageType::Kernel,
            3 => ImageType::Ramdisk,
            4 => ImageType::Multi,
            5 => ImageType::Firmware,
            6 => ImageType::Script,
            7 => ImageType::Filesystem,
            8 => ImageType::FlatDt,
            _ => ImageType::Other(value),
        }
    }
}

/// Compression of the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Lzma,
    Lzo,
    Lz4,
    Other(u8),
}

impl From<u8> for Compression {
    fn from(value: u8) -> Compression {
        match value {
            0 => Compression::None,
            1 => Compression::Gzip,
            2 => Compression::Bzip2,
            3 => Compression::Lzma,
            4 => Compression::Lzo,
            5 => Compression::Lz4,
            _ => Compression::Other(value),
        }
    }
}

/// Big-endian cursor over the header bytes.
struct BeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BeReader<'a> {
    fn new(bytes: &'a [u8]) -> BeReader<'a> {
        BeReader { bytes, pos: 0 }
    }

    fn u32(&mut self) -> u32 {
        let b = &self.bytes[self.pos..self.pos + 4];
        self.pos += 4;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    fn u8(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        b
    }
}

/// Legacy image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    /// Header CRC, computed with this field set to 0.
    hcrc: u32,

    /// Creation time (seconds since the Unix epoch).
    time: u32,

    /// Payload size in bytes.
    size: u32,

    /// Address the payload is loaded at.
    load: u32,

    /// Entry point.
    ep: u32,

    /// Payload CRC.
    dcrc: u32,

    os: Os,
    arch: Arch,
    image_type: ImageType,
    comp: Compression,

    /// Zero padded image name.
    name: [u8; NAME_SIZE],
}

impl ImageHeader {
    /// Parses the header at the start of `bytes`.
    ///
    /// It returns [`Error::BeyondEnd`] when `bytes` is shorter than a header,
    /// [`Error::BadId`] when the magic does not match and
    /// [`Error::Checksum`] when the header CRC is wrong.
    pub fn parse(bytes: &[u8]) -> Result<ImageHeader> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::BeyondEnd(bytes.len()));
        }
        let raw = &bytes[..HEADER_SIZE];

        let mut r = BeReader::new(raw);
        if r.u32() != IH_MAGIC {
            return Err(Error::BadId);
        }

        let mut header = ImageHeader {
            hcrc: r.u32(),
            time: r.u32(),
            size: r.u32(),
            load: r.u32(),
            ep: r.u32(),
            dcrc: r.u32(),
            os: r.u8().into(),
            arch: r.u8().into(),
            image_type: r.u8().into(),
            comp: r.u8().into(),
            name: [0; NAME_SIZE],
        };
        header.name.copy_from_slice(&raw[HEADER_SIZE - NAME_SIZE..]);

        // The CRC covers the header with its own field zeroed.
        let crc = crc32_update(0, &raw[..HCRC_OFFSET]);
        let crc = crc32_update(crc, &[0; 4]);
        let crc = crc32_update(crc, &raw[HCRC_OFFSET + 4..]);
        if crc != header.hcrc {
            return Err(Error::Checksum);
        }

        Ok(header)
    }

    /// Returns the creation time.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns the load address.
    pub fn load_address(&self) -> u32 {
        self.load
    }

    /// Returns the entry point.
    pub fn entry_point(&self) -> u32 {
        self.ep
    }

    /// Returns the payload CRC.
    pub fn data_crc(&self) -> u32 {
        self.dcrc
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn compression(&self) -> Compression {
        self.comp
    }

    /// Returns the image name up to the first NUL. Names that are not valid
    /// UTF-8 are cut before the first invalid byte.
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_SIZE);
        match core::str::from_utf8(&self.name[..len]) {
            Ok(name) => name,
            Err(err) => {
                let valid = &self.name[..err.valid_up_to()];
                core::str::from_utf8(valid).unwrap_or_default()
            }
        }
    }

    /// Returns the payload of `image`, which must start with this header.
    pub fn payload<'a>(&self, image: &'a [u8]) -> Result<&'a [u8]> {
        let end = HEADER_SIZE
            .checked_add(self.size as usize)
            .ok_or(Error::BeyondEnd(image.len()))?;
        image
            .get(HEADER_SIZE..end)
            .ok_or(Error::BeyondEnd(image.len()))
    }

    /// Checks the payload CRC.
    pub fn verify_data(&self, image: &[u8]) -> Result<()> {
        if crc32(self.payload(image)?) != self.dcrc {
            return Err(Error::Checksum);
        }
        Ok(())
    }

    /// Copies the payload to the load address and returns the entry point.
    ///
    /// # Safety
    ///
    /// The load address range must be writable memory that does not overlap
    /// `image` or anything in use.
    pub unsafe fn load(&self, image: &[u8]) -> Result<usize> {
        let payload = self.payload(image)?;
        core::ptr::copy_nonoverlapping(
            payload.as_ptr(),
            self.load as usize as *mut u8,
            payload.len(),
        );
        Ok(self.ep as usize)
    }
}

impl fmt::Display for ImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({:?} {:?} {:?}, {:?}): {} bytes at {:#010x}, entry {:#010x}",
            self.name(),
            self.os,
            self.arch,
            self.image_type,
            self.comp,
            self.size,
            self.load,
            self.ep
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an image holding `payload`, loaded at `load`.
    fn image(payload: &[u8], load: u32, name: &str) -> Vec<u8> {
        let mut img = vec![0u8; HEADER_SIZE];
        img[0..4].copy_from_slice(&IH_MAGIC.to_be_bytes());
        img[8..12].copy_from_slice(&0x6500_0000u32.to_be_bytes());
        img[12..16].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        img[16..20].copy_from_slice(&load.to_be_bytes());
        img[20..24].copy_from_slice(&(load + 0x40).to_be_bytes());
        img[24..28].copy_from_slice(&crc32(payload).to_be_bytes());
        img[28..32].copy_from_slice(&[17, 2, 1, 0]);
        img[32..32 + name.len()].copy_from_slice(name.as_bytes());
        let hcrc = crc32(&img);
        img[4..8].copy_from_slice(&hcrc.to_be_bytes());
        img.extend_from_slice(payload);
        img
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32_update(crc32(b"1234"), b"56789"), 0xcbf4_3926);
    }

    #[test]
    fn parse_header() {
        let img = image(b"payload", 0x0100_0000, "de1soc test");
        let header = ImageHeader::parse(&img).unwrap();

        assert_eq!(header.name(), "de1soc test");
        assert_eq!(header.size(), 7);
        assert_eq!(header.time(), 0x6500_0000);
        assert_eq!(header.load_address(), 0x0100_0000);
        assert_eq!(header.entry_point(), 0x0100_0040);
        assert_eq!(header.os(), Os::UBoot);
        assert_eq!(header.arch(), Arch::Arm);
        assert_eq!(header.image_type(), ImageType::Standalone);
        assert_eq!(header.compression(), Compression::None);
        assert_eq!(header.payload(&img), Ok(&b"payload"[..]));
        assert_eq!(header.verify_data(&img), Ok(()));
    }

    #[test]
    fn parse_errors() {
        let mut img = image(b"abc", 0, "x");
        assert_eq!(
            ImageHeader::parse(&img[..10]),
            Err(Error::BeyondEnd(10))
        );

        img[40] ^= 1;
        assert_eq!(ImageHeader::parse(&img), Err(Error::Checksum));

        img[0] = 0;
        assert_eq!(ImageHeader::parse(&img), Err(Error::BadId));
    }

    #[test]
    fn huge_size_is_beyond_end() {
        let mut img = image(b"abcdef", 0, "x");
        img[12..16].copy_from_slice(&u32::MAX.to_be_bytes());
        img[4..8].copy_from_slice(&[0; 4]);
        let hcrc = crc32(&img[..HEADER_SIZE]);
        img[4..8].copy_from_slice(&hcrc.to_be_bytes());

        let header = ImageHeader::parse(&img).unwrap();
        assert_eq!(header.size(), u32::MAX);
        assert_eq!(header.payload(&img), Err(Error::BeyondEnd(img.len())));
        assert_eq!(header.verify_data(&img), Err(Error::BeyondEnd(img.len())));
    }

    #[test]
    fn payload_errors() {
        let mut img = image(b"abcdef", 0, "x");
        let header = ImageHeader::parse(&img).unwrap();

        *img.last_mut().unwrap() ^= 0xff;
        assert_eq!(header.verify_data(&img), Err(Error::Checksum));

        img.truncate(HEADER_SIZE + 2);
        assert_eq!(
            header.payload(&img),
            Err(Error::BeyondEnd(HEADER_SIZE + 2))
        );
    }

    #[test]
    fn load_copies_payload() {
        let mut dest = vec![0u8; 16];
        let load = dest.as_mut_ptr() as usize as u32;
        // Host addresses may not fit in 32 bits.
        if load as usize != dest.as_ptr() as usize {
            return;
        }
        let img = image(b"boot", load, "x");
        let header = ImageHeader::parse(&img).unwrap();
        let ep = unsafe { header.load(&img) }.unwrap();
        assert_eq!(ep, load as usize + 0x40);
        assert_eq!(&dest[..4], b"boot");
    }

    #[test]
    fn unknown_codes() {
        assert_eq!(Os::from(200), Os::Other(200));
        assert_eq!(Arch::from(22), Arch::Arm64);
        assert_eq!(Compression::from(1), Compression::Gzip);
    }
}
