//! Errors.
//!
//! All the drivers report failures using [`Error`]. Each kind has a stable
//! negative status code, which is what the C ABI (e.g. the FatFS glue)
//! exchanges. Success is always 0.

use core::fmt;

use embedded_hal::{digital, i2c};

/// de1soc error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// At least one of the arguments provided to the function is not valid.
    InvalidArg,

    /// The peripheral has not been initialized.
    NoInit,

    /// An index (pin, channel, coordinate, sector, IRQ...) is beyond the end
    /// of the valid range.
    BeyondEnd(usize),

    /// The operation is not supported by this peripheral or configuration.
    NoSupport,

    /// The peripheral is in the wrong mode for the operation.
    WrongMode,

    /// The peripheral is busy.
    Busy,

    /// There is no room left (FIFO, table...).
    NoSpace,

    /// The hardware did not respond in time.
    Timeout,

    /// The resource is already in use.
    InUse,

    /// Checksum mismatch.
    Checksum,

    /// Misaligned address or buffer.
    Alignment,

    /// The operation was aborted by the hardware.
    Aborted,

    /// Unexpected identifier or magic number.
    BadId,

    /// The remote device did not acknowledge.
    AckFail,

    /// Generic I/O failure.
    IoFail,

    /// Read back data does not match what was written.
    Mismatch,

    /// The device is not ready (e.g. no card inserted).
    NotReady,

    /// The requested item does not exist.
    NotFound,

    /// The data does not fit.
    TooBig,
}

/// de1soc result.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Returns the status code of the error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArg => -1,
            Error::NoInit => -2,
            Error::BeyondEnd(_) => -3,
            Error::NoSupport => -4,
            Error::WrongMode => -5,
            Error::Busy => -6,
            Error::NoSpace => -7,
            Error::Timeout => -8,
            Error::InUse => -9,
            Error::Checksum => -10,
            Error::Alignment => -11,
            Error::Aborted => -12,
            Error::BadId => -13,
            Error::AckFail => -14,
            Error::IoFail => -15,
            Error::Mismatch => -16,
            Error::NotReady => -17,
            Error::NotFound => -18,
            Error::TooBig => -19,
        }
    }

    /// Converts a status code back into an error. Returns `None` for 0
    /// (success) and for unknown codes. The index carried by
    /// [`Error::BeyondEnd`] is not part of the code and comes back as 0.
    pub fn from_code(code: i32) -> Option<Error> {
        let err = match code {
            -1 => Error::InvalidArg,
            -2 => Error::NoInit,
            -3 => Error::BeyondEnd(0),
            -4 => Error::NoSupport,
            -5 => Error::WrongMode,
            -6 => Error::Busy,
            -7 => Error::NoSpace,
            -8 => Error::Timeout,
            -9 => Error::InUse,
            -10 => Error::Checksum,
            -11 => Error::Alignment,
            -12 => Error::Aborted,
            -13 => Error::BadId,
            -14 => Error::AckFail,
            -15 => Error::IoFail,
            -16 => Error::Mismatch,
            -17 => Error::NotReady,
            -18 => Error::NotFound,
            -19 => Error::TooBig,
            _ => return None,
        };
        Some(err)
    }

    /// Maps the error kind reported by an I2C capability implementation.
    pub fn from_i2c_kind(kind: i2c::ErrorKind) -> Error {
        match kind {
            i2c::ErrorKind::NoAcknowledge(_) => Error::AckFail,
            i2c::ErrorKind::ArbitrationLoss => Error::Aborted,
            i2c::ErrorKind::Overrun => Error::NoSpace,
            _ => Error::IoFail,
        }
    }
}

/// Returns the status code of a result: 0 on success.
pub fn status<T>(res: &Result<T>) -> i32 {
    match res {
        Ok(_) => 0,
        Err(err) => err.code(),
    }
}

impl From<Error> for i32 {
    fn from(err: Error) -> i32 {
        err.code()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArg => write!(f, "invalid argument"),
            Error::NoInit => write!(f, "peripheral not initialized"),
            Error::BeyondEnd(idx) => write!(f, "index beyond end: {idx}"),
            Error::NoSupport => write!(f, "operation not supported"),
            Error::WrongMode => write!(f, "wrong mode"),
            Error::Busy => write!(f, "peripheral busy"),
            Error::NoSpace => write!(f, "no space left"),
            Error::Timeout => write!(f, "timeout"),
            Error::InUse => write!(f, "resource in use"),
            Error::Checksum => write!(f, "checksum mismatch"),
            Error::Alignment => write!(f, "misaligned access"),
            Error::Aborted => write!(f, "operation aborted"),
            Error::BadId => write!(f, "bad identifier"),
            Error::AckFail => write!(f, "not acknowledged"),
            Error::IoFail => write!(f, "I/O failure"),
            Error::Mismatch => write!(f, "data mismatch"),
            Error::NotReady => write!(f, "device not ready"),
            Error::NotFound => write!(f, "not found"),
            Error::TooBig => write!(f, "too big"),
        }
    }
}

impl digital::Error for Error {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Error::AckFail => i2c::ErrorKind::NoAcknowledge(
                i2c::NoAcknowledgeSource::Unknown,
            ),
            Error::Aborted => i2c::ErrorKind::ArbitrationLoss,
            Error::NoSpace => i2c::ErrorKind::Overrun,
            _ => i2c::ErrorKind::Other,
        }
    }
}
