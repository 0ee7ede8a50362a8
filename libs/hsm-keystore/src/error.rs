use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KsError {
    KeyNotFound,
    NoSlots,
    InUse,
    BadCrc,
    BadBlockType,
    NotOwner,
    ResultTooLong,
    PinIncorrect,
    PinTooFewIterations,
    InvalidKeyType,
    IoError,
    WrapFailed,
}

impl fmt::Display for KsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KsError::KeyNotFound => "no block with that name",
            KsError::NoSlots => "keystore is full",
            KsError::InUse => "name already present",
            KsError::BadCrc => "block CRC mismatch",
            KsError::BadBlockType => "unrecognized block type or status",
            KsError::NotOwner => "caller does not own this block",
            KsError::ResultTooLong => "attribute set does not fit in the block",
            KsError::PinIncorrect => "PIN did not match",
            KsError::PinTooFewIterations => "PBKDF2 iteration count below the configured floor",
            KsError::InvalidKeyType => "key type is not accepted here",
            KsError::IoError => "underlying block device error",
            KsError::WrapFailed => "key-wrap/unwrap under the KEK failed",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for KsError {}
