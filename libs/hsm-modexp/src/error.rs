use core::fmt;
use hsm_bus::BusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModexpError {
    /// Propagated bus/arbiter failure (timeout, core-not-found, ...).
    Bus(BusError),
    /// `exp_len > mod_len`, or a length is not a multiple of 4, or `msg_len`
    /// is neither `mod_len` nor `2 * mod_len`.
    BadLength,
    /// A buffer is wider than the core's operand width.
    OperandTooWide,
}

impl fmt::Display for ModexpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModexpError::Bus(e) => write!(f, "bus error: {e}"),
            ModexpError::BadLength => f.write_str("operand lengths violate the modexp contract"),
            ModexpError::OperandTooWide => f.write_str("operand exceeds the core's operand width"),
        }
    }
}

impl From<BusError> for ModexpError {
    fn from(e: BusError) -> Self {
        ModexpError::Bus(e)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for ModexpError {}
