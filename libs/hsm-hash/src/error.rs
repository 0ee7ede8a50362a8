use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashError {
    /// Requested output length exceeds the algorithm's digest length, or a
    /// buffer supplied by the caller is too small.
    ResultTooLong,
    /// No hardware core and no software fallback are available for this
    /// algorithm (build was compiled `hardware`-only).
    Unsupported,
    /// The bus timed out or otherwise misbehaved while driving a hash core.
    Bus(hsm_bus::BusError),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::ResultTooLong => f.write_str("requested digest length is too long"),
            HashError::Unsupported => f.write_str("no hash core or software fallback available"),
            HashError::Bus(e) => write!(f, "hash core bus error: {e}"),
        }
    }
}

impl From<hsm_bus::BusError> for HashError {
    fn from(e: hsm_bus::BusError) -> Self {
        HashError::Bus(e)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for HashError {}
