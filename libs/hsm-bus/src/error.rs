use core::fmt;

/// Errors surfaced by the bus and arbiter layer. A subset of the firmware's
/// flat error taxonomy — only the kinds this layer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// `io_read`/`io_write` was asked to move a byte count that is not a
    /// multiple of 4.
    BadCount,
    /// `io_wait`/`io_wait2` exhausted its iteration budget before the
    /// requested status bits went high.
    IoTimeout,
    /// The bus responded with something the driver did not expect (e.g. a
    /// probe read came back truncated).
    IoUnexpected,
    /// Core discovery found no core matching the requested name.
    CoreNotFound,
    /// All cores matching the requested name are currently allocated.
    CoreBusy,
    /// A `(handle, tag)` pair was presented to reassert a core but the tag no
    /// longer matches — the core was freed and reassigned since the caller
    /// last held it.
    CoreReassigned,
    /// The CSPRNG's online health test caught a stuck-at or repeating-word
    /// core: the entropy source itself cannot be trusted.
    CsprngBroken,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusError::BadCount => "byte count is not a multiple of 4",
            BusError::IoTimeout => "bus status poll timed out",
            BusError::IoUnexpected => "bus returned a malformed response",
            BusError::CoreNotFound => "no core on the bus matches that name",
            BusError::CoreBusy => "all matching cores are busy",
            BusError::CoreReassigned => "core was reassigned since last held",
            BusError::CsprngBroken => "CSPRNG health test failed",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for BusError {}
