use core::fmt;

/// Errors produced by the framing/codec layer itself, before any request
/// ever reaches a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    /// An XDR encode or decode ran past the end of its buffer.
    XdrBufferOverflow,
    /// A decoded length field (e.g. `GET_RANDOM`'s requested length) would
    /// not fit in the response buffer.
    PacketOverflow,
    /// The leading `func_code` does not name a known RPC function.
    BadFunction,
    /// A frame's shape violated the `{func_code, client_handle, ...}`
    /// contract (too short, trailing garbage, non-4-aligned opaque).
    ProtocolError,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcError::XdrBufferOverflow => "XDR buffer overflow",
            RpcError::PacketOverflow => "RPC packet overflow",
            RpcError::BadFunction => "bad RPC function number",
            RpcError::ProtocolError => "RPC protocol error",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for RpcError {}

/// The firmware's single flat error taxonomy (spec §7): every per-crate
/// error converges here so the dispatcher can map any failure to one
/// `result_code:u32` on the wire. Discriminants start at 1 — wire value `0`
/// means success and is never represented by a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HalError {
    BadArguments = 1,
    UnsupportedKey,
    IoSetupFailed,
    IoTimeout,
    IoUnexpected,
    IoBadCount,
    CsprngBroken,
    KeywrapBadMagic,
    KeywrapBadLength,
    KeywrapBadPadding,
    Impossible,
    AllocationFailure,
    ResultTooLong,
    Asn1ParseFailed,
    KeyNotOnCurve,
    InvalidSignature,
    CoreNotFound,
    CoreBusy,
    CoreReassigned,
    KeystoreAccess,
    KeyNotFound,
    KeyNameInUse,
    NoKeySlotsAvailable,
    PinIncorrect,
    NoClientSlotsAvailable,
    Forbidden,
    XdrBufferOverflow,
    RpcTransport,
    RpcPacketOverflow,
    RpcBadFunction,
    KeyNameTooLong,
    MasterkeyNotSet,
    MasterkeyFail,
    MasterkeyBadLength,
    KeystoreBadCrc,
    KeystoreBadBlockType,
    KeystoreLostData,
    KeystoreWrongBlockType,
    BadAttributeLength,
    AttributeNotFound,
    NoKeyIndexSlots,
    KsIndexUuidMisordered,
    RpcProtocolError,
    NotImplemented,
    AssertionFailed,
    HashsigKeyExhausted,
    NotReady,
}

impl HalError {
    /// The value written into the response's `result_code` field.
    pub fn result_code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HalError::BadArguments => "bad arguments given",
            HalError::UnsupportedKey => "unsupported key type or key length",
            HalError::IoSetupFailed => "could not set up I/O with FPGA",
            HalError::IoTimeout => "I/O with FPGA timed out",
            HalError::IoUnexpected => "unexpected response from FPGA",
            HalError::IoBadCount => "bad byte count",
            HalError::CsprngBroken => "CSPRNG is returning nonsense",
            HalError::KeywrapBadMagic => "bad magic number while unwrapping key",
            HalError::KeywrapBadLength => "length out of range while unwrapping key",
            HalError::KeywrapBadPadding => "non-zero padding detected unwrapping key",
            HalError::Impossible => "\"impossible\" error",
            HalError::AllocationFailure => "memory allocation failed",
            HalError::ResultTooLong => "result too long for buffer",
            HalError::Asn1ParseFailed => "ASN.1 parse failed",
            HalError::KeyNotOnCurve => "EC key is not on its purported curve",
            HalError::InvalidSignature => "invalid signature",
            HalError::CoreNotFound => "requested core not found",
            HalError::CoreBusy => "requested core busy",
            HalError::CoreReassigned => "core has been reassigned since last use",
            HalError::KeystoreAccess => "could not access keystore",
            HalError::KeyNotFound => "key not found",
            HalError::KeyNameInUse => "key name in use",
            HalError::NoKeySlotsAvailable => "no key slots available",
            HalError::PinIncorrect => "PIN incorrect",
            HalError::NoClientSlotsAvailable => "no client slots available",
            HalError::Forbidden => "forbidden",
            HalError::XdrBufferOverflow => "XDR buffer overflow",
            HalError::RpcTransport => "RPC transport error",
            HalError::RpcPacketOverflow => "RPC packet overflow",
            HalError::RpcBadFunction => "bad RPC function number",
            HalError::KeyNameTooLong => "key name too long",
            HalError::MasterkeyNotSet => "master key (key encryption key) not set",
            HalError::MasterkeyFail => "master key generic failure",
            HalError::MasterkeyBadLength => "master key of unacceptable length",
            HalError::KeystoreBadCrc => "bad CRC in keystore",
            HalError::KeystoreBadBlockType => "unsupported keystore block type",
            HalError::KeystoreLostData => "keystore appears to have lost data",
            HalError::KeystoreWrongBlockType => "wrong block type in keystore",
            HalError::BadAttributeLength => "bad attribute length",
            HalError::AttributeNotFound => "attribute not found",
            HalError::NoKeyIndexSlots => "no key index slots available",
            HalError::KsIndexUuidMisordered => "key index UUID misordered",
            HalError::RpcProtocolError => "RPC protocol error",
            HalError::NotImplemented => "not implemented",
            HalError::AssertionFailed => "assertion failed",
            HalError::HashsigKeyExhausted => "key exhausted",
            HalError::NotReady => "not ready for this operation",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for HalError {}

impl From<RpcError> for HalError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::XdrBufferOverflow => HalError::XdrBufferOverflow,
            RpcError::PacketOverflow => HalError::RpcPacketOverflow,
            RpcError::BadFunction => HalError::RpcBadFunction,
            RpcError::ProtocolError => HalError::RpcProtocolError,
        }
    }
}

impl From<hsm_bus::BusError> for HalError {
    fn from(e: hsm_bus::BusError) -> Self {
        match e {
            hsm_bus::BusError::BadCount => HalError::IoBadCount,
            hsm_bus::BusError::IoTimeout => HalError::IoTimeout,
            hsm_bus::BusError::IoUnexpected => HalError::IoUnexpected,
            hsm_bus::BusError::CoreNotFound => HalError::CoreNotFound,
            hsm_bus::BusError::CoreBusy => HalError::CoreBusy,
            hsm_bus::BusError::CoreReassigned => HalError::CoreReassigned,
            hsm_bus::BusError::CsprngBroken => HalError::CsprngBroken,
        }
    }
}

impl From<hsm_hash::HashError> for HalError {
    fn from(e: hsm_hash::HashError) -> Self {
        match e {
            hsm_hash::HashError::ResultTooLong => HalError::ResultTooLong,
            hsm_hash::HashError::Unsupported => HalError::UnsupportedKey,
            hsm_hash::HashError::Bus(b) => b.into(),
        }
    }
}

impl From<hsm_modexp::ModexpError> for HalError {
    fn from(e: hsm_modexp::ModexpError) -> Self {
        match e {
            hsm_modexp::ModexpError::Bus(b) => b.into(),
            hsm_modexp::ModexpError::BadLength => HalError::BadArguments,
            hsm_modexp::ModexpError::OperandTooWide => HalError::BadArguments,
        }
    }
}

impl From<hsm_keywrap::KeywrapError> for HalError {
    fn from(e: hsm_keywrap::KeywrapError) -> Self {
        match e {
            hsm_keywrap::KeywrapError::Empty => HalError::BadArguments,
            hsm_keywrap::KeywrapError::TooBig => HalError::BadArguments,
            hsm_keywrap::KeywrapError::Unpadded => HalError::KeywrapBadLength,
            hsm_keywrap::KeywrapError::TooSmall => HalError::KeywrapBadLength,
            hsm_keywrap::KeywrapError::InvalidExpectedLen => HalError::KeywrapBadLength,
            hsm_keywrap::KeywrapError::AuthenticationFailed => HalError::KeywrapBadMagic,
        }
    }
}

impl From<hsm_keystore::KsError> for HalError {
    fn from(e: hsm_keystore::KsError) -> Self {
        match e {
            hsm_keystore::KsError::KeyNotFound => HalError::KeyNotFound,
            hsm_keystore::KsError::NoSlots => HalError::NoKeySlotsAvailable,
            hsm_keystore::KsError::InUse => HalError::KeyNameInUse,
            hsm_keystore::KsError::BadCrc => HalError::KeystoreBadCrc,
            hsm_keystore::KsError::BadBlockType => HalError::KeystoreBadBlockType,
            hsm_keystore::KsError::NotOwner => HalError::Forbidden,
            hsm_keystore::KsError::ResultTooLong => HalError::ResultTooLong,
            hsm_keystore::KsError::PinIncorrect => HalError::PinIncorrect,
            hsm_keystore::KsError::PinTooFewIterations => HalError::BadArguments,
            hsm_keystore::KsError::InvalidKeyType => HalError::KeystoreWrongBlockType,
            hsm_keystore::KsError::IoError => HalError::KeystoreAccess,
            hsm_keystore::KsError::WrapFailed => HalError::KeywrapBadMagic,
        }
    }
}

impl From<hsm_hashsig::HashSigError> for HalError {
    fn from(e: hsm_hashsig::HashSigError) -> Self {
        match e {
            hsm_hashsig::HashSigError::KeyExhausted => HalError::HashsigKeyExhausted,
            hsm_hashsig::HashSigError::NoSlots => HalError::NoKeySlotsAvailable,
            hsm_hashsig::HashSigError::ResultTooLong => HalError::ResultTooLong,
            hsm_hashsig::HashSigError::InvalidSignature => HalError::InvalidSignature,
            hsm_hashsig::HashSigError::Malformed => HalError::BadArguments,
            hsm_hashsig::HashSigError::NotReady => HalError::NotReady,
            hsm_hashsig::HashSigError::Keystore(k) => k.into(),
            hsm_hashsig::HashSigError::Hash(h) => h.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_is_never_zero() {
        assert_ne!(HalError::BadArguments.result_code(), 0);
        assert_ne!(HalError::NotReady.result_code(), 0);
    }

    #[test]
    fn bus_error_converts_through_hash_error() {
        let hal: HalError = hsm_hash::HashError::Bus(hsm_bus::BusError::IoTimeout).into();
        assert_eq!(hal, HalError::IoTimeout);
    }
}
