//! SLIP framing, XDR codec, RPC function codes, and the PKCS#1 `DigestInfo`
//! envelope used by the "mixed" dispatch regime (spec §4.6, §6.1, §6.2).
//!
//! This crate is transport- and handler-agnostic: it has no opinion on
//! where bytes come from or what a `PKEY_SIGN` handler does. `services/
//! hsm-firmware` owns the dispatch table that maps [`FunctionCode`]s to
//! concrete handlers and the device context they run against.

mod func;
#[cfg(any(test, feature = "hosted"))]
pub mod loopback;
pub mod pkcs1;
pub mod slip;
mod xdr;

mod error;

pub use error::{HalError, RpcError};
pub use func::{FunctionCode, PROTOCOL_VERSION};
pub use slip::{SlipDecoder, SlipError};
pub use xdr::{Decoder, Encoder};
