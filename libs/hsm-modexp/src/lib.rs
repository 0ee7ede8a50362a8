//! Modular-exponentiation core driver.
//!
//! Like [`hsm_hash::hw`], this crate only speaks the FPGA register protocol —
//! there is no portable bignum fallback in this workspace (none of the
//! sibling crates needed one, and none is worth adding just for this). Tests
//! below exercise the register sequencing and word-order handling against a
//! small in-process stand-in core rather than claiming RSA-correct
//! arithmetic.
#![forbid(unsafe_code)]

mod error;
mod op;

pub use error::ModexpError;
pub use op::{modexp, modexp2, Mode, Operation};
