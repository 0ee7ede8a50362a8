//! Streaming hash/HMAC engine.
//!
//! The default (`hosted`) build processes blocks through the RustCrypto
//! `sha1`/`sha2` crates' own compression routines — an interchangeable
//! software implementation of the same hash contract as the FPGA cores.
//! The literal FPGA register algorithm lives in
//! [`hw`], gated behind the `hardware` feature, for firmware images built
//! against real silicon.

mod alg;
mod error;
mod hash;
mod hmac;
mod state;

#[cfg(feature = "hardware")]
pub mod hw;

pub use alg::{descriptor, AlgorithmDescriptor, HashAlgorithm};
pub use error::HashError;
pub use hash::{digest_algorithm_id, digest_len, hash_finalize, hash_initialize, hash_update, HashState};
pub use hmac::{hmac_finalize, hmac_initialize, hmac_update, HmacState};
pub use state::DigestBytes;
