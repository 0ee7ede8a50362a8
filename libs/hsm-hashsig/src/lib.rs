//! Hierarchical Signature System (HSS) over Leighton-Micali Signatures
//! (LMS) over Leighton-Micali One-Time Signatures (LM-OTS), per
//! draft-mcgrew-hash-sigs. Stateful hash-based signing: each leaf of each
//! tree may sign at most once, so every operation that advances a leaf
//! counter persists it durably before the caller ever sees the signature it
//! authorized.
//!
//! [`hss`] is the entry point most callers want; [`lms`] and [`lmots`] are
//! exposed for the restart-recovery task and for tests that need to reason
//! about a single tree in isolation.

mod error;
pub mod hss;
pub mod lmots;
pub mod lms;
pub mod params;

pub use error::HashSigError;
pub use params::{LmotsType, LmsType};
