//! Block-structured flash keystore.
//!
//! Keys live in 8 KiB blocks addressed by a sorted in-memory index; updates
//! go through a crash-safe tombstone sequence so a power loss mid-write never
//! leaves a name bound to two blocks or to none. [`drivers`] supplies the
//! physical backing (flash-like `token`, RAM-only `volatile`); [`Keystore`]
//! is generic over either.

mod attrs;
pub mod audit;
mod block;
mod cache;
pub mod drivers;
mod error;
mod index;
mod keystore;
mod pin;
mod uuid;

pub use attrs::{AttrRequest, AttrResult, DELETE_SENTINEL_LEN};
pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use block::{flags, BlockType, Curve, KeyType};
pub use drivers::BlockDevice;
pub use error::KsError;
pub use keystore::{flag_bits, Keystore, PinSlot};
pub use pin::{DEFAULT_ITERATIONS, LAST_GASP_WHEEL_PIN, MIN_ITERATIONS};
pub use uuid::{generate, Trng, Uuid, NIL_UUID};

#[cfg(any(test, feature = "hosted"))]
pub use uuid::CountingTrng;
