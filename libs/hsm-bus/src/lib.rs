//! Bus I/O and the scarce-core arbiter.
//!
//! Cores are discovered once at first use by scanning the bus, then handed
//! out to callers under a name-based LRU policy with cooperative yielding on
//! contention. This generalizes the register-poll idiom used throughout the
//! teacher's hardware drivers (`services/engine-25519`, `services/llio`) —
//! `csr.rf`/`csr.wfo`/`csr.rmwf` against a statically-generated CSR map —
//! into a dynamic table built from cores discovered at runtime rather than
//! known at compile time.

mod arbiter;
mod bus;
mod csprng;
mod error;

pub use arbiter::{CoreDescriptor, CoreHandle, CoreName, Registry};
pub use bus::{io_read, io_wait, io_wait2, io_write, Bus, DEFAULT_TIMEOUT_ITERS, STATUS_OFFSET};
pub use csprng::Csprng;
pub use error::BusError;

#[cfg(feature = "hosted")]
pub use bus::HostedBus;
