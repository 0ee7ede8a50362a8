//! Master-Key Memory: the source of the 256-bit KEK every keystore block's
//! `der[]` is wrapped under (spec §6.4). Treated, like the other FPGA cores,
//! as an opaque register interface — only the "read 32 bytes, write 32
//! bytes" contract matters here, not the bit layout.
//!
//! In a `hosted` build there is no FPGA, so the KEK is simply drawn from the
//! CSPRNG once at boot and held in a plain buffer, standing in for the
//! battery-backed volatile memory the real core provides. A `hardware`
//! build instead binds the `mkm` core via [`hsm_bus::Registry::base_of`] and
//! round-trips the KEK through its register window.

use hsm_bus::{io_read, io_write, Bus, Registry};
use hsm_keystore::Trng;

const KEK_LEN: usize = 32;

pub enum MasterKeyMemory<'a> {
    Hosted { kek: [u8; KEK_LEN] },
    #[allow(dead_code)]
    Hardware { bus: &'a dyn Bus, base: u32 },
}

impl<'a> MasterKeyMemory<'a> {
    /// Seed a fresh volatile KEK from the TRNG. Used on first boot of a
    /// hosted instance, where there is no battery-backed store to recall one
    /// from.
    pub fn new_hosted(trng: &mut dyn Trng) -> Self {
        let mut kek = [0u8; KEK_LEN];
        trng.fill(&mut kek);
        MasterKeyMemory::Hosted { kek }
    }

    #[cfg(feature = "hardware")]
    pub fn bind_hardware(bus: &'a dyn Bus, registry: &Registry) -> Result<Self, hsm_bus::BusError> {
        let base = registry.base_of("mkm")?;
        Ok(MasterKeyMemory::Hardware { bus, base })
    }

    pub fn kek(&self) -> [u8; KEK_LEN] {
        match self {
            MasterKeyMemory::Hosted { kek } => *kek,
            MasterKeyMemory::Hardware { bus, base } => {
                let mut kek = [0u8; KEK_LEN];
                io_read(*bus, *base, 0, &mut kek).expect("MKM read failed");
                kek
            }
        }
    }

    #[allow(dead_code)]
    pub fn set_kek(&mut self, kek: [u8; KEK_LEN]) {
        match self {
            MasterKeyMemory::Hosted { kek: slot } => *slot = kek,
            MasterKeyMemory::Hardware { bus, base } => {
                io_write(*bus, *base, 0, &kek).expect("MKM write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_keystore::CountingTrng;

    #[test]
    fn hosted_kek_is_stable_across_reads() {
        let mut trng = CountingTrng::new();
        let mkm = MasterKeyMemory::new_hosted(&mut trng);
        assert_eq!(mkm.kek(), mkm.kek());
    }
}
