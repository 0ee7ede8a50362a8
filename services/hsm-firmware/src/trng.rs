//! Adapts [`hsm_bus::Csprng`]'s fallible `fill` onto the infallible
//! [`hsm_keystore::Trng`] contract the keystore and hashsig crates are
//! written against.
//!
//! The mismatch is real: `Csprng::fill` can fail with `CsprngBroken` (the
//! health test tripped), but nothing upstream of `Trng::fill` has a path to
//! propagate that — `Keystore::boot`, `set_pin`, and `hss::generate` all
//! take `&mut dyn Trng` and call `fill` expecting it to just work. There is
//! no sane way to keep minting "random" salts/seeds/KEKs off a TRNG that has
//! just failed its own stuck-at test, so this adapter panics rather than
//! silently handing out low-entropy material.

use hsm_bus::Csprng;
use hsm_keystore::Trng;

pub struct CsprngTrng<'a, 'b> {
    csprng: &'a mut Csprng<'b>,
}

impl<'a, 'b> CsprngTrng<'a, 'b> {
    pub fn new(csprng: &'a mut Csprng<'b>) -> Self {
        CsprngTrng { csprng }
    }
}

impl Trng for CsprngTrng<'_, '_> {
    fn fill(&mut self, buf: &mut [u8]) {
        self.csprng.fill(buf).expect("CSPRNG health test failed; refusing to hand out entropy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_bus::{Bus, HostedBus, Registry};

    fn registry_with_trng(bus: &HostedBus) -> Registry {
        bus.poke(0x0000, u32::from_be_bytes(*b"trng\0\0\0\0"[..4].try_into().unwrap()));
        bus.poke(0x0004, 0);
        bus.poke(0x0008, 1);
        Registry::discover(bus).unwrap()
    }

    #[test]
    fn adapts_fallible_csprng_into_infallible_trng() {
        let bus = HostedBus::new();
        let reg = registry_with_trng(&bus);
        bus.poke(0x0000 + hsm_bus::STATUS_OFFSET, 0x1);
        let mut csprng = Csprng::new(&bus, &reg).unwrap();
        let mut adapter = CsprngTrng::new(&mut csprng);
        for n in 0..8u32 {
            bus.poke(0x0000 + 0x100, 0x7000_0000u32.wrapping_add(n));
            let mut out = [0u8; 16];
            adapter.fill(&mut out);
        }
    }

    #[test]
    #[should_panic]
    fn panics_when_the_health_test_trips() {
        let bus = HostedBus::new();
        let reg = registry_with_trng(&bus);
        bus.poke(0x0000 + hsm_bus::STATUS_OFFSET, 0x1);
        bus.poke(0x0000 + 0x100, 0x4242_4242);
        let mut csprng = Csprng::new(&bus, &reg).unwrap();
        let mut adapter = CsprngTrng::new(&mut csprng);
        let mut out = [0u8; 32];
        adapter.fill(&mut out);
    }
}
