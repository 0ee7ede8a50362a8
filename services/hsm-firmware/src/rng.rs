//! Adapts the workspace's infallible [`hsm_keystore::Trng`] contract onto
//! `rand_core`'s `RngCore`/`CryptoRng`, the traits `rsa`'s and `p256`/`p384`/
//! `p521`'s key-generation entry points expect. Keeps RSA/EC keygen drawing
//! from the same TRNG gate as the keystore and hashsig engine rather than
//! pulling in a second, independent randomness source.

use hsm_keystore::Trng;
use rand_core::{CryptoRng, Error, RngCore};

pub struct TrngRng<'a> {
    trng: &'a mut dyn Trng,
}

impl<'a> TrngRng<'a> {
    pub fn new(trng: &'a mut dyn Trng) -> Self {
        TrngRng { trng }
    }
}

impl RngCore for TrngRng<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.trng.fill(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.trng.fill(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.trng.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.trng.fill(dest);
        Ok(())
    }
}

impl CryptoRng for TrngRng<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_keystore::CountingTrng;
    use rand_core::RngCore;

    #[test]
    fn fill_bytes_draws_from_the_underlying_trng() {
        let mut trng = CountingTrng::new();
        let mut rng = TrngRng::new(&mut trng);
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
