//! A bare 16-byte random name, not an RFC 4122 UUID: no version/variant bits
//! are reserved, so the full 128 bits come from the TRNG. Block names and
//! HSS/LMS tree identifiers (`I`) are drawn from the same generator.

/// Anything that can hand back TRNG bytes. Implemented over the FPGA CSPRNG
/// core by the firmware binary; hosted tests supply a deterministic stand-in.
pub trait Trng {
    fn fill(&mut self, buf: &mut [u8]);
}

pub type Uuid = [u8; 16];

pub const NIL_UUID: Uuid = [0u8; 16];

pub fn generate(trng: &mut dyn Trng) -> Uuid {
    let mut out = [0u8; 16];
    trng.fill(&mut out);
    out
}

#[cfg(any(test, feature = "hosted"))]
pub struct CountingTrng {
    next: u64,
}

#[cfg(any(test, feature = "hosted"))]
impl CountingTrng {
    pub fn new() -> Self {
        CountingTrng { next: 1 }
    }
}

#[cfg(any(test, feature = "hosted"))]
impl Default for CountingTrng {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "hosted"))]
impl Trng for CountingTrng {
    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let n = self.next;
            self.next += 1;
            let bytes = n.to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
