use crate::alg::{descriptor, AlgorithmDescriptor, Family, HashAlgorithm};

/// The native compression-function state for whichever family the
/// algorithm belongs to. This is exactly what gets read back out of (or
/// restored into) a restorable hardware core between blocks,
/// and what the software fallback keeps in place of a core.
#[derive(Clone, Copy)]
pub(crate) enum DigestState {
    Sha1([u32; 5]),
    Sha256([u32; 8]),
    Sha512([u64; 8]),
}

// FIPS 180-4 initial hash values.
const SHA1_IV: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];
const SHA256_IV: [u32; 8] =
    [0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19];
const SHA224_IV: [u32; 8] =
    [0xc1059ed8, 0x367cd507, 0x3070dd17, 0xf70e5939, 0xffc00b31, 0x68581511, 0x64f98fa7, 0xbefa4fa4];
const SHA512_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];
const SHA384_IV: [u64; 8] = [
    0xcbbb9d5dc1059ed8,
    0x629a292a367cd507,
    0x9159015a3070dd17,
    0x152fecd8f70e5939,
    0x67332667ffc00b31,
    0x8eb44a8768581511,
    0xdb0c2e0d64f98fa7,
    0x47b5481dbefa4fa4,
];
const SHA512_224_IV: [u64; 8] = [
    0x8C3D37C819544DA2,
    0x73E1996689DCD4D6,
    0x1DFAB7AE32FF9C82,
    0x679DD514582F9FCF,
    0x0F6D2B697BD44DA8,
    0x77E36F7304C48942,
    0x3F9D85A86A1D36C8,
    0x1112E6AD91D692A1,
];
const SHA512_256_IV: [u64; 8] = [
    0x22312194FC2BF72C,
    0x9F555FA3C84C64C2,
    0x2393B86B6F53B151,
    0x963877195940EABD,
    0x96283EE2A88EFFE3,
    0xBE5E1E2553863992,
    0x2B0199FC2C85B8AA,
    0x0EB72DDC81C52CA2,
];

pub(crate) fn initial_state(alg: HashAlgorithm) -> DigestState {
    use HashAlgorithm::*;
    match alg {
        Sha1 => DigestState::Sha1(SHA1_IV),
        Sha224 => DigestState::Sha256(SHA224_IV),
        Sha256 => DigestState::Sha256(SHA256_IV),
        Sha384 => DigestState::Sha512(SHA384_IV),
        Sha512 => DigestState::Sha512(SHA512_IV),
        Sha512Trunc224 => DigestState::Sha512(SHA512_224_IV),
        Sha512Trunc256 => DigestState::Sha512(SHA512_256_IV),
    }
}

/// Run one 64- or 128-byte message block through the compression function
/// for `state`'s family, in place. This is the software fallback: the exact
/// same operation a restorable hardware core performs on an INIT/NEXT pulse
/// using the RustCrypto `sha1`/`sha2` crates' own block
/// compression routines rather than hand-rolling them.
pub(crate) fn compress_block(state: &mut DigestState, block: &[u8]) {
    match state {
        DigestState::Sha1(s) => {
            let block = digest::generic_array::GenericArray::clone_from_slice(block);
            sha1::compress(s, &[block]);
        }
        DigestState::Sha256(s) => {
            let block = digest::generic_array::GenericArray::clone_from_slice(block);
            sha2::compress256(s, &[block]);
        }
        DigestState::Sha512(s) => {
            let block = digest::generic_array::GenericArray::clone_from_slice(block);
            sha2::compress512(s, &[block]);
        }
    }
}

/// A fixed-capacity byte buffer big enough for the largest digest (64
/// bytes), used so this crate does not need `alloc` for what is always a
/// small, statically-bounded output.
#[derive(Clone, Copy, Debug)]
pub struct DigestBytes {
    buf: [u8; 64],
    len: usize,
}

impl DigestBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Truncate (never grow) the visible length.
    pub fn set_len(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

impl PartialEq for DigestBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
impl Eq for DigestBytes {}

/// Serialize `state` as big-endian words, truncated to the algorithm's
/// digest length. This both produces the final digest and is the
/// "restore state" wire format exchanged with a restorable hardware core.
pub(crate) fn digest_bytes(alg: HashAlgorithm, state: &DigestState) -> DigestBytes {
    let mut buf = [0u8; 64];
    let full_len = match state {
        DigestState::Sha1(s) => {
            for (i, w) in s.iter().enumerate() {
                buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
            }
            s.len() * 4
        }
        DigestState::Sha256(s) => {
            for (i, w) in s.iter().enumerate() {
                buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
            }
            s.len() * 4
        }
        DigestState::Sha512(s) => {
            for (i, w) in s.iter().enumerate() {
                buf[i * 8..i * 8 + 8].copy_from_slice(&w.to_be_bytes());
            }
            s.len() * 8
        }
    };
    let len = descriptor(alg).digest_len.min(full_len);
    DigestBytes { buf, len }
}
