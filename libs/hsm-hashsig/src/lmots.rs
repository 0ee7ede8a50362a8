//! LM-OTS: a single Winternitz one-time signature (draft-mcgrew-hash-sigs
//! §3). Each leaf's private elements `x[0..p)` are derived from a 32-byte
//! seed plus the leaf's `(I, q)` rather than drawn independently and stored,
//! so an entire LMS subtree regenerates from one seed instead of needing
//! `p * 2^h` persisted values.

use crate::error::HashSigError;
use crate::params::{checksum, coef, LmotsParams, LmotsType, D_MESG, D_PBLC, N};
use hsm_hash::{hash_finalize, hash_initialize, hash_update, HashAlgorithm};

/// Domain tag for the seed-to-`x[i]` derivation. Not part of the wire
/// format; purely an internal key-generation choice.
const D_SEED: u8 = 0xff;

pub(crate) fn h(parts: &[&[u8]]) -> [u8; N] {
    let mut hs = hash_initialize(HashAlgorithm::Sha256);
    for p in parts {
        hash_update(&mut hs, p);
    }
    let digest = hash_finalize(&mut hs, N).expect("N does not exceed sha256's digest length");
    let mut out = [0u8; N];
    out.copy_from_slice(digest.as_slice());
    out
}

fn chain(i: &[u8; 16], q: u32, idx: usize, start: [u8; N], from: u8, to: u8) -> [u8; N] {
    let mut tmp = start;
    for j in from..to {
        tmp = h(&[i, &q.to_be_bytes(), &(idx as u16).to_be_bytes(), &[j], &tmp]);
    }
    tmp
}

/// One LM-OTS leaf's private key, entirely reconstructible from
/// `(seed, i, q)`.
#[derive(Clone)]
pub struct LmOtsPrivateKey {
    pub lmots_type: LmotsType,
    pub seed: [u8; 32],
    pub i: [u8; 16],
    pub q: u32,
}

impl LmOtsPrivateKey {
    fn x(&self, idx: usize) -> [u8; N] {
        h(&[&self.i, &self.q.to_be_bytes(), &(idx as u16).to_be_bytes(), &[D_SEED], &self.seed])
    }

    /// `K`: the public key for this one-time key, built by chaining every
    /// `x[i]` all the way to `2^w - 1` and hashing the concatenation.
    pub fn public_key(&self) -> [u8; N] {
        let params = self.lmots_type.params();
        let top = (1u32 << params.w) as u8 - 1;
        let mut buf = Vec::with_capacity(params.p * N);
        for idx in 0..params.p {
            buf.extend_from_slice(&chain(&self.i, self.q, idx, self.x(idx), 0, top));
        }
        h(&[&self.i, &self.q.to_be_bytes(), &D_PBLC.to_be_bytes(), &buf])
    }

    /// Sign `message`, returning `u32(type) || C || y[0..p)`.
    pub fn sign(&self, message: &[u8], c: [u8; N]) -> Vec<u8> {
        let params = self.lmots_type.params();
        let qc = message_digest_with_checksum(&self.i, self.q, &c, message, params);

        let mut out = Vec::with_capacity(4 + N + params.p * N);
        out.extend_from_slice(&self.lmots_type.wire_code().to_be_bytes());
        out.extend_from_slice(&c);
        for idx in 0..params.p {
            let a = coef(&qc, idx, params.w);
            out.extend_from_slice(&chain(&self.i, self.q, idx, self.x(idx), 0, a));
        }
        out
    }
}

/// `Q || Cksm(Q)`, the value whose `w`-bit digits select how far each chain
/// is advanced for both signing and the public-key candidate computation.
fn message_digest_with_checksum(i: &[u8; 16], q: u32, c: &[u8; N], message: &[u8], params: LmotsParams) -> Vec<u8> {
    let qhash = h(&[i, &q.to_be_bytes(), &D_MESG.to_be_bytes(), c, message]);
    let mut qc = qhash.to_vec();
    qc.extend_from_slice(&checksum(&qhash, params).to_be_bytes());
    qc
}

/// Reconstruct the public key a signature would have come from, without
/// knowing the private elements — used by both standalone verification and
/// by the enclosing LMS leaf-hash check.
pub fn public_key_candidate(i: &[u8; 16], q: u32, message: &[u8], signature: &[u8]) -> Result<[u8; N], HashSigError> {
    if signature.len() < 4 + N {
        return Err(HashSigError::Malformed);
    }
    let type_code = u32::from_be_bytes(signature[0..4].try_into().unwrap());
    let lmots_type = LmotsType::from_wire_code(type_code).ok_or(HashSigError::Malformed)?;
    let params = lmots_type.params();
    if signature.len() != 4 + N + params.p * N {
        return Err(HashSigError::Malformed);
    }
    let c: [u8; N] = signature[4..4 + N].try_into().unwrap();
    let qc = message_digest_with_checksum(i, q, &c, message, params);

    let top = (1u32 << params.w) as u8 - 1;
    let mut buf = Vec::with_capacity(params.p * N);
    for idx in 0..params.p {
        let a = coef(&qc, idx, params.w);
        let y: [u8; N] = signature[4 + N + idx * N..4 + N + (idx + 1) * N].try_into().unwrap();
        buf.extend_from_slice(&chain(i, q, idx, y, a, top));
    }
    Ok(h(&[i, &q.to_be_bytes(), &D_PBLC.to_be_bytes(), &buf]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(q: u32) -> LmOtsPrivateKey {
        LmOtsPrivateKey { lmots_type: LmotsType::W8, seed: [0x11; 32], i: [0x22; 16], q }
    }

    #[test]
    fn sign_then_candidate_recovers_public_key() {
        let key = leaf(3);
        let pk = key.public_key();
        let sig = key.sign(b"hello world", [0x33; N]);
        let candidate = public_key_candidate(&key.i, key.q, b"hello world", &sig).unwrap();
        assert_eq!(candidate, pk);
    }

    #[test]
    fn candidate_differs_for_wrong_message() {
        let key = leaf(0);
        let sig = key.sign(b"message one", [0xaa; N]);
        let pk = key.public_key();
        let candidate = public_key_candidate(&key.i, key.q, b"message two", &sig).unwrap();
        assert_ne!(candidate, pk);
    }

    #[test]
    fn different_leaves_derive_different_keys() {
        assert_ne!(leaf(0).public_key(), leaf(1).public_key());
    }

    #[test]
    fn candidate_rejects_truncated_signature() {
        let key = leaf(0);
        let sig = key.sign(b"m", [0; N]);
        assert_eq!(public_key_candidate(&key.i, key.q, b"m", &sig[..10]), Err(HashSigError::Malformed));
    }
}
