//! LMS: a Merkle tree of `2^h` LM-OTS leaves (draft-mcgrew-hash-sigs §5).
//!
//! A private key is `(seed, I, q, lms_type, lmots_type)`; the full tree
//! (leaf public keys and interior nodes) is rebuilt from the seed whenever a
//! signature or the public key is needed rather than kept persisted, so the
//! durable record is a few dozen bytes regardless of `h`.

use crate::error::HashSigError;
use crate::lmots::{self, LmOtsPrivateKey};
use crate::params::{LmotsType, LmsType, D_INTR, D_LEAF, N};

pub const PUBKEY_LEN: usize = 4 + 4 + 16 + N;

#[derive(Clone)]
pub struct LmsPrivateKey {
    pub lms_type: LmsType,
    pub lmots_type: LmotsType,
    pub seed: [u8; 32],
    pub i: [u8; 16],
    pub q: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LmsPublicKey {
    pub lms_type: LmsType,
    pub lmots_type: LmotsType,
    pub i: [u8; 16],
    pub t1: [u8; N],
}

impl LmsPublicKey {
    pub fn to_bytes(&self) -> [u8; PUBKEY_LEN] {
        let mut out = [0u8; PUBKEY_LEN];
        out[0..4].copy_from_slice(&self.lms_type.wire_code().to_be_bytes());
        out[4..8].copy_from_slice(&self.lmots_type.wire_code().to_be_bytes());
        out[8..24].copy_from_slice(&self.i);
        out[24..24 + N].copy_from_slice(&self.t1);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashSigError> {
        if bytes.len() != PUBKEY_LEN {
            return Err(HashSigError::Malformed);
        }
        let lms_type = LmsType::from_wire_code(u32::from_be_bytes(bytes[0..4].try_into().unwrap())).ok_or(HashSigError::Malformed)?;
        let lmots_type = LmotsType::from_wire_code(u32::from_be_bytes(bytes[4..8].try_into().unwrap())).ok_or(HashSigError::Malformed)?;
        let i = bytes[8..24].try_into().unwrap();
        let t1 = bytes[24..24 + N].try_into().unwrap();
        Ok(LmsPublicKey { lms_type, lmots_type, i, t1 })
    }
}

impl LmsPrivateKey {
    fn leaf_ots_key(&self, leaf: u32) -> LmOtsPrivateKey {
        LmOtsPrivateKey { lmots_type: self.lmots_type, seed: self.seed, i: self.i, q: leaf }
    }

    fn leaf_hash(&self, leaf: u32) -> [u8; N] {
        let k = self.leaf_ots_key(leaf).public_key();
        let r = self.lms_type.leaves() + leaf;
        lmots::h(&[&self.i, &r.to_be_bytes(), &D_LEAF.to_be_bytes(), &k])
    }

    /// Build the full `2 * 2^h`-node array (index 0 unused, `tree[1]` is the
    /// root). Cost and memory are `O(2^h)`; for the larger `h` values this
    /// mirrors the hardware design's reliance on an external SDRAM
    /// arena rather than anything that fits in a keystore block.
    fn build_tree(&self) -> Vec<[u8; N]> {
        let leaves = self.lms_type.leaves();
        let mut tree = vec![[0u8; N]; (2 * leaves) as usize];
        for leaf in 0..leaves {
            tree[(leaves + leaf) as usize] = self.leaf_hash(leaf);
            if leaf % 256 == 255 {
                hsm_rt::task_yield_maybe();
            }
        }
        for r in (1..leaves).rev() {
            tree[r as usize] = lmots::h(&[&self.i, &r.to_be_bytes(), &D_INTR.to_be_bytes(), &tree[(2 * r) as usize], &tree[(2 * r + 1) as usize]]);
        }
        tree
    }

    pub fn public_key(&self) -> LmsPublicKey {
        let tree = self.build_tree();
        LmsPublicKey { lms_type: self.lms_type, lmots_type: self.lmots_type, i: self.i, t1: tree[1] }
    }

    pub fn leaves_remaining(&self) -> u32 {
        self.lms_type.leaves().saturating_sub(self.q)
    }

    pub fn is_exhausted(&self) -> bool {
        self.q >= self.lms_type.leaves()
    }

    /// Sign `message` with the current leaf `q`. Does not advance `q`;
    /// the caller persists the new counter before consuming the result.
    pub fn sign(&self, message: &[u8], c: [u8; N]) -> Result<Vec<u8>, HashSigError> {
        if self.is_exhausted() {
            return Err(HashSigError::KeyExhausted);
        }
        let ots_sig = self.leaf_ots_key(self.q).sign(message, c);
        let tree = self.build_tree();
        let leaves = self.lms_type.leaves();
        let mut idx = leaves + self.q;
        let mut path = Vec::with_capacity(self.lms_type.h() as usize);
        for _ in 0..self.lms_type.h() {
            path.extend_from_slice(&tree[(idx ^ 1) as usize]);
            idx /= 2;
        }

        let mut out = Vec::with_capacity(4 + ots_sig.len() + path.len());
        out.extend_from_slice(&self.q.to_be_bytes());
        out.extend_from_slice(&ots_sig);
        out.extend_from_slice(&path);
        Ok(out)
    }
}

/// Verify `signature` over `message` against `public_key`, reconstructing
/// the candidate root via the leaf's LM-OTS candidate and the authentication
/// path, and comparing against `T[1]`.
pub fn verify(public_key: &LmsPublicKey, message: &[u8], signature: &[u8]) -> Result<(), HashSigError> {
    if signature.len() < 4 {
        return Err(HashSigError::Malformed);
    }
    let q = u32::from_be_bytes(signature[0..4].try_into().unwrap());
    let leaves = public_key.lms_type.leaves();
    if q >= leaves {
        return Err(HashSigError::Malformed);
    }
    let ots_params = public_key.lmots_type.params();
    let ots_sig_len = 4 + N + ots_params.p * N;
    let h = public_key.lms_type.h() as usize;
    if signature.len() != 4 + ots_sig_len + h * N {
        return Err(HashSigError::Malformed);
    }
    let ots_sig = &signature[4..4 + ots_sig_len];
    let path = &signature[4 + ots_sig_len..];

    let k_candidate = lmots::public_key_candidate(&public_key.i, q, message, ots_sig)?;
    let mut idx = leaves + q;
    let mut node = lmots::h(&[&public_key.i, &idx.to_be_bytes(), &D_LEAF.to_be_bytes(), &k_candidate]);
    for level in 0..h {
        let sibling: [u8; N] = path[level * N..(level + 1) * N].try_into().unwrap();
        let parent_idx = idx / 2;
        node = if idx % 2 == 0 {
            lmots::h(&[&public_key.i, &parent_idx.to_be_bytes(), &D_INTR.to_be_bytes(), &node, &sibling])
        } else {
            lmots::h(&[&public_key.i, &parent_idx.to_be_bytes(), &D_INTR.to_be_bytes(), &sibling, &node])
        };
        idx = parent_idx;
    }

    if node == public_key.t1 {
        Ok(())
    } else {
        Err(HashSigError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LmsPrivateKey {
        LmsPrivateKey { lms_type: LmsType::H5, lmots_type: LmotsType::W8, seed: [0x77; 32], i: [0x88; 16], q: 0 }
    }

    #[test]
    fn sign_and_verify_every_leaf() {
        let mut priv_key = key();
        let pubkey = priv_key.public_key();
        for leaf in 0..priv_key.lms_type.leaves() {
            priv_key.q = leaf;
            let sig = priv_key.sign(b"a message", [leaf as u8; N]).unwrap();
            assert!(verify(&pubkey, b"a message", &sig).is_ok());
        }
    }

    #[test]
    fn signature_does_not_verify_against_different_message() {
        let mut priv_key = key();
        let pubkey = priv_key.public_key();
        priv_key.q = 2;
        let sig = priv_key.sign(b"message A", [9; N]).unwrap();
        assert_eq!(verify(&pubkey, b"message B", &sig), Err(HashSigError::InvalidSignature));
    }

    #[test]
    fn signing_past_the_last_leaf_fails() {
        let mut priv_key = key();
        priv_key.q = priv_key.lms_type.leaves();
        assert_eq!(priv_key.sign(b"m", [0; N]), Err(HashSigError::KeyExhausted));
    }

    #[test]
    fn pubkey_round_trips_through_bytes() {
        let pubkey = key().public_key();
        let bytes = pubkey.to_bytes();
        assert_eq!(LmsPublicKey::from_bytes(&bytes).unwrap(), pubkey);
    }
}
