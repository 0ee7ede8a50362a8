use crate::alg::{descriptor, HashAlgorithm};
use crate::error::HashError;
use crate::hash::{hash_finalize, hash_initialize, hash_update, HashState};
use crate::state::DigestBytes;

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5C;

/// HMAC streaming state: an inner hash plus the block-sized key buffer
/// preserved across update/finalize. If the supplied key is
/// longer than the block length it is hashed down first; otherwise it is
/// zero-padded to block length.
pub struct HmacState {
    alg: HashAlgorithm,
    key_block: [u8; 128],
    inner: HashState,
}

fn derive_key_block(alg: HashAlgorithm, key: &[u8]) -> [u8; 128] {
    let desc = descriptor(alg);
    let mut block = [0u8; 128];
    if key.len() > desc.block_len {
        let mut hs = hash_initialize(alg);
        hash_update(&mut hs, key);
        let digest = hash_finalize(&mut hs, desc.digest_len).expect("digest length is always valid here");
        block[..digest.as_slice().len()].copy_from_slice(digest.as_slice());
    } else {
        block[..key.len()].copy_from_slice(key);
    }
    block
}

/// `HASH_INITIALIZE` with a non-empty key.
pub fn hmac_initialize(alg: HashAlgorithm, key: &[u8]) -> HmacState {
    let key_block = derive_key_block(alg, key);
    let block_len = descriptor(alg).block_len;
    let mut inner = hash_initialize(alg);
    let mut ipad_block = [0u8; 128];
    for i in 0..block_len {
        ipad_block[i] = key_block[i] ^ IPAD;
    }
    hash_update(&mut inner, &ipad_block[..block_len]);
    HmacState { alg, key_block, inner }
}

pub fn hmac_update(hm: &mut HmacState, data: &[u8]) {
    hash_update(&mut hm.inner, data);
}

impl HmacState {
    pub fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }
}

pub fn hmac_finalize(hm: &mut HmacState, out_len: usize) -> Result<DigestBytes, HashError> {
    let desc = descriptor(hm.alg);
    let inner_digest = hash_finalize(&mut hm.inner, desc.digest_len)?;

    let mut outer = hash_initialize(hm.alg);
    let mut opad_block = [0u8; 128];
    for i in 0..desc.block_len {
        opad_block[i] = hm.key_block[i] ^ OPAD;
    }
    hash_update(&mut outer, &opad_block[..desc.block_len]);
    hash_update(&mut outer, inner_digest.as_slice());
    hash_finalize(&mut outer, out_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_rfc4231_case1() {
        // RFC 4231 test case 1.
        let key = [0x0bu8; 20];
        let data = b"Hi There";
        let mut hm = hmac_initialize(HashAlgorithm::Sha256, &key);
        hmac_update(&mut hm, data);
        let out = hmac_finalize(&mut hm, 32).unwrap();
        assert_eq!(hex::encode(out.as_slice()), "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7");
    }

    #[test]
    fn long_key_is_hashed_down_first() {
        // RFC 4231 test case 6: a 131-byte key exceeds SHA-256's 64-byte
        // block length and must be hashed down before use.
        let key = [0xaau8; 131];
        let data = b"Test Using Larger Than Block-Size Key - Hash Key First";
        let mut hm = hmac_initialize(HashAlgorithm::Sha256, &key);
        hmac_update(&mut hm, data);
        let out = hmac_finalize(&mut hm, 32).unwrap();
        assert_eq!(
            hex::encode(out.as_slice()),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }
}
