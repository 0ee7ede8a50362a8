use crate::alg::{descriptor, HashAlgorithm};
use crate::error::HashError;
use crate::state::{compress_block, digest_bytes, initial_state, DigestBytes, DigestState};

/// Streaming digest state. Holds the accumulated
/// message length, a partial block of up to 128 bytes, and the running
/// compression state — the software-fallback analogue of "saved digest
/// state for core-to-core restoration" plus a cached allocator tag for the
/// hardware path.
pub struct HashState {
    alg: HashAlgorithm,
    state: DigestState,
    buffer: [u8; 128],
    buffer_len: usize,
    /// total message bytes seen so far, across both flushed blocks and the
    /// current partial buffer.
    total_len: u128,
    finalized: bool,
}

/// Begin a new streaming hash. Mirrors `HASH_INITIALIZE` when called with an empty key; HMAC initialization wraps
/// this (see [`crate::hmac`]).
pub fn hash_initialize(alg: HashAlgorithm) -> HashState {
    HashState { alg, state: initial_state(alg), buffer: [0u8; 128], buffer_len: 0, total_len: 0, finalized: false }
}

/// Feed more message bytes in. Complete blocks are compressed immediately;
/// Merkle-Damgård construction guarantees this is valid regardless of
/// whether the block later turns out to be the last one, since finalize()
/// simply continues from the running state.
pub fn hash_update(hs: &mut HashState, mut data: &[u8]) {
    let block_len = descriptor(hs.alg).block_len;
    while !data.is_empty() {
        let space = block_len - hs.buffer_len;
        let take = space.min(data.len());
        hs.buffer[hs.buffer_len..hs.buffer_len + take].copy_from_slice(&data[..take]);
        hs.buffer_len += take;
        hs.total_len += take as u128;
        data = &data[take..];
        if hs.buffer_len == block_len {
            let block = hs.buffer;
            compress_block(&mut hs.state, &block[..block_len]);
            hs.buffer_len = 0;
        }
    }
}

/// Pad, process the final block(s), and return the digest truncated to
/// `out_len` bytes. `out_len` must not exceed the algorithm's natural digest
/// length.
pub fn hash_finalize(hs: &mut HashState, out_len: usize) -> Result<DigestBytes, HashError> {
    let desc = descriptor(hs.alg);
    if out_len > desc.digest_len {
        return Err(HashError::ResultTooLong);
    }

    let bit_len = hs.total_len * 8;
    let mut work = [0u8; 256];
    work[..hs.buffer_len].copy_from_slice(&hs.buffer[..hs.buffer_len]);
    let mut pos = hs.buffer_len;
    work[pos] = 0x80;
    pos += 1;

    let remainder = (pos + desc.len_field_bytes) % desc.block_len;
    let zeros = if remainder == 0 { 0 } else { desc.block_len - remainder };
    pos += zeros; // `work` is already zero-initialized

    if desc.len_field_bytes == 16 {
        work[pos..pos + 16].copy_from_slice(&bit_len.to_be_bytes());
    } else {
        work[pos..pos + 8].copy_from_slice(&(bit_len as u64).to_be_bytes());
    }
    pos += desc.len_field_bytes;
    debug_assert_eq!(pos % desc.block_len, 0);

    for block in work[..pos].chunks(desc.block_len) {
        compress_block(&mut hs.state, block);
    }

    hs.finalized = true;
    let mut digest = digest_bytes(hs.alg, &hs.state);
    digest.set_len(out_len);
    Ok(digest)
}

impl HashState {
    pub fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

/// `HASH_GET_DIGEST_LEN`.
pub fn digest_len(alg: HashAlgorithm) -> usize {
    descriptor(alg).digest_len
}

/// `HASH_GET_DIGEST_ALGORITHM_ID`. Returns an
/// error if `max` is too small to hold the (fixed, small) identifier blob.
pub fn digest_algorithm_id(alg: HashAlgorithm, max: usize) -> Result<&'static [u8], HashError> {
    let id = descriptor(alg).digest_algorithm_id;
    if id.len() > max {
        return Err(HashError::ResultTooLong);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(alg: HashAlgorithm, data: &[u8]) -> String {
        let mut hs = hash_initialize(alg);
        hash_update(&mut hs, data);
        let out = hash_finalize(&mut hs, digest_len(alg)).unwrap();
        hex::encode(out.as_slice())
    }

    #[test]
    fn sha256_empty_string() {
        assert_eq!(
            digest_hex(HashAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_abc() {
        assert_eq!(
            digest_hex(HashAlgorithm::Sha256, b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha1_abc() {
        assert_eq!(digest_hex(HashAlgorithm::Sha1, b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha512_abc() {
        let expected = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";
        assert_eq!(digest_hex(HashAlgorithm::Sha512, b"abc"), expected);
    }

    #[test]
    fn incremental_update_matches_single_update() {
        let msg = b"the quick brown fox jumps over the lazy dog, repeated for extra blocks of content";
        let mut whole = hash_initialize(HashAlgorithm::Sha256);
        hash_update(&mut whole, msg);
        let whole_digest = hash_finalize(&mut whole, 32).unwrap();

        let mut split = hash_initialize(HashAlgorithm::Sha256);
        for chunk in msg.chunks(7) {
            hash_update(&mut split, chunk);
        }
        let split_digest = hash_finalize(&mut split, 32).unwrap();
        assert_eq!(whole_digest.as_slice(), split_digest.as_slice());
    }

    #[test]
    fn finalize_rejects_output_longer_than_digest() {
        let mut hs = hash_initialize(HashAlgorithm::Sha256);
        hash_update(&mut hs, b"x");
        assert_eq!(hash_finalize(&mut hs, 64), Err(HashError::ResultTooLong));
    }

    #[test]
    fn truncated_variants_differ_from_full_variants() {
        let full = digest_hex(HashAlgorithm::Sha512, b"abc");
        let trunc = digest_hex(HashAlgorithm::Sha512Trunc256, b"abc");
        assert_ne!(&full[..64], trunc.as_str());
    }
}
