//! AES Key Wrap with Padding (RFC 5649), generalized over 128- and 256-bit
//! KEKs. Adapted from a vendored AES-KW implementation
//! (originally `jedisct1/rust-aes-keywrap`) that only wrapped under a fixed
//! 256-bit key; both 128- and 256-bit KEKs are needed here, so the cipher is
//! a generic parameter instead of a hardcoded `Aes256`.
#![forbid(unsafe_code)]

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use byteorder::{BigEndian, ByteOrder};

const FEISTEL_ROUNDS: usize = 5;
const MAC_BYTES: usize = 8;
/// RFC 5649 alternative initial value, high 4 bytes.
const AIV_MAGIC: [u8; 4] = [0xA6, 0x59, 0x59, 0xA6];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywrapError {
    /// RFC 5649 requires at least one octet of plaintext.
    Empty,
    /// Input is too large to wrap (RFC 5649 bounds input to `u32::MAX`
    /// bytes and requires no Feistel-round counter overflow).
    TooBig,
    /// Wrapped input length is not a multiple of 8 bytes.
    Unpadded,
    /// Wrapped input is shorter than the 8-byte integrity MAC.
    TooSmall,
    /// `expected_len` cannot possibly describe data of the unwrapped size.
    InvalidExpectedLen,
    /// The integrity check embedded in the AIV did not match on unwrap.
    AuthenticationFailed,
}

impl core::fmt::Display for KeywrapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            KeywrapError::Empty => "plaintext must be at least one byte",
            KeywrapError::TooBig => "plaintext too large to wrap",
            KeywrapError::Unpadded => "wrapped data length is not a multiple of 8",
            KeywrapError::TooSmall => "wrapped data shorter than the integrity MAC",
            KeywrapError::InvalidExpectedLen => "expected length is inconsistent with wrapped data",
            KeywrapError::AuthenticationFailed => "key-wrap integrity check failed",
        };
        f.write_str(s)
    }
}

impl std::error::Error for KeywrapError {}

/// A KEK-wrap/unwrap session over one AES block cipher instance.
pub struct KeyWrap<C> {
    cipher: C,
}

impl<C> KeyWrap<C>
where
    C: BlockEncrypt + BlockDecrypt,
{
    pub fn new(cipher: C) -> Self {
        KeyWrap { cipher }
    }

    /// RFC 5649 `W` (wrap with padding). `input` may be any length from 1
    /// byte up; output is `((input.len() + 7) & !7) + 8` bytes.
    pub fn wrap(&self, input: &[u8]) -> Result<Vec<u8>, KeywrapError> {
        if input.is_empty() {
            return Err(KeywrapError::Empty);
        }
        if input.len() > u32::MAX as usize || input.len() as u64 >= u64::MAX / FEISTEL_ROUNDS as u64 {
            return Err(KeywrapError::TooBig);
        }

        let mut aiv = [0u8; 8];
        aiv[0..4].copy_from_slice(&AIV_MAGIC);
        BigEndian::write_u32(&mut aiv[4..8], input.len() as u32);

        let mut block = GenericArray::clone_from_slice(&[0u8; 16]);
        block[0..8].copy_from_slice(&aiv);

        // RFC 5649 §4.1: inputs of exactly one semi-block skip the Feistel
        // network and are wrapped with a single block-cipher encryption.
        if input.len() == 8 {
            block[8..16].copy_from_slice(input);
            self.cipher.encrypt_block(&mut block);
            return Ok(block.to_vec());
        }

        let padded_len = (input.len() + 7) & !7;
        let mut output = vec![0u8; padded_len + MAC_BYTES];
        output[8..][..input.len()].copy_from_slice(input);

        let mut counter = 0u64;
        for _ in 0..FEISTEL_ROUNDS {
            let mut i = 8;
            while i <= padded_len {
                block[8..16].copy_from_slice(&output[i..][..8]);
                self.cipher.encrypt_block(&mut block);
                counter += 1;
                let mut counter_bin = [0u8; 8];
                BigEndian::write_u64(&mut counter_bin, counter);
                for (a, b) in block[8..16].iter_mut().zip(counter_bin.iter()) {
                    *a ^= b;
                }
                output[i..i + 8].copy_from_slice(&block[8..16]);
                i += 8;
            }
        }
        output[0..8].copy_from_slice(&block[0..8]);
        Ok(output)
    }

    /// RFC 5649 unwrap. `expected_len` is the plaintext length the caller
    /// believes this ciphertext decodes to; it is validated against the
    /// length embedded in the AIV, not merely trusted.
    pub fn unwrap(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, KeywrapError> {
        if input.len() % 8 != 0 {
            return Err(KeywrapError::Unpadded);
        }
        let output_len = input.len().checked_sub(MAC_BYTES).ok_or(KeywrapError::TooSmall)?;
        if output_len > u32::MAX as usize || output_len as u64 >= u64::MAX / FEISTEL_ROUNDS as u64 {
            return Err(KeywrapError::TooBig);
        }
        if expected_len > output_len || (expected_len & !7) > output_len {
            return Err(KeywrapError::InvalidExpectedLen);
        }

        let mut aiv = [0u8; 8];
        aiv[0..4].copy_from_slice(&AIV_MAGIC);
        BigEndian::write_u32(&mut aiv[4..8], expected_len as u32);

        let mut block = GenericArray::clone_from_slice(&[0u8; 16]);

        if output_len == 8 {
            block.copy_from_slice(input);
            self.cipher.decrypt_block(&mut block);
            let diff = block[0..8].iter().zip(aiv.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b));
            if diff != 0 {
                return Err(KeywrapError::AuthenticationFailed);
            }
            return Ok(block[8..16].to_vec());
        }

        let mut output = vec![0u8; output_len];
        output.copy_from_slice(&input[8..]);
        block[0..8].copy_from_slice(&input[0..8]);

        let mut counter = (FEISTEL_ROUNDS * output_len / 8) as u64;
        for _ in 0..FEISTEL_ROUNDS {
            let mut i = output_len;
            while i >= 8 {
                i -= 8;
                block[8..16].copy_from_slice(&output[i..][..8]);
                let mut counter_bin = [0u8; 8];
                BigEndian::write_u64(&mut counter_bin, counter);
                counter -= 1;
                for (a, b) in block[8..16].iter_mut().zip(counter_bin.iter()) {
                    *a ^= b;
                }
                self.cipher.decrypt_block(&mut block);
                output[i..][..8].copy_from_slice(&block[8..16]);
            }
        }

        let diff = block[0..8].iter().zip(aiv.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(KeywrapError::AuthenticationFailed);
        }
        output.truncate(expected_len);
        Ok(output)
    }
}

pub fn wrap_aes128(key: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, KeywrapError> {
    KeyWrap::new(aes::Aes128::new(key.into())).wrap(plaintext)
}

pub fn unwrap_aes128(key: &[u8; 16], wrapped: &[u8], expected_len: usize) -> Result<Vec<u8>, KeywrapError> {
    KeyWrap::new(aes::Aes128::new(key.into())).unwrap(wrapped, expected_len)
}

pub fn wrap_aes256(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, KeywrapError> {
    KeyWrap::new(aes::Aes256::new(key.into())).wrap(plaintext)
}

pub fn unwrap_aes256(key: &[u8; 32], wrapped: &[u8], expected_len: usize) -> Result<Vec<u8>, KeywrapError> {
    KeyWrap::new(aes::Aes256::new(key.into())).unwrap(wrapped, expected_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_16_byte_plaintext_with_zero_key() {
        let key = [0u8; 32];
        let plaintext = b"0123456789ABCDEF";
        let wrapped = wrap_aes256(&key, plaintext).unwrap();
        assert_eq!(wrapped.len(), 24);
        assert_eq!(&wrapped[0..4], &AIV_MAGIC);
        let unwrapped = unwrap_aes256(&key, &wrapped, plaintext.len()).unwrap();
        assert_eq!(unwrapped, plaintext);
    }

    #[test]
    fn round_trip_single_block_semiblock_path() {
        let key = [0x11u8; 32];
        let plaintext = b"ABCDEFGH"; // exactly 8 bytes
        let wrapped = wrap_aes256(&key, plaintext).unwrap();
        assert_eq!(wrapped.len(), 16);
        let unwrapped = unwrap_aes256(&key, &wrapped, 8).unwrap();
        assert_eq!(unwrapped, plaintext);
    }

    #[test]
    fn round_trip_unaligned_plaintext() {
        let key = [0x42u8; 16];
        let plaintext = b"odd length!"; // 11 bytes, not a multiple of 8
        let wrapped = wrap_aes128(&key, plaintext).unwrap();
        let unwrapped = unwrap_aes128(&key, &wrapped, plaintext.len()).unwrap();
        assert_eq!(unwrapped, plaintext);
    }

    #[test]
    fn corrupted_ciphertext_fails_authentication() {
        let key = [0x77u8; 32];
        let plaintext = b"secret material";
        let mut wrapped = wrap_aes256(&key, plaintext).unwrap();
        *wrapped.last_mut().unwrap() ^= 0xFF;
        assert_eq!(unwrap_aes256(&key, &wrapped, plaintext.len()), Err(KeywrapError::AuthenticationFailed));
    }

    #[test]
    fn rejects_empty_plaintext() {
        let key = [0u8; 32];
        assert_eq!(wrap_aes256(&key, &[]), Err(KeywrapError::Empty));
    }

    #[test]
    fn wraps_zero_key_sample_vector_with_expected_magic_bytes() {
        // RFC 5649 Appendix A's all-zero-key sample wrap.
        let key = [0u8; 32];
        let plaintext = b"0123456789ABCDEF";
        let wrapped = wrap_aes256(&key, plaintext).unwrap();
        assert_eq!(wrapped.len(), 24);
        assert_eq!(&wrapped[0..4], &[0xA6, 0x59, 0x59, 0xA6]);
        assert_eq!(unwrap_aes256(&key, &wrapped, plaintext.len()).unwrap(), plaintext);
    }
}
