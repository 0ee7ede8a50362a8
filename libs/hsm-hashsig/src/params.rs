//! Parameter tables from draft-mcgrew-hash-sigs, restricted to the
//! SHA-256/n=32 parameter family (the only one the original firmware wires
//! up). Type codes match the IANA-registered values used on the wire.

/// `D_PBLC`, `D_MESG`, `D_LEAF`, `D_INTR`: the fixed 16-bit domain
/// separators mixed into every hash in this scheme, distinguishing an
/// LM-OTS public-key hash from a message hash from a Merkle leaf from a
/// Merkle interior node.
pub const D_PBLC: u16 = 0x8080;
pub const D_MESG: u16 = 0x8181;
pub const D_LEAF: u16 = 0x8282;
pub const D_INTR: u16 = 0x8383;

/// Digest width used throughout (`n` in the draft); this workspace only
/// implements the SHA-256 parameter family.
pub const N: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmotsType {
    W1,
    W2,
    W4,
    W8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LmotsParams {
    pub w: u32,
    pub p: usize,
    pub ls: u32,
}

impl LmotsType {
    pub fn wire_code(self) -> u32 {
        match self {
            LmotsType::W1 => 1,
            LmotsType::W2 => 2,
            LmotsType::W4 => 3,
            LmotsType::W8 => 4,
        }
    }

    pub fn from_wire_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => LmotsType::W1,
            2 => LmotsType::W2,
            3 => LmotsType::W4,
            4 => LmotsType::W8,
            _ => return None,
        })
    }

    pub fn params(self) -> LmotsParams {
        match self {
            LmotsType::W1 => LmotsParams { w: 1, p: 265, ls: 7 },
            LmotsType::W2 => LmotsParams { w: 2, p: 133, ls: 6 },
            LmotsType::W4 => LmotsParams { w: 4, p: 67, ls: 4 },
            LmotsType::W8 => LmotsParams { w: 8, p: 34, ls: 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmsType {
    H5,
    H10,
    H15,
    H20,
    H25,
}

impl LmsType {
    pub fn wire_code(self) -> u32 {
        match self {
            LmsType::H5 => 5,
            LmsType::H10 => 6,
            LmsType::H15 => 7,
            LmsType::H20 => 8,
            LmsType::H25 => 9,
        }
    }

    pub fn from_wire_code(code: u32) -> Option<Self> {
        Some(match code {
            5 => LmsType::H5,
            6 => LmsType::H10,
            7 => LmsType::H15,
            8 => LmsType::H20,
            9 => LmsType::H25,
            _ => return None,
        })
    }

    pub fn h(self) -> u32 {
        match self {
            LmsType::H5 => 5,
            LmsType::H10 => 10,
            LmsType::H15 => 15,
            LmsType::H20 => 20,
            LmsType::H25 => 25,
        }
    }

    /// Number of leaves, `2^h`.
    pub fn leaves(self) -> u32 {
        1u32 << self.h()
    }
}

/// `coef(S, i, w)`: the `i`th `w`-bit element of the byte string `S`,
/// treating `S` as a big-endian bitstring of `w`-bit digits.
pub fn coef(s: &[u8], i: usize, w: u32) -> u8 {
    match w {
        1 => (s[i / 8] >> (7 - (i % 8))) & 0x01,
        2 => (s[i / 4] >> (6 - 2 * (i % 4))) & 0x03,
        4 => (s[i / 2] >> (4 - 4 * (i % 2))) & 0x0f,
        8 => s[i],
        _ => 0,
    }
}

/// `Cksm(S)`: the Winternitz checksum over `S`'s `8n/w` digits, left-shifted
/// by `ls` so it packs into the low bits after the hash when appended.
pub fn checksum(s: &[u8], params: LmotsParams) -> u16 {
    let digits = (N as u32 * 8) / params.w;
    let mut sum: u32 = 0;
    for i in 0..digits as usize {
        sum += ((1u32 << params.w) - 1) - coef(s, i, params.w) as u32;
    }
    ((sum as u16) << params.ls) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coef_w8_is_identity() {
        let s = [0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(coef(&s, 0, 8), 0xDE);
        assert_eq!(coef(&s, 3, 8), 0xEF);
    }

    #[test]
    fn coef_w1_extracts_bits_msb_first() {
        let s = [0b1010_0000];
        assert_eq!(coef(&s, 0, 1), 1);
        assert_eq!(coef(&s, 1, 1), 0);
        assert_eq!(coef(&s, 2, 1), 1);
    }

    #[test]
    fn checksum_of_all_zero_digits_is_maximal() {
        let s = [0u8; 32];
        let params = LmotsType::W8.params();
        // every digit is 0, so every term contributes (2^w - 1); ls is 0 for w8.
        assert_eq!(checksum(&s, params), 255 * 32);
    }
}
