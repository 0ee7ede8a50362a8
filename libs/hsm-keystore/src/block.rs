//! Block header and key/PIN block body layouts.

use crate::error::KsError;
use crate::uuid::{Uuid, NIL_UUID};
use crc::{Crc, CRC_32_ISO_HDLC};

pub const BLOCK_SIZE: usize = 8192;
pub const PAGE_SIZE: usize = 256;
const HEADER_LEN: usize = 8;
pub const BODY_LEN: usize = BLOCK_SIZE - HEADER_LEN;
const KEY_META_LEN: usize = 16 + 1 + 1 + 4 + 2 + 2;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Legacy compatibility bytes a valid block must carry.
const LEGACY_OK: [[u8; 2]; 2] = [[0xFF, 0xFF], [0x01, 0x00]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Erased,
    Zeroed,
    Key,
    Pin,
    Unknown,
}

impl BlockType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0xFF => BlockType::Erased,
            0x00 => BlockType::Zeroed,
            0x55 => BlockType::Key,
            0xAA => BlockType::Pin,
            _ => BlockType::Unknown,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            BlockType::Erased => 0xFF,
            BlockType::Zeroed => 0x00,
            BlockType::Key => 0x55,
            BlockType::Pin => 0xAA,
            BlockType::Unknown => 0x01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Live,
    Tombstone,
    Unknown,
}

impl BlockStatus {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x66 => BlockStatus::Live,
            0x44 => BlockStatus::Tombstone,
            _ => BlockStatus::Unknown,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            BlockStatus::Live => 0x66,
            BlockStatus::Tombstone => 0x44,
            BlockStatus::Unknown => 0x00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    RsaPrivate,
    RsaPublic,
    EcPrivate,
    EcPublic,
    HashsigPrivate,
    HashsigPublic,
    HashsigLms,
    HashsigLmots,
}

impl KeyType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => KeyType::RsaPrivate,
            1 => KeyType::RsaPublic,
            2 => KeyType::EcPrivate,
            3 => KeyType::EcPublic,
            4 => KeyType::HashsigPrivate,
            5 => KeyType::HashsigPublic,
            6 => KeyType::HashsigLms,
            7 => KeyType::HashsigLmots,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    None,
    P256,
    P384,
    P521,
}

impl Curve {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Curve::None,
            1 => Curve::P256,
            2 => Curve::P384,
            3 => Curve::P521,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Flag bits. A hand-rolled bitmask rather than a `bitflags`
/// wrapper, to keep the field a plain `u32` across the flash round trip.
pub mod flags {
    pub const USAGE_DIGITAL_SIGNATURE: u32 = 1 << 0;
    pub const USAGE_KEY_ENCIPHERMENT: u32 = 1 << 1;
    pub const USAGE_DATA_ENCIPHERMENT: u32 = 1 << 2;
    pub const TOKEN: u32 = 1 << 3;
    pub const PUBLIC: u32 = 1 << 4;
    pub const EXPORTABLE: u32 = 1 << 5;
}

#[derive(Debug, Clone)]
pub struct KeyBlockBody {
    pub name: Uuid,
    pub key_type: KeyType,
    pub curve: Curve,
    pub flags: u32,
    pub der: Vec<u8>,
    /// Raw TLV attribute bytes. Stored directly after the
    /// DER area rather than at the block's physical tail: every attribute
    /// operation addresses this as a flat `(bytes, len)` buffer,
    /// never by an absolute rear offset, so the in-memory layout here need
    /// not reproduce the flash's physical byte order.
    pub attrs: Vec<u8>,
}

impl KeyBlockBody {
    fn encode(&self, out: &mut [u8; BODY_LEN]) -> Result<(), KsError> {
        if KEY_META_LEN + self.der.len() + self.attrs.len() > BODY_LEN {
            return Err(KsError::ResultTooLong);
        }
        out[0..16].copy_from_slice(&self.name);
        out[16] = self.key_type.to_byte();
        out[17] = self.curve.to_byte();
        out[18..22].copy_from_slice(&self.flags.to_be_bytes());
        out[22..24].copy_from_slice(&(self.der.len() as u16).to_be_bytes());
        out[24..26].copy_from_slice(&(self.attrs.len() as u16).to_be_bytes());
        out[KEY_META_LEN..KEY_META_LEN + self.der.len()].copy_from_slice(&self.der);
        let attrs_start = KEY_META_LEN + self.der.len();
        out[attrs_start..attrs_start + self.attrs.len()].copy_from_slice(&self.attrs);
        Ok(())
    }

    fn decode(body: &[u8; BODY_LEN]) -> Result<Self, KsError> {
        let name: Uuid = body[0..16].try_into().unwrap();
        let key_type = KeyType::from_byte(body[16]).ok_or(KsError::BadBlockType)?;
        let curve = Curve::from_byte(body[17]).ok_or(KsError::BadBlockType)?;
        let flags = u32::from_be_bytes(body[18..22].try_into().unwrap());
        let der_len = u16::from_be_bytes(body[22..24].try_into().unwrap()) as usize;
        let attrs_len = u16::from_be_bytes(body[24..26].try_into().unwrap()) as usize;
        if KEY_META_LEN + der_len + attrs_len > BODY_LEN {
            return Err(KsError::BadBlockType);
        }
        let der = body[KEY_META_LEN..KEY_META_LEN + der_len].to_vec();
        let attrs_start = KEY_META_LEN + der_len;
        let attrs = body[attrs_start..attrs_start + attrs_len].to_vec();
        Ok(KeyBlockBody { name, key_type, curve, flags, der, attrs })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PinRecord {
    pub iterations: u32,
    pub salt: [u8; 16],
    pub hash: [u8; 64],
}

impl PinRecord {
    pub const EMPTY: PinRecord = PinRecord { iterations: 0, salt: [0u8; 16], hash: [0u8; 64] };

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.iterations.to_be_bytes());
        out[4..20].copy_from_slice(&self.salt);
        out[20..84].copy_from_slice(&self.hash);
    }

    fn decode(buf: &[u8]) -> Self {
        let iterations = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let salt = buf[4..20].try_into().unwrap();
        let hash = buf[20..84].try_into().unwrap();
        PinRecord { iterations, salt, hash }
    }

    const ENCODED_LEN: usize = 4 + 16 + 64;
}

pub const PIN_BLOCK_NAME: Uuid = NIL_UUID;
const FLASH_KEK_SET: u32 = 0x3333_3333;
const FLASH_KEK_NOT_SET: u32 = 0;

#[derive(Debug, Clone, Copy)]
pub struct PinBlockBody {
    pub wheel: PinRecord,
    pub so: PinRecord,
    pub user: PinRecord,
    pub backup_kek: Option<[u8; 32]>,
}

impl PinBlockBody {
    fn encode(&self, out: &mut [u8; BODY_LEN]) -> Result<(), KsError> {
        let mut off = 0;
        for rec in [&self.wheel, &self.so, &self.user] {
            rec.encode(&mut out[off..off + PinRecord::ENCODED_LEN]);
            off += PinRecord::ENCODED_LEN;
        }
        out[off..off + 4].copy_from_slice(&if self.backup_kek.is_some() { FLASH_KEK_SET } else { FLASH_KEK_NOT_SET }.to_be_bytes());
        off += 4;
        if let Some(kek) = self.backup_kek {
            out[off..off + 32].copy_from_slice(&kek);
        }
        Ok(())
    }

    fn decode(body: &[u8; BODY_LEN]) -> Result<Self, KsError> {
        let mut off = 0;
        let mut recs = [PinRecord::EMPTY; 3];
        for rec in recs.iter_mut() {
            *rec = PinRecord::decode(&body[off..off + PinRecord::ENCODED_LEN]);
            off += PinRecord::ENCODED_LEN;
        }
        let set_flag = u32::from_be_bytes(body[off..off + 4].try_into().unwrap());
        off += 4;
        let backup_kek = if set_flag == FLASH_KEK_SET { Some(body[off..off + 32].try_into().unwrap()) } else { None };
        Ok(PinBlockBody { wheel: recs[0], so: recs[1], user: recs[2], backup_kek })
    }
}

#[derive(Debug, Clone)]
pub enum BlockBody {
    Key(KeyBlockBody),
    Pin(PinBlockBody),
}

/// A full 8 KiB block as it lives on the device (or as a cached copy of one).
#[derive(Debug, Clone)]
pub struct Block {
    pub block_type: BlockType,
    pub block_status: BlockStatus,
    pub body: BlockBody,
}

impl Block {
    pub fn name(&self) -> Uuid {
        match &self.body {
            BlockBody::Key(k) => k.name,
            BlockBody::Pin(_) => PIN_BLOCK_NAME,
        }
    }

    /// Serialize to the on-the-wire 8 KiB image, computing the CRC over
    /// everything except `block_status` and the CRC field itself, so that
    /// `deprecate` can flip status without touching the CRC.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KsError> {
        let mut body = [0u8; BODY_LEN];
        match &self.body {
            BlockBody::Key(k) => k.encode(&mut body)?,
            BlockBody::Pin(p) => p.encode(&mut body)?,
        }
        let legacy = LEGACY_OK[0];
        let mut digest = CRC.digest();
        digest.update(&[self.block_type.to_byte()]);
        digest.update(&legacy);
        digest.update(&body);
        let crc = digest.finalize();

        let mut out = vec![0u8; BLOCK_SIZE];
        out[0] = self.block_type.to_byte();
        out[1] = self.block_status.to_byte();
        out[2..4].copy_from_slice(&legacy);
        out[4..8].copy_from_slice(&crc.to_be_bytes());
        out[HEADER_LEN..].copy_from_slice(&body);
        Ok(out)
    }

    /// Parse a full block image, verifying type/status/legacy bytes and CRC.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, KsError> {
        if raw.len() != BLOCK_SIZE {
            return Err(KsError::BadBlockType);
        }
        let block_type = BlockType::from_byte(raw[0]);
        let block_status = BlockStatus::from_byte(raw[1]);
        let legacy = [raw[2], raw[3]];
        if !LEGACY_OK.contains(&legacy) {
            return Err(KsError::BadBlockType);
        }
        let stored_crc = u32::from_be_bytes(raw[4..8].try_into().unwrap());
        let body: [u8; BODY_LEN] = raw[HEADER_LEN..].try_into().unwrap();

        match block_type {
            BlockType::Erased | BlockType::Zeroed => {
                return Ok(Block { block_type, block_status, body: BlockBody::Pin(PinBlockBody { wheel: PinRecord::EMPTY, so: PinRecord::EMPTY, user: PinRecord::EMPTY, backup_kek: None }) });
            }
            BlockType::Key | BlockType::Pin => {}
            BlockType::Unknown => return Err(KsError::BadBlockType),
        }

        let mut digest = CRC.digest();
        digest.update(&[raw[0]]);
        digest.update(&legacy);
        digest.update(&body);
        if digest.finalize() != stored_crc {
            return Err(KsError::BadCrc);
        }

        let body = match block_type {
            BlockType::Key => BlockBody::Key(KeyBlockBody::decode(&body)?),
            BlockType::Pin => BlockBody::Pin(PinBlockBody::decode(&body)?),
            _ => unreachable!(),
        };
        Ok(Block { block_type, block_status, body })
    }

    /// An uninitialized, all-0xFF "erased" block image.
    pub fn erased_image() -> Vec<u8> {
        vec![0xFFu8; BLOCK_SIZE]
    }

    /// An all-zero block image.
    pub fn zeroed_image() -> Vec<u8> {
        vec![0u8; BLOCK_SIZE]
    }
}

/// Cheaply classify a raw block's header without validating the body CRC —
/// used during boot scan.
pub fn peek_header(page0: &[u8]) -> (BlockType, BlockStatus) {
    (BlockType::from_byte(page0[0]), BlockStatus::from_byte(page0[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_block_round_trips() {
        let block = Block {
            block_type: BlockType::Key,
            block_status: BlockStatus::Live,
            body: BlockBody::Key(KeyBlockBody {
                name: [0x42; 16],
                key_type: KeyType::EcPrivate,
                curve: Curve::P256,
                flags: flags::TOKEN | flags::USAGE_DIGITAL_SIGNATURE,
                der: b"not really DER".to_vec(),
                attrs: vec![],
            }),
        };
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let parsed = Block::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name(), [0x42; 16]);
        match parsed.body {
            BlockBody::Key(k) => {
                assert_eq!(k.der, b"not really DER");
                assert_eq!(k.curve, Curve::P256);
            }
            _ => panic!("expected key block"),
        }
    }

    #[test]
    fn corrupted_body_fails_crc() {
        let block = Block {
            block_type: BlockType::Key,
            block_status: BlockStatus::Live,
            body: BlockBody::Key(KeyBlockBody { name: [1; 16], key_type: KeyType::RsaPublic, curve: Curve::None, flags: 0, der: vec![1, 2, 3], attrs: vec![] }),
        };
        let mut bytes = block.to_bytes().unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        assert_eq!(Block::from_bytes(&bytes), Err(KsError::BadCrc));
    }

    #[test]
    fn deprecate_does_not_disturb_crc() {
        let block = Block {
            block_type: BlockType::Key,
            block_status: BlockStatus::Live,
            body: BlockBody::Key(KeyBlockBody { name: [9; 16], key_type: KeyType::RsaPublic, curve: Curve::None, flags: 0, der: vec![7, 7], attrs: vec![] }),
        };
        let mut bytes = block.to_bytes().unwrap();
        bytes[1] = BlockStatus::Tombstone.to_byte();
        assert!(Block::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn pin_block_round_trips_with_backup_kek() {
        let block = Block {
            block_type: BlockType::Pin,
            block_status: BlockStatus::Live,
            body: BlockBody::Pin(PinBlockBody {
                wheel: PinRecord { iterations: 1, salt: [1; 16], hash: [2; 64] },
                so: PinRecord::EMPTY,
                user: PinRecord { iterations: 2000, salt: [3; 16], hash: [4; 64] },
                backup_kek: Some([5; 32]),
            }),
        };
        let bytes = block.to_bytes().unwrap();
        let parsed = Block::from_bytes(&bytes).unwrap();
        match parsed.body {
            BlockBody::Pin(p) => {
                assert_eq!(p.user.iterations, 2000);
                assert_eq!(p.backup_kek, Some([5; 32]));
            }
            _ => panic!("expected pin block"),
        }
    }
}
