//! Keystore core: boot reconstruction, tombstone recovery, the
//! update-with-tombstone sequence, and the store/fetch/delete/attribute/
//! search operations built on top of it.

use crate::attrs::{self, AttrRequest, AttrResult};
use crate::audit::{AuditEvent, AuditLog};
use crate::block::{flags, peek_header, Block, BlockBody, BlockStatus, BlockType, Curve, KeyBlockBody, KeyType, BODY_LEN};
use crate::cache::BlockCache;
use crate::drivers::{BlockDevice, ReadOutcome};
use crate::error::KsError;
use crate::index::Index;
use crate::pin::{self, DEFAULT_ITERATIONS, LAST_GASP_WHEEL_PIN};
use crate::uuid::{Trng, Uuid, NIL_UUID};
use hsm_rt::TaskMutex;

const KEY_META_LEN: usize = 16 + 1 + 1 + 4 + 2 + 2;

/// Capacity of the per-keystore audit ring (§ ambient observability; see
/// SPEC_FULL.md's `logging.c` cross-reference).
const AUDIT_CAPACITY: usize = 64;

pub struct Keystore<D: BlockDevice> {
    driver: D,
    index: Index,
    cache: TaskMutex<BlockCache>,
    audit: AuditLog,
}

fn read_block<D: BlockDevice>(driver: &mut D, blockno: u16) -> Result<Block, KsError> {
    let (outcome, raw) = driver.read(blockno)?;
    match outcome {
        ReadOutcome::Full => Block::from_bytes(&raw),
        ReadOutcome::Empty => Err(KsError::BadBlockType),
    }
}

impl<D: BlockDevice> Keystore<D> {
    /// Boot-time reconstruction: scan every physical
    /// block, build the live index and a free list ordered to minimize
    /// repeated erasure of the same subsector, recover any tombstones left
    /// by a crash mid-update, then ensure the free-list head is pre-erased.
    /// Creates the PIN block with the last-gasp wheel PIN if none exists.
    pub fn boot(mut driver: D, cache_capacity: usize, trng: &mut dyn Trng) -> Result<Self, KsError> {
        let n = driver.num_blocks();
        let mut live = Vec::new();
        let mut erased = Vec::new();
        let mut zeroed = Vec::new();
        let mut corrupt = Vec::new();
        let mut tombstones: Vec<(u16, Block)> = Vec::new();

        for b in 0..n {
            match driver.read(b) {
                Ok((ReadOutcome::Empty, page0)) => match peek_header(&page0).0 {
                    BlockType::Erased => erased.push(b),
                    BlockType::Zeroed => zeroed.push(b),
                    _ => unreachable!("peek_header only reports Empty for erased/zeroed"),
                },
                Ok((ReadOutcome::Full, raw)) => match Block::from_bytes(&raw) {
                    Ok(block) => match block.block_status {
                        BlockStatus::Live => live.push((b, block.name())),
                        BlockStatus::Tombstone => tombstones.push((b, block)),
                        BlockStatus::Unknown => corrupt.push(b),
                    },
                    Err(_) => corrupt.push(b),
                },
                Err(_) => corrupt.push(b),
            }
        }

        // Zeroed blocks start at the position just after the first erased
        // block, wrapping around, so a freshly zeroed block isn't picked
        // again for reuse before blocks further from the last erasure are.
        if let Some(&first_erased) = erased.first() {
            let pivot = first_erased.wrapping_add(1);
            let (before, from) = partition_by_pivot(&zeroed, pivot);
            zeroed = from.into_iter().chain(before).collect();
        }

        let mut free_in_order = erased;
        free_in_order.extend(zeroed);
        free_in_order.extend(corrupt);

        let mut index = Index::from_scan(n, live, free_in_order);
        let mut recovered_names = Vec::new();

        for (tombstone_blockno, tomb_block) in tombstones {
            let name = tomb_block.name();
            let mut hint = 0;
            if index.find(&name, &mut hint).is_ok() {
                // A live block with this name already exists: the
                // tombstone was left by a completed update.
                driver.zero(tombstone_blockno)?;
            } else {
                // Crash landed between steps (1) and (2)/(3): recover by
                // promoting the tombstone's own content to a fresh live
                // block, then clearing the tombstone.
                let mut recovered = tomb_block;
                recovered.block_status = BlockStatus::Live;
                let mut new_blockno = 0u16;
                index.add(name, &mut new_blockno, &mut hint)?;
                driver.write(new_blockno, &recovered.to_bytes()?)?;
                driver.zero(tombstone_blockno)?;
                recovered_names.push(name);
            }
        }

        if let Some(head) = index.free_head() {
            driver.erase_maybe(head)?;
        }

        let mut ks = Keystore { driver, index, cache: TaskMutex::new(BlockCache::new(cache_capacity)), audit: AuditLog::new(AUDIT_CAPACITY) };
        for name in recovered_names {
            ks.audit.record(name, AuditEvent::TombstoneRecovered);
        }

        let mut hint = 0;
        if ks.index.find(&NIL_UUID, &mut hint).is_err() {
            let wheel = pin::set_pin(trng, LAST_GASP_WHEEL_PIN, DEFAULT_ITERATIONS)?;
            let body = crate::block::PinBlockBody { wheel, so: crate::block::PinRecord::EMPTY, user: crate::block::PinRecord::EMPTY, backup_kek: None };
            ks.create_pin_block(body)?;
        }

        Ok(ks)
    }

    fn create_pin_block(&mut self, body: crate::block::PinBlockBody) -> Result<(), KsError> {
        let mut blockno = 0u16;
        let mut hint = 0;
        self.index.add(NIL_UUID, &mut blockno, &mut hint)?;
        let block = Block { block_type: BlockType::Pin, block_status: BlockStatus::Live, body: BlockBody::Pin(body) };
        if let Err(e) = self.driver.write(blockno, &block.to_bytes()?) {
            let mut freed = 0u16;
            let _ = self.index.delete(&NIL_UUID, &mut freed, &mut hint);
            return Err(e);
        }
        self.cache.lock().insert(blockno, block);
        Ok(())
    }

    fn fetch_block(&mut self, blockno: u16) -> Result<Block, KsError> {
        if let Some(block) = self.cache.lock().get(blockno) {
            return Ok(block.clone());
        }
        let block = read_block(&mut self.driver, blockno)?;
        self.cache.lock().insert(blockno, block.clone());
        Ok(block)
    }

    /// The five-step (plus free-list pre-erase) update choreography that
    /// survives power loss.
    fn update_with_tombstone(&mut self, name: &Uuid, new_body: BlockBody, block_type: BlockType) -> Result<u16, KsError> {
        let mut hint = 0;
        let b1 = self.index.find(name, &mut hint)?;
        self.driver.deprecate(b1)?;
        let mut b2 = 0u16;
        self.index.replace(name, &mut b2, &mut hint)?;
        let new_block = Block { block_type, block_status: BlockStatus::Live, body: new_body };
        self.driver.write(b2, &new_block.to_bytes()?)?;
        self.driver.copy_owner(b1, b2);
        self.driver.zero(b1)?;
        if let Some(head) = self.index.free_head() {
            self.driver.erase_maybe(head)?;
        }
        self.cache.lock().invalidate(b1);
        self.cache.lock().insert(b2, new_block);
        Ok(b2)
    }

    /// Allocate a free block, wrap `der` under `kek`, and store it
    ///. Rolls the index insert back on write failure.
    pub fn store(&mut self, kek: &[u8; 32], owner: u32, name: Uuid, key_type: KeyType, curve: Curve, flags: u32, der: &[u8]) -> Result<(), KsError> {
        let mut blockno = 0u16;
        let mut hint = 0;
        self.index.add(name, &mut blockno, &mut hint)?;

        let wrapped = hsm_keywrap::wrap_aes256(kek, der).map_err(|_| KsError::WrapFailed)?;
        let body = KeyBlockBody { name, key_type, curve, flags, der: wrapped, attrs: Vec::new() };
        let block = Block { block_type: BlockType::Key, block_status: BlockStatus::Live, body: BlockBody::Key(body) };

        if let Err(e) = self.driver.write(blockno, &block.to_bytes()?) {
            let mut freed = 0u16;
            let _ = self.index.delete(&name, &mut freed, &mut hint);
            return Err(e);
        }
        self.driver.set_owner(blockno, owner);
        self.cache.lock().insert(blockno, block);
        self.audit.record(name, AuditEvent::Created);
        Ok(())
    }

    /// Find, verify ownership, and unwrap the DER under `kek`. The wrapped
    /// bytes are copied out of the cached block before unwrapping: the lock
    /// only ever guards the cache lookup, never the unwrap itself.
    pub fn fetch(&mut self, kek: &[u8; 32], owner: u32, name: &Uuid, expected_len: usize) -> Result<Vec<u8>, KsError> {
        let mut hint = 0;
        let blockno = self.index.find(name, &mut hint)?;
        if !self.driver.test_owner(blockno, owner) {
            return Err(KsError::NotOwner);
        }
        let wrapped = {
            let block = self.fetch_block(blockno)?;
            match block.body {
                BlockBody::Key(k) => k.der,
                BlockBody::Pin(_) => return Err(KsError::BadBlockType),
            }
        };
        hsm_keywrap::unwrap_aes256(kek, &wrapped, expected_len).map_err(|_| KsError::WrapFailed)
    }

    /// Rewrite an existing key's wrapped DER and metadata in place via the
    /// update-with-tombstone sequence (§4.2.5). Used by the hash-based
    /// signature engine to persist a key's advancing leaf index: the new
    /// block must be durable before the signature that consumed the leaf
    /// is released to the caller.
    pub fn update(&mut self, kek: &[u8; 32], name: &Uuid, key_type: KeyType, curve: Curve, flags: u32, der: &[u8]) -> Result<(), KsError> {
        let wrapped = hsm_keywrap::wrap_aes256(kek, der).map_err(|_| KsError::WrapFailed)?;
        let body = KeyBlockBody { name: *name, key_type, curve, flags, der: wrapped, attrs: Vec::new() };
        self.update_with_tombstone(name, BlockBody::Key(body), BlockType::Key)?;
        self.audit.record(*name, AuditEvent::Updated);
        Ok(())
    }

    pub fn delete(&mut self, owner: u32, name: &Uuid) -> Result<(), KsError> {
        let mut hint = 0;
        let blockno = self.index.find(name, &mut hint)?;
        if !self.driver.test_owner(blockno, owner) {
            return Err(KsError::NotOwner);
        }
        let mut freed = 0u16;
        self.index.delete(name, &mut freed, &mut hint)?;
        self.cache.lock().invalidate(freed);
        self.driver.zero(freed)?;
        if let Some(head) = self.index.free_head() {
            self.driver.erase_maybe(head)?;
        }
        self.audit.record(*name, AuditEvent::Deleted);
        Ok(())
    }

    /// Read-only view of the key lifecycle audit trail (§ ambient
    /// observability). Bounded and in-memory — not persisted across reboots.
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Apply a batch of attribute sets/deletes and commit via the
    /// tombstone-update sequence.
    pub fn set_attributes(&mut self, name: &Uuid, requests: &[AttrRequest]) -> Result<(), KsError> {
        let mut hint = 0;
        let blockno = self.index.find(name, &mut hint)?;
        let block = self.fetch_block(blockno)?;
        let mut body = match block.body {
            BlockBody::Key(k) => k,
            BlockBody::Pin(_) => return Err(KsError::BadBlockType),
        };
        let max_len = BODY_LEN - KEY_META_LEN - body.der.len();
        attrs::set_attributes(&mut body.attrs, requests, max_len)?;
        self.update_with_tombstone(name, BlockBody::Key(body), BlockType::Key)?;
        Ok(())
    }

    /// The cleartext `(key_type, curve, flags)` triple carried in a key
    /// block's header, without touching the wrapped `der[]` payload at all
    /// — lets a caller recover a key's type/curve ahead of an `unwrap` that
    /// needs them (or `PKEY_GET_KEY_TYPE`/`_FLAGS`/`_CURVE`, which have no
    /// reason to pay for an unwrap they don't use).
    pub fn key_metadata(&mut self, owner: u32, name: &Uuid) -> Result<(KeyType, Curve, u32), KsError> {
        let mut hint = 0;
        let blockno = self.index.find(name, &mut hint)?;
        if !self.driver.test_owner(blockno, owner) {
            return Err(KsError::NotOwner);
        }
        match self.fetch_block(blockno)?.body {
            BlockBody::Key(k) => Ok((k.key_type, k.curve, k.flags)),
            BlockBody::Pin(_) => Err(KsError::BadBlockType),
        }
    }

    pub fn get_attributes(&mut self, name: &Uuid, requested_types: &[u32], buf_len: usize) -> Result<Vec<AttrResult>, KsError> {
        let mut hint = 0;
        let blockno = self.index.find(name, &mut hint)?;
        let block = self.fetch_block(blockno)?;
        match block.body {
            BlockBody::Key(k) => attrs::get_attributes(&k.attrs, requested_types, buf_len),
            BlockBody::Pin(_) => Err(KsError::BadBlockType),
        }
    }

    /// Enumerate live blocks in sorted-UUID order, starting just after
    /// `previous`, applying the owner/type/curve/flag-mask/attribute filters
    ///. The cursor to resume from is simply the last UUID
    /// examined, which the caller passes back in as `previous`.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &mut self,
        owner: u32,
        key_type: Option<KeyType>,
        curve: Option<Curve>,
        want_flags: u32,
        mask: u32,
        required_attrs: &[(u32, Vec<u8>)],
        previous: Uuid,
        result_max: usize,
    ) -> Result<(Vec<Uuid>, Uuid), KsError> {
        let candidates: Vec<(u16, Uuid)> = self.index.live_after(&previous).collect();
        let mut results = Vec::new();
        let mut cursor = previous;
        for (blockno, name) in candidates {
            cursor = name;
            if !self.driver.test_owner(blockno, owner) {
                continue;
            }
            let block = self.fetch_block(blockno)?;
            let body = match block.body {
                BlockBody::Key(k) => k,
                BlockBody::Pin(_) => continue,
            };
            if let Some(kt) = key_type {
                if body.key_type != kt {
                    continue;
                }
            }
            if let Some(c) = curve {
                if body.curve != c {
                    continue;
                }
            }
            if (body.flags ^ want_flags) & mask != 0 {
                continue;
            }
            let attr_views = attrs::scan(&body.attrs)?;
            let all_present = required_attrs.iter().all(|(t, v)| {
                attr_views.iter().any(|view| view.attr_type == *t && &body.attrs[view.offset..view.offset + view.len] == v.as_slice())
            });
            if !all_present {
                continue;
            }
            results.push(name);
            if results.len() >= result_max {
                break;
            }
        }
        Ok((results, cursor))
    }

    /// Read the PIN block, always bound to the nil UUID.
    fn pin_block(&mut self) -> Result<crate::block::PinBlockBody, KsError> {
        let mut hint = 0;
        let blockno = self.index.find(&NIL_UUID, &mut hint)?;
        match self.fetch_block(blockno)?.body {
            BlockBody::Pin(p) => Ok(p),
            BlockBody::Key(_) => Err(KsError::BadBlockType),
        }
    }

    pub fn login(&mut self, which: PinSlot, pin_bytes: &[u8]) -> Result<(), KsError> {
        let record = match which {
            PinSlot::Wheel => self.pin_block()?.wheel,
            PinSlot::So => self.pin_block()?.so,
            PinSlot::User => self.pin_block()?.user,
        };
        pin::login(&record, pin_bytes)
    }

    pub fn set_pin(&mut self, trng: &mut dyn Trng, which: PinSlot, pin_bytes: &[u8], iterations: u32) -> Result<(), KsError> {
        let mut body = self.pin_block()?;
        let record = pin::set_pin(trng, pin_bytes, iterations)?;
        match which {
            PinSlot::Wheel => body.wheel = record,
            PinSlot::So => body.so = record,
            PinSlot::User => body.user = record,
        }
        self.update_with_tombstone(&NIL_UUID, BlockBody::Pin(body), BlockType::Pin)?;
        Ok(())
    }

    #[cfg(feature = "flash-kek-backup")]
    pub fn backup_kek(&mut self) -> Result<Option<[u8; 32]>, KsError> {
        Ok(self.pin_block()?.backup_kek)
    }

    #[cfg(feature = "flash-kek-backup")]
    pub fn set_backup_kek(&mut self, kek: Option<[u8; 32]>) -> Result<(), KsError> {
        let mut body = self.pin_block()?;
        body.backup_kek = kek;
        self.update_with_tombstone(&NIL_UUID, BlockBody::Pin(body), BlockType::Pin)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSlot {
    Wheel,
    So,
    User,
}

/// Split `items` into `(before, from)` where `from` starts at the first
/// element `>= pivot` and `before` holds everything scanned before it,
/// wrapping around the slice boundary once.
fn partition_by_pivot(items: &[u16], pivot: u16) -> (Vec<u16>, Vec<u16>) {
    match items.iter().position(|&b| b >= pivot) {
        Some(split) => (items[..split].to_vec(), items[split..].to_vec()),
        None => (Vec::new(), items.to_vec()),
    }
}

// Flag helpers re-exported for callers building `flags` bitmasks without
// reaching into `crate::block` directly.
pub use flags as flag_bits;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::token::TokenDriver;
    use crate::uuid::CountingTrng;

    fn uuid(b: u8) -> Uuid {
        let mut u = [0u8; 16];
        u[15] = b;
        u
    }

    fn boot_empty(n: u16) -> Keystore<TokenDriver> {
        let driver = TokenDriver::new(n);
        let mut trng = CountingTrng::new();
        Keystore::boot(driver, 4, &mut trng).unwrap()
    }

    #[test]
    fn boot_creates_pin_block_with_last_gasp_wheel_pin() {
        let mut ks = boot_empty(4);
        assert!(ks.login(PinSlot::Wheel, LAST_GASP_WHEEL_PIN).is_ok());
        assert_eq!(ks.login(PinSlot::Wheel, b"wrong"), Err(KsError::PinIncorrect));
    }

    #[test]
    fn store_fetch_delete_round_trip() {
        let mut ks = boot_empty(8);
        let kek = [0x42u8; 32];
        let name = uuid(1);
        ks.store(&kek, 7, name, KeyType::EcPrivate, Curve::P256, flags::TOKEN, b"a private key").unwrap();
        let der = ks.fetch(&kek, 7, &name, b"a private key".len()).unwrap();
        assert_eq!(der, b"a private key");
        ks.delete(7, &name).unwrap();
        assert_eq!(ks.fetch(&kek, 7, &name, 1), Err(KsError::KeyNotFound));
    }

    #[test]
    fn fetch_rejects_wrong_owner() {
        let mut ks = boot_empty(8);
        let kek = [0u8; 32];
        let name = uuid(2);
        ks.store(&kek, 1, name, KeyType::RsaPublic, Curve::None, 0, b"pub").unwrap();
        assert_eq!(ks.fetch(&kek, 2, &name, 3), Err(KsError::NotOwner));
    }

    #[test]
    fn key_metadata_reads_type_curve_and_flags_without_unwrapping() {
        let mut ks = boot_empty(8);
        let kek = [0x7eu8; 32];
        let name = uuid(9);
        ks.store(&kek, 3, name, KeyType::EcPublic, Curve::P384, flags::USAGE_DIGITAL_SIGNATURE, b"not really der").unwrap();
        let (key_type, curve, flags) = ks.key_metadata(3, &name).unwrap();
        assert_eq!(key_type, KeyType::EcPublic);
        assert_eq!(curve, Curve::P384);
        assert_eq!(flags, flags::USAGE_DIGITAL_SIGNATURE);
        assert_eq!(ks.key_metadata(4, &name), Err(KsError::NotOwner));
    }

    #[test]
    fn attributes_round_trip_through_update_sequence() {
        let mut ks = boot_empty(8);
        let kek = [0u8; 32];
        let name = uuid(3);
        ks.store(&kek, 1, name, KeyType::RsaPublic, Curve::None, 0, b"pub").unwrap();
        ks.set_attributes(&name, &[AttrRequest { attr_type: 9, value: b"label".to_vec(), delete: false }]).unwrap();
        let got = ks.get_attributes(&name, &[9], 64).unwrap();
        assert_eq!(got[0].length, 5);
        assert_eq!(got[0].value.as_deref(), Some(&b"label"[..]));
    }

    #[test]
    fn search_filters_by_owner_and_type() {
        let mut ks = boot_empty(8);
        let kek = [0u8; 32];
        ks.store(&kek, 1, uuid(10), KeyType::RsaPublic, Curve::None, 0, b"a").unwrap();
        ks.store(&kek, 1, uuid(20), KeyType::EcPublic, Curve::P256, 0, b"b").unwrap();
        ks.store(&kek, 2, uuid(30), KeyType::RsaPublic, Curve::None, 0, b"c").unwrap();

        let (results, _cursor) = ks.search(1, Some(KeyType::RsaPublic), None, 0, 0, &[], crate::uuid::NIL_UUID, 10).unwrap();
        assert_eq!(results, vec![uuid(10)]);
    }

    #[test]
    fn tombstone_recovery_promotes_orphaned_tombstone_to_live() {
        let driver = TokenDriver::new(4);
        let mut trng = CountingTrng::new();
        let mut ks = Keystore::boot(driver, 4, &mut trng).unwrap();
        let kek = [0u8; 32];
        let name = uuid(5);
        ks.store(&kek, 1, name, KeyType::RsaPublic, Curve::None, 0, b"orig").unwrap();

        // Simulate a crash right after step (1) of the update sequence: the
        // live block was deprecated to a tombstone but nothing else happened.
        let mut hint = 0;
        let blockno = ks.index.find(&name, &mut hint).unwrap();
        ks.driver.deprecate(blockno).unwrap();

        let driver = std::mem::replace(&mut ks.driver, TokenDriver::new(0));
        let mut trng = CountingTrng::new();
        let recovered = Keystore::boot(driver, 4, &mut trng).unwrap();
        let mut hint = 0;
        assert!(recovered.index.find(&name, &mut hint).is_ok());
    }
}
