//! HSS: a chain of `L` LMS keys, each level's public key certified by a
//! signature from the level above, giving an effectively unbounded total
//! signing capacity from `L` trees of manageable height (draft-mcgrew-
//! hash-sigs §6).
//!
//! Level 0's `(seed, I, q)` is the only thing anyone draws from the TRNG;
//! every level below it is derived deterministically from its parent's
//! `(seed, I, q)` at the moment the parent signs it into existence, so
//! regenerating the whole active chain from level 0's durable record always
//! reproduces the exact keys the parent already certified.

use crate::error::HashSigError;
use crate::lmots;
use crate::lms::{self, LmsPrivateKey, LmsPublicKey, PUBKEY_LEN};
use crate::params::{LmotsType, LmsType, N};
use hsm_keystore::{flags, BlockDevice, Curve, KeyType, Keystore, Trng, Uuid};

/// Domain tags for deriving a child level's `(seed, I)` from its parent's
/// `(seed, I, q)`. Purely an internal key-generation choice, not part of any
/// wire format.
const D_CHILD_SEED: &[u8] = b"hss-child-seed";
const D_CHILD_ID: &[u8] = b"hss-child-id";

fn derive_child(seed: &[u8; 32], i: &[u8; 16], q: u32) -> ([u8; 32], [u8; 16]) {
    let child_seed = lmots::h(&[D_CHILD_SEED, seed, i, &q.to_be_bytes()]);
    let id_hash = lmots::h(&[D_CHILD_ID, seed, i, &q.to_be_bytes()]);
    let mut child_i = [0u8; 16];
    child_i.copy_from_slice(&id_hash[..16]);
    (child_seed, child_i)
}

struct LevelRecord {
    lms_type: LmsType,
    lmots_type: LmotsType,
    seed: [u8; 32],
    i: [u8; 16],
    q: u32,
    /// The parent level's LMS signature over this level's public key.
    /// Empty for level 0, which has no parent.
    parent_sig: Vec<u8>,
}

impl LevelRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 4 + 16 + 32 + 4 + 2 + self.parent_sig.len());
        out.extend_from_slice(&self.lms_type.wire_code().to_be_bytes());
        out.extend_from_slice(&self.lmots_type.wire_code().to_be_bytes());
        out.extend_from_slice(&self.i);
        out.extend_from_slice(&self.seed);
        out.extend_from_slice(&self.q.to_be_bytes());
        out.extend_from_slice(&(self.parent_sig.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.parent_sig);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, HashSigError> {
        if bytes.len() < 4 + 4 + 16 + 32 + 4 + 2 {
            return Err(HashSigError::Malformed);
        }
        let lms_type = LmsType::from_wire_code(u32::from_be_bytes(bytes[0..4].try_into().unwrap())).ok_or(HashSigError::Malformed)?;
        let lmots_type = LmotsType::from_wire_code(u32::from_be_bytes(bytes[4..8].try_into().unwrap())).ok_or(HashSigError::Malformed)?;
        let i: [u8; 16] = bytes[8..24].try_into().unwrap();
        let seed: [u8; 32] = bytes[24..56].try_into().unwrap();
        let q = u32::from_be_bytes(bytes[56..60].try_into().unwrap());
        let sig_len = u16::from_be_bytes(bytes[60..62].try_into().unwrap()) as usize;
        if bytes.len() != 62 + sig_len {
            return Err(HashSigError::Malformed);
        }
        Ok(LevelRecord { lms_type, lmots_type, seed, i, q, parent_sig: bytes[62..].to_vec() })
    }

    fn as_private_key(&self) -> LmsPrivateKey {
        LmsPrivateKey { lms_type: self.lms_type, lmots_type: self.lmots_type, seed: self.seed, i: self.i, q: self.q }
    }
}

/// A block name for level `level`'s record, derived from the HSS key's own
/// name so it can never collide with the wrapper block stored under `name`
/// itself, regardless of `name`'s bit pattern.
fn level_name(name: &Uuid, level: usize) -> Uuid {
    let digest = lmots::h(&[b"hss-level-name", name, &(level as u32).to_be_bytes()]);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Upper bound on HSS depth. The wrapper block is always encoded at this
/// fixed width, unused trailing slots zeroed, so its plaintext length is
/// known before it is fetched: `Keystore::fetch`'s unwrap authenticates the
/// caller's claimed length against the one sealed in at wrap time, so there
/// is no way to learn `L` from a first, shorter probe fetch.
pub const MAX_LEVELS: usize = 8;
const WRAPPER_LEN: usize = 4 + MAX_LEVELS * 18;

/// `L(u32) || [ (name:16, record_len:u16) ; MAX_LEVELS ]`, padded with
/// nil names and zero lengths past `L`.
fn encode_wrapper(names: &[Uuid], lens: &[usize]) -> Vec<u8> {
    let mut out = vec![0u8; WRAPPER_LEN];
    out[0..4].copy_from_slice(&(names.len() as u32).to_be_bytes());
    for (idx, (name, len)) in names.iter().zip(lens).enumerate() {
        let off = 4 + idx * 18;
        out[off..off + 16].copy_from_slice(name);
        out[off + 16..off + 18].copy_from_slice(&(*len as u16).to_be_bytes());
    }
    out
}

fn decode_wrapper(bytes: &[u8]) -> Result<Vec<(Uuid, usize)>, HashSigError> {
    if bytes.len() != WRAPPER_LEN {
        return Err(HashSigError::Malformed);
    }
    let l = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    if l == 0 || l > MAX_LEVELS {
        return Err(HashSigError::Malformed);
    }
    let mut out = Vec::with_capacity(l);
    for idx in 0..l {
        let off = 4 + idx * 18;
        let name: Uuid = bytes[off..off + 16].try_into().unwrap();
        let len = u16::from_be_bytes(bytes[off + 16..off + 18].try_into().unwrap()) as usize;
        out.push((name, len));
    }
    Ok(out)
}

/// One `(LmsType, LmotsType)` pair per level, root first.
pub type LevelParams = (LmsType, LmotsType);

/// Generate a fresh HSS key of `levels.len()` LMS levels, persisting every
/// level's durable `(seed, I, q)` record under `name` in `keystore`, and
/// return the HSS public key.
pub fn generate<D: BlockDevice>(
    keystore: &mut Keystore<D>,
    trng: &mut dyn Trng,
    kek: &[u8; 32],
    owner: u32,
    name: &Uuid,
    levels: &[LevelParams],
) -> Result<Vec<u8>, HashSigError> {
    if levels.is_empty() || levels.len() > MAX_LEVELS {
        return Err(HashSigError::Malformed);
    }
    let mut seed = [0u8; 32];
    let mut id = [0u8; 16];
    trng.fill(&mut seed);
    trng.fill(&mut id);

    let mut records: Vec<LevelRecord> = Vec::with_capacity(levels.len());
    for &(lms_type, lmots_type) in levels {
        records.push(LevelRecord { lms_type, lmots_type, seed, i: id, q: 0, parent_sig: Vec::new() });
        let (next_seed, next_id) = derive_child(&seed, &id, 0);
        seed = next_seed;
        id = next_id;
    }

    // Each level's public key is certified by a signature from its parent,
    // consuming the parent's leaf 0.
    for idx in 0..records.len() - 1 {
        let child_pub = records[idx + 1].as_private_key().public_key().to_bytes();
        let mut c = [0u8; N];
        trng.fill(&mut c);
        let sig = records[idx].as_private_key().sign(&child_pub, c)?;
        records[idx].q += 1;
        records[idx + 1].parent_sig = sig;
    }

    let root_pubkey = records[0].as_private_key().public_key();

    let mut names = Vec::with_capacity(records.len());
    let mut lens = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let level_uuid = level_name(name, idx);
        let bytes = record.to_bytes();
        lens.push(bytes.len());
        names.push(level_uuid);
        keystore.store(kek, owner, level_uuid, KeyType::HashsigLms, Curve::None, flags::TOKEN, &bytes)?;
    }

    let wrapper = encode_wrapper(&names, &lens);
    keystore.store(kek, owner, *name, KeyType::HashsigPrivate, Curve::None, flags::TOKEN, &wrapper)?;

    let mut out = Vec::with_capacity(4 + PUBKEY_LEN);
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    out.extend_from_slice(&root_pubkey.to_bytes());
    Ok(out)
}

fn load_levels<D: BlockDevice>(keystore: &mut Keystore<D>, kek: &[u8; 32], owner: u32, name: &Uuid) -> Result<(Vec<Uuid>, Vec<LevelRecord>), HashSigError> {
    let wrapper_bytes = keystore.fetch(kek, owner, name, WRAPPER_LEN)?;
    let entries = decode_wrapper(&wrapper_bytes)?;
    let mut names = Vec::with_capacity(entries.len());
    let mut records = Vec::with_capacity(entries.len());
    for (level_name, len) in entries {
        let bytes = keystore.fetch(kek, owner, &level_name, len)?;
        records.push(LevelRecord::from_bytes(&bytes)?);
        names.push(level_name);
    }
    Ok((names, records))
}

/// Sign `message`, regenerating and persisting any exhausted trailing levels
/// before producing the final leaf signature, and persisting the new leaf
/// counter durably before returning.
pub fn sign<D: BlockDevice>(
    keystore: &mut Keystore<D>,
    trng: &mut dyn Trng,
    kek: &[u8; 32],
    owner: u32,
    name: &Uuid,
    message: &[u8],
) -> Result<Vec<u8>, HashSigError> {
    let (names, mut records) = load_levels(keystore, kek, owner, name)?;
    let l = records.len();

    let mut first_exhausted = l;
    for idx in (0..l).rev() {
        if !records[idx].as_private_key().is_exhausted() {
            break;
        }
        first_exhausted = idx;
    }
    if first_exhausted == 0 {
        return Err(HashSigError::KeyExhausted);
    }

    for idx in first_exhausted..l {
        let parent_idx = idx - 1;
        let parent_priv = records[parent_idx].as_private_key();
        let (child_seed, child_i) = derive_child(&parent_priv.seed, &parent_priv.i, parent_priv.q);
        let child_lms_type = records[idx].lms_type;
        let child_lmots_type = records[idx].lmots_type;
        let child_priv = LmsPrivateKey { lms_type: child_lms_type, lmots_type: child_lmots_type, seed: child_seed, i: child_i, q: 0 };
        let child_pub = child_priv.public_key();

        let mut c = [0u8; N];
        trng.fill(&mut c);
        let sig = parent_priv.sign(&child_pub.to_bytes(), c)?;
        records[parent_idx].q += 1;
        keystore.update(kek, &names[parent_idx], KeyType::HashsigLms, Curve::None, flags::TOKEN, &records[parent_idx].to_bytes())?;

        records[idx] = LevelRecord { lms_type: child_lms_type, lmots_type: child_lmots_type, seed: child_seed, i: child_i, q: 0, parent_sig: sig };
        keystore.update(kek, &names[idx], KeyType::HashsigLms, Curve::None, flags::TOKEN, &records[idx].to_bytes())?;
    }

    let bottom = records.last().unwrap();
    let bottom_priv = bottom.as_private_key();
    let mut c = [0u8; N];
    trng.fill(&mut c);
    let final_sig = bottom_priv.sign(message, c)?;

    let bottom_idx = l - 1;
    records[bottom_idx].q += 1;
    keystore.update(kek, &names[bottom_idx], KeyType::HashsigLms, Curve::None, flags::TOKEN, &records[bottom_idx].to_bytes())?;

    let mut out = Vec::new();
    out.extend_from_slice(&((l - 1) as u32).to_be_bytes());
    for idx in 0..l - 1 {
        out.extend_from_slice(&records[idx + 1].parent_sig);
        out.extend_from_slice(&records[idx + 1].as_private_key().public_key().to_bytes());
    }
    out.extend_from_slice(&final_sig);
    Ok(out)
}

/// Recompute the public key `generate` returned, from the persisted level
/// records alone. Used by `PKEY_OPEN` to recover a handle's public key
/// without having cached it anywhere at generation time; reads no leaf and
/// advances no counter.
pub fn public_key<D: BlockDevice>(keystore: &mut Keystore<D>, kek: &[u8; 32], owner: u32, name: &Uuid) -> Result<Vec<u8>, HashSigError> {
    let (_, records) = load_levels(keystore, kek, owner, name)?;
    let root_pubkey = records[0].as_private_key().public_key();
    let mut out = Vec::with_capacity(4 + PUBKEY_LEN);
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    out.extend_from_slice(&root_pubkey.to_bytes());
    Ok(out)
}

/// Number of leaf signatures this HSS key can still issue before its root
/// level is exhausted and the whole key must be regenerated, i.e. the
/// product of remaining capacity at every level.
pub fn capacity_remaining<D: BlockDevice>(keystore: &mut Keystore<D>, kek: &[u8; 32], owner: u32, name: &Uuid) -> Result<u64, HashSigError> {
    let (_, records) = load_levels(keystore, kek, owner, name)?;
    let mut total: u64 = 1;
    for (idx, record) in records.iter().enumerate() {
        let remaining = record.as_private_key().leaves_remaining() as u64;
        total = if idx == 0 { remaining } else { total.saturating_mul(remaining) };
    }
    Ok(total)
}

/// Verify an HSS signature over `message` against the public key bytes
/// returned by [`generate`].
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), HashSigError> {
    if public_key.len() != 4 + PUBKEY_LEN || signature.len() < 4 {
        return Err(HashSigError::Malformed);
    }
    let l = u32::from_be_bytes(public_key[0..4].try_into().unwrap()) as usize;
    let mut current = LmsPublicKey::from_bytes(&public_key[4..])?;

    let nspk = u32::from_be_bytes(signature[0..4].try_into().unwrap()) as usize;
    if nspk + 1 != l {
        return Err(HashSigError::Malformed);
    }

    let mut pos = 4;
    for _ in 0..nspk {
        let sig_ots_params = current.lmots_type.params();
        let sig_len = 4 + (4 + N + sig_ots_params.p * N) + current.lms_type.h() as usize * N;
        if signature.len() < pos + sig_len + PUBKEY_LEN {
            return Err(HashSigError::Malformed);
        }
        let level_sig = &signature[pos..pos + sig_len];
        pos += sig_len;
        let child_pub_bytes = &signature[pos..pos + PUBKEY_LEN];
        pos += PUBKEY_LEN;

        lms::verify(&current, child_pub_bytes, level_sig)?;
        current = LmsPublicKey::from_bytes(child_pub_bytes)?;
    }

    lms::verify(&current, message, &signature[pos..])
}

/// One-shot boot task: scan for every persisted HSS wrapper block and
/// confirm each level record parses and its stored `q` is within range,
/// surfacing a corrupt chain before any signing request relies on it.
pub fn recover<D: BlockDevice>(keystore: &mut Keystore<D>, kek: &[u8; 32], owner: u32, names: &[Uuid]) -> Result<(), HashSigError> {
    for name in names {
        let (_, records) = load_levels(keystore, kek, owner, name)?;
        for record in &records {
            if record.q > record.lms_type.leaves() {
                return Err(HashSigError::Malformed);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_keystore::{CountingTrng, Keystore};

    fn boot() -> Keystore<hsm_keystore::drivers::token::TokenDriver> {
        let driver = hsm_keystore::drivers::token::TokenDriver::new(64);
        let mut trng = CountingTrng::new();
        Keystore::boot(driver, 8, &mut trng).unwrap()
    }

    #[test]
    fn single_level_signs_until_exhausted_and_every_signature_verifies() {
        let mut ks = boot();
        let mut trng = CountingTrng::new();
        let kek = [0x5a; 32];
        let name: Uuid = [1; 16];

        let public_key = generate(&mut ks, &mut trng, &kek, 1, &name, &[(LmsType::H5, LmotsType::W8)]).unwrap();

        let mut signatures = Vec::new();
        for n in 0..32u32 {
            let msg = format!("message {n}");
            let sig = sign(&mut ks, &mut trng, &kek, 1, &name, msg.as_bytes()).unwrap();
            signatures.push((msg, sig));
        }

        assert_eq!(sign(&mut ks, &mut trng, &kek, 1, &name, b"one too many"), Err(HashSigError::KeyExhausted));

        for (msg, sig) in &signatures {
            assert!(verify(&public_key, msg.as_bytes(), sig).is_ok());
        }

        // Signature 17 must not verify against a different message.
        let (_, sig17) = &signatures[17];
        assert_eq!(verify(&public_key, b"not the original message", sig17), Err(HashSigError::InvalidSignature));
    }

    #[test]
    fn two_levels_regenerate_child_subtree_on_exhaustion() {
        let mut ks = boot();
        let mut trng = CountingTrng::new();
        let kek = [0x11; 32];
        let name: Uuid = [2; 16];

        let public_key = generate(&mut ks, &mut trng, &kek, 2, &name, &[(LmsType::H5, LmotsType::W4), (LmsType::H5, LmotsType::W4)]).unwrap();

        // Exhaust the bottom level's 32 leaves, forcing one mid-stream
        // regeneration of level 1 from level 0's next leaf.
        for n in 0..40u32 {
            let msg = format!("msg-{n}");
            let sig = sign(&mut ks, &mut trng, &kek, 2, &name, msg.as_bytes()).unwrap();
            assert!(verify(&public_key, msg.as_bytes(), &sig).is_ok());
        }
    }

    #[test]
    fn public_key_matches_the_one_generate_returned_and_survives_signing() {
        let mut ks = boot();
        let mut trng = CountingTrng::new();
        let kek = [0x33; 32];
        let name: Uuid = [4; 16];
        let generated = generate(&mut ks, &mut trng, &kek, 4, &name, &[(LmsType::H5, LmotsType::W8)]).unwrap();
        assert_eq!(public_key(&mut ks, &kek, 4, &name).unwrap(), generated);
        sign(&mut ks, &mut trng, &kek, 4, &name, b"x").unwrap();
        assert_eq!(public_key(&mut ks, &kek, 4, &name).unwrap(), generated);
    }

    #[test]
    fn capacity_remaining_tracks_leaf_consumption() {
        let mut ks = boot();
        let mut trng = CountingTrng::new();
        let kek = [0x22; 32];
        let name: Uuid = [3; 16];
        generate(&mut ks, &mut trng, &kek, 3, &name, &[(LmsType::H5, LmotsType::W8)]).unwrap();
        assert_eq!(capacity_remaining(&mut ks, &kek, 3, &name).unwrap(), 32);
        sign(&mut ks, &mut trng, &kek, 3, &name, b"x").unwrap();
        assert_eq!(capacity_remaining(&mut ks, &kek, 3, &name).unwrap(), 31);
    }
}
