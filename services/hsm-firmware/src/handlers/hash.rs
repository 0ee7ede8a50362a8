//! `HASH_GET_DIGEST_LEN`, `HASH_GET_DIGEST_ALGORITHM_ID`,
//! `HASH_GET_ALGORITHM`, `HASH_INITIALIZE`, `HASH_UPDATE`,
//! `HASH_FINALIZE`.

use hsm_hash::{digest_algorithm_id, digest_len, hash_finalize, hash_initialize, hash_update, hmac_finalize, hmac_initialize, hmac_update, HashAlgorithm, HashState, HmacState};
use hsm_rpc::{Decoder, Encoder, HalError};

use crate::context::DeviceContext;

/// The open state behind a `HASH_INITIALIZE` handle: a plain streaming hash,
/// or an HMAC if the caller supplied a non-empty key.
pub enum OpenHash {
    Plain(HashState),
    Hmac(HmacState),
}

impl OpenHash {
    fn algorithm(&self) -> HashAlgorithm {
        match self {
            OpenHash::Plain(hs) => hs.algorithm(),
            OpenHash::Hmac(hm) => hm.algorithm(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            OpenHash::Plain(hs) => hash_update(hs, data),
            OpenHash::Hmac(hm) => hmac_update(hm, data),
        }
    }

    fn finalize(&mut self, out_len: usize) -> Result<hsm_hash::DigestBytes, hsm_hash::HashError> {
        match self {
            OpenHash::Plain(hs) => hash_finalize(hs, out_len),
            OpenHash::Hmac(hm) => hmac_finalize(hm, out_len),
        }
    }
}

fn decode_alg(dec: &mut Decoder<'_>) -> Result<HashAlgorithm, HalError> {
    HashAlgorithm::from_wire(dec.decode_int()?).ok_or(HalError::BadArguments)
}

pub fn hash_get_digest_len(_ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let alg = decode_alg(dec)?;
    enc.encode_int(digest_len(alg) as u32)?;
    Ok(())
}

pub fn hash_get_digest_algorithm_id(_ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let alg = decode_alg(dec)?;
    let max = dec.decode_int()? as usize;
    let id = digest_algorithm_id(alg, max).map_err(HalError::from)?;
    enc.encode_variable_opaque(id)?;
    Ok(())
}

pub fn hash_get_algorithm(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let alg = ctx.hashes.get(handle)?.algorithm();
    enc.encode_int(alg.wire_code())?;
    Ok(())
}

pub fn hash_initialize(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let _session = dec.decode_int()?;
    let alg = decode_alg(dec)?;
    let key = dec.decode_variable_opaque()?;
    let open = if key.is_empty() { OpenHash::Plain(hash_initialize(alg)) } else { OpenHash::Hmac(hmac_initialize(alg, key)) };
    let handle = ctx.hashes.insert(open)?;
    enc.encode_int(handle)?;
    Ok(())
}

pub fn hash_update_handler(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let data = dec.decode_variable_opaque()?;
    ctx.hashes.get_mut(handle)?.update(data);
    Ok(())
}

pub fn hash_finalize_handler(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let out_len = dec.decode_int()? as usize;
    let mut open = ctx.hashes.remove(handle)?;
    let digest = open.finalize(out_len).map_err(HalError::from)?;
    enc.encode_variable_opaque(digest.as_slice())?;
    Ok(())
}
