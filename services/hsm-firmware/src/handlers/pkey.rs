//! The 19 `PKEY_*` handlers: load/open/generate/close/delete, metadata
//! queries, sign/verify (including the "mixed" regime's PKCS#1 `DigestInfo`
//! unwrapping for RSA), match/enumerate, attributes, and export/import.

use hsm_hash::HashAlgorithm;
use hsm_hashsig::{hss, params::{LmotsType, LmsType}};
use hsm_keystore::{AttrRequest, Curve, KeyType, Uuid, DELETE_SENTINEL_LEN};
use hsm_rpc::{pkcs1, Decoder, Encoder, HalError};

use crate::context::DeviceContext;
use crate::pkey::ec_ops::{EcPrivateKey, EcPublicKey};
use crate::pkey::rsa_ops;
use crate::pkey::{KeyMaterial, PkeyObject};
use crate::rng::TrngRng;

/// Sentinel accepted for the `type`/`curve` filter fields of `PKEY_MATCH`
/// meaning "no filter" — reuses the same all-ones convention as
/// [`DELETE_SENTINEL_LEN`].
const NO_FILTER: u32 = 0xFFFF_FFFF;

fn decode_key_type(code: u32) -> Result<KeyType, HalError> {
    if code > u8::MAX as u32 {
        return Err(HalError::BadArguments);
    }
    KeyType::from_byte(code as u8).ok_or(HalError::BadArguments)
}

fn decode_curve(code: u32) -> Result<Curve, HalError> {
    if code > u8::MAX as u32 {
        return Err(HalError::BadArguments);
    }
    Curve::from_byte(code as u8).ok_or(HalError::BadArguments)
}

fn decode_uuid(dec: &mut Decoder<'_>) -> Result<Uuid, HalError> {
    let bytes = dec.decode_fixed_opaque(16)?;
    Ok(bytes.try_into().unwrap())
}

pub fn pkey_load(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let der = dec.decode_variable_opaque()?;
    let flags = dec.decode_int()?;

    let name = hsm_keystore::generate(&mut ctx.trng());
    let obj = PkeyObject::from_private_der_autodetect(der, name, owner, flags)?;
    ctx.store_key_der(owner, name, obj.key_type(), obj.curve(), flags, der)?;
    let handle = ctx.pkeys.insert(obj)?;

    enc.encode_int(handle)?;
    enc.encode_fixed_opaque(&name)?;
    Ok(())
}

pub fn pkey_open(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let name = decode_uuid(dec)?;
    let obj = ctx.open_pkey_by_name(owner, name)?;
    let handle = ctx.pkeys.insert(obj)?;
    enc.encode_int(handle)?;
    Ok(())
}

pub fn pkey_generate_rsa(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let bits = dec.decode_int()? as usize;
    let e = dec.decode_variable_opaque()?.to_vec();
    let flags = dec.decode_int()?;

    let key = {
        let mut trng = ctx.trng();
        let mut rng = TrngRng::new(&mut trng);
        rsa_ops::generate(bits, &e, &mut rng)?
    };
    let name = hsm_keystore::generate(&mut ctx.trng());
    let der = rsa_ops::to_pkcs8_der(&key)?;
    ctx.store_key_der(owner, name, KeyType::RsaPrivate, Curve::None, flags, &der)?;
    let handle = ctx.pkeys.insert(PkeyObject { name, owner, flags, material: KeyMaterial::RsaPrivate(key) })?;

    enc.encode_int(handle)?;
    enc.encode_fixed_opaque(&name)?;
    Ok(())
}

pub fn pkey_generate_ec(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let curve = decode_curve(dec.decode_int()?)?;
    let flags = dec.decode_int()?;

    let key = {
        let mut trng = ctx.trng();
        let mut rng = TrngRng::new(&mut trng);
        EcPrivateKey::generate(curve, &mut rng)?
    };
    let name = hsm_keystore::generate(&mut ctx.trng());
    let der = key.to_pkcs8_der()?;
    ctx.store_key_der(owner, name, KeyType::EcPrivate, curve, flags, &der)?;
    let handle = ctx.pkeys.insert(PkeyObject { name, owner, flags, material: KeyMaterial::EcPrivate(key) })?;

    enc.encode_int(handle)?;
    enc.encode_fixed_opaque(&name)?;
    Ok(())
}

pub fn pkey_close(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    ctx.pkeys.remove(handle)?;
    Ok(())
}

/// Deletes the key's top-level keystore record. For a hashsig key this
/// drops the wrapper block, not the per-level LMS/LM-OTS records it still
/// points at; reclaiming those is future work (no keystore sweep for
/// orphaned blocks exists yet).
pub fn pkey_delete(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let obj = ctx.pkeys.remove(handle)?;
    ctx.token.delete(obj.owner, &obj.name).map_err(HalError::from)
}

pub fn pkey_get_key_type(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let key_type = ctx.pkeys.get(handle)?.key_type();
    enc.encode_int(key_type.to_byte() as u32)?;
    Ok(())
}

pub fn pkey_get_key_flags(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    enc.encode_int(ctx.pkeys.get(handle)?.flags)?;
    Ok(())
}

pub fn pkey_get_public_key_len(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let der = ctx.pkeys.get(handle)?.public_key_der()?;
    enc.encode_int(der.len() as u32)?;
    Ok(())
}

pub fn pkey_get_public_key(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let max = dec.decode_int()? as usize;
    let der = ctx.pkeys.get(handle)?.public_key_der()?;
    if der.len() > max {
        return Err(HalError::ResultTooLong);
    }
    enc.encode_variable_opaque(&der)?;
    Ok(())
}

pub fn pkey_sign(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let hash_code = dec.decode_int()?;
    let input = dec.decode_variable_opaque()?;
    let max = dec.decode_int()? as usize;

    let obj = ctx.pkeys.get(handle)?;
    let sig = match obj.key_type() {
        KeyType::RsaPrivate => {
            let alg = HashAlgorithm::from_wire(hash_code).ok_or(HalError::BadArguments)?;
            let digest = pkcs1::strip_digest_info(input).map_err(|_| HalError::Asn1ParseFailed)?;
            obj.sign_prehash(alg, digest)?
        }
        KeyType::EcPrivate => {
            let alg = HashAlgorithm::from_wire(hash_code).ok_or(HalError::BadArguments)?;
            obj.sign_prehash(alg, input)?
        }
        KeyType::HashsigPrivate => {
            let name = obj.name;
            let owner = obj.owner;
            let kek = ctx.kek();
            let (token, mut trng) = ctx.token_and_trng();
            hss::sign(token, &mut trng, &kek, owner, &name, input).map_err(HalError::from)?
        }
        _ => return Err(HalError::UnsupportedKey),
    };

    if sig.len() > max {
        return Err(HalError::ResultTooLong);
    }
    enc.encode_variable_opaque(&sig)?;
    Ok(())
}

pub fn pkey_verify(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let hash_code = dec.decode_int()?;
    let input = dec.decode_variable_opaque()?;
    let sig = dec.decode_variable_opaque()?;

    let obj = ctx.pkeys.get(handle)?;
    match obj.key_type() {
        KeyType::RsaPrivate | KeyType::RsaPublic => {
            let alg = HashAlgorithm::from_wire(hash_code).ok_or(HalError::BadArguments)?;
            let digest = pkcs1::strip_digest_info(input).map_err(|_| HalError::Asn1ParseFailed)?;
            obj.verify_prehash(alg, digest, sig)
        }
        KeyType::EcPrivate | KeyType::EcPublic => {
            let alg = HashAlgorithm::from_wire(hash_code).ok_or(HalError::BadArguments)?;
            obj.verify_prehash(alg, input, sig)
        }
        KeyType::HashsigPrivate | KeyType::HashsigPublic => {
            let public_key = obj.public_key_der()?;
            hss::verify(&public_key, input, sig).map_err(HalError::from)
        }
        _ => Err(HalError::UnsupportedKey),
    }
}

#[allow(clippy::too_many_lines)]
pub fn pkey_match(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let type_code = dec.decode_int()?;
    let curve_code = dec.decode_int()?;
    let mask = dec.decode_int()?;
    let want_flags = dec.decode_int()?;

    let attr_count = dec.decode_int()? as usize;
    let mut required_attrs = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        let attr_type = dec.decode_int()?;
        let value = dec.decode_variable_opaque()?.to_vec();
        required_attrs.push((attr_type, value));
    }

    // Opaque cursor (spec §9 Open Question): echoed back unchanged. The
    // actual enumeration position is carried in `previous`.
    let state = dec.decode_int()?;
    let result_max = dec.decode_int()? as usize;
    let previous = decode_uuid(dec)?;

    let key_type = if type_code == NO_FILTER { None } else { Some(decode_key_type(type_code)?) };
    let curve = if curve_code == NO_FILTER { None } else { Some(decode_curve(curve_code)?) };

    let (results, _cursor) = ctx.token.search(owner, key_type, curve, want_flags, mask, &required_attrs, previous, result_max).map_err(HalError::from)?;

    enc.encode_int(state)?;
    enc.encode_int(results.len() as u32)?;
    for uuid in &results {
        enc.encode_fixed_opaque(uuid)?;
    }
    Ok(())
}

pub fn pkey_get_key_curve(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let curve = ctx.pkeys.get(handle)?.curve();
    enc.encode_int(curve.to_byte() as u32)?;
    Ok(())
}

pub fn pkey_set_attributes(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let name = ctx.pkeys.get(handle)?.name;

    let count = dec.decode_int()? as usize;
    let mut requests = Vec::with_capacity(count);
    for _ in 0..count {
        let attr_type = dec.decode_int()?;
        let len = dec.decode_int()?;
        if len == DELETE_SENTINEL_LEN {
            requests.push(AttrRequest { attr_type, value: Vec::new(), delete: true });
        } else {
            let value = dec.decode_fixed_opaque(len as usize)?.to_vec();
            requests.push(AttrRequest { attr_type, value, delete: false });
        }
    }

    ctx.token.set_attributes(&name, &requests).map_err(HalError::from)
}

pub fn pkey_get_attributes(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let name = ctx.pkeys.get(handle)?.name;
    let buf_len = dec.decode_int()? as usize;

    let count = dec.decode_int()? as usize;
    let mut requested = Vec::with_capacity(count);
    for _ in 0..count {
        requested.push(dec.decode_int()?);
    }

    let results = ctx.token.get_attributes(&name, &requested, buf_len).map_err(HalError::from)?;
    enc.encode_int(results.len() as u32)?;
    for r in &results {
        enc.encode_int(r.attr_type)?;
        enc.encode_int(r.length)?;
        match &r.value {
            Some(v) => {
                enc.encode_int(1)?;
                enc.encode_fixed_opaque(v)?;
            }
            None => enc.encode_int(0)?,
        }
    }
    Ok(())
}

/// `PKEY_EXPORT`: wraps the private key DER under the caller-supplied
/// `kekek` (a fresh, one-time AES-256 key-encryption key, not the device's
/// own KEK) so the plaintext never leaves RAM. `PKEY_IMPORT` reverses it.
pub fn pkey_export(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let handle = dec.decode_int()?;
    let kekek = dec.decode_fixed_opaque(32)?;
    let max_pkcs8 = dec.decode_int()? as usize;
    let max_kek = dec.decode_int()? as usize;

    let obj = ctx.pkeys.get(handle)?;
    let der = obj.private_key_der()?;
    if der.len() > max_pkcs8 {
        return Err(HalError::ResultTooLong);
    }
    let kekek_arr: [u8; 32] = kekek.try_into().map_err(|_| HalError::BadArguments)?;
    let wrapped = hsm_keywrap::wrap_aes256(&kekek_arr, &der).map_err(HalError::from)?;
    if wrapped.len() > max_kek {
        return Err(HalError::ResultTooLong);
    }

    enc.encode_variable_opaque(&der)?;
    enc.encode_variable_opaque(&wrapped)?;
    Ok(())
}

pub fn pkey_import(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let kekek = dec.decode_fixed_opaque(32)?;
    let pkcs8 = dec.decode_variable_opaque()?;
    let wrapped_kek = dec.decode_variable_opaque()?;
    let flags = dec.decode_int()?;

    let kekek_arr: [u8; 32] = kekek.try_into().map_err(|_| HalError::BadArguments)?;
    let der = if wrapped_kek.is_empty() {
        pkcs8.to_vec()
    } else {
        hsm_keywrap::unwrap_aes256(&kekek_arr, wrapped_kek, pkcs8.len()).map_err(HalError::from)?
    };

    let name = hsm_keystore::generate(&mut ctx.trng());
    let obj = PkeyObject::from_private_der_autodetect(&der, name, owner, flags)?;
    ctx.store_key_der(owner, name, obj.key_type(), obj.curve(), flags, &der)?;
    let handle = ctx.pkeys.insert(obj)?;

    enc.encode_int(handle)?;
    enc.encode_fixed_opaque(&name)?;
    Ok(())
}

pub fn pkey_generate_hashsig(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let owner = dec.decode_int()?;
    let levels = dec.decode_int()? as usize;
    let lms_type = LmsType::from_wire_code(dec.decode_int()?).ok_or(HalError::BadArguments)?;
    let lmots_type = LmotsType::from_wire_code(dec.decode_int()?).ok_or(HalError::BadArguments)?;
    let flags = dec.decode_int()?;

    if levels == 0 || levels > hss::MAX_LEVELS {
        return Err(HalError::BadArguments);
    }
    let level_params: Vec<_> = core::iter::repeat((lms_type, lmots_type)).take(levels).collect();

    let name = hsm_keystore::generate(&mut ctx.trng());
    let kek = ctx.kek();
    let public_key = {
        let (token, mut trng) = ctx.token_and_trng();
        hss::generate(token, &mut trng, &kek, owner, &name, &level_params).map_err(HalError::from)?
    };
    let handle = ctx.pkeys.insert(PkeyObject { name, owner, flags, material: KeyMaterial::HashsigPrivate { public_key } })?;

    enc.encode_int(handle)?;
    enc.encode_fixed_opaque(&name)?;
    Ok(())
}
