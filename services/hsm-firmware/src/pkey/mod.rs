//! Open pkey objects: the in-RAM form of whatever key a `PKEY_LOAD`/
//! `PKEY_OPEN`/`PKEY_GENERATE_*` call produced, addressed afterward by the
//! handle returned to the caller.
//!
//! RSA and EC private/public keys are fully materialized here (their
//! PKCS#8/SPKI DER round-trips through the `rsa`/`p256`/`p384`/`p521`
//! crates). Hashsig keys are the odd one out: their "private key" is really
//! just the keystore name its level-0 LMS record lives under — signing and
//! capacity bookkeeping always go back through `hsm_hashsig::hss` by name,
//! so only the cached public key bytes are kept here.

pub mod ec_ops;
pub mod rsa_ops;

use ec_ops::{EcPrivateKey, EcPublicKey};
use hsm_hash::HashAlgorithm;
use hsm_keystore::{Curve, KeyType, Uuid};
use hsm_rpc::HalError;
use rsa::{RsaPrivateKey, RsaPublicKey};

pub enum KeyMaterial {
    RsaPrivate(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
    EcPrivate(EcPrivateKey),
    EcPublic(EcPublicKey),
    HashsigPrivate { public_key: Vec<u8> },
    HashsigPublic { public_key: Vec<u8> },
}

/// An open pkey handle's payload: the key material plus the keystore
/// identity it was loaded from (or will be stored under, for a freshly
/// generated key), so `PKEY_SIGN`/`PKEY_EXPORT`/etc. can always address the
/// persisted record without the caller re-supplying the name.
pub struct PkeyObject {
    pub name: Uuid,
    pub owner: u32,
    pub flags: u32,
    pub material: KeyMaterial,
}

impl PkeyObject {
    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::RsaPrivate(_) => KeyType::RsaPrivate,
            KeyMaterial::RsaPublic(_) => KeyType::RsaPublic,
            KeyMaterial::EcPrivate(_) => KeyType::EcPrivate,
            KeyMaterial::EcPublic(_) => KeyType::EcPublic,
            KeyMaterial::HashsigPrivate { .. } => KeyType::HashsigPrivate,
            KeyMaterial::HashsigPublic { .. } => KeyType::HashsigPublic,
        }
    }

    pub fn curve(&self) -> Curve {
        match &self.material {
            KeyMaterial::EcPrivate(k) => k.curve(),
            KeyMaterial::EcPublic(k) => k.curve(),
            _ => Curve::None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self.material, KeyMaterial::RsaPrivate(_) | KeyMaterial::EcPrivate(_) | KeyMaterial::HashsigPrivate { .. })
    }

    /// `PKEY_GET_PUBLIC_KEY`: the public half in DER (SPKI for RSA/EC; for
    /// hashsig, the same `u32(L) || LMS-pubkey` bytes `hss::generate` and
    /// `hss::verify` already use as their public key format — ASN.1/DER is
    /// explicitly out of scope, so this is just their one fixed byte shape).
    pub fn public_key_der(&self) -> Result<Vec<u8>, HalError> {
        match &self.material {
            KeyMaterial::RsaPrivate(k) => rsa_ops::to_public_key_der(&RsaPublicKey::from(k)),
            KeyMaterial::RsaPublic(k) => rsa_ops::to_public_key_der(k),
            KeyMaterial::EcPrivate(k) => k.public_key().to_public_key_der(),
            KeyMaterial::EcPublic(k) => k.to_public_key_der(),
            KeyMaterial::HashsigPrivate { public_key } | KeyMaterial::HashsigPublic { public_key } => Ok(public_key.clone()),
        }
    }

    /// Sign a precomputed digest with an RSA or EC private key. Hashsig
    /// keys sign raw messages through `hsm_hashsig::hss::sign` instead (see
    /// `handlers::pkey`), since LM-OTS is not a digest-then-sign scheme in
    /// the same sense.
    pub fn sign_prehash(&self, alg: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, HalError> {
        match &self.material {
            KeyMaterial::RsaPrivate(k) => rsa_ops::sign(k, alg, digest),
            KeyMaterial::EcPrivate(k) => k.sign_prehash(digest),
            _ => Err(HalError::UnsupportedKey),
        }
    }

    pub fn verify_prehash(&self, alg: HashAlgorithm, digest: &[u8], sig: &[u8]) -> Result<(), HalError> {
        match &self.material {
            KeyMaterial::RsaPrivate(k) => rsa_ops::verify(&RsaPublicKey::from(k), alg, digest, sig),
            KeyMaterial::RsaPublic(k) => rsa_ops::verify(k, alg, digest, sig),
            KeyMaterial::EcPrivate(k) => k.public_key().verify_prehash(digest, sig),
            KeyMaterial::EcPublic(k) => k.verify_prehash(digest, sig),
            _ => Err(HalError::UnsupportedKey),
        }
    }

    /// `PKEY_EXPORT`/persistence: the private key's PKCS#8 DER, plaintext.
    /// Callers are responsible for wrapping it (AES-keywrap under the
    /// keystore KEK for storage, or under a fresh export KEK for
    /// `PKEY_EXPORT`) before it leaves RAM.
    pub fn private_key_der(&self) -> Result<Vec<u8>, HalError> {
        match &self.material {
            KeyMaterial::RsaPrivate(k) => rsa_ops::to_pkcs8_der(k),
            KeyMaterial::EcPrivate(k) => k.to_pkcs8_der(),
            _ => Err(HalError::UnsupportedKey),
        }
    }

    /// `PKEY_LOAD`/`PKEY_IMPORT`: the caller supplies raw PKCS#8 DER with no
    /// type tag at all, so the key type has to be recovered by trying each
    /// supported algorithm in turn — RSA first, then each EC curve — rather
    /// than read off the wire.
    pub fn from_private_der_autodetect(der: &[u8], name: Uuid, owner: u32, flags: u32) -> Result<Self, HalError> {
        if let Ok(key) = rsa_ops::from_pkcs8_der(der) {
            return Ok(PkeyObject { name, owner, flags, material: KeyMaterial::RsaPrivate(key) });
        }
        for curve in [Curve::P256, Curve::P384, Curve::P521] {
            if let Ok(key) = EcPrivateKey::from_pkcs8_der(curve, der) {
                return Ok(PkeyObject { name, owner, flags, material: KeyMaterial::EcPrivate(key) });
            }
        }
        Err(HalError::Asn1ParseFailed)
    }

    /// Reconstruct a private-key object from its type/curve tag and
    /// PKCS#8 DER, as read back out of the keystore or an import request.
    pub fn from_private_der(key_type: KeyType, curve: Curve, der: &[u8], name: Uuid, owner: u32, flags: u32) -> Result<Self, HalError> {
        let material = match key_type {
            KeyType::RsaPrivate => KeyMaterial::RsaPrivate(rsa_ops::from_pkcs8_der(der)?),
            KeyType::EcPrivate => KeyMaterial::EcPrivate(EcPrivateKey::from_pkcs8_der(curve, der)?),
            _ => return Err(HalError::UnsupportedKey),
        };
        Ok(PkeyObject { name, owner, flags, material })
    }

    pub fn from_public_der(key_type: KeyType, curve: Curve, der: &[u8], name: Uuid, owner: u32, flags: u32) -> Result<Self, HalError> {
        let material = match key_type {
            KeyType::RsaPublic => KeyMaterial::RsaPublic(rsa_ops::from_public_key_der(der)?),
            KeyType::EcPublic => KeyMaterial::EcPublic(EcPublicKey::from_public_key_der(curve, der)?),
            _ => return Err(HalError::UnsupportedKey),
        };
        Ok(PkeyObject { name, owner, flags, material })
    }
}
