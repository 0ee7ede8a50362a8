//! EC key material across the three NIST curves the spec supports, unified
//! behind one small enum pair so the dispatcher doesn't need to be generic
//! over a curve type parameter. Sign/verify go through `ecdsa`'s
//! `PrehashSigner`/`PrehashVerifier` — the caller has already reduced the
//! message to a digest (either via the mixed-regime PKCS#1 path or a
//! finalized `HASH_*` handle), so there is no second hash applied here.

use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use ecdsa::signature::SignatureEncoding;
use hsm_keystore::Curve;
use hsm_rpc::HalError;
use p256::NistP256;
use p384::NistP384;
use p521::NistP521;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand_core::{CryptoRng, RngCore};
use spki::{DecodePublicKey, EncodePublicKey};

pub enum EcPrivateKey {
    P256(ecdsa::SigningKey<NistP256>),
    P384(ecdsa::SigningKey<NistP384>),
    P521(ecdsa::SigningKey<NistP521>),
}

pub enum EcPublicKey {
    P256(ecdsa::VerifyingKey<NistP256>),
    P384(ecdsa::VerifyingKey<NistP384>),
    P521(ecdsa::VerifyingKey<NistP521>),
}

impl EcPrivateKey {
    pub fn curve(&self) -> Curve {
        match self {
            EcPrivateKey::P256(_) => Curve::P256,
            EcPrivateKey::P384(_) => Curve::P384,
            EcPrivateKey::P521(_) => Curve::P521,
        }
    }

    pub fn generate(curve: Curve, rng: &mut (impl RngCore + CryptoRng)) -> Result<Self, HalError> {
        Ok(match curve {
            Curve::P256 => EcPrivateKey::P256(ecdsa::SigningKey::<NistP256>::random(rng)),
            Curve::P384 => EcPrivateKey::P384(ecdsa::SigningKey::<NistP384>::random(rng)),
            Curve::P521 => EcPrivateKey::P521(ecdsa::SigningKey::<NistP521>::random(rng)),
            Curve::None => return Err(HalError::BadArguments),
        })
    }

    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, HalError> {
        let doc = match self {
            EcPrivateKey::P256(k) => k.to_pkcs8_der(),
            EcPrivateKey::P384(k) => k.to_pkcs8_der(),
            EcPrivateKey::P521(k) => k.to_pkcs8_der(),
        }
        .map_err(|_| HalError::Asn1ParseFailed)?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn from_pkcs8_der(curve: Curve, der: &[u8]) -> Result<Self, HalError> {
        Ok(match curve {
            Curve::P256 => EcPrivateKey::P256(ecdsa::SigningKey::<NistP256>::from_pkcs8_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::P384 => EcPrivateKey::P384(ecdsa::SigningKey::<NistP384>::from_pkcs8_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::P521 => EcPrivateKey::P521(ecdsa::SigningKey::<NistP521>::from_pkcs8_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::None => return Err(HalError::BadArguments),
        })
    }

    pub fn public_key(&self) -> EcPublicKey {
        match self {
            EcPrivateKey::P256(k) => EcPublicKey::P256(*k.verifying_key()),
            EcPrivateKey::P384(k) => EcPublicKey::P384(*k.verifying_key()),
            EcPrivateKey::P521(k) => EcPublicKey::P521(*k.verifying_key()),
        }
    }

    /// Sign a precomputed digest, returning the fixed-width `r || s`
    /// signature encoding (`SignatureEncoding`), not ASN.1 DER — ASN.1/DER
    /// is out of scope per spec.md §1, so this sticks to the plain
    /// concatenated form every `ecdsa::Signature` already carries.
    pub fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>, HalError> {
        match self {
            EcPrivateKey::P256(k) => {
                let sig: ecdsa::Signature<NistP256> = PrehashSigner::sign_prehash(k, digest).map_err(|_| HalError::BadArguments)?;
                Ok(sig.to_vec())
            }
            EcPrivateKey::P384(k) => {
                let sig: ecdsa::Signature<NistP384> = PrehashSigner::sign_prehash(k, digest).map_err(|_| HalError::BadArguments)?;
                Ok(sig.to_vec())
            }
            EcPrivateKey::P521(k) => {
                let sig: ecdsa::Signature<NistP521> = PrehashSigner::sign_prehash(k, digest).map_err(|_| HalError::BadArguments)?;
                Ok(sig.to_vec())
            }
        }
    }
}

impl EcPublicKey {
    pub fn curve(&self) -> Curve {
        match self {
            EcPublicKey::P256(_) => Curve::P256,
            EcPublicKey::P384(_) => Curve::P384,
            EcPublicKey::P521(_) => Curve::P521,
        }
    }

    pub fn to_public_key_der(&self) -> Result<Vec<u8>, HalError> {
        let doc = match self {
            EcPublicKey::P256(k) => k.to_public_key_der(),
            EcPublicKey::P384(k) => k.to_public_key_der(),
            EcPublicKey::P521(k) => k.to_public_key_der(),
        }
        .map_err(|_| HalError::Asn1ParseFailed)?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn from_public_key_der(curve: Curve, der: &[u8]) -> Result<Self, HalError> {
        Ok(match curve {
            Curve::P256 => EcPublicKey::P256(ecdsa::VerifyingKey::<NistP256>::from_public_key_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::P384 => EcPublicKey::P384(ecdsa::VerifyingKey::<NistP384>::from_public_key_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::P521 => EcPublicKey::P521(ecdsa::VerifyingKey::<NistP521>::from_public_key_der(der).map_err(|_| HalError::Asn1ParseFailed)?),
            Curve::None => return Err(HalError::BadArguments),
        })
    }

    pub fn verify_prehash(&self, digest: &[u8], sig_bytes: &[u8]) -> Result<(), HalError> {
        let ok = match self {
            EcPublicKey::P256(k) => {
                let sig = ecdsa::Signature::<NistP256>::try_from(sig_bytes).map_err(|_| HalError::Asn1ParseFailed)?;
                PrehashVerifier::verify_prehash(k, digest, &sig).is_ok()
            }
            EcPublicKey::P384(k) => {
                let sig = ecdsa::Signature::<NistP384>::try_from(sig_bytes).map_err(|_| HalError::Asn1ParseFailed)?;
                PrehashVerifier::verify_prehash(k, digest, &sig).is_ok()
            }
            EcPublicKey::P521(k) => {
                let sig = ecdsa::Signature::<NistP521>::try_from(sig_bytes).map_err(|_| HalError::Asn1ParseFailed)?;
                PrehashVerifier::verify_prehash(k, digest, &sig).is_ok()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(HalError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TrngRng;
    use hsm_keystore::CountingTrng;

    #[test]
    fn p256_roundtrips_through_pkcs8_and_signs_a_digest() {
        let mut trng = CountingTrng::new();
        let mut rng = TrngRng::new(&mut trng);
        let key = EcPrivateKey::generate(Curve::P256, &mut rng).unwrap();
        let der = key.to_pkcs8_der().unwrap();
        let reloaded = EcPrivateKey::from_pkcs8_der(Curve::P256, &der).unwrap();

        let digest = [0x11u8; 32];
        let sig = reloaded.sign_prehash(&digest).unwrap();
        let public = reloaded.public_key();
        assert!(public.verify_prehash(&digest, &sig).is_ok());

        let public_der = public.to_public_key_der().unwrap();
        let reloaded_public = EcPublicKey::from_public_key_der(Curve::P256, &public_der).unwrap();
        assert!(reloaded_public.verify_prehash(&digest, &sig).is_ok());
    }

    #[test]
    fn a_tampered_digest_fails_verification() {
        let mut trng = CountingTrng::new();
        let mut rng = TrngRng::new(&mut trng);
        let key = EcPrivateKey::generate(Curve::P384, &mut rng).unwrap();
        let digest = [0x22u8; 48];
        let sig = key.sign_prehash(&digest).unwrap();
        let other_digest = [0x23u8; 48];
        assert_eq!(key.public_key().verify_prehash(&other_digest, &sig), Err(HalError::InvalidSignature));
    }
}
