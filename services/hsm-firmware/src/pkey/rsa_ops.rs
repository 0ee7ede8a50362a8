//! RSA key material: generation, PKCS#8/SPKI DER (de)serialization, and
//! PKCS#1 v1.5 sign/verify over a precomputed digest. The `DigestInfo`
//! prefix `rsa`'s `Pkcs1v15Sign` wraps around the digest is exactly the
//! `AlgorithmIdentifier` blob `hsm_hash::digest_algorithm_id` already
//! carries as an opaque constant, so no ASN.1 is built by hand here.

use hsm_hash::HashAlgorithm;
use hsm_rpc::HalError;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand_core::{CryptoRng, RngCore};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use spki::{DecodePublicKey, EncodePublicKey};

fn pkcs1v15_scheme(alg: HashAlgorithm, digest_len: usize) -> Result<Pkcs1v15Sign, HalError> {
    let prefix = hsm_hash::digest_algorithm_id(alg, usize::MAX).map_err(|_| HalError::Asn1ParseFailed)?;
    Ok(Pkcs1v15Sign { hash_len: Some(digest_len), prefix: prefix.to_vec().into_boxed_slice() })
}

pub fn generate(bits: usize, public_exponent: &[u8], rng: &mut (impl RngCore + CryptoRng)) -> Result<RsaPrivateKey, HalError> {
    let e = BigUint::from_bytes_be(public_exponent);
    RsaPrivateKey::new_with_exp(rng, bits, &e).map_err(|_| HalError::BadArguments)
}

pub fn to_pkcs8_der(key: &RsaPrivateKey) -> Result<Vec<u8>, HalError> {
    let doc = key.to_pkcs8_der().map_err(|_| HalError::Asn1ParseFailed)?;
    Ok(doc.as_bytes().to_vec())
}

pub fn from_pkcs8_der(der: &[u8]) -> Result<RsaPrivateKey, HalError> {
    RsaPrivateKey::from_pkcs8_der(der).map_err(|_| HalError::Asn1ParseFailed)
}

pub fn to_public_key_der(key: &RsaPublicKey) -> Result<Vec<u8>, HalError> {
    let doc = key.to_public_key_der().map_err(|_| HalError::Asn1ParseFailed)?;
    Ok(doc.as_bytes().to_vec())
}

pub fn from_public_key_der(der: &[u8]) -> Result<RsaPublicKey, HalError> {
    RsaPublicKey::from_public_key_der(der).map_err(|_| HalError::Asn1ParseFailed)
}

pub fn sign(key: &RsaPrivateKey, alg: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, HalError> {
    let scheme = pkcs1v15_scheme(alg, digest.len())?;
    key.sign(scheme, digest).map_err(|_| HalError::BadArguments)
}

pub fn verify(key: &RsaPublicKey, alg: HashAlgorithm, digest: &[u8], sig: &[u8]) -> Result<(), HalError> {
    let scheme = pkcs1v15_scheme(alg, digest.len())?;
    key.verify(scheme, digest, sig).map_err(|_| HalError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TrngRng;
    use hsm_keystore::CountingTrng;
    use rsa::traits::PublicKeyParts;

    /// A small modulus so the test doesn't spend real key-generation time;
    /// never the size a real `PKEY_GENERATE_RSA` call would request.
    const TEST_BITS: usize = 512;

    #[test]
    fn generated_key_round_trips_through_pkcs8_and_signs() {
        let mut trng = CountingTrng::new();
        let mut rng = TrngRng::new(&mut trng);
        let key = generate(TEST_BITS, &65537u32.to_be_bytes(), &mut rng).unwrap();
        assert!(key.n().bits() >= TEST_BITS - 1);

        let der = to_pkcs8_der(&key).unwrap();
        let reloaded = from_pkcs8_der(&der).unwrap();

        let digest = [0x33u8; 32];
        let sig = sign(&reloaded, HashAlgorithm::Sha256, &digest).unwrap();
        let public = RsaPublicKey::from(&reloaded);
        assert!(verify(&public, HashAlgorithm::Sha256, &digest, &sig).is_ok());

        let public_der = to_public_key_der(&public).unwrap();
        let reloaded_public = from_public_key_der(&public_der).unwrap();
        assert!(verify(&reloaded_public, HashAlgorithm::Sha256, &digest, &sig).is_ok());
    }

    #[test]
    fn wrong_digest_is_rejected() {
        let mut trng = CountingTrng::new();
        let mut rng = TrngRng::new(&mut trng);
        let key = generate(TEST_BITS, &65537u32.to_be_bytes(), &mut rng).unwrap();
        let digest = [0x44u8; 32];
        let sig = sign(&key, HashAlgorithm::Sha256, &digest).unwrap();
        let public = RsaPublicKey::from(&key);
        let other = [0x45u8; 32];
        assert_eq!(verify(&public, HashAlgorithm::Sha256, &other, &sig), Err(HalError::InvalidSignature));
    }
}
