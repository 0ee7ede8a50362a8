//! PKCS#1 v1.5 `DigestInfo` envelope (RFC 8017 §9.2), used by the "mixed"
//! dispatch regime (spec §4.6): the client hashes locally, then wraps the
//! digest in a `DigestInfo` before sending it on for an RSA
//! `PKEY_SIGN`/`PKEY_VERIFY` call, exactly as the original's `rpc_pkcs1.c`
//! does. ASN.1/DER itself stays out of scope (spec §1): this only ever
//! builds or recognizes the fixed small `DigestInfo` shape
//! (`SEQUENCE { SEQUENCE { OID, NULL }, OCTET STRING }`) around one of the
//! seven digest algorithm identifiers `hsm_hash` already carries as opaque
//! blobs — it is not a general ASN.1 encoder/decoder.

use hsm_hash::{digest_algorithm_id, HashAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkcs1Error {
    ResultTooLong,
    Malformed,
}

fn der_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(&significant);
    }
}

/// Build `DigestInfo ::= SEQUENCE { algorithm AlgorithmIdentifier, digest
/// OCTET STRING }` around `digest`, into a buffer no larger than `max`.
pub fn build_digest_info(alg: HashAlgorithm, digest: &[u8], max: usize) -> Result<Vec<u8>, Pkcs1Error> {
    let alg_id = digest_algorithm_id(alg, usize::MAX).map_err(|_| Pkcs1Error::Malformed)?;

    let mut octet_string = Vec::new();
    octet_string.push(0x04);
    der_len(digest.len(), &mut octet_string);
    octet_string.extend_from_slice(digest);

    let mut body = Vec::new();
    body.extend_from_slice(alg_id);
    body.extend_from_slice(&octet_string);

    let mut out = Vec::new();
    out.push(0x30);
    der_len(body.len(), &mut out);
    out.extend_from_slice(&body);

    if out.len() > max {
        return Err(Pkcs1Error::ResultTooLong);
    }
    Ok(out)
}

/// Recover the bare digest bytes from a `DigestInfo` envelope, without
/// validating which algorithm it names (the caller already knows which hash
/// it asked for and compares the whole envelope, or the algorithm
/// identifier, as its protocol requires).
pub fn strip_digest_info(der: &[u8]) -> Result<&[u8], Pkcs1Error> {
    if der.first() != Some(&0x30) {
        return Err(Pkcs1Error::Malformed);
    }
    let mut pos = 1;
    let (seq_len, _) = read_len(der, &mut pos)?;
    if pos + seq_len > der.len() {
        return Err(Pkcs1Error::Malformed);
    }
    // algorithm AlgorithmIdentifier (SEQUENCE)
    if der.get(pos) != Some(&0x30) {
        return Err(Pkcs1Error::Malformed);
    }
    pos += 1;
    let (alg_len, _) = read_len(der, &mut pos)?;
    pos += alg_len;
    // digest OCTET STRING
    if der.get(pos) != Some(&0x04) {
        return Err(Pkcs1Error::Malformed);
    }
    pos += 1;
    let (digest_len, _) = read_len(der, &mut pos)?;
    if pos + digest_len > der.len() {
        return Err(Pkcs1Error::Malformed);
    }
    Ok(&der[pos..pos + digest_len])
}

fn read_len(der: &[u8], pos: &mut usize) -> Result<(usize, usize), Pkcs1Error> {
    // skip the tag byte the caller already checked, if any, by advancing pos
    // past the length field that starts at *pos now holding the tag's length
    // byte position; `build_digest_info`'s layout always puts tag then
    // length, so this helper starts reading right after the tag.
    let first = *der.get(*pos).ok_or(Pkcs1Error::Malformed)?;
    *pos += 1;
    if first & 0x80 == 0 {
        Ok((first as usize, *pos))
    } else {
        let n = (first & 0x7F) as usize;
        if n == 0 || n > 4 || *pos + n > der.len() {
            return Err(Pkcs1Error::Malformed);
        }
        let mut len = 0usize;
        for &b in &der[*pos..*pos + n] {
            len = (len << 8) | b as usize;
        }
        *pos += n;
        Ok((len, *pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_strips_sha256_digest_info() {
        let digest = [0x42u8; 32];
        let info = build_digest_info(HashAlgorithm::Sha256, &digest, 64).unwrap();
        assert_eq!(info[0], 0x30);
        let recovered = strip_digest_info(&info).unwrap();
        assert_eq!(recovered, &digest[..]);
    }

    #[test]
    fn rejects_output_that_does_not_fit() {
        let digest = [0u8; 64];
        assert_eq!(build_digest_info(HashAlgorithm::Sha512, &digest, 4), Err(Pkcs1Error::ResultTooLong));
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        assert_eq!(strip_digest_info(&[0x30, 0x02, 0x00]), Err(Pkcs1Error::Malformed));
    }
}
