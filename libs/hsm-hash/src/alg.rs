/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512Trunc224,
    Sha512Trunc256,
}

impl HashAlgorithm {
    /// The `alg:u32` wire encoding used by `HASH_GET_DIGEST_LEN`,
    /// `HASH_GET_DIGEST_ALGORITHM_ID`, `HASH_GET_ALGORITHM` and
    /// `HASH_INITIALIZE`. Not pinned by anything outside this crate, so the
    /// ordering is just the declaration order above.
    pub fn from_wire(code: u32) -> Option<Self> {
        use HashAlgorithm::*;
        Some(match code {
            0 => Sha1,
            1 => Sha224,
            2 => Sha256,
            3 => Sha384,
            4 => Sha512,
            5 => Sha512Trunc224,
            6 => Sha512Trunc256,
            _ => return None,
        })
    }

    pub fn wire_code(self) -> u32 {
        use HashAlgorithm::*;
        match self {
            Sha1 => 0,
            Sha224 => 1,
            Sha256 => 2,
            Sha384 => 3,
            Sha512 => 4,
            Sha512Trunc224 => 5,
            Sha512Trunc256 => 6,
        }
    }
}

/// Which compression function family an algorithm belongs to: SHA-1 (5 x
/// u32 state, 64-byte block), SHA-256 family (8 x u32 state, 64-byte block)
/// or SHA-512 family (8 x u64 state, 128-byte block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Sha1,
    Sha256,
    Sha512,
}

pub struct AlgorithmDescriptor {
    pub algorithm: HashAlgorithm,
    pub(crate) family: Family,
    pub block_len: usize,
    pub digest_len: usize,
    /// width, in bytes, of the length field appended during padding: 8 for
    /// the SHA-1/SHA-256 family, 16 for the SHA-512 family.
    pub(crate) len_field_bytes: usize,
    /// DER-encoded AlgorithmIdentifier OID blob for this digest, returned by
    /// `HASH_GET_DIGEST_ALGORITHM_ID`. ASN.1/DER itself is out of scope
    ///; these are opaque fixed byte strings.
    pub digest_algorithm_id: &'static [u8],
    /// Whether a hardware core for this algorithm can have its internal
    /// state read back and restored, letting one core be time-shared across
    /// concurrent streams. False only for SHA-1.
    pub can_restore_state: bool,
    pub core_name: &'static str,
}

// DigestInfo AlgorithmIdentifier prefixes (RFC 3447 / NIST): OID + params,
// without the leading SEQUENCE/OCTET STRING wrapper that rpc_pkcs1 adds
// around the digest itself.
const SHA1_ID: &[u8] = &[0x2b, 0x0e, 0x03, 0x02, 0x1a];
const SHA224_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04];
const SHA256_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
const SHA384_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];
const SHA512_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];
const SHA512_224_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x05];
const SHA512_256_ID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x06];

pub fn descriptor(alg: HashAlgorithm) -> AlgorithmDescriptor {
    use HashAlgorithm::*;
    match alg {
        Sha1 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha1,
            block_len: 64,
            digest_len: 20,
            len_field_bytes: 8,
            digest_algorithm_id: SHA1_ID,
            can_restore_state: false,
            core_name: "sha1",
        },
        Sha224 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha256,
            block_len: 64,
            digest_len: 28,
            len_field_bytes: 8,
            digest_algorithm_id: SHA224_ID,
            can_restore_state: true,
            core_name: "sha2-256",
        },
        Sha256 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha256,
            block_len: 64,
            digest_len: 32,
            len_field_bytes: 8,
            digest_algorithm_id: SHA256_ID,
            can_restore_state: true,
            core_name: "sha2-256",
        },
        Sha384 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha512,
            block_len: 128,
            digest_len: 48,
            len_field_bytes: 16,
            digest_algorithm_id: SHA384_ID,
            can_restore_state: true,
            core_name: "sha2-512",
        },
        Sha512 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha512,
            block_len: 128,
            digest_len: 64,
            len_field_bytes: 16,
            digest_algorithm_id: SHA512_ID,
            can_restore_state: true,
            core_name: "sha2-512",
        },
        Sha512Trunc224 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha512,
            block_len: 128,
            digest_len: 28,
            len_field_bytes: 16,
            digest_algorithm_id: SHA512_224_ID,
            can_restore_state: true,
            core_name: "sha2-512",
        },
        Sha512Trunc256 => AlgorithmDescriptor {
            algorithm: alg,
            family: Family::Sha512,
            block_len: 128,
            digest_len: 32,
            len_field_bytes: 16,
            digest_algorithm_id: SHA512_256_ID,
            can_restore_state: true,
            core_name: "sha2-512",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HashAlgorithm::*;

    #[test]
    fn wire_code_round_trips_every_algorithm() {
        let all = [Sha1, Sha224, Sha256, Sha384, Sha512, Sha512Trunc224, Sha512Trunc256];
        for alg in all {
            assert_eq!(HashAlgorithm::from_wire(alg.wire_code()), Some(alg));
        }
    }

    #[test]
    fn unknown_wire_code_is_rejected() {
        assert_eq!(HashAlgorithm::from_wire(7), None);
    }
}
