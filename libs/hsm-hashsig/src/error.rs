use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSigError {
    /// The bottom-level LMS key (and every level above it) has signed its
    /// last message; no further signatures are possible without generating
    /// a brand new HSS key.
    KeyExhausted,
    /// The volatile keystore does not have `(L-1)*(2^h+1)` free blocks to
    /// hold the non-root trees.
    NoSlots,
    /// An LM-OTS private key, LMS private key, or HSS wrapper does not fit
    /// in a keystore block.
    ResultTooLong,
    /// A signature failed to verify.
    InvalidSignature,
    /// A signature or public key was truncated or carried an unexpected
    /// field value.
    Malformed,
    /// The restart-recovery task has not yet finished scanning persisted
    /// HSS keys; all operations return this until it completes.
    NotReady,
    Keystore(hsm_keystore::KsError),
    Hash(hsm_hash::HashError),
}

impl fmt::Display for HashSigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashSigError::KeyExhausted => f.write_str("hash-based signature key is exhausted"),
            HashSigError::NoSlots => f.write_str("not enough free keystore blocks for the non-root trees"),
            HashSigError::ResultTooLong => f.write_str("private key or signature does not fit in a block/packet"),
            HashSigError::InvalidSignature => f.write_str("hash-based signature did not verify"),
            HashSigError::Malformed => f.write_str("malformed hash-based signature key or signature"),
            HashSigError::NotReady => f.write_str("hash-based signature restart recovery has not completed"),
            HashSigError::Keystore(e) => write!(f, "keystore error: {e}"),
            HashSigError::Hash(e) => write!(f, "hash engine error: {e}"),
        }
    }
}

impl From<hsm_keystore::KsError> for HashSigError {
    fn from(e: hsm_keystore::KsError) -> Self {
        HashSigError::Keystore(e)
    }
}

impl From<hsm_hash::HashError> for HashSigError {
    fn from(e: hsm_hash::HashError) -> Self {
        HashSigError::Hash(e)
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for HashSigError {}
