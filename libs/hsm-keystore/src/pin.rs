//! PBKDF2-HMAC-SHA256 PIN hashing and login.

use crate::block::PinRecord;
use crate::error::KsError;
use crate::uuid::Trng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const DEFAULT_ITERATIONS: u32 = 2000;
pub const MIN_ITERATIONS: u32 = 1000;

/// The recovery wheel PIN baked into firmware for use when no PIN block
/// exists yet.
pub const LAST_GASP_WHEEL_PIN: &[u8] = b"SatoshiNakamotoDiceRollsAreRandomEnough";

fn derive(pin: &[u8], salt: &[u8; 16], iterations: u32) -> [u8; 64] {
    let mut out = [0u8; 64];
    pbkdf2::pbkdf2_hmac::<Sha256>(pin, salt, iterations, &mut out);
    out
}

/// Hash a fresh PIN with a new per-user salt from the TRNG, using the
/// configured iteration count (default, never below the floor).
pub fn set_pin(trng: &mut dyn Trng, pin: &[u8], iterations: u32) -> Result<PinRecord, KsError> {
    if iterations < MIN_ITERATIONS {
        return Err(KsError::PinTooFewIterations);
    }
    let mut salt = [0u8; 16];
    trng.fill(&mut salt);
    let hash = derive(pin, &salt, iterations);
    Ok(PinRecord { iterations, salt, hash })
}

/// Re-derive the hash from `pin` under `record`'s stored salt/iterations and
/// compare in constant time. On mismatch the caller's task sleeps 5 s before
/// the error is returned.
pub fn login(record: &PinRecord, pin: &[u8]) -> Result<(), KsError> {
    if record.iterations < MIN_ITERATIONS {
        return Err(KsError::PinTooFewIterations);
    }
    let candidate = derive(pin, &record.salt, record.iterations);
    if candidate.ct_eq(&record.hash).into() {
        Ok(())
    } else {
        hsm_rt::task_sleep(5);
        Err(KsError::PinIncorrect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::CountingTrng;

    #[test]
    fn correct_pin_logs_in() {
        let mut trng = CountingTrng::new();
        let record = set_pin(&mut trng, b"hunter2", DEFAULT_ITERATIONS).unwrap();
        assert!(login(&record, b"hunter2").is_ok());
    }

    #[test]
    fn wrong_pin_is_rejected() {
        let mut trng = CountingTrng::new();
        let record = set_pin(&mut trng, b"hunter2", DEFAULT_ITERATIONS).unwrap();
        assert_eq!(login(&record, b"wrong"), Err(KsError::PinIncorrect));
    }

    #[test]
    fn rejects_iteration_count_below_floor() {
        let mut trng = CountingTrng::new();
        assert_eq!(set_pin(&mut trng, b"x", 500), Err(KsError::PinTooFewIterations));
    }

    /// RFC-style single-iteration test vector for the underlying primitive
    /// `derive` wraps, independent of this module's fixed 16-byte salt.
    #[test]
    fn pbkdf2_hmac_sha256_matches_known_vector() {
        let mut out = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"password", b"salt", 1, &mut out);
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }
}
