use crate::error::ModexpError;
use hsm_bus::{io_read, io_wait, io_wait2, io_write, Bus, CoreHandle, Registry};

/// Offset of the CONTROL register: bit 0 is INIT, bit 1 is NEXT.
const CONTROL_OFFSET: u32 = 0x00;
/// Offset of the MODE register: 0 for a plain exponentiation, 1 when
/// `msg_len` is twice `mod_len` (the CRT path).
const MODE_OFFSET: u32 = 0x04;
const MODBITLEN_OFFSET: u32 = 0x08;
const EXPBITLEN_OFFSET: u32 = 0x0C;
const MODULUS_OFFSET: u32 = 0x100;
const COEFF_OFFSET: u32 = 0x200;
const MONT_OFFSET: u32 = 0x300;
const MSG_OFFSET: u32 = 0x400;
const EXP_OFFSET: u32 = 0x500;
const RESULT_OFFSET: u32 = 0x600;

const CONTROL_INIT: u32 = 0x1;
const CONTROL_NEXT: u32 = 0x2;
const STATUS_READY: u32 = 0x1;
const STATUS_VALID: u32 = 0x2;

/// Widest operand the core accepts (4096-bit RSA modulus).
pub const OPERAND_MAX_BYTES: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    Crt,
}

/// One `modexp` call's operand bundle.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub msg: Vec<u8>,
    pub exp: Vec<u8>,
    pub modulus: Vec<u8>,
    pub result: Vec<u8>,
    /// Montgomery `coeff`: supplied by the caller when `precalc` is false,
    /// otherwise filled in by [`modexp`] from the core's precalc readback
    /// and then fed back in as `coeff_in` for the calculation step.
    pub coeff: Vec<u8>,
    pub mont: Vec<u8>,
    pub core: Option<CoreHandle>,
    pub tag: u32,
}

impl Operation {
    fn mod_len(&self) -> u32 {
        self.modulus.len() as u32
    }

    fn mode(&self) -> Result<Mode, ModexpError> {
        let mod_len = self.mod_len();
        if self.msg.len() as u32 == mod_len {
            Ok(Mode::Plain)
        } else if self.msg.len() as u32 == 2 * mod_len {
            Ok(Mode::Crt)
        } else {
            Err(ModexpError::BadLength)
        }
    }

    fn validate(&self) -> Result<(), ModexpError> {
        let mod_len = self.mod_len();
        let exp_len = self.exp.len() as u32;
        if mod_len == 0 || mod_len % 4 != 0 || exp_len % 4 != 0 || self.msg.len() as u32 % 4 != 0 {
            return Err(ModexpError::BadLength);
        }
        if exp_len > mod_len {
            return Err(ModexpError::BadLength);
        }
        if mod_len > OPERAND_MAX_BYTES || self.msg.len() as u32 > 2 * OPERAND_MAX_BYTES {
            return Err(ModexpError::OperandTooWide);
        }
        self.mode()?;
        Ok(())
    }
}

/// Reverse the order of the 4-byte words in `buf` in place. `io_read`/
/// `io_write` already handle each word's own big-endian byte order on the
/// wire; this undoes the core's separate reversal of the word *array*
///.
fn reverse_words(buf: &mut [u8]) {
    debug_assert_eq!(buf.len() % 4, 0);
    let words = buf.len() / 4;
    for i in 0..words / 2 {
        let (lo, hi) = (i * 4, (words - 1 - i) * 4);
        for k in 0..4 {
            buf.swap(lo + k, hi + k);
        }
    }
}

fn load_reversed(bus: &dyn Bus, base: u32, offset: u32, data: &[u8]) -> Result<(), ModexpError> {
    let mut buf = data.to_vec();
    reverse_words(&mut buf);
    io_write(bus, base, offset, &buf)?;
    Ok(())
}

fn unload_reversed(bus: &dyn Bus, base: u32, offset: u32, len: usize) -> Result<Vec<u8>, ModexpError> {
    let mut buf = vec![0u8; len];
    io_read(bus, base, offset, &mut buf)?;
    reverse_words(&mut buf);
    Ok(buf)
}

/// Run one modular exponentiation through the five-step register sequence:
/// load the modulus, optionally precalculate the Montgomery constants, load
/// the message and exponent, pulse `NEXT`, and read back the result.
///
/// Acquires `core_name` into `op.core` if it isn't already held. When
/// `precalc` is true, the core's own Montgomery factor is computed and used
/// (overwriting `op.coeff`/`op.mont`); when false, the caller's existing
/// `op.coeff`/`op.mont` are loaded in as-is.
pub fn modexp(
    op: &mut Operation,
    core_name: &str,
    precalc: bool,
    bus: &dyn Bus,
    registry: &Registry,
) -> Result<(), ModexpError> {
    op.validate()?;
    let mode = op.mode()?;
    registry.core_alloc(core_name, &mut op.core, &mut op.tag)?;
    let base = registry.descriptor(op.core.unwrap()).base;

    let mod_len = op.mod_len();
    load_reversed(bus, base, MODULUS_OFFSET, &op.modulus)?;
    bus.write_word(base, MODBITLEN_OFFSET, mod_len * 8);

    if precalc {
        bus.write_word(base, CONTROL_OFFSET, CONTROL_INIT);
        let mut count = u32::MAX;
        io_wait(bus, base, STATUS_READY, &mut count)?;
        op.coeff = unload_reversed(bus, base, COEFF_OFFSET, mod_len as usize)?;
        op.mont = unload_reversed(bus, base, MONT_OFFSET, mod_len as usize)?;
    }

    load_reversed(bus, base, COEFF_OFFSET, &op.coeff)?;
    load_reversed(bus, base, MONT_OFFSET, &op.mont)?;
    bus.write_word(base, MODE_OFFSET, if mode == Mode::Crt { 1 } else { 0 });
    load_reversed(bus, base, MSG_OFFSET, &op.msg)?;
    load_reversed(bus, base, EXP_OFFSET, &op.exp)?;
    bus.write_word(base, EXPBITLEN_OFFSET, op.exp.len() as u32 * 8);

    bus.write_word(base, CONTROL_OFFSET, CONTROL_NEXT);
    let mut count = u32::MAX;
    io_wait(bus, base, STATUS_VALID, &mut count)?;
    op.result = unload_reversed(bus, base, RESULT_OFFSET, mod_len as usize)?;
    Ok(())
}

/// Run two independent operations on two cores in lockstep: both precalcs start and are waited for together,
/// both calculations start and finish together, then both results are read.
/// Used to parallelize CRT RSA's two half-exponent operations.
#[allow(clippy::too_many_arguments)]
pub fn modexp2(
    op1: &mut Operation,
    core_name1: &str,
    precalc1: bool,
    op2: &mut Operation,
    core_name2: &str,
    precalc2: bool,
    bus: &dyn Bus,
    registry: &Registry,
) -> Result<(), ModexpError> {
    op1.validate()?;
    op2.validate()?;
    let mode1 = op1.mode()?;
    let mode2 = op2.mode()?;

    registry.core_alloc2(core_name1, &mut op1.core, &mut op1.tag, core_name2, &mut op2.core, &mut op2.tag)?;
    let base1 = registry.descriptor(op1.core.unwrap()).base;
    let base2 = registry.descriptor(op2.core.unwrap()).base;

    let mod_len1 = op1.mod_len();
    let mod_len2 = op2.mod_len();
    load_reversed(bus, base1, MODULUS_OFFSET, &op1.modulus)?;
    bus.write_word(base1, MODBITLEN_OFFSET, mod_len1 * 8);
    load_reversed(bus, base2, MODULUS_OFFSET, &op2.modulus)?;
    bus.write_word(base2, MODBITLEN_OFFSET, mod_len2 * 8);

    if precalc1 {
        bus.write_word(base1, CONTROL_OFFSET, CONTROL_INIT);
    }
    if precalc2 {
        bus.write_word(base2, CONTROL_OFFSET, CONTROL_INIT);
    }
    if precalc1 || precalc2 {
        let mut count = u32::MAX;
        io_wait2(bus, precalc1.then_some(base1), precalc2.then_some(base2), STATUS_READY, &mut count)?;
        if precalc1 {
            op1.coeff = unload_reversed(bus, base1, COEFF_OFFSET, mod_len1 as usize)?;
            op1.mont = unload_reversed(bus, base1, MONT_OFFSET, mod_len1 as usize)?;
        }
        if precalc2 {
            op2.coeff = unload_reversed(bus, base2, COEFF_OFFSET, mod_len2 as usize)?;
            op2.mont = unload_reversed(bus, base2, MONT_OFFSET, mod_len2 as usize)?;
        }
    }

    load_reversed(bus, base1, COEFF_OFFSET, &op1.coeff)?;
    load_reversed(bus, base1, MONT_OFFSET, &op1.mont)?;
    bus.write_word(base1, MODE_OFFSET, if mode1 == Mode::Crt { 1 } else { 0 });
    load_reversed(bus, base1, MSG_OFFSET, &op1.msg)?;
    load_reversed(bus, base1, EXP_OFFSET, &op1.exp)?;
    bus.write_word(base1, EXPBITLEN_OFFSET, op1.exp.len() as u32 * 8);

    load_reversed(bus, base2, COEFF_OFFSET, &op2.coeff)?;
    load_reversed(bus, base2, MONT_OFFSET, &op2.mont)?;
    bus.write_word(base2, MODE_OFFSET, if mode2 == Mode::Crt { 1 } else { 0 });
    load_reversed(bus, base2, MSG_OFFSET, &op2.msg)?;
    load_reversed(bus, base2, EXP_OFFSET, &op2.exp)?;
    bus.write_word(base2, EXPBITLEN_OFFSET, op2.exp.len() as u32 * 8);

    bus.write_word(base1, CONTROL_OFFSET, CONTROL_NEXT);
    bus.write_word(base2, CONTROL_OFFSET, CONTROL_NEXT);
    let mut count = u32::MAX;
    io_wait2(bus, Some(base1), Some(base2), STATUS_VALID, &mut count)?;

    op1.result = unload_reversed(bus, base1, RESULT_OFFSET, mod_len1 as usize)?;
    op2.result = unload_reversed(bus, base2, RESULT_OFFSET, mod_len2 as usize)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_bus::{HostedBus, STATUS_OFFSET};

    /// A fake multi-core bus: each registered base reacts to CONTROL writes
    /// as a tiny stand-in core. INIT sets coeff/mont to a fixed marker and
    /// raises READY; NEXT XORs msg and exp together as the "result" (not
    /// RSA-correct, but enough to confirm wiring: operand round-trips, word
    /// order, mode bit, and register sequencing).
    struct FakeCores {
        inner: HostedBus,
        cores: Vec<(u32, u32)>,
    }

    impl FakeCores {
        fn new(cores: &[(u32, u32)]) -> Self {
            FakeCores { inner: HostedBus::new(), cores: cores.to_vec() }
        }

        fn seed(&self, name: &str, base: u32) {
            let padded = pad(name);
            self.inner.poke(base, u32::from_be_bytes(padded[0..4].try_into().unwrap()));
            self.inner.poke(base + 4, u32::from_be_bytes(padded[4..8].try_into().unwrap()));
            self.inner.poke(base + 0x08, 1);
        }
    }

    impl Bus for FakeCores {
        fn read_word(&self, base: u32, offset: u32) -> u32 {
            self.inner.read_word(base, offset)
        }

        fn write_word(&self, base: u32, offset: u32, value: u32) {
            self.inner.write_word(base, offset, value);
            let Some(&(_, mod_len)) = self.cores.iter().find(|&&(b, _)| b == base) else {
                return;
            };
            if offset != CONTROL_OFFSET {
                return;
            }
            if value & CONTROL_INIT != 0 {
                for i in 0..mod_len / 4 {
                    self.inner.write_word(base, COEFF_OFFSET + i * 4, 0xC0FFEE00 + i);
                    self.inner.write_word(base, MONT_OFFSET + i * 4, 0xDEAD0000 + i);
                }
                self.inner.write_word(base, STATUS_OFFSET, STATUS_READY);
            }
            if value & CONTROL_NEXT != 0 {
                for i in 0..mod_len / 4 {
                    let m = self.inner.read_word(base, MSG_OFFSET + i * 4);
                    let e = self.inner.read_word(base, EXP_OFFSET + i * 4);
                    self.inner.write_word(base, RESULT_OFFSET + i * 4, m ^ e);
                }
                self.inner.write_word(base, STATUS_OFFSET, STATUS_READY | STATUS_VALID);
            }
        }
    }

    fn pad(name: &str) -> [u8; 8] {
        let mut out = [b' '; 8];
        let bytes = name.as_bytes();
        let n = bytes.len().min(8);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    #[test]
    fn reverse_words_flips_word_array_order_not_byte_order() {
        let mut buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        reverse_words(&mut buf);
        assert_eq!(buf, [0x05, 0x06, 0x07, 0x08, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn rejects_exponent_longer_than_modulus() {
        let mut op = Operation { modulus: vec![0u8; 8], exp: vec![0u8; 12], msg: vec![0u8; 8], ..Default::default() };
        assert_eq!(op.validate(), Err(ModexpError::BadLength));
    }

    #[test]
    fn accepts_crt_double_width_message() {
        let op = Operation { modulus: vec![0u8; 8], exp: vec![0u8; 4], msg: vec![0u8; 16], ..Default::default() };
        assert_eq!(op.mode(), Ok(Mode::Crt));
    }

    #[test]
    fn modexp_with_precalc_round_trips_through_the_fake_core() {
        let bus = FakeCores::new(&[(0x000, 8)]);
        bus.seed("modexpa7", 0x000);
        let registry = Registry::discover(&bus).unwrap();

        let mut op = Operation {
            modulus: vec![0x11; 8],
            exp: vec![0x22; 4],
            msg: vec![0x33; 8],
            ..Default::default()
        };
        modexp(&mut op, "modexpa7", true, &bus, &registry).unwrap();

        // The fake core writes words in natural order; the driver's
        // word-order reversal on readback swaps the two 4-byte chunks.
        assert_eq!(op.coeff, vec![0xC0, 0xFF, 0xEE, 0x01, 0xC0, 0xFF, 0xEE, 0x00]);
        assert_eq!(op.mont, vec![0xDE, 0xAD, 0x00, 0x01, 0xDE, 0xAD, 0x00, 0x00]);
        assert_eq!(op.result.len(), 8);
    }

    #[test]
    fn modexp2_runs_both_cores_in_lockstep() {
        // "modexps6" reserves 4 total slots, so the second core must sit a full gap past the first.
        let bus = FakeCores::new(&[(0x000, 4), (0x400, 4)]);
        bus.seed("modexps6", 0x000);
        bus.seed("modexps6", 0x400);
        let registry = Registry::discover(&bus).unwrap();

        let mut op1 = Operation { modulus: vec![0xAA; 4], exp: vec![0xBB; 4], msg: vec![0xCC; 4], ..Default::default() };
        let mut op2 = Operation { modulus: vec![0xAA; 4], exp: vec![0xBB; 4], msg: vec![0xDD; 4], ..Default::default() };
        modexp2(&mut op1, "modexps6", true, &mut op2, "modexps6", true, &bus, &registry).unwrap();

        assert_ne!(op1.core, op2.core);
        assert_eq!(op1.result, vec![0xCC ^ 0xBB; 4]);
        assert_eq!(op2.result, vec![0xDD ^ 0xBB; 4]);
    }
}
