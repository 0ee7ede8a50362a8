//! XDR (RFC 4506) encode/decode: 32-bit big-endian integers, and opaque byte
//! strings padded to 4-byte alignment (variable-length ones additionally
//! length-prefixed). Every request and response is a flat sequence of these
//! two primitives; there is no nesting or schema beyond what each handler
//! decodes by hand, mirroring `xdr.c`.

use crate::error::RpcError;

fn pad(len: usize) -> usize {
    (len + 3) & !3
}

/// A write cursor over a caller-supplied output buffer.
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Encoder { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn encoded(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn encode_int(&mut self, value: u32) -> Result<(), RpcError> {
        if self.buf.len() - self.pos < 4 {
            return Err(RpcError::XdrBufferOverflow);
        }
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_be_bytes());
        self.pos += 4;
        Ok(())
    }

    /// Fixed-length opaque data: just the bytes, padded to a 4-byte
    /// boundary. No length prefix — the reader already knows `len`.
    pub fn encode_fixed_opaque(&mut self, value: &[u8]) -> Result<(), RpcError> {
        if value.is_empty() {
            return Ok(());
        }
        let padded = pad(value.len());
        if self.buf.len() - self.pos < padded {
            return Err(RpcError::XdrBufferOverflow);
        }
        self.buf[self.pos..self.pos + value.len()].copy_from_slice(value);
        for b in &mut self.buf[self.pos + value.len()..self.pos + padded] {
            *b = 0;
        }
        self.pos += padded;
        Ok(())
    }

    /// Variable-length opaque data: a 4-byte length prefix followed by the
    /// padded bytes.
    pub fn encode_variable_opaque(&mut self, value: &[u8]) -> Result<(), RpcError> {
        self.encode_int(value.len() as u32)?;
        self.encode_fixed_opaque(value)
    }

    /// Overwrite a previously-encoded `u32` at `pos` without disturbing the
    /// cursor. Used by the dispatcher to backpatch `result_code` once a
    /// handler's outcome is known, after reserving the field with a
    /// placeholder `encode_int(0)`.
    pub fn patch_int(&mut self, pos: usize, value: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Discard everything encoded from `pos` onward and reset the cursor
    /// there. Used to drop a handler's partial reply once it has failed —
    /// the wire contract has no notion of a partially-written response.
    pub fn truncate(&mut self, pos: usize) {
        self.pos = pos;
    }
}

/// A read cursor over a received frame.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn decode_int(&mut self) -> Result<u32, RpcError> {
        if self.remaining() < 4 {
            return Err(RpcError::XdrBufferOverflow);
        }
        let value = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(value)
    }

    /// Decode a fixed-length opaque, returning a borrowed slice into the
    /// original frame (the rpc server never copies request data it doesn't
    /// have to).
    pub fn decode_fixed_opaque(&mut self, len: usize) -> Result<&'a [u8], RpcError> {
        let padded = pad(len);
        if self.remaining() < padded {
            return Err(RpcError::XdrBufferOverflow);
        }
        let value = &self.buf[self.pos..self.pos + len];
        self.pos += padded;
        Ok(value)
    }

    pub fn decode_variable_opaque(&mut self) -> Result<&'a [u8], RpcError> {
        let len = self.decode_int()? as usize;
        self.decode_fixed_opaque(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        let mut buf = [0u8; 4];
        Encoder::new(&mut buf).encode_int(0x01010100).unwrap();
        assert_eq!(buf, [0x01, 0x01, 0x01, 0x00]);
        assert_eq!(Decoder::new(&buf).decode_int().unwrap(), 0x01010100);
    }

    #[test]
    fn variable_opaque_pads_to_four_bytes() {
        let mut buf = [0u8; 16];
        let mut enc = Encoder::new(&mut buf);
        enc.encode_variable_opaque(b"abc").unwrap();
        assert_eq!(enc.position(), 4 + 4);
        assert_eq!(&buf[0..4], &3u32.to_be_bytes());
        assert_eq!(&buf[4..7], b"abc");
        assert_eq!(buf[7], 0);

        let mut dec = Decoder::new(&buf[..8]);
        assert_eq!(dec.decode_variable_opaque().unwrap(), b"abc");
    }

    #[test]
    fn fixed_opaque_empty_is_a_no_op() {
        let mut buf = [0xffu8; 4];
        let mut enc = Encoder::new(&mut buf);
        enc.encode_fixed_opaque(&[]).unwrap();
        assert_eq!(enc.position(), 0);
    }

    #[test]
    fn decode_past_end_overflows() {
        let buf = [0u8; 2];
        assert_eq!(Decoder::new(&buf).decode_int(), Err(RpcError::XdrBufferOverflow));
    }

    #[test]
    fn encode_past_end_overflows() {
        let mut buf = [0u8; 3];
        assert_eq!(Encoder::new(&mut buf).encode_int(1), Err(RpcError::XdrBufferOverflow));
    }
}
