//! SLIP (RFC 1055) framing over the serial link. `encode` wraps one packet
//! for transmission; [`SlipDecoder`] is the receive side's streaming
//! byte-level state machine, matching the original firmware's per-connection
//! decoder: bytes arrive one at a time from the UART DMA callback, and a
//! frame is only complete once an `END` byte lands outside an escape.

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Escape `packet` and wrap it in leading/trailing `END` bytes. A leading
/// `END` is harmless noise to any receiver mid-frame-sync and costs one byte;
/// emitting it keeps encode/decode symmetric with the usual SLIP convention.
pub fn encode(packet: &[u8], out: &mut Vec<u8>) {
    out.push(END);
    for &b in packet {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(END);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipError {
    /// An `ESC` byte was followed by something other than `ESC_END`/`ESC_ESC`.
    BadEscape,
    /// The accumulating frame exceeded the configured maximum packet size.
    FrameTooLarge,
}

/// Per-connection decode state: a partially accumulated frame plus whether
/// the previous byte was an unresolved `ESC`.
pub struct SlipDecoder {
    buf: Vec<u8>,
    max_packet: usize,
    escaped: bool,
}

impl SlipDecoder {
    pub fn new(max_packet: usize) -> Self {
        SlipDecoder { buf: Vec::new(), max_packet, escaped: false }
    }

    /// Feed one byte in. Returns `Some(packet)` the moment an `END` closes a
    /// non-empty frame (consecutive `END`s, e.g. at startup or between
    /// keepalives, are treated as frame separators and silently skipped
    /// rather than yielding an empty packet).
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<Vec<u8>>, SlipError> {
        if self.escaped {
            self.escaped = false;
            let literal = match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                _ => return Err(SlipError::BadEscape),
            };
            self.push_literal(literal)?;
            return Ok(None);
        }
        match byte {
            END => {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                Ok(Some(core::mem::take(&mut self.buf)))
            }
            ESC => {
                self.escaped = true;
                Ok(None)
            }
            _ => {
                self.push_literal(byte)?;
                Ok(None)
            }
        }
    }

    fn push_literal(&mut self, byte: u8) -> Result<(), SlipError> {
        if self.buf.len() >= self.max_packet {
            self.buf.clear();
            self.escaped = false;
            return Err(SlipError::FrameTooLarge);
        }
        self.buf.push(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut SlipDecoder, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = decoder.push_byte(b).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn escapes_literal_end_and_esc_bytes() {
        let mut out = Vec::new();
        encode(&[0xC0, 0xDB, 0x01], &mut out);
        assert_eq!(out, vec![END, ESC, ESC_END, ESC, ESC_ESC, 0x01, END]);
    }

    #[test]
    fn round_trips_arbitrary_payloads() {
        let payload = vec![0x00, 0xC0, 0xDB, 0xFF, 0xC0, 0xC0, 0xDB, 0xDB];
        let mut framed = Vec::new();
        encode(&payload, &mut framed);

        let mut decoder = SlipDecoder::new(1024);
        let frames = decode_all(&mut decoder, &framed);
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn consecutive_end_bytes_do_not_yield_empty_frames() {
        let mut decoder = SlipDecoder::new(1024);
        let frames = decode_all(&mut decoder, &[END, END, END, b'x', END]);
        assert_eq!(frames, vec![vec![b'x']]);
    }

    #[test]
    fn bad_escape_sequence_is_rejected_and_resyncs() {
        let mut decoder = SlipDecoder::new(1024);
        assert_eq!(decoder.push_byte(ESC), Ok(None));
        assert_eq!(decoder.push_byte(0x42), Err(SlipError::BadEscape));
        // decoder keeps working on the next frame
        let frames = decode_all(&mut decoder, &[b'y', END]);
        assert_eq!(frames, vec![vec![b'y']]);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = SlipDecoder::new(4);
        let mut saw_overflow = false;
        for &b in &[1u8, 2, 3, 4, 5] {
            if decoder.push_byte(b).is_err() {
                saw_overflow = true;
            }
        }
        assert!(saw_overflow);
    }

    #[test]
    fn wire_bytes_for_get_version_request_match_spec_seed_scenario() {
        // func=0 (GET_VERSION), client_handle=7
        let payload = [0u32.to_be_bytes(), 7u32.to_be_bytes()].concat();
        let mut framed = Vec::new();
        encode(&payload, &mut framed);
        assert_eq!(framed.first(), Some(&END));
        assert_eq!(framed.last(), Some(&END));
        assert_eq!(&framed[1..framed.len() - 1], payload.as_slice());
    }
}
