//! An in-process loopback transport, used only by tests to exercise framing
//! and dispatch without a real serial link — the analogue of the original's
//! `rpc_client_loopback.c`/`rpc_server_loopback.c` test fixtures.

use crate::slip::{self, SlipDecoder};

/// A bidirectional pipe: bytes written on one end's `send` are SLIP-framed
/// and appear, byte for byte, as input to the other end's decoder.
#[cfg(any(test, feature = "hosted"))]
pub struct Loopback {
    decoder: SlipDecoder,
    inbox: std::collections::VecDeque<u8>,
}

#[cfg(any(test, feature = "hosted"))]
impl Loopback {
    pub fn new(max_packet: usize) -> Self {
        Loopback { decoder: SlipDecoder::new(max_packet), inbox: std::collections::VecDeque::new() }
    }

    /// Frame and enqueue `packet` as if it had arrived over the wire.
    pub fn deliver(&mut self, packet: &[u8]) {
        let mut framed = Vec::new();
        slip::encode(packet, &mut framed);
        self.inbox.extend(framed);
    }

    /// Drain whatever has been delivered so far, returning every complete
    /// frame the decoder has assembled.
    pub fn recv_ready(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(byte) = self.inbox.pop_front() {
            if let Ok(Some(frame)) = self.decoder.push_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_framed_packets_back_out_unframed() {
        let mut lb = Loopback::new(1024);
        lb.deliver(&[1, 2, 3]);
        lb.deliver(&[4, 5]);
        assert_eq!(lb.recv_ready(), vec![vec![1, 2, 3], vec![4, 5]]);
    }
}
