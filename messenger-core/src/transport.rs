//! Per-connection byte buffers: bounded input, pending output, tick counter.

use crate::protocol::{Frame, PROTOCOL_HEADER};
use crate::wire::{decode_frame, decode_header, encode_frame_limited, FrameDecodeError};

#[derive(Debug)]
pub struct Transport {
    input: Vec<u8>,
    output: Vec<u8>,
    capacity: usize,
    max_frame_size: u32,
    header_sent: bool,
    header_received: bool,
    /// No more frames will be written once the pending output drains.
    output_closed: bool,
    input_closed: bool,
    ticks: u64,
    emitted_since_tick: bool,
}

impl Transport {
    pub fn new(capacity: usize, max_frame_size: u32) -> Self {
        Self {
            input: Vec::new(),
            output: Vec::new(),
            capacity,
            max_frame_size,
            header_sent: false,
            header_received: false,
            output_closed: false,
            input_closed: false,
            ticks: 0,
            emitted_since_tick: false,
        }
    }

    /// Queue a frame, preceded by the protocol header on first use.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), String> {
        if self.output_closed {
            return Ok(());
        }
        if !self.header_sent {
            self.output.extend_from_slice(&PROTOCOL_HEADER);
            self.header_sent = true;
        }
        let bytes = encode_frame_limited(frame, self.max_frame_size)
            .map_err(|e| format!("{} frame: {}", frame.label(), e))?;
        self.output.extend_from_slice(&bytes);
        if *frame != Frame::Empty {
            self.emitted_since_tick = true;
        }
        Ok(())
    }

    /// Accept up to the free input capacity. Returns bytes taken.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        if self.input_closed {
            return 0;
        }
        let free = self.capacity.saturating_sub(self.input.len());
        let n = bytes.len().min(free);
        self.input.extend_from_slice(&bytes[..n]);
        n
    }

    /// Next complete inbound frame, if any. Consumes the protocol header first.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameDecodeError> {
        if !self.header_received {
            match decode_header(&self.input) {
                Ok(n) => {
                    self.input.drain(..n);
                    self.header_received = true;
                }
                Err(FrameDecodeError::NeedMore) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        match decode_frame(&self.input) {
            Ok((frame, n)) => {
                self.input.drain(..n);
                Ok(Some(frame))
            }
            Err(FrameDecodeError::NeedMore) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn pending(&self) -> usize {
        self.output.len()
    }

    pub fn head(&self) -> &[u8] {
        &self.output
    }

    /// Commit `n` bytes handed to the socket. `n == 0` is a tick.
    pub fn pop(&mut self, n: usize) {
        if n == 0 {
            self.ticks += 1;
            return;
        }
        let n = n.min(self.output.len());
        self.output.drain(..n);
    }

    /// Returns true if nothing was emitted since the previous call.
    pub(crate) fn idle_since_last_check(&mut self) -> bool {
        let idle = !self.emitted_since_tick;
        self.emitted_since_tick = false;
        idle
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// All queued output has been handed off.
    pub fn quiesced(&self) -> bool {
        self.output.is_empty()
    }

    pub fn close_output(&mut self) {
        self.output_closed = true;
    }

    pub fn close_input(&mut self) {
        self.input_closed = true;
        self.input.clear();
    }

    /// Drop everything: the socket is gone.
    pub fn abort(&mut self) {
        self.close_input();
        self.close_output();
        self.output.clear();
    }

    pub fn output_closed(&self) -> bool {
        self.output_closed
    }

    pub fn input_closed(&self) -> bool {
        self.input_closed
    }

    /// Both directions finished and nothing left to send.
    pub fn closed(&self) -> bool {
        self.output_closed && self.input_closed && self.output.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_frame;

    #[test]
    fn header_precedes_first_frame() {
        let mut t = Transport::new(1024, 4096);
        t.write_frame(&Frame::Empty).unwrap();
        assert_eq!(&t.head()[..8], &PROTOCOL_HEADER);
        let n = t.pending();
        t.write_frame(&Frame::Empty).unwrap();
        assert!(t.pending() > n);
        assert_ne!(&t.head()[n..n + 8], &PROTOCOL_HEADER);
    }

    #[test]
    fn push_respects_capacity() {
        let mut t = Transport::new(4, 4096);
        assert_eq!(t.push(&[0; 10]), 4);
        assert_eq!(t.push(&[0; 10]), 0);
    }

    #[test]
    fn reads_frames_after_header() {
        let mut t = Transport::new(1024, 4096);
        let mut bytes = PROTOCOL_HEADER.to_vec();
        bytes.extend(encode_frame(&Frame::Empty).unwrap());
        let split = 5;
        t.push(&bytes[..split]);
        assert!(t.next_frame().unwrap().is_none());
        t.push(&bytes[split..]);
        assert_eq!(t.next_frame().unwrap(), Some(Frame::Empty));
        assert!(t.next_frame().unwrap().is_none());
    }

    #[test]
    fn bad_header_is_error() {
        let mut t = Transport::new(1024, 4096);
        t.push(b"GET / HTTP/1.1\r\n");
        assert!(matches!(t.next_frame(), Err(FrameDecodeError::BadHeader)));
    }

    #[test]
    fn pop_zero_ticks() {
        let mut t = Transport::new(1024, 4096);
        t.pop(0);
        t.pop(0);
        assert_eq!(t.ticks(), 2);
        assert!(t.quiesced());
        t.close_output();
        t.close_input();
        assert!(t.closed());
    }
}
