//! Framing: protocol header once, then length-prefix (4 bytes LE) + bincode payload per frame.

use crate::protocol::{Frame, PROTOCOL_HEADER};

const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    encode_frame_limited(frame, MAX_FRAME_LEN)
}

/// Like [`encode_frame`] with a caller-chosen payload limit.
pub fn encode_frame_limited(frame: &Frame, max_len: u32) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(frame).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if payload.len() > u32::MAX as usize || len > max_len.min(MAX_FRAME_LEN) {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the frame and the number of bytes consumed.
/// Call with a partial buffer; `NeedMore` means try again after more data arrives.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let frame: Frame =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((frame, LEN_SIZE + len))
}

/// Error decoding a frame (need more bytes, too large, bad header, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("bad protocol header")]
    BadHeader,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Check the protocol header at the front of `bytes`. Returns the bytes consumed.
pub fn decode_header(bytes: &[u8]) -> Result<usize, FrameDecodeError> {
    let n = bytes.len().min(PROTOCOL_HEADER.len());
    if bytes[..n] != PROTOCOL_HEADER[..n] {
        return Err(FrameDecodeError::BadHeader);
    }
    if n < PROTOCOL_HEADER.len() {
        return Err(FrameDecodeError::NeedMore);
    }
    Ok(PROTOCOL_HEADER.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::protocol::{ReceiverSettleMode, Role, SenderSettleMode, Terminus};

    fn sample_attach() -> Frame {
        Frame::Attach {
            name: "q1".into(),
            role: Role::Receiver,
            snd_settle_mode: SenderSettleMode::Unsettled,
            rcv_settle_mode: ReceiverSettleMode::First,
            source: Terminus::new("q1"),
            target: Terminus::new("q1"),
        }
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(&sample_attach()).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..super::LEN_SIZE]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_frames() {
        let a = sample_attach();
        let mut msg = Message::default();
        msg.set_address("amqp://host/q1");
        let b = Frame::Transfer {
            name: "q1".into(),
            delivery_id: 7,
            settled: false,
            message: msg,
        };
        let fa = encode_frame(&a).unwrap();
        let fb = encode_frame(&b).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert_eq!(m1, a);
        assert!(matches!(m2, Frame::Transfer { delivery_id: 7, .. }));
    }

    #[test]
    fn oversized_length_rejected() {
        let mut buf = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
        buf.extend_from_slice(&[0; 8]);
        assert!(matches!(decode_frame(&buf), Err(FrameDecodeError::TooLarge)));
        assert!(matches!(
            encode_frame_limited(&sample_attach(), 4),
            Err(FrameEncodeError::TooLarge)
        ));
    }

    #[test]
    fn header_checks() {
        assert_eq!(decode_header(&PROTOCOL_HEADER).unwrap(), 8);
        assert!(matches!(
            decode_header(&PROTOCOL_HEADER[..3]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_header(b"HTTP/1.1"),
            Err(FrameDecodeError::BadHeader)
        ));
    }
}
