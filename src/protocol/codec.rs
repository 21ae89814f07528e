use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use super::message::{Frame, FRAME_SIZE};

/// Fixed-size frame codec for the RF link
#[derive(Clone, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = Error;

    /// Consumes exactly one frame's worth of bytes once available.
    /// A bad frame is still consumed so the next call starts fresh.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_SIZE {
            // Need more data
            return Ok(None);
        }

        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(&src.split_to(FRAME_SIZE));
        Frame::decode(&bytes).map(Some)
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(FRAME_SIZE);
        dst.put_slice(&item.encode());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_frame() {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::new();

        let mut frame = Frame::new(1, 2);
        frame.sequence = 9;
        frame.door = true;

        codec.encode(frame, &mut bytes).unwrap();
        assert_eq!(bytes.len(), FRAME_SIZE);

        // Partial input is left in place
        let mut partial = BytesMut::from(&bytes[..5]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 5);

        let decoded = codec.decode(&mut bytes).unwrap().expect("frame");
        assert_eq!(decoded, frame);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_codec_consumes_bad_frame() {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::new();
        codec.encode(Frame::new(1, 2), &mut bytes).unwrap();
        codec.encode(Frame::new(1, 3), &mut bytes).unwrap();
        bytes[7] ^= 0xFF;

        assert!(matches!(codec.decode(&mut bytes), Err(Error::ChecksumMismatch { .. })));
        let next = codec.decode(&mut bytes).unwrap().expect("second frame");
        assert_eq!(next.mailbox, 3);
    }
}
