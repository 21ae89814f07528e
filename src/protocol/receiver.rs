use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::core::{Error, ReceiverId, Result, PROTOCOL_VERSION};
use crate::link::ByteSource;
use super::codec::MessageCodec;
use super::message::{header_receiver, header_version, raw_hex, version_ok, Frame, FRAME_SIZE};

/// Assembly state of the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Waiting for the first byte of a frame
    Idle,
    /// Collecting a frame whose first byte arrived at `started_ms`
    Assembling {
        /// Monotonic time of the first byte
        started_ms: u64,
    },
}

/// Reason a frame was thrown away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    /// Header carries another protocol version
    VersionMismatch { found: u8 },
    /// Header is addressed to a different receiver
    AddressMismatch { found: u8 },
    /// Checksum did not match the frame contents
    ChecksumMismatch { raw: [u8; FRAME_SIZE] },
    /// Frame was not completed within the receive deadline
    Timeout { received: usize },
    /// The link failed while reading
    ReadError { received: usize },
}

/// Receive counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Frames accepted
    pub frames: u64,
    /// Frames dropped for a wrong protocol version
    pub version_mismatches: u64,
    /// Frames dropped for a wrong receiver address
    pub address_mismatches: u64,
    /// Frames dropped for a bad checksum
    pub checksum_mismatches: u64,
    /// Partial frames dropped on timeout
    pub timeouts: u64,
    /// Link read failures
    pub read_errors: u64,
}

/// Reassembles frames from a byte stream without ever blocking
pub struct FrameReceiver {
    receiver_id: ReceiverId,
    timeout_ms: u64,
    codec: MessageCodec,
    buffer: BytesMut,
    state: ReceiverState,
    completed: Option<Frame>,
    stats: ReceiverStats,
}

impl FrameReceiver {
    /// Creates an idle receiver answering to `receiver_id` and broadcast
    pub fn new(receiver_id: ReceiverId, timeout: Duration) -> Self {
        FrameReceiver {
            receiver_id,
            timeout_ms: timeout.as_millis() as u64,
            codec: MessageCodec::new(),
            buffer: BytesMut::with_capacity(FRAME_SIZE),
            state: ReceiverState::Idle,
            completed: None,
            stats: ReceiverStats::default(),
        }
    }

    /// Drops any partial or completed frame and listens afresh
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReceiverState::Idle;
        self.completed = None;
    }

    /// Current assembly state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Counters since creation
    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Processes whatever bytes `link` has buffered right now.
    ///
    /// Reading pauses while a completed frame waits to be taken. Returns the
    /// frames dropped during this call; none of them is fatal.
    pub fn update<S: ByteSource + ?Sized>(&mut self, link: &mut S, now_ms: u64) -> Vec<FrameFault> {
        let mut faults = Vec::new();
        self.check_deadline(now_ms, &mut faults);

        while self.completed.is_none() {
            let byte = match link.read_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => break,
                Err(e) => {
                    let received = self.buffer.len();
                    warn!(error = %e, received, "Error reading input message");
                    self.stats.read_errors += 1;
                    faults.push(FrameFault::ReadError { received });
                    break;
                }
            };

            if self.state == ReceiverState::Idle {
                self.buffer.clear();
                self.state = ReceiverState::Assembling { started_ms: now_ms };
            }
            self.buffer.extend_from_slice(&[byte]);

            if self.buffer.len() == 1 {
                if let Some(fault) = self.check_header(byte) {
                    faults.push(fault);
                    self.buffer.clear();
                    self.state = ReceiverState::Idle;
                }
                continue;
            }

            if self.buffer.len() == FRAME_SIZE {
                let mut raw = [0u8; FRAME_SIZE];
                raw.copy_from_slice(&self.buffer);
                self.state = ReceiverState::Idle;
                match self.codec.decode(&mut self.buffer) {
                    Ok(Some(frame)) => {
                        debug!(%frame, "Received message");
                        self.stats.frames += 1;
                        self.completed = Some(frame);
                    }
                    Ok(None) => {}
                    // Header was already vetted, so only the checksum can fail here
                    Err(e) => {
                        warn!(error = %e, raw = %raw_hex(&raw), "Invalid message, ignoring");
                        self.stats.checksum_mismatches += 1;
                        faults.push(FrameFault::ChecksumMismatch { raw });
                    }
                }
                self.buffer.clear();
            }
        }

        self.check_deadline(now_ms, &mut faults);
        faults
    }

    /// True when a complete, valid frame is waiting
    pub fn message_available(&self) -> bool {
        self.completed.is_some()
    }

    /// Hands out the waiting frame. With `rearm` the receiver starts
    /// listening again; without it the frame stays available.
    pub fn take_message(&mut self, rearm: bool) -> Option<Frame> {
        let frame = self.completed;
        if rearm {
            self.reset();
        }
        frame
    }

    /// Vets the first byte of a frame: protocol version, then address
    pub fn validate_header(&self, header: u8) -> Result<()> {
        if !version_ok(header) {
            return Err(Error::VersionMismatch {
                found: header_version(header),
                expected: PROTOCOL_VERSION,
            });
        }
        let found = header_receiver(header);
        if !self.receiver_id.accepts(found) {
            return Err(Error::AddressMismatch {
                found,
                expected: self.receiver_id.get(),
            });
        }
        Ok(())
    }

    fn check_header(&mut self, header: u8) -> Option<FrameFault> {
        let err = self.validate_header(header).err()?;
        warn!(error = %err, "Invalid message, ignoring");
        match err {
            Error::VersionMismatch { found, .. } => {
                self.stats.version_mismatches += 1;
                Some(FrameFault::VersionMismatch { found })
            }
            Error::AddressMismatch { found, .. } => {
                self.stats.address_mismatches += 1;
                Some(FrameFault::AddressMismatch { found })
            }
            _ => None,
        }
    }

    fn check_deadline(&mut self, now_ms: u64, faults: &mut Vec<FrameFault>) {
        if let ReceiverState::Assembling { started_ms } = self.state {
            if now_ms.saturating_sub(started_ms) > self.timeout_ms {
                let received = self.buffer.len();
                warn!(received, size = FRAME_SIZE, "Message timeout");
                self.stats.timeouts += 1;
                faults.push(FrameFault::Timeout { received });
                self.buffer.clear();
                self.state = ReceiverState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;

    fn receiver() -> FrameReceiver {
        FrameReceiver::new(ReceiverId::new(1).unwrap(), Duration::from_secs(2))
    }

    fn frame(receiver: u8, mailbox: u8, sequence: u16) -> Frame {
        let mut frame = Frame::new(receiver, mailbox);
        frame.sequence = sequence;
        frame.door = true;
        frame.online = true;
        frame
    }

    #[test]
    fn test_receives_complete_frame() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        link.push(&frame(1, 3, 5).encode());

        assert!(rx.update(&mut link, 0).is_empty());
        assert!(rx.message_available());
        let got = rx.take_message(true).unwrap();
        assert_eq!(got.mailbox, 3);
        assert_eq!(got.sequence, 5);
        assert!(!rx.message_available());
        assert_eq!(rx.stats().frames, 1);
    }

    #[test]
    fn test_frame_split_across_updates() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        let bytes = frame(0, 2, 7).encode();

        link.push(&bytes[..3]);
        rx.update(&mut link, 100);
        assert_eq!(rx.state(), ReceiverState::Assembling { started_ms: 100 });
        assert!(!rx.message_available());

        link.push(&bytes[3..]);
        rx.update(&mut link, 600);
        assert!(rx.message_available());
    }

    #[test]
    fn test_waiting_frame_pauses_reading() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        link.push(&frame(1, 3, 5).encode());
        link.push(&frame(1, 3, 6).encode());

        rx.update(&mut link, 0);
        assert_eq!(link.pending(), FRAME_SIZE);

        // Deferred re-arm keeps the frame available
        assert_eq!(rx.take_message(false).unwrap().sequence, 5);
        rx.update(&mut link, 1);
        assert_eq!(rx.take_message(true).unwrap().sequence, 5);

        rx.update(&mut link, 2);
        assert_eq!(rx.take_message(true).unwrap().sequence, 6);
        assert!(rx.take_message(true).is_none());
    }

    #[test]
    fn test_wrong_address_discarded_after_first_byte() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        let bytes = frame(4, 3, 5).encode();
        link.push(&bytes[..1]);

        let faults = rx.update(&mut link, 0);
        assert_eq!(faults, vec![FrameFault::AddressMismatch { found: 4 }]);
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert_eq!(rx.stats().address_mismatches, 1);
    }

    #[test]
    fn test_validate_header() {
        let rx = receiver();
        assert!(rx.validate_header(0x12).is_ok());
        assert!(rx.validate_header(0x02).is_ok());
        assert!(matches!(
            rx.validate_header(0x42),
            Err(Error::AddressMismatch { found: 4, expected: 1 })
        ));
        assert!(matches!(
            rx.validate_header(0x13),
            Err(Error::VersionMismatch { found: 3, expected: PROTOCOL_VERSION })
        ));
    }

    #[test]
    fn test_wrong_version_discarded() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        link.push(&[0x13]);

        let faults = rx.update(&mut link, 0);
        assert_eq!(faults, vec![FrameFault::VersionMismatch { found: 3 }]);
        assert_eq!(rx.stats().version_mismatches, 1);
        assert!(!rx.message_available());
    }

    #[test]
    fn test_checksum_mismatch_discarded() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        let mut bytes = frame(1, 3, 5).encode();
        bytes[4] ^= 0x10;
        link.push(&bytes);

        let faults = rx.update(&mut link, 0);
        assert_eq!(faults, vec![FrameFault::ChecksumMismatch { raw: bytes }]);
        assert!(!rx.message_available());
        assert_eq!(rx.state(), ReceiverState::Idle);

        // The receiver recovers for the next frame
        link.push(&frame(1, 3, 6).encode());
        rx.update(&mut link, 10);
        assert_eq!(rx.take_message(true).unwrap().sequence, 6);
    }

    #[test]
    fn test_partial_frame_times_out() {
        let mut rx = receiver();
        let mut link = MemoryLink::new();
        let bytes = frame(1, 3, 5).encode();
        link.push(&bytes[..4]);
        rx.update(&mut link, 1_000);

        assert!(rx.update(&mut link, 3_000).is_empty());
        let faults = rx.update(&mut link, 3_001);
        assert_eq!(faults, vec![FrameFault::Timeout { received: 4 }]);
        assert_eq!(rx.state(), ReceiverState::Idle);

        // A stale partial is not glued onto a fresh frame
        link.push(&bytes[..4]);
        rx.update(&mut link, 10_000);
        link.push(&frame(1, 3, 7).encode());
        let faults = rx.update(&mut link, 20_000);
        assert!(matches!(faults[0], FrameFault::Timeout { received: 4 }));
        assert_eq!(rx.take_message(true).unwrap().sequence, 7);
    }
}
