//! Protocol implementation module
//!
//! This module defines the 8-byte mailbox status frame, its codec, and the
//! receiving and transmitting ends of the RF link.

pub mod codec;
pub mod message;
pub mod receiver;
pub mod transmitter;

pub use self::codec::MessageCodec;
pub use self::message::{checksum, checksum_ok, next_sequence, raw_hex, Frame, FRAME_SIZE};
pub use self::receiver::{FrameFault, FrameReceiver, ReceiverState, ReceiverStats};
pub use self::transmitter::{FrameTransmitter, TransmitterTimings};
