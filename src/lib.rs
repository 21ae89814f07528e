//! Mailbox link: sensor-to-receiver protocol for mailbox door monitoring
//!
//! A battery-powered sensor node in each mailbox wakes when the door opens,
//! reports over a half-duplex RF link, and goes back to deep sleep. This
//! library implements both ends of that link: the 8-byte wire frame, the
//! non-blocking receiver and the transmitter, and on the receiver side the
//! per-mailbox alarm engine with loss accounting from sequence numbers.

pub mod core;
pub mod link;
pub mod mailbox;
pub mod node;
pub mod protocol;
pub mod sensor;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, MailboxId, ReceiverId, Result};
pub use crate::mailbox::{Alarm, MailboxRegistry, MailboxState};
pub use crate::node::{Command, ReceiverNode};
pub use crate::protocol::{Frame, FrameReceiver, FrameTransmitter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
