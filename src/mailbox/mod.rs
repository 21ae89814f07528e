//! Receiver-side mailbox tracking
//!
//! Every accepted frame lands in the [`MailboxRegistry`], which owns one
//! [`MailboxState`] per mailbox id. The state runs loss accounting from the
//! sequence numbers and moves the mailbox [`Alarm`]; the registry keeps the
//! global alarm, the per-mailbox pending timeouts and the persisted records.

pub mod alarm;
pub mod notify;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod store;

pub use self::alarm::Alarm;
pub use self::notify::{LogNotifier, MailboxEvent, Notification, Notifier, RecordingNotifier};
pub use self::registry::{AckTarget, MailboxRegistry};
pub use self::snapshot::Mailbox;
pub use self::state::{Applied, MailboxState};
pub use self::store::{record_name, FileStore, MemoryStore, Store};
