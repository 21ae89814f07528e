//! Receiver node on a real RF module
//!
//! Usage: `cargo run --example receiver [config.json]`
//!
//! Mailbox notifications go to the log. Ctrl-C stops the receiver.

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use mailbox_link::link::SerialLink;
use mailbox_link::mailbox::{FileStore, LogNotifier};
use mailbox_link::time::SystemClock;
use mailbox_link::{Command, Config, ReceiverNode};

#[tokio::main]
async fn main() -> mailbox_link::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let link = SerialLink::open(&config.serial_device, config.baud_rate)?;
    let store = FileStore::open(&config.store_dir)?;
    let mut node = ReceiverNode::new(
        config,
        link,
        SystemClock::new(),
        Box::new(store),
        Box::new(LogNotifier),
    );

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Command::Shutdown).await;
        }
    });

    node.run(rx).await?;

    for mailbox in node.registry().iter() {
        tracing::info!(
            mailbox = %mailbox.id(),
            alarm = %mailbox.alarm(),
            reliability = ?mailbox.radio_reliability(),
            "{}",
            mailbox.name()
        );
    }
    Ok(())
}
