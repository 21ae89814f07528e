//! A sensor node and a receiver sharing a lossy in-memory radio link
//!
//! Usage: `cargo run --example simulate [events] [drop_rate]`
//!
//! Each event is one door opening: the sensor wakes, reports, waits with the
//! door open for a while, reports the closing and sleeps. The receiver runs
//! on a manual clock driven by the sensor's settle delays.

use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::{fmt, EnvFilter};

use mailbox_link::link::{LossyLink, MemoryLink, NullRadio};
use mailbox_link::mailbox::{LogNotifier, MemoryStore};
use mailbox_link::sensor::{InMemoryRetained, ResetCause, SensorConfig, SensorNode, StaticHardware};
use mailbox_link::time::{Clock, ManualClock};
use mailbox_link::{Config, MailboxId, ReceiverId, ReceiverNode};

fn main() -> mailbox_link::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let events: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(10);
    let drop_rate: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(0.2);

    let clock = ManualClock::new(Some(Utc::now()));
    let air = MemoryLink::new();

    let config = Config::default();
    let mut receiver = ReceiverNode::new(
        config,
        air.clone(),
        clock.clone(),
        Box::new(MemoryStore::new()),
        Box::new(LogNotifier),
    );

    let sensor_config = SensorConfig {
        mailbox_id: MailboxId::new(3)?,
        receiver_id: ReceiverId::new(1)?,
        ..SensorConfig::default()
    };
    let mut retained = InMemoryRetained::new();
    let mut hw = StaticHardware { door: true, vcc: 3900 };

    for event in 0..events {
        let cause = if event == 0 { ResetCause::ColdBoot } else { ResetCause::DeepSleepWake };
        let lossy = LossyLink::new(air.clone(), event as u64, drop_rate, 0.02);
        let mut sensor = SensorNode::new(&sensor_config, lossy, NullRadio, clock.clone(), retained)?;

        let woke_at = clock.monotonic_ms();
        hw.door = true;
        sensor.begin(cause, &mut hw, 0)?;
        receiver.poll();

        // Door stays open for a few seconds, longer every third time
        let open_for = if event % 3 == 2 { 40 } else { 3 + event as u64 % 5 };
        for _ in 0..open_for {
            clock.advance(Duration::from_secs(1));
            receiver.poll();
            if sensor.should_sleep(clock.monotonic_ms() - woke_at) {
                break;
            }
        }
        hw.door = false;
        hw.vcc = hw.vcc.saturating_sub(3);
        sensor.update(&mut hw);
        sensor.prepare_sleep(&mut hw, clock.monotonic_ms() - woke_at)?;
        receiver.poll();

        retained = sensor.into_retained();

        // Idle until the next opening, long enough for pending timeouts
        for _ in 0..60 {
            clock.advance(Duration::from_secs(1));
            receiver.poll();
        }
    }

    let stats = receiver.receiver().stats();
    tracing::info!(
        events,
        frames = stats.frames,
        checksum_failures = stats.checksum_mismatches,
        "Simulation finished"
    );
    for mailbox in receiver.registry().iter() {
        tracing::info!(
            mailbox = %mailbox.id(),
            sent = mailbox.sent(),
            received = mailbox.received(),
            lost = mailbox.lost(),
            reliability = ?mailbox.radio_reliability(),
            alarm = %mailbox.alarm(),
            "{}",
            mailbox.name()
        );
    }
    Ok(())
}
