use std::time::Duration;

use sensor::{interfaces, CaptureConfig, JsonLinesStore, LiveSource, Sensor, SensorOptions};

/// Captures on the given interface for a few seconds and appends measures to `measures.jsonl`.
/// Without arguments, lists the available interfaces.
///
/// Usage: `cargo run --example capture -- <interface> [seconds]`. Needs capture privileges.
#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut args = std::env::args().skip(1);
    let Some(interface) = args.next() else {
        for iface in interfaces() {
            println!("{} up={} addrs={:?}", iface.name, iface.is_up, iface.addresses);
        }
        return;
    };
    let secs = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);

    let store = JsonLinesStore::open("measures.jsonl").await.unwrap();
    let options = SensorOptions::default()
        .capture(CaptureConfig::default().read_timeout(Duration::from_millis(100)));
    let sensor = Sensor::with_options(LiveSource::new(), store, options);

    sensor.start(&interface).unwrap();
    tokio::time::sleep(Duration::from_secs(secs)).await;

    let report = sensor.shutdown().await.unwrap();
    println!("{report:#?}");
}
