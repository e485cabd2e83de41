use std::{
    net::Ipv4Addr,
    time::{Duration, SystemTime},
};

use sensor::{
    synth, MeasureStore, MemoryStore, ReplaySource, Sensor, SensorOptions, TransportProtocol,
};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let client = Ipv4Addr::new(10, 0, 0, 1);
    let server = Ipv4Addr::new(10, 0, 0, 2);
    let start = SystemTime::now();

    // A request every 10ms, answered 250us later.
    let frames = (0..20u32)
        .flat_map(|i| {
            let sent = start + Duration::from_millis(10) * i;
            [
                synth::ipv4_frame(sent, client, server, TransportProtocol::Tcp, 128),
                synth::ipv4_frame(
                    sent + Duration::from_micros(250),
                    server,
                    client,
                    TransportProtocol::Tcp,
                    1400,
                ),
            ]
        })
        .collect();

    let store = MemoryStore::new();
    let sensor = Sensor::with_options(
        ReplaySource::new("replay0", frames).finite(),
        store.clone(),
        SensorOptions::default().max_workers(1),
    );

    sensor.start("replay0").unwrap();
    while sensor.is_capturing() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let report = sensor.shutdown().await.unwrap();

    for measure in store.find_all().await.unwrap().iter().take(4) {
        println!(
            "{} -> {} {} {}B latency={}us",
            measure.source_ip(),
            measure.destination_ip(),
            measure.protocol(),
            measure.packet_size(),
            measure.latency_us()
        );
    }
    println!("{report:#?}");
}
