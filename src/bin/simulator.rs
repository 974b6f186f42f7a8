use chrono::Local;
use clap::{App, Arg};
use groundlink::codec::{self, Datagram, ParsedMessage, Payload, Source, LOG_END, LOG_START, MAX_DATAGRAM_SIZE, SYSTEM_SENSOR};
use groundlink::devices::DeviceId;
use groundlink::Command;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{error, info, warn};

const LOG_RECORDS_PER_BLOCK: usize = 5;
const LOG_START_PAUSE: Duration = Duration::from_secs(1);
const LOG_RECORD_PAUSE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("groundlink-simulator")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("🛰️  Remote device simulator - streams telemetry and answers getlog requests")
        .arg(
            Arg::with_name("logger")
                .long("logger")
                .value_name("ADDR")
                .help("Ground link address telemetry and logs are sent to")
                .takes_value(true)
                .default_value("127.0.0.1:5001"),
        )
        .arg(
            Arg::with_name("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Address commands are received on")
                .takes_value(true)
                .default_value("0.0.0.0:5002"),
        )
        .arg(
            Arg::with_name("telemetry-ms")
                .long("telemetry-ms")
                .value_name("MS")
                .help("Telemetry period")
                .takes_value(true)
                .default_value("2000")
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Telemetry period must be a positive number of milliseconds".into()),
                }),
        )
        .get_matches();

    tracing_subscriber::fmt::init();

    let logger: SocketAddr = matches.value_of("logger").unwrap_or("127.0.0.1:5001").parse()?;
    let listen: SocketAddr = matches.value_of("listen").unwrap_or("0.0.0.0:5002").parse()?;
    let period = Duration::from_millis(matches.value_of("telemetry-ms").unwrap_or("2000").parse()?);

    let tx = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    tx.connect(logger).await?;
    let rx = UdpSocket::bind(listen).await?;
    info!(%logger, %listen, "simulator started");

    let telemetry_tx = Arc::clone(&tx);
    let telemetry = tokio::spawn(async move {
        let mut interval = time::interval(period);
        loop {
            interval.tick().await;
            let device = random_device(1);
            let value = format!("{:.1}", rand::random_range(20.0_f64..30.0));
            if let Err(e) = send(&telemetry_tx, Source::Telemetry, device, "temp", &value).await {
                error!("telemetry send failed: {e}");
            }
        }
    });

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = rx.recv_from(&mut buf) => match received {
                Ok((len, from)) => match serde_json::from_slice::<Command>(&buf[..len]) {
                    Ok(command) => {
                        info!(%from, ?command, "received command");
                        if command.is_getlog() {
                            let log_tx = Arc::clone(&tx);
                            tokio::spawn(async move {
                                if let Err(e) = send_log_block(&log_tx).await {
                                    error!("log block send failed: {e}");
                                }
                            });
                        }
                    }
                    Err(e) => warn!(%from, "unreadable command: {e}"),
                },
                Err(e) => error!("receiving command: {e}"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    telemetry.abort();
    info!("simulator stopped");
    Ok(())
}

/// log_start, a handful of records (some WARNING/ERROR), log_end.
async fn send_log_block(tx: &UdpSocket) -> std::io::Result<()> {
    send(tx, Source::Log, DeviceId::BlackBox, SYSTEM_SENSOR, LOG_START).await?;
    time::sleep(LOG_START_PAUSE).await;

    for _ in 0..LOG_RECORDS_PER_BLOCK {
        let device = random_device(1);
        let sensor = format!("sensor{}", rand::random_range(1..=3u8));
        let value = random_log_value();
        send(tx, Source::Log, device, &sensor, &value).await?;
        time::sleep(LOG_RECORD_PAUSE).await;
    }

    send(tx, Source::Log, DeviceId::BlackBox, SYSTEM_SENSOR, LOG_END).await?;
    info!("log block sent");
    Ok(())
}

fn random_device(lowest: usize) -> DeviceId {
    DeviceId::ALL[rand::random_range(lowest..DeviceId::ALL.len())]
}

fn random_log_value() -> String {
    if rand::random::<f64>() < 0.3 {
        "WARNING_temp_high".to_string()
    } else if rand::random::<f64>() < 0.1 {
        "ERROR_sensor_fail".to_string()
    } else {
        format!("{:.1}", rand::random_range(10.0_f64..50.0))
    }
}

fn make_line(source: Source, device: DeviceId, sensor: &str, value: &str) -> String {
    let now = Local::now();
    codec::encode(&ParsedMessage {
        date: now.format("%d-%m-%Y").to_string(),
        time: now.format("%H-%M-%S%.3f").to_string(),
        source,
        device,
        sensor: sensor.to_string(),
        payload: Payload::classify(value),
    })
}

async fn send(tx: &UdpSocket, source: Source, device: DeviceId, sensor: &str, value: &str) -> std::io::Result<()> {
    let datagram = Datagram::new(make_line(source, device, sensor, value));
    let bytes = datagram.to_vec().map_err(std::io::Error::other)?;
    tx.send(&bytes).await?;
    Ok(())
}
