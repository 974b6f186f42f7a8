use clap::{App, Arg, ArgMatches};
use colored::*;
use groundlink::config::{DEFAULT_LOGFILE, DEFAULT_MODEM_IP, DEFAULT_RECV_PORT, DEFAULT_SEND_PORT};
use groundlink::transport::{run_ingress, run_periodic_pump};
use groundlink::{GroundLink, LinkConfig, PumpOutcome, Request, TracingSink, UdpTransmitter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = r#"Enter a request: {"command":"getlog","interval":<n>,"device":<id>,"sensor":<name>} | {"command":"getstats","device":<id>} | quit"#;

fn validate_number<T: std::str::FromStr>(v: String) -> Result<(), String> {
    v.parse::<T>().map(|_| ()).map_err(|_| format!("{v:?} is not a valid number"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let default_ip = DEFAULT_MODEM_IP.to_string();
    let default_recv = DEFAULT_RECV_PORT.to_string();
    let default_send = DEFAULT_SEND_PORT.to_string();
    let default_timeout = groundlink::handshake::DEFAULT_LOG_TIMEOUT.as_secs().to_string();

    let matches = App::new("groundlink")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("📡 Ground link endpoint - telemetry intake, log download and command dispatch")
        .arg(
            Arg::with_name("modem-ip")
                .long("modem-ip")
                .value_name("IP")
                .help("Modem address to receive on and send commands to")
                .takes_value(true)
                .default_value(&default_ip),
        )
        .arg(
            Arg::with_name("recv-port")
                .long("recv-port")
                .value_name("PORT")
                .help("Port for inbound telemetry and logs")
                .takes_value(true)
                .default_value(&default_recv)
                .validator(validate_number::<u16>),
        )
        .arg(
            Arg::with_name("send-port")
                .long("send-port")
                .value_name("PORT")
                .help("Port commands are sent to")
                .takes_value(true)
                .default_value(&default_send)
                .validator(validate_number::<u16>),
        )
        .arg(
            Arg::with_name("logfile")
                .short("l")
                .long("logfile")
                .value_name("FILE")
                .help("Append-only session log")
                .takes_value(true)
                .default_value(DEFAULT_LOGFILE),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Log download inactivity timeout")
                .takes_value(true)
                .default_value(&default_timeout)
                .validator(validate_number::<u64>),
        )
        .arg(
            Arg::with_name("pump-interval-ms")
                .long("pump-interval-ms")
                .value_name("MS")
                .help("Also pump the command queue on this period")
                .takes_value(true)
                .validator(validate_number::<u64>),
        )
        .arg(
            Arg::with_name("persist-failures")
                .long("persist-failures")
                .help("Store WARNING/ERROR observations so getstats can count them"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("groundlink=info")))
        .compact()
        .init();

    let config = build_config(&matches)?;
    info!(?config, "ground link starting");

    let transmitter = UdpTransmitter::bind(config.send_addr())?;
    let link = Arc::new(GroundLink::new(&config, Arc::new(transmitter), Arc::new(TracingSink)));

    let socket = UdpSocket::bind(config.recv_addr()).await?;
    let ingress = tokio::spawn(run_ingress(socket, Arc::clone(&link)));
    let pump = config
        .pump_interval
        .map(|period| tokio::spawn(run_periodic_pump(Arc::clone(&link), period)));

    println!("{}", "🛰️  Ground link started".bright_green().bold());
    println!("{}", PROMPT.dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_request(&link, &line) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Datagram handling is synchronous, so aborting only cancels an idle recv.
    ingress.abort();
    if let Some(pump) = pump {
        pump.abort();
    }

    let stats = link.stats();
    println!("{} {}", "🛑 Ground link stopped".bright_red().bold(), serde_json::to_string(&stats)?.dimmed());
    Ok(())
}

fn build_config(matches: &ArgMatches<'_>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let mut config = LinkConfig::default();
    if let Some(ip) = matches.value_of("modem-ip") {
        config.modem_ip = ip.parse()?;
    }
    if let Some(port) = matches.value_of("recv-port") {
        config.recv_port = port.parse()?;
    }
    if let Some(port) = matches.value_of("send-port") {
        config.send_port = port.parse()?;
    }
    if let Some(path) = matches.value_of("logfile") {
        config.logfile = PathBuf::from(path);
    }
    if let Some(secs) = matches.value_of("timeout") {
        config.log_timeout = Duration::from_secs(secs.parse()?);
    }
    if let Some(ms) = matches.value_of("pump-interval-ms") {
        config.pump_interval = Some(Duration::from_millis(ms.parse()?));
    }
    config.persist_failures = matches.is_present("persist-failures");
    Ok(config)
}

/// Returns false when the operator asked to quit.
fn handle_request(link: &GroundLink, line: &str) -> bool {
    match Request::parse(line) {
        Ok(None) => {}
        Ok(Some(Request::Quit)) => return false,
        Ok(Some(Request::GetLog(command))) => match link.submit(command) {
            Ok(PumpOutcome::Sent) | Ok(PumpOutcome::RecoveredAndSent) => {
                println!("{} {}", "✅".green(), "Command sent".bright_green());
            }
            Ok(outcome) => {
                println!(
                    "{} {} ({:?}, {} queued)",
                    "⏳".yellow(),
                    "Command queued".yellow(),
                    outcome,
                    link.queued()
                );
            }
            Err(e) => println!("{} {}", "❌".red(), format!("Command failed: {e}").bright_red()),
        },
        Ok(Some(Request::GetStats(device))) => match link.query_stats(device) {
            Ok(stats) => {
                println!(
                    "{} {}: {} {}, {} {}",
                    "📊".bright_blue(),
                    device.to_string().bright_white(),
                    "WARNINGS".yellow(),
                    stats.warnings,
                    "ERRORS".red(),
                    stats.errors
                );
            }
            Err(e) => println!("{} {}", "❌".red(), format!("Stats failed: {e}").bright_red()),
        },
        Err(e) => println!("{} {}", "❓".yellow(), format!("Unrecognised request: {e}").yellow()),
    }
    true
}
