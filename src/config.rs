use crate::handshake::DEFAULT_LOG_TIMEOUT;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEM_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2));
pub const DEFAULT_RECV_PORT: u16 = 5001;
pub const DEFAULT_SEND_PORT: u16 = 5002;
pub const DEFAULT_LOGFILE: &str = "session_log.jsonl";

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Modem address: inbound traffic is received on it, commands are sent to it.
    pub modem_ip: IpAddr,
    pub recv_port: u16,
    pub send_port: u16,
    pub logfile: PathBuf,
    pub log_timeout: Duration,
    /// Periodic pump in addition to the pump-on-submit/log_end triggers.
    pub pump_interval: Option<Duration>,
    /// Append decoded failure observations to the store alongside sent commands.
    pub persist_failures: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            modem_ip: DEFAULT_MODEM_IP,
            recv_port: DEFAULT_RECV_PORT,
            send_port: DEFAULT_SEND_PORT,
            logfile: PathBuf::from(DEFAULT_LOGFILE),
            log_timeout: DEFAULT_LOG_TIMEOUT,
            pump_interval: None,
            persist_failures: false,
        }
    }
}

impl LinkConfig {
    pub fn recv_addr(&self) -> SocketAddr {
        SocketAddr::new(self.modem_ip, self.recv_port)
    }

    pub fn send_addr(&self) -> SocketAddr {
        SocketAddr::new(self.modem_ip, self.send_port)
    }
}
