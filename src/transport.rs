use crate::codec::MAX_DATAGRAM_SIZE;
use crate::dispatcher::Transmitter;
use crate::link::GroundLink;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{error, info};

/// Sends serialized commands to the modem over UDP.
#[derive(Debug)]
pub struct UdpTransmitter {
    socket: std::net::UdpSocket,
    target: SocketAddr,
}

impl UdpTransmitter {
    pub fn bind(target: SocketAddr) -> io::Result<Self> {
        let local = match target.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = std::net::UdpSocket::bind(local)?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Transmitter for UdpTransmitter {
    fn transmit(&self, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, self.target).map(|_| ())
    }
}

/// Receives datagrams forever, feeding each one through the link in
/// arrival order. A bad datagram is logged and the loop moves on.
pub async fn run_ingress(socket: UdpSocket, link: Arc<GroundLink>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    match socket.local_addr() {
        Ok(addr) => info!(%addr, "ingress listening"),
        Err(e) => error!("ingress socket has no local address: {e}"),
    }

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if let Err(e) = link.handle_datagram(&buf[..len]) {
                    error!(%from, "processing datagram: {e}");
                }
            }
            Err(e) => error!("receiving datagram: {e}"),
        }
    }
}

/// Pumps the dispatcher on a fixed period so a stalled session recovers even
/// when nobody submits.
pub async fn run_periodic_pump(link: Arc<GroundLink>, period: Duration) {
    let mut interval = time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = link.pump() {
            error!("periodic pump: {e}");
        }
    }
}
