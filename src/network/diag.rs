//! Network Diagnostics
//!
//! Non-interactive self-checks the (external) menu layer can render when
//! discovery comes up empty: the detected local address, bind-probe
//! availability of the two fixed ports, and the derived subnet broadcast.

use std::net::Ipv4Addr;

use tokio::net::{TcpListener, UdpSocket};
use tracing::debug;

use crate::network::discovery::detect_local_ip;
use crate::network::transport::TransportConfig;

/// Snapshot of the local network situation. Informational only: an
/// unavailable port is data for the user, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetReport {
    /// Address this host would advertise on the LAN.
    pub local_ip: Ipv4Addr,
    /// Whether the TCP game port could be bound right now.
    pub game_port_available: bool,
    /// Whether the UDP discovery port could be bound right now.
    pub discovery_port_available: bool,
    /// Broadcast address of the local /24 subnet.
    pub subnet_broadcast: Ipv4Addr,
}

/// Probe the local setup: bind-and-release both configured ports and
/// derive the subnet broadcast from the detected address.
pub async fn diagnose(config: &TransportConfig) -> NetReport {
    let local_ip = detect_local_ip();
    let [a, b, c, _] = local_ip.octets();

    let report = NetReport {
        local_ip,
        game_port_available: tcp_port_available(config.game_port).await,
        discovery_port_available: udp_port_available(config.discovery_port).await,
        subnet_broadcast: Ipv4Addr::new(a, b, c, 255),
    };
    debug!(?report, "network diagnostics collected");
    report
}

async fn tcp_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await.is_ok()
}

async fn udp_port_available(port: u16) -> bool {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_occupied_ports_report_unavailable() {
        let tcp = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).await.unwrap();
        let tcp_port = tcp.local_addr().unwrap().port();
        let udp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.unwrap();
        let udp_port = udp.local_addr().unwrap().port();

        assert!(!tcp_port_available(tcp_port).await);
        assert!(!udp_port_available(udp_port).await);
    }

    #[tokio::test]
    async fn test_diagnose_derives_subnet_broadcast() {
        // Port 0 always binds, so both checks come back available.
        let config = TransportConfig {
            game_port: 0,
            discovery_port: 0,
            ..Default::default()
        };
        let report = diagnose(&config).await;

        assert!(report.game_port_available);
        assert!(report.discovery_port_available);
        let [a, b, c, d] = report.subnet_broadcast.octets();
        let local = report.local_ip.octets();
        assert_eq!([a, b, c], [local[0], local[1], local[2]]);
        assert_eq!(d, 255);
    }
}
