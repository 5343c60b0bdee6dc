//! Peer Discovery
//!
//! UDP broadcast discovery: a background responder advertises this process
//! while it is hosting, and a bounded prober turns "nothing" into a list of
//! candidate peer addresses. Best-effort by design - discovery failures
//! degrade to an empty result, never into a crash or a hung session.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::DEFAULT_DISCOVERY_PORT;

/// Probe datagram payload; replies are `BLACKJACK_GAME:<ipv4>`.
pub const PROBE_MESSAGE: &str = "BLACKJACK_GAME";

/// Receive buffer for discovery datagrams.
const DATAGRAM_BUF: usize = 256;

/// Broadcast addresses of common home/office private subnets, probed as a
/// fallback for routers that drop subnet-limited broadcast.
const FALLBACK_BROADCASTS: [Ipv4Addr; 8] = [
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 0, 255),
    Ipv4Addr::new(192, 168, 2, 255),
    Ipv4Addr::new(10, 0, 0, 255),
    Ipv4Addr::new(10, 0, 1, 255),
    Ipv4Addr::new(10, 1, 1, 255),
    Ipv4Addr::new(172, 16, 255, 255),
    Ipv4Addr::new(172, 31, 255, 255),
];

/// UDP discovery failure. Never fatal to the process: the prober degrades
/// to an empty peer list and the responder just stops advertising.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Could not bind the discovery socket.
    #[error("failed to bind discovery socket: {0}")]
    Bind(#[source] std::io::Error),

    /// Socket option or send/receive failure.
    #[error("discovery i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// LOCAL ADDRESS DETECTION
// =============================================================================

/// A network interface as seen by the address selector. Decoupled from the
/// OS view so selection stays a pure, testable function.
#[derive(Debug, Clone)]
pub struct Iface {
    /// Interface name as reported by the OS.
    pub name: String,
    /// Whether the interface is administratively up.
    pub is_up: bool,
    /// Whether this is the loopback interface.
    pub is_loopback: bool,
    /// IPv4 addresses configured on the interface.
    pub addrs: Vec<Ipv4Addr>,
}

fn is_wireless_name(name: &str) -> bool {
    let name = name.to_lowercase();
    ["wi-fi", "wireless", "wlan", "802.11"]
        .iter()
        .any(|pattern| name.contains(pattern))
}

fn is_virtual_name(name: &str) -> bool {
    let name = name.to_lowercase();
    ["vmware", "virtualbox", "hyper-v", "docker", "vpn", "tap", "tun"]
        .iter()
        .any(|pattern| name.contains(pattern))
}

/// Pick the LAN address to advertise: skip interfaces that are down,
/// loopback or virtual/VPN-named; keep private-range IPv4 addresses;
/// prefer one on a wireless-named interface, else the first private
/// address found.
pub fn select_local_ip(ifaces: &[Iface]) -> Option<Ipv4Addr> {
    let mut wireless = None;
    let mut fallback = None;

    for iface in ifaces {
        if !iface.is_up || iface.is_loopback || is_virtual_name(&iface.name) {
            continue;
        }
        let wireless_name = is_wireless_name(&iface.name);
        for addr in &iface.addrs {
            if !addr.is_private() {
                continue;
            }
            if wireless_name {
                if wireless.is_none() {
                    wireless = Some(*addr);
                }
            } else if fallback.is_none() {
                fallback = Some(*addr);
            }
        }
    }

    wireless.or(fallback)
}

/// Snapshot the OS interface table.
fn system_interfaces() -> Vec<Iface> {
    pnet_datalink::interfaces()
        .into_iter()
        .map(|iface| Iface {
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            addrs: iface
                .ips
                .iter()
                .filter_map(|net| match net.ip() {
                    IpAddr::V4(addr) => Some(addr),
                    IpAddr::V6(_) => None,
                })
                .collect(),
            name: iface.name,
        })
        .collect()
}

/// Address the default route would use; no packets are sent.
fn default_route_ip() -> Option<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) => Some(addr),
        IpAddr::V6(_) => None,
    }
}

/// Detect the address this host should advertise on the LAN. Falls back to
/// the default-route address, then loopback, when no suitable interface is
/// found.
pub fn detect_local_ip() -> Ipv4Addr {
    if let Some(ip) = select_local_ip(&system_interfaces()) {
        debug!(%ip, "local address selected from interface scan");
        return ip;
    }
    if let Some(ip) = default_route_ip() {
        debug!(%ip, "local address resolved from default route");
        return ip;
    }
    Ipv4Addr::LOCALHOST
}

// =============================================================================
// PROBER
// =============================================================================

/// Broadcast destinations for a probe from `local`: the global broadcast,
/// the own-subnet broadcast, nearby third-octet subnets (own +/- 10,
/// clamped to [0, 255]) and the fixed fallback list. Deduplicated.
pub fn broadcast_targets(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let mut targets = BTreeSet::new();
    targets.insert(Ipv4Addr::BROADCAST);

    if !local.is_loopback() {
        let [a, b, c, _] = local.octets();
        let low = c.saturating_sub(10);
        let high = c.saturating_add(10);
        for third in low..=high {
            targets.insert(Ipv4Addr::new(a, b, third, 255));
        }
    }

    targets.extend(FALLBACK_BROADCASTS);
    targets.into_iter().collect()
}

fn parse_reply(payload: &[u8]) -> Option<Ipv4Addr> {
    let text = std::str::from_utf8(payload).ok()?;
    let ip = text.strip_prefix(PROBE_MESSAGE)?.strip_prefix(':')?;
    ip.trim().parse().ok()
}

/// Search the LAN for hosting peers on the default discovery port.
///
/// Probes every broadcast target, then collects replies until the timeout
/// elapses. Failures are logged and swallowed: an empty list is the valid
/// "no peers found" result either way.
pub async fn search_peers(timeout: Duration) -> Vec<Ipv4Addr> {
    search_peers_on(DEFAULT_DISCOVERY_PORT, timeout).await
}

/// [`search_peers`] against an explicit discovery port.
pub async fn search_peers_on(port: u16, timeout: Duration) -> Vec<Ipv4Addr> {
    match probe_for_peers(port, timeout).await {
        Ok(peers) => peers,
        Err(e) => {
            warn!("peer search failed: {e}");
            Vec::new()
        }
    }
}

async fn probe_for_peers(port: u16, window: Duration) -> Result<Vec<Ipv4Addr>, DiscoveryError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(DiscoveryError::Bind)?;
    socket.set_broadcast(true)?;

    let local = detect_local_ip();
    let targets = broadcast_targets(local);
    debug!(targets = targets.len(), %local, "sending discovery probes");
    for target in &targets {
        // Individual broadcasts may be blocked by the local stack or
        // router; that only narrows the search.
        if let Err(e) = socket.send_to(PROBE_MESSAGE.as_bytes(), (*target, port)).await {
            debug!("probe to {target} failed: {e}");
        }
    }

    let deadline = Instant::now() + window;
    let mut peers = BTreeSet::new();
    let mut buf = [0u8; DATAGRAM_BUF];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match time::timeout(remaining, socket.recv_from(&mut buf)).await {
            // Wall-clock deadline reached; whatever arrived is the result.
            Err(_) => break,
            Ok(Err(e)) => {
                debug!("discovery receive failed: {e}");
                break;
            }
            Ok(Ok((len, from))) => {
                if let Some(peer) = parse_reply(&buf[..len]) {
                    if peers.insert(peer) {
                        info!(%peer, %from, "peer found");
                    }
                }
            }
        }
    }

    Ok(peers.into_iter().collect())
}

// =============================================================================
// RESPONDER
// =============================================================================

/// Background task answering discovery probes while this process is
/// advertising willingness to host.
///
/// Stopped cooperatively: [`Responder::stop`] signals the task and waits
/// for it; merely dropping the handle closes the shutdown channel, which
/// the task also observes.
pub struct Responder {
    local_ip: Ipv4Addr,
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Responder {
    /// Start a responder on the default discovery port.
    pub async fn spawn() -> Result<Self, DiscoveryError> {
        Self::spawn_inner(DEFAULT_DISCOVERY_PORT, detect_local_ip()).await
    }

    /// Start a responder on an explicit port (0 picks an ephemeral one).
    pub async fn spawn_on(port: u16) -> Result<Self, DiscoveryError> {
        Self::spawn_inner(port, detect_local_ip()).await
    }

    async fn spawn_inner(port: u16, local_ip: Ipv4Addr) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(DiscoveryError::Bind)?;
        socket.set_broadcast(true)?;
        let addr = socket.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        info!(%addr, %local_ip, "discovery responder started");
        let handle = tokio::spawn(respond_loop(socket, local_ip, shutdown_rx));

        Ok(Self {
            local_ip,
            addr,
            shutdown_tx,
            handle,
        })
    }

    /// The LAN address this responder advertises.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the responder to stop and wait for it to finish.
    pub async fn stop(self) {
        let Responder {
            shutdown_tx,
            handle,
            ..
        } = self;
        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }
}

async fn respond_loop(
    socket: UdpSocket,
    local_ip: Ipv4Addr,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = [0u8; DATAGRAM_BUF];
    loop {
        tokio::select! {
            // Fires on an explicit stop signal and when the handle is
            // dropped (channel closed).
            _ = shutdown.recv() => {
                debug!("discovery responder stopped");
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => answer_probe(&socket, local_ip, &buf[..len], from).await,
                Err(e) => {
                    warn!("discovery receive failed: {e}");
                    break;
                }
            }
        }
    }
}

async fn answer_probe(socket: &UdpSocket, local_ip: Ipv4Addr, payload: &[u8], from: SocketAddr) {
    let Ok(text) = std::str::from_utf8(payload) else {
        return;
    };
    if !text.starts_with(PROBE_MESSAGE) {
        return;
    }
    if from.ip() == IpAddr::V4(local_ip) {
        debug!(%from, "ignoring own probe");
        return;
    }

    let reply = format!("{PROBE_MESSAGE}:{local_ip}");
    match socket.send_to(reply.as_bytes(), from).await {
        Ok(_) => debug!(%from, "answered discovery probe"),
        Err(e) => warn!("failed to answer probe from {from}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, is_up: bool, is_loopback: bool, addrs: &[[u8; 4]]) -> Iface {
        Iface {
            name: name.to_string(),
            is_up,
            is_loopback,
            addrs: addrs.iter().map(|o| Ipv4Addr::from(*o)).collect(),
        }
    }

    #[test]
    fn test_select_skips_loopback_virtual_and_down() {
        let ifaces = vec![
            iface("lo", true, true, &[[127, 0, 0, 1]]),
            iface("VPN Adapter", true, false, &[[10, 8, 0, 2]]),
            iface("Ethernet (down)", false, false, &[[192, 168, 1, 4]]),
            iface("eth0", true, false, &[[192, 168, 1, 23]]),
        ];
        assert_eq!(select_local_ip(&ifaces), Some(Ipv4Addr::new(192, 168, 1, 23)));
    }

    #[test]
    fn test_select_prefers_wireless_named_interface() {
        let ifaces = vec![
            iface("eth0", true, false, &[[10, 0, 0, 5]]),
            iface("Wi-Fi Adapter", true, false, &[[192, 168, 0, 7]]),
        ];
        assert_eq!(select_local_ip(&ifaces), Some(Ipv4Addr::new(192, 168, 0, 7)));
    }

    #[test]
    fn test_select_ignores_public_addresses() {
        let ifaces = vec![iface("eth0", true, false, &[[8, 8, 4, 4]])];
        assert_eq!(select_local_ip(&ifaces), None);
    }

    #[test]
    fn test_select_accepts_all_private_ranges() {
        for addr in [[10, 1, 2, 3], [172, 16, 0, 9], [172, 31, 255, 1], [192, 168, 9, 9]] {
            let ifaces = vec![iface("eth0", true, false, &[addr])];
            assert_eq!(select_local_ip(&ifaces), Some(Ipv4Addr::from(addr)));
        }
        // 172.32/12 is outside the private block
        let ifaces = vec![iface("eth0", true, false, &[[172, 32, 0, 1]])];
        assert_eq!(select_local_ip(&ifaces), None);
    }

    #[test]
    fn test_name_classifiers() {
        assert!(is_wireless_name("Intel(R) Wireless-AC 9560"));
        assert!(is_wireless_name("wlan0"));
        assert!(!is_wireless_name("eth0"));
        assert!(is_virtual_name("Docker Network Bridge"));
        assert!(is_virtual_name("tun0"));
        assert!(is_virtual_name("TAP-Windows Adapter"));
        assert!(!is_virtual_name("Realtek PCIe GbE"));
    }

    #[test]
    fn test_broadcast_targets_cover_subnet_band_and_fallbacks() {
        let targets = broadcast_targets(Ipv4Addr::new(192, 168, 5, 20));
        assert!(targets.contains(&Ipv4Addr::BROADCAST));
        // Own subnet and the +/- 10 band on the third octet.
        assert!(targets.contains(&Ipv4Addr::new(192, 168, 5, 255)));
        assert!(targets.contains(&Ipv4Addr::new(192, 168, 0, 255)));
        assert!(targets.contains(&Ipv4Addr::new(192, 168, 15, 255)));
        assert!(!targets.contains(&Ipv4Addr::new(192, 168, 16, 255)));
        // Fixed fallbacks ride along.
        assert!(targets.contains(&Ipv4Addr::new(10, 0, 0, 255)));
        assert!(targets.contains(&Ipv4Addr::new(172, 31, 255, 255)));
    }

    #[test]
    fn test_broadcast_targets_clamp_at_octet_edges() {
        let low = broadcast_targets(Ipv4Addr::new(10, 0, 3, 1));
        assert!(low.contains(&Ipv4Addr::new(10, 0, 0, 255)));
        assert!(low.contains(&Ipv4Addr::new(10, 0, 13, 255)));

        let high = broadcast_targets(Ipv4Addr::new(10, 0, 250, 1));
        assert!(high.contains(&Ipv4Addr::new(10, 0, 255, 255)));
        assert!(high.contains(&Ipv4Addr::new(10, 0, 240, 255)));
    }

    #[test]
    fn test_broadcast_targets_from_loopback_skip_subnet_derivation() {
        let targets = broadcast_targets(Ipv4Addr::LOCALHOST);
        assert!(targets.contains(&Ipv4Addr::BROADCAST));
        assert!(!targets.iter().any(|t| t.octets()[0] == 127));
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(
            parse_reply(b"BLACKJACK_GAME:192.168.1.9"),
            Some(Ipv4Addr::new(192, 168, 1, 9))
        );
        assert_eq!(parse_reply(b"BLACKJACK_GAME"), None);
        assert_eq!(parse_reply(b"BLACKJACK_GAME:"), None);
        assert_eq!(parse_reply(b"BLACKJACK_GAME:not-an-ip"), None);
        assert_eq!(parse_reply(b"OTHER:10.0.0.1"), None);
        assert_eq!(parse_reply(&[0xff, 0xfe]), None);
    }

    #[tokio::test]
    async fn test_responder_answers_probe_and_ignores_junk() {
        // Fixed advertised address so the loopback test client is never
        // mistaken for the responder itself.
        let advertised = Ipv4Addr::new(192, 0, 2, 1);
        let responder = Responder::spawn_inner(0, advertised).await.unwrap();
        let port = responder.local_addr().port();

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let target = (Ipv4Addr::LOCALHOST, port);

        // Junk datagram: no reply expected.
        client.send_to(b"HELLO", target).await.unwrap();
        let mut buf = [0u8; DATAGRAM_BUF];
        let silent = time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(silent.is_err(), "responder must ignore junk datagrams");

        // Probe: expect the advertised address back.
        client.send_to(PROBE_MESSAGE.as_bytes(), target).await.unwrap();
        let (len, _) = time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("responder did not reply in time")
            .unwrap();
        assert_eq!(parse_reply(&buf[..len]), Some(advertised));

        responder.stop().await;
    }
}
