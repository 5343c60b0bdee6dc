//! Session Transport
//!
//! Establishes one connected duplex byte stream between exactly two peers
//! and fixes their roles for the life of the session. The host path
//! advertises over discovery while it waits; the guest path connects with
//! a short probe deadline so a dead target fails fast. Every receive on an
//! established session is bounded by a read deadline so a silently
//! vanished peer surfaces instead of hanging the game forever.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::network::discovery::Responder;
use crate::network::protocol::{Message, ProtocolError};
use crate::{DEFAULT_DISCOVERY_PORT, DEFAULT_GAME_PORT};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP port the game session runs on.
    pub game_port: u16,
    /// UDP port the discovery responder binds while hosting.
    pub discovery_port: u16,
    /// How long a host waits for a peer to join. Long on purpose: a human
    /// has to find the game and decide to connect.
    pub accept_timeout: Duration,
    /// Deadline for the guest-side reachability probe.
    pub probe_timeout: Duration,
    /// Per-receive deadline on an established session.
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            game_port: DEFAULT_GAME_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            accept_timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Transport and session stream errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not bind the game port for hosting.
    #[error("failed to bind game port {port}: {source}")]
    Bind {
        /// The port that failed to bind.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },

    /// No peer joined within the accept deadline.
    #[error("no peer connected within {0:?}")]
    AcceptTimedOut(Duration),

    /// Probe or connect failure; recoverable by retrying or entering an
    /// address manually.
    #[error(
        "cannot reach {addr}: {source}; check that the peer is hosting and \
         that the game port is not firewalled"
    )]
    Unreachable {
        /// Address that could not be reached.
        addr: SocketAddr,
        /// Underlying connect error.
        #[source]
        source: io::Error,
    },

    /// The peer closed the stream.
    #[error("peer disconnected")]
    PeerDisconnected,

    /// Nothing arrived within the read deadline.
    #[error("peer sent nothing within {0:?}")]
    PeerUnresponsive(Duration),

    /// The peer sent a line the codec rejected.
    #[error(transparent)]
    Malformed(#[from] ProtocolError),

    /// Any other stream failure.
    #[error("session i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Fixed role of one side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the deck, deals, resolves second.
    Host,
    /// Receives the dealt hand, acts first.
    Guest,
}

/// One established game session: a fixed [`Role`] plus a connected duplex
/// message stream with read deadlines.
pub struct Session {
    role: Role,
    peer: SocketAddr,
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    read_timeout: Duration,
}

impl Session {
    fn from_stream(role: Role, stream: TcpStream, peer: SocketAddr, read_timeout: Duration) -> Self {
        // Turn-taking exchanges one small line at a time.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        let (read_half, write_half) = stream.into_split();
        Self::from_parts(role, Box::new(read_half), Box::new(write_half), peer, read_timeout)
    }

    pub(crate) fn from_parts(
        role: Role,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        peer: SocketAddr,
        read_timeout: Duration,
    ) -> Self {
        Self {
            role,
            peer,
            reader: BufReader::new(reader),
            writer,
            read_timeout,
        }
    }

    /// This side's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Per-receive deadline.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Send one message as a newline-delimited wire line.
    pub async fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let mut line = msg.encode();
        debug!(role = ?self.role, %line, "send");
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive the next message, bounded by the read deadline.
    pub async fn recv(&mut self) -> Result<Message, TransportError> {
        let mut line = String::new();
        let read = time::timeout(self.read_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| TransportError::PeerUnresponsive(self.read_timeout))?;
        if read? == 0 {
            return Err(TransportError::PeerDisconnected);
        }

        let line = line.trim_end_matches(['\r', '\n']);
        match Message::decode(line) {
            Ok(msg) => {
                debug!(role = ?self.role, ?msg, "recv");
                Ok(msg)
            }
            Err(e) => {
                // The one untrusted-input boundary: reject loudly, with the
                // offending token, and let the session die.
                error!(token = %line, "malformed message from peer: {e}");
                Err(e.into())
            }
        }
    }
}

/// Host a session: advertise over discovery, accept exactly one peer on
/// the game port, then stop advertising. Yields the [`Role::Host`] side.
pub async fn host_session(config: &TransportConfig) -> Result<Session, TransportError> {
    // Discovery trouble must not stop a host that can still be reached by
    // a manually entered address.
    let responder = match Responder::spawn_on(config.discovery_port).await {
        Ok(responder) => Some(responder),
        Err(e) => {
            warn!("discovery unavailable, hosting without advertising: {e}");
            None
        }
    };

    let accepted = accept_peer(config).await;

    // Advertising ends as soon as pairing is decided, on every path.
    if let Some(responder) = responder {
        responder.stop().await;
    }

    let (stream, peer) = accepted?;
    info!(%peer, "peer connected, session established as host");
    Ok(Session::from_stream(Role::Host, stream, peer, config.read_timeout))
}

async fn accept_peer(config: &TransportConfig) -> Result<(TcpStream, SocketAddr), TransportError> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.game_port))
        .await
        .map_err(|source| TransportError::Bind {
            port: config.game_port,
            source,
        })?;
    info!(port = config.game_port, "waiting for a peer to join");

    match time::timeout(config.accept_timeout, listener.accept()).await {
        Err(_) => Err(TransportError::AcceptTimedOut(config.accept_timeout)),
        Ok(result) => Ok(result?),
    }
}

/// Connect to a hosting peer. The reachability probe and the connection
/// are one bounded connect: an unreachable, firewalled or non-hosting
/// target fails fast with an actionable diagnostic, and on success the
/// probed stream itself becomes the session, so the host's single accept
/// never pairs with a throwaway connection. Yields the [`Role::Guest`]
/// side.
pub async fn connect_to(addr: Ipv4Addr, config: &TransportConfig) -> Result<Session, TransportError> {
    let target = SocketAddr::from((addr, config.game_port));

    let stream = match time::timeout(config.probe_timeout, TcpStream::connect(target)).await {
        Err(_) => {
            return Err(TransportError::Unreachable {
                addr: target,
                source: io::Error::new(io::ErrorKind::TimedOut, "connection probe timed out"),
            })
        }
        Ok(Err(source)) => return Err(TransportError::Unreachable { addr: target, source }),
        Ok(Ok(stream)) => stream,
    };

    let peer = stream.peer_addr()?;
    info!(%peer, "connected, session established as guest");
    Ok(Session::from_stream(Role::Guest, stream, peer, config.read_timeout))
}

/// Build a connected pair of in-memory sessions for protocol tests.
#[cfg(test)]
pub(crate) fn session_pair(read_timeout: Duration) -> (Session, Session) {
    let (host_io, guest_io) = tokio::io::duplex(4096);
    let (host_read, host_write) = tokio::io::split(host_io);
    let (guest_read, guest_write) = tokio::io::split(guest_io);
    let addr: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
    (
        Session::from_parts(
            Role::Host,
            Box::new(host_read),
            Box::new(host_write),
            addr,
            read_timeout,
        ),
        Session::from_parts(
            Role::Guest,
            Box::new(guest_read),
            Box::new(guest_write),
            addr,
            read_timeout,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.game_port, DEFAULT_GAME_PORT);
        assert_eq!(config.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert!(config.accept_timeout >= Duration::from_secs(60));
        assert!(config.probe_timeout < config.read_timeout);
    }

    #[tokio::test]
    async fn test_connect_and_accept_exchange_messages() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = TransportConfig {
            game_port: port,
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let host_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            Session::from_stream(Role::Host, stream, peer, Duration::from_secs(2))
        });

        let mut guest = connect_to(Ipv4Addr::LOCALHOST, &config).await.unwrap();
        let mut host = host_task.await.unwrap();

        assert_eq!(guest.role(), Role::Guest);
        assert_eq!(host.role(), Role::Host);

        guest.send(&Message::Hit).await.unwrap();
        assert_eq!(host.recv().await.unwrap(), Message::Hit);

        host.send(&Message::Stand).await.unwrap();
        assert_eq!(guest.recv().await.unwrap(), Message::Stand);
    }

    #[tokio::test]
    async fn test_host_session_times_out_without_peer() {
        // Ephemeral ports keep the test self-contained; the responder is
        // spawned and stopped on the failure path too.
        let config = TransportConfig {
            game_port: 0,
            discovery_port: 0,
            accept_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let result = host_session(&config).await;
        assert!(matches!(result, Err(TransportError::AcceptTimedOut(_))));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_target_fails_fast() {
        // Grab an ephemeral port, then free it so the connect is refused.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TransportConfig {
            game_port: port,
            probe_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let result = connect_to(Ipv4Addr::LOCALHOST, &config).await;
        assert!(matches!(result, Err(TransportError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_recv_times_out_as_peer_unresponsive() {
        let (mut host, _guest) = session_pair(Duration::from_millis(50));
        assert!(matches!(
            host.recv().await,
            Err(TransportError::PeerUnresponsive(_))
        ));
    }

    #[tokio::test]
    async fn test_recv_on_closed_stream_is_peer_disconnected() {
        let (mut host, guest) = session_pair(Duration::from_secs(1));
        drop(guest);
        assert!(matches!(
            host.recv().await,
            Err(TransportError::PeerDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_recv_rejects_malformed_line() {
        let (host_io, guest_io) = tokio::io::duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_io);
        let mut session = Session::from_parts(
            Role::Host,
            Box::new(host_read),
            Box::new(host_write),
            (Ipv4Addr::LOCALHOST, 0).into(),
            Duration::from_secs(1),
        );

        let (_guest_read, mut guest_write) = tokio::io::split(guest_io);
        guest_write.write_all(b"GARBAGE\n").await.unwrap();

        assert!(matches!(
            session.recv().await,
            Err(TransportError::Malformed(_))
        ));
    }
}
