//! Retransmitting STUN client over UDP.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

use crate::error::StunError;
use crate::message::{CookiePolicy, Message, TransactionId};

/// Receive buffer size per attempt. Any well-formed binding response
/// fits with room to spare.
const RECV_BUFFER_SIZE: usize = 4096;

/// Tunables for the request/response exchange.
///
/// Defaults follow the RFC 3489 Section 9.3 schedule: nine attempts
/// with the wait doubling from 100ms until it caps at 1.6s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Wait after the first transmission.
    pub initial_rto: Duration,
    /// Ceiling the doubling wait never exceeds.
    pub max_rto: Duration,
    /// Total number of transmissions before giving up.
    pub max_retries: u32,
    /// How outgoing transaction ids are filled.
    pub cookie_policy: CookiePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_rto: Duration::from_millis(100),
            max_rto: Duration::from_millis(1600),
            max_retries: 9,
            cookie_policy: CookiePolicy::default(),
        }
    }
}

/// The wait for the attempt after one that waited `rto`.
fn next_rto(rto: Duration, max_rto: Duration) -> Duration {
    if rto < max_rto { (rto * 2).min(max_rto) } else { rto }
}

/// A STUN client bound to one local UDP socket.
///
/// All probes share the socket. `close` may be called from another
/// task and unblocks a read in progress.
pub struct Client {
    socket: UdpSocket,
    local_addr: SocketAddr,
    server_addr: SocketAddr,
    config: ClientConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("local_addr", &self.local_addr)
            .field("server_addr", &self.server_addr)
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// Resolve `addr` to its first IPv4 socket address.
async fn resolve_udp4(addr: &str) -> Result<SocketAddr, StunError> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|_| StunError::Resolve(addr.to_string()))?
        .find(|a| a.is_ipv4())
        .ok_or_else(|| StunError::Resolve(addr.to_string()))
}

impl Client {
    /// Create a client with default configuration.
    ///
    /// `local` is a bind address; pass an empty string (or `0.0.0.0:0`)
    /// to let the OS pick an interface and an ephemeral port.
    pub async fn new(server: &str, local: &str) -> Result<Self, StunError> {
        Self::with_config(server, local, ClientConfig::default()).await
    }

    /// Create a client with explicit configuration.
    pub async fn with_config(
        server: &str,
        local: &str,
        config: ClientConfig,
    ) -> Result<Self, StunError> {
        let local = if local.is_empty() { "0.0.0.0:0" } else { local };
        let server_addr = resolve_udp4(server).await?;
        let bind_addr = resolve_udp4(local).await?;

        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;
        tracing::debug!(%local_addr, %server_addr, "stun client bound");

        Ok(Self {
            socket,
            local_addr,
            server_addr,
            config,
            rng: Mutex::new(Box::new(rand::rngs::OsRng)),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// Replace the random source used for transaction ids.
    ///
    /// A seeded generator makes outgoing ids reproducible.
    pub fn set_rng(&self, rng: impl RngCore + Send + 'static) {
        *self.rng.lock().unwrap() = Box::new(rng);
    }

    /// Generate a transaction id under the configured cookie policy.
    pub fn new_transaction_id(&self) -> TransactionId {
        let mut rng = self.rng.lock().unwrap();
        TransactionId::generate(rng.as_mut(), self.config.cookie_policy)
    }

    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The resolved server address.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `msg` to `dst` and wait for the matching response.
    ///
    /// Retransmits on the configured schedule. Returns `Ok(None)` when
    /// every attempt times out; a response is matched by transaction id
    /// and datagrams with a different id are discarded without
    /// consuming the attempt. A datagram that fails to decode aborts
    /// the exchange with the decode error.
    pub async fn send(&self, msg: &Message, dst: SocketAddr) -> Result<Option<Message>, StunError> {
        let wire = msg.encode();
        let mut rto = self.config.initial_rto;

        // One notified future spans the whole exchange: a close landing
        // at any point, even before the first poll, completes it.
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);

        for attempt in 0..self.config.max_retries {
            if self.closed.load(Ordering::Acquire) {
                return Err(StunError::Closed);
            }

            self.socket.send_to(&wire, dst).await?;
            tracing::debug!(%dst, attempt, ?rto, "sent binding request");

            let deadline = Instant::now() + rto;
            rto = next_rto(rto, self.config.max_rto);

            let mut buf = [0u8; RECV_BUFFER_SIZE];
            loop {
                let received = tokio::select! {
                    r = timeout_at(deadline, self.socket.recv_from(&mut buf)) => r,
                    _ = &mut shutdown => return Err(StunError::Closed),
                };

                let (len, from) = match received {
                    Ok(r) => r?,
                    // Deadline passed: retransmit.
                    Err(_) => break,
                };

                let response = Message::decode(&buf[..len])?;
                if response.transaction_id() != msg.transaction_id() {
                    tracing::trace!(%from, "discarding datagram with stale transaction id");
                    continue;
                }

                tracing::debug!(%from, attempt, "matched binding response");
                return Ok(Some(response));
            }
        }

        tracing::debug!(%dst, "no response after {} attempts", self.config.max_retries);
        Ok(None)
    }

    /// Close the client, waking any read in progress.
    ///
    /// Idempotent; later `send` calls fail with [`StunError::Closed`].
    /// The socket itself stays open until the client is dropped.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shutdown.notify_waiters();
            tracing::debug!(local_addr = %self.local_addr, "stun client closed");
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
