//! NAT type classification via the RFC 3489 Section 10.1 decision
//! procedure.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::client::Client;
use crate::error::StunError;
use crate::probe::{test1, test2, test3};

/// The eight outcomes of the discovery procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatType {
    /// No NAT and no filtering; the host's address is public.
    OpenInternet,
    /// No STUN traffic gets through at all.
    UdpBlocked,
    /// No address translation, but a firewall filters unsolicited
    /// inbound UDP.
    SymmetricUdpFirewall,
    /// One public mapping for all destinations; anyone may send to it.
    FullCone,
    /// One public mapping; inbound allowed only from previously
    /// contacted IPs.
    RestrictedCone,
    /// One public mapping; inbound allowed only from previously
    /// contacted IP and port pairs.
    PortRestrictedCone,
    /// A fresh mapping per destination.
    Symmetric,
    /// The server's alternate address never answered; behavior cannot
    /// be classified further.
    Unknown,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NatType::OpenInternet => "Open Internet",
            NatType::UdpBlocked => "UDP Blocked",
            NatType::SymmetricUdpFirewall => "Symmetric UDP Firewall",
            NatType::FullCone => "Full cone NAT",
            NatType::RestrictedCone => "Restricted cone NAT",
            NatType::PortRestrictedCone => "Port Restricted cone NAT",
            NatType::Symmetric => "Symmetric NAT",
            NatType::Unknown => "Unknown NAT",
        };
        f.write_str(s)
    }
}

/// Result of a completed discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    /// The classified NAT behavior.
    pub nat_type: NatType,
    /// Server-reflexive address, when any response was received.
    pub mapped: Option<SocketAddr>,
}

/// A discovery run that failed partway.
///
/// Carries whatever mapped address had been learned before the failure
/// so a caller can still use it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct DiscoveryError {
    /// The underlying failure.
    #[source]
    pub source: StunError,
    /// Server-reflexive address learned before the failure, if any.
    pub mapped: Option<SocketAddr>,
}

impl Client {
    /// Run the full discovery procedure against the configured server.
    ///
    /// Test I learns the mapped and alternate addresses; Test II and a
    /// second Test I against the alternate address separate the cone
    /// variants; Test III separates restricted from port-restricted.
    /// Timeouts are classification data; only transport and codec
    /// failures surface as errors.
    pub async fn discover(&self) -> Result<Discovery, DiscoveryError> {
        let server = self.server_addr();
        tracing::info!(%server, "starting NAT discovery");

        let wrap = |source: StunError, mapped: Option<SocketAddr>| DiscoveryError { source, mapped };

        let Some(first) = test1(self, server).await.map_err(|e| wrap(e, None))? else {
            tracing::info!("test I timed out, UDP is blocked");
            return Ok(Discovery {
                nat_type: NatType::UdpBlocked,
                mapped: None,
            });
        };
        let mapped = Some(first.mapped);
        tracing::info!(mapped = %first.mapped, changed = %first.changed, "test I complete");

        // No translation at all when the server saw our bound address.
        let identical = first.mapped == self.local_addr();

        let second = test2(self, server)
            .await
            .map_err(|e| wrap(e, mapped))?;

        if identical {
            // The Test II outcome is the only signal separating an open
            // host from one behind a filtering firewall.
            let nat_type = if second.is_some() {
                NatType::OpenInternet
            } else {
                NatType::SymmetricUdpFirewall
            };
            tracing::info!(%nat_type, "discovery complete");
            return Ok(Discovery { nat_type, mapped });
        }

        if second.is_some() {
            tracing::info!("test II answered from the alternate address, full cone");
            return Ok(Discovery {
                nat_type: NatType::FullCone,
                mapped,
            });
        }

        let Some(third) = test1(self, first.changed)
            .await
            .map_err(|e| wrap(e, mapped))?
        else {
            tracing::info!("alternate address unreachable, NAT type unknown");
            return Ok(Discovery {
                nat_type: NatType::Unknown,
                mapped,
            });
        };

        if third.mapped != first.mapped {
            tracing::info!(
                first = %first.mapped,
                second = %third.mapped,
                "mapping depends on destination, symmetric"
            );
            return Ok(Discovery {
                nat_type: NatType::Symmetric,
                mapped,
            });
        }

        let nat_type = if test3(self, first.changed)
            .await
            .map_err(|e| wrap(e, mapped))?
            .is_some()
        {
            NatType::RestrictedCone
        } else {
            NatType::PortRestrictedCone
        };
        tracing::info!(%nat_type, "discovery complete");
        Ok(Discovery { nat_type, mapped })
    }
}
