//! Classic STUN client and NAT behavior discovery.
//!
//! Implements the RFC 3489 binding exchange over UDP, with the RFC 5389
//! magic-cookie transaction ids as the default, and the Section 10.1
//! decision procedure that classifies a host's NAT into one of eight
//! types.
//!
//! ```no_run
//! use natprobe_stun::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new("stun.example.org:3478", "").await?;
//! let discovery = client.discover().await?;
//! println!("{}", discovery.nat_type);
//! client.close();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod discovery;
pub mod error;
pub mod message;
mod probe;

pub use client::{Client, ClientConfig};
pub use discovery::{Discovery, DiscoveryError, NatType};
pub use error::StunError;
pub use message::{AddressAttribute, Attribute, CookiePolicy, Message, TransactionId};
