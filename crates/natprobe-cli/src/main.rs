//! Command-line NAT type discovery.

use anyhow::Context;
use clap::Parser;

use natprobe_stun::Client;

const DEFAULT_SERVER: &str = "stun.qwq.pink:3478";

/// Discover this host's NAT type and server-reflexive address.
#[derive(Parser, Debug)]
#[command(name = "natprobe", version, about)]
struct Args {
    /// STUN server to probe against (host:port).
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Local address to bind (ip:port; port 0 picks an ephemeral one).
    #[arg(short, long, default_value = "0.0.0.0:0")]
    local: String,

    /// Log each probe and retransmission.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.verbose { "debug" } else { "info" })
        .init();

    let client = Client::new(&args.server, &args.local)
        .await
        .with_context(|| format!("failed to create STUN client for {}", args.server))?;

    let discovery = client
        .discover()
        .await
        .with_context(|| format!("discovery against {} failed", args.server))?;
    client.close();

    println!("NAT Type: {}", discovery.nat_type);
    match discovery.mapped {
        Some(addr) => println!("Address: {addr}"),
        None => println!("Address: unknown"),
    }

    Ok(())
}
