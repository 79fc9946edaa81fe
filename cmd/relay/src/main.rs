use anyhow::Context;
use clap::Parser;
use onion_core::{
    logging,
    protocol::{io::UdpTransport, onion::RelayId},
    relay_node::relay_node::RelayNode,
};

/// Runs one onion relay on a loopback UDP port.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Relay id, used in logs and route descriptions.
    #[arg(long)]
    id: RelayId,

    /// Port to listen on.
    #[arg(long)]
    port: u16,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let transport = UdpTransport::bind(args.port)
        .await
        .with_context(|| format!("binding relay {} to port {}", args.id, args.port))?;
    let mut node = RelayNode::new(args.id, transport);

    node.start().await?;
    Ok(())
}
