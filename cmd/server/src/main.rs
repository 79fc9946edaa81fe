use anyhow::Context;
use clap::Parser;
use onion_core::{
    logging,
    protocol::io::UdpTransport,
    server_node::{self, ServerNode},
};

/// Runs the server that answers requests arriving through circuits.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long)]
    port: u16,

    /// Text appended to every request to form its response.
    #[arg(short = 'S', long, default_value = server_node::DEFAULT_SUFFIX)]
    suffix: String,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let transport = UdpTransport::bind(args.port)
        .await
        .with_context(|| format!("binding server to port {}", args.port))?;

    ServerNode::with_suffix(transport, args.suffix).start().await?;
    Ok(())
}
