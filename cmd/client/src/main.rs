use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use onion_core::{
    config::{ClientConfig, Topology},
    consumer_node::consumer::Consumer,
    logging,
    protocol::io::UdpTransport,
};

/// Builds a circuit through running relays and sends requests over it.
///
/// Ports follow the simulation layout: the client on `start-port`, the server
/// one above it and `node-count - 2` relays after that.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// First port of the layout; the client binds it.
    #[arg(long)]
    start_port: u16,

    /// Number of nodes in the layout, client and server included.
    #[arg(long, short = 'N')]
    node_count: usize,

    /// Number of relays in the circuit.
    #[arg(long, short = 'R', default_value_t = 3)]
    hops: usize,

    /// Requests to send, in order, over one circuit.
    #[arg(required = true)]
    requests: Vec<String>,

    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let topology = Topology::contiguous(args.start_port, args.node_count)?;
    let transport = UdpTransport::bind(topology.client_port())
        .await
        .with_context(|| format!("binding client to port {}", topology.client_port()))?;
    let config = ClientConfig {
        receive_timeout: Duration::from_secs(args.timeout),
    };
    let mut consumer = Consumer::new(transport, topology.relays(), topology.server_port(), config);

    consumer.build_circuit(args.hops).await?;
    for request in &args.requests {
        let response = consumer.request(request).await?;
        println!("{}", response);
    }
    Ok(())
}
