use std::time::Duration;

use anyhow::Context;
use async_std::task;
use clap::Parser;
use onion_core::{
    config::{ClientConfig, Topology},
    consumer_node::consumer::Consumer,
    logging,
    protocol::io::UdpTransport,
    relay_node::relay_node::RelayNode,
    server_node::{self, ServerNode},
};
use rand::Rng;
use tracing::{error, info};

/// Runs a whole simulation in one process: a server, `N - 2` relays and a
/// client, each as its own task on a loopback UDP port.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of nodes, client and server included.
    #[arg(short = 'N', long, default_value_t = 5)]
    node_count: usize,

    /// Number of relays in the circuit.
    #[arg(short = 'R', long, default_value_t = 3)]
    hops: usize,

    /// Request sent through the circuit.
    #[arg(short = 'C', long, default_value = "hello")]
    request: String,

    /// Text the server appends to every request to form its response.
    #[arg(short = 'S', long, default_value = server_node::DEFAULT_SUFFIX)]
    suffix: String,

    /// First port of the layout. Picked at random in 10000..=11000 when absent.
    #[arg(long)]
    start_port: Option<u16>,

    /// Seconds the client waits for each reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let start_port = args
        .start_port
        .unwrap_or_else(|| rand::thread_rng().gen_range(10000..=11000));
    let topology = Topology::contiguous(start_port, args.node_count)?;
    info!(
        "launching {} nodes on ports {}..{}",
        topology.node_count(),
        start_port,
        topology.port_of(topology.node_count() - 1)
    );

    let server = ServerNode::with_suffix(bind(topology.server_port()).await?, args.suffix);
    task::spawn(async move {
        if let Err(err) = server.start().await {
            error!("server stopped: {}", err);
        }
    });

    for relay in topology.relays() {
        let mut node = RelayNode::new(relay.id, bind(relay.port).await?);
        task::spawn(async move {
            if let Err(err) = node.start().await {
                error!(relay = relay.id, "relay stopped: {}", err);
            }
        });
    }

    let config = ClientConfig {
        receive_timeout: Duration::from_secs(args.timeout),
    };
    let mut consumer = Consumer::new(
        bind(topology.client_port()).await?,
        topology.relays(),
        topology.server_port(),
        config,
    );

    consumer
        .build_circuit(args.hops)
        .await
        .context("building circuit")?;
    let response = consumer
        .request(&args.request)
        .await
        .context("sending request")?;
    println!("{}", response);
    Ok(())
}

async fn bind(port: u16) -> anyhow::Result<UdpTransport> {
    UdpTransport::bind(port)
        .await
        .with_context(|| format!("binding port {}", port))
}
