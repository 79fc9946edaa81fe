use std::time::Duration;

use async_std::task::{self, JoinHandle};

use onion_core::{
    config::{ClientConfig, Topology},
    consumer_node::consumer::Consumer,
    crypto::{ClientSecret, SessionKey},
    error::Error,
    protocol::{
        io::{receive_envelope, UdpTransport},
        loopback::{MemoryNetwork, MemoryTransport},
        onion::{Command, Data, Envelope, Onion, Relay, Reply, TorHeader},
    },
    relay_node::relay_node::RelayNode,
    server_node::ServerNode,
};

const CLIENT: u16 = 9000;
const SERVER: u16 = 9001;

fn config() -> ClientConfig {
    ClientConfig {
        receive_timeout: Duration::from_secs(5),
    }
}

/// A relay loop that hands its node back once its port is closed, so the
/// test can look at the circuits it holds.
struct RunningRelay {
    port: u16,
    handle: JoinHandle<RelayNode<MemoryTransport>>,
}

impl RunningRelay {
    fn spawn(mut node: RelayNode<MemoryTransport>) -> Self {
        let port = node.port();
        let handle = task::spawn(async move {
            let _ = node.start().await;
            node
        });
        Self { port, handle }
    }

    async fn stop(self, network: &MemoryNetwork) -> RelayNode<MemoryTransport> {
        network.close(self.port);
        self.handle.await
    }
}

fn spawn_server(network: &MemoryNetwork) {
    let server = ServerNode::new(network.bind(SERVER).unwrap());
    task::spawn(async move {
        let _ = server.start().await;
    });
}

fn spawn_relays(network: &MemoryNetwork, relays: &[Relay]) -> Vec<RunningRelay> {
    relays
        .iter()
        .map(|relay| RunningRelay::spawn(RelayNode::new(relay.id, network.bind(relay.port).unwrap())))
        .collect()
}

fn relays(count: u16) -> Vec<Relay> {
    (0..count)
        .map(|i| Relay {
            id: 2 + i as u32,
            port: 9002 + i,
        })
        .collect()
}

#[async_std::test]
async fn single_relay_peels_and_adds_exactly_one_layer() {
    let network = MemoryNetwork::new();
    let client = network.bind(CLIENT).unwrap();
    let server = network.bind(SERVER).unwrap();
    let mut relay = RelayNode::new(2, network.bind(9002).unwrap());

    let secret = ClientSecret::generate().unwrap();
    let create = Onion::new(
        TorHeader::new(0, Command::Create),
        Data::PublicKey(secret.public_key().to_string()),
        9002,
    );
    relay.handle_envelope(create.into_envelope(CLIENT)).await.unwrap();
    let created = receive_envelope(&client).await.unwrap();
    assert_eq!(created.tor_header, TorHeader::new(0, Command::Created));
    let key: SessionKey = match created.data {
        Data::SessionKey(sealed) => secret.session_key(&sealed).unwrap(),
        other => panic!("expected a session key, got {:?}", other),
    };

    let request = Onion::new(
        TorHeader::new(1, Command::RelayForward),
        Data::Message("hello".to_string()),
        SERVER,
    )
    .seal(&key, TorHeader::new(0, Command::RelayForward), 9002)
    .unwrap();
    relay.handle_envelope(request.into_envelope(CLIENT)).await.unwrap();

    let at_server = receive_envelope(&server).await.unwrap();
    assert_eq!(at_server.tor_header, TorHeader::new(1, Command::RelayForward));
    assert_eq!(at_server.data, Data::Message("hello".to_string()));
    assert_eq!(at_server.sender_port, 9002);

    let response = Envelope::new(
        TorHeader::new(1, Command::RelayBackward),
        Data::Message("hello accepted".to_string()),
        SERVER,
    );
    relay.handle_envelope(response).await.unwrap();

    let at_client = receive_envelope(&client).await.unwrap();
    assert_eq!(at_client.tor_header, TorHeader::new(0, Command::RelayBackward));
    let ciphertext = at_client.data.as_cipher().unwrap();
    assert_eq!(
        Reply::open(&key, ciphertext).unwrap(),
        Data::Message("hello accepted".to_string())
    );
}

#[async_std::test]
async fn one_hop_request_is_answered() {
    let network = MemoryNetwork::new();
    let relays = relays(1);
    spawn_server(&network);
    let running = spawn_relays(&network, &relays);
    let mut consumer = Consumer::new(network.bind(CLIENT).unwrap(), relays, SERVER, config());

    consumer.build_circuit(1).await.unwrap();
    let response = consumer.request("hello").await.unwrap();

    assert_eq!(response, "hello accepted");
    let relay = running.into_iter().next().unwrap().stop(&network).await;
    let circuit = relay.context().by_own_id(0).unwrap();
    assert_eq!(circuit.downstream_port, CLIENT);
    assert_eq!(circuit.upstream_port, Some(SERVER));
    assert_eq!(relay.context().by_next_id(1).unwrap().circuit_id, 0);
}

#[async_std::test]
async fn three_hop_circuit_shares_one_key_per_relay() {
    let network = MemoryNetwork::new();
    let relays = relays(3);
    spawn_server(&network);
    let running = spawn_relays(&network, &relays);
    let mut consumer = Consumer::new(network.bind(CLIENT).unwrap(), relays.clone(), SERVER, config());

    consumer.build_circuit(3).await.unwrap();

    let route = consumer.route().to_vec();
    let circuits = consumer.circuits().to_vec();
    assert_eq!(route.len(), 3);
    assert_eq!(circuits.len(), 3);
    for (hop, circuit) in circuits.iter().enumerate() {
        assert_eq!(circuit.circuit_id, hop as u32);
        assert_eq!(circuit.upstream_port, route[hop].port);
    }
    assert_ne!(circuits[0].session_key, circuits[1].session_key);
    assert_ne!(circuits[1].session_key, circuits[2].session_key);
    assert_ne!(circuits[0].session_key, circuits[2].session_key);

    assert_eq!(consumer.request("hello").await.unwrap(), "hello accepted");

    let mut nodes = Vec::new();
    for relay in running {
        nodes.push(relay.stop(&network).await);
    }
    for (hop, circuit) in circuits.iter().enumerate() {
        let node = nodes
            .iter()
            .find(|node| node.port() == route[hop].port)
            .unwrap();
        let held = node.context().by_own_id(hop as u32).unwrap();
        assert_eq!(held.session_key, circuit.session_key);
        let downstream = if hop == 0 { CLIENT } else { route[hop - 1].port };
        let upstream = route.get(hop + 1).map_or(SERVER, |next| next.port);
        assert_eq!(held.downstream_port, downstream);
        assert_eq!(held.upstream_port, Some(upstream));
        assert_eq!(node.context().by_next_id(hop as u32 + 1).unwrap().circuit_id, hop as u32);
    }
}

#[async_std::test]
async fn one_circuit_carries_several_requests() {
    let network = MemoryNetwork::new();
    let relays = relays(2);
    spawn_server(&network);
    let _running = spawn_relays(&network, &relays);
    let mut consumer = Consumer::new(network.bind(CLIENT).unwrap(), relays, SERVER, config());

    consumer.build_circuit(2).await.unwrap();

    for request in ["first", "second", "third"] {
        let response = consumer.request(request).await.unwrap();
        assert_eq!(response, format!("{} accepted", request));
    }
}

#[async_std::test]
async fn rebuilt_circuit_uses_fresh_ids() {
    let network = MemoryNetwork::new();
    let relays = relays(2);
    spawn_server(&network);
    let _running = spawn_relays(&network, &relays);
    let mut consumer = Consumer::new(network.bind(CLIENT).unwrap(), relays, SERVER, config());

    consumer.build_circuit(2).await.unwrap();
    let first: Vec<u32> = consumer.circuits().iter().map(|c| c.circuit_id).collect();
    consumer.build_circuit(2).await.unwrap();
    let second: Vec<u32> = consumer.circuits().iter().map(|c| c.circuit_id).collect();

    assert_eq!(first, vec![0, 1]);
    assert_eq!(second, vec![3, 4]);
    assert_eq!(consumer.request("again").await.unwrap(), "again accepted");
}

#[async_std::test]
async fn missing_relay_aborts_the_build() {
    let network = MemoryNetwork::new();
    let relays = relays(2);
    spawn_server(&network);
    // Only the first relay is running; the second port has nothing bound.
    let _running = spawn_relays(&network, &relays[..1]);
    let config = ClientConfig {
        receive_timeout: Duration::from_millis(300),
    };
    let mut consumer = Consumer::new(network.bind(CLIENT).unwrap(), relays, SERVER, config);

    let err = consumer.build_circuit(2).await.unwrap_err();

    assert!(matches!(err, Error::BuildAborted { .. }));
    assert!(consumer.circuits().is_empty());
    assert!(matches!(
        consumer.send_request("hello").await,
        Err(Error::Protocol(_))
    ));
}

#[async_std::test]
async fn circuit_over_udp_answers_request() {
    let server = ServerNode::new(UdpTransport::bind(0).await.unwrap());
    let server_port = server.port();
    task::spawn(async move {
        let _ = server.start().await;
    });
    let mut relays = Vec::new();
    for id in 2..5 {
        let mut node = RelayNode::new(id, UdpTransport::bind(0).await.unwrap());
        relays.push(Relay {
            id,
            port: node.port(),
        });
        task::spawn(async move {
            let _ = node.start().await;
        });
    }
    let client = UdpTransport::bind(0).await.unwrap();
    let mut consumer = Consumer::new(client, relays, server_port, config());

    consumer.build_circuit(3).await.unwrap();

    assert_eq!(consumer.request("hello").await.unwrap(), "hello accepted");
}

#[test]
fn topology_lays_out_client_server_and_relays() {
    let topology = Topology::contiguous(10000, 5).unwrap();

    assert_eq!(topology.client_port(), 10000);
    assert_eq!(topology.server_port(), 10001);
    assert_eq!(
        topology.relays(),
        vec![
            Relay { id: 2, port: 10002 },
            Relay { id: 3, port: 10003 },
            Relay { id: 4, port: 10004 },
        ]
    );
}
