#![cfg(unix)]

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use msgwire_frame::{
    encode_frame, json_message, type_hash, FrameHeader, Message, MessageError,
    DEFAULT_FRAME_CAPACITY,
};
use msgwire_peer::{Client, ConnectionId, EndpointConfig, PeerError, Server};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    seq: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Pong {
    seq: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    values: Vec<i64>,
    flag: bool,
    nested: Option<Box<Sample>>,
}

/// Carries no body at all.
#[derive(Debug, Default, Clone, PartialEq)]
struct Heartbeat;

impl Message for Heartbeat {
    const TYPE_NAME: &'static str = "Heartbeat";

    fn byte_size(&self) -> usize {
        0
    }

    fn serialize_into(&self, _buf: &mut [u8]) -> Result<usize, MessageError> {
        Ok(0)
    }

    fn parse_from(&mut self, buf: &[u8]) -> Result<(), MessageError> {
        if buf.is_empty() {
            return Ok(());
        }
        Err(MessageError::Decode {
            type_name: Self::TYPE_NAME,
            reason: format!("unexpected {} byte body", buf.len()),
        })
    }
}

json_message!(Ping);
json_message!(Pong);
json_message!(Sample);

type Seen<T> = Arc<Mutex<Vec<(ConnectionId, T)>>>;

fn recorder<T: Send + 'static>() -> (Seen<T>, impl FnMut(ConnectionId, T) + Send + 'static) {
    let seen: Seen<T> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |conn, value| {
        sink.lock().expect("recorder lock").push((conn, value))
    })
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn start_server(server: &mut Server) -> u16 {
    server
        .start_on(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), 16)
        .expect("server should start");
    server.local_addr().expect("server should be bound").port()
}

fn pump_server(server: &mut Server, until: impl Fn() -> bool) {
    assert!(
        wait_until(|| {
            server.process_timeout(Duration::from_millis(10));
            until()
        }),
        "server never observed expected frames"
    );
}

fn pump_client(client: &mut Client, until: impl Fn() -> bool) {
    assert!(
        wait_until(|| {
            client.process_timeout(Duration::from_millis(10));
            until()
        }),
        "client never observed expected frames"
    );
}

#[test]
fn ping_pong_round_trip() {
    let mut server = Server::new();
    let sender = server.sender();
    let (server_seen, mut record) = recorder::<Ping>();
    server
        .register::<Ping, _>(move |conn, ping: Ping| {
            let seq = ping.seq;
            record(conn, ping);
            sender
                .send(conn, &Pong { seq })
                .expect("reply should be sent");
        })
        .expect("Ping registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    let (client_seen, record) = recorder::<Pong>();
    client.register::<Pong, _>(record).expect("Pong registers");
    client.connect("127.0.0.1", port).expect("client should connect");

    client.send(&Ping { seq: 7 }).expect("ping should send");

    pump_server(&mut server, || server_seen.lock().unwrap().len() == 1);
    {
        let seen = server_seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Ping { seq: 7 });
    }

    pump_client(&mut client, || client_seen.lock().unwrap().len() == 1);
    let seen = client_seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[(ConnectionId(1), Pong { seq: 7 })]);
}

#[test]
fn structured_value_arrives_deep_equal() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Sample>();
    server.register::<Sample, _>(record).expect("Sample registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    client.connect("localhost", port).expect("client should connect");

    let value = Sample {
        name: "outer".into(),
        values: vec![-1, 0, i64::MAX],
        flag: true,
        nested: Some(Box::new(Sample {
            name: "inner".into(),
            ..Sample::default()
        })),
    };
    client.send(&value).expect("sample should send");

    pump_server(&mut server, || seen.lock().unwrap().len() == 1);
    assert_eq!(seen.lock().unwrap()[0].1, value);
}

#[test]
fn frames_from_one_connection_keep_order() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Ping>();
    server.register::<Ping, _>(record).expect("Ping registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    client.connect("127.0.0.1", port).expect("client should connect");
    for seq in 0..200 {
        client.send(&Ping { seq }).expect("ping should send");
    }

    pump_server(&mut server, || seen.lock().unwrap().len() == 200);
    let seqs: Vec<u32> = seen.lock().unwrap().iter().map(|(_, p)| p.seq).collect();
    assert_eq!(seqs, (0..200).collect::<Vec<_>>());
}

#[test]
fn empty_body_message_dispatches_after_header() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Heartbeat>();
    server
        .register::<Heartbeat, _>(record)
        .expect("Heartbeat registers");
    let port = start_server(&mut server);

    let mut wire = bytes::BytesMut::new();
    FrameHeader::new(type_hash("Heartbeat"), 0).encode(&mut wire);
    assert_eq!(wire.len(), 8);

    let mut raw = TcpStream::connect(("127.0.0.1", port)).expect("raw connect");
    raw.write_all(&wire).expect("header should send");
    pump_server(&mut server, || seen.lock().unwrap().len() == 1);

    let mut client = Client::new();
    client.connect("127.0.0.1", port).expect("client should connect");
    client.send(&Heartbeat).expect("heartbeat should send");
    pump_server(&mut server, || seen.lock().unwrap().len() == 2);
    assert_eq!(server.get_conn_num(), 2);
}

#[test]
fn zero_length_frame_completes_after_header() {
    let mut server = Server::new();
    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);
    server
        .register::<Ping, _>(move |_, _| *counter.lock().unwrap() += 1)
        .expect("Ping registers");
    let port = start_server(&mut server);

    let mut raw = TcpStream::connect(("127.0.0.1", port)).expect("raw connect");
    let mut wire = bytes::BytesMut::new();
    FrameHeader::new(type_hash("Ping"), 0).encode(&mut wire);
    raw.write_all(&wire).expect("header should send");

    // The frame is complete with no body bytes; it reaches the queue even
    // though an empty body is not a valid Ping.
    assert!(wait_until(|| server.queue().len() == 1));
    assert_eq!(server.process(), 0);
    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(server.get_conn_num(), 1);
}

#[test]
fn unknown_type_and_bad_body_are_dropped_without_closing() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Ping>();
    server.register::<Ping, _>(record).expect("Ping registers");
    let port = start_server(&mut server);

    let mut raw = TcpStream::connect(("127.0.0.1", port)).expect("raw connect");
    let mut wire = bytes::BytesMut::new();
    encode_frame(type_hash("Nobody"), b"{}", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
    encode_frame(type_hash("Ping"), b"not json", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
    encode_frame(type_hash("Ping"), br#"{"seq":3}"#, DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
    raw.write_all(&wire).expect("frames should send");

    pump_server(&mut server, || seen.lock().unwrap().len() == 1);
    assert_eq!(seen.lock().unwrap()[0].1, Ping { seq: 3 });
    assert_eq!(server.get_conn_num(), 1);
}

#[test]
fn oversized_frame_closes_only_that_connection() {
    let config = EndpointConfig {
        frame_capacity: 64,
        ..EndpointConfig::default()
    };
    let mut server = Server::with_config(config);
    let (seen, record) = recorder::<Ping>();
    server.register::<Ping, _>(record).expect("Ping registers");
    let port = start_server(&mut server);

    let mut good = Client::new();
    good.connect("127.0.0.1", port).expect("good client connects");
    let mut bad = TcpStream::connect(("127.0.0.1", port)).expect("raw connect");
    assert!(wait_until(|| server.get_conn_num() == 2));

    let mut wire = bytes::BytesMut::new();
    FrameHeader::new(type_hash("Ping"), 4096).encode(&mut wire);
    bad.write_all(&wire).expect("oversized header should send");

    assert!(wait_until(|| server.get_conn_num() == 1));
    bad.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(bad.read(&mut buf).unwrap_or(0), 0);

    good.send(&Ping { seq: 11 }).expect("good client still sends");
    pump_server(&mut server, || seen.lock().unwrap().len() == 1);
    assert_eq!(seen.lock().unwrap()[0].1, Ping { seq: 11 });
}

#[test]
fn on_stop_connect_is_idempotent() {
    let mut server = Server::new();
    let port = start_server(&mut server);

    let mut client = Client::new();
    client.connect("127.0.0.1", port).expect("client should connect");
    assert!(wait_until(|| server.get_conn_num() == 1));
    let id = server.connection_ids()[0];

    server.on_stop_connect(id);
    assert_eq!(server.get_conn_num(), 0);
    server.on_stop_connect(id);
    server.on_stop_connect(ConnectionId(9999));
    assert_eq!(server.get_conn_num(), 0);

    assert!(wait_until(|| !client.is_connected()));
    assert!(matches!(
        server.send(id, &Ping { seq: 1 }),
        Err(PeerError::UnknownConnection(_))
    ));
}

#[test]
fn conn_num_tracks_open_connections() {
    let mut server = Server::new();
    let port = start_server(&mut server);
    assert_eq!(server.get_conn_num(), 0);

    let mut clients: Vec<Client> = (0..4)
        .map(|_| {
            let mut client = Client::new();
            client.connect("127.0.0.1", port).expect("client should connect");
            client
        })
        .collect();
    assert!(wait_until(|| server.get_conn_num() == 4));

    clients.pop().expect("client").disconnect();
    assert!(wait_until(|| server.get_conn_num() == 3));

    let id = server.connection_ids()[0];
    server.on_stop_connect(id);
    assert_eq!(server.get_conn_num(), 2);

    drop(clients);
    assert!(wait_until(|| server.get_conn_num() == 0));
}

#[test]
fn broadcast_reaches_every_connection() {
    let mut server = Server::new();
    let port = start_server(&mut server);

    let mut clients = Vec::new();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let mut client = Client::new();
        let (pongs, record) = recorder::<Pong>();
        client.register::<Pong, _>(record).expect("Pong registers");
        client.connect("127.0.0.1", port).expect("client should connect");
        clients.push(client);
        seen.push(pongs);
    }
    assert!(wait_until(|| server.get_conn_num() == 3));

    assert_eq!(server.broadcast(&Pong { seq: 42 }).expect("broadcast"), 3);
    for (client, pongs) in clients.iter_mut().zip(&seen) {
        pump_client(client, || pongs.lock().unwrap().len() == 1);
        assert_eq!(pongs.lock().unwrap()[0].1, Pong { seq: 42 });
    }
}

#[test]
fn concurrent_senders_never_interleave_frames() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Sample>();
    server.register::<Sample, _>(record).expect("Sample registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    let (pongs, record) = recorder::<Pong>();
    client.register::<Pong, _>(record).expect("Pong registers");
    client.connect("127.0.0.1", port).expect("client should connect");
    assert!(wait_until(|| server.get_conn_num() == 1));
    let id = server.connection_ids()[0];

    let senders: Vec<_> = (0..4)
        .map(|t| {
            let sender = server.sender();
            thread::spawn(move || {
                for seq in 0..50 {
                    sender
                        .send(id, &Pong { seq: t * 1000 + seq })
                        .expect("send from worker");
                }
            })
        })
        .collect();
    for handle in senders {
        handle.join().expect("sender thread");
    }

    pump_client(&mut client, || pongs.lock().unwrap().len() == 200);
    assert!(seen.lock().unwrap().is_empty());
    assert!(client.is_connected());
}

#[test]
fn stop_releases_handlers_and_queue() {
    let mut server = Server::new();
    let (seen, record) = recorder::<Ping>();
    server.register::<Ping, _>(record).expect("Ping registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    client.connect("127.0.0.1", port).expect("client should connect");
    client.send(&Ping { seq: 1 }).expect("ping should send");
    assert!(wait_until(|| server.queue().len() == 1));

    server.stop();
    assert!(server.queue().is_empty());
    assert_eq!(server.process(), 0);
    assert!(seen.lock().unwrap().is_empty());

    // Handlers were released, so the type can be registered again.
    server
        .register::<Ping, _>(|_, _| {})
        .expect("Ping registers again after stop");
}

#[test]
fn client_reconnects_with_handlers_intact() {
    let mut server = Server::new();
    let sender = server.sender();
    server
        .register::<Ping, _>(move |conn, ping: Ping| {
            sender
                .send(conn, &Pong { seq: ping.seq })
                .expect("reply should be sent");
        })
        .expect("Ping registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    let (seen, record) = recorder::<Pong>();
    client.register::<Pong, _>(record).expect("Pong registers");
    client.connect("127.0.0.1", port).expect("client should connect");
    assert!(wait_until(|| server.get_conn_num() == 1));

    server.on_stop_connect(server.connection_ids()[0]);
    assert!(wait_until(|| !client.is_connected()));

    client.connect("127.0.0.1", port).expect("client should reconnect");
    assert!(client.is_connected());
    client.send(&Ping { seq: 3 }).expect("ping should send");

    assert!(wait_until(|| {
        server.process_timeout(Duration::from_millis(10));
        client.process();
        !seen.lock().unwrap().is_empty()
    }));
    assert_eq!(seen.lock().unwrap()[0].1, Pong { seq: 3 });
}

#[test]
fn handlers_run_on_the_processing_thread() {
    let caller = thread::current().id();

    let mut server = Server::new();
    let sender = server.sender();
    let server_threads = Arc::new(Mutex::new(Vec::new()));
    let record_server = Arc::clone(&server_threads);
    server
        .register::<Ping, _>(move |conn, ping: Ping| {
            record_server.lock().unwrap().push(thread::current().id());
            sender
                .send(conn, &Pong { seq: ping.seq })
                .expect("reply should be sent");
        })
        .expect("Ping registers");
    let port = start_server(&mut server);

    let mut client = Client::new();
    let client_threads = Arc::new(Mutex::new(Vec::new()));
    let record_client = Arc::clone(&client_threads);
    client
        .register::<Pong, _>(move |_, _: Pong| {
            record_client.lock().unwrap().push(thread::current().id());
        })
        .expect("Pong registers");
    client.connect("127.0.0.1", port).expect("client should connect");

    for seq in 0..3 {
        client.send(&Ping { seq }).expect("ping should send");
    }

    pump_server(&mut server, || server_threads.lock().unwrap().len() == 3);
    pump_client(&mut client, || client_threads.lock().unwrap().len() == 3);
    assert!(server_threads.lock().unwrap().iter().all(|id| *id == caller));
    assert!(client_threads.lock().unwrap().iter().all(|id| *id == caller));
}

#[test]
fn client_closes_on_frame_larger_than_its_capacity() {
    let mut server = Server::new();
    let port = start_server(&mut server);

    let config = EndpointConfig {
        frame_capacity: 64,
        ..EndpointConfig::default()
    };
    let mut client = Client::with_config(config);
    let (seen, record) = recorder::<Sample>();
    client.register::<Sample, _>(record).expect("Sample registers");
    client.connect("127.0.0.1", port).expect("client should connect");
    assert!(wait_until(|| server.get_conn_num() == 1));

    let big = Sample {
        name: "x".repeat(200),
        ..Sample::default()
    };
    server
        .send(server.connection_ids()[0], &big)
        .expect("server capacity fits the frame");

    assert!(wait_until(|| !client.is_connected()));
    assert!(wait_until(|| server.get_conn_num() == 0));
    assert_eq!(client.process(), 0);
    assert!(seen.lock().unwrap().is_empty());
}
