//! Server and client in one process exchanging Ping/Pong.
//!
//! Run with:
//!   cargo run --example ping-pong --features peer

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use msgwire::frame::json_message;
use msgwire::peer::{Client, Server};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Ping {
    seq: u32,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Pong {
    seq: u32,
}

json_message!(Ping);
json_message!(Pong);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let replies = server.sender();
    server.register::<Ping, _>(move |conn, ping| {
        eprintln!("server: {conn} sent ping {}", ping.seq);
        if let Err(err) = replies.send(conn, &Pong { seq: ping.seq }) {
            eprintln!("server: reply failed: {err}");
        }
    })?;
    server.start_on(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), 16)?;
    let port = server.local_addr().map(|addr| addr.port()).unwrap_or(0);
    eprintln!("Listening on 127.0.0.1:{port}");

    let (tx, rx) = mpsc::channel();
    let mut client = Client::new();
    client.register::<Pong, _>(move |_, pong| {
        let _ = tx.send(pong.seq);
    })?;
    client.connect("127.0.0.1", port)?;

    for seq in 1..=3 {
        client.send(&Ping { seq })?;

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            server.process_timeout(Duration::from_millis(10));
            client.process_timeout(Duration::from_millis(10));
            if let Ok(got) = rx.try_recv() {
                eprintln!("client: pong {got}");
                break;
            }
            if Instant::now() >= deadline {
                return Err(format!("no pong for ping {seq}").into());
            }
        }
    }

    client.disconnect();
    server.stop();
    Ok(())
}
