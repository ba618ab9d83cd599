use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msgwire_peer::{EndpointConfig, Server};
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{dispatch_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::messages::{Note, Ping, Pong};
use crate::output::{print_listening, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.frame_capacity < msgwire_frame::HEADER_SIZE {
        return Err(CliError::new(
            USAGE,
            format!(
                "frame capacity must be at least {} bytes",
                msgwire_frame::HEADER_SIZE
            ),
        ));
    }

    let config = EndpointConfig {
        frame_capacity: args.frame_capacity,
        ..EndpointConfig::default()
    };
    let mut server = Server::with_config(config);

    let sender = server.sender();
    server
        .register::<Ping, _>(move |conn, ping| {
            debug!(%conn, seq = ping.seq, "ping");
            if let Err(err) = sender.send(conn, &Pong { seq: ping.seq }) {
                warn!(%conn, error = %err, "failed to answer ping");
            }
        })
        .map_err(|err| dispatch_error("register failed", err))?;
    server
        .register::<Note, _>(|conn, note| info!(%conn, text = %note.text, "note"))
        .map_err(|err| dispatch_error("register failed", err))?;

    server
        .start_on(SocketAddr::new(args.bind, args.port), args.backlog)
        .map_err(|err| peer_error("start failed", err))?;
    if let Some(addr) = server.local_addr() {
        print_listening(addr, format);
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        server.process_timeout(POLL_INTERVAL);
        if let Some(max) = args.max_connections {
            enforce_max_connections(&server, max);
        }
    }

    info!(connections = server.get_conn_num(), "shutting down");
    server.stop();
    Ok(SUCCESS)
}

fn enforce_max_connections(server: &Server, max: usize) {
    let ids = server.connection_ids();
    for &id in ids.iter().skip(max) {
        warn!(conn = %id, max, "connection limit reached; closing");
        server.on_stop_connect(id);
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
