use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use msgwire_peer::Client;
use tracing::debug;

use crate::cmd::{parse_duration, PingArgs};
use crate::exit::{dispatch_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::messages::{Ping, Pong};
use crate::output::{print_pong, print_summary, round2, OutputFormat, PingSummary, PongOutput};

const PROCESS_SLICE: Duration = Duration::from_millis(50);

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval, true)?;
    let timeout = parse_duration(&args.timeout, false)?;
    let peer = format!("{}:{}", args.host, args.port);

    let (tx, rx) = mpsc::channel();
    let mut client = Client::new();
    client
        .register::<Pong, _>(move |_, pong| {
            let _ = tx.send(pong.seq);
        })
        .map_err(|err| dispatch_error("register failed", err))?;
    client
        .connect(&args.host, args.port)
        .map_err(|err| peer_error("connect failed", err))?;

    let mut samples = Vec::new();
    for seq in 1..=args.count {
        client
            .send(&Ping { seq })
            .map_err(|err| peer_error("send failed", err))?;

        let rtt = wait_for_pong(&mut client, &rx, seq, timeout)?;
        let rtt_ms = round2(rtt.as_secs_f64() * 1000.0);
        samples.push(rtt_ms);
        debug!(seq, rtt_ms, "pong received");
        print_pong(
            &PongOutput {
                event: "pong",
                seq,
                peer: peer.clone(),
                rtt_ms,
            },
            format,
        );

        if seq < args.count && !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    print_summary(
        &PingSummary::from_samples(peer, args.count, &samples),
        format,
    );
    client.disconnect();
    Ok(SUCCESS)
}

/// Pump the client until the pong for `seq` arrives. Pongs for other
/// sequence numbers are stale and skipped.
fn wait_for_pong(
    client: &mut Client,
    pongs: &Receiver<u32>,
    seq: u32,
    timeout: Duration,
) -> CliResult<Duration> {
    let started = Instant::now();
    loop {
        while let Ok(got) = pongs.try_recv() {
            if got == seq {
                return Ok(started.elapsed());
            }
            debug!(expected = seq, got, "ignoring stale pong");
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(CliError::new(
                TIMEOUT,
                format!("no pong for seq {seq} within {timeout:?}"),
            ));
        }
        if !client.is_connected() && client.queue().is_empty() {
            return Err(CliError::new(FAILURE, "connection closed by peer"));
        }
        client.process_timeout(PROCESS_SLICE.min(timeout - elapsed));
    }
}
