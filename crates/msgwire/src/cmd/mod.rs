use std::net::IpAddr;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod hash;
pub mod ping;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server that answers Ping with Pong.
    Serve(ServeArgs),
    /// Send Ping messages and wait for the matching Pong.
    Ping(PingArgs),
    /// Print the wire type id for message type names.
    Hash(HashArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Hash(args) => hash::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TCP port to listen on (0 picks a free port).
    #[arg(long, short = 'p', env = "MSGWIRE_PORT", default_value = "7878")]
    pub port: u16,
    /// Address to bind.
    #[arg(long, env = "MSGWIRE_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// Listen backlog.
    #[arg(long, default_value = "128")]
    pub backlog: i32,
    /// Close connections beyond this many, newest first.
    #[arg(long)]
    pub max_connections: Option<usize>,
    /// Frame buffer capacity in bytes, header included.
    #[arg(long, default_value = "4096")]
    pub frame_capacity: usize,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
    /// Number of pings to send.
    #[arg(long, short = 'c', default_value = "4")]
    pub count: u32,
    /// Pause between pings (e.g. 500ms, 1s).
    #[arg(long, default_value = "500ms")]
    pub interval: String,
    /// Maximum wait for each pong (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// Message type names.
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;

    if value == 0 && !allow_zero {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
