use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
    port: u16,
}

pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            addr: addr.to_string(),
            port: addr.port(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("listening on {addr}"),
    }
}

#[derive(Serialize)]
pub struct PongOutput {
    pub event: &'static str,
    pub seq: u32,
    pub peer: String,
    pub rtt_ms: f64,
}

pub fn print_pong(out: &PongOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("pong seq={} from {} time={:.2}ms", out.seq, out.peer, out.rtt_ms)
        }
    }
}

#[derive(Serialize)]
pub struct PingSummary {
    pub event: &'static str,
    pub peer: String,
    pub sent: u32,
    pub received: u32,
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl PingSummary {
    pub fn from_samples(peer: String, sent: u32, samples: &[f64]) -> Self {
        let received = samples.len() as u32;
        let (min_ms, avg_ms, max_ms) = if samples.is_empty() {
            (None, None, None)
        } else {
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = samples.iter().sum::<f64>() / samples.len() as f64;
            (Some(round2(min)), Some(round2(avg)), Some(round2(max)))
        };
        Self {
            event: "summary",
            peer,
            sent,
            received,
            min_ms,
            avg_ms,
            max_ms,
        }
    }
}

pub fn print_summary(out: &PingSummary, format: OutputFormat) {
    let ms = |value: Option<f64>| match value {
        Some(value) => format!("{value:.2}"),
        None => "-".to_string(),
    };
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PEER", "SENT", "RECEIVED", "MIN MS", "AVG MS", "MAX MS"]);
            table.add_row(vec![
                out.peer.clone(),
                out.sent.to_string(),
                out.received.to_string(),
                ms(out.min_ms),
                ms(out.avg_ms),
                ms(out.max_ms),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "{}: {} sent, {} received, min/avg/max = {}/{}/{} ms",
            out.peer,
            out.sent,
            out.received,
            ms(out.min_ms),
            ms(out.avg_ms),
            ms(out.max_ms)
        ),
    }
}

#[derive(Serialize)]
pub struct HashOutput {
    pub name: String,
    pub type_id: u32,
    pub hex: String,
}

pub fn print_hashes(rows: &[HashOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "TYPE ID", "HEX"]);
            for row in rows {
                table.add_row(vec![row.name.clone(), row.type_id.to_string(), row.hex.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!("{}\t{}\t{}", row.name, row.type_id, row.hex);
            }
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_no_samples_has_no_stats() {
        let summary = PingSummary::from_samples("127.0.0.1:1".into(), 3, &[]);
        assert_eq!(summary.received, 0);
        assert!(summary.min_ms.is_none());
        assert!(summary.avg_ms.is_none());
    }

    #[test]
    fn summary_stats_are_rounded() {
        let summary = PingSummary::from_samples("peer".into(), 3, &[1.0, 2.0, 3.333]);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.min_ms, Some(1.0));
        assert_eq!(summary.max_ms, Some(3.33));
        assert_eq!(summary.avg_ms, Some(2.11));
    }

    #[test]
    fn summary_serializes_event_tag() {
        let summary = PingSummary::from_samples("peer".into(), 1, &[0.5]);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["event"], "summary");
        assert_eq!(value["received"], 1);
    }
}
