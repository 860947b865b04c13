use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use portal_server::{ConnectionId, TransportKind};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    connection: &'a str,
    kind: TransportKind,
    size: usize,
    message: &'a str,
    timestamp: String,
}

/// Print one message drained from a listener queue.
pub fn print_message(id: &ConnectionId, kind: TransportKind, message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                connection: id.as_str(),
                kind,
                size: message.len(),
                message,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONNECTION", "KIND", "SIZE", "MESSAGE"])
                .add_row(vec![
                    id.to_string(),
                    kind.to_string(),
                    message.len().to_string(),
                    message.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{id}] {kind} size={} {message}", message.len());
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = writeln!(out, "{message}");
            let _ = out.flush();
        }
    }
}

/// Decoded view of one packet for `portal inspect`.
#[derive(Debug, Serialize)]
pub struct PacketReport {
    pub source: String,
    pub compressed: bool,
    pub encrypted: bool,
    pub checksum: u16,
    pub size: i32,
    pub wire_size: usize,
    /// Whether the header checksum equals the CRC16 of the decoded text.
    pub checksum_matches: Option<bool>,
    pub text: Option<String>,
    pub error: Option<String>,
}

pub fn print_packet(report: &PacketReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in report_rows(report) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in report_rows(report) {
                println!("{field:>16}: {value}");
            }
        }
        OutputFormat::Raw => {
            if let Some(text) = &report.text {
                let mut out = std::io::stdout();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
        }
    }
}

fn report_rows(report: &PacketReport) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("source", report.source.clone()),
        ("compressed", report.compressed.to_string()),
        ("encrypted", report.encrypted.to_string()),
        ("checksum", format!("0x{:04x}", report.checksum)),
        ("size", report.size.to_string()),
        ("wire_size", report.wire_size.to_string()),
    ];
    if let Some(matches) = report.checksum_matches {
        rows.push(("checksum_matches", matches.to_string()));
    }
    if let Some(text) = &report.text {
        rows.push(("text", text.clone()));
    }
    if let Some(error) = &report.error {
        rows.push(("error", error.clone()));
    }
    rows
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
