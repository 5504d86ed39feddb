use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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
    event: &'static str,
    peer: &'a str,
    size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    endpoint: &'a str,
    framing: &'a str,
}

pub fn print_message(msg: &[u8], peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                event: "message",
                peer,
                size: msg.len(),
                payload: payload_preview(msg),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    peer.to_string(),
                    msg.len().to_string(),
                    payload_preview(msg),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} size={} payload={}",
                peer,
                msg.len(),
                payload_preview(msg)
            );
        }
        OutputFormat::Raw => print_raw(msg),
    }
}

/// Announce the bound endpoint so callers that asked for port 0 can find it.
pub fn print_listening(endpoint: &str, framing: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            endpoint,
            framing,
        }),
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            println!("listening on {endpoint} ({framing})");
        }
    }
    let _ = std::io::stdout().flush();
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
    let _ = std::io::stdout().flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_binary_payloads() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn message_json_shape() {
        let out = MessageOutput {
            event: "message",
            peer: "127.0.0.1:5050",
            size: 2,
            payload: "hi".to_string(),
            timestamp: "0".to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&out).unwrap()).unwrap();
        assert_eq!(value["event"], "message");
        assert_eq!(value["size"], 2);
        assert_eq!(value["payload"], "hi");
    }
}
