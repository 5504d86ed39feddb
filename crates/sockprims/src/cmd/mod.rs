use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use sockprims_frame::{
    ByteOrder, FrameConfig, Framing, HeaderFormat, HeaderWidth, HeartbeatPolicy,
    DEFAULT_MAX_MSG_SIZE,
};
use sockprims_transport::Endpoint;

use crate::exit::{frame_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod connect;
pub mod echo;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a blocking echo server, one thread per connection.
    Echo(EchoArgs),
    /// Send a single message, optionally waiting for one reply.
    Send(SendArgs),
    /// Hold a self-reconnecting link open and print what arrives.
    Connect(ConnectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Connect(args) => connect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FramingKind {
    LengthPrefixed,
    FixedLength,
    PrefixSuffix,
    NonCopy,
    Stream,
    Datagram,
}

/// Wire format options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct FramingArgs {
    /// Wire format.
    #[arg(long, value_enum, default_value = "length-prefixed")]
    pub framing: FramingKind,
    /// Length header width in bytes (1, 2, 4 or 8).
    #[arg(long, default_value_t = 2)]
    pub header_width: usize,
    /// Encode length headers little-endian.
    #[arg(long)]
    pub little_endian: bool,
    /// Message size for fixed-length framing.
    #[arg(long, value_name = "BYTES")]
    pub fixed_length: Option<usize>,
    /// Prefix for prefix-suffix framing (escapes: \n \r \t \0 \\ \xNN).
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Suffix for prefix-suffix framing (escapes as for --prefix).
    #[arg(long, default_value = "\\n")]
    pub suffix: String,
    /// Maximum message size, header and delimiters included.
    #[arg(long, default_value_t = DEFAULT_MAX_MSG_SIZE)]
    pub max_msg_size: usize,
    /// Deliver empty messages instead of dropping them as heartbeats.
    #[arg(long)]
    pub surface_heartbeats: bool,
}

impl FramingArgs {
    /// Build and validate the framing selected on the command line.
    pub fn resolve(&self) -> CliResult<(Framing, FrameConfig)> {
        let width = HeaderWidth::from_bytes(self.header_width).ok_or_else(|| {
            CliError::usage(format!(
                "--header-width must be 1, 2, 4 or 8 (got {})",
                self.header_width
            ))
        })?;
        let config = FrameConfig {
            max_msg_size: self.max_msg_size,
            header: HeaderFormat {
                width,
                order: if self.little_endian {
                    ByteOrder::LittleEndian
                } else {
                    ByteOrder::BigEndian
                },
            },
            heartbeat: if self.surface_heartbeats {
                HeartbeatPolicy::Surface
            } else {
                HeartbeatPolicy::Suppress
            },
            ..FrameConfig::default()
        };

        let framing = match self.framing {
            FramingKind::LengthPrefixed => Framing::LengthPrefixed,
            FramingKind::FixedLength => {
                let len = self.fixed_length.ok_or_else(|| {
                    CliError::usage("--framing fixed-length requires --fixed-length")
                })?;
                Framing::FixedLength(len)
            }
            FramingKind::PrefixSuffix => {
                Framing::prefix_suffix(unescape(&self.prefix)?, unescape(&self.suffix)?)
            }
            FramingKind::NonCopy => Framing::NonCopy,
            FramingKind::Stream => Framing::Stream,
            FramingKind::Datagram => Framing::Datagram,
        };

        framing
            .validate(&config)
            .map_err(|err| frame_error("invalid framing options", err))?;
        Ok((framing, config))
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (host:port; port 0 picks a free port).
    pub addr: Endpoint,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port).
    pub addr: Endpoint,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Connect timeout, and reply timeout with --wait (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Address to connect to (host:port).
    pub addr: Endpoint,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Message to send on every (re)connect. Repeatable.
    #[arg(long)]
    pub data: Vec<String>,
    /// Delay between reconnect attempts (e.g. 500ms, 2s).
    #[arg(long, default_value = "500ms")]
    pub reconnect_delay: String,
    /// Give up after N consecutive failed reconnects.
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Do not reconnect when the link drops.
    #[arg(long)]
    pub no_reconnect: bool,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
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
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Decode `\n`, `\r`, `\t`, `\0`, `\\` and `\xNN` escapes into bytes.
pub fn unescape(input: &str) -> CliResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hex = [bytes.next(), bytes.next()];
                let value = match hex {
                    [Some(hi), Some(lo)] => std::str::from_utf8(&[hi, lo])
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok()),
                    _ => None,
                };
                out.push(value.ok_or_else(|| {
                    CliError::usage(format!("invalid \\x escape in {input:?}"))
                })?);
            }
            Some(other) => {
                return Err(CliError::usage(format!(
                    "unknown escape \\{} in {input:?}",
                    other as char
                )))
            }
            None => return Err(CliError::usage(format!("dangling \\ in {input:?}"))),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framing_args() -> FramingArgs {
        FramingArgs {
            framing: FramingKind::LengthPrefixed,
            header_width: 2,
            little_endian: false,
            fixed_length: None,
            prefix: String::new(),
            suffix: "\\n".to_string(),
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            surface_heartbeats: false,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn unescape_handles_common_escapes() {
        assert_eq!(unescape("\\r\\n").unwrap(), b"\r\n");
        assert_eq!(unescape("<\\x02>").unwrap(), b"<\x02>");
        assert_eq!(unescape("a\\\\b").unwrap(), b"a\\b");
        assert!(unescape("\\q").is_err());
        assert!(unescape("\\x4").is_err());
        assert!(unescape("end\\").is_err());
    }

    #[test]
    fn resolves_default_length_prefixed() {
        let (framing, config) = framing_args().resolve().unwrap();
        assert_eq!(framing, Framing::LengthPrefixed);
        assert_eq!(config.header, HeaderFormat::default());
        assert_eq!(config.heartbeat, HeartbeatPolicy::Suppress);
    }

    #[test]
    fn resolves_prefix_suffix_with_escapes() {
        let args = FramingArgs {
            framing: FramingKind::PrefixSuffix,
            prefix: "\\x02".to_string(),
            suffix: "\\x03".to_string(),
            ..framing_args()
        };
        let (framing, _) = args.resolve().unwrap();
        assert_eq!(framing, Framing::prefix_suffix(vec![2u8], vec![3u8]));
    }

    #[test]
    fn fixed_length_requires_size() {
        let args = FramingArgs {
            framing: FramingKind::FixedLength,
            ..framing_args()
        };
        assert_eq!(args.resolve().unwrap_err().code, crate::exit::USAGE);
    }

    #[test]
    fn rejects_bad_header_width_and_empty_suffix() {
        let args = FramingArgs {
            header_width: 3,
            ..framing_args()
        };
        assert_eq!(args.resolve().unwrap_err().code, crate::exit::USAGE);

        let args = FramingArgs {
            framing: FramingKind::PrefixSuffix,
            suffix: String::new(),
            ..framing_args()
        };
        assert_eq!(args.resolve().unwrap_err().code, crate::exit::USAGE);
    }
}
