use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sockprims_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, Framing};
use sockprims_transport::{TcpAcceptor, TransportError};

use crate::cmd::EchoArgs;
use crate::exit::{io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a connection's read loop reacts to a read error.
#[derive(Debug, PartialEq, Eq)]
enum ReadDisposition {
    /// No data yet; check the stop flag and read again.
    Idle,
    /// The peer went away.
    Closed,
    /// The peer broke the wire format.
    Violation,
    Failed,
}

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let (framing, mut config) = args.framing.resolve()?;
    config.read_timeout = Some(POLL_INTERVAL * 4);

    let acceptor =
        TcpAcceptor::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;
    acceptor
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;
    print_listening(&acceptor.endpoint().to_string(), framing.name(), format);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut workers = Vec::new();
    while running.load(Ordering::SeqCst) {
        let (stream, peer) = match acceptor.accept() {
            Ok(accepted) => accepted,
            Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        stream
            .set_nonblocking(false)
            .map_err(|err| io_error("accept failed", err))?;

        let framing = framing.clone();
        let config = config.clone();
        let running = running.clone();
        let worker = thread::Builder::new()
            .name(format!("echo-{peer}"))
            .spawn(move || serve(stream, peer, &framing, config, &running))
            .map_err(|err| io_error("spawn failed", err))?;
        workers.push(worker);
        workers.retain(|worker| !worker.is_finished());
    }

    tracing::info!("echo server stopping");
    for worker in workers {
        let _ = worker.join();
    }
    Ok(SUCCESS)
}

fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    framing: &Framing,
    config: FrameConfig,
    running: &AtomicBool,
) {
    tracing::info!(%peer, "peer connected");
    let setup = stream
        .try_clone()
        .map_err(FrameError::Io)
        .and_then(|read_half| {
            let reader = FrameReader::with_config_tcp(read_half, framing, config.clone())?;
            let writer = FrameWriter::with_config_tcp(stream, framing, config)?;
            Ok((reader, writer))
        });
    let (mut reader, mut writer) = match setup {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(%peer, error = %err, "connection setup failed");
            return;
        }
    };

    while running.load(Ordering::SeqCst) {
        let msg = match reader.read_message() {
            Ok(msg) => msg,
            Err(err) => match classify_read_error(&err) {
                ReadDisposition::Idle => continue,
                ReadDisposition::Closed => break,
                ReadDisposition::Violation => {
                    tracing::warn!(%peer, error = %err, "framing violation, dropping peer");
                    break;
                }
                ReadDisposition::Failed => {
                    tracing::warn!(%peer, error = %err, "read failed");
                    break;
                }
            },
        };

        tracing::info!(%peer, size = msg.len(), "echoing message");
        if let Err(err) = writer.send(&msg) {
            tracing::warn!(%peer, error = %err, "echo send failed");
            break;
        }
    }
    tracing::info!(%peer, "peer disconnected");
}

fn classify_read_error(err: &FrameError) -> ReadDisposition {
    match err {
        FrameError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            ReadDisposition::Idle
        }
        FrameError::ConnectionClosed | FrameError::EndOfStream => ReadDisposition::Closed,
        err if err.is_violation() => ReadDisposition::Violation,
        _ => ReadDisposition::Failed,
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
