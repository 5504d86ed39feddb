//! Minimal echo server: accepts one peer and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:5050 --data hello --wait

use sockprims::frame::{FrameConfig, FrameError, FrameReader, FrameWriter, Framing};
use sockprims::transport::{Endpoint, TcpAcceptor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let acceptor = TcpAcceptor::bind(&Endpoint::default())?;
    eprintln!("Listening on {}", acceptor.endpoint());

    let (stream, peer) = acceptor.accept()?;
    eprintln!("Peer connected: {peer}");

    let framing = Framing::LengthPrefixed;
    let config = FrameConfig::default();
    let mut reader = FrameReader::with_config(stream.try_clone()?, &framing, config.clone())?;
    let mut writer = FrameWriter::with_config(stream, &framing, config)?;

    loop {
        match reader.read_message() {
            Ok(msg) => {
                eprintln!("Received {} bytes", msg.len());
                writer.send(&msg)?;
            }
            Err(FrameError::ConnectionClosed) => {
                eprintln!("Peer disconnected");
                break;
            }
            Err(e) => {
                eprintln!("Dropping peer: {e}");
                break;
            }
        }
    }

    Ok(())
}
