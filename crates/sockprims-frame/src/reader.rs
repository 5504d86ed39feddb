use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::Bytes;
use tracing::trace;

use crate::config::{FrameConfig, Framing, HeartbeatPolicy};
use crate::error::{FrameError, Result};
use crate::unpack::{DecodeOutcome, Unpacker};

/// Decoded messages waiting to be handed out, plus the failure that ended decoding.
///
/// Messages decoded ahead of a violation are handed out first. After the
/// violation itself has been reported once, every later call reports
/// [`FrameError::Desynchronized`].
#[derive(Debug)]
pub(crate) struct Inbox {
    pending: VecDeque<Bytes>,
    failure: Option<FrameError>,
    desynced: bool,
    heartbeat: HeartbeatPolicy,
}

impl Inbox {
    pub(crate) fn new(heartbeat: HeartbeatPolicy) -> Self {
        Self {
            pending: VecDeque::new(),
            failure: None,
            desynced: false,
            heartbeat,
        }
    }

    pub(crate) fn absorb(&mut self, outcome: DecodeOutcome, unpacker: &Unpacker) {
        for msg in outcome.messages {
            if self.heartbeat == HeartbeatPolicy::Suppress && unpacker.is_heartbeat(&msg) {
                trace!(framing = unpacker.kind(), "heartbeat suppressed");
                continue;
            }
            self.pending.push_back(msg);
        }
        if let Some(err) = outcome.error {
            self.failure = Some(err);
        }
    }

    fn take_failure(&mut self) -> Option<FrameError> {
        if let Some(err) = self.failure.take() {
            self.desynced = true;
            return Some(err);
        }
        self.desynced.then_some(FrameError::Desynchronized)
    }

    pub(crate) fn next(&mut self) -> Option<Result<Bytes>> {
        if let Some(msg) = self.pending.pop_front() {
            return Some(Ok(msg));
        }
        self.take_failure().map(Err)
    }

    pub(crate) fn next_batch(&mut self) -> Option<Result<Vec<Bytes>>> {
        if !self.pending.is_empty() {
            return Some(Ok(self.pending.drain(..).collect()));
        }
        self.take_failure().map(Err)
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.failure = None;
        self.desynced = false;
    }
}

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally. Several messages arriving in one read
/// are queued and returned one per call.
pub struct FrameReader<T> {
    inner: T,
    unpacker: Unpacker,
    inbox: Inbox,
    config: FrameConfig,
    /// Bytes of an interrupted read operation still sitting in the receive region.
    staged: Option<usize>,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader for the default length-prefixed framing.
    pub fn new(inner: T) -> Result<Self> {
        Self::with_config(inner, &Framing::default(), FrameConfig::default())
    }

    /// Create a reader with explicit framing and configuration.
    pub fn with_config(inner: T, framing: &Framing, config: FrameConfig) -> Result<Self> {
        let unpacker = Unpacker::new(framing, &config)?;
        Ok(Self {
            inner,
            unpacker,
            inbox: Inbox::new(config.heartbeat),
            config,
            staged: None,
        })
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// timeout on the underlying stream surfaces as `FrameError::Io` and keeps
    /// any partial message, so the call can be retried.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(next) = self.inbox.next() {
                return next;
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut transferred = match self.staged.take() {
            Some(n) => n,
            None => {
                self.unpacker.prepare_receive_region();
                0
            }
        };

        loop {
            let region = self.unpacker.receive_region();
            let region_len = region.len();
            let hint = self.unpacker.next_read_size(false, transferred);
            if hint == 0 || transferred == region_len {
                break;
            }

            let end = transferred + hint.min(region_len - transferred);
            let region = self.unpacker.receive_region();
            match self.inner.read(&mut region[transferred..end]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => transferred += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    self.staged = Some(transferred);
                    return Err(FrameError::Io(err));
                }
                Err(err) => {
                    self.unpacker.next_read_size(true, transferred);
                    return Err(FrameError::Io(err));
                }
            }
        }

        let outcome = self.unpacker.decode(transferred);
        trace!(
            framing = self.unpacker.kind(),
            transferred,
            messages = outcome.messages.len(),
            retained = outcome.retained,
            "decoded read"
        );
        self.inbox.absorb(outcome, &self.unpacker);
        Ok(())
    }

    /// Drop buffered bytes and queued messages, clearing any earlier violation.
    pub fn reset(&mut self) {
        self.unpacker.reset();
        self.inbox.clear();
        self.staged = None;
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn unpacker(&self) -> &Unpacker {
        &self.unpacker
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TcpStream> {
    /// Create a frame reader for a TCP stream and apply the read timeout from config.
    pub fn with_config_tcp(inner: TcpStream, framing: &Framing, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Self::with_config(inner, framing, config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sockprims_transport::{Endpoint, TcpAcceptor};

    use super::*;
    use crate::config::{ByteOrder, HeaderFormat, HeaderWidth};
    use crate::pack::Packer;

    fn wire(framing: &Framing, config: &FrameConfig, bodies: &[&[u8]]) -> Vec<u8> {
        let packer = Packer::new(framing, config).unwrap();
        let mut out = bytes::BytesMut::new();
        for body in bodies {
            packer.pack(body, &mut out).unwrap();
        }
        out.to_vec()
    }

    #[test]
    fn read_single_message() {
        let config = FrameConfig::default();
        let bytes = wire(&Framing::LengthPrefixed, &config, &[b"hello"]);
        let mut reader = FrameReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"hello"[..]);
    }

    #[test]
    fn read_sticky_messages_one_at_a_time() {
        let config = FrameConfig {
            header: HeaderFormat {
                width: HeaderWidth::U32,
                order: ByteOrder::BigEndian,
            },
            ..FrameConfig::default()
        };
        let bytes = wire(&Framing::LengthPrefixed, &config, &[b"012345", b"0123456789"]);
        assert_eq!(bytes.len(), 24);

        let mut reader = FrameReader::with_config(Cursor::new(bytes), &Framing::LengthPrefixed, config).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"012345"[..]);
        assert_eq!(reader.read_message().unwrap(), &b"0123456789"[..]);
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn partial_read_handling() {
        let config = FrameConfig::default();
        let framing = Framing::prefix_suffix("", "\n");
        let byte_reader = ByteByByteReader {
            bytes: b"slow\nand steady\n".to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::with_config(byte_reader, &framing, config).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"slow"[..]);
        assert_eq!(reader.read_message().unwrap(), &b"and steady"[..]);
    }

    #[test]
    fn non_copy_over_byte_reader() {
        let config = FrameConfig::default();
        let bytes = wire(&Framing::NonCopy, &config, &[b"abc", b"", b"xyz"]);
        let byte_reader = ByteByByteReader { bytes, pos: 0 };
        let mut reader = FrameReader::with_config(byte_reader, &Framing::NonCopy, config).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"abc"[..]);
        assert_eq!(reader.read_message().unwrap(), &b"xyz"[..]);
    }

    #[test]
    fn heartbeats_suppressed_by_default() {
        let config = FrameConfig::default();
        let bytes = wire(&Framing::LengthPrefixed, &config, &[b"", b"real", b""]);
        let mut reader = FrameReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"real"[..]);
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn heartbeats_surface_when_asked() {
        let config = FrameConfig {
            heartbeat: HeartbeatPolicy::Surface,
            ..FrameConfig::default()
        };
        let bytes = wire(&Framing::LengthPrefixed, &config, &[b"", b"real"]);
        let mut reader = FrameReader::with_config(Cursor::new(bytes), &Framing::LengthPrefixed, config).unwrap();
        assert!(reader.read_message().unwrap().is_empty());
        assert_eq!(reader.read_message().unwrap(), &b"real"[..]);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new())).unwrap();
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn connection_closed_mid_message() {
        let mut reader = FrameReader::new(Cursor::new(vec![0, 16, b'p', b'a'])).unwrap();
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn violation_after_good_messages() {
        let config = FrameConfig {
            max_msg_size: 32,
            ..FrameConfig::default()
        };
        let mut bytes = wire(&Framing::LengthPrefixed, &config, &[b"fine"]);
        bytes.extend_from_slice(&[0x10, 0x00]);

        let mut reader = FrameReader::with_config(Cursor::new(bytes), &Framing::LengthPrefixed, config).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"fine"[..]);
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::InvalidLength { len: 4096, .. })
        ));
        assert!(matches!(reader.read_message(), Err(FrameError::Desynchronized)));

        reader.reset();
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn fixed_length_messages() {
        let mut reader = FrameReader::with_config(
            Cursor::new(b"aaaabbbbcc".to_vec()),
            &Framing::FixedLength(4),
            FrameConfig::default(),
        )
        .unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"aaaa"[..]);
        assert_eq!(reader.read_message().unwrap(), &b"bbbb"[..]);
        assert!(matches!(reader.read_message(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn timeout_keeps_partial_message() {
        let reader = StallingReader {
            chunks: vec![Ok(vec![0, 6, b'a']), Err(ErrorKind::WouldBlock), Ok(b"bcd".to_vec())].into(),
        };
        let mut reader = FrameReader::new(reader).unwrap();
        assert!(matches!(reader.read_message(), Err(FrameError::Io(_))));
        assert_eq!(reader.read_message().unwrap(), &b"abcd"[..]);
    }

    #[test]
    fn roundtrip_over_tcp() {
        let acceptor = TcpAcceptor::bind(&Endpoint::new("127.0.0.1", 0)).unwrap();
        let endpoint = acceptor.endpoint().clone();
        let client = std::thread::spawn(move || {
            let stream = sockprims_transport::connect(&endpoint, None).unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream).unwrap();
            writer.send(b"ping").unwrap();
            writer.send(b"pong").unwrap();
        });

        let (stream, _) = acceptor.accept().unwrap();
        let mut reader = FrameReader::with_config_tcp(stream, &Framing::LengthPrefixed, FrameConfig::default()).unwrap();
        assert_eq!(reader.read_message().unwrap(), &b"ping"[..]);
        assert_eq!(reader.read_message().unwrap(), &b"pong"[..]);
        client.join().unwrap();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct StallingReader {
        chunks: VecDeque<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(kind)) => Err(kind.into()),
                None => Ok(0),
            }
        }
    }
}
