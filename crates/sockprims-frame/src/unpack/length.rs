use bytes::Bytes;

use super::{DecodeOutcome, MAX_READ_HINT};
use crate::buffer::RecvBuffer;
use crate::config::{FrameConfig, HeaderFormat};
use crate::error::FrameError;

/// `[length header][body]` decoder.
///
/// The header carries the total frame length. One decode call emits every
/// complete frame in the buffer, so coalesced deliveries never stall.
#[derive(Debug)]
pub struct LengthPrefixed {
    buf: RecvBuffer,
    header: HeaderFormat,
    strip: bool,
    /// Total length of the frame at the front of the buffer, once its header is in.
    cur_len: Option<u64>,
}

impl LengthPrefixed {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            buf: RecvBuffer::new(config.max_msg_size),
            header: config.header,
            strip: config.strip,
            cur_len: None,
        }
    }

    /// Total length of the frame being received, if its header has arrived.
    pub fn current_msg_len(&self) -> Option<u64> {
        self.cur_len
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.cur_len = None;
    }

    fn is_valid_len(&self, len: u64) -> bool {
        len >= self.header.len() as u64 && len <= self.buf.capacity() as u64
    }

    pub fn next_read_size(&mut self, failed: bool, transferred: usize) -> usize {
        if failed {
            return 0;
        }

        let data = self.buf.staged(transferred);
        if self.cur_len.is_none() && data.len() >= self.header.len() {
            self.cur_len = Some(self.header.read(data));
        }

        match self.cur_len {
            // stop reading, decode reports the violation
            Some(len) if !self.is_valid_len(len) => 0,
            Some(len) if data.len() as u64 >= len => 0,
            _ => MAX_READ_HINT,
        }
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        if let Err(err) = self.buf.commit(transferred) {
            out.error = Some(err);
            out.retained = self.buf.len();
            return out;
        }

        let head_len = self.header.len();
        let max = self.buf.capacity();
        let data = self.buf.filled();
        let mut consumed = 0;

        loop {
            let rest = &data[consumed..];
            match self.cur_len {
                Some(len) if len < head_len as u64 || len > max as u64 => {
                    out.error = Some(FrameError::InvalidLength {
                        len,
                        min: head_len,
                        max,
                    });
                    break;
                }
                Some(len) => {
                    let len = len as usize;
                    if rest.len() < len {
                        break;
                    }
                    let msg = if self.strip {
                        &rest[head_len..len]
                    } else {
                        &rest[..len]
                    };
                    out.messages.push(Bytes::copy_from_slice(msg));
                    consumed += len;
                    self.cur_len = None;
                }
                None if rest.len() >= head_len => self.cur_len = Some(self.header.read(rest)),
                None => break,
            }
        }

        if consumed == 0 && out.error.is_none() {
            out.error = Some(FrameError::NoProgress {
                buffered: data.len(),
            });
        }

        self.buf.consume(consumed);
        out.retained = self.buf.len();
        out
    }

    pub fn receive_region(&mut self) -> &mut [u8] {
        self.buf.writable()
    }

    pub fn is_heartbeat(&self, msg: &[u8]) -> bool {
        if self.strip {
            msg.is_empty()
        } else {
            msg.len() == self.header.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::config::{ByteOrder, HeaderWidth};

    fn wide_config() -> FrameConfig {
        FrameConfig {
            header: HeaderFormat {
                width: HeaderWidth::U32,
                order: ByteOrder::BigEndian,
            },
            ..FrameConfig::default()
        }
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        out.put_u32(body.len() as u32 + 4);
        out.put_slice(body);
        out.to_vec()
    }

    /// Write one delivery into the region, then decode if the oracle says so.
    fn deliver(unpacker: &mut LengthPrefixed, bytes: &[u8]) -> Option<DecodeOutcome> {
        unpacker.receive_region()[..bytes.len()].copy_from_slice(bytes);
        if unpacker.next_read_size(false, bytes.len()) == 0 {
            Some(unpacker.decode(bytes.len()))
        } else {
            None
        }
    }

    #[test]
    fn sticky_packet_yields_both_messages() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let mut wire = frame(b"012345");
        wire.extend(frame(b"0123456789"));
        assert_eq!(wire.len(), 10 + 14);

        let out = deliver(&mut unpacker, &wire).expect("oracle should stop");
        assert!(out.is_ok());
        assert_eq!(out.messages, vec![&b"012345"[..], &b"0123456789"[..]]);
        assert_eq!(out.retained, 0);
    }

    #[test]
    fn partial_header_requests_more() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let wire = frame(b"hello");

        assert!(deliver(&mut unpacker, &wire[..2]).is_none());
        assert_eq!(unpacker.current_msg_len(), None);
        // the same read continues: 2 staged + 4 more
        unpacker.receive_region()[2..6].copy_from_slice(&wire[2..6]);
        assert_eq!(unpacker.next_read_size(false, 6), MAX_READ_HINT);
        assert_eq!(unpacker.current_msg_len(), Some(9));

        unpacker.receive_region()[6..9].copy_from_slice(&wire[6..9]);
        assert_eq!(unpacker.next_read_size(false, 9), 0);
        let out = unpacker.decode(9);
        assert_eq!(out.messages, vec![&b"hello"[..]]);
    }

    #[test]
    fn trailing_partial_frame_is_retained() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let mut wire = frame(b"first");
        let second = frame(b"second");
        wire.extend_from_slice(&second[..7]);

        let out = deliver(&mut unpacker, &wire).unwrap();
        assert_eq!(out.messages, vec![&b"first"[..]]);
        assert_eq!(out.retained, 7);
        assert_eq!(unpacker.current_msg_len(), Some(10));

        let out = deliver(&mut unpacker, &second[7..]).unwrap();
        assert_eq!(out.messages, vec![&b"second"[..]]);
        assert_eq!(out.retained, 0);
    }

    #[test]
    fn oversized_header_keeps_earlier_messages() {
        let config = FrameConfig {
            max_msg_size: 64,
            ..wide_config()
        };
        let mut unpacker = LengthPrefixed::new(&config);
        let mut wire = frame(b"ok");
        wire.extend_from_slice(&1000u32.to_be_bytes());

        let out = deliver(&mut unpacker, &wire).unwrap();
        assert_eq!(out.messages, vec![&b"ok"[..]]);
        assert!(matches!(
            out.error,
            Some(FrameError::InvalidLength {
                len: 1000,
                min: 4,
                max: 64
            })
        ));
    }

    #[test]
    fn header_shorter_than_itself_is_rejected() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let out = deliver(&mut unpacker, &2u32.to_be_bytes()).unwrap();
        assert!(out.messages.is_empty());
        assert!(matches!(out.error, Some(FrameError::InvalidLength { len: 2, .. })));
    }

    #[test]
    fn decode_without_complete_message_fails() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        unpacker.receive_region()[..3].copy_from_slice(b"abc");
        let out = unpacker.decode(3);
        assert!(matches!(out.error, Some(FrameError::NoProgress { buffered: 3 })));
    }

    #[test]
    fn heartbeat_is_emitted_and_recognized() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let out = deliver(&mut unpacker, &frame(b"")).unwrap();
        assert_eq!(out.messages.len(), 1);
        assert!(unpacker.is_heartbeat(&out.messages[0]));
    }

    #[test]
    fn unstripped_output_keeps_header() {
        let config = FrameConfig {
            strip: false,
            ..wide_config()
        };
        let mut unpacker = LengthPrefixed::new(&config);
        let wire = frame(b"raw");
        let out = deliver(&mut unpacker, &wire).unwrap();
        assert_eq!(out.messages, vec![Bytes::from(wire)]);
        assert!(unpacker.is_heartbeat(&[0, 0, 0, 4]));
    }

    #[test]
    fn little_endian_header() {
        let config = FrameConfig {
            header: HeaderFormat {
                width: HeaderWidth::U16,
                order: ByteOrder::LittleEndian,
            },
            ..FrameConfig::default()
        };
        let mut unpacker = LengthPrefixed::new(&config);
        let out = deliver(&mut unpacker, &[5, 0, b'a', b'b', b'c']).unwrap();
        assert_eq!(out.messages, vec![&b"abc"[..]]);
    }

    #[test]
    fn transport_error_stops_reading() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        assert_eq!(unpacker.next_read_size(true, 0), 0);
        assert_eq!(unpacker.next_read_size(false, 0), MAX_READ_HINT);
    }

    #[test]
    fn reset_discards_progress() {
        let mut unpacker = LengthPrefixed::new(&wide_config());
        let wire = frame(b"abandoned");
        assert!(deliver(&mut unpacker, &wire[..6]).is_none());
        unpacker.decode(6);
        unpacker.reset();
        assert_eq!(unpacker.buffered(), 0);
        assert_eq!(unpacker.current_msg_len(), None);
    }
}
