use bytes::{BufMut, Bytes, BytesMut};

use crate::config::{FrameConfig, Framing, HeaderFormat};
use crate::error::{FrameError, Result};

/// Encoder producing the wire form the matching [`crate::Unpacker`] accepts.
#[derive(Debug, Clone)]
pub enum Packer {
    /// `[length header][body]`, also used for non-copy framing.
    LengthPrefixed { header: HeaderFormat, max: usize },
    /// `[prefix][body][suffix]`.
    PrefixSuffix {
        prefix: Bytes,
        suffix: Bytes,
        max: usize,
    },
    /// Body only; must be exactly `len` bytes.
    Fixed { len: usize },
    /// Body only, unchanged. Stream and datagram framing.
    Raw { max: usize },
}

impl Packer {
    /// Build the encoder for `framing`, validating the configuration first.
    pub fn new(framing: &Framing, config: &FrameConfig) -> Result<Self> {
        framing.validate(config)?;
        let max = config.max_msg_size;
        Ok(match framing {
            Framing::LengthPrefixed | Framing::NonCopy => Self::LengthPrefixed {
                header: config.header,
                max,
            },
            Framing::FixedLength(len) => Self::Fixed { len: *len },
            Framing::PrefixSuffix { prefix, suffix } => Self::PrefixSuffix {
                prefix: prefix.clone(),
                suffix: suffix.clone(),
                max,
            },
            Framing::Stream | Framing::Datagram => Self::Raw { max },
        })
    }

    /// Wire size of a message with a `body_len`-byte body.
    pub fn wire_size(&self, body_len: usize) -> usize {
        match self {
            Self::LengthPrefixed { header, .. } => header.len() + body_len,
            Self::PrefixSuffix { prefix, suffix, .. } => prefix.len() + body_len + suffix.len(),
            Self::Fixed { .. } | Self::Raw { .. } => body_len,
        }
    }

    /// Append the framed form of `msg` to `dst`.
    ///
    /// An empty `msg` encodes a heartbeat where the framing has one.
    pub fn pack(&self, msg: &[u8], dst: &mut BytesMut) -> Result<()> {
        let size = self.wire_size(msg.len());
        match self {
            Self::LengthPrefixed { header, max } => {
                if size > *max {
                    return Err(FrameError::MessageTooLarge { size, max: *max });
                }
                dst.reserve(size);
                header.write(size, dst)?;
                dst.put_slice(msg);
            }
            Self::PrefixSuffix {
                prefix,
                suffix,
                max,
            } => {
                if size > *max {
                    return Err(FrameError::MessageTooLarge { size, max: *max });
                }
                if suffix_starts_early(msg, suffix) {
                    return Err(FrameError::SuffixInBody);
                }
                dst.reserve(size);
                dst.put_slice(prefix);
                dst.put_slice(msg);
                dst.put_slice(suffix);
            }
            Self::Fixed { len } => {
                if msg.len() != *len {
                    return Err(FrameError::LengthMismatch {
                        expected: *len,
                        actual: msg.len(),
                    });
                }
                dst.put_slice(msg);
            }
            Self::Raw { max } => {
                if size > *max {
                    return Err(FrameError::MessageTooLarge { size, max: *max });
                }
                dst.put_slice(msg);
            }
        }
        Ok(())
    }

    /// Encode `msg` into a fresh buffer.
    pub fn pack_to_bytes(&self, msg: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size(msg.len()));
        self.pack(msg, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Whether the first occurrence of `suffix` in `msg ++ suffix` starts inside
/// `msg`, which would make the decoder end the message early.
fn suffix_starts_early(msg: &[u8], suffix: &[u8]) -> bool {
    let slen = suffix.len();
    (0..msg.len()).any(|start| {
        let head = &msg[start..];
        if head.len() >= slen {
            return head.starts_with(suffix);
        }
        // the match runs into the appended suffix
        let split = head.len();
        suffix.starts_with(head) && suffix[split..] == suffix[..slen - split]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ByteOrder, HeaderWidth};

    #[test]
    fn length_header_counts_itself() {
        let packer = Packer::new(&Framing::LengthPrefixed, &FrameConfig::default()).unwrap();
        let wire = packer.pack_to_bytes(b"abc").unwrap();
        assert_eq!(wire.as_ref(), &[0, 5, b'a', b'b', b'c']);
    }

    #[test]
    fn little_endian_wide_header() {
        let config = FrameConfig {
            header: HeaderFormat {
                width: HeaderWidth::U32,
                order: ByteOrder::LittleEndian,
            },
            ..FrameConfig::default()
        };
        let packer = Packer::new(&Framing::NonCopy, &config).unwrap();
        let wire = packer.pack_to_bytes(b"").unwrap();
        assert_eq!(wire.as_ref(), &[4, 0, 0, 0]);
    }

    #[test]
    fn rejects_oversized_message() {
        let config = FrameConfig {
            max_msg_size: 8,
            ..FrameConfig::default()
        };
        let packer = Packer::new(&Framing::LengthPrefixed, &config).unwrap();
        assert!(packer.pack_to_bytes(b"123456").is_ok());
        assert!(matches!(
            packer.pack_to_bytes(b"1234567"),
            Err(FrameError::MessageTooLarge { size: 9, max: 8 })
        ));
    }

    #[test]
    fn delimited_wraps_body() {
        let packer = Packer::new(
            &Framing::prefix_suffix("begin", "end"),
            &FrameConfig::default(),
        )
        .unwrap();
        let wire = packer.pack_to_bytes(b"body").unwrap();
        assert_eq!(wire.as_ref(), b"beginbodyend");
    }

    #[test]
    fn delimited_rejects_suffix_in_body() {
        let packer = Packer::new(&Framing::prefix_suffix("", "\n"), &FrameConfig::default()).unwrap();
        assert!(matches!(
            packer.pack_to_bytes(b"two\nlines"),
            Err(FrameError::SuffixInBody)
        ));
    }

    #[test]
    fn delimited_rejects_suffix_straddling_the_end() {
        let packer = Packer::new(&Framing::prefix_suffix("", "aa"), &FrameConfig::default()).unwrap();
        assert!(matches!(
            packer.pack_to_bytes(b"xa"),
            Err(FrameError::SuffixInBody)
        ));
        // "ab" + "ab" only matches at the real suffix
        let packer = Packer::new(&Framing::prefix_suffix("", "ab"), &FrameConfig::default()).unwrap();
        assert_eq!(packer.pack_to_bytes(b"xa").unwrap().as_ref(), b"xaab");
    }

    #[test]
    fn packed_self_overlapping_suffix_decodes_intact() {
        let framing = Framing::prefix_suffix("<", "aba");
        let config = FrameConfig::default();
        let packer = Packer::new(&framing, &config).unwrap();
        assert!(matches!(
            packer.pack_to_bytes(b"zab"),
            Err(FrameError::SuffixInBody)
        ));
        assert_eq!(packer.pack_to_bytes(b"za").unwrap().as_ref(), b"<zaaba");

        let wire = packer.pack_to_bytes(b"zb").unwrap();
        let mut unpacker = crate::Unpacker::new(&framing, &config).unwrap();
        let out = unpacker.feed(&wire);
        assert!(out.is_ok(), "{:?}", out.error);
        assert_eq!(out.messages, vec![&b"zb"[..]]);
    }

    #[test]
    fn fixed_requires_exact_size() {
        let packer = Packer::new(&Framing::FixedLength(4), &FrameConfig::default()).unwrap();
        assert!(packer.pack_to_bytes(b"four").is_ok());
        assert!(matches!(
            packer.pack_to_bytes(b"five!"),
            Err(FrameError::LengthMismatch {
                expected: 4,
                actual: 5
            })
        ));
    }

    #[test]
    fn appends_to_existing_buffer() {
        let packer = Packer::new(&Framing::Stream, &FrameConfig::default()).unwrap();
        let mut dst = BytesMut::from(&b"ab"[..]);
        packer.pack(b"cd", &mut dst).unwrap();
        assert_eq!(dst.as_ref(), b"abcd");
    }
}
