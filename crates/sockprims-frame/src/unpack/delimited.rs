use bytes::Bytes;

use super::{DecodeOutcome, MAX_READ_HINT};
use crate::buffer::RecvBuffer;
use crate::config::FrameConfig;
use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Waiting for enough bytes to check the prefix.
    Seeking,
    /// Prefix matched; searching for the suffix.
    Prefixed,
    /// A complete message of this total length sits at the front.
    Complete(usize),
    Mismatch,
    Overflow,
}

/// Incremental prefix/suffix search over the message at the front of the buffer.
#[derive(Debug)]
struct Scanner {
    prefix: Bytes,
    suffix: Bytes,
    state: Scan,
    /// First offset at which the suffix may still start.
    searched: usize,
}

impl Scanner {
    fn restart(&mut self) {
        self.state = Scan::Seeking;
        self.searched = 0;
    }

    /// Advance the scan over `data` and return the next read hint.
    fn peek(&mut self, data: &[u8], max: usize) -> usize {
        let plen = self.prefix.len();
        let slen = self.suffix.len();

        match self.state {
            Scan::Seeking => {
                if data.len() < plen {
                    if !self.prefix.starts_with(data) {
                        self.state = Scan::Mismatch;
                        return 0;
                    }
                    return MAX_READ_HINT;
                }
                if !data.starts_with(&self.prefix) {
                    self.state = Scan::Mismatch;
                    return 0;
                }
                self.state = Scan::Prefixed;
                self.searched = plen;
            }
            Scan::Prefixed => {}
            Scan::Complete(_) | Scan::Mismatch | Scan::Overflow => return 0,
        }

        if data.len() >= plen + slen {
            let from = self.searched.max(plen);
            if let Some(pos) = find(&data[from..], &self.suffix) {
                self.state = Scan::Complete(from + pos + slen);
                return 0;
            }
            self.searched = (data.len() + 1).saturating_sub(slen).max(plen);
        }

        if data.len() >= max {
            self.state = Scan::Overflow;
            return 0;
        }
        MAX_READ_HINT
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// `[prefix][body][suffix]` decoder.
///
/// The suffix is matched as a byte sequence, so bodies may contain zero bytes.
#[derive(Debug)]
pub struct PrefixSuffix {
    buf: RecvBuffer,
    scanner: Scanner,
    strip: bool,
}

impl PrefixSuffix {
    pub fn new(prefix: Bytes, suffix: Bytes, config: &FrameConfig) -> Self {
        Self {
            buf: RecvBuffer::new(config.max_msg_size),
            scanner: Scanner {
                prefix,
                suffix,
                state: Scan::Seeking,
                searched: 0,
            },
            strip: config.strip,
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.scanner.prefix
    }

    pub fn suffix(&self) -> &[u8] {
        &self.scanner.suffix
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanner.restart();
    }

    pub fn next_read_size(&mut self, failed: bool, transferred: usize) -> usize {
        if failed {
            return 0;
        }
        let max = self.buf.capacity();
        self.scanner.peek(self.buf.staged(transferred), max)
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        if let Err(err) = self.buf.commit(transferred) {
            out.error = Some(err);
            out.retained = self.buf.len();
            return out;
        }

        let max = self.buf.capacity();
        let plen = self.scanner.prefix.len();
        let slen = self.scanner.suffix.len();
        let data = self.buf.filled();
        let mut consumed = 0;

        while consumed < data.len() {
            let rest = &data[consumed..];
            self.scanner.peek(rest, max);
            let Scan::Complete(len) = self.scanner.state else {
                break;
            };
            let msg = if self.strip {
                &rest[plen..len - slen]
            } else {
                &rest[..len]
            };
            out.messages.push(Bytes::copy_from_slice(msg));
            consumed += len;
            self.scanner.restart();
        }

        out.error = match self.scanner.state {
            Scan::Mismatch => Some(FrameError::PrefixMismatch),
            Scan::Overflow => Some(FrameError::SuffixNotFound { max }),
            _ if consumed == 0 => Some(FrameError::NoProgress {
                buffered: data.len(),
            }),
            _ => None,
        };

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
            msg.len() == self.scanner.prefix.len() + self.scanner.suffix.len()
        }
    }
}
