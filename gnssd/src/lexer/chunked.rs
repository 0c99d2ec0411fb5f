//! HTTP/1.1 chunked transfer decoding, for NTRIP v2 casters.

use log::{trace, warn};

use crate::error::{Error, Result};

/// Largest chunk a caster is trusted to announce.
pub const MAX_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ChunkState {
    #[default]
    Size,
    /// Rest of the size line, including any `;ext`.
    SizeLine,
    Data,
    /// CRLF after the chunk data.
    DataEnd,
    /// Trailer lines after the last chunk.
    Trailer,
    Done,
}

/// Incremental de-chunker. Feed it whatever the socket returns and it
/// appends the de-chunked body bytes to the output.
#[derive(Debug, Default, Clone)]
pub struct Dechunker {
    state: ChunkState,
    size: usize,
    digits: usize,
    remaining: usize,
    line_len: usize,
}

impl Dechunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the terminating zero-size chunk and trailer were seen.
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Body bytes still owed by the current chunk.
    pub fn chunk_remaining(&self) -> usize {
        self.remaining
    }

    pub fn feed(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        while let Some((&c, rest)) = input.split_first() {
            match self.state {
                ChunkState::Size => match (c as char).to_digit(16) {
                    Some(d) => {
                        self.size = self.size * 16 + d as usize;
                        self.digits += 1;
                        if self.size > MAX_CHUNK_SIZE {
                            warn!("invalid chunk size {}", self.size);
                            return Err(Error::Device(format!(
                                "chunk size {} exceeds {MAX_CHUNK_SIZE}",
                                self.size
                            )));
                        }
                    },
                    None if self.digits > 0 && (c == b';' || c == b'\r' || c == b'\n') => {
                        self.state = ChunkState::SizeLine;
                        continue;
                    },
                    None => {
                        warn!("invalid chunk size line, byte {c:#04x}");
                        return Err(Error::Device("malformed chunk size".into()));
                    },
                },
                ChunkState::SizeLine => {
                    if c == b'\n' {
                        trace!("chunk of {} bytes", self.size);
                        self.remaining = self.size;
                        self.state = if self.size == 0 {
                            self.line_len = 0;
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data
                        };
                        self.size = 0;
                        self.digits = 0;
                    }
                },
                ChunkState::Data => {
                    let n = self.remaining.min(input.len());
                    out.extend_from_slice(&input[..n]);
                    self.remaining -= n;
                    input = &input[n..];
                    if self.remaining == 0 {
                        self.state = ChunkState::DataEnd;
                    }
                    continue;
                },
                ChunkState::DataEnd => {
                    if c == b'\n' {
                        self.state = ChunkState::Size;
                    } else if c != b'\r' {
                        warn!("chunk data not followed by CRLF");
                        return Err(Error::Device("missing chunk trailer".into()));
                    }
                },
                ChunkState::Trailer => match c {
                    b'\n' if self.line_len == 0 => self.state = ChunkState::Done,
                    b'\n' => self.line_len = 0,
                    b'\r' => {},
                    _ => self.line_len += 1,
                },
                ChunkState::Done => {
                    trace!("{} bytes after last chunk ignored", input.len());
                    return Ok(());
                },
            }
            input = rest;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_chunks_and_terminator() {
        let mut d = Dechunker::new();
        let mut out = Vec::new();
        d.feed(b"4\r\nWiki\r\n5;name=x\r\npedia\r\n0\r\n\r\n", &mut out)
            .unwrap();
        assert_eq!(out, b"Wikipedia");
        assert!(d.is_done());
    }

    #[test]
    fn split_anywhere() {
        let stream = b"a\r\n0123456789\r\n3\r\nabc\r\n";
        for split in 1..stream.len() {
            let mut d = Dechunker::new();
            let mut out = Vec::new();
            d.feed(&stream[..split], &mut out).unwrap();
            d.feed(&stream[split..], &mut out).unwrap();
            assert_eq!(out, b"0123456789abc", "split at {split}");
        }
    }

    #[test]
    fn oversized_chunk_rejected() {
        let mut d = Dechunker::new();
        let mut out = Vec::new();
        assert!(d.feed(b"ffff\r\n", &mut out).is_err());
    }

    #[test]
    fn garbage_size_rejected() {
        let mut d = Dechunker::new();
        let mut out = Vec::new();
        assert!(d.feed(b"xyz\r\n", &mut out).is_err());
    }
}
