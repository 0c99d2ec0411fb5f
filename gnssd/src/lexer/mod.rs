//! Protocol-agnostic packet framing.
//!
//! The [`Lexer`] accumulates raw receiver bytes and runs them through one
//! deterministic state machine that recognizes every supported framing.
//! Each call to [`Lexer::parse`] stops at the first complete, validated
//! frame, which stays available through [`Lexer::packet`] until the next
//! call.

mod chunked;
mod isgps;
mod state;

use std::{io::Read, time::SystemTime};

use bitflags::bitflags;
use log::{debug, error, trace, warn};

pub use self::{
    chunked::{Dechunker, MAX_CHUNK_SIZE},
    isgps::{Isgps, IsgpsStatus, RTCM2_WORDS_MAX},
    state::State,
};
use crate::{
    checksum::{
        casic_sum32, crc24q_check, geostar_xor32, greis_checksum, italk_checksum,
        nmea_sentence_ok, sirf_sum15, sum16, UbxChecksumCalc,
    },
    constants::{
        DLE, ETX, GARMINTXT_MIN_LENGTH, INPUT_BUFFER_LENGTH, MAX_PACKET_LENGTH, STX,
    },
    error::{Error, Result},
};

/// Kind of a framed packet. The discriminants double as bit positions in
/// [`TypeMask`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(i8)]
pub enum PacketType {
    /// Failed validation. Never handed to a driver.
    #[default]
    Bad = -1,
    Comment = 0,
    Nmea = 1,
    Aivdm = 2,
    GarminTxt = 3,
    Sirf = 4,
    Zodiac = 5,
    Tsip = 6,
    Evermore = 7,
    Italk = 8,
    Garmin = 9,
    Navcom = 10,
    Ubx = 11,
    Superstar2 = 12,
    Oncore = 13,
    Geostar = 14,
    /// Carried over CAN, so never produced by the byte lexer.
    Nmea2000 = 15,
    Greis = 16,
    Skytraq = 17,
    Allystar = 18,
    Casic = 19,
    Rtcm2 = 21,
    Rtcm3 = 22,
    Json = 23,
    Spartn = 24,
}

impl PacketType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bad => "BAD",
            Self::Comment => "COMMENT",
            Self::Nmea => "NMEA",
            Self::Aivdm => "AIVDM",
            Self::GarminTxt => "GARMINTXT",
            Self::Sirf => "SIRF",
            Self::Zodiac => "ZODIAC",
            Self::Tsip => "TSIP",
            Self::Evermore => "EVERMORE",
            Self::Italk => "ITALK",
            Self::Garmin => "GARMIN",
            Self::Navcom => "NAVCOM",
            Self::Ubx => "UBX",
            Self::Superstar2 => "SUPERSTAR2",
            Self::Oncore => "ONCORE",
            Self::Geostar => "GEOSTAR",
            Self::Nmea2000 => "NMEA2000",
            Self::Greis => "GREIS",
            Self::Skytraq => "SKYTRAQ",
            Self::Allystar => "ALLYSTAR",
            Self::Casic => "CASIC",
            Self::Rtcm2 => "RTCM2",
            Self::Rtcm3 => "RTCM3",
            Self::Json => "JSON",
            Self::Spartn => "SPARTN",
        }
    }

    /// Textual framings, which are safe to echo to a log as is.
    pub const fn is_textual(self) -> bool {
        matches!(
            self,
            Self::Comment | Self::Nmea | Self::Aivdm | Self::GarminTxt | Self::Json
        )
    }

    /// Correction streams that must be passed on unmodified.
    pub const fn is_lossless(self) -> bool {
        matches!(self, Self::Rtcm2 | Self::Rtcm3)
    }
}

bitflags! {
    /// Packet types the lexer must not deliver.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct TypeMask: u32 {
        const COMMENT = 1 << 0;
        const NMEA = 1 << 1;
        const AIVDM = 1 << 2;
        const GARMINTXT = 1 << 3;
        const SIRF = 1 << 4;
        const ZODIAC = 1 << 5;
        const TSIP = 1 << 6;
        const EVERMORE = 1 << 7;
        const ITALK = 1 << 8;
        const GARMIN = 1 << 9;
        const NAVCOM = 1 << 10;
        const UBX = 1 << 11;
        const SUPERSTAR2 = 1 << 12;
        const ONCORE = 1 << 13;
        const GEOSTAR = 1 << 14;
        const NMEA2000 = 1 << 15;
        const GREIS = 1 << 16;
        const SKYTRAQ = 1 << 17;
        const ALLYSTAR = 1 << 18;
        const CASIC = 1 << 19;
        const RTCM2 = 1 << 21;
        const RTCM3 = 1 << 22;
        const JSON = 1 << 23;
        const SPARTN = 1 << 24;
    }
}

impl From<PacketType> for TypeMask {
    fn from(kind: PacketType) -> Self {
        match kind {
            PacketType::Bad => Self::empty(),
            other => Self::from_bits_truncate(1 << (other as i8)),
        }
    }
}

/// A framed packet, borrowed from the lexer until the next parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub kind: PacketType,
    /// The whole frame, leader through trailer.
    pub data: &'a [u8],
    pub framed_at: SystemTime,
}

enum Verdict {
    Accept(PacketType),
    /// Drop the whole candidate frame.
    Reject,
    /// Drop only the first byte and look for frames inside the candidate.
    Rescan,
}

#[derive(Debug)]
pub struct Lexer {
    pub(crate) state: State,
    inbuffer: Vec<u8>,
    inbufptr: usize,
    outbuffer: Vec<u8>,
    kind: PacketType,
    framed_at: SystemTime,
    length: usize,
    ctmp: u8,
    json_depth: usize,
    json_after: State,
    isgps: Isgps,
    stash: Vec<u8>,
    type_mask: TypeMask,
    chunked: Option<Dechunker>,
    /// Characters consumed by the state machine.
    pub char_counter: u64,
    /// Characters looked at twice.
    pub retry_counter: u64,
    /// Packets delivered since the last [`Lexer::reset_counter`].
    pub counter: u64,
    /// Frames rejected by validation.
    pub bad_count: u64,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            inbuffer: Vec::with_capacity(INPUT_BUFFER_LENGTH),
            inbufptr: 0,
            outbuffer: Vec::with_capacity(MAX_PACKET_LENGTH),
            kind: PacketType::Bad,
            framed_at: SystemTime::UNIX_EPOCH,
            length: 0,
            ctmp: 0,
            json_depth: 0,
            json_after: State::Ground,
            isgps: Isgps::default(),
            stash: Vec::new(),
            type_mask: TypeMask::empty(),
            chunked: None,
            char_counter: 0,
            retry_counter: 0,
            counter: 0,
            bad_count: 0,
        }
    }

    /// Return to the ground state with empty buffers. The type mask and the
    /// chunked-transfer setting survive.
    pub fn reset(&mut self) {
        self.kind = PacketType::Bad;
        self.state = State::Ground;
        self.inbuffer.clear();
        self.inbufptr = 0;
        self.outbuffer.clear();
        self.isgps.reset();
        self.stash.clear();
        if self.chunked.is_some() {
            self.chunked = Some(Dechunker::new());
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn type_mask(&self) -> TypeMask {
        self.type_mask
    }

    pub fn set_type_mask(&mut self, mask: TypeMask) {
        self.type_mask = mask;
    }

    /// Treat everything [`Lexer::get`] reads as an HTTP/1.1 chunked body.
    pub fn set_chunked(&mut self, chunked: bool) {
        self.chunked = chunked.then(Dechunker::new);
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked.is_some()
    }

    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }

    /// Type of the last delivered packet.
    pub fn kind(&self) -> PacketType {
        self.kind
    }

    /// Bytes not yet consumed by framing.
    pub fn buffered_input(&self) -> usize {
        self.inbuffer.len() - self.inbufptr
    }

    /// The packet framed by the last [`Lexer::parse`], if any.
    pub fn packet(&self) -> Option<Packet<'_>> {
        if self.outbuffer.is_empty() {
            return None;
        }
        Some(Packet {
            kind: self.kind,
            data: &self.outbuffer,
            framed_at: self.framed_at,
        })
    }

    /// Words of the last RTCM2 message, parity included.
    pub fn rtcm2_words(&self) -> &[u32] {
        self.isgps.message()
    }

    /// Append raw bytes. Returns how many fit in the input buffer.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let room = INPUT_BUFFER_LENGTH.saturating_sub(self.inbuffer.len());
        let n = room.min(bytes.len());
        self.inbuffer.extend_from_slice(&bytes[..n]);
        n
    }

    /// Read once from `reader` and frame what is buffered.
    ///
    /// Returns the length of the framed packet, or the number of bytes read
    /// when no packet completed.
    pub fn get<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<usize> {
        let room = INPUT_BUFFER_LENGTH.saturating_sub(self.inbuffer.len());
        let mut scratch = vec![0u8; room.min(MAX_PACKET_LENGTH)];
        let recvd = match reader.read(&mut scratch) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => 0,
            Err(e) => {
                warn!("read error: {e}");
                return Err(Error::Io(e));
            },
        };
        trace!("read {recvd} chars to buffer[{}]", self.inbuffer.len());

        match self.chunked.as_mut() {
            Some(dechunker) => {
                let mut body = Vec::with_capacity(recvd);
                dechunker.feed(&scratch[..recvd], &mut body)?;
                if self.feed(&body) < body.len() {
                    warn!("de-chunked data overflows the input buffer");
                }
            },
            None => {
                self.feed(&scratch[..recvd]);
            },
        }

        if recvd == 0 && self.buffered_input() == 0 {
            return Err(Error::Eof);
        }

        self.parse();

        if self.inbuffer.len() >= INPUT_BUFFER_LENGTH {
            self.packet_discard();
            self.state = State::Ground;
            warn!("input buffer overflow, discarding");
        }

        Ok(if self.outbuffer.is_empty() {
            recvd
        } else {
            self.outbuffer.len()
        })
    }

    /// Put the last framed packet back in front of the input for
    /// re-framing.
    pub fn pushback(&mut self) {
        if self.outbuffer.len() + self.inbuffer.len() >= INPUT_BUFFER_LENGTH {
            warn!("no room to push back a {} byte packet", self.outbuffer.len());
            return;
        }
        let mut rebuilt = std::mem::take(&mut self.outbuffer);
        rebuilt.extend_from_slice(&self.inbuffer);
        self.inbuffer = rebuilt;
        self.inbufptr = 0;
        self.state = State::Ground;
    }

    /// Drop the first buffered byte and restart scanning from the front.
    fn character_discard(&mut self) {
        if !self.inbuffer.is_empty() {
            self.inbuffer.remove(0);
        }
        self.inbufptr = 0;
    }

    /// Drop everything scanned so far.
    fn packet_discard(&mut self) {
        let n = self.inbufptr.min(self.inbuffer.len());
        self.inbuffer.drain(..n);
        self.inbufptr = 0;
    }

    fn packet_stash(&mut self) {
        self.stash.clear();
        self.stash.extend_from_slice(&self.inbuffer[..self.inbufptr]);
        trace!("stashed {} chars", self.stash.len());
    }

    fn packet_unstash(&mut self) {
        if self.stash.is_empty() {
            return;
        }
        if self.stash.len() + self.inbuffer.len() <= INPUT_BUFFER_LENGTH {
            let mut rebuilt = std::mem::take(&mut self.stash);
            rebuilt.extend_from_slice(&self.inbuffer);
            self.inbuffer = rebuilt;
            self.inbufptr = 0;
        } else {
            error!("rejected too long unstash of {}", self.stash.len());
            self.stash.clear();
        }
    }

    /// Frame buffered input. Stops at the first complete packet and
    /// returns true when one is ready.
    pub fn parse(&mut self) -> bool {
        self.outbuffer.clear();
        while self.inbufptr < self.inbuffer.len() {
            let c = self.inbuffer[self.inbufptr];
            self.inbufptr += 1;
            if self.state == State::Ground {
                self.stash.clear();
            }
            let old = self.state;
            if !self.next_state(c) {
                continue;
            }
            self.char_counter += 1;
            if log::log_enabled!(log::Level::Trace) {
                trace!("{:08}: {c:#04x} {old:?} -> {:?}", self.char_counter, self.state);
            }

            match self.state {
                State::Ground => self.character_discard(),
                State::StashRecognized => {
                    self.packet_stash();
                    self.packet_discard();
                },
                s => {
                    let Some(kind) = Self::recognized_type(s) else {
                        continue;
                    };
                    match self.validate(kind) {
                        Verdict::Accept(kind) if self.type_mask.intersects(kind.into()) => {
                            debug!("{} packet masked", kind.name());
                            self.packet_discard();
                        },
                        Verdict::Accept(kind) => {
                            self.accept(kind);
                            return true;
                        },
                        Verdict::Reject => {
                            self.bad_count += 1;
                            warn!(
                                "rejected {} byte {} frame",
                                self.inbufptr,
                                kind.name()
                            );
                            self.packet_discard();
                        },
                        Verdict::Rescan => {
                            self.bad_count += 1;
                            debug!("{} frame failed validation, rescanning", kind.name());
                            self.state = State::Ground;
                            self.character_discard();
                        },
                    }
                },
            }
        }
        false
    }

    fn accept(&mut self, kind: PacketType) {
        self.outbuffer.clear();
        self.outbuffer
            .extend_from_slice(&self.inbuffer[..self.inbufptr]);
        self.kind = kind;
        self.framed_at = SystemTime::now();
        self.counter += 1;
        trace!("{} packet accepted, {} bytes", kind.name(), self.outbuffer.len());
        self.packet_discard();
        if kind == PacketType::Nmea {
            self.packet_unstash();
        }
    }

    /// Final checks on a frame the state machine considers complete.
    fn validate(&mut self, kind: PacketType) -> Verdict {
        let frame = &self.inbuffer[..self.inbufptr];
        let len = frame.len();
        let verdict = match kind {
            PacketType::Comment | PacketType::Json => {
                self.state = State::Ground;
                if kind == PacketType::Json && len < 11 {
                    Verdict::Reject
                } else {
                    Verdict::Accept(kind)
                }
            },
            PacketType::Nmea | PacketType::Aivdm => {
                if nmea_sentence_ok(frame) {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::GarminTxt => {
                self.state = State::Ground;
                if len >= GARMINTXT_MIN_LENGTH {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Rescan
                }
            },
            PacketType::Oncore => {
                let xor = frame[2..len - 2].iter().fold(0u8, |acc, b| acc ^ b);
                if xor == 0 {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Sirf => {
                let expected = u16::from_be_bytes([frame[len - 4], frame[len - 3]]);
                if sirf_sum15(&frame[4..len - 4]) == expected {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            // checked while framing
            PacketType::Skytraq | PacketType::Navcom | PacketType::Rtcm2 => {
                Verdict::Accept(kind)
            },
            PacketType::Superstar2 => {
                let flen = (4 + usize::from(frame[3]) + 2).min(261).min(len);
                let expected = u16::from_le_bytes([frame[flen - 2], frame[flen - 1]]);
                if sum16(&frame[..flen - 2]) == expected {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Tsip => {
                let (verdict, next) = dle_frame_type(frame, self.kind);
                self.state = next;
                verdict
            },
            PacketType::Evermore => {
                if evermore_ok(frame) {
                    Verdict::Accept(kind)
                } else {
                    self.state = State::Ground;
                    Verdict::Reject
                }
            },
            PacketType::Rtcm3 => {
                let data_len = usize::from(u16::from_be_bytes([frame[1], frame[2]]) & 0x3ff);
                match frame.get(..data_len + 6) {
                    Some(f) if crc24q_check(f) => Verdict::Accept(kind),
                    _ => Verdict::Reject,
                }
            },
            PacketType::Zodiac => {
                if zodiac_data_ok(frame) {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Ubx => {
                let ok = len >= 8 && {
                    let mut calc = UbxChecksumCalc::new();
                    calc.update(&frame[2..len - 2]);
                    calc.is_valid(frame[len - 2], frame[len - 1])
                };
                if ok {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Allystar => {
                let data_len = usize::from(u16::from_le_bytes([frame[4], frame[5]]));
                let ok = len >= data_len + 8 && {
                    let mut calc = UbxChecksumCalc::new();
                    calc.update(&frame[2..data_len + 6]);
                    calc.is_valid(frame[data_len + 6], frame[data_len + 7])
                };
                if ok {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Casic => {
                let data_len = usize::from(u16::from_le_bytes([frame[2], frame[3]]));
                let ok = len >= data_len + 10 && {
                    let at = data_len + 6;
                    let expected =
                        u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]);
                    casic_sum32(&frame[2..at]) == expected
                };
                if ok {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Italk => {
                if italk_ok(frame) {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Geostar => {
                if geostar_xor32(frame) == 0 {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Reject
                }
            },
            PacketType::Greis => {
                if frame.starts_with(b"RE") || frame.starts_with(b"ER") || greis_checksum(frame) == 0 {
                    Verdict::Accept(kind)
                } else {
                    self.state = State::GreisExpected;
                    Verdict::Reject
                }
            },
            PacketType::Spartn => {
                if crc24q_check(&frame[1..]) {
                    Verdict::Accept(kind)
                } else {
                    Verdict::Rescan
                }
            },
            PacketType::Bad | PacketType::Garmin | PacketType::Nmea2000 => Verdict::Reject,
        };
        if matches!(verdict, Verdict::Reject) && self.state != State::GreisExpected {
            self.state = State::Ground;
        }
        verdict
    }
}

/// Tell Garmin binary from TSIP. Both are DLE stuffed and end in DLE ETX;
/// only Garmin carries a length and checksum.
fn dle_frame_type(frame: &[u8], last: PacketType) -> (Verdict, State) {
    let dles = frame.iter().filter(|&&b| b == DLE).count();
    let mut len = frame.len();
    if dles > 2 {
        // stuffed DLEs are not payload
        len -= (dles - 2) / 2;
    }
    let id = frame[1];
    if len < 5 {
        // the empty frame 10 00 10 03 is well formed, just useless
        if len == 4 && id == 0 {
            return (Verdict::Accept(PacketType::Tsip), State::TsipRecognized);
        }
        return (Verdict::Reject, State::Ground);
    }

    // a TSIP stream will not suddenly turn into Garmin
    if last != PacketType::Tsip && garmin_ok(frame) {
        return (Verdict::Accept(PacketType::Garmin), State::Ground);
    }

    if tsip_length_plausible(id, len) {
        (Verdict::Accept(PacketType::Tsip), State::TsipRecognized)
    } else {
        trace!("TSIP id {id:#04x} implausible with {len} bytes");
        (Verdict::Reject, State::Ground)
    }
}

fn garmin_ok(frame: &[u8]) -> bool {
    let at = |i: usize| frame.get(i).copied();
    let mut idx = 1;
    let Some(id) = at(idx) else {
        return false;
    };
    idx += 1;
    let Some(data_len) = at(idx) else {
        return false;
    };
    idx += 1;
    let mut crc = u32::from(data_len) + u32::from(id);
    if data_len == DLE {
        if at(idx) != Some(DLE) {
            return false;
        }
        idx += 1;
    }
    // data plus the checksum byte
    for _ in 0..=data_len {
        let Some(b) = at(idx) else {
            return false;
        };
        crc += u32::from(b);
        idx += 1;
        if b == DLE {
            if at(idx) != Some(DLE) {
                return false;
            }
            idx += 1;
        }
    }
    if crc & 0xff != 0 {
        trace!("Garmin checksum failed: {:02x}", crc & 0xff);
        return false;
    }
    at(idx) == Some(DLE) && at(idx + 1) == Some(ETX)
}

/// TSIP has neither length nor checksum, so only well-known ids with their
/// documented lengths are believed. `len` counts leader and trailer.
fn tsip_length_plausible(id: u8, len: usize) -> bool {
    let data = len - 4;
    match id {
        0x13 => true,
        0x1c => len >= 11,
        0x41 => data == 10,
        0x42 => data == 16,
        0x43 => data == 20,
        0x45 => data == 10,
        0x46 => data == 2,
        0x47 => len % 5 == 0,
        0x48 => data == 22,
        0x49 => data == 32,
        0x4a => data == 20,
        0x4b => data == 3,
        0x4c => data == 17,
        0x54 => data == 12,
        0x55 => data == 4,
        0x56 => data == 20,
        0x57 => data == 8,
        0x5a => data == 25,
        0x5b => data == 16,
        0x5c => data == 24,
        0x5d => data == 26,
        0x5e => data == 2,
        0x5f => data == 66,
        0x6c => (22..=246).contains(&len),
        0x6d => (21..=53).contains(&len),
        0x82 => data == 1,
        0x83 => data == 36,
        0x84 => data == 36,
        0x8f..=0x93 => true,
        // TSIP v1 and its debug family
        0xa0..=0xa5 | 0xd0 => true,
        0xbb => data == 40 || data == 43,
        _ => false,
    }
}

fn evermore_ok(frame: &[u8]) -> bool {
    let at = |i: usize| frame.get(i).copied();
    if at(0) != Some(DLE) || at(1) != Some(STX) {
        return false;
    }
    let mut idx = 2;
    let Some(data_len) = at(idx) else {
        return false;
    };
    idx += 1;
    if data_len == DLE {
        if at(idx) != Some(DLE) {
            return false;
        }
        idx += 1;
    }
    if data_len < 8 {
        return false;
    }
    let mut crc = 0u32;
    for _ in 0..data_len - 2 {
        let Some(b) = at(idx) else {
            return false;
        };
        crc += u32::from(b);
        idx += 1;
        if b == DLE {
            if at(idx) != Some(DLE) {
                return false;
            }
            idx += 1;
        }
    }
    let Some(expected) = at(idx) else {
        return false;
    };
    idx += 1;
    if expected == DLE {
        if at(idx) != Some(DLE) {
            return false;
        }
        idx += 1;
    }
    at(idx) == Some(DLE) && at(idx + 1) == Some(ETX) && (crc & 0xff) as u8 == expected
}

fn zodiac_data_ok(frame: &[u8]) -> bool {
    let word = |n: usize| -> Option<u16> {
        Some(u16::from_le_bytes([*frame.get(2 * n)?, *frame.get(2 * n + 1)?]))
    };
    let Some(count) = word(2) else {
        return false;
    };
    let count = usize::from(count).min(253);
    if count == 0 {
        return true;
    }
    let mut sum = 0u16;
    for n in 5..=5 + count {
        match word(n) {
            Some(w) => sum = sum.wrapping_add(w),
            None => return false,
        }
    }
    sum & 0xff == 0
}

fn italk_ok(frame: &[u8]) -> bool {
    let Some(&count) = frame.get(6) else {
        return false;
    };
    let count = usize::from(count);
    if count == 0 {
        return true;
    }
    let word = |at: usize| -> Option<u16> {
        Some(u16::from_le_bytes([*frame.get(at)?, *frame.get(at + 1)?]))
    };
    let words: Option<Vec<u16>> = (0..count).map(|i| word(7 + 2 * i)).collect();
    match (words, word(7 + 2 * count)) {
        (Some(words), Some(expected)) => italk_checksum(&words) == expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{nmea_xor, rtcm3_crc24q, ubx_fletcher};

    pub(crate) fn ubx_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xb5, 0x62, class, id];
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(payload);
        let (a, b) = ubx_fletcher(&frame[2..]);
        frame.extend_from_slice(&[a, b]);
        frame
    }

    fn nmea(body: &str) -> Vec<u8> {
        format!("${body}*{:02X}\r\n", nmea_xor(body.as_bytes())).into_bytes()
    }

    fn tsip_frame(id: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![DLE, id];
        for &b in payload {
            frame.push(b);
            if b == DLE {
                frame.push(DLE);
            }
        }
        frame.extend_from_slice(&[DLE, ETX]);
        frame
    }

    /// Every packet the lexer delivers for `input`, in order.
    fn frames(lexer: &mut Lexer, input: &[u8]) -> Vec<(PacketType, Vec<u8>)> {
        lexer.feed(input);
        let mut out = Vec::new();
        while lexer.parse() {
            let p = lexer.packet().unwrap();
            out.push((p.kind, p.data.to_vec()));
        }
        out
    }

    #[test]
    fn nmea_sentence() {
        let mut lexer = Lexer::new();
        let s = nmea("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let got = frames(&mut lexer, &s);
        assert_eq!(got, vec![(PacketType::Nmea, s)]);
        assert_eq!(lexer.state(), State::NmeaRecognized);
    }

    #[test]
    fn nmea_bad_checksum_is_counted() {
        let mut lexer = Lexer::new();
        let got = frames(&mut lexer, b"$GNRMC,,V,,,,,,,,,,N*4e\r\n");
        assert!(got.is_empty());
        assert_eq!(lexer.bad_count, 1);
        assert_eq!(lexer.buffered_input(), 0);
    }

    #[test]
    fn aivdm_sentence() {
        let mut lexer = Lexer::new();
        let body = "AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0";
        let s = format!("!{body}*{:02X}\r\n", nmea_xor(body.as_bytes())).into_bytes();
        let got = frames(&mut lexer, &s);
        assert_eq!(got, vec![(PacketType::Aivdm, s)]);
    }

    #[test]
    fn ubx_then_nmea_back_to_back() {
        let mut lexer = Lexer::new();
        let ubx = ubx_frame(0x01, 0x07, &[0u8; 92]);
        let s = nmea("GNRMC,,V,,,,,,,,,,N");
        let mut input = ubx.clone();
        input.extend_from_slice(&s);
        let got = frames(&mut lexer, &input);
        assert_eq!(got, vec![(PacketType::Ubx, ubx), (PacketType::Nmea, s)]);
    }

    #[test]
    fn ubx_zero_length_payload() {
        let mut lexer = Lexer::new();
        let poll = ubx_frame(0x0a, 0x04, &[]);
        let got = frames(&mut lexer, &poll);
        assert_eq!(got, vec![(PacketType::Ubx, poll)]);
    }

    #[test]
    fn ubx_bad_checksum_rejected() {
        let mut lexer = Lexer::new();
        let mut f = ubx_frame(0x05, 0x01, &[0x06, 0x01]);
        let n = f.len();
        f[n - 1] ^= 0xff;
        assert!(frames(&mut lexer, &f).is_empty());
        assert_eq!(lexer.bad_count, 1);
    }

    #[test]
    fn garbage_before_a_frame_is_skipped() {
        let mut lexer = Lexer::new();
        let ubx = ubx_frame(0x05, 0x01, &[0x06, 0x01]);
        let mut input = b"\x00\x17$G\xb5".to_vec();
        input.extend_from_slice(&ubx);
        let got = frames(&mut lexer, &input);
        assert_eq!(got, vec![(PacketType::Ubx, ubx)]);
    }

    #[test]
    fn tsip_frame_with_stuffing() {
        let mut lexer = Lexer::new();
        // 0x41 GPS time, 10 bytes, with a literal DLE inside
        let f = tsip_frame(0x41, &[0x49, 0x10, 0, 0, 0x08, 0xf3, 0x41, 0x90, 0, 0]);
        let got = frames(&mut lexer, &f);
        assert_eq!(got, vec![(PacketType::Tsip, f)]);
        assert_eq!(lexer.state(), State::TsipRecognized);
    }

    #[test]
    fn empty_tsip_frame_accepted() {
        let mut lexer = Lexer::new();
        let got = frames(&mut lexer, &[DLE, 0x00, DLE, ETX]);
        assert_eq!(got, vec![(PacketType::Tsip, vec![DLE, 0x00, DLE, ETX])]);
    }

    #[test]
    fn tsip_wrong_length_rejected() {
        let mut lexer = Lexer::new();
        let f = tsip_frame(0x41, &[1, 2, 3]);
        assert!(frames(&mut lexer, &f).is_empty());
    }

    #[test]
    fn lone_dle_in_tsip_payload_is_malformed() {
        let mut lexer = Lexer::new();
        let mut f = vec![DLE, 0x46, 0x00, DLE, 0x05];
        f.extend_from_slice(&[DLE, ETX]);
        assert!(frames(&mut lexer, &f)
            .iter()
            .all(|(kind, _)| *kind != PacketType::Tsip));
    }

    #[test]
    fn rtcm3_frame() {
        let mut lexer = Lexer::new();
        let payload = [0x3e, 0xd0, 0x00, 0x03];
        let mut f = vec![0xd3, 0x00, payload.len() as u8];
        f.extend_from_slice(&payload);
        let crc = rtcm3_crc24q(&f);
        f.extend_from_slice(&crc.to_be_bytes()[1..]);
        let got = frames(&mut lexer, &f);
        assert_eq!(got, vec![(PacketType::Rtcm3, f)]);
    }

    #[test]
    fn casic_frame() {
        let mut lexer = Lexer::new();
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut f = vec![0xba, 0xce, payload.len() as u8, 0x00, 0x05, 0x01];
        f.extend_from_slice(&payload);
        let ck = casic_sum32(&f[2..]);
        f.extend_from_slice(&ck.to_le_bytes());
        let got = frames(&mut lexer, &f);
        assert_eq!(got, vec![(PacketType::Casic, f)]);
    }

    #[test]
    fn sirf_frame() {
        let mut lexer = Lexer::new();
        let payload = [0x84u8, 0x00];
        let mut f = vec![0xa0, 0xa2, 0x00, payload.len() as u8];
        f.extend_from_slice(&payload);
        f.extend_from_slice(&sirf_sum15(&payload).to_be_bytes());
        f.extend_from_slice(&[0xb0, 0xb3]);
        let got = frames(&mut lexer, &f);
        assert_eq!(got, vec![(PacketType::Sirf, f)]);
    }

    #[test]
    fn spartn_header_lengths() {
        // crc type 2, payload 4, 16-bit time tag
        assert_eq!(state::spartn_frame_len(&[0x73, 0x00, 0x02, 0x20, 0x00]), Some(8 + 4 + 3));
        // 32-bit time tag
        assert_eq!(state::spartn_frame_len(&[0x73, 0x00, 0x02, 0x20, 0x08]), Some(10 + 4 + 3));
        // encryption and authentication fields
        assert_eq!(state::spartn_frame_len(&[0x73, 0x00, 0x02, 0x60, 0x00]), Some(10 + 4 + 3));
        // crc type 1 is not framed
        assert_eq!(state::spartn_frame_len(&[0x73, 0x00, 0x02, 0x10, 0x00]), None);
    }

    #[test]
    fn spartn_frame() {
        let mut lexer = Lexer::new();
        let mut f = vec![0x73, 0x02, 0x02, 0x20, 0x10, 0x12, 0x34, 0x02, 0xde, 0xad, 0xbe, 0xef];
        let crc = rtcm3_crc24q(&f[1..]);
        f.extend_from_slice(&crc.to_be_bytes()[1..]);
        let got = frames(&mut lexer, &f);
        assert_eq!(got, vec![(PacketType::Spartn, f)]);
    }

    #[test]
    fn json_object() {
        let mut lexer = Lexer::new();
        let j = br#"{"class":"WATCH","enable":true}"#;
        let got = frames(&mut lexer, j);
        assert_eq!(got, vec![(PacketType::Json, j.to_vec())]);
    }

    #[test]
    fn comment_line() {
        let mut lexer = Lexer::new();
        let got = frames(&mut lexer, b"# capture of a receiver\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, PacketType::Comment);
    }

    #[test]
    fn interrupted_sentence_is_stashed() {
        let mut lexer = Lexer::new();
        let inner = nmea("GPZDA,160012.71,11,03,2004,-1,00");
        let outer = nmea("GPTXT,01,01,02,ANTSTATUS=OK");
        // outer sentence cut in two by the inner one
        let cut = 12;
        let mut input = outer[..cut].to_vec();
        input.extend_from_slice(&inner);
        input.extend_from_slice(&outer[cut..]);
        let got = frames(&mut lexer, &input);
        assert_eq!(got, vec![(PacketType::Nmea, inner), (PacketType::Nmea, outer)]);
    }

    #[test]
    fn split_delivery_frames_once() {
        let mut lexer = Lexer::new();
        let ubx = ubx_frame(0x01, 0x61, &[0, 1, 2, 3]);
        let mut got = Vec::new();
        for b in &ubx {
            got.extend(frames(&mut lexer, std::slice::from_ref(b)));
        }
        assert_eq!(got, vec![(PacketType::Ubx, ubx)]);
    }

    #[test]
    fn masked_type_is_dropped() {
        let mut lexer = Lexer::new();
        lexer.set_type_mask(TypeMask::UBX);
        let ubx = ubx_frame(0x05, 0x01, &[0x06, 0x01]);
        assert!(frames(&mut lexer, &ubx).is_empty());
        assert_eq!(lexer.bad_count, 0);
    }

    #[test]
    fn pushback_reframes_the_same_packet() {
        let mut lexer = Lexer::new();
        let ubx = ubx_frame(0x05, 0x01, &[0x06, 0x01]);
        lexer.feed(&ubx);
        assert!(lexer.parse());
        lexer.pushback();
        assert!(lexer.parse());
        assert_eq!(lexer.packet().unwrap().data, ubx.as_slice());
    }

    #[test]
    fn get_reports_eof() {
        let mut lexer = Lexer::new();
        let mut empty: &[u8] = &[];
        assert!(matches!(lexer.get(&mut empty), Err(Error::Eof)));
    }

    #[test]
    fn get_returns_packet_length() {
        let mut lexer = Lexer::new();
        let ubx = ubx_frame(0x05, 0x01, &[0x06, 0x01]);
        let mut src = ubx.as_slice();
        assert_eq!(lexer.get(&mut src).unwrap(), ubx.len());
        assert_eq!(lexer.packet().unwrap().kind, PacketType::Ubx);
    }

    #[test]
    fn chunked_source() {
        let mut lexer = Lexer::new();
        lexer.set_chunked(true);
        let s = nmea("GNRMC,,V,,,,,,,,,,N");
        let mut body = format!("{:x}\r\n", s.len()).into_bytes();
        body.extend_from_slice(&s);
        body.extend_from_slice(b"\r\n");
        let mut src = body.as_slice();
        lexer.get(&mut src).unwrap();
        assert_eq!(lexer.packet().unwrap().data, s.as_slice());
    }

    #[test]
    fn rtcm2_words_are_framed() {
        let mut lexer = Lexer::new();
        let [w0, w1] = isgps::tests::header(0);
        let stream = isgps::tests::encode(&[w0, w1]);
        let got = frames(&mut lexer, &stream);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, PacketType::Rtcm2);
        assert_eq!(lexer.rtcm2_words().len(), 2);
    }

    #[test]
    fn type_mask_bits_follow_ordinals() {
        assert_eq!(TypeMask::from(PacketType::Spartn), TypeMask::SPARTN);
        assert_eq!(TypeMask::from(PacketType::Ubx), TypeMask::UBX);
        assert_eq!(TypeMask::from(PacketType::Bad), TypeMask::empty());
    }
}
