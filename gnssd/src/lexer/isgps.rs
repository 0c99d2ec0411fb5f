//! Bit-level framing of IS-GPS-200 style 30-bit words carried six bits per
//! byte, as used by RTCM 104 version 2.

use log::trace;

use crate::checksum::isgps_parity_ok;

/// Maximum RTCM2 message length in 30-bit words.
pub const RTCM2_WORDS_MAX: usize = 33;

const RTCM2_PREAMBLE: u32 = 0x66;
const P_30_MASK: u32 = 0x4000_0000;
const W_DATA_MASK: u32 = 0x3fff_ffc0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsgpsStatus {
    /// Byte is not ISGPS data.
    Skip,
    /// Not yet synchronized, or synchronization was lost.
    NoSync,
    /// Synchronized, message still incomplete.
    Sync,
    /// A complete message is available from [`Isgps::message`].
    Message,
}

#[derive(Debug, Clone)]
pub struct Isgps {
    locked: bool,
    offset: i32,
    word: u32,
    buf: [u32; RTCM2_WORDS_MAX],
    bufindex: usize,
    message: Vec<u32>,
}

impl Default for Isgps {
    fn default() -> Self {
        Self {
            locked: false,
            offset: 0,
            word: 0,
            buf: [0; RTCM2_WORDS_MAX],
            bufindex: 0,
            message: Vec::new(),
        }
    }
}

/// The data bits of a byte arrive least significant first.
const fn reverse6(c: u8) -> u32 {
    let mut out = 0u32;
    let mut i = 0;
    while i < 6 {
        if c & (1 << i) != 0 {
            out |= 1 << (5 - i);
        }
        i += 1;
    }
    out
}

const fn preamble_match(word: u32) -> bool {
    (word >> 22) & 0xff == RTCM2_PREAMBLE
}

impl Isgps {
    pub fn reset(&mut self) {
        self.locked = false;
        self.offset = 0;
        self.word = 0;
        self.bufindex = 0;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Words of the last complete message, parity bits included.
    pub fn message(&self) -> &[u32] {
        &self.message
    }

    fn length_check(&self) -> bool {
        self.bufindex >= 2 && self.bufindex >= ((self.buf[1] >> 9) & 0x1f) as usize + 2
    }

    fn shift_in(&mut self, c: u32) {
        if self.offset > 0 {
            self.word |= c << self.offset;
        } else {
            self.word |= c >> -self.offset;
        }
    }

    /// Feed one byte of the 6-of-8 stream.
    pub fn decode(&mut self, c: u8) -> IsgpsStatus {
        if c & 0xc0 != 0x40 {
            return IsgpsStatus::Skip;
        }
        let c = reverse6(c & 0x3f);

        if !self.locked {
            self.offset = -5;
            self.bufindex = 0;
            while self.offset <= 0 {
                self.word <<= 1;
                self.shift_in(c);
                if preamble_match(self.word) && isgps_parity_ok(self.word) {
                    trace!("ISGPS preamble ok, parity ok -- locked");
                    self.locked = true;
                    break;
                }
                self.offset += 1;
            }
        }

        if !self.locked {
            return IsgpsStatus::NoSync;
        }

        let mut res = IsgpsStatus::Sync;
        self.shift_in(c);

        if self.offset <= 0 {
            if self.word & P_30_MASK != 0 {
                self.word ^= W_DATA_MASK;
            }
            if isgps_parity_ok(self.word) {
                if self.bufindex >= RTCM2_WORDS_MAX {
                    self.bufindex = 0;
                    trace!("ISGPS buffer overflowing -- resetting");
                    return IsgpsStatus::NoSync;
                }
                self.buf[self.bufindex] = self.word;

                if self.bufindex == 0 && !preamble_match(self.word) {
                    trace!("ISGPS word 0 not a preamble, punting");
                    self.locked = false;
                    return IsgpsStatus::NoSync;
                }
                self.bufindex += 1;

                if self.length_check() {
                    self.message.clear();
                    self.message.extend_from_slice(&self.buf[..self.bufindex]);
                    self.bufindex = 0;
                    res = IsgpsStatus::Message;
                }
            } else {
                trace!("ISGPS parity failure, lost lock");
                self.locked = false;
            }
            self.word <<= 30;
            self.offset += 30;
            self.shift_in(c);
        }
        self.offset -= 6;
        res
    }
}
