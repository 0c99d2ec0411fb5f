//! Frame integrity checks, one pure function per protocol.
//!
//! The lexer references these by protocol when a frame reaches its
//! recognized state. Decoders never call them; payloads they see have
//! already passed.

/// UBX [Fletcher-16 checksum](https://en.wikipedia.org/wiki/Fletcher%27s_checksum)
/// calculator supporting both streaming and single-shot use.
///
/// Allystar frames use the same algorithm.
#[derive(Default, Debug, Clone, Copy)]
pub struct UbxChecksumCalc {
    ck_a: u8,
    ck_b: u8,
}

impl UbxChecksumCalc {
    pub const fn new() -> Self {
        Self { ck_a: 0, ck_b: 0 }
    }

    /// Update checksum with new bytes
    pub const fn update(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            self.update_byte(bytes[i]);
            i += 1;
        }
    }

    /// Update checksum with a single byte
    pub const fn update_byte(&mut self, byte: u8) {
        self.ck_a = self.ck_a.wrapping_add(byte);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    /// Get the current checksum result
    pub const fn result(self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }

    pub const fn is_valid(&self, received_ck_a: u8, received_ck_b: u8) -> bool {
        self.ck_a == received_ck_a && self.ck_b == received_ck_b
    }
}

/// CK_A and CK_B over class through payload inclusive.
pub const fn ubx_fletcher(bytes: &[u8]) -> (u8, u8) {
    let mut calc = UbxChecksumCalc::new();
    calc.update(bytes);
    calc.result()
}

/// XOR of every byte. NMEA callers pass the bytes strictly between the
/// leading `$`/`!` and the `*`.
pub fn nmea_xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Check an NMEA or AIVDM sentence held in `sentence`, leader included.
///
/// The checksum is the two hex digits after the last `*`, so sentences
/// with trailing junk after the checksum still validate. `$STI,` sentences
/// carry no checksum and always pass.
pub fn nmea_sentence_ok(sentence: &[u8]) -> bool {
    if sentence.starts_with(b"$STI,") {
        return true;
    }
    let Some(star) = sentence.iter().rposition(|&b| b == b'*') else {
        return false;
    };
    if star == 0 {
        return false;
    }
    let (Some(&hi), Some(&lo)) = (sentence.get(star + 1), sentence.get(star + 2)) else {
        return false;
    };
    let (Some(hi), Some(lo)) = (hex_digit(hi), hex_digit(lo)) else {
        return false;
    };
    nmea_xor(&sentence[1..star]) == (hi << 4) | lo
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Single-byte XOR used by TSIP v1, computed over id through payload.
pub fn tsip_v1_xor(bytes: &[u8]) -> u8 {
    nmea_xor(bytes)
}

/// CASIC 32-bit sum of little-endian words. Payload lengths are a multiple
/// of four; a trailing partial word is zero padded.
pub fn casic_sum32(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |acc, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc.wrapping_add(u32::from_le_bytes(word))
    })
}

/// GeoStar XOR of little-endian 32-bit words. A valid frame, checksum
/// included, folds to zero.
pub fn geostar_xor32(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |acc, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc ^ u32::from_le_bytes(word)
    })
}

/// SiRF 15-bit sum of the payload.
pub fn sirf_sum15(payload: &[u8]) -> u16 {
    let sum = payload.iter().fold(0u32, |acc, &b| acc + u32::from(b));
    (sum & 0x7fff) as u16
}

/// Plain byte sum, truncated to 16 bits. SuperStar II covers the header
/// and payload with it.
pub fn sum16(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Plain byte sum, truncated to 8 bits. Used by EverMore and Garmin.
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Zodiac header checksum: the two's complement of the sum of the first
/// four header words.
pub fn zodiac_header(words: [i16; 4]) -> i16 {
    words
        .iter()
        .fold(0i16, |acc, &w| acc.wrapping_add(w))
        .wrapping_neg()
}

/// GREIS 8-bit rotate-and-xor. A message with its checksum byte included
/// folds to zero.
pub fn greis_checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.rotate_left(2) ^ b)
        .rotate_left(2)
}

/// iTalk checksum over `words` payload words.
pub fn italk_checksum(words: &[u16]) -> u16 {
    let mut crc: u32 = 0;
    for (idx, &w) in words.iter().enumerate() {
        let tmp = (crc + 1).wrapping_mul(u32::from(w) + idx as u32);
        crc ^= (tmp & 0xffff) ^ (tmp >> 16);
    }
    crc as u16
}

const CRC24Q_POLY: u32 = 0x0186_4cfb;

const fn crc24q_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24Q_POLY;
            }
            bit += 1;
        }
        table[i] = crc & 0x00ff_ffff;
        i += 1;
    }
    table
}

static CRC24Q: [u32; 256] = crc24q_table();

/// CRC-24Q as used by RTCM3 and SPARTN.
pub fn rtcm3_crc24q(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |crc, &b| {
        ((crc << 8) ^ CRC24Q[(((crc >> 16) as u8) ^ b) as usize]) & 0x00ff_ffff
    })
}

/// True when the last three bytes of `frame` are the big-endian CRC-24Q of
/// everything before them.
pub fn crc24q_check(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (data, crc) = frame.split_at(frame.len() - 3);
    let expected = u32::from(crc[0]) << 16 | u32::from(crc[1]) << 8 | u32::from(crc[2]);
    rtcm3_crc24q(data) == expected
}

/// Masks selecting the bits that feed each IS-GPS-200 parity bit. Bits 31
/// and 30 carry D29* and D30* from the previous word.
const PARITY_MASKS: [u32; 6] = [
    0xbb1f_3480,
    0x5d8f_9a40,
    0xaec7_cd00,
    0x5763_e680,
    0x6bb1_f340,
    0x8b7a_89c0,
];

/// The six parity bits of a 30-bit GPS word, D25 in bit 5 and D30 in bit 0.
pub const fn isgps_parity(word: u32) -> u8 {
    let mut parity = 0u8;
    let mut i = 0;
    while i < PARITY_MASKS.len() {
        parity = (parity << 1) | ((word & PARITY_MASKS[i]).count_ones() & 1) as u8;
        i += 1;
    }
    parity
}

/// True when the low six bits of `word` match its recomputed parity.
pub const fn isgps_parity_ok(word: u32) -> bool {
    isgps_parity(word) == (word & 0x3f) as u8
}
