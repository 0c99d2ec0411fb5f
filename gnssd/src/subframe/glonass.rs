//! GLONASS L1OF/L2OF strings, four words. Only the framing is decoded.

use ::log::{debug, trace};

use crate::bits::WordReader;

/// What a string carries, from its number and the frame it is in.
pub(super) fn describe(string: u32, frame: u32) -> &'static str {
    match string {
        1..=4 => "Ephemeris",
        5 => "Time",
        6 | 8 | 10 | 12 | 14 if frame == 5 => "Extra 1",
        6 | 8 | 10 | 12 | 14 => "Almanac 1",
        7 | 9 | 11 | 13 | 15 if frame == 5 => "Extra 2",
        7 | 9 | 11 | 13 | 15 => "Almanac 2",
        _ => "Unknown stringnum",
    }
}

/// Log the string's place in the superframe.
pub(super) fn decode(tsvid: u8, words: &[u32]) {
    let r = WordReader::new(words);
    let string = r.bits(0, 27, 4);
    let superframe = r.bits(3, 16, 4);
    let frame = r.bits(3, 0, 4);
    trace!("50B,GLO: tSVID {tsvid} {words:08x?}");
    debug!(
        "50B,GLO: supernum {superframe} framenum {frame} stringnum {string} ({})",
        describe(string, frame)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_by_frame() {
        assert_eq!(describe(3, 1), "Ephemeris");
        assert_eq!(describe(5, 2), "Time");
        assert_eq!(describe(8, 4), "Almanac 1");
        assert_eq!(describe(8, 5), "Extra 1");
        assert_eq!(describe(15, 5), "Extra 2");
        assert_eq!(describe(0, 1), "Unknown stringnum");
    }
}
