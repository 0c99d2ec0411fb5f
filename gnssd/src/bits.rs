//! Checked extraction of integers and floats from packet payloads.
//!
//! Two readers live here. [`BitReader`] pulls byte-aligned fields out of a
//! payload slice in either byte order. [`WordReader`] pulls bit fields out of
//! an array of navigation words, where a single field may straddle two or
//! more words.

use crate::error::{Error, Result};

/// Sign-extend the low `width` bits of `value`.
///
/// When bit `width - 1` is set the result is `value - 2^width`, otherwise
/// `value` itself. Bits above `width` are ignored.
pub const fn sign_extend(value: u32, width: u32) -> i32 {
    if width == 0 {
        return 0;
    }
    if width >= 32 {
        return value as i32;
    }
    let mask = (1u32 << width) - 1;
    let value = value & mask;
    if value & (1 << (width - 1)) != 0 {
        (value | !mask) as i32
    } else {
        value as i32
    }
}

/// Sign-extend for fields wider than 32 bits.
pub const fn sign_extend64(value: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    if width >= 64 {
        return value as i64;
    }
    let mask = (1u64 << width) - 1;
    let value = value & mask;
    if value & (1 << (width - 1)) != 0 {
        (value | !mask) as i64
    } else {
        value as i64
    }
}

/// Byte-offset reader over a payload slice.
///
/// Every accessor fails with [`Error::ShortBuffer`] rather than reading a
/// partial field.
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    buf: &'a [u8],
}

macro_rules! int_readers {
    ($( $le:ident, $be:ident, $ty:ty );* $(;)?) => {
        $(
            pub fn $le(&self, offset: usize) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.array(offset)?))
            }

            pub fn $be(&self, offset: usize) -> Result<$ty> {
                Ok(<$ty>::from_be_bytes(self.array(offset)?))
            }
        )*
    };
}

impl<'a> BitReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub const fn as_slice(&self) -> &'a [u8] {
        self.buf
    }

    /// Raw byte range `offset..offset + width`.
    pub fn bytes(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(width)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or(Error::ShortBuffer {
                offset,
                width,
                len: self.buf.len(),
            })
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn i8(&self, offset: usize) -> Result<i8> {
        Ok(self.array::<1>(offset)?[0] as i8)
    }

    int_readers! {
        le_u16, be_u16, u16;
        le_i16, be_i16, i16;
        le_u32, be_u32, u32;
        le_i32, be_i32, i32;
        le_u64, be_u64, u64;
        le_i64, be_i64, i64;
        le_f32, be_f32, f32;
        le_f64, be_f64, f64;
    }

    /// High-precision composite used by the u-blox HP messages:
    /// `(main * 100 + hp) * scale` where `main` is a little-endian `i32` and
    /// `hp` an `i8` at a separate offset.
    pub fn le_scaled_hp(&self, main: usize, hp: usize, scale: f64) -> Result<f64> {
        let value = i64::from(self.le_i32(main)?) * 100 + i64::from(self.i8(hp)?);
        Ok(value as f64 * scale)
    }

    /// NUL-terminated (or slice-terminated) ASCII string of at most `width`
    /// bytes, non-printables replaced by `.`.
    pub fn string(&self, offset: usize, width: usize) -> Result<String> {
        let raw = self.bytes(offset, width)?;
        Ok(raw
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
            .collect())
    }
}

/// One piece of a navigation-word field: `(word index, right shift, width)`.
pub type Part = (usize, u32, u32);

/// Bit-field reader over an array of navigation words.
///
/// Fields are described declaratively as a list of [`Part`]s, most
/// significant first; the pieces are concatenated into one value.
#[derive(Debug, Clone, Copy)]
pub struct WordReader<'a> {
    words: &'a [u32],
}

impl<'a> WordReader<'a> {
    pub const fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    pub const fn len(&self) -> usize {
        self.words.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Raw word, zero when out of range. Callers validate the word count
    /// before decoding.
    pub fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Unsigned field `width` bits wide, `shift` bits up from bit 0 of
    /// word `index`.
    pub fn bits(&self, index: usize, shift: u32, width: u32) -> u32 {
        let word = self.word(index);
        let shifted = if shift >= 32 { 0 } else { word >> shift };
        if width >= 32 {
            shifted
        } else {
            shifted & ((1u32 << width) - 1)
        }
    }

    /// Signed variant of [`Self::bits`].
    pub fn sbits(&self, index: usize, shift: u32, width: u32) -> i32 {
        sign_extend(self.bits(index, shift, width), width)
    }

    /// Concatenation of `parts`, most significant first.
    pub fn field(&self, parts: &[Part]) -> u64 {
        parts.iter().fold(0u64, |acc, &(index, shift, width)| {
            (acc << width) | u64::from(self.bits(index, shift, width))
        })
    }

    /// Signed concatenation of `parts`, sign bit taken from the total width.
    pub fn sfield(&self, parts: &[Part]) -> i64 {
        let width: u32 = parts.iter().map(|p| p.2).sum();
        sign_extend64(self.field(parts), width)
    }
}
