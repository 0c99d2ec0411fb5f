//! Navigation message subframes.
//!
//! Receivers that pass raw navigation data through (u-blox RXM-SFRBX and
//! RXM-SFRB among them) hand over arrays of words. Two entry points exist:
//!
//! * [`decode`] takes GPS LNAV words with parity already removed, 24 data
//!   bits right-aligned in each word.
//! * [`decode_raw`] takes the words as they came off the air. GPS and QZSS
//!   words are 30-bit IS-GPS-200 words that still carry parity; Galileo,
//!   BeiDou and GLONASS words are in the u-blox SFRBX layout.
//!
//! Both return `None` when the words carry nothing worth publishing: bad
//! preamble, failed parity, reserved pages, alert pages and so on.

mod beidou;
mod galileo;
mod glonass;
mod gps;

use ::log::{info, warn};

use crate::{context::Context, gnss::GnssId};

/// Orbit parameter set kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum OrbitKind {
    #[default]
    Unknown,
    Almanac,
    Ephemeris,
}

/// Orbit and clock parameters in the units of the signal ICDs: angles in
/// semicircles, times in seconds, `sqrt_a` in sqrt(metres).
///
/// One word of a Galileo or BeiDou message fills a handful of these; the
/// rest stay NaN or `None`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Orbit {
    pub kind: OrbitKind,
    /// Satellite the parameters describe, 0 when unknown.
    pub sv: u8,
    pub wn: Option<u16>,
    /// BeiDou age of data, clock.
    pub aodc: Option<u8>,
    /// BeiDou age of data, ephemeris.
    pub aode: Option<u8>,
    /// Galileo IODnav.
    pub iode: Option<u16>,
    pub ioda: Option<u8>,
    pub urai: Option<u8>,
    pub toa: Option<u32>,
    pub toc: Option<u32>,
    pub toe: Option<u32>,
    /// BeiDou splits toe over two subframes.
    pub toe_msb: Option<u32>,
    pub toe_lsb: Option<u32>,
    pub sqrt_a: f64,
    pub eccentricity: f64,
    pub i0: f64,
    pub deltai: f64,
    pub omega0: f64,
    pub omegad: f64,
    pub omega: f64,
    pub m0: f64,
    pub deltan: f64,
    pub idot: f64,
    pub cuc: f64,
    pub cus: f64,
    pub crc: f64,
    pub crs: f64,
    pub cic: f64,
    pub cis: f64,
    pub af0: f64,
    pub af1: f64,
    pub af2: f64,
    /// Group delays, ns.
    pub tgd1: f64,
    pub tgd2: f64,
    pub alpha: [f64; 4],
    pub beta: [f64; 4],
    /// Galileo SISA(E1, E5b) index.
    pub sisa_b: Option<u8>,
    pub e5b_hs: Option<u8>,
    pub e1b_hs: Option<u8>,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            kind: OrbitKind::Unknown,
            sv: 0,
            wn: None,
            aodc: None,
            aode: None,
            iode: None,
            ioda: None,
            urai: None,
            toa: None,
            toc: None,
            toe: None,
            toe_msb: None,
            toe_lsb: None,
            sqrt_a: f64::NAN,
            eccentricity: f64::NAN,
            i0: f64::NAN,
            deltai: f64::NAN,
            omega0: f64::NAN,
            omegad: f64::NAN,
            omega: f64::NAN,
            m0: f64::NAN,
            deltan: f64::NAN,
            idot: f64::NAN,
            cuc: f64::NAN,
            cus: f64::NAN,
            crc: f64::NAN,
            crs: f64::NAN,
            cic: f64::NAN,
            cis: f64::NAN,
            af0: f64::NAN,
            af1: f64::NAN,
            af2: f64::NAN,
            tgd1: f64::NAN,
            tgd2: f64::NAN,
            alpha: [f64::NAN; 4],
            beta: [f64::NAN; 4],
            sisa_b: None,
            e5b_hs: None,
            e1b_hs: None,
        }
    }
}

impl Orbit {
    fn new(kind: OrbitKind, sv: u8) -> Self {
        Self {
            kind,
            sv,
            ..Self::default()
        }
    }

    /// A semi-major axis shorter than the Earth's radius is garbage.
    fn plausible(&self) -> bool {
        self.sqrt_a >= 2600.0
    }
}

/// GPS subframe 1: clock correction for the transmitting satellite.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Clock {
    /// Full GPS week, the 10-bit broadcast value resolved against the
    /// rollovers the context knows about.
    pub wn: u16,
    /// L2 code flags.
    pub l2: u8,
    pub ura: u8,
    pub health: u8,
    pub iodc: u16,
    pub l2p: bool,
    pub tgd: f64,
    pub toc: u32,
    pub af2: f64,
    pub af1: f64,
    pub af0: f64,
}

/// GPS subframe 2.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ephemeris1 {
    pub iode: u8,
    pub crs: f64,
    pub deltan: f64,
    pub m0: f64,
    pub cuc: f64,
    pub eccentricity: f64,
    pub cus: f64,
    pub sqrt_a: f64,
    pub toe: u32,
    pub fit: bool,
    /// Age of data offset, seconds.
    pub aodo: u32,
}

/// GPS subframe 3.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ephemeris2 {
    pub cic: f64,
    pub omega0: f64,
    pub cis: f64,
    pub i0: f64,
    pub crc: f64,
    pub omega: f64,
    pub omegad: f64,
    pub iode: u8,
    pub idot: f64,
}

/// GPS almanac page, subframe 4 or 5.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Almanac {
    pub sv: u8,
    pub eccentricity: f64,
    pub toa: u32,
    pub deltai: f64,
    pub omegad: f64,
    pub health: u8,
    pub sqrt_a: f64,
    pub omega0: f64,
    pub omega: f64,
    pub m0: f64,
    pub af0: f64,
    pub af1: f64,
}

/// Navigation message correction table, subframe 4 page 13.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Nmct {
    pub ai: u8,
    /// Estimated range deviation of SV `n` at index `n - 1`. The
    /// transmitting satellite's own slot reads -32, "not available".
    pub erd: [i8; 31],
}

/// Subframe 4 page 18.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IonoUtc {
    pub alpha: [f64; 4],
    pub beta: [f64; 4],
    pub a0: f64,
    pub a1: f64,
    pub tot: u32,
    pub wnt: u8,
    /// Current GPS minus UTC.
    pub leap: i8,
    pub wnlsf: u8,
    pub dn: u8,
    /// GPS minus UTC after the scheduled change.
    pub lsf: i8,
}

/// Subframe 4 page 25: anti-spoofing flags and SV configuration for
/// SVs 1 to 32, health of SVs 25 to 32.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SvConfig {
    pub svf: [u8; 32],
    pub health: [u8; 8],
}

/// Subframe 5 page 25: almanac reference and health of SVs 1 to 24.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AlmanacHealth {
    pub toa: u32,
    pub wna: u8,
    pub health: [u8; 24],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Body {
    /// Header only, such as a Galileo time word.
    Empty,
    Clock(Clock),
    Ephemeris1(Ephemeris1),
    Ephemeris2(Ephemeris2),
    Almanac(Almanac),
    Nmct(Nmct),
    SystemMessage(String),
    IonoUtc(IonoUtc),
    SvConfig(SvConfig),
    AlmanacHealth(AlmanacHealth),
    /// Galileo and BeiDou parameter sets. Galileo almanac words can
    /// describe two satellites.
    Orbits(Vec<Orbit>),
}

/// One decoded subframe, page or word.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Subframe {
    pub gnss: GnssId,
    /// Transmitting satellite.
    pub tsvid: u8,
    /// GPS subframe 1 to 5, BeiDou FraID, Galileo word type.
    pub subframe_num: u8,
    /// GPS subframe 4 and 5 page (the "SV ID" of IS-GPS-200 table 20-V),
    /// Galileo word type.
    pub pageid: u8,
    pub data_id: u8,
    /// Time of week of the next subframe, seconds.
    pub tow17: Option<u32>,
    pub wn: Option<u16>,
    pub integrity: bool,
    pub antispoof: bool,
    pub alert: bool,
    pub body: Body,
}

impl Subframe {
    fn new(gnss: GnssId, tsvid: u8) -> Self {
        Self {
            gnss,
            tsvid,
            subframe_num: 0,
            pageid: 0,
            data_id: 0,
            tow17: None,
            wn: None,
            integrity: false,
            antispoof: false,
            alert: false,
            body: Body::Empty,
        }
    }
}

/// State one navigation word leaves for the next.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NavCarry {
    /// Galileo word type last seen.
    pub(crate) gal_last_word: Option<u8>,
    /// SVID3 of the last Galileo word type 9, which word type 10 continues.
    gal_svid3: u8,
}

/// `2^exp`.
fn p2(exp: i32) -> f64 {
    2f64.powi(exp)
}

/// Decode parity-free GPS or QZSS LNAV words.
///
/// Subframe 1 updates the context's GPS week; subframe 4 page 18 updates
/// its leap second count and leap notification.
pub fn decode(ctx: &mut Context, gnss: GnssId, tsvid: u8, words: &[u32]) -> Option<Subframe> {
    if words.len() < 10 {
        warn!("50B,{}: expected 10 words, got {}", gnss.name(), words.len());
        return None;
    }
    let mut data = [0u32; 10];
    data.copy_from_slice(&words[..10]);
    gps::decode(ctx, gnss, tsvid, &mut data)
}

/// Decode words as transmitted, `gnss_id` being the u-blox constellation id.
pub fn decode_raw(
    ctx: &mut Context,
    carry: &mut NavCarry,
    gnss_id: u8,
    tsvid: u8,
    words: &[u32],
) -> Option<Subframe> {
    let gnss = match GnssId::from_u8(gnss_id) {
        Some(g @ (GnssId::Gps | GnssId::Qzss | GnssId::Galileo | GnssId::BeiDou | GnssId::Glonass)) => g,
        Some(GnssId::Sbas) => {
            info!("50B,SBAS: subframe protocol is not publicly documented");
            return None;
        },
        _ => {
            info!("50B: unsupported gnssId {gnss_id}");
            return None;
        },
    };
    let expected = match gnss {
        GnssId::Galileo => 8,
        GnssId::Glonass => 4,
        _ => 10,
    };
    let exact = !matches!(gnss, GnssId::Gps | GnssId::Qzss);
    if words.len() < expected || (exact && words.len() != expected) {
        warn!(
            "50B: gnssId {gnss_id} expected {expected} words, got {}",
            words.len()
        );
        return None;
    }
    match gnss {
        GnssId::Galileo => galileo::decode(carry, tsvid, words),
        GnssId::BeiDou => beidou::decode(tsvid, words),
        GnssId::Glonass => {
            glonass::decode(tsvid, words);
            None
        },
        _ => {
            let mut data = [0u32; 10];
            data.copy_from_slice(&words[..10]);
            if !gps::strip_parity(&mut data) {
                return None;
            }
            gps::decode(ctx, gnss, tsvid, &mut data)
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::checksum::isgps_parity;

    /// Put 24-bit data words on the air: parity appended, data bits
    /// inverted after a word ending in D30 = 1, D29*/D30* copied into bits
    /// 31 and 30 the way u-blox reports them.
    pub(crate) fn encode(data: &[u32; 10]) -> [u32; 10] {
        let mut out = [0u32; 10];
        let mut prev = 0u32;
        for (slot, &d) in out.iter_mut().zip(data) {
            let mut w = (d & 0x00ff_ffff) << 6 | (prev & 0x3) << 30;
            w |= u32::from(isgps_parity(w));
            prev = w;
            if w & 0x4000_0000 != 0 {
                w ^= 0x3fff_ffc0;
            }
            *slot = w;
        }
        out
    }

    #[test]
    fn sbas_and_unknown_are_ignored() {
        let mut ctx = Context::new(1_717_200_000);
        let mut carry = NavCarry::default();
        assert!(decode_raw(&mut ctx, &mut carry, 1, 120, &[0; 10]).is_none());
        assert!(decode_raw(&mut ctx, &mut carry, 9, 1, &[0; 10]).is_none());
    }

    #[test]
    fn word_counts_are_checked() {
        let mut ctx = Context::new(1_717_200_000);
        let mut carry = NavCarry::default();
        assert!(decode_raw(&mut ctx, &mut carry, 2, 11, &[0; 9]).is_none());
        assert!(decode_raw(&mut ctx, &mut carry, 3, 11, &[0; 8]).is_none());
        assert!(decode(&mut ctx, GnssId::Gps, 3, &[0; 9]).is_none());
    }

    #[test]
    fn orbit_defaults_unset() {
        let orbit = Orbit::default();
        assert!(orbit.sqrt_a.is_nan());
        assert!(!orbit.plausible());
        assert_eq!(orbit.toe, None);
    }
}
