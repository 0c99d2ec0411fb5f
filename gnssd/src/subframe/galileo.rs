//! Galileo I/NAV words as u-blox delivers them: eight words, the even
//! half page in words 0 to 3, the odd half in words 4 to 7.

use ::log::{debug, trace};

use crate::{bits::WordReader, gnss::GnssId};

use super::{p2, Body, NavCarry, Orbit, OrbitKind, Subframe};

/// Nominal almanac semi-major axis the deltas are relative to, metres.
const A_NOMINAL: f64 = 29_600_000.0;
/// Nominal inclination, semicircles.
const I_NOMINAL: f64 = 56.0 / 180.0;

pub(super) fn decode(carry: &mut NavCarry, tsvid: u8, words: &[u32]) -> Option<Subframe> {
    let r = WordReader::new(words);
    // zero on E5b-I, one on E1-B
    let even = r.bits(0, 31, 1);
    let page_type = r.bits(0, 30, 1);
    let word_type = r.bits(0, 24, 6) as u8;
    trace!("50B,GAL: tSVID {tsvid} {words:08x?}");
    if page_type == 1 {
        debug!("50B,GAL: ignoring alert page");
        return None;
    }
    if even == 1 {
        debug!("50B,GAL: page flipped?");
        return None;
    }
    let mut sf = Subframe::new(GnssId::Galileo, tsvid);
    sf.subframe_num = word_type;
    sf.pageid = word_type;
    let (desc, body) = word(&r, carry, tsvid, word_type, &mut sf);
    carry.gal_last_word = Some(word_type);
    debug!("50B,GAL: word_type {word_type} ({desc})");
    sf.body = body?;
    Some(sf)
}

fn word(
    r: &WordReader<'_>,
    carry: &mut NavCarry,
    tsvid: u8,
    word_type: u8,
    sf: &mut Subframe,
) -> (&'static str, Option<Body>) {
    match word_type {
        0 => {
            // time field is valid only when it reads 2
            if r.bits(0, 22, 2) != 2 {
                return ("Spare Word", None);
            }
            sf.wn = Some(r.bits(3, 18, 12) as u16);
            sf.tow17 = Some(r.field(&[(3, 14, 4), (4, 14, 16)]) as u32);
            ("Spare Word", Some(Body::Empty))
        },
        1..=4 => ("Ephemeris", ephemeris(r, tsvid, word_type)),
        5 => {
            sf.wn = Some(r.bits(2, 11, 12) as u16);
            sf.tow17 = Some(r.field(&[(2, 0, 11), (3, 23, 9)]) as u32);
            ("Ionosphere", Some(Body::Empty))
        },
        6 => {
            sf.tow17 = Some(r.field(&[(3, 14, 7), (4, 17, 13)]) as u32);
            ("GST-UTC", Some(Body::Empty))
        },
        7 => ("Almanacs 1", almanac1(r)),
        8 => ("Almanacs 2", almanac2(r)),
        9 => ("Almanacs 3", almanac3(r, carry)),
        10 => ("Almanacs 4", Some(almanac4(r, carry))),
        16 => ("Reduced Clock and Ephemeris Data", None),
        17 => ("FEC2 Reed-Solomon for Clock and Ephemeris Data", None),
        63 => ("Dummy Page", None),
        _ => ("Unknown Word", None),
    }
}

fn ephemeris(r: &WordReader<'_>, tsvid: u8, word_type: u8) -> Option<Body> {
    let mut orbit = Orbit::new(OrbitKind::Ephemeris, tsvid);
    orbit.iode = Some(r.bits(0, 14, 10) as u16);
    match word_type {
        1 => {
            orbit.toe = Some(r.bits(0, 0, 14) * 60);
            orbit.m0 = p2(-31) * f64::from(r.sbits(1, 0, 32));
            orbit.eccentricity = p2(-33) * f64::from(r.word(2));
            orbit.sqrt_a = p2(-19) * r.field(&[(3, 14, 18), (4, 16, 14)]) as f64;
            if !orbit.plausible() {
                return None;
            }
        },
        2 => {
            orbit.omega0 = p2(-31) * r.sfield(&[(0, 0, 14), (1, 14, 18)]) as f64;
            orbit.i0 = p2(-31) * r.sfield(&[(1, 0, 14), (2, 14, 18)]) as f64;
            orbit.omega = p2(-31) * r.sfield(&[(2, 0, 14), (3, 14, 18)]) as f64;
            orbit.idot = p2(-43) * f64::from(r.sbits(4, 16, 14));
        },
        3 => {
            orbit.omegad = p2(-43) * r.sfield(&[(0, 0, 14), (1, 22, 10)]) as f64;
            orbit.deltan = p2(-43) * f64::from(r.sbits(1, 6, 16));
            orbit.cuc = p2(-29) * r.sfield(&[(1, 0, 6), (2, 22, 10)]) as f64;
            orbit.cus = p2(-29) * f64::from(r.sbits(2, 6, 16));
            orbit.crc = p2(-5) * r.sfield(&[(2, 0, 6), (3, 22, 10)]) as f64;
            orbit.crs = p2(-5) * r.sfield(&[(3, 14, 8), (4, 22, 8)]) as f64;
            orbit.sisa_b = Some(r.bits(4, 14, 8) as u8);
        },
        _ => {
            let svid = r.bits(0, 8, 6);
            if svid != u32::from(tsvid) {
                debug!("50B,GAL: word 4 SVID {svid} from tSVID {tsvid}");
                return None;
            }
            orbit.cic = p2(-29) * r.sfield(&[(0, 0, 8), (1, 24, 8)]) as f64;
            orbit.cis = p2(-29) * f64::from(r.sbits(1, 8, 16));
            orbit.toc = Some(r.field(&[(1, 0, 8), (2, 26, 6)]) as u32 * 60);
            orbit.af0 = p2(-34) * r.sfield(&[(2, 0, 26), (3, 27, 5)]) as f64;
            orbit.af1 = p2(-46) * r.sfield(&[(3, 14, 13), (4, 22, 8)]) as f64;
            orbit.af2 = p2(-59) * f64::from(r.sbits(4, 16, 6));
        },
    }
    Some(Body::Orbits(vec![orbit]))
}

fn valid_svid(sv: u32) -> bool {
    (1..=36).contains(&sv)
}

fn sqrt_a(delta: i64) -> f64 {
    p2(-9) * delta as f64 + A_NOMINAL.sqrt()
}

fn inclination(delta: i64) -> f64 {
    p2(-14) * delta as f64 + I_NOMINAL
}

/// First almanac, SVID1.
fn almanac1(r: &WordReader<'_>) -> Option<Body> {
    let sv = r.bits(0, 2, 6);
    if !valid_svid(sv) {
        // dummy or reserved
        return None;
    }
    let mut orbit = Orbit::new(OrbitKind::Almanac, sv as u8);
    orbit.ioda = Some(r.bits(0, 20, 4) as u8);
    orbit.wn = Some(r.bits(0, 18, 2) as u16);
    orbit.toa = Some(r.bits(0, 8, 10) * 600);
    orbit.sqrt_a = sqrt_a(r.sfield(&[(0, 0, 2), (1, 21, 11)]));
    orbit.eccentricity = p2(-16) * f64::from(r.bits(1, 10, 11));
    orbit.omega = p2(-15) * r.sfield(&[(1, 0, 10), (2, 26, 6)]) as f64;
    orbit.i0 = inclination(i64::from(r.sbits(2, 15, 11)));
    orbit.omega0 = p2(-15) * r.sfield(&[(2, 0, 15), (3, 31, 1)]) as f64;
    orbit.omegad = p2(-33) * f64::from(r.sbits(3, 20, 11));
    orbit.m0 = p2(-15) * r.sfield(&[(3, 14, 6), (4, 20, 10)]) as f64;
    orbit.plausible().then(|| Body::Orbits(vec![orbit]))
}

/// Tail of SVID1, head of SVID2.
fn almanac2(r: &WordReader<'_>) -> Option<Body> {
    let sv2 = r.bits(1, 13, 6);
    if !valid_svid(sv2) {
        return None;
    }
    let ioda = Some(r.bits(0, 20, 4) as u8);
    // SVID1 is not repeated, it is the one before SVID2
    let mut first = Orbit::new(OrbitKind::Almanac, sv2 as u8 - 1);
    first.ioda = ioda;
    first.af0 = p2(-19) * f64::from(r.sbits(0, 4, 16));
    first.af1 = p2(-38) * r.sfield(&[(0, 0, 4), (1, 23, 9)]) as f64;
    first.e5b_hs = Some(r.bits(1, 21, 2) as u8);
    first.e1b_hs = Some(r.bits(1, 19, 2) as u8);

    let mut second = Orbit::new(OrbitKind::Almanac, sv2 as u8);
    second.ioda = ioda;
    second.sqrt_a = sqrt_a(i64::from(r.sbits(1, 0, 13)));
    second.eccentricity = p2(-16) * f64::from(r.bits(2, 21, 11));
    second.omega = p2(-15) * f64::from(r.sbits(2, 5, 16));
    second.i0 = inclination(r.sfield(&[(2, 0, 5), (3, 26, 6)]));
    second.omega0 = p2(-15) * r.sfield(&[(3, 14, 12), (4, 26, 4)]) as f64;
    second.omegad = p2(-33) * f64::from(r.sbits(4, 15, 11));
    second.plausible().then(|| Body::Orbits(vec![first, second]))
}

/// Tail of SVID2, head of SVID3. Word type 10 finishes SVID3 without
/// naming it, so it is carried.
fn almanac3(r: &WordReader<'_>, carry: &mut NavCarry) -> Option<Body> {
    let sv3 = r.bits(2, 17, 6);
    if !valid_svid(sv3) {
        return None;
    }
    carry.gal_svid3 = sv3 as u8;
    let ioda = Some(r.bits(0, 20, 4) as u8);
    let mut first = Orbit::new(OrbitKind::Almanac, sv3 as u8 - 1);
    first.ioda = ioda;
    first.wn = Some(r.bits(0, 18, 2) as u16);
    first.toa = Some(r.bits(0, 8, 10) * 600);
    first.m0 = p2(-15) * r.sfield(&[(0, 0, 8), (1, 24, 8)]) as f64;
    first.af0 = p2(-19) * f64::from(r.sbits(1, 8, 16));
    first.af1 = p2(-38) * r.sfield(&[(1, 0, 8), (2, 27, 5)]) as f64;
    first.e5b_hs = Some(r.bits(2, 25, 2) as u8);
    first.e1b_hs = Some(r.bits(2, 23, 2) as u8);

    let mut second = Orbit::new(OrbitKind::Almanac, sv3 as u8);
    second.ioda = ioda;
    second.sqrt_a = sqrt_a(i64::from(r.sbits(2, 4, 13)));
    second.eccentricity = p2(-16) * r.field(&[(2, 0, 4), (3, 25, 7)]) as f64;
    second.omega = p2(-15) * r.sfield(&[(3, 14, 11), (4, 25, 5)]) as f64;
    second.i0 = inclination(i64::from(r.sbits(4, 14, 11)));
    second.plausible().then(|| Body::Orbits(vec![first, second]))
}

/// Tail of SVID3.
fn almanac4(r: &WordReader<'_>, carry: &NavCarry) -> Body {
    let sv = match carry.gal_last_word {
        Some(9 | 10) => carry.gal_svid3,
        _ => 0,
    };
    let mut orbit = Orbit::new(OrbitKind::Almanac, sv);
    orbit.ioda = Some(r.bits(0, 20, 4) as u8);
    orbit.omega0 = p2(-15) * f64::from(r.sbits(0, 4, 16));
    orbit.omegad = p2(-33) * r.sfield(&[(0, 0, 4), (1, 25, 7)]) as f64;
    orbit.m0 = p2(-15) * f64::from(r.sbits(1, 9, 16));
    orbit.af0 = p2(-19) * r.sfield(&[(1, 0, 9), (2, 25, 7)]) as f64;
    orbit.af1 = p2(-38) * f64::from(r.sbits(2, 12, 13));
    orbit.e5b_hs = Some(r.bits(2, 10, 2) as u8);
    orbit.e1b_hs = Some(r.bits(2, 8, 2) as u8);
    Body::Orbits(vec![orbit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(word_type: u32) -> [u32; 8] {
        let mut w = [0u32; 8];
        w[0] = word_type << 24;
        w
    }

    fn orbits(sf: &Subframe) -> &[Orbit] {
        match &sf.body {
            Body::Orbits(o) => o,
            other => panic!("expected orbits, got {other:?}"),
        }
    }

    #[test]
    fn alert_and_flipped_pages_are_dropped() {
        let mut carry = NavCarry::default();
        let mut w = head(2);
        w[0] |= 1 << 30;
        assert!(decode(&mut carry, 11, &w).is_none());
        let mut w = head(2);
        w[0] |= 1 << 31;
        assert!(decode(&mut carry, 11, &w).is_none());
        assert_eq!(carry.gal_last_word, None);
    }

    #[test]
    fn ephemeris_word1() {
        let mut carry = NavCarry::default();
        let mut w = head(1);
        w[0] |= 77 << 14 | 100;
        w[1] = (-2i32) as u32;
        // sqrtA 5440.6 m^1/2 in 2^-19 units, split 18/14
        let raw = (5440.6 / p2(-19)) as u64;
        w[3] = ((raw >> 14) as u32) << 14;
        w[4] = ((raw & 0x3fff) as u32) << 16;
        let sf = decode(&mut carry, 11, &w).unwrap();
        let orbit = &orbits(&sf)[0];
        assert_eq!(orbit.kind, OrbitKind::Ephemeris);
        assert_eq!(orbit.iode, Some(77));
        assert_eq!(orbit.toe, Some(6000));
        assert_eq!(orbit.m0, -2.0 * p2(-31));
        assert!((orbit.sqrt_a - 5440.6).abs() < 1e-5);

        // a tiny orbit is rejected
        w[3] = 0;
        assert!(decode(&mut carry, 11, &w).is_none());
    }

    #[test]
    fn word4_checks_svid() {
        let mut carry = NavCarry::default();
        let mut w = head(4);
        w[0] |= 12 << 8;
        assert!(decode(&mut carry, 11, &w).is_none());
        w[0] = 4 << 24 | 11 << 8;
        w[4] = 0x3f << 16;
        let sf = decode(&mut carry, 11, &w).unwrap();
        assert_eq!(orbits(&sf)[0].af2, -p2(-59));
    }

    #[test]
    fn time_words() {
        let mut carry = NavCarry::default();
        let mut w = head(0);
        assert!(decode(&mut carry, 11, &w).is_none());
        w[0] |= 2 << 22;
        w[3] = 1300 << 18 | 0x3 << 14;
        w[4] = 0x1234 << 14;
        let sf = decode(&mut carry, 11, &w).unwrap();
        assert_eq!(sf.wn, Some(1300));
        assert_eq!(sf.tow17, Some(0x3_1234));
        assert_eq!(sf.body, Body::Empty);

        let mut w = head(5);
        w[2] = 1301 << 11 | 0x7ff;
        w[3] = 0x1ff << 23;
        let sf = decode(&mut carry, 11, &w).unwrap();
        assert_eq!(sf.wn, Some(1301));
        assert_eq!(sf.tow17, Some(0xfffff));
    }

    #[test]
    fn almanac_svid3_carries_into_word10() {
        let mut carry = NavCarry::default();
        let mut w = head(9);
        w[2] = 14 << 17;
        let sf = decode(&mut carry, 11, &w).unwrap();
        let pair = orbits(&sf);
        assert_eq!((pair[0].sv, pair[1].sv), (13, 14));
        assert!(pair[1].sqrt_a > 5440.0);
        assert_eq!(carry.gal_svid3, 14);

        let mut w = head(10);
        w[2] = 0x1fff << 12;
        let sf = decode(&mut carry, 11, &w).unwrap();
        let orbit = &orbits(&sf)[0];
        assert_eq!(orbit.sv, 14);
        assert_eq!(orbit.af1, -p2(-38));

        // without word 9 just before, SVID3 is unknown
        decode(&mut carry, 11, &head(63));
        let sf = decode(&mut carry, 11, &head(10)).unwrap();
        assert_eq!(orbits(&sf)[0].sv, 0);
    }

    #[test]
    fn reserved_almanac_slots() {
        let mut carry = NavCarry::default();
        assert!(decode(&mut carry, 11, &head(7)).is_none());
        let mut w = head(7);
        w[0] |= 5 << 2;
        let sf = decode(&mut carry, 11, &w).unwrap();
        let orbit = &orbits(&sf)[0];
        assert_eq!(orbit.sv, 5);
        assert_eq!(orbit.i0, I_NOMINAL);
        assert!(decode(&mut carry, 11, &head(8)).is_none());
    }
}
