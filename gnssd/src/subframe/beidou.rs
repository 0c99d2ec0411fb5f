//! BeiDou D1 navigation message, ten words.
//!
//! u-blox keeps each 30-bit word in the low 30 bits: word 0 has 26 data
//! bits over 4 parity bits, the others 22 data bits over 8 parity bits.

use ::log::{debug, trace};

use crate::{bits::WordReader, gnss::GnssId};

use super::{p2, Body, Orbit, OrbitKind, Subframe};

pub(super) fn decode(tsvid: u8, words: &[u32]) -> Option<Subframe> {
    let r = WordReader::new(words);
    let fraid = r.bits(0, 12, 3) as u8;
    let sow = r.field(&[(0, 4, 8), (1, 18, 12)]) as u32;
    trace!("50B,BDS: {words:08x?}");
    let mut sf = Subframe::new(GnssId::BeiDou, tsvid);
    sf.subframe_num = fraid;
    sf.tow17 = Some(sow);

    let (desc, orbit) = match fraid {
        1 => ("Ephemeris 1", Some(clock(&r, tsvid, &mut sf))),
        2 => ("Ephemeris 2", ephemeris2(&r, tsvid)),
        3 => ("Ephemeris 3", Some(ephemeris3(&r, tsvid))),
        4 => match r.bits(1, 10, 7) {
            pnum @ 1..=24 => ("Almanac 1", almanac(&r, pnum as u8)),
            _ => ("Reserved", None),
        },
        5 => page5(&r),
        _ => ("Unknown FraID", None),
    };
    debug!("50B,BDS: FraID {fraid} ({desc}) SOW {sow}");
    sf.body = Body::Orbits(vec![orbit?]);
    Some(sf)
}

/// Clock, group delay and ionosphere of the transmitting satellite.
fn clock(r: &WordReader<'_>, tsvid: u8, sf: &mut Subframe) -> Orbit {
    let mut orbit = Orbit::new(OrbitKind::Ephemeris, tsvid);
    orbit.aodc = Some(r.bits(1, 12, 5) as u8);
    orbit.urai = Some(r.bits(1, 8, 4) as u8);
    let wn = r.bits(2, 17, 13) as u16;
    sf.wn = Some(wn);
    orbit.wn = Some(wn);
    orbit.toc = Some((r.field(&[(2, 8, 9), (3, 22, 8)]) as u32) << 3);
    // 0.1 ns units
    orbit.tgd1 = 0.1 * f64::from(r.sbits(3, 12, 10));
    orbit.tgd2 = 0.1 * r.sfield(&[(3, 8, 4), (4, 24, 6)]) as f64;
    orbit.alpha = [
        p2(-30) * f64::from(r.sbits(4, 16, 8)),
        p2(-27) * f64::from(r.sbits(4, 8, 8)),
        p2(-24) * f64::from(r.sbits(5, 22, 8)),
        p2(-24) * f64::from(r.sbits(5, 14, 8)),
    ];
    orbit.beta = [
        p2(11) * r.sfield(&[(5, 8, 6), (6, 28, 2)]) as f64,
        p2(14) * f64::from(r.sbits(6, 20, 8)),
        p2(16) * f64::from(r.sbits(6, 12, 8)),
        p2(16) * r.sfield(&[(6, 8, 4), (7, 26, 4)]) as f64,
    ];
    orbit.af2 = p2(-66) * f64::from(r.sbits(7, 15, 11));
    orbit.af0 = p2(-33) * r.sfield(&[(7, 8, 7), (8, 13, 17)]) as f64;
    orbit.af1 = p2(-50) * r.sfield(&[(8, 8, 5), (9, 13, 17)]) as f64;
    orbit.aode = Some(r.bits(9, 8, 5) as u8);
    orbit
}

fn ephemeris2(r: &WordReader<'_>, tsvid: u8) -> Option<Orbit> {
    let mut orbit = Orbit::new(OrbitKind::Ephemeris, tsvid);
    orbit.deltan = p2(-43) * r.sfield(&[(1, 8, 10), (2, 24, 6)]) as f64;
    orbit.cuc = p2(-31) * r.sfield(&[(2, 8, 16), (3, 28, 2)]) as f64;
    orbit.m0 = p2(-31) * r.sfield(&[(3, 8, 20), (4, 18, 12)]) as f64;
    orbit.eccentricity = p2(-33) * r.field(&[(4, 8, 10), (5, 8, 22)]) as f64;
    orbit.cus = p2(-31) * f64::from(r.sbits(6, 12, 18));
    orbit.crc = p2(-6) * r.sfield(&[(6, 8, 4), (7, 16, 14)]) as f64;
    orbit.crs = p2(-6) * r.sfield(&[(7, 8, 8), (8, 20, 10)]) as f64;
    orbit.sqrt_a = p2(-19) * r.field(&[(8, 8, 12), (9, 10, 20)]) as f64;
    // top two of the 17 toe bits, in units of 8 s
    orbit.toe_msb = Some(r.bits(9, 8, 2) << 18);
    orbit.plausible().then_some(orbit)
}

fn ephemeris3(r: &WordReader<'_>, tsvid: u8) -> Orbit {
    let mut orbit = Orbit::new(OrbitKind::Ephemeris, tsvid);
    orbit.toe_lsb = Some((r.field(&[(1, 8, 10), (2, 25, 5)]) as u32) << 3);
    orbit.i0 = p2(-31) * r.sfield(&[(2, 8, 17), (3, 15, 15)]) as f64;
    orbit.cic = p2(-31) * r.sfield(&[(3, 8, 7), (4, 19, 11)]) as f64;
    orbit.omegad = p2(-43) * r.sfield(&[(4, 8, 11), (5, 17, 13)]) as f64;
    orbit.cis = p2(-31) * r.sfield(&[(5, 8, 9), (6, 21, 9)]) as f64;
    orbit.idot = p2(-43) * r.sfield(&[(6, 8, 13), (7, 29, 1)]) as f64;
    orbit.omega0 = p2(-31) * r.sfield(&[(7, 8, 21), (8, 19, 11)]) as f64;
    orbit.omega = p2(-31) * r.sfield(&[(8, 8, 11), (9, 9, 21)]) as f64;
    orbit
}

/// Subframe 5 pages: almanacs for SVs 25 and up, health, time offsets.
fn page5(r: &WordReader<'_>) -> (&'static str, Option<Orbit>) {
    let pnum = r.bits(1, 10, 7);
    let amepid = r.bits(9, 8, 2);
    let sv = match pnum {
        1..=6 if amepid == 3 => pnum + 24,
        1..=6 => return ("Reserved", None),
        11..=23 => match amepid {
            1 => pnum + 20,
            2 => pnum + 33,
            3 if pnum + 46 <= 63 => pnum + 46,
            _ => return ("Reserved", None),
        },
        7 => return ("Health 1", None),
        8 => return ("Health 20", None),
        9 => return ("GST-GPS", None),
        10 => return ("GST-UTC", None),
        _ => return ("Other", None),
    };
    ("Almanac 2", almanac(r, sv as u8))
}

fn almanac(r: &WordReader<'_>, sv: u8) -> Option<Orbit> {
    let raw = r.field(&[(1, 8, 2), (2, 8, 22)]);
    if raw == 0 {
        // it happens
        return None;
    }
    let mut orbit = Orbit::new(OrbitKind::Almanac, sv);
    orbit.sqrt_a = p2(-11) * raw as f64;
    if !orbit.plausible() {
        return None;
    }
    orbit.af1 = p2(-38) * f64::from(r.sbits(3, 19, 11));
    orbit.af0 = p2(-20) * f64::from(r.sbits(3, 8, 11));
    orbit.omega0 = p2(-23) * r.sfield(&[(4, 8, 22), (5, 28, 2)]) as f64;
    orbit.eccentricity = p2(-21) * f64::from(r.bits(5, 11, 17));
    orbit.deltai = p2(-19) * r.sfield(&[(5, 8, 3), (6, 17, 13)]) as f64;
    // reference inclination is 0 for GEO, 0.3 semicircles otherwise
    orbit.i0 = if matches!(sv, 1..=6 | 59..=63) {
        orbit.deltai
    } else {
        orbit.deltai + 0.30
    };
    orbit.toa = Some(r.bits(6, 9, 8) << 12);
    orbit.omegad = p2(-38) * r.sfield(&[(6, 8, 1), (7, 14, 16)]) as f64;
    orbit.omega = p2(-23) * r.sfield(&[(7, 8, 6), (8, 12, 18)]) as f64;
    orbit.m0 = p2(-23) * r.sfield(&[(8, 8, 4), (9, 10, 20)]) as f64;
    Some(orbit)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// FraID and SOW in the first two words.
    fn head(fraid: u32, sow: u32) -> [u32; 10] {
        let mut w = [0u32; 10];
        w[0] = 0x712 << 19 | fraid << 12 | (sow >> 12 & 0xff) << 4;
        w[1] = (sow & 0xfff) << 18;
        w
    }

    fn orbit(sf: &Subframe) -> &Orbit {
        match &sf.body {
            Body::Orbits(o) => &o[0],
            other => panic!("expected an orbit, got {other:?}"),
        }
    }

    #[test]
    fn fra1_clock_and_iono() {
        let mut w = head(1, 345_600);
        w[1] |= 7 << 12 | 3 << 8;
        w[2] = 930 << 17 | 0x1ff << 8;
        w[3] = 0xff << 22 | 0x3ff << 12;
        w[4] = 0x05 << 16;
        w[5] = 0x3f << 8;
        w[6] = 0x3 << 28;
        w[9] = 0x15 << 8;
        let sf = decode(21, &w).unwrap();
        assert_eq!(sf.subframe_num, 1);
        assert_eq!(sf.tow17, Some(345_600));
        assert_eq!(sf.wn, Some(930));
        let o = orbit(&sf);
        assert_eq!(o.aodc, Some(7));
        assert_eq!(o.urai, Some(3));
        assert_eq!(o.toc, Some(0x1_ffff << 3));
        assert!((o.tgd1 + 0.1).abs() < 1e-12);
        assert_eq!(o.alpha[0], 5.0 * p2(-30));
        assert_eq!(o.beta[0], -p2(11));
        assert_eq!(o.aode, Some(0x15));
    }

    #[test]
    fn fra2_rejects_short_axis() {
        let mut w = head(2, 100);
        assert!(decode(21, &w).is_none());
        // sqrtA 5282.6 in 2^-19 units, split 12/20
        let raw = (5282.6 / p2(-19)) as u64;
        w[8] = ((raw >> 20) as u32) << 8;
        w[9] = ((raw & 0xf_ffff) as u32) << 10 | 0x2 << 8;
        let sf = decode(21, &w).unwrap();
        let o = orbit(&sf);
        assert!((o.sqrt_a - 5282.6).abs() < 1e-5);
        assert_eq!(o.toe_msb, Some(2 << 18));
    }

    #[test]
    fn almanac_sv_mapping() {
        let mut w = head(5, 100);
        // sqrtA 5282 m^1/2 in 2^-11 units
        let raw = (5282.0 / p2(-11)) as u32;
        w[1] |= (raw >> 22) << 8;
        w[2] = (raw & 0x3f_ffff) << 8;

        w[1] |= 12 << 10;
        w[9] = 2 << 8;
        let sf = decode(21, &w).unwrap();
        assert_eq!(orbit(&sf).sv, 45);
        assert_eq!(orbit(&sf).kind, OrbitKind::Almanac);
        assert!((orbit(&sf).i0 - 0.30).abs() < 1e-12);

        // Pnum 1..6 only with AmEpID 3
        w[1] = w[1] & !(0x7f << 10) | 3 << 10;
        assert!(decode(21, &w).is_none());
        w[9] = 3 << 8;
        let sf = decode(21, &w).unwrap();
        assert_eq!(orbit(&sf).sv, 27);

        // health page
        w[1] = w[1] & !(0x7f << 10) | 7 << 10;
        assert!(decode(21, &w).is_none());
    }

    #[test]
    fn fra4_geo_inclination() {
        let mut w = head(4, 100);
        let raw = (6493.0 / p2(-11)) as u32;
        w[1] |= 2 << 10 | (raw >> 22) << 8;
        w[2] = (raw & 0x3f_ffff) << 8;
        let sf = decode(21, &w).unwrap();
        let o = orbit(&sf);
        assert_eq!(o.sv, 2);
        assert_eq!(o.i0, o.deltai);
    }
}
