//! GPS and QZSS LNAV, IS-GPS-200 section 20.3.

use ::log::{debug, trace, warn};

use crate::{
    bits::{sign_extend, WordReader},
    checksum::isgps_parity,
    context::{Context, ContextFlags, LeapNotify, SECS_PER_DAY},
    gnss::GnssId,
};

use super::{
    p2, Almanac, AlmanacHealth, Body, Clock, Ephemeris1, Ephemeris2, IonoUtc, Nmct, Subframe,
    SvConfig,
};

const PREAMBLE: u32 = 0x74;
const PREAMBLE_INVERTED: u32 = 0x8b;
/// Data bits D1..D24 of a 30-bit word.
const DATA_MASK: u32 = 0x3fff_ffc0;
/// D30* of the previous word.
const D30_STAR: u32 = 0x4000_0000;

/// Undo D30* inversion, check parity and drop it, in place.
///
/// Word 0 carries no usable D29*/D30*; its preamble is checked instead.
pub(super) fn strip_parity(words: &mut [u32; 10]) -> bool {
    let preamble = (words[0] >> 22) & 0xff;
    if preamble == PREAMBLE_INVERTED {
        words[0] ^= DATA_MASK;
    } else if preamble != PREAMBLE {
        // very common, not worth more than a trace
        trace!("50B,GPS: bad raw preamble {preamble:#x}");
        return false;
    }
    words[0] = (words[0] >> 6) & 0x00ff_ffff;
    for (i, word) in words.iter_mut().enumerate().skip(1) {
        if *word & D30_STAR != 0 {
            *word ^= DATA_MASK;
        }
        let parity = u32::from(isgps_parity(*word));
        if parity != *word & 0x3f {
            trace!("50B,GPS: parity fail word {i}: {parity:#04x} != {:#04x}", *word & 0x3f);
            return false;
        }
        *word = (*word >> 6) & 0x00ff_ffff;
    }
    true
}

pub(super) fn decode(ctx: &mut Context, gnss: GnssId, tsvid: u8, words: &mut [u32; 10]) -> Option<Subframe> {
    trace!("50B,GPS: ({}, {tsvid}) {words:06x?}", gnss.name());
    let mut preamble = (words[0] >> 16) & 0xff;
    if preamble == PREAMBLE_INVERTED {
        // an inversion slipped past the receiver
        preamble ^= 0xff;
        words[0] ^= 0x00ff_ffff;
    }
    if preamble != PREAMBLE {
        warn!("50B,GPS: bad preamble {preamble:#x} header {:#08x}", words[0]);
        return None;
    }
    let r = WordReader::new(&words[..]);
    let mut sf = Subframe::new(gnss, tsvid);
    sf.integrity = r.bits(0, 1, 1) != 0;
    sf.subframe_num = r.bits(1, 2, 3) as u8;
    sf.antispoof = r.bits(1, 5, 1) != 0;
    sf.alert = r.bits(1, 6, 1) != 0;
    sf.tow17 = Some(r.bits(1, 7, 17) * 6);
    sf.pageid = r.bits(2, 16, 6) as u8;
    sf.data_id = r.bits(2, 22, 2) as u8;
    debug!(
        "50B,GPS: SF:{} SV:{tsvid:2} TOW17:{:7} Alert:{} AS:{} IF:{}",
        sf.subframe_num,
        r.bits(1, 7, 17) * 6,
        u8::from(sf.alert),
        u8::from(sf.antispoof),
        u8::from(sf.integrity)
    );

    sf.body = match sf.subframe_num {
        1 => Body::Clock(clock(ctx, &r)),
        2 => Body::Ephemeris1(ephemeris1(&r)),
        3 => Body::Ephemeris2(ephemeris2(&r)),
        4 => subframe4(ctx, &r, tsvid, sf.pageid)?,
        5 => match sf.pageid {
            0..=24 => Body::Almanac(almanac(&r, sf.pageid)),
            // page 25 goes out as SV ID 51
            51 => Body::AlmanacHealth(almanac_health(&r)),
            page => {
                debug!("50B,GPS: SF:5-{page} data_id {} unknown page", sf.data_id);
                return None;
            },
        },
        _ => return None,
    };
    if let Body::Clock(clock) = &sf.body {
        sf.wn = Some(clock.wn);
    }
    Some(sf)
}

fn clock(ctx: &mut Context, r: &WordReader<'_>) -> Clock {
    // only 10 bits of week on LNAV
    let wn10 = r.bits(2, 14, 10);
    let wn = (wn10 + ctx.rollovers.max(0) as u32 * 1024) as u16;
    ctx.gps_week = wn;
    let clock = Clock {
        wn,
        l2: r.bits(2, 12, 2) as u8,
        ura: r.bits(2, 8, 4) as u8,
        health: r.bits(2, 2, 6) as u8,
        iodc: r.field(&[(2, 0, 2), (7, 16, 8)]) as u16,
        l2p: r.bits(3, 23, 1) != 0,
        tgd: p2(-31) * f64::from(r.sbits(6, 0, 8)),
        toc: r.bits(7, 0, 16) << 4,
        af2: p2(-55) * f64::from(r.sbits(8, 16, 8)),
        af1: p2(-43) * f64::from(r.sbits(8, 0, 16)),
        af0: p2(-31) * f64::from(r.sbits(9, 2, 22)),
    };
    debug!(
        "50B,GPS: SF:1 WN:{} IODC:{} L2:{} ura:{} hlth:{} L2P:{} Tgd:{:e} toc:{} af2:{:.4e} af1:{:.6e} af0:{:.7e}",
        clock.wn,
        clock.iodc,
        clock.l2,
        clock.ura,
        clock.health,
        u8::from(clock.l2p),
        clock.tgd,
        clock.toc,
        clock.af2,
        clock.af1,
        clock.af0
    );
    clock
}

fn ephemeris1(r: &WordReader<'_>) -> Ephemeris1 {
    let eph = Ephemeris1 {
        iode: r.bits(2, 16, 8) as u8,
        crs: p2(-5) * f64::from(r.sbits(2, 0, 16)),
        deltan: p2(-43) * f64::from(r.sbits(3, 8, 16)),
        m0: p2(-31) * r.sfield(&[(3, 0, 8), (4, 0, 24)]) as f64,
        cuc: p2(-29) * f64::from(r.sbits(5, 8, 16)),
        eccentricity: p2(-33) * r.field(&[(5, 0, 8), (6, 0, 24)]) as f64,
        cus: p2(-29) * f64::from(r.sbits(7, 8, 16)),
        sqrt_a: p2(-19) * r.field(&[(7, 0, 8), (8, 0, 24)]) as f64,
        toe: r.bits(9, 8, 16) << 4,
        fit: r.bits(9, 7, 1) != 0,
        aodo: r.bits(9, 2, 5) * 900,
    };
    debug!(
        "50B,GPS: SF:2 IODE:{} Crs:{:.6e} deltan:{:.6e} M0:{:.11e} Cuc:{:.6e} e:{:.11e} Cus:{:.6e} sqrtA:{:.11} toe:{} FIT:{} AODO:{}",
        eph.iode,
        eph.crs,
        eph.deltan,
        eph.m0,
        eph.cuc,
        eph.eccentricity,
        eph.cus,
        eph.sqrt_a,
        eph.toe,
        u8::from(eph.fit),
        eph.aodo
    );
    eph
}

fn ephemeris2(r: &WordReader<'_>) -> Ephemeris2 {
    let eph = Ephemeris2 {
        cic: p2(-29) * f64::from(r.sbits(2, 8, 16)),
        omega0: p2(-31) * r.sfield(&[(2, 0, 8), (3, 0, 24)]) as f64,
        cis: p2(-29) * f64::from(r.sbits(4, 8, 16)),
        i0: p2(-31) * r.sfield(&[(4, 0, 8), (5, 0, 24)]) as f64,
        crc: p2(-5) * f64::from(r.sbits(6, 8, 16)),
        omega: p2(-31) * r.sfield(&[(6, 0, 8), (7, 0, 24)]) as f64,
        omegad: p2(-43) * f64::from(r.sbits(8, 0, 24)),
        iode: r.bits(9, 16, 8) as u8,
        idot: p2(-43) * f64::from(r.sbits(9, 2, 14)),
    };
    debug!(
        "50B,GPS: SF:3 Cic:{:.6e} Omega0:{:.11e} Cis:{:.7e} i0:{:.11e} Crc:{:.7e} omega:{:.11e} Omegad:{:.6e} IODE:{} IDOT:{:.6e}",
        eph.cic, eph.omega0, eph.cis, eph.i0, eph.crc, eph.omega, eph.omegad, eph.iode, eph.idot
    );
    eph
}

/// Almanac layout shared by subframes 4 and 5.
fn almanac(r: &WordReader<'_>, sv: u8) -> Almanac {
    let alm = Almanac {
        sv,
        eccentricity: p2(-21) * f64::from(r.bits(2, 0, 16)),
        toa: r.bits(3, 16, 8) << 12,
        deltai: p2(-19) * f64::from(r.sbits(3, 0, 16)),
        omegad: p2(-38) * f64::from(r.sbits(4, 8, 16)),
        health: r.bits(4, 0, 8) as u8,
        sqrt_a: p2(-11) * f64::from(r.bits(5, 0, 24)),
        omega0: p2(-23) * f64::from(r.sbits(6, 0, 24)),
        omega: p2(-23) * f64::from(r.sbits(7, 0, 24)),
        m0: p2(-23) * f64::from(r.sbits(8, 0, 24)),
        af0: p2(-20) * r.sfield(&[(9, 16, 8), (9, 2, 3)]) as f64,
        af1: p2(-38) * f64::from(r.sbits(9, 5, 11)),
    };
    debug!(
        "50B,GPS: almanac SV:{:2} e:{:e} toa:{} deltai:{:.10e} Omegad:{:.5e} svh:{} sqrtA:{:.10} Omega0:{:.10e} omega:{:.10e} M0:{:.11e} af0:{:.5e} af1:{:.5e}",
        alm.sv,
        alm.eccentricity,
        alm.toa,
        alm.deltai,
        alm.omegad,
        alm.health,
        alm.sqrt_a,
        alm.omega0,
        alm.omega,
        alm.m0,
        alm.af0,
        alm.af1
    );
    alm
}

fn subframe4(ctx: &mut Context, r: &WordReader<'_>, tsvid: u8, page: u8) -> Option<Body> {
    Some(match page {
        // 0 is the dummy almanac, 25 to 32 are pages 2 to 5 and 7 to 10
        0 | 25..=32 => Body::Almanac(almanac(r, page)),
        52 => Body::Nmct(nmct(r, tsvid)),
        55 => {
            let text = system_message(r);
            debug!("50B,GPS: SF:4-17 system message: {text}");
            Body::SystemMessage(text)
        },
        56 => Body::IonoUtc(iono_utc(ctx, r)),
        63 => Body::SvConfig(sv_config(r)),
        _ => {
            debug!("50B,GPS: SF:4-{page} reserved page");
            return None;
        },
    })
}

/// ERDs are six bits each, packed four to a word starting at word 2 bit 8.
fn nmct(r: &WordReader<'_>, tsvid: u8) -> Nmct {
    // 1-based, slot 31 only ever filled by the shuffle below
    let mut erd = [0i8; 32];
    let mut bit = 0u32;
    for slot in erd.iter_mut().take(31).skip(1) {
        // offset of this ERD from bit 23 of word 2, counted MSB first
        let start = 10 + bit;
        let (index, pos) = (2 + (start / 24) as usize, start % 24);
        let raw = if pos <= 18 {
            r.bits(index, 18 - pos, 6)
        } else {
            // straddles into the next word
            let head = 24 - pos;
            let tail = 6 - head;
            r.field(&[(index, 0, head), (index + 1, 24 - tail, tail)]) as u32
        };
        *slot = sign_extend(raw, 6) as i8;
        bit += 6;
    }
    let tsvid = usize::from(tsvid);
    if (1..32).contains(&tsvid) {
        // no ERD is sent for the transmitting SV itself
        for i in (tsvid..=30).rev() {
            erd[i + 1] = erd[i];
        }
        erd[tsvid] = -32;
    }
    let mut out = [0i8; 31];
    out.copy_from_slice(&erd[1..32]);
    let nmct = Nmct {
        ai: r.bits(2, 22, 2) as u8,
        erd: out,
    };
    debug!("50B,GPS: SF:4-13 ai:{} ERD:{:?}", nmct.ai, nmct.erd);
    nmct
}

/// 22 characters: word 2 bits 8..23, 24 bits of words 3 to 8, 16 MSBs of
/// word 9.
fn system_message(r: &WordReader<'_>) -> String {
    let mut raw = Vec::with_capacity(22);
    raw.push(r.bits(2, 8, 8));
    raw.push(r.bits(2, 0, 8));
    for index in 3..=8 {
        raw.extend([r.bits(index, 16, 8), r.bits(index, 8, 8), r.bits(index, 0, 8)]);
    }
    raw.extend([r.bits(9, 16, 8), r.bits(9, 8, 8)]);
    raw.into_iter()
        .take_while(|&c| c != 0)
        .map(|c| match u8::try_from(c) {
            Ok(b @ 0x20..=0x7e) => b as char,
            _ => '.',
        })
        .collect()
}

fn iono_utc(ctx: &mut Context, r: &WordReader<'_>) -> IonoUtc {
    let iono = IonoUtc {
        alpha: [
            p2(-30) * f64::from(r.sbits(2, 8, 8)),
            p2(-27) * f64::from(r.sbits(2, 0, 8)),
            p2(-24) * f64::from(r.sbits(3, 16, 8)),
            p2(-24) * f64::from(r.sbits(3, 8, 8)),
        ],
        beta: [
            p2(11) * f64::from(r.sbits(3, 0, 8)),
            p2(14) * f64::from(r.sbits(4, 16, 8)),
            p2(16) * f64::from(r.sbits(4, 8, 8)),
            p2(16) * f64::from(r.sbits(4, 0, 8)),
        ],
        a1: p2(-50) * f64::from(r.sbits(5, 0, 24)),
        a0: p2(-30) * r.sfield(&[(6, 0, 24), (7, 16, 8)]) as f64,
        tot: r.bits(7, 8, 8) << 12,
        wnt: r.bits(7, 0, 8) as u8,
        leap: r.sbits(8, 16, 8) as i8,
        wnlsf: r.bits(8, 8, 8) as u8,
        dn: r.bits(8, 0, 8) as u8,
        lsf: r.sbits(9, 16, 8) as i8,
    };
    debug!(
        "50B,GPS: SF:4-18 a0:{:.5e} a1:{:.5e} a2:{:.5e} a3:{:.5e} b0:{} b1:{} b2:{} b3:{} A1:{:.11e} A0:{:.11e} tot:{} WNt:{} ls:{} WNlsf:{} DN:{} lsf:{}",
        iono.alpha[0],
        iono.alpha[1],
        iono.alpha[2],
        iono.alpha[3],
        iono.beta[0],
        iono.beta[1],
        iono.beta[2],
        iono.beta[3],
        iono.a1,
        iono.a0,
        iono.tot,
        iono.wnt,
        iono.leap,
        iono.wnlsf,
        iono.dn,
        iono.lsf
    );

    // the change happens at the end of day DN of week WNlsf
    let day_start = (i64::from(iono.dn) - 1) * SECS_PER_DAY;
    let day_end = i64::from(iono.dn) * SECS_PER_DAY;
    let tow = ctx.gps_tow.floor() as i64;
    ctx.leap_notify = if ctx.gps_week % 256 == u16::from(iono.wnlsf) && day_start < tow && tow < day_end {
        match iono.leap.cmp(&iono.lsf) {
            std::cmp::Ordering::Less => LeapNotify::AddSecond,
            std::cmp::Ordering::Greater => LeapNotify::DelSecond,
            std::cmp::Ordering::Equal => LeapNotify::NoWarning,
        }
    } else {
        LeapNotify::NoWarning
    };
    ctx.leap_seconds = i32::from(iono.leap);
    ctx.valid |= ContextFlags::LEAP_SECOND_VALID;
    iono
}

fn sv_config(r: &WordReader<'_>) -> SvConfig {
    let mut svf = [0u8; 32];
    // four in word 2, six each in words 3 to 6, four in word 7
    let slots = (0..4)
        .map(|k| (2, 12 - 4 * k))
        .chain((3..=6).flat_map(|w| (0..6).map(move |k| (w, 20 - 4 * k))))
        .chain((0..4).map(|k| (7, 20 - 4 * k)));
    for (out, (index, shift)) in svf.iter_mut().zip(slots) {
        *out = r.bits(index, shift, 4) as u8;
    }
    let mut health = [0u8; 8];
    let slots = [(7, 0), (8, 18), (8, 12), (8, 6), (8, 0), (9, 18), (9, 12), (9, 6)];
    for (out, (index, shift)) in health.iter_mut().zip(slots) {
        *out = r.bits(index, shift, 6) as u8;
    }
    debug!("50B,GPS: SF:4-25 svf:{svf:?} svh:{health:?}");
    SvConfig { svf, health }
}

fn almanac_health(r: &WordReader<'_>) -> AlmanacHealth {
    let mut health = [0u8; 24];
    for (i, out) in health.iter_mut().enumerate() {
        let index = 3 + i / 4;
        let shift = 18 - 6 * (i % 4) as u32;
        *out = r.bits(index, shift, 6) as u8;
    }
    let page = AlmanacHealth {
        toa: r.bits(2, 8, 8) << 12,
        wna: r.bits(2, 0, 8) as u8,
        health,
    };
    debug!("50B,GPS: SF:5-25 toa:{} WNa:{} SV:{:?}", page.toa, page.wna, page.health);
    page
}
