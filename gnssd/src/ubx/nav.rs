//! UBX-NAV: navigation solution, time and sky view.

use ::log::{debug, info, trace, warn};

use super::{set_itow, utc_date};
use crate::{
    bits::BitReader,
    constants::MAXCHANNELS,
    context::{Context, LeapNotify},
    error::Result,
    fix::{FixMode, FixStatus, SatHealth, Satellite},
    gnss::{ubx2_to_prn, ubx_to_prn},
    mask::Mask,
    session::Session,
};

/// PVT `flags` bits.
const PVT_GNSS_FIX_OK: u8 = 0x01;
const PVT_DIFF_SOLN: u8 = 0x02;
const PVT_HEAD_VEH_VALID: u8 = 0x20;
const PVT_CARR_FLOAT: u8 = 0x40;
const PVT_CARR_FIXED: u8 = 0x80;
/// PVT `valid`: date and time both valid.
const PVT_VALID_DATE_TIME: u8 = 0x03;

/// Age of differential corrections by PVT `lastCorrectionAge` index, seconds.
const DGPS_AGE: [f64; 13] = [-1.0, 1.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0, 240.0];

/// Protocol version implied by the NAV-SVINFO chip generation.
const CHIP_GEN_PROTVER: [u8; 5] = [8, 10, 12, 13, 15];

/// Mode and status for a u-blox `gpsFix` / `fixType` value.
pub(super) fn fix_type(kind: u8) -> (FixMode, FixStatus) {
    match kind {
        5 => (FixMode::Fix3D, FixStatus::Time),
        3 => (FixMode::Fix3D, FixStatus::Gps),
        4 => (FixMode::Fix3D, FixStatus::GnssDr),
        2 => (FixMode::Fix2D, FixStatus::Gps),
        1 => (FixMode::Fix2D, FixStatus::Dr),
        _ => (FixMode::NoFix, FixStatus::Unknown),
    }
}

/// Differential status from PVT-style `flags`, if corrections are applied.
pub(super) fn carrier_status(flags: u8) -> Option<FixStatus> {
    if flags & PVT_DIFF_SOLN == 0 {
        return None;
    }
    Some(if flags & PVT_CARR_FIXED != 0 {
        FixStatus::RtkFix
    } else if flags & PVT_CARR_FLOAT != 0 {
        FixStatus::RtkFloat
    } else {
        FixStatus::Dgps
    })
}

fn health(bits: u32) -> SatHealth {
    match bits & 3 {
        1 => SatHealth::Ok,
        2 => SatHealth::Bad,
        _ => SatHealth::Unknown,
    }
}

/// `u16` DOP in units of 0.01, `None` when the receiver flags it unusable.
fn dop_value(buf: &BitReader<'_>, offset: usize) -> Result<Option<f64>> {
    let raw = buf.le_u16(offset)?;
    Ok((raw < 9999).then(|| f64::from(raw) / 100.0))
}

fn skyview_tow(session: &mut Session, ctx: &mut Context, itow: u32) {
    let week = u32::from(ctx.gps_week);
    session.gpsdata.skyview_time = ctx.gpstime_resolve(week, f64::from(itow) / 1000.0);
}

pub(super) fn clock(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let fix = &mut session.gpsdata.fix;
    fix.clock_bias = f64::from(buf.le_i32(4)?);
    fix.clock_drift = f64::from(buf.le_i32(8)?);
    debug!(
        "UBX: NAV-CLOCK iTOW {itow} bias {} drift {} tAcc {} fAcc {}",
        fix.clock_bias,
        fix.clock_drift,
        buf.le_u32(12)?,
        buf.le_u32(16)?
    );
    Ok(Mask::empty())
}

pub(super) fn dgps(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    debug!("UBX: NAV-DGPS iTOW {itow} age {}", buf.le_u32(4)?);
    Ok(Mask::empty())
}

pub(super) fn dop(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let mut mask = Mask::empty();
    let d = &mut session.gpsdata.dop;
    for (offset, slot) in [
        (4, &mut d.gdop),
        (6, &mut d.pdop),
        (8, &mut d.tdop),
        (10, &mut d.vdop),
        (12, &mut d.hdop),
        (14, &mut d.ydop),
        (16, &mut d.xdop),
    ] {
        if let Some(v) = dop_value(buf, offset)? {
            *slot = v;
            mask |= Mask::DOP;
        }
    }
    debug!(
        "UBX: NAV-DOP gdop {:.2} pdop {:.2} hdop {:.2} vdop {:.2} tdop {:.2}",
        d.gdop, d.pdop, d.hdop, d.vdop, d.tdop
    );
    Ok(mask)
}

/// Error ellipse. Travels with the fix whatever the mask.
pub(super) fn eell(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let version = buf.u8(4)?;
    if version != 0 {
        debug!("UBX: NAV-EELL unknown version {version}");
        return Ok(Mask::empty());
    }
    let ellipse = &mut session.newdata.ellipse;
    ellipse.orient = f64::from(buf.le_u16(6)?) * 1e-2;
    ellipse.major = f64::from(buf.le_u32(8)?) * 1e-3;
    ellipse.minor = f64::from(buf.le_u32(12)?) * 1e-3;
    Ok(Mask::empty())
}

/// End of epoch. Only the iTOW matters; the epoch tracker does the rest.
pub(super) fn eoe(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    trace!("UBX: NAV-EOE iTOW {itow}");
    Ok(Mask::empty())
}

pub(super) fn hpposecef(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.u8(0)? != 0 {
        return Ok(Mask::empty());
    }
    set_itow(session, buf, 4)?;
    let ecef = &mut session.newdata.ecef;
    ecef.x = buf.le_scaled_hp(8, 20, 1e-4)?;
    ecef.y = buf.le_scaled_hp(12, 21, 1e-4)?;
    ecef.z = buf.le_scaled_hp(16, 22, 1e-4)?;
    ecef.p_acc = f64::from(buf.le_u32(24)?) / 10_000.0;
    Ok(Mask::ECEF)
}

pub(super) fn hpposllh(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = buf.le_i32(4)?;
    session.ubx().itow = i64::from(itow);
    let fix = &mut session.newdata;
    fix.longitude = buf.le_scaled_hp(8, 24, 1e-9)?;
    fix.latitude = buf.le_scaled_hp(12, 25, 1e-9)?;
    fix.alt_hae = buf.le_scaled_hp(16, 26, 1e-5)?;
    fix.alt_msl = buf.le_scaled_hp(20, 27, 1e-5)?;
    fix.eph = f64::from(buf.le_u32(28)?) * 1e-4;
    fix.epv = f64::from(buf.le_u32(32)?) * 1e-4;
    Ok(Mask::ONLINE | Mask::HERR | Mask::VERR | Mask::LATLON | Mask::ALTITUDE)
}

pub(super) fn posecef(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let ecef = &mut session.newdata.ecef;
    ecef.x = f64::from(buf.le_i32(4)?) * 1e-2;
    ecef.y = f64::from(buf.le_i32(8)?) * 1e-2;
    ecef.z = f64::from(buf.le_i32(12)?) * 1e-2;
    ecef.p_acc = f64::from(buf.le_u32(16)?) * 1e-2;
    Ok(Mask::ECEF)
}

pub(super) fn posllh(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let fix = &mut session.newdata;
    fix.longitude = f64::from(buf.le_i32(4)?) * 1e-7;
    fix.latitude = f64::from(buf.le_i32(8)?) * 1e-7;
    fix.alt_hae = f64::from(buf.le_i32(12)?) * 1e-3;
    fix.alt_msl = f64::from(buf.le_i32(16)?) * 1e-3;
    fix.eph = f64::from(buf.le_u32(20)?) * 1e-3;
    fix.epv = f64::from(buf.le_u32(24)?) * 1e-3;
    Ok(Mask::ONLINE | Mask::HERR | Mask::VERR | Mask::LATLON | Mask::ALTITUDE)
}

/// Navigation, position, velocity and attitude. Protocol 30 and up.
pub(super) fn pvat(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(4)?;
    if version != 0 {
        debug!("UBX: NAV-PVAT unknown version {version}");
        return Ok(Mask::empty());
    }
    set_itow(session, buf, 0)?;
    let valid = buf.u8(5)?;
    let kind = buf.u8(24)?;
    let flags = buf.u8(25)?;
    session.gpsdata.satellites_used = usize::from(buf.u8(27)?);

    let (mode, mut status) = fix_type(kind);
    let mut mask = Mask::MODE | Mask::STATUS;
    mask |= match kind {
        3..=5 => Mask::LATLON | Mask::ALTITUDE | Mask::SPEED,
        1 | 2 => Mask::LATLON | Mask::SPEED,
        _ => Mask::empty(),
    };
    if let Some(s) = carrier_status(flags) {
        status = s;
    }

    let fix = &mut session.newdata;
    fix.mode = mode;
    fix.status = status;
    if valid & PVT_VALID_DATE_TIME == PVT_VALID_DATE_TIME {
        fix.time = utc_date(buf, 6, buf.le_i32(20)?)?;
        mask |= Mask::TIME | Mask::NTPTIME_IS | Mask::GOODTIME_IS;
    }
    if mask.contains(Mask::LATLON) {
        fix.longitude = f64::from(buf.le_i32(28)?) * 1e-7;
        fix.latitude = f64::from(buf.le_i32(32)?) * 1e-7;
        if mask.contains(Mask::ALTITUDE) {
            fix.alt_hae = f64::from(buf.le_i32(36)?) * 1e-3;
            fix.alt_msl = f64::from(buf.le_i32(40)?) * 1e-3;
        }
    }
    fix.eph = f64::from(buf.le_u32(44)?) * 1e-3;
    fix.epv = f64::from(buf.le_u32(48)?) * 1e-3;
    fix.ned.vel_n = f64::from(buf.le_i32(52)?) * 1e-3;
    fix.ned.vel_e = f64::from(buf.le_i32(56)?) * 1e-3;
    fix.ned.vel_d = f64::from(buf.le_i32(60)?) * 1e-3;
    fix.speed = f64::from(buf.le_i32(64)?) * 1e-3;
    fix.eps = f64::from(buf.le_u32(68)?) * 1e-3;
    mask |= Mask::VNED | Mask::SPEED;

    if flags & PVT_HEAD_VEH_VALID != 0 {
        fix.track = f64::from(buf.le_i32(84)?) * 1e-5;
        mask |= Mask::TRACK;
    }
    fix.ellipse.orient = f64::from(buf.le_u16(98)?) * 1e-2;
    fix.ellipse.major = f64::from(buf.le_u32(100)?) * 1e-3;
    fix.ellipse.minor = f64::from(buf.le_u32(104)?) * 1e-3;
    let time = fix.time;

    let attitude = &mut session.gpsdata.attitude;
    for (value, accuracy, slot) in [
        (72, 88, &mut attitude.roll),
        (76, 90, &mut attitude.pitch),
        (80, 92, &mut attitude.heading),
    ] {
        if buf.le_u16(accuracy)? != 0 {
            *slot = f64::from(buf.le_i32(value)?) * 1e-5;
            mask |= Mask::ATTITUDE;
        }
    }
    if mask.contains(Mask::ATTITUDE) {
        attitude.mtime = time;
        attitude.msg = "NAV-PVAT".into();
    }
    debug!(
        "UBX: NAV-PVAT fixType {kind} flags {flags:#04x} mode {mode:?} status {status:?} used {}",
        session.gpsdata.satellites_used
    );
    Ok(mask)
}

/// Navigation solution. The workhorse of protocol 14 and later.
pub(super) fn pvt(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let valid = buf.u8(11)?;
    let kind = buf.u8(20)?;
    let flags = buf.u8(21)?;
    let num_sv = buf.u8(23)?;
    let flags3 = buf.le_u16(78)?;

    let (mode, mut status) = fix_type(kind);
    let mut mask = Mask::MODE | Mask::STATUS;
    mask |= match kind {
        3 | 4 => Mask::LATLON,
        1 | 2 => Mask::LATLON | Mask::SPEED,
        _ => Mask::empty(),
    };
    let fix = &mut session.newdata;
    if let Some(s) = carrier_status(flags) {
        status = s;
        let age = usize::from((flags3 >> 1) & 0x0f);
        if age > 0 {
            fix.dgps_age = DGPS_AGE[age.min(DGPS_AGE.len() - 1)];
        }
    }
    fix.mode = mode;
    fix.status = status;

    if valid & PVT_VALID_DATE_TIME == PVT_VALID_DATE_TIME {
        fix.time = utc_date(buf, 4, buf.le_i32(16)?)?;
        mask |= Mask::TIME | Mask::NTPTIME_IS | Mask::GOODTIME_IS;
    }
    fix.longitude = f64::from(buf.le_i32(24)?) * 1e-7;
    fix.latitude = f64::from(buf.le_i32(28)?) * 1e-7;
    fix.alt_hae = f64::from(buf.le_i32(32)?) * 1e-3;
    fix.alt_msl = f64::from(buf.le_i32(36)?) * 1e-3;
    fix.speed = f64::from(buf.le_i32(60)?) * 1e-3;
    fix.track = f64::from(buf.le_i32(64)?) * 1e-5;
    mask |= Mask::LATLON | Mask::ALTITUDE | Mask::SPEED | Mask::TRACK;
    fix.eph = f64::from(buf.le_i32(40)?) / 1000.0;
    fix.epv = f64::from(buf.le_i32(44)?) / 1000.0;
    fix.eps = f64::from(buf.le_i32(68)?) / 1000.0;
    mask |= Mask::HERR | Mask::SPEEDERR | Mask::VERR;

    session.gpsdata.satellites_used = usize::from(num_sv);
    mask |= Mask::USED_IS;
    debug!(
        "UBX: NAV-PVT fixType {kind} flags {flags:#04x} valid {valid:#04x} mode {mode:?} status {status:?} used {num_sv} gnssFixOK {}",
        flags & PVT_GNSS_FIX_OK
    );
    Ok(mask)
}

/// Position of a moving base relative to a reference station.
pub(super) fn relposned(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    let station = i32::from(buf.le_u16(2)?);
    session.newdata.dgps_station = station;
    set_itow(session, buf, 4)?;
    let ned = &mut session.newdata.ned;
    let mut mask = Mask::empty();
    let flags = if version < 1 {
        let flags = buf.le_u32(36)?;
        if flags & 1 == 0 {
            return Ok(Mask::empty());
        }
        if flags & 4 != 0 {
            ned.rel_pos_n = buf.le_scaled_hp(8, 20, 1e-4)?;
            ned.rel_pos_e = buf.le_scaled_hp(12, 21, 1e-4)?;
            ned.rel_pos_d = buf.le_scaled_hp(16, 22, 1e-4)?;
            mask |= Mask::NED;
        }
        flags
    } else {
        let flags = buf.le_u32(60)?;
        if flags & 1 == 0 {
            return Ok(Mask::empty());
        }
        if flags & 4 != 0 {
            ned.rel_pos_n = buf.le_scaled_hp(8, 32, 1e-4)?;
            ned.rel_pos_e = buf.le_scaled_hp(12, 33, 1e-4)?;
            ned.rel_pos_d = buf.le_scaled_hp(16, 34, 1e-4)?;
            ned.rel_pos_l = buf.le_scaled_hp(20, 35, 1e-4)?;
            if flags & 0x100 != 0 {
                ned.rel_pos_h = f64::from(buf.le_i32(24)?) * 1e-5;
            }
            mask |= Mask::NED;
        }
        flags
    };
    debug!(
        "UBX: NAV-RELPOSNED v{version} station {station} flags {flags:#x} N {:.4} E {:.4} D {:.4}",
        ned.rel_pos_n, ned.rel_pos_e, ned.rel_pos_d
    );
    if flags & 5 != 5 {
        return Ok(Mask::empty());
    }
    Ok(mask)
}

/// Satellite information, protocol 15 and up.
pub(super) fn sat(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    skyview_tow(session, ctx, itow);
    let version = buf.u8(4)?;
    if version != 1 {
        debug!("UBX: NAV-SAT unknown version {version}");
        return Ok(Mask::empty());
    }
    let nchan = usize::from(buf.u8(5)?);
    if nchan > MAXCHANNELS {
        warn!("UBX: NAV-SAT too many channels {nchan}");
        return Ok(Mask::empty());
    }
    let mut sats = Vec::with_capacity(nchan);
    for i in 0..nchan {
        let off = 8 + 12 * i;
        let gnssid = buf.u8(off)?;
        let svid = buf.u8(off + 1)?;
        let prn = ubx2_to_prn(gnssid, svid);
        if prn <= 0 {
            debug!("UBX: NAV-SAT skipping {gnssid}:{svid}, PRN {prn}");
            continue;
        }
        let elev = buf.i8(off + 3)?;
        let azim = match buf.le_i16(off + 4)? {
            360 => 0,
            a => a,
        };
        let flags = buf.le_u32(off + 8)?;
        sats.push(Satellite {
            gnssid,
            svid,
            prn,
            ss: f64::from(buf.u8(off + 2)?),
            elevation: if elev.unsigned_abs() <= 90 { f64::from(elev) } else { f64::NAN },
            azimuth: if (0..360).contains(&azim) { f64::from(azim) } else { f64::NAN },
            pr_res: f64::from(buf.le_i16(off + 6)?) / 10.0,
            used: flags & 0x08 != 0,
            health: health(flags >> 4),
            quality: (flags & 7) as i8,
            ..Satellite::default()
        });
    }
    session.gpsdata.set_skyview(sats);
    debug!(
        "UBX: NAV-SAT visible {} used {}",
        session.gpsdata.satellites_visible, session.gpsdata.satellites_used
    );
    Ok(Mask::SATELLITE | Mask::USED_IS)
}

/// SBAS status. Only the satellite in use is kept.
pub(super) fn sbas(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let geo = buf.u8(4)?;
    let count = buf.u8(8)?;
    debug!(
        "UBX: NAV-SBAS iTOW {itow} geo {geo} mode {} sys {} service {:#04x} cnt {count}",
        buf.u8(5)?,
        buf.i8(6)?,
        buf.u8(7)?
    );
    let prn = ubx_to_prn(i32::from(geo)).map_or(0, |(_, _, prn)| prn);
    session.ubx().sbas_in_use = prn;
    Ok(Mask::empty())
}

/// Signal information, protocol 27 and up. One entry per signal, so a
/// dual band receiver lists each satellite twice.
pub(super) fn sig(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    skyview_tow(session, ctx, itow);
    let version = buf.u8(4)?;
    if version != 0 {
        debug!("UBX: NAV-SIG unknown version {version}");
        return Ok(Mask::empty());
    }
    let nchan = usize::from(buf.u8(5)?);
    if nchan > MAXCHANNELS {
        warn!("UBX: NAV-SIG too many channels {nchan}");
        return Ok(Mask::empty());
    }
    let old = std::mem::take(&mut session.gpsdata.skyview);
    let mut sats = Vec::with_capacity(nchan);
    for i in 0..nchan {
        let off = 8 + 16 * i;
        let gnssid = buf.u8(off)?;
        let svid = buf.u8(off + 1)?;
        let prn = ubx2_to_prn(gnssid, svid);
        if prn <= 0 {
            // svId 255 is a GLONASS satellite not yet identified
            if prn != -1 {
                debug!("UBX: NAV-SIG skipping {gnssid}:{svid}, PRN {prn}");
            }
            continue;
        }
        let quality = buf.u8(off + 7)?;
        let (azimuth, elevation) = old
            .iter()
            .find(|s| s.prn == prn)
            .map_or((f64::NAN, f64::NAN), |s| (s.azimuth, s.elevation));
        sats.push(Satellite {
            gnssid,
            svid,
            sigid: buf.u8(off + 2)?,
            freqid: buf.u8(off + 3)? as i8,
            prn,
            pr_res: f64::from(buf.le_i16(off + 4)?) / 10.0,
            ss: f64::from(buf.u8(off + 6)?),
            quality: quality as i8,
            used: quality >= 4,
            health: health(u32::from(buf.le_u16(off + 10)?)),
            azimuth,
            elevation,
        });
    }
    session.gpsdata.set_skyview(sats);
    debug!(
        "UBX: NAV-SIG visible {} used {}",
        session.gpsdata.satellites_visible, session.gpsdata.satellites_used
    );
    Ok(Mask::SATELLITE | Mask::USED_IS)
}

/// Navigation solution of protocol 14 and older.
pub(super) fn sol(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let kind = buf.u8(10)?;
    let flags = buf.u8(11)?;
    let mut mask = Mask::empty();

    // week and time of week valid
    if flags & 0x0c == 0x0c {
        let week = buf.le_i16(8)?;
        let tow = f64::from(itow) / 1000.0 + f64::from(buf.le_i32(4)?) * 1e-9;
        session.newdata.time = ctx.gpstime_resolve(u32::from(week as u16), tow);
        mask |= Mask::TIME | Mask::NTPTIME_IS | Mask::GOODTIME_IS;
    }
    let fix = &mut session.newdata;
    fix.ecef.x = f64::from(buf.le_i32(12)?) / 100.0;
    fix.ecef.y = f64::from(buf.le_i32(16)?) / 100.0;
    fix.ecef.z = f64::from(buf.le_i32(20)?) / 100.0;
    fix.ecef.p_acc = f64::from(buf.le_u32(24)?) / 100.0;
    fix.ecef.vx = f64::from(buf.le_i32(28)?) / 100.0;
    fix.ecef.vy = f64::from(buf.le_i32(32)?) / 100.0;
    fix.ecef.vz = f64::from(buf.le_i32(36)?) / 100.0;
    fix.ecef.v_acc = f64::from(buf.le_u32(40)?) / 100.0;
    fix.eps = fix.ecef.v_acc;
    mask |= Mask::ECEF | Mask::VECEF | Mask::SPEEDERR;

    if let Some(pdop) = dop_value(buf, 44)? {
        session.gpsdata.dop.pdop = pdop;
        mask |= Mask::DOP;
    }
    session.gpsdata.satellites_used = usize::from(buf.u8(47)?);

    let (mode, mut status) = fix_type(kind);
    if flags & PVT_DIFF_SOLN != 0 {
        status = FixStatus::Dgps;
    }
    fix.mode = mode;
    fix.status = status;
    mask |= Mask::MODE | Mask::STATUS | Mask::REPORT_IS;
    debug!(
        "UBX: NAV-SOL ECEF x {:.2} y {:.2} z {:.2} mode {mode:?} status {status:?} used {}",
        fix.ecef.x, fix.ecef.y, fix.ecef.z, session.gpsdata.satellites_used
    );
    Ok(mask)
}

/// Receiver navigation status.
pub(super) fn status(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let kind = buf.u8(4)?;
    let flags = buf.u8(5)?;
    let fix_stat = buf.u8(6)?;
    let flags2 = buf.u8(7)?;

    let (mode, status) = if flags & 1 == 0 {
        (FixMode::NoFix, FixStatus::Unknown)
    } else {
        let (mode, mut status) = fix_type(kind);
        if kind == 2 && fix_stat & 2 != 0 {
            status = FixStatus::Dgps;
        }
        if fix_stat & 2 != 0 {
            if flags2 & 0x40 != 0 {
                status = FixStatus::RtkFloat;
            } else if flags2 & 0x80 != 0 {
                status = FixStatus::RtkFix;
            }
        } else if fix_stat & 1 != 0 {
            status = FixStatus::Dgps;
        }
        (mode, status)
    };
    session.newdata.mode = mode;
    session.newdata.status = status;
    debug!(
        "UBX: NAV-STATUS gpsFix {kind} flags {flags:#04x} fixStat {fix_stat:#04x} flags2 {flags2:#04x} ttff {} msss {}",
        buf.le_u32(8)?,
        buf.le_u32(12)?
    );
    Ok(Mask::STATUS | Mask::MODE)
}

/// Survey-in progress of a base station. Logged only.
pub(super) fn svin(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.u8(0)? != 0 {
        return Ok(Mask::empty());
    }
    let itow = set_itow(session, buf, 4)?;
    // mean position in 0.1 mm
    let mean = |main, hp| -> Result<i64> { Ok(i64::from(buf.le_i32(main)?) * 10 + i64::from(buf.i8(hp)?)) };
    debug!(
        "UBX: NAV-SVIN iTOW {itow} dur {} mean {} {} {} acc {} obs {} valid {} active {}",
        buf.le_u32(8)?,
        mean(12, 24)?,
        mean(16, 25)?,
        mean(20, 26)?,
        buf.le_u32(28)?,
        buf.le_u32(32)?,
        buf.u8(36)?,
        buf.u8(37)?
    );
    Ok(Mask::ONLINE)
}

/// Satellite information of protocol 14 and older.
pub(super) fn svinfo(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    skyview_tow(session, ctx, itow);
    let nchan = usize::from(buf.u8(4)?);
    if nchan > MAXCHANNELS {
        warn!("UBX: NAV-SVINFO too many channels {nchan}");
        return Ok(Mask::empty());
    }
    let chip_gen = usize::from(buf.u8(5)? & 0x07);
    if let Some(&floor) = CHIP_GEN_PROTVER.get(chip_gen) {
        let state = session.ubx();
        if floor > state.protver {
            state.protver = floor;
        }
    }

    let mut sats = Vec::with_capacity(nchan);
    for i in 0..nchan {
        let off = 8 + 12 * i;
        let ubx_prn = buf.u8(off + 1)?;
        let Some((gnssid, svid, prn)) = ubx_to_prn(i32::from(ubx_prn)) else {
            continue;
        };
        if prn < 1 {
            continue;
        }
        let flags = buf.u8(off + 2)?;
        let elev = buf.i8(off + 5)?;
        let azim = buf.le_i16(off + 6)?;
        sats.push(Satellite {
            gnssid,
            svid,
            prn,
            ss: f64::from(buf.u8(off + 4)?),
            elevation: if elev.unsigned_abs() <= 90 { f64::from(elev) } else { f64::NAN },
            azimuth: if (0..360).contains(&azim) { f64::from(azim) } else { f64::NAN },
            pr_res: f64::from(buf.le_i32(off + 8)?) / 100.0,
            quality: buf.u8(off + 3)? as i8,
            used: flags & 0x01 != 0,
            health: if flags & 0x10 != 0 { SatHealth::Bad } else { SatHealth::Ok },
            ..Satellite::default()
        });
    }
    session.gpsdata.set_skyview(sats);
    debug!(
        "UBX: NAV-SVINFO visible {} used {} chipGen {chip_gen}",
        session.gpsdata.satellites_visible, session.gpsdata.satellites_used
    );
    Ok(Mask::SATELLITE | Mask::USED_IS)
}

/// GPS time solution. Carries the leap second count when the receiver
/// knows it.
pub(super) fn timegps(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let valid = buf.u8(11)?;
    let mut mask = Mask::empty();
    if valid & 0x04 != 0 {
        ctx.set_leap_seconds(i32::from(buf.i8(10)?));
    }
    if valid & 0x03 == 0x03 {
        let week = buf.le_i16(8)?;
        let tow = f64::from(itow) / 1000.0 + f64::from(buf.le_i32(4)?) * 1e-9;
        session.newdata.time = ctx.gpstime_resolve(u32::from(week as u16), tow);
        session.newdata.ept = f64::from(buf.le_u32(12)?) / 1e9;
        mask |= Mask::TIME | Mask::NTPTIME_IS;
    }
    debug!("UBX: NAV-TIMEGPS iTOW {itow} valid {valid:#04x} leap {}", ctx.leap_seconds);
    Ok(mask)
}

/// Leap second event information.
pub(super) fn timels(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let version = buf.u8(4)?;
    if version != 0 {
        debug!("UBX: NAV-TIMELS unknown version {version}");
        return Ok(Mask::empty());
    }
    let valid = buf.u8(23)?;
    if valid & 0x01 != 0 {
        let current = buf.i8(9)?;
        debug!("UBX: NAV-TIMELS source {} current {current}", buf.u8(8)?);
        ctx.set_leap_seconds(i32::from(current));
    }
    if valid & 0x02 != 0 {
        let change = buf.i8(11)?;
        let time_to_event = buf.le_i32(12)?;
        debug!(
            "UBX: NAV-TIMELS source {} change {change} in {time_to_event}s (week {} day {})",
            buf.u8(10)?,
            buf.le_i16(16)?,
            buf.le_i16(18)?
        );
        let notify = if change != 0 && (1..60 * 60 * 23).contains(&time_to_event) {
            match change {
                1 => Some(LeapNotify::AddSecond),
                -1 => Some(LeapNotify::DelSecond),
                _ => None,
            }
        } else {
            Some(LeapNotify::NoWarning)
        };
        if let Some(notify) = notify {
            if notify != ctx.leap_notify {
                info!("UBX: NAV-TIMELS leap notify {notify:?}");
            }
            ctx.leap_notify = notify;
        }
    }
    Ok(Mask::empty())
}

pub(super) fn timeutc(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let valid = buf.u8(19)?;
    if valid & 0x04 == 0 {
        debug!("UBX: NAV-TIMEUTC iTOW {itow} invalid {valid:#04x}");
        return Ok(Mask::empty());
    }
    session.newdata.time = utc_date(buf, 12, buf.le_i32(8)?)?;
    Ok(Mask::TIME | Mask::NTPTIME_IS | Mask::GOODTIME_IS)
}

pub(super) fn velecef(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let ecef = &mut session.newdata.ecef;
    ecef.vx = f64::from(buf.le_i32(4)?) / 100.0;
    ecef.vy = f64::from(buf.le_i32(8)?) / 100.0;
    ecef.vz = f64::from(buf.le_i32(12)?) / 100.0;
    ecef.v_acc = f64::from(buf.le_u32(16)?) / 100.0;
    Ok(Mask::VECEF)
}

pub(super) fn velned(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 0)?;
    let ned = &mut session.newdata.ned;
    ned.vel_n = f64::from(buf.le_i32(4)?) / 100.0;
    ned.vel_e = f64::from(buf.le_i32(8)?) / 100.0;
    ned.vel_d = f64::from(buf.le_i32(12)?) / 100.0;
    Ok(Mask::VNED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::{
        id::*,
        tests::{run, ubx_session},
    };

    fn put_i32(p: &mut [u8], off: usize, v: i32) {
        p[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u16(p: &mut [u8], off: usize, v: u16) {
        p[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn pvt_payload(fix_type: u8, flags: u8) -> Vec<u8> {
        let mut p = vec![0u8; 92];
        put_u16(&mut p, 4, 2024);
        p[6..11].copy_from_slice(&[6, 1, 12, 0, 0]);
        p[11] = 0x03;
        p[20] = fix_type;
        p[21] = flags;
        p[23] = 8;
        put_i32(&mut p, 24, -1_223_000_000);
        put_i32(&mut p, 28, 377_000_000);
        put_i32(&mut p, 32, 10_000);
        put_i32(&mut p, 36, 12_500);
        put_i32(&mut p, 40, 2_500);
        put_i32(&mut p, 60, 1_500);
        put_i32(&mut p, 64, 9_000_000);
        p
    }

    #[test]
    fn pvt_3d_fix() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mask = run(&mut session, &mut ctx, NAV_PVT, &pvt_payload(3, PVT_GNSS_FIX_OK));
        assert!(mask.contains(Mask::LATLON | Mask::ALTITUDE | Mask::MODE | Mask::TIME | Mask::GOODTIME_IS));
        let fix = &session.newdata;
        assert_eq!(fix.mode, FixMode::Fix3D);
        assert_eq!(fix.status, FixStatus::Gps);
        assert!((fix.latitude - 37.7).abs() < 1e-9);
        assert!((fix.longitude + 122.3).abs() < 1e-9);
        assert_eq!(fix.alt_hae, 10.0);
        assert_eq!(fix.alt_msl, 12.5);
        assert_eq!(fix.eph, 2.5);
        assert_eq!(fix.speed, 1.5);
        assert!((fix.track - 90.0).abs() < 1e-9);
        assert_eq!(fix.time.unwrap().to_rfc3339(), "2024-06-01T12:00:00+00:00");
        assert_eq!(session.gpsdata.satellites_used, 8);
    }

    #[test]
    fn pvt_rtk_and_correction_age() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = pvt_payload(3, PVT_GNSS_FIX_OK | PVT_DIFF_SOLN | PVT_CARR_FIXED);
        // lastCorrectionAge index 4: 10 s
        put_u16(&mut p, 78, 4 << 1);
        run(&mut session, &mut ctx, NAV_PVT, &p);
        assert_eq!(session.newdata.status, FixStatus::RtkFix);
        assert_eq!(session.newdata.dgps_age, 10.0);

        let p = pvt_payload(2, PVT_DIFF_SOLN | PVT_CARR_FLOAT);
        run(&mut session, &mut ctx, NAV_PVT, &p);
        assert_eq!(session.newdata.status, FixStatus::RtkFloat);
        assert_eq!(session.newdata.mode, FixMode::Fix2D);
    }

    #[test]
    fn pvt_without_fix_still_reports_position_fields() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = pvt_payload(0, 0);
        p[11] = 0;
        let mask = run(&mut session, &mut ctx, NAV_PVT, &p);
        assert_eq!(session.newdata.mode, FixMode::NoFix);
        assert!(!mask.contains(Mask::TIME));
        assert!(mask.contains(Mask::LATLON));
    }

    #[test]
    fn fix_type_table() {
        assert_eq!(fix_type(5), (FixMode::Fix3D, FixStatus::Time));
        assert_eq!(fix_type(4), (FixMode::Fix3D, FixStatus::GnssDr));
        assert_eq!(fix_type(1), (FixMode::Fix2D, FixStatus::Dr));
        assert_eq!(fix_type(9), (FixMode::NoFix, FixStatus::Unknown));
    }

    #[test]
    fn dop_drops_sentinel() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 18];
        put_u16(&mut p, 4, 9999);
        put_u16(&mut p, 6, 180);
        put_u16(&mut p, 12, 95);
        let mask = run(&mut session, &mut ctx, NAV_DOP, &p);
        assert!(mask.contains(Mask::DOP));
        let dop = &session.gpsdata.dop;
        assert!(dop.gdop.is_nan());
        assert_eq!(dop.pdop, 1.8);
        assert_eq!(dop.hdop, 0.95);
    }

    #[test]
    fn posecef_and_velecef() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 20];
        put_i32(&mut p, 4, -270_000_000);
        put_i32(&mut p, 8, -430_000_000);
        put_i32(&mut p, 12, 390_000_000);
        put_i32(&mut p, 16, 250);
        let mask = run(&mut session, &mut ctx, NAV_POSECEF, &p);
        assert!(mask.contains(Mask::ECEF));
        assert_eq!(session.newdata.ecef.x, -2_700_000.0);
        assert_eq!(session.newdata.ecef.p_acc, 2.5);

        let mut v = vec![0u8; 20];
        put_i32(&mut v, 4, 150);
        put_i32(&mut v, 16, 20);
        let mask = run(&mut session, &mut ctx, NAV_VELECEF, &v);
        assert!(mask.contains(Mask::VECEF));
        assert_eq!(session.newdata.ecef.vx, 1.5);
        assert_eq!(session.newdata.ecef.v_acc, 0.2);
    }

    #[test]
    fn hpposllh_composes_high_precision() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 36];
        put_i32(&mut p, 12, 377_749_000);
        p[25] = (-5i8) as u8;
        put_i32(&mut p, 28, 14);
        let mask = run(&mut session, &mut ctx, NAV_HPPOSLLH, &p);
        assert!(mask.contains(Mask::LATLON | Mask::HERR));
        assert!((session.newdata.latitude - 37.774_899_995).abs() < 1e-12);
        assert!((session.newdata.eph - 0.0014).abs() < 1e-12);
    }

    #[test]
    fn relposned_needs_valid_flags() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 64];
        p[0] = 1;
        put_u16(&mut p, 2, 7);
        put_i32(&mut p, 8, 150);
        p[32] = 5;
        put_i32(&mut p, 24, 9_000_000);
        p[60..64].copy_from_slice(&0x105u32.to_le_bytes());
        let mask = run(&mut session, &mut ctx, NAV_RELPOSNED, &p);
        assert!(mask.contains(Mask::NED));
        let ned = &session.newdata.ned;
        assert!((ned.rel_pos_n - 1.5005).abs() < 1e-9);
        assert!((ned.rel_pos_h - 90.0).abs() < 1e-9);
        assert_eq!(session.newdata.dgps_station, 7);

        // gnssFixOK without relPosValid
        p[60] = 0x01;
        let mask = run(&mut session, &mut ctx, NAV_RELPOSNED, &p);
        assert!(!mask.contains(Mask::NED));
    }

    fn sat_entry(p: &mut Vec<u8>, gnss: u8, sv: u8, cno: u8, elev: i8, azim: i16, flags: u32) {
        p.extend_from_slice(&[gnss, sv, cno, elev as u8]);
        p.extend_from_slice(&azim.to_le_bytes());
        p.extend_from_slice(&(-12i16).to_le_bytes());
        p.extend_from_slice(&flags.to_le_bytes());
    }

    #[test]
    fn sat_builds_skyview() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0, 0, 0, 0, 1, 4, 0, 0];
        sat_entry(&mut p, 0, 5, 40, 45, 360, 0x08 | 0x10 | 4);
        sat_entry(&mut p, 2, 11, 35, 120, 180, 0x20);
        // unknown GLONASS slot is skipped
        sat_entry(&mut p, 6, 255, 30, 10, 10, 0);
        sat_entry(&mut p, 3, 20, 0, -5, -1, 0);
        let mask = run(&mut session, &mut ctx, NAV_SAT, &p);
        assert_eq!(mask & (Mask::SATELLITE | Mask::USED_IS), Mask::SATELLITE | Mask::USED_IS);
        let sky = &session.gpsdata.skyview;
        assert_eq!(sky.len(), 3);
        assert_eq!(session.gpsdata.satellites_used, 1);
        assert_eq!(sky[0].prn, 5);
        assert_eq!(sky[0].azimuth, 0.0);
        assert_eq!(sky[0].health, SatHealth::Ok);
        assert_eq!(sky[0].quality, 4);
        assert_eq!(sky[0].pr_res, -1.2);
        assert_eq!(sky[1].prn, 311);
        assert!(sky[1].elevation.is_nan());
        assert_eq!(sky[1].health, SatHealth::Bad);
        assert_eq!(sky[2].prn, 420);
        assert!(sky[2].azimuth.is_nan());
    }

    #[test]
    fn sig_keeps_old_angles() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0, 0, 0, 0, 1, 1, 0, 0];
        sat_entry(&mut p, 0, 5, 40, 45, 200, 0x08);
        run(&mut session, &mut ctx, NAV_SAT, &p);

        let mut s = vec![0, 0, 0, 0, 0, 2, 0, 0];
        s.extend_from_slice(&[0, 5, 3, 0, 10, 0, 38, 5, 0, 0, 1, 0, 0, 0, 0, 0]);
        s.extend_from_slice(&[6, 255, 0, 2, 0, 0, 20, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        run(&mut session, &mut ctx, NAV_SIG, &s);
        let sky = &session.gpsdata.skyview;
        assert_eq!(sky.len(), 1);
        assert_eq!(sky[0].sigid, 3);
        assert_eq!(sky[0].azimuth, 200.0);
        assert_eq!(sky[0].elevation, 45.0);
        assert!(sky[0].used);
        assert_eq!(sky[0].health, SatHealth::Ok);
        assert_eq!(sky[0].pr_res, 1.0);
    }

    #[test]
    fn svinfo_raises_protver_from_chip_generation() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0, 0, 0, 0, 1, 2, 0, 0];
        p.extend_from_slice(&[0, 12, 0x01, 7, 44, 30]);
        p.extend_from_slice(&90i16.to_le_bytes());
        p.extend_from_slice(&(-250i32).to_le_bytes());
        let mask = run(&mut session, &mut ctx, NAV_SVINFO, &p);
        assert!(mask.contains(Mask::SATELLITE));
        assert_eq!(session.ubx().protver, 12);
        let sat = session.gpsdata.skyview[0];
        assert_eq!((sat.prn, sat.used, sat.health), (12, true, SatHealth::Ok));
        assert_eq!(sat.pr_res, -2.5);
        assert_eq!(sat.azimuth, 90.0);
    }

    #[test]
    fn sol_is_an_epoch_ender() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 52];
        put_i32(&mut p, 0, 345_600_000);
        p[8..10].copy_from_slice(&2300i16.to_le_bytes());
        p[10] = 3;
        p[11] = 0x0c | PVT_DIFF_SOLN;
        put_i32(&mut p, 12, 100);
        put_u16(&mut p, 44, 150);
        p[47] = 9;
        let mask = run(&mut session, &mut ctx, NAV_SOL, &p);
        assert!(mask.contains(Mask::REPORT_IS | Mask::TIME | Mask::ECEF | Mask::DOP));
        assert_eq!(session.newdata.status, FixStatus::Dgps);
        assert_eq!(session.newdata.ecef.x, 1.0);
        assert_eq!(session.gpsdata.dop.pdop, 1.5);
        assert_eq!(session.gpsdata.satellites_used, 9);
        assert_eq!(ctx.gps_week, 2300);
    }

    #[test]
    fn status_without_gps_fix_ok() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 16];
        p[4] = 3;
        run(&mut session, &mut ctx, NAV_STATUS, &p);
        assert_eq!(session.newdata.mode, FixMode::NoFix);
        p[5] = 1;
        p[6] = 2;
        p[7] = 0x80;
        run(&mut session, &mut ctx, NAV_STATUS, &p);
        assert_eq!(session.newdata.mode, FixMode::Fix3D);
        assert_eq!(session.newdata.status, FixStatus::RtkFix);
    }

    #[test]
    fn timegps_sets_leap_seconds() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 16];
        put_i32(&mut p, 0, 1000);
        p[8..10].copy_from_slice(&2300i16.to_le_bytes());
        p[10] = 18;
        p[11] = 0x07;
        put_i32(&mut p, 12, 20);
        let mask = run(&mut session, &mut ctx, NAV_TIMEGPS, &p);
        assert!(mask.contains(Mask::TIME));
        assert!(ctx.leap_valid());
        assert_eq!(ctx.leap_seconds, 18);
        assert_eq!(session.newdata.ept, 2e-8);
    }

    #[test]
    fn timels_announces_leap() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 24];
        p[9] = 18;
        p[11] = 1;
        put_i32(&mut p, 12, 3600);
        p[23] = 0x03;
        run(&mut session, &mut ctx, NAV_TIMELS, &p);
        assert_eq!(ctx.leap_seconds, 18);
        assert_eq!(ctx.leap_notify, LeapNotify::AddSecond);

        put_i32(&mut p, 12, 30 * 86_400);
        run(&mut session, &mut ctx, NAV_TIMELS, &p);
        assert_eq!(ctx.leap_notify, LeapNotify::NoWarning);
    }

    #[test]
    fn timeutc_needs_valid_utc() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 20];
        put_u16(&mut p, 12, 2024);
        p[14..19].copy_from_slice(&[6, 1, 0, 0, 1]);
        assert!(run(&mut session, &mut ctx, NAV_TIMEUTC, &p).intersection(Mask::TIME).is_empty());
        p[19] = 0x07;
        assert!(run(&mut session, &mut ctx, NAV_TIMEUTC, &p).contains(Mask::TIME));
        assert_eq!(session.newdata.time.unwrap().timestamp(), 1_717_200_001);
    }

    #[test]
    fn pvat_attitude_needs_accuracy() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 116];
        p[24] = 3;
        p[25] = PVT_HEAD_VEH_VALID;
        p[27] = 11;
        put_i32(&mut p, 32, 450_000_000);
        put_i32(&mut p, 72, 150_000);
        put_i32(&mut p, 76, 250_000);
        put_i32(&mut p, 84, 4_500_000);
        put_u16(&mut p, 88, 10);
        p[100..104].copy_from_slice(&1500u32.to_le_bytes());
        let mask = run(&mut session, &mut ctx, NAV_PVAT, &p);
        assert!(mask.contains(Mask::ATTITUDE | Mask::TRACK | Mask::LATLON | Mask::VNED));
        let att = &session.gpsdata.attitude;
        assert!((att.roll - 1.5).abs() < 1e-9);
        assert!(att.pitch.is_nan());
        assert!((session.newdata.track - 45.0).abs() < 1e-9);
        assert!((session.newdata.latitude - 45.0).abs() < 1e-9);
        assert_eq!(session.newdata.ellipse.major, 1.5);
        assert_eq!(session.gpsdata.satellites_used, 11);
    }

    #[test]
    fn eell_and_clock_bypass_the_mask() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut e = vec![0u8; 16];
        put_u16(&mut e, 6, 4500);
        e[8..12].copy_from_slice(&2000u32.to_le_bytes());
        assert_eq!(run(&mut session, &mut ctx, NAV_EELL, &e), Mask::ONLINE);
        assert_eq!(session.newdata.ellipse.orient, 45.0);
        assert_eq!(session.newdata.ellipse.major, 2.0);

        let mut c = vec![0u8; 20];
        put_i32(&mut c, 4, -120);
        run(&mut session, &mut ctx, NAV_CLOCK, &c);
        assert_eq!(session.gpsdata.fix.clock_bias, -120.0);
    }

    #[test]
    fn sbas_records_geo_in_use() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 12];
        p[4] = 133;
        run(&mut session, &mut ctx, NAV_SBAS, &p);
        assert_eq!(session.ubx().sbas_in_use, 46);
    }
}
