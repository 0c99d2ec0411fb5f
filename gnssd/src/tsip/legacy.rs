//! Legacy TSIP reports. Payloads are big-endian and arrive un-stuffed with
//! the id removed.

use ::log::{debug, info, warn};

use super::{
    config::{self, Model},
    exact, new_tow, write, IO1_8F20, IO1_DP, IO1_ECEF, IO1_MSL, IO4_DBHZ, TSIP_CHANNELS,
};
use crate::{
    bits::BitReader,
    context::{Context, ContextFlags},
    error::{Error, Result},
    fix::{Fix, FixMode, FixStatus, SatHealth, Satellite},
    gnss::tsip_gnssid,
    mask::Mask,
    session::Session,
};

/// Semicircles, as 2^31 per half turn, to degrees.
const SEMI_2_DEG: f64 = 180.0 / 2_147_483_647.0;

/// Leap second 18 took effect in this week. A receiver reporting more
/// leap seconds with an earlier week has aliased its week number.
const LEAP_18_WEEK: u16 = 1930;

fn time_valid(ctx: &Context) -> bool {
    ctx.valid.contains(ContextFlags::GPS_TIME_VALID)
}

/// Fix time from a TOW in the current week.
fn fix_time(session: &mut Session, ctx: &mut Context, tow: f64) -> Mask {
    session.newdata.time = ctx.gpstime_resolve(u32::from(ctx.gps_week), tow);
    Mask::TIME | Mask::NTPTIME_IS | new_tow(session, tow)
}

/// A length-prefixed product name, clamped to 40 bytes and to the packet.
fn product_name(buf: &BitReader<'_>, offset: usize, declared: u8) -> Result<String> {
    let n = usize::from(declared)
        .min(40)
        .min(buf.len().saturating_sub(offset));
    Ok(buf.string(offset, n)?.trim_end().to_owned())
}

fn dimension(dims: u8) -> (FixMode, FixStatus) {
    match dims & 0x07 {
        // clock fix, overdetermined clock fix
        1 | 5 => (FixMode::Fix3D, FixStatus::Time),
        3 => (FixMode::Fix2D, FixStatus::Gps),
        4 => (FixMode::Fix3D, FixStatus::Gps),
        _ => (FixMode::NoFix, FixStatus::Unknown),
    }
}

pub(super) fn unparsable(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let id = buf.u8(0)?;
    let sub = if buf.len() >= 2 { buf.u8(1)? } else { 0 };
    warn!("TSIP x13: report packet x{id:02x} {sub:02x} cannot be parsed");
    if id == 0x8e && sub == 0x23 {
        warn!("TSIP x8e-23: not available, using LFwEI (0x8f-20)");
        write(session, ctx, &[0x8e, 0x20, 0x01]);
    }
    Ok(Mask::empty())
}

/// 0x1C, firmware and hardware version by sub-code.
pub(super) fn version(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    match buf.u8(0)? {
        0x81 => firmware_version(session, ctx, buf),
        0x83 => hardware_version(session, ctx, buf),
        sub => {
            debug!("TSIP x1c-{sub:02x}: unhandled, length {}", buf.len());
            Ok(Mask::empty())
        },
    }
}

fn firmware_version(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let [major, minor, build, month, day] = [buf.u8(2)?, buf.u8(3)?, buf.u8(4)?, buf.u8(5)?, buf.u8(6)?];
    let year = buf.be_u16(7)?;
    let name = product_name(buf, 10, buf.u8(9)?)?;
    session.subtype = format!("fw {major}.{minor} {build} {day:02}/{month:02}/{year:04} {name}");
    info!("TSIP x1c-81: firmware version: {}", session.subtype);
    if session.subtype1.is_empty() {
        write(session, ctx, &[0x1c, 0x03]);
    }
    Ok(Mask::DEVICEID)
}

fn hardware_version(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let serial = buf.be_u32(1)?;
    let [day, month] = [buf.u8(5)?, buf.u8(6)?];
    let year = buf.be_u16(7)?;
    let hour = buf.u8(9)?;
    let code = buf.be_u16(10)?;
    let name = product_name(buf, 13, buf.u8(12)?)?;
    session.subtype1 = format!("hw {serial} {day:02}/{month:02}/{year:04} {hour:02} {code:04} {name}");
    info!("TSIP x1c-83: hardware version: {}", session.subtype1);

    let model = Model::from_hardware_code(code);
    let state = session.tsip();
    state.hardware_code = code;
    state.model = model;
    config::configure(session, ctx, model);
    Ok(Mask::DEVICEID)
}

pub(super) fn gps_time(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 10)?;
    let now = session.now;
    session.tsip().last_41 = now;
    let tow = f64::from(buf.be_f32(0)?);
    let week = buf.be_u16(4)?;
    let leap = buf.be_f32(6)?;
    debug!("TSIP x41: GPS time: tow {tow:.2} week {week} leap {leap:.1}");
    if tow < 0.0 || leap <= 10.0 {
        return Ok(Mask::empty());
    }
    ctx.set_leap_seconds(leap.round() as i32);
    session.newdata.time = ctx.gpstime_resolve(u32::from(week), tow);
    Ok(Mask::TIME | Mask::NTPTIME_IS)
}

pub(super) fn ecef_position(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let ecef = &mut session.newdata.ecef;
    ecef.x = f64::from(buf.be_f32(0)?);
    ecef.y = f64::from(buf.be_f32(4)?);
    ecef.z = f64::from(buf.be_f32(8)?);
    let tow = f64::from(buf.be_f32(12)?);
    debug!("TSIP x42: SP-XYZ: {:.2} {:.2} {:.2} tow {tow:.2}", ecef.x, ecef.y, ecef.z);
    Ok(Mask::ECEF | fix_time(session, ctx, tow))
}

pub(super) fn ecef_velocity(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 20)?;
    let ecef = &mut session.newdata.ecef;
    ecef.vx = f64::from(buf.be_f32(0)?);
    ecef.vy = f64::from(buf.be_f32(4)?);
    ecef.vz = f64::from(buf.be_f32(8)?);
    let bias_rate = buf.be_f32(12)?;
    let tow = f64::from(buf.be_f32(16)?);
    debug!(
        "TSIP x43: Vel XYZ: {:.2} {:.2} {:.2} bias rate {bias_rate:.2} tow {tow:.2}",
        ecef.vx, ecef.vy, ecef.vz
    );
    Ok(Mask::VECEF | fix_time(session, ctx, tow))
}

pub(super) fn software_version(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let b = buf.bytes(0, 10)?;
    let year = |y: u8| if y < 80 { 2000 + u32::from(y) } else { 1900 + u32::from(y) };
    session.subtype = format!(
        "sw {}.{} {:02}/{:02}/{} hw {}.{} {:02}/{:02}/{}",
        b[0],
        b[1],
        b[4],
        b[2],
        year(b[3]),
        b[5],
        b[6],
        b[9],
        b[7],
        year(b[8])
    );
    info!("TSIP x45: software version: {}", session.subtype);
    Ok(Mask::DEVICEID)
}

pub(super) fn health(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let now = session.now;
    session.tsip().last_46 = now;
    let status = buf.u8(0)?;
    let aux = buf.u8(1)?;
    session.newdata.status = if status == 0 { FixStatus::Gps } else { FixStatus::Unknown };
    debug!("TSIP x46: receiver health {status:#04x} {aux:#04x}");
    Ok(Mask::STATUS)
}

/// 0x47, signal levels, matched into the sky view by PRN.
pub(super) fn signal_levels(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let count = usize::from(buf.u8(0)?);
    exact(buf, 5 * count + 1)?;
    for i in 0..count {
        let prn = i16::from(buf.u8(5 * i + 1)?);
        let ss = f64::from(buf.be_f32(5 * i + 2)?).max(0.0);
        if let Some(sat) = session.gpsdata.satellite_by_prn(prn) {
            sat.ss = ss;
        }
    }
    debug!("TSIP x47: signal levels for {count} satellites");
    Ok(Mask::SATELLITE)
}

pub(super) fn system_message(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let text = buf.string(0, buf.len())?;
    info!("TSIP x48: GPS system message: {text}");
    Ok(Mask::empty())
}

pub(super) fn lla_position(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 20)?;
    let lat = f64::from(buf.be_f32(0)?).to_degrees();
    let lon = f64::from(buf.be_f32(4)?).to_degrees();
    let alt = f64::from(buf.be_f32(8)?);
    let tow = f64::from(buf.be_f32(16)?);
    session.newdata.latitude = lat;
    session.newdata.longitude = lon;
    if session.tsip().alt_is_msl {
        session.newdata.alt_msl = alt;
    } else {
        session.newdata.alt_hae = alt;
    }
    let mut mask = Mask::LATLON | Mask::ALTITUDE;
    // tow alone is useless until the week is known
    if time_valid(ctx) {
        mask |= fix_time(session, ctx, tow);
    }
    debug!("TSIP x4a: SP-LLA: lat {lat:.7} lon {lon:.7} alt {alt:.2} tow {tow:.2}");
    Ok(mask)
}

pub(super) fn machine_status(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 3)?;
    let machine_id = buf.u8(0)?;
    let status = buf.u8(1)?;
    let superpkt = buf.u8(2)?;
    debug!("TSIP x4b: machine ID {machine_id:#04x} status {status:#04x} superpacket {superpkt}");
    session.tsip().machine_id = machine_id;

    if session.subtype.is_empty() {
        let (name, ask_version) = match machine_id {
            0x01 => (" SMT 360", true),
            0x32 => (" Acutime 360", false),
            0x5a => (" Lassen iQ", true),
            0x61 => (" Acutime 2000", false),
            0x62 => (" ACE UTC", false),
            0x96 => (" Copernicus, Thunderbolt E", true),
            _ => ("", false),
        };
        if ask_version {
            write(session, ctx, &[0x1c, 0x01]);
        }
        session.subtype = format!("Machine ID x{machine_id:x}{name}");
    }

    let state = session.tsip();
    if state.superpkt != superpkt {
        state.superpkt = superpkt;
        if superpkt == 1 {
            // Acutime 360 style, position and velocity via 0x8f-20
            config::io_options(session, ctx, IO1_8F20 | IO1_DP | IO1_ECEF, 0x00, 0x00, IO4_DBHZ);
        }
    }
    Ok(Mask::empty())
}

pub(super) fn operating_parameters(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 17)?;
    debug!(
        "TSIP x4c: dynamics {} elevation mask {:.2} signal mask {:.2} PDOP mask {:.1} switch {:.1}",
        buf.u8(0)?,
        buf.be_f32(1)?,
        buf.be_f32(5)?,
        buf.be_f32(9)?,
        buf.be_f32(13)?
    );
    Ok(Mask::empty())
}

pub(super) fn bias(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let bias = buf.be_f32(0)?;
    let rate = buf.be_f32(4)?;
    let tow = f64::from(buf.be_f32(8)?);
    debug!("TSIP x54: bias {bias:.2} rate {rate:.2} tow {tow:.2}");
    Ok(fix_time(session, ctx, tow))
}

pub(super) fn io_options(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 4)?;
    let position = buf.u8(0)?;
    debug!(
        "TSIP x55: I/O options {position:#04x} {:#04x} {:#04x} {:#04x}",
        buf.u8(1)?,
        buf.u8(2)?,
        buf.u8(3)?
    );
    session.tsip().alt_is_msl = position & IO1_MSL != 0;
    if position & IO1_8F20 != 0 {
        write(session, ctx, &[0x8e, 0x20, 0x00]);
        // Compact Super Packet instead of LFwEI
        write(session, ctx, &[0x8e, 0x23, 0x01]);
        let now = session.now;
        session.tsip().req_compact = now;
    }
    Ok(Mask::empty())
}

pub(super) fn enu_velocity(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 20)?;
    let east = f64::from(buf.be_f32(0)?);
    let north = f64::from(buf.be_f32(4)?);
    let up = f64::from(buf.be_f32(8)?);
    let tow = f64::from(buf.be_f32(16)?);
    let ned = &mut session.newdata.ned;
    ned.vel_n = north;
    ned.vel_e = east;
    ned.vel_d = -up;
    debug!("TSIP x56: vel ENU {east:.3} {north:.3} {up:.3} tow {tow:.2}");
    Ok(Mask::VNED | fix_time(session, ctx, tow))
}

pub(super) fn last_fix(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 8)?;
    let source = buf.u8(0)?;
    let tow = f64::from(buf.be_f32(2)?);
    let week = buf.be_u16(6)?;
    debug!("TSIP x57: fix info: source {source} week {week} tow {tow:.2}");
    // only a current fix carries usable time
    if source != 0x01 {
        return Ok(Mask::empty());
    }
    session.newdata.time = ctx.gpstime_resolve(u32::from(week), tow);
    Ok(Mask::TIME | Mask::NTPTIME_IS | new_tow(session, tow))
}

pub(super) fn raw_measurement(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP x5a: raw: PRN {} len {:.1} SNR {:.1} phase {:.1} doppler {:.1} time {:.3}",
        buf.u8(0)?,
        buf.be_f32(1)?,
        buf.be_f32(5)?,
        buf.be_f32(9)?,
        buf.be_f32(13)?,
        buf.be_f64(17)?
    );
    Ok(Mask::empty())
}

/// Store `sat` in sky view slot `chan`. Channel 0 starts a new pass; the
/// last channel of a pass reports the sky view.
fn track(session: &mut Session, ctx: &mut Context, chan: usize, tow: f64, sat: Satellite) -> Mask {
    let state = session.tsip();
    let last = state.last_chan_seen;
    state.last_chan_seen = chan;
    if chan == 0 && last > 0 {
        session.gpsdata.satellites_visible = last + 1;
    }
    if chan >= TSIP_CHANNELS {
        return Mask::empty();
    }
    let sky = &mut session.gpsdata.skyview;
    if sky.len() <= chan {
        sky.resize(chan + 1, Satellite::default());
    }
    sky[chan] = sat;
    if tow > 0.0 && time_valid(ctx) {
        session.gpsdata.skyview_time = ctx.gpstime_resolve(u32::from(ctx.gps_week), tow);
    }
    let seen = chan + 1;
    if seen >= session.gpsdata.satellites_visible {
        session.gpsdata.satellites_visible = seen;
        return Mask::SATELLITE;
    }
    Mask::empty()
}

/// 0x5C, GPS-only tracking status.
pub(super) fn tracking_status(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 24)?;
    let prn = i16::from(buf.u8(0)?);
    let chan = usize::from(buf.u8(1)? >> 3);
    let ss = f64::from(buf.be_f32(4)?);
    let tow = f64::from(buf.be_f32(8)?);
    let (gnssid, svid) = tsip_gnssid(0, prn);
    let used = ss > 0.1 && session.tsip().sats_used.contains(&prn);
    let sat = Satellite {
        gnssid,
        svid,
        prn,
        ss,
        elevation: f64::from(buf.be_f32(12)?).to_degrees(),
        azimuth: f64::from(buf.be_f32(16)?).to_degrees(),
        used,
        ..Satellite::default()
    };
    debug!(
        "TSIP x5c: ch {chan:2} PRN {prn:3} SNR {ss:4.1} el {:4.1} az {:5.1} used {used}",
        sat.elevation, sat.azimuth
    );
    Ok(track(session, ctx, chan, tow, sat))
}

/// 0x5D, multi-GNSS tracking status.
pub(super) fn tracking_status_gnss(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 26)?;
    let prn = i16::from(buf.u8(0)?);
    let chan = usize::from(buf.u8(1)?);
    let used = buf.u8(3)? != 0;
    let ss = f64::from(buf.be_f32(4)?);
    let tow = f64::from(buf.be_f32(8)?);
    let bad = buf.u8(22)?;
    let svtype = buf.u8(25)?;
    let (gnssid, svid) = tsip_gnssid(svtype, prn);
    let sat = Satellite {
        gnssid,
        svid,
        prn,
        ss,
        elevation: f64::from(buf.be_f32(12)?).to_degrees(),
        azimuth: f64::from(buf.be_f32(16)?).to_degrees(),
        used,
        health: if bad == 0 { SatHealth::Ok } else { SatHealth::Bad },
        ..Satellite::default()
    };
    debug!(
        "TSIP x5d: ch {chan:2} type {svtype} PRN {prn:3} SNR {ss:4.1} el {:4.1} az {:5.1} used {used} bad {bad}",
        sat.elevation, sat.azimuth
    );
    Ok(track(session, ctx, chan, tow, sat))
}

fn dops(session: &mut Session, buf: &BitReader<'_>) -> Result<()> {
    let d = &mut session.gpsdata.dop;
    d.pdop = f64::from(buf.be_f32(1)?);
    d.hdop = f64::from(buf.be_f32(5)?);
    d.vdop = f64::from(buf.be_f32(9)?);
    // the SMT 360 family always reports 1.0
    d.tdop = f64::from(buf.be_f32(13)?);
    d.gdop = d.pdop.hypot(d.tdop);
    Ok(())
}

fn used_list(session: &mut Session, buf: &BitReader<'_>, offset: usize, count: usize) -> Result<()> {
    let prns = buf.bytes(offset, count)?.iter().map(|&p| i16::from(p)).collect();
    session.tsip().sats_used = prns;
    session.gpsdata.satellites_used = count;
    Ok(())
}

/// 0x6C, all-in-view satellite selection.
pub(super) fn all_in_view(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let dims = buf.u8(0)?;
    let count = usize::from(buf.u8(17)?);
    exact(buf, 18 + count)?;
    let now = session.now;
    session.tsip().last_6d = now;

    let (mode, mut status) = dimension(dims);
    if dims & 0x08 != 0 {
        // surveyed in
        status = FixStatus::Time;
    }
    session.newdata.mode = mode;
    session.newdata.status = status;
    dops(session, buf)?;
    used_list(session, buf, 18, count)?;
    debug!(
        "TSIP x6c: AIVSS: mode {mode:?} status {status:?} used {count} pdop {:.1} gdop {:.1}",
        session.gpsdata.dop.pdop, session.gpsdata.dop.gdop
    );
    Ok(Mask::MODE | Mask::STATUS | Mask::DOP | Mask::USED_IS)
}

/// 0x6D, the older all-in-view report with the count packed into byte 0.
pub(super) fn all_in_view_old(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let dims = buf.u8(0)?;
    let count = usize::from(dims >> 4);
    exact(buf, 17 + count)?;
    let now = session.now;
    session.tsip().last_6d = now;

    let (mode, status) = if session.gpsdata.fix.longitude.is_finite() {
        dimension(dims)
    } else {
        (FixMode::NoFix, FixStatus::Unknown)
    };
    session.newdata.mode = mode;
    session.newdata.status = status;
    dops(session, buf)?;
    used_list(session, buf, 17, count)?;
    debug!("TSIP x6d: AIVSS: dims {dims:#04x} mode {mode:?} status {status:?} used {count}");
    Ok(Mask::MODE | Mask::STATUS | Mask::DOP | Mask::USED_IS)
}

pub(super) fn dgps_mode(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 1)?;
    let mode = buf.u8(0)?;
    debug!("TSIP x82: DGPS mode {mode}");
    if mode & 0x03 != 0x03 {
        return Ok(Mask::empty());
    }
    session.newdata.status = FixStatus::Dgps;
    Ok(Mask::STATUS)
}

/// 0x83 carries no fix mode; it is carried over from the previous fixes.
pub(super) fn ecef_position_double(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let ecef = &mut session.newdata.ecef;
    ecef.x = buf.be_f64(0)?;
    ecef.y = buf.be_f64(8)?;
    ecef.z = buf.be_f64(16)?;
    let bias = buf.be_f64(24)?;
    let tow = f64::from(buf.be_f32(32)?);
    session.newdata.status = session.lastfix.status;
    session.newdata.mode = if session.oldfix.mode < FixMode::Fix2D {
        FixMode::Fix2D
    } else {
        session.lastfix.mode
    };
    debug!(
        "TSIP x83: DP-XYZ: {:.2} {:.2} {:.2} bias {bias:.2} tow {tow:.2} mode {:?}",
        session.newdata.ecef.x, session.newdata.ecef.y, session.newdata.ecef.z, session.newdata.mode
    );
    Ok(Mask::ECEF | Mask::STATUS | Mask::MODE | fix_time(session, ctx, tow))
}

pub(super) fn lla_position_double(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 36)?;
    let lat = buf.be_f64(0)?.to_degrees();
    let lon = buf.be_f64(8)?.to_degrees();
    let alt = buf.be_f64(16)?;
    let tow = f64::from(buf.be_f32(32)?);
    session.newdata.latitude = lat;
    session.newdata.longitude = lon;
    if session.tsip().alt_is_msl {
        session.newdata.alt_msl = alt;
    } else {
        session.newdata.alt_hae = alt;
    }
    session.newdata.status = session.oldfix.status;
    session.newdata.mode = session.oldfix.mode;
    let mut mask = Mask::LATLON | Mask::ALTITUDE | Mask::STATUS | Mask::MODE;
    if time_valid(ctx) {
        mask |= fix_time(session, ctx, tow);
    }
    debug!("TSIP x84: DP-LLA: {lat:.7} {lon:.7} {alt:.2} tow {tow:.2}");
    Ok(mask)
}

/// 0x8F, super packets by sub-code.
pub(super) fn super_packet(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    match buf.u8(0)? {
        0x15 => {
            need(buf, 43)?;
            debug!("TSIP x8f-15: datum index {}", buf.be_i16(1)?);
            Ok(Mask::empty())
        },
        0x20 => lfwei(session, ctx, buf),
        0x23 => compact(session, ctx, buf),
        0xa5 => {
            need(buf, 5)?;
            debug!("TSIP x8f-a5: broadcast mask {:#06x} {:#06x}", buf.be_u16(1)?, buf.be_u16(3)?);
            Ok(Mask::empty())
        },
        0xa6 => {
            need(buf, 3)?;
            debug!("TSIP x8f-a6: self-survey command {} status {}", buf.u8(1)?, buf.u8(2)?);
            Ok(Mask::empty())
        },
        0xa7 => {
            need(buf, 10)?;
            debug!("TSIP x8f-a7: satellite solutions, format {} time {}", buf.u8(1)?, buf.be_u32(2)?);
            Ok(Mask::empty())
        },
        0xab => primary_timing(session, ctx, buf),
        0xac => supplemental_timing(session, ctx, buf),
        sub => {
            debug!("TSIP x8f-{sub:02x}: unhandled, length {}", buf.len());
            Ok(Mask::empty())
        },
    }
}

fn need(buf: &BitReader<'_>, min: usize) -> Result<()> {
    if buf.len() < min {
        return Err(Error::BadLength {
            expected: min,
            len: buf.len(),
        });
    }
    Ok(())
}

/// Record a plausible receiver leap second count and undo the week
/// aliasing of receivers that guess the 1024-week epoch wrong.
fn resolve_week(ctx: &mut Context, leap: u8, mut week: u16) -> u16 {
    if leap <= 10 {
        return week;
    }
    ctx.set_leap_seconds(i32::from(leap));
    if leap > 17 && week < LEAP_18_WEEK {
        week += 1024;
        if week < LEAP_18_WEEK {
            week += 1024;
        }
    }
    week
}

/// Fix flags of the LFwEI and CSP super packets.
fn fix_flags(fix: &mut Fix, flags: u8) {
    fix.status = FixStatus::Unknown;
    fix.mode = FixMode::NoFix;
    // bit 0 set means no fix
    if flags & 0x01 != 0 {
        return;
    }
    fix.status = if flags & 0x02 != 0 { FixStatus::Dgps } else { FixStatus::Gps };
    fix.mode = if flags & 0x04 != 0 { FixMode::Fix2D } else { FixMode::Fix3D };
}

/// Scaled 16-bit velocity; `0x8000` is over-range.
fn velocity(buf: &BitReader<'_>, offset: usize, scale: f64) -> Result<f64> {
    let v = buf.be_i16(offset)?;
    Ok(if v == i16::MIN { f64::NAN } else { f64::from(v) * scale })
}

/// Position and velocity common to LFwEI and CSP, `offsets` locating
/// latitude, longitude, altitude and the east, north, up velocities.
fn solution(session: &mut Session, buf: &BitReader<'_>, offsets: [usize; 6], scale: f64) -> Result<()> {
    let [lat, lon, alt, ve, vn, vu] = offsets;
    let fix = &mut session.newdata;
    fix.latitude = f64::from(buf.be_i32(lat)?) * SEMI_2_DEG;
    fix.longitude = f64::from(buf.be_u32(lon)?) * SEMI_2_DEG;
    if fix.longitude > 180.0 {
        fix.longitude -= 360.0;
    }
    // always HAE, mm
    fix.alt_hae = f64::from(buf.be_i32(alt)?) * 1e-3;
    fix.ned.vel_e = velocity(buf, ve, scale)?;
    fix.ned.vel_n = velocity(buf, vn, scale)?;
    fix.ned.vel_d = -velocity(buf, vu, scale)?;
    Ok(())
}

/// A whole solution with time; it closes its own cycle.
fn solution_time(session: &mut Session, ctx: &mut Context, week: u16, tow_ms: u32) -> Mask {
    let tow = f64::from(tow_ms) / 1000.0;
    session.newdata.time = ctx.gpstime_resolve(u32::from(week), tow);
    Mask::TIME
        | Mask::NTPTIME_IS
        | Mask::LATLON
        | Mask::ALTITUDE
        | Mask::STATUS
        | Mask::MODE
        | Mask::VNED
        | Mask::REPORT_IS
        | new_tow(session, tow)
}

/// 0x8F-20, Last Fix with Extra Information.
fn lfwei(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    // Copernicus sends 64 bytes, everything else 56
    if buf.len() != 56 && buf.len() != 64 {
        return Err(Error::BadLength {
            expected: 56,
            len: buf.len(),
        });
    }
    let scale = if buf.u8(24)? & 0x01 != 0 { 0.02 } else { 0.005 };
    solution(session, buf, [12, 16, 20, 2, 4, 6], scale)?;
    let tow_ms = buf.be_u32(8)?;
    let flags = buf.u8(27)?;
    let nsv = buf.u8(28)?;
    let leap = buf.u8(29)?;
    let week = resolve_week(ctx, leap, buf.be_u16(30)?);
    fix_flags(&mut session.newdata, flags);
    session.gpsdata.satellites_used = usize::from(nsv);
    let mask = solution_time(session, ctx, week, tow_ms);
    debug!(
        "TSIP x8f-20: LFwEI: week {week} tow {tow_ms} lat {:.7} lon {:.7} altHAE {:.2} mode {:?} status {:?}",
        session.newdata.latitude,
        session.newdata.longitude,
        session.newdata.alt_hae,
        session.newdata.mode,
        session.newdata.status
    );
    Ok(mask)
}

/// 0x8F-23, Compact Super Packet.
fn compact(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    session.tsip().req_compact = 0.0;
    need(buf, 29)?;
    let tow_ms = buf.be_u32(1)?;
    let leap = buf.u8(7)?;
    let flags = buf.u8(8)?;
    let week = resolve_week(ctx, leap, buf.be_u16(5)?);
    let scale = if flags & 0x20 != 0 { 0.02 } else { 0.005 };
    solution(session, buf, [9, 13, 17, 21, 23, 25], scale)?;
    fix_flags(&mut session.newdata, flags);
    let mask = solution_time(session, ctx, week, tow_ms);
    debug!(
        "TSIP x8f-23: CSP: week {week} tow {tow_ms} lat {:.7} lon {:.7} altHAE {:.2} mode {:?}",
        session.newdata.latitude, session.newdata.longitude, session.newdata.alt_hae, session.newdata.mode
    );
    Ok(mask)
}

/// 0x8F-AB, primary timing.
fn primary_timing(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    need(buf, 17)?;
    let now = session.now;
    session.tsip().last_41 = now;
    let tow = f64::from(buf.be_u32(1)?);
    let week = buf.be_u16(5)?;
    let leap = buf.be_i16(7)?;
    let flags = buf.u8(9)?;
    ctx.set_leap_seconds(i32::from(leap));
    session.newdata.time = ctx.gpstime_resolve(u32::from(week), tow);
    debug!("TSIP x8f-ab: tow {tow} week {week} leap {leap} flags {flags:#04x}");
    Ok(Mask::TIME | Mask::NTPTIME_IS | new_tow(session, tow))
}

/// 0x8F-AC, supplemental timing. Carries position on timing receivers.
fn supplemental_timing(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    exact(buf, 68)?;
    let receiver_mode = buf.u8(1)?;
    let decoding = buf.u8(12)?;
    let pps_offset = buf.be_f32(16)?;
    // ns to ps
    session.gpsdata.qerr = (f64::from(pps_offset) * 1000.0) as i64;
    let fix = &mut session.newdata;
    fix.temp = f64::from(buf.be_f32(32)?);
    fix.latitude = buf.be_f64(36)?.to_degrees();
    fix.longitude = buf.be_f64(44)?.to_degrees();
    fix.alt_hae = buf.be_f64(52)?;
    fix.status = if decoding == 0 { FixStatus::Gps } else { FixStatus::Unknown };
    fix.mode = match receiver_mode & 0x07 {
        // automatic, by what the decoder is doing
        0 => match decoding {
            0x00 => FixMode::Fix3D,
            0x0b => FixMode::Fix2D,
            _ => FixMode::NoFix,
        },
        3 | 6 => FixMode::Fix2D,
        1 | 4 | 7 => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    debug!(
        "TSIP x8f-ac: lat {:.7} lon {:.7} altHAE {:.2} mode {:?} temp {:.1} qErr {pps_offset:.1}",
        fix.latitude, fix.longitude, fix.alt_hae, fix.mode, fix.temp
    );
    Ok(Mask::LATLON | Mask::ALTITUDE | Mask::MODE | Mask::STATUS)
}

pub(super) fn receiver_configuration(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.len() != 40 && buf.len() != 43 {
        return Err(Error::BadLength {
            expected: 40,
            len: buf.len(),
        });
    }
    debug!(
        "TSIP xbb: navigation configuration: dims {} dgps {} dynamics {} elevation {:.2} AMU {:.1} PDOP {:.1}/{:.1}",
        buf.u8(1)?,
        buf.u8(2)?,
        buf.u8(3)?,
        buf.be_f32(5)?,
        buf.be_f32(9)?,
        buf.be_f32(13)?,
        buf.be_f32(17)?
    );
    Ok(Mask::empty())
}
