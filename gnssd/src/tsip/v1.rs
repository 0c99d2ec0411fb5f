//! TSIP v1, the framing newer Trimble receivers (RES 720, ICM 720 and
//! friends) use inside the legacy DLE envelope.
//!
//! A v1 packet is `id sub length(be16) mode data… xor`, where `length`
//! counts everything after itself and `xor` covers the id through the last
//! data byte. Only mode 2 (response) is decoded. Responses to the setup
//! queries walk the receiver through a fixed probe sequence, one query per
//! answer.

use ::log::{debug, info, warn};
use chrono::{Duration, NaiveDate};

use super::{config, write, Model};
use crate::{
    bits::BitReader,
    checksum::tsip_v1_xor,
    context::{Context, ContextFlags},
    error::{Error, Result},
    fix::{FixMode, FixStatus, SatHealth, Satellite},
    gnss::{tsipv1_svtype, ubx2_to_prn},
    mask::Mask,
    session::Session,
};

/// Mode byte of a query, a set and a response.
pub const MODE_QUERY: u8 = 0;
pub const MODE_SET: u8 = 1;
pub const MODE_RESPONSE: u8 = 2;

/// Ids the v1 protocol took over from the legacy space.
pub fn is_v1(id: u8) -> bool {
    matches!(id, 0x90..=0x93 | 0xa0..=0xa5 | 0xd0)
}

/// A v1 packet, id first and checksum last, ready for [`super::frame`].
pub fn packet(id: u8, sub: u8, mode: u8, data: &[u8]) -> Vec<u8> {
    let length = (data.len() + 2) as u16;
    let mut out = Vec::with_capacity(data.len() + 6);
    out.extend_from_slice(&[id, sub]);
    out.extend_from_slice(&length.to_be_bytes());
    out.push(mode);
    out.extend_from_slice(data);
    out.push(tsip_v1_xor(&out));
    out
}

type Handler = fn(&mut Session, &mut Context, &BitReader<'_>) -> Result<Mask>;

/// One v1 response: `(id << 8) | sub`, the shortest length field it
/// accepts, and the probe step its arrival triggers.
struct Response {
    key: u16,
    name: &'static str,
    min_len: u16,
    probe: Option<u8>,
    handler: Handler,
}

const fn response(key: u16, name: &'static str, min_len: u16, probe: Option<u8>, handler: Handler) -> Response {
    Response {
        key,
        name,
        min_len,
        probe,
        handler,
    }
}

#[rustfmt::skip]
static RESPONSES: &[Response] = &[
    response(0x9000, "Protocol Version", 0, Some(0), protocol_version),
    response(0x9001, "Receiver Version", 11, Some(1), receiver_version),
    response(0x9100, "Port Configuration", 18, Some(2), port_configuration),
    response(0x9101, "GNSS Configuration", 28, Some(3), gnss_configuration),
    response(0x9102, "NVS Configuration", 8, None, log_only),
    response(0x9103, "Timing Configuration", 19, Some(4), timing_configuration),
    response(0x9104, "Self-Survey Configuration", 11, Some(5), self_survey),
    response(0x9105, "Receiver Configuration", 19, Some(7), receiver_configuration),
    response(0x9201, "Reset Cause", 3, None, reset_cause),
    response(0x9300, "Production Information", 78, Some(6), production_information),
    response(0xa000, "Firmware Upload", 3, None, firmware_upload),
    response(0xa100, "Timing Information", 32, None, timing_information),
    response(0xa102, "Frequency Information", 17, None, frequency_information),
    response(0xa111, "Position Information", 52, None, position_information),
    response(0xa200, "Satellite Information", 25, None, satellite_information),
    response(0xa300, "System Alarms", 18, None, system_alarms),
    response(0xa311, "Receiver Status", 29, None, receiver_status),
    response(0xa321, "Error Report", 5, None, error_report),
];

/// Decode one un-stuffed v1 packet. `payload` is everything after the id.
pub fn parse(session: &mut Session, ctx: &mut Context, id: u8, payload: &[u8]) -> Mask {
    if payload.len() < 5 {
        warn!("TSIP x{id:02x}: v1 packet too short, {} bytes", payload.len());
        return Mask::empty();
    }
    let sub = payload[0];
    let length = u16::from_be_bytes([payload[1], payload[2]]);
    if payload.len() != usize::from(length) + 3 {
        warn!(
            "TSIP x{id:02x}-{sub:02x}: v1 length {length} disagrees with {} byte packet",
            payload.len()
        );
        return Mask::empty();
    }
    let sum = payload.iter().fold(id, |acc, b| acc ^ b);
    if sum != 0 {
        warn!("TSIP x{id:02x}-{sub:02x}: v1 checksum mismatch, residue {sum:#04x}");
        return Mask::empty();
    }
    let mode = payload[3];
    if mode != MODE_RESPONSE {
        debug!("TSIP x{id:02x}-{sub:02x}: mode {mode}, not a response");
        return Mask::empty();
    }
    if id == 0xd0 {
        debug!("TSIP xd0-{sub:02x}: debug output, length {length}");
        return Mask::empty();
    }

    let key = (u16::from(id) << 8) | u16::from(sub);
    let Some(resp) = RESPONSES.iter().find(|r| r.key == key) else {
        debug!("TSIP x{id:02x}-{sub:02x}: unhandled v1 packet, length {length}");
        return Mask::empty();
    };
    // keep the checksum out of the fields
    let buf = BitReader::new(&payload[..payload.len() - 1]);
    let result = if length < resp.min_len {
        Err(Error::BadLength {
            expected: usize::from(resp.min_len),
            len: usize::from(length),
        })
    } else {
        (resp.handler)(session, ctx, &buf)
    };
    let mask = match result {
        Ok(mask) => mask,
        Err(e) => {
            warn!("TSIP x{id:02x}-{sub:02x}: {}: {e}", resp.name);
            return Mask::empty();
        },
    };
    if let Some(step) = resp.probe {
        probe(session, ctx, step);
    }
    mask
}

/// Send the setup query for `step`.
pub fn probe(session: &mut Session, ctx: &Context, step: u8) {
    let query = |id: u8, sub: u8| packet(id, sub, MODE_QUERY, &[]);
    let pkt = match step {
        0 => query(0x91, 0x01),
        1 => query(0x90, 0x00),
        2 => query(0x90, 0x01),
        3 => query(0x91, 0x03),
        4 => query(0x91, 0x04),
        5 => query(0x93, 0x00),
        6 if ctx.passive => packet(0x91, 0x05, MODE_QUERY, &[0xff]),
        6 => {
            // every current port: timing, position, satellites, alarms and status
            let mut data = vec![0xff];
            data.extend_from_slice(&0x0000_2aaau32.to_be_bytes());
            data.extend_from_slice(&[0; 12]);
            packet(0x91, 0x05, MODE_SET, &data)
        },
        _ => return,
    };
    debug!("TSIP v1: probe step {step}, x{:02x}-{:02x}", pkt[0], pkt[1]);
    write(session, ctx, &pkt);
}

fn name(buf: &BitReader<'_>, offset: usize) -> Result<String> {
    let declared = usize::from(buf.u8(offset)?);
    let n = declared.min(40).min(buf.len().saturating_sub(offset + 1));
    Ok(buf.string(offset + 1, n)?.trim_end().to_owned())
}

fn log_only(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!("TSIP v1 x{:02x}: {} bytes", buf.u8(0)?, buf.len());
    Ok(Mask::empty())
}

fn protocol_version(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.len() >= 6 {
        info!("TSIP x90-00: protocol version {}.{}", buf.u8(4)?, buf.u8(5)?);
    }
    Ok(Mask::empty())
}

fn receiver_version(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let [major, minor, build, month, day] = [buf.u8(4)?, buf.u8(5)?, buf.u8(6)?, buf.u8(7)?, buf.u8(8)?];
    let year = buf.be_u16(9)?;
    let code = buf.be_u16(11)?;
    let product = name(buf, 13)?;
    session.subtype = format!("fw {major}.{minor} {build} {day:02}/{month:02}/{year:04} {product}");
    info!("TSIP x90-01: {} hardware code {code}", session.subtype);

    let model = Model::from_hardware_code(code);
    let state = session.tsip();
    state.hardware_code = code;
    state.model = model;
    config::configure(session, ctx, model);
    Ok(Mask::DEVICEID)
}

fn port_configuration(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP x91-00: port {} type {} protocol {} baud {} data {} parity {} stop {}",
        buf.u8(4)?,
        buf.u8(5)?,
        buf.u8(6)?,
        buf.u8(7)?,
        buf.u8(8)?,
        buf.u8(9)?,
        buf.u8(10)?
    );
    Ok(Mask::empty())
}

fn gnss_configuration(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP x91-01: constellations {:#010x} elevation mask {:.1} signal mask {:.1} PDOP mask {:.1} anti-jam {}",
        buf.be_u32(4)?,
        buf.be_f32(8)?,
        buf.be_f32(12)?,
        buf.be_f32(16)?,
        buf.u8(20)?
    );
    Ok(Mask::empty())
}

fn timing_configuration(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP x91-03: time base {} PPS base {} PPS mask {} PPS width {} offset {:.1}",
        buf.u8(4)?,
        buf.u8(5)?,
        buf.u8(6)?,
        buf.be_u32(7)?,
        buf.be_f64(11)?
    );
    Ok(Mask::empty())
}

fn self_survey(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP x91-04: self-survey mask {} length {} horizontal {} vertical {}",
        buf.u8(4)?,
        buf.be_u32(5)?,
        buf.be_u16(9)?,
        buf.be_u16(11)?
    );
    Ok(Mask::empty())
}

fn receiver_configuration(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!("TSIP x91-05: port {} output mask {:#010x}", buf.u8(4)?, buf.be_u32(5)?);
    Ok(Mask::empty())
}

fn reset_cause(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    warn!("TSIP x92-01: reset, cause {}", buf.u8(4)?);
    Ok(Mask::empty())
}

fn production_information(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let [day, month] = [buf.u8(25)?, buf.u8(26)?];
    let year = buf.be_u16(27)?;
    let machine = buf.be_u16(30)?;
    session.subtype1 = format!("hw {machine} {day:02}/{month:02}/{year:04}");
    info!("TSIP x93-00: production: {}", session.subtype1);
    Ok(Mask::DEVICEID)
}

fn firmware_upload(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.len() != 5 && buf.len() != 10 {
        return Err(Error::BadLength {
            expected: 5,
            len: buf.len(),
        });
    }
    info!("TSIP xa0-00: firmware upload status {}", buf.u8(4)?);
    Ok(Mask::empty())
}

/// xA1-00, timing. Ends the previous cycle.
fn timing_information(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let tow = buf.be_u32(4)?;
    let week = buf.be_u16(8)?;
    let [hour, minute, second, month, day] = [buf.u8(10)?, buf.u8(11)?, buf.u8(12)?, buf.u8(13)?, buf.u8(14)?];
    let year = buf.be_u16(15)?;
    let flags = buf.u8(19)?;
    let offset = buf.be_i16(20)?;
    let qerr = buf.be_f32(22)?;

    ctx.gps_week = week;
    ctx.gps_tow = f64::from(tow);
    ctx.valid |= ContextFlags::GPS_TIME_VALID;
    // s to ps
    session.gpsdata.qerr = (f64::from(qerr) * 1e12).round() as i64;
    debug!(
        "TSIP xa1-00: tow {tow} week {week} {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} \
         flags {flags:#04x} offset {offset} qErr {qerr:e}"
    );

    let mut mask = Mask::CLEAR_IS;
    if offset > 10 {
        ctx.set_leap_seconds(i32::from(offset));
    }
    if flags & 0x02 != 0 {
        session.newdata.time = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
            .map(|t| t.and_utc() - Duration::seconds(i64::from(offset)));
        mask |= Mask::TIME;
        if flags & 0x01 != 0 {
            mask |= Mask::NTPTIME_IS;
        }
    }
    if session.tsip().hardware_code == 0 {
        // a receiver that never said who it is
        write(session, ctx, &packet(0x90, 0x01, MODE_QUERY, &[]));
    }
    Ok(mask)
}

fn frequency_information(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "TSIP xa1-02: DAC value {} voltage {:.3} temperature {:.2} disciplining {} holdover {}",
        buf.be_u32(4)?,
        buf.be_f32(8)?,
        buf.be_f32(12)?,
        buf.u8(16)?,
        buf.u8(17)?
    );
    Ok(Mask::empty())
}

/// xA1-11, position and velocity.
fn position_information(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let pos_mask = buf.u8(4)?;
    let fix_type = buf.u8(5)?;
    let (a, b, c) = (buf.be_f64(6)?, buf.be_f64(14)?, buf.be_f64(22)?);
    let (va, vb, vc) = (
        f64::from(buf.be_f32(30)?),
        f64::from(buf.be_f32(34)?),
        f64::from(buf.be_f32(38)?),
    );
    let fix = &mut session.newdata;
    let mut mask = Mask::MODE | Mask::STATUS | Mask::DOP | Mask::HERR | Mask::VERR;
    // bit 0 set is a timing-only (surveyed) solution
    fix.status = if pos_mask & 0x01 == 0 { FixStatus::Gps } else { FixStatus::Time };
    fix.mode = match fix_type {
        1 => FixMode::Fix2D,
        2 => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    if pos_mask & 0x02 != 0 {
        fix.ecef.x = a;
        fix.ecef.y = b;
        fix.ecef.z = c;
        mask |= Mask::ECEF;
    } else {
        fix.latitude = a;
        fix.longitude = b;
        if pos_mask & 0x04 != 0 {
            fix.alt_msl = c;
        } else {
            fix.alt_hae = c;
        }
        mask |= Mask::LATLON | Mask::ALTITUDE;
    }
    if pos_mask & 0x01 == 0 {
        if pos_mask & 0x08 != 0 {
            fix.ecef.vx = va;
            fix.ecef.vy = vb;
            fix.ecef.vz = vc;
            mask |= Mask::VECEF;
        } else {
            fix.ned.vel_e = va;
            fix.ned.vel_n = vb;
            fix.ned.vel_d = -vc;
            mask |= Mask::VNED;
        }
    }
    session.gpsdata.dop.pdop = f64::from(buf.be_f32(42)?);
    fix.eph = f64::from(buf.be_f32(46)?);
    fix.epv = f64::from(buf.be_f32(50)?);
    debug!(
        "TSIP xa1-11: mask {pos_mask:#04x} fix {fix_type} {a:.7} {b:.7} {c:.2} mode {:?} status {:?}",
        fix.mode, fix.status
    );
    Ok(mask)
}

/// xA2-00, one satellite per message, numbered from 1.
fn satellite_information(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let number = usize::from(buf.u8(4)?);
    let svtype = buf.u8(5)?;
    let svid = buf.u8(6)?;
    let azimuth = f64::from(buf.be_f32(7)?);
    let elevation = f64::from(buf.be_f32(11)?);
    let ss = f64::from(buf.be_f32(15)?);
    let flags = buf.be_u32(19)?;
    let tow = buf.be_u32(23)?;

    let state = session.tsip();
    let previous = state.last_chan_seen;
    state.last_chan_seen = number;
    state.last_a200 = tow;
    let last_a311 = state.last_a311;
    if number == 1 {
        session.gpsdata.satellites_visible = previous;
        session.gpsdata.skyview.clear();
    }

    let Some((gnssid, sigid)) = tsipv1_svtype(svtype) else {
        debug!("TSIP xa2-00: unknown SV type {svtype}");
        return Ok(Mask::empty());
    };
    let mut sat = Satellite {
        gnssid,
        svid,
        sigid,
        prn: ubx2_to_prn(gnssid, svid),
        ss,
        used: flags & 0x06 != 0,
        health: SatHealth::Ok,
        ..Satellite::default()
    };
    // bit 0: azimuth and elevation valid
    if flags & 0x01 != 0 && (0.0..360.0).contains(&azimuth) && (-90.0..=90.0).contains(&elevation) {
        sat.azimuth = azimuth;
        sat.elevation = elevation;
    }
    debug!(
        "TSIP xa2-00: {number} type {svtype} id {svid} PRN {} az {azimuth:.1} el {elevation:.1} SNR {ss:.1} flags {flags:#x}",
        sat.prn
    );
    if session.gpsdata.skyview.len() < crate::constants::MAXCHANNELS {
        session.gpsdata.skyview.push(sat);
    }
    session.gpsdata.skyview_time = ctx.gpstime(u32::from(ctx.gps_week), f64::from(tow));

    let visible = session.gpsdata.satellites_visible;
    // without xA3-11 nothing else ends the sky view
    if visible > 0 && number >= visible && tow.abs_diff(last_a311) > 10 {
        session.tsip().last_a200 = 0;
        session.gpsdata.satellites_used = session.gpsdata.skyview.iter().filter(|s| s.used).count();
        return Ok(Mask::SATELLITE);
    }
    Ok(Mask::empty())
}

fn system_alarms(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let minor = buf.be_u32(4)?;
    let major = buf.be_u32(12)?;
    if major != 0 {
        warn!("TSIP xa3-00: major alarms {major:#010x} minor {minor:#010x}");
    } else {
        debug!("TSIP xa3-00: minor alarms {minor:#010x}");
    }
    Ok(Mask::empty())
}

/// xA3-11, receiver status. Ends the cycle.
fn receiver_status(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let mode = buf.u8(4)?;
    let status = buf.u8(5)?;
    let dop = &mut session.gpsdata.dop;
    dop.pdop = f64::from(buf.be_f32(7)?);
    dop.hdop = f64::from(buf.be_f32(11)?);
    dop.vdop = f64::from(buf.be_f32(15)?);
    dop.tdop = f64::from(buf.be_f32(19)?);
    session.newdata.temp = f64::from(buf.be_f32(23)?);

    let mut mask = Mask::REPORT_IS | Mask::DOP;
    let state = session.tsip();
    state.last_a311 = state.last_a200;
    if state.last_a200 > 0 {
        state.last_a200 = 0;
        session.gpsdata.satellites_used = session.gpsdata.skyview.iter().filter(|s| s.used).count();
        mask |= Mask::SATELLITE;
    }
    session.newdata.status = match status {
        // fixes, and the survey states that still hold one
        0 | 4..=6 => FixStatus::Gps,
        255 => FixStatus::Time,
        _ => FixStatus::Unknown,
    };
    mask |= Mask::STATUS;
    debug!(
        "TSIP xa3-11: mode {mode} status {status} pdop {:.1} temp {:.1}",
        session.gpsdata.dop.pdop, session.newdata.temp
    );
    Ok(mask)
}

fn error_report(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    warn!(
        "TSIP xa3-21: error code {} for x{:02x}-{:02x}",
        buf.u8(6)?,
        buf.u8(4)?,
        buf.u8(5)?
    );
    Ok(Mask::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsip::{
        frame,
        tests::{run, tsip_session},
    };

    /// A mode 2 response with `data` after the mode byte.
    fn response(id: u8, sub: u8, data: &[u8]) -> Vec<u8> {
        packet(id, sub, MODE_RESPONSE, data)
    }

    fn timing(flags: u8) -> Vec<u8> {
        let mut d = Vec::new();
        d.extend_from_slice(&3600u32.to_be_bytes());
        d.extend_from_slice(&2300u16.to_be_bytes());
        d.extend_from_slice(&[1, 0, 0, 2, 4]);
        d.extend_from_slice(&2024u16.to_be_bytes());
        d.extend_from_slice(&[0, 0, flags]);
        d.extend_from_slice(&18i16.to_be_bytes());
        d.extend_from_slice(&2.5e-9f32.to_be_bytes());
        d.resize(30, 0);
        response(0xa1, 0x00, &d)
    }

    #[test]
    fn v1_ids() {
        assert!(is_v1(0x90));
        assert!(is_v1(0xa3));
        assert!(is_v1(0xd0));
        assert!(!is_v1(0x8f));
        assert!(!is_v1(0xa6));
    }

    #[test]
    fn query_layout() {
        let q = packet(0x91, 0x01, MODE_QUERY, &[]);
        assert_eq!(q, [0x91, 0x01, 0x00, 0x02, 0x00, 0x91 ^ 0x01 ^ 0x02]);
    }

    #[test]
    fn timing_sets_time_and_leap() {
        let (mut session, mut ctx) = tsip_session();
        let mask = run(&mut session, &mut ctx, &timing(0x03));
        assert!(mask.contains(Mask::TIME | Mask::NTPTIME_IS | Mask::CLEAR_IS));
        assert_eq!(session.newdata.time.unwrap().to_rfc3339(), "2024-02-04T00:59:42+00:00");
        assert_eq!(ctx.gps_week, 2300);
        assert_eq!(ctx.leap_seconds, 18);
        assert_eq!(session.gpsdata.qerr, 2500);
    }

    #[test]
    fn timing_without_valid_time() {
        let (mut session, mut ctx) = tsip_session();
        let mask = run(&mut session, &mut ctx, &timing(0x00));
        assert_eq!(mask, Mask::CLEAR_IS | Mask::ONLINE);
        assert!(session.newdata.time.is_none());
    }

    #[test]
    fn bad_checksum_is_dropped() {
        let (mut session, mut ctx) = tsip_session();
        let mut p = timing(0x03);
        *p.last_mut().unwrap() ^= 0x55;
        assert_eq!(run(&mut session, &mut ctx, &p), Mask::ONLINE);
        // length field disagrees with the packet
        let mut p = timing(0x03);
        p[3] += 1;
        assert_eq!(run(&mut session, &mut ctx, &p), Mask::ONLINE);
    }

    fn position(pos_mask: u8, fix_type: u8) -> Vec<u8> {
        let mut d = vec![pos_mask, fix_type];
        for v in [45.5f64, -93.25, 250.0] {
            d.extend_from_slice(&v.to_be_bytes());
        }
        for v in [1.0f32, 2.0, 0.5, 1.4, 2.5, 4.0] {
            d.extend_from_slice(&v.to_be_bytes());
        }
        response(0xa1, 0x11, &d)
    }

    #[test]
    fn lla_position_with_enu_velocity() {
        let (mut session, mut ctx) = tsip_session();
        let mask = run(&mut session, &mut ctx, &position(0x00, 2));
        assert!(mask.contains(Mask::LATLON | Mask::ALTITUDE | Mask::VNED | Mask::MODE | Mask::DOP));
        assert!(!mask.contains(Mask::ECEF));
        let fix = &session.newdata;
        assert_eq!((fix.mode, fix.status), (FixMode::Fix3D, FixStatus::Gps));
        assert_eq!(fix.latitude, 45.5);
        assert_eq!(fix.alt_hae, 250.0);
        assert_eq!((fix.ned.vel_e, fix.ned.vel_n, fix.ned.vel_d), (1.0, 2.0, -0.5));
        assert_eq!((fix.eph, fix.epv), (2.5, 4.0));
        assert!((session.gpsdata.dop.pdop - 1.4).abs() < 1e-6);
    }

    #[test]
    fn timing_mode_ecef_has_no_velocity() {
        let (mut session, mut ctx) = tsip_session();
        let mask = run(&mut session, &mut ctx, &position(0x03, 1));
        assert!(mask.contains(Mask::ECEF));
        assert!(!mask.intersects(Mask::LATLON | Mask::VNED | Mask::VECEF));
        assert_eq!(session.newdata.status, FixStatus::Time);
        assert_eq!(session.newdata.mode, FixMode::Fix2D);
        assert_eq!(session.newdata.ecef.z, 250.0);
    }

    fn satellite(number: u8, svid: u8, tow: u32) -> Vec<u8> {
        let mut d = vec![number, 1, svid];
        for v in [120.0f32, 45.0, 38.0] {
            d.extend_from_slice(&v.to_be_bytes());
        }
        d.extend_from_slice(&0x03u32.to_be_bytes());
        d.extend_from_slice(&tow.to_be_bytes());
        response(0xa2, 0x00, &d)
    }

    fn status() -> Vec<u8> {
        let mut d = vec![0, 0, 100];
        for v in [1.5f32, 0.9, 1.2, 1.0, 41.5] {
            d.extend_from_slice(&v.to_be_bytes());
        }
        d.resize(27, 0);
        response(0xa3, 0x11, &d)
    }

    #[test]
    fn receiver_status_closes_sky_view() {
        let (mut session, mut ctx) = tsip_session();
        assert!(!run(&mut session, &mut ctx, &satellite(1, 5, 1000)).contains(Mask::SATELLITE));
        run(&mut session, &mut ctx, &satellite(2, 9, 1000));
        let sky = &session.gpsdata.skyview;
        assert_eq!(sky.len(), 2);
        assert_eq!(sky[0].prn, 5);
        assert_eq!(sky[0].azimuth, 120.0);
        assert!(sky[1].used);

        let mask = run(&mut session, &mut ctx, &status());
        assert!(mask.contains(Mask::SATELLITE | Mask::REPORT_IS | Mask::DOP | Mask::STATUS));
        assert_eq!(session.newdata.status, FixStatus::Gps);
        assert_eq!(session.newdata.temp, 41.5);
        assert_eq!(session.gpsdata.satellites_used, 2);
        assert_eq!(session.tsip().last_a311, 1000);
        // nothing new since
        assert!(!run(&mut session, &mut ctx, &status()).contains(Mask::SATELLITE));
    }

    #[test]
    fn sky_view_restarts_at_one() {
        let (mut session, mut ctx) = tsip_session();
        for n in 1..=3 {
            run(&mut session, &mut ctx, &satellite(n, n, 1000));
        }
        run(&mut session, &mut ctx, &satellite(1, 7, 1001));
        assert_eq!(session.gpsdata.skyview.len(), 1);
        assert_eq!(session.gpsdata.satellites_visible, 3);
        run(&mut session, &mut ctx, &satellite(2, 8, 1001));
        // no xA3-11 seen, the last satellite ends the view
        assert!(run(&mut session, &mut ctx, &satellite(3, 9, 1001)).contains(Mask::SATELLITE));
    }

    #[test]
    fn version_drives_probe() {
        let (mut session, mut ctx) = tsip_session();
        ctx.readonly = false;
        session.drain_outbox().for_each(drop);
        let mut d = vec![2, 10, 7, 3, 21];
        d.extend_from_slice(&2023u16.to_be_bytes());
        d.extend_from_slice(&3100u16.to_be_bytes());
        d.push(7);
        d.extend_from_slice(b"RES 720");
        let mask = run(&mut session, &mut ctx, &response(0x90, 0x01, &d));
        assert!(mask.contains(Mask::DEVICEID));
        assert_eq!(session.subtype, "fw 2.10 7 21/03/2023 RES 720");
        assert_eq!(session.tsip().hardware_code, 3100);
        let sent: Vec<_> = session.drain_outbox().collect();
        assert!(sent.contains(&frame(&packet(0x90, 0x00, MODE_QUERY, &[]))));
    }

    #[test]
    fn passive_probe_only_queries() {
        let (mut session, mut ctx) = tsip_session();
        ctx.readonly = false;
        ctx.passive = true;
        session.drain_outbox().for_each(drop);
        probe(&mut session, &ctx, 6);
        let sent = session.drain_outbox().next().unwrap();
        assert_eq!(sent, frame(&packet(0x91, 0x05, MODE_QUERY, &[0xff])));

        ctx.passive = false;
        probe(&mut session, &ctx, 6);
        let sent = crate::tsip::unstuff(&session.drain_outbox().next().unwrap()).unwrap();
        assert_eq!(sent[2..5], [0x00, 19, MODE_SET]);
        probe(&mut session, &ctx, 7);
        assert_eq!(session.outbox_len(), 0);
    }

    #[test]
    fn unknown_hardware_is_asked_for() {
        let (mut session, mut ctx) = tsip_session();
        ctx.readonly = false;
        session.drain_outbox().for_each(drop);
        run(&mut session, &mut ctx, &timing(0x03));
        let query = frame(&packet(0x90, 0x01, MODE_QUERY, &[]));
        assert!(session.drain_outbox().any(|f| f == query));
    }
}
