//! UBX-LOG: the receiver's own position and string log.
//!
//! Every handler starts from an empty [`LogRecord`](crate::fix::LogRecord)
//! and reports [`Mask::LOG`] only when the entry carries a usable date.

use ::log::{debug, trace, warn};

use crate::{
    bits::BitReader,
    context::Context,
    error::Result,
    fix::{FixMode, FixStatus},
    mask::Mask,
    session::Session,
};

use super::utc_date;

/// Retrieved entries with a year before this have no date.
const NO_DATE_YEAR: u16 = 1900;

/// One entry of the batch buffer, a slimmed NAV-PVT.
pub(super) fn batch(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let log = &mut session.gpsdata.log;
    log.clear();
    let time_valid = buf.u8(15)?;
    if time_valid & 0x03 != 0x03 {
        trace!("UBX: LOG-BATCH without valid time");
        return Ok(Mask::empty());
    }
    let content = buf.u8(1)?;
    log.index_cnt = u32::from(buf.le_u16(2)?);
    log.time = utc_date(buf, 8, buf.le_i32(20)?)?;
    let fix_type = buf.u8(24)?;
    log.fix_type = i32::from(fix_type);
    let flags = buf.u8(25)?;
    let fix_ok = flags & 0x01 != 0;
    if fix_ok && fix_type >= 2 {
        log.lon = 1e-7 * f64::from(buf.le_i32(28)?);
        log.lat = 1e-7 * f64::from(buf.le_i32(32)?);
        log.g_speed = 1e-3 * f64::from(buf.le_i32(64)?);
        log.heading = 1e-5 * f64::from(buf.le_i32(68)?);
        log.status = if flags & 0x02 != 0 {
            FixStatus::Dgps
        } else {
            FixStatus::Gps
        };
        if fix_type >= 3 {
            log.alt_hae = 1e-3 * f64::from(buf.le_i32(36)?);
        }
    }
    log.h_acc = 1e-3 * f64::from(buf.le_u32(44)?);
    debug!(
        "UBX: LOG-BATCH index {} fixType {fix_type} lon {:.7} lat {:.7} psmState {}",
        log.index_cnt,
        log.lon,
        log.lat,
        (flags >> 2) & 0x07
    );

    if content & 0x01 != 0 {
        log.t_acc = f64::from(buf.le_u32(16)?);
        log.num_sv = u32::from(buf.u8(27)?);
        log.alt_msl = 1e-3 * f64::from(buf.le_i32(40)?);
        log.v_acc = 1e-3 * f64::from(buf.le_u32(48)?);
        log.vel_n = 1e-3 * f64::from(buf.le_i32(52)?);
        log.vel_e = 1e-3 * f64::from(buf.le_i32(56)?);
        log.vel_d = 1e-3 * f64::from(buf.le_i32(60)?);
        log.s_acc = 1e-3 * f64::from(buf.le_u32(72)?);
        log.head_acc = 1e-5 * f64::from(buf.le_u32(76)?);
        log.p_dop = 1e-2 * f64::from(buf.le_u32(80)?);
    }
    if content & 0x02 != 0 {
        log.distance = f64::from(buf.le_u32(84)?);
        log.total_distance = f64::from(buf.le_u32(88)?);
        log.distance_std = f64::from(buf.le_u32(92)?);
    }
    Ok(Mask::LOG)
}

/// Log status. Logged, not published.
pub(super) fn info(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    session.gpsdata.log.clear();
    let stamp = |offset: usize| -> Result<String> {
        if buf.le_u16(offset)? == 0 {
            return Ok("none".into());
        }
        Ok(utc_date(buf, offset, 0)?.map_or_else(|| "invalid".into(), |t| t.to_rfc3339()))
    };
    debug!(
        "UBX: LOG-INFO version {} status {:#04x} capacity {} maxSize {} size {} entries {} oldest {} newest {}",
        buf.u8(0)?,
        buf.u8(44)?,
        buf.le_u32(4)?,
        buf.le_u32(16)?,
        buf.le_u32(20)?,
        buf.le_u32(24)?,
        stamp(28)?,
        stamp(36)?
    );
    Ok(Mask::empty())
}

/// Date of a retrieved entry at `offset`, `None` when the receiver left
/// it blank.
fn entry_date(session: &mut Session, buf: &BitReader<'_>, offset: usize, name: &str) -> Result<bool> {
    let log = &mut session.gpsdata.log;
    log.clear();
    if buf.le_u16(offset)? < NO_DATE_YEAR {
        trace!("UBX: {name} entry without date");
        return Ok(false);
    }
    log.time = utc_date(buf, offset, 0)?;
    if log.time.is_none() {
        warn!("UBX: {name} entry with invalid date");
        return Ok(false);
    }
    log.index_cnt = buf.le_u32(0)?;
    Ok(true)
}

/// Indexed position entry.
pub(super) fn retrievepos(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if !entry_date(session, buf, 30, "LOG-RETRIEVEPOS")? {
        return Ok(Mask::empty());
    }
    let log = &mut session.gpsdata.log;
    log.lon = 1e-7 * f64::from(buf.le_i32(4)?);
    log.lat = 1e-7 * f64::from(buf.le_i32(8)?);
    log.alt_msl = 1e-3 * f64::from(buf.le_i32(12)?);
    log.h_acc = 1e-3 * f64::from(buf.le_u32(16)?);
    log.g_speed = 1e-3 * f64::from(buf.le_u32(20)?);
    log.heading = 1e-5 * f64::from(buf.le_u32(24)?);
    log.num_sv = u32::from(buf.u8(38)?);
    let (mode, status) = match buf.u8(29)? {
        1 => (FixMode::Fix3D, FixStatus::Dr),
        2 => (FixMode::Fix2D, FixStatus::Gps),
        3 => (FixMode::Fix3D, FixStatus::Gps),
        4 => (FixMode::Fix3D, FixStatus::GnssDr),
        _ => (FixMode::NoFix, FixStatus::Unknown),
    };
    log.fix_type = mode as i32;
    log.status = status;
    debug!(
        "UBX: LOG-RETRIEVEPOS index {} lon {:.7} lat {:.7} altMSL {:.3} mode {mode:?} numSV {}",
        log.index_cnt, log.lon, log.lat, log.alt_msl, log.num_sv
    );
    Ok(Mask::LOG)
}

/// Indexed odometer entry.
pub(super) fn retrieveposextra(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if !entry_date(session, buf, 6, "LOG-RETRIEVEPOSEXTRA")? {
        return Ok(Mask::empty());
    }
    let log = &mut session.gpsdata.log;
    // units undocumented, metres as in LOG-BATCH
    log.distance = f64::from(buf.le_u32(16)?);
    debug!("UBX: LOG-RETRIEVEPOSEXTRA index {} distance {}", log.index_cnt, log.distance);
    Ok(Mask::LOG)
}

/// Indexed string entry.
pub(super) fn retrievestring(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if !entry_date(session, buf, 6, "LOG-RETRIEVESTRING")? {
        return Ok(Mask::empty());
    }
    let count = usize::from(buf.le_u16(14)?);
    let width = count.min(buf.len() - 16);
    let log = &mut session.gpsdata.log;
    log.string = buf.string(16, width)?;
    debug!(
        "UBX: LOG-RETRIEVESTRING index {} byteCount {count} string {}",
        log.index_cnt, log.string
    );
    Ok(Mask::LOG)
}
