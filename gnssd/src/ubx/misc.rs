//! The small classes: ACK, INF, HNR, SEC and TIM.

use ::log::{debug, info, warn};

use crate::{bits::BitReader, context::Context, error::Result, mask::Mask, session::Session};

use super::{
    esf::{attitude_time, vehicle_dynamics},
    nav::{carrier_status, fix_type},
    utc_date,
};

pub(super) fn ack(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!("UBX: ACK for {:02x}/{:02x}", buf.u8(0)?, buf.u8(1)?);
    Ok(Mask::empty())
}

fn inf_text(buf: &BitReader<'_>) -> String {
    String::from_utf8_lossy(buf.as_slice())
        .trim_end_matches(['\0', '\r', '\n'])
        .to_owned()
}

pub(super) fn inf_error(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    warn!("UBX: INF-ERROR: {}", inf_text(buf));
    Ok(Mask::empty())
}

pub(super) fn inf_warning(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    warn!("UBX: INF-WARNING: {}", inf_text(buf));
    Ok(Mask::empty())
}

pub(super) fn inf_notice(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    info!("UBX: INF-NOTICE: {}", inf_text(buf));
    Ok(Mask::empty())
}

/// INF-DEBUG, INF-TEST and INF-USER.
pub(super) fn inf_debug(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!("UBX: INF: {}", inf_text(buf));
    Ok(Mask::empty())
}

// HNR messages run off the navigation cycle and never set the packet iTOW.

pub(super) fn hnr_att(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = buf.le_u32(0)?;
    let att = &mut session.gpsdata.attitude;
    att.roll = 1e-5 * f64::from(buf.le_i32(8)?);
    att.pitch = 1e-5 * f64::from(buf.le_i32(12)?);
    // true heading, as far as anyone can tell
    att.heading = 1e-5 * f64::from(buf.le_i32(16)?);
    debug!(
        "UBX: HNR-ATT iTOW {itow} version {} roll {:.5} pitch {:.5} heading {:.5}",
        buf.u8(4)?,
        att.roll,
        att.pitch,
        att.heading
    );
    attitude_time(session, ctx, itow);
    Ok(Mask::ATTITUDE)
}

pub(super) fn hnr_ins(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    vehicle_dynamics(session, ctx, buf, "HNR-INS")
}

/// High rate PVT. It interleaves with the normal cycle, so every one is
/// reported on its own.
pub(super) fn hnr_pvt(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = buf.le_u32(0)?;
    let valid = buf.u8(11)?;
    let kind = buf.u8(16)?;
    let flags = buf.u8(17)?;

    let (mode, status) = fix_type(kind);
    let mut mask = Mask::MODE | Mask::STATUS;
    if (1..=5).contains(&kind) {
        mask |= Mask::LATLON | Mask::SPEED;
    }
    let fix = &mut session.newdata;
    fix.mode = mode;
    fix.status = carrier_status(flags).unwrap_or(status);

    if valid & 0x03 == 0x03 {
        fix.time = utc_date(buf, 4, buf.le_i32(12)?)?;
        mask |= Mask::TIME | Mask::NTPTIME_IS | Mask::GOODTIME_IS;
    }
    fix.longitude = 1e-7 * f64::from(buf.le_i32(20)?);
    fix.latitude = 1e-7 * f64::from(buf.le_i32(24)?);
    fix.alt_hae = 1e-3 * f64::from(buf.le_i32(28)?);
    fix.alt_msl = 1e-3 * f64::from(buf.le_i32(32)?);
    fix.speed = 1e-3 * f64::from(buf.le_i32(36)?);
    fix.track = 1e-5 * f64::from(buf.le_i32(44)?);
    fix.eph = f64::from(buf.le_i32(52)?) / 1000.0;
    fix.epv = f64::from(buf.le_i32(56)?) / 1000.0;
    fix.eps = f64::from(buf.le_i32(60)?) / 1000.0;
    fix.epd = 1e-5 * f64::from(buf.le_i32(64)?);
    mask |= Mask::LATLON
        | Mask::ALTITUDE
        | Mask::SPEED
        | Mask::TRACK
        | Mask::HERR
        | Mask::SPEEDERR
        | Mask::VERR
        | Mask::REPORT_IS;
    debug!(
        "UBX: HNR-PVT iTOW {itow} gpsFix {kind} flags {flags:#04x} lat {:.7} lon {:.7} mode {:?} status {:?}",
        fix.latitude, fix.longitude, fix.mode, fix.status
    );
    Ok(mask)
}

/// Chip serial number. Version 1 carries five bytes, version 2 six.
pub(super) fn uniqid(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    let width = match version {
        1 => 5,
        2 => 6,
        _ => {
            warn!("UBX: SEC-UNIQID unknown version {version}");
            return Ok(Mask::empty());
        },
    };
    session.gpsdata.serial = buf
        .bytes(4, width)?
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    info!("UBX: SEC-UNIQID {}", session.gpsdata.serial);
    Ok(Mask::empty())
}

pub(super) fn tim_svin(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    debug!(
        "UBX: TIM-SVIN dur {} mean {} {} {} meanV {} obs {} valid {} active {}",
        buf.le_u32(0)?,
        buf.le_i32(4)?,
        buf.le_i32(8)?,
        buf.le_i32(12)?,
        buf.le_u32(16)?,
        buf.le_u32(20)?,
        buf.u8(24)?,
        buf.u8(25)?
    );
    Ok(Mask::empty())
}

/// Time pulse data. The quantization error is kept only while the pulse
/// is locked to UTC; its time is the GPS week and TOW of the pulse with no
/// leap second applied.
pub(super) fn tim_tp(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let tow_ms = buf.le_u32(0)?;
    let tow_sub_ms = buf.le_u32(4)?;
    let qerr = buf.le_i32(8)?;
    let week = buf.le_u16(12)?;
    let flags = buf.u8(14)?;
    let ref_info = buf.u8(15)?;
    // towSubMS is ms * 2^-32; round to the nearest ns
    let nanos = (u64::from(tow_sub_ms) * 1_000_000 + 500_000) >> 32;
    let tow = f64::from(tow_ms) / 1000.0 + nanos as f64 * 1e-9;
    if flags & 0x03 == 0x03 {
        session.gpsdata.qerr = i64::from(qerr);
        session.gpsdata.qerr_time = ctx.gpstime(u32::from(week), tow);
    } else {
        debug!("UBX: TIM-TP not locked to UTC");
    }
    debug!(
        "UBX: TIM-TP towMS {tow_ms} towSubMS {tow_sub_ms} qErr {qerr} week {week} flags {flags:#04x} refInfo {ref_info:#04x}"
    );
    Ok(Mask::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fix::{FixMode, FixStatus},
        ubx::{
            id::*,
            tests::{run, ubx_session},
        },
    };

    #[test]
    fn inf_is_logged_only() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        assert_eq!(run(&mut session, &mut ctx, INF_NOTICE, b"ANTSUPERV=AC SD PDoS SR\0"), Mask::ONLINE);
        assert_eq!(session.ubx().protver, 13);
        assert_eq!(inf_text(&BitReader::new(b"hello\r\n")), "hello");
    }

    #[test]
    fn hnr_pvt_reports_every_packet() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 72];
        p[4..6].copy_from_slice(&2024u16.to_le_bytes());
        p[6..11].copy_from_slice(&[6, 1, 10, 0, 0]);
        p[11] = 0x03;
        p[16] = 3;
        p[17] = 0x82;
        p[24..28].copy_from_slice(&(-337_000_000i32).to_le_bytes());
        p[64..68].copy_from_slice(&250_000i32.to_le_bytes());
        let mask = run(&mut session, &mut ctx, HNR_PVT, &p);
        assert!(mask.contains(Mask::REPORT_IS | Mask::TIME | Mask::LATLON));
        let fix = &session.newdata;
        assert_eq!(fix.mode, FixMode::Fix3D);
        assert_eq!(fix.status, FixStatus::RtkFix);
        assert!((fix.latitude + 33.7).abs() < 1e-9);
        assert!((fix.epd - 2.5).abs() < 1e-9);
        // off-cycle: the packet iTOW is untouched
        assert_eq!(session.ubx().itow, -1);
    }

    #[test]
    fn hnr_att_sets_angles() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 32];
        p[8..12].copy_from_slice(&(-150_000i32).to_le_bytes());
        p[16..20].copy_from_slice(&9_000_000i32.to_le_bytes());
        let mask = run(&mut session, &mut ctx, HNR_ATT, &p);
        assert!(mask.contains(Mask::ATTITUDE));
        let att = &session.gpsdata.attitude;
        assert!((att.roll + 1.5).abs() < 1e-9);
        assert!((att.heading - 90.0).abs() < 1e-9);
        assert!(att.mtime.is_some());
    }

    #[test]
    fn uniqid_formats_serial() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![1, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef, 0x01];
        run(&mut session, &mut ctx, SEC_UNIQID, &p);
        assert_eq!(session.gpsdata.serial, "deadbeef01");

        p[0] = 2;
        p.extend_from_slice(&[0x02, 0, 0]);
        run(&mut session, &mut ctx, SEC_UNIQID, &p);
        assert_eq!(session.gpsdata.serial, "deadbeef0102");

        p[0] = 9;
        run(&mut session, &mut ctx, SEC_UNIQID, &p);
        assert_eq!(session.gpsdata.serial, "deadbeef0102");
    }

    #[test]
    fn tim_tp_needs_utc_lock() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 16];
        p[0..4].copy_from_slice(&3000u32.to_le_bytes());
        p[8..12].copy_from_slice(&(-150i32).to_le_bytes());
        p[12..14].copy_from_slice(&2300u16.to_le_bytes());
        p[14] = 0x01;
        run(&mut session, &mut ctx, TIM_TP, &p);
        assert_eq!(session.gpsdata.qerr_time, None);

        p[14] = 0x03;
        run(&mut session, &mut ctx, TIM_TP, &p);
        assert_eq!(session.gpsdata.qerr, -150);
        let t = session.gpsdata.qerr_time.map(|t| t.to_rfc3339());
        assert_eq!(t.as_deref(), Some("2024-02-04T00:00:03+00:00"));
    }
}
