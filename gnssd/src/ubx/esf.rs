//! UBX-ESF: external sensor fusion. Attitude and raw IMU samples.

use ::log::{debug, trace, warn};

use crate::{
    bits::{sign_extend, BitReader},
    context::Context,
    error::Result,
    fix::{Attitude, MAX_IMU},
    mask::Mask,
    session::Session,
};

use super::set_itow;

/// Apply one sensor sample to `att`. Returns false for data types this
/// driver does not keep.
fn apply_sample(att: &mut Attitude, data: u32) -> bool {
    let kind = (data >> 24) & 0x3f;
    let value = f64::from(sign_extend(data & 0x00ff_ffff, 24));
    let slot = match kind {
        5 => (&mut att.gyro_z, 4096.0),
        12 => (&mut att.gyro_temp, 100.0),
        13 => (&mut att.gyro_y, 4096.0),
        14 => (&mut att.gyro_x, 4096.0),
        16 => (&mut att.acc_x, 1024.0),
        17 => (&mut att.acc_y, 1024.0),
        18 => (&mut att.acc_z, 1024.0),
        _ => {
            trace!("UBX: ESF data type {kind} value {:#x}", data & 0x00ff_ffff);
            return false;
        },
    };
    *slot.0 = value / slot.1;
    true
}

pub(super) fn attitude_time(session: &mut Session, ctx: &mut Context, itow: u32) {
    let week = u32::from(ctx.gps_week);
    session.gpsdata.attitude.mtime = ctx.gpstime_resolve(week, f64::from(itow) / 1000.0);
}

/// Sensor alignment: the mounting angles of the receiver in the vehicle.
pub(super) fn alg(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let error = buf.u8(6)?;
    let yaw = buf.le_u32(8)?;
    let pitch = buf.le_i16(12)?;
    let roll = buf.le_i16(14)?;
    let mut mask = Mask::empty();
    let att = &mut session.gpsdata.attitude;
    if error & 0x02 == 0 {
        att.yaw = 0.01 * f64::from(yaw);
        mask |= Mask::ATTITUDE;
    }
    if error & 0x05 == 0 {
        att.roll = 0.01 * f64::from(roll);
        att.pitch = 0.01 * f64::from(pitch);
        mask |= Mask::ATTITUDE;
    }
    if !mask.is_empty() {
        attitude_time(session, ctx, itow);
    }
    debug!(
        "UBX: ESF-ALG iTOW {itow} version {} flags {:#04x} error {error:#04x} yaw {yaw} pitch {pitch} roll {roll}",
        buf.u8(4)?,
        buf.u8(5)?
    );
    Ok(mask)
}

/// Vehicle dynamics: compensated angular rate and acceleration.
pub(super) fn ins(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    set_itow(session, buf, 8)?;
    vehicle_dynamics(session, ctx, buf, "ESF-INS")
}

/// The ESF-INS layout, which HNR-INS shares. Leaves the packet iTOW alone.
pub(super) fn vehicle_dynamics(
    session: &mut Session,
    ctx: &mut Context,
    buf: &BitReader<'_>,
    name: &str,
) -> Result<Mask> {
    let valid = buf.le_u32(0)?;
    let itow = buf.le_u32(8)?;
    let mut mask = Mask::empty();
    let att = &mut session.gpsdata.attitude;
    for (bit, offset, scale, slot) in [
        (0x100, 12, 0.001, &mut att.gyro_x),
        (0x200, 16, 0.001, &mut att.gyro_y),
        (0x400, 20, 0.001, &mut att.gyro_z),
        (0x800, 24, 0.01, &mut att.acc_x),
        (0x1000, 28, 0.01, &mut att.acc_y),
        (0x2000, 32, 0.01, &mut att.acc_z),
    ] {
        if valid & bit != 0 {
            *slot = scale * f64::from(buf.le_i32(offset)?);
            mask |= Mask::ATTITUDE;
        }
    }
    if !mask.is_empty() {
        attitude_time(session, ctx, itow);
    }
    debug!("UBX: {name} iTOW {itow} bitfield0 {valid:#x}");
    Ok(mask)
}

/// One epoch of sensor measurements.
pub(super) fn meas(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let time_tag = buf.le_u32(0)?;
    let flags = buf.le_u16(4)?;
    let count = usize::from((flags >> 11) & 0x1f);
    let expected = 8 + 4 * count + if flags & 0x08 != 0 { 4 } else { 0 };
    if expected != buf.len() {
        warn!("UBX: ESF-MEAS length {} expected {expected}", buf.len());
        return Ok(Mask::empty());
    }
    debug!(
        "UBX: ESF-MEAS timeTag {time_tag} flags {flags:#06x} numMeas {count} id {}",
        buf.le_u16(6)?
    );
    let mut sample = Attitude {
        msg: "UBX-ESF-MEAS".into(),
        time_tag,
        ..Attitude::default()
    };
    let mut mask = Mask::empty();
    for i in 0..count {
        if apply_sample(&mut sample, buf.le_u32(8 + 4 * i)?) {
            mask |= Mask::IMU;
        }
    }
    session.gpsdata.imu = vec![sample];
    Ok(mask)
}

/// Raw sensor samples. Samples sharing a sensor time tag form one IMU
/// record; at most [`MAX_IMU`] records are kept.
pub(super) fn raw(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if (buf.len() - 4) % 8 != 0 {
        warn!("UBX: ESF-RAW ragged length {}", buf.len());
        return Ok(Mask::empty());
    }
    let blocks = (buf.len() - 4) / 8;
    let mut imu: Vec<Attitude> = Vec::new();
    let mut mask = Mask::empty();
    for i in 0..blocks {
        let data = buf.le_u32(4 + 8 * i)?;
        let tag = buf.le_u32(8 + 8 * i)?;
        if imu.last().map_or(true, |a| a.time_tag != tag) {
            if imu.len() >= MAX_IMU {
                debug!("UBX: ESF-RAW more than {MAX_IMU} epochs, dropping from block {i}");
                break;
            }
            imu.push(Attitude {
                msg: "UBX-ESF-RAW".into(),
                time_tag: tag,
                ..Attitude::default()
            });
        }
        if let Some(att) = imu.last_mut() {
            if apply_sample(att, data) {
                mask |= Mask::IMU;
            }
        }
    }
    debug!("UBX: ESF-RAW blocks {blocks} epochs {}", imu.len());
    session.gpsdata.imu = imu;
    Ok(mask)
}

pub(super) fn status(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    let sensors = usize::from(buf.u8(15)?);
    if 16 + 4 * sensors != buf.len() {
        warn!("UBX: ESF-STATUS length {} for {sensors} sensors", buf.len());
        return Ok(Mask::empty());
    }
    debug!(
        "UBX: ESF-STATUS iTOW {itow} version {} fusionMode {} numSens {sensors}",
        buf.u8(4)?,
        buf.u8(12)?
    );
    Ok(Mask::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::{
        id::*,
        tests::{run, ubx_session},
    };

    fn sample(kind: u32, value: i32) -> [u8; 4] {
        ((kind << 24) | (value as u32 & 0x00ff_ffff)).to_le_bytes()
    }

    #[test]
    fn sample_types() {
        let mut att = Attitude::default();
        assert!(apply_sample(&mut att, u32::from_le_bytes(sample(16, -1024))));
        assert!(apply_sample(&mut att, u32::from_le_bytes(sample(12, 2350))));
        assert!(!apply_sample(&mut att, u32::from_le_bytes(sample(11, 7))));
        assert_eq!(att.acc_x, -1.0);
        assert_eq!(att.gyro_temp, 23.5);
    }

    #[test]
    fn alg_respects_error_flags() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 16];
        p[6] = 0x01;
        p[8..12].copy_from_slice(&9000u32.to_le_bytes());
        p[12..14].copy_from_slice(&250i16.to_le_bytes());
        let mask = run(&mut session, &mut ctx, ESF_ALG, &p);
        assert!(mask.contains(Mask::ATTITUDE));
        assert_eq!(session.gpsdata.attitude.yaw, 90.0);
        assert!(session.gpsdata.attitude.pitch.is_nan());
        assert!(session.gpsdata.attitude.mtime.is_some());
    }

    #[test]
    fn ins_only_valid_axes() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 36];
        p[0..4].copy_from_slice(&0x0900u32.to_le_bytes());
        p[12..16].copy_from_slice(&1500i32.to_le_bytes());
        p[20..24].copy_from_slice(&99i32.to_le_bytes());
        p[24..28].copy_from_slice(&(-981i32).to_le_bytes());
        let mask = run(&mut session, &mut ctx, ESF_INS, &p);
        assert!(mask.contains(Mask::ATTITUDE));
        let att = &session.gpsdata.attitude;
        assert_eq!(att.gyro_x, 1.5);
        assert!(att.gyro_z.is_nan());
        assert!((att.acc_x + 9.81).abs() < 1e-12);
    }

    #[test]
    fn meas_checks_length() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 8];
        p[0..4].copy_from_slice(&77u32.to_le_bytes());
        p[4..6].copy_from_slice(&(2u16 << 11).to_le_bytes());
        p.extend_from_slice(&sample(14, 4096));
        p.extend_from_slice(&sample(18, 10_240));
        let mask = run(&mut session, &mut ctx, ESF_MEAS, &p);
        assert!(mask.contains(Mask::IMU));
        let imu = &session.gpsdata.imu;
        assert_eq!(imu.len(), 1);
        assert_eq!(imu[0].time_tag, 77);
        assert_eq!(imu[0].gyro_x, 1.0);
        assert_eq!(imu[0].acc_z, 10.0);

        p.push(0);
        assert!(!run(&mut session, &mut ctx, ESF_MEAS, &p).contains(Mask::IMU));
    }

    #[test]
    fn raw_groups_by_time_tag() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 4];
        for tag in [10u32, 10, 20, 30, 40, 50] {
            p.extend_from_slice(&sample(16, 1024));
            p.extend_from_slice(&tag.to_le_bytes());
        }
        let mask = run(&mut session, &mut ctx, ESF_RAW, &p);
        assert!(mask.contains(Mask::IMU));
        let imu = &session.gpsdata.imu;
        assert_eq!(imu.len(), MAX_IMU);
        assert_eq!(imu.iter().map(|a| a.time_tag).collect::<Vec<_>>(), [10, 20, 30, 40]);
        assert_eq!(imu[0].msg, "UBX-ESF-RAW");
    }

    #[test]
    fn status_needs_sensor_blocks() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8; 16];
        p[15] = 1;
        assert_eq!(run(&mut session, &mut ctx, ESF_STATUS, &p), Mask::ONLINE);
    }
}
