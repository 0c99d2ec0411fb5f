//! Trimble TSIP frames fed as raw bytes through a session.

mod common;

use byteorder::{BigEndian, WriteBytesExt};
use common::{context, recording_session, tsip_frame};
use gnssd::{FixMode, FixStatus, Mask, PacketType};

const SEMI_2_DEG: f64 = 180.0 / 2_147_483_647.0;

/// 0x8F-20 Last Fix with Extra Information, id to the last PRN/IODE pair.
#[derive(Debug, Clone)]
struct Lfwei {
    east: i16,
    north: i16,
    up: i16,
    tow_ms: u32,
    lat: f64,
    lon: f64,
    alt_mm: i32,
    velocity_scale: u8,
    flags: u8,
    nsv: u8,
    leap: u8,
    week: u16,
}

impl Default for Lfwei {
    fn default() -> Self {
        Self {
            east: 100,
            north: -50,
            up: 30,
            tow_ms: 345_600_000,
            lat: 37.5,
            lon: -122.25,
            alt_mm: 12_345,
            velocity_scale: 0x01,
            flags: 0x00,
            nsv: 7,
            leap: 18,
            week: 1500,
        }
    }
}

impl Lfwei {
    fn to_packet(&self) -> Vec<u8> {
        let mut wtr = vec![0x8f, 0x20, 0x00];
        wtr.write_i16::<BigEndian>(self.east).unwrap();
        wtr.write_i16::<BigEndian>(self.north).unwrap();
        wtr.write_i16::<BigEndian>(self.up).unwrap();
        wtr.write_u32::<BigEndian>(self.tow_ms).unwrap();
        wtr.write_i32::<BigEndian>((self.lat / SEMI_2_DEG).round() as i32).unwrap();
        let lon = if self.lon < 0.0 { self.lon + 360.0 } else { self.lon };
        wtr.write_u32::<BigEndian>((lon / SEMI_2_DEG).round() as u32).unwrap();
        wtr.write_i32::<BigEndian>(self.alt_mm).unwrap();
        wtr.extend_from_slice(&[self.velocity_scale, 0x00, 0x00, self.flags, self.nsv, self.leap]);
        wtr.write_u16::<BigEndian>(self.week).unwrap();
        // PRN/IODE pairs
        wtr.resize(1 + 56, 0);
        wtr
    }
}

#[test]
fn tsip_lfwei_week_rollover() {
    let mut ctx = context();
    let (mut session, reports) = recording_session();
    let packet = Lfwei::default().to_packet();
    let frame = tsip_frame(&packet);
    assert_eq!(frame[..3], [0x10, 0x8f, 0x20]);

    let mask = session.feed_at(&mut ctx, &frame, 100.0);
    assert!(mask.contains(Mask::REPORT_IS | Mask::VNED | Mask::DRIVER_IS));
    assert_eq!(session.driver().packet_type, PacketType::Tsip);
    assert_eq!(ctx.gps_week, 2524);
    assert_eq!(ctx.leap_seconds, 18);

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    let fix = &reports[0].fix;
    assert_eq!(fix.mode, FixMode::Fix3D);
    assert_eq!(fix.status, FixStatus::Gps);
    assert!((fix.latitude - 37.5).abs() < 1e-6);
    assert!((fix.longitude + 122.25).abs() < 1e-6);
    assert!((fix.ned.vel_e - 2.0).abs() < 1e-9);
    assert!((fix.ned.vel_n + 1.0).abs() < 1e-9);
    assert!((fix.ned.vel_d + 0.6).abs() < 1e-9);
    // week 2524, 4 days in, less 18 leap seconds
    assert_eq!(fix.time.unwrap().timestamp(), 1_842_825_582);
    assert_eq!(reports[0].satellites_used, 7);
}

#[test]
fn stuffed_dle_survives_the_lexer() {
    let mut ctx = context();
    let (mut session, reports) = recording_session();
    let lfwei = Lfwei {
        // 0x00101010, every byte a DLE but the first
        alt_mm: 0x0010_1010,
        week: 2300,
        ..Default::default()
    };
    let frame = tsip_frame(&lfwei.to_packet());
    assert!(frame.windows(2).any(|w| w == [0x10, 0x10]));

    session.feed_at(&mut ctx, &frame, 100.0);
    assert_eq!(session.lexer.bad_count, 0);
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert!((reports[0].fix.alt_hae - 1052.688).abs() < 1e-9);
    assert_eq!(ctx.gps_week, 2300);
}

#[test]
fn truncated_lfwei_publishes_nothing() {
    let mut ctx = context();
    let (mut session, reports) = recording_session();
    let mut packet = Lfwei::default().to_packet();
    packet.truncate(1 + 35);

    let mask = session.feed_at(&mut ctx, &tsip_frame(&packet), 100.0);
    assert_eq!(session.driver().packet_type, PacketType::Tsip);
    assert!(!mask.intersects(Mask::REPORT_IS | Mask::LATLON | Mask::TIME));
    assert!(reports.borrow().is_empty());
    assert_eq!(ctx.gps_week, 0);
}

#[test]
fn empty_frame_is_accepted_without_a_fix() {
    let mut ctx = context();
    let (mut session, reports) = recording_session();
    let mask = session.feed_at(&mut ctx, &[0x10, 0x00, 0x10, 0x03], 1.0);
    assert!(mask.contains(Mask::PACKET));
    assert!(!mask.contains(Mask::REPORT_IS));
    assert!(reports.borrow().is_empty());
}

#[test]
fn v1_timing_through_the_lexer() {
    let mut ctx = context();
    let (mut session, _) = recording_session();
    let mut data = Vec::new();
    data.write_u32::<BigEndian>(3600).unwrap();
    data.write_u16::<BigEndian>(2300).unwrap();
    data.extend_from_slice(&[1, 0, 0, 2, 4]);
    data.write_u16::<BigEndian>(2024).unwrap();
    data.extend_from_slice(&[0, 0, 0x03]);
    data.write_i16::<BigEndian>(18).unwrap();
    data.write_f32::<BigEndian>(2.5e-9).unwrap();
    data.resize(30, 0);
    let packet = gnssd::tsip::v1::packet(0xa1, 0x00, gnssd::tsip::v1::MODE_RESPONSE, &data);

    let mask = session.feed_at(&mut ctx, &gnssd::tsip::frame(&packet), 5.0);
    assert!(mask.contains(Mask::TIME | Mask::CLEAR_IS));
    assert_eq!(ctx.gps_week, 2300);
    assert_eq!(ctx.leap_seconds, 18);
    assert_eq!(session.gpsdata.qerr, 2500);
    assert_eq!(session.tsip_state().unwrap().hardware_code, 0);
}
