//! GPS LNAV subframes through the public decoders, and what they leave in
//! the context.

mod common;

use common::context;
use gnssd::{
    checksum::isgps_parity,
    context::LeapNotify,
    gnss::GnssId,
    subframe::{self, Body, NavCarry},
};
use proptest::prelude::*;

const SECS_PER_DAY: f64 = 86_400.0;

/// Telemetry and handover words, preamble sent inverted.
fn header(sf: u32, tow17: u32) -> [u32; 10] {
    let mut w = [0u32; 10];
    w[0] = (0x74 << 16) ^ 0x00ff_ffff;
    w[1] = (tow17 & 0x1ffff) << 7 | sf << 2;
    w
}

fn subframe1(wn: u32) -> [u32; 10] {
    // TOW17 90000 s: Sunday, 01:00 in the week
    let mut w = header(1, 90_000 / 6);
    w[2] = (wn % 1024) << 14 | 0x5 << 8 | 0x1;
    w[7] = 0x23 << 16 | 0x0e10;
    w
}

fn page18(leap: i8, wnlsf: u8, dn: u8, lsf: i8) -> [u32; 10] {
    let mut w = header(4, 300);
    w[2] = 56 << 16 | 0x0c << 8 | 0xff;
    w[8] = u32::from(leap as u8) << 16 | u32::from(wnlsf) << 8 | u32::from(dn);
    w[9] = u32::from(lsf as u8) << 16;
    w
}

/// The words as a receiver hands them over: parity appended, data
/// inverted after a word ending in D30 = 1, D29*/D30* in bits 31 and 30.
fn on_air(data: &[u32; 10]) -> [u32; 10] {
    let mut out = [0u32; 10];
    let mut prev = 0u32;
    for (slot, &d) in out.iter_mut().zip(data) {
        let mut w = (d & 0x00ff_ffff) << 6 | (prev & 0x3) << 30;
        w |= u32::from(isgps_parity(w));
        prev = w;
        if w & 0x4000_0000 != 0 {
            w ^= 0x3fff_ffc0;
        }
        *slot = w;
    }
    out
}

#[test]
fn gps_subframe1_week() {
    let mut ctx = context();
    let sf = subframe::decode(&mut ctx, GnssId::Gps, 12, &subframe1(2300)).unwrap();
    assert_eq!(sf.subframe_num, 1);
    assert_eq!(sf.tow17, Some(90_000));
    assert_eq!(sf.wn, Some(2300));
    assert!(matches!(sf.body, Body::Clock(_)));
    assert_eq!(ctx.gps_week, 2300);
    assert!(!ctx.leap_valid());

    subframe::decode(&mut ctx, GnssId::Gps, 12, &page18(18, (2300 % 256) as u8, 7, 18)).unwrap();
    assert!(ctx.leap_valid());
    // a later subframe 1 keeps what page 18 taught
    subframe::decode(&mut ctx, GnssId::Gps, 12, &subframe1(2301)).unwrap();
    assert_eq!(ctx.gps_week, 2301);
    assert!(ctx.leap_valid());
    assert_eq!(ctx.leap_seconds, 18);
}

#[test]
fn gps_subframe4_page18_leap() {
    let mut ctx = context();
    subframe::decode(&mut ctx, GnssId::Gps, 3, &subframe1(2300)).unwrap();
    // Wednesday noon, the change scheduled for the end of Thursday
    ctx.gps_tow = 3.5 * SECS_PER_DAY;
    let wnlsf = (2300 % 256) as u8;
    let sf = subframe::decode(&mut ctx, GnssId::Gps, 3, &page18(18, wnlsf, 5, 19)).unwrap();
    let Body::IonoUtc(iono) = sf.body else { panic!("not page 18") };
    assert_eq!((iono.leap, iono.lsf, iono.dn), (18, 19, 5));
    assert_eq!(ctx.leap_seconds, 18);
    assert_eq!(ctx.leap_notify, LeapNotify::NoWarning);

    // Thursday: the last day before the change
    ctx.gps_tow = 4.5 * SECS_PER_DAY;
    subframe::decode(&mut ctx, GnssId::Gps, 3, &page18(18, wnlsf, 5, 19)).unwrap();
    assert_eq!(ctx.leap_notify, LeapNotify::AddSecond);
    assert_eq!(ctx.leap_seconds, 18);
}

#[test]
fn raw_words_carry_parity() {
    let mut ctx = context();
    let mut carry = NavCarry::default();
    let mut data = subframe1(2300);
    // receivers pass the preamble the right way up once parity is known
    data[0] = 0x74 << 16;
    let raw = on_air(&data);
    let sf = subframe::decode_raw(&mut ctx, &mut carry, 0, 12, &raw).unwrap();
    assert_eq!(sf.gnss, GnssId::Gps);
    assert_eq!(sf.wn, Some(2300));
    assert_eq!(ctx.gps_week, 2300);
}

proptest! {
    #[test]
    fn single_bit_errors_are_caught(word in 1usize..10, bit in 0u32..30) {
        let mut ctx = context();
        let mut carry = NavCarry::default();
        let mut data = subframe1(2300);
        data[0] = 0x74 << 16;
        let mut raw = on_air(&data);
        raw[word] ^= 1 << bit;
        prop_assert!(subframe::decode_raw(&mut ctx, &mut carry, 0, 12, &raw).is_none());
    }
}
