//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use byteorder::{LittleEndian, WriteBytesExt};
use gnssd::{Context, GpsData, Session};

/// 2024-06-01T00:00:00Z, the clock every test context starts from.
pub const START: i64 = 1_717_200_000;

pub fn context() -> Context {
    let mut ctx = Context::new(START);
    ctx.readonly = true;
    ctx
}

/// A session whose published reports end up in the returned vector.
pub fn recording_session() -> (Session, Rc<RefCell<Vec<GpsData>>>) {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let mut session = Session::default();
    let sink = Rc::clone(&reports);
    session.set_publisher(move |data: &GpsData| sink.borrow_mut().push(data.clone()));
    (session, reports)
}

/// 8-bit Fletcher checksum over class, id, length and payload.
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for byte in data {
        ck_a = ck_a.wrapping_add(*byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

/// A complete UBX frame, sync chars to checksum.
pub fn ubx_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut core = Vec::with_capacity(4 + payload.len());
    core.push(class);
    core.push(id);
    core.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
    core.extend_from_slice(payload);
    let (ck_a, ck_b) = ubx_checksum(&core);

    let mut frame = vec![0xb5, 0x62];
    frame.extend_from_slice(&core);
    frame.push(ck_a);
    frame.push(ck_b);
    frame
}

/// `$body*hh\r\n`.
pub fn nmea(body: &str) -> Vec<u8> {
    let xor = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{xor:02X}\r\n").into_bytes()
}

/// DLE-stuffed TSIP frame, `packet` starting with its id.
pub fn tsip_frame(packet: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x10];
    for &b in packet {
        frame.push(b);
        if b == 0x10 {
            frame.push(0x10);
        }
    }
    frame.extend_from_slice(&[0x10, 0x03]);
    frame
}
