//! u-blox UBX binary protocol.
//!
//! Frames arrive here whole and checksummed: `B5 62 class id len(le16)
//! payload ck_a ck_b`. [`parse`] looks the `(class, id)` pair up in
//! [`MESSAGES`], runs the handler over the payload, then does the
//! bookkeeping every UBX packet shares: epoch detection from iTOW,
//! protocol version tracking and one step of the configuration queue.

pub mod cfg;
mod esf;
mod log;
mod misc;
mod mon;
mod nav;
pub mod queue;
mod rxm;

use ::log::{debug, info, trace, warn};
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    bits::BitReader,
    checksum::ubx_fletcher,
    constants::{UBX_FRAME_OVERHEAD, UBX_HEADER_LEN, UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2},
    context::{to_datetime, Context},
    driver::{DriverMode, Event},
    error::{Error, Result},
    mask::Mask,
    session::Session,
};

pub use queue::ConfigStep;

pub const CLASS_NAV: u8 = 0x01;
pub const CLASS_RXM: u8 = 0x02;
pub const CLASS_INF: u8 = 0x04;
pub const CLASS_ACK: u8 = 0x05;
pub const CLASS_CFG: u8 = 0x06;
pub const CLASS_MON: u8 = 0x0a;
pub const CLASS_TIM: u8 = 0x0d;
pub const CLASS_ESF: u8 = 0x10;
pub const CLASS_MGA: u8 = 0x13;
pub const CLASS_LOG: u8 = 0x21;
pub const CLASS_SEC: u8 = 0x27;
pub const CLASS_HNR: u8 = 0x28;
pub const CLASS_NMEA: u8 = 0xf0;

/// `(class, id)` packed big-endian, the way the pair sits on the wire.
pub const fn msgid(class: u8, id: u8) -> u16 {
    (class as u16) << 8 | id as u16
}

/// Message ids this driver knows by name.
pub mod id {
    use super::*;

    pub const ACK_NAK: u16 = msgid(CLASS_ACK, 0x00);
    pub const ACK_ACK: u16 = msgid(CLASS_ACK, 0x01);

    pub const CFG_PRT: u16 = msgid(CLASS_CFG, 0x00);
    pub const CFG_MSG: u16 = msgid(CLASS_CFG, 0x01);
    pub const CFG_RATE: u16 = msgid(CLASS_CFG, 0x08);
    pub const CFG_NAVX5: u16 = msgid(CLASS_CFG, 0x23);
    pub const CFG_NAV5: u16 = msgid(CLASS_CFG, 0x24);
    pub const CFG_ESRC: u16 = msgid(CLASS_CFG, 0x60);
    pub const CFG_DOSC: u16 = msgid(CLASS_CFG, 0x61);
    pub const CFG_VALGET: u16 = msgid(CLASS_CFG, 0x8b);

    pub const ESF_MEAS: u16 = msgid(CLASS_ESF, 0x02);
    pub const ESF_RAW: u16 = msgid(CLASS_ESF, 0x03);
    pub const ESF_STATUS: u16 = msgid(CLASS_ESF, 0x10);
    pub const ESF_ALG: u16 = msgid(CLASS_ESF, 0x14);
    pub const ESF_INS: u16 = msgid(CLASS_ESF, 0x15);

    pub const HNR_PVT: u16 = msgid(CLASS_HNR, 0x00);
    pub const HNR_ATT: u16 = msgid(CLASS_HNR, 0x01);
    pub const HNR_INS: u16 = msgid(CLASS_HNR, 0x02);

    pub const INF_ERROR: u16 = msgid(CLASS_INF, 0x00);
    pub const INF_WARNING: u16 = msgid(CLASS_INF, 0x01);
    pub const INF_NOTICE: u16 = msgid(CLASS_INF, 0x02);
    pub const INF_TEST: u16 = msgid(CLASS_INF, 0x03);
    pub const INF_DEBUG: u16 = msgid(CLASS_INF, 0x04);
    pub const INF_USER: u16 = msgid(CLASS_INF, 0x07);

    pub const LOG_INFO: u16 = msgid(CLASS_LOG, 0x08);
    pub const LOG_RETRIEVEPOS: u16 = msgid(CLASS_LOG, 0x0b);
    pub const LOG_RETRIEVESTRING: u16 = msgid(CLASS_LOG, 0x0d);
    pub const LOG_RETRIEVEPOSEXTRA: u16 = msgid(CLASS_LOG, 0x0f);
    pub const LOG_BATCH: u16 = msgid(CLASS_LOG, 0x11);

    pub const MGA_ACK: u16 = msgid(CLASS_MGA, 0x60);
    pub const MGA_DBD: u16 = msgid(CLASS_MGA, 0x80);

    pub const MON_SCHED: u16 = msgid(CLASS_MON, 0x01);
    pub const MON_IO: u16 = msgid(CLASS_MON, 0x02);
    pub const MON_IPC: u16 = msgid(CLASS_MON, 0x03);
    pub const MON_VER: u16 = msgid(CLASS_MON, 0x04);
    pub const MON_EXCEPT: u16 = msgid(CLASS_MON, 0x05);
    pub const MON_MSGPP: u16 = msgid(CLASS_MON, 0x06);
    pub const MON_TXBUF: u16 = msgid(CLASS_MON, 0x07);
    pub const MON_RXBUF: u16 = msgid(CLASS_MON, 0x08);
    pub const MON_HW: u16 = msgid(CLASS_MON, 0x09);
    pub const MON_USB: u16 = msgid(CLASS_MON, 0x0a);
    pub const MON_HW2: u16 = msgid(CLASS_MON, 0x0b);
    pub const MON_RXR: u16 = msgid(CLASS_MON, 0x21);
    pub const MON_PATCH: u16 = msgid(CLASS_MON, 0x27);
    pub const MON_GNSS: u16 = msgid(CLASS_MON, 0x28);
    pub const MON_SMGR: u16 = msgid(CLASS_MON, 0x2e);
    pub const MON_SPAN: u16 = msgid(CLASS_MON, 0x31);
    pub const MON_BATCH: u16 = msgid(CLASS_MON, 0x32);
    pub const MON_COMMS: u16 = msgid(CLASS_MON, 0x36);
    pub const MON_HW3: u16 = msgid(CLASS_MON, 0x37);
    pub const MON_RF: u16 = msgid(CLASS_MON, 0x38);

    pub const NAV_POSECEF: u16 = msgid(CLASS_NAV, 0x01);
    pub const NAV_POSLLH: u16 = msgid(CLASS_NAV, 0x02);
    pub const NAV_STATUS: u16 = msgid(CLASS_NAV, 0x03);
    pub const NAV_DOP: u16 = msgid(CLASS_NAV, 0x04);
    pub const NAV_ATT: u16 = msgid(CLASS_NAV, 0x05);
    pub const NAV_SOL: u16 = msgid(CLASS_NAV, 0x06);
    pub const NAV_PVT: u16 = msgid(CLASS_NAV, 0x07);
    pub const NAV_ODO: u16 = msgid(CLASS_NAV, 0x09);
    pub const NAV_RESETODO: u16 = msgid(CLASS_NAV, 0x10);
    pub const NAV_VELECEF: u16 = msgid(CLASS_NAV, 0x11);
    pub const NAV_VELNED: u16 = msgid(CLASS_NAV, 0x12);
    pub const NAV_HPPOSECEF: u16 = msgid(CLASS_NAV, 0x13);
    pub const NAV_HPPOSLLH: u16 = msgid(CLASS_NAV, 0x14);
    pub const NAV_PVAT: u16 = msgid(CLASS_NAV, 0x17);
    pub const NAV_TIMEGPS: u16 = msgid(CLASS_NAV, 0x20);
    pub const NAV_TIMEUTC: u16 = msgid(CLASS_NAV, 0x21);
    pub const NAV_CLOCK: u16 = msgid(CLASS_NAV, 0x22);
    pub const NAV_TIMEGLO: u16 = msgid(CLASS_NAV, 0x23);
    pub const NAV_TIMEBDS: u16 = msgid(CLASS_NAV, 0x24);
    pub const NAV_TIMEGAL: u16 = msgid(CLASS_NAV, 0x25);
    pub const NAV_TIMELS: u16 = msgid(CLASS_NAV, 0x26);
    pub const NAV_TIMEQZSS: u16 = msgid(CLASS_NAV, 0x27);
    pub const NAV_SVINFO: u16 = msgid(CLASS_NAV, 0x30);
    pub const NAV_DGPS: u16 = msgid(CLASS_NAV, 0x31);
    pub const NAV_SBAS: u16 = msgid(CLASS_NAV, 0x32);
    pub const NAV_ORB: u16 = msgid(CLASS_NAV, 0x34);
    pub const NAV_SAT: u16 = msgid(CLASS_NAV, 0x35);
    pub const NAV_GEOFENCE: u16 = msgid(CLASS_NAV, 0x39);
    pub const NAV_SVIN: u16 = msgid(CLASS_NAV, 0x3b);
    pub const NAV_RELPOSNED: u16 = msgid(CLASS_NAV, 0x3c);
    pub const NAV_EELL: u16 = msgid(CLASS_NAV, 0x3d);
    pub const NAV_EKFSTATUS: u16 = msgid(CLASS_NAV, 0x40);
    pub const NAV_SIG: u16 = msgid(CLASS_NAV, 0x43);
    pub const NAV_AOPSTATUS: u16 = msgid(CLASS_NAV, 0x60);
    pub const NAV_EOE: u16 = msgid(CLASS_NAV, 0x61);

    pub const RXM_RAW: u16 = msgid(CLASS_RXM, 0x10);
    pub const RXM_SFRB: u16 = msgid(CLASS_RXM, 0x11);
    pub const RXM_SFRBX: u16 = msgid(CLASS_RXM, 0x13);
    pub const RXM_MEASX: u16 = msgid(CLASS_RXM, 0x14);
    pub const RXM_RAWX: u16 = msgid(CLASS_RXM, 0x15);
    pub const RXM_SVSI: u16 = msgid(CLASS_RXM, 0x20);
    pub const RXM_ALM: u16 = msgid(CLASS_RXM, 0x30);
    pub const RXM_EPH: u16 = msgid(CLASS_RXM, 0x31);
    pub const RXM_RTCM: u16 = msgid(CLASS_RXM, 0x32);
    pub const RXM_SPARTN: u16 = msgid(CLASS_RXM, 0x33);
    pub const RXM_COR: u16 = msgid(CLASS_RXM, 0x34);
    pub const RXM_POSREQ: u16 = msgid(CLASS_RXM, 0x40);
    pub const RXM_PMREQ: u16 = msgid(CLASS_RXM, 0x41);
    pub const RXM_RLM: u16 = msgid(CLASS_RXM, 0x59);
    pub const RXM_IMES: u16 = msgid(CLASS_RXM, 0x61);

    pub const SEC_SIGN: u16 = msgid(CLASS_SEC, 0x01);
    pub const SEC_UNIQID: u16 = msgid(CLASS_SEC, 0x03);

    pub const TIM_TP: u16 = msgid(CLASS_TIM, 0x01);
    pub const TIM_TM2: u16 = msgid(CLASS_TIM, 0x03);
    pub const TIM_SVIN: u16 = msgid(CLASS_TIM, 0x04);
    pub const TIM_VRFY: u16 = msgid(CLASS_TIM, 0x06);
    pub const TIM_TM: u16 = msgid(CLASS_TIM, 0x10);
    pub const TIM_DOSC: u16 = msgid(CLASS_TIM, 0x11);
    pub const TIM_TOS: u16 = msgid(CLASS_TIM, 0x12);
    pub const TIM_SMEAS: u16 = msgid(CLASS_TIM, 0x13);
    pub const TIM_VCOCAL: u16 = msgid(CLASS_TIM, 0x15);
    pub const TIM_FCHG: u16 = msgid(CLASS_TIM, 0x16);
    pub const TIM_HOC: u16 = msgid(CLASS_TIM, 0x17);
}

/// Handler for one message: decodes the payload into the session and
/// returns what it changed.
pub(crate) type Handler = fn(&mut Session, &mut Context, &BitReader<'_>) -> Result<Mask>;

/// One row of the dispatch table.
pub struct Message {
    pub id: u16,
    pub name: &'static str,
    /// Receivers that send this speak at least this protocol version.
    pub min_protver: u8,
    /// Shortest payload the handler accepts.
    pub min_len: usize,
    handler: Option<Handler>,
}

impl Message {
    const fn decoded(id: u16, name: &'static str, min_protver: u8, min_len: usize, handler: Handler) -> Self {
        Self {
            id,
            name,
            min_protver,
            min_len,
            handler: Some(handler),
        }
    }

    /// Known, logged, not decoded.
    const fn named(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name,
            min_protver: 0,
            min_len: 0,
            handler: None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.handler.is_some()
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("id", &format_args!("{:#06x}", self.id))
            .field("name", &self.name)
            .field("min_protver", &self.min_protver)
            .finish_non_exhaustive()
    }
}

use id::*;

#[rustfmt::skip]
pub static MESSAGES: &[Message] = &[
    Message::decoded(ACK_ACK, "ACK-ACK", 0, 2, misc::ack),
    Message::decoded(ACK_NAK, "ACK-NAK", 0, 2, misc::ack),

    Message::decoded(CFG_DOSC, "CFG-DOSC", 0, 4, cfg::dosc),
    Message::decoded(CFG_ESRC, "CFG-ESRC", 0, 4, cfg::esrc),
    Message::named(CFG_MSG, "CFG-MSG"),
    Message::named(CFG_NAV5, "CFG-NAV5"),
    Message::named(CFG_NAVX5, "CFG-NAVX5"),
    Message::decoded(CFG_PRT, "CFG-PRT", 0, 1, cfg::prt_readback),
    Message::decoded(CFG_RATE, "CFG-RATE", 0, 6, cfg::rate),
    Message::decoded(CFG_VALGET, "CFG-VALGET", 24, 4, cfg::valget),

    Message::decoded(ESF_ALG, "ESF-ALG", 0, 16, esf::alg),
    Message::decoded(ESF_INS, "ESF-INS", 0, 36, esf::ins),
    Message::decoded(ESF_MEAS, "ESF-MEAS", 0, 8, esf::meas),
    Message::decoded(ESF_RAW, "ESF-RAW", 0, 4, esf::raw),
    Message::decoded(ESF_STATUS, "ESF-STATUS", 0, 16, esf::status),

    Message::decoded(HNR_ATT, "HNR-ATT", 19, 32, misc::hnr_att),
    Message::decoded(HNR_INS, "HNR-INS", 19, 36, misc::hnr_ins),
    Message::decoded(HNR_PVT, "HNR-PVT", 19, 72, misc::hnr_pvt),

    Message::decoded(INF_DEBUG, "INF-DEBUG", 13, 0, misc::inf_debug),
    Message::decoded(INF_ERROR, "INF-ERROR", 13, 0, misc::inf_error),
    Message::decoded(INF_NOTICE, "INF-NOTICE", 13, 0, misc::inf_notice),
    Message::decoded(INF_TEST, "INF-TEST", 13, 0, misc::inf_debug),
    Message::decoded(INF_USER, "INF-USER", 13, 0, misc::inf_debug),
    Message::decoded(INF_WARNING, "INF-WARNING", 13, 0, misc::inf_warning),

    Message::decoded(LOG_BATCH, "LOG-BATCH", 0, 100, log::batch),
    Message::decoded(LOG_INFO, "LOG-INFO", 0, 48, log::info),
    Message::decoded(LOG_RETRIEVEPOS, "LOG-RETRIEVEPOS", 0, 40, log::retrievepos),
    Message::decoded(LOG_RETRIEVEPOSEXTRA, "LOG-RETRIEVEPOSEXTRA", 0, 32, log::retrieveposextra),
    Message::decoded(LOG_RETRIEVESTRING, "LOG-RETRIEVESTRING", 0, 16, log::retrievestring),

    Message::named(MGA_ACK, "MGA-ACK"),
    Message::named(MGA_DBD, "MGA-DBD"),

    Message::named(MON_BATCH, "MON-BATCH"),
    Message::decoded(MON_COMMS, "MON-COMMS", 0, 8, mon::comms),
    Message::named(MON_EXCEPT, "MON-EXCEPT"),
    Message::named(MON_GNSS, "MON-GNSS"),
    Message::decoded(MON_HW, "MON-HW", 12, 60, mon::hw),
    Message::named(MON_HW2, "MON-HW2"),
    Message::named(MON_HW3, "MON-HW3"),
    Message::named(MON_IO, "MON-IO"),
    Message::named(MON_IPC, "MON-IPC"),
    Message::named(MON_MSGPP, "MON-MSGPP"),
    Message::named(MON_PATCH, "MON-PATCH"),
    Message::decoded(MON_RF, "MON-RF", 0, 4, mon::rf),
    Message::decoded(MON_RXBUF, "MON-RXBUF", 0, 24, mon::rxbuf),
    Message::named(MON_RXR, "MON-RXR"),
    Message::named(MON_SCHED, "MON-SCHED"),
    Message::named(MON_SMGR, "MON-SMGR"),
    Message::named(MON_SPAN, "MON-SPAN"),
    Message::decoded(MON_TXBUF, "MON-TXBUF", 0, 28, mon::txbuf),
    Message::named(MON_USB, "MON-USB"),
    Message::decoded(MON_VER, "MON-VER", 0, 40, mon::ver),

    Message::named(NAV_AOPSTATUS, "NAV-AOPSTATUS"),
    Message::named(NAV_ATT, "NAV-ATT"),
    Message::decoded(NAV_CLOCK, "NAV-CLOCK", 0, 20, nav::clock),
    Message::decoded(NAV_DGPS, "NAV-DGPS", 0, 16, nav::dgps),
    Message::decoded(NAV_DOP, "NAV-DOP", 0, 18, nav::dop),
    Message::decoded(NAV_EELL, "NAV-EELL", 18, 16, nav::eell),
    Message::named(NAV_EKFSTATUS, "NAV-EKFSTATUS"),
    Message::decoded(NAV_EOE, "NAV-EOE", 18, 4, nav::eoe),
    Message::named(NAV_GEOFENCE, "NAV-GEOFENCE"),
    Message::decoded(NAV_HPPOSECEF, "NAV-HPPOSECEF", 0, 28, nav::hpposecef),
    Message::decoded(NAV_HPPOSLLH, "NAV-HPPOSLLH", 0, 36, nav::hpposllh),
    Message::named(NAV_ODO, "NAV-ODO"),
    Message::named(NAV_ORB, "NAV-ORB"),
    Message::decoded(NAV_POSECEF, "NAV-POSECEF", 0, 20, nav::posecef),
    Message::decoded(NAV_POSLLH, "NAV-POSLLH", 0, 28, nav::posllh),
    Message::decoded(NAV_PVAT, "NAV-PVAT", 30, 116, nav::pvat),
    Message::decoded(NAV_PVT, "NAV-PVT", 14, 84, nav::pvt),
    Message::decoded(NAV_RELPOSNED, "NAV-RELPOSNED", 20, 40, nav::relposned),
    Message::named(NAV_RESETODO, "NAV-RESETODO"),
    Message::decoded(NAV_SAT, "NAV-SAT", 15, 8, nav::sat),
    Message::decoded(NAV_SBAS, "NAV-SBAS", 0, 12, nav::sbas),
    Message::decoded(NAV_SIG, "NAV-SIG", 27, 8, nav::sig),
    Message::decoded(NAV_SOL, "NAV-SOL", 0, 52, nav::sol),
    Message::decoded(NAV_STATUS, "NAV-STATUS", 0, 16, nav::status),
    Message::decoded(NAV_SVIN, "NAV-SVIN", 0, 40, nav::svin),
    Message::decoded(NAV_SVINFO, "NAV-SVINFO", 0, 8, nav::svinfo),
    Message::named(NAV_TIMEBDS, "NAV-TIMEBDS"),
    Message::named(NAV_TIMEGAL, "NAV-TIMEGAL"),
    Message::named(NAV_TIMEGLO, "NAV-TIMEGLO"),
    Message::decoded(NAV_TIMEGPS, "NAV-TIMEGPS", 0, 16, nav::timegps),
    Message::decoded(NAV_TIMELS, "NAV-TIMELS", 0, 24, nav::timels),
    Message::named(NAV_TIMEQZSS, "NAV-TIMEQZSS"),
    Message::decoded(NAV_TIMEUTC, "NAV-TIMEUTC", 0, 20, nav::timeutc),
    Message::decoded(NAV_VELECEF, "NAV-VELECEF", 0, 20, nav::velecef),
    Message::decoded(NAV_VELNED, "NAV-VELNED", 0, 36, nav::velned),

    Message::named(RXM_ALM, "RXM-ALM"),
    Message::decoded(RXM_COR, "RXM-COR", 27, 12, rxm::cor),
    Message::named(RXM_EPH, "RXM-EPH"),
    Message::named(RXM_IMES, "RXM-IMES"),
    Message::named(RXM_MEASX, "RXM-MEASX"),
    Message::named(RXM_PMREQ, "RXM-PMREQ"),
    Message::named(RXM_POSREQ, "RXM-POSREQ"),
    Message::named(RXM_RAW, "RXM-RAW"),
    Message::decoded(RXM_RAWX, "RXM-RAWX", 0, 16, rxm::rawx),
    Message::named(RXM_RLM, "RXM-RLM"),
    Message::named(RXM_RTCM, "RXM-RTCM"),
    Message::decoded(RXM_SFRB, "RXM-SFRB", 0, 42, rxm::sfrb),
    Message::decoded(RXM_SFRBX, "RXM-SFRBX", 17, 8, rxm::sfrbx),
    Message::decoded(RXM_SPARTN, "RXM-SPARTN", 27, 8, rxm::spartn),
    Message::decoded(RXM_SVSI, "RXM-SVSI", 0, 8, rxm::svsi),

    Message::named(SEC_SIGN, "SEC-SIGN"),
    Message::decoded(SEC_UNIQID, "SEC-UNIQID", 0, 9, misc::uniqid),

    Message::named(TIM_DOSC, "TIM-DOSC"),
    Message::named(TIM_FCHG, "TIM-FCHG"),
    Message::named(TIM_HOC, "TIM-HOC"),
    Message::named(TIM_SMEAS, "TIM-SMEAS"),
    Message::decoded(TIM_SVIN, "TIM-SVIN", 0, 28, misc::tim_svin),
    Message::named(TIM_TM, "TIM-TM"),
    Message::named(TIM_TM2, "TIM-TM2"),
    Message::named(TIM_TOS, "TIM-TOS"),
    Message::decoded(TIM_TP, "TIM-TP", 0, 16, misc::tim_tp),
    Message::named(TIM_VCOCAL, "TIM-VCOCAL"),
    Message::named(TIM_VRFY, "TIM-VRFY"),
];

/// Dispatch table row for `msgid`.
pub fn message(msgid: u16) -> Option<&'static Message> {
    MESSAGES.iter().find(|m| m.id == msgid)
}

/// Epoch tracking and protocol state of one u-blox receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxState {
    /// iTOW of the packet being decoded, ms. `-1` when it carries none.
    pub itow: i64,
    /// iTOW of the epoch in progress.
    pub last_itow: i64,
    /// Message last seen in an epoch; its arrival ends the epoch.
    pub end_msgid: u16,
    pub last_msgid: u16,
    /// Protocol version, `0` until known.
    pub protver: u8,
    pub last_protver: u8,
    /// Receiver port we are attached to, `0` until known.
    pub port_id: u8,
    /// PRN of the SBAS satellite in use, `0` for none.
    pub sbas_in_use: i16,
    unknown: Vec<u16>,
}

impl Default for UbxState {
    fn default() -> Self {
        Self {
            itow: -1,
            last_itow: 0,
            end_msgid: 0,
            last_msgid: 0,
            protver: 0,
            last_protver: 0,
            port_id: 0,
            sbas_in_use: 0,
            unknown: Vec::new(),
        }
    }
}

/// Frame a UBX message: sync, header, payload and Fletcher checksum.
pub fn frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + UBX_FRAME_OVERHEAD);
    out.extend_from_slice(&[UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2, class, id]);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let (ck_a, ck_b) = ubx_fletcher(&out[2..]);
    out.extend_from_slice(&[ck_a, ck_b]);
    out
}

/// Queue one UBX message for the device.
pub(crate) fn write(session: &mut Session, ctx: &Context, class: u8, id: u8, payload: &[u8]) -> bool {
    trace!("UBX: sending {class:02x}/{id:02x} len {}", payload.len());
    session.send(ctx, frame(class, id, payload))
}

/// Ask for MON-VER.
pub(crate) fn poll_version(session: &mut Session, ctx: &Context) {
    write(session, ctx, CLASS_MON, 0x04, &[]);
}

/// Fail with [`Error::ShortBuffer`] unless `buf` holds `min` bytes.
pub(crate) fn need(buf: &BitReader<'_>, min: usize) -> Result<()> {
    if buf.len() < min {
        return Err(Error::ShortBuffer {
            offset: 0,
            width: min,
            len: buf.len(),
        });
    }
    Ok(())
}

/// Record the iTOW at `offset` as the time tag of this packet.
pub(crate) fn set_itow(session: &mut Session, buf: &BitReader<'_>, offset: usize) -> Result<u32> {
    let itow = buf.le_u32(offset)?;
    session.ubx().itow = i64::from(itow);
    Ok(itow)
}

/// The packed UTC date most NAV messages carry at `offset`: year (le16),
/// month, day, hour, minute, second. `nano` may be negative.
pub(crate) fn utc_date(buf: &BitReader<'_>, offset: usize, nano: i32) -> Result<Option<DateTime<Utc>>> {
    let year = buf.le_u16(offset)?;
    let [month, day, hour, min, sec] = [
        buf.u8(offset + 2)?,
        buf.u8(offset + 3)?,
        buf.u8(offset + 4)?,
        buf.u8(offset + 5)?,
        buf.u8(offset + 6)?,
    ];
    let Some(midnight) = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return Ok(None);
    };
    let secs = midnight.and_utc().timestamp()
        + i64::from(hour) * 3600
        + i64::from(min) * 60
        + i64::from(sec);
    Ok(to_datetime(secs, f64::from(nano) * 1e-9))
}

/// Decode one complete UBX frame.
pub fn parse(session: &mut Session, ctx: &mut Context, frame: &[u8]) -> Mask {
    if frame.len() < UBX_HEADER_LEN {
        return Mask::empty();
    }
    session.ubx().itow = -1;

    let msgid = u16::from_be_bytes([frame[2], frame[3]]);
    let data_len = usize::from(u16::from_le_bytes([frame[4], frame[5]]));
    let Some(payload) = frame.get(UBX_HEADER_LEN..UBX_HEADER_LEN + data_len) else {
        warn!("UBX: {msgid:04x} claims {data_len} bytes, frame has {}", frame.len());
        return Mask::empty();
    };
    let buf = BitReader::new(payload);

    let mut min_protver = 0;
    let mut mask = match message(msgid) {
        Some(msg) => {
            min_protver = msg.min_protver;
            decode(session, ctx, msg, &buf)
        },
        None => {
            let state = session.ubx();
            if !state.unknown.contains(&msgid) {
                state.unknown.push(msgid);
                warn!("UBX: unknown packet id {msgid:#06x} (length {})", frame.len());
            }
            Mask::empty()
        },
    };

    mask |= track_epoch(session.ubx(), msgid);
    track_protver(session, ctx, min_protver);
    // without an end-of-epoch message the learned ender may be wrong
    session.cycle_end_reliable = session.ubx().protver >= 15;
    queue::run(session, ctx);

    mask | Mask::ONLINE
}

fn decode(session: &mut Session, ctx: &mut Context, msg: &Message, buf: &BitReader<'_>) -> Mask {
    let Some(handler) = msg.handler else {
        debug!("UBX: {}", msg.name);
        return Mask::empty();
    };
    let result = need(buf, msg.min_len).and_then(|()| handler(session, ctx, buf));
    match result {
        Ok(mask) => mask,
        Err(Error::ShortBuffer { width, len, .. }) => {
            warn!("UBX: {}: runt payload len {len}, need {width}", msg.name);
            session.ubx().itow = -1;
            Mask::empty()
        },
        Err(e) => {
            warn!("UBX: {}: {e}", msg.name);
            Mask::empty()
        },
    }
}

/// The epoch bookkeeping. A jump of more than 10 ms in iTOW opens a new
/// epoch and promotes the previous epoch's last message to ender.
fn track_epoch(state: &mut UbxState, msgid: u16) -> Mask {
    if state.itow < 0 {
        return Mask::empty();
    }
    let mut mask = Mask::empty();
    if state.end_msgid == msgid {
        trace!("UBX: {msgid:04x} ends epoch {}", state.itow);
        mask |= Mask::REPORT_IS;
    }
    if (state.last_itow - state.itow).abs() > 10 {
        if state.end_msgid != state.last_msgid {
            debug!(
                "UBX: new ender {:04x}, was {:04x}",
                state.last_msgid, state.end_msgid
            );
            state.end_msgid = state.last_msgid;
        }
        state.last_itow = state.itow;
        mask |= Mask::CLEAR_IS;
    }
    state.last_msgid = msgid;
    mask
}

fn track_protver(session: &mut Session, ctx: &Context, min_protver: u8) {
    let state = session.ubx();
    if min_protver > state.protver {
        state.protver = min_protver;
    }
    if state.last_protver == state.protver {
        return;
    }
    info!("UBX: new PROTVER {} was {}", state.protver, state.last_protver);
    state.last_protver = state.protver;
    if optimizing(session) && !ctx.passive {
        cfg::mode(session, ctx, DriverMode::Binary);
    }
    session.queue = 0;
}

/// The session asked for binary output.
pub(crate) fn optimizing(session: &Session) -> bool {
    session.options.mode == Some(DriverMode::Binary)
}

/// Send a raw UBX message: `msg[0]` is the class, `msg[1]` the id and the
/// rest the payload.
pub fn control_send(session: &mut Session, ctx: &Context, msg: &[u8]) -> Result<usize> {
    let [class, id, payload @ ..] = msg else {
        return Err(Error::Device(format!("UBX control message too short: {} bytes", msg.len())));
    };
    if payload.len() > usize::from(u16::MAX) {
        return Err(Error::Device(format!("UBX payload too long: {}", payload.len())));
    }
    if !write(session, ctx, *class, *id, payload) {
        return Err(Error::Device("device is read-only".into()));
    }
    Ok(payload.len() + UBX_FRAME_OVERHEAD)
}

pub fn init_query(session: &mut Session, ctx: &Context) {
    poll_version(session, ctx);
}

pub fn event_hook(session: &mut Session, ctx: &mut Context, event: Event) {
    if ctx.readonly {
        return;
    }
    match event {
        Event::Identified => {
            debug!("UBX: identified");
            // a requested mode is applied by the session right after this
            if ctx.passive || session.options.mode.is_none() {
                poll_version(session, ctx);
            }
        },
        Event::Deactivate => debug!("UBX: deactivate"),
        _ => {},
    }
}
