//! CFG class: readbacks from the receiver and the configuration we send.

use std::time::Duration;

use ::log::{debug, info, warn};

use super::{poll_version, write, CLASS_CFG, CLASS_NAV, CLASS_NMEA};
use crate::{
    bits::BitReader,
    context::Context,
    driver::{DriverMode, Parity},
    error::Result,
    lexer::PacketType,
    mask::Mask,
    session::Session,
};

/// Port ids of CFG-PRT.
pub const USART1_ID: u8 = 1;
pub const USB_ID: u8 = 3;

/// Protocol mask bits of CFG-PRT.
pub const PROTO_UBX: u16 = 0x01;
pub const PROTO_NMEA: u16 = 0x02;
pub const PROTO_RTCM: u16 = 0x04;
pub const PROTO_RTCM3: u16 = 0x20;

/// NMEA sentences turned on when switching to NMEA output.
const NMEA_ON: [u8; 8] = [
    0x00, // GGA
    0x02, // GSA
    0x03, // GSV
    0x04, // RMC
    0x05, // VTG
    0x07, // GST
    0x08, // ZDA
    0x09, // GBS
];

/// UBX-NAV messages turned off when switching to NMEA output. NAV-TIMELS
/// stays on at its low rate.
const NAV_OFF: [u8; 11] = [
    0x01, // POSECEF
    0x04, // DOP
    0x06, // SOL
    0x07, // PVT
    0x11, // VELECEF
    0x20, // TIMEGPS
    0x30, // SVINFO
    0x32, // SBAS
    0x35, // SAT
    0x43, // SIG
    0x61, // EOE
];

/// Set the output rate of one message on the current port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgMsg {
    pub msg_class: u8,
    pub msg_id: u8,
    pub rate: u8,
}

impl CfgMsg {
    pub const fn set_rate_for(msg_class: u8, msg_id: u8, rate: u8) -> Self {
        Self {
            msg_class,
            msg_id,
            rate,
        }
    }

    pub const fn payload(self) -> [u8; 3] {
        [self.msg_class, self.msg_id, self.rate]
    }
}

/// Measurement and navigation rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgRate {
    pub meas_rate_ms: u16,
    pub nav_rate: u16,
    /// `0` UTC, `1` GPS time.
    pub time_ref: u16,
}

impl CfgRate {
    pub fn payload(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..2].copy_from_slice(&self.meas_rate_ms.to_le_bytes());
        out[2..4].copy_from_slice(&self.nav_rate.to_le_bytes());
        out[4..6].copy_from_slice(&self.time_ref.to_le_bytes());
        out
    }
}

/// Port configuration, the 20-byte UART form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgPrt {
    pub port_id: u8,
    pub mode: u32,
    pub baud_rate: u32,
    pub in_proto_mask: u16,
    pub out_proto_mask: u16,
}

impl CfgPrt {
    /// USART mode word for the line settings: 8 data bits plus parity and
    /// stop bits.
    pub fn usart_mode(parity: Parity, stopbits: u8) -> u32 {
        let mut mode = (1 << 4) | (1 << 7);
        mode |= match parity {
            Parity::Even => 1 << 7,
            Parity::Odd => (1 << 9) | (1 << 7),
            Parity::None => (1 << 11) | (3 << 6),
        };
        if stopbits == 2 {
            mode |= 1 << 13;
        }
        mode
    }

    pub fn payload(self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[0] = self.port_id;
        out[4..8].copy_from_slice(&self.mode.to_le_bytes());
        out[8..12].copy_from_slice(&self.baud_rate.to_le_bytes());
        out[12..14].copy_from_slice(&self.in_proto_mask.to_le_bytes());
        out[14..16].copy_from_slice(&self.out_proto_mask.to_le_bytes());
        out
    }
}

pub(crate) fn send_msg_rate(session: &mut Session, ctx: &Context, msg: CfgMsg) -> bool {
    write(session, ctx, CLASS_CFG, 0x01, &msg.payload())
}

/// Write the port configuration, then shape the message mix for `mode`.
pub(crate) fn prt(session: &mut Session, ctx: &Context, speed: u32, parity: Parity, stopbits: u8, mode: DriverMode) {
    let usb = session.options.path.contains("/ttyACM");
    let state = session.ubx();
    if state.port_id == 0 {
        state.port_id = if usb {
            USB_ID
        } else {
            USART1_ID
        };
    }
    let port_id = session.ubx().port_id;

    let out_proto_mask = match mode {
        DriverMode::Nmea => PROTO_NMEA,
        DriverMode::Binary => PROTO_UBX,
    };
    let cfg = CfgPrt {
        port_id,
        mode: CfgPrt::usart_mode(parity, stopbits),
        baud_rate: speed,
        in_proto_mask: PROTO_NMEA | PROTO_UBX | PROTO_RTCM | PROTO_RTCM3,
        out_proto_mask: out_proto_mask | PROTO_RTCM3,
    };
    info!("UBX: CFG-PRT port {port_id} {speed} {}{stopbits} {mode:?}", parity.as_char());
    write(session, ctx, CLASS_CFG, 0x00, &cfg.payload());

    match mode {
        DriverMode::Nmea => {
            // NMEA first, so the receiver is never silent
            for id in NMEA_ON {
                send_msg_rate(session, ctx, CfgMsg::set_rate_for(CLASS_NMEA, id, 1));
            }
            for id in NAV_OFF {
                send_msg_rate(session, ctx, CfgMsg::set_rate_for(CLASS_NAV, id, 0));
            }
            session.queue = super::queue::QUEUE_END;
        },
        DriverMode::Binary => {
            // the version decides which NAV set the queue enables
            poll_version(session, ctx);
            session.queue = 1;
        },
    }
    session.driver_mode = mode;
}

fn line_speed(session: &Session, ctx: &Context) -> u32 {
    match session.options.speed {
        0 => ctx.fixed_port_speed.unwrap_or(9600),
        speed => speed,
    }
}

/// Switch output mode at the current line speed.
pub(crate) fn mode(session: &mut Session, ctx: &Context, mode: DriverMode) {
    let speed = line_speed(session, ctx);
    let (parity, stopbits) = (session.options.parity, session.options.stopbits.max(1));
    prt(session, ctx, speed, parity, stopbits, mode);
}

pub fn mode_switch(session: &mut Session, ctx: &Context, mode: DriverMode) {
    self::mode(session, ctx, mode);
}

pub fn speed_switch(session: &mut Session, ctx: &Context, speed: u32, parity: Parity, stopbits: u8) -> bool {
    let mode = if session.lexer.kind() == PacketType::Ubx {
        DriverMode::Binary
    } else {
        DriverMode::Nmea
    };
    prt(session, ctx, speed, parity, stopbits, mode);
    session.options.speed = speed;
    session.options.parity = parity;
    session.options.stopbits = stopbits;
    true
}

/// Request a measurement period of `1 / hz` seconds, clamped to what the
/// receiver supports.
pub fn rate_switch(session: &mut Session, ctx: &Context, hz: f64) -> bool {
    if !(hz.is_finite() && hz > 0.0) {
        warn!("UBX: CFG-RATE: bad rate {hz} Hz");
        return false;
    }
    let min_ms = session.mincycle.as_millis() as f64;
    let meas = (1000.0 / hz).clamp(min_ms, f64::from(u16::MAX));
    let cfg = CfgRate {
        meas_rate_ms: meas as u16,
        nav_rate: 1,
        time_ref: 0,
    };
    debug!("UBX: CFG-RATE {} ms", cfg.meas_rate_ms);
    write(session, ctx, CLASS_CFG, 0x08, &cfg.payload())
}

pub(super) fn ack_counts(buf: &BitReader<'_>, name: &str) -> Result<Option<(u8, u8)>> {
    let version = buf.u8(0)?;
    let count = buf.u8(1)?;
    if version != 0 || count > 2 {
        warn!("UBX: {name}: unsupported version {version} count {count}");
        return Ok(None);
    }
    Ok(Some((version, count)))
}

pub(super) fn dosc(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if let Some((_, count)) = ack_counts(buf, "CFG-DOSC")? {
        debug!("UBX: CFG-DOSC {count} oscillators");
    }
    Ok(Mask::empty())
}

pub(super) fn esrc(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if let Some((_, count)) = ack_counts(buf, "CFG-ESRC")? {
        debug!("UBX: CFG-ESRC {count} sources");
    }
    Ok(Mask::empty())
}

/// The port we talk through, as the receiver reports it.
pub(super) fn prt_readback(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let port_id = buf.u8(0)?;
    let state = session.ubx();
    if state.port_id != port_id {
        info!("UBX: CFG-PRT port id {} -> {port_id}", state.port_id);
        state.port_id = port_id;
    }
    Ok(Mask::empty())
}

pub(super) fn rate(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let meas_rate = buf.le_u16(0)?;
    let nav_rate = buf.le_u16(2)?;
    let time_ref = buf.le_u16(4)?;
    debug!("UBX: CFG-RATE measRate {meas_rate} navRate {nav_rate} timeRef {time_ref}");
    let ms = u64::from(meas_rate).max(session.mincycle.as_millis() as u64);
    session.cycle = Duration::from_millis(ms);
    Ok(Mask::empty())
}

pub(super) fn valget(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    let layer = buf.u8(1)?;
    if version != 1 {
        warn!("UBX: CFG-VALGET unknown version {version}");
        return Ok(Mask::empty());
    }
    debug!("UBX: CFG-VALGET layer {layer}, {} bytes of items", buf.len() - 4);
    Ok(Mask::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::{id, tests::*};

    #[test]
    fn usart_mode_8n1() {
        assert_eq!(CfgPrt::usart_mode(Parity::None, 1), 0x08d0);
        assert_eq!(CfgPrt::usart_mode(Parity::Even, 1), 0x0090);
        assert_eq!(CfgPrt::usart_mode(Parity::Odd, 2), 0x2290);
    }

    #[test]
    fn binary_mode_sends_prt_and_starts_queue() {
        let (mut session, ctx) = ubx_session();
        session.drain_outbox().for_each(drop);
        session.options.path = "/dev/ttyACM0".into();
        session.mode_switch(&ctx, DriverMode::Binary).unwrap();
        let sent: Vec<_> = session.drain_outbox().collect();
        let prt = &sent[0];
        assert_eq!(prt[2..6], [0x06, 0x00, 20, 0]);
        assert_eq!(prt[6], USB_ID);
        assert_eq!(u32::from_le_bytes(prt[14..18].try_into().unwrap()), 9600);
        assert_eq!(u16::from_le_bytes([prt[20], prt[21]]), PROTO_UBX | PROTO_RTCM3);
        assert_eq!(sent[1][2..4], [0x0a, 0x04]);
        assert_eq!(session.queue, 1);
    }

    #[test]
    fn nmea_mode_enables_sentences_then_disables_nav() {
        let (mut session, ctx) = ubx_session();
        session.drain_outbox().for_each(drop);
        session.mode_switch(&ctx, DriverMode::Nmea).unwrap();
        let sent: Vec<_> = session.drain_outbox().collect();
        assert_eq!(sent.len(), 1 + NMEA_ON.len() + NAV_OFF.len());
        assert_eq!(sent[1][6..9], [0xf0, 0x00, 1]);
        assert_eq!(sent.last().unwrap()[6..9], [0x01, 0x61, 0]);
        assert_eq!(session.queue, crate::ubx::queue::QUEUE_END);
    }

    #[test]
    fn rate_is_clamped() {
        let (mut session, ctx) = ubx_session();
        session.drain_outbox().for_each(drop);
        assert!(session.rate_switch(&ctx, 1000.0).unwrap());
        assert!(session.rate_switch(&ctx, 0.001).unwrap());
        let sent: Vec<_> = session.drain_outbox().collect();
        assert_eq!(u16::from_le_bytes([sent[0][6], sent[0][7]]), 25);
        assert_eq!(u16::from_le_bytes([sent[1][6], sent[1][7]]), u16::MAX);
    }

    #[test]
    fn unusable_rate_sends_nothing() {
        let (mut session, ctx) = ubx_session();
        session.drain_outbox().for_each(drop);
        for hz in [f64::NAN, f64::INFINITY, 0.0, -5.0] {
            assert!(!rate_switch(&mut session, &ctx, hz), "{hz}");
            assert!(!session.rate_switch(&ctx, hz).unwrap(), "{hz}");
        }
        assert_eq!(session.outbox_len(), 0);
    }

    #[test]
    fn speed_switch_remembers_line() {
        let (mut session, ctx) = ubx_session();
        assert!(session.speed_switch(&ctx, 115_200, Parity::None, 1).unwrap());
        assert_eq!(session.options.speed, 115_200);
    }

    #[test]
    fn rate_readback_sets_cycle() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        run(&mut session, &mut ctx, id::CFG_RATE, &[0xc8, 0x00, 1, 0, 1, 0]);
        assert_eq!(session.cycle, Duration::from_millis(200));
        run(&mut session, &mut ctx, id::CFG_RATE, &[0, 0, 1, 0, 1, 0]);
        assert_eq!(session.cycle, Duration::from_millis(25));
    }

    #[test]
    fn prt_readback_records_port() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        run(&mut session, &mut ctx, id::CFG_PRT, &[3; 20]);
        assert_eq!(session.ubx().port_id, 3);
    }
}
