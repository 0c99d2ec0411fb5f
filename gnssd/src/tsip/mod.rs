//! Trimble TSIP, legacy and v1.
//!
//! A frame reaches [`parse`] still stuffed: `DLE id payload DLE ETX` with
//! every literal `DLE` in the payload doubled. Legacy packets are looked up
//! by id in [`MESSAGES`]. The ids TSIP v1 claimed for itself carry their own
//! length and checksum inside the stuffed body and go to [`v1`].
//!
//! TSIP receivers only report some things when asked. After every packet
//! [`parse`] checks a handful of timers and re-requests time, fix mode,
//! tracking status and health when they go stale.

pub mod config;
mod legacy;
pub mod v1;

use ::log::{debug, trace, warn};

use crate::{
    bits::BitReader,
    constants::{DLE, ETX, TSIP_MAX_PACKET},
    context::Context,
    driver::Event,
    error::{Error, Result},
    mask::Mask,
    session::Session,
};

pub use config::Model;

/// I/O options, byte 1 of packet 0x35: position.
pub const IO1_ECEF: u8 = 0x01;
pub const IO1_LLA: u8 = 0x02;
pub const IO1_MSL: u8 = 0x04;
pub const IO1_DP: u8 = 0x10;
pub const IO1_8F20: u8 = 0x20;
/// I/O options, byte 2: velocity.
pub const IO2_VECEF: u8 = 0x01;
pub const IO2_ENU: u8 = 0x02;
/// I/O options, byte 3: timing.
pub const IO3_UTC: u8 = 0x01;
/// I/O options, byte 4: auxiliary.
pub const IO4_RAW: u8 = 0x01;
pub const IO4_DBHZ: u8 = 0x08;

/// Channels a TSIP receiver reports tracking status for.
pub const TSIP_CHANNELS: usize = 64;

/// Seconds before an unanswered report is asked for again.
const REQUEST_INTERVAL: f64 = 5.0;
/// The GPS system message changes rarely.
const SYSTEM_MESSAGE_INTERVAL: f64 = 60.0;

/// Decoder scratch of one TSIP receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsipState {
    /// From 0x1C-83 or x90-01, `0` until known.
    pub hardware_code: u16,
    pub model: Model,
    pub machine_id: u8,
    /// Superpacket support reported by 0x4B.
    pub superpkt: u8,
    /// Altitudes in 0x4A and 0x84 are MSL rather than HAE.
    pub alt_is_msl: bool,
    /// Time of the last fix, seconds into the week.
    pub last_tow: Option<f64>,
    /// Session clock when each report was last seen or requested.
    pub last_41: f64,
    pub last_46: f64,
    pub last_48: f64,
    pub last_5c: f64,
    pub last_6d: f64,
    /// When a Compact Super Packet was requested, `0` when none is pending.
    pub req_compact: f64,
    /// Channel or message number of the last satellite report.
    pub last_chan_seen: usize,
    /// TOW of the last x A2-00 and x A3-11, seconds.
    pub last_a200: u32,
    pub last_a311: u32,
    /// PRNs in the current solution, from 0x6C or 0x6D.
    pub sats_used: Vec<i16>,
}

/// Handler for one legacy packet: decodes the un-stuffed payload (id
/// removed) into the session and returns what it changed.
pub(crate) type Handler = fn(&mut Session, &mut Context, &BitReader<'_>) -> Result<Mask>;

/// One row of the legacy dispatch table.
pub struct Message {
    pub id: u8,
    pub name: &'static str,
    /// Shortest payload the handler accepts.
    pub min_len: usize,
    handler: Handler,
}

impl Message {
    const fn new(id: u8, name: &'static str, min_len: usize, handler: Handler) -> Self {
        Self {
            id,
            name,
            min_len,
            handler,
        }
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("id", &format_args!("{:#04x}", self.id))
            .field("name", &self.name)
            .field("min_len", &self.min_len)
            .finish_non_exhaustive()
    }
}

#[rustfmt::skip]
pub static MESSAGES: &[Message] = &[
    Message::new(0x13, "Unparsable Packet", 1, legacy::unparsable),
    Message::new(0x1c, "Version Information", 1, legacy::version),
    Message::new(0x41, "GPS Time", 10, legacy::gps_time),
    Message::new(0x42, "Position XYZ", 16, legacy::ecef_position),
    Message::new(0x43, "Velocity XYZ", 20, legacy::ecef_velocity),
    Message::new(0x45, "Software Version", 10, legacy::software_version),
    Message::new(0x46, "Health of Receiver", 2, legacy::health),
    Message::new(0x47, "Signal Levels", 1, legacy::signal_levels),
    Message::new(0x48, "GPS System Message", 0, legacy::system_message),
    Message::new(0x4a, "Position LLA", 20, legacy::lla_position),
    Message::new(0x4b, "Machine Code/Status", 3, legacy::machine_status),
    Message::new(0x4c, "Operating Parameters", 17, legacy::operating_parameters),
    Message::new(0x54, "Bias and Bias Rate", 12, legacy::bias),
    Message::new(0x55, "I/O Options", 4, legacy::io_options),
    Message::new(0x56, "Velocity ENU", 20, legacy::enu_velocity),
    Message::new(0x57, "Last Computed Fix", 8, legacy::last_fix),
    Message::new(0x5a, "Raw Measurement", 25, legacy::raw_measurement),
    Message::new(0x5c, "Satellite Tracking Status", 24, legacy::tracking_status),
    Message::new(0x5d, "Satellite Tracking Status (GNSS)", 26, legacy::tracking_status_gnss),
    Message::new(0x6c, "All-in-View Satellite Selection", 18, legacy::all_in_view),
    Message::new(0x6d, "All-in-View Satellite Selection (old)", 1, legacy::all_in_view_old),
    Message::new(0x82, "DGPS Mode", 1, legacy::dgps_mode),
    Message::new(0x83, "Double Position XYZ", 36, legacy::ecef_position_double),
    Message::new(0x84, "Double Position LLA", 36, legacy::lla_position_double),
    Message::new(0x8f, "Super Packet", 1, legacy::super_packet),
    Message::new(0xbb, "Receiver Configuration", 40, legacy::receiver_configuration),
];

/// Dispatch table row for legacy `id`.
pub fn message(id: u8) -> Option<&'static Message> {
    MESSAGES.iter().find(|m| m.id == id)
}

/// Strip leader and trailer from a stuffed frame and collapse doubled
/// `DLE`s. Returns `None` when the frame is not `DLE … DLE ETX` or holds a
/// lone `DLE`.
pub fn unstuff(frame: &[u8]) -> Option<Vec<u8>> {
    let body = frame.strip_prefix(&[DLE])?.strip_suffix(&[DLE, ETX])?;
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter();
    while let Some(&b) = bytes.next() {
        if b == DLE && bytes.next() != Some(&DLE) {
            return None;
        }
        out.push(b);
    }
    Some(out)
}

/// Frame `packet` (id first) for the wire.
pub fn frame(packet: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packet.len() * 2 + 3);
    out.push(DLE);
    for &b in packet {
        if b == DLE {
            out.push(DLE);
        }
        out.push(b);
    }
    out.extend_from_slice(&[DLE, ETX]);
    out
}

/// Queue one packet, id first, for the device.
pub(crate) fn write(session: &mut Session, ctx: &Context, packet: &[u8]) -> bool {
    if packet.is_empty() || packet.len() > TSIP_MAX_PACKET {
        warn!("TSIP: refusing to send {} byte packet", packet.len());
        return false;
    }
    trace!("TSIP: sending x{:02x} len {}", packet[0], packet.len());
    session.send(ctx, frame(packet))
}

/// Fail unless `buf` is exactly `want` bytes.
pub(crate) fn exact(buf: &BitReader<'_>, want: usize) -> Result<()> {
    if buf.len() != want {
        return Err(Error::BadLength {
            expected: want,
            len: buf.len(),
        });
    }
    Ok(())
}

/// `CLEAR_IS` when `tow` starts a new fix.
pub(crate) fn new_tow(session: &mut Session, tow: f64) -> Mask {
    let state = session.tsip();
    if state.last_tow == Some(tow) {
        return Mask::empty();
    }
    state.last_tow = Some(tow);
    Mask::CLEAR_IS
}

/// Decode one complete, still stuffed, TSIP frame.
pub fn parse(session: &mut Session, ctx: &mut Context, frame: &[u8]) -> Mask {
    let Some(packet) = unstuff(frame) else {
        warn!("TSIP: bad packet framing, {} bytes", frame.len());
        return Mask::empty();
    };
    let Some((&id, payload)) = packet.split_first() else {
        return Mask::empty();
    };
    trace!("TSIP x{id:02x}: length {}: {payload:02x?}", payload.len());

    let mask = if v1::is_v1(id) {
        v1::parse(session, ctx, id, payload)
    } else {
        decode(session, ctx, id, &BitReader::new(payload))
    };
    if !mask.is_empty() {
        trace!("TSIP x{id:02x}: mask {mask:?}");
    }
    periodic_requests(session, ctx);
    mask | Mask::ONLINE
}

fn decode(session: &mut Session, ctx: &mut Context, id: u8, buf: &BitReader<'_>) -> Mask {
    let Some(msg) = message(id) else {
        debug!("TSIP x{id:02x}: Unhandled packet type, length {}", buf.len());
        return Mask::empty();
    };
    let result = if buf.len() < msg.min_len {
        Err(Error::BadLength {
            expected: msg.min_len,
            len: buf.len(),
        })
    } else {
        (msg.handler)(session, ctx, buf)
    };
    match result {
        Ok(mask) => mask,
        Err(Error::BadLength { expected, len } | Error::ShortBuffer { width: expected, len, .. }) => {
            warn!("TSIP x{id:02x}: {}: bad length {len}, need {expected}", msg.name);
            Mask::empty()
        },
        Err(e) => {
            warn!("TSIP x{id:02x}: {}: {e}", msg.name);
            Mask::empty()
        },
    }
}

/// Re-request the reports a TSIP receiver will not send unprompted.
fn periodic_requests(session: &mut Session, ctx: &Context) {
    let now = session.now;
    let stale = |last: f64, interval: f64| (now - last).abs() > interval;
    let mut requests: Vec<&'static [u8]> = Vec::new();
    {
        let state = session.tsip();
        if stale(state.last_41, REQUEST_INTERVAL) {
            // current time, for the week and leap seconds
            requests.push(&[0x21]);
            state.last_41 = now;
        }
        if stale(state.last_6d, REQUEST_INTERVAL) {
            // fix mode
            requests.push(&[0x24]);
            state.last_6d = now;
        }
        if state.superpkt < 1 && stale(state.last_48, SYSTEM_MESSAGE_INTERVAL) {
            requests.push(&[0x28]);
            state.last_48 = now;
        }
        if stale(state.last_5c, REQUEST_INTERVAL) {
            // tracking status, all satellites
            requests.push(&[0x3c, 0x00]);
            state.last_5c = now;
        }
        if stale(state.last_46, REQUEST_INTERVAL) {
            requests.push(&[0x26]);
            state.last_46 = now;
        }
        if state.req_compact > 0.0 && stale(state.req_compact, REQUEST_INTERVAL) {
            warn!("TSIP x8f-23: no Compact Super Packet, trying LFwEI (0x8f-20)");
            requests.push(&[0x8e, 0x20, 0x01]);
            state.req_compact = 0.0;
        }
    }
    for packet in requests {
        write(session, ctx, packet);
    }
}

/// Send a raw TSIP packet, id first.
pub fn control_send(session: &mut Session, ctx: &Context, packet: &[u8]) -> Result<usize> {
    if packet.is_empty() || packet.len() > TSIP_MAX_PACKET {
        return Err(Error::Device(format!("TSIP packet length {} out of range", packet.len())));
    }
    let framed = frame(packet);
    let n = framed.len();
    if !session.send(ctx, framed) {
        return Err(Error::Device("device is read-only".into()));
    }
    Ok(n)
}

/// Ask for the hardware version. The 0x1C-83 reply picks the configurer.
pub fn init_query(session: &mut Session, ctx: &Context) {
    write(session, ctx, &[0x1c, 0x03]);
}

pub fn event_hook(session: &mut Session, ctx: &mut Context, event: Event) {
    if ctx.readonly || ctx.passive {
        return;
    }
    match event {
        Event::Identified | Event::Reactivate => {
            // a basic setup in case no hardware version ever comes back
            config::io_options(session, ctx, IO1_8F20 | IO1_DP | IO1_LLA, IO2_ENU, 0x00, IO4_DBHZ);
        },
        Event::Deactivate => debug!("TSIP: deactivate"),
        _ => {},
    }
}

/// TSIP time arrives with no known latency.
pub fn time_offset(_session: &Session) -> f64 {
    0.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lexer::PacketType;

    pub(crate) const START: i64 = 1_717_200_000;

    pub(crate) fn tsip_session() -> (Session, Context) {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        assert!(session.switch_driver(&mut ctx, PacketType::Tsip));
        ctx.readonly = true;
        (session, ctx)
    }

    /// Run `packet` (id first) through the parser.
    pub(crate) fn run(session: &mut Session, ctx: &mut Context, packet: &[u8]) -> Mask {
        parse(session, ctx, &frame(packet))
    }

    /// Big-endian f32 bytes.
    pub(crate) fn f32be(v: f32) -> [u8; 4] {
        v.to_be_bytes()
    }

    #[test]
    fn stuffing_round_trip() {
        let packet = [0x8f, 0x10, 0x20, 0x10];
        let framed = frame(&packet);
        assert_eq!(framed, [0x10, 0x8f, 0x10, 0x10, 0x20, 0x10, 0x10, 0x10, 0x03]);
        assert_eq!(unstuff(&framed).unwrap(), packet);
    }

    #[test]
    fn empty_frame_is_well_formed() {
        assert_eq!(unstuff(&[0x10, 0x00, 0x10, 0x03]).unwrap(), [0x00]);
        let (mut session, mut ctx) = tsip_session();
        let mask = parse(&mut session, &mut ctx, &[0x10, 0x00, 0x10, 0x03]);
        assert_eq!(mask, Mask::ONLINE);
    }

    #[test]
    fn lone_dle_is_malformed() {
        assert_eq!(unstuff(&[0x10, 0x41, 0x10, 0x22, 0x10, 0x03]), None);
        assert_eq!(unstuff(&[0x10, 0x41, 0x22]), None);
    }

    #[test]
    fn table_ids_are_unique() {
        for (i, m) in MESSAGES.iter().enumerate() {
            assert!(MESSAGES[i + 1..].iter().all(|o| o.id != m.id), "{} listed twice", m.name);
        }
        assert!(message(0x8f).is_some());
        assert!(message(0x90).is_none());
    }

    #[test]
    fn runt_changes_nothing() {
        let (mut session, mut ctx) = tsip_session();
        let mask = run(&mut session, &mut ctx, &[0x4a, 0, 0, 0]);
        assert_eq!(mask, Mask::ONLINE);
        assert!(session.newdata.latitude.is_nan());
    }

    #[test]
    fn stale_reports_are_requested() {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        session.switch_driver(&mut ctx, PacketType::Tsip);
        session.now = 100.0;
        run(&mut session, &mut ctx, &[0x82, 0x00]);
        let sent: Vec<_> = session.drain_outbox().collect();
        for want in [&[0x21][..], &[0x24], &[0x28], &[0x3c, 0x00], &[0x26]] {
            assert!(sent.contains(&frame(want)), "missing {want:02x?}");
        }
        // nothing is stale a second later
        session.now = 101.0;
        run(&mut session, &mut ctx, &[0x82, 0x00]);
        assert_eq!(session.outbox_len(), 0);
    }

    #[test]
    fn unanswered_compact_request_falls_back() {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        session.switch_driver(&mut ctx, PacketType::Tsip);
        session.now = 50.0;
        run(&mut session, &mut ctx, &[0x55, IO1_8F20, 0, 0, 0]);
        assert_eq!(session.tsip().req_compact, 50.0);
        session.drain_outbox().for_each(drop);
        session.now = 56.0;
        run(&mut session, &mut ctx, &[0x82, 0x00]);
        let sent: Vec<_> = session.drain_outbox().collect();
        assert!(sent.iter().any(|f| f[..4] == [0x10, 0x8e, 0x20, 0x01]));
        assert_eq!(session.tsip().req_compact, 0.0);
    }

    #[test]
    fn control_send_stuffs() {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        session.switch_driver(&mut ctx, PacketType::Tsip);
        session.drain_outbox().for_each(drop);
        assert_eq!(session.control_send(&ctx, &[0x8e, 0x10]).unwrap(), 6);
        assert_eq!(session.drain_outbox().next().unwrap(), [0x10, 0x8e, 0x10, 0x10, 0x10, 0x03]);
        assert!(session.control_send(&ctx, &[]).is_err());
        ctx.readonly = true;
        assert!(session.control_send(&ctx, &[0x1f]).is_err());
    }

    #[test]
    fn identification_sets_io_options() {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        session.dispatch_at(&mut ctx, PacketType::Tsip, &frame(&[0x82, 0x00]), 0.0);
        let sent: Vec<_> = session.drain_outbox().collect();
        assert!(sent.contains(&frame(&[0x1c, 0x03])));
        assert!(sent.contains(&frame(&[0x35, 0x32, 0x02, 0x00, 0x08])));
    }

    #[test]
    fn passive_skips_configuration() {
        let mut ctx = Context::new(START);
        ctx.passive = true;
        let mut session = Session::default();
        session.dispatch_at(&mut ctx, PacketType::Tsip, &frame(&[0x82, 0x00]), 0.0);
        assert!(!session.drain_outbox().any(|f| f[1] == 0x35));
    }
}
