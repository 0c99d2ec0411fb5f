//! Per-device state and the packet-to-report pipeline.
//!
//! A [`Session`] owns the lexer for one byte source, tracks which
//! [`Driver`] is decoding it and folds the per-packet output of that driver
//! into reporting cycles. Every completed cycle is handed to the
//! [`Publisher`].

use std::{
    collections::VecDeque,
    fmt,
    io::Read,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, error, info, trace, warn};

use crate::{
    context::{Context, ContextFlags},
    driver::{self, Driver, DriverMode, Event, Parity},
    error::{Error, Result},
    fix::{Attitude, Dop, Fix, FixMode, GpsData},
    lexer::{Lexer, PacketType, TypeMask},
    mask::Mask,
    subframe::{NavCarry, Subframe},
    tsip::TsipState,
    ubx::UbxState,
};

/// Receives every completed reporting cycle.
pub trait Publisher {
    fn publish(&mut self, data: &GpsData);

    /// A decoded navigation subframe. Not retained by the session.
    fn subframe(&mut self, _subframe: &Subframe) {}
}

impl<F: FnMut(&GpsData)> Publisher for F {
    fn publish(&mut self, data: &GpsData) {
        self(data)
    }
}

/// Scratch space of the active driver. Switching drivers replaces it.
#[derive(Debug, Default)]
pub enum DriverScratch {
    #[default]
    None,
    Tsip(Box<TsipState>),
    Ubx(Box<UbxState>),
}

/// What the session should ask of a device once it is identified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// Device path or source name, for logs.
    pub path: String,
    /// Output mode to request after identification.
    pub mode: Option<DriverMode>,
    /// Reporting rate to request after identification, Hz.
    pub rate: Option<f64>,
    /// Line speed of the device, `0` when unknown.
    pub speed: u32,
    pub parity: Parity,
    pub stopbits: u8,
}

pub struct Session {
    pub lexer: Lexer,
    driver: &'static Driver,
    last_controller: Option<&'static Driver>,
    identified: TypeMask,
    pub(crate) scratch: DriverScratch,
    pub options: SessionOptions,
    /// Fix fields reported by the packet being decoded.
    pub newdata: Fix,
    /// Accumulated state of the cycle in progress.
    pub gpsdata: GpsData,
    /// Fix of the last published cycle.
    pub lastfix: Fix,
    /// Fix of the cycle before that.
    pub oldfix: Fix,
    /// Firmware description.
    pub subtype: String,
    /// Hardware or extension description.
    pub subtype1: String,
    /// Step counter for staged post-identification configuration.
    pub queue: u32,
    /// False when the driver cannot tell where a cycle ends.
    pub cycle_end_reliable: bool,
    /// Reporting cycle the device declared.
    pub cycle: Duration,
    pub mincycle: Duration,
    pub driver_mode: DriverMode,
    /// Characters consumed up to the last report.
    pub chars: u64,
    /// Consecutive packets that carried a valid fix.
    pub fixcnt: u32,
    pub badcount: u32,
    /// Cycles published.
    pub reports: u64,
    /// Unix time of the packet being decoded, seconds.
    pub now: f64,
    /// Navigation message state carried between subframes.
    pub nav: NavCarry,
    outbox: VecDeque<Vec<u8>>,
    publisher: Option<Box<dyn Publisher>>,
    cycle_set: Mask,
    /// CLEAR_IS seen since the last publish.
    cleared: bool,
    start_char: u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.options.path)
            .field("driver", &self.driver.name)
            .field("subtype", &self.subtype)
            .field("queue", &self.queue)
            .field("reports", &self.reports)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            lexer: Lexer::new(),
            driver: &driver::UNKNOWN,
            last_controller: None,
            identified: TypeMask::empty(),
            scratch: DriverScratch::None,
            options,
            newdata: Fix::default(),
            gpsdata: GpsData::default(),
            lastfix: Fix::default(),
            oldfix: Fix::default(),
            subtype: String::new(),
            subtype1: String::new(),
            queue: 0,
            cycle_end_reliable: false,
            cycle: Duration::from_secs(1),
            mincycle: Duration::from_secs(1),
            driver_mode: DriverMode::Nmea,
            chars: 0,
            fixcnt: 0,
            badcount: 0,
            reports: 0,
            now: 0.0,
            nav: NavCarry::default(),
            outbox: VecDeque::new(),
            publisher: None,
            cycle_set: Mask::empty(),
            cleared: false,
            start_char: 0,
        }
    }

    pub fn set_publisher<P: Publisher + 'static>(&mut self, publisher: P) {
        self.publisher = Some(Box::new(publisher));
    }

    pub fn driver(&self) -> &'static Driver {
        self.driver
    }

    /// Queue a frame for the device. Returns false when the context is
    /// read-only and the frame was dropped.
    pub fn send(&mut self, ctx: &Context, frame: Vec<u8>) -> bool {
        if ctx.readonly {
            debug!("read-only, not sending {} bytes", frame.len());
            return false;
        }
        trace!("queueing {} bytes: {:02x?}", frame.len(), frame);
        self.outbox.push_back(frame);
        true
    }

    /// Frames waiting to be written to the device, oldest first.
    pub fn drain_outbox(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.outbox.drain(..)
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Make `kind`'s driver current with fresh scratch, then tell it so
    /// through [`Event::DriverSwitch`]. [`Event::Identified`] follows from
    /// [`Session::dispatch`] the first time a packet type is seen.
    ///
    /// Returns false when no driver handles `kind`.
    pub fn switch_driver(&mut self, ctx: &mut Context, kind: PacketType) -> bool {
        let Some(new) = driver::lookup(kind) else {
            warn!("no matching packet type {}", kind.name());
            return false;
        };
        if std::ptr::eq(new, self.driver) {
            return true;
        }
        info!("selecting {} driver", new.name);
        self.driver = new;
        self.mincycle = new.min_cycle;
        self.scratch = DriverScratch::None;
        if let Some(hook) = new.event_hook {
            hook(self, ctx, Event::DriverSwitch);
        }
        if new.sticky {
            self.last_controller = Some(new);
        }
        true
    }

    /// Read once from `source` and decode every packet that completes.
    pub fn poll<R: Read + ?Sized>(&mut self, ctx: &mut Context, source: &mut R) -> Result<Mask> {
        match self.lexer.get(source) {
            Ok(_) => {},
            Err(Error::Io(e)) => {
                error!("read from {} failed: {e}", self.options.path);
                self.deactivate(ctx);
                return Err(Error::Device(e.to_string()));
            },
            Err(e) => return Err(e),
        }
        let mut mask = Mask::ONLINE;
        while let Some(packet) = self.lexer.packet() {
            let kind = packet.kind;
            let data = packet.data.to_vec();
            mask |= self.dispatch(ctx, kind, &data);
            if !self.lexer.parse() {
                break;
            }
        }
        Ok(mask)
    }

    /// Push bytes through the lexer and decode every packet they complete.
    pub fn feed(&mut self, ctx: &mut Context, bytes: &[u8]) -> Mask {
        self.feed_at(ctx, bytes, unix_now())
    }

    /// [`Self::feed`] with an explicit clock.
    pub fn feed_at(&mut self, ctx: &mut Context, mut bytes: &[u8], now: f64) -> Mask {
        let mut mask = Mask::empty();
        loop {
            let n = self.lexer.feed(bytes);
            bytes = &bytes[n..];
            while self.lexer.parse() {
                let Some(packet) = self.lexer.packet() else {
                    break;
                };
                let kind = packet.kind;
                let data = packet.data.to_vec();
                mask |= self.dispatch_at(ctx, kind, &data, now);
            }
            if bytes.is_empty() || n == 0 {
                break;
            }
        }
        mask
    }

    /// Decode one framed packet.
    pub fn dispatch(&mut self, ctx: &mut Context, kind: PacketType, data: &[u8]) -> Mask {
        self.dispatch_at(ctx, kind, data, unix_now())
    }

    /// [`Self::dispatch`] with an explicit clock.
    pub fn dispatch_at(&mut self, ctx: &mut Context, kind: PacketType, data: &[u8], now: f64) -> Mask {
        self.now = now;
        self.newdata.clear();

        if kind == PacketType::Comment {
            return self.comment(ctx, data);
        }
        if kind == PacketType::Bad {
            return Mask::empty();
        }

        let new_type = kind != self.driver.packet_type;
        // a driver that can switch modes handles NMEA itself
        let dependent_nmea = kind == PacketType::Nmea && self.driver.mode_switch.is_some();
        let driver_change = new_type && !dependent_nmea && self.switch_driver(ctx, kind);
        self.badcount = 0;
        self.driver_mode = if kind == PacketType::Nmea {
            DriverMode::Nmea
        } else {
            DriverMode::Binary
        };

        let mut received = Mask::PACKET;
        let kind_bit = TypeMask::from(kind);
        if driver_change && !self.identified.intersects(kind_bit) {
            info!("{} identified as type {}", self.options.path, self.driver.name);
            if let Some(init) = self.driver.init_query {
                // queries never change device state
                let saved = ctx.readonly;
                ctx.readonly = false;
                init(self, ctx);
                ctx.readonly = saved;
            }
            if let Some(hook) = self.driver.event_hook {
                hook(self, ctx, Event::Identified);
            }
            self.lexer.reset_counter();
            self.identified |= kind_bit;
            received |= Mask::DRIVER_IS;
            self.apply_options(ctx);
        }

        if let Some(hook) = self.driver.event_hook {
            hook(self, ctx, Event::Configure);
        }

        if self.driver.packet_type == kind {
            if let Some(parse) = self.driver.parse {
                received |= parse(self, ctx, data);
                trace!("parse {} = {received:?}", self.driver.name);
            }
        }

        // keep the control hooks of the last sticky driver
        if !self.driver.sticky {
            if let Some(controller) = self.last_controller {
                debug!("reverted to {} driver", controller.name);
                self.driver = controller;
            }
        }

        if received.contains(Mask::SUBFRAME) {
            if let (Some(sf), Some(p)) = (self.gpsdata.subframe.take(), self.publisher.as_mut()) {
                p.subframe(&sf);
            }
        }
        self.gpsdata.subframe = None;

        self.assemble(received)
    }

    /// Fold one packet's output into the cycle, publishing when it ends.
    fn assemble(&mut self, received: Mask) -> Mask {
        let mut set = Mask::ONLINE | received;
        let mut flushed = false;

        if set.contains(Mask::CLEAR_IS) {
            if !self.cycle_end_reliable && self.cycle_has_data() && !set.contains(Mask::REPORT_IS) {
                // no known ender, so a new cycle closes the previous one
                debug!("new cycle, publishing the previous one");
                self.publish();
                flushed = true;
            }
            self.gpsdata.attitude = Attitude::default();
            if !set.contains(Mask::DOP) {
                self.gpsdata.dop = Dop::default();
            }
            self.gpsdata.fix.clear();
            self.cleared = true;
        }

        self.gpsdata.fix.merge(set, &self.newdata);
        self.cycle_set |= set.public();

        if set.intersects(Mask::LATLON | Mask::ECEF) {
            if self.gpsdata.fix.mode > FixMode::NoFix {
                self.fixcnt += 1;
            } else {
                self.fixcnt = 0;
            }
        } else if set.contains(Mask::MODE) && self.gpsdata.fix.mode == FixMode::NoFix {
            self.fixcnt = 0;
        }

        if set.contains(Mask::TIME) {
            if let Some(t) = self.newdata.time {
                let secs = t.timestamp() as f64;
                if secs > self.now + 365.0 * 86_400.0 && self.now > 0.0 {
                    warn!("date ({secs}) more than a year in the future");
                } else if secs < 0.0 {
                    error!("date ({secs}) is negative");
                }
            }
        }

        if !self.cycle_end_reliable
            && !self.cleared
            && set.contains(Mask::LATLON | Mask::MODE)
            && !set.contains(Mask::REPORT_IS)
        {
            set |= Mask::REPORT_IS;
        }

        if set.contains(Mask::REPORT_IS) && self.cycle_has_data() {
            self.chars = self.lexer.char_counter - self.start_char;
            self.start_char = self.lexer.char_counter;
            self.publish();
        }
        if flushed {
            set |= Mask::REPORT_IS;
        }
        set
    }

    /// Whether the cycle in progress holds anything worth publishing.
    fn cycle_has_data(&self) -> bool {
        !(self.cycle_set - (Mask::ONLINE | Mask::PACKET)).is_empty()
    }

    fn publish(&mut self) {
        self.gpsdata.fix.normalize();
        self.gpsdata.set = self.cycle_set.public();
        self.oldfix = std::mem::replace(&mut self.lastfix, self.gpsdata.fix.clone());
        trace!("publishing {:?}", self.gpsdata.set);
        if let Some(p) = self.publisher.as_mut() {
            p.publish(&self.gpsdata);
        }
        self.reports += 1;
        self.cycle_set = Mask::empty();
        self.cleared = false;
    }

    fn comment(&mut self, ctx: &mut Context, data: &[u8]) -> Mask {
        if data == b"# EOF\n" {
            debug!("synthetic EOF");
            return Mask::EOF_IS;
        }
        // regression captures pin the century
        if let Some(date) = data.strip_prefix(b"# Date: ") {
            let year = std::str::from_utf8(date)
                .ok()
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse::<i32>().ok());
            if let Some(year) = year {
                ctx.century = year - year % 100;
                ctx.valid |= ContextFlags::CENTURY_VALID;
                info!("century set to {} from capture", ctx.century);
            }
        }
        debug!("comment, sync lock deferred: {}", String::from_utf8_lossy(data).trim_end());
        Mask::empty()
    }

    fn apply_options(&mut self, ctx: &mut Context) {
        if ctx.passive {
            return;
        }
        if let Some(mode) = self.options.mode {
            if let Err(e) = self.mode_switch(ctx, mode) {
                debug!("mode switch after identification: {e}");
            }
        }
        if let Some(rate) = self.options.rate {
            if let Err(e) = self.rate_switch(ctx, rate) {
                debug!("rate switch after identification: {e}");
            }
        }
    }

    /// Run the driver's deactivate hook.
    pub fn deactivate(&mut self, ctx: &mut Context) {
        if let Some(hook) = self.driver.event_hook {
            hook(self, ctx, Event::Deactivate);
        }
    }

    /// Run the driver's reactivate hook, for a device that came back.
    pub fn reactivate(&mut self, ctx: &mut Context) {
        if let Some(hook) = self.driver.event_hook {
            hook(self, ctx, Event::Reactivate);
        }
    }

    pub fn speed_switch(&mut self, ctx: &Context, speed: u32, parity: Parity, stopbits: u8) -> Result<bool> {
        let f = self.driver.speed_switch.ok_or(Error::NotSupported("speed switch"))?;
        Ok(f(self, ctx, speed, parity, stopbits))
    }

    pub fn mode_switch(&mut self, ctx: &Context, mode: DriverMode) -> Result<()> {
        let f = self.driver.mode_switch.ok_or(Error::NotSupported("mode switch"))?;
        f(self, ctx, mode);
        Ok(())
    }

    pub fn rate_switch(&mut self, ctx: &Context, hz: f64) -> Result<bool> {
        let f = self.driver.rate_switch.ok_or(Error::NotSupported("rate switch"))?;
        if !(hz.is_finite() && hz > 0.0) {
            return Ok(false);
        }
        Ok(f(self, ctx, hz))
    }

    /// Frame `payload` for the device and queue it.
    pub fn control_send(&mut self, ctx: &Context, payload: &[u8]) -> Result<usize> {
        let f = self.driver.control_send.ok_or(Error::NotSupported("control send"))?;
        f(self, ctx, payload)
    }

    pub fn init_query(&mut self, ctx: &Context) -> Result<()> {
        let f = self.driver.init_query.ok_or(Error::NotSupported("init query"))?;
        f(self, ctx);
        Ok(())
    }

    /// Expected latency of in-band time from this device, seconds.
    pub fn time_offset(&self) -> f64 {
        self.driver.time_offset.map_or(0.0, |f| f(self))
    }

    /// u-blox decoder state, while the UBX driver is active.
    pub fn ubx_state(&self) -> Option<&UbxState> {
        match &self.scratch {
            DriverScratch::Ubx(state) => Some(state),
            _ => None,
        }
    }

    pub fn tsip_state(&self) -> Option<&TsipState> {
        match &self.scratch {
            DriverScratch::Tsip(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn ubx(&mut self) -> &mut UbxState {
        if !matches!(self.scratch, DriverScratch::Ubx(_)) {
            self.scratch = DriverScratch::Ubx(Box::default());
        }
        match &mut self.scratch {
            DriverScratch::Ubx(state) => state,
            _ => unreachable!("scratch was just set to UBX"),
        }
    }

    pub(crate) fn tsip(&mut self) -> &mut TsipState {
        if !matches!(self.scratch, DriverScratch::Tsip(_)) {
            self.scratch = DriverScratch::Tsip(Box::default());
        }
        match &mut self.scratch {
            DriverScratch::Tsip(state) => state,
            _ => unreachable!("scratch was just set to TSIP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::fix::FixStatus;

    const START: i64 = 1_717_200_000;

    fn nmea_driver_session() -> (Session, Context) {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        assert!(session.switch_driver(&mut ctx, PacketType::Nmea));
        (session, ctx)
    }

    #[test]
    fn every_switch_starts_fresh_scratch() {
        let mut ctx = Context::new(START);
        let mut session = Session::default();
        assert!(session.switch_driver(&mut ctx, PacketType::Ubx));
        session.ubx().protver = 27;
        assert!(session.switch_driver(&mut ctx, PacketType::Ubx));
        assert_eq!(session.ubx_state().map(|s| s.protver), Some(27));

        assert!(session.switch_driver(&mut ctx, PacketType::Tsip));
        assert!(session.ubx_state().is_none());
        session.tsip().machine_id = 0x5a;
        assert!(session.switch_driver(&mut ctx, PacketType::Nmea));
        assert!(session.tsip_state().is_none());

        assert!(session.switch_driver(&mut ctx, PacketType::Ubx));
        assert_eq!(session.ubx().protver, UbxState::default().protver);
        assert_eq!(session.driver().name, "u-blox");
    }

    #[test]
    fn starts_unknown() {
        let session = Session::default();
        assert_eq!(session.driver().name, "Unknown");
        let ctx = Context::new(START);
        let mut session = session;
        assert!(matches!(
            session.rate_switch(&ctx, 5.0),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn readonly_drops_sends() {
        let mut ctx = Context::new(START);
        ctx.readonly = true;
        let mut session = Session::default();
        assert!(!session.send(&ctx, vec![1, 2, 3]));
        ctx.readonly = false;
        assert!(session.send(&ctx, vec![1, 2, 3]));
        assert_eq!(session.drain_outbox().collect::<Vec<_>>(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn eof_comment() {
        let (mut session, mut ctx) = nmea_driver_session();
        let mask = session.dispatch_at(&mut ctx, PacketType::Comment, b"# EOF\n", 0.0);
        assert_eq!(mask, Mask::EOF_IS);
    }

    #[test]
    fn date_comment_sets_century() {
        let (mut session, mut ctx) = nmea_driver_session();
        ctx.century = 1900;
        session.dispatch_at(&mut ctx, PacketType::Comment, b"# Date: 2031-02-03\n", 0.0);
        assert_eq!(ctx.century, 2000);
        assert!(ctx.valid.contains(ContextFlags::CENTURY_VALID));
    }

    #[test]
    fn clear_then_report_publishes_once() {
        let (mut session, _ctx) = nmea_driver_session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        session.set_publisher(move |d: &GpsData| sink.borrow_mut().push(d.clone()));
        session.cycle_end_reliable = true;

        session.newdata.latitude = 10.0;
        session.newdata.longitude = 20.0;
        session.newdata.mode = FixMode::Fix3D;
        session.assemble(Mask::CLEAR_IS | Mask::LATLON | Mask::MODE);
        session.newdata.clear();
        session.newdata.status = FixStatus::Dgps;
        session.assemble(Mask::STATUS | Mask::REPORT_IS);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].fix.latitude, 10.0);
        assert_eq!(seen[0].fix.status, FixStatus::Dgps);
        assert!(seen[0].set.contains(Mask::LATLON | Mask::STATUS));
        assert_eq!(session.lastfix.latitude, 10.0);
    }

    #[test]
    fn unreliable_ender_reports_on_position() {
        let (mut session, _ctx) = nmea_driver_session();
        session.cycle_end_reliable = false;
        session.newdata.latitude = 1.0;
        session.newdata.longitude = 2.0;
        session.newdata.mode = FixMode::Fix2D;
        let set = session.assemble(Mask::LATLON | Mask::MODE);
        assert!(set.contains(Mask::REPORT_IS));
        assert_eq!(session.reports, 1);
    }

    #[test]
    fn unreliable_ender_flushes_on_new_cycle() {
        let (mut session, _ctx) = nmea_driver_session();
        session.cycle_end_reliable = false;
        session.newdata.ecef.x = 1.0;
        session.assemble(Mask::CLEAR_IS | Mask::ECEF);
        assert_eq!(session.reports, 0);
        session.newdata.clear();
        session.newdata.ecef.x = 2.0;
        session.assemble(Mask::CLEAR_IS | Mask::ECEF);
        assert_eq!(session.reports, 1);
        assert_eq!(session.lastfix.ecef.x, 1.0);
    }

    #[test]
    fn mode_survives_packets_without_mode() {
        let (mut session, _ctx) = nmea_driver_session();
        session.cycle_end_reliable = true;
        session.newdata.mode = FixMode::Fix3D;
        session.assemble(Mask::MODE);
        session.newdata.clear();
        session.newdata.speed = 1.0;
        session.assemble(Mask::SPEED);
        assert_eq!(session.gpsdata.fix.mode, FixMode::Fix3D);
    }
}
