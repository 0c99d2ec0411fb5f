//! The driver table: one static record per packet type.
//!
//! A [`Driver`] binds a framed packet type to its decoder and to the
//! optional control hooks the device supports. Records are plain data with
//! `fn` pointers; missing hooks are `None` and surface as
//! [`Error::NotSupported`](crate::Error::NotSupported) through the
//! [`Session`] control API.

use std::time::Duration;

use crate::{
    context::Context, error::Result, lexer::PacketType, mask::Mask, session::Session, tsip, ubx,
};

/// Something that happened to a session, delivered to the driver's
/// event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Wake a device that may be asleep.
    Wakeup,
    /// Packet type matched while hunting.
    TriggerMatch,
    /// First packet of this driver's type on the session.
    Identified,
    /// Called after every packet, to run staged configuration.
    Configure,
    /// Another driver was active before this one.
    DriverSwitch,
    /// The session is closing.
    Deactivate,
    /// The session came back after a deactivate.
    Reactivate,
}

/// Output the device is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Nmea,
    Binary,
}

/// Serial parity, as passed to a speed switch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Self::None),
            'O' => Some(Self::Odd),
            'E' => Some(Self::Even),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

pub type ParseFn = fn(&mut Session, &mut Context, &[u8]) -> Mask;
pub type EventFn = fn(&mut Session, &mut Context, Event);
pub type InitQueryFn = fn(&mut Session, &Context);
pub type SpeedSwitchFn = fn(&mut Session, &Context, u32, Parity, u8) -> bool;
pub type ModeSwitchFn = fn(&mut Session, &Context, DriverMode);
pub type RateSwitchFn = fn(&mut Session, &Context, f64) -> bool;
pub type ControlSendFn = fn(&mut Session, &Context, &[u8]) -> Result<usize>;
pub type TimeOffsetFn = fn(&Session) -> f64;

#[derive(Debug)]
pub struct Driver {
    pub name: &'static str,
    pub packet_type: PacketType,
    /// Once selected, not displaced by a non-sticky driver.
    pub sticky: bool,
    /// Fastest reporting cycle the device supports.
    pub min_cycle: Duration,
    pub parse: Option<ParseFn>,
    pub event_hook: Option<EventFn>,
    pub init_query: Option<InitQueryFn>,
    pub speed_switch: Option<SpeedSwitchFn>,
    pub mode_switch: Option<ModeSwitchFn>,
    pub rate_switch: Option<RateSwitchFn>,
    pub control_send: Option<ControlSendFn>,
    /// Accepts RTCM corrections written to the device.
    pub rtcm_writer: bool,
    pub time_offset: Option<TimeOffsetFn>,
}

impl Driver {
    /// A record that frames and identifies its packet type but decodes
    /// nothing.
    const fn passive(name: &'static str, packet_type: PacketType) -> Self {
        Self {
            name,
            packet_type,
            sticky: false,
            min_cycle: Duration::from_secs(1),
            parse: None,
            event_hook: None,
            init_query: None,
            speed_switch: None,
            mode_switch: None,
            rate_switch: None,
            control_send: None,
            rtcm_writer: false,
            time_offset: None,
        }
    }

    pub fn supports(&self, hook: Hook) -> bool {
        match hook {
            Hook::Parse => self.parse.is_some(),
            Hook::Event => self.event_hook.is_some(),
            Hook::InitQuery => self.init_query.is_some(),
            Hook::SpeedSwitch => self.speed_switch.is_some(),
            Hook::ModeSwitch => self.mode_switch.is_some(),
            Hook::RateSwitch => self.rate_switch.is_some(),
            Hook::ControlSend => self.control_send.is_some(),
        }
    }
}

/// Optional driver capabilities, for [`Driver::supports`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Parse,
    Event,
    InitQuery,
    SpeedSwitch,
    ModeSwitch,
    RateSwitch,
    ControlSend,
}

/// Placeholder selected until the first packet arrives.
pub static UNKNOWN: Driver = Driver::passive("Unknown", PacketType::Bad);

pub static NMEA0183: Driver = Driver {
    rtcm_writer: true,
    ..Driver::passive("NMEA0183", PacketType::Nmea)
};

pub static UBX: Driver = Driver {
    name: "u-blox",
    packet_type: PacketType::Ubx,
    sticky: true,
    min_cycle: Duration::from_millis(25),
    parse: Some(ubx::parse),
    event_hook: Some(ubx::event_hook),
    init_query: Some(ubx::init_query),
    speed_switch: Some(ubx::cfg::speed_switch),
    mode_switch: Some(ubx::cfg::mode_switch),
    rate_switch: Some(ubx::cfg::rate_switch),
    control_send: Some(ubx::control_send),
    rtcm_writer: true,
    time_offset: None,
};

pub static TSIP: Driver = Driver {
    name: "Trimble TSIP",
    packet_type: PacketType::Tsip,
    sticky: true,
    min_cycle: Duration::from_secs(1),
    parse: Some(tsip::parse),
    event_hook: Some(tsip::event_hook),
    init_query: Some(tsip::init_query),
    speed_switch: Some(tsip::config::speed_switch),
    mode_switch: Some(tsip::config::mode_switch),
    rate_switch: None,
    control_send: Some(tsip::control_send),
    rtcm_writer: false,
    time_offset: Some(tsip::time_offset),
};

static PASSIVE: [Driver; 19] = [
    Driver::passive("AIVDM", PacketType::Aivdm),
    Driver::passive("Garmin Simple Text", PacketType::GarminTxt),
    Driver::passive("SiRF", PacketType::Sirf),
    Driver::passive("Zodiac", PacketType::Zodiac),
    Driver::passive("EverMore", PacketType::Evermore),
    Driver::passive("iTalk", PacketType::Italk),
    Driver::passive("Garmin Serial binary", PacketType::Garmin),
    Driver::passive("Navcom", PacketType::Navcom),
    Driver::passive("SuperStarII", PacketType::Superstar2),
    Driver::passive("Motorola Oncore", PacketType::Oncore),
    Driver::passive("GeoStar", PacketType::Geostar),
    Driver::passive("GREIS", PacketType::Greis),
    Driver::passive("Skytraq", PacketType::Skytraq),
    Driver::passive("ALLYSTAR", PacketType::Allystar),
    Driver::passive("CASIC", PacketType::Casic),
    Driver::passive("RTCM104V2", PacketType::Rtcm2),
    Driver::passive("RTCM104V3", PacketType::Rtcm3),
    Driver::passive("JSON slave driver", PacketType::Json),
    Driver::passive("SPARTN", PacketType::Spartn),
];

/// The driver that decodes `kind`, if any packet of that type can be
/// decoded or at least identified.
pub fn lookup(kind: PacketType) -> Option<&'static Driver> {
    match kind {
        PacketType::Bad | PacketType::Comment | PacketType::Nmea2000 => None,
        PacketType::Nmea => Some(&NMEA0183),
        PacketType::Ubx => Some(&UBX),
        PacketType::Tsip => Some(&TSIP),
        other => PASSIVE.iter().find(|d| d.packet_type == other),
    }
}

/// Every driver, in table order.
pub fn drivers() -> impl Iterator<Item = &'static Driver> {
    [&NMEA0183, &UBX, &TSIP]
        .into_iter()
        .chain(PASSIVE.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_framed_type_has_a_driver() {
        for kind in [
            PacketType::Nmea,
            PacketType::Aivdm,
            PacketType::Ubx,
            PacketType::Tsip,
            PacketType::Garmin,
            PacketType::Casic,
            PacketType::Rtcm3,
            PacketType::Spartn,
        ] {
            let driver = lookup(kind).unwrap();
            assert_eq!(driver.packet_type, kind);
        }
        assert!(lookup(PacketType::Comment).is_none());
    }

    #[test]
    fn names_are_unique() {
        let names: Vec<_> = drivers().map(|d| d.name).collect();
        for (i, a) in names.iter().enumerate() {
            assert!(!names[i + 1..].contains(a), "{a} listed twice");
        }
    }

    #[test]
    fn decoders_are_sticky() {
        assert!(UBX.sticky && TSIP.sticky);
        assert!(!NMEA0183.sticky);
        assert_eq!(UBX.min_cycle, Duration::from_millis(25));
        assert!(UBX.supports(Hook::RateSwitch));
        assert!(!TSIP.supports(Hook::RateSwitch));
    }
}
