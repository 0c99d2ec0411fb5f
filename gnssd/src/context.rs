//! Process-wide timekeeping shared by every session.

use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use chrono::{DateTime, Datelike, Utc};
use log::{error, info};

/// 1980-01-06T00:00:00Z as a Unix time.
pub const GPS_EPOCH: i64 = 315_964_800;
pub const SECS_PER_DAY: i64 = 86_400;
pub const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;
/// Length of one 10-bit week counter period.
pub const GPS_ROLLOVER: i64 = 1024 * SECS_PER_WEEK;
/// Leap seconds assumed until a receiver reports the current value.
pub const BUILD_LEAPSECONDS: i32 = 18;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct ContextFlags: u8 {
        /// Leap second offset came from a receiver.
        const LEAP_SECOND_VALID = 0x01;
        const GPS_TIME_VALID = 0x02;
        const CENTURY_VALID = 0x04;
    }
}

/// Leap second announcement state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LeapNotify {
    #[default]
    NoWarning,
    /// Last minute of the day has 61 seconds.
    AddSecond,
    /// Last minute of the day has 59 seconds.
    DelSecond,
    /// Clock is free running.
    NotInSync,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Context {
    pub valid: ContextFlags,
    /// Never write to the device.
    pub readonly: bool,
    /// Never autoconfigure the device; explicit control sends still go out.
    pub passive: bool,
    pub fixed_port_speed: Option<u32>,
    /// Framing such as `8N1`.
    pub fixed_port_framing: Option<String>,
    /// Unix time at startup.
    pub start_time: i64,
    /// GPS minus UTC, seconds.
    pub leap_seconds: i32,
    /// Full GPS week.
    pub gps_week: u16,
    /// GPS time of week, seconds.
    pub gps_tow: f64,
    pub century: i32,
    /// 10-bit week rollovers since the GPS epoch.
    pub rollovers: i32,
    pub leap_notify: LeapNotify,
}

impl Default for Context {
    fn default() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self::new(now)
    }
}

impl Context {
    /// Context for a daemon started at Unix time `start_time`.
    pub fn new(start_time: i64) -> Self {
        let mut ctx = Self {
            valid: ContextFlags::empty(),
            readonly: false,
            passive: false,
            fixed_port_speed: None,
            fixed_port_framing: None,
            start_time,
            leap_seconds: BUILD_LEAPSECONDS,
            gps_week: 0,
            gps_tow: 0.0,
            century: 2000,
            rollovers: ((start_time - GPS_EPOCH) / GPS_ROLLOVER) as i32,
            leap_notify: LeapNotify::NoWarning,
        };
        match DateTime::<Utc>::from_timestamp(start_time, 0) {
            Some(start) if start_time >= GPS_EPOCH => {
                ctx.century = start.year() - start.year() % 100;
                info!("startup at {} ({start_time})", start.to_rfc3339());
            },
            _ => error!("system time looks bogus, dates may not be reliable"),
        }
        ctx
    }

    /// GPS week and time of week to UTC, without touching the context.
    pub fn gpstime(&self, week: u32, tow: f64) -> Option<DateTime<Utc>> {
        let week = if week < 1024 {
            week + self.rollovers.max(0) as u32 * 1024
        } else {
            week
        };
        to_datetime(GPS_EPOCH + i64::from(week) * SECS_PER_WEEK, tow)
    }

    /// GPS week and time of week to UTC using the current leap second.
    ///
    /// Records week and TOW as the context's GPS time and tracks 10-bit
    /// rollovers that happen while running.
    pub fn gpstime_resolve(&mut self, week: u32, tow: f64) -> Option<DateTime<Utc>> {
        if (week as i64) < i64::from(self.gps_week & 0x3ff) && week < 1024 {
            self.rollovers += 1;
            info!("GPS week {week} 10-bit rollover detected. rollovers {}", self.rollovers);
        }
        let week = if week < 1024 {
            week + self.rollovers.max(0) as u32 * 1024
        } else {
            week
        };
        self.gps_week = week as u16;
        self.gps_tow = tow;
        self.valid |= ContextFlags::GPS_TIME_VALID;

        let secs = GPS_EPOCH + i64::from(week) * SECS_PER_WEEK - i64::from(self.leap_seconds);
        to_datetime(secs, tow)
    }

    /// Record a receiver-reported leap second count.
    pub fn set_leap_seconds(&mut self, leap: i32) {
        self.leap_seconds = leap;
        self.valid |= ContextFlags::LEAP_SECOND_VALID;
    }

    pub fn leap_valid(&self) -> bool {
        self.valid.contains(ContextFlags::LEAP_SECOND_VALID)
    }
}

/// `base` seconds plus a fractional `offset`.
pub(crate) fn to_datetime(base: i64, offset: f64) -> Option<DateTime<Utc>> {
    if !offset.is_finite() {
        return None;
    }
    let whole = offset.floor();
    let nanos = ((offset - whole) * 1e9).round() as u32;
    let (whole, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };
    DateTime::from_timestamp(base + whole, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-06-01T00:00:00Z
    const START: i64 = 1_717_200_000;

    #[test]
    fn startup_derives_rollovers_and_century() {
        let ctx = Context::new(START);
        assert_eq!(ctx.rollovers, 2);
        assert_eq!(ctx.century, 2000);
        assert_eq!(ctx.leap_seconds, BUILD_LEAPSECONDS);
        assert!(!ctx.leap_valid());
    }

    #[test]
    fn resolve_full_week() {
        let mut ctx = Context::new(START);
        let t = ctx.gpstime_resolve(2295, 18.0).unwrap();
        // week 2295 starts 2023-12-31T00:00:00 GPS
        assert_eq!(t.to_rfc3339(), "2023-12-31T00:00:00+00:00");
        assert_eq!(ctx.gps_week, 2295);
        assert!(ctx.valid.contains(ContextFlags::GPS_TIME_VALID));
    }

    #[test]
    fn resolve_truncated_week() {
        let mut ctx = Context::new(START);
        ctx.gpstime_resolve(2295 - 2048, 18.5).unwrap();
        assert_eq!(ctx.gps_week, 2295);
        assert_eq!(ctx.gps_tow, 18.5);
    }

    #[test]
    fn fractional_tow_keeps_nanos() {
        let t = to_datetime(0, 1.25).unwrap();
        assert_eq!(t.timestamp_subsec_millis(), 250);
        assert!(to_datetime(0, f64::NAN).is_none());
    }

    #[test]
    fn leap_second_marks_valid() {
        let mut ctx = Context::new(START);
        ctx.set_leap_seconds(18);
        assert!(ctx.leap_valid());
    }
}
