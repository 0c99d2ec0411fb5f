//! The unified fix model every decoder writes into.
//!
//! Floating fields use `NAN` for "not reported". Integer fields that need an
//! unset state use `-1` unless documented otherwise.

use chrono::{DateTime, Utc};

use crate::{constants::MAXCHANNELS, mask::Mask, subframe::Subframe};

/// Upper bound on IMU samples kept per epoch.
pub const MAX_IMU: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum FixMode {
    #[default]
    NotSeen = 0,
    NoFix = 1,
    Fix2D = 2,
    Fix3D = 3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum FixStatus {
    #[default]
    Unknown = 0,
    Gps = 1,
    Dgps = 2,
    RtkFix = 3,
    RtkFloat = 4,
    /// Dead reckoning alone.
    Dr = 5,
    /// GNSS plus dead reckoning.
    GnssDr = 6,
    /// Time only, surveyed or fixed position.
    Time = 7,
    Simulated = 8,
    PpsFix = 9,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AntennaStatus {
    #[default]
    Unknown,
    Ok,
    Open,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Position accuracy, metres.
    pub p_acc: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    /// Velocity accuracy, metres/second.
    pub v_acc: f64,
}

impl Default for Ecef {
    fn default() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
            p_acc: f64::NAN,
            vx: f64::NAN,
            vy: f64::NAN,
            vz: f64::NAN,
            v_acc: f64::NAN,
        }
    }
}

/// North-East-Down relative position and velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ned {
    pub rel_pos_n: f64,
    pub rel_pos_e: f64,
    pub rel_pos_d: f64,
    /// Length of the relative position vector.
    pub rel_pos_l: f64,
    /// Heading of the relative position vector.
    pub rel_pos_h: f64,
    pub vel_n: f64,
    pub vel_e: f64,
    pub vel_d: f64,
}

impl Default for Ned {
    fn default() -> Self {
        Self {
            rel_pos_n: f64::NAN,
            rel_pos_e: f64::NAN,
            rel_pos_d: f64::NAN,
            rel_pos_l: f64::NAN,
            rel_pos_h: f64::NAN,
            vel_n: f64::NAN,
            vel_e: f64::NAN,
            vel_d: f64::NAN,
        }
    }
}

/// Horizontal error ellipse.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ellipse {
    pub major: f64,
    pub minor: f64,
    pub orient: f64,
}

impl Default for Ellipse {
    fn default() -> Self {
        Self {
            major: f64::NAN,
            minor: f64::NAN,
            orient: f64::NAN,
        }
    }
}

/// Baseline to an RTK base or moving base.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Baseline {
    pub status: FixStatus,
    pub east: f64,
    pub north: f64,
    pub up: f64,
    pub length: f64,
    pub course: f64,
    pub ratio: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            status: FixStatus::Unknown,
            east: f64::NAN,
            north: f64::NAN,
            up: f64::NAN,
            length: f64::NAN,
            course: f64::NAN,
            ratio: f64::NAN,
        }
    }
}

/// One navigation solution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Fix {
    pub time: Option<DateTime<Utc>>,
    pub mode: FixMode,
    pub status: FixStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub alt_hae: f64,
    pub alt_msl: f64,
    /// Geoid separation, metres.
    pub geoid_sep: f64,
    pub depth: f64,
    pub speed: f64,
    pub track: f64,
    pub magnetic_track: f64,
    pub magnetic_var: f64,
    pub climb: f64,
    /// Time uncertainty, seconds.
    pub ept: f64,
    pub epx: f64,
    pub epy: f64,
    pub epv: f64,
    pub eph: f64,
    pub eps: f64,
    pub epd: f64,
    pub epc: f64,
    /// Spherical position error.
    pub sep: f64,
    pub ellipse: Ellipse,
    pub ecef: Ecef,
    pub ned: Ned,
    pub base: Baseline,
    pub clock_bias: f64,
    pub clock_drift: f64,
    pub datum: String,
    pub dgps_age: f64,
    /// `-1` when no differential station is in use.
    pub dgps_station: i32,
    pub antenna: AntennaStatus,
    /// Antenna power in µV, `-1` unknown.
    pub antenna_power: i32,
    /// Jamming indicator `0..=255`, `-1` unknown.
    pub jam: i32,
    pub temp: f64,
    pub wtemp: f64,
}

impl Default for Fix {
    fn default() -> Self {
        Self {
            time: None,
            mode: FixMode::NotSeen,
            status: FixStatus::Unknown,
            latitude: f64::NAN,
            longitude: f64::NAN,
            alt_hae: f64::NAN,
            alt_msl: f64::NAN,
            geoid_sep: f64::NAN,
            depth: f64::NAN,
            speed: f64::NAN,
            track: f64::NAN,
            magnetic_track: f64::NAN,
            magnetic_var: f64::NAN,
            climb: f64::NAN,
            ept: f64::NAN,
            epx: f64::NAN,
            epy: f64::NAN,
            epv: f64::NAN,
            eph: f64::NAN,
            eps: f64::NAN,
            epd: f64::NAN,
            epc: f64::NAN,
            sep: f64::NAN,
            ellipse: Ellipse::default(),
            ecef: Ecef::default(),
            ned: Ned::default(),
            base: Baseline::default(),
            clock_bias: f64::NAN,
            clock_drift: f64::NAN,
            datum: String::new(),
            dgps_age: f64::NAN,
            dgps_station: -1,
            antenna: AntennaStatus::Unknown,
            antenna_power: -1,
            jam: -1,
            temp: f64::NAN,
            wtemp: f64::NAN,
        }
    }
}

/// Copy `from` into `to` only when it carries a value.
fn take_finite(to: &mut f64, from: f64) {
    if from.is_finite() {
        *to = from;
    }
}

impl Fix {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Merge the fields named by `transfer` from `from` into `self`.
    ///
    /// Error estimates and optional extras travel whenever `from` has a
    /// finite value, regardless of `transfer`. Status only ever upgrades
    /// within one cycle.
    pub fn merge(&mut self, transfer: Mask, from: &Fix) {
        if transfer.contains(Mask::TIME) {
            self.time = from.time;
        }
        if transfer.contains(Mask::LATLON) {
            self.latitude = from.latitude;
            self.longitude = from.longitude;
        }
        if transfer.contains(Mask::MODE) {
            self.mode = from.mode;
        }
        if transfer.contains(Mask::STATUS) && from.status > self.status {
            self.status = from.status;
        }
        if transfer.contains(Mask::ALTITUDE) {
            take_finite(&mut self.alt_hae, from.alt_hae);
            take_finite(&mut self.alt_msl, from.alt_msl);
            take_finite(&mut self.depth, from.depth);
        }
        if transfer.contains(Mask::TRACK) {
            self.track = from.track;
        }
        if transfer.contains(Mask::MAGNETIC_TRACK) {
            take_finite(&mut self.magnetic_track, from.magnetic_track);
            take_finite(&mut self.magnetic_var, from.magnetic_var);
        }
        if transfer.contains(Mask::SPEED) {
            self.speed = from.speed;
        }
        if transfer.contains(Mask::CLIMB) {
            self.climb = from.climb;
        }
        if transfer.contains(Mask::TIMERR) {
            self.ept = from.ept;
        }
        if from.epx.is_finite() && from.epy.is_finite() {
            self.epx = from.epx;
            self.epy = from.epy;
        }
        take_finite(&mut self.epd, from.epd);
        take_finite(&mut self.eph, from.eph);
        take_finite(&mut self.eps, from.eps);
        take_finite(&mut self.sep, from.sep);
        take_finite(&mut self.geoid_sep, from.geoid_sep);
        take_finite(&mut self.epv, from.epv);
        if transfer.contains(Mask::SPEEDERR) {
            self.eps = from.eps;
        }
        if transfer.contains(Mask::ECEF) {
            self.ecef.x = from.ecef.x;
            self.ecef.y = from.ecef.y;
            self.ecef.z = from.ecef.z;
            self.ecef.p_acc = from.ecef.p_acc;
        }
        if transfer.contains(Mask::VECEF) {
            self.ecef.vx = from.ecef.vx;
            self.ecef.vy = from.ecef.vy;
            self.ecef.vz = from.ecef.vz;
            self.ecef.v_acc = from.ecef.v_acc;
        }
        if transfer.contains(Mask::NED) {
            self.ned.rel_pos_n = from.ned.rel_pos_n;
            self.ned.rel_pos_e = from.ned.rel_pos_e;
            self.ned.rel_pos_d = from.ned.rel_pos_d;
            if from.ned.rel_pos_h.is_finite() && from.ned.rel_pos_l.is_finite() {
                self.ned.rel_pos_h = from.ned.rel_pos_h;
                self.ned.rel_pos_l = from.ned.rel_pos_l;
            }
        }
        if transfer.contains(Mask::VNED) {
            self.ned.vel_n = from.ned.vel_n;
            self.ned.vel_e = from.ned.vel_e;
            self.ned.vel_d = from.ned.vel_d;
        }
        if from.ellipse.major.is_finite() {
            self.ellipse = from.ellipse;
        }
        if !from.datum.is_empty() {
            self.datum.clone_from(&from.datum);
        }
        if from.dgps_age.is_finite() && from.dgps_station >= 0 {
            self.dgps_age = from.dgps_age;
            self.dgps_station = from.dgps_station;
        }
        take_finite(&mut self.clock_bias, from.clock_bias);
        take_finite(&mut self.clock_drift, from.clock_drift);
        if from.base.status != FixStatus::Unknown {
            self.base = from.base;
        }
        if from.antenna != AntennaStatus::Unknown {
            self.antenna = from.antenna;
        }
        if from.antenna_power >= 0 {
            self.antenna_power = from.antenna_power;
        }
        if from.jam > 0 {
            self.jam = from.jam;
        }
        take_finite(&mut self.temp, from.temp);
        take_finite(&mut self.wtemp, from.wtemp);
    }

    /// Keep mode and status consistent: an RTK solution is always 3D.
    pub fn normalize(&mut self) {
        if matches!(self.status, FixStatus::RtkFix | FixStatus::RtkFloat) {
            self.mode = FixMode::Fix3D;
        }
    }
}

/// Dilution of precision factors.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Dop {
    pub xdop: f64,
    pub ydop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,
    pub gdop: f64,
}

impl Default for Dop {
    fn default() -> Self {
        Self {
            xdop: f64::NAN,
            ydop: f64::NAN,
            pdop: f64::NAN,
            hdop: f64::NAN,
            vdop: f64::NAN,
            tdop: f64::NAN,
            gdop: f64::NAN,
        }
    }
}

impl Dop {
    /// Copy the finite factors of `other` over ours.
    pub fn merge(&mut self, other: &Dop) {
        take_finite(&mut self.xdop, other.xdop);
        take_finite(&mut self.ydop, other.ydop);
        take_finite(&mut self.pdop, other.pdop);
        take_finite(&mut self.hdop, other.hdop);
        take_finite(&mut self.vdop, other.vdop);
        take_finite(&mut self.tdop, other.tdop);
        take_finite(&mut self.gdop, other.gdop);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SatHealth {
    #[default]
    Unknown,
    Ok,
    Bad,
}

/// One satellite in view.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Satellite {
    pub gnssid: u8,
    pub svid: u8,
    pub sigid: u8,
    /// GLONASS frequency slot, `-1` for others.
    pub freqid: i8,
    /// NMEA 4.10 style PRN, `0` unknown.
    pub prn: i16,
    pub azimuth: f64,
    pub elevation: f64,
    /// Signal strength, dB-Hz. NAN when not tracked.
    pub ss: f64,
    pub used: bool,
    pub health: SatHealth,
    /// u-blox style quality indicator `0..=7`, `-1` invalid.
    pub quality: i8,
    pub pr_res: f64,
}

impl Default for Satellite {
    fn default() -> Self {
        Self {
            gnssid: 0,
            svid: 0,
            sigid: 0,
            freqid: -1,
            prn: 0,
            azimuth: f64::NAN,
            elevation: f64::NAN,
            ss: f64::NAN,
            used: false,
            health: SatHealth::Unknown,
            quality: -1,
            pr_res: f64::NAN,
        }
    }
}

/// Attitude or one IMU sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attitude {
    pub mtime: Option<DateTime<Utc>>,
    /// Receiver time tag, free running.
    pub time_tag: u32,
    /// Source message name; empty marks an unused slot.
    pub msg: String,
    pub acc_len: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub depth: f64,
    pub dip: f64,
    pub gyro_temp: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub heading: f64,
    pub mheading: f64,
    pub mag_len: f64,
    pub mag_x: f64,
    pub mag_y: f64,
    pub mag_z: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Rate of turn, degrees per minute.
    pub rot: f64,
    pub temp: f64,
    pub yaw: f64,
    pub base: Baseline,
}

impl Default for Attitude {
    fn default() -> Self {
        Self {
            mtime: None,
            time_tag: 0,
            msg: String::new(),
            acc_len: f64::NAN,
            acc_x: f64::NAN,
            acc_y: f64::NAN,
            acc_z: f64::NAN,
            depth: f64::NAN,
            dip: f64::NAN,
            gyro_temp: f64::NAN,
            gyro_x: f64::NAN,
            gyro_y: f64::NAN,
            gyro_z: f64::NAN,
            heading: f64::NAN,
            mheading: f64::NAN,
            mag_len: f64::NAN,
            mag_x: f64::NAN,
            mag_y: f64::NAN,
            mag_z: f64::NAN,
            pitch: f64::NAN,
            roll: f64::NAN,
            rot: f64::NAN,
            temp: f64::NAN,
            yaw: f64::NAN,
            base: Baseline::default(),
        }
    }
}

impl Attitude {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One record retrieved from a receiver's batch or position log.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LogRecord {
    pub time: Option<DateTime<Utc>>,
    pub index_cnt: u32,
    pub lon: f64,
    pub lat: f64,
    pub alt_hae: f64,
    pub alt_msl: f64,
    pub g_speed: f64,
    pub heading: f64,
    pub t_acc: f64,
    pub h_acc: f64,
    pub v_acc: f64,
    pub s_acc: f64,
    pub head_acc: f64,
    pub vel_n: f64,
    pub vel_e: f64,
    pub vel_d: f64,
    pub p_dop: f64,
    pub distance: f64,
    pub total_distance: f64,
    pub distance_std: f64,
    pub status: FixStatus,
    /// Receiver fix type, `-1` unknown.
    pub fix_type: i32,
    pub num_sv: u32,
    /// Text payload of a string record.
    pub string: String,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            time: None,
            index_cnt: 0,
            lon: f64::NAN,
            lat: f64::NAN,
            alt_hae: f64::NAN,
            alt_msl: f64::NAN,
            g_speed: f64::NAN,
            heading: f64::NAN,
            t_acc: f64::NAN,
            h_acc: f64::NAN,
            v_acc: f64::NAN,
            s_acc: f64::NAN,
            head_acc: f64::NAN,
            vel_n: f64::NAN,
            vel_e: f64::NAN,
            vel_d: f64::NAN,
            p_dop: f64::NAN,
            distance: f64::NAN,
            total_distance: f64::NAN,
            distance_std: f64::NAN,
            status: FixStatus::Unknown,
            fix_type: -1,
            num_sv: 0,
            string: String::new(),
        }
    }
}

impl LogRecord {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One raw observation, suitable for RINEX.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawMeasurement {
    pub gnssid: u8,
    pub svid: u8,
    pub sigid: u8,
    pub freqid: u8,
    pub snr: u8,
    /// Loss of lock indicator bits, as in RINEX.
    pub lli: u8,
    pub obs_code: String,
    pub pseudorange: f64,
    pub carrierphase: f64,
    pub doppler: f64,
    /// Carrier lock time in ms, capped at 64500.
    pub locktime: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawData {
    pub mtime: Option<DateTime<Utc>>,
    pub meas: Vec<RawMeasurement>,
}

/// Everything a session publishes at the end of a cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GpsData {
    /// Fields changed since the last publish.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub set: Mask,
    pub fix: Fix,
    pub dop: Dop,
    pub skyview: Vec<Satellite>,
    pub skyview_time: Option<DateTime<Utc>>,
    pub satellites_visible: usize,
    pub satellites_used: usize,
    pub attitude: Attitude,
    pub imu: Vec<Attitude>,
    pub log: LogRecord,
    pub raw: RawData,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub subframe: Option<Subframe>,
    /// Time pulse quantization error, picoseconds.
    pub qerr: i64,
    /// Time of the pulse `qerr` applies to.
    pub qerr_time: Option<DateTime<Utc>>,
    /// Precision time stamp of the current cycle.
    pub toff: Option<DateTime<Utc>>,
    pub serial: String,
}

impl Default for GpsData {
    fn default() -> Self {
        Self {
            set: Mask::empty(),
            fix: Fix::default(),
            dop: Dop::default(),
            skyview: Vec::new(),
            skyview_time: None,
            satellites_visible: 0,
            satellites_used: 0,
            attitude: Attitude::default(),
            imu: Vec::new(),
            log: LogRecord::default(),
            raw: RawData::default(),
            subframe: None,
            qerr: 0,
            qerr_time: None,
            toff: None,
            serial: String::new(),
        }
    }
}

impl GpsData {
    /// Reset everything that belongs to one cycle.
    pub fn clear_cycle(&mut self) {
        self.fix.clear();
        self.dop = Dop::default();
        self.set = Mask::empty();
    }

    /// Replace the sky view, trimming to the channel limit and recounting.
    pub fn set_skyview(&mut self, sats: Vec<Satellite>) {
        let mut sats = sats;
        sats.truncate(MAXCHANNELS);
        self.satellites_visible = sats.len();
        self.satellites_used = sats.iter().filter(|s| s.used).count();
        self.skyview = sats;
    }

    /// Sky view entry for `(gnssid, svid)`, created when missing.
    pub fn satellite_mut(&mut self, gnssid: u8, svid: u8) -> Option<&mut Satellite> {
        if let Some(i) = self
            .skyview
            .iter()
            .position(|s| s.gnssid == gnssid && s.svid == svid)
        {
            return self.skyview.get_mut(i);
        }
        if self.skyview.len() >= MAXCHANNELS {
            return None;
        }
        self.skyview.push(Satellite {
            gnssid,
            svid,
            ..Satellite::default()
        });
        self.satellites_visible = self.skyview.len();
        self.skyview.last_mut()
    }

    /// Sky view entry with the given PRN.
    pub fn satellite_by_prn(&mut self, prn: i16) -> Option<&mut Satellite> {
        self.skyview.iter_mut().find(|s| s.prn == prn)
    }
}
