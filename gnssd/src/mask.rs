use bitflags::bitflags;

bitflags! {
    /// Fields changed by one decoded message, plus cycle-control flags.
    ///
    /// The low bits name fix-model fields. Bits from 46 up are internal
    /// markers a decoder hands back to the session and are never published.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mask: u64 {
        const ONLINE = 1 << 1;
        const TIME = 1 << 2;
        const TIMERR = 1 << 3;
        const LATLON = 1 << 4;
        const ALTITUDE = 1 << 5;
        const SPEED = 1 << 6;
        const TRACK = 1 << 7;
        const CLIMB = 1 << 8;
        const STATUS = 1 << 9;
        const MODE = 1 << 10;
        const DOP = 1 << 11;
        const HERR = 1 << 12;
        const VERR = 1 << 13;
        const ATTITUDE = 1 << 14;
        const SATELLITE = 1 << 15;
        const SPEEDERR = 1 << 16;
        const TRACKERR = 1 << 17;
        const CLIMBERR = 1 << 18;
        const DEVICE = 1 << 19;
        const DEVICELIST = 1 << 20;
        const DEVICEID = 1 << 21;
        const RTCM2 = 1 << 22;
        const RTCM3 = 1 << 23;
        const AIS = 1 << 24;
        const PACKET = 1 << 25;
        const SUBFRAME = 1 << 26;
        const GST = 1 << 27;
        const VERSION = 1 << 28;
        const POLICY = 1 << 29;
        const LOGMESSAGE = 1 << 30;
        const ERROR = 1 << 31;
        const TOFF = 1 << 32;
        const PPS = 1 << 33;
        const NAVDATA = 1 << 34;
        const OSCILLATOR = 1 << 35;
        const ECEF = 1 << 36;
        const VECEF = 1 << 37;
        const MAGNETIC_TRACK = 1 << 38;
        const RAW = 1 << 39;
        const NED = 1 << 40;
        const VNED = 1 << 41;
        const LOG = 1 << 42;
        const IMU = 1 << 43;
        const EOF = 1 << 44;
        const SPARTN = 1 << 45;

        /// Raw pseudoranges available.
        const RAW_IS = 1 << 46;
        /// Satellites-used count available.
        const USED_IS = 1 << 47;
        const DRIVER_IS = 1 << 48;
        /// Starts a reporting cycle.
        const CLEAR_IS = 1 << 49;
        /// Ends a reporting cycle.
        const REPORT_IS = 1 << 50;
        const NODATA_IS = 1 << 51;
        /// Precision time is available.
        const NTPTIME_IS = 1 << 52;
        const PERR_IS = 1 << 53;
        const PASSTHROUGH_IS = 1 << 54;
        const EOF_IS = 1 << 55;
        /// Time is good even without a position fix.
        const GOODTIME_IS = 1 << 56;
    }
}

impl Mask {
    /// Internal cycle-control bits, stripped before publishing.
    pub const INTERNAL: Self = Self::from_bits_truncate(!((1u64 << 46) - 1));

    /// The publishable part of the mask.
    pub fn public(self) -> Self {
        self - Self::INTERNAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_bits_split_cleanly() {
        let m = Mask::LATLON | Mask::MODE | Mask::REPORT_IS | Mask::CLEAR_IS;
        assert_eq!(m.public(), Mask::LATLON | Mask::MODE);
        assert!(Mask::INTERNAL.contains(Mask::GOODTIME_IS));
        assert!(!Mask::INTERNAL.contains(Mask::SPARTN));
    }
}
