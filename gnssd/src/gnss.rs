//! Constellation identifiers and PRN numbering.

/// u-blox style constellation id, as carried in `Satellite::gnssid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum GnssId {
    Gps = 0,
    Sbas = 1,
    Galileo = 2,
    BeiDou = 3,
    Imes = 4,
    Qzss = 5,
    Glonass = 6,
    Irnss = 7,
}

impl GnssId {
    pub const fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::Gps,
            1 => Self::Sbas,
            2 => Self::Galileo,
            3 => Self::BeiDou,
            4 => Self::Imes,
            5 => Self::Qzss,
            6 => Self::Glonass,
            7 => Self::Irnss,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gps => "GPS",
            Self::Sbas => "SBAS",
            Self::Galileo => "GAL",
            Self::BeiDou => "BDS",
            Self::Imes => "IMES",
            Self::Qzss => "QZSS",
            Self::Glonass => "GLO",
            Self::Irnss => "IRNSS",
        }
    }
}

impl From<GnssId> for u8 {
    fn from(id: GnssId) -> u8 {
        id as u8
    }
}

/// NMEA 4.0 style PRN for a u-blox `(gnssId, svId)` pair.
///
/// Returns 0 for unknown or unusable pairs and -1 for an unidentified
/// GLONASS satellite (svId 255).
pub fn ubx2_to_prn(gnss_id: u8, sv_id: u8) -> i16 {
    let sv = i16::from(sv_id);
    if sv < 1 {
        return 0;
    }
    match gnss_id {
        0 if sv <= 32 => sv,
        1 if (120..=151).contains(&sv) => sv - 87,
        1 if sv <= 158 => sv,
        2 if sv <= 36 => sv + 300,
        2 if (211..=246).contains(&sv) => sv + 90,
        3 if sv <= 63 => sv + 400,
        3 if (159..=163).contains(&sv) => sv + 242,
        4 if sv <= 10 => sv + 172,
        4 if (173..=182).contains(&sv) => sv,
        5 if sv <= 10 => sv + 192,
        5 if (193..=202).contains(&sv) => sv,
        6 if sv <= 32 => sv + 64,
        6 if (65..=96).contains(&sv) => sv,
        6 if sv == 255 => -1,
        7 if sv <= 14 => sv + 800,
        _ => 0,
    }
}

/// Split a legacy single-number u-blox PRN into `(gnssId, svId, nmea PRN)`.
pub fn ubx_to_prn(ubx_prn: i32) -> Option<(u8, u8, i16)> {
    let (gnss, sv) = match ubx_prn {
        1..=32 => (0, ubx_prn),
        33..=64 => (3, ubx_prn - 27),
        65..=96 => (6, ubx_prn - 64),
        120..=158 => (1, ubx_prn),
        159..=163 => (3, ubx_prn - 158),
        173..=182 => (4, ubx_prn - 172),
        193..=199 => (5, ubx_prn - 192),
        211..=246 => (2, ubx_prn - 210),
        _ => return None,
    };
    let sv = sv as u8;
    Some((gnss, sv, ubx2_to_prn(gnss, sv)))
}

/// Legacy TSIP `(svtype, prn)` to `(gnssId, svId)`.
pub fn tsip_gnssid(svtype: u8, prn: i16) -> (u8, u8) {
    let to_sv = |v: i16| u8::try_from(v).unwrap_or(0);
    match svtype {
        0 => match prn {
            1..=32 => (GnssId::Gps as u8, to_sv(prn)),
            // RES SMT 360 puts SBAS in 33..54
            33..=54 => (GnssId::Sbas as u8, to_sv(prn + 87)),
            65..=96 => (GnssId::Glonass as u8, to_sv(prn - 64)),
            97..=133 => (GnssId::Galileo as u8, to_sv(prn - 96)),
            // Copernicus II
            120..=138 => (GnssId::Sbas as u8, to_sv(prn + 87)),
            183 => (GnssId::Qzss as u8, 1),
            192..=193 => (GnssId::Qzss as u8, to_sv(prn - 190)),
            200 => (GnssId::Qzss as u8, 4),
            201..=237 => (GnssId::BeiDou as u8, to_sv(prn - 200)),
            _ => (0, 0),
        },
        1 => (GnssId::Glonass as u8, to_sv(prn - 64)),
        2 => (GnssId::BeiDou as u8, to_sv(prn - 200)),
        3 => (GnssId::Galileo as u8, to_sv(prn - 96)),
        5 => {
            let sv = match prn {
                183 => 1,
                192 => 2,
                193 => 3,
                200 => 4,
                other => to_sv(other),
            };
            (GnssId::Qzss as u8, sv)
        },
        _ => (0, 0),
    }
}

/// TSIP v1 SV type to `(gnssId, sigId)`, `None` for reserved types.
pub fn tsipv1_svtype(svtype: u8) -> Option<(u8, u8)> {
    Some(match svtype {
        1 => (GnssId::Gps as u8, 0),
        2 => (GnssId::Gps as u8, 3),
        3 => (GnssId::Gps as u8, 6),
        5 => (GnssId::Glonass as u8, 0),
        6 => (GnssId::Glonass as u8, 2),
        9 => (GnssId::Sbas as u8, 0),
        13 => (GnssId::BeiDou as u8, 0),
        14 => (GnssId::BeiDou as u8, 2),
        15 => (GnssId::BeiDou as u8, 3),
        17 => (GnssId::Galileo as u8, 0),
        18 => (GnssId::Galileo as u8, 3),
        19 => (GnssId::Galileo as u8, 5),
        20 => (GnssId::Galileo as u8, 8),
        22 => (GnssId::Qzss as u8, 0),
        23 => (GnssId::Qzss as u8, 4),
        24 => (GnssId::Qzss as u8, 8),
        26 => (GnssId::Irnss as u8, 8),
        _ => return None,
    })
}

/// Signal name and RINEX observation code for a u-blox `(gnssId, sigId)`,
/// indexed by constellation then signal.
#[rustfmt::skip]
static SIGNALS: [&[Option<(&str, &str)>]; 8] = [
    // GPS
    &[Some(("L1 C/A", "C1C")), None, None, Some(("L2 CL", "C2L")), Some(("L2 CM", "C2S")),
      None, Some(("L5 I", "C5I")), Some(("L5 Q", "C5Q"))],
    // SBAS
    &[Some(("L1C", "C1C"))],
    // Galileo
    &[Some(("E1 C", "C1C")), Some(("E1 B", "C1B")), None, Some(("E5 aI", "C5I")),
      Some(("E5 aQ", "C5Q")), Some(("E5 bI", "C7I")), Some(("E5 bQ", "C7Q")), None,
      Some(("E6 B", "C6B")), Some(("E6 C", "C6C")), Some(("E6 A", "C6A"))],
    // BeiDou
    &[Some(("B1I D1", "C2I")), Some(("B1I D2", "C2I")), Some(("B2I D1", "C7I")),
      Some(("B2I D2", "C7I")), Some(("B3I D1", "C6I")), Some(("B1 Cp", "C1P")),
      Some(("B1 Cd", "C1D")), Some(("B2 ap", "C5P")), Some(("B2 ad", "C5P")), None,
      Some(("B3I D2", "C6I"))],
    // IMES, no RINEX code
    &[Some(("L5 A", ""))],
    // QZSS
    &[Some(("L1 C/A", "C1C")), Some(("L1 S", "C1Z")), None, None, Some(("L2 CM", "C2S")),
      Some(("L2 CL", "C2L")), None, None, Some(("L5 I", "C5I")), Some(("L5 Q", "C5Q")),
      None, None, Some(("L1 C/B", "C1E"))],
    // GLONASS
    &[Some(("L1 OF", "C1C")), None, Some(("L2 OF", "C2C"))],
    // IRNSS
    &[Some(("L5 A", "C5A"))],
];

/// Signals per constellation the tables cover.
pub const SIGID_NUM: u8 = 16;

fn signal(gnss_id: u8, sig_id: u8) -> Result<(&'static str, &'static str), &'static str> {
    let table = SIGNALS.get(usize::from(gnss_id)).ok_or("GNSS-Unk")?;
    if sig_id >= SIGID_NUM {
        return Err("SIG-Unk");
    }
    table
        .get(usize::from(sig_id))
        .copied()
        .flatten()
        .ok_or("Unk")
}

/// Plain name of a signal, e.g. `"L2 CL"`.
pub fn sigid_name(gnss_id: u8, sig_id: u8) -> &'static str {
    signal(gnss_id, sig_id).map_or_else(|e| e, |(name, _)| name)
}

/// RINEX 3 observation code of a signal, e.g. `"C2L"`. Several of these
/// are best guesses since u-blox signal ids do not map one to one.
pub fn sigid_obs(gnss_id: u8, sig_id: u8) -> &'static str {
    match signal(gnss_id, sig_id) {
        Ok((_, "")) => "Unk",
        Ok((_, obs)) => obs,
        Err(e) => e,
    }
}
