//! Framing states and the per-byte transition function.

use log::trace;

use super::{isgps::IsgpsStatus, Lexer, PacketType, TypeMask};
use crate::{
    checksum::zodiac_header,
    constants::{
        DLE, ETX, MAX_PACKET_LENGTH, SOH, SPARTN_PREAMBLE, STX, TSIP_MAX_PACKET,
    },
};

/// Lexer state. `*Recognized` states mark a complete frame; the lexer stays
/// in them afterwards so the next leader byte is recognized quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Ground,

    CommentBody,
    CommentRecognized,

    NmeaDollar,
    NmeaPubLead,
    NmeaVendorLead,
    NmeaLeaderEnd,
    NmeaCr,
    NmeaRecognized,
    NmeaLeadA,
    SirfAckLead2,
    BeidouLead,
    EcdisLead,
    HeadcompLead,
    SeatalkLead,
    QzssLead,
    SounderLead,
    TurnLead,
    WeatherLead,
    TransducerLead,
    PashrA,
    PashrS,
    PashrH,
    NmeaBinaryBody,
    NmeaBinaryCr,
    NmeaBinaryNl,
    /// An NMEA sentence was interrupted by `$` and put aside.
    StashRecognized,

    AisBang,
    AisLead1,
    AisLead2,
    AisLeadAlt1,
    AisLeadAlt2,
    AisLeadAlt3,
    AisLeadAlt4,
    AisLeaderEnd,
    AisCr,
    AisRecognized,

    At1Leader,
    GtxtRecognized,
    OncoreAt2,
    OncoreId1,
    OncorePayload,
    OncoreChecksum,
    OncoreCr,
    OncoreRecognized,

    SirfLeader1,
    SirfLeader2,
    SirfLength1,
    SirfPayload,
    SirfDelivered,
    SirfTrailer1,
    SirfRecognized,

    SkyLeader2,
    SkyLength1,
    SkyPayload,
    SkyDelivered,
    SkyCsum,
    SkyTrailer1,
    SkyRecognized,

    Superstar2Leader,
    Superstar2Id1,
    Superstar2Id2,
    Superstar2Payload,
    Superstar2Cksum1,
    Superstar2Cksum2,
    Superstar2Recognized,

    DleLeader,
    TsipPayload,
    TsipDle,
    TsipRecognized,

    EvermoreLeader1,
    EvermoreLeader2,
    EvermorePayload,
    EvermorePayloadDle,
    EvermoreRecognized,

    NavcomLeader1,
    NavcomLeader2,
    NavcomLeader3,
    NavcomId,
    NavcomLength1,
    NavcomLength2,
    NavcomPayload,
    NavcomCsum,
    NavcomRecognized,

    Rtcm2SyncState,
    Rtcm2Recognized,

    Rtcm3Leader1,
    Rtcm3Leader2,
    Rtcm3Payload,
    Rtcm3Recognized,

    ZodiacLeader1,
    ZodiacLeader2,
    ZodiacId1,
    ZodiacId2,
    ZodiacLength1,
    ZodiacLength2,
    ZodiacFlags1,
    ZodiacFlags2,
    ZodiacHsum1,
    ZodiacPayload,
    ZodiacRecognized,

    UbxLeader1,
    UbxLeader2,
    UbxClassId,
    UbxMessageId,
    UbxLength1,
    UbxPayload,
    UbxChecksumA,
    UbxRecognized,

    AllyLeader1,
    AllyLeader2,
    AllyClassId,
    AllyMessageId,
    AllyLength1,
    AllyPayload,
    AllyChecksumA,
    AllyRecognized,

    CasicLeader1,
    CasicLeader2,
    CasicLength1,
    CasicLength2,
    CasicClassId,
    CasicMessageId,
    CasicPayload,
    CasicChecksumA,
    CasicChecksumB,
    CasicChecksumC,
    CasicRecognized,

    ItalkLeader1,
    ItalkLeader2,
    ItalkLength,
    ItalkPayload,
    ItalkDelivered,
    ItalkRecognized,

    GeostarLeader1,
    GeostarLeader2,
    GeostarLeader3,
    GeostarLeader4,
    GeostarMessageId1,
    GeostarMessageId2,
    GeostarLength1,
    GeostarLength2,
    GeostarPayload,
    GeostarChecksumA,
    GeostarChecksumB,
    GeostarChecksumC,
    GeostarRecognized,

    GreisExpected,
    GreisReply1,
    GreisReply2,
    GreisId1,
    GreisId2,
    GreisLength1,
    GreisLength2,
    GreisPayload,
    GreisRecognized,

    JsonLeader,
    JsonStringLiteral,
    JsonStringSolidus,
    JsonEndAttribute,
    JsonExpectValue,
    JsonEndValue,
    JsonNumber,
    JsonSpecial,
    JsonRecognized,

    SpartnHeader,
    SpartnPayload,
    SpartnRecognized,
}

/// Total frame length, header and trailer included, of each Oncore message.
fn oncore_length(id1: u8, id2: u8) -> Option<usize> {
    Some(match (id1, id2) {
        (b'A', b'a') | (b'A', b'b') => 10,
        (b'A', b'c') | (b'A', b'd') | (b'A', b'e') => 11,
        (b'A', b'f') => 15,
        (b'A', b'g') => 8,
        (b'A', b'p') => 25,
        (b'A', b'q') => 8,
        (b'A', b's') => 20,
        (b'A', b't') => 8,
        (b'A', b'u') => 12,
        (b'A', b'v') | (b'A', b'w') => 8,
        (b'A', b'y') | (b'A', b'z') => 11,
        (b'A', b'N') | (b'A', b'O') | (b'A', b'P') => 8,
        (b'B', b'b') => 92,
        (b'B', b'j') | (b'B', b'o') => 8,
        (b'C', b'b') => 33,
        (b'C', b'c') => 80,
        (b'C', b'f') => 7,
        (b'C', b'h') => 9,
        (b'C', b'j') => 294,
        (b'C', b'k') => 7,
        (b'E', b'a') => 76,
        (b'E', b'n') => 69,
        (b'E', b'q') => 96,
        (b'F', b'a') => 9,
        (b'S', b'z') => 8,
        _ => return None,
    })
}

const fn is_print(c: u8) -> bool {
    c.is_ascii_graphic() || c == b' '
}

const fn is_json_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
}

fn hex_value(c: u8) -> Option<usize> {
    (c as char).to_digit(16).map(|d| d as usize)
}

impl Lexer {
    /// Re-read the current byte in `state`. The byte is not consumed.
    ///
    /// Falling back to `Ground` in the middle of a candidate frame drops
    /// the frame's first byte and rescans the rest, so frames always start
    /// at offset 0 of the input buffer.
    fn retry(&mut self, state: State) -> bool {
        self.retry_counter += 1;
        self.state = state;
        if state == State::Ground && self.inbufptr > 1 {
            self.character_discard();
        } else {
            self.inbufptr -= 1;
        }
        false
    }

    fn start_json(&mut self) -> bool {
        self.json_depth = 0;
        self.retry(State::JsonLeader)
    }

    /// End the current frame before the current byte and enter `state`.
    /// For `Ground` this drops the first buffered byte and rescans.
    fn cut(&mut self, state: State) -> bool {
        self.inbufptr -= 1;
        self.state = state;
        true
    }

    fn zword(&self, n: usize) -> i16 {
        i16::from_le_bytes([self.inbuffer[2 * n], self.inbuffer[2 * n + 1]])
    }

    /// Advance the framing state by one byte. Returns false when the byte
    /// must be looked at again in the new state.
    pub(super) fn next_state(&mut self, c: u8) -> bool {
        use State::*;

        match self.state {
            Ground => {
                self.state = match c {
                    SOH => Superstar2Leader,
                    STX => NavcomLeader1,
                    DLE => DleLeader,
                    b'!' => AisBang,
                    b'#' => CommentBody,
                    b'$' => NmeaDollar,
                    b'@' => {
                        if self.isgps.decode(c) == IsgpsStatus::Message {
                            Rtcm2Recognized
                        } else {
                            At1Leader
                        }
                    },
                    b'<' => ItalkLeader1,
                    b'P' => GeostarLeader1,
                    b'R' => GreisReply1,
                    b'{' => return self.start_json(),
                    b'~' => GreisId1,
                    0xa0 => SirfLeader1,
                    0xb5 => UbxLeader1,
                    0xba => CasicLeader1,
                    0xd3 => Rtcm3Leader1,
                    0xf1 => AllyLeader1,
                    0xff => ZodiacLeader1,
                    SPARTN_PREAMBLE if !self.type_mask.contains(TypeMask::SPARTN) => {
                        SpartnHeader
                    },
                    _ => match self.isgps.decode(c) {
                        IsgpsStatus::Sync => Rtcm2SyncState,
                        IsgpsStatus::Message => Rtcm2Recognized,
                        _ => Ground,
                    },
                };
            },

            CommentBody => match c {
                b'\n' => self.state = CommentRecognized,
                b'\r' | b'\t' => {},
                _ if !is_print(c) => return self.retry(Ground),
                _ => {},
            },

            NmeaDollar => {
                self.state = match c {
                    b'A' => NmeaLeadA,
                    b'B' => BeidouLead,
                    b'E' => EcdisLead,
                    b'G' => NmeaPubLead,
                    b'H' => HeadcompLead,
                    b'I' => SeatalkLead,
                    b'P' => NmeaVendorLead,
                    b'Q' => QzssLead,
                    b'S' => SounderLead,
                    b'T' => TurnLead,
                    b'W' => WeatherLead,
                    b'Y' => TransducerLead,
                    _ => return self.cut(Ground),
                };
            },
            NmeaPubLead => {
                // GA Galileo, GB BeiDou, GL GLONASS, GN combined, GP GPS,
                // GY IRNSS
                if b"ABLNPY".contains(&c) {
                    self.state = NmeaLeaderEnd;
                } else {
                    return self.cut(Ground);
                }
            },
            NmeaVendorLead => {
                if c == b'A' {
                    self.state = PashrA;
                } else if c.is_ascii_alphabetic() {
                    self.state = NmeaLeaderEnd;
                } else {
                    return self.cut(Ground);
                }
            },
            // $PASHR,... carries binary payloads after the talker
            PashrA => {
                self.state = match c {
                    b'S' => PashrS,
                    _ if c.is_ascii_alphabetic() => NmeaLeaderEnd,
                    _ => return self.cut(Ground),
                };
            },
            PashrS => {
                self.state = match c {
                    b'H' => PashrH,
                    _ if c.is_ascii_alphabetic() => NmeaLeaderEnd,
                    _ => return self.cut(Ground),
                };
            },
            PashrH => {
                self.state = match c {
                    b'R' => NmeaBinaryBody,
                    _ if c.is_ascii_alphabetic() => NmeaLeaderEnd,
                    _ => return self.cut(Ground),
                };
            },
            NmeaBinaryBody => {
                if c == b'\r' {
                    self.state = NmeaBinaryCr;
                }
            },
            NmeaBinaryCr => {
                self.state = if c == b'\n' {
                    NmeaBinaryNl
                } else {
                    NmeaBinaryBody
                };
            },
            NmeaBinaryNl => {
                if c == b'$' {
                    return self.cut(NmeaRecognized);
                }
                self.state = NmeaBinaryBody;
            },
            NmeaLeadA => match c {
                b'c' => self.state = SirfAckLead2,
                // $AI, AIS station in NMEA clothing
                b'I' => self.state = AisLead2,
                // $AP, autopilot
                b'P' => self.state = NmeaLeaderEnd,
                _ => return self.retry(Ground),
            },
            SirfAckLead2 => {
                if c == b'k' {
                    self.state = NmeaLeaderEnd;
                } else {
                    return self.retry(Ground);
                }
            },
            BeidouLead => return self.single_lead(c, b"D"),
            EcdisLead => return self.single_lead(c, b"C"),
            HeadcompLead => return self.single_lead(c, b"CE"),
            SeatalkLead => return self.single_lead(c, b"IN"),
            QzssLead => return self.single_lead(c, b"Z"),
            SounderLead => return self.single_lead(c, b"DNT"),
            TurnLead => return self.single_lead(c, b"I"),
            WeatherLead => return self.single_lead(c, b"I"),
            TransducerLead => return self.single_lead(c, b"X"),

            NmeaLeaderEnd => match c {
                b'\r' => self.state = NmeaCr,
                b'\n' => self.state = NmeaRecognized,
                b'$' => return self.cut(StashRecognized),
                _ if !is_print(c) => return self.cut(Ground),
                _ => {},
            },
            NmeaCr => match c {
                b'\n' => self.state = NmeaRecognized,
                // some receivers end sentences with \r\r\n
                b'\r' => {},
                _ => return self.cut(Ground),
            },
            StashRecognized => {
                if c == b'$' {
                    self.state = NmeaDollar;
                } else {
                    return self.retry(Ground);
                }
            },
            NmeaRecognized | AisRecognized => match c {
                b'#' => self.state = CommentBody,
                b'$' => self.state = NmeaDollar,
                b'!' => self.state = AisBang,
                0xb5 => self.state = UbxLeader1,
                b'{' => return self.start_json(),
                _ => return self.retry(Ground),
            },

            AisBang => match c {
                b'A' => self.state = AisLead1,
                b'B' => self.state = AisLeadAlt1,
                b'S' => self.state = AisLeadAlt3,
                _ => return self.retry(Ground),
            },
            AisLead1 => {
                if b"BDINRSTX".contains(&c) {
                    self.state = AisLead2;
                } else {
                    return self.retry(Ground);
                }
            },
            AisLeadAlt1 => {
                if c == b'S' {
                    self.state = AisLeadAlt2;
                } else {
                    return self.retry(Ground);
                }
            },
            AisLeadAlt3 => {
                if c == b'A' {
                    self.state = AisLeadAlt4;
                } else {
                    return self.retry(Ground);
                }
            },
            AisLead2 | AisLeadAlt2 | AisLeadAlt4 => {
                if c.is_ascii_alphabetic() {
                    self.state = AisLeaderEnd;
                } else {
                    return self.retry(Ground);
                }
            },
            AisLeaderEnd => match c {
                b'\r' => self.state = AisCr,
                b'\n' => self.state = AisRecognized,
                _ if !is_print(c) => return self.cut(Ground),
                _ => {},
            },
            AisCr => {
                if c == b'\n' {
                    self.state = AisRecognized;
                } else {
                    return self.cut(Ground);
                }
            },

            At1Leader => match c {
                b'@' => self.state = OncoreAt2,
                // TNT: NMEA-like body, '*' never appears in Garmin text
                b'*' => self.state = NmeaLeaderEnd,
                b'\r' => {},
                b'\n' => self.state = GtxtRecognized,
                _ if !is_print(c) => return self.retry(Ground),
                _ => {},
            },
            OncoreAt2 => {
                if c.is_ascii_uppercase() {
                    self.length = usize::from(c);
                    self.state = OncoreId1;
                } else {
                    return self.retry(Ground);
                }
            },
            OncoreId1 => {
                if !c.is_ascii_alphabetic() {
                    return self.retry(Ground);
                }
                match oncore_length(self.length as u8, c) {
                    Some(len) => {
                        self.length = len - 6;
                        self.state = OncorePayload;
                    },
                    None => {
                        trace!("unknown Oncore message @@{}{}", self.length as u8 as char, c as char);
                        return self.retry(Ground);
                    },
                }
            },
            OncorePayload => {
                self.length = self.length.saturating_sub(1);
                if self.length == 0 {
                    self.state = OncoreChecksum;
                }
            },
            OncoreChecksum => {
                if c == b'\r' {
                    self.state = OncoreCr;
                } else {
                    return self.retry(Ground);
                }
            },
            OncoreCr => {
                self.state = if c == b'\n' {
                    OncoreRecognized
                } else {
                    OncorePayload
                };
            },
            OncoreRecognized => {
                if c == b'@' {
                    self.state = At1Leader;
                } else {
                    return self.retry(Ground);
                }
            },

            SirfLeader1 => match c {
                0xa1 => self.state = SkyLeader2,
                0xa2 => self.state = SirfLeader2,
                _ => return self.retry(Ground),
            },
            SirfLeader2 => {
                self.length = usize::from(c) << 8;
                self.state = SirfLength1;
            },
            SirfLength1 => {
                // payload plus two checksum bytes
                self.length += usize::from(c) + 2;
                if self.length <= MAX_PACKET_LENGTH {
                    self.state = SirfPayload;
                } else {
                    return self.retry(Ground);
                }
            },
            SirfPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = SirfDelivered;
                }
            },
            SirfDelivered => {
                if c == 0xb0 {
                    self.state = SirfTrailer1;
                } else {
                    return self.retry(Ground);
                }
            },
            SirfTrailer1 => {
                if c == 0xb3 {
                    self.state = SirfRecognized;
                } else {
                    return self.retry(Ground);
                }
            },
            SirfRecognized => {
                if c == 0xa0 {
                    self.state = SirfLeader1;
                } else {
                    return self.retry(Ground);
                }
            },

            SkyLeader2 => {
                self.length = usize::from(c) << 8;
                self.state = SkyLength1;
            },
            SkyLength1 => {
                self.length += usize::from(c);
                if self.length == 0 || self.length > MAX_PACKET_LENGTH {
                    return self.retry(Ground);
                }
                self.state = SkyPayload;
            },
            SkyPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = SkyDelivered;
                }
            },
            SkyDelivered => {
                let csum = self.inbuffer[4..self.inbufptr - 1]
                    .iter()
                    .fold(0u8, |acc, b| acc ^ b);
                if csum == c {
                    self.state = SkyCsum;
                } else {
                    trace!("Skytraq bad checksum {csum:#04x}, expecting {c:#04x}");
                    self.state = Ground;
                }
            },
            SkyCsum => {
                if c == b'\r' {
                    self.state = SkyTrailer1;
                } else {
                    return self.retry(Ground);
                }
            },
            SkyTrailer1 => {
                if c == b'\n' {
                    self.state = SkyRecognized;
                } else {
                    return self.retry(Ground);
                }
            },
            SkyRecognized => {
                if c == 0xa0 {
                    self.state = SirfLeader1;
                } else {
                    return self.retry(Ground);
                }
            },

            Superstar2Leader => {
                self.ctmp = c;
                self.state = Superstar2Id1;
            },
            Superstar2Id1 => {
                if self.ctmp ^ 0xff == c {
                    self.state = Superstar2Id2;
                } else {
                    return self.retry(Ground);
                }
            },
            Superstar2Id2 => {
                self.length = usize::from(c);
                self.state = if self.length == 0 {
                    Superstar2Cksum1
                } else {
                    Superstar2Payload
                };
            },
            Superstar2Payload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = Superstar2Cksum1;
                }
            },
            Superstar2Cksum1 => self.state = Superstar2Cksum2,
            Superstar2Cksum2 => self.state = Superstar2Recognized,
            Superstar2Recognized => {
                if c == SOH {
                    self.state = Superstar2Leader;
                } else {
                    return self.retry(Ground);
                }
            },

            DleLeader => {
                if c == STX {
                    self.state = EvermoreLeader2;
                } else if c >= 0x13 || c == 0x00 {
                    // TSIP or Garmin binary; id 0x00 only for the empty frame
                    self.length = TSIP_MAX_PACKET;
                    self.state = TsipPayload;
                } else {
                    self.state = Ground;
                }
            },
            TsipPayload => {
                if c == DLE {
                    self.state = TsipDle;
                }
                self.length -= 1;
                if self.length == 0 {
                    // too long, probably never was TSIP
                    self.state = Ground;
                }
            },
            TsipDle => match c {
                ETX => self.state = TsipRecognized,
                DLE => {
                    self.length = TSIP_MAX_PACKET;
                    self.state = TsipPayload;
                },
                _ => self.state = Ground,
            },
            TsipRecognized => {
                // no checksum, so do not commit to TSIP on the next DLE
                if c == DLE {
                    self.state = DleLeader;
                } else {
                    return self.retry(Ground);
                }
            },

            EvermoreLeader1 => {
                if c == STX {
                    self.state = EvermoreLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            EvermoreLeader2 => {
                self.length = usize::from(c);
                self.state = if c == DLE {
                    EvermorePayloadDle
                } else {
                    EvermorePayload
                };
            },
            EvermorePayload => {
                if c == DLE {
                    self.state = EvermorePayloadDle;
                } else {
                    self.length = self.length.saturating_sub(1);
                    if self.length == 0 {
                        return self.retry(Ground);
                    }
                }
            },
            EvermorePayloadDle => match c {
                DLE => self.state = EvermorePayload,
                ETX => self.state = EvermoreRecognized,
                _ => self.state = Ground,
            },
            EvermoreRecognized => {
                if c == DLE {
                    self.state = EvermoreLeader1;
                } else {
                    return self.retry(Ground);
                }
            },

            NavcomLeader1 => {
                if c == 0x99 {
                    self.state = NavcomLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            NavcomLeader2 => {
                if c == b'f' {
                    self.state = NavcomLeader3;
                } else {
                    return self.retry(Ground);
                }
            },
            NavcomLeader3 => self.state = NavcomId,
            NavcomId => {
                // the length counts the id and header bytes already seen
                match usize::from(c).checked_sub(4) {
                    Some(len) => {
                        self.length = len;
                        self.state = NavcomLength1;
                    },
                    None => return self.retry(Ground),
                }
            },
            NavcomLength1 => {
                self.length += usize::from(c) << 8;
                if self.length == 0 || self.length > MAX_PACKET_LENGTH {
                    return self.retry(Ground);
                }
                self.state = NavcomLength2;
            },
            NavcomLength2 => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = NavcomPayload;
                }
            },
            NavcomPayload => {
                let csum = self.inbuffer[4..self.inbufptr - 1]
                    .iter()
                    .fold(self.inbuffer[3], |acc, b| acc ^ b);
                if csum == c {
                    self.state = NavcomCsum;
                } else {
                    trace!(
                        "Navcom packet type {:#04x} bad checksum {csum:#04x}, expecting {c:#04x}",
                        self.inbuffer[3]
                    );
                    self.state = Ground;
                }
            },
            NavcomCsum => {
                if c == ETX {
                    self.state = NavcomRecognized;
                } else {
                    return self.retry(Ground);
                }
            },
            NavcomRecognized => {
                if c == STX {
                    self.state = NavcomLeader1;
                } else {
                    return self.retry(Ground);
                }
            },

            Rtcm2SyncState => match self.isgps.decode(c) {
                IsgpsStatus::Message => self.state = Rtcm2Recognized,
                IsgpsStatus::NoSync => self.state = Ground,
                _ => {},
            },
            Rtcm2Recognized => {
                if c == b'#' {
                    // comment lines sometimes appear in RTCM2 captures
                    return self.retry(Ground);
                }
                self.state = match self.isgps.decode(c) {
                    IsgpsStatus::Sync => Rtcm2SyncState,
                    IsgpsStatus::Message => Rtcm2Recognized,
                    _ => Ground,
                };
            },

            Rtcm3Leader1 => {
                // six reserved zero bits precede the length
                if c & 0xfc == 0 {
                    self.length = usize::from(c) << 8;
                    self.state = Rtcm3Leader2;
                } else {
                    return self.retry(Ground);
                }
            },
            Rtcm3Leader2 => {
                self.length |= usize::from(c);
                // plus the CRC
                self.length += 3;
                self.state = Rtcm3Payload;
            },
            Rtcm3Payload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = Rtcm3Recognized;
                }
            },
            Rtcm3Recognized => {
                if c == 0xd3 {
                    self.state = Rtcm3Leader1;
                } else {
                    return self.retry(Ground);
                }
            },

            ZodiacRecognized => {
                if c == 0xff {
                    self.state = ZodiacLeader1;
                } else {
                    return self.retry(Ground);
                }
            },
            ZodiacLeader1 => {
                if c == 0x81 {
                    self.state = ZodiacLeader2;
                } else {
                    return self.cut(Ground);
                }
            },
            ZodiacLeader2 => self.state = ZodiacId1,
            ZodiacId1 => self.state = ZodiacId2,
            ZodiacId2 => {
                self.length = usize::from(c);
                self.state = ZodiacLength1;
            },
            ZodiacLength1 => {
                self.length += usize::from(c) << 8;
                self.state = ZodiacLength2;
            },
            ZodiacLength2 => self.state = ZodiacFlags1,
            ZodiacFlags1 => self.state = ZodiacFlags2,
            ZodiacFlags2 => self.state = ZodiacHsum1,
            ZodiacHsum1 => {
                let sum = zodiac_header([self.zword(0), self.zword(1), self.zword(2), self.zword(3)]);
                if sum != self.zword(4) {
                    trace!("Zodiac header checksum {sum:#06x}, expecting {:#06x}", self.zword(4));
                    self.state = Ground;
                } else if self.length == 0 {
                    self.state = ZodiacRecognized;
                } else {
                    // words to bytes, plus the data checksum
                    self.length = self.length * 2 + 2;
                    if self.length <= MAX_PACKET_LENGTH - 10 {
                        self.state = ZodiacPayload;
                    } else {
                        return self.retry(Ground);
                    }
                }
            },
            ZodiacPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = ZodiacRecognized;
                }
            },

            UbxLeader1 => {
                if c == b'b' {
                    self.state = UbxLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            UbxLeader2 => self.state = UbxClassId,
            UbxClassId => self.state = UbxMessageId,
            UbxMessageId => {
                self.length = usize::from(c);
                self.state = UbxLength1;
            },
            UbxLength1 => {
                self.length += usize::from(c) << 8;
                if self.length > MAX_PACKET_LENGTH {
                    return self.retry(Ground);
                }
                // payload and CK_A, so empty payloads frame too
                self.length += 1;
                self.state = UbxPayload;
            },
            UbxPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = UbxChecksumA;
                }
            },
            UbxChecksumA => self.state = UbxRecognized,
            UbxRecognized | AllyRecognized | CasicRecognized => {
                let leader = match self.state {
                    UbxRecognized => (0xb5, UbxLeader1),
                    AllyRecognized => (0xf1, AllyLeader1),
                    _ => (0xba, CasicLeader1),
                };
                match c {
                    _ if c == leader.0 => self.state = leader.1,
                    // receivers mix NMEA and binary back to back
                    b'$' => self.state = NmeaDollar,
                    b'{' => return self.start_json(),
                    _ => return self.retry(Ground),
                }
            },

            AllyLeader1 => {
                if c == 0xd9 {
                    self.state = AllyLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            AllyLeader2 => self.state = AllyClassId,
            AllyClassId => self.state = AllyMessageId,
            AllyMessageId => {
                self.length = usize::from(c);
                self.state = AllyLength1;
            },
            AllyLength1 => {
                self.length += usize::from(c) << 8;
                if self.length >= MAX_PACKET_LENGTH {
                    return self.retry(Ground);
                }
                self.state = AllyPayload;
            },
            AllyPayload => {
                if self.length == 0 {
                    self.state = AllyChecksumA;
                } else {
                    self.length -= 1;
                }
            },
            AllyChecksumA => self.state = AllyRecognized,

            CasicLeader1 => {
                if c == 0xce {
                    self.state = CasicLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            CasicLeader2 => {
                self.length = usize::from(c);
                self.state = CasicLength1;
            },
            CasicLength1 => {
                self.length += usize::from(c) << 8;
                if self.length >= crate::constants::CASIC_MAX_PAYLOAD || self.length % 4 != 0 {
                    return self.retry(Ground);
                }
                self.state = CasicLength2;
            },
            CasicLength2 => self.state = CasicClassId,
            CasicClassId => self.state = CasicMessageId,
            CasicMessageId | CasicPayload => {
                if self.length == 0 {
                    self.state = CasicChecksumA;
                } else {
                    self.length -= 1;
                    self.state = CasicPayload;
                }
            },
            CasicChecksumA => self.state = CasicChecksumB,
            CasicChecksumB => self.state = CasicChecksumC,
            CasicChecksumC => self.state = CasicRecognized,

            ItalkLeader1 => {
                if c == b'!' {
                    self.state = ItalkLeader2;
                } else {
                    return self.retry(Ground);
                }
            },
            ItalkLeader2 => {
                // word count sits at offset 6; it may not have arrived yet
                self.length = usize::from(self.inbuffer.get(6).copied().unwrap_or(0));
                self.state = ItalkLength;
            },
            ItalkLength => {
                self.length = (self.length + 1) * 2 + 3;
                self.state = ItalkPayload;
            },
            ItalkPayload => {
                let next = self.inbuffer.get(self.inbufptr..self.inbufptr + 2);
                if c == b'>' && next == Some(b"<!".as_slice()) {
                    self.state = ItalkRecognized;
                } else {
                    self.length = self.length.saturating_sub(1);
                    if self.length == 0 {
                        self.state = ItalkDelivered;
                    }
                }
            },
            ItalkDelivered => {
                if c == b'>' {
                    self.state = ItalkRecognized;
                } else {
                    return self.retry(Ground);
                }
            },
            ItalkRecognized => {
                if c == b'<' {
                    self.state = ItalkLeader1;
                } else {
                    return self.retry(Ground);
                }
            },

            GeostarLeader1 => return self.literal(c, b'S', GeostarLeader2),
            GeostarLeader2 => return self.literal(c, b'G', GeostarLeader3),
            GeostarLeader3 => return self.literal(c, b'G', GeostarLeader4),
            GeostarLeader4 => self.state = GeostarMessageId1,
            GeostarMessageId1 => self.state = GeostarMessageId2,
            GeostarMessageId2 => {
                self.length = usize::from(c) * 4;
                self.state = GeostarLength1;
            },
            GeostarLength1 => {
                self.length += (usize::from(c) << 8) * 4;
                if self.length == 0 || self.length > MAX_PACKET_LENGTH {
                    return self.retry(Ground);
                }
                self.state = GeostarLength2;
            },
            GeostarLength2 => self.state = GeostarPayload,
            GeostarPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = GeostarChecksumA;
                }
            },
            GeostarChecksumA => self.state = GeostarChecksumB,
            GeostarChecksumB => self.state = GeostarChecksumC,
            GeostarChecksumC => self.state = GeostarRecognized,
            GeostarRecognized => return self.literal(c, b'P', GeostarLeader1),

            GreisExpected | GreisRecognized => {
                if !c.is_ascii() {
                    return self.retry(Ground);
                }
                match c {
                    b'#' => self.state = CommentBody,
                    b'\n' | b'\r' => {
                        // line ends between messages are dropped
                        self.state = GreisExpected;
                        self.character_discard();
                    },
                    _ => self.state = GreisId1,
                }
            },
            GreisReply1 => return self.literal(c, b'E', GreisReply2),
            GreisId1 => {
                if c.is_ascii() {
                    self.state = GreisId2;
                } else {
                    return self.retry(Ground);
                }
            },
            GreisReply2 | GreisId2 => match hex_value(c) {
                Some(v) => {
                    self.length = v << 8;
                    self.state = GreisLength1;
                },
                None => return self.retry(Ground),
            },
            GreisLength1 => match hex_value(c) {
                Some(v) => {
                    self.length += v << 4;
                    self.state = GreisLength2;
                },
                None => return self.retry(Ground),
            },
            GreisLength2 => match hex_value(c) {
                Some(v) => {
                    self.length += v;
                    if self.length == 0 {
                        return self.retry(Ground);
                    }
                    self.state = GreisPayload;
                },
                None => return self.retry(Ground),
            },
            GreisPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = GreisRecognized;
                }
            },

            JsonLeader => match c {
                b'{' | b'[' => self.json_depth += 1,
                b'}' | b']' => {
                    self.json_depth = self.json_depth.saturating_sub(1);
                    if self.json_depth == 0 {
                        self.state = JsonRecognized;
                    }
                },
                b',' => {},
                b'"' => {
                    self.state = JsonStringLiteral;
                    self.json_after = JsonEndAttribute;
                },
                _ if is_json_space(c) => {},
                _ => {
                    trace!("JSON: non-whitespace in object context");
                    self.state = Ground;
                },
            },
            JsonStringLiteral => match c {
                b'\\' => self.state = JsonStringSolidus,
                b'"' => self.state = self.json_after,
                _ => {},
            },
            JsonStringSolidus => self.state = JsonStringLiteral,
            JsonEndAttribute => match c {
                b':' => self.state = JsonExpectValue,
                _ if is_json_space(c) => {},
                _ => return self.retry(Ground),
            },
            JsonExpectValue => match c {
                b'"' => {
                    self.state = JsonStringLiteral;
                    self.json_after = JsonEndValue;
                },
                b'{' | b'[' => return self.retry(JsonLeader),
                b'-' | b'0'..=b'9' => self.state = JsonNumber,
                b't' | b'f' | b'n' => self.state = JsonSpecial,
                _ if is_json_space(c) => {},
                _ => return self.retry(Ground),
            },
            JsonNumber => {
                if !b"1234567890.eE+-".contains(&c) {
                    return self.retry(JsonEndValue);
                }
            },
            JsonSpecial => {
                if !b"truefalsnil".contains(&c) {
                    return self.retry(JsonEndValue);
                }
            },
            JsonEndValue => match c {
                b'}' | b']' => return self.retry(JsonLeader),
                b',' => self.state = JsonLeader,
                _ if is_json_space(c) => {},
                _ => return self.retry(Ground),
            },
            GtxtRecognized | CommentRecognized | JsonRecognized => {
                // accept leaves these for Ground before the next byte
                return self.retry(Ground);
            },

            SpartnHeader => {
                // message subtype and time tag type sit in byte 4
                if self.inbufptr == 5 {
                    match spartn_frame_len(&self.inbuffer[..5]) {
                        Some(total) if total <= MAX_PACKET_LENGTH => {
                            self.length = total - 5;
                            self.state = SpartnPayload;
                        },
                        _ => {
                            trace!("SPARTN: implausible header, rescanning");
                            self.state = Ground;
                        },
                    }
                }
            },
            SpartnPayload => {
                self.length -= 1;
                if self.length == 0 {
                    self.state = SpartnRecognized;
                }
            },
            SpartnRecognized => {
                if c == SPARTN_PREAMBLE && !self.type_mask.contains(TypeMask::SPARTN) {
                    self.state = SpartnHeader;
                } else {
                    return self.retry(Ground);
                }
            },
        }
        true
    }

    /// Second letter of a two-letter NMEA talker.
    fn single_lead(&mut self, c: u8, allowed: &[u8]) -> bool {
        if allowed.contains(&c) {
            self.state = State::NmeaLeaderEnd;
            true
        } else {
            self.retry(State::Ground)
        }
    }

    fn literal(&mut self, c: u8, expect: u8, next: State) -> bool {
        if c == expect {
            self.state = next;
            true
        } else {
            self.retry(State::Ground)
        }
    }

    /// Packet type a recognized state frames, before validation.
    pub(super) fn recognized_type(state: State) -> Option<PacketType> {
        use State::*;

        Some(match state {
            CommentRecognized => PacketType::Comment,
            NmeaRecognized => PacketType::Nmea,
            AisRecognized => PacketType::Aivdm,
            GtxtRecognized => PacketType::GarminTxt,
            OncoreRecognized => PacketType::Oncore,
            SirfRecognized => PacketType::Sirf,
            SkyRecognized => PacketType::Skytraq,
            Superstar2Recognized => PacketType::Superstar2,
            TsipRecognized => PacketType::Tsip,
            EvermoreRecognized => PacketType::Evermore,
            NavcomRecognized => PacketType::Navcom,
            Rtcm2Recognized => PacketType::Rtcm2,
            Rtcm3Recognized => PacketType::Rtcm3,
            ZodiacRecognized => PacketType::Zodiac,
            UbxRecognized => PacketType::Ubx,
            AllyRecognized => PacketType::Allystar,
            CasicRecognized => PacketType::Casic,
            ItalkRecognized => PacketType::Italk,
            GeostarRecognized => PacketType::Geostar,
            GreisRecognized => PacketType::Greis,
            JsonRecognized => PacketType::Json,
            SpartnRecognized => PacketType::Spartn,
            _ => return None,
        })
    }
}

/// Whole SPARTN frame length from its first five bytes, `None` unless the
/// frame carries a CRC-24Q.
pub(super) fn spartn_frame_len(head: &[u8]) -> Option<usize> {
    let word = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    // preamble 8, type 7, then length 10, eaf 1, crc type 2, frame crc 4
    let pay_len = ((word >> 7) & 0x3ff) as usize;
    let eaf = (word >> 6) & 1;
    let crc_type = (word >> 4) & 0x3;
    if crc_type != 2 {
        return None;
    }
    let time_tag_type = (head[4] >> 3) & 1;
    // the above, then subtype 4, time tag type 1
    let mut bits: usize = 37;
    bits += if time_tag_type == 1 { 32 } else { 16 };
    // solution id and processor id
    bits += 7 + 4;
    if eaf == 1 {
        // encryption id, sequence, auth indicator, embedded auth length
        bits += 4 + 6 + 3 + 3;
    }
    let header = bits.div_ceil(8);
    Some(header + pay_len + crc_type as usize + 1)
}
