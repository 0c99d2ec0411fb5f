//! Wire constants shared by the lexer and the drivers.

/// Largest frame any supported protocol may produce.
pub const MAX_PACKET_LENGTH: usize = 9216;

/// Capacity of the lexer input buffer.
pub const INPUT_BUFFER_LENGTH: usize = MAX_PACKET_LENGTH * 2 + 1;

/// Upper bound on satellites kept in one view.
pub const MAXCHANNELS: usize = 184;

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const DLE: u8 = 0x10;

pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
pub const UBX_SYNC_CHAR_2: u8 = 0x62;
pub const UBX_HEADER_LEN: usize = 6;
pub const UBX_CHECKSUM_LEN: usize = 2;
/// Bytes a UBX frame adds around its payload.
pub const UBX_FRAME_OVERHEAD: usize = UBX_HEADER_LEN + UBX_CHECKSUM_LEN;

pub const ALLY_SYNC_CHAR_1: u8 = 0xf1;
pub const ALLY_SYNC_CHAR_2: u8 = 0xd9;

pub const CASIC_SYNC_CHAR_1: u8 = 0xba;
pub const CASIC_SYNC_CHAR_2: u8 = 0xce;
pub const CASIC_MAX_PAYLOAD: usize = 2048;

pub const SIRF_SYNC_CHAR_1: u8 = 0xa0;
pub const SIRF_SYNC_CHAR_2: u8 = 0xa2;
pub const SIRF_TRAILER_1: u8 = 0xb0;
pub const SIRF_TRAILER_2: u8 = 0xb3;
pub const SKYTRAQ_SYNC_CHAR_2: u8 = 0xa1;

pub const RTCM3_SYNC_CHAR: u8 = 0xd3;
pub const SPARTN_PREAMBLE: u8 = 0x73;

pub const NMEA_SYNC_CHAR: u8 = b'$';
pub const AIS_SYNC_CHAR: u8 = b'!';
pub const NMEA_END_CHAR_1: u8 = b'\r';
pub const NMEA_END_CHAR_2: u8 = b'\n';

/// TSIP frames longer than this many payload bytes are treated as noise.
pub const TSIP_MAX_PACKET: usize = 255;

/// Shortest Garmin text sentence accepted by the lexer.
pub const GARMINTXT_MIN_LENGTH: usize = 57;
