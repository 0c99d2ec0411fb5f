//! UBX-MON: receiver monitoring. Version identification lives here, the
//! rest is antenna state and port statistics.

use ::log::{debug, info, warn};

use crate::{
    bits::BitReader, context::Context, error::Result, fix::AntennaStatus, mask::Mask, session::Session,
};

/// Software version prefixes of receivers too old to report `PROTVER`,
/// with the protocol version they speak.
const FW_PROTVER: [(&str, u8); 12] = [
    ("2.10", 8),
    ("2.11", 8),
    ("3.04", 9),
    ("4.00", 10),
    ("4.01", 10),
    ("5.00", 11),
    ("6.00", 12),
    ("6.02", 12),
    ("7.01", 13),
    ("7.03", 13),
    ("1.00", 14),
    ("2.01", 15),
];

/// Port names as used by MON-RXBUF and MON-TXBUF.
const TARGETS: [&str; 6] = ["DDC", "UART1", "UART2", "USB", "SPI", "Reserved"];

fn antenna_status(raw: u8) -> AntennaStatus {
    match raw {
        2 => AntennaStatus::Ok,
        3 => AntennaStatus::Short,
        4 => AntennaStatus::Open,
        _ => AntennaStatus::Unknown,
    }
}

/// Antenna power as the fix model keeps it: `0` off, `1` on, `-1` unknown.
fn antenna_power(raw: u8) -> i32 {
    match raw {
        0 => 0,
        1 => 1,
        _ => -1,
    }
}

/// Force an extra report when anything about the antenna is known.
fn antenna_report(session: &Session) -> Mask {
    let fix = &session.newdata;
    if fix.jam > 0 || fix.antenna != AntennaStatus::Unknown || fix.antenna_power >= 0 {
        Mask::REPORT_IS
    } else {
        Mask::empty()
    }
}

/// Iterator over the 30 byte extension strings of MON-VER.
#[derive(Debug, Clone)]
pub struct VersionExtensions<'a> {
    data: &'a [u8],
}

impl<'a> VersionExtensions<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Iterator for VersionExtensions<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 30 {
            return None;
        }
        let (chunk, rest) = self.data.split_at(30);
        self.data = rest;
        BitReader::new(chunk).string(0, 30).ok()
    }
}

/// Leading decimal integer of `s`.
fn leading_int(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Protocol version from the MON-VER extensions, or from the firmware
/// version of receivers that predate `PROTVER`.
pub fn protver_of(software: &str, extensions: &str) -> u8 {
    let tagged = extensions
        .find("PROTVER=")
        .or_else(|| extensions.find("PROTVER "))
        .and_then(|at| leading_int(&extensions[at + 8..]))
        .filter(|&v| v > 7);
    if let Some(v) = tagged {
        return u8::try_from(v).unwrap_or(u8::MAX);
    }
    FW_PROTVER
        .iter()
        .find(|(prefix, _)| software.starts_with(prefix))
        .map_or(1, |&(_, protver)| protver)
}

/// Receiver and firmware version.
pub(super) fn ver(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let software = buf.string(0, 30)?;
    let hardware = buf.string(30, 10)?;
    let extensions = VersionExtensions::new(buf.as_slice().get(40..).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",");

    session.subtype = format!("SW {software},HW {hardware}");
    session.subtype1 = extensions;

    let found = protver_of(&software, &session.subtype1);
    let state = session.ubx();
    // a version learned from the message table is only a floor
    if found > 1 || state.protver == 0 {
        state.protver = found;
    }
    let protver = state.protver;
    info!("UBX: MON-VER: {} {} PROTVER {protver}", session.subtype, session.subtype1);
    Ok(Mask::DEVICEID)
}

/// Port statistics, protocol 27 and up.
pub(super) fn comms(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    if version != 0 {
        warn!("UBX: MON-COMMS unknown version {version}");
        return Ok(Mask::empty());
    }
    let ports = usize::from(buf.u8(1)?);
    if 8 + ports * 40 > buf.len() {
        warn!("UBX: MON-COMMS runt {} for {ports} ports", buf.len());
        return Ok(Mask::empty());
    }
    debug!(
        "UBX: MON-COMMS ports {ports} txErrors {:#x} protIds {:?}",
        buf.u8(2)?,
        buf.bytes(3, 4)?
    );
    for i in 0..ports {
        let off = 8 + i * 40;
        debug!(
            "UBX: MON-COMMS port {:#06x} txPending {} txBytes {} txUsage {}% rxPending {} rxBytes {} rxUsage {}% overrun {} msgs {} skipped {}",
            buf.le_u16(off)?,
            buf.le_u16(off + 2)?,
            buf.le_u32(off + 4)?,
            buf.u8(off + 8)?,
            buf.le_u16(off + 10)?,
            buf.le_u32(off + 12)?,
            buf.u8(off + 16)?,
            buf.le_u16(off + 18)?,
            buf.le_u32(off + 20)?,
            buf.le_u32(off + 36)?
        );
    }
    Ok(Mask::empty())
}

/// Hardware status of protocol 26 and older: antenna and jamming.
pub(super) fn hw(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let a_status = buf.u8(20)?;
    let a_power = buf.u8(21)?;
    let jam = match buf.len() {
        68 => buf.u8(53)?,
        60 => buf.u8(45)?,
        _ => 0,
    };
    let fix = &mut session.newdata;
    fix.jam = i32::from(jam);
    fix.antenna = antenna_status(a_status);
    fix.antenna_power = antenna_power(a_power);
    debug!(
        "UBX: MON-HW noisePerMS {} agcCnt {} aStatus {a_status} aPower {a_power} flags {:#x} jamInd {jam}",
        buf.le_u16(16)?,
        buf.le_u16(18)?,
        buf.u8(22)?
    );
    Ok(antenna_report(session))
}

/// One RF block of MON-RF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfBlock {
    pub block_id: u8,
    pub antenna: u8,
    pub power: u8,
    pub post_status: u32,
    pub agc_count: u16,
    /// CW jamming indicator, `None` in the short layout.
    pub jam: Option<u8>,
}

/// Iterator over the RF blocks of MON-RF. Blocks are 24 bytes, or 20 in
/// the short layout some firmware sends.
#[derive(Debug, Clone)]
pub struct RfBlocks<'a> {
    buf: BitReader<'a>,
    size: usize,
    offset: usize,
}

impl<'a> RfBlocks<'a> {
    /// `None` unless the payload splits evenly into blocks of a known size.
    pub fn new(buf: BitReader<'a>) -> Option<Self> {
        let count = usize::from(buf.u8(1).ok()?);
        if count == 0 || buf.len() < 4 {
            return None;
        }
        let size = (buf.len() - 4) / count;
        if 4 + size * count != buf.len() || !matches!(size, 20 | 24) {
            return None;
        }
        Some(Self { buf, size, offset: 4 })
    }

    fn block(&self, off: usize) -> Result<RfBlock> {
        let b = &self.buf;
        Ok(if self.size == 24 {
            RfBlock {
                block_id: b.u8(off)?,
                antenna: b.u8(off + 2)?,
                power: b.u8(off + 3)?,
                post_status: b.le_u32(off + 4)?,
                agc_count: b.le_u16(off + 14)?,
                jam: Some(b.u8(off + 16)?),
            }
        } else {
            RfBlock {
                block_id: b.u8(off)?,
                antenna: b.u8(off + 1)?,
                power: b.u8(off + 2)?,
                post_status: b.le_u32(off + 4)?,
                agc_count: b.le_u16(off + 14)?,
                jam: None,
            }
        })
    }
}

impl Iterator for RfBlocks<'_> {
    type Item = RfBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }
        let block = self.block(self.offset).ok()?;
        self.offset += self.size;
        Some(block)
    }
}

/// RF information, protocol 27 and up. The worst antenna state and the
/// highest jamming indication over all blocks win.
pub(super) fn rf(session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    if version != 0 {
        warn!("UBX: MON-RF unknown version {version}");
        return Ok(Mask::empty());
    }
    let Some(blocks) = RfBlocks::new(*buf) else {
        warn!("UBX: MON-RF bad length {} for {} blocks", buf.len(), buf.u8(1)?);
        return Ok(Mask::empty());
    };
    let fix = &mut session.newdata;
    for block in blocks {
        debug!(
            "UBX: MON-RF block {} antStatus {} antPower {} postStatus {} agc {:.1}%",
            block.block_id,
            block.antenna,
            block.power,
            block.post_status,
            f64::from(block.agc_count) / 81.91
        );
        let antenna = antenna_status(block.antenna);
        if matches!(fix.antenna, AntennaStatus::Unknown | AntennaStatus::Ok) && antenna != AntennaStatus::Unknown {
            fix.antenna = antenna;
        }
        fix.antenna_power = antenna_power(block.power);
        if let Some(jam) = block.jam {
            fix.jam = fix.jam.max(i32::from(jam));
        }
    }
    Ok(antenna_report(session))
}

fn log_buffers(name: &str, buf: &BitReader<'_>) -> Result<()> {
    for (i, target) in TARGETS.iter().enumerate() {
        debug!(
            "UBX: {name} {target} pending {} usage {}% peak {}%",
            buf.le_u16(i * 2)?,
            buf.u8(12 + i)?,
            buf.u8(18 + i)?
        );
    }
    Ok(())
}

pub(super) fn rxbuf(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.len() != 24 {
        warn!("UBX: MON-RXBUF bad length {}", buf.len());
        return Ok(Mask::empty());
    }
    log_buffers("MON-RXBUF", buf)?;
    Ok(Mask::empty())
}

pub(super) fn txbuf(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    if buf.len() != 28 {
        warn!("UBX: MON-TXBUF bad length {}", buf.len());
        return Ok(Mask::empty());
    }
    log_buffers("MON-TXBUF", buf)?;
    let errors = buf.u8(26)?;
    debug!(
        "UBX: MON-TXBUF tUsage {}% tPeakUsage {}% errors {errors:#04x}",
        buf.u8(24)?,
        buf.u8(25)?
    );
    if errors & 0x40 != 0 {
        warn!("UBX: MON-TXBUF buffer full, output dropped");
    }
    Ok(Mask::empty())
}
