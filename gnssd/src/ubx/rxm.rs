//! RXM: raw measurements, navigation subframes and correction status.

use ::log::{debug, info, trace, warn};

use crate::{
    bits::BitReader,
    constants::MAXCHANNELS,
    context::Context,
    error::Result,
    fix::RawMeasurement,
    gnss::{sigid_name, sigid_obs, GnssId},
    mask::Mask,
    session::Session,
    subframe,
};

use super::set_itow;

/// SPARTN message types, for the logs.
fn spartn_type(msg_type: u16) -> &'static str {
    match msg_type {
        0 => "OCB",
        1 => "HPAC",
        2 => "GAD",
        3 => "BPAC",
        4 => "EAS",
        120 => "Proprietary",
        _ => "Unk",
    }
}

pub(super) fn cor(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    if version != 1 {
        warn!("UBX: RXM-COR, unknown version {version}");
        return Ok(Mask::empty());
    }
    let msg_type = buf.le_u16(8)?;
    debug!(
        "UBX: RXM-COR: ebno {} statusInfo x{:x} msgType {msg_type} ({}) msgSubType {}",
        buf.u8(1)?,
        buf.le_u32(4)?,
        spartn_type(msg_type),
        buf.le_u16(10)?
    );
    Ok(Mask::empty())
}

/// Multi-GNSS raw measurements. `rcvTow` is receiver time, close to but
/// not the iTOW of the epoch, so the packet time tag stays unset.
pub(super) fn rawx(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let rcv_tow = buf.le_f64(0)?;
    let week = buf.le_u16(8)?;
    let leap = buf.i8(10)?;
    let num_meas = usize::from(buf.u8(11)?);
    let rec_stat = buf.u8(12)?;
    debug!(
        "UBX: RXM-RAWX: rcvTow {rcv_tow} week {week} leapS {leap} numMeas {num_meas} recStat {rec_stat} version {}",
        buf.u8(13)?
    );

    if rec_stat & 0x01 != 0 {
        ctx.set_leap_seconds(i32::from(leap));
    }
    // RINEX wants GPS time, no leap seconds
    let raw = &mut session.gpsdata.raw;
    raw.mtime = ctx.gpstime(u32::from(week), rcv_tow);
    raw.meas.clear();

    if num_meas > MAXCHANNELS {
        warn!("UBX: RXM-RAWX: too many measurements ({num_meas})");
        return Ok(Mask::empty());
    }
    for i in 0..num_meas {
        let off = 32 * i;
        let pr = buf.le_f64(off + 16)?;
        let cp = buf.le_f64(off + 24)?;
        let gnssid = buf.u8(off + 36)?;
        let sigid = buf.u8(off + 38)?;
        let locktime = buf.le_u16(off + 40)?;
        let cp_stdev = buf.u8(off + 44)? & 0x0f;
        let trk_stat = buf.u8(off + 46)?;
        let meas = RawMeasurement {
            gnssid,
            svid: buf.u8(off + 37)?,
            sigid,
            freqid: buf.u8(off + 39)?,
            snr: buf.u8(off + 42)?,
            lli: if locktime == 0 { 2 } else { 0 },
            obs_code: sigid_obs(gnssid, sigid).to_owned(),
            pseudorange: if trk_stat & 0x01 != 0 { pr } else { f64::NAN },
            // RTKLIB draws the line at the same stdev
            carrierphase: if trk_stat & 0x02 != 0 && cp_stdev <= 5 { cp } else { f64::NAN },
            doppler: f64::from(buf.le_f32(off + 32)?),
            locktime: u32::from(locktime),
        };
        trace!(
            "UBX: RXM-RAWX: {}:{}:{} ({}) prMes {} cpMes {} doMes {} cno {} trkStat x{trk_stat:x}",
            meas.gnssid,
            meas.svid,
            meas.sigid,
            sigid_name(gnssid, sigid),
            pr,
            cp,
            meas.doppler,
            meas.snr
        );
        raw.meas.push(meas);
    }
    Ok(Mask::RAW | Mask::RAW_IS)
}

/// Raw GPS subframes, u-blox 7 raw firmware only. Parity is already
/// stripped, but bad words still get through.
pub(super) fn sfrb(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let chan = buf.u8(0)?;
    let svid = buf.u8(1)?;
    debug!("UBX: RXM-SFRB: chan {chan} svid {svid}");
    let mut words = [0u32; 10];
    for (i, w) in words.iter_mut().enumerate() {
        *w = buf.le_u32(2 + 4 * i)? & 0x00ff_ffff;
    }
    Ok(publish(session, subframe::decode(ctx, GnssId::Gps, svid, &words)))
}

/// Raw navigation words as broadcast, any constellation.
pub(super) fn sfrbx(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let gnss_id = buf.u8(0)?;
    let sv_id = buf.u8(1)?;
    let sig_id = buf.u8(2)?;
    let num_words = usize::from(buf.u8(4)?);
    let version = buf.u8(6)?;
    debug!(
        "UBX: RXM-SFRBX: version {version} gnssId {gnss_id} svId {sv_id} sigId {sig_id} ({}) freqId {} chn {} words {num_words}",
        sigid_name(gnss_id, sig_id),
        buf.u8(3)?,
        buf.u8(5)?
    );
    if !(1..=2).contains(&version) {
        warn!("UBX: RXM-SFRBX: unknown version {version}");
        return Ok(Mask::empty());
    }
    if num_words > 16 || buf.len() != 8 + 4 * num_words {
        warn!(
            "UBX: RXM-SFRBX: wrong payload len {}, numWords {num_words} s/b {}",
            buf.len(),
            8 + 4 * num_words
        );
        return Ok(Mask::empty());
    }
    let words = (0..num_words)
        .map(|i| buf.le_u32(8 + 4 * i))
        .collect::<Result<Vec<_>>>()?;
    let sf = subframe::decode_raw(ctx, &mut session.nav, gnss_id, sv_id, &words);
    Ok(publish(session, sf))
}

fn publish(session: &mut Session, sf: Option<subframe::Subframe>) -> Mask {
    match sf {
        Some(sf) => {
            session.gpsdata.subframe = Some(sf);
            Mask::SUBFRAME
        },
        None => Mask::empty(),
    }
}

pub(super) fn spartn(_session: &mut Session, _ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let version = buf.u8(0)?;
    if version != 1 {
        warn!("UBX: RXM-SPARTN, unknown version {version}");
        return Ok(Mask::empty());
    }
    let flags = buf.u8(1)?;
    let msg_type = buf.le_u16(6)?;
    debug!(
        "UBX: RXM-SPARTN: flags x{flags:x} msgType {msg_type} ({}) msgSubType {}",
        spartn_type(msg_type),
        buf.le_u16(2)?
    );
    Ok(Mask::empty())
}

pub(super) fn svsi(session: &mut Session, ctx: &mut Context, buf: &BitReader<'_>) -> Result<Mask> {
    let itow = set_itow(session, buf, 0)?;
    ctx.gps_week = buf.le_u16(4)?;
    info!(
        "UBX: RXM-SVSI: iTOW {itow} week {} numVis {} numSV {}",
        ctx.gps_week,
        buf.u8(6)?,
        buf.u8(7)?
    );
    Ok(Mask::empty())
}

#[cfg(test)]
mod tests {
    use crate::{
        mask::Mask,
        subframe::{tests::encode, Body},
        ubx::{
            id::*,
            tests::{run, ubx_session},
        },
    };

    fn rawx_payload(meas: &[(u8, u8, u8, u16, u8, u8)]) -> Vec<u8> {
        let mut p = vec![0u8; 16 + 32 * meas.len()];
        p[0..8].copy_from_slice(&345_600.5f64.to_le_bytes());
        p[8..10].copy_from_slice(&2300u16.to_le_bytes());
        p[10] = 18;
        p[11] = meas.len() as u8;
        p[12] = 0x01;
        p[13] = 1;
        for (i, &(gnss, sv, sig, lock, cp_stdev, trk)) in meas.iter().enumerate() {
            let off = 32 * i;
            p[off + 16..off + 24].copy_from_slice(&21_000_123.25f64.to_le_bytes());
            p[off + 24..off + 32].copy_from_slice(&110_000_000.5f64.to_le_bytes());
            p[off + 32..off + 36].copy_from_slice(&(-1234.5f32).to_le_bytes());
            p[off + 36] = gnss;
            p[off + 37] = sv;
            p[off + 38] = sig;
            p[off + 40..off + 42].copy_from_slice(&lock.to_le_bytes());
            p[off + 42] = 42;
            p[off + 44] = cp_stdev;
            p[off + 46] = trk;
        }
        p
    }

    #[test]
    fn rawx_measurements() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let p = rawx_payload(&[(0, 7, 3, 5000, 2, 0x03), (6, 4, 2, 0, 9, 0x03), (2, 11, 0, 100, 0, 0x02)]);
        let mask = run(&mut session, &mut ctx, RXM_RAWX, &p);
        assert!(mask.contains(Mask::RAW | Mask::RAW_IS));
        assert!(ctx.leap_valid());
        assert_eq!(ctx.leap_seconds, 18);
        let raw = &session.gpsdata.raw;
        // no leap seconds applied
        assert_eq!(
            raw.mtime.unwrap().to_rfc3339(),
            "2024-02-08T00:00:00.500+00:00"
        );
        assert_eq!(raw.meas.len(), 3);

        let gps = &raw.meas[0];
        assert_eq!(gps.obs_code, "C2L");
        assert_eq!(gps.pseudorange, 21_000_123.25);
        assert_eq!(gps.carrierphase, 110_000_000.5);
        assert_eq!(gps.doppler, -1234.5);
        assert_eq!(gps.snr, 42);
        assert_eq!(gps.lli, 0);

        let glo = &raw.meas[1];
        assert_eq!(glo.obs_code, "C2C");
        assert!(glo.carrierphase.is_nan());
        assert_eq!(glo.lli, 2);

        let gal = &raw.meas[2];
        assert!(gal.pseudorange.is_nan());
        assert_eq!(gal.carrierphase, 110_000_000.5);
    }

    #[test]
    fn rawx_too_many_measurements() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = rawx_payload(&[]);
        p[11] = 200;
        let mask = run(&mut session, &mut ctx, RXM_RAWX, &p);
        assert!(!mask.contains(Mask::RAW_IS));
        assert!(session.gpsdata.raw.meas.is_empty());
    }

    fn subframe1() -> [u32; 10] {
        let mut w = [0u32; 10];
        w[0] = 0x74 << 16;
        w[1] = 15_000 << 7 | 1 << 2;
        w[2] = 252 << 14;
        w
    }

    #[test]
    fn sfrb_decodes_gps_subframe() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![3u8, 12];
        for w in subframe1() {
            // the top byte is undefined
            p.extend_from_slice(&(w | 0xaa00_0000).to_le_bytes());
        }
        let mask = run(&mut session, &mut ctx, RXM_SFRB, &p);
        assert!(mask.contains(Mask::SUBFRAME));
        assert_eq!(ctx.gps_week, 2300);
    }

    #[test]
    fn sfrbx_hands_raw_words_to_decoder() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let words = encode(&subframe1());
        let mut p = vec![0u8, 12, 0, 0, 10, 0, 2, 0];
        for w in words {
            p.extend_from_slice(&w.to_le_bytes());
        }
        let mask = run(&mut session, &mut ctx, RXM_SFRBX, &p);
        assert!(mask.contains(Mask::SUBFRAME));
        assert_eq!(ctx.gps_week, 2300);
        assert_eq!(session.gpsdata.subframe.as_ref().unwrap().tsvid, 12);
    }

    #[test]
    fn sfrbx_rejects_bad_framing() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![0u8, 12, 0, 0, 10, 0, 3, 0];
        p.extend_from_slice(&[0u8; 40]);
        assert!(!run(&mut session, &mut ctx, RXM_SFRBX, &p).contains(Mask::SUBFRAME));
        // version ok, length disagrees with numWords
        p[6] = 1;
        p.truncate(44);
        assert!(!run(&mut session, &mut ctx, RXM_SFRBX, &p).contains(Mask::SUBFRAME));
    }

    #[test]
    fn sfrbx_galileo_word_is_kept_in_session() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = vec![2u8, 11, 1, 0, 8, 0, 2, 0];
        let mut words = [0u32; 8];
        // word type 6, GST-UTC
        words[0] = 6 << 24;
        for w in words {
            p.extend_from_slice(&w.to_le_bytes());
        }
        let mask = run(&mut session, &mut ctx, RXM_SFRBX, &p);
        assert!(mask.contains(Mask::SUBFRAME));
        assert_eq!(session.nav.gal_last_word, Some(6));
        assert_eq!(session.gpsdata.subframe.as_ref().unwrap().body, Body::Empty);
    }

    #[test]
    fn svsi_sets_week_and_itow() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = 86_400_000u32.to_le_bytes().to_vec();
        p.extend_from_slice(&2301u16.to_le_bytes());
        p.extend_from_slice(&[9, 24]);
        assert!(!run(&mut session, &mut ctx, RXM_SVSI, &p).contains(Mask::SUBFRAME));
        assert_eq!(ctx.gps_week, 2301);
        assert_eq!(session.ubx().itow, 86_400_000);
    }

    #[test]
    fn cor_and_spartn_need_version_1() {
        let (mut session, mut ctx) = ubx_session();
        ctx.readonly = true;
        let mut p = [0u8; 12];
        p[0] = 1;
        assert_eq!(run(&mut session, &mut ctx, RXM_COR, &p), Mask::ONLINE);
        p[0] = 2;
        assert_eq!(run(&mut session, &mut ctx, RXM_SPARTN, &p[..8]), Mask::ONLINE);
    }
}
