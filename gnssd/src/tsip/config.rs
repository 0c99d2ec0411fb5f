//! Receiver setup: I/O options, the per-model configuration sets and the
//! port and protocol switches.

use ::log::{debug, info};

use super::{write, IO1_DP, IO1_ECEF, IO1_LLA, IO1_8F20, IO2_ENU, IO2_VECEF, IO4_DBHZ};
use crate::{
    context::Context,
    driver::{DriverMode, Parity},
    session::Session,
};

/// Receiver family, from the hardware code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    #[default]
    Unknown,
    AcutimeGold,
    ResSmt360,
    IcmSmt360,
    /// RES360 17x22.
    Res360Module,
    /// Lassen iQ, Copernicus, Thunderbolt E, Acutime 360 and the rest.
    Generic,
}

impl Model {
    pub fn from_hardware_code(code: u16) -> Self {
        match code {
            3001 => Self::AcutimeGold,
            3023 => Self::ResSmt360,
            3026 => Self::IcmSmt360,
            3031 => Self::Res360Module,
            _ => Self::Generic,
        }
    }
}

/// Set I/O Options (0x35).
pub(crate) fn io_options(session: &mut Session, ctx: &Context, position: u8, velocity: u8, timing: u8, aux: u8) {
    write(session, ctx, &[0x35, position, velocity, timing, aux]);
}

fn push_f32(packet: &mut Vec<u8>, v: f32) {
    packet.extend_from_slice(&v.to_be_bytes());
}

/// Operating parameters every model gets: 10° elevation mask, AMU mask 6,
/// PDOP mask 8 and PDOP switch 6.
fn masks(packet: &mut Vec<u8>, amu: f32) {
    push_f32(packet, 10f32.to_radians());
    push_f32(packet, amu);
    push_f32(packet, 8.0);
    push_f32(packet, 6.0);
}

/// Bring a receiver of `model` to a known state.
pub fn configure(session: &mut Session, ctx: &Context, model: Model) {
    if ctx.readonly || ctx.passive {
        return;
    }
    info!("TSIP: configuring as {model:?}");
    match model {
        Model::AcutimeGold => acutime_gold(session, ctx),
        Model::ResSmt360 | Model::IcmSmt360 | Model::Res360Module => res360(session, ctx),
        Model::Generic | Model::Unknown => generic(session, ctx),
    }
}

fn generic(session: &mut Session, ctx: &Context) {
    io_options(session, ctx, IO1_8F20 | IO1_DP | IO1_LLA, IO2_ENU, 0x00, IO4_DBHZ);
    // software version, answered by 0x45
    write(session, ctx, &[0x1f]);
    write(session, ctx, &[0x21]);

    // operating parameters, dynamics land
    let mut params = vec![0x2c, 0x01];
    masks(&mut params, 6.0);
    write(session, ctx, &params);

    // automatic 2D/3D
    write(session, ctx, &[0x22, 0x00]);
    write(session, ctx, &[0x28]);
    // last position and velocity
    write(session, ctx, &[0x37]);
    // output datum
    write(session, ctx, &[0x8e, 0x15]);
    write(session, ctx, &[0xbb, 0x00]);
}

fn acutime_gold(session: &mut Session, ctx: &Context) {
    write(session, ctx, &[0x1c, 0x01]);

    // self-survey on, save position, 2000 fixes, worst uncertainties
    let mut survey = vec![0x8e, 0xa9, 0x01, 0x01];
    survey.extend_from_slice(&2000u32.to_be_bytes());
    push_f32(&mut survey, 100.0);
    push_f32(&mut survey, 100.0);
    write(session, ctx, &survey);

    // PPS always on
    write(session, ctx, &[0x8e, 0x4e, 0x02]);

    // overdetermined clock, dynamics and solution mode default
    let mut primary = vec![0xbb, 0x00, 0x07, 0xff, 0x01, 0x01];
    masks(&mut primary, 4.0);
    primary.extend_from_slice(&[0xff, 0x00]);
    primary.extend_from_slice(&0xffffu16.to_be_bytes());
    primary.extend_from_slice(&0x0000u16.to_be_bytes());
    for _ in 0..4 {
        primary.extend_from_slice(&u32::MAX.to_be_bytes());
    }
    write(session, ctx, &primary);

    // broadcast mask: defaults plus 0x8f-ab and 0x8f-ac
    let mut broadcast = vec![0x8e, 0xa5];
    broadcast.extend_from_slice(&0x32e1u16.to_be_bytes());
    broadcast.extend_from_slice(&[0x00, 0x00]);
    write(session, ctx, &broadcast);
}

fn res360(session: &mut Session, ctx: &Context) {
    let mut broadcast = vec![0x8e, 0xa5];
    broadcast.extend_from_slice(&0x0045u16.to_be_bytes());
    broadcast.extend_from_slice(&0x0000u16.to_be_bytes());
    write(session, ctx, &broadcast);

    // timing from 0x8e-a2
    io_options(session, ctx, IO1_DP | IO1_LLA | IO1_ECEF, IO2_VECEF | IO2_ENU, 0x01, IO4_DBHZ);
}

/// Set Port Configuration (0xBC) on the current port, TSIP both ways.
pub fn speed_switch(session: &mut Session, ctx: &Context, speed: u32, parity: Parity, stopbits: u8) -> bool {
    let rate = ((f64::from(speed) / 300.0).log2().round() + 2.0) as u8;
    let parity = match parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
    };
    debug!("TSIP: port to {speed} baud, code {rate}");
    write(
        session,
        ctx,
        &[0xbc, 0xff, rate, rate, 3, parity, stopbits.saturating_sub(1), 0, 0x02, 0x02, 0],
    );
    true
}

/// Switch the current port to NMEA output. Binary needs no command, the
/// speed switch already selects TSIP.
pub fn mode_switch(session: &mut Session, ctx: &Context, mode: DriverMode) {
    match mode {
        DriverMode::Nmea => {
            // GGA, GSA and GSV every second, GST on
            write(session, ctx, &[0x7a, 0x00, 0x01, 0x00, 0x00, 0x01, 0x19]);
            // 4800 8N1, TSIP in, NMEA out
            write(session, ctx, &[0x8c, 0xff, 0x06, 0x06, 0x03, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00]);
        },
        DriverMode::Binary => debug!("TSIP: already binary"),
    }
}
