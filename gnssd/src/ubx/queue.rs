//! Staged configuration after identification.
//!
//! Some u-blox parts drop configuration that arrives in a burst, so the
//! driver spreads it over the first [`QUEUE_END`] UBX packets it receives.
//! [`Session::queue`] counts those packets and [`SCHEDULE`] says what goes
//! out at each count. Which messages a step actually sends depends on the
//! protocol version and on passive mode; see [`ConfigStep::commands`].

use ::log::{trace, warn};

use super::{
    cfg::{send_msg_rate, CfgMsg},
    write, CLASS_MON, CLASS_NAV, CLASS_NMEA, CLASS_SEC,
};
use crate::{context::Context, session::Session};

/// The queue stops running at this count.
pub const QUEUE_END: u32 = 100;

/// Common UBX-NAV messages, wanted whatever the version.
const NAV_ON: [u8; 3] = [
    0x04, // DOP
    0x20, // TIMEGPS
    0x22, // CLOCK
];

/// NAV messages of protocol 14 and older.
const NAV_ON_14: [u8; 2] = [
    0x06, // SOL
    0x30, // SVINFO
];

/// NAV messages of protocol 15 and newer.
const NAV_ON_15: [u8; 5] = [
    0x01, // POSECEF
    0x07, // PVT
    0x11, // VELECEF
    0x35, // SAT
    0x43, // SIG
];

/// NMEA sentences silenced once UBX output flows.
pub const NMEA_OFF: [u8; 9] = [
    0x00, // GGA
    0x01, // GLL
    0x02, // GSA
    0x03, // GSV
    0x04, // RMC
    0x05, // VTG
    0x07, // GST
    0x08, // ZDA
    0x09, // GBS
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    /// Common NAV messages, so there are packets to drive the queue.
    EnableNav,
    /// MON-VER again, if no answer came yet.
    PollVersion,
    /// The NAV set that fits the protocol version.
    EnableNavSet,
    /// Silence the `n`th entry of [`NMEA_OFF`].
    DisableNmea(u8),
    EnableEndOfEpoch,
    /// NAV-TIMELS, at a low rate.
    EnableLeapSeconds,
    PollUniqueId,
    /// MON-HW on old parts, MON-RF on new.
    EnableMonitor,
    /// NAV set a protocol 14 receiver does not have.
    DisableNewNav,
    /// NAV set a protocol 15 to 26 receiver deprecates.
    DisableOldNav,
    /// Port buffer statistics.
    PollBuffers,
}

/// Queue count at which each step runs, in order.
#[rustfmt::skip]
pub static SCHEDULE: [(u32, ConfigStep); 19] = [
    (0, ConfigStep::EnableNav),
    (10, ConfigStep::PollVersion),
    (20, ConfigStep::EnableNavSet),
    (50, ConfigStep::DisableNmea(0)),
    (53, ConfigStep::DisableNmea(1)),
    (56, ConfigStep::DisableNmea(2)),
    (59, ConfigStep::DisableNmea(3)),
    (62, ConfigStep::DisableNmea(4)),
    (65, ConfigStep::DisableNmea(5)),
    (68, ConfigStep::DisableNmea(6)),
    (71, ConfigStep::DisableNmea(7)),
    (71, ConfigStep::EnableEndOfEpoch),
    (74, ConfigStep::DisableNmea(8)),
    (75, ConfigStep::EnableLeapSeconds),
    (80, ConfigStep::PollUniqueId),
    (83, ConfigStep::EnableMonitor),
    (87, ConfigStep::DisableNewNav),
    (90, ConfigStep::DisableOldNav),
    (93, ConfigStep::PollBuffers),
];

/// What the receiver is known to be, as far as the queue cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditions {
    pub protver: u8,
    pub passive: bool,
    /// MON-VER already answered.
    pub have_version: bool,
}

/// One UBX message to send: class, id, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CFG-MSG setting a message rate.
    Rate(CfgMsg),
    /// Empty-payload poll of `(class, id)`.
    Poll(u8, u8),
}

fn rates(class: u8, ids: &[u8], rate: u8) -> impl Iterator<Item = Command> + '_ {
    ids.iter()
        .map(move |&id| Command::Rate(CfgMsg::set_rate_for(class, id, rate)))
}

impl ConfigStep {
    /// Messages this step sends under `c`. Empty when the step does not
    /// apply.
    pub fn commands(self, c: Conditions) -> Vec<Command> {
        let configure = !c.passive;
        match self {
            Self::EnableNav if configure => rates(CLASS_NAV, &NAV_ON, 1).collect(),
            Self::PollVersion if !c.have_version => vec![Command::Poll(CLASS_MON, 0x04)],
            Self::EnableNavSet if configure && c.protver < 15 => rates(CLASS_NAV, &NAV_ON_14, 1).collect(),
            Self::EnableNavSet if configure => rates(CLASS_NAV, &NAV_ON_15, 1).collect(),
            Self::DisableNmea(n) if configure => NMEA_OFF
                .get(usize::from(n))
                .map(|&id| Command::Rate(CfgMsg::set_rate_for(CLASS_NMEA, id, 0)))
                .into_iter()
                .collect(),
            Self::EnableEndOfEpoch if configure && c.protver >= 15 => {
                vec![Command::Rate(CfgMsg::set_rate_for(CLASS_NAV, 0x61, 1))]
            },
            Self::EnableLeapSeconds if configure && c.protver >= 15 => {
                vec![Command::Rate(CfgMsg::set_rate_for(CLASS_NAV, 0x26, 0xff))]
            },
            Self::PollUniqueId if c.protver >= 18 => vec![Command::Poll(CLASS_SEC, 0x03)],
            Self::EnableMonitor if configure && c.protver < 27 => {
                vec![Command::Rate(CfgMsg::set_rate_for(CLASS_MON, 0x09, 4))]
            },
            Self::EnableMonitor if configure => vec![Command::Rate(CfgMsg::set_rate_for(CLASS_MON, 0x38, 4))],
            Self::DisableNewNav if configure && c.protver < 15 => rates(CLASS_NAV, &NAV_ON_15, 0).collect(),
            Self::DisableOldNav if configure && (15..27).contains(&c.protver) => {
                rates(CLASS_NAV, &NAV_ON_14, 0).collect()
            },
            Self::PollBuffers if c.protver < 27 => vec![
                Command::Poll(CLASS_MON, 0x08),
                Command::Poll(CLASS_MON, 0x07),
            ],
            Self::PollBuffers => vec![Command::Poll(CLASS_MON, 0x36)],
            _ => Vec::new(),
        }
    }
}

/// Steps due at queue count `queue`.
pub fn due(queue: u32) -> impl Iterator<Item = ConfigStep> {
    SCHEDULE
        .iter()
        .filter(move |(at, _)| *at == queue)
        .map(|&(_, step)| step)
}

/// Run the steps due now and advance the count. Does nothing when
/// read-only, once the queue has finished or while the version is unknown.
pub(crate) fn run(session: &mut Session, ctx: &Context) {
    let protver = session.ubx().protver;
    if ctx.readonly || session.queue >= QUEUE_END || protver == 0 {
        return;
    }
    let c = Conditions {
        protver,
        passive: ctx.passive,
        have_version: !session.subtype.is_empty(),
    };
    for step in due(session.queue) {
        trace!("UBX: queue {} {step:?}", session.queue);
        for command in step.commands(c) {
            let sent = match command {
                Command::Rate(msg) => send_msg_rate(session, ctx, msg),
                Command::Poll(class, id) => write(session, ctx, class, id, &[]),
            };
            if !sent {
                warn!("UBX: queue {} {step:?} not sent", session.queue);
            }
        }
    }
    session.queue += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW: Conditions = Conditions {
        protver: 27,
        passive: false,
        have_version: true,
    };

    #[test]
    fn schedule_is_ordered() {
        assert!(SCHEDULE.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(SCHEDULE.iter().all(|(at, _)| *at < QUEUE_END));
    }

    #[test]
    fn every_nmea_sentence_is_silenced() {
        let n = SCHEDULE
            .iter()
            .filter(|(_, s)| matches!(s, ConfigStep::DisableNmea(_)))
            .count();
        assert_eq!(n, NMEA_OFF.len());
        // two steps share count 71
        assert_eq!(due(71).count(), 2);
    }

    #[test]
    fn nav_set_follows_protver() {
        let old = Conditions { protver: 14, ..NEW };
        assert_eq!(ConfigStep::EnableNavSet.commands(old).len(), 2);
        assert_eq!(ConfigStep::EnableNavSet.commands(NEW).len(), 5);
        assert_eq!(ConfigStep::DisableNewNav.commands(old).len(), 5);
        assert!(ConfigStep::DisableNewNav.commands(NEW).is_empty());
        let mid = Conditions { protver: 18, ..NEW };
        assert_eq!(ConfigStep::DisableOldNav.commands(mid).len(), 2);
        assert!(ConfigStep::DisableOldNav.commands(NEW).is_empty());
    }

    #[test]
    fn passive_only_polls() {
        let passive = Conditions { passive: true, have_version: false, ..NEW };
        for (_, step) in SCHEDULE {
            for command in step.commands(passive) {
                assert!(matches!(command, Command::Poll(..)), "{step:?} configures");
            }
        }
        assert_eq!(
            ConfigStep::PollBuffers.commands(passive),
            vec![Command::Poll(CLASS_MON, 0x36)]
        );
    }

    #[test]
    fn monitor_by_protver() {
        let old = Conditions { protver: 23, ..NEW };
        assert_eq!(
            ConfigStep::EnableMonitor.commands(old),
            vec![Command::Rate(CfgMsg::set_rate_for(CLASS_MON, 0x09, 4))]
        );
        assert_eq!(
            ConfigStep::EnableMonitor.commands(NEW),
            vec![Command::Rate(CfgMsg::set_rate_for(CLASS_MON, 0x38, 4))]
        );
    }
}
