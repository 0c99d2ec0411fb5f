//! # gnssd
//!
//! The packet framing, protocol dispatch and binary decoding core of a
//! multi-protocol GNSS daemon.
//!
//! Raw receiver bytes go into a [`Session`]. Its [`Lexer`] frames them into
//! typed packets (NMEA 0183, u-blox UBX, Trimble TSIP, RTCM and a dozen
//! more), the [`driver`] table routes each packet to its decoder, and the
//! session folds what the decoders report into one [`GpsData`] per
//! reporting cycle:
//!
//! ```
//! use gnssd::{Context, Session};
//!
//! let mut ctx = Context::default();
//! let mut session = Session::default();
//! session.set_publisher(|data: &gnssd::GpsData| {
//!     println!("{:?} {:.7} {:.7}", data.fix.mode, data.fix.latitude, data.fix.longitude);
//! });
//! // bytes as they come off the wire, any chunking
//! let mask = session.feed(&mut ctx, b"$GPZDA,120000.00,01,06,2024,00,00*66\r\n");
//! assert!(mask.contains(gnssd::Mask::PACKET));
//! ```
//!
//! Decoders never write to the device directly. Anything they want sent
//! lands in the session's outbox, to be drained by whoever owns the port;
//! a read-only [`Context`] drops it instead.

pub mod bits;
pub mod checksum;
pub mod constants;
pub mod context;
pub mod driver;
pub mod error;
pub mod fix;
pub mod gnss;
pub mod lexer;
pub mod mask;
pub mod session;
pub mod subframe;
pub mod tsip;
pub mod ubx;

pub use crate::{
    context::Context,
    driver::{Driver, DriverMode, Event, Parity},
    error::{Error, Result},
    fix::{Dop, Fix, FixMode, FixStatus, GpsData, Satellite},
    lexer::{Lexer, PacketType},
    mask::Mask,
    session::{Publisher, Session, SessionOptions},
    subframe::Subframe,
};
