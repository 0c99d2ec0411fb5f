mod cli;
mod interface;

use std::{io::Write, process::ExitCode};

use env_logger::{Builder, Target};
use gnssd::{Context, Error, GpsData, Mask, Session, SessionOptions};
use log::{debug, error, info, warn};

use crate::{cli::Cli, interface::Interface};

/// One log line per reporting cycle.
fn report(data: &GpsData) {
    let fix = &data.fix;
    let time = fix
        .time
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "-".into());
    info!(
        "{time} mode {:?} status {:?} lat {:.7} lon {:.7} alt {:.2} sats {}/{}",
        fix.mode,
        fix.status,
        fix.latitude,
        fix.longitude,
        fix.alt_hae,
        data.satellites_used,
        data.satellites_visible
    );
}

/// Decode `iface` until it runs dry. A serial port never does.
fn run(session: &mut Session, ctx: &mut Context, iface: &mut Interface) -> Result<(), Error> {
    loop {
        let mask = match session.poll(ctx, iface) {
            Ok(mask) => mask,
            Err(Error::Eof) if iface.is_port() => Mask::empty(),
            Err(Error::Eof) => {
                debug!("{}: end of input", session.options.path);
                return Ok(());
            },
            Err(e) => return Err(e),
        };

        let frames: Vec<_> = session.drain_outbox().collect();
        for frame in frames {
            if let Err(e) = iface.write_all(&frame) {
                warn!("{}: write of {} bytes failed: {e}", session.options.path, frame.len());
            }
        }

        if mask.contains(Mask::EOF_IS) {
            debug!("{}: EOF marker", session.options.path);
            return Ok(());
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::new();

    let mut builder = Builder::new();
    builder
        .filter_level(cli.log_level())
        .parse_default_env()
        .target(Target::Stdout)
        .format_timestamp_secs()
        .init();

    let mut ctx = Context::default();
    ctx.readonly = cli.readonly();
    ctx.passive = cli.passive();

    let options = SessionOptions {
        mode: cli.mode(),
        rate: cli.rate(),
        speed: cli.baud_rate(),
        parity: cli.parity(),
        stopbits: cli.stop_bits(),
        ..Default::default()
    };

    if let Some(port) = cli.port() {
        ctx.fixed_port_speed = Some(cli.baud_rate());
        ctx.fixed_port_framing = Some(cli.framing());
        let mut iface = match Interface::open_serial_port(
            port,
            cli.baud_rate(),
            cli.data_bits(),
            cli.parity(),
            cli.stop_bits(),
        ) {
            Ok(iface) => iface,
            Err(e) => {
                error!("failed to open {port}: {e}");
                return ExitCode::FAILURE;
            },
        };
        info!("opened {port} at {} {}", cli.baud_rate(), cli.framing());

        let mut session = Session::new(SessionOptions {
            path: port.clone(),
            ..options
        });
        session.set_publisher(report);
        if let Err(e) = run(&mut session, &mut ctx, &mut iface) {
            error!("{port}: {e}");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let mut status = ExitCode::SUCCESS;
    for path in cli.filepaths() {
        let name = path.display().to_string();
        let mut iface = match Interface::from_capture(&path) {
            Ok(iface) => iface,
            Err(e) => {
                error!("failed to open {name}: {e}");
                status = ExitCode::FAILURE;
                continue;
            },
        };
        let mut session = Session::new(SessionOptions {
            path: name.clone(),
            ..options.clone()
        });
        session.set_publisher(report);
        match run(&mut session, &mut ctx, &mut iface) {
            Ok(()) => info!("{name}: {} reports, {} bytes", session.reports, session.lexer.char_counter),
            Err(e) => {
                error!("{name}: {e}");
                status = ExitCode::FAILURE;
            },
        }
    }
    status
}
