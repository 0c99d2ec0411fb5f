use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};
use gnssd::{DriverMode, Parity};

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build the command line interface and parse the process arguments.
    pub fn new() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    fn from_matches(matches: ArgMatches) -> Self {
        Self { matches }
    }

    fn command() -> Command {
        Command::new("gnssd")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Multi-protocol GNSS receiver daemon")
            .color(ColorChoice::Auto)
            .arg_required_else_help(true)
            .next_help_heading("Serial port (active receiver)")
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .required_unless_present("file")
                    .conflicts_with("file")
                    .help("Serial port the receiver is on, for example /dev/ttyUSB0"),
            )
            .arg(
                Arg::new("baud")
                    .short('b')
                    .long("baud")
                    .value_name("BAUD")
                    .default_value("9600")
                    .value_parser(value_parser!(u32))
                    .help("Line speed of the serial port"),
            )
            .arg(
                Arg::new("stop-bits")
                    .long("stop-bits")
                    .value_parser(["1", "2"])
                    .default_value("1")
                    .help("Number of stop bits"),
            )
            .arg(
                Arg::new("data-bits")
                    .long("data-bits")
                    .value_parser(["7", "8"])
                    .default_value("8")
                    .help("Number of data bits"),
            )
            .arg(
                Arg::new("parity")
                    .long("parity")
                    .value_parser(["N", "O", "E", "n", "o", "e"])
                    .default_value("N")
                    .help("Parity: N(one), O(dd) or E(ven)"),
            )
            .next_help_heading("Capture replay")
            .arg(
                Arg::new("file")
                    .value_name("FILE")
                    .num_args(1..)
                    .value_parser(value_parser!(PathBuf))
                    .help("Capture files to decode instead of a serial port, `-` for stdin"),
            )
            .next_help_heading("Receiver control")
            .arg(
                Arg::new("readonly")
                    .long("readonly")
                    .action(ArgAction::SetTrue)
                    .help("Never write to the receiver"),
            )
            .arg(
                Arg::new("passive")
                    .long("passive")
                    .action(ArgAction::SetTrue)
                    .help("Do not configure the receiver; explicit commands still go out"),
            )
            .arg(
                Arg::new("nmea")
                    .long("nmea")
                    .action(ArgAction::SetTrue)
                    .help("Ask the receiver for NMEA once it is identified"),
            )
            .arg(
                Arg::new("rate")
                    .long("rate")
                    .value_name("HZ")
                    .value_parser(value_parser!(f64))
                    .help("Ask the receiver for this reporting rate once it is identified"),
            )
            .next_help_heading("Logs")
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::Count)
                    .help("More logs, repeat for more"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .action(ArgAction::Count)
                    .conflicts_with("verbose")
                    .help("Fewer logs, repeat for fewer"),
            )
    }

    pub fn port(&self) -> Option<&String> {
        self.matches.get_one::<String>("port")
    }

    pub fn baud_rate(&self) -> u32 {
        self.matches.get_one::<u32>("baud").copied().unwrap_or(9600)
    }

    pub fn stop_bits(&self) -> u8 {
        match self.matches.get_one::<String>("stop-bits").map(String::as_str) {
            Some("2") => 2,
            _ => 1,
        }
    }

    pub fn data_bits(&self) -> u8 {
        match self.matches.get_one::<String>("data-bits").map(String::as_str) {
            Some("7") => 7,
            _ => 8,
        }
    }

    pub fn parity(&self) -> Parity {
        self.matches
            .get_one::<String>("parity")
            .and_then(|p| p.chars().next())
            .and_then(Parity::from_char)
            .unwrap_or_default()
    }

    /// `8N1` style framing of the serial port.
    pub fn framing(&self) -> String {
        format!("{}{}{}", self.data_bits(), self.parity().as_char(), self.stop_bits())
    }

    pub fn filepaths(&self) -> Vec<PathBuf> {
        self.matches
            .get_many::<PathBuf>("file")
            .map(|files| files.cloned().collect())
            .unwrap_or_default()
    }

    /// Capture files are never written to.
    pub fn readonly(&self) -> bool {
        self.matches.get_flag("readonly") || self.port().is_none()
    }

    pub fn passive(&self) -> bool {
        self.matches.get_flag("passive")
    }

    pub fn mode(&self) -> Option<DriverMode> {
        self.matches.get_flag("nmea").then_some(DriverMode::Nmea)
    }

    pub fn rate(&self) -> Option<f64> {
        self.matches.get_one::<f64>("rate").copied()
    }

    /// Default log filter, shifted by `-v` and `-q`.
    pub fn log_level(&self) -> log::LevelFilter {
        let verbose = i16::from(self.matches.get_count("verbose"));
        let quiet = i16::from(self.matches.get_count("quiet"));
        match 2 + verbose - quiet {
            i16::MIN..=0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::from_matches(Cli::command().get_matches_from(args))
    }

    #[test]
    fn serial_defaults() {
        let cli = parse(&["gnssd", "-p", "/dev/ttyUSB0"]);
        assert_eq!(cli.port().map(String::as_str), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud_rate(), 9600);
        assert_eq!(cli.framing(), "8N1");
        assert!(!cli.readonly());
        assert_eq!(cli.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn files_are_read_only() {
        let cli = parse(&["gnssd", "a.ubx", "b.tsip", "-vv"]);
        assert_eq!(cli.filepaths().len(), 2);
        assert!(cli.readonly());
        assert_eq!(cli.log_level(), log::LevelFilter::Trace);
    }

    #[test]
    fn port_framing_and_modes() {
        let cli = parse(&[
            "gnssd", "-p", "COM3", "-b", "38400", "--parity", "o", "--stop-bits", "2", "--nmea", "--rate",
            "5", "--passive", "-q",
        ]);
        assert_eq!(cli.baud_rate(), 38400);
        assert_eq!(cli.parity(), Parity::Odd);
        assert_eq!(cli.framing(), "8O2");
        assert_eq!(cli.mode(), Some(DriverMode::Nmea));
        assert_eq!(cli.rate(), Some(5.0));
        assert!(cli.passive());
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
    }

    #[test]
    fn port_and_files_conflict() {
        let res = Cli::command().try_get_matches_from(["gnssd", "-p", "/dev/ttyS0", "capture.bin"]);
        assert!(res.is_err());
    }
}
