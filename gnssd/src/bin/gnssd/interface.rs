use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
    time::Duration,
};

use gnssd::Parity;
use serialport::SerialPort;

/// [Interface] to the receiver stream
pub enum Interface {
    /// Capture files and stdin. Writes go nowhere.
    ReadOnly(Box<dyn Read>),

    /// A live receiver on a serial port.
    Port(Box<dyn SerialPort>),
}

impl Interface {
    /// Open `path` with the given line settings.
    pub fn open_serial_port(
        path: &str,
        baud: u32,
        data_bits: u8,
        parity: Parity,
        stop_bits: u8,
    ) -> serialport::Result<Self> {
        let data_bits = match data_bits {
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let parity = match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let port = serialport::new(path, baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self::Port(port))
    }

    /// A capture file, or stdin for `-`.
    pub fn from_capture(path: &Path) -> io::Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Self::ReadOnly(Box::new(io::stdin())));
        }
        let file = File::open(path)?;
        Ok(Self::ReadOnly(Box::new(BufReader::new(file))))
    }

    pub fn is_port(&self) -> bool {
        matches!(self, Self::Port(_))
    }
}

impl Read for Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::ReadOnly(r) => r.read(buf),
            Self::Port(port) => match port.read(buf) {
                // a quiet line is not an error
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                other => other,
            },
        }
    }
}

impl Write for Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::ReadOnly(_) => Ok(buf.len()),
            Self::Port(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::ReadOnly(_) => Ok(()),
            Self::Port(port) => port.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_swallows_writes() {
        let mut iface = Interface::ReadOnly(Box::new(&b"$GPGGA"[..]));
        assert_eq!(iface.write(&[1, 2, 3]).unwrap(), 3);
        let mut buf = [0u8; 16];
        assert_eq!(iface.read(&mut buf).unwrap(), 6);
        assert!(!iface.is_port());
    }
}
