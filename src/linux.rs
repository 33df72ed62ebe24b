use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use linux_embedded_hal::{Delay, Serial};
use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};

use crate::{Flasher, Options};

/// Serial port could not be opened or configured
#[derive(Debug, thiserror::Error)]
#[error("link unavailable on {port}: {source}")]
pub struct LinkUnavailable {
    pub port: String,
    #[source]
    pub source: SerialError,
}

impl Flasher<Serial, Delay, IoErrorKind> {
    /// Create a new linux serial port flasher instance
    ///
    /// The port is configured 8N1 without flow control and is closed when
    /// the flasher is dropped.
    pub fn linux<P: AsRef<Path>>(port: P, baud: usize, options: Options) -> Result<Self, LinkUnavailable> {
        let path = port.as_ref();

        let serial = open(path, baud).map_err(|source| LinkUnavailable {
            port: path.display().to_string(),
            source,
        })?;

        debug!("Opened {} at {} baud", path.display(), baud);

        Ok(Self::new(serial, Delay {}, options))
    }
}

fn open(path: &Path, baud: usize) -> Result<Serial, SerialError> {
    let mut port = Serial::open(path)?;

    // Apply settings
    let mut settings = port.0.read_settings()?;

    settings.set_char_size(CharSize::Bits8);
    settings.set_stop_bits(StopBits::Stop1);
    settings.set_baud_rate(BaudRate::from_speed(baud))?;
    settings.set_flow_control(FlowControl::FlowNone);
    settings.set_parity(Parity::ParityNone);

    port.0.write_settings(&settings)?;

    // Reads return immediately so response polling is paced by the flasher
    port.0.set_timeout(Duration::from_millis(1))?;

    Ok(port)
}
