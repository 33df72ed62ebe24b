//! UART firmware flasher.
//!
//! Streams a firmware image to a device-resident bootloader over a serial
//! link. A session starts with an 8 byte handshake carrying the start key and
//! image length, then for each chunk of up to [`CHUNK_SIZE`] bytes the device
//! signals readiness with a single `0x01` byte and the host replies with a
//! length header and the chunk payload. Every byte is written individually
//! with a fixed delay between writes.
//!
//! Any response other than ready ends the session, there is no retry.

use core::marker::PhantomData;

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod pacing;
pub mod progress;
pub mod protocol;

#[cfg(test)]
mod mock;

pub use pacing::send_paced;
pub use progress::{progress, Observer, Progress};
pub use protocol::{DataPacket, StartPacket, CHUNK_SIZE, RESP_READY, START_KEY};

/// Serial link used to talk to the bootloader
pub trait SerialPort<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> SerialPort<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum State {
    Idle,
    Handshake,
    ChunkLoop,
    Completed,
    Aborted,
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<SerialError> {
    #[error("serial error: {0:?}")]
    Serial(SerialError),

    #[error("image of {0} bytes does not fit a 32-bit length field")]
    ImageTooLarge(usize),
}

impl<SerialError> From<SerialError> for Error<SerialError> {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

/// Result of polling the bootloader before a chunk
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Response {
    /// Bootloader is ready for the next chunk
    Ready,
    /// Bootloader replied with something other than ready
    NotReady(u8),
    /// No byte arrived within the response timeout
    Timeout,
}

/// Final result of a flashing session
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Outcome {
    /// Every chunk was sent
    Completed { bytes_sent: u32 },

    /// The bootloader did not signal ready before `chunk_index`
    Aborted {
        bytes_sent: u32,
        chunk_index: u32,
        reason: Response,
    },
}

impl Outcome {
    pub fn bytes_sent(&self) -> u32 {
        match self {
            Outcome::Completed { bytes_sent } => *bytes_sent,
            Outcome::Aborted { bytes_sent, .. } => *bytes_sent,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Delay after each byte written to the bootloader
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "10"))]
    pub byte_delay_ms: u32,

    /// Timeout to wait for the bootloader ready signal
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1000"))]
    pub response_timeout_ms: u32,

    /// Period to poll for bootloader responses, at least 1ms
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            byte_delay_ms: protocol::DEFAULT_BYTE_DELAY_MS,
            response_timeout_ms: 1000,
            poll_delay_ms: 1,
        }
    }
}

/// Progress through a single image transfer
#[derive(Clone, Debug)]
pub struct Session<'a> {
    image: &'a [u8],
    file_size: u32,
    chunk_size: u32,
    bytes_sent: u32,
    chunk_index: u32,
    total_chunks: u32,
}

impl<'a> Session<'a> {
    /// Start a session over `image`, `None` if its length overflows a u32
    pub fn new(image: &'a [u8]) -> Option<Self> {
        if image.len() > u32::MAX as usize {
            return None;
        }

        let file_size = image.len() as u32;

        Some(Self {
            image,
            file_size,
            chunk_size: CHUNK_SIZE,
            bytes_sent: 0,
            chunk_index: 0,
            total_chunks: protocol::total_chunks(file_size, CHUNK_SIZE),
        })
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn bytes_sent(&self) -> u32 {
        self.bytes_sent
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn is_complete(&self) -> bool {
        self.chunk_index == self.total_chunks
    }

    pub fn start_packet(&self) -> StartPacket {
        StartPacket::new(self.file_size)
    }

    /// Packet for the next unsent chunk
    pub fn next_chunk(&self) -> Option<DataPacket<'a>> {
        if self.is_complete() {
            return None;
        }

        let len = protocol::chunk_length(self.file_size, self.chunk_size, self.chunk_index);
        let start = self.bytes_sent as usize;

        Some(DataPacket::new(&self.image[start..start + len as usize]))
    }

    /// Record the current chunk as sent
    fn advance(&mut self, len: u32) -> Progress {
        self.bytes_sent += len;

        let p = Progress {
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            bytes_sent: self.bytes_sent,
            file_size: self.file_size,
        };

        self.chunk_index += 1;

        p
    }
}

/// Drives flashing sessions over a serial port
pub struct Flasher<P, D, E> {
    state: State,
    options: Options,
    port: P,
    delay: D,
    _err: PhantomData<E>,
}

impl<P, D, E> Flasher<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Create a new flasher instance
    pub fn new(port: P, delay: D, options: Options) -> Self {
        Self {
            state: State::Idle,
            options,
            port,
            delay,
            _err: PhantomData,
        }
    }

    /// Fetch the flasher state
    pub fn state(&self) -> State {
        self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Release the underlying port and delay
    pub fn free(self) -> (P, D) {
        (self.port, self.delay)
    }

    /// Transfer `image` to the bootloader, reporting progress after each chunk
    pub fn flash<O: Observer>(&mut self, image: &[u8], mut observer: O) -> Result<Outcome, Error<E>> {
        self.state = State::Idle;

        let res = self.run(image, &mut observer);

        if let Err(e) = &res {
            error!("Flashing failed: {:?}", e);
            self.state = State::Aborted;
        }

        res
    }

    fn run<O: Observer>(&mut self, image: &[u8], observer: &mut O) -> Result<Outcome, Error<E>> {
        let mut session = Session::new(image).ok_or(Error::ImageTooLarge(image.len()))?;

        info!(
            "Flashing {} bytes in {} chunks",
            session.file_size(),
            session.total_chunks()
        );

        // Announce the session, the bootloader does not acknowledge this
        self.state = State::Handshake;
        self.handshake(&session)?;

        self.state = State::ChunkLoop;

        while let Some(packet) = session.next_chunk() {
            match self.read_response()? {
                Response::Ready => (),
                reason => {
                    warn!(
                        "Bootloader not ready for chunk {} ({:?}), terminating session",
                        session.chunk_index(),
                        reason
                    );
                    self.state = State::Aborted;

                    return Ok(Outcome::Aborted {
                        bytes_sent: session.bytes_sent(),
                        chunk_index: session.chunk_index(),
                        reason,
                    });
                }
            }

            self.send_chunk(&packet)?;

            let p = session.advance(packet.length());

            debug!(
                "Sent chunk {}/{} ({:.2}%)",
                p.chunk_index + 1,
                p.total_chunks,
                p.percent()
            );
            observer.on_progress(&p);
        }

        self.state = State::Completed;
        info!("Flashed {} bytes", session.bytes_sent());

        Ok(Outcome::Completed {
            bytes_sent: session.bytes_sent(),
        })
    }

    fn handshake(&mut self, session: &Session) -> Result<(), Error<E>> {
        let packet = session.start_packet();
        debug!(
            "Sending start packet (key: 0x{:08x}, length: {})",
            packet.start_key, packet.total_length
        );

        self.send(&packet.encode())
    }

    fn send_chunk(&mut self, packet: &DataPacket) -> Result<(), Error<E>> {
        trace!("Sending chunk of {} bytes", packet.length());

        self.send(&packet.header())?;
        self.send(packet.payload())
    }

    /// Wait for the bootloader to signal readiness for the next chunk
    ///
    /// Polls at least every millisecond, a zero `poll_delay_ms` is treated as 1.
    pub fn read_response(&mut self) -> Result<Response, Error<E>> {
        let poll_ms = self.options.poll_delay_ms.max(1);
        let mut t = 0;

        loop {
            // Attempt to read from serial port
            match self.port.read() {
                Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(e)) => return Err(e.into()),
                Ok(v) if v == RESP_READY => {
                    trace!("Received bootloader ready");
                    return Ok(Response::Ready);
                }
                Ok(v) => {
                    debug!("Received unexpected value: 0x{:02x}", v);
                    return Ok(Response::NotReady(v));
                }
            };

            if t >= self.options.response_timeout_ms {
                error!("Receive timeout");
                return Ok(Response::Timeout);
            }

            // Wait for delay period
            self.delay.delay_ms(poll_ms);
            t += poll_ms;
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        send_paced(&mut self.port, &mut self.delay, data, self.options.byte_delay_ms)?;
        Ok(())
    }
}
