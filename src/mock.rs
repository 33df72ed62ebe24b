//! Scripted serial port and delay for unit tests

use std::collections::VecDeque;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct MockError;

/// Serial port replaying a fixed receive script and recording writes
#[derive(Default)]
pub struct MockPort {
    /// `None` entries read as `WouldBlock`
    rx: VecDeque<Option<u8>>,
    pub tx: Vec<u8>,
    pub reads: usize,
    fail_writes_after: Option<usize>,
    fail_reads_after: Option<usize>,
}

impl MockPort {
    pub fn new(rx: &[u8]) -> Self {
        Self::scripted(rx.iter().map(|b| Some(*b)).collect())
    }

    pub fn scripted(rx: Vec<Option<u8>>) -> Self {
        Self { rx: rx.into(), ..Default::default() }
    }

    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.fail_writes_after = Some(n);
        self
    }

    pub fn fail_reads_after(mut self, n: usize) -> Self {
        self.fail_reads_after = Some(n);
        self
    }
}

impl Read<u8> for MockPort {
    type Error = MockError;

    fn read(&mut self) -> nb::Result<u8, MockError> {
        self.reads += 1;

        if let Some(n) = self.fail_reads_after {
            if self.reads > n {
                return Err(nb::Error::Other(MockError));
            }
        }

        match self.rx.pop_front() {
            Some(Some(b)) => Ok(b),
            _ => Err(nb::Error::WouldBlock),
        }
    }
}

impl Write<u8> for MockPort {
    type Error = MockError;

    fn write(&mut self, word: u8) -> nb::Result<(), MockError> {
        if let Some(n) = self.fail_writes_after {
            if self.tx.len() >= n {
                return Err(nb::Error::Other(MockError));
            }
        }

        self.tx.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), MockError> {
        Ok(())
    }
}

/// Delay that records requested time without sleeping
#[derive(Default)]
pub struct MockDelay {
    pub calls: usize,
    pub total_ms: u64,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms as u64;
    }
}
