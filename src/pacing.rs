//! Paced byte output.
//!
//! The bootloader's receive path cannot keep up with back-to-back writes, so
//! every byte goes out on its own followed by a fixed delay. N bytes always
//! cost at least N * `delay_ms`.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::Write;

/// Write `data` one byte at a time, waiting `delay_ms` after each byte
pub fn send_paced<P, D, E>(port: &mut P, delay: &mut D, data: &[u8], delay_ms: u32) -> Result<(), E>
where
    P: Write<u8, Error = E>,
    D: DelayMs<u32>,
{
    for b in data {
        block!(port.write(*b))?;
        block!(port.flush())?;

        delay.delay_ms(delay_ms);
    }

    Ok(())
}
