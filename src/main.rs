#[macro_use]
extern crate log;

use std::path::PathBuf;

use anyhow::{anyhow, Context};

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use indicatif::{ProgressBar, ProgressStyle};

use uart_flasher::protocol::DEFAULT_BAUD;
use uart_flasher::{Flasher, Options, Outcome, Progress};

/// Flash a firmware binary to a UART bootloader
#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Firmware binary to flash
    #[structopt(parse(from_os_str))]
    image: PathBuf,

    /// Serial port to connect to
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate, the bootloader default when omitted
    #[structopt(long)]
    baud: Option<usize>,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    let baud = o.baud.unwrap_or(DEFAULT_BAUD);
    if baud != DEFAULT_BAUD {
        warn!("Using non-default baud rate {}", baud);
    }

    info!("Connecting to serial port {}", o.port);

    let mut f = Flasher::linux(&o.port, baud, o.options.clone())?;
    debug!("Flasher options: {:?}", f.options());

    let image = std::fs::read(&o.image)
        .with_context(|| format!("image unreadable: {}", o.image.display()))?;

    info!(
        "Loaded {} ({})",
        o.image.display(),
        bytefmt::format(image.len() as u64)
    );

    let bar = ProgressBar::new(image.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40} {bytes}/{total_bytes} {msg}")
            .progress_chars("=> "),
    );

    let outcome = f.flash(&image, |p: &Progress| {
        bar.set_position(p.bytes_sent as u64);
        bar.set_message(&format!("{:.2}%", p.percent()));
    });

    // Close the port before reporting
    drop(f);

    match outcome {
        Ok(Outcome::Completed { bytes_sent }) => {
            bar.finish_with_message("done");
            info!("Firmware flashed successfully ({} bytes)", bytes_sent);
            Ok(())
        }
        Ok(Outcome::Aborted {
            bytes_sent,
            chunk_index,
            reason,
        }) => {
            bar.abandon_with_message("aborted");
            Err(anyhow!(
                "invalid response from bootloader at chunk {} ({:?}), {} bytes sent",
                chunk_index,
                reason,
                bytes_sent
            ))
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            Err(e).context("cannot flash firmware")
        }
    }
}
