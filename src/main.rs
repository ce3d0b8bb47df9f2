//! Command-line shell for the STM32 UART bootloader flasher.
//!
//! Usage:
//!   stm32flasher -p /dev/ttyUSB0 -e -w -v firmware.bin
//!   stm32flasher -p COM3 --family F4 -r -l 1024 dump.bin
//!   stm32flasher -p /dev/ttyUSB0 --reset

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use stm32flasher::{
    config::DEFAULT_BAUD_RATE, reset_target, run_session, FlashConfig, FlashError, SessionEvent,
};

#[derive(Debug, Parser)]
#[command(
    name = "stm32flasher",
    version,
    about = "Flash firmware over the STM32 ROM UART bootloader"
)]
struct Cli {
    /// Serial port connected to the target (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// UART parity: even, odd or none
    #[arg(long, default_value = "even")]
    parity: String,

    /// Chip family for UID and flash-size lookup (e.g. F4)
    #[arg(long)]
    family: Option<String>,

    /// Target memory address
    #[arg(short, long, value_parser = parse_word, default_value = "0x08000000")]
    address: u32,

    /// Erase the full flash before writing
    #[arg(short, long)]
    erase: bool,

    /// Clear readout protection first
    #[arg(short, long)]
    unprotect: bool,

    /// Write FILE to the target
    #[arg(short, long)]
    write: bool,

    /// Read back and compare what was written
    #[arg(short, long)]
    verify: bool,

    /// Read memory into FILE instead of writing
    #[arg(short, long)]
    read: bool,

    /// Number of bytes to read
    #[arg(short, long, default_value_t = 0)]
    length: usize,

    /// Jump to this address when done
    #[arg(short, long, value_parser = parse_word)]
    go: Option<u32>,

    /// Only reset the target into its firmware, run nothing else
    #[arg(long)]
    reset: bool,

    /// Swap the RTS and DTR control lines
    #[arg(long)]
    swap_rts_dtr: bool,

    /// Treat the reset line as active-high
    #[arg(long)]
    reset_active_high: bool,

    /// Treat the BOOT0 line as active-low
    #[arg(long)]
    boot0_active_low: bool,

    /// Firmware image to write or verify, or output file for --read
    file: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        if let Some(hint) = e.downcast_ref::<FlashError>().and_then(FlashError::hint) {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let parity = cli.parity.parse().map_err(anyhow::Error::msg)?;
    let family = cli
        .family
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let config = FlashConfig {
        port: Some(cli.port.clone()),
        baud: cli.baud,
        parity,
        family,
        address: cli.address,
        erase: cli.erase,
        unprotect: cli.unprotect,
        write: cli.write,
        verify: cli.verify,
        read: cli.read,
        length: cli.length,
        go_address: cli.go,
        swap_rts_dtr: cli.swap_rts_dtr,
        reset_active_high: cli.reset_active_high,
        boot0_active_low: cli.boot0_active_low,
    };

    if cli.reset {
        reset_target(&config)?;
        println!("Target reset into its firmware");
        return Ok(());
    }

    let firmware = if cli.write || cli.verify {
        let path = cli
            .file
            .as_ref()
            .context("writing or verifying requires a firmware file")?;
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Some(data)
    } else {
        None
    };

    if cli.read && !cli.write && cli.file.is_none() {
        bail!("reading requires an output file");
    }

    // One bar per bulk transfer; any other event retires the current bar.
    let bar: RefCell<Option<ProgressBar>> = RefCell::new(None);
    let on_event = |event: SessionEvent| match &event {
        SessionEvent::Writing {
            written: done,
            total,
        }
        | SessionEvent::Reading { read: done, total } => {
            let mut slot = bar.borrow_mut();
            let pb = slot.get_or_insert_with(|| {
                let pb = ProgressBar::new(*total as u64);
                pb.set_style(
                    ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes}")
                        .expect("progress template is valid"),
                );
                pb
            });
            pb.set_position(*done as u64);
        }
        _ => {
            if let Some(bar) = bar.borrow_mut().take() {
                bar.finish();
            }
            println!("{}", event.message());
        }
    };

    let outcome = run_session(&config, firmware.as_deref(), on_event)?;
    if let Some(bar) = bar.borrow_mut().take() {
        bar.finish();
    }

    if let Some(data) = outcome.read_data {
        let path = cli.file.as_ref().expect("output file checked above");
        fs::write(path, &data).with_context(|| format!("writing {}", path.display()))?;
        println!("Saved {} bytes to {}", data.len(), path.display());
    }

    Ok(())
}

/// Parse a number that may be decimal or 0x-prefixed hex.
fn parse_word(s: &str) -> Result<u32, String> {
    let result = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    result.map_err(|_| format!("invalid address '{s}'"))
}
