//! Host-side flashing tool for the STM32 ROM UART bootloader.
//!
//! Drives a target chip through a complete programming session over a serial
//! port: enter the bootloader, optionally clear readout protection, erase,
//! write, verify, read back and jump to the programmed firmware.
//!
//! # Overview
//!
//! 1. **Connect** - pulse reset with BOOT0 high and perform the wakeup
//!    handshake
//! 2. **Identify** - bootloader version, chip ID, and per-family UID and
//!    flash size
//! 3. **Program** - the configured subset of unprotect, erase, write,
//!    verify, read and go, in that fixed order
//! 4. **Fall back** - on any fatal failure the target is reset into its
//!    resident firmware before the error surfaces
//!
//! # Example
//!
//! ```ignore
//! use stm32flasher::{run_session, FlashConfig};
//!
//! let config = FlashConfig {
//!     port: Some("/dev/ttyUSB0".into()),
//!     write: true,
//!     verify: true,
//!     ..FlashConfig::default()
//! };
//! let firmware = std::fs::read("firmware.bin")?;
//! run_session(&config, Some(&firmware), |event| {
//!     println!("{}", event.message());
//! })?;
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod verify;

pub use config::{Family, FlashConfig, Parity};
pub use error::{FlashError, FlashResult};
pub use identity::DeviceIdentity;
pub use session::{
    reset_target, run_session, FlashSession, SessionEvent, SessionOutcome, Step, StepResult,
};
