//! Error types for the bootloader flashing workflow.

use thiserror::Error;

use crate::config::Family;
use crate::session::Step;

/// Result type alias for flashing operations.
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur while talking to the ROM bootloader.
#[derive(Debug, Error)]
pub enum FlashError {
    /// Serial port error from the serialport crate.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured serial port could not be opened.
    #[error("Cannot open port '{port}': {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Invalid session configuration.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// The device refused a command with a NAK byte.
    #[error("Device NAK for {command}")]
    Nak { command: &'static str },

    /// The device answered with something that is neither ACK nor NAK.
    #[error("Unexpected reply 0x{byte:02X} to {command}")]
    UnexpectedReply { command: &'static str, byte: u8 },

    /// No reply arrived within the transport timeout.
    #[error("Timeout waiting for reply to {command}")]
    Timeout { command: &'static str },

    /// Read-back data has a different length than the written image.
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Read-back data differs from the written image.
    #[error(
        "Data mismatch at offset 0x{offset:X}: expected 0x{expected:02X}, \
         read 0x{actual:02X} ({mismatches} byte(s) differ)"
    )]
    DataMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
        mismatches: usize,
    },

    /// The chip family has no documented UID or flash-size location.
    #[error("No UID or flash-size layout known for family {family}")]
    UnsupportedFamily { family: Family },

    /// A workflow step failed. Carries the step, the underlying cause and an
    /// optional corrective hint. The hint is a guess about the likely cause,
    /// not an established fact.
    #[error("{step} failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<FlashError>,
        hint: Option<&'static str>,
    },
}

impl FlashError {
    /// Check whether this is a command-level failure (the device answered
    /// wrongly or not at all, as opposed to a local I/O or usage problem).
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            FlashError::Nak { .. }
                | FlashError::UnexpectedReply { .. }
                | FlashError::Timeout { .. }
        )
    }

    /// Corrective hint attached to a failed step, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            FlashError::Step { hint, .. } => *hint,
            _ => None,
        }
    }
}
