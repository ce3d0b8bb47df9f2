//! Serial transport with bootloader line control.
//!
//! Provides a trait-based abstraction over the serial link so the protocol
//! layer can be exercised against scripted fakes, plus the real
//! implementation on top of the serialport crate. Beyond plain bytes, the
//! transport drives the two modem-control lines that are wired to the
//! target's reset and BOOT0 pins on typical programming adapters.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::config::{Parity, SERIAL_READ_TIMEOUT};
use crate::error::{FlashError, FlashResult};

/// Trait for transport operations used by the bootloader protocol.
pub trait Transport: Send {
    /// Write data to the transport.
    fn write(&mut self, data: &[u8]) -> FlashResult<()>;

    /// Read exactly `buffer.len()` bytes, failing on timeout.
    fn read_exact(&mut self, buffer: &mut [u8]) -> FlashResult<()>;

    /// Like [`Transport::read_exact`] but with a one-off timeout, used for
    /// commands that legitimately take long (mass erase, unprotect).
    fn read_exact_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> FlashResult<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> FlashResult<()>;

    /// Drop any pending input from the receive buffer.
    fn clear_input(&mut self) -> FlashResult<()>;

    /// Assert or release the target's reset pin.
    fn enable_reset(&mut self, enable: bool) -> FlashResult<()>;

    /// Assert or release the target's BOOT0 pin.
    fn enable_boot0(&mut self, enable: bool) -> FlashResult<()>;
}

/// Serial port transport implementation.
///
/// Reset rides on DTR and BOOT0 on RTS by default; `swap_rts_dtr` exchanges
/// the two. The polarity flags invert the respective line for adapters whose
/// level shifters are wired the other way around.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    swap_rts_dtr: bool,
    reset_active_high: bool,
    boot0_active_low: bool,
}

impl SerialTransport {
    /// Open a serial port with bootloader-compatible framing (8 data bits,
    /// 1 stop bit, configurable parity).
    pub fn open(port_name: &str, baud: u32, parity: Parity) -> FlashResult<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(SERIAL_READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .parity(serial_parity(parity))
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|source| FlashError::PortOpen {
                port: port_name.to_string(),
                source,
            })?;

        Ok(Self {
            port,
            swap_rts_dtr: false,
            reset_active_high: false,
            boot0_active_low: false,
        })
    }

    /// Configure how the control lines map to the reset and BOOT0 pins.
    pub fn set_line_options(
        &mut self,
        swap_rts_dtr: bool,
        reset_active_high: bool,
        boot0_active_low: bool,
    ) {
        self.swap_rts_dtr = swap_rts_dtr;
        self.reset_active_high = reset_active_high;
        self.boot0_active_low = boot0_active_low;
    }

    fn set_dtr(&mut self, level: bool) -> FlashResult<()> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(FlashError::Serial)
    }

    fn set_rts(&mut self, level: bool) -> FlashResult<()> {
        self.port
            .write_request_to_send(level)
            .map_err(FlashError::Serial)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> FlashResult<()> {
        self.port.write_all(data).map_err(FlashError::Io)
    }

    fn read_exact(&mut self, buffer: &mut [u8]) -> FlashResult<()> {
        self.port.read_exact(buffer).map_err(FlashError::Io)
    }

    fn read_exact_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> FlashResult<()> {
        let saved = self.port.timeout();
        self.port.set_timeout(timeout).map_err(FlashError::Serial)?;
        let result = self.port.read_exact(buffer).map_err(FlashError::Io);
        self.port.set_timeout(saved).map_err(FlashError::Serial)?;
        result
    }

    fn flush(&mut self) -> FlashResult<()> {
        self.port.flush().map_err(FlashError::Io)
    }

    fn clear_input(&mut self) -> FlashResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(FlashError::Serial)
    }

    fn enable_reset(&mut self, enable: bool) -> FlashResult<()> {
        let level = control_level(enable, self.reset_active_high);
        if self.swap_rts_dtr {
            self.set_rts(level)
        } else {
            self.set_dtr(level)
        }
    }

    fn enable_boot0(&mut self, enable: bool) -> FlashResult<()> {
        let level = control_level(enable, self.boot0_active_low);
        if self.swap_rts_dtr {
            self.set_dtr(level)
        } else {
            self.set_rts(level)
        }
    }
}

/// Map a logical pin state to the line level, honoring the inversion flag.
fn control_level(enable: bool, invert: bool) -> bool {
    enable ^ invert
}

/// Convert our parity value to the serialport crate's.
fn serial_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
        Parity::None => serialport::Parity::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_level_default_polarity() {
        assert!(control_level(true, false));
        assert!(!control_level(false, false));
    }

    #[test]
    fn test_control_level_inverted() {
        assert!(!control_level(true, true));
        assert!(control_level(false, true));
    }

    #[test]
    fn test_serial_parity_mapping() {
        assert_eq!(serial_parity(Parity::Even), serialport::Parity::Even);
        assert_eq!(serial_parity(Parity::Odd), serialport::Parity::Odd);
        assert_eq!(serial_parity(Parity::None), serialport::Parity::None);
    }
}
