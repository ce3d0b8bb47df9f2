//! Session configuration and protocol constants.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlashError, FlashResult};

// ============================================================================
// Serial communication
// ============================================================================

/// Baud rates the ROM bootloader auto-detects reliably.
pub const BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115_200, 230_400];

/// Default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial read timeout for individual bootloader replies.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// Target memory layout
// ============================================================================

/// Start of flash on most STM32 parts.
pub const FLASH_BASE_ADDRESS: u32 = 0x0800_0000;

/// Largest payload one READ MEMORY or WRITE MEMORY command can carry.
pub const MAX_TRANSFER_SIZE: usize = 256;

// ============================================================================
// Reset timing
// ============================================================================

/// How long the reset line is held asserted when pulsing it.
pub const RESET_PULSE: Duration = Duration::from_millis(100);

/// How long the target needs after reset before it accepts commands.
pub const RESET_SETTLE: Duration = Duration::from_millis(500);

/// Upper bound for a full-flash erase to complete.
pub const MASS_ERASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for readout unprotect; it triggers a mass erase internally.
pub const UNPROTECT_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// Value types
// ============================================================================

/// UART parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    Even,
    Odd,
    None,
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "e" | "even" => Ok(Parity::Even),
            "o" | "odd" => Ok(Parity::Odd),
            "n" | "none" => Ok(Parity::None),
            other => Err(format!("unknown parity '{other}' (use even, odd or none)")),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::Even => write!(f, "even"),
            Parity::Odd => write!(f, "odd"),
            Parity::None => write!(f, "none"),
        }
    }
}

/// STM32 chip family, as selected by the operator.
///
/// The family decides where the UID and flash-size words live in system
/// memory. It is deliberately coarse; the precise part is reported separately
/// through the chip ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    F0,
    F1,
    F2,
    F3,
    F4,
    F7,
    G0,
    L0,
    L1,
    L4,
}

impl Family {
    /// System-memory address of the 96-bit device UID, where one is documented.
    pub fn uid_address(self) -> Option<u32> {
        match self {
            Family::F1 => Some(0x1FFF_F7E8),
            Family::F0 | Family::F3 => Some(0x1FFF_F7AC),
            Family::F4 => Some(0x1FFF_7A10),
            Family::F7 => Some(0x1FF0_F420),
            Family::L0 => Some(0x1FF8_0050),
            Family::G0 | Family::L4 => Some(0x1FFF_7590),
            Family::F2 | Family::L1 => None,
        }
    }

    /// System-memory address of the flash-size word, where one is documented.
    pub fn flash_size_address(self) -> Option<u32> {
        match self {
            Family::F1 => Some(0x1FFF_F7E0),
            Family::F0 | Family::F3 => Some(0x1FFF_F7CC),
            Family::F4 => Some(0x1FFF_7A22),
            Family::F7 => Some(0x1FF0_F442),
            Family::L0 => Some(0x1FF8_007C),
            Family::G0 | Family::L4 => Some(0x1FFF_75E0),
            Family::F2 | Family::L1 => None,
        }
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "F0" => Ok(Family::F0),
            "F1" => Ok(Family::F1),
            "F2" => Ok(Family::F2),
            "F3" => Ok(Family::F3),
            "F4" => Ok(Family::F4),
            "F7" => Ok(Family::F7),
            "G0" => Ok(Family::G0),
            "L0" => Ok(Family::L0),
            "L1" => Ok(Family::L1),
            "L4" => Ok(Family::L4),
            other => Err(format!("unknown chip family '{other}'")),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::F0 => "F0",
            Family::F1 => "F1",
            Family::F2 => "F2",
            Family::F3 => "F3",
            Family::F4 => "F4",
            Family::F7 => "F7",
            Family::G0 => "G0",
            Family::L0 => "L0",
            Family::L1 => "L1",
            Family::L4 => "L4",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Session configuration
// ============================================================================

/// Parameters of one flashing session.
///
/// A config is built once by the caller (CLI flags, an IPC payload) and never
/// mutated afterwards; a new session gets a new value. The operation flags
/// are independent: an unset flag means its step is skipped, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0" or "COM3"). `None` leaves port
    /// selection to the caller.
    pub port: Option<String>,
    /// Baud rate; must be one of [`BAUD_RATES`].
    pub baud: u32,
    /// UART parity. The ROM bootloader expects even parity on most parts.
    pub parity: Parity,
    /// Chip family for UID and flash-size lookup. `None` disables the lookup.
    pub family: Option<Family>,
    /// Target memory address for write, verify and read.
    pub address: u32,
    /// Erase the full flash before writing.
    pub erase: bool,
    /// Clear readout protection before anything else.
    pub unprotect: bool,
    /// Write the firmware image at `address`.
    pub write: bool,
    /// Read back and compare what was written.
    pub verify: bool,
    /// Read `length` bytes from `address`; only runs when `write` is unset.
    pub read: bool,
    /// Number of bytes to read when `read` is set.
    pub length: usize,
    /// Address to jump to once all other steps are done. `None` means stay
    /// in the bootloader.
    pub go_address: Option<u32>,
    /// Swap the RTS and DTR control lines.
    pub swap_rts_dtr: bool,
    /// Invert the reset line polarity.
    pub reset_active_high: bool,
    /// Invert the BOOT0 line polarity.
    pub boot0_active_low: bool,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD_RATE,
            parity: Parity::Even,
            family: None,
            address: FLASH_BASE_ADDRESS,
            erase: false,
            unprotect: false,
            write: false,
            verify: false,
            read: false,
            length: 0,
            go_address: None,
            swap_rts_dtr: false,
            reset_active_high: false,
            boot0_active_low: false,
        }
    }
}

impl FlashConfig {
    /// Check the config for values the bootloader cannot work with.
    pub fn validate(&self) -> FlashResult<()> {
        if !BAUD_RATES.contains(&self.baud) {
            return Err(FlashError::Config {
                reason: format!(
                    "unsupported baud rate {} (accepted: {:?})",
                    self.baud, BAUD_RATES
                ),
            });
        }
        if self.read && self.length == 0 {
            return Err(FlashError::Config {
                reason: "read requested with zero length".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FlashConfig::default();
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.address, 0x0800_0000);
        assert!(config.port.is_none());
        assert!(config.go_address.is_none());
        assert!(!config.erase && !config.unprotect && !config.write);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(FlashConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_odd_baud() {
        let config = FlashConfig {
            baud: 12_345,
            ..FlashConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FlashError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_length_read() {
        let config = FlashConfig {
            read: true,
            length: 0,
            ..FlashConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FlashError::Config { .. })
        ));
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!("even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("odd".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!("N".parse::<Parity>().unwrap(), Parity::None);
        assert!("mark".parse::<Parity>().is_err());
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("f4".parse::<Family>().unwrap(), Family::F4);
        assert_eq!("L4".parse::<Family>().unwrap(), Family::L4);
        assert!("H7".parse::<Family>().is_err());
    }

    #[test]
    fn test_family_addresses() {
        assert_eq!(Family::F4.uid_address(), Some(0x1FFF_7A10));
        assert_eq!(Family::F1.flash_size_address(), Some(0x1FFF_F7E0));
        // F2 and L1 have no documented location.
        assert_eq!(Family::F2.uid_address(), None);
        assert_eq!(Family::L1.flash_size_address(), None);
    }
}
