//! Chip identification: bootloader version, chip ID, UID and flash size.
//!
//! These are inspection operations. They never abort a session; a failed
//! lookup is logged and skipped.

use log::{debug, warn};
use serde::Serialize;

use crate::config::Family;
use crate::error::FlashResult;
use crate::protocol::BootloaderCommands;

/// Known chip IDs and their part labels.
pub const CHIP_IDS: &[(u16, &str)] = &[
    (0x410, "STM32F10x Medium-density"),
    (0x411, "STM32F2xx"),
    (0x412, "STM32F10x Low-density"),
    (0x413, "STM32F40x/41x"),
    (0x414, "STM32F10x High-density"),
    (0x415, "STM32L47x/48x"),
    (0x416, "STM32L1xx Medium-density"),
    (0x417, "STM32L05x/06x"),
    (0x418, "STM32F105/107"),
    (0x419, "STM32F42x/43x"),
    (0x420, "STM32F10x Medium-density value line"),
    (0x421, "STM32F446"),
    (0x422, "STM32F30x"),
    (0x423, "STM32F401xB/C"),
    (0x425, "STM32L031/041"),
    (0x427, "STM32L1xx Medium-density plus"),
    (0x428, "STM32F10x High-density value line"),
    (0x429, "STM32L1xx Cat.2"),
    (0x430, "STM32F10x XL-density"),
    (0x431, "STM32F411xC/E"),
    (0x432, "STM32F37x"),
    (0x433, "STM32F401xD/E"),
    (0x434, "STM32F46x/47x"),
    (0x435, "STM32L43x/44x"),
    (0x436, "STM32L1xx High-density"),
    (0x437, "STM32L152RE"),
    (0x438, "STM32F334"),
    (0x439, "STM32F301/302"),
    (0x440, "STM32F05x"),
    (0x441, "STM32F412"),
    (0x442, "STM32F09x"),
    (0x444, "STM32F03x"),
    (0x445, "STM32F04x"),
    (0x446, "STM32F303 High-density"),
    (0x447, "STM32L07x/08x"),
    (0x448, "STM32F07x"),
    (0x449, "STM32F74x/75x"),
    (0x451, "STM32F76x/77x"),
    (0x452, "STM32F72x/73x"),
    (0x457, "STM32L01x/02x"),
    (0x458, "STM32F410"),
    (0x460, "STM32G07x/08x"),
    (0x461, "STM32L496/4A6"),
    (0x462, "STM32L45x/46x"),
    (0x463, "STM32F413"),
    (0x464, "STM32L41x/42x"),
    (0x466, "STM32G03x/04x"),
    (0x468, "STM32G43x/44x"),
    (0x469, "STM32G47x/48x"),
    (0x470, "STM32L4R/L4S"),
    (0x472, "STM32L552/562"),
];

/// Human-readable label for a chip ID, "Unknown" when unmapped.
pub fn chip_name(chip_id: u16) -> &'static str {
    CHIP_IDS
        .iter()
        .find(|(id, _)| *id == chip_id)
        .map_or("Unknown", |(_, name)| name)
}

/// Facts decoded from the connected chip. Computed on demand per session,
/// never cached across sessions.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceIdentity {
    /// Bootloader protocol version byte.
    pub bootloader_version: u8,
    /// 16-bit chip ID.
    pub chip_id: u16,
    /// Formatted device UID, when the family lookup succeeded.
    pub uid: Option<String>,
    /// Flash size in KiB, when the family lookup succeeded.
    pub flash_size_kb: Option<u16>,
}

impl DeviceIdentity {
    /// Part label for the chip ID.
    pub fn chip_name(&self) -> &'static str {
        chip_name(self.chip_id)
    }
}

/// How the UID and flash size are fetched for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UidStrategy {
    /// Separate flash-size and UID reads.
    TwoCalls,
    /// One combined read of the device-info block.
    Combined,
}

impl UidStrategy {
    fn for_family(family: Family) -> Self {
        match family {
            Family::F4 => UidStrategy::Combined,
            _ => UidStrategy::TwoCalls,
        }
    }
}

/// Query bootloader version and chip ID.
pub fn read_device_id(commands: &mut impl BootloaderCommands) -> FlashResult<(u8, u16)> {
    let version = commands.get()?;
    let chip_id = commands.get_id()?;
    debug!(
        "bootloader version 0x{version:02X}, chip ID 0x{chip_id:03X} ({})",
        chip_name(chip_id)
    );
    Ok((version, chip_id))
}

/// Query the device UID and flash size for the configured family.
///
/// Returns `None` without issuing any command when no family is configured,
/// and `None` with a logged cause when a command fails. Both fetch
/// strategies converge on the same result shape.
pub fn read_device_uid(
    commands: &mut impl BootloaderCommands,
    family: Option<Family>,
) -> Option<(String, u16)> {
    let family = family?;

    let result = match UidStrategy::for_family(family) {
        UidStrategy::Combined => commands
            .get_flash_size_and_uid_f4()
            .map(|(size, uid)| (uid, size)),
        UidStrategy::TwoCalls => commands.get_flash_size(family).and_then(|size| {
            let uid = commands.get_uid(family)?;
            Ok((uid, size))
        }),
    };

    match result {
        Ok((uid, flash_size)) => Some((format_uid(&uid), flash_size)),
        Err(e) => {
            warn!("could not read UID and flash size for family {family}: {e}");
            None
        }
    }
}

/// Byte order of the UID groups as the reference manuals print them: two
/// 16-bit words followed by two 32-bit words, each group byte-swapped.
const UID_GROUPS: &[&[usize]] = &[&[1, 0], &[3, 2], &[7, 6, 5, 4], &[11, 10, 9, 8]];

/// Render a raw 96-bit UID as dash-separated uppercase hex groups.
///
/// UIDs of unexpected length are rendered as plain contiguous hex so a
/// surprising reply still shows up legibly in the log.
pub fn format_uid(uid: &[u8]) -> String {
    if uid.len() != 12 {
        return uid.iter().map(|b| format!("{b:02X}")).collect();
    }
    UID_GROUPS
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|&index| format!("{:02X}", uid[index]))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashError;
    use crate::protocol::MockBootloaderCommands;

    #[test]
    fn test_chip_name_known() {
        assert_eq!(chip_name(0x413), "STM32F40x/41x");
        assert_eq!(chip_name(0x440), "STM32F05x");
    }

    #[test]
    fn test_chip_name_unknown() {
        assert_eq!(chip_name(0x7FF), "Unknown");
    }

    #[test]
    fn test_format_uid_groups_and_swaps() {
        let uid = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
        ];
        assert_eq!(format_uid(&uid), "0201-0403-08070605-0C0B0A09");
    }

    #[test]
    fn test_format_uid_odd_length_falls_back_to_plain_hex() {
        assert_eq!(format_uid(&[0xDE, 0xAD]), "DEAD");
    }

    #[test]
    fn test_read_device_id_reports_both_values() {
        let mut mock = MockBootloaderCommands::new();
        mock.expect_get().times(1).returning(|| Ok(0x31));
        mock.expect_get_id().times(1).returning(|| Ok(0x0413));

        let (version, chip_id) = read_device_id(&mut mock).unwrap();
        assert_eq!(version, 0x31);
        assert_eq!(chip_id, 0x0413);
    }

    #[test]
    fn test_uid_without_family_issues_no_commands() {
        // Any protocol call would panic as an unexpected mock invocation.
        let mut mock = MockBootloaderCommands::new();
        assert_eq!(read_device_uid(&mut mock, None), None);
    }

    #[test]
    fn test_uid_ordinary_family_uses_two_calls() {
        let mut mock = MockBootloaderCommands::new();
        mock.expect_get_flash_size()
            .withf(|family| *family == Family::F1)
            .times(1)
            .returning(|_| Ok(128));
        mock.expect_get_uid()
            .withf(|family| *family == Family::F1)
            .times(1)
            .returning(|_| Ok(vec![0; 12]));
        mock.expect_get_flash_size_and_uid_f4().never();

        let (uid, size) = read_device_uid(&mut mock, Some(Family::F1)).unwrap();
        assert_eq!(size, 128);
        assert_eq!(uid, "0000-0000-00000000-00000000");
    }

    #[test]
    fn test_uid_f4_uses_exactly_one_combined_call() {
        let mut mock = MockBootloaderCommands::new();
        mock.expect_get_flash_size_and_uid_f4()
            .times(1)
            .returning(|| Ok((1024, vec![0xFF; 12])));
        mock.expect_get_flash_size().never();
        mock.expect_get_uid().never();

        // Same result shape as the two-call path.
        let (uid, size) = read_device_uid(&mut mock, Some(Family::F4)).unwrap();
        assert_eq!(size, 1024);
        assert_eq!(uid, "FFFF-FFFF-FFFFFFFF-FFFFFFFF");
    }

    #[test]
    fn test_uid_failure_is_swallowed() {
        let mut mock = MockBootloaderCommands::new();
        mock.expect_get_flash_size()
            .times(1)
            .returning(|_| Err(FlashError::Nak { command: "READ MEMORY" }));
        mock.expect_get_uid().never();

        assert_eq!(read_device_uid(&mut mock, Some(Family::F7)), None);
    }
}
