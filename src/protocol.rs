//! STM32 USART bootloader command set.
//!
//! The ROM bootloader speaks a simple framed protocol: the host sends a
//! command byte followed by its complement, the device answers ACK (0x79) or
//! NAK (0x1F), then command-specific payloads follow, each guarded by an XOR
//! checksum. Memory transfers are limited to 256 bytes per command; the bulk
//! operations here chunk larger buffers transparently and report progress
//! through a callback.
//!
//! [`BootloaderCommands`] is the capability set the session workflow runs
//! against; [`Stm32Protocol`] is the wire implementation on top of a
//! [`Transport`].

use std::thread;
use std::time::Duration;

use log::debug;
#[cfg(test)]
use mockall::automock;

use crate::config::{
    Family, MASS_ERASE_TIMEOUT, MAX_TRANSFER_SIZE, RESET_PULSE, RESET_SETTLE, UNPROTECT_TIMEOUT,
};
use crate::error::{FlashError, FlashResult};
use crate::transport::Transport;

/// Byte that wakes the bootloader and lets it detect the baud rate.
const WAKEUP: u8 = 0x7F;
/// Positive acknowledge.
const ACK: u8 = 0x79;
/// Negative acknowledge.
const NAK: u8 = 0x1F;

const CMD_GET: u8 = 0x00;
const CMD_GET_ID: u8 = 0x02;
const CMD_READ_MEMORY: u8 = 0x11;
const CMD_GO: u8 = 0x21;
const CMD_WRITE_MEMORY: u8 = 0x31;
const CMD_ERASE: u8 = 0x43;
const CMD_EXTENDED_ERASE: u8 = 0x44;
const CMD_READOUT_UNPROTECT: u8 = 0x92;

/// Length of the device UID in bytes.
const UID_LENGTH: usize = 12;

/// F4 parts NAK reads at the bare UID and flash-size addresses; the whole
/// device-info block has to be fetched in one aligned read instead.
const F4_DEVICE_INFO_BLOCK: u32 = 0x1FFF_7A00;
const F4_UID_OFFSET: usize = 0x10;
const F4_FLASH_SIZE_OFFSET: usize = 0x22;

/// Progress of a bulk memory transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Write { written: usize, total: usize },
    Read { read: usize, total: usize },
}

/// Commands the session workflow needs from a bootloader.
///
/// Kept as a trait so the workflow can be driven against a mock in tests and
/// so alternative transports stay possible.
#[cfg_attr(test, automock)]
pub trait BootloaderCommands {
    /// Force the target into bootloader mode and perform the wakeup
    /// handshake.
    fn reset_from_system_memory(&mut self) -> FlashResult<()>;

    /// Reset the target so it boots its resident firmware.
    fn reset_from_flash(&mut self) -> FlashResult<()>;

    /// GET: returns the bootloader version byte.
    fn get(&mut self) -> FlashResult<u8>;

    /// GET ID: returns the 16-bit chip ID.
    fn get_id(&mut self) -> FlashResult<u16>;

    /// Clear readout protection. The device mass-erases and resets itself;
    /// on success the bootloader has been re-entered.
    fn readout_unprotect(&mut self) -> FlashResult<()>;

    /// Erase the full flash.
    fn erase_memory(&mut self) -> FlashResult<()>;

    /// Write `data` starting at `address`.
    fn write_memory_data(&mut self, address: u32, data: &[u8]) -> FlashResult<()>;

    /// Read `length` bytes starting at `address`.
    fn read_memory_data(&mut self, address: u32, length: usize) -> FlashResult<Vec<u8>>;

    /// Transfer control to the program at `address`.
    fn go(&mut self, address: u32) -> FlashResult<()>;

    /// Flash size in KiB for the given family.
    fn get_flash_size(&mut self, family: Family) -> FlashResult<u16>;

    /// Raw device UID bytes for the given family.
    fn get_uid(&mut self, family: Family) -> FlashResult<Vec<u8>>;

    /// Combined flash-size and UID read for F4 parts.
    fn get_flash_size_and_uid_f4(&mut self) -> FlashResult<(u16, Vec<u8>)>;
}

/// Wire implementation of the USART bootloader protocol.
pub struct Stm32Protocol<T: Transport, P: Fn(Progress)> {
    transport: T,
    progress: P,
    extended_erase: bool,
}

impl<T: Transport, P: Fn(Progress)> Stm32Protocol<T, P> {
    /// Create a protocol handler over an open transport. `progress` is
    /// invoked once per transferred chunk during bulk reads and writes.
    pub fn new(transport: T, progress: P) -> Self {
        Self {
            transport,
            progress,
            extended_erase: false,
        }
    }

    fn pulse_reset(&mut self) -> FlashResult<()> {
        self.transport.enable_reset(true)?;
        thread::sleep(RESET_PULSE);
        self.transport.enable_reset(false)?;
        thread::sleep(RESET_SETTLE);
        Ok(())
    }

    fn read_reply_byte(&mut self, command: &'static str) -> FlashResult<u8> {
        let mut reply = [0u8; 1];
        self.transport
            .read_exact(&mut reply)
            .map_err(|e| map_timeout(e, command))?;
        Ok(reply[0])
    }

    fn wait_for_ack(&mut self, command: &'static str) -> FlashResult<()> {
        match self.read_reply_byte(command)? {
            ACK => Ok(()),
            NAK => Err(FlashError::Nak { command }),
            byte => Err(FlashError::UnexpectedReply { command, byte }),
        }
    }

    /// ACK wait for commands that legitimately take long (erase, unprotect).
    fn wait_for_ack_timeout(
        &mut self,
        command: &'static str,
        timeout: Duration,
    ) -> FlashResult<()> {
        let mut reply = [0u8; 1];
        self.transport
            .read_exact_timeout(&mut reply, timeout)
            .map_err(|e| map_timeout(e, command))?;
        match reply[0] {
            ACK => Ok(()),
            NAK => Err(FlashError::Nak { command }),
            byte => Err(FlashError::UnexpectedReply { command, byte }),
        }
    }

    fn send_command(&mut self, command: u8, name: &'static str) -> FlashResult<()> {
        self.transport.write(&[command, !command])?;
        self.wait_for_ack(name)
    }

    /// Send a big-endian address guarded by its XOR checksum.
    fn send_address(&mut self, address: u32, command: &'static str) -> FlashResult<()> {
        let bytes = address.to_be_bytes();
        let checksum = xor_checksum(&bytes);
        self.transport.write(&bytes)?;
        self.transport.write(&[checksum])?;
        self.wait_for_ack(command)
    }

    /// Read a length-prefixed reply: count byte, count + 1 payload bytes.
    fn read_counted_reply(&mut self, command: &'static str) -> FlashResult<Vec<u8>> {
        let count = self.read_reply_byte(command)? as usize;
        let mut payload = vec![0u8; count + 1];
        self.transport
            .read_exact(&mut payload)
            .map_err(|e| map_timeout(e, command))?;
        Ok(payload)
    }

    fn read_chunk(&mut self, address: u32, dest: &mut [u8]) -> FlashResult<()> {
        debug_assert!(!dest.is_empty() && dest.len() <= MAX_TRANSFER_SIZE);

        self.send_command(CMD_READ_MEMORY, "READ MEMORY")?;
        self.send_address(address, "READ MEMORY address")?;

        let count = (dest.len() - 1) as u8;
        self.transport.write(&[count, !count])?;
        self.wait_for_ack("READ MEMORY length")?;

        self.transport
            .read_exact(dest)
            .map_err(|e| map_timeout(e, "READ MEMORY data"))
    }

    fn write_chunk(&mut self, address: u32, chunk: &[u8]) -> FlashResult<()> {
        debug_assert!(!chunk.is_empty() && chunk.len() <= MAX_TRANSFER_SIZE);

        self.send_command(CMD_WRITE_MEMORY, "WRITE MEMORY")?;
        self.send_address(address, "WRITE MEMORY address")?;

        // Frame: padded length minus one, data, XOR checksum over both. Flash
        // is written in words, so a trailing partial chunk gets padded with
        // erased-flash bytes.
        let mut frame = Vec::with_capacity(chunk.len() + 5);
        frame.push(0);
        frame.extend_from_slice(chunk);
        while (frame.len() - 1) % 4 != 0 {
            frame.push(0xFF);
        }
        frame[0] = (frame.len() - 2) as u8;
        frame.push(xor_checksum(&frame));

        self.transport.write(&frame)?;
        self.wait_for_ack("WRITE MEMORY data")
    }
}

impl<T: Transport, P: Fn(Progress)> BootloaderCommands for Stm32Protocol<T, P> {
    fn reset_from_system_memory(&mut self) -> FlashResult<()> {
        self.transport.enable_boot0(true)?;
        self.pulse_reset()?;
        self.transport.clear_input()?;

        self.transport.write(&[WAKEUP])?;
        match self.read_reply_byte("bootloader wakeup")? {
            ACK => {}
            // A bootloader that was already awake answers NAK; it is sitting
            // in its command loop and usable as-is.
            NAK => debug!("wakeup answered NAK, bootloader already active"),
            byte => {
                return Err(FlashError::UnexpectedReply {
                    command: "bootloader wakeup",
                    byte,
                })
            }
        }

        self.transport.enable_boot0(false)?;
        Ok(())
    }

    fn reset_from_flash(&mut self) -> FlashResult<()> {
        self.transport.enable_boot0(false)?;
        self.pulse_reset()
    }

    fn get(&mut self) -> FlashResult<u8> {
        self.send_command(CMD_GET, "GET")?;
        let payload = self.read_counted_reply("GET")?;
        self.wait_for_ack("GET")?;

        let version = payload[0];
        let commands = &payload[1..];
        // Newer parts replace the plain erase command with extended erase.
        self.extended_erase = commands.contains(&CMD_EXTENDED_ERASE);
        debug!(
            "bootloader version 0x{version:02X}, {} commands, extended erase: {}",
            commands.len(),
            self.extended_erase
        );
        Ok(version)
    }

    fn get_id(&mut self) -> FlashResult<u16> {
        self.send_command(CMD_GET_ID, "GET ID")?;
        let payload = self.read_counted_reply("GET ID")?;
        self.wait_for_ack("GET ID")?;

        let id = payload
            .iter()
            .fold(0u16, |acc, &byte| (acc << 8) | u16::from(byte));
        debug!("chip ID 0x{id:03X}");
        Ok(id)
    }

    fn readout_unprotect(&mut self) -> FlashResult<()> {
        self.send_command(CMD_READOUT_UNPROTECT, "READOUT UNPROTECT")?;
        // Second ACK arrives once the option bytes are reprogrammed.
        self.wait_for_ack_timeout("READOUT UNPROTECT", UNPROTECT_TIMEOUT)?;

        // Clearing readout protection mass-erases the flash and resets the
        // chip, so the bootloader has to be brought back up.
        thread::sleep(RESET_SETTLE);
        self.reset_from_system_memory()
    }

    fn erase_memory(&mut self) -> FlashResult<()> {
        if self.extended_erase {
            self.send_command(CMD_EXTENDED_ERASE, "EXTENDED ERASE")?;
            // 0xFFFF selects global erase; the checksum of the two bytes is 0.
            self.transport.write(&[0xFF, 0xFF, 0x00])?;
            self.wait_for_ack_timeout("EXTENDED ERASE", MASS_ERASE_TIMEOUT)
        } else {
            self.send_command(CMD_ERASE, "ERASE")?;
            // 0xFF selects global erase, followed by its complement.
            self.transport.write(&[0xFF, 0x00])?;
            self.wait_for_ack_timeout("ERASE", MASS_ERASE_TIMEOUT)
        }
    }

    fn write_memory_data(&mut self, address: u32, data: &[u8]) -> FlashResult<()> {
        let total = data.len();
        let mut written = 0;
        for chunk in data.chunks(MAX_TRANSFER_SIZE) {
            self.write_chunk(address + written as u32, chunk)?;
            written += chunk.len();
            (self.progress)(Progress::Write { written, total });
        }
        Ok(())
    }

    fn read_memory_data(&mut self, address: u32, length: usize) -> FlashResult<Vec<u8>> {
        let mut data = vec![0u8; length];
        let mut read = 0;
        while read < length {
            let chunk = usize::min(length - read, MAX_TRANSFER_SIZE);
            self.read_chunk(address + read as u32, &mut data[read..read + chunk])?;
            read += chunk;
            (self.progress)(Progress::Read { read, total: length });
        }
        Ok(data)
    }

    fn go(&mut self, address: u32) -> FlashResult<()> {
        self.send_command(CMD_GO, "GO")?;
        self.send_address(address, "GO address")
    }

    fn get_flash_size(&mut self, family: Family) -> FlashResult<u16> {
        let address = family
            .flash_size_address()
            .ok_or(FlashError::UnsupportedFamily { family })?;
        let data = self.read_memory_data(address, 2)?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    fn get_uid(&mut self, family: Family) -> FlashResult<Vec<u8>> {
        let address = family
            .uid_address()
            .ok_or(FlashError::UnsupportedFamily { family })?;
        self.read_memory_data(address, UID_LENGTH)
    }

    fn get_flash_size_and_uid_f4(&mut self) -> FlashResult<(u16, Vec<u8>)> {
        let block = self.read_memory_data(F4_DEVICE_INFO_BLOCK, MAX_TRANSFER_SIZE)?;
        let flash_size = u16::from_le_bytes([
            block[F4_FLASH_SIZE_OFFSET],
            block[F4_FLASH_SIZE_OFFSET + 1],
        ]);
        let uid = block[F4_UID_OFFSET..F4_UID_OFFSET + UID_LENGTH].to_vec();
        Ok((flash_size, uid))
    }
}

fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, byte| acc ^ byte)
}

fn map_timeout(error: FlashError, command: &'static str) -> FlashError {
    match error {
        FlashError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            FlashError::Timeout { command }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// Scripted transport: records everything written and serves canned
    /// reply bytes.
    #[derive(Default)]
    struct FakeTransport {
        written: Vec<u8>,
        replies: VecDeque<u8>,
        boot0: Vec<bool>,
        reset: Vec<bool>,
    }

    impl FakeTransport {
        fn with_replies(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Transport for FakeTransport {
        fn write(&mut self, data: &[u8]) -> FlashResult<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn read_exact(&mut self, buffer: &mut [u8]) -> FlashResult<()> {
            for slot in buffer.iter_mut() {
                *slot = self.replies.pop_front().ok_or_else(|| {
                    FlashError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut))
                })?;
            }
            Ok(())
        }

        fn read_exact_timeout(
            &mut self,
            buffer: &mut [u8],
            _timeout: Duration,
        ) -> FlashResult<()> {
            self.read_exact(buffer)
        }

        fn flush(&mut self) -> FlashResult<()> {
            Ok(())
        }

        fn clear_input(&mut self) -> FlashResult<()> {
            Ok(())
        }

        fn enable_reset(&mut self, enable: bool) -> FlashResult<()> {
            self.reset.push(enable);
            Ok(())
        }

        fn enable_boot0(&mut self, enable: bool) -> FlashResult<()> {
            self.boot0.push(enable);
            Ok(())
        }
    }

    fn protocol(transport: FakeTransport) -> Stm32Protocol<FakeTransport, impl Fn(Progress)> {
        Stm32Protocol::new(transport, |_| {})
    }

    #[test]
    fn test_wakeup_handshake() {
        let mut proto = protocol(FakeTransport::with_replies(&[ACK]));
        proto.reset_from_system_memory().unwrap();

        assert_eq!(proto.transport.written, vec![WAKEUP]);
        // BOOT0 raised for the reset pulse, released afterwards.
        assert_eq!(proto.transport.boot0, vec![true, false]);
        // One reset pulse: asserted then released.
        assert_eq!(proto.transport.reset, vec![true, false]);
    }

    #[test]
    fn test_wakeup_tolerates_nak() {
        let mut proto = protocol(FakeTransport::with_replies(&[NAK]));
        assert!(proto.reset_from_system_memory().is_ok());
    }

    #[test]
    fn test_wakeup_rejects_garbage() {
        let mut proto = protocol(FakeTransport::with_replies(&[0x42]));
        assert!(matches!(
            proto.reset_from_system_memory(),
            Err(FlashError::UnexpectedReply { byte: 0x42, .. })
        ));
    }

    #[test]
    fn test_reset_from_flash_lowers_boot0() {
        let mut proto = protocol(FakeTransport::default());
        proto.reset_from_flash().unwrap();

        assert_eq!(proto.transport.boot0, vec![false]);
        assert_eq!(proto.transport.reset, vec![true, false]);
        assert!(proto.transport.written.is_empty());
    }

    #[test]
    fn test_get_parses_version_and_erase_flavor() {
        // ACK, count = 2, version, two command bytes, ACK.
        let replies = [ACK, 0x02, 0x31, CMD_READ_MEMORY, CMD_EXTENDED_ERASE, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        let version = proto.get().unwrap();
        assert_eq!(version, 0x31);
        assert!(proto.extended_erase);
        // Command byte plus complement.
        assert_eq!(proto.transport.written, vec![CMD_GET, 0xFF]);
    }

    #[test]
    fn test_get_id_decodes_big_endian() {
        let replies = [ACK, 0x01, 0x04, 0x13, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        assert_eq!(proto.get_id().unwrap(), 0x0413);
        assert_eq!(proto.transport.written, vec![CMD_GET_ID, !CMD_GET_ID]);
    }

    #[test]
    fn test_get_id_nak() {
        let mut proto = protocol(FakeTransport::with_replies(&[NAK]));
        assert!(matches!(
            proto.get_id(),
            Err(FlashError::Nak { command: "GET ID" })
        ));
    }

    #[test]
    fn test_read_memory_framing() {
        // Command ACK, address ACK, length ACK, 4 data bytes.
        let replies = [ACK, ACK, ACK, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        let data = proto.read_memory_data(0x0800_0000, 4).unwrap();
        assert_eq!(data, vec![0xDE, 0xAD, 0xBE, 0xEF]);

        let written = &proto.transport.written;
        // Command byte and complement.
        assert_eq!(&written[..2], &[CMD_READ_MEMORY, !CMD_READ_MEMORY]);
        // Big-endian address and XOR checksum.
        assert_eq!(&written[2..7], &[0x08, 0x00, 0x00, 0x00, 0x08]);
        // Length minus one and its complement.
        assert_eq!(&written[7..], &[0x03, !0x03]);
    }

    #[test]
    fn test_write_memory_framing_and_padding() {
        // Command ACK, address ACK, data ACK.
        let replies = [ACK, ACK, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        // Five bytes get padded to the next word boundary.
        proto
            .write_memory_data(0x0800_0000, &[1, 2, 3, 4, 5])
            .unwrap();

        let written = &proto.transport.written;
        assert_eq!(&written[..2], &[CMD_WRITE_MEMORY, !CMD_WRITE_MEMORY]);
        assert_eq!(&written[2..7], &[0x08, 0x00, 0x00, 0x00, 0x08]);
        // Payload: padded length minus one, data, 0xFF padding, checksum.
        let frame = &written[7..];
        assert_eq!(frame[0], 7);
        assert_eq!(&frame[1..6], &[1, 2, 3, 4, 5]);
        assert_eq!(&frame[6..9], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(frame[9], xor_checksum(&frame[..9]));
    }

    #[test]
    fn test_bulk_transfer_chunking_and_progress() {
        // 300 bytes of reads: two READ MEMORY commands, 3 ACKs each.
        let mut replies = vec![ACK, ACK, ACK];
        replies.extend(std::iter::repeat(0x5A).take(256));
        replies.extend([ACK, ACK, ACK]);
        replies.extend(std::iter::repeat(0x5A).take(44));

        let seen = RefCell::new(Vec::new());
        let transport = FakeTransport::with_replies(&replies);
        let mut proto = Stm32Protocol::new(transport, |p| seen.borrow_mut().push(p));

        let data = proto.read_memory_data(0x0800_0000, 300).unwrap();
        assert_eq!(data.len(), 300);
        assert!(data.iter().all(|&b| b == 0x5A));
        assert_eq!(
            *seen.borrow(),
            vec![
                Progress::Read {
                    read: 256,
                    total: 300
                },
                Progress::Read {
                    read: 300,
                    total: 300
                },
            ]
        );
    }

    #[test]
    fn test_erase_selects_extended_variant() {
        // GET reporting extended erase, then the erase exchange.
        let replies = [ACK, 0x01, 0x31, CMD_EXTENDED_ERASE, ACK, ACK, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        proto.get().unwrap();
        proto.erase_memory().unwrap();

        let written = &proto.transport.written;
        // After the GET frame: extended erase command, complement, global
        // erase selector with checksum.
        assert_eq!(
            &written[2..],
            &[CMD_EXTENDED_ERASE, !CMD_EXTENDED_ERASE, 0xFF, 0xFF, 0x00]
        );
    }

    #[test]
    fn test_erase_defaults_to_legacy_variant() {
        let replies = [ACK, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        proto.erase_memory().unwrap();
        assert_eq!(
            proto.transport.written,
            vec![CMD_ERASE, !CMD_ERASE, 0xFF, 0x00]
        );
    }

    #[test]
    fn test_erase_nak_is_reported() {
        let mut proto = protocol(FakeTransport::with_replies(&[NAK]));
        assert!(matches!(
            proto.erase_memory(),
            Err(FlashError::Nak { command: "ERASE" })
        ));
    }

    #[test]
    fn test_go_sends_address() {
        let replies = [ACK, ACK];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        proto.go(0x0800_0100).unwrap();
        assert_eq!(
            proto.transport.written,
            vec![CMD_GO, !CMD_GO, 0x08, 0x00, 0x01, 0x00, 0x09]
        );
    }

    #[test]
    fn test_flash_size_little_endian() {
        // READ MEMORY exchange returning the two size bytes.
        let replies = [ACK, ACK, ACK, 0x00, 0x04];
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        let size = proto.get_flash_size(Family::F1).unwrap();
        assert_eq!(size, 1024);
    }

    #[test]
    fn test_unsupported_family_issues_no_commands() {
        let mut proto = protocol(FakeTransport::default());
        assert!(matches!(
            proto.get_uid(Family::F2),
            Err(FlashError::UnsupportedFamily { family: Family::F2 })
        ));
        assert!(proto.transport.written.is_empty());
    }

    #[test]
    fn test_f4_combined_read_extracts_both() {
        let mut block = vec![0u8; 256];
        block[F4_UID_OFFSET..F4_UID_OFFSET + UID_LENGTH]
            .copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        block[F4_FLASH_SIZE_OFFSET] = 0x00;
        block[F4_FLASH_SIZE_OFFSET + 1] = 0x02;

        let mut replies = vec![ACK, ACK, ACK];
        replies.extend_from_slice(&block);
        let mut proto = protocol(FakeTransport::with_replies(&replies));

        let (size, uid) = proto.get_flash_size_and_uid_f4().unwrap();
        assert_eq!(size, 512);
        assert_eq!(uid, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        // One single aligned read of the whole info block.
        let written = &proto.transport.written;
        assert_eq!(&written[..2], &[CMD_READ_MEMORY, !CMD_READ_MEMORY]);
        assert_eq!(&written[2..6], &0x1FFF_7A00u32.to_be_bytes());
    }

    #[test]
    fn test_timeout_maps_to_command_error() {
        let mut proto = protocol(FakeTransport::default());
        assert!(matches!(
            proto.get(),
            Err(FlashError::Timeout { command: "GET" })
        ));
    }
}
