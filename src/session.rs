//! Flashing session workflow.
//!
//! Drives one session through the fixed step order:
//! connect, unprotect, erase, write, verify, read, go. Each step runs only
//! when its config flag is set; an unset flag is a skipped transition, not a
//! failure. On any fatal step failure the target is reset into its resident
//! firmware before the error surfaces, so it is never left stranded in
//! bootloader mode.
//!
//! [`run_session`] is the composition root: it opens the serial transport,
//! binds the wire protocol to it and owns both for the whole session. The
//! transport is closed (dropped) on every exit path.

use std::fmt;

use log::warn;
use serde::Serialize;

use crate::config::FlashConfig;
use crate::error::{FlashError, FlashResult};
use crate::identity::{self, DeviceIdentity};
use crate::protocol::{BootloaderCommands, Progress, Stm32Protocol};
use crate::transport::SerialTransport;
use crate::verify::verify_data;

/// One step of the session workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Connect,
    Unprotect,
    Erase,
    Write,
    Verify,
    Read,
    Go,
}

/// Steps after connect, in their fixed execution order.
const STEP_ORDER: &[Step] = &[
    Step::Unprotect,
    Step::Erase,
    Step::Write,
    Step::Verify,
    Step::Read,
    Step::Go,
];

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Connect => "connect",
            Step::Unprotect => "readout unprotect",
            Step::Erase => "erase",
            Step::Write => "write",
            Step::Verify => "verify",
            Step::Read => "read",
            Step::Go => "go",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one workflow step, decided by the controller.
#[derive(Debug)]
pub enum StepResult {
    /// The step ran, or was skipped because its flag is unset.
    Success,
    /// The step failed but the session can continue (inspection steps).
    Recoverable(FlashError),
    /// The step failed and the session must end after falling back to the
    /// resident firmware.
    Fatal(FlashError),
}

/// Progress and outcome notifications emitted during a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", content = "data")]
pub enum SessionEvent {
    /// Opening the serial port.
    Connecting { port: String },
    /// The target answered the wakeup handshake.
    BootloaderActive,
    /// Bootloader version and chip ID were read.
    Identified {
        bootloader_version: u8,
        chip_id: u16,
        chip_name: String,
    },
    /// Device UID and flash size were read.
    UidRead { uid: String, flash_size_kb: u16 },
    /// Clearing readout protection.
    Unprotecting,
    /// Erasing the full flash.
    Erasing,
    /// Writing firmware data.
    Writing { written: usize, total: usize },
    /// The write step finished.
    WriteComplete,
    /// Reading back for comparison.
    Verifying,
    /// Read-back matches the written image.
    VerifyOk,
    /// Reading memory.
    Reading { read: usize, total: usize },
    /// The read step finished.
    ReadComplete { length: usize },
    /// Transferring control to the target program.
    Jumping { address: u32 },
    /// All requested steps are done.
    Complete,
    /// Free-form log line.
    Log { message: String },
}

impl SessionEvent {
    /// Human-readable message for this event.
    pub fn message(&self) -> String {
        match self {
            SessionEvent::Connecting { port } => format!("Connecting to {port}..."),
            SessionEvent::BootloaderActive => "Bootloader active".into(),
            SessionEvent::Identified {
                bootloader_version,
                chip_id,
                chip_name,
            } => format!(
                "Bootloader version 0x{bootloader_version:02X}, \
                 chip ID 0x{chip_id:03X} ({chip_name})"
            ),
            SessionEvent::UidRead { uid, flash_size_kb } => {
                format!("Device UID {uid}, flash size {flash_size_kb} KiB")
            }
            SessionEvent::Unprotecting => "Clearing readout protection...".into(),
            SessionEvent::Erasing => "Erasing flash...".into(),
            SessionEvent::Writing { written, total } => {
                format!("Writing firmware... {written}/{total} bytes")
            }
            SessionEvent::WriteComplete => "Write complete".into(),
            SessionEvent::Verifying => "Verifying written data...".into(),
            SessionEvent::VerifyOk => "Verification OK".into(),
            SessionEvent::Reading { read, total } => {
                format!("Reading memory... {read}/{total} bytes")
            }
            SessionEvent::ReadComplete { length } => format!("Read {length} bytes"),
            SessionEvent::Jumping { address } => {
                format!("Starting program at 0x{address:08X}")
            }
            SessionEvent::Complete => "Session complete".into(),
            SessionEvent::Log { message } => message.clone(),
        }
    }
}

/// Data handed back to the caller on success.
#[derive(Debug, Default)]
pub struct SessionOutcome {
    /// Whatever identification succeeded after connect.
    pub identity: Option<DeviceIdentity>,
    /// Memory contents from the read step, when it ran.
    pub read_data: Option<Vec<u8>>,
}

/// A connected session: exclusive owner of the bootloader link until it is
/// dropped.
pub struct FlashSession<'a, C: BootloaderCommands> {
    commands: C,
    config: &'a FlashConfig,
}

impl<'a, C: BootloaderCommands> FlashSession<'a, C> {
    /// Force the target into bootloader mode.
    ///
    /// On handshake failure the target is reset back into its resident
    /// firmware and the error surfaces; there is no half-open session state.
    pub fn connect(mut commands: C, config: &'a FlashConfig) -> FlashResult<Self> {
        if let Err(e) = commands.reset_from_system_memory() {
            let _ = commands.reset_from_flash();
            return Err(FlashError::Step {
                step: Step::Connect,
                source: Box::new(e),
                hint: None,
            });
        }
        Ok(Self { commands, config })
    }

    /// Run the identification inspections and the configured steps.
    ///
    /// `firmware` must be present when the write or verify flag is set.
    pub fn run<F>(mut self, firmware: Option<&[u8]>, on_event: F) -> FlashResult<SessionOutcome>
    where
        F: Fn(SessionEvent),
    {
        let mut outcome = SessionOutcome::default();
        self.identify(&mut outcome, &on_event);

        for &step in STEP_ORDER {
            match self.run_step(step, firmware, &mut outcome, &on_event) {
                StepResult::Success => {}
                StepResult::Recoverable(e) => {
                    warn!("{step} skipped: {e}");
                    on_event(SessionEvent::Log {
                        message: format!("{step} skipped: {e}"),
                    });
                }
                StepResult::Fatal(e) => {
                    on_event(SessionEvent::Log {
                        message: "Falling back to the resident firmware".into(),
                    });
                    let _ = self.commands.reset_from_flash();
                    return Err(e);
                }
            }
        }

        on_event(SessionEvent::Complete);
        Ok(outcome)
    }

    /// Reset the target into its resident firmware, outside the main
    /// sequence.
    pub fn reset(&mut self) -> FlashResult<()> {
        self.commands.reset_from_flash()
    }

    /// Best-effort identification; failures are logged and skipped.
    fn identify<F>(&mut self, outcome: &mut SessionOutcome, on_event: &F)
    where
        F: Fn(SessionEvent),
    {
        let (bootloader_version, chip_id) =
            match identity::read_device_id(&mut self.commands) {
                Ok(values) => values,
                Err(e) => {
                    warn!("device identification skipped: {e}");
                    on_event(SessionEvent::Log {
                        message: format!("device identification skipped: {e}"),
                    });
                    return;
                }
            };
        on_event(SessionEvent::Identified {
            bootloader_version,
            chip_id,
            chip_name: identity::chip_name(chip_id).to_string(),
        });

        let uid = identity::read_device_uid(&mut self.commands, self.config.family);
        if let Some((uid, flash_size_kb)) = &uid {
            on_event(SessionEvent::UidRead {
                uid: uid.clone(),
                flash_size_kb: *flash_size_kb,
            });
        }

        let (uid, flash_size_kb) = match uid {
            Some((uid, size)) => (Some(uid), Some(size)),
            None => (None, None),
        };
        outcome.identity = Some(DeviceIdentity {
            bootloader_version,
            chip_id,
            uid,
            flash_size_kb,
        });
    }

    fn run_step<F>(
        &mut self,
        step: Step,
        firmware: Option<&[u8]>,
        outcome: &mut SessionOutcome,
        on_event: &F,
    ) -> StepResult
    where
        F: Fn(SessionEvent),
    {
        match step {
            Step::Unprotect if self.config.unprotect => {
                on_event(SessionEvent::Unprotecting);
                match self.commands.readout_unprotect() {
                    Ok(()) => StepResult::Success,
                    // The cause is not observable from here; active readout
                    // protection is the usual one, so attach it as a hint.
                    Err(e) => StepResult::Fatal(FlashError::Step {
                        step,
                        source: Box::new(e),
                        hint: Some("this usually means readout protection is still active"),
                    }),
                }
            }

            Step::Erase if self.config.erase => {
                on_event(SessionEvent::Erasing);
                match self.commands.erase_memory() {
                    Ok(()) => StepResult::Success,
                    Err(e) => StepResult::Fatal(FlashError::Step {
                        step,
                        source: Box::new(e),
                        hint: Some(
                            "erase is often refused because of readout protection; \
                             consider retrying with unprotect enabled",
                        ),
                    }),
                }
            }

            Step::Write if self.config.write => {
                let data = match firmware {
                    Some(data) => data,
                    None => {
                        return StepResult::Fatal(FlashError::Config {
                            reason: "write requested but no firmware image loaded".into(),
                        })
                    }
                };
                on_event(SessionEvent::Writing {
                    written: 0,
                    total: data.len(),
                });
                match self.commands.write_memory_data(self.config.address, data) {
                    Ok(()) => {
                        on_event(SessionEvent::WriteComplete);
                        StepResult::Success
                    }
                    // No single likely cause to name here.
                    Err(e) => StepResult::Fatal(FlashError::Step {
                        step,
                        source: Box::new(e),
                        hint: None,
                    }),
                }
            }

            Step::Verify if self.config.verify => {
                let data = match firmware {
                    Some(data) => data,
                    None => {
                        return StepResult::Fatal(FlashError::Config {
                            reason: "verify requested but no firmware image loaded".into(),
                        })
                    }
                };
                on_event(SessionEvent::Verifying);
                let read_back = match self
                    .commands
                    .read_memory_data(self.config.address, data.len())
                {
                    Ok(read_back) => read_back,
                    Err(e) => {
                        return StepResult::Fatal(FlashError::Step {
                            step,
                            source: Box::new(e),
                            hint: None,
                        })
                    }
                };
                match verify_data(&read_back, data) {
                    Ok(()) => {
                        on_event(SessionEvent::VerifyOk);
                        StepResult::Success
                    }
                    Err(e) => StepResult::Fatal(FlashError::Step {
                        step,
                        source: Box::new(e),
                        hint: None,
                    }),
                }
            }

            // Reading the same range that was just written would only repeat
            // the verify step, so read runs only without write.
            Step::Read if self.config.read && !self.config.write => {
                on_event(SessionEvent::Reading {
                    read: 0,
                    total: self.config.length,
                });
                match self
                    .commands
                    .read_memory_data(self.config.address, self.config.length)
                {
                    Ok(data) => {
                        on_event(SessionEvent::ReadComplete { length: data.len() });
                        outcome.read_data = Some(data);
                        StepResult::Success
                    }
                    Err(e) => StepResult::Fatal(FlashError::Step {
                        step,
                        source: Box::new(e),
                        hint: None,
                    }),
                }
            }

            Step::Go => match self.config.go_address {
                Some(address) => {
                    on_event(SessionEvent::Jumping { address });
                    match self.commands.go(address) {
                        Ok(()) => StepResult::Success,
                        Err(e) => StepResult::Fatal(FlashError::Step {
                            step,
                            source: Box::new(e),
                            hint: None,
                        }),
                    }
                }
                None => StepResult::Success,
            },

            // Flag not set: skipped transition.
            _ => StepResult::Success,
        }
    }
}

/// Run one complete flashing session against a serial port.
///
/// Opens the transport, applies the line-control options, binds the wire
/// protocol and executes the configured steps. The transport is closed on
/// every exit path, success or failure.
pub fn run_session<F>(
    config: &FlashConfig,
    firmware: Option<&[u8]>,
    on_event: F,
) -> FlashResult<SessionOutcome>
where
    F: Fn(SessionEvent),
{
    config.validate()?;
    if (config.write || config.verify) && firmware.is_none() {
        return Err(FlashError::Config {
            reason: "write and verify require a firmware image".into(),
        });
    }

    let port = config.port.as_deref().ok_or_else(|| FlashError::Config {
        reason: "no serial port selected".into(),
    })?;

    on_event(SessionEvent::Connecting {
        port: port.to_string(),
    });
    let mut transport = SerialTransport::open(port, config.baud, config.parity)?;
    transport.set_line_options(
        config.swap_rts_dtr,
        config.reset_active_high,
        config.boot0_active_low,
    );

    let protocol = Stm32Protocol::new(transport, |progress| match progress {
        Progress::Write { written, total } => on_event(SessionEvent::Writing { written, total }),
        Progress::Read { read, total } => on_event(SessionEvent::Reading { read, total }),
    });

    let session = FlashSession::connect(protocol, config)?;
    on_event(SessionEvent::BootloaderActive);
    session.run(firmware, &on_event)
}

/// Reset the target into its resident firmware without running any other
/// step.
pub fn reset_target(config: &FlashConfig) -> FlashResult<()> {
    let port = config.port.as_deref().ok_or_else(|| FlashError::Config {
        reason: "no serial port selected".into(),
    })?;

    let mut transport = SerialTransport::open(port, config.baud, config.parity)?;
    transport.set_line_options(
        config.swap_rts_dtr,
        config.reset_active_high,
        config.boot0_active_low,
    );

    let mut protocol = Stm32Protocol::new(transport, |_| {});
    protocol.reset_from_flash()
}
