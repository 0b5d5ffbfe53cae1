//! Flip-up glasses servo
//!
//! Drives the lens servo over serial with a line protocol: each command is
//! `ANGLE {n}\n` and the firmware answers `OK` or `ERR`. An unopenable
//! port disables the controller rather than failing startup; voice
//! commands then log and do nothing.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::config::GlassesConfig;
use crate::{Error, Result};

/// How long the firmware gets to acknowledge one command
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for an acknowledgement
const ACK_POLL: Duration = Duration::from_millis(10);

/// ESP32 boot settle after opening the port
const BOOT_SETTLE: Duration = Duration::from_secs(2);

/// Servo reply to one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Ok,
    Err,
    Timeout,
}

/// Controls the flip-up lenses
pub struct GlassesController {
    port: Option<Box<dyn serialport::SerialPort>>,
    raised: bool,
    up_angle: u8,
    down_angle: u8,
}

impl GlassesController {
    /// Open the servo port and park the lenses at the initial angle
    ///
    /// A missing or unopenable port logs a warning and yields a disabled
    /// controller; the rest of the pipeline is unaffected.
    #[must_use]
    pub fn connect(config: &GlassesConfig) -> Self {
        let mut controller = Self {
            port: None,
            raised: false,
            up_angle: config.up_angle,
            down_angle: config.down_angle,
        };

        if !config.enabled {
            return controller;
        }

        let Some(port_name) = config.port.as_deref() else {
            tracing::warn!("glasses enabled but no port configured, servo disabled");
            return controller;
        };

        match serialport::new(port_name, config.baud_rate)
            .timeout(ACK_TIMEOUT)
            .open()
        {
            Ok(port) => {
                tracing::info!(port = %port_name, "servo connected");
                std::thread::sleep(BOOT_SETTLE);
                controller.port = Some(port);

                if let Err(e) = controller.set_angle(config.initial_angle) {
                    tracing::warn!(error = %e, "failed to park servo at initial angle");
                }
            }
            Err(e) => {
                tracing::warn!(port = %port_name, error = %e, "could not open servo port, servo disabled");
            }
        }

        controller
    }

    /// Whether a servo port is attached
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.port.is_some()
    }

    /// Flip the lenses to the other position
    ///
    /// State follows the hardware: a failed or skipped move leaves the
    /// recorded position unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the serial line itself fails
    pub fn toggle(&mut self) -> Result<bool> {
        let target = if self.raised {
            self.down_angle
        } else {
            self.up_angle
        };

        let moved = self.set_angle(target)?;
        if moved {
            self.raised = !self.raised;
            tracing::info!(raised = self.raised, angle = target, "glasses toggled");
        }
        Ok(moved)
    }

    /// Move the servo to an absolute angle
    ///
    /// Returns `Ok(false)` when the controller is disabled or the firmware
    /// refused or never acknowledged the move.
    ///
    /// # Errors
    ///
    /// Returns error for an out-of-range angle or a serial line failure
    pub fn set_angle(&mut self, angle: u8) -> Result<bool> {
        if angle > 180 {
            return Err(Error::Glasses(format!(
                "angle {angle} out of range, must be 0 to 180"
            )));
        }

        let Some(port) = self.port.as_mut() else {
            tracing::debug!(angle, "servo disabled, skipping move");
            return Ok(false);
        };

        // Stale firmware chatter must not be mistaken for this command's ack
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| Error::Glasses(format!("failed to reset servo input: {e}")))?;

        match request_angle(port, angle, ACK_TIMEOUT)? {
            Ack::Ok => Ok(true),
            Ack::Err => {
                tracing::warn!(angle, "servo refused move");
                Ok(false)
            }
            Ack::Timeout => {
                tracing::warn!(angle, "servo did not acknowledge move");
                Ok(false)
            }
        }
    }
}

/// Send one `ANGLE` command and wait for the firmware's verdict
///
/// Lines other than `OK`/`ERR` are boot chatter and are skipped.
fn request_angle<T: Read + Write>(transport: &mut T, angle: u8, timeout: Duration) -> Result<Ack> {
    let command = format!("ANGLE {angle}\n");
    transport.write_all(command.as_bytes())?;
    transport.flush()?;

    let deadline = Instant::now() + timeout;
    let mut pending = String::new();
    let mut scratch = [0u8; 64];

    loop {
        match transport.read(&mut scratch) {
            Ok(0) => {}
            Ok(n) => {
                pending.push_str(&String::from_utf8_lossy(&scratch[..n]));
                while let Some(pos) = pending.find('\n') {
                    let line = pending[..pos].trim().to_string();
                    pending.drain(..=pos);
                    match line.as_str() {
                        "OK" => return Ok(Ack::Ok),
                        "ERR" => return Ok(Ack::Err),
                        _ => {}
                    }
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {}
                _ => return Err(e.into()),
            },
        }

        if Instant::now() >= deadline {
            return Ok(Ack::Timeout);
        }
        std::thread::sleep(ACK_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory transport: records written commands, serves canned replies
    struct FakeServo {
        wire: Vec<u8>,
        replies: Cursor<Vec<u8>>,
    }

    impl FakeServo {
        fn replying(replies: &str) -> Self {
            Self {
                wire: Vec::new(),
                replies: Cursor::new(replies.as_bytes().to_vec()),
            }
        }
    }

    impl Read for FakeServo {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for FakeServo {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.wire.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn command_is_written_as_a_line() {
        let mut servo = FakeServo::replying("OK\n");
        request_angle(&mut servo, 90, Duration::ZERO).unwrap();

        assert_eq!(servo.wire, b"ANGLE 90\n");
    }

    #[test]
    fn ok_ack_is_recognized() {
        let mut servo = FakeServo::replying("OK\n");
        assert_eq!(request_angle(&mut servo, 0, Duration::ZERO).unwrap(), Ack::Ok);
    }

    #[test]
    fn err_ack_is_recognized() {
        let mut servo = FakeServo::replying("ERR\n");
        assert_eq!(
            request_angle(&mut servo, 45, Duration::ZERO).unwrap(),
            Ack::Err
        );
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let mut servo = FakeServo::replying("OK\r\n");
        assert_eq!(request_angle(&mut servo, 20, Duration::ZERO).unwrap(), Ack::Ok);
    }

    #[test]
    fn boot_chatter_before_the_ack_is_skipped() {
        let mut servo = FakeServo::replying("rst: 0x1\nready\nOK\n");
        assert_eq!(
            request_angle(&mut servo, 90, Duration::ZERO).unwrap(),
            Ack::Ok
        );
    }

    #[test]
    fn silent_firmware_times_out() {
        let mut servo = FakeServo::replying("");
        assert_eq!(
            request_angle(&mut servo, 90, Duration::ZERO).unwrap(),
            Ack::Timeout
        );
    }

    #[test]
    fn disabled_controller_skips_moves() {
        let mut controller = GlassesController::connect(&GlassesConfig::default());

        assert!(!controller.is_enabled());
        assert!(!controller.toggle().unwrap());
        assert!(!controller.set_angle(90).unwrap());
    }

    #[test]
    fn out_of_range_angle_is_rejected() {
        let mut controller = GlassesController::connect(&GlassesConfig::default());

        assert!(matches!(
            controller.set_angle(181),
            Err(Error::Glasses(_))
        ));
    }
}
