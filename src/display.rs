use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::engine::Resolution;

/// Optional two-line status display next to the reader.
///
/// Lines are written to a character device (for example a microcontroller
/// driving an LCD over USB serial), one line per `\n`. The device stays open
/// between messages, since reopening a serial port resets most boards. It is
/// reopened on the next message after a failed write. Failures are logged and
/// otherwise ignored.
#[derive(Debug, Default)]
pub struct StatusDisplay {
    device: Option<PathBuf>,
    handle: Option<File>,
}

impl StatusDisplay {
    pub fn new(device: Option<PathBuf>) -> Self {
        Self {
            device,
            handle: None,
        }
    }

    pub fn ready(&mut self) {
        self.show("Ready", "Place your card");
    }

    pub fn show_resolution(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Recorded { user, record } => {
                self.show(&user.name, &record.direction.to_string())
            }
            Resolution::Unrecognized { .. } => self.show("Unknown Card", "Please register"),
        }
    }

    pub fn show(&mut self, line1: &str, line2: &str) {
        let Some(device) = &self.device else {
            return;
        };

        if self.handle.is_none() {
            match OpenOptions::new().append(true).open(device) {
                Ok(file) => {
                    tracing::debug!("Opened display {}", device.display());
                    self.handle = Some(file);
                }
                Err(e) => {
                    tracing::warn!("Failed to open display {}: {}", device.display(), e);
                    return;
                }
            }
        }

        let Some(file) = self.handle.as_mut() else {
            return;
        };
        let result = file
            .write_all(format!("{}\n{}\n", line1, line2).as_bytes())
            .and_then(|()| file.flush());

        match result {
            Ok(()) => tracing::debug!("Display: {} / {}", line1, line2),
            Err(e) => {
                tracing::warn!("Failed to write to display {}: {}", device.display(), e);
                self.handle = None;
            }
        }
    }
}
