//! Inky Impression 7.3" panel adapter.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::palette::{dither, pack};
use super::Display;
use crate::{Error, DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Bytes in one packed 800x480 frame (4 bits per pixel).
pub const FRAME_BYTES: usize = (DISPLAY_WIDTH * DISPLAY_HEIGHT / 2) as usize;

/// Sink for packed frames.
pub trait Panel: Send {
    /// Write one packed frame and block until the refresh completes.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error>;
}

/// Panel exposed as a character device by the kernel driver.
#[derive(Debug)]
pub struct DevicePanel {
    path: PathBuf,
    file: File,
}

impl DevicePanel {
    /// Open the device node for writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            Error::HardwareUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self { path, file })
    }
}

impl Panel for DevicePanel {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.file
            .write_all(frame)
            .and_then(|()| self.file.flush())
            .map_err(|e| Error::Display(format!("write to {} failed: {}", self.path.display(), e)))
    }
}

/// Real-hardware [`Display`]: rotate, resize, dither, pack, write.
pub struct InkyPanel<P> {
    panel: Mutex<P>,
}

impl<P: Panel> InkyPanel<P> {
    pub fn new(panel: P) -> Self {
        Self {
            panel: Mutex::new(panel),
        }
    }
}

/// Turn a frame into the panel's packed wire format.
///
/// Portrait frames are rotated 90° counter-clockwise since the panel is
/// landscape-native.
pub fn encode_frame(image: &RgbImage) -> Vec<u8> {
    let rotated;
    let mut frame = image;
    if frame.height() > frame.width() {
        rotated = imageops::rotate270(frame);
        frame = &rotated;
    }

    let resized;
    if frame.dimensions() != (DISPLAY_WIDTH, DISPLAY_HEIGHT) {
        resized = imageops::resize(frame, DISPLAY_WIDTH, DISPLAY_HEIGHT, FilterType::Lanczos3);
        frame = &resized;
    }

    pack(&dither(frame))
}

impl<P: Panel> Display for InkyPanel<P> {
    fn name(&self) -> &'static str {
        "inky"
    }

    fn present(&self, image: &RgbImage) -> Result<(), Error> {
        let frame = encode_frame(image);
        let mut panel = self.panel.lock().unwrap_or_else(PoisonError::into_inner);
        let started = std::time::Instant::now();
        panel.write_frame(&frame)?;
        tracing::info!("Panel refreshed in {:.1}s", started.elapsed().as_secs_f32());
        Ok(())
    }
}
