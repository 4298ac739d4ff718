//! Display driver adapter.
//!
//! Everything that draws on the panel goes through the [`Display`] trait:
//! [`InkyPanel`] drives the real e-ink panel, [`Simulator`] stands in for it
//! in development so the rest of the service behaves identically.
//!
//! A real refresh takes 20-25 seconds; callers run [`Display::present`] on a
//! blocking thread, never on a request task.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::Error;

pub mod inky;
pub mod palette;

pub use inky::{DevicePanel, InkyPanel, Panel};

/// Something that can show a frame.
pub trait Display: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Show a frame, blocking until the panel has refreshed.
    fn present(&self, image: &RgbImage) -> Result<(), Error>;
}

/// Dev-mode display: logs and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simulator;

impl Display for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn present(&self, image: &RgbImage) -> Result<(), Error> {
        tracing::info!(
            "Inky hardware not available, dev mode: would display {}x{} frame",
            image.width(),
            image.height()
        );
        Ok(())
    }
}

/// Which display implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Hardware when the device node exists, otherwise the simulator
    #[default]
    Auto,
    /// Always try the hardware
    Hardware,
    /// Never touch the hardware
    Simulated,
}

impl FromStr for DisplayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DisplayMode::Auto),
            "hardware" | "inky" => Ok(DisplayMode::Hardware),
            "simulated" | "simulator" | "dev" => Ok(DisplayMode::Simulated),
            other => Err(Error::validation(format!("unknown display mode '{}'", other))),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayMode::Auto => "auto",
            DisplayMode::Hardware => "hardware",
            DisplayMode::Simulated => "simulated",
        })
    }
}

/// Pick the display implementation once at startup.
///
/// Hardware that cannot be opened is logged and replaced by the simulator,
/// so a missing panel never stops the web service.
pub fn select(mode: DisplayMode, device: &Path) -> Arc<dyn Display> {
    let try_hardware = match mode {
        DisplayMode::Simulated => false,
        DisplayMode::Hardware => true,
        DisplayMode::Auto => device.exists(),
    };
    if !try_hardware {
        tracing::info!("Using simulated display ({} mode)", mode);
        return Arc::new(Simulator);
    }

    match DevicePanel::open(device) {
        Ok(panel) => {
            tracing::info!("Using Inky panel at {}", device.display());
            Arc::new(InkyPanel::new(panel))
        }
        Err(e) => {
            tracing::warn!("{}, falling back to simulated display", e);
            Arc::new(Simulator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mode_parsing() {
        assert_eq!("auto".parse::<DisplayMode>().unwrap(), DisplayMode::Auto);
        assert_eq!("Hardware".parse::<DisplayMode>().unwrap(), DisplayMode::Hardware);
        assert_eq!("dev".parse::<DisplayMode>().unwrap(), DisplayMode::Simulated);
        assert!("projector".parse::<DisplayMode>().is_err());
        assert_eq!(DisplayMode::Simulated.to_string(), "simulated");
    }

    #[test]
    fn test_select() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("inky");

        assert_eq!(select(DisplayMode::Simulated, &missing).name(), "simulator");
        assert_eq!(select(DisplayMode::Auto, &missing).name(), "simulator");
        assert_eq!(select(DisplayMode::Hardware, &missing).name(), "simulator");

        std::fs::write(&missing, b"").unwrap();
        assert_eq!(select(DisplayMode::Auto, &missing).name(), "inky");
    }

    #[test]
    fn test_simulator_succeeds() {
        assert!(Simulator.present(&RgbImage::new(800, 480)).is_ok());
    }
}
