//! # inky-frame
//!
//! A photo frame controller for [Inky Impression](https://shop.pimoroni.com)
//! 7-color e-ink displays on a Raspberry Pi.
//!
//! The crate provides everything the frame's web service needs:
//! - A JSON config store with serialized, atomic updates
//! - A photo store with upload normalization and crop handling
//! - Widget overlays (date stamp) composited onto photos
//! - A display adapter that dithers to the 7-color palette, or simulates
//!   the panel in dev mode
//! - A cycling scheduler that rotates photos on a timer
//! - Optional axum router exposing the REST API
//!
//! ## Quick Start (axum)
//!
//! ```rust,ignore
//! use inky_frame::{api, display, AppContext, Settings};
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = Settings::default();
//! let display = display::select(settings.display_mode, &settings.display_device);
//! let cancel = CancellationToken::new();
//! let (ctx, _scheduler) = AppContext::start(&settings, display, cancel.clone())?;
//!
//! let app = api::router(ctx);
//! let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## Display Dimensions
//!
//! The Inky Impression 7.3" panel is 800x480 and landscape-native:
//! - Landscape photos are stored at exactly 800x480
//! - Portrait photos are stored at exactly 480x800 and rotated before
//!   being sent to the panel
//! - Frames are reduced to 7 colors with error-diffusion dithering
//!
//! ## Feature Flags
//!
//! - `axum` (default) - REST API router, handlers and extractors

pub mod app;
pub mod config;
pub mod display;
mod error;
pub mod messages;
pub mod photos;
pub mod render;
pub mod scheduler;
pub mod settings;
pub mod widgets;

pub use app::AppContext;
pub use config::{Config, ConfigStore};
pub use display::{Display, DisplayMode};
pub use error::Error;
pub use photos::{CropRect, PhotoInfo, PhotoStore};
pub use scheduler::{SchedulerHandle, SchedulerState, SchedulerStatus};
pub use settings::Settings;

#[cfg(feature = "axum")]
pub mod api;
#[cfg(feature = "axum")]
pub mod axum_ext;

use serde::{Deserialize, Serialize};

/// Panel width in pixels (landscape-native)
pub const DISPLAY_WIDTH: u32 = 800;

/// Panel height in pixels (landscape-native)
pub const DISPLAY_HEIGHT: u32 = 480;

/// Maximum upload size in bytes
pub const MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// How the frame is mounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// 800x480
    #[default]
    Landscape,
    /// 480x800
    Portrait,
}

impl Orientation {
    /// Target pixel dimensions `(width, height)` for stored photos.
    ///
    /// # Example
    ///
    /// ```
    /// use inky_frame::Orientation;
    ///
    /// assert_eq!(Orientation::Landscape.dimensions(), (800, 480));
    /// assert_eq!(Orientation::Portrait.dimensions(), (480, 800));
    /// ```
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Orientation::Landscape => (DISPLAY_WIDTH, DISPLAY_HEIGHT),
            Orientation::Portrait => (DISPLAY_HEIGHT, DISPLAY_WIDTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_serialization() {
        assert_eq!(
            serde_json::to_string(&Orientation::Portrait).unwrap(),
            "\"portrait\""
        );
        let parsed: Orientation = serde_json::from_str("\"landscape\"").unwrap();
        assert_eq!(parsed, Orientation::Landscape);
        assert!(serde_json::from_str::<Orientation>("\"diagonal\"").is_err());
    }

    #[test]
    fn test_constants() {
        assert_eq!(DISPLAY_WIDTH, 800);
        assert_eq!(DISPLAY_HEIGHT, 480);
        assert_eq!(MAX_UPLOAD_SIZE, 16 * 1024 * 1024);
    }
}
