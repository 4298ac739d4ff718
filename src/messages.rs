//! Request and response bodies for the HTTP API.
//!
//! These types define the JSON the web UI exchanges with the frame. They are
//! plain serde types so they can be used without the `axum` feature, e.g. by
//! a client.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::photos::{CropRect, StoredPhoto};
use crate::widgets::WidgetSettings;
use crate::{Error, Orientation};

/// Body of `POST /api/config`: a partial update.
///
/// Absent fields are left unchanged.
///
/// # Example
///
/// ```
/// use inky_frame::messages::ConfigUpdate;
/// use inky_frame::Config;
///
/// let update: ConfigUpdate = serde_json::from_str(r#"{"cycle_interval": 120}"#).unwrap();
/// let mut config = Config::default();
/// update.apply(&mut config);
/// assert_eq!(config.cycle_interval, 120);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_order: Option<Vec<String>>,

    /// IANA name; an empty string resets to UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ConfigUpdate {
    #[must_use]
    pub fn with_cycle_enabled(mut self, enabled: bool) -> Self {
        self.cycle_enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_cycle_interval(mut self, seconds: u64) -> Self {
        self.cycle_interval = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Copy the present fields into `config`. Validation happens on commit.
    pub fn apply(&self, config: &mut Config) {
        if let Some(enabled) = self.cycle_enabled {
            config.cycle_enabled = enabled;
        }
        if let Some(interval) = self.cycle_interval {
            config.cycle_interval = interval;
        }
        if let Some(orientation) = self.orientation {
            config.orientation = orientation;
        }
        if let Some(order) = &self.photo_order {
            config.photo_order = order.clone();
        }
        if let Some(tz) = &self.timezone {
            config.timezone = match tz.trim() {
                "" => None,
                tz => Some(tz.to_string()),
            };
        }
    }
}

/// Response for both upload endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    /// Name the photo was stored under (may differ from the upload's)
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl From<StoredPhoto> for UploadResponse {
    fn from(stored: StoredPhoto) -> Self {
        Self {
            success: true,
            name: stored.name,
            width: stored.width,
            height: stored.height,
        }
    }
}

/// Body of `POST /api/photos/upload-cropped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CroppedUpload {
    /// Base64 image, bare or as a `data:` URL
    pub image: String,

    /// Requested name (default: `cropped.png`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Region of `image` to keep; the whole image when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,

    /// Overwrite `filename` instead of storing a new photo
    #[serde(default)]
    pub is_recrop: bool,

    /// Target orientation; the configured one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl CroppedUpload {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            filename: None,
            crop: None,
            is_recrop: false,
            orientation: None,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    #[must_use]
    pub fn recrop(mut self) -> Self {
        self.is_recrop = true;
        self
    }

    /// Requested filename or the default.
    pub fn filename(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or("cropped.png")
    }

    /// Decoded image bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, Error> {
        decode_data_url(&self.image)
    }
}

/// Decode base64 data, accepting a `data:<mime>;base64,` prefix.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, Error> {
    let payload = match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(Error::validation("no image data provided"));
    }
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| Error::validation(format!("invalid base64 image data: {}", e)))
}

/// Encode PNG bytes as a `data:image/png;base64,` URL.
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Response for `DELETE /api/photos/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    /// False when there was nothing to delete
    pub deleted: bool,
}

/// Response for `POST /api/display/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayResponse {
    pub success: bool,
    pub displayed: String,
}

impl DisplayResponse {
    pub fn new(displayed: impl Into<String>) -> Self {
        Self {
            success: true,
            displayed: displayed.into(),
        }
    }
}

/// Registry entry in [`WidgetsResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetInfo {
    /// Human-readable name
    pub name: String,
    pub default_config: WidgetSettings,
}

/// Response for `GET /api/widgets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetsResponse {
    /// Configured widgets
    pub current: BTreeMap<String, WidgetSettings>,
    /// Registered widget types
    pub available: BTreeMap<String, WidgetInfo>,
}

/// Response for `POST /api/widgets/{type}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetUpdateResponse {
    pub success: bool,
    pub config: WidgetSettings,
}

/// Body of `POST /api/widgets/preview`; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    /// Photo to preview on; the first listed photo when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,

    /// Widget settings to try; the configured ones when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widgets: Option<BTreeMap<String, WidgetSettings>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

/// Response for `POST /api/widgets/preview`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResponse {
    /// PNG data URL
    pub preview: String,
}

/// Response for `GET /api/preview/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailResponse {
    /// PNG data URL
    pub thumbnail: String,
}

/// Error body used for every non-2xx JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
