//! Widget overlays composited onto photos before display.
//!
//! A widget renders a small RGBA tile (for example a date stamp) that is
//! alpha-blended onto the photo at a configured position. Widgets are looked
//! up by type name in a static registry; settings for unknown types are
//! skipped with a warning so an old config never breaks the display.
//!
//! # Settings (JSON)
//!
//! ```json
//! {
//!   "enabled": true,
//!   "position": { "preset": "bottom_right" },
//!   "portrait_position": { "x": 5, "y": 90 },
//!   "style": { "format": "%b %d, %Y", "preset": "black_on_white" }
//! }
//! ```
//!
//! Rendering is a pure function of the base image, the settings and the
//! clock reading passed in, so a preview always matches the frame later sent
//! to the panel for the same instant.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono_tz::Tz;
use image::{Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{Error, Orientation};

pub mod date;
pub mod text;

pub use date::DateWidget;

/// Edge margin for preset anchors, in percent of the display size.
const ANCHOR_MARGIN_PERCENT: u32 = 2;

/// Named placement on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Where a widget goes: a named anchor or percentage coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    /// `{"preset": "bottom_right"}`
    Preset {
        /// Anchor name
        preset: Anchor,
    },
    /// `{"x": 5, "y": 5}`: top-left corner at this percentage (0-100)
    Percent {
        /// Horizontal percentage
        x: f32,
        /// Vertical percentage
        y: f32,
    },
}

impl Default for Position {
    fn default() -> Self {
        Position::Preset {
            preset: Anchor::BottomRight,
        }
    }
}

impl Position {
    /// Top-left pixel for a `tile` on a `display`, clamped on-screen.
    pub fn resolve(&self, display: (u32, u32), tile: (u32, u32)) -> (i64, i64) {
        let (dw, dh) = (display.0 as i64, display.1 as i64);
        let (tw, th) = (tile.0 as i64, tile.1 as i64);

        let (x, y) = match self {
            Position::Percent { x, y } => {
                let px = (x.clamp(0.0, 100.0) / 100.0 * dw as f32) as i64;
                let py = (y.clamp(0.0, 100.0) / 100.0 * dh as f32) as i64;
                (px, py)
            }
            Position::Preset { preset } => {
                let mx = dw * ANCHOR_MARGIN_PERCENT as i64 / 100;
                let my = dh * ANCHOR_MARGIN_PERCENT as i64 / 100;
                let left = mx;
                let center_x = (dw - tw) / 2;
                let right = dw - tw - mx;
                let top = my;
                let center_y = (dh - th) / 2;
                let bottom = dh - th - my;
                match preset {
                    Anchor::TopLeft => (left, top),
                    Anchor::TopCenter => (center_x, top),
                    Anchor::TopRight => (right, top),
                    Anchor::CenterLeft => (left, center_y),
                    Anchor::Center => (center_x, center_y),
                    Anchor::CenterRight => (right, center_y),
                    Anchor::BottomLeft => (left, bottom),
                    Anchor::BottomCenter => (center_x, bottom),
                    Anchor::BottomRight => (right, bottom),
                }
            }
        };

        (
            x.clamp(0, (dw - tw).max(0)),
            y.clamp(0, (dh - th).max(0)),
        )
    }
}

/// Per-widget configuration stored in `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSettings {
    /// Whether the widget is drawn
    #[serde(default)]
    pub enabled: bool,

    /// Placement in landscape (and in portrait unless overridden)
    #[serde(default)]
    pub position: Position,

    /// Placement in portrait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portrait_position: Option<Position>,

    /// Widget-specific style options
    #[serde(default)]
    pub style: serde_json::Map<String, serde_json::Value>,
}

impl WidgetSettings {
    /// Placement for the given orientation.
    pub fn position_for(&self, orientation: Orientation) -> &Position {
        match (orientation, &self.portrait_position) {
            (Orientation::Portrait, Some(position)) => position,
            _ => &self.position,
        }
    }
}

/// Everything a widget may depend on while rendering.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Display orientation
    pub orientation: Orientation,
    /// Width of the image being composited
    pub width: u32,
    /// Height of the image being composited
    pub height: u32,
    /// Clock reading, in the frame's timezone
    pub now: DateTime<Tz>,
}

/// A widget type.
pub trait Widget: Send + Sync {
    /// Registry key, e.g. `"date"`
    fn widget_type(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Settings offered to the UI as a starting point
    fn default_settings(&self) -> WidgetSettings;

    /// Option metadata for the UI (formats, presets...)
    fn options(&self) -> serde_json::Value;

    /// Reject settings this widget could never render.
    fn validate(&self, settings: &WidgetSettings) -> Result<(), Error>;

    /// Render the widget tile, or `None` when there is nothing to draw.
    fn render(
        &self,
        settings: &WidgetSettings,
        ctx: &RenderContext,
    ) -> Result<Option<RgbaImage>, Error>;
}

static REGISTRY: &[&dyn Widget] = &[&DateWidget];

/// Look up a widget type by name.
pub fn lookup(widget_type: &str) -> Option<&'static dyn Widget> {
    REGISTRY
        .iter()
        .copied()
        .find(|w| w.widget_type() == widget_type)
}

/// All registered widget types.
pub fn registry() -> &'static [&'static dyn Widget] {
    REGISTRY
}

/// Composite every enabled widget onto a copy of `base`.
///
/// Widgets are drawn in type-name order. Unknown types and widgets that fail
/// to render are skipped with a warning.
pub fn render(
    base: &RgbImage,
    orientation: Orientation,
    widgets: &BTreeMap<String, WidgetSettings>,
    now: DateTime<Tz>,
) -> RgbImage {
    let mut out = base.clone();
    let ctx = RenderContext {
        orientation,
        width: base.width(),
        height: base.height(),
        now,
    };

    for (widget_type, settings) in widgets {
        if !settings.enabled {
            continue;
        }
        let Some(widget) = lookup(widget_type) else {
            tracing::warn!("Unknown widget type '{}', skipping", widget_type);
            continue;
        };

        let tile = match widget.render(settings, &ctx) {
            Ok(Some(tile)) => tile,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Widget '{}' failed to render: {}", widget_type, e);
                continue;
            }
        };

        let (x, y) = settings
            .position_for(orientation)
            .resolve((ctx.width, ctx.height), tile.dimensions());
        blend_onto(&mut out, &tile, x, y);
    }

    out
}

/// Alpha-blend an RGBA tile onto an opaque RGB image.
fn blend_onto(dst: &mut RgbImage, tile: &RgbaImage, left: i64, top: i64) {
    for (tx, ty, px) in tile.enumerate_pixels() {
        let x = left + tx as i64;
        let y = top + ty as i64;
        if x < 0 || y < 0 || x >= dst.width() as i64 || y >= dst.height() as i64 {
            continue;
        }
        let a = px[3] as u32;
        if a == 0 {
            continue;
        }
        let under = dst.get_pixel(x as u32, y as u32);
        let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a) + 127) / 255) as u8;
        let blended = Rgb([
            mix(px[0], under[0]),
            mix(px[1], under[1]),
            mix(px[2], under[2]),
        ]);
        dst.put_pixel(x as u32, y as u32, blended);
    }
}
