//! Date stamp widget.
//!
//! Shows the current date (no time, so the panel never needs a refresh just
//! to keep a clock current) using a strftime-style format.
//!
//! # Style options
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `format` | `%A, %B %d, %Y` | strftime pattern or a name from [`FORMAT_OPTIONS`] |
//! | `preset` | - | Color preset from [`COLOR_PRESETS`] (alias `style`) |
//! | `font_size` | 24 | Text size in pixels |
//! | `text_color` | `[255, 255, 255]` | RGB |
//! | `bg_color` | `[0, 0, 0, 180]` | RGBA |
//! | `background` | `true` | Draw the background box |
//! | `padding` | 12 | Padding inside the box |
//!
//! Explicit colors win over the preset's.

use std::fmt::Write as _;

use ab_glyph::FontArc;
use chrono::format::{Item, StrftimeItems};
use image::{Rgba, RgbaImage};
use serde::Deserialize;
use serde_json::json;

use super::{text, Anchor, Position, RenderContext, Widget, WidgetSettings};
use crate::Error;

/// Named date formats offered to the UI.
pub const FORMAT_OPTIONS: &[(&str, &str)] = &[
    ("full", "%A, %B %d, %Y"),  // Monday, December 23, 2024
    ("short", "%b %d, %Y"),     // Dec 23, 2024
    ("numeric", "%m/%d/%Y"),    // 12/23/2024
    ("iso", "%Y-%m-%d"),        // 2024-12-23
    ("day_only", "%A"),         // Monday
    ("date_only", "%B %d"),     // December 23
    ("month_year", "%B %Y"),    // December 2024
];

/// A color preset: text RGB, background RGBA, background on/off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPreset {
    pub text_color: [u8; 3],
    pub bg_color: [u8; 4],
    pub background: bool,
}

/// Named color presets offered to the UI.
pub const COLOR_PRESETS: &[(&str, ColorPreset)] = &[
    (
        "classic",
        ColorPreset {
            text_color: [255, 255, 255],
            bg_color: [0, 0, 0, 180],
            background: true,
        },
    ),
    (
        "white_on_black",
        ColorPreset {
            text_color: [255, 255, 255],
            bg_color: [0, 0, 0, 255],
            background: true,
        },
    ),
    (
        "black_on_white",
        ColorPreset {
            text_color: [0, 0, 0],
            bg_color: [255, 255, 255, 200],
            background: true,
        },
    ),
    (
        "transparent",
        ColorPreset {
            text_color: [255, 255, 255],
            bg_color: [0, 0, 0, 0],
            background: false,
        },
    ),
    (
        "red_accent",
        ColorPreset {
            text_color: [255, 255, 255],
            bg_color: [200, 50, 50, 180],
            background: true,
        },
    ),
];

const DEFAULT_FORMAT: &str = "%A, %B %d, %Y";
const DEFAULT_FONT_SIZE: f32 = 24.0;
const DEFAULT_PADDING: u32 = 12;

/// Longest accepted format pattern, in characters.
pub const MAX_FORMAT_LEN: usize = 128;

/// Raw style as stored; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawDateStyle {
    format: Option<String>,
    #[serde(alias = "style")]
    preset: Option<String>,
    font_size: Option<f32>,
    text_color: Option<[u8; 3]>,
    bg_color: Option<[u8; 4]>,
    background: Option<bool>,
    padding: Option<u32>,
}

/// Resolved style with presets and defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DateStyle {
    /// strftime pattern
    pub format: String,
    /// Text size in pixels
    pub font_size: f32,
    /// Text RGB
    pub text_color: [u8; 3],
    /// Background RGBA
    pub bg_color: [u8; 4],
    /// Draw the background box
    pub background: bool,
    /// Padding inside the box
    pub padding: u32,
}

impl DateStyle {
    /// Resolve a widget's style map.
    pub fn from_settings(settings: &WidgetSettings) -> Result<Self, Error> {
        let raw: RawDateStyle =
            serde_json::from_value(serde_json::Value::Object(settings.style.clone()))
                .map_err(|e| Error::validation(format!("invalid date widget style: {}", e)))?;

        let preset = match raw.preset.as_deref() {
            None => COLOR_PRESETS[0].1,
            Some(name) => COLOR_PRESETS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, p)| *p)
                .ok_or_else(|| Error::validation(format!("unknown color preset '{}'", name)))?,
        };

        let format = match raw.format {
            None => DEFAULT_FORMAT.to_string(),
            Some(f) => FORMAT_OPTIONS
                .iter()
                .find(|(name, _)| *name == f)
                .map(|(_, pattern)| pattern.to_string())
                .unwrap_or(f),
        };
        check_format(&format)?;

        Ok(Self {
            format,
            font_size: raw.font_size.unwrap_or(DEFAULT_FONT_SIZE).clamp(6.0, 200.0),
            text_color: raw.text_color.unwrap_or(preset.text_color),
            bg_color: raw.bg_color.unwrap_or(preset.bg_color),
            background: raw.background.unwrap_or(preset.background),
            padding: raw.padding.unwrap_or(DEFAULT_PADDING).min(100),
        })
    }
}

fn check_format(format: &str) -> Result<(), Error> {
    if format.trim().is_empty() {
        return Err(Error::validation("date format is empty"));
    }
    if format.chars().count() > MAX_FORMAT_LEN {
        return Err(Error::validation(format!(
            "date format is longer than {} characters",
            MAX_FORMAT_LEN
        )));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::validation(format!("invalid date format '{}'", format)));
    }
    Ok(())
}

/// The `date` widget.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWidget;

impl DateWidget {
    /// Format the clock reading in `ctx` with `style`.
    pub fn text(&self, style: &DateStyle, ctx: &RenderContext) -> Result<String, Error> {
        let mut out = String::new();
        write!(out, "{}", ctx.now.format_with_items(StrftimeItems::new(&style.format)))
            .map_err(|_| Error::validation(format!("cannot format date with '{}'", style.format)))?;
        Ok(out)
    }
}

impl Widget for DateWidget {
    fn widget_type(&self) -> &'static str {
        "date"
    }

    fn display_name(&self) -> &'static str {
        "Date"
    }

    fn default_settings(&self) -> WidgetSettings {
        let style = json!({
            "format": DEFAULT_FORMAT,
            "font_size": DEFAULT_FONT_SIZE,
            "text_color": [255, 255, 255],
            "bg_color": [0, 0, 0, 180],
            "background": true,
            "padding": DEFAULT_PADDING,
        });
        WidgetSettings {
            enabled: true,
            position: Position::Preset {
                preset: Anchor::BottomRight,
            },
            portrait_position: None,
            style: match style {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    fn options(&self) -> serde_json::Value {
        let formats: serde_json::Map<String, serde_json::Value> = FORMAT_OPTIONS
            .iter()
            .map(|(name, pattern)| (name.to_string(), json!(pattern)))
            .collect();
        let presets: serde_json::Map<String, serde_json::Value> = COLOR_PRESETS
            .iter()
            .map(|(name, p)| {
                (
                    name.to_string(),
                    json!({
                        "text_color": p.text_color,
                        "bg_color": p.bg_color,
                        "background": p.background,
                    }),
                )
            })
            .collect();
        json!({ "formats": formats, "color_presets": presets })
    }

    fn validate(&self, settings: &WidgetSettings) -> Result<(), Error> {
        DateStyle::from_settings(settings).map(|_| ())
    }

    fn render(
        &self,
        settings: &WidgetSettings,
        ctx: &RenderContext,
    ) -> Result<Option<RgbaImage>, Error> {
        let style = DateStyle::from_settings(settings)?;
        let label = self.text(&style, ctx)?;
        if label.trim().is_empty() {
            return Ok(None);
        }
        let font = text::font().ok_or_else(|| Error::Image("no font available".to_string()))?;

        let padding = if style.background { style.padding } else { 0 };
        let inset = padding.saturating_mul(2);
        let (font_size, metrics) =
            fit_line(font, style.font_size, &label, ctx.width.saturating_sub(inset));
        let width = (metrics.width.ceil().max(1.0) as u32)
            .saturating_add(inset)
            .min(ctx.width.max(1));
        let height = (metrics.height.ceil().max(1.0) as u32)
            .saturating_add(inset)
            .min(ctx.height.max(1));

        let fill = if style.background {
            Rgba(style.bg_color)
        } else {
            Rgba([0, 0, 0, 0])
        };
        let mut tile = RgbaImage::from_pixel(width, height, fill);
        text::draw(
            &mut tile,
            font,
            font_size,
            &label,
            style.text_color,
            padding as f32,
            padding as f32,
        );
        Ok(Some(tile))
    }
}

/// Shrink `size` until `label` fits in `max_width` pixels.
fn fit_line(
    font: &FontArc,
    size: f32,
    label: &str,
    max_width: u32,
) -> (f32, text::TextMetrics) {
    let metrics = text::measure(font, size, label);
    if metrics.width <= max_width as f32 {
        return (size, metrics);
    }
    let fitted = (size * max_width as f32 / metrics.width).floor().max(1.0);
    (fitted, text::measure(font, fitted, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Orientation;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn settings(style: serde_json::Value) -> WidgetSettings {
        WidgetSettings {
            enabled: true,
            style: match style {
                serde_json::Value::Object(map) => map,
                _ => panic!("style must be an object"),
            },
            ..WidgetSettings::default()
        }
    }

    fn ctx() -> RenderContext {
        RenderContext {
            orientation: Orientation::Landscape,
            width: 800,
            height: 480,
            now: Tz::UTC.with_ymd_and_hms(2024, 12, 23, 23, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_default_style() {
        let style = DateStyle::from_settings(&settings(json!({}))).unwrap();
        assert_eq!(style.format, "%A, %B %d, %Y");
        assert_eq!(style.font_size, 24.0);
        assert_eq!(style.text_color, [255, 255, 255]);
        assert_eq!(style.bg_color, [0, 0, 0, 180]);
        assert!(style.background);
        assert_eq!(style.padding, 12);
    }

    #[test]
    fn test_format_text() {
        let widget = DateWidget;
        let full = DateStyle::from_settings(&settings(json!({}))).unwrap();
        assert_eq!(widget.text(&full, &ctx()).unwrap(), "Monday, December 23, 2024");

        let iso = DateStyle::from_settings(&settings(json!({"format": "iso"}))).unwrap();
        assert_eq!(widget.text(&iso, &ctx()).unwrap(), "2024-12-23");
    }

    #[test]
    fn test_timezone_changes_the_date() {
        let widget = DateWidget;
        let style = DateStyle::from_settings(&settings(json!({"format": "%Y-%m-%d"}))).unwrap();
        let mut tokyo = ctx();
        tokyo.now = ctx().now.with_timezone(&chrono_tz::Asia::Tokyo);
        assert_eq!(widget.text(&style, &tokyo).unwrap(), "2024-12-24");
    }

    #[test]
    fn test_preset_and_overrides() {
        let style = DateStyle::from_settings(&settings(json!({
            "style": "black_on_white",
            "bg_color": [1, 2, 3, 4],
        })))
        .unwrap();
        assert_eq!(style.text_color, [0, 0, 0]);
        assert_eq!(style.bg_color, [1, 2, 3, 4]);

        let err = DateStyle::from_settings(&settings(json!({"preset": "neon"}))).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_bad_formats() {
        let widget = DateWidget;
        assert!(widget.validate(&settings(json!({"format": "%Q %"}))).is_err());
        assert!(widget.validate(&settings(json!({"format": ""}))).is_err());
        assert!(widget.validate(&settings(json!({"font_size": "big"}))).is_err());
        assert!(widget.validate(&settings(json!({"format": "%b %d"}))).is_ok());
        assert!(widget.validate(&widget.default_settings()).is_ok());
    }

    #[test]
    fn test_validate_caps_format_length() {
        let widget = DateWidget;
        let long = "%A ".repeat(400);
        let err = widget
            .validate(&settings(json!({"format": long, "font_size": 200})))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let limit = "x".repeat(MAX_FORMAT_LEN);
        assert!(widget.validate(&settings(json!({"format": limit}))).is_ok());
    }

    #[test]
    fn test_render_tile_never_exceeds_display() {
        if text::font().is_none() {
            return;
        }
        let widget = DateWidget;
        let wide = "%A ".repeat(MAX_FORMAT_LEN / 3);
        let tile = widget
            .render(
                &settings(json!({"format": wide, "font_size": 200, "padding": 100})),
                &ctx(),
            )
            .unwrap()
            .unwrap();
        assert!(tile.width() <= 800, "{}", tile.width());
        assert!(tile.height() <= 480, "{}", tile.height());

        let mut portrait = ctx();
        portrait.orientation = Orientation::Portrait;
        portrait.width = 480;
        portrait.height = 800;
        let tile = widget
            .render(&settings(json!({"format": wide, "font_size": 200})), &portrait)
            .unwrap()
            .unwrap();
        assert!(tile.width() <= 480, "{}", tile.width());
    }

    #[test]
    fn test_options() {
        let options = DateWidget.options();
        assert_eq!(options["formats"]["iso"], "%Y-%m-%d");
        assert_eq!(options["color_presets"]["classic"]["bg_color"], json!([0, 0, 0, 180]));
        assert_eq!(options["formats"].as_object().unwrap().len(), 7);
    }

    #[test]
    fn test_render_tile_size_follows_padding() {
        if text::font().is_none() {
            return;
        }
        let widget = DateWidget;
        let with_box = widget
            .render(&settings(json!({"format": "iso", "padding": 10})), &ctx())
            .unwrap()
            .unwrap();
        let bare = widget
            .render(
                &settings(json!({"format": "iso", "background": false})),
                &ctx(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(with_box.width(), bare.width() + 20);
        assert_eq!(with_box.height(), bare.height() + 20);
        assert_eq!(with_box.get_pixel(0, 0), &Rgba([0, 0, 0, 180]));
    }
}
