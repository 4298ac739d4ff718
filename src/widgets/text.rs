//! Font discovery and text rasterization for widgets.
//!
//! The font is resolved once per process: an explicit font file if one was
//! configured with [`init_font`], otherwise the first usable sans-serif face
//! found among the system fonts.

use std::path::Path;
use std::sync::OnceLock;

use ab_glyph::{point, Font, FontArc, FontVec, PxScale, ScaleFont};
use fontdb::{Database, Family, Query};
use image::{Rgba, RgbaImage};

use crate::Error;

static FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// Families tried in order before falling back to any installed face.
const PREFERRED_FAMILIES: &[&str] = &["DejaVu Sans", "Noto Sans", "Liberation Sans", "Helvetica"];

/// Resolve the widget font at startup.
///
/// Call once before serving requests. If `path` is given but unreadable, a
/// warning is logged and system fonts are used instead. Later calls have no
/// effect.
pub fn init_font(path: Option<&Path>) {
    let font = path
        .and_then(|p| match load_file(p) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!("Failed to load font '{}': {}", p.display(), e);
                None
            }
        })
        .or_else(discover_system_font);

    match &font {
        Some(_) => tracing::info!("Widget font ready"),
        None => tracing::warn!("No usable font found, text widgets will be skipped"),
    }
    let _ = FONT.set(font);
}

/// The widget font, discovering a system font on first use.
pub fn font() -> Option<&'static FontArc> {
    FONT.get_or_init(discover_system_font).as_ref()
}

fn load_file(path: &Path) -> Result<FontArc, Error> {
    let data = std::fs::read(path)
        .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
    FontArc::try_from_vec(data)
        .map_err(|e| Error::Image(format!("Invalid font {}: {}", path.display(), e)))
}

fn discover_system_font() -> Option<FontArc> {
    let mut db = Database::new();
    db.load_system_fonts();

    let families = PREFERRED_FAMILIES
        .iter()
        .map(|name| Family::Name(*name))
        .chain(std::iter::once(Family::SansSerif));
    for family in families {
        let id = db.query(&Query {
            families: &[family],
            ..Default::default()
        });
        if let Some(font) = id.and_then(|id| load_face(&db, id)) {
            return Some(font);
        }
    }

    let ids: Vec<fontdb::ID> = db.faces().map(|face| face.id).collect();
    ids.into_iter().find_map(|id| load_face(&db, id))
}

fn load_face(db: &Database, id: fontdb::ID) -> Option<FontArc> {
    db.with_face_data(id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
    })
    .flatten()
    .map(FontArc::new)
}

/// Size of rendered text: advance width and line height, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Total advance width
    pub width: f32,
    /// Ascent minus descent
    pub height: f32,
    /// Distance from the top of the line to the baseline
    pub ascent: f32,
}

/// Measure a single line of text.
pub fn measure(font: &FontArc, size: f32, text: &str) -> TextMetrics {
    let scaled = font.as_scaled(PxScale::from(size));
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    TextMetrics {
        width,
        height: scaled.ascent() - scaled.descent(),
        ascent: scaled.ascent(),
    }
}

/// Draw a single line of text with its top-left corner at `(left, top)`.
pub fn draw(
    canvas: &mut RgbaImage,
    font: &FontArc,
    size: f32,
    text: &str,
    color: [u8; 3],
    left: f32,
    top: f32,
) {
    let scaled = font.as_scaled(PxScale::from(size));
    let baseline = top + scaled.ascent();
    let (width, height) = canvas.dimensions();
    let mut cursor_x = left;
    let mut previous = None;

    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph_id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        let mut glyph = scaled.scaled_glyph(ch);
        glyph.position = point(cursor_x, baseline);

        if let Some(outline) = font.outline_glyph(glyph) {
            let bounds = outline.px_bounds();
            outline.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i64 + gx as i64;
                let y = bounds.min.y as i64 + gy as i64;
                if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                    return;
                }
                let px = canvas.get_pixel_mut(x as u32, y as u32);
                blend_over(px, color, coverage.clamp(0.0, 1.0));
            });
        }

        cursor_x += scaled.h_advance(glyph_id);
        previous = Some(glyph_id);
    }
}

/// Source-over compositing of an opaque color with `alpha` coverage.
fn blend_over(dst: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);
    for i in 0..3 {
        let src = color[i] as f32;
        let under = dst[i] as f32;
        let value = (src * alpha + under * dst_a * (1.0 - alpha)) / out_a;
        dst[i] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
