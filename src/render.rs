//! Frame preparation: stored photo + widget overlays -> display-ready image.
//!
//! The same function backs the preview endpoints and the scheduler, so what
//! the web UI shows is exactly what the panel gets for a given instant.
//!
//! # Example
//!
//! ```rust,ignore
//! use inky_frame::render::{encode_png, prepare_frame};
//!
//! let config = store.snapshot();
//! let frame = prepare_frame(&path, config.orientation, &config.widgets, config.now())?;
//! let png = encode_png(&frame)?;
//! ```

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use chrono::DateTime;
use chrono_tz::Tz;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::photos::normalize;
use crate::widgets::{self, WidgetSettings};
use crate::{Error, Orientation};

/// Load a stored photo and composite the enabled widgets onto it.
///
/// Photos stored before an orientation change are re-fitted to the current
/// orientation's size on the fly; the file on disk is not touched.
pub fn prepare_frame(
    path: &Path,
    orientation: Orientation,
    widgets: &BTreeMap<String, WidgetSettings>,
    now: DateTime<Tz>,
) -> Result<RgbImage, Error> {
    let image = image::open(path)?;
    let base = fit(image, orientation)?;
    Ok(widgets::render(&base, orientation, widgets, now))
}

/// The image at the orientation's exact size, as RGB.
pub fn fit(image: DynamicImage, orientation: Orientation) -> Result<RgbImage, Error> {
    let (width, height) = orientation.dimensions();
    if (image.width(), image.height()) == (width, height) {
        return Ok(image.into_rgb8());
    }
    tracing::debug!(
        "Refitting {}x{} image to {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    Ok(normalize(&image, None, orientation)?.into_rgb8())
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &RgbImage) -> Result<Vec<u8>, Error> {
    let mut out = Cursor::new(Vec::new());
    frame.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgb;

    fn now() -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_prepare_frame_refits_to_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::from_pixel(800, 480, Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let landscape = prepare_frame(&path, Orientation::Landscape, &BTreeMap::new(), now()).unwrap();
        assert_eq!(landscape.dimensions(), (800, 480));
        assert_eq!(landscape.get_pixel(10, 10), &Rgb([200, 10, 10]));

        let portrait = prepare_frame(&path, Orientation::Portrait, &BTreeMap::new(), now()).unwrap();
        assert_eq!(portrait.dimensions(), (480, 800));
    }

    #[test]
    fn test_prepare_frame_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare_frame(
            &dir.path().join("gone.png"),
            Orientation::Landscape,
            &BTreeMap::new(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_encode_png() {
        let png = encode_png(&RgbImage::new(4, 3)).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }
}
