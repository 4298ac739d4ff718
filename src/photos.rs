//! Photo storage on disk.
//!
//! Layout under the data directory:
//!
//! | Path | Contents |
//! |------|----------|
//! | `photos/` | Display-ready copies at the orientation's exact size |
//! | `originals/` | Untouched raw uploads, kept for re-cropping |
//!
//! Photos are identified by filename. Every name that reaches the filesystem
//! goes through [`validate_filename`], so a request can never address a file
//! outside these two directories.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::config::{write_atomic, ConfigStore};
use crate::{Error, Orientation};

/// Longest accepted filename in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Stems longer than this are truncated when sanitizing upload names.
const MAX_STEM_LEN: usize = 100;

/// Extensions listed as photos.
const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Check that `name` is a plain, safe filename.
///
/// Accepts `[A-Za-z0-9][A-Za-z0-9._-]*` up to [`MAX_FILENAME_LEN`] bytes,
/// without `..`. Anything else (separators, traversal, hidden files) is a
/// validation error.
pub fn validate_filename(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FILENAME_LEN
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !name.contains("..");

    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid filename '{}'", name)))
    }
}

/// Turn an arbitrary client-supplied name into a safe filename.
///
/// Drops any directory part, replaces unsafe characters with `_` and strips
/// leading punctuation. Returns `"photo"` when nothing usable is left.
///
/// # Example
///
/// ```
/// use inky_frame::photos::sanitize_filename;
///
/// assert_eq!(sanitize_filename("C:\\Users\\me\\My Cat.jpg"), "My_Cat.jpg");
/// assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
/// ```
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    while name.contains("..") {
        name = name.replace("..", ".");
    }

    let name = name.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    let (stem, ext) = split_extension(name);
    let stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    let stem = stem.trim_end_matches('.');

    match (stem.is_empty(), ext) {
        (true, _) => "photo".to_string(),
        (false, Some(ext)) => format!("{}.{}", stem, ext),
        (false, None) => stem.to_string(),
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn extension_of(name: &str) -> Option<String> {
    split_extension(name).1.map(|e| e.to_ascii_lowercase())
}

/// Detect and decode an uploaded image, rejecting unsupported types.
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat), Error> {
    let format = image::guess_format(bytes)
        .map_err(|_| Error::validation("unsupported or unrecognized image type"))?;
    if !matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::WebP
    ) {
        return Err(Error::validation(format!(
            "unsupported image type {:?}",
            format
        )));
    }
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Error::validation(format!("invalid image: {}", e)))?;
    Ok((image, format))
}

/// Encode an image in the format implied by `name`'s extension.
fn encode_for(name: &str, image: &DynamicImage) -> Result<Vec<u8>, Error> {
    let format = match extension_of(name).as_deref() {
        Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
        Some("png") => ImageFormat::Png,
        _ => {
            return Err(Error::validation(format!(
                "'{}' must end in .png, .jpg or .jpeg",
                name
            )))
        }
    };
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

/// A crop rectangle in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width (must be > 0)
    pub width: u32,
    /// Height (must be > 0)
    pub height: u32,
}

impl CropRect {
    /// Check the rectangle is non-empty and inside a `width`×`height` image.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), Error> {
        let fits = self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height);
        if fits {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "crop {}x{}+{}+{} does not fit a {}x{} image",
                self.width, self.height, self.x, self.y, width, height
            )))
        }
    }

    /// Shrink around the center to the aspect ratio `target_w`:`target_h`.
    pub fn fit_aspect(self, target_w: u32, target_h: u32) -> CropRect {
        let (w, h) = (self.width as u64, self.height as u64);
        let (tw, th) = (target_w as u64, target_h as u64);

        if w * th > h * tw {
            let new_w = ((h * tw + th / 2) / th).clamp(1, w) as u32;
            CropRect {
                x: self.x + (self.width - new_w) / 2,
                width: new_w,
                ..self
            }
        } else {
            let new_h = ((w * th + tw / 2) / tw).clamp(1, h) as u32;
            CropRect {
                y: self.y + (self.height - new_h) / 2,
                height: new_h,
                ..self
            }
        }
    }
}

/// Crop (optionally) and resize an image to the orientation's exact size.
///
/// Without a crop rectangle the whole image is used. The region is trimmed
/// around its center to the target aspect ratio before resizing, so the
/// result is never distorted.
pub fn normalize(
    image: &DynamicImage,
    crop: Option<CropRect>,
    orientation: Orientation,
) -> Result<DynamicImage, Error> {
    let (width, height) = image.dimensions();
    let region = match crop {
        Some(rect) => {
            rect.validate(width, height)?;
            rect
        }
        None => CropRect {
            x: 0,
            y: 0,
            width,
            height,
        },
    };
    if region.width == 0 || region.height == 0 {
        return Err(Error::validation("image has no pixels"));
    }

    let (tw, th) = orientation.dimensions();
    let region = region.fit_aspect(tw, th);
    let cropped = image.crop_imm(region.x, region.y, region.width, region.height);
    if cropped.dimensions() == (tw, th) {
        return Ok(cropped);
    }
    Ok(cropped.resize_exact(tw, th, FilterType::Lanczos3))
}

/// Listing entry for a stored photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoInfo {
    /// Filename
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// Result of storing an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPhoto {
    /// Filename the photo was stored under
    pub name: String,
    /// Pixel width of the display copy
    pub width: u32,
    /// Pixel height of the display copy
    pub height: u32,
}

/// Directory-backed photo store.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    photos_dir: PathBuf,
    originals_dir: PathBuf,
}

impl PhotoStore {
    /// Open (and create if needed) the store under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, Error> {
        let data_dir = data_dir.as_ref();
        let store = Self {
            photos_dir: data_dir.join("photos"),
            originals_dir: data_dir.join("originals"),
        };
        for dir in [&store.photos_dir, &store.originals_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(store)
    }

    /// Directory holding display copies.
    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    /// Store a raw upload.
    ///
    /// The untouched bytes go to `originals/`; a normalized display copy at
    /// the orientation's exact size goes to `photos/`.
    pub fn add(
        &self,
        bytes: &[u8],
        filename: &str,
        orientation: Orientation,
    ) -> Result<StoredPhoto, Error> {
        let (image, format) = decode_image(bytes)?;
        let name = self.allocate_name(filename, format);
        let display = normalize(&image, None, orientation)?;

        write_atomic(&self.originals_dir.join(&name), bytes)?;
        if let Err(e) = write_atomic(&self.photos_dir.join(&name), &encode_for(&name, &display)?)
        {
            let _ = fs::remove_file(self.originals_dir.join(&name));
            return Err(e);
        }

        tracing::info!(photo = %name, "Stored upload ({} bytes)", bytes.len());
        Ok(StoredPhoto {
            name,
            width: display.width(),
            height: display.height(),
        })
    }

    /// Store an upload cropped by the client or by `crop`.
    ///
    /// With `recrop` the photo named `filename` is overwritten in place;
    /// otherwise a fresh name is allocated.
    pub fn add_cropped(
        &self,
        bytes: &[u8],
        filename: &str,
        crop: Option<CropRect>,
        orientation: Orientation,
        recrop: bool,
    ) -> Result<StoredPhoto, Error> {
        let (image, format) = decode_image(bytes)?;
        let name = if recrop {
            validate_filename(filename)?;
            filename.to_string()
        } else {
            self.allocate_name(filename, format)
        };

        let normalized = normalize(&image, crop, orientation)?;
        write_atomic(&self.photos_dir.join(&name), &encode_for(&name, &normalized)?)?;

        tracing::info!(
            photo = %name,
            recrop,
            "Stored cropped photo {}x{}",
            normalized.width(),
            normalized.height()
        );
        Ok(StoredPhoto {
            name,
            width: normalized.width(),
            height: normalized.height(),
        })
    }

    /// List photos: names from `order` first, then the rest newest first.
    pub fn list(&self, order: &[String]) -> Result<Vec<PhotoInfo>, Error> {
        let entries = fs::read_dir(&self.photos_dir).map_err(|e| {
            Error::Storage(format!(
                "Failed to read {}: {}",
                self.photos_dir.display(),
                e
            ))
        })?;

        let mut found: HashMap<String, PhotoInfo> = HashMap::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_photo = extension_of(&name)
                .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.as_str()));
            if !is_photo || validate_filename(&name).is_err() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            found.insert(
                name.clone(),
                PhotoInfo {
                    name,
                    size: meta.len(),
                    modified,
                },
            );
        }

        let mut photos = Vec::with_capacity(found.len());
        for name in order {
            if let Some(info) = found.remove(name) {
                photos.push(info);
            }
        }
        let mut rest: Vec<PhotoInfo> = found.into_values().collect();
        rest.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        photos.extend(rest);
        Ok(photos)
    }

    /// Delete a photo and every config reference to it.
    ///
    /// The files are removed while the config lock is held, so the scheduler
    /// cannot activate the photo halfway through. If a removal fails the
    /// config is left as it was.
    ///
    /// Idempotent: returns `Ok(false)` when nothing was on disk.
    pub fn delete(&self, name: &str, config: &ConfigStore) -> Result<bool, Error> {
        validate_filename(name)?;
        let deleted = config.update(|cfg| {
            let deleted = self.remove_files(name)?;
            cfg.forget_photo(name);
            Ok(deleted)
        })?;

        if deleted {
            tracing::info!(photo = %name, "Deleted photo");
        } else {
            tracing::debug!(photo = %name, "Delete of missing photo ignored");
        }
        Ok(deleted)
    }

    /// Remove the original, then the display copy.
    fn remove_files(&self, name: &str) -> Result<bool, Error> {
        let mut deleted = false;
        for path in [self.originals_dir.join(name), self.photos_dir.join(name)] {
            match fs::remove_file(&path) {
                Ok(()) => deleted = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Storage(format!(
                        "Failed to delete {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(deleted)
    }

    /// Whether a display copy named `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        validate_filename(name).is_ok() && self.photos_dir.join(name).is_file()
    }

    /// On-disk path of a display copy.
    pub fn path(&self, name: &str) -> Result<PathBuf, Error> {
        resolve(&self.photos_dir, name)
    }

    /// On-disk path of a raw original.
    pub fn original_path(&self, name: &str) -> Result<PathBuf, Error> {
        resolve(&self.originals_dir, name)
    }

    /// PNG thumbnail no larger than `max`×`max`.
    pub fn thumbnail(&self, name: &str, max: u32) -> Result<Vec<u8>, Error> {
        let path = self.path(name)?;
        let thumb = image::open(&path)?.thumbnail(max, max);
        let mut out = Cursor::new(Vec::new());
        thumb.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    fn allocate_name(&self, requested: &str, detected: ImageFormat) -> String {
        let sanitized = sanitize_filename(requested);
        let (stem, ext) = split_extension(&sanitized);
        let ext = match ext.map(str::to_ascii_lowercase).as_deref() {
            Some(e @ ("png" | "jpg" | "jpeg")) => e.to_string(),
            _ if detected == ImageFormat::Jpeg => "jpg".to_string(),
            _ => "png".to_string(),
        };

        let candidate = format!("{}.{}", stem, ext);
        if !self.is_taken(&candidate) {
            return candidate;
        }

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stamped = format!("{}_{}", stem, stamp);
        let candidate = format!("{}.{}", stamped, ext);
        if !self.is_taken(&candidate) {
            return candidate;
        }
        (2u32..)
            .map(|n| format!("{}_{}.{}", stamped, n, ext))
            .find(|c| !self.is_taken(c))
            .unwrap_or(candidate)
    }

    fn is_taken(&self, name: &str) -> bool {
        self.photos_dir.join(name).exists() || self.originals_dir.join(name).exists()
    }
}

fn resolve(dir: &Path, name: &str) -> Result<PathBuf, Error> {
    validate_filename(name)?;
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::not_found(format!("photo '{}'", name)))
    }
}

/// MIME type for stored image bytes, sniffed from content.
pub fn content_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}
