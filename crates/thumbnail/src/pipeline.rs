//! Background cover rendering.
//!
//! Every submitted cover is split into one unit of work per variant. Units
//! run on the blocking pool, independently of each other and of whatever the
//! session does next; a unit that fails only loses its own variant. The
//! session must call [`Pipeline::shutdown`] before exiting, which waits for
//! every outstanding unit.

use crate::error::{ErrorKind, Result};
use crate::{CoverKind, Device, GenerateLevel};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use nickel_identity::ContentId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::instrument;

/// Resampling filter used when resizing covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Gaussian,
    Lanczos3,
}
impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How covers get rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub level: GenerateLevel,
    pub filter: ResizeFilter,
    /// JPEG quality, `1..=100`.
    pub jpeg_quality: u8,
}
impl Default for Settings {
    fn default() -> Self {
        Self { level: GenerateLevel::default(), filter: ResizeFilter::default(), jpeg_quality: 90 }
    }
}

/// Renders cover variants into the firmware's image directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
    images_dir: PathBuf,
    device: Device,
    settings: Settings,
    tracker: TaskTracker,
}

impl Pipeline {
    /// Create a pipeline writing into `images_dir` (the storage's image
    /// directory, not the storage root).
    pub fn new(images_dir: impl Into<PathBuf>, device: Device, settings: Settings) -> Self {
        Self { images_dir: images_dir.into(), device, settings, tracker: TaskTracker::new() }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Path of a cover variant for a book.
    pub fn cover_path(&self, id: &ContentId, kind: CoverKind) -> PathBuf {
        self.images_dir.join(kind.relative_path(&id.image_id()))
    }

    /// Schedule rendering of every configured variant of a decoded cover.
    ///
    /// Returns the number of units scheduled.
    pub fn submit(&self, id: &ContentId, image: Arc<DynamicImage>) -> usize {
        let covers = self.settings.level.covers();
        for &kind in covers {
            let unit = Unit {
                kind,
                device: self.device,
                filter: self.settings.filter,
                quality: self.settings.jpeg_quality,
                path: self.cover_path(id, kind),
            };
            let image = Arc::clone(&image);
            self.tracker.spawn_blocking(move || {
                if let Err(e) = unit.run(&image) {
                    tracing::warn!(cover = %unit.kind, path = %unit.path.display(), error = ?e, "Failed to render cover");
                }
            });
        }
        tracing::debug!(id = %id, units = covers.len(), "Scheduled cover rendering");
        covers.len()
    }

    /// Decode an encoded cover (JPEG or PNG) once, then schedule its variants.
    ///
    /// Decoding happens in the background too; a cover that can't be decoded
    /// is logged and dropped.
    pub fn submit_bytes(&self, id: &ContentId, bytes: Vec<u8>) {
        if self.settings.level.covers().is_empty() {
            return;
        }
        let pipeline = self.clone();
        let id = id.clone();
        self.tracker.spawn_blocking(move || match decode(&bytes) {
            Ok(image) => {
                pipeline.submit(&id, Arc::new(image));
            },
            Err(e) => tracing::warn!(id = %id, error = ?e, "Skipping cover"),
        });
    }

    /// Like [`submit_bytes`](Self::submit_bytes), for the base64 encoded
    /// covers the companion sends.
    pub fn submit_base64(&self, id: &ContentId, data: &str) {
        let data: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        match BASE64.decode(data) {
            Ok(bytes) => self.submit_bytes(id, bytes),
            Err(e) => tracing::warn!(id = %id, error = %e, "Skipping cover with invalid base64 data"),
        }
    }

    /// Remove every variant of a book's cover. Missing files are fine.
    pub async fn remove(&self, id: &ContentId) {
        for kind in CoverKind::ALL {
            let path = self.cover_path(id, kind);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed cover"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove cover"),
            }
        }
    }

    /// Number of units still queued or running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every scheduled unit to finish. Nothing is written into the
    /// image directory once this returns.
    #[instrument(skip(self), fields(pending = self.tracker.len()))]
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("Cover rendering finished");
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).or_raise(|| ErrorKind::Decode)
}

/// One cover variant of one book.
struct Unit {
    kind: CoverKind,
    device: Device,
    filter: ResizeFilter,
    quality: u8,
    path: PathBuf,
}
impl Unit {
    fn run(&self, image: &DynamicImage) -> Result<()> {
        let source = image.dimensions();
        let (width, height) = self.kind.target_size(self.device, source);
        let pixels = if (width, height) == source {
            image.to_rgb8()
        } else {
            image.resize_exact(width, height, self.filter.into()).to_rgb8()
        };
        let write_error = || ErrorKind::Write(self.path.clone());
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).or_raise(write_error)?;
        }
        // Replacing a cover must not leave the tail of a larger old one behind.
        let mut writer = BufWriter::new(File::create(&self.path).or_raise(write_error)?);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(&pixels)
            .or_raise(|| ErrorKind::Encode)?;
        writer.flush().or_raise(write_error)?;
        tracing::trace!(cover = %self.kind, ?source, size = ?(width, height), path = %self.path.display(), "Rendered cover");
        Ok(())
    }
}
