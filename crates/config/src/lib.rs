//! User configuration.
//!
//! Layered with `figment`: built-in defaults, then the TOML file on the
//! device, then `NICKEL_SYNC_`-prefixed environment variables (nested keys
//! separated by `__`, e.g. `NICKEL_SYNC_THUMBNAIL__JPEG_QUALITY=80`).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
pub use nickel_thumbnail::{GenerateLevel, ResizeFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::instrument;

/// Location of the configuration file, relative to the internal storage root.
pub const CONFIG_FILE: &str = ".adds/nickel-sync/config.toml";
pub const ENV_PREFIX: &str = "NICKEL_SYNC_";
const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manage books on the SD card instead of internal storage, when one is
    /// mounted.
    pub prefer_sd_card: bool,
    /// Ask the companion for kepubs before plain EPUBs.
    pub prefer_kepub: bool,
    /// Log at debug level (unless `RUST_LOG` says otherwise).
    pub enable_debug: bool,
    pub thumbnail: ThumbnailConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self { prefer_sd_card: false, prefer_kepub: true, enable_debug: false, thumbnail: ThumbnailConfig::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub generate_level: GenerateLevel,
    pub resize_algorithm: ResizeFilter,
    /// Wider than the valid range so that an out-of-range value can be
    /// corrected instead of failing the whole file.
    pub jpeg_quality: i64,
}
impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            generate_level: GenerateLevel::default(),
            resize_algorithm: ResizeFilter::default(),
            jpeg_quality: i64::from(DEFAULT_JPEG_QUALITY),
        }
    }
}
impl ThumbnailConfig {
    /// Settings for the cover pipeline.
    pub fn settings(&self) -> nickel_thumbnail::Settings {
        nickel_thumbnail::Settings {
            level: self.generate_level,
            filter: self.resize_algorithm,
            jpeg_quality: u8::try_from(self.jpeg_quality)
                .ok()
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }
}

impl Config {
    /// Load the configuration from `path` and the environment.
    ///
    /// A missing file is the same as an empty one. Values are validated (and
    /// corrected where possible) before being returned.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.validate();
        Ok(config)
    }

    /// Like [`load`](Self::load), without validating. For callers that can
    /// only report corrections once logging is set up, which itself depends
    /// on the configuration.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::figment(path).extract().or_raise(|| ErrorKind::Invalid(path.to_path_buf()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Correct values that are out of range, logging what was changed.
    /// Returns whether anything was corrected.
    pub fn validate(&mut self) -> bool {
        let mut corrected = false;
        if !(1..=100).contains(&self.thumbnail.jpeg_quality) {
            tracing::warn!(
                jpeg_quality = self.thumbnail.jpeg_quality,
                "JPEG quality must be between 1 and 100; using {DEFAULT_JPEG_QUALITY}"
            );
            self.thumbnail.jpeg_quality = i64::from(DEFAULT_JPEG_QUALITY);
            corrected = true;
        }
        corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load("config.toml").unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.thumbnail.settings(), nickel_thumbnail::Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    prefer_sd_card = true
                    prefer_kepub = false

                    [thumbnail]
                    generate_level = "partial"
                    resize_algorithm = "lanczos3"
                    jpeg_quality = 70
                "#,
            )?;
            jail.set_env("NICKEL_SYNC_THUMBNAIL__JPEG_QUALITY", "55");
            jail.set_env("NICKEL_SYNC_ENABLE_DEBUG", "true");

            let config = Config::load("config.toml").unwrap();
            assert!(config.prefer_sd_card);
            assert!(!config.prefer_kepub);
            assert!(config.enable_debug);
            assert_eq!(config.thumbnail.generate_level, GenerateLevel::Partial);
            assert_eq!(config.thumbnail.resize_algorithm, ResizeFilter::Lanczos3);
            assert_eq!(config.thumbnail.jpeg_quality, 55);
            Ok(())
        });
    }

    #[rstest]
    #[case(0, 90)]
    #[case(101, 90)]
    #[case(-5, 90)]
    #[case(1, 1)]
    #[case(100, 100)]
    fn test_validate_jpeg_quality(#[case] quality: i64, #[case] expected: i64) {
        let mut config = Config::default();
        config.thumbnail.jpeg_quality = quality;
        assert_eq!(config.validate(), quality != expected);
        assert_eq!(config.thumbnail.jpeg_quality, expected);
    }

    #[test]
    fn test_out_of_range_quality_in_file_is_corrected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[thumbnail]\njpeg_quality = 300\n")?;
            let config = Config::load("config.toml").unwrap();
            assert_eq!(config.thumbnail.jpeg_quality, 90);
            Ok(())
        });
    }

    #[test]
    fn test_read_leaves_correction_to_caller() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[thumbnail]\njpeg_quality = 300\n")?;
            let mut config = Config::read("config.toml").unwrap();
            assert_eq!(config.thumbnail.jpeg_quality, 300);
            assert!(config.validate());
            assert_eq!(config.thumbnail.jpeg_quality, 90);
            assert!(!config.validate());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[thumbnail]\ngenerate_level = \"sometimes\"\n")?;
            let err = Config::load("config.toml").unwrap_err();
            assert_eq!(*err, ErrorKind::Invalid("config.toml".into()));
            Ok(())
        });
    }
}
