use crate::Device;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The cover variants the firmware looks for.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum CoverKind {
    /// Shown full screen, e.g. as the sleep cover.
    #[display("N3_FULL")]
    Full,
    /// Library list view.
    #[display("N3_LIBRARY_FULL")]
    LibraryFull,
    /// Library grid view.
    #[display("N3_LIBRARY_GRID")]
    LibraryGrid,
}
impl CoverKind {
    pub const ALL: [CoverKind; 3] = [Self::Full, Self::LibraryFull, Self::LibraryGrid];

    /// Path of this variant relative to the image directory:
    /// `<d1>/<d2>/<image id> - <kind>.parsed`.
    pub fn relative_path(&self, image_id: &str) -> PathBuf {
        let hash = image_dir_hash(image_id);
        let mut path = PathBuf::from((hash & 0xff).to_string());
        path.push(((hash & 0xff00) >> 8).to_string());
        path.push(format!("{image_id} - {self}.parsed"));
        path
    }

    /// Size to render a `(width, height)` source at, aspect ratio kept.
    ///
    /// The full cover fits inside the device's box for it; the library
    /// variants fill theirs (and the firmware crops).
    pub fn target_size(&self, device: Device, (width, height): (u32, u32)) -> (u32, u32) {
        let (box_width, box_height) = device.cover_size(*self);
        if (width, height) == (box_width, box_height) || width == 0 || height == 0 {
            return (box_width, box_height);
        }
        let (width, height, box_width, box_height) =
            (u64::from(width), u64::from(height), u64::from(box_width), u64::from(box_height));
        let wider_than_box = width * box_height > height * box_width;
        let fill = *self != Self::Full;
        let (target_width, target_height) = if wider_than_box != fill {
            (box_width, divide_rounded(height * box_width, width))
        } else {
            (divide_rounded(width * box_height, height), box_height)
        };
        // Both sides are bounded by the source or the box, which are u32.
        (clamp(target_width), clamp(target_height))
    }
}

fn divide_rounded(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

fn clamp(side: u64) -> u32 {
    u32::try_from(side).unwrap_or(u32::MAX).max(1)
}

/// The firmware's 28-bit string hash, used to spread cover images over
/// subdirectories.
pub fn image_dir_hash(image_id: &str) -> u32 {
    let mut hash: u64 = 0;
    for byte in image_id.bytes() {
        hash = (hash << 4) + u64::from(byte);
        hash ^= (hash & 0xf000_0000) >> 23;
        hash &= 0x0fff_ffff;
    }
    // Masked to 28 bits above.
    hash as u32
}

/// Which cover variants to generate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateLevel {
    /// Leave covers to the firmware.
    None,
    /// Library views only.
    Partial,
    #[default]
    All,
}
impl GenerateLevel {
    pub fn covers(&self) -> &'static [CoverKind] {
        match self {
            Self::None => &[],
            Self::Partial => &[CoverKind::LibraryFull, CoverKind::LibraryGrid],
            Self::All => &CoverKind::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::Path;

    #[rstest]
    #[case("file____mnt_onboard_Foo_Bar_kepub_epub", 156_862_706)]
    #[case("file____mnt_onboard_a_epub", 101_943_762)]
    #[case("", 0)]
    fn test_image_dir_hash(#[case] image_id: &str, #[case] expected: u32) {
        assert_eq!(image_dir_hash(image_id), expected);
    }

    #[test]
    fn test_relative_path() {
        let path = CoverKind::LibraryGrid.relative_path("file____mnt_onboard_Foo_Bar_kepub_epub");
        assert_eq!(path, Path::new("242/136/file____mnt_onboard_Foo_Bar_kepub_epub - N3_LIBRARY_GRID.parsed"));
    }

    #[rstest]
    // Already the right size.
    #[case(CoverKind::Full, (600, 800), (600, 800))]
    // Same aspect ratio, scaled down.
    #[case(CoverKind::Full, (1200, 1600), (600, 800))]
    // Square source: fit is bound by width, fill by height.
    #[case(CoverKind::Full, (1000, 1000), (600, 600))]
    #[case(CoverKind::LibraryGrid, (1000, 1000), (198, 198))]
    // Tall source: fit is bound by height, fill by width.
    #[case(CoverKind::Full, (300, 1600), (150, 800))]
    #[case(CoverKind::LibraryFull, (300, 1600), (355, 1893))]
    // Small sources are scaled up.
    #[case(CoverKind::LibraryFull, (30, 40), (355, 473))]
    fn test_target_size(#[case] kind: CoverKind, #[case] source: (u32, u32), #[case] expected: (u32, u32)) {
        assert_eq!(kind.target_size(Device::Touch2, source), expected);
    }

    #[test]
    fn test_generate_level() {
        assert!(GenerateLevel::None.covers().is_empty());
        assert_eq!(GenerateLevel::Partial.covers(), &[CoverKind::LibraryFull, CoverKind::LibraryGrid]);
        assert_eq!(GenerateLevel::All.covers().len(), 3);
    }
}
