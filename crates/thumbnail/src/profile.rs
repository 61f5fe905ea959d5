//! Device models and their cover sizes.

use crate::CoverKind;
use std::path::Path;
use tracing::instrument;

/// Version descriptor, relative to the internal storage root.
pub const VERSION_FILE: &str = ".kobo/version";
/// Every model ID is this prefix followed by a three digit model number.
const MODEL_ID_PREFIX: &str = "00000000-0000-0000-0000-000000000";

/// Device models, as identified by the firmware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Device {
    TouchAB,
    TouchC,
    Glo,
    Mini,
    AuraHD,
    Aura,
    AuraH2O,
    GloHD,
    Touch2,
    AuraOne,
    AuraH2OEd2V1,
    AuraEd2V1,
    ClaraHD,
    Forma,
    AuraH2OEd2V2,
    AuraEd2V2,
    Forma32GB,
    AuraOneLimEd,
    LibraH2O,
    /// A model we don't know the screen of.
    #[default]
    Unknown,
}
impl Device {
    /// Identify a device from its model ID (the last field of the version
    /// descriptor).
    pub fn from_model_id(id: &str) -> Self {
        let Some(number) = id.trim().strip_prefix(MODEL_ID_PREFIX) else {
            return Self::Unknown;
        };
        match number {
            "310" => Self::TouchAB,
            "320" => Self::TouchC,
            "330" => Self::Glo,
            "340" => Self::Mini,
            "350" => Self::AuraHD,
            "360" => Self::Aura,
            "370" => Self::AuraH2O,
            "371" => Self::GloHD,
            "372" => Self::Touch2,
            "373" => Self::AuraOne,
            "374" => Self::AuraH2OEd2V1,
            "375" => Self::AuraEd2V1,
            "376" => Self::ClaraHD,
            "377" => Self::Forma,
            "378" => Self::AuraH2OEd2V2,
            "379" => Self::AuraEd2V2,
            "380" => Self::Forma32GB,
            "381" => Self::AuraOneLimEd,
            "384" => Self::LibraH2O,
            _ => Self::Unknown,
        }
    }

    /// Marketing name of the model.
    pub fn model(&self) -> &'static str {
        match self {
            Self::TouchAB => "Touch A/B",
            Self::TouchC => "Touch C",
            Self::Glo => "Glo",
            Self::Mini => "Mini",
            Self::AuraHD => "Aura HD",
            Self::Aura => "Aura",
            Self::AuraH2O => "Aura H2O",
            Self::GloHD => "Glo HD",
            Self::Touch2 => "Touch 2.0",
            Self::AuraOne => "Aura ONE",
            Self::AuraH2OEd2V1 | Self::AuraH2OEd2V2 => "Aura H2O Edition 2",
            Self::AuraEd2V1 | Self::AuraEd2V2 => "Aura Edition 2",
            Self::ClaraHD => "Clara HD",
            Self::Forma | Self::Forma32GB => "Forma",
            Self::AuraOneLimEd => "Aura ONE Limited Edition",
            Self::LibraH2O => "Libra H2O",
            Self::Unknown => "Unknown Kobo",
        }
    }

    /// Bounding box of the given cover variant, as `(width, height)`.
    pub fn cover_size(&self, kind: CoverKind) -> (u32, u32) {
        let (full, library_full, library_grid) = match self {
            Self::TouchAB | Self::TouchC | Self::Mini | Self::Touch2 => ((600, 800), (355, 473), (149, 198)),
            Self::Glo => ((758, 1024), (355, 479), (149, 201)),
            Self::Aura | Self::AuraEd2V1 | Self::AuraEd2V2 => ((758, 1014), (355, 479), (149, 201)),
            Self::GloHD | Self::ClaraHD | Self::Unknown => ((1072, 1448), (355, 479), (149, 201)),
            Self::AuraHD => ((1080, 1440), (355, 471), (149, 198)),
            Self::AuraH2O | Self::AuraH2OEd2V1 | Self::AuraH2OEd2V2 => ((1080, 1430), (355, 471), (149, 198)),
            Self::AuraOne | Self::AuraOneLimEd => ((1404, 1872), (355, 473), (149, 198)),
            Self::Forma | Self::Forma32GB => ((1440, 1920), (355, 473), (149, 198)),
            Self::LibraH2O => ((1264, 1680), (355, 473), (149, 198)),
        };
        match kind {
            CoverKind::Full => full,
            CoverKind::LibraryFull => library_full,
            CoverKind::LibraryGrid => library_grid,
        }
    }
}

/// What the firmware's version descriptor says about the device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Version {
    pub device: Device,
    /// Firmware version, e.g. `4.20.14622`.
    pub firmware: Option<String>,
}
impl Version {
    /// Parse the comma separated version descriptor. The third field is the
    /// firmware version and the last one the model ID.
    pub fn parse(descriptor: &str) -> Self {
        let fields: Vec<&str> = descriptor.trim().split(',').map(str::trim).collect();
        if fields.len() < 2 {
            return Self::default();
        }
        Self {
            device: fields.last().map(|id| Device::from_model_id(id)).unwrap_or_default(),
            firmware: fields.get(2).filter(|v| !v.is_empty()).map(|v| v.to_string()),
        }
    }

    /// Read the version descriptor under the internal storage root.
    ///
    /// This is best-effort: a missing or unreadable descriptor yields an
    /// unknown device, which still gets sensible cover sizes.
    #[instrument(skip_all, fields(root = %onboard_root.as_ref().display()))]
    pub async fn detect(onboard_root: impl AsRef<Path>) -> Self {
        let path = onboard_root.as_ref().join(VERSION_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(descriptor) => {
                let version = Self::parse(&descriptor);
                tracing::debug!(device = version.device.model(), firmware = ?version.firmware, "Detected device");
                version
            },
            Err(e) => {
                tracing::debug!(error = %e, "No device version descriptor; assuming an unknown device");
                Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("00000000-0000-0000-0000-000000000376", Device::ClaraHD)]
    #[case("00000000-0000-0000-0000-000000000384\n", Device::LibraH2O)]
    #[case("00000000-0000-0000-0000-000000000310", Device::TouchAB)]
    #[case("00000000-0000-0000-0000-000000000999", Device::Unknown)]
    #[case("376", Device::Unknown)]
    #[case("", Device::Unknown)]
    fn test_from_model_id(#[case] id: &str, #[case] expected: Device) {
        assert_eq!(Device::from_model_id(id), expected);
    }

    #[test]
    fn test_parse_version_descriptor() {
        let version =
            Version::parse("N418170000000,4.9.77,4.20.14622,4.9.77,4.9.77,00000000-0000-0000-0000-000000000377\n");
        assert_eq!(version.device, Device::Forma);
        assert_eq!(version.firmware.as_deref(), Some("4.20.14622"));
    }

    #[rstest]
    #[case("")]
    #[case("garbage")]
    fn test_parse_falls_back_to_default(#[case] descriptor: &str) {
        assert_eq!(Version::parse(descriptor), Version::default());
    }

    #[rstest]
    #[case(Device::Mini, CoverKind::Full, (600, 800))]
    #[case(Device::Glo, CoverKind::LibraryGrid, (149, 201))]
    #[case(Device::AuraH2OEd2V2, CoverKind::LibraryFull, (355, 471))]
    #[case(Device::Forma32GB, CoverKind::Full, (1440, 1920))]
    #[case(Device::LibraH2O, CoverKind::Full, (1264, 1680))]
    fn test_cover_size(#[case] device: Device, #[case] kind: CoverKind, #[case] expected: (u32, u32)) {
        assert_eq!(device.cover_size(kind), expected);
    }

    #[tokio::test]
    async fn test_detect() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Version::detect(dir.path()).await.device, Device::Unknown);

        std::fs::create_dir_all(dir.path().join(".kobo")).unwrap();
        std::fs::write(
            dir.path().join(VERSION_FILE),
            "N249,3.0.35,4.19.14123,3.0.35,3.0.35,00000000-0000-0000-0000-000000000376",
        )
        .unwrap();
        let version = Version::detect(dir.path()).await;
        assert_eq!(version.device, Device::ClaraHD);
        assert_eq!(version.device.model(), "Clara HD");
    }
}
