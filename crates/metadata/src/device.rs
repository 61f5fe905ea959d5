use crate::error::Result;
use crate::file::{read_json, write_json};
use nickel_identity::Storage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

/// Identity of this device (storage) as seen by the companion application.
///
/// The UUID is generated the first time the device is seen and must never
/// change afterwards, otherwise the companion treats it as a new device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_store_uuid: String,
    pub location_code: String,
    pub device_name: String,
    /// Other keys the companion stores here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl DeviceInfo {
    /// Generate a fresh identity for the given storage and device model.
    pub fn generate(storage: Storage, model: &str) -> Self {
        Self {
            device_store_uuid: Uuid::new_v4().to_string(),
            location_code: storage.location_code().to_string(),
            device_name: format!("Kobo {model}"),
            extra: Map::new(),
        }
    }

    /// Load the device info file, if there is one.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        read_json(path.as_ref()).await
    }

    /// Load the device info file, generating (and persisting) a new identity
    /// when the file is absent.
    ///
    /// A file that exists but can't be parsed is replaced with a fresh
    /// identity too: the companion will see a new device, which beats not
    /// being able to connect at all.
    pub async fn load_or_generate(path: impl AsRef<Path>, storage: Storage, model: &str) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path).await {
            Ok(Some(info)) => return Ok(info),
            Ok(None) => tracing::debug!(path = %path.display(), "No device info found; generating"),
            Err(e) => tracing::warn!(path = %path.display(), error = ?e, "Unreadable device info; regenerating"),
        }
        let info = Self::generate(storage, model);
        info.save(path).await?;
        Ok(info)
    }

    /// Write the device info file, replacing it.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate() {
        let info = DeviceInfo::generate(Storage::SdCard, "Clara HD");
        assert_eq!(info.location_code, "A");
        assert_eq!(info.device_name, "Kobo Clara HD");
        assert!(Uuid::parse_str(&info.device_store_uuid).is_ok());
    }

    #[tokio::test]
    async fn test_generated_identity_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("driveinfo.calibre");
        let first = DeviceInfo::load_or_generate(&path, Storage::Onboard, "Forma").await.unwrap();
        let second = DeviceInfo::load_or_generate(&path, Storage::Onboard, "Forma").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.location_code, "main");
    }

    #[tokio::test]
    async fn test_extra_keys_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("driveinfo.calibre");
        std::fs::write(
            &path,
            r#"{"device_store_uuid": "abc", "location_code": "main", "device_name": "Kobo Libra H2O", "prefix": "/"}"#,
        )
        .unwrap();
        let info = DeviceInfo::load(&path).await.unwrap().unwrap();
        assert_eq!(info.extra.get("prefix"), Some(&Value::from("/")));
        info.save(&path).await.unwrap();
        let reloaded = DeviceInfo::load(&path).await.unwrap().unwrap();
        assert_eq!(info, reloaded);
    }
}
