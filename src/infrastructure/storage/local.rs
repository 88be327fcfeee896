use super::{join_url, Storage, StorageError, StoredArtifact, WriteInfo};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tracing::info;

pub const META_SUFFIX: &str = ".meta.json";

/// Stores objects as plain files under `root`.
///
/// Object metadata lives in a `<key>.meta.json` sidecar next to the data.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_host: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    cache_control: String,
    content_type: String,
    created_at: i64,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_host: &str) -> Self {
        let root = root.into();
        info!("✅ Local storage ready at {}", root.display());
        Self {
            root,
            public_host: public_host.to_string(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::backend(key, "key escapes the storage root"));
        }
        if key.ends_with(META_SUFFIX) {
            return Err(StorageError::backend(key, "key names a metadata sidecar"));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn info(&self, key: &str) -> Result<Option<StoredArtifact>, StorageError> {
        let path = self.object_path(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match fs::read(Self::sidecar_path(&path)).await {
            Ok(raw) => {
                let sidecar: Sidecar =
                    serde_json::from_slice(&raw).map_err(|e| StorageError::backend(key, e))?;
                let created_at = OffsetDateTime::from_unix_timestamp(sidecar.created_at)
                    .map_err(|e| StorageError::backend(key, e))?;
                Ok(Some(StoredArtifact {
                    cache_control: sidecar.cache_control,
                    created_at,
                }))
            }
            // Data without a sidecar: fall back to the file's mtime.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let created_at = metadata
                    .modified()
                    .map(OffsetDateTime::from)
                    .unwrap_or_else(|_| OffsetDateTime::now_utc());
                Ok(Some(StoredArtifact {
                    cache_control: String::new(),
                    created_at,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, data: Bytes, info: &WriteInfo) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp file and rename so readers never see a partial object.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;

        let sidecar = Sidecar {
            cache_control: info.cache_control.clone(),
            content_type: info.content_type.clone(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let raw = serde_json::to_vec(&sidecar).map_err(|e| StorageError::backend(key, e))?;
        fs::write(Self::sidecar_path(&path), raw).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound(key.to_string())),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(Self::sidecar_path(&path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn object_url(&self, key: &str) -> String {
        join_url(&self.public_host, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:3000/cache");
        (dir, storage)
    }

    #[tokio::test]
    async fn test_info_missing_object_is_none() {
        let (_dir, storage) = storage();
        assert!(storage.info("resized/abc/100.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_info_and_read() {
        let (_dir, storage) = storage();
        let info = WriteInfo {
            cache_control: "max-age=60".to_string(),
            content_type: "image/png".to_string(),
        };
        storage
            .write("resized/abc/100.png", Bytes::from_static(b"png-bytes"), &info)
            .await
            .unwrap();

        let artifact = storage.info("resized/abc/100.png").await.unwrap().unwrap();
        assert_eq!(artifact.cache_control, "max-age=60");
        assert!(artifact.created_at <= OffsetDateTime::now_utc());

        let data = storage.read("resized/abc/100.png").await.unwrap();
        assert_eq!(&data[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_write_overwrites_wholesale() {
        let (_dir, storage) = storage();
        let first = WriteInfo {
            cache_control: "max-age=60".to_string(),
            content_type: "image/png".to_string(),
        };
        let second = WriteInfo {
            cache_control: String::new(),
            content_type: "image/png".to_string(),
        };
        storage.write("k/1.png", Bytes::from_static(b"one"), &first).await.unwrap();
        storage.write("k/1.png", Bytes::from_static(b"two"), &second).await.unwrap();

        assert_eq!(&storage.read("k/1.png").await.unwrap()[..], b"two");
        assert_eq!(storage.info("k/1.png").await.unwrap().unwrap().cache_control, "");
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_sidecar() {
        let (dir, storage) = storage();
        storage
            .write("k/1.png", Bytes::from_static(b"one"), &WriteInfo::default())
            .await
            .unwrap();
        storage.delete("k/1.png").await.unwrap();

        assert!(storage.info("k/1.png").await.unwrap().is_none());
        assert!(!dir.path().join("k/1.png.meta.json").exists());
        assert!(matches!(storage.delete("k/1.png").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(storage.read("nope.png").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let (_dir, storage) = storage();
        assert!(storage.info("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_sidecars_are_not_objects() {
        let (_dir, storage) = storage();
        storage
            .write("k/1.png", Bytes::from_static(b"one"), &WriteInfo::default())
            .await
            .unwrap();

        assert!(storage.read("k/1.png.meta.json").await.is_err());
        assert!(storage.info("k/1.png.meta.json").await.is_err());
    }

    #[test]
    fn test_object_url() {
        let (_dir, storage) = storage();
        assert_eq!(storage.object_url("resized/abc/100.png"), "http://localhost:3000/cache/resized/abc/100.png");
    }
}
