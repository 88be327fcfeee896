use super::{Storage, StorageError, StoredArtifact, WriteInfo};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub info: WriteInfo,
    pub created_at: OffsetDateTime,
}

/// In-process storage used by tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: &[u8], cache_control: &str, created_at: OffsetDateTime) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                info: WriteInfo {
                    cache_control: cache_control.to_string(),
                    content_type: String::new(),
                },
                created_at,
            },
        );
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn info(&self, key: &str) -> Result<Option<StoredArtifact>, StorageError> {
        Ok(self.get(key).map(|o| StoredArtifact {
            cache_control: o.info.cache_control,
            created_at: o.created_at,
        }))
    }

    async fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        self.get(key)
            .map(|o| o.data)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, data: Bytes, info: &WriteInfo) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                info: info.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://cdn.test/{}", key)
    }
}
