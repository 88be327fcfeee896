use super::{join_url, Storage, StorageError, StoredArtifact, WriteInfo};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::{config::BehaviorVersion, config::Credentials, config::Region, Client};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::info;

#[derive(Clone)]
pub struct S3Storage {
    pub client: Client,
    pub bucket: String,
    endpoint: Option<String>,
    public_host: Option<String>,
    public_read: bool,
}

impl S3Storage {
    pub fn new(
        endpoint: Option<&str>,
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        public_host: Option<&str>,
        public_read: bool,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials);

        if let Some(endpoint) = endpoint {
            builder = builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let client = Client::from_conf(builder.build());

        info!("✅ S3 storage ready (bucket: {})", bucket);

        Self {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.map(str::to_string),
            public_host: public_host.map(str::to_string),
            public_read,
        }
    }

    /// Redirect targets must be readable anonymously: either objects carry
    /// the `public-read` ACL or the bucket policy grants it.
    fn canned_acl(&self) -> Option<ObjectCannedAcl> {
        self.public_read.then_some(ObjectCannedAcl::PublicRead)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn info(&self, key: &str) -> Result<Option<StoredArtifact>, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Ok(None);
                }
                return Err(StorageError::backend(key, err));
            }
        };

        let created_at = output
            .last_modified()
            .and_then(|dt| OffsetDateTime::from_unix_timestamp(dt.secs()).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        Ok(Some(StoredArtifact {
            cache_control: output.cache_control().unwrap_or_default().to_string(),
            created_at,
        }))
    }

    async fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::backend(key, err)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend(key, e))?;

        Ok(data.into_bytes())
    }

    async fn write(&self, key: &str, data: Bytes, info: &WriteInfo) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if !info.cache_control.is_empty() {
            request = request.cache_control(&info.cache_control);
        }
        if !info.content_type.is_empty() {
            request = request.content_type(&info.content_type);
        }
        if let Some(acl) = self.canned_acl() {
            request = request.acl(acl);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::backend(key, e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend(key, e))?;

        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        match (&self.public_host, &self.endpoint) {
            (Some(host), _) => join_url(host, key),
            (None, Some(endpoint)) => join_url(&join_url(endpoint, &self.bucket), key),
            (None, None) => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_prefers_public_host() {
        let storage = S3Storage::new(
            Some("http://minio:9000"),
            "assets",
            "us-east-1",
            "key",
            "secret",
            Some("https://cdn.example.com"),
            false,
        );
        assert_eq!(storage.object_url("resized/abc/100.png"), "https://cdn.example.com/resized/abc/100.png");
    }

    #[test]
    fn test_object_url_path_style_for_custom_endpoint() {
        let storage = S3Storage::new(Some("http://minio:9000/"), "assets", "us-east-1", "key", "secret", None, false);
        assert_eq!(storage.object_url("resized/abc/100.png"), "http://minio:9000/assets/resized/abc/100.png");
    }

    #[test]
    fn test_object_url_defaults_to_aws_virtual_host() {
        let storage = S3Storage::new(None, "assets", "us-east-1", "key", "secret", None, false);
        assert_eq!(storage.object_url("320/intro.webm"), "https://assets.s3.amazonaws.com/320/intro.webm");
    }

    #[test]
    fn test_public_read_sets_canned_acl() {
        let private = S3Storage::new(None, "assets", "us-east-1", "key", "secret", None, false);
        assert_eq!(private.canned_acl(), None);

        let public = S3Storage::new(None, "assets", "us-east-1", "key", "secret", None, true);
        assert_eq!(public.canned_acl(), Some(ObjectCannedAcl::PublicRead));
    }
}
