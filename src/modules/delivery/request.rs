use super::events::TransformJob;
use super::key;
use crate::common::error::DeliveryError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use url::Url;

pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// Raw query parameters; every name may carry several values.
#[derive(Debug, Default, Clone)]
pub struct QueryParams(HashMap<String, Vec<String>>);

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        raw.map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect::<Self>())
            .unwrap_or_default()
    }

    /// First value given for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in iter {
            map.entry(name).or_default().push(value);
        }
        Self(map)
    }
}

/// Where the source of a request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServingMode {
    /// `url` query parameter pointing at an http(s) resource.
    Remote,
    /// A path below the configured asset directory.
    Local { path: String },
}

/// A validated unit of work. Built per request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub source_location: String,
    pub source_url: Option<Url>,
    pub target_width: u32,
    pub desired_encoding: Option<String>,
    pub key_prefix: String,
    pub force: bool,
    pub content_hash: String,
}

impl TransformRequest {
    pub fn resolve(
        params: &QueryParams,
        mode: &ServingMode,
        key_prefix: &str,
    ) -> Result<Self, DeliveryError> {
        let width = parse_width(params.first("width"))?;

        let (source_location, source_url) = match mode {
            ServingMode::Remote => {
                let location = params.first("url").map(str::trim).unwrap_or_default();
                let url = parse_remote_url(location)?;
                (location.to_string(), Some(url))
            }
            ServingMode::Local { path } => {
                let path = path.trim().trim_start_matches('/');
                sanitize_local_path(path)
                    .ok_or_else(|| DeliveryError::invalid("url", "Invalid (or missing) path."))?;
                (path.to_string(), None)
            }
        };

        Ok(Self::build(
            source_location,
            source_url,
            width,
            params.first("encoding"),
            key_prefix,
            params.contains("force"),
        ))
    }

    /// Rebuilds a request from a queued job, applying the same validation.
    pub fn from_job(job: &TransformJob) -> Result<Self, DeliveryError> {
        let width = validate_width(job.width as u64)?;
        let location = job.location.trim();
        let source_url = if is_remote(location) {
            Some(parse_remote_url(location)?)
        } else {
            sanitize_local_path(location)
                .ok_or_else(|| DeliveryError::invalid("url", "Invalid (or missing) path."))?;
            None
        };

        Ok(Self::build(
            location.to_string(),
            source_url,
            width,
            job.encoding.as_deref(),
            &job.prefix,
            false,
        ))
    }

    fn build(
        source_location: String,
        source_url: Option<Url>,
        target_width: u32,
        encoding: Option<&str>,
        key_prefix: &str,
        force: bool,
    ) -> Self {
        let desired_encoding = encoding
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        let content_hash = key::content_hash(&source_location);

        Self {
            source_location,
            source_url,
            target_width,
            desired_encoding,
            key_prefix: key_prefix.to_string(),
            force,
            content_hash,
        }
    }

    pub fn source_host(&self) -> Option<&str> {
        self.source_url.as_ref().and_then(|u| u.host_str())
    }

    pub fn is_remote(&self) -> bool {
        self.source_url.is_some()
    }

    /// Extension (with dot) the artifact is encoded to; may be empty.
    pub fn encoding_extension(&self) -> String {
        key::encoding_extension(self.desired_encoding.as_deref(), &self.source_location)
    }

    /// Extension (with dot) of the source, used as a decoding hint.
    pub fn source_extension(&self) -> String {
        key::source_extension(&self.source_location)
    }

    pub fn storage_key(&self) -> String {
        key::storage_key(
            &self.key_prefix,
            &self.content_hash,
            self.target_width,
            &self.encoding_extension(),
        )
    }

    pub fn to_job(&self) -> TransformJob {
        TransformJob {
            location: self.source_location.clone(),
            width: self.target_width,
            encoding: self.desired_encoding.clone(),
            prefix: self.key_prefix.clone(),
        }
    }
}

pub fn parse_width(raw: Option<&str>) -> Result<u32, DeliveryError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(DeliveryError::invalid("width", "Missing value."));
    }
    let width = raw
        .parse::<u64>()
        .map_err(|e| DeliveryError::invalid_with_cause("width", "Invalid value.", e))?;
    validate_width(width)
}

fn validate_width(width: u64) -> Result<u32, DeliveryError> {
    if width == 0 || width > MAX_IMAGE_DIMENSION as u64 {
        return Err(DeliveryError::invalid(
            "width",
            format!("Expected a width greater than 0 and at most {}.", MAX_IMAGE_DIMENSION),
        ));
    }
    Ok(width as u32)
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn parse_remote_url(location: &str) -> Result<Url, DeliveryError> {
    if location.is_empty() {
        return Err(DeliveryError::invalid("url", "Invalid (or missing) URL."));
    }
    let url = Url::parse(location)
        .map_err(|e| DeliveryError::invalid_with_cause("url", "Invalid URL provided.", e))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(DeliveryError::invalid("url", "Expected an http(s) URL with a host."));
    }
    Ok(url)
}

/// A relative path made only of normal components, or `None`.
pub fn sanitize_local_path(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if path.is_empty() || candidate.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(candidate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> QueryParams {
        QueryParams::parse(Some(raw))
    }

    fn resolve(raw: &str) -> Result<TransformRequest, DeliveryError> {
        TransformRequest::resolve(&query(raw), &ServingMode::Remote, "resized")
    }

    #[test]
    fn test_width_bounds() {
        assert!(resolve("url=https://example.com/a.png&width=1").is_ok());
        assert!(resolve("url=https://example.com/a.png&width=4096").is_ok());
        for bad in ["0", "4097", "5000", "-1", "abc", "", "99999999999999999999"] {
            let err = resolve(&format!("url=https://example.com/a.png&width={}", bad)).unwrap_err();
            assert_eq!(err.param(), Some("width"), "width={}", bad);
        }
    }

    #[test]
    fn test_missing_width_is_invalid() {
        let err = resolve("url=https://example.com/a.png").unwrap_err();
        assert_eq!(err.param(), Some("width"));
    }

    #[test]
    fn test_missing_or_blank_url_is_invalid() {
        assert_eq!(resolve("width=10").unwrap_err().param(), Some("url"));
        assert_eq!(resolve("width=10&url=%20%20").unwrap_err().param(), Some("url"));
    }

    #[test]
    fn test_unparseable_url_keeps_cause() {
        let err = resolve("width=10&url=not a url").unwrap_err();
        assert_eq!(err.param(), Some("url"));
        assert!(err.root_cause().is_some());
        assert_eq!(err.to_string(), "Bad parameter provided 'url'. Invalid URL provided.");
    }

    #[test]
    fn test_url_requires_http_host() {
        assert_eq!(resolve("width=10&url=file:///etc/passwd").unwrap_err().param(), Some("url"));
        assert_eq!(resolve("width=10&url=mailto:a@b.c").unwrap_err().param(), Some("url"));
    }

    #[test]
    fn test_resolves_all_fields() {
        let request = resolve("url=%20https://img.example.com/a.png%20&width=100&encoding=%20webp%20&force").unwrap();
        assert_eq!(request.source_location, "https://img.example.com/a.png");
        assert_eq!(request.source_host(), Some("img.example.com"));
        assert_eq!(request.target_width, 100);
        assert_eq!(request.desired_encoding.as_deref(), Some("webp"));
        assert!(request.force);
        assert_eq!(request.content_hash, key::content_hash("https://img.example.com/a.png"));
        assert_eq!(
            request.storage_key(),
            format!("resized/{}/100.webp", request.content_hash)
        );
    }

    #[test]
    fn test_first_value_wins() {
        let request = resolve("url=https://example.com/a.png&width=10&width=20").unwrap();
        assert_eq!(request.target_width, 10);
    }

    #[test]
    fn test_unknown_encoding_is_not_rejected_here() {
        let request = resolve("url=https://example.com/a.png&width=10&encoding=tiff").unwrap();
        assert_eq!(request.encoding_extension(), ".tiff");
    }

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = resolve("url=https://example.com/a.png&width=100").unwrap();
        let b = resolve("width=100&url=https://example.com/a.png&force").unwrap();
        assert_eq!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn test_local_mode_uses_path() {
        let mode = ServingMode::Local {
            path: "covers/album.jpg".to_string(),
        };
        let request = TransformRequest::resolve(&query("width=300"), &mode, "resized").unwrap();
        assert_eq!(request.source_location, "covers/album.jpg");
        assert!(!request.is_remote());
        assert_eq!(request.source_host(), None);
        assert!(request.storage_key().ends_with("/300.jpg"));
    }

    #[test]
    fn test_local_mode_rejects_traversal() {
        let mode = ServingMode::Local {
            path: "../secrets/key.png".to_string(),
        };
        let err = TransformRequest::resolve(&query("width=300"), &mode, "resized").unwrap_err();
        assert_eq!(err.param(), Some("url"));
    }

    #[test]
    fn test_job_round_trips_to_same_key() {
        let request = resolve("url=https://example.com/a.png&width=100&encoding=jpeg").unwrap();
        let rebuilt = TransformRequest::from_job(&request.to_job()).unwrap();
        assert_eq!(rebuilt.storage_key(), request.storage_key());
        assert!(!rebuilt.force);
    }

    #[test]
    fn test_job_width_is_validated() {
        let mut job = resolve("url=https://example.com/a.png&width=100").unwrap().to_job();
        job.width = 0;
        assert_eq!(TransformRequest::from_job(&job).unwrap_err().param(), Some("width"));
    }

    #[test]
    fn test_sanitize_local_path() {
        assert!(sanitize_local_path("a/b/c.png").is_some());
        assert!(sanitize_local_path("").is_none());
        assert!(sanitize_local_path("/etc/passwd").is_none());
        assert!(sanitize_local_path("a/../../b.png").is_none());
    }
}
