//! Storage key derivation.
//!
//! The serving path and the workers both call these functions, so a key
//! computed for a request always names the object the worker writes.

use sha1::{Digest, Sha1};
use std::path::Path;
use url::Url;

/// Hex SHA-1 of the source location exactly as supplied (after trimming).
pub fn content_hash(source_location: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source_location.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extension (with the leading dot) the artifact is encoded to.
///
/// An explicit encoding wins. Otherwise the extension of the source path is
/// reused; for URLs only the path counts, never the query or fragment.
pub fn encoding_extension(desired: Option<&str>, source_location: &str) -> String {
    if let Some(encoding) = desired.filter(|e| !e.is_empty()) {
        return format!(".{}", encoding);
    }
    source_extension(source_location)
}

pub fn source_extension(source_location: &str) -> String {
    let path = match Url::parse(source_location) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => source_location.to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

pub fn storage_key(prefix: &str, content_hash: &str, width: u32, extension: &str) -> String {
    format!("{}/{}/{}{}", prefix, content_hash, width, extension)
}

/// Video artifacts are always WebM, keyed by width and source file stem.
pub fn video_key(width: u32, source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    format!("{}/{}.webm", width, stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha1_hex() {
        assert_eq!(
            content_hash("https://example.com/a.png"),
            content_hash("https://example.com/a.png")
        );
        assert_eq!(content_hash(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(content_hash("https://example.com/a.png").len(), 40);
    }

    #[test]
    fn test_storage_key_is_deterministic() {
        let hash = content_hash("https://example.com/a.png");
        let ext = encoding_extension(None, "https://example.com/a.png");
        let first = storage_key("resized", &hash, 100, &ext);
        let second = storage_key("resized", &hash, 100, &ext);
        assert_eq!(first, second);
        assert_eq!(first, format!("resized/{}/100.png", hash));
    }

    #[test]
    fn test_storage_key_differs_per_input() {
        let a = content_hash("https://example.com/a.png");
        let b = content_hash("https://example.com/b.png");
        assert_ne!(storage_key("resized", &a, 100, ".png"), storage_key("resized", &b, 100, ".png"));
        assert_ne!(storage_key("resized", &a, 100, ".png"), storage_key("resized", &a, 200, ".png"));
        assert_ne!(storage_key("resized", &a, 100, ".png"), storage_key("resized", &a, 100, ".webp"));
        assert_ne!(storage_key("resized", &a, 100, ".png"), storage_key("thumbs", &a, 100, ".png"));
    }

    #[test]
    fn test_encoding_extension_prefers_requested_encoding() {
        assert_eq!(encoding_extension(Some("webp"), "https://example.com/a.png"), ".webp");
        assert_eq!(encoding_extension(Some(""), "https://example.com/a.png"), ".png");
    }

    #[test]
    fn test_source_extension_ignores_query_string() {
        assert_eq!(source_extension("https://example.com/a.jpeg?v=2#top"), ".jpeg");
        assert_eq!(source_extension("https://example.com/image"), "");
        assert_eq!(source_extension("covers/album.JPG"), ".JPG");
    }

    #[test]
    fn test_video_key_uses_webm() {
        assert_eq!(video_key(320, Path::new("/srv/assets/clips/intro.mp4")), "320/intro.webm");
        assert_eq!(video_key(640, Path::new("trailer.mov")), "640/trailer.webm");
    }
}
