use crate::modules::delivery::key;
use std::path::PathBuf;

/// A video waiting to be re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub source_path: PathBuf,
    pub target_width: u32,
}

impl VideoJob {
    pub fn new(source_path: impl Into<PathBuf>, target_width: u32) -> Self {
        Self {
            source_path: source_path.into(),
            target_width,
        }
    }

    pub fn storage_key(&self) -> String {
        key::video_key(self.target_width, &self.source_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_always_webm() {
        assert_eq!(VideoJob::new("/srv/assets/clips/intro.mp4", 640).storage_key(), "640/intro.webm");
        assert_eq!(VideoJob::new("trailer.MOV", 320).storage_key(), "320/trailer.webm");
    }
}
