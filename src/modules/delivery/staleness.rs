//! Decides whether a stored artifact can be reused.
//!
//! There is no separate cache index: freshness comes from the
//! `Cache-Control` value stored with the artifact and its write time.

use crate::infrastructure::storage::StoredArtifact;
use std::time::Duration;
use time::OffsetDateTime;

/// The subset of `Cache-Control` directives staleness depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<Duration>,
}

impl CacheControl {
    /// Parses a `Cache-Control` value. Unknown or malformed directives are
    /// ignored, so this never fails.
    pub fn parse(header_value: &str) -> Self {
        let mut result = Self::default();

        for directive in header_value.split(',') {
            let Some((name, value)) = directive.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("max-age") {
                continue;
            }
            if let Ok(secs) = value.trim().trim_matches('"').parse::<u64>() {
                result.max_age = Some(Duration::from_secs(secs));
            }
        }

        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    NeedsTransform,
}

pub fn evaluate(force: bool, artifact: Option<&StoredArtifact>, now: OffsetDateTime) -> Staleness {
    if force {
        return Staleness::NeedsTransform;
    }
    let Some(artifact) = artifact else {
        return Staleness::NeedsTransform;
    };

    // No max-age means the artifact never expires.
    let Some(max_age) = CacheControl::parse(&artifact.cache_control).max_age else {
        return Staleness::Fresh;
    };
    if max_age.is_zero() {
        return Staleness::NeedsTransform;
    }

    let expires_at = time::Duration::try_from(max_age)
        .ok()
        .and_then(|age| artifact.created_at.checked_add(age));

    match expires_at {
        Some(expires_at) if now >= expires_at => Staleness::NeedsTransform,
        _ => Staleness::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(cache_control: &str, age_secs: i64) -> StoredArtifact {
        StoredArtifact {
            cache_control: cache_control.to_string(),
            created_at: OffsetDateTime::now_utc() - time::Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(CacheControl::parse("public, max-age=3600").max_age, Some(Duration::from_secs(3600)));
        assert_eq!(CacheControl::parse("MAX-AGE=\"60\"").max_age, Some(Duration::from_secs(60)));
        assert_eq!(CacheControl::parse("no-cache").max_age, None);
        assert_eq!(CacheControl::parse("").max_age, None);
    }

    #[test]
    fn test_parse_malformed_is_ignored() {
        assert_eq!(CacheControl::parse("max-age=soon").max_age, None);
        assert_eq!(CacheControl::parse("max-age=-5").max_age, None);
        assert_eq!(CacheControl::parse(",,=,max-age,===").max_age, None);
    }

    #[test]
    fn test_force_always_needs_transform() {
        let fresh = artifact("", 0);
        assert_eq!(evaluate(true, Some(&fresh), OffsetDateTime::now_utc()), Staleness::NeedsTransform);
    }

    #[test]
    fn test_missing_artifact_needs_transform() {
        assert_eq!(evaluate(false, None, OffsetDateTime::now_utc()), Staleness::NeedsTransform);
    }

    #[test]
    fn test_max_age_zero_needs_transform_regardless_of_age() {
        let now = OffsetDateTime::now_utc();
        let future = StoredArtifact {
            cache_control: "max-age=0".to_string(),
            created_at: now + time::Duration::hours(1),
        };
        assert_eq!(evaluate(false, Some(&artifact("max-age=0", 0)), now), Staleness::NeedsTransform);
        assert_eq!(evaluate(false, Some(&future), now), Staleness::NeedsTransform);
    }

    #[test]
    fn test_no_max_age_never_expires() {
        let now = OffsetDateTime::now_utc();
        let ancient = artifact("", 60 * 60 * 24 * 365 * 20);
        assert_eq!(evaluate(false, Some(&ancient), now), Staleness::Fresh);
        assert_eq!(evaluate(false, Some(&artifact("garbage;;", 10_000)), now), Staleness::Fresh);
    }

    #[test]
    fn test_max_age_expiry() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(evaluate(false, Some(&artifact("max-age=3600", 60)), now), Staleness::Fresh);
        assert_eq!(evaluate(false, Some(&artifact("max-age=60", 3600)), now), Staleness::NeedsTransform);
    }

    #[test]
    fn test_huge_max_age_does_not_overflow() {
        let max = format!("max-age={}", u64::MAX);
        assert_eq!(
            evaluate(false, Some(&artifact(&max, 10)), OffsetDateTime::now_utc()),
            Staleness::Fresh
        );
    }
}
