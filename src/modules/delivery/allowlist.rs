/// Host patterns a source URL may point at.
///
/// A pattern matches a host only when both have the same number of
/// dot-separated segments. `*` matches exactly one segment, so
/// `*.example.com` covers `a.example.com` but neither `example.com` nor
/// `a.b.example.com`. Patterns are lowercased, matching how parsed URLs
/// report hosts. An empty list permits every host.
#[derive(Debug, Clone, Default)]
pub struct HostAllowList {
    patterns: Vec<String>,
}

impl HostAllowList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn permits(&self, host: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|pattern| host_matches(pattern, host))
    }
}

pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let host_segments: Vec<&str> = host.split('.').collect();
    if pattern_segments.len() != host_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(host_segments.iter())
        .all(|(p, h)| *p == "*" || p == h)
}
