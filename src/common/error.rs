use std::error::Error as _;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline stage a system failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Fetch,
    Decode,
    Resize,
    Encode,
    Write,
    Delete,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lookup => "lookup",
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Resize => "resize",
            Stage::Encode => "encode",
            Stage::Write => "write",
            Stage::Delete => "delete",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Bad parameter provided '{param}'. {detail}")]
    InvalidParameter {
        param: &'static str,
        detail: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Host '{0}' is not permitted to perform this action.")]
    HostNotPermitted(String),

    #[error("Not authorized to perform that action.")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{stage} failed for '{key}'")]
    SystemFailure {
        stage: Stage,
        key: String,
        #[source]
        source: BoxError,
    },
}

impl DeliveryError {
    pub fn invalid(param: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param,
            detail: detail.into(),
            cause: None,
        }
    }

    pub fn invalid_with_cause(
        param: &'static str,
        detail: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::InvalidParameter {
            param,
            detail: detail.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn system(stage: Stage, key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::SystemFailure {
            stage,
            key: key.into(),
            source: source.into(),
        }
    }

    /// The parameter an `InvalidParameter` error is about.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParameter { param, .. } => Some(param),
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::SystemFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Single-line message that is safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::SystemFailure { .. } => "An internal error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    /// Full chain of causes, for server-side logs only.
    pub fn root_cause(&self) -> Option<String> {
        let mut source = self.source();
        let mut chain = Vec::new();
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        if chain.is_empty() {
            None
        } else {
            Some(chain.join(": "))
        }
    }
}
