//! Errors raised while installing advice.

use std::path::PathBuf;

use aspectlib_core::{AdviceError, Failure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(
        "could not match {name:?} to {pattern}: it should be letters, numbers and underscores \
         starting with a letter or underscore"
    )]
    InvalidName { name: String, pattern: &'static str },

    #[error("no target named {name}")]
    UnknownTarget { name: String },

    #[error("target {name} is already defined")]
    DuplicateTarget { name: String },

    #[error("nothing to weave under {owner}")]
    NothingToWeave { owner: String },

    #[error("{context} must be given at least one advice")]
    ExpectedAdvice { context: String },

    #[error(transparent)]
    Advice(#[from] AdviceError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl WeaveError {
    pub fn invalid_name(name: impl Into<String>, pattern: &'static str) -> Self {
        WeaveError::InvalidName {
            name: name.into(),
            pattern,
        }
    }

    pub fn unknown_target(name: impl Into<String>) -> Self {
        WeaveError::UnknownTarget { name: name.into() }
    }

    pub fn duplicate_target(name: impl Into<String>) -> Self {
        WeaveError::DuplicateTarget { name: name.into() }
    }

    pub fn nothing_to_weave(owner: impl Into<String>) -> Self {
        WeaveError::NothingToWeave {
            owner: owner.into(),
        }
    }

    pub fn expected_advice(context: impl Into<String>) -> Self {
        WeaveError::ExpectedAdvice {
            context: context.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeaveError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            WeaveError::InvalidName { .. } => "invalid_name",
            WeaveError::UnknownTarget { .. } => "unknown_target",
            WeaveError::DuplicateTarget { .. } => "duplicate_target",
            WeaveError::NothingToWeave { .. } => "nothing_to_weave",
            WeaveError::ExpectedAdvice { .. } => "expected_advice",
            WeaveError::Advice(err) => err.kind_name(),
            WeaveError::Io { .. } => "io",
            WeaveError::Config(_) => "config",
        }
    }
}

/// Lets a lookup made while calling surface as the call's failure.
impl From<WeaveError> for Failure {
    fn from(err: WeaveError) -> Self {
        match err {
            WeaveError::Advice(err) => err.into(),
            other => Failure::new(other.kind_name(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = WeaveError::unknown_target("billing.charge");
        assert_eq!(err.to_string(), "no target named billing.charge");

        let err: WeaveError = AdviceError::expected_generator_function("audit").into();
        assert_eq!(err.to_string(), r#"no advice routine registered as "audit""#);

        let err = WeaveError::io(
            "/nope/aspects.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("failed to read /nope/aspects.toml"));
    }

    #[test]
    fn test_into_failure() {
        let failure = Failure::from(WeaveError::unknown_target("billing.charge"));
        assert_eq!(failure.kind(), "unknown_target");
        assert_eq!(failure.message(), "no target named billing.charge");
        assert!(!failure.is_fatal());

        let failure = Failure::from(WeaveError::from(AdviceError::expected_generator_function("x")));
        assert!(failure.is_fatal());
    }
}
