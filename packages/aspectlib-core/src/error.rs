//! Protocol violations.

use thiserror::Error;

/// Fatal misuse of the advice protocol.
///
/// These are never delivered to advice as ordinary failures and never
/// retried; they surface to the caller at the point they were detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdviceError {
    #[error("no advice routine registered as {name:?}")]
    ExpectedGeneratorFunction { name: String },

    #[error("advice {advice} {reason}")]
    ExpectedGenerator { advice: String, reason: String },

    #[error("unknown advice {signal} from {advice}")]
    UnacceptableAdvice { advice: String, signal: String },

    #[error("operation {operation} {reason}")]
    UnsupportedType { operation: String, reason: String },
}

impl AdviceError {
    pub fn expected_generator_function(name: impl Into<String>) -> Self {
        AdviceError::ExpectedGeneratorFunction { name: name.into() }
    }

    pub fn expected_generator(advice: impl Into<String>, reason: impl Into<String>) -> Self {
        AdviceError::ExpectedGenerator {
            advice: advice.into(),
            reason: reason.into(),
        }
    }

    pub fn unacceptable(advice: impl Into<String>, signal: impl Into<String>) -> Self {
        AdviceError::UnacceptableAdvice {
            advice: advice.into(),
            signal: signal.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        AdviceError::UnsupportedType {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AdviceError::ExpectedGeneratorFunction { .. } => "ExpectedGeneratorFunction",
            AdviceError::ExpectedGenerator { .. } => "ExpectedGenerator",
            AdviceError::UnacceptableAdvice { .. } => "UnacceptableAdvice",
            AdviceError::UnsupportedType { .. } => "UnsupportedType",
        }
    }
}
