//! Failures raised by operations and advice.
//!
//! A [`Failure`] is the value an operation produces instead of a result. It
//! travels through the protocol as ordinary data: it is handed to the advice,
//! which may swallow it, translate it or let it propagate. Clones share one
//! allocation, so the caller can check that the failure it observes is the
//! very one the operation raised ([`Failure::same`]).

use std::fmt;
use std::sync::Arc;

use crate::error::AdviceError;
use crate::value::Value;

#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

struct FailureInner {
    kind: String,
    message: String,
    payload: Value,
    advice: Option<AdviceError>,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Failure {
            inner: Arc::new(FailureInner {
                kind: kind.into(),
                message: message.into(),
                payload: Value::None,
                advice: None,
            }),
        }
    }

    pub fn with_payload(
        kind: impl Into<String>,
        message: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Self {
        Failure {
            inner: Arc::new(FailureInner {
                kind: kind.into(),
                message: message.into(),
                payload: payload.into(),
                advice: None,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    /// The protocol violation this failure carries, if any.
    pub fn advice_error(&self) -> Option<&AdviceError> {
        self.inner.advice.as_ref()
    }

    /// Protocol violations are fatal: never handed to advice, never retried.
    pub fn is_fatal(&self) -> bool {
        self.inner.advice.is_some()
    }

    /// Whether both handles refer to the same raised failure.
    pub fn same(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<AdviceError> for Failure {
    fn from(err: AdviceError) -> Self {
        Failure {
            inner: Arc::new(FailureInner {
                kind: err.kind_name().to_string(),
                message: err.to_string(),
                payload: Value::None,
                advice: Some(err),
            }),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.inner.kind)
            .field("message", &self.inner.message)
            .field("payload", &self.inner.payload)
            .field("fatal", &self.is_fatal())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.message.is_empty() {
            write!(f, "{}", self.inner.kind)
        } else {
            write!(f, "{}: {}", self.inner.kind, self.inner.message)
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .advice
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
