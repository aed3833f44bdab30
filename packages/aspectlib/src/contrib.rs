//! Retry advice.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aspectlib_core::{Advisor, Aspect, Failure, Interceptor, Invocation, Operation, Pause, Sleeper};
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

/// Seconds to wait before a retry, given how many retries came before it.
#[derive(Clone, Default)]
pub enum Backoff {
    #[default]
    None,
    Fixed(f64),
    /// `2^count`
    Exponential,
    /// `1, 2, 5`, then `5 * (count - 1)`
    Straight,
    /// `1, 2, 5, 10, 15, 30`, then `60`
    Flat,
    Custom(Arc<dyn Fn(u32) -> f64 + Send + Sync>),
}

impl Backoff {
    pub fn seconds(&self, count: u32) -> f64 {
        match self {
            Backoff::None => 0.0,
            Backoff::Fixed(seconds) => *seconds,
            Backoff::Exponential => 2f64.powi(count.min(1024) as i32),
            Backoff::Straight => match count {
                0 => 1.0,
                1 => 2.0,
                2 => 5.0,
                n => 5.0 * f64::from(n - 1),
            },
            Backoff::Flat => match count {
                0 => 1.0,
                1 => 2.0,
                2 => 5.0,
                3 => 10.0,
                4 => 15.0,
                5 => 30.0,
                _ => 60.0,
            },
            Backoff::Custom(backoff) => backoff(count),
        }
    }

    /// The wait as a `Duration`. Negative and NaN waits are zero; waits too
    /// long to represent saturate at `Duration::MAX`.
    pub fn delay(&self, count: u32) -> Duration {
        let seconds = self.seconds(count);
        if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::None => write!(f, "None"),
            Backoff::Fixed(seconds) => write!(f, "Fixed({seconds})"),
            Backoff::Exponential => write!(f, "Exponential"),
            Backoff::Straight => write!(f, "Straight"),
            Backoff::Flat => write!(f, "Flat"),
            Backoff::Custom(_) => write!(f, "Custom"),
        }
    }
}

pub const DEFAULT_RETRIES: u32 = 5;

pub fn default_kinds() -> Vec<String> {
    ["io", "os", "eof"].iter().map(|kind| kind.to_string()).collect()
}

type Hook = Arc<dyn Fn() + Send + Sync>;
type Sleep = Arc<dyn Fn(Duration) + Send + Sync>;
type AsyncSleep = Arc<dyn Fn(Duration) -> LocalBoxFuture<'static, ()> + Send + Sync>;

/// Waits between attempts: `sleep` around plain calls and sequences,
/// `sleep_async` around async operations.
struct Backoffs {
    sleep: Sleep,
    sleep_async: AsyncSleep,
}

impl Sleeper for Backoffs {
    fn sleep(&self, delay: Duration) {
        (self.sleep)(delay)
    }

    fn sleep_async(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        (self.sleep_async)(delay)
    }
}

/// Re-runs a failing call up to `retries` more times.
///
/// Only failures whose kind is listed are retried; an empty list retries
/// any failure. Protocol violations are never retried. Around async
/// operations the wait is awaited with `tokio::time::sleep`, so the
/// calling task must run inside a tokio runtime unless `sleep_async` is
/// replaced.
#[derive(Clone)]
pub struct Retry {
    retries: u32,
    backoff: Backoff,
    kinds: Vec<String>,
    cleanup: Option<Hook>,
    sleep: Sleep,
    sleep_async: AsyncSleep,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            retries: DEFAULT_RETRIES,
            backoff: Backoff::None,
            kinds: default_kinds(),
            cleanup: None,
            sleep: Arc::new(std::thread::sleep),
            sleep_async: Arc::new(|delay| tokio::time::sleep(delay).boxed_local()),
        }
    }
}

impl Retry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Run `cleanup` before every retry.
    pub fn cleanup(mut self, cleanup: impl Fn() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    /// Blocking wait, used around plain calls and sequences.
    pub fn sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    /// Non-blocking wait, used around async operations.
    pub fn sleep_async<F, Fut>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.sleep_async = Arc::new(move |delay| sleep(delay).boxed_local());
        self
    }

    pub fn is_retryable(&self, failure: &Failure) -> bool {
        if failure.is_fatal() {
            return false;
        }
        self.kinds.is_empty() || self.kinds.iter().any(|kind| kind == failure.kind())
    }

    pub fn aspect(&self) -> Aspect {
        let policy = self.clone();
        let sleeper: Arc<dyn Sleeper> = Arc::new(Backoffs {
            sleep: Arc::clone(&self.sleep),
            sleep_async: Arc::clone(&self.sleep_async),
        });
        Aspect::routine("retry", move |invocation: Invocation, advisor: Advisor| {
            let policy = policy.clone();
            let sleeper = Arc::clone(&sleeper);
            async move {
                let mut count = 0;
                let mut pause = None;
                loop {
                    if count > 0 {
                        if let Some(cleanup) = &policy.cleanup {
                            cleanup();
                        }
                    }
                    let outcome = match pause.take() {
                        Some(pause) => advisor.proceed_after(pause).await,
                        None => advisor.proceed().await,
                    };
                    match outcome {
                        Ok(result) => return Ok(Some(result)),
                        Err(failure) if count < policy.retries && policy.is_retryable(&failure) => {
                            let delay = policy.backoff.delay(count);
                            log::warn!(
                                "{invocation} raised {failure}. {} retries left. Sleeping {:.3} secs.",
                                policy.retries - count,
                                delay.as_secs_f64()
                            );
                            pause = Some(Pause::new(delay, Arc::clone(&sleeper)));
                            count += 1;
                        }
                        Err(failure) => return Err(failure),
                    }
                }
            }
        })
    }
}

impl Interceptor for Retry {
    fn wrap(&self, operation: Operation) -> Operation {
        self.aspect().wrap(operation)
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .field("kinds", &self.kinds)
            .finish()
    }
}
