//! Rate limit gates.
//!
//! A gate wraps every request to one source and returns the wrapped call's
//! result unchanged. All requests to a source must go through the same gate
//! instance, which is why sources own their gate and hand out a reference.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};
use crate::source::RawResponse;

pub type RequestOp<'a> = &'a mut dyn FnMut() -> SourceResult<RawResponse>;

pub trait RateLimit: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Run `op` under this gate's policy.
    fn request(&self, op: RequestOp<'_>) -> SourceResult<RawResponse>;
}

/// Exponential backoff for retryable source errors. `max_retries = 0` disables
/// retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Call `op`, retrying retryable errors with exponential backoff until the
    /// retry budget is spent.
    pub fn run<T>(&self, mut op: impl FnMut() -> SourceResult<T>) -> SourceResult<T> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(self.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.max_backoff_ms);
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "retrying source request");
                    thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, max_backoff);
                }
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic in another request leaves the timing state usable.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Calls straight through: no delay, no serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRateLimit;

impl RateLimit for NoRateLimit {
    fn name(&self) -> &'static str {
        "none"
    }

    fn request(&self, op: RequestOp<'_>) -> SourceResult<RawResponse> {
        op()
    }
}

/// Enforces a minimum spacing between request starts. The gate's lock is held
/// for the whole call, so requests to the source are fully serialized.
#[derive(Debug)]
pub struct IntervalRateLimit {
    min_interval: Duration,
    retry: RetryConfig,
    last: Mutex<Option<Instant>>,
}

impl IntervalRateLimit {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            retry: RetryConfig::default(),
            last: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl RateLimit for IntervalRateLimit {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn request(&self, op: RequestOp<'_>) -> SourceResult<RawResponse> {
        let mut last = lock(&self.last);
        self.retry.run(|| {
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.min_interval {
                    thread::sleep(self.min_interval - elapsed);
                }
            }
            *last = Some(Instant::now());
            op()
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled: Instant,
}

/// Token bucket: `requests_per_second` sustained, up to `burst_size` at once.
/// Only token acquisition is serialized; the calls themselves may overlap.
#[derive(Debug)]
pub struct TokenBucketRateLimit {
    requests_per_second: f64,
    burst_size: u32,
    retry: RetryConfig,
    bucket: Mutex<Bucket>,
}

/// Slowest accepted rate: one request every 1000 seconds.
pub const MIN_REQUESTS_PER_SECOND: f64 = 1e-3;

impl TokenBucketRateLimit {
    pub fn new(requests_per_second: f64, burst_size: u32) -> SourceResult<Self> {
        if !(requests_per_second.is_finite() && requests_per_second >= MIN_REQUESTS_PER_SECOND) {
            return Err(SourceError::Config(format!(
                "requests_per_second must be at least {MIN_REQUESTS_PER_SECOND}, got {requests_per_second}"
            )));
        }
        let burst_size = burst_size.max(1);
        Ok(Self {
            requests_per_second,
            burst_size,
            retry: RetryConfig::default(),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst_size),
                refilled: Instant::now(),
            }),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn acquire(&self) {
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let earned = now.duration_since(bucket.refilled).as_secs_f64() * self.requests_per_second;
        bucket.tokens = (bucket.tokens + earned).min(f64::from(self.burst_size));
        bucket.refilled = now;
        if bucket.tokens < 1.0 {
            let wait = (1.0 - bucket.tokens) / self.requests_per_second;
            let wait = Duration::try_from_secs_f64(wait).unwrap_or(Duration::from_secs(1_000));
            thread::sleep(wait);
            bucket.tokens = 1.0;
            bucket.refilled = Instant::now();
        }
        bucket.tokens -= 1.0;
    }
}

impl RateLimit for TokenBucketRateLimit {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn request(&self, op: RequestOp<'_>) -> SourceResult<RawResponse> {
        self.retry.run(|| {
            self.acquire();
            op()
        })
    }
}

/// Serialized form of a gate (federation documents).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitConfig {
    #[default]
    None,
    Interval {
        min_interval_ms: u64,
        #[serde(default)]
        retry: RetryConfig,
    },
    TokenBucket {
        requests_per_second: f64,
        #[serde(default = "default_burst")]
        burst_size: u32,
        #[serde(default)]
        retry: RetryConfig,
    },
}

fn default_burst() -> u32 {
    1
}

impl RateLimitConfig {
    pub fn build(&self) -> SourceResult<Arc<dyn RateLimit>> {
        let built: Arc<dyn RateLimit> = match self {
            RateLimitConfig::None => Arc::new(NoRateLimit),
            RateLimitConfig::Interval {
                min_interval_ms,
                retry,
            } => Arc::new(
                IntervalRateLimit::new(Duration::from_millis(*min_interval_ms)).with_retry(*retry),
            ),
            RateLimitConfig::TokenBucket {
                requests_per_second,
                burst_size,
                retry,
            } => Arc::new(
                TokenBucketRateLimit::new(*requests_per_second, *burst_size)?.with_retry(*retry),
            ),
        };
        Ok(built)
    }
}
