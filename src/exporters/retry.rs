// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Sub;
use std::pin::Pin;
use std::time::Duration;
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::retry::Policy;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(300),
        }
    }
}

const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Exponential backoff retry policy for a tower `Retry` service.
///
/// State is per request: the service stack must be cloned before each call so
/// that every request starts with a fresh backoff and start time.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    current_backoff: Duration,
    request_start: Option<Instant>,
    attempts: u32,
    is_retryable: fn(&E) -> bool,
    cancel: CancellationToken,
    _phantom: PhantomData<fn(&E)>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            current_backoff: self.current_backoff,
            request_start: self.request_start,
            attempts: self.attempts,
            is_retryable: self.is_retryable,
            cancel: self.cancel.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + 'static,
{
    /// `cancel` stops all further retries and wakes any pending backoff.
    pub fn new(
        retry_config: RetryConfig,
        is_retryable: fn(&E) -> bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            // A zero backoff would never grow
            current_backoff: retry_config.initial_interval.max(MIN_BACKOFF),
            config: retry_config,
            request_start: None,
            attempts: 0,
            is_retryable,
            cancel,
            _phantom: PhantomData,
        }
    }

    fn should_retry<T>(&self, now: Instant, result: &Result<T, BoxError>) -> bool {
        if !self.config.enabled || self.cancel.is_cancelled() {
            return false;
        }

        let err = match result {
            Ok(_) => return false,
            Err(e) => e,
        };

        let start = match self.request_start {
            Some(start) => start,
            None => return false,
        };
        if now.gt(&start) && now.sub(start) >= self.config.max_elapsed_time {
            return false;
        }

        // Errors we can't classify are not retried
        err.downcast_ref::<E>()
            .is_some_and(|e| (self.is_retryable)(e))
    }

    fn next_delay(&self) -> Duration {
        let backoff_ms = self.current_backoff.as_millis() as i64;

        let mut v = backoff_ms / 2;
        // avoid div by zero
        if v == 0 {
            v = 1;
        }

        // Exponential backoff with jitter
        let jitter = (rand::random::<i64>() % v) - (v / 2);
        let mut sleep_ms = backoff_ms + jitter;
        if sleep_ms < 0 {
            sleep_ms = 1;
        }
        Duration::from_millis(sleep_ms as u64)
    }
}

impl<Req, Res, E> Policy<Req, Res, BoxError> for RetryPolicy<E>
where
    Req: Clone,
    Res: Debug,
    E: std::error::Error + 'static,
{
    type Future = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn retry(&mut self, _req: &mut Req, result: &mut Result<Res, BoxError>) -> Option<Self::Future> {
        // Should never happen
        if self.request_start.is_none() {
            warn!("Request start time not set in retry policy, refusing retry.");
            return None;
        }

        let now = Instant::now();
        if !self.should_retry(now, result) {
            return None;
        }

        self.attempts += 1;
        let sleep_duration = self.next_delay();

        // If the sleep duration would put us over the maximum elapsed time, then
        // stop retrying.
        let start = self.request_start?;
        if now + sleep_duration > start + self.config.max_elapsed_time {
            return None;
        }

        info!(
            attempt = self.attempts,
            delay = ?sleep_duration,
            status = ?result,
            "Exporting failed, will retry again after delay.",
        );

        let cancel = self.cancel.clone();
        let fut = async move {
            select! {
                _ = cancel.cancelled() => {},
                _ = tokio::time::sleep(sleep_duration) => {},
            }
        };

        // Increase backoff for next retry, but cap at max_interval
        self.current_backoff = std::cmp::min(self.current_backoff * 2, self.config.max_interval)
            .max(MIN_BACKOFF);

        Some(Box::pin(fut))
    }

    fn clone_request(&mut self, req: &Req) -> Option<Req> {
        if self.request_start.is_none() {
            self.request_start = Some(Instant::now());
        }
        Some(req.clone())
    }
}
