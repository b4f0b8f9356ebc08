//! Timeout accounting around blocking destination calls.
//!
//! The adapter only brackets `accept` and `notify_end_of_input` with start/reset
//! hooks. Detecting and acting on an overrun is the monitor's business and happens
//! on a separate task; the bracketed call itself is never interrupted.

use crate::config::TimeoutSettings;
use crate::{ConnectorError, ConnectorResult, DestinationMetrics};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Start/reset hooks bracketing blocking destination calls
#[cfg_attr(test, mockall::automock)]
pub trait TimeoutMonitor: Send + Sync {
    fn start_accept_timer(&self);
    fn reset_accept_timer(&self);
    fn start_notify_end_of_input_timer(&self);
    fn reset_notify_end_of_input_timer(&self);
}

/// Monitor that ignores every hook
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTimeoutMonitor;

impl TimeoutMonitor for NoopTimeoutMonitor {
    fn start_accept_timer(&self) {}
    fn reset_accept_timer(&self) {}
    fn start_notify_end_of_input_timer(&self) {}
    fn reset_notify_end_of_input_timer(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    started: Instant,
    warned: bool,
}

#[derive(Debug)]
struct Timer {
    operation: &'static str,
    threshold: Duration,
    in_flight: Mutex<Option<InFlight>>,
}

impl Timer {
    fn new(operation: &'static str, threshold: Duration) -> Self {
        Self {
            operation,
            threshold,
            in_flight: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn start(&self) {
        *self.lock() = Some(InFlight {
            started: Instant::now(),
            warned: false,
        });
    }

    fn reset(&self) {
        *self.lock() = None;
    }

    /// Elapsed time of the in-flight call if it exceeded the threshold
    fn overrun(&self) -> Option<Duration> {
        let guard = self.lock();
        let elapsed = guard.as_ref()?.started.elapsed();
        (elapsed > self.threshold).then_some(elapsed)
    }

    /// Like [`Timer::overrun`], but reports each in-flight call at most once
    fn take_unreported_overrun(&self) -> Option<Duration> {
        let mut guard = self.lock();
        let in_flight = guard.as_mut()?;
        let elapsed = in_flight.started.elapsed();
        if elapsed <= self.threshold || in_flight.warned {
            return None;
        }
        in_flight.warned = true;
        Some(elapsed)
    }

    fn error(&self, elapsed: Duration) -> ConnectorError {
        ConnectorError::Timeout {
            operation: self.operation.to_string(),
            elapsed,
            threshold: self.threshold,
        }
    }
}

/// Tracks in-flight accept / end-of-input calls against configured thresholds
#[derive(Debug)]
pub struct DestinationTimeoutMonitor {
    accept: Timer,
    notify_end_of_input: Timer,
    check_interval: Duration,
    fail_on_timeout: bool,
    metrics: Option<DestinationMetrics>,
}

impl DestinationTimeoutMonitor {
    /// Fails if the check interval is zero
    pub fn new(settings: &TimeoutSettings) -> ConnectorResult<Self> {
        if settings.check_interval_ms == 0 {
            return Err(ConnectorError::config("timeouts.check_interval_ms must be > 0"));
        }

        Ok(Self {
            accept: Timer::new("accept", Duration::from_millis(settings.accept_timeout_ms)),
            notify_end_of_input: Timer::new(
                "notify_end_of_input",
                Duration::from_millis(settings.notify_end_of_input_timeout_ms),
            ),
            check_interval: Duration::from_millis(settings.check_interval_ms),
            fail_on_timeout: settings.fail_on_timeout,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: DestinationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fails if an in-flight call has exceeded its threshold
    pub fn check(&self) -> ConnectorResult<()> {
        for timer in [&self.accept, &self.notify_end_of_input] {
            if let Some(elapsed) = timer.overrun() {
                return Err(timer.error(elapsed));
            }
        }
        Ok(())
    }

    /// Drive `future` to completion unless a bracketed call overruns first.
    ///
    /// When failing on timeouts is disabled, overruns are only logged (once per
    /// call) and `future` keeps running.
    pub async fn run_with_timeout<F, T>(&self, future: F) -> ConnectorResult<T>
    where
        F: Future<Output = ConnectorResult<T>>,
    {
        tokio::select! {
            result = future => result,
            err = self.watch() => Err(err),
        }
    }

    async fn watch(&self) -> ConnectorError {
        let mut interval = tokio::time::interval(self.check_interval);
        loop {
            interval.tick().await;

            for timer in [&self.accept, &self.notify_end_of_input] {
                let Some(elapsed) = timer.take_unreported_overrun() else {
                    continue;
                };
                if let Some(metrics) = &self.metrics {
                    metrics.record_timeout(timer.operation);
                }

                let err = timer.error(elapsed);
                if self.fail_on_timeout {
                    return err;
                }
                warn!("Destination timeout detected, continuing: {}", err);
            }
        }
    }
}

impl TimeoutMonitor for DestinationTimeoutMonitor {
    fn start_accept_timer(&self) {
        self.accept.start();
    }

    fn reset_accept_timer(&self) {
        self.accept.reset();
    }

    fn start_notify_end_of_input_timer(&self) {
        self.notify_end_of_input.start();
    }

    fn reset_notify_end_of_input_timer(&self) {
        self.notify_end_of_input.reset();
    }
}
