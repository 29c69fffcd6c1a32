//! Single-flight node-list refresh (§4.3). A non-reentrant lock guards the in-progress sniff;
//! implemented as an `AtomicBool` compare-exchange rather than a blocking mutex, since the
//! critical section spans an `.await` and a cooperative runtime must never park a worker thread
//! on it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{NodeConfig, SniffConfig};
use crate::error::TransportError;

/// Options passed to the sniff callback.
#[derive(Debug, Clone, Copy)]
pub struct SniffOptions {
    pub is_initial_sniff: bool,
    pub sniff_timeout: Duration,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Caller-installed hook that asks the cluster which nodes currently exist.
pub type SniffCallback =
    Arc<dyn Fn(SniffOptions) -> BoxFuture<'static, Result<Vec<NodeConfig>, TransportError>> + Send + Sync>;

#[derive(Debug, Default)]
struct SniffState {
    last_sniffed_at: Option<Instant>,
}

/// Outcome of a triggered sniff attempt.
#[derive(Debug)]
pub enum SniffOutcome {
    /// Another sniff was already in progress, or no callback/trigger applies; the caller's
    /// request should proceed without waiting.
    Skipped,
    /// The sniff ran and returned a (possibly empty) node list.
    Ran(Vec<NodeConfig>),
    /// The sniff ran but the callback failed. Callers in the retry loop swallow this; callers at
    /// construction time propagate it.
    Failed(TransportError),
}

#[derive(Debug)]
pub struct SniffController {
    busy: AtomicBool,
    state: Mutex<SniffState>,
    config: SniffConfig,
    callback: Option<SniffCallback>,
}

impl SniffController {
    #[must_use]
    pub fn new(config: SniffConfig, callback: Option<SniffCallback>) -> Self {
        Self {
            busy: AtomicBool::new(false),
            state: Mutex::new(SniffState::default()),
            config,
            callback,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SniffConfig {
        &self.config
    }

    /// Validate the sniff configuration consistency required at Transport construction:
    /// a trigger enabled without a callback, or a callback without any trigger, is a
    /// configuration error.
    pub fn validate(config: &SniffConfig, has_callback: bool) -> Result<(), TransportError> {
        if config.any_trigger_enabled() && !has_callback {
            return Err(TransportError::Validation(
                "sniffing is enabled but no sniff_callback was configured".to_owned(),
            ));
        }
        if has_callback && !config.any_trigger_enabled() {
            return Err(TransportError::Validation(
                "a sniff_callback was configured but no sniff trigger is enabled".to_owned(),
            ));
        }
        Ok(())
    }

    fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the single-flight lock. The timestamp update happens before the lock is released
    /// so that any caller observing `busy == false` afterwards also observes the fresh
    /// timestamp (§9: "done under the same critical section as lock release").
    fn release(&self, success_at: Option<Instant>) {
        if let Some(now) = success_at {
            self.state.lock().last_sniffed_at = Some(now);
        }
        self.busy.store(false, Ordering::Release);
    }

    fn cadence_elapsed(&self, now: Instant) -> bool {
        match self.state.lock().last_sniffed_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.config.min_delay_between_sniffing,
        }
    }

    /// Unconditionally attempt a sniff (used for `sniff_on_start` and `sniff_on_node_failure`,
    /// which bypass cadence gating). Returns `Skipped` without running the callback if another
    /// sniff is already in flight or no callback is installed.
    pub async fn sniff(&self, is_initial_sniff: bool) -> SniffOutcome {
        let Some(callback) = self.callback.clone() else {
            return SniffOutcome::Skipped;
        };
        if !self.try_acquire() {
            return SniffOutcome::Skipped;
        }

        let options = SniffOptions {
            is_initial_sniff,
            sniff_timeout: self.config.sniff_timeout,
        };
        let result = callback(options).await;
        match result {
            Ok(nodes) => {
                self.release(Some(Instant::now()));
                SniffOutcome::Ran(nodes)
            }
            Err(err) => {
                self.release(None);
                SniffOutcome::Failed(err)
            }
        }
    }

    /// Attempt a sniff only if `sniff_before_requests` is enabled and the cadence interval has
    /// elapsed since the last successful sniff.
    pub async fn sniff_before_request_if_due(&self) -> SniffOutcome {
        if !self.config.sniff_before_requests {
            return SniffOutcome::Skipped;
        }
        if !self.cadence_elapsed(Instant::now()) {
            return SniffOutcome::Skipped;
        }
        self.sniff(false).await
    }
}
