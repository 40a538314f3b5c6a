//! Best-effort profiler bootstrap with bounded retries.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Attempting(1) -> Attempting(2) -> ... -> Running
//!                                               \-> Exhausted
//! ```
//!
//! 1. [`spawn`] starts [`ProfilerBootstrap::run`] on a detached Tokio task, so
//!    server startup never waits on it.
//! 2. Each failed attempt `n` is followed by a delay of `base_delay × n`
//!    (10 s, 20 s, 30 s with the default [`BackoffPolicy`]).
//! 3. After `max_attempts` failures the bootstrap stops in
//!    [`ProfilerState::Exhausted`] and profiling stays off for the life of the
//!    process. Nothing is propagated to the caller beyond a warning log.
//!
//! There is no cancellation; the task runs to one of its terminal states.

pub mod agent;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::ProfilerError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use agent::{ProfileTarget, ProfilerClient};

/// Retry schedule for profiler start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay taken after the `attempt`-th (1-based) failure.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Where the bootstrap is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilerState {
    Idle,
    /// Making the n-th (1-based) start attempt.
    Attempting(u32),
    /// Profiler started. Terminal.
    Running,
    /// All attempts failed; back to idle for good. Terminal.
    Exhausted,
}

impl ProfilerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProfilerState::Running | ProfilerState::Exhausted)
    }
}

/// Final state plus the number of start attempts made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerOutcome {
    pub state: ProfilerState,
    pub attempts: u32,
}

/// Source of backoff delays, swapped out in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

/// Real-time delays on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Drives a [`ProfilerClient`] through the retry state machine.
pub struct ProfilerBootstrap<S> {
    client: Arc<dyn ProfilerClient>,
    sleeper: S,
    policy: BackoffPolicy,
    target: ProfileTarget,
}

impl<S: Sleeper> ProfilerBootstrap<S> {
    pub fn new(
        client: Arc<dyn ProfilerClient>,
        sleeper: S,
        policy: BackoffPolicy,
        target: ProfileTarget,
    ) -> Self {
        Self {
            client,
            sleeper,
            policy,
            target,
        }
    }

    /// Run until a terminal state is reached.
    pub async fn run(self) -> ProfilerOutcome {
        let mut state = ProfilerState::Idle;
        let mut attempts = 0;

        while !state.is_terminal() {
            state = match state {
                ProfilerState::Idle if self.policy.max_attempts == 0 => ProfilerState::Exhausted,
                ProfilerState::Idle => ProfilerState::Attempting(1),
                ProfilerState::Attempting(n) => {
                    attempts = n;
                    self.step(n).await
                }
                terminal => terminal,
            };
        }

        let outcome = ProfilerOutcome { state, attempts };
        match outcome.state {
            ProfilerState::Running => info!(attempts = outcome.attempts, "profiler started"),
            _ => warn!(
                attempts = outcome.attempts,
                "could not start profiler after retrying, giving up; profiling disabled"
            ),
        }
        outcome
    }

    /// One attempt and, on failure, its backoff.
    async fn step(&self, attempt: u32) -> ProfilerState {
        match self.try_start().await {
            Ok(()) => ProfilerState::Running,
            Err(e) => {
                warn!(attempt, error = %e, "failed to start profiler");
                let delay = self.policy.delay_after(attempt);
                info!(attempt, delay_secs = delay.as_secs(), "sleeping before retrying profiler start");
                self.sleeper.sleep(delay).await;
                if attempt >= self.policy.max_attempts {
                    ProfilerState::Exhausted
                } else {
                    ProfilerState::Attempting(attempt + 1)
                }
            }
        }
    }

    async fn try_start(&self) -> Result<(), ProfilerError> {
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || client.start(&target))
            .await
            .unwrap_or_else(|e| {
                Err(ProfilerError::Registration(format!(
                    "profiler start panicked: {e}"
                )))
            })
    }
}

/// Start the bootstrap on a detached background task with real delays.
pub fn spawn(
    client: Arc<dyn ProfilerClient>,
    target: ProfileTarget,
    policy: BackoffPolicy,
) -> JoinHandle<ProfilerOutcome> {
    tokio::spawn(ProfilerBootstrap::new(client, TokioSleeper, policy, target).run())
}
