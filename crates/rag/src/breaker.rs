use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use triage_core::config::Config;
use triage_core::error::{Result, TriageError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Number of most recent outcomes considered while closed.
    pub window: usize,
    /// Outcomes needed in the window before the failure rate is evaluated.
    pub min_calls: usize,
    pub failure_rate: f32,
    pub open_for: Duration,
    pub half_open_calls: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_calls: 5,
            failure_rate: 0.5,
            open_for: Duration::from_secs(30),
            half_open_calls: 3,
        }
    }
}

impl BreakerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            window: cfg.breaker_window,
            min_calls: cfg.breaker_min_calls,
            failure_rate: cfg.breaker_failure_rate,
            open_for: cfg.breaker_open_for,
            half_open_calls: cfg.breaker_half_open_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub enum CallError {
    /// The breaker is open; the call was never attempted.
    Rejected,
    Failed(TriageError),
}

#[derive(Debug)]
enum State {
    Closed { outcomes: VecDeque<bool> },
    Open { until: Instant },
    HalfOpen { issued: usize, succeeded: usize },
}

/// Breaker state plus a generation bumped on every transition. Outcomes are
/// only counted against the generation that admitted the call.
#[derive(Debug)]
struct Inner {
    state: State,
    generation: u64,
}

impl Inner {
    fn transition(&mut self, state: State) {
        self.state = state;
        self.generation += 1;
    }
}

/// Process-wide circuit breaker. The lock only guards bookkeeping and is
/// never held while the wrapped call runs.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    cfg: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, cfg: BreakerConfig) -> Self {
        Self {
            name,
            cfg,
            inner: Mutex::new(Inner {
                state: State::Closed {
                    outcomes: VecDeque::with_capacity(cfg.window),
                },
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match self.lock().state {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Runs `call` if the breaker admits it and records the outcome. A call
    /// dropped before completing counts as a failure.
    pub async fn call<T, F>(&self, call: F) -> std::result::Result<T, CallError>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(generation) = self.try_acquire() else {
            return Err(CallError::Rejected);
        };
        let mut guard = Outcome {
            breaker: self,
            generation,
            recorded: false,
        };
        let res = call.await;
        guard.record(res.is_ok());
        res.map_err(CallError::Failed)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<u64> {
        let mut inner = self.lock();
        if let State::Open { until } = inner.state {
            if Instant::now() < until {
                return None;
            }
            info!(breaker = self.name, "circuit half-open; allowing trial calls");
            inner.transition(State::HalfOpen {
                issued: 0,
                succeeded: 0,
            });
        }
        let generation = inner.generation;
        match &mut inner.state {
            State::Closed { .. } => Some(generation),
            State::HalfOpen { issued, .. } if *issued < self.cfg.half_open_calls => {
                *issued += 1;
                Some(generation)
            }
            _ => None,
        }
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        if generation != inner.generation {
            debug!(
                breaker = self.name,
                success,
                "ignoring outcome of a call admitted before the last transition"
            );
            return;
        }
        let next = match &mut inner.state {
            State::Closed { outcomes } => {
                outcomes.push_back(success);
                while outcomes.len() > self.cfg.window.max(1) {
                    outcomes.pop_front();
                }
                if outcomes.len() < self.cfg.min_calls.max(1) {
                    return;
                }
                let failures = outcomes.iter().filter(|ok| !**ok).count();
                let rate = failures as f32 / outcomes.len() as f32;
                if rate < self.cfg.failure_rate {
                    return;
                }
                warn!(
                    breaker = self.name,
                    failure_rate = rate,
                    calls = outcomes.len(),
                    open_for = ?self.cfg.open_for,
                    "circuit opened"
                );
                self.opened()
            }
            State::HalfOpen { succeeded, .. } => {
                if !success {
                    warn!(breaker = self.name, "trial call failed; circuit reopened");
                    self.opened()
                } else {
                    *succeeded += 1;
                    if *succeeded < self.cfg.half_open_calls {
                        return;
                    }
                    info!(breaker = self.name, "circuit closed");
                    State::Closed {
                        outcomes: VecDeque::with_capacity(self.cfg.window),
                    }
                }
            }
            // Open admits nothing, so no call can carry its generation.
            State::Open { .. } => return,
        };
        inner.transition(next);
    }

    fn opened(&self) -> State {
        State::Open {
            until: Instant::now() + self.cfg.open_for,
        }
    }
}

struct Outcome<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    recorded: bool,
}

impl Outcome<'_> {
    fn record(&mut self, success: bool) {
        self.recorded = true;
        self.breaker.record(self.generation, success);
    }
}

impl Drop for Outcome<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", BreakerConfig::default())
    }

    async fn fail(b: &CircuitBreaker) -> std::result::Result<(), CallError> {
        b.call(async { Err::<(), _>(TriageError::Unavailable("down".into())) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> std::result::Result<(), CallError> {
        b.call(async { Ok(()) }).await
    }

    #[tokio::test]
    async fn stays_closed_below_min_calls() {
        let b = breaker();
        for _ in 0..4 {
            assert!(matches!(fail(&b).await, Err(CallError::Failed(_))));
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn opens_at_threshold_and_rejects_without_calling() {
        let b = breaker();
        for _ in 0..3 {
            succeed(&b).await.unwrap();
        }
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        assert_eq!(b.state(), BreakerState::Open);

        let attempts = Arc::new(AtomicUsize::new(0));
        let res = b
            .call({
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(res, Err(CallError::Rejected)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn window_forgets_old_failures() {
        let b = breaker();
        for _ in 0..4 {
            let _ = fail(&b).await;
        }
        for _ in 0..10 {
            succeed(&b).await.unwrap();
        }
        let _ = fail(&b).await;
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_closes_after_successful_trials() {
        let b = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        assert_eq!(b.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..3 {
            succeed(&b).await.unwrap();
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let b = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        let _ = fail(&b).await;
        assert_eq!(b.state(), BreakerState::Open);
        assert!(matches!(succeed(&b).await, Err(CallError::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_limits_concurrent_trials() {
        let b = Arc::new(breaker());
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut trials = Vec::new();
        for _ in 0..3 {
            let b = b.clone();
            let gate = gate.clone();
            trials.push(tokio::spawn(async move {
                b.call(async move {
                    let _permit = gate.acquire().await;
                    Ok(())
                })
                .await
                .is_ok()
            }));
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(succeed(&b).await, Err(CallError::Rejected)));

        gate.add_permits(3);
        for trial in trials {
            assert!(trial.await.unwrap());
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_outcome_from_before_the_trip_is_ignored() {
        let b = Arc::new(breaker());
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let slow = {
            let b = b.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                b.call(async move {
                    let _permit = gate.acquire().await;
                    Err::<(), _>(TriageError::Unavailable("slow".into()))
                })
                .await
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        assert_eq!(b.state(), BreakerState::Open);
        tokio::time::advance(Duration::from_secs(31)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);

        gate.add_permits(1);
        assert!(matches!(slow.await.unwrap(), Err(CallError::Failed(_))));
        assert_eq!(b.state(), BreakerState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_does_not_count_as_a_trial() {
        let b = Arc::new(breaker());
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let slow = {
            let b = b.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                b.call(async move {
                    let _permit = gate.acquire().await;
                    Ok(())
                })
                .await
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        succeed(&b).await.unwrap();
        succeed(&b).await.unwrap();

        gate.add_permits(1);
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn dropped_call_counts_as_failure() {
        let b = CircuitBreaker::new(
            "test",
            BreakerConfig {
                min_calls: 1,
                ..BreakerConfig::default()
            },
        );
        let pending = b.call(std::future::pending::<Result<()>>());
        let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;
        assert_eq!(b.state(), BreakerState::Open);
    }
}
