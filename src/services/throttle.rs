//! Trailing-edge rate limiter
//!
//! `invoke(args)` fires the operation at most once per `delay` window and
//! always fires the most recent args of a burst once the window closes,
//! even if no further invocations arrive. Only the newest pending args
//! survive; older ones are dropped. Cancelling (or dropping the limiter)
//! discards a pending fire without running it.
//!
//! The limiter is bound once to its operation; callers pass the current
//! values as call-time args instead of rebuilding the limiter.
//!
//! The operation runs with the limiter's lock held, so once `cancel` returns
//! no fire is in progress. It must not call back into the limiter.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

type Operation<A> = Arc<dyn Fn(A) + Send + Sync>;

/// What `invoke` decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Operation ran synchronously inside `invoke`
    Fired,
    /// Operation will run after `after` unless superseded or cancelled
    Scheduled { after: Duration },
}

/// Per-limiter bookkeeping
struct ThrottleState<A> {
    last_fire: Option<Instant>,
    pending_args: Option<A>,
    pending_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the pending fire is replaced or cancelled
    generation: u64,
}

impl<A> ThrottleState<A> {
    fn clear_pending(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
        self.pending_args.take().is_some()
    }
}

pub struct RateLimiter<A: Send + 'static> {
    delay: Duration,
    state: Arc<Mutex<ThrottleState<A>>>,
    op: Operation<A>,
}

impl<A: Send + 'static> RateLimiter<A> {
    pub fn new<F>(delay: Duration, op: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            delay,
            state: Arc::new(Mutex::new(ThrottleState {
                last_fire: None,
                pending_args: None,
                pending_timer: None,
                generation: 0,
            })),
            op: Arc::new(op),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending_args.is_some()
    }

    /// Submit new args; must be called from within a tokio runtime
    pub fn invoke(&self, args: A) -> Invocation {
        let now = Instant::now();
        let mut state = self.state.lock();
        let elapsed = state.last_fire.map(|t| now.saturating_duration_since(t));

        match elapsed {
            Some(elapsed) if elapsed < self.delay => {
                let after = self.delay - elapsed;
                state.clear_pending();
                let generation = state.generation;
                state.pending_args = Some(args);

                let shared = Arc::clone(&self.state);
                let op = Arc::clone(&self.op);
                let deadline = now + after;
                state.pending_timer = Some(tokio::spawn(async move {
                    sleep_until(deadline).await;
                    fire_pending(&shared, &op, generation);
                }));

                Invocation::Scheduled { after }
            }
            _ => {
                // Window open: newest args win over anything still pending
                state.clear_pending();
                state.last_fire = Some(now);
                (self.op)(args);
                Invocation::Fired
            }
        }
    }

    /// Drop a pending fire without running it. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let dropped = self.state.lock().clear_pending();
        if dropped {
            debug!("throttle_pending_cancelled");
        }
        dropped
    }
}

impl<A: Send + 'static> Drop for RateLimiter<A> {
    fn drop(&mut self) {
        self.state.lock().clear_pending();
    }
}

/// Timer body: fire only if this timer is still the current one
fn fire_pending<A>(state: &Mutex<ThrottleState<A>>, op: &Operation<A>, generation: u64) {
    let mut state = state.lock();
    if state.generation != generation {
        return;
    }
    state.pending_timer = None;
    let Some(args) = state.pending_args.take() else {
        return;
    };
    state.last_fire = Some(Instant::now());
    op(args);
}
