//! Scripted lock service for driving the lock acquisition state machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arco_hive::metastore::{
    LockRequest, LockResponse, LockService, LockState, MetastoreError, MetastoreResult,
};
use async_trait::async_trait;

#[derive(Debug)]
struct Script {
    initial: LockState,
    checks: VecDeque<LockState>,
    fallback: LockState,
    check_delay: Option<Duration>,
    fail_lock: bool,
    hang_lock: bool,
    fail_checks: bool,
    fail_unlock: bool,
    next_id: i64,
    requests: Vec<LockRequest>,
    check_calls: usize,
    unlocked: Vec<i64>,
}

/// [`LockService`] that replays a fixed sequence of lock states.
///
/// `lock` answers with the initial state; each `check_lock` pops the next
/// scripted state and repeats the fallback once the script runs out. Every
/// call is counted so tests can assert exactly how often the lock was
/// checked and released.
#[derive(Debug, Clone)]
pub struct ScriptedLockService {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLockService {
    fn with_states(initial: LockState, checks: Vec<LockState>, fallback: LockState) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                initial,
                checks: checks.into(),
                fallback,
                check_delay: None,
                fail_lock: false,
                hang_lock: false,
                fail_checks: false,
                fail_unlock: false,
                next_id: 100,
                requests: Vec::new(),
                check_calls: 0,
                unlocked: Vec::new(),
            })),
        }
    }

    /// Grants every request immediately.
    #[must_use]
    pub fn granting() -> Self {
        Self::with_states(LockState::Acquired, Vec::new(), LockState::Acquired)
    }

    /// Keeps every request waiting forever.
    #[must_use]
    pub fn waiting_forever() -> Self {
        Self::with_states(LockState::Waiting, Vec::new(), LockState::Waiting)
    }

    /// Queues the request, then reports `checks` in order before granting.
    #[must_use]
    pub fn granting_after(checks: Vec<LockState>) -> Self {
        Self::with_states(LockState::Waiting, checks, LockState::Acquired)
    }

    /// Queues the request, then denies it on the first check.
    #[must_use]
    pub fn denying() -> Self {
        Self::with_states(LockState::Waiting, Vec::new(), LockState::Denied)
    }

    /// Makes every `check_lock` call take `delay`.
    #[must_use]
    pub fn with_check_delay(self, delay: Duration) -> Self {
        self.script.lock().expect("lock").check_delay = Some(delay);
        self
    }

    /// Makes `lock` fail with a transport error.
    #[must_use]
    pub fn failing_lock(self) -> Self {
        self.script.lock().expect("lock").fail_lock = true;
        self
    }

    /// Makes `lock` never answer (the request is still recorded).
    #[must_use]
    pub fn hanging_lock(self) -> Self {
        self.script.lock().expect("lock").hang_lock = true;
        self
    }

    /// Makes `check_lock` fail with a transport error.
    #[must_use]
    pub fn failing_checks(self) -> Self {
        self.script.lock().expect("lock").fail_checks = true;
        self
    }

    /// Makes `unlock` fail with a transport error (the call is still recorded).
    #[must_use]
    pub fn failing_unlock(self) -> Self {
        self.script.lock().expect("lock").fail_unlock = true;
        self
    }

    /// Lock requests received, in order.
    pub fn requests(&self) -> Vec<LockRequest> {
        self.script.lock().expect("lock").requests.clone()
    }

    /// Number of `check_lock` calls received.
    pub fn check_calls(&self) -> usize {
        self.script.lock().expect("lock").check_calls
    }

    /// Lock ids passed to `unlock`, in order.
    pub fn unlock_calls(&self) -> Vec<i64> {
        self.script.lock().expect("lock").unlocked.clone()
    }
}

#[async_trait]
impl LockService for ScriptedLockService {
    async fn lock(&self, request: &LockRequest) -> MetastoreResult<LockResponse> {
        let hang = {
            let mut script = self.script.lock().expect("lock");
            script.requests.push(request.clone());
            if script.fail_lock {
                return Err(MetastoreError::transport("lock request refused by test"));
            }
            script.hang_lock
        };
        if hang {
            return std::future::pending().await;
        }
        let mut script = self.script.lock().expect("lock");
        script.next_id += 1;
        Ok(LockResponse {
            lock_id: script.next_id,
            state: script.initial,
        })
    }

    async fn check_lock(&self, lock_id: i64) -> MetastoreResult<LockResponse> {
        let (delay, outcome) = {
            let mut script = self.script.lock().expect("lock");
            script.check_calls += 1;
            let outcome = if script.fail_checks {
                Err(MetastoreError::transport("check_lock failed by test"))
            } else {
                let state = script.checks.pop_front().unwrap_or(script.fallback);
                Ok(LockResponse { lock_id, state })
            };
            (script.check_delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn unlock(&self, lock_id: i64) -> MetastoreResult<()> {
        let mut script = self.script.lock().expect("lock");
        script.unlocked.push(lock_id);
        if script.fail_unlock {
            return Err(MetastoreError::transport("unlock failed by test"));
        }
        Ok(())
    }
}
