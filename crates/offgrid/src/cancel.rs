//! Cooperative cancellation shared between a query and its caller.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use once_cell::sync::OnceCell;
use thiserror::Error;

/// Why a query stopped early. Not an error for the caller: it ends up as the
/// `Cancelled` end marker of the results.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    #[error("search cancelled by the caller")]
    ByUser,
    #[error("search deadline exceeded")]
    Deadline,
}

pub type CancelResult<T> = std::result::Result<T, Cancelled>;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    timeout: Option<Duration>,
    /// When the timeout started running.
    started: OnceCell<Instant>,
    soft_deadline: bool,
    produced: AtomicUsize,
}

/// A cancellation flag plus an optional deadline.
///
/// With a soft deadline, an expired timeout is ignored for as long as the
/// query has produced nothing: returning an empty list on a slow first hit
/// is worse than running late. An explicit [`cancel`](Self::cancel) always
/// wins.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl CancelToken {
    /// A token whose timeout runs from now.
    pub fn new(timeout: Option<Duration>, soft_deadline: bool) -> Self {
        let token = Self::pending(timeout, soft_deadline);
        token.start();
        token
    }

    /// A token whose timeout only runs once [`start`](Self::start) is
    /// called, e.g. when a queued query is picked up.
    pub fn pending(timeout: Option<Duration>, soft_deadline: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                timeout,
                started: OnceCell::new(),
                soft_deadline,
                produced: AtomicUsize::new(0),
            }),
        }
    }

    /// Starts the timeout. Later calls keep the first start.
    pub fn start(&self) {
        self.inner.started.get_or_init(Instant::now);
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled_by_user(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn deadline_passed(&self) -> bool {
        match (self.inner.timeout, self.inner.started.get()) {
            (Some(timeout), Some(started)) => started.elapsed() >= timeout,
            _ => false,
        }
    }

    /// Records that `n` more candidate results exist.
    pub fn note_produced(&self, n: usize) {
        self.inner.produced.fetch_add(n, Ordering::Relaxed);
    }

    pub fn produced(&self) -> usize {
        self.inner.produced.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> CancelResult<()> {
        if self.is_cancelled_by_user() {
            return Err(Cancelled::ByUser);
        }
        if self.deadline_passed() && !(self.inner.soft_deadline && self.produced() == 0) {
            return Err(Cancelled::Deadline);
        }
        Ok(())
    }
}

/// Checks a token only every `interval` calls, for tight inner loops.
pub struct CancelPoller<'a> {
    token: &'a CancelToken,
    interval: u32,
    counter: u32,
}

impl<'a> CancelPoller<'a> {
    pub fn new(token: &'a CancelToken, interval: u32) -> Self {
        Self {
            token,
            interval: interval.max(1),
            counter: 0,
        }
    }

    pub fn poll(&mut self) -> CancelResult<()> {
        self.counter += 1;
        if self.counter >= self.interval {
            self.counter = 0;
            self.token.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_cancel() {
        let token = CancelToken::default();
        assert!(token.check().is_ok());
        token.clone().cancel();
        assert_eq!(token.check(), Err(Cancelled::ByUser));
    }

    #[test]
    fn test_hard_deadline() {
        let token = CancelToken::new(Some(Duration::ZERO), false);
        assert_eq!(token.check(), Err(Cancelled::Deadline));
    }

    // The soft deadline is a tunable heuristic: these tests pin the current
    // policy, not a precision guarantee.
    #[test]
    fn test_soft_deadline_ignored_until_something_is_produced() {
        let token = CancelToken::new(Some(Duration::ZERO), true);
        assert!(token.check().is_ok());
        token.note_produced(1);
        assert_eq!(token.check(), Err(Cancelled::Deadline));
    }

    #[test]
    fn test_soft_deadline_never_overrides_user_cancel() {
        let token = CancelToken::new(Some(Duration::ZERO), true);
        token.cancel();
        assert_eq!(token.check(), Err(Cancelled::ByUser));
    }

    #[test]
    fn test_pending_deadline_runs_from_start() {
        let token = CancelToken::pending(Some(Duration::ZERO), false);
        assert!(token.check().is_ok());
        token.clone().start();
        assert_eq!(token.check(), Err(Cancelled::Deadline));
    }

    #[test]
    fn test_poller_checks_every_interval() {
        let token = CancelToken::default();
        let mut poller = CancelPoller::new(&token, 4);
        token.cancel();
        assert!(poller.poll().is_ok());
        assert!(poller.poll().is_ok());
        assert!(poller.poll().is_ok());
        assert_eq!(poller.poll(), Err(Cancelled::ByUser));
    }
}
