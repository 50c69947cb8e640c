//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use web_time::{Duration, Instant};

use crate::error::Cancelled;

/// A token long-running work polls with [`check`](CancelToken::check).
///
/// Clones share one flag. A [`child`](CancelToken::child) has its own flag
/// and deadline but also observes every ancestor, so cancelling a workflow
/// cancels the stage it is running while a stage timeout stays local.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn child(&self) -> CancelToken {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// A child that also expires `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> CancelToken {
        CancelToken {
            deadline: Some(Instant::now() + timeout),
            ..self.child()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// `Err` once this token or any ancestor is cancelled or past its
    /// deadline. An explicit cancel wins over an expired deadline.
    pub fn check(&self) -> Result<(), Cancelled> {
        let mut expired = false;
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t.cancelled.load(Ordering::Acquire) {
                return Err(Cancelled::Requested);
            }
            if t.deadline.is_some_and(|d| Instant::now() >= d) {
                expired = true;
            }
            cur = t.parent.as_deref();
        }
        if expired {
            Err(Cancelled::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Sleep up to `dur`, waking early on cancellation.
    pub fn sleep(&self, dur: Duration) -> Result<(), Cancelled> {
        const SLICE: Duration = Duration::from_millis(10);
        let until = Instant::now() + dur;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep((until - now).min(SLICE));
        }
    }
}
