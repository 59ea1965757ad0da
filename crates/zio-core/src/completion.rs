//! Completion signal shared by the coordinator and its participants
//!
//! Every source and sink holds one [`CompletionGuard`]. The guard releases
//! its slot exactly once: explicitly through [`CompletionGuard::done`], or
//! implicitly when dropped, which covers early returns, `?` propagation and
//! panics unwinding through the task.
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> zio_core::Result<()> {
//! use zio_core::CompletionSignal;
//!
//! let signal = CompletionSignal::new();
//! let guard = signal.participant()?;
//! signal.seal();
//!
//! tokio::spawn(async move {
//!     // ... feed or drain a channel ...
//!     guard.done();
//! });
//!
//! signal.wait().await;
//! assert_eq!(signal.released(), 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

struct Inner {
    outstanding: watch::Sender<usize>,
    released: AtomicUsize,
    sealed: AtomicBool,
}

/// Counter of outstanding participants the coordinator waits on
#[derive(Clone)]
pub struct CompletionSignal {
    inner: Arc<Inner>,
}

impl CompletionSignal {
    /// Create a signal with no participants
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                outstanding,
                released: AtomicUsize::new(0),
                sealed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a participant
    ///
    /// Fails once the signal has been sealed: the count is never raised after
    /// the pipeline has started.
    pub fn participant(&self) -> Result<CompletionGuard> {
        if self.inner.sealed.load(Ordering::SeqCst) {
            return Err(Error::Other(
                "completion signal is sealed, no new participants allowed".to_string(),
            ));
        }

        self.inner.outstanding.send_modify(|n| *n += 1);
        Ok(CompletionGuard {
            inner: Some(Arc::clone(&self.inner)),
        })
    }

    /// Stop accepting participants
    pub fn seal(&self) {
        self.inner.sealed.store(true, Ordering::SeqCst);
    }

    /// Number of participants that have not released yet
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Total number of releases observed so far
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Wait until every registered participant has released
    pub async fn wait(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's slot in a [`CompletionSignal`]
#[must_use = "dropping the guard releases the participant immediately"]
pub struct CompletionGuard {
    inner: Option<Arc<Inner>>,
}

impl CompletionGuard {
    /// Release this participant
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.released.fetch_add(1, Ordering::SeqCst);
            inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
