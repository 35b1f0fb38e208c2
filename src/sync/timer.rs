//! Cancellable turn countdown.
//!
//! At most one countdown task exists per session. It is keyed by the turn
//! epoch it was armed for: re-arming with the same epoch keeps the running
//! task, a different epoch aborts and replaces it. When the task fires it
//! must [`release`](TurnTimer::release) its own slot before acting, which
//! fails if a newer arm or a cancel got there first.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
pub struct TurnTimer {
    slot: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl TurnTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expire` after `after`, unless superseded.
    pub fn arm<F>(&self, epoch: u64, after: Duration, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some((armed, handle)) = slot.as_ref() {
            if *armed == epoch && !handle.is_finished() {
                return;
            }
        }
        if let Some((old, handle)) = slot.take() {
            debug!("turn timer e{} superseded by e{}", old, epoch);
            handle.abort();
        }
        debug!("turn timer armed for e{} ({:?})", epoch, after);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_expire.await;
        });
        *slot = Some((epoch, handle));
    }

    /// Claim the slot for `epoch`. Only the first caller with a matching
    /// epoch gets `true`.
    pub fn release(&self, epoch: u64) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some((armed, _)) if *armed == epoch => {
                // Dropping the handle detaches; the caller is that task.
                slot.take();
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self) {
        if let Some((epoch, handle)) = self.slot.lock().take() {
            debug!("turn timer e{} cancelled", epoch);
            handle.abort();
        }
    }

    pub fn armed_epoch(&self) -> Option<u64> {
        self.slot.lock().as_ref().map(|(epoch, _)| *epoch)
    }
}

impl Drop for TurnTimer {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.slot.get_mut().take() {
            handle.abort();
        }
    }
}
