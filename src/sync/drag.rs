//! Debounced persistence for a token drag.
//!
//! Every pointer tick moves the token locally right away; only the position
//! held still for the quiescence window is written. Ending the drag aborts
//! whatever is still waiting and reports the last position that actually
//! reached the store, so the caller can finalize or undo.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::game::grid::GridPos;
use crate::game::tokens::TokenId;

pub struct DragStream {
    pub token_id: TokenId,
    /// Where the token was when the drag began.
    pub origin: GridPos,
    /// Latest local position.
    pub current: GridPos,
    debounce: Duration,
    written: Arc<Mutex<Option<GridPos>>>,
    pending: Option<JoinHandle<()>>,
}

impl DragStream {
    pub fn new(token_id: TokenId, origin: GridPos, debounce: Duration) -> Self {
        Self {
            token_id,
            origin,
            current: origin,
            debounce,
            written: Arc::new(Mutex::new(None)),
            pending: None,
        }
    }

    /// Record a tick at `pos` and (re)start the quiescence window. `write`
    /// runs only if no further tick arrives before it elapses.
    pub fn tick<F, Fut>(&mut self, pos: GridPos, write: F)
    where
        F: FnOnce(GridPos) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.current = pos;
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        let written = Arc::clone(&self.written);
        let delay = self.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            *written.lock() = Some(pos);
            write(pos).await;
        }));
    }

    /// Stop any pending write. Returns the last position handed to the store.
    pub fn finish(mut self) -> Option<GridPos> {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        *self.written.lock()
    }
}

impl Drop for DragStream {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_to(log: &Arc<Mutex<Vec<GridPos>>>) -> impl FnOnce(GridPos) -> std::future::Ready<()> + Send + 'static {
        let log = Arc::clone(log);
        move |pos| {
            log.lock().push(pos);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_ticks_write_once_after_quiescence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut drag = DragStream::new("orc".into(), GridPos::new(0, 0), Duration::from_millis(500));
        for x in 1..=10 {
            drag.tick(GridPos::new(x, 0), push_to(&log));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(log.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*log.lock(), vec![GridPos::new(10, 0)]);
        assert_eq!(drag.finish(), Some(GridPos::new(10, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn finish_before_quiescence_writes_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut drag = DragStream::new("orc".into(), GridPos::new(0, 0), Duration::from_millis(500));
        drag.tick(GridPos::new(2, 2), push_to(&log));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drag.finish(), None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(log.lock().is_empty());
    }
}
