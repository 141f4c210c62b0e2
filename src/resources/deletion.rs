//! Deferred deletion of GPU resources.
//!
//! GPU handles must be released on the thread that owns the rendering context. Wrapping a
//! handle in [`Deferred`] makes its drop enqueue it instead; the runner then calls
//! [`DeletionQueue::flush`] once per frame from the render thread.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

/// Identifies one rendering context. Handles are only ever flushed for the context that
/// created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub struct DeletionQueue<H> {
    pending: Arc<Mutex<HashMap<ContextId, Vec<H>>>>,
}

impl<H> Clone for DeletionQueue<H> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<H> Default for DeletionQueue<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> DeletionQueue<H> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContextId, Vec<H>>> {
        // The map is never left half-updated, so a poisoned lock is still usable
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wraps `handle` so that dropping it schedules its deletion on `ctx`.
    pub fn defer(&self, ctx: ContextId, handle: H) -> Deferred<H> {
        Deferred {
            handle: Some(handle),
            ctx,
            queue: self.clone(),
        }
    }

    pub fn enqueue(&self, ctx: ContextId, handle: H) {
        self.lock().entry(ctx).or_default().push(handle);
    }

    /// Number of handles waiting for `ctx`.
    pub fn pending(&self, ctx: ContextId) -> usize {
        self.lock().get(&ctx).map_or(0, Vec::len)
    }

    /// Hands every handle pending for `ctx` to `deleter` and returns how many there were.
    pub fn flush(&self, ctx: ContextId, mut deleter: impl FnMut(H)) -> usize {
        let handles = self.lock().remove(&ctx).unwrap_or_default();
        let count = handles.len();
        for handle in handles {
            deleter(handle);
        }
        if count > 0 {
            log::trace!("Released {} deferred handles of {:?}", count, ctx);
        }
        count
    }
}

/// An owned handle that is enqueued for deletion when dropped.
#[derive(Debug)]
pub struct Deferred<H> {
    handle: Option<H>,
    ctx: ContextId,
    queue: DeletionQueue<H>,
}

impl<H> Deferred<H> {
    pub fn context(&self) -> ContextId {
        self.ctx
    }
}

impl<H> Deref for Deferred<H> {
    type Target = H;

    fn deref(&self) -> &H {
        // Only `drop` takes the handle out
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("deferred handle accessed after drop"),
        }
    }
}

impl<H> DerefMut for Deferred<H> {
    fn deref_mut(&mut self) -> &mut H {
        match &mut self.handle {
            Some(handle) => handle,
            None => unreachable!("deferred handle accessed after drop"),
        }
    }
}

impl<H> Drop for Deferred<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.enqueue(self.ctx, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_handles_wait_for_their_context() {
        let queue = DeletionQueue::new();
        let (a, b) = (ContextId::next(), ContextId::next());

        let first = queue.defer(a, 1);
        let second = queue.defer(b, 2);
        assert_eq!(*first, 1);
        drop(first);
        drop(second);

        assert_eq!(queue.pending(a), 1);
        let mut deleted = Vec::new();
        assert_eq!(queue.flush(a, |h| deleted.push(h)), 1);
        assert_eq!(deleted, vec![1]);
        assert_eq!(queue.pending(a), 0);
        assert_eq!(queue.pending(b), 1);
    }

    #[test]
    fn drop_on_another_thread_is_flushed_here() {
        let queue = DeletionQueue::new();
        let ctx = ContextId::next();
        let handle = queue.defer(ctx, String::from("buffer"));
        std::thread::spawn(move || drop(handle))
            .join()
            .unwrap();
        let mut deleted = Vec::new();
        queue.flush(ctx, |h| deleted.push(h));
        assert_eq!(deleted, vec!["buffer".to_string()]);
    }
}
