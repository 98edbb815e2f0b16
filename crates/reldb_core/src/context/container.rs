//! The context slot of a running transaction.

use super::{CancelReason, Context, Listener};
use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::debug;

type ExpireHook = Box<dyn Fn(CancelReason) + Send + Sync>;

struct Slot {
    context: Context,
    err: Option<CancelReason>,
    closed: bool,
    generation: u64,
}

/// Holds the context a transaction currently runs under.
///
/// The context can be swapped mid-transaction with [`update`](Self::update);
/// only the current context's expiry is recorded. Once closed, later
/// expirations are ignored.
pub struct ContextContainer {
    me: Weak<ContextContainer>,
    slot: RwLock<Slot>,
    listener: Mutex<Option<Listener>>,
    on_expire: Option<ExpireHook>,
}

impl ContextContainer {
    /// Creates a container watching `context`.
    #[must_use]
    pub fn new(context: Context) -> Arc<Self> {
        Self::build(context, None)
    }

    /// Creates a container that also calls `on_expire` when the current
    /// context expires before the container is closed.
    pub(crate) fn with_hook<F>(context: Context, on_expire: F) -> Arc<Self>
    where
        F: Fn(CancelReason) + Send + Sync + 'static,
    {
        Self::build(context, Some(Box::new(on_expire)))
    }

    fn build(context: Context, on_expire: Option<ExpireHook>) -> Arc<Self> {
        let container = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            slot: RwLock::new(Slot {
                context: context.clone(),
                err: None,
                closed: false,
                generation: 0,
            }),
            listener: Mutex::new(None),
            on_expire,
        });
        container.listen(&context, 0);
        container
    }

    fn listen(&self, context: &Context, generation: u64) {
        let me = self.me.clone();
        let listener = context.on_done(move |reason| {
            if let Some(container) = me.upgrade() {
                container.expire(generation, reason);
            }
        });
        let previous = self.listener.lock().replace(listener);
        drop(previous);
    }

    fn expire(&self, generation: u64, reason: CancelReason) {
        {
            let mut slot = self.slot.write();
            if slot.closed || slot.generation != generation || slot.err.is_some() {
                return;
            }
            slot.err = Some(reason);
        }
        debug!(?reason, "transaction context expired");
        if let Some(on_expire) = &self.on_expire {
            on_expire(reason);
        }
    }

    /// Replaces the current context, forgetting any expiry of the old one.
    pub fn update(&self, context: Context) {
        let generation = {
            let mut slot = self.slot.write();
            if slot.closed {
                return;
            }
            slot.context = context.clone();
            slot.err = None;
            slot.generation += 1;
            slot.generation
        };
        let previous = self.listener.lock().take();
        drop(previous);
        self.listen(&context, generation);
    }

    /// Fails if the current context is done or the container is closed;
    /// otherwise counts as activity for touch contexts.
    pub fn check(&self) -> CoreResult<()> {
        let slot = self.slot.read();
        if let Some(reason) = slot.err {
            return Err(reason.into());
        }
        if slot.closed {
            return Err(CoreError::Closed);
        }
        if let Some(reason) = slot.context.reason() {
            return Err(reason.into());
        }
        slot.context.touch();
        Ok(())
    }

    /// Returns the current context.
    #[must_use]
    pub fn context(&self) -> Context {
        self.slot.read().context.clone()
    }

    /// Returns the recorded expiry, if the current context expired.
    #[must_use]
    pub fn err(&self) -> Option<CoreError> {
        self.slot.read().err.map(CoreError::from)
    }

    /// Closes the container and returns the expiry recorded before closing.
    pub fn close(&self) -> Option<CancelReason> {
        let err = {
            let mut slot = self.slot.write();
            slot.closed = true;
            slot.err
        };
        let listener = self.listener.lock().take();
        drop(listener);
        err
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.read().closed
    }
}

impl std::fmt::Debug for ContextContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ContextContainer")
            .field("context", &slot.context)
            .field("err", &slot.err)
            .field("closed", &slot.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn check_reports_cancellation() {
        let ctx = Context::with_cancel(&Context::background());
        let container = ContextContainer::new(ctx.clone());
        assert!(container.check().is_ok());
        ctx.cancel();
        assert!(matches!(container.check(), Err(CoreError::Cancelled)));
        assert!(matches!(container.err(), Some(CoreError::Cancelled)));
    }

    #[test]
    fn update_forgets_old_context() {
        let first = Context::with_cancel(&Context::background());
        let container = ContextContainer::new(first.clone());
        first.cancel();
        assert!(container.check().is_err());

        container.update(Context::background());
        assert!(container.check().is_ok());
    }

    #[test]
    fn old_context_expiry_is_ignored_after_update() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fired);
        let first = Context::with_cancel(&Context::background());
        let container = ContextContainer::with_hook(first.clone(), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        let second = Context::with_cancel(&Context::background());
        container.update(second.clone());

        first.cancel();
        assert!(container.check().is_ok());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        second.cancel();
        assert!(matches!(container.check(), Err(CoreError::Cancelled)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_container_ignores_expiry() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fired);
        let ctx = Context::with_cancel(&Context::background());
        let container = ContextContainer::with_hook(ctx.clone(), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(container.close(), None);
        ctx.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(matches!(container.check(), Err(CoreError::Closed)));
    }

    #[test]
    fn check_touches() {
        let ctx = Context::with_touch(&Context::background(), Duration::from_millis(60));
        let container = ContextContainer::new(ctx.clone());
        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(20));
            container.check().unwrap();
        }
        assert!(!ctx.is_done());
    }
}
