//! Cancellation contexts.
//!
//! A [`Context`] is a cloneable handle that becomes *done* exactly once,
//! with a [`CancelReason`]. Contexts form a tree: a child is cancelled with
//! its parent's reason, but cancelling a child leaves the parent alone.
//!
//! Deadline and idle timers run on background threads that exit as soon as
//! their context is done.

mod container;
mod race;

pub use container::ContextContainer;
pub(crate) use race::{recovered, run_raced};

use crate::error::CoreError;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`Context::cancel`] was called.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
    /// A touch context went idle for too long.
    TouchTimeout,
}

impl From<CancelReason> for CoreError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => Self::Cancelled,
            CancelReason::DeadlineExceeded => Self::DeadlineExceeded,
            CancelReason::TouchTimeout => Self::TouchTimeout,
        }
    }
}

type Callback = Box<dyn FnOnce(CancelReason) + Send>;

#[derive(Default)]
struct State {
    reason: Option<CancelReason>,
    callbacks: Vec<(u64, Callback)>,
    next_listener: u64,
}

struct Touch {
    idle: Duration,
    last: Mutex<Instant>,
}

struct Inner {
    state: Mutex<State>,
    done: Condvar,
    cancellable: bool,
    deadline: Option<Instant>,
    touch: Option<Touch>,
    parent: Option<Context>,
    parent_listener: Mutex<Option<Listener>>,
}

/// A cancellation context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    fn build(parent: Option<&Context>, cancellable: bool, deadline: Option<Instant>, touch: Option<Duration>) -> Self {
        let inherited = parent.and_then(Context::deadline);
        // A parent deadline reaches the child through the parent's own timer.
        let own_timer = match (inherited, deadline) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(inherited), Some(own)) => own < inherited,
        };
        let deadline = match (inherited, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let ctx = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                done: Condvar::new(),
                cancellable,
                deadline,
                touch: touch.map(|idle| Touch {
                    idle,
                    last: Mutex::new(Instant::now()),
                }),
                parent: parent.cloned(),
                parent_listener: Mutex::new(None),
            }),
        };

        if let Some(parent) = parent {
            let child = Arc::downgrade(&ctx.inner);
            let listener = parent.on_done(move |reason| {
                if let Some(child) = child.upgrade() {
                    finish(&child, reason);
                }
            });
            // The parent may already be done, in which case the child already is too.
            *ctx.inner.parent_listener.lock() = Some(listener);
        }
        if own_timer {
            spawn_deadline_timer(Arc::clone(&ctx.inner));
        }
        if ctx.inner.touch.is_some() {
            spawn_idle_timer(Arc::clone(&ctx.inner));
        }
        ctx
    }

    /// Returns a context that is never done.
    #[must_use]
    pub fn background() -> Self {
        Self::build(None, false, None, None)
    }

    /// Returns a child that can be cancelled with [`cancel`](Self::cancel).
    #[must_use]
    pub fn with_cancel(parent: &Context) -> Self {
        Self::build(Some(parent), true, None, None)
    }

    /// Returns a child that is done after `timeout`.
    #[must_use]
    pub fn with_timeout(parent: &Context, timeout: Duration) -> Self {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    /// Returns a child that is done at `deadline`.
    #[must_use]
    pub fn with_deadline(parent: &Context, deadline: Instant) -> Self {
        Self::build(Some(parent), true, Some(deadline), None)
    }

    /// Returns a child that is done once it goes `idle` without a
    /// [`touch`](Self::touch).
    #[must_use]
    pub fn with_touch(parent: &Context, idle: Duration) -> Self {
        Self::build(Some(parent), true, None, Some(idle))
    }

    /// Cancels the context and its children. Has no effect on a background
    /// context or a context that is already done.
    pub fn cancel(&self) {
        if self.inner.cancellable {
            finish(&self.inner, CancelReason::Cancelled);
        }
    }

    /// Returns true once the context is done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// Returns why the context is done, if it is.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.state.lock().reason
    }

    /// Returns the error matching the done reason, if the context is done.
    #[must_use]
    pub fn err(&self) -> Option<CoreError> {
        self.reason().map(CoreError::from)
    }

    /// Returns the earliest deadline of this context and its ancestors.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Blocks until the context is done.
    pub fn wait(&self) -> CancelReason {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(reason) = state.reason {
                return reason;
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Blocks until the context is done or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CancelReason> {
        let until = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.reason.is_none() {
            if self.inner.done.wait_until(&mut state, until).timed_out() {
                break;
            }
        }
        state.reason
    }

    /// Resets the idle timer of this context and every touch ancestor.
    pub fn touch(&self) {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(touch) = &ctx.inner.touch {
                *touch.last.lock() = Instant::now();
            }
            current = ctx.inner.parent.as_ref();
        }
    }

    /// Runs `callback` once the context is done, or right away if it already is.
    ///
    /// Dropping the returned [`Listener`] unregisters the callback.
    pub fn on_done<F>(&self, callback: F) -> Listener
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if let Some(reason) = state.reason {
            drop(state);
            callback(reason);
            return Listener::inert();
        }
        let id = state.next_listener;
        state.next_listener += 1;
        state.callbacks.push((id, Box::new(callback)));
        Listener {
            ctx: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("reason", &self.reason())
            .field("deadline", &self.inner.deadline)
            .field("idle", &self.inner.touch.as_ref().map(|t| t.idle))
            .finish()
    }
}

/// Registration of an [`Context::on_done`] callback.
///
/// Dropping it unregisters the callback if it has not run yet.
#[must_use = "dropping a listener unregisters its callback"]
pub struct Listener {
    ctx: Weak<Inner>,
    id: Option<u64>,
}

impl Listener {
    fn inert() -> Self {
        Self {
            ctx: Weak::new(),
            id: None,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let (Some(id), Some(inner)) = (self.id, self.ctx.upgrade()) {
            // Drop the callback outside the lock; its captures may own other contexts.
            let removed = {
                let mut state = inner.state.lock();
                let at = state.callbacks.iter().position(|(registered, _)| *registered == id);
                at.map(|at| state.callbacks.remove(at))
            };
            drop(removed);
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Marks the context done and runs its callbacks, once.
fn finish(inner: &Arc<Inner>, reason: CancelReason) {
    let callbacks = {
        let mut state = inner.state.lock();
        if state.reason.is_some() {
            return;
        }
        state.reason = Some(reason);
        std::mem::take(&mut state.callbacks)
    };
    inner.done.notify_all();
    trace!(?reason, "context done");
    // Detach from the parent; the child no longer needs to hear from it.
    let parent_listener = inner.parent_listener.lock().take();
    drop(parent_listener);
    for (_, callback) in callbacks {
        callback(reason);
    }
}

fn spawn_deadline_timer(inner: Arc<Inner>) {
    let Some(deadline) = inner.deadline else {
        return;
    };
    let spawned = thread::Builder::new()
        .name("reldb-ctx-deadline".into())
        .spawn(move || {
            {
                let mut state = inner.state.lock();
                while state.reason.is_none() && Instant::now() < deadline {
                    inner.done.wait_until(&mut state, deadline);
                }
                if state.reason.is_some() {
                    return;
                }
            }
            finish(&inner, CancelReason::DeadlineExceeded);
        });
    if let Err(err) = spawned {
        tracing::warn!(%err, "failed to start context deadline timer");
    }
}

fn spawn_idle_timer(inner: Arc<Inner>) {
    let spawned = thread::Builder::new()
        .name("reldb-ctx-idle".into())
        .spawn(move || {
            let Some(touch) = &inner.touch else {
                return;
            };
            loop {
                let expires = *touch.last.lock() + touch.idle;
                {
                    let mut state = inner.state.lock();
                    if state.reason.is_some() {
                        return;
                    }
                    if Instant::now() < expires {
                        inner.done.wait_until(&mut state, expires);
                        continue;
                    }
                }
                // Touched while we were checking: go around again.
                if *touch.last.lock() + touch.idle > Instant::now() {
                    continue;
                }
                finish(&inner, CancelReason::TouchTimeout);
                return;
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(%err, "failed to start context idle timer");
    }
}
