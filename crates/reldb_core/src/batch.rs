//! Write batching.
//!
//! Calls queued with [`Store::batch`](crate::Store::batch) run one after
//! another inside a single write transaction. A batch is flushed when it
//! reaches `max_batch_calls` (on the appending thread) or when
//! `max_batch_duration` has passed since its first call (on a timer thread).
//!
//! When call `i` fails, the transaction is rolled back. Call `i` receives
//! its own error; the calls before it are either replayed as a new batch or
//! failed with [`CoreError::BatchGroupFailed`]; the calls after it are run
//! again as a new batch. Every call is answered exactly once.

use crate::context::{recovered, Context, ContextContainer};
use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::transaction::{Shared, Transaction};
use parking_lot::{Condvar, Mutex};
use reldb_codec::Codec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// A function queued for a batch. Batched functions may run more than once.
pub(crate) type BatchFn<T, C> = Arc<dyn Fn(&mut Transaction<T, C>) -> CoreResult<()> + Send + Sync>;

struct Call<T, C> {
    ctx: Context,
    func: BatchFn<T, C>,
    result: SyncSender<CoreResult<()>>,
}

impl<T, C> Call<T, C> {
    fn notify(self, result: CoreResult<()>) {
        // The caller may have given up waiting.
        let _ = self.result.send(result);
    }
}

#[derive(Default)]
struct TimerStop {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl TimerStop {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.signal.notify_all();
    }
}

struct Pending<T, C> {
    calls: Vec<Call<T, C>>,
    timer: Option<Arc<TimerStop>>,
}

impl<T, C> Pending<T, C> {
    fn drain(&mut self) -> Vec<Call<T, C>> {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        std::mem::take(&mut self.calls)
    }
}

enum Attempt {
    Committed,
    BeginFailed(CoreError),
    CommitFailed(CoreError),
    CallFailed { index: usize, err: CoreError },
}

/// Queues batch calls and runs them in shared transactions.
pub(crate) struct Batcher<T, C> {
    me: Weak<Batcher<T, C>>,
    shared: Arc<Shared<C>>,
    pending: Mutex<Pending<T, C>>,
}

impl<T: Entry, C: Codec> Batcher<T, C> {
    pub(crate) fn new(shared: Arc<Shared<C>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            shared,
            pending: Mutex::new(Pending {
                calls: Vec::new(),
                timer: None,
            }),
        })
    }

    /// Queues `func` and returns the channel its result arrives on.
    pub(crate) fn append(&self, ctx: Context, func: BatchFn<T, C>) -> Receiver<CoreResult<()>> {
        let (result, receiver) = mpsc::sync_channel(1);
        let ready = {
            let mut pending = self.pending.lock();
            pending.calls.push(Call { ctx, func, result });
            if pending.calls.len() >= self.shared.config.max_batch_calls {
                Some((pending.drain(), "size"))
            } else if pending.timer.is_none() {
                match self.arm() {
                    Ok(timer) => {
                        pending.timer = Some(timer);
                        None
                    }
                    Err(err) => {
                        warn!(error = %err, "batch timer unavailable, flushing now");
                        Some((pending.drain(), "timer-unavailable"))
                    }
                }
            } else {
                None
            }
        };
        if let Some((calls, trigger)) = ready {
            debug!(calls = calls.len(), trigger, "flushing batch");
            self.run(calls);
        }
        receiver
    }

    /// Runs whatever is queued right now.
    pub(crate) fn flush(&self, trigger: &'static str) {
        let calls = self.pending.lock().drain();
        if !calls.is_empty() {
            debug!(calls = calls.len(), trigger, "flushing batch");
            self.run(calls);
        }
    }

    fn arm(&self) -> std::io::Result<Arc<TimerStop>> {
        let stop = Arc::new(TimerStop::default());
        let watched = Arc::clone(&stop);
        let batcher = self.me.clone();
        let deadline = Instant::now() + self.shared.config.max_batch_duration;
        thread::Builder::new().name("reldb-batch".into()).spawn(move || {
            let mut stopped = watched.stopped.lock();
            while !*stopped {
                if watched.signal.wait_until(&mut stopped, deadline).timed_out() {
                    break;
                }
            }
            if *stopped {
                return;
            }
            drop(stopped);
            if let Some(batcher) = batcher.upgrade() {
                batcher.flush("timer");
            }
        })?;
        Ok(stop)
    }

    fn run(&self, mut calls: Vec<Call<T, C>>) {
        while !calls.is_empty() {
            calls = self.run_once(calls);
        }
    }

    /// Runs `calls` once, answers the calls it settles and returns the ones
    /// to run again.
    fn run_once(&self, calls: Vec<Call<T, C>>) -> Vec<Call<T, C>> {
        match self.attempt(&calls) {
            Attempt::Committed => {
                for call in calls {
                    call.notify(Ok(()));
                }
                Vec::new()
            }
            Attempt::BeginFailed(err) | Attempt::CommitFailed(err) => {
                warn!(calls = calls.len(), error = %err, "batch commit failed");
                let message = err.to_string();
                for call in calls {
                    call.notify(Err(CoreError::BatchCommitFailed {
                        message: message.clone(),
                    }));
                }
                Vec::new()
            }
            Attempt::CallFailed { index, err } => {
                let retry = self.shared.config.retry_batch_fail;
                debug!(index, calls = calls.len(), retry, error = %err, "batch call failed");
                let mut rest = calls.into_iter();
                let prefix: Vec<_> = rest.by_ref().take(index).collect();
                if let Some(failed) = rest.next() {
                    failed.notify(Err(err));
                }
                if retry {
                    self.run(prefix);
                } else {
                    for call in prefix {
                        call.notify(Err(CoreError::BatchGroupFailed));
                    }
                }
                rest.collect()
            }
        }
    }

    fn attempt(&self, calls: &[Call<T, C>]) -> Attempt {
        let container = ContextContainer::new(Context::background());
        let mut tx = match Transaction::begin_write(Arc::clone(&self.shared), Arc::clone(&container)) {
            Ok(tx) => tx,
            Err(err) => return Attempt::BeginFailed(err),
        };
        for (index, call) in calls.iter().enumerate() {
            container.update(call.ctx.clone());
            let result = match call.ctx.err() {
                Some(err) => Err(err),
                None => catch_unwind(AssertUnwindSafe(|| (call.func)(&mut tx)))
                    .unwrap_or_else(|payload| Err(recovered(payload.as_ref()))),
            };
            // The call's context may have expired while it ran.
            let result = result.and_then(|()| container.err().map_or(Ok(()), Err));
            if let Err(err) = result {
                container.close();
                return Attempt::CallFailed { index, err };
            }
        }
        container.close();
        match tx.commit() {
            Ok(()) => Attempt::Committed,
            Err(err) => Attempt::CommitFailed(err),
        }
    }
}

impl<T, C> Drop for Batcher<T, C> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut();
        if let Some(timer) = pending.timer.take() {
            timer.stop();
        }
        for call in pending.calls.drain(..) {
            call.notify(Err(CoreError::Closed));
        }
    }
}
