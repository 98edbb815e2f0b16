//! Racing a transaction body against its context.

use super::{CancelReason, Context, ContextContainer};
use crate::error::{CoreError, CoreResult};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

enum Outcome<X, R> {
    Finished(X, CoreResult<R>),
    NotOpened(CoreError),
    Expired(CancelReason),
}

/// Opens a subject with `open` and runs `body` against it on a fresh thread,
/// returning whichever comes first: the body's result or the context's
/// expiry.
///
/// Both `open` and `body` run on that thread, so waiting for the subject
/// (a writer lock, say) is raced as well. When the context wins, the subject
/// stays with the thread and is dropped when the body returns, which rolls
/// a transaction back.
pub(crate) fn run_raced<X, R, O, F>(ctx: &Context, open: O, body: F) -> CoreResult<(X, R)>
where
    X: Send + 'static,
    R: Send + 'static,
    O: FnOnce(Arc<ContextContainer>) -> CoreResult<X> + Send + 'static,
    F: FnOnce(&mut X) -> CoreResult<R> + Send + 'static,
{
    if let Some(err) = ctx.err() {
        return Err(err);
    }

    let (sender, receiver) = mpsc::channel::<Outcome<X, R>>();
    let expired = sender.clone();
    let container = ContextContainer::with_hook(ctx.clone(), move |reason| {
        let _ = expired.send(Outcome::Expired(reason));
    });

    let subject_container = Arc::clone(&container);
    let spawned = thread::Builder::new().name("reldb-tx".into()).spawn(move || {
        let mut subject = match catch_unwind(AssertUnwindSafe(|| open(subject_container))) {
            Ok(Ok(subject)) => subject,
            Ok(Err(err)) => {
                let _ = sender.send(Outcome::NotOpened(err));
                return;
            }
            Err(payload) => {
                let _ = sender.send(Outcome::NotOpened(recovered(payload.as_ref())));
                return;
            }
        };
        let result = catch_unwind(AssertUnwindSafe(|| body(&mut subject)))
            .unwrap_or_else(|payload| Err(recovered(payload.as_ref())));
        // The receiver is gone if the context already won.
        let _ = sender.send(Outcome::Finished(subject, result));
    });
    if let Err(err) = spawned {
        container.close();
        return Err(err.into());
    }

    match receiver.recv() {
        Ok(Outcome::Finished(subject, result)) => {
            // The context may have expired while the body was finishing.
            if let Some(reason) = container.close() {
                debug!(?reason, "transaction finished after its context expired");
                return Err(reason.into());
            }
            result.map(|value| (subject, value))
        }
        Ok(Outcome::NotOpened(err)) => {
            container.close();
            Err(err)
        }
        Ok(Outcome::Expired(reason)) => {
            container.close();
            debug!(?reason, "transaction abandoned");
            Err(reason.into())
        }
        Err(_) => {
            container.close();
            Err(CoreError::panicked("transaction thread exited without a result"))
        }
    }
}

/// Logs a recovered panic and turns it into [`CoreError::Panicked`].
pub(crate) fn recovered(payload: &(dyn Any + Send)) -> CoreError {
    let message = panic_message(payload);
    warn!(%message, "recovered panic in transaction");
    CoreError::panicked(message)
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn open_counter(_: Arc<ContextContainer>) -> CoreResult<u32> {
        Ok(0)
    }

    #[test]
    fn body_result_is_returned() {
        let (subject, value) = run_raced(&Context::background(), open_counter, |n| {
            *n += 1;
            Ok("done")
        })
        .unwrap();
        assert_eq!(subject, 1);
        assert_eq!(value, "done");
    }

    #[test]
    fn body_error_is_returned() {
        let err = run_raced(&Context::background(), open_counter, |_| -> CoreResult<()> {
            Err(CoreError::no_match())
        })
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn cancellation_wins_over_slow_body() {
        let ctx = Context::with_cancel(&Context::background());
        let canceller = ctx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let err = run_raced(&ctx, open_counter, |_| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[test]
    fn deadline_is_reported_as_such() {
        let ctx = Context::with_timeout(&Context::background(), Duration::from_millis(20));
        let err = run_raced(&ctx, open_counter, |_| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::DeadlineExceeded));
    }

    #[test]
    fn done_context_never_opens() {
        let ctx = Context::with_cancel(&Context::background());
        ctx.cancel();
        let err = run_raced(
            &ctx,
            |_| -> CoreResult<u32> { panic!("must not open") },
            |_| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[test]
    fn open_failure_is_returned() {
        let err = run_raced(
            &Context::background(),
            |_| -> CoreResult<u32> { Err(CoreError::StoreLocked) },
            |_| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::StoreLocked));
    }

    #[test]
    fn cancellation_wins_over_slow_open() {
        let ctx = Context::with_timeout(&Context::background(), Duration::from_millis(20));
        let err = run_raced(
            &ctx,
            |_| {
                thread::sleep(Duration::from_millis(300));
                Ok(0_u32)
            },
            |_| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::DeadlineExceeded));
    }

    #[test]
    fn panics_become_errors() {
        let err = run_raced(&Context::background(), open_counter, |_| -> CoreResult<()> {
            panic!("boom")
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Panicked { ref message } if message == "boom"));
    }
}
