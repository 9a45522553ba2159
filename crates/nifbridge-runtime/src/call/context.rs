//! Per-call synchronization record

use crate::env::{Env, TermRef};
use crate::error::{BridgeError, BridgeResult};
use crate::mailbox::Pid;
use crate::term::Term;
use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Lifecycle of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Prepared, request not yet sent
    Created,
    /// Request enqueued in the target mailbox
    Sent,
    /// Invoking thread is blocked on the condition variable
    Waiting,
    /// Result slot filled by the responder
    Completed,
    /// Result copied out to the caller
    Released,
}

struct Inner {
    env: Env,
    state: CallState,
    result: Option<TermRef>,
}

/// Shared state of one in-flight call.
///
/// Field order is teardown order: condition variable, then mutex, then the
/// isolated environment inside it.
pub struct CallContext {
    cond: Condvar,
    inner: Mutex<Inner>,
}

impl CallContext {
    /// Allocate the isolated environment, mutex and condition variable.
    ///
    /// Fails with `OutOfMemory` if the environment cannot be reserved;
    /// nothing is left allocated in that case.
    pub(crate) fn prepare(env_capacity: usize, initial_reserve: usize) -> BridgeResult<Self> {
        let env = Env::try_new(env_capacity, initial_reserve)?;
        let inner = Mutex::new(Inner {
            env,
            state: CallState::Created,
            result: None,
        });
        let cond = Condvar::new();

        Ok(Self { cond, inner })
    }

    pub fn state(&self) -> CallState {
        self.inner.lock().state
    }

    /// Send `{function, args, token}` to `target` and block until completed.
    ///
    /// The lock is held from before the send until the wait starts, so a
    /// responder can never complete ahead of the waiter.
    pub(crate) fn run(
        &self,
        caller: &mut Env,
        target: &Pid,
        function: &Term,
        args: &Term,
        token: Term,
    ) -> BridgeResult<TermRef> {
        let mut inner = self.inner.lock();

        let request = Term::tuple(vec![function.clone(), args.clone(), token]);
        let request = inner.env.copy(&request)?;
        target.send(&mut inner.env, request)?;
        inner.state = CallState::Sent;
        tracing::trace!(pid = target.id(), "call request sent");

        inner.state = CallState::Waiting;
        while inner.result.is_none() {
            self.cond.wait(&mut inner);
        }

        let result = inner
            .result
            .take()
            .ok_or_else(|| BridgeError::Evaluation("woken without a result".to_string()))?;
        let copied = inner.env.get(result).and_then(|value| caller.copy(value));
        // Drop the reply so a value holding this context's own token cannot keep it alive
        inner.env.clear();
        inner.state = CallState::Released;

        copied
    }

    /// Store `value` and wake the waiting caller.
    ///
    /// A context accepts exactly one completion.
    pub fn complete(&self, value: &Term) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, CallState::Completed | CallState::Released) {
            return Err(BridgeError::AlreadyCompleted);
        }

        let result = inner.env.copy(value)?;
        inner.result = Some(result);
        inner.state = CallState::Completed;
        self.cond.notify_one();

        tracing::debug!(value = %value.type_name(), "call completed");
        Ok(())
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        tracing::debug!(
            state = ?inner.state,
            env_used = inner.env.used(),
            "call context torn down"
        );
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallContext")
            .field("state", &inner.state)
            .field("env", &inner.env)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::mailbox;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_prepare_starts_created() {
        let ctx = CallContext::prepare(64, 4).unwrap();
        assert_eq!(ctx.state(), CallState::Created);
    }

    #[test]
    fn test_prepare_out_of_memory() {
        let result = CallContext::prepare(64, usize::MAX);
        assert!(matches!(result, Err(BridgeError::OutOfMemory { .. })));
    }

    #[test]
    fn test_second_complete_rejected() {
        let ctx = CallContext::prepare(64, 0).unwrap();
        ctx.complete(&Term::Integer(1)).unwrap();

        assert_eq!(ctx.complete(&Term::Integer(2)), Err(BridgeError::AlreadyCompleted));
        assert_eq!(ctx.state(), CallState::Completed);
    }

    #[test]
    fn test_run_blocks_until_complete() {
        let ctx = Arc::new(CallContext::prepare(64, 0).unwrap());
        let (pid, mut mailbox) = mailbox(None);

        let responder_ctx = Arc::clone(&ctx);
        let responder = thread::spawn(move || {
            let msg = mailbox.blocking_recv().unwrap();
            let request = msg.term.as_tuple().unwrap().to_vec();
            assert_eq!(request[0], Term::fun("double", 1));
            let n = request[1].as_list().unwrap()[0].as_integer().unwrap();
            responder_ctx.complete(&Term::Integer(n * 2)).unwrap();
        });

        let mut caller = Env::new();
        let r = ctx
            .run(
                &mut caller,
                &pid,
                &Term::fun("double", 1),
                &Term::list(vec![Term::Integer(21)]),
                Term::nil(),
            )
            .unwrap();
        responder.join().unwrap();

        assert_eq!(caller.get(r).unwrap(), &Term::Integer(42));
        assert_eq!(ctx.state(), CallState::Released);
    }

    #[test]
    fn test_run_to_closed_mailbox_fails() {
        let ctx = CallContext::prepare(64, 0).unwrap();
        let (pid, mailbox) = mailbox(None);
        drop(mailbox);

        let mut caller = Env::new();
        let result = ctx.run(&mut caller, &pid, &Term::nil(), &Term::nil(), Term::nil());
        assert_eq!(result, Err(BridgeError::SendFailed { pid: pid.id() }));
    }
}
