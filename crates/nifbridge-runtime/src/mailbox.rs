//! Process mailboxes
//!
//! Every managed-side process owns exactly one `Mailbox` (single consumer).
//! Any number of `Pid`s may point at it, and sending through a `Pid` never
//! blocks, so native OS threads can enqueue messages without touching the
//! host scheduler.

use crate::env::{Env, TermRef};
use crate::error::{BridgeError, BridgeResult};
use crate::term::Term;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Global process ID counter
static PID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One delivered message. The term was moved out of the sender's
/// environment, so the receiver owns it outright.
#[derive(Debug)]
pub struct Message {
    pub from_env: u64,
    pub term: Term,
}

/// Mailbox identity
#[derive(Clone)]
pub struct Pid {
    id: u64,
    name: Option<Arc<str>>,
    inner: Arc<mpsc::UnboundedSender<Message>>,
}

impl Pid {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Send a term held in `env`, then clear `env`.
    ///
    /// Fire-and-forget: returns as soon as the message is enqueued. Every
    /// term in `env` is released, matching the host send primitive, so the
    /// environment can be reused for the reply.
    pub fn send(&self, env: &mut Env, term: TermRef) -> BridgeResult<()> {
        let term = env.take(term)?;
        let from_env = env.id();
        env.clear();

        self.inner
            .send(Message { from_env, term })
            .map_err(|_| BridgeError::SendFailed { pid: self.id })?;

        tracing::trace!(pid = self.id, env = from_env, "message enqueued");
        Ok(())
    }

    /// Send an owned term from managed code
    pub fn send_term(&self, term: Term) -> BridgeResult<()> {
        self.inner
            .send(Message { from_env: 0, term })
            .map_err(|_| BridgeError::SendFailed { pid: self.id })
    }

    /// Check if the receiving process is gone
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pid {}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pid")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#PID<0.{}.0>", self.id)
    }
}

/// Receiving half owned by one managed-side process
pub struct Mailbox {
    pid: u64,
    inner: mpsc::UnboundedReceiver<Message>,
}

impl Mailbox {
    /// ID of the process this mailbox belongs to
    pub fn pid_id(&self) -> u64 {
        self.pid
    }

    /// Wait for the next message. `None` once every `Pid` is dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inner.recv().await
    }

    /// Take a message if one is already queued
    pub fn try_recv(&mut self) -> Option<Message> {
        self.inner.try_recv().ok()
    }

    /// Refuse further sends; messages already queued can still be received
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Block the current OS thread until a message arrives.
    ///
    /// Must not be called from inside the host runtime.
    pub fn blocking_recv(&mut self) -> Option<Message> {
        self.inner.blocking_recv()
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox").field("pid", &self.pid).finish()
    }
}

/// Create a new mailbox and the first `Pid` addressing it
pub fn mailbox(name: Option<&str>) -> (Pid, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = PID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let pid = Pid {
        id,
        name: name.map(Arc::from),
        inner: Arc::new(tx),
    };
    let mailbox = Mailbox { pid: id, inner: rx };

    (pid, mailbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_moves_term_and_clears_env() {
        let (pid, mut mailbox) = mailbox(Some("evaluator"));
        let mut env = Env::new();
        let r = env.copy(&Term::Integer(42)).unwrap();
        env.copy(&Term::nil()).unwrap();

        pid.send(&mut env, r).unwrap();

        assert!(env.is_empty());
        let msg = mailbox.try_recv().unwrap();
        assert_eq!(msg.term, Term::Integer(42));
        assert_eq!(msg.from_env, env.id());
    }

    #[test]
    fn test_send_to_closed_mailbox_fails() {
        let (pid, mailbox) = mailbox(None);
        drop(mailbox);

        assert!(pid.is_closed());
        assert_eq!(
            pid.send_term(Term::nil()),
            Err(BridgeError::SendFailed { pid: pid.id() })
        );
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let (pid, mut mailbox) = mailbox(None);
        let clone = pid.clone();

        pid.send_term(Term::Integer(1)).unwrap();
        clone.send_term(Term::Integer(2)).unwrap();
        pid.send_term(Term::Integer(3)).unwrap();

        let received: Vec<Term> = std::iter::from_fn(|| mailbox.try_recv())
            .map(|m| m.term)
            .collect();
        assert_eq!(
            received,
            vec![Term::Integer(1), Term::Integer(2), Term::Integer(3)]
        );
    }

    #[test]
    fn test_send_from_native_thread() {
        let (pid, mut mailbox) = mailbox(None);

        std::thread::spawn(move || pid.send_term(Term::atom("hello")).unwrap())
            .join()
            .unwrap();

        assert_eq!(mailbox.blocking_recv().unwrap().term, Term::atom("hello"));
    }

    #[test]
    fn test_pid_display() {
        let (pid, _mailbox) = mailbox(None);
        assert_eq!(pid.to_string(), format!("#PID<0.{}.0>", pid.id()));
    }
}
