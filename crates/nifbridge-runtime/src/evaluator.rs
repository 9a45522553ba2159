//! Managed-side request dispatch
//!
//! An evaluator is a managed-side process: it owns a mailbox, receives the
//! `{Function, Args, Context}` requests native callers send through the
//! call bridge, evaluates them against a [`FunctionTable`] and completes
//! the context with the result. Evaluation failures, panics included, are
//! completed as `{error, Reason}` so the caller never waits on a request
//! that failed.

use crate::call::CallBridge;
use crate::error::{BridgeError, BridgeResult};
use crate::host::Host;
use crate::mailbox::{mailbox, Pid};
use crate::term::{atoms, Term};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Native closure standing in for a managed function
pub type NativeFn = Arc<dyn Fn(&[Term]) -> BridgeResult<Term> + Send + Sync>;

/// Functions an evaluator can apply, keyed by name
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, NativeFn>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[Term]) -> BridgeResult<Term> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    /// Builder-style `register`
    pub fn with<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&[Term]) -> BridgeResult<Term> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Apply `function` to an argument list.
    ///
    /// `function` is a fun reference or an atom naming a registered
    /// function; `args` must be a proper list matching the fun's arity.
    pub fn apply(&self, function: &Term, args: &Term) -> BridgeResult<Term> {
        let (name, arity) = match function {
            Term::Fun(fun) => (fun.name.as_str(), Some(fun.arity)),
            Term::Atom(atom) => (atom.as_str(), None),
            other => {
                return Err(BridgeError::Evaluation(format!(
                    "not a function: {}",
                    other
                )))
            }
        };

        let args = args.as_list().ok_or_else(|| {
            BridgeError::Evaluation(format!("arguments must be a list, got {}", args.type_name()))
        })?;
        if let Some(arity) = arity {
            if arity != args.len() {
                return Err(BridgeError::Evaluation(format!(
                    "{}/{} called with {} arguments",
                    name,
                    arity,
                    args.len()
                )));
            }
        }

        let function = self
            .functions
            .get(name)
            .ok_or_else(|| BridgeError::Evaluation(format!("undefined function {}", name)))?;
        function(args)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable")
            .field("functions", &names)
            .finish()
    }
}

/// Managed-side process answering call-bridge requests
#[derive(Debug)]
pub struct Evaluator {
    bridge: CallBridge,
    table: FunctionTable,
    processed: Arc<AtomicU64>,
}

impl Evaluator {
    pub fn new(bridge: CallBridge, table: FunctionTable) -> Self {
        Self {
            bridge,
            table,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the process on `host`'s runtime
    pub fn spawn(self, host: &Host) -> EvaluatorHandle {
        let (pid, mut mailbox) = mailbox(Some("evaluator"));
        let processed = Arc::clone(&self.processed);
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);

        let join = host.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_signal.notified() => {
                        mailbox.close();
                        while let Some(message) = mailbox.try_recv() {
                            self.reject(&message.term, Term::error(Term::atom("stopped")));
                        }
                        tracing::debug!(pid = mailbox.pid_id(), "evaluator stopped");
                        break;
                    }
                    message = mailbox.recv() => match message {
                        Some(message) => self.handle(&message.term),
                        None => {
                            tracing::debug!(pid = mailbox.pid_id(), "evaluator mailbox closed");
                            break;
                        }
                    },
                }
            }
        });

        tracing::debug!(pid = pid.id(), "evaluator started");
        EvaluatorHandle {
            pid,
            join,
            stop,
            processed,
        }
    }

    /// Evaluate one request and complete its context.
    ///
    /// A function that panics is completed as `{error, Reason}` like any
    /// other failed evaluation.
    pub fn handle(&self, request: &Term) {
        let Some([function, args, context]) = request.as_tuple() else {
            tracing::warn!(request = %request, "malformed call request dropped");
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.table.apply(function, args)))
            .unwrap_or_else(|payload| {
                Err(BridgeError::Evaluation(format!(
                    "panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let value = outcome.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "evaluation failed");
            e.to_term()
        });

        self.reply(context, &value);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Complete a request without evaluating it
    fn reject(&self, request: &Term, reason: Term) {
        match request.as_tuple() {
            Some([_, _, context]) => self.reply(context, &reason),
            _ => tracing::warn!(request = %request, "malformed call request dropped"),
        }
    }

    fn reply(&self, context: &Term, value: &Term) {
        match self.bridge.complete(context, value) {
            Ok(()) => {}
            Err(BridgeError::OutOfMemory { .. }) => {
                // Result too large for the context; reply with the bare atom
                if let Err(e) = self.bridge.complete(context, &Term::Atom(atoms::ENOMEM)) {
                    tracing::warn!(error = %e, "could not complete call");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not complete call"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running evaluator
#[derive(Debug)]
pub struct EvaluatorHandle {
    pid: Pid,
    join: JoinHandle<()>,
    stop: Arc<Notify>,
    processed: Arc<AtomicU64>,
}

impl EvaluatorHandle {
    /// Mailbox to send requests to
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Requests handled so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Stop the process.
    ///
    /// The request being evaluated finishes normally. Requests still queued
    /// are completed with `{error, stopped}`, and later sends fail with
    /// `SendFailed`.
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
