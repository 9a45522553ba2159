//! Blocking native-to-managed calls
//!
//! A native OS thread that needs a value only the managed side can compute
//! opens a call context, sends `{Function, Args, Context}` to a managed
//! process and blocks until that process replies through
//! [`CallBridge::complete`] (or the NIF-shaped [`nif_call_evaluated`]).
//!
//! ```text
//! native thread                       managed process
//! ─────────────                       ───────────────
//! prepare()          Created
//! send {F, A, Ctx} ─────── Sent ──────▶ recv
//! cond.wait()        Waiting             evaluate F(A)
//!                    Completed ◀──────── complete(Ctx, V)
//! copy V to caller   Released
//! ```
//!
//! There is no timeout: a responder that never replies blocks the caller
//! forever. `invoke` must run on a native thread, never on a host runtime
//! worker, or the responder may be starved.

mod context;

pub use context::{CallContext, CallState};

use crate::env::{Env, TermRef};
use crate::error::{BridgeError, BridgeResult};
use crate::host::Host;
use crate::mailbox::Pid;
use crate::resource::{ResourceHandle, ResourceType, RtFlags};
use crate::term::{atoms, Term};

/// Resource type name of call contexts
pub const CALL_CONTEXT_TYPE: &str = "nif_call_context";

/// Entry point for blocking calls into one host
#[derive(Clone)]
pub struct CallBridge {
    ctx_type: ResourceType<CallContext>,
    env_capacity: usize,
    initial_reserve: usize,
}

impl CallBridge {
    /// Open the call-context resource type on `host`.
    ///
    /// The type is registered on the first load; later loads reuse it.
    pub fn load(host: &Host) -> BridgeResult<Self> {
        let mut slot = host.call_type.lock();
        let ctx_type = match slot.as_ref() {
            Some(ty) => ty.clone(),
            None => {
                let ty = host.open_resource_type::<CallContext>(
                    CALL_CONTEXT_TYPE,
                    RtFlags::CREATE | RtFlags::TAKEOVER,
                    None,
                )?;
                *slot = Some(ty.clone());
                ty
            }
        };

        Ok(Self {
            ctx_type,
            env_capacity: host.config().env_capacity(),
            initial_reserve: host.config().initial_reserve(),
        })
    }

    /// Resource type backing every context of this bridge
    pub fn context_type(&self) -> &ResourceType<CallContext> {
        &self.ctx_type
    }

    /// Allocate a fresh call context
    pub fn prepare(&self) -> BridgeResult<ResourceHandle<CallContext>> {
        let ctx = CallContext::prepare(self.env_capacity, self.initial_reserve)?;
        let handle = self.ctx_type.create(ctx);
        tracing::debug!(env_capacity = self.env_capacity, "call context prepared");
        Ok(handle)
    }

    /// Call `function(args)` in the process behind `target` and wait.
    ///
    /// The result is copied into `caller`. The context is destroyed once the
    /// last term referring to it is dropped, so a responder still holding
    /// the token can complete it again and get `AlreadyCompleted`.
    pub fn invoke(
        &self,
        caller: &mut Env,
        target: &Pid,
        function: &Term,
        args: &Term,
    ) -> BridgeResult<TermRef> {
        let handle = self.prepare()?;
        Self::run(&handle, caller, target, function, args)
    }

    fn run(
        handle: &ResourceHandle<CallContext>,
        caller: &mut Env,
        target: &Pid,
        function: &Term,
        args: &Term,
    ) -> BridgeResult<TermRef> {
        let ctx = handle.acquire()?;
        ctx.run(caller, target, function, args, handle.to_term())
    }

    /// `invoke` into a scratch environment, returning the owned result
    pub fn call(&self, target: &Pid, function: &Term, args: &Term) -> BridgeResult<Term> {
        let mut scratch = Env::try_new(self.env_capacity, 1)?;
        let result = self.invoke(&mut scratch, target, function, args)?;
        scratch.take(result)
    }

    /// Complete the call identified by `context` with `value`.
    ///
    /// Fails with `Invalid` if `context` is not a call context,
    /// `AlreadyCompleted` on any completion after the first (including one
    /// that arrives after the caller collected its result) and `Deallocated`
    /// if the context was deallocated without ever being completed.
    pub fn complete(&self, context: &Term, value: &Term) -> BridgeResult<()> {
        self.ctx_type.acquire(context)?.complete(value)
    }
}

impl std::fmt::Debug for CallBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBridge")
            .field("ctx_type", &self.ctx_type)
            .field("env_capacity", &self.env_capacity)
            .field("initial_reserve", &self.initial_reserve)
            .finish()
    }
}

/// NIF-shaped reply entry: `evaluated(Context, Value)`.
///
/// Returns `ok`, `badarg` for a wrong arity or a term that is not a call
/// context, and the error term for anything else.
pub fn nif_call_evaluated(bridge: &CallBridge, argv: &[Term]) -> Term {
    let [context, value] = argv else {
        return Term::badarg();
    };

    match bridge.complete(context, value) {
        Ok(()) => Term::Atom(atoms::OK),
        Err(BridgeError::Invalid { .. }) => Term::badarg(),
        Err(e) => e.to_term(),
    }
}
