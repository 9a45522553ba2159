//! nifbridge runtime
//!
//! Native-side plumbing for libraries embedded in a managed runtime with
//! garbage-collected terms and mailbox concurrency:
//!
//! - [`resource`]: native objects under two independent reference counts,
//!   destroyed exactly once
//! - [`call`]: blocking calls from native OS threads into a managed process
//!   that replies through a one-shot completion slot
//!
//! The host model those mechanisms run against lives in [`term`], [`env`],
//! [`mailbox`], [`host`] and [`evaluator`].
//!
//! # Example
//!
//! ```no_run
//! use nifbridge_runtime::{CallBridge, Evaluator, FunctionTable, Host, Term};
//! use nifbridge_config::BridgeConfig;
//!
//! let host = Host::new(BridgeConfig::default()).unwrap();
//! let bridge = CallBridge::load(&host).unwrap();
//! let table = FunctionTable::new().with("add", |args| {
//!     let a = args[0].as_integer().unwrap_or(0);
//!     let b = args[1].as_integer().unwrap_or(0);
//!     Ok(Term::Integer(a + b))
//! });
//! let evaluator = Evaluator::new(bridge.clone(), table).spawn(&host);
//!
//! let three = bridge
//!     .call(
//!         evaluator.pid(),
//!         &Term::fun("add", 2),
//!         &Term::list(vec![Term::Integer(1), Term::Integer(2)]),
//!     )
//!     .unwrap();
//! assert_eq!(three, Term::Integer(3));
//! ```

pub mod call;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod mailbox;
pub mod resource;
pub mod term;
pub mod tracing_setup;

pub use call::{nif_call_evaluated, CallBridge, CallContext, CallState, CALL_CONTEXT_TYPE};
pub use env::{Env, TermRef};
pub use error::{BridgeError, BridgeResult};
pub use evaluator::{Evaluator, EvaluatorHandle, FunctionTable, NativeFn};
pub use host::Host;
pub use mailbox::{mailbox, Mailbox, Message, Pid};
pub use resource::{
    Destructor, ResourceGuard, ResourceHandle, ResourceRegistry, ResourceTerm, ResourceType,
    RtFlags,
};
pub use term::{atoms, Atom, FunRef, Term};
pub use tracing_setup::{init_tracing, init_tracing_with_filter, installed_filter};

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
