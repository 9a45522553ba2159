//! Shared fixtures for integration tests

#![allow(dead_code)]

use nifbridge_config::{BridgeConfig, CallConfig, RuntimeConfig};
use nifbridge_runtime::{
    BridgeError, BridgeResult, CallBridge, Evaluator, EvaluatorHandle, FunctionTable, Host,
    ResourceRegistry, ResourceType, RtFlags, Term,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Native object that counts how many times it has been dropped
#[derive(Debug)]
pub struct NativeBuffer {
    pub data: Vec<u8>,
    drops: Arc<AtomicUsize>,
}

impl NativeBuffer {
    pub fn new(len: usize, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            data: vec![0; len],
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn buffer_type(registry: &ResourceRegistry) -> ResourceType<NativeBuffer> {
    registry
        .open::<NativeBuffer>("buffer", RtFlags::CREATE | RtFlags::TAKEOVER, None)
        .unwrap()
}

pub fn test_config(env_capacity: usize) -> BridgeConfig {
    BridgeConfig {
        call: Some(CallConfig {
            env_capacity: Some(env_capacity),
            initial_reserve: Some(1),
        }),
        runtime: Some(RuntimeConfig {
            worker_threads: Some(2),
            thread_name: Some("nifbridge-test".to_string()),
        }),
        ..BridgeConfig::default()
    }
}

pub fn test_host() -> Host {
    Host::new(test_config(4096)).unwrap()
}

fn integers(args: &[Term]) -> BridgeResult<Vec<i64>> {
    args.iter()
        .map(|a| {
            a.as_integer()
                .ok_or_else(|| BridgeError::Evaluation(format!("not an integer: {}", a)))
        })
        .collect()
}

/// `add/2`, `sum/N`, `echo/1` and `fail/0`
pub fn arithmetic() -> FunctionTable {
    FunctionTable::new()
        .with("add", |args| {
            let n = integers(args)?;
            Ok(Term::Integer(n[0] + n[1]))
        })
        .with("sum", |args| Ok(Term::Integer(integers(args)?.iter().sum())))
        .with("echo", |args| Ok(args[0].clone()))
        .with("fail", |_| Err(BridgeError::Evaluation("boom".to_string())))
}

pub fn spawn_evaluator(host: &Host) -> (CallBridge, EvaluatorHandle) {
    let bridge = CallBridge::load(host).unwrap();
    let evaluator = Evaluator::new(bridge.clone(), arithmetic()).spawn(host);
    (bridge, evaluator)
}

/// Poll until `check` holds; contexts are torn down by whichever side lets
/// go last, which may be the responder a moment after `invoke` returns.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    check()
}
