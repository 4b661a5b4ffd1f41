//! Long-lived script interpreter task
//!
//! One interpreter instance for the life of the process. Top-level script
//! state persists across submissions; a failing script is logged and the
//! loop goes straight back to waiting for the next payload.

use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::collections::HashSet;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{error, info};

use crate::script::capabilities::{CapabilityTable, NativeFn};
use crate::sync::mailbox::CodeReader;

/// Fatal construction failures; the firmware must not start without a runtime
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScriptInitError {
    #[error("duplicate capability name: {0}")]
    DuplicateCapability(&'static str),
}

/// Per-submission failures; never fatal to the runtime
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("script is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("script evaluation failed: {0}")]
    Eval(String),
}

/// Persistent interpreter plus the scope that survives across submissions
#[derive(Debug)]
pub struct ScriptRuntime {
    engine: Engine,
    scope: Scope<'static>,
}

impl ScriptRuntime {
    /// Construct the interpreter and install the capability table as global
    /// functions. Happens exactly once per process; names are checked for
    /// uniqueness here so a bad table is caught before any task starts.
    pub fn new(table: CapabilityTable) -> Result<Self, ScriptInitError> {
        let mut engine = Engine::new();

        let mut seen = HashSet::new();
        for entry in table.entries() {
            if !seen.insert(entry.name) {
                return Err(ScriptInitError::DuplicateCapability(entry.name));
            }
            match &entry.func {
                NativeFn::Unary(f) => {
                    let f = f.clone();
                    engine.register_fn(
                        entry.name,
                        move |a: i64| -> Result<(), Box<EvalAltResult>> {
                            f(a).map_err(|e| e.to_string().into())
                        },
                    );
                }
                NativeFn::Binary(f) => {
                    let f = f.clone();
                    engine.register_fn(
                        entry.name,
                        move |a: i64, b: i64| -> Result<(), Box<EvalAltResult>> {
                            f(a, b).map_err(|e| e.to_string().into())
                        },
                    );
                }
                NativeFn::Ternary(f) => {
                    let f = f.clone();
                    engine.register_fn(
                        entry.name,
                        move |a: i64, b: i64, c: i64| -> Result<(), Box<EvalAltResult>> {
                            f(a, b, c).map_err(|e| e.to_string().into())
                        },
                    );
                }
            }
        }

        Ok(Self {
            engine,
            scope: Scope::new(),
        })
    }

    /// Evaluate one code snapshot against the persistent scope.
    ///
    /// Top-level variables declared by the script stay available to later
    /// submissions; the engine resets its own evaluation state between runs.
    pub fn execute(&mut self, code: &[u8]) -> Result<(), ScriptError> {
        let source = std::str::from_utf8(code)?;
        self.engine
            .eval_with_scope::<Dynamic>(&mut self.scope, source)
            .map(|_| ())
            .map_err(|e| ScriptError::Eval(e.to_string()))
    }

    /// The interpreter loop: wait for a snapshot, execute it, report, repeat.
    ///
    /// Runs on a dedicated blocking thread because evaluation (and any blink
    /// or sleep inside it) is synchronous and may hold the thread for
    /// seconds; `handle` bridges the async mailbox wait.
    pub fn run(mut self, mut reader: CodeReader, handle: Handle) {
        info!("script runtime ready, waiting for code");
        loop {
            let snapshot = handle.block_on(reader.wait_and_take());
            info!(bytes = snapshot.len(), "executing code snapshot");
            match self.execute(snapshot.as_bytes()) {
                Ok(()) => info!("script completed"),
                Err(e) => error!("script failed: {}", e),
            }
        }
    }
}
