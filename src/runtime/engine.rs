//! Thin wrappers over the external engine's validate, compile and
//! instantiate steps.
//!
//! The engine reports failures as opaque errors. This module is the only
//! place that inspects them: a [`wasmtime::Trap`] anywhere in the error chain
//! is a trap (or resource exhaustion for `Trap::StackOverflow`), and what
//! remains is classified by the phase the error surfaced in.

use super::host::HostState;
use super::{Failure, HarnessError};
use crate::config::Config;
use std::fmt;
use wasmtime::{Extern, Store, Trap};

/// A module that passed validation and compilation.
#[derive(Clone)]
pub struct CompiledModule {
    inner: wasmtime::Module,
}

impl CompiledModule {
    pub(crate) fn inner(&self) -> &wasmtime::Module {
        &self.inner
    }

    /// `(namespace, name)` pairs of every import this module declares, in order.
    pub fn imports(&self) -> Vec<(String, String)> {
        self.inner
            .imports()
            .map(|import| (import.module().to_string(), import.name().to_string()))
            .collect()
    }

    /// Names of every export this module declares, in order.
    pub fn exports(&self) -> Vec<String> {
        self.inner.exports().map(|export| export.name().to_string()).collect()
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("imports", &self.imports())
            .field("exports", &self.exports())
            .finish()
    }
}

/// A live module instance owned by a [`super::Harness`] store.
#[derive(Debug, Clone, Copy)]
pub struct Instance(pub(crate) wasmtime::Instance);

/// Build an engine with the proposals enabled by `config`.
pub(crate) fn new_engine(config: &Config) -> Result<wasmtime::Engine, HarnessError> {
    let mut wasm_config = wasmtime::Config::new();
    wasm_config
        .wasm_reference_types(true)
        .wasm_function_references(config.function_references || config.gc)
        .wasm_gc(config.gc)
        .wasm_tail_call(config.tail_call)
        .wasm_multi_memory(config.multi_memory)
        .wasm_simd(config.simd)
        .max_wasm_stack(config.max_wasm_stack);
    wasmtime::Engine::new(&wasm_config).map_err(|e| HarnessError::Internal(format!("failed to create engine: {e:#}")))
}

/// The engine's static validation verdict for `bytes`.
///
/// Decode errors and semantic validation errors both yield `false`; the
/// reason is intentionally dropped here.
pub(crate) fn validate(engine: &wasmtime::Engine, bytes: &[u8]) -> bool {
    wasmtime::Module::validate(engine, bytes).is_ok()
}

/// Compile `bytes`, reporting any rejection as a validation failure.
pub(crate) fn compile(engine: &wasmtime::Engine, bytes: &[u8]) -> Result<CompiledModule, Failure> {
    wasmtime::Module::from_binary(engine, bytes)
        .map(|inner| CompiledModule { inner })
        .map_err(|e| Failure::Validation(format!("{e:#}")))
}

/// Instantiate `module` with already-resolved imports.
pub(crate) fn instantiate(
    store: &mut Store<HostState>,
    module: &CompiledModule,
    imports: &[Extern],
) -> Result<Instance, Failure> {
    wasmtime::Instance::new(store, module.inner(), imports)
        .map(Instance)
        .map_err(classify_instantiation)
}

/// Classify an error raised while instantiating: traps come from start-up
/// code, anything else failed to link.
pub(crate) fn classify_instantiation(err: anyhow::Error) -> Failure {
    match err.downcast_ref::<Trap>() {
        Some(trap) => classify_trap(trap),
        None => Failure::Link(format!("{err:#}")),
    }
}

/// Classify an error raised by invoking an export.
pub(crate) fn classify_call(err: anyhow::Error) -> Failure {
    match err.downcast_ref::<Trap>() {
        Some(trap) => classify_trap(trap),
        None => Failure::UncaughtException(format!("{err:#}")),
    }
}

fn classify_trap(trap: &Trap) -> Failure {
    match trap {
        Trap::StackOverflow => Failure::ResourceExhaustion(trap.to_string()),
        _ => Failure::Trap(trap.to_string()),
    }
}
