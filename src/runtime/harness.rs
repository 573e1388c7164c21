//! The script-level harness: one engine, one store and one registry per
//! test file.

use super::engine::{self, CompiledModule, Instance};
use super::host::{create_spectest_bindings, HostRef, HostState};
use super::registry::{Bindings, Registry};
use super::value::{format_values, Value};
use super::{Failure, HarnessError};
use crate::config::Config;
use crate::literal;
use crate::wast::Action;
use wasmtime::{AnyRef, Extern, ExternRef, Rooted, Store, Val};

/// Bytes of a module echoed into debug logs.
const LOG_PREFIX_LEN: usize = 16;

/// Drives module loading, instantiation and actions for a single script.
///
/// Each `Harness` owns its own host stub and registry, so state never leaks
/// between scripts.
pub struct Harness {
    engine: wasmtime::Engine,
    store: Store<HostState>,
    registry: Registry,
    config: Config,
}

impl Harness {
    /// Create a harness with the host stub registered under
    /// `config.namespace`.
    pub fn new(config: &Config) -> Result<Self, HarnessError> {
        let engine = engine::new_engine(config)?;
        let mut store = Store::new(&engine, HostState::default());
        // Inspecting a reference fails until the store has a GC heap.
        ExternRef::new(&mut store, ())
            .map_err(|e| HarnessError::Internal(format!("failed to allocate GC heap: {e:#}")))?;
        let host = create_spectest_bindings(&mut store)
            .map_err(|e| HarnessError::Internal(format!("failed to create host stub: {e:#}")))?;
        let registry = Registry::with_host(config.namespace.clone(), host);
        Ok(Harness {
            engine,
            store,
            registry,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry used by [`Harness::instance`].
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Store<HostState> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<HostState> {
        &mut self.store
    }

    /// Load a module from its binary encoding.
    ///
    /// The validator's verdict is compared against `expect_valid` first:
    /// - expected valid but rejected: a [`Failure::Validation`] carrying the
    ///   compiler's diagnostic, when one can be captured;
    /// - expected invalid but accepted: [`HarnessError::UnexpectedValidity`];
    /// - verdict as expected: the module is compiled. For an invalid module
    ///   that yields the [`Failure::Validation`] an assertion looks for.
    pub fn module(&mut self, bytes: &[u8], expect_valid: bool) -> Result<CompiledModule, HarnessError> {
        let valid = engine::validate(&self.engine, bytes);
        log::debug!(
            "loading {} byte module {}.. (valid: {valid}, expected: {expect_valid})",
            bytes.len(),
            hex::encode(&bytes[..bytes.len().min(LOG_PREFIX_LEN)])
        );

        match (valid, expect_valid) {
            (false, true) => {
                let diagnostic = match engine::compile(&self.engine, bytes) {
                    Err(failure) => failure.message().to_string(),
                    Ok(_) => {
                        log::warn!("could not capture a diagnostic: module compiled despite failing validation");
                        "module failed validation".to_string()
                    }
                };
                log::debug!("module failed validation: {diagnostic}");
                Err(Failure::Validation(diagnostic).into())
            }
            (true, false) => Err(HarnessError::UnexpectedValidity),
            (true, true) => engine::compile(&self.engine, bytes)
                .map_err(|f| HarnessError::Internal(format!("validated module failed to compile: {}", f.message()))),
            (false, false) => match engine::compile(&self.engine, bytes) {
                Err(failure) => Err(failure.into()),
                Ok(_) => Err(HarnessError::Internal(
                    "module failed validation but compiled successfully".to_string(),
                )),
            },
        }
    }

    /// Load a module from an escaped string literal.
    pub fn module_str(&mut self, literal: &str, expect_valid: bool) -> Result<CompiledModule, HarnessError> {
        let bytes = literal::unescape(literal)?;
        self.module(&bytes, expect_valid)
    }

    /// Instantiate `module`, resolving imports through the harness registry.
    pub fn instance(&mut self, module: &CompiledModule) -> Result<Instance, HarnessError> {
        let externs = self.resolve_imports(module, &self.registry)?;
        self.instantiate_with_externs(module, &externs)
    }

    /// Instantiate `module`, resolving imports through `registry` instead of
    /// the harness's own.
    pub fn instance_with(&mut self, module: &CompiledModule, registry: &Registry) -> Result<Instance, HarnessError> {
        let externs = self.resolve_imports(module, registry)?;
        self.instantiate_with_externs(module, &externs)
    }

    fn resolve_imports(&self, module: &CompiledModule, registry: &Registry) -> Result<Vec<Extern>, HarnessError> {
        let imports = module.imports();
        let externs = registry.resolve_all(imports.iter().map(|(ns, name)| (ns.as_str(), name.as_str())))?;
        Ok(externs)
    }

    fn instantiate_with_externs(
        &mut self,
        module: &CompiledModule,
        externs: &[Extern],
    ) -> Result<Instance, HarnessError> {
        let instance = engine::instantiate(&mut self.store, module, externs)?;
        log::debug!("instantiated module with {} import(s)", externs.len());
        Ok(instance)
    }

    /// Make every export of `instance` importable under `name`.
    pub fn register(&mut self, name: &str, instance: Instance) {
        let bindings = self.exports(instance);
        self.registry.register(name, bindings);
    }

    /// The full export set of `instance`.
    pub fn exports(&mut self, instance: Instance) -> Bindings {
        instance
            .0
            .exports(&mut self.store)
            .map(|export| (export.name().to_string(), export.into_extern()))
            .collect()
    }

    fn export(&mut self, instance: Instance, name: &str) -> Result<Extern, HarnessError> {
        instance
            .0
            .get_export(&mut self.store, name)
            .ok_or_else(|| HarnessError::UnknownExport(name.to_string()))
    }

    /// Invoke export `name` with `args`.
    ///
    /// A global export yields its current value instead of being called.
    /// The result is always a sequence, empty for functions that return
    /// nothing.
    pub fn call(&mut self, instance: Instance, name: &str, args: &[Value]) -> Result<Vec<Value>, HarnessError> {
        let func = match self.export(instance, name)? {
            Extern::Func(func) => func,
            Extern::Global(global) => {
                let value = global.get(&mut self.store);
                return Ok(vec![Value::from_val(&mut self.store, value)?]);
            }
            _ => return Err(HarnessError::NotCallable(name.to_string())),
        };

        let ty = func.ty(&self.store);
        let params: Vec<_> = ty.params().collect();
        if params.len() != args.len() {
            return Err(HarnessError::ArityMismatch {
                name: name.to_string(),
                expected: params.len(),
                actual: args.len(),
            });
        }

        let mut vals = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(&params).enumerate() {
            let val = arg.to_val(&mut self.store, param)?;
            let matches = val
                .matches_ty(&self.store, param)
                .map_err(|e| HarnessError::Internal(format!("failed to check argument {index} of {name}: {e:#}")))?;
            if !matches {
                return Err(HarnessError::ArgumentType {
                    name: name.to_string(),
                    index,
                    expected: param.to_string(),
                    actual: arg.type_name().to_string(),
                });
            }
            vals.push(val);
        }
        let mut results = vec![Val::I32(0); ty.results().len()];

        log::debug!("invoking {name} with {} argument(s)", vals.len());
        func.call(&mut self.store, &vals, &mut results)
            .map_err(engine::classify_call)?;

        let results = results
            .into_iter()
            .map(|val| Value::from_val(&mut self.store, val))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("{name} returned {}", format_values(&results));
        Ok(results)
    }

    /// Read export `name`: a global's current value, or the function itself.
    pub fn get(&mut self, instance: Instance, name: &str) -> Result<Value, HarnessError> {
        match self.export(instance, name)? {
            Extern::Global(global) => {
                let value = global.get(&mut self.store);
                Value::from_val(&mut self.store, value)
            }
            Extern::Func(func) => Ok(Value::Func(func)),
            _ => Err(HarnessError::NotCallable(name.to_string())),
        }
    }

    /// Execute an action and return its results.
    pub fn perform(&mut self, action: &Action) -> Result<Vec<Value>, HarnessError> {
        match action {
            Action::Invoke { instance, name, args } => self.call(*instance, name, args),
            Action::Get { instance, name } => Ok(vec![self.get(*instance, name)?]),
        }
    }

    /// Execute an action for its side effects only.
    pub fn run(&mut self, action: &Action) -> Result<(), HarnessError> {
        self.perform(action).map(|_| ())
    }

    /// Same-value equality that also compares references by identity.
    ///
    /// Function, extern and internal references are only comparable through
    /// the store; everything else is [`Value::same_value`].
    pub fn same_value(&mut self, a: &Value, b: &Value) -> bool {
        let same = match (a, b) {
            (Value::Func(a), Value::Func(b)) => {
                // SAFETY: the raw funcref pointers are only compared, never dereferenced.
                return unsafe { a.to_raw(&mut self.store) == b.to_raw(&mut self.store) };
            }
            (Value::Extern(a), Value::Extern(b)) => Rooted::<ExternRef>::ref_eq(&self.store, a, b),
            (Value::Any(a), Value::Any(b)) => Rooted::<AnyRef>::ref_eq(&self.store, a, b),
            _ => return a.same_value(b),
        };
        same.unwrap_or_else(|e| {
            log::debug!("comparing unrooted references: {e:#}");
            false
        })
    }

    /// The host reference for `tag`, identical to what `hostref(tag)` returns
    /// inside a module.
    pub fn host_ref(&self, tag: u32) -> Value {
        Value::HostRef(HostRef(tag))
    }
}
