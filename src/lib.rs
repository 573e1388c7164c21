//! An assertion harness for WebAssembly spec-style test scripts.
//!
//! wastest drives an external WebAssembly engine (wasmtime) through the
//! steps a generated spec test performs: loading binary modules with an
//! expected validity, instantiating them against a registry of named
//! import namespaces, invoking exports, and classifying every outcome as
//! success, validation failure, link failure, trap, uncaught exception or
//! resource exhaustion.
//!
//! # Modules
//!
//! - [`runtime`] -- The engine boundary: [`runtime::Harness`], the import
//!   [`runtime::Registry`], the `spectest` host stub and [`runtime::Value`].
//! - [`wast`] -- Actions, expected-value descriptors, the `assert_*` family
//!   and the JSON command script runner.
//! - [`literal`] -- Decoding of escaped byte-string literals into module bytes.
//! - [`config`] -- Harness configuration.
//!
//! # Example
//!
//! Load a module, call an export and assert on its result:
//!
//! ```
//! use wastest::config::Config;
//! use wastest::runtime::{Harness, Value};
//! use wastest::wast::{Action, Expected};
//!
//! // (module (func (export "add") (param i32 i32) (result i32)
//! //   local.get 0 local.get 1 i32.add))
//! let bytes = wastest::literal::unescape(
//!     "\\00asm\\01\\00\\00\\00\\01\\07\\01\\60\\02\\7f\\7f\\01\\7f\\03\\02\\01\\00\
//!      \\07\\07\\01\\03add\\00\\00\\0a\\09\\01\\07\\00\\20\\00\\20\\01\\6a\\0b",
//! ).unwrap();
//!
//! let mut harness = Harness::new(&Config::default()).unwrap();
//! let module = harness.module(&bytes, true).unwrap();
//! let instance = harness.instance(&module).unwrap();
//! let action = Action::invoke(instance, "add", vec![Value::I32(2), Value::I32(3)]);
//! harness.assert_return(&action, &[Expected::Value(Value::I32(5))]).unwrap();
//! ```

pub mod config;
pub mod literal;
pub mod runtime;
pub mod wast;
