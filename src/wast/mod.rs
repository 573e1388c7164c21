//! Assertion engine and script execution.
//!
//! Scripts drive a [`crate::runtime::Harness`] through a sequence of module
//! loads, registrations, actions and assertions. The assertion methods
//! (`assert_return`, `assert_trap`, ...) are implemented on the harness
//! itself; this module provides the [`Action`] and [`Expected`] types they
//! consume, the comparison rules, and a runner for JSON command scripts.
//!
//! # Example
//!
//! ```
//! use wastest::config::Config;
//! use wastest::runtime::{FailureKind, Harness};
//! use wastest::wast::Action;
//!
//! let mut harness = Harness::new(&Config::default()).unwrap();
//! // (module (func (export "boom") unreachable))
//! let module = harness
//!     .module_str(
//!         "\\00asm\\01\\00\\00\\00\\01\\04\\01\\60\\00\\00\\03\\02\\01\\00\
//!          \\07\\08\\01\\04boom\\00\\00\\0a\\05\\01\\03\\00\\00\\0b",
//!         true,
//!     )
//!     .unwrap();
//! let instance = harness.instance(&module).unwrap();
//! let action = Action::invoke(instance, "boom", vec![]);
//! harness.assert_trap(&action).unwrap();
//!
//! let err = harness.perform(&action).unwrap_err();
//! assert_eq!(err.failure().map(|f| f.kind()), Some(FailureKind::Trap));
//! ```

mod assert;
pub mod command;
pub mod script;
pub mod values;

pub use command::{Action, Expected, Lane, LaneShape};
pub use script::{run_file, CommandFailure, Report, Script, ScriptError};
pub use values::{match_results, match_results_by};
