//! The `assert_*` family.
//!
//! Each assertion is single-shot: it either passes with `Ok(())` or returns
//! one [`HarnessError`]. A mismatch is an [`HarnessError::Assertion`] naming
//! what was expected and what was observed. Harness-level errors raised
//! while performing the assertion (unknown export, internal errors) are
//! returned unchanged.

use super::command::{format_expected, Action, Expected};
use super::values::match_results_by;
use crate::runtime::value::format_values;
use crate::runtime::{CompiledModule, FailureKind, Harness, HarnessError, Instance};

impl Harness {
    /// Perform `action` and compare its results against `expected`.
    ///
    /// Literal references match when they are the same reference.
    pub fn assert_return(&mut self, action: &Action, expected: &[Expected]) -> Result<(), HarnessError> {
        let results = self.perform(action)?;
        let outcome = match_results_by(&results, expected, |expected, actual| self.same_value(expected, actual));
        outcome.map_err(|detail| {
            log::debug!("assert_return {} mismatch: {detail}", action.name());
            HarnessError::Assertion {
                assertion: "assert_return",
                expected: format_expected(expected),
                actual: format!("{} ({detail})", format_values(&results)),
            }
        })
    }

    /// Pass iff `action` traps.
    pub fn assert_trap(&mut self, action: &Action) -> Result<(), HarnessError> {
        let outcome = self.perform(action);
        expect_failure("assert_trap", FailureKind::Trap, outcome, |results| format_values(results))
    }

    /// Pass iff `action` fails with any classified failure.
    ///
    /// Harness-level errors (an unknown export, a non-callable export, an
    /// argument of the wrong type or arity) are not outcomes of the action:
    /// they are returned unchanged and the assertion does not pass.
    pub fn assert_exception(&mut self, action: &Action) -> Result<(), HarnessError> {
        match self.perform(action) {
            Ok(results) => Err(HarnessError::Assertion {
                assertion: "assert_exception",
                expected: "exception".to_string(),
                actual: format_values(&results),
            }),
            Err(HarnessError::Failure(failure)) => {
                log::debug!("assert_exception: got {failure}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Pass iff `action` exhausts the call stack.
    pub fn assert_exhaustion(&mut self, action: &Action) -> Result<(), HarnessError> {
        let outcome = self.perform(action);
        expect_failure("assert_exhaustion", FailureKind::ResourceExhaustion, outcome, |results| {
            format_values(results)
        })
    }

    /// Pass iff instantiating `module` fails to link.
    pub fn assert_unlinkable(&mut self, module: &CompiledModule) -> Result<(), HarnessError> {
        let outcome = self.instance(module);
        expect_failure("assert_unlinkable", FailureKind::Link, outcome, describe_instance)
    }

    /// Pass iff `module` links but its start-up code traps.
    pub fn assert_uninstantiable(&mut self, module: &CompiledModule) -> Result<(), HarnessError> {
        let outcome = self.instance(module);
        expect_failure("assert_uninstantiable", FailureKind::Trap, outcome, describe_instance)
    }

    /// Pass iff `bytes` are rejected by validation.
    pub fn assert_malformed(&mut self, bytes: &[u8]) -> Result<(), HarnessError> {
        let outcome = self.module(bytes, false);
        expect_failure("assert_malformed", FailureKind::Validation, outcome, |_| "module".to_string())
    }

    /// Pass iff `bytes` are rejected by validation.
    ///
    /// Decode errors and semantic validation errors are not distinguished,
    /// so this behaves exactly like [`Harness::assert_malformed`].
    pub fn assert_invalid(&mut self, bytes: &[u8]) -> Result<(), HarnessError> {
        let outcome = self.module(bytes, false);
        expect_failure("assert_invalid", FailureKind::Validation, outcome, |_| "module".to_string())
    }

    /// Not checked; always passes.
    pub fn assert_malformed_custom(&mut self, bytes: &[u8]) -> Result<(), HarnessError> {
        log::warn!("skipping assert_malformed_custom ({} bytes)", bytes.len());
        Ok(())
    }

    /// Not checked; always passes.
    pub fn assert_invalid_custom(&mut self, bytes: &[u8]) -> Result<(), HarnessError> {
        log::warn!("skipping assert_invalid_custom ({} bytes)", bytes.len());
        Ok(())
    }
}

fn describe_instance(_: &Instance) -> String {
    "instance".to_string()
}

/// Resolve an outcome that is expected to fail with `kind`.
fn expect_failure<T>(
    assertion: &'static str,
    kind: FailureKind,
    outcome: Result<T, HarnessError>,
    describe: impl FnOnce(&T) -> String,
) -> Result<(), HarnessError> {
    match outcome {
        Ok(value) => Err(HarnessError::Assertion {
            assertion,
            expected: kind.to_string(),
            actual: describe(&value),
        }),
        Err(HarnessError::Failure(failure)) if failure.kind() == kind => {
            log::debug!("{assertion}: got {failure}");
            Ok(())
        }
        Err(HarnessError::Failure(failure)) => Err(HarnessError::Assertion {
            assertion,
            expected: kind.to_string(),
            actual: failure.to_string(),
        }),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Failure;

    #[test]
    fn expect_failure_outcomes() {
        let ok: Result<u32, HarnessError> = Ok(1);
        let err = expect_failure("assert_trap", FailureKind::Trap, ok, |v| v.to_string()).unwrap_err();
        assert_eq!(err.to_string(), "assert_trap failed: expected trap, got 1");

        let trapped: Result<u32, HarnessError> = Err(Failure::Trap("unreachable".into()).into());
        assert!(expect_failure("assert_trap", FailureKind::Trap, trapped, |v| v.to_string()).is_ok());

        let linked: Result<u32, HarnessError> = Err(Failure::Link("unknown import".into()).into());
        let err = expect_failure("assert_trap", FailureKind::Trap, linked, |v| v.to_string()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "assert_trap failed: expected trap, got link failure: unknown import"
        );

        let internal: Result<u32, HarnessError> = Err(HarnessError::Internal("boom".into()));
        let err = expect_failure("assert_trap", FailureKind::Trap, internal, |v| v.to_string()).unwrap_err();
        assert!(err.is_fatal());
    }
}
