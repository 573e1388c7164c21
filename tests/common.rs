//! Common test utilities shared between integration tests

#![allow(dead_code)]

use wastest::config::Config;
use wastest::runtime::{Harness, Instance, Value};
use wastest::wast::Action;

/// Install the test logger; repeated calls are harmless.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A harness with the default configuration.
pub fn harness() -> Harness {
    init_logger();
    Harness::new(&Config::default()).unwrap()
}

/// Encode a text-format module into the bytes the harness loads.
pub fn wasm(wat: &str) -> Vec<u8> {
    wat::parse_str(wat).unwrap_or_else(|e| panic!("bad fixture: {e}"))
}

/// Load and instantiate a valid module.
pub fn instantiate(harness: &mut Harness, wat: &str) -> Instance {
    let module = harness.module(&wasm(wat), true).unwrap();
    harness.instance(&module).unwrap()
}

pub fn invoke(instance: Instance, name: &str, args: &[Value]) -> Action {
    Action::invoke(instance, name, args.to_vec())
}
