mod common;

use common::{harness, instantiate, invoke, wasm};
use rand::Rng;
use rstest::rstest;
use wastest::runtime::{Bindings, FailureKind, HarnessError, HostRef, Value};
use wastest::wast::{Action, Expected};

const ARRAY_MODULE: &str = r#"
(module
  (type $arr (array (mut i32)))
  (global $g (mut (ref null $arr)) (ref.null $arr))
  (func $init (global.set $g (array.new_default $arr (i32.const 12))))
  (start $init)
  (func (export "array_fill") (param $off i32) (param $val i32) (param $n i32)
    (array.fill $arr (global.get $g) (local.get $off) (local.get $val) (local.get $n)))
  (func (export "array_get_nth") (param $i i32) (result i32)
    (array.get $arr (global.get $g) (local.get $i))))
"#;

const FAC_MODULE: &str = r#"
(module
  (func $fac-rec (export "fac-rec") (param i64) (result i64)
    (if (result i64) (i64.eq (local.get 0) (i64.const 0))
      (then (i64.const 1))
      (else (i64.mul (local.get 0) (call $fac-rec (i64.sub (local.get 0) (i64.const 1)))))))
  (func (export "fac-iter") (param i64) (result i64)
    (local i64 i64)
    (local.set 1 (local.get 0))
    (local.set 2 (i64.const 1))
    (block
      (loop
        (br_if 1 (i64.eq (local.get 1) (i64.const 0)))
        (local.set 2 (i64.mul (local.get 1) (local.get 2)))
        (local.set 1 (i64.sub (local.get 1) (i64.const 1)))
        (br 0)))
    (local.get 2)))
"#;

const MEMORY_COPY_MODULE: &str = r#"
(module
  (memory 1 1)
  (data (i32.const 0) "\aa\bb\cc\dd")
  (func (export "copy") (param i32 i32 i32)
    (memory.copy (local.get 0) (local.get 1) (local.get 2)))
  (func (export "load8_u") (param i32) (result i32)
    (i32.load8_u (local.get 0))))
"#;

const CONVERT_MODULE: &str = r#"
(module
  (type $s (struct))
  (func (export "externalize") (param anyref) (result externref)
    (extern.convert_any (local.get 0)))
  (func (export "internalize") (param externref) (result anyref)
    (any.convert_extern (local.get 0)))
  (func (export "make-struct") (result anyref) (struct.new $s))
  (func (export "make-i31") (param i32) (result anyref) (ref.i31 (local.get 0))))
"#;

const HOSTREF_MODULE: &str = r#"
(module
  (import "spectest" "hostref" (func $hostref (param i32) (result externref)))
  (import "spectest" "eq_ref" (func $eq_ref (param externref externref) (result i32)))
  (func (export "same") (param i32 i32) (result i32)
    (call $eq_ref (call $hostref (local.get 0)) (call $hostref (local.get 1))))
  (func (export "make") (param i32) (result externref) (call $hostref (local.get 0)))
  (func (export "eq") (param externref externref) (result i32)
    (call $eq_ref (local.get 0) (local.get 1))))
"#;

fn i32s(values: &[i32]) -> Vec<Value> {
    values.iter().map(|&v| Value::I32(v)).collect()
}

fn expect(value: Value) -> Expected {
    Expected::Value(value)
}

#[test]
fn array_fill_and_get() {
    let mut h = harness();
    let instance = instantiate(&mut h, ARRAY_MODULE);

    h.run(&invoke(instance, "array_fill", &i32s(&[12, 0, 0]))).unwrap();
    h.assert_return(&invoke(instance, "array_get_nth", &i32s(&[5])), &[expect(Value::I32(0))])
        .unwrap();

    h.run(&invoke(instance, "array_fill", &i32s(&[2, 11, 2]))).unwrap();
    h.assert_return(&invoke(instance, "array_get_nth", &i32s(&[1])), &[expect(Value::I32(0))])
        .unwrap();
    h.assert_return(&invoke(instance, "array_get_nth", &i32s(&[2])), &[expect(Value::I32(11))])
        .unwrap();
    h.assert_return(&invoke(instance, "array_get_nth", &i32s(&[3])), &[expect(Value::I32(11))])
        .unwrap();
    h.assert_return(&invoke(instance, "array_get_nth", &i32s(&[4])), &[expect(Value::I32(0))])
        .unwrap();

    h.assert_trap(&invoke(instance, "array_get_nth", &i32s(&[12]))).unwrap();
    h.assert_trap(&invoke(instance, "array_fill", &i32s(&[11, 0, 2]))).unwrap();
}

#[rstest]
#[case("fac-rec")]
#[case("fac-iter")]
fn factorial_wraps_to_64_bits(#[case] name: &str) {
    let mut h = harness();
    let instance = instantiate(&mut h, FAC_MODULE);
    let action = invoke(instance, name, &[Value::I64(25)]);
    h.assert_return(&action, &[expect(Value::I64(7034535277573963776))])
        .unwrap();
    // Deterministic actions can be asserted repeatedly.
    h.assert_return(&action, &[expect(Value::I64(7034535277573963776))])
        .unwrap();
}

#[test]
fn deep_recursion_is_exhaustion_not_trap() {
    let mut h = harness();
    let instance = instantiate(&mut h, FAC_MODULE);
    let action = invoke(instance, "fac-rec", &[Value::I64(1073741824)]);

    h.assert_exhaustion(&action).unwrap();

    let err = h.assert_trap(&action).unwrap_err();
    match err {
        HarnessError::Assertion {
            assertion, actual, ..
        } => {
            assert_eq!(assertion, "assert_trap");
            assert!(actual.starts_with("resource exhaustion"), "{actual}");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The store stays usable after a stack overflow.
    h.assert_return(&invoke(instance, "fac-iter", &[Value::I64(3)]), &[expect(Value::I64(6))])
        .unwrap();
}

#[test]
fn memory_copy_bounds() {
    let mut h = harness();
    let instance = instantiate(&mut h, MEMORY_COPY_MODULE);

    h.run(&invoke(instance, "copy", &i32s(&[10, 0, 4]))).unwrap();
    for (offset, byte) in (10..14).zip([0xaa, 0xbb, 0xcc, 0xdd]) {
        h.assert_return(&invoke(instance, "load8_u", &i32s(&[offset])), &[expect(Value::I32(byte))])
            .unwrap();
    }
    h.assert_return(&invoke(instance, "load8_u", &i32s(&[14])), &[expect(Value::I32(0))])
        .unwrap();

    h.assert_trap(&invoke(instance, "copy", &i32s(&[65537, 0, 0]))).unwrap();
    h.assert_trap(&invoke(instance, "copy", &i32s(&[0, 65537, 0]))).unwrap();
    h.assert_trap(&invoke(instance, "copy", &i32s(&[65535, 0, 2]))).unwrap();
    h.assert_return(&invoke(instance, "copy", &i32s(&[65536, 0, 0])), &[])
        .unwrap();
    h.assert_return(&invoke(instance, "copy", &i32s(&[0, 65536, 0])), &[])
        .unwrap();
}

#[test]
fn internalize_and_externalize() {
    let mut h = harness();
    let instance = instantiate(&mut h, CONVERT_MODULE);

    h.assert_return(&invoke(instance, "internalize", &[Value::Null]), &[Expected::RefNull])
        .unwrap();
    h.assert_return(&invoke(instance, "externalize", &[Value::Null]), &[Expected::RefNull])
        .unwrap();

    // Host references survive a round trip through the internal hierarchy.
    let host = h.host_ref(1);
    h.assert_return(&invoke(instance, "internalize", &[host]), &[expect(host)])
        .unwrap();
    h.assert_return(&invoke(instance, "externalize", &[host]), &[expect(host)])
        .unwrap();
    h.assert_return(&invoke(instance, "internalize", &[host]), &[Expected::RefAny])
        .unwrap();

    let object = h.perform(&invoke(instance, "make-struct", &[])).unwrap();
    assert!(matches!(object[..], [Value::Any(_)]));
    h.assert_return(&invoke(instance, "externalize", &object), &[Expected::RefExtern])
        .unwrap();
    let external = h.perform(&invoke(instance, "externalize", &object)).unwrap();
    assert!(matches!(external[..], [Value::Extern(_)]));
    h.assert_return(&invoke(instance, "internalize", &external), &[Expected::RefStruct])
        .unwrap();

    h.assert_return(&invoke(instance, "make-i31", &i32s(&[7])), &[Expected::RefI31])
        .unwrap();
    h.assert_return(&invoke(instance, "make-i31", &i32s(&[-1])), &[expect(Value::I31(0x7fff_ffff))])
        .unwrap();
    h.assert_return(&invoke(instance, "externalize", &[Value::I31(7)]), &[Expected::RefExtern])
        .unwrap();
    h.assert_return(&invoke(instance, "make-i31", &i32s(&[7])), &[Expected::RefNull])
        .unwrap_err();
}

#[test]
fn hostref_identity_through_spectest() {
    let mut h = harness();
    let instance = instantiate(&mut h, HOSTREF_MODULE);

    h.assert_return(&invoke(instance, "same", &i32s(&[1, 1])), &[expect(Value::I32(1))])
        .unwrap();
    h.assert_return(&invoke(instance, "same", &i32s(&[1, 2])), &[expect(Value::I32(0))])
        .unwrap();

    let made = h.perform(&invoke(instance, "make", &i32s(&[3]))).unwrap();
    assert!(matches!(made[..], [Value::HostRef(HostRef(3))]));

    // A host-side hostref(3) is the same reference the module produced.
    let args = [made[0], h.host_ref(3)];
    h.assert_return(&invoke(instance, "eq", &args), &[expect(Value::I32(1))])
        .unwrap();
    let args = [h.host_ref(3), h.host_ref(4)];
    h.assert_return(&invoke(instance, "eq", &args), &[expect(Value::I32(0))])
        .unwrap();
    let args = [Value::Null, Value::Null];
    h.assert_return(&invoke(instance, "eq", &args), &[expect(Value::I32(1))])
        .unwrap();
    assert!(h.store().data().host_refs.contains(3));
}

#[test]
fn registered_exports_are_the_same_bindings() {
    let mut h = harness();
    let provider = instantiate(
        &mut h,
        r#"(module
            (memory (export "mem") 1)
            (func (export "peek") (param i32) (result i32) (i32.load8_u (local.get 0))))"#,
    );
    h.register("M", provider);
    assert_eq!(h.registry().lookup("M").names(), vec!["mem", "peek"]);

    let consumer = instantiate(
        &mut h,
        r#"(module
            (import "M" "mem" (memory 1))
            (import "M" "peek" (func $peek (param i32) (result i32)))
            (func (export "poke") (param i32 i32) (i32.store8 (local.get 0) (local.get 1)))
            (func (export "peek") (param i32) (result i32) (call $peek (local.get 0))))"#,
    );
    h.run(&invoke(consumer, "poke", &i32s(&[100, 42]))).unwrap();
    h.assert_return(&invoke(provider, "peek", &i32s(&[100])), &[expect(Value::I32(42))])
        .unwrap();
    h.assert_return(&invoke(consumer, "peek", &i32s(&[100])), &[expect(Value::I32(42))])
        .unwrap();
}

#[test]
fn reregistration_overwrites_namespace() {
    let mut h = harness();
    let importer = h
        .module(&wasm(r#"(module (import "M" "f" (func (result i32))))"#), true)
        .unwrap();

    let first = instantiate(&mut h, r#"(module (func (export "f") (result i32) i32.const 1))"#);
    h.register("M", first);
    assert!(h.instance(&importer).is_ok());

    let second = instantiate(&mut h, r#"(module (func (export "g") (result i32) i32.const 2))"#);
    h.register("M", second);
    h.assert_unlinkable(&importer).unwrap();
}

#[rstest]
#[case(r#"(module (import "nowhere" "f" (func)))"#)]
#[case(r#"(module (import "spectest" "nothing" (func)))"#)]
#[case(r#"(module (import "spectest" "print_i32" (func (param i64))))"#)]
#[case(r#"(module (import "spectest" "memory" (memory 3)))"#)]
fn unlinkable_modules(#[case] wat: &str) {
    let mut h = harness();
    let module = h.module(&wasm(wat), true).unwrap();
    h.assert_unlinkable(&module).unwrap();
    let err = h.assert_uninstantiable(&module).unwrap_err();
    assert!(err.to_string().contains("link failure"), "{err}");
}

#[test]
fn start_trap_is_uninstantiable() {
    let mut h = harness();
    let module = h
        .module(&wasm(r#"(module (func $start unreachable) (start $start))"#), true)
        .unwrap();
    h.assert_uninstantiable(&module).unwrap();
    assert!(h.assert_unlinkable(&module).is_err());
}

#[test]
fn spectest_imports_link() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module
            (import "spectest" "print" (func $print))
            (import "spectest" "print_i32_f32" (func $p2 (param i32 f32)))
            (import "spectest" "print_f64_f64" (func $p3 (param f64 f64)))
            (import "spectest" "global_i32" (global $g i32))
            (import "spectest" "global_i64" (global i64))
            (import "spectest" "global_f32" (global f32))
            (import "spectest" "global_f64" (global f64))
            (import "spectest" "table" (table 10 20 funcref))
            (import "spectest" "memory" (memory 1 2))
            (func (export "run") (result i32)
              call $print
              (call $p2 (i32.const 1) (f32.const 2))
              (call $p3 (f64.const 3) (f64.const 4))
              global.get $g))"#,
    );
    h.assert_return(&invoke(instance, "run", &[]), &[expect(Value::I32(666))])
        .unwrap();
}

#[rstest]
#[case::type_mismatch(wasm(r#"(module (func (result i32)))"#))]
#[case::unknown_local(wasm(r#"(module (func local.get 0 drop))"#))]
#[case::bad_version(b"\0asm\x02\0\0\0".to_vec())]
#[case::truncated(b"\0asm\x01\0".to_vec())]
#[case::empty(vec![])]
fn rejected_modules(#[case] bytes: Vec<u8>) {
    let mut h = harness();
    h.assert_invalid(&bytes).unwrap();
    h.assert_malformed(&bytes).unwrap();
    let err = h.module(&bytes, true).unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind()), Some(FailureKind::Validation));
}

#[test]
fn valid_module_fails_assert_invalid() {
    let mut h = harness();
    let bytes = wasm("(module)");
    assert!(matches!(h.assert_invalid(&bytes), Err(HarnessError::UnexpectedValidity)));
    assert!(matches!(h.assert_malformed(&bytes), Err(HarnessError::UnexpectedValidity)));
}

#[test]
fn custom_assertions_are_skipped() {
    let mut h = harness();
    h.assert_malformed_custom(b"garbage").unwrap();
    h.assert_invalid_custom(&wasm("(module)")).unwrap();
}

#[test]
fn host_errors_are_exceptions() {
    let mut h = harness();
    let mut bindings = Bindings::new();
    bindings.insert(
        "throw",
        wasmtime::Func::wrap(h.store_mut(), || -> anyhow::Result<()> { Err(anyhow::anyhow!("thrown")) }),
    );
    let mut registry = h.registry().clone();
    registry.register("host", bindings);

    let module = h
        .module(
            &wasm(
                r#"(module
                    (import "host" "throw" (func $throw))
                    (func (export "throws") call $throw)
                    (func (export "traps") unreachable))"#,
            ),
            true,
        )
        .unwrap();
    let instance = h.instance_with(&module, &registry).unwrap();

    h.assert_exception(&invoke(instance, "throws", &[])).unwrap();
    h.assert_exception(&invoke(instance, "traps", &[])).unwrap();
    let err = h.assert_trap(&invoke(instance, "throws", &[])).unwrap_err();
    assert!(err.to_string().contains("uncaught exception"), "{err}");
    let err = h.perform(&invoke(instance, "throws", &[])).unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind()), Some(FailureKind::UncaughtException));
}

#[test]
fn assert_exception_needs_an_engine_outcome() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module (func (export "f") (param i64) (result i64) (unreachable)))"#,
    );

    let err = h.assert_exception(&invoke(instance, "f", &[Value::I32(1)])).unwrap_err();
    assert!(err.failure().is_none());
    assert_eq!(err.to_string(), "Argument 0 of f: expected i64, got i32");

    let err = h.assert_exception(&invoke(instance, "missing", &[])).unwrap_err();
    assert!(matches!(err, HarnessError::UnknownExport(_)));
    let err = h.assert_exception(&invoke(instance, "f", &[])).unwrap_err();
    assert!(matches!(err, HarnessError::ArityMismatch { .. }));

    h.assert_exception(&invoke(instance, "f", &[Value::I64(1)])).unwrap();
}

#[test]
fn assert_return_matches_the_same_reference() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module
            (func $f (export "f"))
            (func (export "g"))
            (func (export "self") (result funcref) ref.func $f))"#,
    );
    let f = h.get(instance, "f").unwrap();
    let g = h.get(instance, "g").unwrap();

    h.assert_return(&Action::get(instance, "f"), &[expect(f)]).unwrap();
    h.assert_return(&invoke(instance, "self", &[]), &[expect(f)]).unwrap();
    let err = h.assert_return(&Action::get(instance, "f"), &[expect(g)]).unwrap_err();
    assert!(err.to_string().starts_with("assert_return failed"), "{err}");
}

#[test]
fn assert_return_reports_mismatch() {
    let mut h = harness();
    let instance = instantiate(&mut h, r#"(module (func (export "f") (result f64) f64.const -0))"#);
    let action = invoke(instance, "f", &[]);

    h.assert_return(&action, &[expect(Value::F64(-0.0))]).unwrap();
    let err = h.assert_return(&action, &[expect(Value::F64(0.0))]).unwrap_err();
    assert!(err.to_string().starts_with("assert_return failed"), "{err}");
    assert!(h.assert_return(&action, &[]).is_err());
    assert!(h.assert_return(&action, &[Expected::NanAny]).is_err());
}

#[test]
fn nan_results_match_all_nan_categories() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module (func (export "nan") (result f32 f64) f32.const nan:0x200000 f64.const -nan))"#,
    );
    let action = invoke(instance, "nan", &[]);
    for category in [Expected::NanCanonical, Expected::NanArithmetic, Expected::NanAny] {
        h.assert_return(&action, &[category.clone(), category]).unwrap();
    }
    h.assert_return(&action, &[expect(Value::F32(f32::NAN)), expect(Value::F64(f64::NAN))])
        .unwrap();
}

#[test]
fn get_reads_globals() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module
            (global (export "g") (mut i32) (i32.const 7))
            (func (export "set") (param i32) (global.set 0 (local.get 0))))"#,
    );
    h.assert_return(&Action::get(instance, "g"), &[expect(Value::I32(7))])
        .unwrap();
    h.run(&invoke(instance, "set", &i32s(&[9]))).unwrap();
    h.assert_return(&Action::get(instance, "g"), &[expect(Value::I32(9))])
        .unwrap();
    h.assert_return(&invoke(instance, "g", &[]), &[expect(Value::I32(9))])
        .unwrap();
    h.assert_return(&Action::get(instance, "set"), &[Expected::RefFunc])
        .unwrap();
    assert!(matches!(
        h.perform(&Action::get(instance, "missing")),
        Err(HarnessError::UnknownExport(_))
    ));
}

#[test]
fn same_value_on_random_floats() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let bits: u64 = rng.gen();
        let x = Value::F64(f64::from_bits(bits));
        assert!(x.same_value(&x));
        let flipped = Value::F64(f64::from_bits(bits ^ (1 << 63)));
        assert_eq!(x.same_value(&flipped), x.is_nan());

        let bits: u32 = rng.gen();
        let y = Value::F32(f32::from_bits(bits));
        assert!(y.same_value(&y));
        assert!(!y.same_value(&Value::F64(f64::from_bits(u64::from(bits)))));
    }
}

#[test]
fn float_arguments_keep_their_bits() {
    let mut h = harness();
    let instance = instantiate(
        &mut h,
        r#"(module (func (export "id") (param f32 f64) (result f32 f64) local.get 0 local.get 1))"#,
    );
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let a = Value::F32(f32::from_bits(rng.gen()));
        let b = Value::F64(f64::from_bits(rng.gen()));
        h.assert_return(&invoke(instance, "id", &[a, b]), &[expect(a), expect(b)])
            .unwrap();
    }
}

#[test]
fn module_from_escaped_literal() {
    let mut h = harness();
    let module = h
        .module_str(
            "\\00asm\\01\\00\\00\\00\\01\\05\\01\\60\\00\\01\\7f\\03\\02\\01\\00\
             \\07\\07\\01\\03one\\00\\00\\0a\\06\\01\\04\\00\\41\\01\\0b",
            true,
        )
        .unwrap();
    assert_eq!(module.exports(), vec!["one"]);
    let instance = h.instance(&module).unwrap();
    h.assert_return(&invoke(instance, "one", &[]), &[expect(Value::I32(1))])
        .unwrap();
}
