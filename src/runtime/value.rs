//! Harness-level value representation
//!
//! [`Value`] is what actions return and accept. Engine values are normalised
//! into it at the call boundary: `externref`s carrying a [`HostRef`] payload
//! become [`Value::HostRef`], `i31ref`s become [`Value::I31`], and every
//! other internal reference is an opaque, object-shaped [`Value::Any`].

use super::host::{host_ref, HostRef, HostState};
use super::HarnessError;
use fhex::ToHex;
use std::fmt;
use wasmtime::{AnyRef, ExternRef, Func, HeapType, Rooted, Store, Val, ValType, I31};

/// Runtime representation of values crossing the harness boundary
#[derive(Debug, Clone, Copy)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
    /// A null reference of any type hierarchy.
    Null,
    Func(Func),
    HostRef(HostRef),
    /// A non-null `externref` without a host tag.
    Extern(Rooted<ExternRef>),
    /// An `i31ref`, holding its unsigned 31-bit payload.
    I31(u32),
    /// Any other internal reference (struct, array, internalized extern).
    Any(Rooted<AnyRef>),
}

impl Value {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::V128(_) => "v128",
            Value::Null => "null",
            Value::Func(_) => "funcref",
            Value::HostRef(_) | Value::Extern(_) => "externref",
            Value::I31(_) => "i31ref",
            Value::Any(_) => "anyref",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::F32(_) | Value::F64(_))
    }

    /// Whether this is a float NaN of either width.
    pub fn is_nan(&self) -> bool {
        match self {
            Value::F32(v) => v.is_nan(),
            Value::F64(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_))
    }

    /// Whether this value is a composite, object-shaped reference.
    ///
    /// Struct, array and other internal references are indistinguishable
    /// here, and host references count as objects too.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Any(_) | Value::HostRef(_) | Value::Extern(_))
    }

    /// The integer carried by a plain number (`i32` or `i31ref`).
    pub fn as_plain_number(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I31(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Same-value equality.
    ///
    /// Floats compare by representation, so `+0.0` and `-0.0` differ, and
    /// any NaN equals any other NaN of the same width. References without a
    /// host tag have no store-independent identity and never compare equal
    /// here; [`Harness::same_value`](super::Harness::same_value) compares
    /// them through the store.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Value::V128(a), Value::V128(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::HostRef(a), Value::HostRef(b)) => a == b,
            (Value::I31(a), Value::I31(b)) => a == b,
            _ => false,
        }
    }

    /// Convert an engine value into a harness value.
    ///
    /// An internal reference that wraps a host reference (an internalized
    /// `hostref`) surfaces as that [`Value::HostRef`].
    pub(crate) fn from_val(store: &mut Store<HostState>, val: Val) -> Result<Value, HarnessError> {
        Ok(match val {
            Val::I32(v) => Value::I32(v),
            Val::I64(v) => Value::I64(v),
            Val::F32(bits) => Value::F32(f32::from_bits(bits)),
            Val::F64(bits) => Value::F64(f64::from_bits(bits)),
            Val::V128(v) => Value::V128(v.as_u128()),
            Val::FuncRef(None) | Val::ExternRef(None) | Val::AnyRef(None) => Value::Null,
            Val::FuncRef(Some(func)) => Value::Func(func),
            Val::ExternRef(Some(r)) => match host_tag(store, r)? {
                Some(tag) => Value::HostRef(tag),
                None => Value::Extern(r),
            },
            Val::AnyRef(Some(r)) => match r.as_i31(&*store).map_err(inspect_error)? {
                Some(i31) => Value::I31(i31.get_u32()),
                None => {
                    let external = ExternRef::convert_any(&mut *store, r).map_err(inspect_error)?;
                    match host_tag(store, external)? {
                        Some(tag) => Value::HostRef(tag),
                        None => Value::Any(r),
                    }
                }
            },
        })
    }

    /// Convert this value into an engine value for a parameter of type `ty`.
    ///
    /// `ty` picks the heap type of a [`Value::Null`] and the hierarchy
    /// (`extern` or `any`) a non-null reference is passed in.
    pub(crate) fn to_val(&self, store: &mut Store<HostState>, ty: &ValType) -> Result<Val, HarnessError> {
        let convert_error = |e: anyhow::Error| HarnessError::Internal(format!("failed to convert reference: {e:#}"));
        let internal_param = ty
            .as_ref()
            .is_some_and(|r| matches!(r.heap_type().top(), HeapType::Any));

        Ok(match self {
            Value::I32(v) => Val::I32(*v),
            Value::I64(v) => Val::I64(*v),
            Value::F32(v) => Val::F32(v.to_bits()),
            Value::F64(v) => Val::F64(v.to_bits()),
            Value::V128(v) => Val::V128((*v).into()),
            Value::Null => match ty.as_ref() {
                Some(ref_type) => Val::null_ref(ref_type.heap_type()),
                // Not a reference parameter; the engine's own type check rejects it.
                None => Val::null_extern_ref(),
            },
            Value::Func(func) => Val::FuncRef(Some(*func)),
            Value::HostRef(tag) => {
                let r = host_ref(&mut *store, tag.0)
                    .map_err(|e| HarnessError::Internal(format!("failed to allocate {tag}: {e:#}")))?;
                if internal_param {
                    Val::AnyRef(Some(AnyRef::convert_extern(&mut *store, r).map_err(convert_error)?))
                } else {
                    Val::ExternRef(Some(r))
                }
            }
            Value::Extern(r) if internal_param => {
                Val::AnyRef(Some(AnyRef::convert_extern(&mut *store, *r).map_err(convert_error)?))
            }
            Value::Extern(r) => Val::ExternRef(Some(*r)),
            Value::I31(v) => Val::AnyRef(Some(AnyRef::from_i31(&mut *store, I31::wrapping_u32(*v)))),
            Value::Any(r) if internal_param || ty.as_ref().is_none() => Val::AnyRef(Some(*r)),
            Value::Any(r) => Val::ExternRef(Some(ExternRef::convert_any(&mut *store, *r).map_err(convert_error)?)),
        })
    }
}

fn inspect_error(e: anyhow::Error) -> HarnessError {
    HarnessError::Internal(format!("failed to inspect reference: {e:#}"))
}

/// The [`HostRef`] payload of `r`, if it carries one.
fn host_tag(store: &Store<HostState>, r: Rooted<ExternRef>) -> Result<Option<HostRef>, HarnessError> {
    Ok(r.data(store)
        .map_err(inspect_error)?
        .and_then(|data| data.downcast_ref::<HostRef>())
        .copied())
}

impl From<HostRef> for Value {
    fn from(tag: HostRef) -> Self {
        Value::HostRef(tag)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{v} ({})", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{v} ({})", v.to_hex()),
            Value::V128(v) => write!(f, "v128:0x{v:032x}"),
            Value::Null => write!(f, "null"),
            Value::Func(_) => write!(f, "funcref"),
            Value::HostRef(tag) => write!(f, "{tag}"),
            Value::Extern(_) => write!(f, "externref"),
            Value::I31(v) => write!(f, "i31ref:{v}"),
            Value::Any(_) => write!(f, "anyref"),
        }
    }
}

/// Render a result sequence for diagnostics.
pub fn format_values(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}
