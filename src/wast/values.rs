//! Result comparison for assertions.
//!
//! Literal expectations use same-value equality ([`Value::same_value`]).
//! Symbolic categories are coarser: the three NaN kinds all accept any NaN,
//! and the `ref.any`/`ref.eq`/`ref.struct`/`ref.array` categories accept any
//! object-shaped reference since sub-kinds are not observable here.

use super::command::{format_expected, Expected, Lane, LaneShape};
use crate::runtime::value::format_values;
use crate::runtime::Value;

/// Mask clearing the sign bit of a 32-bit value.
const SIGN_MASK: i64 = 0x7fff_ffff;

/// Compare a result sequence against expected descriptors.
///
/// Returns `Err(description)` for a length mismatch or the first mismatching
/// position.
pub fn match_results(results: &[Value], expected: &[Expected]) -> Result<(), String> {
    match_results_by(results, expected, Value::same_value)
}

/// Like [`match_results`], with `same` deciding whether a literal expected
/// value equals the actual one.
pub fn match_results_by(
    results: &[Value],
    expected: &[Expected],
    mut same: impl FnMut(&Value, &Value) -> bool,
) -> Result<(), String> {
    if results.len() != expected.len() {
        return Err(format!(
            "result count mismatch: expected {} {}, got {} {}",
            expected.len(),
            format_expected(expected),
            results.len(),
            format_values(results)
        ));
    }
    for (i, (result, exp)) in results.iter().zip(expected).enumerate() {
        if !exp.matches_by(result, &mut same) {
            return Err(format!("result {i}: expected {exp}, got {result}"));
        }
    }
    Ok(())
}

impl Expected {
    /// Whether `actual` is an acceptable value for this descriptor.
    pub fn matches(&self, actual: &Value) -> bool {
        self.matches_by(actual, Value::same_value)
    }

    /// [`Expected::matches`] with `same` comparing literal values.
    pub fn matches_by(&self, actual: &Value, mut same: impl FnMut(&Value, &Value) -> bool) -> bool {
        match self {
            Expected::NanCanonical | Expected::NanArithmetic | Expected::NanAny => actual.is_nan(),
            Expected::RefI31 => actual.as_plain_number().is_some_and(|n| n & SIGN_MASK == n),
            Expected::RefAny | Expected::RefEq | Expected::RefStruct | Expected::RefArray => actual.is_object(),
            Expected::RefFunc => actual.is_callable(),
            Expected::RefExtern => !actual.is_null(),
            Expected::RefNull => actual.is_null(),
            Expected::Value(expected) => same(expected, actual),
            Expected::V128 { shape, lanes } => match actual {
                Value::V128(v) => match_lanes(*shape, lanes, *v),
                _ => false,
            },
        }
    }
}

fn match_lanes(shape: LaneShape, lanes: &[Lane], actual: u128) -> bool {
    let actual = shape.split(actual);
    if actual.len() != lanes.len() {
        return false;
    }
    actual.iter().zip(lanes).all(|(&bits, lane)| match lane {
        Lane::Nan => shape.is_float() && lane_is_nan(shape, bits),
        Lane::Bits(expected) if shape.is_float() => {
            (lane_is_nan(shape, bits) && lane_is_nan(shape, *expected)) || bits == *expected
        }
        Lane::Bits(expected) => bits == expected & shape.mask(),
    })
}

fn lane_is_nan(shape: LaneShape, bits: u64) -> bool {
    match shape {
        LaneShape::F32x4 => f32::from_bits(bits as u32).is_nan(),
        LaneShape::F64x2 => f64::from_bits(bits).is_nan(),
        _ => false,
    }
}
