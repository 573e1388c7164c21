//! Actions and expected results consumed by the assertion engine.

use crate::runtime::{Instance, Value};
use std::fmt;

/// An action performed against a live instance.
#[derive(Debug, Clone)]
pub enum Action {
    /// Call an exported function (or read an exported global).
    Invoke {
        instance: Instance,
        name: String,
        args: Vec<Value>,
    },

    /// Read an exported global.
    Get { instance: Instance, name: String },
}

impl Action {
    pub fn invoke(instance: Instance, name: impl Into<String>, args: Vec<Value>) -> Self {
        Action::Invoke {
            instance,
            name: name.into(),
            args,
        }
    }

    pub fn get(instance: Instance, name: impl Into<String>) -> Self {
        Action::Get {
            instance,
            name: name.into(),
        }
    }

    /// Export name this action targets.
    pub fn name(&self) -> &str {
        match self {
            Action::Invoke { name, .. } | Action::Get { name, .. } => name,
        }
    }
}

/// Describes an acceptable result value.
///
/// Either a literal compared by same-value equality, or a symbolic category
/// accepting a class of values.
#[derive(Debug, Clone)]
pub enum Expected {
    Value(Value),
    NanCanonical,
    NanArithmetic,
    NanAny,
    RefI31,
    RefAny,
    RefEq,
    RefStruct,
    RefArray,
    RefFunc,
    RefExtern,
    RefNull,
    /// A `v128` compared lane by lane.
    V128 { shape: LaneShape, lanes: Vec<Lane> },
}

impl From<Value> for Expected {
    fn from(value: Value) -> Self {
        Expected::Value(value)
    }
}

/// Lane interpretation of a `v128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneShape {
    I8x16,
    I16x8,
    I32x4,
    I64x2,
    F32x4,
    F64x2,
}

impl LaneShape {
    /// Parse a shape name such as `"i32x4"` or its lane type `"i32"`.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "i8x16" | "i8" => LaneShape::I8x16,
            "i16x8" | "i16" => LaneShape::I16x8,
            "i32x4" | "i32" => LaneShape::I32x4,
            "i64x2" | "i64" => LaneShape::I64x2,
            "f32x4" | "f32" => LaneShape::F32x4,
            "f64x2" | "f64" => LaneShape::F64x2,
            _ => return None,
        })
    }

    /// Lane width in bits.
    pub fn lane_bits(self) -> u32 {
        match self {
            LaneShape::I8x16 => 8,
            LaneShape::I16x8 => 16,
            LaneShape::I32x4 | LaneShape::F32x4 => 32,
            LaneShape::I64x2 | LaneShape::F64x2 => 64,
        }
    }

    pub fn lane_count(self) -> usize {
        (128 / self.lane_bits()) as usize
    }

    pub fn is_float(self) -> bool {
        matches!(self, LaneShape::F32x4 | LaneShape::F64x2)
    }

    /// Mask truncating a lane value to the lane width.
    pub fn mask(self) -> u64 {
        match self.lane_bits() {
            64 => u64::MAX,
            bits => (1u64 << bits) - 1,
        }
    }

    /// Split a `v128` into its lanes, lowest lane first.
    pub fn split(self, v: u128) -> Vec<u64> {
        let bits = self.lane_bits();
        (0..self.lane_count())
            .map(|i| (v >> (i as u32 * bits)) as u64 & self.mask())
            .collect()
    }

    /// Join lanes, lowest first, into a `v128`. Lane values are truncated.
    pub fn join(self, lanes: &[u64]) -> u128 {
        let bits = self.lane_bits();
        lanes
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, lane)| acc | (u128::from(lane & self.mask()) << (i as u32 * bits)))
    }
}

impl fmt::Display for LaneShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaneShape::I8x16 => "i8x16",
            LaneShape::I16x8 => "i16x8",
            LaneShape::I32x4 => "i32x4",
            LaneShape::I64x2 => "i64x2",
            LaneShape::F32x4 => "f32x4",
            LaneShape::F64x2 => "f64x2",
        };
        f.write_str(name)
    }
}

/// A single expected lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Exact lane bits (integer value, or float bit pattern).
    Bits(u64),
    /// Any NaN; only meaningful for float shapes.
    Nan,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Bits(bits) => write!(f, "{bits}"),
            Lane::Nan => f.write_str("nan"),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Value(value) => write!(f, "{value}"),
            Expected::NanCanonical => f.write_str("nan:canonical"),
            Expected::NanArithmetic => f.write_str("nan:arithmetic"),
            Expected::NanAny => f.write_str("nan:any"),
            Expected::RefI31 => f.write_str("ref.i31"),
            Expected::RefAny => f.write_str("ref.any"),
            Expected::RefEq => f.write_str("ref.eq"),
            Expected::RefStruct => f.write_str("ref.struct"),
            Expected::RefArray => f.write_str("ref.array"),
            Expected::RefFunc => f.write_str("ref.func"),
            Expected::RefExtern => f.write_str("ref.extern"),
            Expected::RefNull => f.write_str("ref.null"),
            Expected::V128 { shape, lanes } => {
                let lanes: Vec<String> = lanes.iter().map(|l| l.to_string()).collect();
                write!(f, "v128:{shape} [{}]", lanes.join(" "))
            }
        }
    }
}

/// Render an expected sequence for diagnostics.
pub fn format_expected(expected: &[Expected]) -> String {
    let items: Vec<String> = expected.iter().map(|e| e.to_string()).collect();
    format!("[{}]", items.join(", "))
}
