//! Tagged scalar value used for every sampled state in the engine.
//!
//! The original runtime dispatches on a C type tag via macros expanded
//! per numeric type; here the tag and the value travel together as one
//! small sum type so every append, accumulate, and comparison site
//! matches on it once.

use std::fmt;

/// The numeric type a `StateVar` was declared with. Fixed at
/// construction; every `Scalar` stored in that trace carries the same
/// tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Short,
    Int,
    Long,
    Float,
    Double,
    /// An opaque 64-bit identity. Carried through append/callback but
    /// excluded from arithmetic and ordering (see `Scalar::as_f64`).
    OpaquePointer,
}

/// A tagged scalar. Comparisons and arithmetic dispatch on the variant;
/// mismatched-tag operations are a silent no-op rather than a panic,
/// matching the engine's "never escapes the core" error policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    OpaquePointer(u64),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Short(_) => DataType::Short,
            Scalar::Int(_) => DataType::Int,
            Scalar::Long(_) => DataType::Long,
            Scalar::Float(_) => DataType::Float,
            Scalar::Double(_) => DataType::Double,
            Scalar::OpaquePointer(_) => DataType::OpaquePointer,
        }
    }

    /// The additive identity for a given type tag.
    pub fn zero(ty: DataType) -> Scalar {
        match ty {
            DataType::Short => Scalar::Short(0),
            DataType::Int => Scalar::Int(0),
            DataType::Long => Scalar::Long(0),
            DataType::Float => Scalar::Float(0.0),
            DataType::Double => Scalar::Double(0.0),
            DataType::OpaquePointer => Scalar::OpaquePointer(0),
        }
    }

    /// The largest representable value for a type tag. Used to seed a
    /// MIN search's running cache so the first sample always improves it.
    pub fn max_value(ty: DataType) -> Scalar {
        match ty {
            DataType::Short => Scalar::Short(i16::MAX),
            DataType::Int => Scalar::Int(i32::MAX),
            DataType::Long => Scalar::Long(i64::MAX),
            DataType::Float => Scalar::Float(f32::MAX),
            DataType::Double => Scalar::Double(f64::MAX),
            DataType::OpaquePointer => Scalar::OpaquePointer(u64::MAX),
        }
    }

    /// The smallest representable value for a type tag (true negative
    /// minimum, not C's `FLT_MIN`/`DBL_MIN` smallest-positive trap). Used
    /// to seed a MAX search's running cache.
    pub fn min_value(ty: DataType) -> Scalar {
        match ty {
            DataType::Short => Scalar::Short(i16::MIN),
            DataType::Int => Scalar::Int(i32::MIN),
            DataType::Long => Scalar::Long(i64::MIN),
            DataType::Float => Scalar::Float(f32::MIN),
            DataType::Double => Scalar::Double(f64::MIN),
            DataType::OpaquePointer => Scalar::OpaquePointer(0),
        }
    }

    /// Materializes a value of the given type from an `f64`, rounding
    /// to the nearest representable value for integral types. Used by
    /// RANGE materialization (`begin + index*step`) and by the
    /// known-operation Function arithmetic (§4.4's LOG/ABS/...).
    pub fn from_f64(ty: DataType, v: f64) -> Scalar {
        match ty {
            DataType::Short => Scalar::Short(v.round() as i16),
            DataType::Int => Scalar::Int(v.round() as i32),
            DataType::Long => Scalar::Long(v.round() as i64),
            DataType::Float => Scalar::Float(v as f32),
            DataType::Double => Scalar::Double(v),
            DataType::OpaquePointer => Scalar::OpaquePointer(v.round() as u64),
        }
    }

    /// `None` for `OpaquePointer` — it carries identity, not quantity,
    /// and must not participate in comparisons or accumulation.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Scalar::Short(v) => Some(v as f64),
            Scalar::Int(v) => Some(v as f64),
            Scalar::Long(v) => Some(v as f64),
            Scalar::Float(v) => Some(v as f64),
            Scalar::Double(v) => Some(v),
            Scalar::OpaquePointer(_) => None,
        }
    }

    /// Same-type addition; used by the batch accumulators. A
    /// mismatched-tag call returns `self` unchanged — this should never
    /// happen in practice since accumulator and sample share a
    /// `StateVar`'s type, but the engine never panics on it.
    pub fn add(&self, other: &Scalar) -> Scalar {
        match (*self, *other) {
            (Scalar::Short(a), Scalar::Short(b)) => Scalar::Short(a.wrapping_add(b)),
            (Scalar::Int(a), Scalar::Int(b)) => Scalar::Int(a.wrapping_add(b)),
            (Scalar::Long(a), Scalar::Long(b)) => Scalar::Long(a.wrapping_add(b)),
            (Scalar::Float(a), Scalar::Float(b)) => Scalar::Float(a + b),
            (Scalar::Double(a), Scalar::Double(b)) => Scalar::Double(a + b),
            _ => *self,
        }
    }

    pub fn sub(&self, other: &Scalar) -> Scalar {
        match (*self, *other) {
            (Scalar::Short(a), Scalar::Short(b)) => Scalar::Short(a.wrapping_sub(b)),
            (Scalar::Int(a), Scalar::Int(b)) => Scalar::Int(a.wrapping_sub(b)),
            (Scalar::Long(a), Scalar::Long(b)) => Scalar::Long(a.wrapping_sub(b)),
            (Scalar::Float(a), Scalar::Float(b)) => Scalar::Float(a - b),
            (Scalar::Double(a), Scalar::Double(b)) => Scalar::Double(a - b),
            _ => *self,
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Short(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Long(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Double(v) => write!(f, "{v}"),
            Scalar::OpaquePointer(v) => write!(f, "*{v:#x}"),
        }
    }
}
