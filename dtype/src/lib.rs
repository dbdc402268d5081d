//! Element types of tensors flowing through a fusion.
//!
//! The planner only needs to know how wide an element is and which family it
//! belongs to: vectorization, shared-memory budgeting and a few rejection
//! rules are keyed on those two facts.

#[cfg(any(test, feature = "proptest"))]
pub mod test;

/// Scalar element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::IntoStaticStr, strum::FromRepr)]
#[cfg_attr(feature = "proptest", derive(proptest_derive::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    #[strum(serialize = "pred")]
    Bool = 0,

    #[strum(serialize = "s8")]
    Int8 = 1,
    #[strum(serialize = "u8")]
    UInt8 = 2,
    #[strum(serialize = "s16")]
    Int16 = 3,
    #[strum(serialize = "u16")]
    UInt16 = 4,
    #[strum(serialize = "s32")]
    Int32 = 5,
    #[strum(serialize = "u32")]
    UInt32 = 6,
    #[strum(serialize = "s64")]
    Int64 = 7,
    #[strum(serialize = "u64")]
    UInt64 = 8,

    #[strum(serialize = "f16")]
    Float16 = 9,
    #[strum(serialize = "bf16")]
    BFloat16 = 10,
    #[strum(serialize = "f32")]
    Float32 = 11,
    #[strum(serialize = "f64")]
    Float64 = 12,

    /// Pair of `f32`.
    #[strum(serialize = "c64")]
    Complex64 = 13,
    /// Pair of `f64`.
    #[strum(serialize = "c128")]
    Complex128 = 14,
}

impl DType {
    /// Storage width in bits. `Bool` occupies a full byte.
    pub const fn bits(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 64,
            Self::Complex128 => 128,
        }
    }

    pub const fn bytes(&self) -> usize {
        self.bits() / 8
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Short HLO-style name (`f32`, `s8`, `pred`, ...).
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Narrowest element width among `dtypes`, in bits.
///
/// Returns `None` for an empty iterator.
pub fn smallest_bits<'a>(dtypes: impl IntoIterator<Item = &'a DType>) -> Option<usize> {
    dtypes.into_iter().map(DType::bits).min()
}
