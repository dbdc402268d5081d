use crate::*;
use proptest::prelude::*;
use strum::IntoEnumIterator;

impl DType {
    pub fn any_generator() -> impl Strategy<Value = Self> {
        prop::sample::select(DType::iter().collect::<Vec<_>>())
    }

    pub fn float_generator() -> impl Strategy<Value = Self> {
        prop::sample::select(DType::iter().filter(DType::is_float).collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn bytes_match_bits(dtype in DType::any_generator()) {
            prop_assert_eq!(dtype.bytes() * 8, dtype.bits());
        }

        #[test]
        fn families_are_disjoint(dtype in DType::any_generator()) {
            let families = [dtype.is_bool(), dtype.is_int(), dtype.is_float(), dtype.is_complex()];
            prop_assert_eq!(families.iter().filter(|f| **f).count(), 1);
        }

        #[test]
        fn repr_round_trips(dtype in DType::any_generator()) {
            prop_assert_eq!(DType::from_repr(dtype as usize), Some(dtype));
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(DType::Float32.to_string(), "f32");
        assert_eq!(DType::Bool.to_string(), "pred");
        assert_eq!(DType::Complex128.to_string(), "c128");
    }

    #[test]
    fn test_smallest_bits() {
        assert_eq!(smallest_bits(&[DType::Float32, DType::Float16]), Some(16));
        assert_eq!(smallest_bits(&[]), None);
    }
}
