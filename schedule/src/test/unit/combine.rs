use test_case::test_case;

use crate::reduction::CombineStep::{self, *};
use crate::reduction::combine::validate_combine_sequence;

const WARP: usize = 32;

#[test_case(&[Accumulate, WriteOutput]; "accumulate only")]
#[test_case(&[Accumulate, ShuffleReduce { max_distance: 16 }, WriteOutput]; "single warp")]
#[test_case(
    &[Accumulate, ShuffleReduce { max_distance: 16 }, WriteShared, Barrier, ReadShared, ShuffleReduce { max_distance: 1 }, WriteOutput];
    "row with shared memory"
)]
#[test_case(&[Accumulate, WriteShared, Barrier, ReadShared, ShuffleReduce { max_distance: 16 }, WriteOutput]; "column")]
fn test_valid_sequences(steps: &[CombineStep]) {
    validate_combine_sequence(steps, WARP).unwrap();
}

#[test_case(&[Accumulate, WriteShared, ReadShared, WriteOutput]; "missing barrier")]
#[test_case(&[Accumulate, WriteShared, Barrier, Barrier, ReadShared, WriteOutput]; "double barrier")]
#[test_case(&[Accumulate, Barrier, ReadShared, WriteOutput]; "read without write")]
#[test_case(&[Accumulate, WriteShared, Barrier, WriteOutput]; "write without read")]
#[test_case(&[Accumulate, WriteShared, WriteShared, Barrier, ReadShared, WriteOutput]; "write twice")]
#[test_case(&[Accumulate, ShuffleReduce { max_distance: 32 }, WriteOutput]; "shuffle crosses warp")]
#[test_case(&[Accumulate, ShuffleReduce { max_distance: 12 }, WriteOutput]; "shuffle not power of two")]
#[test_case(&[ShuffleReduce { max_distance: 16 }, WriteOutput]; "missing accumulate")]
#[test_case(&[Accumulate, ShuffleReduce { max_distance: 16 }]; "missing output")]
#[test_case(&[Accumulate, WriteOutput, WriteOutput]; "two outputs")]
#[test_case(&[]; "empty")]
fn test_invalid_sequences(steps: &[CombineStep]) {
    let err = validate_combine_sequence(steps, WARP).unwrap_err();
    assert!(err.is_invariant_violation(), "{err}");
    assert!(!err.is_fallback());
}

#[test]
fn test_shuffle_limit_follows_warp_size() {
    let steps = [Accumulate, ShuffleReduce { max_distance: 32 }, WriteOutput];
    assert!(validate_combine_sequence(&steps, 32).is_err());
    validate_combine_sequence(&steps, 64).unwrap();
}

#[test]
fn test_error_names_sequence() {
    let err = validate_combine_sequence(&[Accumulate, WriteShared, ReadShared, WriteOutput], WARP).unwrap_err();
    assert!(err.to_string().contains("[accumulate, write_shared, read_shared, write_output]"), "{err}");
}

#[test]
fn test_display() {
    assert_eq!(Accumulate.to_string(), "accumulate");
    assert_eq!(ShuffleReduce { max_distance: 8 }.to_string(), "shuffle_reduce(8)");
    assert_eq!(Barrier.to_string(), "barrier");
}

#[test_case(1, None; "single lane")]
#[test_case(2, Some(1); "two lanes")]
#[test_case(3, Some(2); "three lanes")]
#[test_case(8, Some(4); "eight lanes")]
#[test_case(32, Some(16); "warp")]
fn test_shuffle_over(lanes: usize, max_distance: Option<usize>) {
    assert_eq!(CombineStep::shuffle_over(lanes), max_distance.map(|max_distance| ShuffleReduce { max_distance }));
}

#[test]
fn test_shuffle_distances() {
    assert_eq!(CombineStep::shuffle_distances(16).collect::<Vec<_>>(), vec![16, 8, 4, 2, 1]);
    assert_eq!(CombineStep::shuffle_distances(1).collect::<Vec<_>>(), vec![1]);
    assert_eq!(CombineStep::shuffle_distances(0).count(), 0);
}
