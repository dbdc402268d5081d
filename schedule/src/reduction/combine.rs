//! Thread-level combine sequences.
//!
//! A strategy describes its reduction algorithm as a flat list of steps that
//! every thread of a block executes in order. The emission backend lowers
//! each step to code; the sequence itself is checked here against the block
//! synchronization rules: shuffles never cross a warp, and every shared-memory
//! write is separated from the matching read by exactly one barrier.

use std::fmt;

use itertools::Itertools;
use snafu::ensure;

use super::error::*;

/// One phase of the per-block combine algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineStep {
    /// Reduce the thread's input tile into its accumulators, starting from
    /// the combiner identity.
    Accumulate,
    /// Xor-butterfly over lanes: `max_distance`, `max_distance / 2`, ..., `1`.
    ShuffleReduce { max_distance: usize },
    /// Store accumulators through the shared-memory write map.
    WriteShared,
    /// Block-wide barrier.
    Barrier,
    /// Load accumulators through the shared-memory read map; threads outside
    /// the read map restart from the identity.
    ReadShared,
    /// Combine with the init value and store through the output map.
    WriteOutput,
}

impl CombineStep {
    /// Shuffle step for a lane group of `lanes` threads; `None` when a single
    /// lane needs no shuffle.
    pub fn shuffle_over(lanes: usize) -> Option<Self> {
        (lanes > 1).then(|| Self::ShuffleReduce { max_distance: lanes.next_power_of_two() / 2 })
    }

    /// Shuffle distances of a [`CombineStep::ShuffleReduce`], largest first.
    pub fn shuffle_distances(max_distance: usize) -> impl Iterator<Item = usize> {
        std::iter::successors((max_distance > 0).then_some(max_distance), |&d| (d > 1).then_some(d / 2))
    }
}

impl fmt::Display for CombineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulate => write!(f, "accumulate"),
            Self::ShuffleReduce { max_distance } => write!(f, "shuffle_reduce({max_distance})"),
            Self::WriteShared => write!(f, "write_shared"),
            Self::Barrier => write!(f, "barrier"),
            Self::ReadShared => write!(f, "read_shared"),
            Self::WriteOutput => write!(f, "write_output"),
        }
    }
}

/// Check a combine sequence against the block synchronization rules.
///
/// # Errors
/// [`ReductionError::InvariantViolation`] when the sequence does not start with
/// [`CombineStep::Accumulate`], does not end with a single
/// [`CombineStep::WriteOutput`], has a shuffle wider than a warp, or reads
/// shared memory without exactly one barrier after the preceding write.
pub fn validate_combine_sequence(steps: &[CombineStep], warp_size: usize) -> Result<()> {
    let describe = || steps.iter().join(", ");
    ensure!(
        steps.first() == Some(&CombineStep::Accumulate),
        InvariantViolationSnafu { message: format!("combine sequence must start with accumulate: [{}]", describe()) }
    );
    ensure!(
        steps.last() == Some(&CombineStep::WriteOutput)
            && steps.iter().filter(|s| **s == CombineStep::WriteOutput).count() == 1,
        InvariantViolationSnafu {
            message: format!("combine sequence must end with its only output write: [{}]", describe())
        }
    );

    // Barriers seen since the last shared write; `None` outside a write/read pair.
    let mut pending: Option<usize> = None;
    for step in steps {
        match *step {
            CombineStep::ShuffleReduce { max_distance } => ensure!(
                max_distance.is_power_of_two() && max_distance < warp_size,
                InvariantViolationSnafu {
                    message: format!("shuffle distance {max_distance} does not stay within a warp of {warp_size}")
                }
            ),
            CombineStep::WriteShared => {
                ensure!(
                    pending.is_none(),
                    InvariantViolationSnafu { message: format!("shared write without a read: [{}]", describe()) }
                );
                pending = Some(0);
            }
            CombineStep::Barrier => {
                ensure!(
                    pending == Some(0),
                    InvariantViolationSnafu {
                        message: format!("barrier outside a shared write/read pair: [{}]", describe())
                    }
                );
                pending = Some(1);
            }
            CombineStep::ReadShared => {
                ensure!(
                    pending == Some(1),
                    InvariantViolationSnafu {
                        message: format!("shared read without exactly one barrier after a write: [{}]", describe())
                    }
                );
                pending = None;
            }
            CombineStep::Accumulate | CombineStep::WriteOutput => {}
        }
    }
    ensure!(
        pending.is_none(),
        InvariantViolationSnafu { message: format!("shared write without a read: [{}]", describe()) }
    );
    Ok(())
}
