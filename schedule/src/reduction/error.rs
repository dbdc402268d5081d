use snafu::Snafu;

pub type Result<T, E = ReductionError> = std::result::Result<T, E>;

/// Why a fusion is outside the subset the reduction planner handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum UnsupportedCategory {
    /// The fusion contains no reduce operator.
    NoReduction,
    /// The roots form more than one independent reduction group.
    MultipleGroups,
    /// Some root is not derived from a reduction.
    SideOutputs,
    /// The reduced dimensions do not form a row or column pattern.
    Layout,
    /// Heroes of one group disagree on operand shape, layout or reduced dimensions.
    MismatchedHeroes,
    /// The combine tree would not fit in a single block.
    CrossBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ReductionError {
    /// The fusion does not fit the implemented subset; the caller should fall
    /// back to a generic lowering.
    #[snafu(display("unsupported reduction fusion ({category}): {reason}"))]
    UnsupportedShape { category: UnsupportedCategory, reason: String },

    /// Internal inconsistency of the planner, or a configuration it cannot
    /// plan with.
    #[snafu(display("reduction planner invariant violated: {message}"))]
    InvariantViolation { message: String },

    /// A graph lookup or indexing-map operation failed on facts the planner
    /// produced or already validated.
    #[snafu(display("reduction planner hit an IR error: {source}"))]
    Ir { source: strider_ir::Error },

    /// No tiling fits the device.
    #[snafu(display("no reduction tiling fits the device: {resource} needs {value}, limit is {max}"))]
    ResourceLimitExceeded { resource: &'static str, value: usize, max: usize },
}

impl ReductionError {
    /// Whether the caller may recover by choosing a different lowering.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::UnsupportedShape { .. } | Self::ResourceLimitExceeded { .. })
    }

    /// Whether this error reports a planner bug.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. } | Self::Ir { .. })
    }

    pub fn category(&self) -> Option<UnsupportedCategory> {
        match self {
            Self::UnsupportedShape { category, .. } => Some(*category),
            _ => None,
        }
    }
}
